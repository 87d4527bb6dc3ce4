//! The force-signature annotation: a student-authored pin that overrides
//! fuzzy matching with a literal target identifier and descriptor.
//!
//! Recognized elements are `identifier`, `descriptor`, `returnType`, and
//! `parameterTypes`. A literal `descriptor` wins over the type elements;
//! otherwise the descriptor is synthesized from `returnType` and
//! `parameterTypes`. Types and fields only consult `identifier`.

use itertools::Itertools;
use log::warn;

use crate::{
    classfile::{Annotation, Class, ElementValue, Field, Method},
    runtime::abi,
};

/// A pinned mapping read from the force-signature annotation.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct ForcedSignature {
    /// The target identifier the member is pinned to.
    pub identifier: String,
    /// The target descriptor, when the annotation determines one.
    pub descriptor: Option<String>,
}

impl ForcedSignature {
    /// Reads the pin attached to a class, if any.
    #[must_use]
    pub fn of_class(class: &Class) -> Option<Self> {
        let annotation = find(&class.annotations, &class.invisible_annotations)?;
        Some(Self {
            identifier: read_identifier(annotation)?,
            descriptor: None,
        })
    }

    /// Reads the pin attached to a field, if any. Only the identifier is
    /// consulted.
    #[must_use]
    pub fn of_field(field: &Field) -> Option<Self> {
        let annotation = find(&field.annotations, &field.invisible_annotations)?;
        Some(Self {
            identifier: read_identifier(annotation)?,
            descriptor: None,
        })
    }

    /// Reads the pin attached to a method, if any. Constructors pin to
    /// `<init>` regardless of the `identifier` element.
    #[must_use]
    pub fn of_method(method: &Method) -> Option<Self> {
        let annotation = find(&method.annotations, &method.invisible_annotations)?;
        let identifier = if method.is_constructor() {
            crate::classfile::CONSTRUCTOR_NAME.to_owned()
        } else {
            read_identifier(annotation)?
        };
        let descriptor = match annotation.element("descriptor").and_then(ElementValue::as_str) {
            Some(it) => Some(it.to_owned()),
            None => synthesize_descriptor(annotation),
        };
        Some(Self {
            identifier,
            descriptor,
        })
    }

}

fn find<'a>(visible: &'a [Annotation], invisible: &'a [Annotation]) -> Option<&'a Annotation> {
    visible
        .iter()
        .chain(invisible)
        .find(|it| it.type_descriptor == abi::FORCE_SIGNATURE_DESCRIPTOR)
}

fn read_identifier(annotation: &Annotation) -> Option<String> {
    let identifier = annotation
        .element("identifier")
        .and_then(ElementValue::as_str);
    if identifier.is_none() {
        warn!("force-signature annotation without an `identifier` element is ignored");
    }
    identifier.map(str::to_owned)
}

/// Builds a method descriptor from the `returnType` and `parameterTypes`
/// elements. Absent `parameterTypes` means no parameters; an absent
/// `returnType` leaves the descriptor undetermined.
fn synthesize_descriptor(annotation: &Annotation) -> Option<String> {
    let return_type = match annotation.element("returnType")? {
        ElementValue::Class { descriptor } => descriptor.clone(),
        other => {
            warn!("force-signature `returnType` is not a class literal: {other:?}");
            return None;
        }
    };
    let parameters = match annotation.element("parameterTypes") {
        Some(ElementValue::Array(values)) => values
            .iter()
            .map(|value| match value {
                ElementValue::Class { descriptor } => Some(descriptor.as_str()),
                _ => None,
            })
            .collect::<Option<Vec<_>>>()?,
        Some(other) => {
            warn!("force-signature `parameterTypes` is not an array: {other:?}");
            return None;
        }
        None => Vec::new(),
    };
    Some(format!("({}){return_type}", parameters.iter().join("")))
}

#[cfg(test)]
mod tests {
    use crate::classfile::{ConstantValue, MethodAccess};

    use super::*;

    fn annotation(elements: Vec<(&str, ElementValue)>) -> Annotation {
        Annotation {
            type_descriptor: abi::FORCE_SIGNATURE_DESCRIPTOR.to_owned(),
            elements: elements
                .into_iter()
                .map(|(name, value)| (name.to_owned(), value))
                .collect(),
        }
    }

    fn string_value(value: &str) -> ElementValue {
        ElementValue::Constant('s', ConstantValue::string(value))
    }

    fn method_with(annotations: Vec<Annotation>, name: &str) -> Method {
        Method {
            access: MethodAccess::PUBLIC,
            name: name.to_owned(),
            descriptor: "()V".into(),
            signature: None,
            exceptions: Vec::new(),
            annotations,
            invisible_annotations: Vec::new(),
            code: None,
            is_synthetic: false,
            is_deprecated: false,
        }
    }

    #[test]
    fn literal_descriptor_wins() {
        let method = method_with(
            vec![annotation(vec![
                ("identifier", string_value("count")),
                ("descriptor", string_value("(I)I")),
                (
                    "returnType",
                    ElementValue::Class {
                        descriptor: "J".into(),
                    },
                ),
            ])],
            "compte",
        );
        let forced = ForcedSignature::of_method(&method).unwrap();
        assert_eq!(forced.identifier, "count");
        assert_eq!(forced.descriptor.as_deref(), Some("(I)I"));
    }

    #[test]
    fn descriptor_synthesized_from_types() {
        let method = method_with(
            vec![annotation(vec![
                ("identifier", string_value("count")),
                (
                    "returnType",
                    ElementValue::Class {
                        descriptor: "I".into(),
                    },
                ),
                (
                    "parameterTypes",
                    ElementValue::Array(vec![
                        ElementValue::Class {
                            descriptor: "I".into(),
                        },
                        ElementValue::Class {
                            descriptor: "Ljava/lang/String;".into(),
                        },
                    ]),
                ),
            ])],
            "compte",
        );
        let forced = ForcedSignature::of_method(&method).unwrap();
        assert_eq!(forced.descriptor.as_deref(), Some("(ILjava/lang/String;)I"));
    }

    #[test]
    fn constructors_always_pin_init() {
        let method = method_with(
            vec![annotation(vec![("identifier", string_value("ignored"))])],
            "<init>",
        );
        let forced = ForcedSignature::of_method(&method).unwrap();
        assert_eq!(forced.identifier, "<init>");
    }

    #[test]
    fn missing_annotation_is_none() {
        assert_eq!(ForcedSignature::of_method(&method_with(Vec::new(), "foo")), None);
    }
}
