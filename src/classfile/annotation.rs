//! Runtime annotations, as far as the transformer needs them.
//!
//! Only the element-value shapes that can occur in the force-signature
//! annotation and in ordinary marker annotations are modeled; type
//! annotations are not retained.

use super::constant_pool::ConstantValue;

/// An annotation on a class, field, or method.
#[derive(Debug, PartialEq, Clone)]
pub struct Annotation {
    /// The field descriptor of the annotation interface,
    /// e.g. `Lorg/classweave/runtime/ForceSignature;`.
    pub type_descriptor: String,
    /// The element name/value pairs.
    pub elements: Vec<(String, ElementValue)>,
}

impl Annotation {
    /// Gets the value of the named element.
    #[must_use]
    pub fn element(&self, name: &str) -> Option<&ElementValue> {
        self.elements
            .iter()
            .find(|(element_name, _)| element_name == name)
            .map(|(_, value)| value)
    }
}

/// The value of an annotation element.
#[derive(Debug, PartialEq, Clone)]
pub enum ElementValue {
    /// A primitive or string constant, with its original tag character
    /// (`B`, `C`, `D`, `F`, `I`, `J`, `S`, `Z`, or `s`). The tag is kept
    /// because the smaller integral sorts all share `Integer` pool entries
    /// and could not otherwise be re-emitted faithfully.
    Constant(char, ConstantValue),
    /// An enum constant, as type descriptor and constant name.
    EnumConstant {
        /// The field descriptor of the enum type.
        type_descriptor: String,
        /// The name of the constant.
        const_name: String,
    },
    /// A class literal, as a return descriptor (`V` encodes `void.class`).
    Class {
        /// The return descriptor of the class literal.
        descriptor: String,
    },
    /// A nested annotation.
    Nested(Annotation),
    /// An array of element values.
    Array(Vec<ElementValue>),
}

impl ElementValue {
    /// Extracts a string constant, if this value is one.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Constant(_, ConstantValue::String(it)) => it.as_utf8(),
            _ => None,
        }
    }
}
