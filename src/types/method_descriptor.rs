use std::str::FromStr;

use itertools::Itertools;

use super::{
    InvalidDescriptor,
    field_type::{FieldType, parse_prefix},
};

/// The parsed form of a method descriptor: parameter types and return type.
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Clone, derive_more::Display)]
#[display(
    "({}){return_type}",
    parameters.iter().map(FieldType::descriptor).join("")
)]
pub struct MethodDescriptor {
    /// The parameter types, in declaration order.
    pub parameters: Vec<FieldType>,
    /// The return type.
    pub return_type: ReturnType,
}

/// The return type of a method.
#[derive(
    Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Clone, derive_more::Display, derive_more::From,
)]
pub enum ReturnType {
    /// The method returns a value of the given type.
    Some(FieldType),
    /// The method returns `void`.
    #[display("void")]
    Void,
}

impl ReturnType {
    /// Renders the return type in descriptor form (`V` for void).
    #[must_use]
    pub fn descriptor(&self) -> String {
        match self {
            Self::Some(it) => it.descriptor(),
            Self::Void => "V".to_owned(),
        }
    }
}

impl MethodDescriptor {
    /// Renders the descriptor string.
    #[must_use]
    pub fn descriptor(&self) -> String {
        self.to_string()
    }

    /// The number of local slots the parameters occupy, counting `long` and
    /// `double` twice. The receiver slot is not included.
    #[must_use]
    pub fn parameter_slots(&self) -> u16 {
        self.parameters
            .iter()
            .map(|it| if it.is_category_2() { 2 } else { 1 })
            .sum()
    }

    /// Rewrites every class name mentioned in the descriptor through
    /// `rename`, preserving parameter order, array dimensions, and primitive
    /// sorts.
    #[must_use]
    pub fn map_class_names<F>(&self, rename: &F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        Self {
            parameters: self
                .parameters
                .iter()
                .map(|it| it.map_class_names(rename))
                .collect(),
            return_type: match &self.return_type {
                ReturnType::Some(it) => ReturnType::Some(it.map_class_names(rename)),
                ReturnType::Void => ReturnType::Void,
            },
        }
    }
}

impl FromStr for MethodDescriptor {
    type Err = InvalidDescriptor;

    fn from_str(descriptor: &str) -> Result<Self, Self::Err> {
        let mut remaining = descriptor
            .strip_prefix('(')
            .ok_or_else(|| InvalidDescriptor(descriptor.to_owned()))?;
        let mut parameters = Vec::new();
        loop {
            if let Some(rest) = remaining.strip_prefix(')') {
                let return_type = ReturnType::from_str(rest)
                    .map_err(|_| InvalidDescriptor(descriptor.to_owned()))?;
                return Ok(Self {
                    parameters,
                    return_type,
                });
            }
            let (parameter, rest) =
                parse_prefix(remaining).map_err(|_| InvalidDescriptor(descriptor.to_owned()))?;
            parameters.push(parameter);
            remaining = rest;
        }
    }
}

impl FromStr for ReturnType {
    type Err = InvalidDescriptor;

    fn from_str(descriptor: &str) -> Result<Self, Self::Err> {
        if descriptor == "V" {
            Ok(Self::Void)
        } else {
            FieldType::from_str(descriptor).map(Self::Some)
        }
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;
    use crate::types::PrimitiveType;

    #[test]
    fn parses_mixed_parameters() {
        let descriptor: MethodDescriptor = "(I[Ljava/lang/String;J)V".parse().unwrap();
        assert_eq!(descriptor.parameters.len(), 3);
        assert_eq!(descriptor.return_type, ReturnType::Void);
        assert_eq!(descriptor.parameter_slots(), 4);
        assert_eq!(descriptor.to_string(), "(I[Ljava/lang/String;J)V");
    }

    #[test]
    fn parses_object_return() {
        let descriptor: MethodDescriptor = "()Ljava/util/List;".parse().unwrap();
        assert_eq!(
            descriptor.return_type,
            ReturnType::Some(FieldType::Object("java/util/List".into()))
        );
    }

    #[test]
    fn rejects_malformed() {
        assert!("".parse::<MethodDescriptor>().is_err());
        assert!("()".parse::<MethodDescriptor>().is_err());
        assert!("(I".parse::<MethodDescriptor>().is_err());
        assert!("(V)V".parse::<MethodDescriptor>().is_err());
        assert!("()VV".parse::<MethodDescriptor>().is_err());
        assert!("(I[Ljava/lang/StringJ)V".parse::<MethodDescriptor>().is_err());
    }

    #[test]
    fn translation_touches_only_class_names() {
        let descriptor: MethodDescriptor = "(Lsub/A;[Lsub/A;I)Lsub/B;".parse().unwrap();
        let translated = descriptor.map_class_names(&|name| match name {
            "sub/A" => Some("ref/A".to_owned()),
            _ => None,
        });
        assert_eq!(translated.to_string(), "(Lref/A;[Lref/A;I)Lsub/B;");
    }

    fn arb_field_type() -> impl Strategy<Value = FieldType> {
        (any::<PrimitiveType>(), 0usize..3).prop_map(|(sort, dims)| {
            (0..dims).fold(FieldType::from(sort), |acc, _| acc.into_array_type())
        })
    }

    proptest! {
        #[test]
        fn round_trip(
            params in prop::collection::vec(arb_field_type(), 0..8),
            ret in prop_oneof![
                Just(ReturnType::Void),
                arb_field_type().prop_map(ReturnType::Some),
            ],
        ) {
            let descriptor = MethodDescriptor { parameters: params, return_type: ret };
            let rendered = descriptor.to_string();
            prop_assert_eq!(rendered.parse::<MethodDescriptor>().unwrap(), descriptor);
        }
    }
}
