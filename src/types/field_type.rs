use std::{fmt::Display, str::FromStr};

use super::InvalidDescriptor;

/// A primitive JVM type.
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Clone, Copy)]
#[cfg_attr(test, derive(proptest_derive::Arbitrary))]
pub enum PrimitiveType {
    /// The `boolean` type.
    Boolean,
    /// The `char` type.
    Char,
    /// The `float` type.
    Float,
    /// The `double` type.
    Double,
    /// The `byte` type.
    Byte,
    /// The `short` type.
    Short,
    /// The `int` type.
    Int,
    /// The `long` type.
    Long,
}

impl PrimitiveType {
    /// Returns the single-character descriptor of the sort.
    #[must_use]
    pub const fn descriptor_char(self) -> char {
        match self {
            Self::Boolean => 'Z',
            Self::Char => 'C',
            Self::Float => 'F',
            Self::Double => 'D',
            Self::Byte => 'B',
            Self::Short => 'S',
            Self::Int => 'I',
            Self::Long => 'J',
        }
    }

    /// Checks whether values of the sort occupy two local slots and two
    /// operand stack entries.
    #[must_use]
    pub const fn is_category_2(self) -> bool {
        matches!(self, Self::Long | Self::Double)
    }

    /// The internal name of the wrapper class boxing this sort.
    #[must_use]
    pub const fn box_class(self) -> &'static str {
        match self {
            Self::Boolean => "java/lang/Boolean",
            Self::Char => "java/lang/Character",
            Self::Float => "java/lang/Float",
            Self::Double => "java/lang/Double",
            Self::Byte => "java/lang/Byte",
            Self::Short => "java/lang/Short",
            Self::Int => "java/lang/Integer",
            Self::Long => "java/lang/Long",
        }
    }

    /// The name and descriptor of the wrapper method unboxing this sort,
    /// e.g. `intValue` / `()I`.
    #[must_use]
    pub const fn unbox_method(self) -> (&'static str, &'static str) {
        match self {
            Self::Boolean => ("booleanValue", "()Z"),
            Self::Char => ("charValue", "()C"),
            Self::Float => ("floatValue", "()F"),
            Self::Double => ("doubleValue", "()D"),
            Self::Byte => ("byteValue", "()B"),
            Self::Short => ("shortValue", "()S"),
            Self::Int => ("intValue", "()I"),
            Self::Long => ("longValue", "()J"),
        }
    }

    /// The descriptor of the wrapper's static `valueOf` factory.
    #[must_use]
    pub fn value_of_descriptor(self) -> String {
        format!("({})L{};", self.descriptor_char(), self.box_class())
    }
}

impl Display for PrimitiveType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let keyword = match self {
            Self::Boolean => "boolean",
            Self::Char => "char",
            Self::Float => "float",
            Self::Double => "double",
            Self::Byte => "byte",
            Self::Short => "short",
            Self::Int => "int",
            Self::Long => "long",
        };
        write!(f, "{keyword}")
    }
}

impl TryFrom<char> for PrimitiveType {
    type Error = InvalidDescriptor;

    fn try_from(descriptor: char) -> Result<Self, Self::Error> {
        match descriptor {
            'Z' => Ok(Self::Boolean),
            'C' => Ok(Self::Char),
            'F' => Ok(Self::Float),
            'D' => Ok(Self::Double),
            'B' => Ok(Self::Byte),
            'S' => Ok(Self::Short),
            'I' => Ok(Self::Int),
            'J' => Ok(Self::Long),
            unexpected => Err(InvalidDescriptor(unexpected.to_string())),
        }
    }
}

/// A field type (non-generic) as written in a descriptor.
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Clone)]
pub enum FieldType {
    /// A primitive type.
    Primitive(PrimitiveType),
    /// A reference type, by internal name (slash-separated).
    Object(String),
    /// An array type.
    Array(Box<FieldType>),
}

impl FieldType {
    /// Creates an array type with `self` as its element type.
    #[must_use]
    pub fn into_array_type(self) -> Self {
        Self::Array(Box::new(self))
    }

    /// Renders the type back into descriptor form.
    #[must_use]
    pub fn descriptor(&self) -> String {
        match self {
            Self::Primitive(it) => it.descriptor_char().to_string(),
            Self::Object(name) => format!("L{name};"),
            Self::Array(inner) => format!("[{}", inner.descriptor()),
        }
    }

    /// Checks whether values of the type occupy two local slots.
    #[must_use]
    pub const fn is_category_2(&self) -> bool {
        matches!(self, Self::Primitive(p) if p.is_category_2())
    }

    /// The innermost element type of an array, or `self` for non-arrays.
    #[must_use]
    pub fn element_type(&self) -> &FieldType {
        match self {
            Self::Array(inner) => inner.element_type(),
            other => other,
        }
    }

    /// Rewrites every class name mentioned by the type through `rename`.
    /// Primitive sorts and array dimensions pass through unchanged.
    #[must_use]
    pub fn map_class_names<F>(&self, rename: &F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        match self {
            Self::Primitive(it) => Self::Primitive(*it),
            Self::Object(name) => match rename(name) {
                Some(renamed) => Self::Object(renamed),
                None => Self::Object(name.clone()),
            },
            Self::Array(inner) => Self::Array(Box::new(inner.map_class_names(rename))),
        }
    }
}

impl Display for FieldType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Primitive(it) => it.fmt(f),
            Self::Object(name) => write!(f, "{name}"),
            Self::Array(inner) => write!(f, "{inner}[]"),
        }
    }
}

impl From<PrimitiveType> for FieldType {
    fn from(value: PrimitiveType) -> Self {
        Self::Primitive(value)
    }
}

impl FromStr for FieldType {
    type Err = InvalidDescriptor;

    fn from_str(descriptor: &str) -> Result<Self, Self::Err> {
        let (parsed, rest) = parse_prefix(descriptor)?;
        if rest.is_empty() {
            Ok(parsed)
        } else {
            Err(InvalidDescriptor(descriptor.to_owned()))
        }
    }
}

/// Parses one field type off the front of `input`, returning the remainder.
pub(crate) fn parse_prefix(input: &str) -> Result<(FieldType, &str), InvalidDescriptor> {
    let mut chars = input.chars();
    match chars.next() {
        Some('[') => {
            let (element, rest) = parse_prefix(chars.as_str())?;
            Ok((element.into_array_type(), rest))
        }
        Some('L') => {
            let (name, rest) = chars
                .as_str()
                .split_once(';')
                .ok_or_else(|| InvalidDescriptor(input.to_owned()))?;
            if name.is_empty() {
                return Err(InvalidDescriptor(input.to_owned()));
            }
            Ok((FieldType::Object(name.to_owned()), rest))
        }
        Some(c) => {
            let sort = PrimitiveType::try_from(c)
                .map_err(|_| InvalidDescriptor(input.to_owned()))?;
            Ok((sort.into(), chars.as_str()))
        }
        None => Err(InvalidDescriptor(input.to_owned())),
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn primitive_round_trip() {
        for c in ['Z', 'C', 'F', 'D', 'B', 'S', 'I', 'J'] {
            let sort = PrimitiveType::try_from(c).unwrap();
            assert_eq!(sort.descriptor_char(), c);
        }
        assert!(PrimitiveType::try_from('V').is_err());
        assert!(PrimitiveType::try_from('L').is_err());
    }

    #[test]
    fn category_2_sorts() {
        assert!(PrimitiveType::Long.is_category_2());
        assert!(PrimitiveType::Double.is_category_2());
        assert!(!PrimitiveType::Int.is_category_2());
        assert!(!FieldType::Object("java/lang/Long".into()).is_category_2());
    }

    #[test]
    fn object_descriptor() {
        let ty: FieldType = "Ljava/lang/String;".parse().unwrap();
        assert_eq!(ty, FieldType::Object("java/lang/String".into()));
        assert_eq!(ty.descriptor(), "Ljava/lang/String;");
    }

    #[test]
    fn array_descriptor() {
        let ty: FieldType = "[[I".parse().unwrap();
        assert_eq!(
            ty,
            FieldType::from(PrimitiveType::Int)
                .into_array_type()
                .into_array_type()
        );
        assert_eq!(ty.descriptor(), "[[I");
        assert_eq!(ty.element_type(), &FieldType::from(PrimitiveType::Int));
    }

    #[test]
    fn rejects_malformed() {
        assert!("Ljava/lang/String".parse::<FieldType>().is_err());
        assert!("II".parse::<FieldType>().is_err());
        assert!("L;".parse::<FieldType>().is_err());
        assert!("".parse::<FieldType>().is_err());
        assert!("[".parse::<FieldType>().is_err());
    }

    #[test]
    fn class_name_mapping_preserves_dimensions() {
        let ty: FieldType = "[[Lsub/Foo;".parse().unwrap();
        let renamed = ty.map_class_names(&|name| {
            (name == "sub/Foo").then(|| "ref/Bar".to_owned())
        });
        assert_eq!(renamed.descriptor(), "[[Lref/Bar;");
    }

    proptest! {
        #[test]
        fn parse_render_round_trip(sort in any::<PrimitiveType>(), dims in 0usize..4) {
            let ty = (0..dims).fold(FieldType::from(sort), |acc, _| acc.into_array_type());
            let rendered = ty.descriptor();
            prop_assert_eq!(rendered.parse::<FieldType>().unwrap(), ty);
        }
    }
}
