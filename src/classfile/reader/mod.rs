//! Parsing class files into the element model.

mod code;

use std::io::{self, Read};

use trait_gen::trait_gen;

use crate::types::{FieldType, InvalidDescriptor, MethodDescriptor};

use super::{
    Annotation, BootstrapMethod, Class, ClassAccess, ClassVersion, ElementValue, Field,
    FieldAccess, InnerClass, Method, MethodAccess,
    constant_pool::{ConstantPool, ConstantValue},
};

/// An error produced while parsing a class file.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ParseError {
    /// The input does not start with the class-file magic number.
    #[error("not a class file (bad magic number)")]
    NotAClassFile,
    /// The class file predates stack map tables.
    #[error("unsupported class file version {0} (minimum is 52)")]
    UnsupportedVersion(u16),
    /// A constant pool index pointing nowhere.
    #[error("invalid constant pool index {0}")]
    BadPoolIndex(u16),
    /// An opcode this parser does not accept (including the `jsr` family,
    /// which cannot occur in stack-map-verified code).
    #[error("unsupported opcode 0x{0:02x} at offset {1}")]
    UnsupportedOpcode(u8, u32),
    /// Access flag bits without a defined meaning.
    #[error("unknown {target} access flags {flags:#06x}")]
    UnknownFlags {
        /// What the flags belong to.
        target: &'static str,
        /// The raw bits.
        flags: u16,
    },
    /// Anything else structurally wrong with the class file.
    #[error("malformed class file: {0}")]
    Malformed(String),
    /// A malformed field or method descriptor.
    #[error(transparent)]
    InvalidDescriptor(#[from] InvalidDescriptor),
    /// The underlying reader failed.
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Reading of one big-endian value from a byte stream.
pub(crate) trait FromBytecode {
    fn from_reader<R: Read + ?Sized>(reader: &mut R) -> io::Result<Self>
    where
        Self: Sized;
}

impl<const N: usize> FromBytecode for [u8; N] {
    fn from_reader<R: Read + ?Sized>(reader: &mut R) -> io::Result<Self> {
        let mut buf = [0u8; N];
        reader.read_exact(&mut buf)?;
        Ok(buf)
    }
}

#[trait_gen(T -> u8, u16, u32, i8, i16, i32)]
impl FromBytecode for T {
    fn from_reader<R: Read + ?Sized>(reader: &mut R) -> io::Result<Self> {
        let buf = reader.parse()?;
        Ok(Self::from_be_bytes(buf))
    }
}

pub(crate) trait BytecodeReader: Read {
    fn parse<T: FromBytecode>(&mut self) -> io::Result<T>;
}

impl<R: Read + ?Sized> BytecodeReader for R {
    fn parse<T: FromBytecode>(&mut self) -> io::Result<T> {
        T::from_reader(self)
    }
}

const CLASS_MAGIC: u32 = 0xCAFE_BABE;

impl Class {
    /// Parses a class file from a byte slice.
    ///
    /// # Errors
    /// See [`ParseError`].
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ParseError> {
        let mut reader = bytes;
        Self::from_reader(&mut reader)
    }

    /// Parses a class file from the given reader.
    ///
    /// # Errors
    /// See [`ParseError`].
    pub fn from_reader<R: Read + ?Sized>(reader: &mut R) -> Result<Self, ParseError> {
        let magic: u32 = reader.parse()?;
        if magic != CLASS_MAGIC {
            return Err(ParseError::NotAClassFile);
        }
        let minor: u16 = reader.parse()?;
        let major: u16 = reader.parse()?;
        let version = ClassVersion { major, minor }.validated()?;
        let pool_count: u16 = reader.parse()?;
        let pool = ConstantPool::from_reader(reader, pool_count)?;

        let access_bits: u16 = reader.parse()?;
        let access = ClassAccess::from_bits(access_bits).ok_or(ParseError::UnknownFlags {
            target: "class",
            flags: access_bits,
        })?;
        let this_class: u16 = reader.parse()?;
        let name = pool.get_class_name(this_class)?;
        let super_index: u16 = reader.parse()?;
        let super_name = if super_index == 0 {
            None
        } else {
            Some(pool.get_class_name(super_index)?)
        };
        if super_name.is_none() && name != "java/lang/Object" {
            return Err(ParseError::Malformed(format!(
                "class `{name}` has no superclass"
            )));
        }

        let interface_count: u16 = reader.parse()?;
        let interfaces = (0..interface_count)
            .map(|_| {
                let index: u16 = reader.parse()?;
                pool.get_class_name(index)
            })
            .collect::<Result<_, _>>()?;

        let field_count: u16 = reader.parse()?;
        let fields = (0..field_count)
            .map(|_| Field::parse(reader, &pool))
            .collect::<Result<_, _>>()?;
        let method_count: u16 = reader.parse()?;
        let methods = (0..method_count)
            .map(|_| Method::parse(reader, &pool))
            .collect::<Result<_, _>>()?;

        let mut class = Class {
            version,
            access,
            name,
            super_name,
            interfaces,
            fields,
            methods,
            signature: None,
            source_file: None,
            inner_classes: Vec::new(),
            annotations: Vec::new(),
            invisible_annotations: Vec::new(),
            bootstrap_methods: Vec::new(),
            is_synthetic: false,
            is_deprecated: false,
        };
        let attribute_count: u16 = reader.parse()?;
        for _ in 0..attribute_count {
            class.parse_attribute(reader, &pool)?;
        }
        Ok(class)
    }

    fn parse_attribute<R: Read + ?Sized>(
        &mut self,
        reader: &mut R,
        pool: &ConstantPool,
    ) -> Result<(), ParseError> {
        let (name, contents) = read_attribute(reader, pool)?;
        let mut contents = contents.as_slice();
        let reader = &mut contents;
        match name.as_str() {
            "SourceFile" => {
                let index: u16 = reader.parse()?;
                self.source_file = Some(pool.get_str(index)?.to_owned());
            }
            "Signature" => {
                let index: u16 = reader.parse()?;
                self.signature = Some(pool.get_str(index)?.to_owned());
            }
            "InnerClasses" => {
                let count: u16 = reader.parse()?;
                for _ in 0..count {
                    let inner_index: u16 = reader.parse()?;
                    let outer_index: u16 = reader.parse()?;
                    let name_index: u16 = reader.parse()?;
                    let access: u16 = reader.parse()?;
                    self.inner_classes.push(InnerClass {
                        inner: pool.get_class_name(inner_index)?,
                        outer: if outer_index == 0 {
                            None
                        } else {
                            Some(pool.get_class_name(outer_index)?)
                        },
                        inner_name: if name_index == 0 {
                            None
                        } else {
                            Some(pool.get_str(name_index)?.to_owned())
                        },
                        access,
                    });
                }
            }
            "RuntimeVisibleAnnotations" => {
                self.annotations = parse_annotations(reader, pool)?;
            }
            "RuntimeInvisibleAnnotations" => {
                self.invisible_annotations = parse_annotations(reader, pool)?;
            }
            "BootstrapMethods" => {
                let count: u16 = reader.parse()?;
                for _ in 0..count {
                    let handle_index: u16 = reader.parse()?;
                    let handle = pool.get_method_handle(handle_index)?;
                    let argument_count: u16 = reader.parse()?;
                    let arguments = (0..argument_count)
                        .map(|_| {
                            let index: u16 = reader.parse()?;
                            pool.get_constant_value(index)
                        })
                        .collect::<Result<_, _>>()?;
                    self.bootstrap_methods.push(BootstrapMethod { handle, arguments });
                }
            }
            "Synthetic" => self.is_synthetic = true,
            "Deprecated" => self.is_deprecated = true,
            _ => {}
        }
        Ok(())
    }
}

impl Field {
    fn parse<R: Read + ?Sized>(reader: &mut R, pool: &ConstantPool) -> Result<Self, ParseError> {
        let access_bits: u16 = reader.parse()?;
        let access = FieldAccess::from_bits(access_bits).ok_or(ParseError::UnknownFlags {
            target: "field",
            flags: access_bits,
        })?;
        let name_index: u16 = reader.parse()?;
        let name = pool.get_str(name_index)?.to_owned();
        let descriptor_index: u16 = reader.parse()?;
        let descriptor = pool.get_str(descriptor_index)?.to_owned();
        descriptor.parse::<FieldType>()?;

        let mut field = Field {
            access,
            name,
            descriptor,
            signature: None,
            constant_value: None,
            annotations: Vec::new(),
            invisible_annotations: Vec::new(),
            is_synthetic: false,
            is_deprecated: false,
        };
        let attribute_count: u16 = reader.parse()?;
        for _ in 0..attribute_count {
            let (name, contents) = read_attribute(reader, pool)?;
            let mut contents = contents.as_slice();
            let reader = &mut contents;
            match name.as_str() {
                "ConstantValue" => {
                    let index: u16 = reader.parse()?;
                    field.constant_value = Some(pool.get_constant_value(index)?);
                }
                "Signature" => {
                    let index: u16 = reader.parse()?;
                    field.signature = Some(pool.get_str(index)?.to_owned());
                }
                "RuntimeVisibleAnnotations" => {
                    field.annotations = parse_annotations(reader, pool)?;
                }
                "RuntimeInvisibleAnnotations" => {
                    field.invisible_annotations = parse_annotations(reader, pool)?;
                }
                "Synthetic" => field.is_synthetic = true,
                "Deprecated" => field.is_deprecated = true,
                _ => {}
            }
        }
        Ok(field)
    }
}

impl Method {
    fn parse<R: Read + ?Sized>(reader: &mut R, pool: &ConstantPool) -> Result<Self, ParseError> {
        let access_bits: u16 = reader.parse()?;
        let access = MethodAccess::from_bits(access_bits).ok_or(ParseError::UnknownFlags {
            target: "method",
            flags: access_bits,
        })?;
        let name_index: u16 = reader.parse()?;
        let name = pool.get_str(name_index)?.to_owned();
        let descriptor_index: u16 = reader.parse()?;
        let descriptor = pool.get_str(descriptor_index)?.to_owned();
        descriptor.parse::<MethodDescriptor>()?;

        let mut method = Method {
            access,
            name,
            descriptor,
            signature: None,
            exceptions: Vec::new(),
            annotations: Vec::new(),
            invisible_annotations: Vec::new(),
            code: None,
            is_synthetic: false,
            is_deprecated: false,
        };
        let attribute_count: u16 = reader.parse()?;
        for _ in 0..attribute_count {
            let (name, contents) = read_attribute(reader, pool)?;
            let mut contents = contents.as_slice();
            let reader = &mut contents;
            match name.as_str() {
                "Code" => {
                    method.code = Some(code::parse_code(reader, pool)?);
                }
                "Exceptions" => {
                    let count: u16 = reader.parse()?;
                    method.exceptions = (0..count)
                        .map(|_| {
                            let index: u16 = reader.parse()?;
                            pool.get_class_name(index)
                        })
                        .collect::<Result<_, _>>()?;
                }
                "Signature" => {
                    let index: u16 = reader.parse()?;
                    method.signature = Some(pool.get_str(index)?.to_owned());
                }
                "RuntimeVisibleAnnotations" => {
                    method.annotations = parse_annotations(reader, pool)?;
                }
                "RuntimeInvisibleAnnotations" => {
                    method.invisible_annotations = parse_annotations(reader, pool)?;
                }
                "Synthetic" => method.is_synthetic = true,
                "Deprecated" => method.is_deprecated = true,
                _ => {}
            }
        }
        Ok(method)
    }
}

/// Reads one attribute header and its contents.
fn read_attribute<R: Read + ?Sized>(
    reader: &mut R,
    pool: &ConstantPool,
) -> Result<(String, Vec<u8>), ParseError> {
    let name_index: u16 = reader.parse()?;
    let name = pool.get_str(name_index)?.to_owned();
    let length: u32 = reader.parse()?;
    let mut contents = vec![0u8; length as usize];
    reader.read_exact(&mut contents)?;
    Ok((name, contents))
}

fn parse_annotations<R: Read + ?Sized>(
    reader: &mut R,
    pool: &ConstantPool,
) -> Result<Vec<Annotation>, ParseError> {
    let count: u16 = reader.parse()?;
    (0..count).map(|_| parse_annotation(reader, pool)).collect()
}

fn parse_annotation<R: Read + ?Sized>(
    reader: &mut R,
    pool: &ConstantPool,
) -> Result<Annotation, ParseError> {
    let type_index: u16 = reader.parse()?;
    let type_descriptor = pool.get_str(type_index)?.to_owned();
    let pair_count: u16 = reader.parse()?;
    let elements = (0..pair_count)
        .map(|_| {
            let name_index: u16 = reader.parse()?;
            let name = pool.get_str(name_index)?.to_owned();
            let value = parse_element_value(reader, pool)?;
            Ok((name, value))
        })
        .collect::<Result<_, ParseError>>()?;
    Ok(Annotation {
        type_descriptor,
        elements,
    })
}

fn parse_element_value<R: Read + ?Sized>(
    reader: &mut R,
    pool: &ConstantPool,
) -> Result<ElementValue, ParseError> {
    let tag: u8 = reader.parse()?;
    let value = match tag {
        b'B' | b'C' | b'I' | b'S' | b'Z' | b'D' | b'F' | b'J' => {
            let index: u16 = reader.parse()?;
            ElementValue::Constant(char::from(tag), pool.get_constant_value(index)?)
        }
        b's' => {
            let index: u16 = reader.parse()?;
            ElementValue::Constant('s', ConstantValue::string(pool.get_str(index)?))
        }
        b'e' => {
            let type_index: u16 = reader.parse()?;
            let const_index: u16 = reader.parse()?;
            ElementValue::EnumConstant {
                type_descriptor: pool.get_str(type_index)?.to_owned(),
                const_name: pool.get_str(const_index)?.to_owned(),
            }
        }
        b'c' => {
            let index: u16 = reader.parse()?;
            ElementValue::Class {
                descriptor: pool.get_str(index)?.to_owned(),
            }
        }
        b'@' => ElementValue::Nested(parse_annotation(reader, pool)?),
        b'[' => {
            let count: u16 = reader.parse()?;
            let values = (0..count)
                .map(|_| parse_element_value(reader, pool))
                .collect::<Result<_, _>>()?;
            ElementValue::Array(values)
        }
        other => {
            return Err(ParseError::Malformed(format!(
                "unknown element value tag {}",
                char::from(other)
            )));
        }
    };
    Ok(value)
}
