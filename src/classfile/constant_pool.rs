//! The class-file constant pool: typed entries, loadable constants, and the
//! deduplicating interning used when a merged class is written back out.

use std::{
    collections::HashMap,
    fmt::Display,
    io::{self, Read, Write},
};

use super::{FieldRef, MethodRef, reader::ParseError, writer::GenerationError};

/// A string from the constant pool. Class files encode strings in modified
/// UTF-8 and may legally contain byte sequences with no UTF-8 reading; those
/// are preserved verbatim so they survive a rewrite.
#[derive(Debug, PartialEq, Eq, Hash, Clone)]
pub enum JavaString {
    /// A string with a valid UTF-8 reading.
    Utf8(String),
    /// Raw modified UTF-8 bytes without a valid reading.
    InvalidUtf8(Vec<u8>),
}

impl JavaString {
    /// Returns the UTF-8 reading, if there is one.
    #[must_use]
    pub fn as_utf8(&self) -> Option<&str> {
        match self {
            Self::Utf8(it) => Some(it),
            Self::InvalidUtf8(_) => None,
        }
    }
}

impl From<&str> for JavaString {
    fn from(value: &str) -> Self {
        Self::Utf8(value.to_owned())
    }
}

impl Display for JavaString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Utf8(it) => write!(f, "{it}"),
            Self::InvalidUtf8(bytes) => write!(f, "<invalid utf-8: {} bytes>", bytes.len()),
        }
    }
}

/// A constant that can be loaded by `ldc`/`ldc2_w` or used as a field
/// initializer or bootstrap argument.
///
/// Floating point constants are stored as raw IEEE 754 bits: the pool must
/// deduplicate and re-emit them bit-exactly, including NaN payloads.
#[derive(Debug, PartialEq, Eq, Hash, Clone)]
pub enum ConstantValue {
    /// An `int` constant.
    Integer(i32),
    /// A `float` constant, as raw bits.
    Float(u32),
    /// A `long` constant.
    Long(i64),
    /// A `double` constant, as raw bits.
    Double(u64),
    /// A string constant.
    String(JavaString),
    /// A class literal, as internal name or array descriptor.
    Class(String),
    /// A method type constant.
    MethodType(String),
    /// A method handle constant.
    Handle(MethodHandle),
    /// A dynamically-computed constant.
    Dynamic {
        /// Index into the bootstrap methods table.
        bootstrap_index: u16,
        /// The name from the name-and-type.
        name: String,
        /// The field descriptor of the constant.
        descriptor: String,
    },
}

impl ConstantValue {
    /// Wraps a `float`, preserving its exact bits.
    #[must_use]
    pub fn float(value: f32) -> Self {
        Self::Float(value.to_bits())
    }

    /// Wraps a `double`, preserving its exact bits.
    #[must_use]
    pub fn double(value: f64) -> Self {
        Self::Double(value.to_bits())
    }

    /// Wraps a string constant.
    #[must_use]
    pub fn string<S: Into<String>>(value: S) -> Self {
        Self::String(JavaString::Utf8(value.into()))
    }

    /// Checks whether the constant occupies two pool slots and must be
    /// loaded with `ldc2_w`.
    #[must_use]
    pub const fn is_wide(&self) -> bool {
        matches!(self, Self::Long(_) | Self::Double(_))
    }
}

/// A method handle constant.
#[derive(Debug, PartialEq, Eq, Hash, Clone)]
pub enum MethodHandle {
    /// Reads an instance field.
    GetField(FieldRef),
    /// Reads a static field.
    GetStatic(FieldRef),
    /// Writes an instance field.
    PutField(FieldRef),
    /// Writes a static field.
    PutStatic(FieldRef),
    /// Invokes an instance method.
    InvokeVirtual(MethodRef),
    /// Invokes a static method.
    InvokeStatic {
        /// The referenced method.
        method: MethodRef,
        /// Whether the owner is an interface.
        interface: bool,
    },
    /// Invokes a method with `invokespecial` semantics.
    InvokeSpecial {
        /// The referenced method.
        method: MethodRef,
        /// Whether the owner is an interface.
        interface: bool,
    },
    /// Constructs an instance (`new` followed by `<init>`).
    NewInvokeSpecial(MethodRef),
    /// Invokes an interface method.
    InvokeInterface(MethodRef),
}

impl MethodHandle {
    /// The `reference_kind` byte of the handle.
    #[must_use]
    pub const fn kind(&self) -> u8 {
        match self {
            Self::GetField(_) => 1,
            Self::GetStatic(_) => 2,
            Self::PutField(_) => 3,
            Self::PutStatic(_) => 4,
            Self::InvokeVirtual(_) => 5,
            Self::InvokeStatic { .. } => 6,
            Self::InvokeSpecial { .. } => 7,
            Self::NewInvokeSpecial(_) => 8,
            Self::InvokeInterface(_) => 9,
        }
    }

    /// The referenced method, for method-kind handles.
    #[must_use]
    pub const fn method(&self) -> Option<&MethodRef> {
        match self {
            Self::InvokeVirtual(m)
            | Self::InvokeStatic { method: m, .. }
            | Self::InvokeSpecial { method: m, .. }
            | Self::NewInvokeSpecial(m)
            | Self::InvokeInterface(m) => Some(m),
            _ => None,
        }
    }

    /// The referenced method, mutably.
    pub const fn method_mut(&mut self) -> Option<&mut MethodRef> {
        match self {
            Self::InvokeVirtual(m)
            | Self::InvokeStatic { method: m, .. }
            | Self::InvokeSpecial { method: m, .. }
            | Self::NewInvokeSpecial(m)
            | Self::InvokeInterface(m) => Some(m),
            _ => None,
        }
    }
}

mod tag {
    pub const UTF8: u8 = 1;
    pub const INTEGER: u8 = 3;
    pub const FLOAT: u8 = 4;
    pub const LONG: u8 = 5;
    pub const DOUBLE: u8 = 6;
    pub const CLASS: u8 = 7;
    pub const STRING: u8 = 8;
    pub const FIELD_REF: u8 = 9;
    pub const METHOD_REF: u8 = 10;
    pub const INTERFACE_METHOD_REF: u8 = 11;
    pub const NAME_AND_TYPE: u8 = 12;
    pub const METHOD_HANDLE: u8 = 15;
    pub const METHOD_TYPE: u8 = 16;
    pub const DYNAMIC: u8 = 17;
    pub const INVOKE_DYNAMIC: u8 = 18;
    pub const MODULE: u8 = 19;
    pub const PACKAGE: u8 = 20;
}

/// A raw constant pool entry, with unresolved cross-references.
#[derive(Debug, PartialEq, Eq, Hash, Clone)]
pub enum Entry {
    /// A modified UTF-8 string.
    Utf8(JavaString),
    /// An `int`.
    Integer(i32),
    /// A `float`, as raw bits.
    Float(u32),
    /// A `long`.
    Long(i64),
    /// A `double`, as raw bits.
    Double(u64),
    /// A class reference.
    Class {
        /// Index of the name.
        name_index: u16,
    },
    /// A string constant.
    String {
        /// Index of the contents.
        string_index: u16,
    },
    /// A field reference.
    FieldRef {
        /// Index of the owner class.
        class_index: u16,
        /// Index of the name-and-type.
        name_and_type_index: u16,
    },
    /// A class method reference.
    MethodRef {
        /// Index of the owner class.
        class_index: u16,
        /// Index of the name-and-type.
        name_and_type_index: u16,
    },
    /// An interface method reference.
    InterfaceMethodRef {
        /// Index of the owner class.
        class_index: u16,
        /// Index of the name-and-type.
        name_and_type_index: u16,
    },
    /// A name and descriptor pair.
    NameAndType {
        /// Index of the name.
        name_index: u16,
        /// Index of the descriptor.
        descriptor_index: u16,
    },
    /// A method handle.
    MethodHandle {
        /// The reference kind (1–9).
        kind: u8,
        /// Index of the referenced member.
        reference_index: u16,
    },
    /// A method type.
    MethodType {
        /// Index of the descriptor.
        descriptor_index: u16,
    },
    /// A dynamically-computed constant.
    Dynamic {
        /// Index into the bootstrap methods table.
        bootstrap_method_index: u16,
        /// Index of the name-and-type.
        name_and_type_index: u16,
    },
    /// An `invokedynamic` call site.
    InvokeDynamic {
        /// Index into the bootstrap methods table.
        bootstrap_method_index: u16,
        /// Index of the name-and-type.
        name_and_type_index: u16,
    },
    /// A module reference. Parsed for completeness; never written.
    Module {
        /// Index of the name.
        name_index: u16,
    },
    /// A package reference. Parsed for completeness; never written.
    Package {
        /// Index of the name.
        name_index: u16,
    },
}

impl Entry {
    /// Checks whether the entry occupies two pool slots.
    #[must_use]
    pub const fn is_wide(&self) -> bool {
        matches!(self, Self::Long(_) | Self::Double(_))
    }

    /// The human-readable kind of the entry, for diagnostics.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Utf8(_) => "Utf8",
            Self::Integer(_) => "Integer",
            Self::Float(_) => "Float",
            Self::Long(_) => "Long",
            Self::Double(_) => "Double",
            Self::Class { .. } => "Class",
            Self::String { .. } => "String",
            Self::FieldRef { .. } => "Fieldref",
            Self::MethodRef { .. } => "Methodref",
            Self::InterfaceMethodRef { .. } => "InterfaceMethodref",
            Self::NameAndType { .. } => "NameAndType",
            Self::MethodHandle { .. } => "MethodHandle",
            Self::MethodType { .. } => "MethodType",
            Self::Dynamic { .. } => "Dynamic",
            Self::InvokeDynamic { .. } => "InvokeDynamic",
            Self::Module { .. } => "Module",
            Self::Package { .. } => "Package",
        }
    }
}

/// A class-file constant pool.
///
/// Index 0 is unusable, and `Long`/`Double` entries occupy two indices; both
/// quirks are modeled by `None` slots.
#[derive(Debug, Clone, Default)]
pub struct ConstantPool {
    slots: Vec<Option<Entry>>,
    intern: HashMap<Entry, u16>,
}

impl ConstantPool {
    /// Creates an empty pool.
    #[must_use]
    pub fn new() -> Self {
        Self {
            slots: vec![None],
            intern: HashMap::new(),
        }
    }

    /// The number of slots, as written in the `constant_pool_count` field.
    #[must_use]
    pub fn count(&self) -> usize {
        self.slots.len()
    }

    /// Reads a pool with the given slot count from `reader`.
    pub(super) fn from_reader<R: Read + ?Sized>(
        reader: &mut R,
        count: u16,
    ) -> Result<Self, ParseError> {
        let mut slots = vec![None];
        while slots.len() < usize::from(count) {
            let entry = Entry::from_reader(reader)?;
            let wide = entry.is_wide();
            slots.push(Some(entry));
            if wide {
                slots.push(None);
            }
        }
        Ok(Self {
            slots,
            intern: HashMap::new(),
        })
    }

    /// Writes the pool, preceded by its slot count.
    pub(super) fn to_writer<W: Write + ?Sized>(&self, writer: &mut W) -> Result<(), GenerationError> {
        let count = u16::try_from(self.slots.len()).map_err(|_| GenerationError::PoolOverflow)?;
        writer.write_all(&count.to_be_bytes())?;
        for entry in self.slots.iter().flatten() {
            entry.to_writer(writer)?;
        }
        Ok(())
    }

    fn get_entry(&self, index: u16) -> Result<&Entry, ParseError> {
        self.slots
            .get(usize::from(index))
            .and_then(Option::as_ref)
            .ok_or(ParseError::BadPoolIndex(index))
    }

    fn mismatch<T>(expected: &'static str, entry: &Entry) -> Result<T, ParseError> {
        Err(ParseError::Malformed(format!(
            "expected a {expected} constant, found {}",
            entry.kind()
        )))
    }

    /// Resolves a UTF-8 entry, requiring a valid reading.
    pub fn get_str(&self, index: u16) -> Result<&str, ParseError> {
        match self.get_entry(index)? {
            Entry::Utf8(JavaString::Utf8(it)) => Ok(it),
            Entry::Utf8(JavaString::InvalidUtf8(_)) => Err(ParseError::Malformed(
                "string constant without a UTF-8 reading used as a name".into(),
            )),
            it => Self::mismatch("Utf8", it),
        }
    }

    /// Resolves a class entry into an internal name.
    pub fn get_class_name(&self, index: u16) -> Result<String, ParseError> {
        match self.get_entry(index)? {
            Entry::Class { name_index } => Ok(self.get_str(*name_index)?.to_owned()),
            it => Self::mismatch("Class", it),
        }
    }

    /// Resolves a name-and-type entry.
    pub fn get_name_and_type(&self, index: u16) -> Result<(String, String), ParseError> {
        match self.get_entry(index)? {
            Entry::NameAndType {
                name_index,
                descriptor_index,
            } => Ok((
                self.get_str(*name_index)?.to_owned(),
                self.get_str(*descriptor_index)?.to_owned(),
            )),
            it => Self::mismatch("NameAndType", it),
        }
    }

    /// Resolves a field reference.
    pub fn get_field_ref(&self, index: u16) -> Result<FieldRef, ParseError> {
        match self.get_entry(index)? {
            Entry::FieldRef {
                class_index,
                name_and_type_index,
            } => {
                let owner = self.get_class_name(*class_index)?;
                let (name, descriptor) = self.get_name_and_type(*name_and_type_index)?;
                Ok(FieldRef {
                    owner,
                    name,
                    descriptor,
                })
            }
            it => Self::mismatch("Fieldref", it),
        }
    }

    /// Resolves a method reference; the boolean is `true` for
    /// `InterfaceMethodref` entries.
    pub fn get_method_ref(&self, index: u16) -> Result<(MethodRef, bool), ParseError> {
        let (class_index, name_and_type_index, interface) = match self.get_entry(index)? {
            Entry::MethodRef {
                class_index,
                name_and_type_index,
            } => (*class_index, *name_and_type_index, false),
            Entry::InterfaceMethodRef {
                class_index,
                name_and_type_index,
            } => (*class_index, *name_and_type_index, true),
            it => return Self::mismatch("Methodref", it),
        };
        let owner = self.get_class_name(class_index)?;
        let (name, descriptor) = self.get_name_and_type(name_and_type_index)?;
        Ok((
            MethodRef {
                owner,
                name,
                descriptor,
            },
            interface,
        ))
    }

    /// Resolves a method handle.
    pub fn get_method_handle(&self, index: u16) -> Result<MethodHandle, ParseError> {
        let Entry::MethodHandle {
            kind,
            reference_index,
        } = self.get_entry(index)?
        else {
            return Self::mismatch("MethodHandle", self.get_entry(index)?);
        };
        let handle = match *kind {
            1 => MethodHandle::GetField(self.get_field_ref(*reference_index)?),
            2 => MethodHandle::GetStatic(self.get_field_ref(*reference_index)?),
            3 => MethodHandle::PutField(self.get_field_ref(*reference_index)?),
            4 => MethodHandle::PutStatic(self.get_field_ref(*reference_index)?),
            5 => MethodHandle::InvokeVirtual(self.get_method_ref(*reference_index)?.0),
            6 => {
                let (method, interface) = self.get_method_ref(*reference_index)?;
                MethodHandle::InvokeStatic { method, interface }
            }
            7 => {
                let (method, interface) = self.get_method_ref(*reference_index)?;
                MethodHandle::InvokeSpecial { method, interface }
            }
            8 => MethodHandle::NewInvokeSpecial(self.get_method_ref(*reference_index)?.0),
            9 => MethodHandle::InvokeInterface(self.get_method_ref(*reference_index)?.0),
            other => {
                return Err(ParseError::Malformed(format!(
                    "invalid method handle kind {other}"
                )));
            }
        };
        Ok(handle)
    }

    /// Resolves an `invokedynamic` call-site entry into its bootstrap index,
    /// name, and descriptor.
    pub fn get_invoke_dynamic(&self, index: u16) -> Result<(u16, String, String), ParseError> {
        match self.get_entry(index)? {
            Entry::InvokeDynamic {
                bootstrap_method_index,
                name_and_type_index,
            } => {
                let (name, descriptor) = self.get_name_and_type(*name_and_type_index)?;
                Ok((*bootstrap_method_index, name, descriptor))
            }
            it => Self::mismatch("InvokeDynamic", it),
        }
    }

    /// Resolves any loadable constant.
    pub fn get_constant_value(&self, index: u16) -> Result<ConstantValue, ParseError> {
        let value = match self.get_entry(index)? {
            Entry::Integer(it) => ConstantValue::Integer(*it),
            Entry::Float(bits) => ConstantValue::Float(*bits),
            Entry::Long(it) => ConstantValue::Long(*it),
            Entry::Double(bits) => ConstantValue::Double(*bits),
            Entry::String { string_index } => match self.get_entry(*string_index)? {
                Entry::Utf8(it) => ConstantValue::String(it.clone()),
                it => return Self::mismatch("Utf8", it),
            },
            Entry::Class { name_index } => {
                ConstantValue::Class(self.get_str(*name_index)?.to_owned())
            }
            Entry::MethodType { descriptor_index } => {
                ConstantValue::MethodType(self.get_str(*descriptor_index)?.to_owned())
            }
            Entry::MethodHandle { .. } => ConstantValue::Handle(self.get_method_handle(index)?),
            Entry::Dynamic {
                bootstrap_method_index,
                name_and_type_index,
            } => {
                let (name, descriptor) = self.get_name_and_type(*name_and_type_index)?;
                ConstantValue::Dynamic {
                    bootstrap_index: *bootstrap_method_index,
                    name,
                    descriptor,
                }
            }
            it => return Self::mismatch("loadable constant", it),
        };
        Ok(value)
    }

    fn put_entry(&mut self, entry: Entry) -> Result<u16, GenerationError> {
        if let Some(&index) = self.intern.get(&entry) {
            return Ok(index);
        }
        let index = u16::try_from(self.slots.len()).map_err(|_| GenerationError::PoolOverflow)?;
        let wide = entry.is_wide();
        self.intern.insert(entry.clone(), index);
        self.slots.push(Some(entry));
        if wide {
            self.slots.push(None);
        }
        Ok(index)
    }

    /// Interns a UTF-8 string.
    pub fn put_utf8<S: Into<String>>(&mut self, value: S) -> Result<u16, GenerationError> {
        self.put_entry(Entry::Utf8(JavaString::Utf8(value.into())))
    }

    /// Interns a class entry for the given internal name.
    pub fn put_class(&mut self, name: &str) -> Result<u16, GenerationError> {
        let name_index = self.put_utf8(name)?;
        self.put_entry(Entry::Class { name_index })
    }

    /// Interns a name-and-type entry.
    pub fn put_name_and_type(&mut self, name: &str, descriptor: &str) -> Result<u16, GenerationError> {
        let name_index = self.put_utf8(name)?;
        let descriptor_index = self.put_utf8(descriptor)?;
        self.put_entry(Entry::NameAndType {
            name_index,
            descriptor_index,
        })
    }

    /// Interns a field reference.
    pub fn put_field_ref(&mut self, field: &FieldRef) -> Result<u16, GenerationError> {
        let class_index = self.put_class(&field.owner)?;
        let name_and_type_index = self.put_name_and_type(&field.name, &field.descriptor)?;
        self.put_entry(Entry::FieldRef {
            class_index,
            name_and_type_index,
        })
    }

    /// Interns a method reference, as `InterfaceMethodref` when `interface`.
    pub fn put_method_ref(
        &mut self,
        method: &MethodRef,
        interface: bool,
    ) -> Result<u16, GenerationError> {
        let class_index = self.put_class(&method.owner)?;
        let name_and_type_index = self.put_name_and_type(&method.name, &method.descriptor)?;
        let entry = if interface {
            Entry::InterfaceMethodRef {
                class_index,
                name_and_type_index,
            }
        } else {
            Entry::MethodRef {
                class_index,
                name_and_type_index,
            }
        };
        self.put_entry(entry)
    }

    /// Interns a method handle.
    pub fn put_method_handle(&mut self, handle: &MethodHandle) -> Result<u16, GenerationError> {
        let reference_index = match handle {
            MethodHandle::GetField(f)
            | MethodHandle::GetStatic(f)
            | MethodHandle::PutField(f)
            | MethodHandle::PutStatic(f) => self.put_field_ref(f)?,
            MethodHandle::InvokeVirtual(m) | MethodHandle::NewInvokeSpecial(m) => {
                self.put_method_ref(m, false)?
            }
            MethodHandle::InvokeStatic { method, interface }
            | MethodHandle::InvokeSpecial { method, interface } => {
                self.put_method_ref(method, *interface)?
            }
            MethodHandle::InvokeInterface(m) => self.put_method_ref(m, true)?,
        };
        self.put_entry(Entry::MethodHandle {
            kind: handle.kind(),
            reference_index,
        })
    }

    /// Interns an `invokedynamic` call-site entry.
    pub fn put_invoke_dynamic(
        &mut self,
        bootstrap_index: u16,
        name: &str,
        descriptor: &str,
    ) -> Result<u16, GenerationError> {
        let name_and_type_index = self.put_name_and_type(name, descriptor)?;
        self.put_entry(Entry::InvokeDynamic {
            bootstrap_method_index: bootstrap_index,
            name_and_type_index,
        })
    }

    /// Interns any loadable constant.
    pub fn put_constant_value(&mut self, value: &ConstantValue) -> Result<u16, GenerationError> {
        match value {
            ConstantValue::Integer(it) => self.put_entry(Entry::Integer(*it)),
            ConstantValue::Float(bits) => self.put_entry(Entry::Float(*bits)),
            ConstantValue::Long(it) => self.put_entry(Entry::Long(*it)),
            ConstantValue::Double(bits) => self.put_entry(Entry::Double(*bits)),
            ConstantValue::String(it) => {
                let string_index = self.put_entry(Entry::Utf8(it.clone()))?;
                self.put_entry(Entry::String { string_index })
            }
            ConstantValue::Class(name) => self.put_class(name),
            ConstantValue::MethodType(descriptor) => {
                let descriptor_index = self.put_utf8(descriptor.as_str())?;
                self.put_entry(Entry::MethodType { descriptor_index })
            }
            ConstantValue::Handle(handle) => self.put_method_handle(handle),
            ConstantValue::Dynamic {
                bootstrap_index,
                name,
                descriptor,
            } => {
                let name_and_type_index = self.put_name_and_type(name, descriptor)?;
                self.put_entry(Entry::Dynamic {
                    bootstrap_method_index: *bootstrap_index,
                    name_and_type_index,
                })
            }
        }
    }
}

impl Entry {
    fn from_reader<R: Read + ?Sized>(reader: &mut R) -> Result<Self, ParseError> {
        let mut tag_buf = [0u8];
        reader.read_exact(&mut tag_buf)?;
        let read_u16 = |reader: &mut R| -> io::Result<u16> {
            let mut buf = [0u8; 2];
            reader.read_exact(&mut buf)?;
            Ok(u16::from_be_bytes(buf))
        };
        let entry = match tag_buf[0] {
            tag::UTF8 => {
                let length = read_u16(reader)?;
                let mut bytes = vec![0u8; usize::from(length)];
                reader.read_exact(&mut bytes)?;
                let string = match cesu8::from_java_cesu8(&bytes) {
                    Ok(it) => JavaString::Utf8(it.into_owned()),
                    Err(_) => JavaString::InvalidUtf8(bytes),
                };
                Self::Utf8(string)
            }
            tag::INTEGER => {
                let mut buf = [0u8; 4];
                reader.read_exact(&mut buf)?;
                Self::Integer(i32::from_be_bytes(buf))
            }
            tag::FLOAT => {
                let mut buf = [0u8; 4];
                reader.read_exact(&mut buf)?;
                Self::Float(u32::from_be_bytes(buf))
            }
            tag::LONG => {
                let mut buf = [0u8; 8];
                reader.read_exact(&mut buf)?;
                Self::Long(i64::from_be_bytes(buf))
            }
            tag::DOUBLE => {
                let mut buf = [0u8; 8];
                reader.read_exact(&mut buf)?;
                Self::Double(u64::from_be_bytes(buf))
            }
            tag::CLASS => Self::Class {
                name_index: read_u16(reader)?,
            },
            tag::STRING => Self::String {
                string_index: read_u16(reader)?,
            },
            tag::FIELD_REF => Self::FieldRef {
                class_index: read_u16(reader)?,
                name_and_type_index: read_u16(reader)?,
            },
            tag::METHOD_REF => Self::MethodRef {
                class_index: read_u16(reader)?,
                name_and_type_index: read_u16(reader)?,
            },
            tag::INTERFACE_METHOD_REF => Self::InterfaceMethodRef {
                class_index: read_u16(reader)?,
                name_and_type_index: read_u16(reader)?,
            },
            tag::NAME_AND_TYPE => Self::NameAndType {
                name_index: read_u16(reader)?,
                descriptor_index: read_u16(reader)?,
            },
            tag::METHOD_HANDLE => {
                let mut kind_buf = [0u8];
                reader.read_exact(&mut kind_buf)?;
                Self::MethodHandle {
                    kind: kind_buf[0],
                    reference_index: read_u16(reader)?,
                }
            }
            tag::METHOD_TYPE => Self::MethodType {
                descriptor_index: read_u16(reader)?,
            },
            tag::DYNAMIC => Self::Dynamic {
                bootstrap_method_index: read_u16(reader)?,
                name_and_type_index: read_u16(reader)?,
            },
            tag::INVOKE_DYNAMIC => Self::InvokeDynamic {
                bootstrap_method_index: read_u16(reader)?,
                name_and_type_index: read_u16(reader)?,
            },
            tag::MODULE => Self::Module {
                name_index: read_u16(reader)?,
            },
            tag::PACKAGE => Self::Package {
                name_index: read_u16(reader)?,
            },
            other => return Err(ParseError::Malformed(format!("unknown pool tag {other}"))),
        };
        Ok(entry)
    }

    fn to_writer<W: Write + ?Sized>(&self, writer: &mut W) -> Result<(), GenerationError> {
        match self {
            Self::Utf8(string) => {
                writer.write_all(&[tag::UTF8])?;
                let bytes = match string {
                    JavaString::Utf8(it) => cesu8::to_java_cesu8(it).into_owned(),
                    JavaString::InvalidUtf8(bytes) => bytes.clone(),
                };
                let length =
                    u16::try_from(bytes.len()).map_err(|_| GenerationError::PoolOverflow)?;
                writer.write_all(&length.to_be_bytes())?;
                writer.write_all(&bytes)?;
            }
            Self::Integer(it) => {
                writer.write_all(&[tag::INTEGER])?;
                writer.write_all(&it.to_be_bytes())?;
            }
            Self::Float(bits) => {
                writer.write_all(&[tag::FLOAT])?;
                writer.write_all(&bits.to_be_bytes())?;
            }
            Self::Long(it) => {
                writer.write_all(&[tag::LONG])?;
                writer.write_all(&it.to_be_bytes())?;
            }
            Self::Double(bits) => {
                writer.write_all(&[tag::DOUBLE])?;
                writer.write_all(&bits.to_be_bytes())?;
            }
            Self::Class { name_index } => {
                writer.write_all(&[tag::CLASS])?;
                writer.write_all(&name_index.to_be_bytes())?;
            }
            Self::String { string_index } => {
                writer.write_all(&[tag::STRING])?;
                writer.write_all(&string_index.to_be_bytes())?;
            }
            Self::FieldRef {
                class_index,
                name_and_type_index,
            } => {
                writer.write_all(&[tag::FIELD_REF])?;
                writer.write_all(&class_index.to_be_bytes())?;
                writer.write_all(&name_and_type_index.to_be_bytes())?;
            }
            Self::MethodRef {
                class_index,
                name_and_type_index,
            } => {
                writer.write_all(&[tag::METHOD_REF])?;
                writer.write_all(&class_index.to_be_bytes())?;
                writer.write_all(&name_and_type_index.to_be_bytes())?;
            }
            Self::InterfaceMethodRef {
                class_index,
                name_and_type_index,
            } => {
                writer.write_all(&[tag::INTERFACE_METHOD_REF])?;
                writer.write_all(&class_index.to_be_bytes())?;
                writer.write_all(&name_and_type_index.to_be_bytes())?;
            }
            Self::NameAndType {
                name_index,
                descriptor_index,
            } => {
                writer.write_all(&[tag::NAME_AND_TYPE])?;
                writer.write_all(&name_index.to_be_bytes())?;
                writer.write_all(&descriptor_index.to_be_bytes())?;
            }
            Self::MethodHandle {
                kind,
                reference_index,
            } => {
                writer.write_all(&[tag::METHOD_HANDLE, *kind])?;
                writer.write_all(&reference_index.to_be_bytes())?;
            }
            Self::MethodType { descriptor_index } => {
                writer.write_all(&[tag::METHOD_TYPE])?;
                writer.write_all(&descriptor_index.to_be_bytes())?;
            }
            Self::Dynamic {
                bootstrap_method_index,
                name_and_type_index,
            } => {
                writer.write_all(&[tag::DYNAMIC])?;
                writer.write_all(&bootstrap_method_index.to_be_bytes())?;
                writer.write_all(&name_and_type_index.to_be_bytes())?;
            }
            Self::InvokeDynamic {
                bootstrap_method_index,
                name_and_type_index,
            } => {
                writer.write_all(&[tag::INVOKE_DYNAMIC])?;
                writer.write_all(&bootstrap_method_index.to_be_bytes())?;
                writer.write_all(&name_and_type_index.to_be_bytes())?;
            }
            Self::Module { name_index } => {
                writer.write_all(&[tag::MODULE])?;
                writer.write_all(&name_index.to_be_bytes())?;
            }
            Self::Package { name_index } => {
                writer.write_all(&[tag::PACKAGE])?;
                writer.write_all(&name_index.to_be_bytes())?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interning_deduplicates() {
        let mut pool = ConstantPool::new();
        let a = pool.put_utf8("hello").unwrap();
        let b = pool.put_utf8("hello").unwrap();
        assert_eq!(a, b);
        assert_eq!(pool.count(), 2);
    }

    #[test]
    fn wide_entries_take_two_slots() {
        let mut pool = ConstantPool::new();
        let index = pool.put_constant_value(&ConstantValue::Long(42)).unwrap();
        assert_eq!(index, 1);
        let next = pool.put_utf8("after").unwrap();
        assert_eq!(next, 3);
    }

    #[test]
    fn pool_round_trip() {
        let mut pool = ConstantPool::new();
        let class_index = pool.put_class("com/example/Widget").unwrap();
        let field_index = pool
            .put_field_ref(&FieldRef {
                owner: "com/example/Widget".into(),
                name: "count".into(),
                descriptor: "I".into(),
            })
            .unwrap();
        pool.put_constant_value(&ConstantValue::double(1.5)).unwrap();

        let mut bytes = Vec::new();
        pool.to_writer(&mut bytes).unwrap();

        let mut reader = bytes.as_slice();
        let mut count_buf = [0u8; 2];
        std::io::Read::read_exact(&mut reader, &mut count_buf).unwrap();
        let reparsed =
            ConstantPool::from_reader(&mut reader, u16::from_be_bytes(count_buf)).unwrap();
        assert_eq!(
            reparsed.get_class_name(class_index).unwrap(),
            "com/example/Widget"
        );
        let field = reparsed.get_field_ref(field_index).unwrap();
        assert_eq!(field.name, "count");
        assert_eq!(field.descriptor, "I");
    }

    #[test]
    fn nan_bits_survive() {
        let mut pool = ConstantPool::new();
        let nan = f32::from_bits(0x7FC0_DEAD);
        let index = pool.put_constant_value(&ConstantValue::float(nan)).unwrap();
        let value = pool.get_constant_value(index).unwrap();
        assert_eq!(value, ConstantValue::Float(0x7FC0_DEAD));
    }
}
