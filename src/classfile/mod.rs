//! Reading, modeling, and writing JVM class files.
//!
//! The model keeps exactly the structures the merging transformer needs:
//! headers, fields with initializer literals, methods with complete bodies
//! (instructions, exception handlers, stack map frames, line numbers, local
//! variable scopes), annotations, and bootstrap methods. Method bodies use a
//! label-addressed instruction stream (see [`code`]) so that bodies can be
//! spliced and prologues synthesized without invalidating branch targets or
//! frame offsets.
//!
//! Attributes outside this set index the original constant pool, which is
//! rebuilt on emission, so they are not retained.

pub mod access;
pub mod annotation;
pub mod code;
pub mod constant_pool;
pub mod reader;
pub mod writer;

pub use access::{ClassAccess, FieldAccess, MethodAccess};
pub use annotation::{Annotation, ElementValue};
pub use constant_pool::{ConstantValue, JavaString, MethodHandle};
pub use reader::ParseError;
pub use writer::GenerationError;

use crate::types::MethodDescriptor;

use self::code::CodeBody;

/// The name of instance initializers.
pub const CONSTRUCTOR_NAME: &str = "<init>";
/// The name of static initializer blocks.
pub const STATIC_INITIALIZER_NAME: &str = "<clinit>";
/// The prefix the compiler gives to synthetic lambda helper methods.
pub const LAMBDA_PREFIX: &str = "lambda$";

/// The version of a class file. Only versions with stack map tables
/// (major ≥ 52, i.e. Java 8) are supported.
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Clone, Copy)]
pub struct ClassVersion {
    /// The major version.
    pub major: u16,
    /// The minor version (`0xFFFF` flags preview features).
    pub minor: u16,
}

impl ClassVersion {
    /// The lowest supported major version (Java 8).
    pub const MIN_MAJOR: u16 = 52;

    /// Checks that the version is in the supported range.
    pub(crate) fn validated(self) -> Result<Self, ParseError> {
        if self.major < Self::MIN_MAJOR {
            Err(ParseError::UnsupportedVersion(self.major))
        } else {
            Ok(self)
        }
    }
}

/// A parsed class file.
#[derive(Debug, Clone)]
pub struct Class {
    /// The class file version.
    pub version: ClassVersion,
    /// The access flags of the class.
    pub access: ClassAccess,
    /// The internal name of the class (slash-separated).
    pub name: String,
    /// The internal name of the superclass; `None` only for
    /// `java/lang/Object`.
    pub super_name: Option<String>,
    /// The internal names of the implemented interfaces.
    pub interfaces: Vec<String>,
    /// The declared fields.
    pub fields: Vec<Field>,
    /// The declared methods.
    pub methods: Vec<Method>,
    /// The generic signature, if any.
    pub signature: Option<String>,
    /// The source file name, if recorded.
    pub source_file: Option<String>,
    /// Inner class records.
    pub inner_classes: Vec<InnerClass>,
    /// Runtime-visible annotations.
    pub annotations: Vec<Annotation>,
    /// Runtime-invisible annotations.
    pub invisible_annotations: Vec<Annotation>,
    /// Bootstrap methods for `invokedynamic` call sites and dynamic
    /// constants.
    pub bootstrap_methods: Vec<BootstrapMethod>,
    /// Whether the class carries the `Synthetic` attribute.
    pub is_synthetic: bool,
    /// Whether the class carries the `Deprecated` attribute.
    pub is_deprecated: bool,
}

impl Class {
    /// Gets a declared method by name and descriptor.
    #[must_use]
    pub fn get_method(&self, name: &str, descriptor: &str) -> Option<&Method> {
        self.methods
            .iter()
            .find(|m| m.name == name && m.descriptor == descriptor)
    }

    /// Gets a declared field by name.
    #[must_use]
    pub fn get_field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Checks if the class is an interface.
    #[must_use]
    pub const fn is_interface(&self) -> bool {
        self.access.contains(ClassAccess::INTERFACE)
    }

    /// Checks if the class is an enum.
    #[must_use]
    pub const fn is_enum(&self) -> bool {
        self.access.contains(ClassAccess::ENUM)
    }
}

/// A declared field.
#[derive(Debug, Clone)]
pub struct Field {
    /// The access flags.
    pub access: FieldAccess,
    /// The field name.
    pub name: String,
    /// The field descriptor.
    pub descriptor: String,
    /// The generic signature, if any.
    pub signature: Option<String>,
    /// The `ConstantValue` initializer literal, if any.
    pub constant_value: Option<ConstantValue>,
    /// Runtime-visible annotations.
    pub annotations: Vec<Annotation>,
    /// Runtime-invisible annotations.
    pub invisible_annotations: Vec<Annotation>,
    /// Whether the field carries the `Synthetic` attribute.
    pub is_synthetic: bool,
    /// Whether the field carries the `Deprecated` attribute.
    pub is_deprecated: bool,
}

impl Field {
    /// Checks if the field is synthetic, either by flag or attribute.
    #[must_use]
    pub const fn is_synthetic(&self) -> bool {
        self.is_synthetic || self.access.contains(FieldAccess::SYNTHETIC)
    }
}

/// A declared method.
#[derive(Debug, Clone)]
pub struct Method {
    /// The access flags.
    pub access: MethodAccess,
    /// The method name (`<init>` for constructors, `<clinit>` for static
    /// initializer blocks).
    pub name: String,
    /// The method descriptor.
    pub descriptor: String,
    /// The generic signature, if any.
    pub signature: Option<String>,
    /// The internal names of the declared thrown exceptions.
    pub exceptions: Vec<String>,
    /// Runtime-visible annotations.
    pub annotations: Vec<Annotation>,
    /// Runtime-invisible annotations.
    pub invisible_annotations: Vec<Annotation>,
    /// The method body; absent for `abstract` and `native` methods.
    pub code: Option<CodeBody>,
    /// Whether the method carries the `Synthetic` attribute.
    pub is_synthetic: bool,
    /// Whether the method carries the `Deprecated` attribute.
    pub is_deprecated: bool,
}

impl Method {
    /// Checks if the method is a constructor.
    #[must_use]
    pub fn is_constructor(&self) -> bool {
        self.name == CONSTRUCTOR_NAME
    }

    /// Checks if the method is a static initializer block.
    #[must_use]
    pub fn is_static_initializer(&self) -> bool {
        self.name == STATIC_INITIALIZER_NAME
    }

    /// Checks if the method is a compiler-synthesized lambda helper.
    #[must_use]
    pub fn is_lambda_helper(&self) -> bool {
        self.name.starts_with(LAMBDA_PREFIX)
            && (self.is_synthetic || self.access.contains(MethodAccess::SYNTHETIC))
    }

    /// Checks if the method is static.
    #[must_use]
    pub const fn is_static(&self) -> bool {
        self.access.contains(MethodAccess::STATIC)
    }

    /// Parses the method descriptor.
    ///
    /// # Panics
    /// Panics if the descriptor is not parseable; descriptors held by a
    /// [`Method`] have been validated on the way in.
    #[must_use]
    pub fn parsed_descriptor(&self) -> MethodDescriptor {
        self.descriptor
            .parse()
            .expect("method descriptor was validated at parse time")
    }
}

/// A symbolic reference to a field.
#[derive(Debug, PartialEq, Eq, Hash, Clone, derive_more::Display)]
#[display("{owner}.{name}:{descriptor}")]
pub struct FieldRef {
    /// The internal name of the class declaring the field.
    pub owner: String,
    /// The field name.
    pub name: String,
    /// The field descriptor.
    pub descriptor: String,
}

/// A symbolic reference to a method.
#[derive(Debug, PartialEq, Eq, Hash, Clone, derive_more::Display)]
#[display("{owner}.{name}{descriptor}")]
pub struct MethodRef {
    /// The internal name of the class declaring the method.
    pub owner: String,
    /// The method name.
    pub name: String,
    /// The method descriptor.
    pub descriptor: String,
}

impl MethodRef {
    /// Parses the descriptor of the referenced method.
    ///
    /// # Panics
    /// Panics if the descriptor is not parseable; refs built by the reader
    /// have been validated on the way in.
    #[must_use]
    pub fn parsed_descriptor(&self) -> MethodDescriptor {
        self.descriptor
            .parse()
            .expect("method descriptor was validated at parse time")
    }
}

/// A bootstrap method of an `invokedynamic` call site or dynamic constant.
#[derive(Debug, PartialEq, Clone)]
pub struct BootstrapMethod {
    /// The bootstrap method handle.
    pub handle: MethodHandle,
    /// The static bootstrap arguments.
    pub arguments: Vec<ConstantValue>,
}

/// An `InnerClasses` attribute entry.
#[derive(Debug, Clone)]
pub struct InnerClass {
    /// The inner class.
    pub inner: String,
    /// The outer class, when the inner class is a member.
    pub outer: Option<String>,
    /// The simple name; `None` for anonymous classes.
    pub inner_name: Option<String>,
    /// The access flags as declared in source.
    pub access: u16,
}
