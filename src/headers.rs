//! The header records the transformer trades in: the identity of a class,
//! field, or method as either side (submission or reference) declares it.
//!
//! Equality is intentionally loose: a [`ClassHeader`] or [`FieldHeader`] is
//! its name, a [`MethodHeader`] is its `(name, descriptor)` pair. Ownership
//! and access are excluded because the same logical member migrates across
//! owners during merging; the loose key is what lets an original header find
//! its computed counterpart.
//!
//! Each header can also replicate itself into bytecode (`build`): the
//! emitted `new`/`dup`/`ldc…`/`invokespecial` sequence constructs the
//! equivalent runtime-support record at the current stack position.

use std::hash::{Hash, Hasher};

use crate::{
    classfile::{Class, ClassAccess, Field, FieldAccess, Method, MethodAccess},
    runtime::abi,
    transform::assembler::CodeAssembler,
};

/// The identity of a class as one side declares it.
#[derive(Debug, Clone, derive_more::Display)]
#[display("{name}")]
pub struct ClassHeader {
    /// The access flags.
    pub access: ClassAccess,
    /// The internal name.
    pub name: String,
    /// The generic signature, if any.
    pub signature: Option<String>,
    /// The internal name of the superclass.
    pub super_name: Option<String>,
    /// The internal names of the implemented interfaces.
    pub interfaces: Vec<String>,
}

impl ClassHeader {
    /// Extracts the header of a parsed class.
    #[must_use]
    pub fn of(class: &Class) -> Self {
        Self {
            access: class.access,
            name: class.name.clone(),
            signature: class.signature.clone(),
            super_name: class.super_name.clone(),
            interfaces: class.interfaces.clone(),
        }
    }

    /// Replicates the header as bytecode constructing the runtime-support
    /// record, returning the peak stack delta of the sequence.
    pub fn build(&self, assembler: &mut CodeAssembler) -> u16 {
        let mark = assembler.begin_measure();
        assembler.new_object(abi::CLASS_HEADER);
        assembler.dup();
        assembler.push_int(i32::from(self.access.bits()));
        assembler.push_str(&self.name);
        assembler.push_optional_str(self.signature.as_deref());
        assembler.push_optional_str(self.super_name.as_deref());
        assembler.push_str_array(&self.interfaces);
        assembler.invoke_special(abi::CLASS_HEADER_INIT);
        assembler.measured_delta(mark)
    }
}

impl PartialEq for ClassHeader {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for ClassHeader {}

impl Hash for ClassHeader {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

/// The identity of a field as one side declares it.
#[derive(Debug, Clone, derive_more::Display)]
#[display("{owner}.{name}:{descriptor}")]
pub struct FieldHeader {
    /// The internal name of the declaring class.
    pub owner: String,
    /// The access flags.
    pub access: FieldAccess,
    /// The field name.
    pub name: String,
    /// The field descriptor.
    pub descriptor: String,
    /// The generic signature, if any.
    pub signature: Option<String>,
}

impl FieldHeader {
    /// Extracts the header of a declared field.
    #[must_use]
    pub fn of(owner: &str, field: &Field) -> Self {
        Self {
            owner: owner.to_owned(),
            access: field.access,
            name: field.name.clone(),
            descriptor: field.descriptor.clone(),
            signature: field.signature.clone(),
        }
    }

    /// Checks if the field is static.
    #[must_use]
    pub const fn is_static(&self) -> bool {
        self.access.contains(FieldAccess::STATIC)
    }

    /// Replicates the header as bytecode constructing the runtime-support
    /// record, returning the peak stack delta of the sequence.
    pub fn build(&self, assembler: &mut CodeAssembler) -> u16 {
        let mark = assembler.begin_measure();
        assembler.new_object(abi::FIELD_HEADER);
        assembler.dup();
        assembler.push_str(&self.owner);
        assembler.push_int(i32::from(self.access.bits()));
        assembler.push_str(&self.name);
        assembler.push_str(&self.descriptor);
        assembler.push_optional_str(self.signature.as_deref());
        assembler.invoke_special(abi::FIELD_HEADER_INIT);
        assembler.measured_delta(mark)
    }
}

impl PartialEq for FieldHeader {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for FieldHeader {}

impl Hash for FieldHeader {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

/// The identity of a method as one side declares it.
#[derive(Debug, Clone, derive_more::Display)]
#[display("{owner}.{name}{descriptor}")]
pub struct MethodHeader {
    /// The internal name of the declaring class.
    pub owner: String,
    /// The access flags.
    pub access: MethodAccess,
    /// The method name.
    pub name: String,
    /// The method descriptor.
    pub descriptor: String,
    /// The generic signature, if any.
    pub signature: Option<String>,
    /// The declared thrown exceptions.
    pub exceptions: Vec<String>,
}

impl MethodHeader {
    /// Extracts the header of a declared method.
    #[must_use]
    pub fn of(owner: &str, method: &Method) -> Self {
        Self {
            owner: owner.to_owned(),
            access: method.access,
            name: method.name.clone(),
            descriptor: method.descriptor.clone(),
            signature: method.signature.clone(),
            exceptions: method.exceptions.clone(),
        }
    }

    /// Checks if the header names a constructor.
    #[must_use]
    pub fn is_constructor(&self) -> bool {
        self.name == crate::classfile::CONSTRUCTOR_NAME
    }

    /// Checks if the header names a static initializer block.
    #[must_use]
    pub fn is_static_initializer(&self) -> bool {
        self.name == crate::classfile::STATIC_INITIALIZER_NAME
    }

    /// Checks if the method is static.
    #[must_use]
    pub const fn is_static(&self) -> bool {
        self.access.contains(MethodAccess::STATIC)
    }

    /// Replicates the header as bytecode constructing the runtime-support
    /// record, returning the peak stack delta of the sequence.
    pub fn build(&self, assembler: &mut CodeAssembler) -> u16 {
        let mark = assembler.begin_measure();
        assembler.new_object(abi::METHOD_HEADER);
        assembler.dup();
        assembler.push_str(&self.owner);
        assembler.push_int(i32::from(self.access.bits()));
        assembler.push_str(&self.name);
        assembler.push_str(&self.descriptor);
        assembler.push_optional_str(self.signature.as_deref());
        assembler.push_str_array(&self.exceptions);
        assembler.invoke_special(abi::METHOD_HEADER_INIT);
        assembler.measured_delta(mark)
    }
}

impl PartialEq for MethodHeader {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.descriptor == other.descriptor
    }
}

impl Eq for MethodHeader {}

impl Hash for MethodHeader {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
        self.descriptor.hash(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn method_header(owner: &str, name: &str, descriptor: &str) -> MethodHeader {
        MethodHeader {
            owner: owner.to_owned(),
            access: MethodAccess::PUBLIC,
            name: name.to_owned(),
            descriptor: descriptor.to_owned(),
            signature: None,
            exceptions: Vec::new(),
        }
    }

    #[test]
    fn method_identity_ignores_owner_and_access() {
        let declared = method_header("sub/Widget", "count", "(I)I");
        let mut computed = method_header("ref/Widget", "count", "(I)I");
        computed.access = MethodAccess::PUBLIC | MethodAccess::FINAL;
        assert_eq!(declared, computed);
    }

    #[test]
    fn method_identity_includes_descriptor() {
        assert_ne!(
            method_header("sub/Widget", "count", "(I)I"),
            method_header("sub/Widget", "count", "(J)I")
        );
    }

    #[test]
    fn field_identity_is_the_name() {
        let a = FieldHeader {
            owner: "sub/Widget".into(),
            access: FieldAccess::PRIVATE,
            name: "total".into(),
            descriptor: "I".into(),
            signature: None,
        };
        let b = FieldHeader {
            owner: "ref/Widget".into(),
            access: FieldAccess::PUBLIC,
            name: "total".into(),
            descriptor: "J".into(),
            signature: None,
        };
        assert_eq!(a, b);
    }
}
