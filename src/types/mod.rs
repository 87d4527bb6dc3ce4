//! The non-generic JVM type system: primitive sorts, field types, and method
//! descriptors as they appear in class-file descriptor strings.

mod field_type;
mod method_descriptor;

pub use field_type::{FieldType, PrimitiveType};
pub use method_descriptor::{MethodDescriptor, ReturnType};

/// An error indicating that a descriptor string is invalid.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
#[error("invalid descriptor `{0}`")]
pub struct InvalidDescriptor(pub String);
