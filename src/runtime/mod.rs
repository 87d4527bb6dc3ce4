//! The runtime control surface and its emitted-code ABI.
//!
//! Merged classes carry a dispatch prologue that calls the support classes
//! under `org/classweave/runtime` by name; [`abi`] is the single source of
//! truth for those names and descriptors. The Rust side of this module
//! implements the same semantics for the host test process: a process-global
//! [`ExecutionRegistry`] holding the invocation logs, substitutions, and
//! delegation exclusions that the prologue consults, plus the captured
//! [`Invocation`] records handed back to tests.

pub mod abi;
mod invocation;
mod surface;
mod value;

pub use invocation::{Invocation, StackFrame};
pub use surface::{
    ConstructorInvocation, EnumConstantRecord, ExecutionRegistry, MethodKey, MethodSubstitution,
    SurfaceError,
};
pub use value::Value;
