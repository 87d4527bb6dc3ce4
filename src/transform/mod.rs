//! Emission of merged classes: the assembler, the per-class driver, the
//! dispatch-prologue synthesizer, and the body instruction rewriter.

pub mod assembler;
mod class;
mod method;
mod rewrite;

pub use class::ClassMerger;
pub use method::MethodMerger;
pub use rewrite::rewrite_body;
