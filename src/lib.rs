#![warn(
    clippy::pedantic,
    future_incompatible,
    missing_debug_implementations,
    missing_docs,
    rust_2018_idioms
)]
#![allow(clippy::module_name_repetitions)]
#![cfg_attr(docsrs, feature(doc_auto_cfg, doc_cfg))]
#![deny(rustdoc::broken_intra_doc_links)]

//! `classweave` rewrites student-submitted JVM class files so that a grading
//! test suite can observe every call into student code, substitute selected
//! methods with test-controlled behavior, and swap the student implementation
//! for a known-good reference implementation on a per-method basis, without
//! recompiling either side.
//!
//! The transformation is offline: a [`TransformContext`](context::TransformContext)
//! is configured with the reference classes and the student package prefix,
//! and [`transform::ClassMerger`] turns each submission class file into a
//! merged class whose methods dispatch through the
//! [`runtime`] control surface.
//! ## Features
#![doc = document_features::document_features!()]

pub mod classfile;
pub mod config;
pub mod context;
pub mod errors;
pub mod forced;
pub mod headers;
pub mod reference;
pub mod runtime;
pub mod similarity;
pub mod submission;
pub mod transform;
pub mod types;

pub use config::TransformerConfig;
pub use context::TransformContext;
pub use errors::TransformError;
