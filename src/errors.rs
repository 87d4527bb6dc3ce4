//! The error taxonomy of the transformation pipeline.
//!
//! Class-file reading and writing carry their own error types
//! ([`ParseError`](crate::classfile::ParseError) and
//! [`GenerationError`](crate::classfile::GenerationError)); everything that
//! can abort a transformation funnels into [`TransformError`].

use crate::headers::MethodHeader;

/// An error that aborts the transformation of a class or the configuration of
/// the whole run.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum TransformError {
    /// The configuration is unusable. Fatal for the whole run.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// A supertype required for member resolution exists neither among the
    /// submissions, the reference classes, nor on the configured classpath.
    /// Fatal for the class under analysis.
    #[error("cannot resolve supertype `{name}` required by `{required_by}`")]
    UnresolvedType {
        /// The internal name that could not be located.
        name: String,
        /// The submission class whose analysis demanded it.
        required_by: String,
    },
    /// The submission class file could not be parsed.
    #[error(transparent)]
    Parse(#[from] crate::classfile::ParseError),
    /// The merged class could not be serialized.
    #[error(transparent)]
    Generation(#[from] crate::classfile::GenerationError),
    /// Reading a submission or reference resource failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// A configuration fault, detected before any class is transformed.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// Two members pinned (via the force-signature annotation) to the same
    /// target identifier.
    #[error("pinned mapping collision in `{owner}`: `{first}` and `{second}` both pin `{target}`")]
    PinnedCollision {
        /// The class declaring the colliding members.
        owner: String,
        /// The first colliding member.
        first: String,
        /// The second colliding member.
        second: String,
        /// The identifier both members pin.
        target: String,
    },
    /// A method replacement whose trampoline is not static.
    #[error("replacement for {target} must be static: {replacement}")]
    NonStaticReplacement {
        /// The method being redirected.
        target: MethodHeader,
        /// The offending trampoline.
        replacement: MethodHeader,
    },
    /// A method replacement whose trampoline descriptor does not match the
    /// target (same return type, target parameters preceded by the receiver
    /// type when the target is virtual).
    #[error("replacement for {target} has incompatible descriptor: {replacement}")]
    IncompatibleReplacement {
        /// The method being redirected.
        target: MethodHeader,
        /// The offending trampoline.
        replacement: MethodHeader,
    },
    /// A reference class resource that was listed but cannot be read.
    #[error("unreadable reference class resource `{path}`: {source}")]
    UnreadableReference {
        /// The offending resource path.
        path: String,
        /// The underlying failure.
        #[source]
        source: std::io::Error,
    },
    /// The similarity threshold is outside `[0, 1]`.
    #[error("similarity threshold {0} is outside [0, 1]")]
    InvalidThreshold(f64),
    /// The discovery document is not valid JSON or has the wrong shape.
    #[error("malformed discovery document: {0}")]
    MalformedDiscovery(#[from] serde_json::Error),
}
