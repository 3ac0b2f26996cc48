//! Domain types, configuration normalization, and error classification
//! for the vectorization control plane.
//!
//! Everything in this crate is pure: no I/O, no async runtime, no engine
//! calls. The `engine` and `controller` crates build on these types.

pub mod classify;
pub mod config;
pub mod error;
pub mod types;

pub use classify::classify;
pub use config::{
    normalize, Backend, BackendSettings, ConfigBag, ConfigRejection, EngineSettings,
    NormalizeOutcome, Violation, ViolationKind,
};
pub use error::{ErrorCategory, ErrorRecord, Retryability};
pub use types::{ImageDescriptor, JobId, JobStatus, ProgressEvent, VectorArtifact};
