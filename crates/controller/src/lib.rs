//! The job controller: per-job orchestration of normalization, engine
//! acquisition, deadline racing, progress relay, outcome classification,
//! and guaranteed teardown.

pub mod controller;
pub mod deadline;
pub mod events;

pub use controller::{JobController, JobOutcome, SubmitError};
pub use deadline::{DeadlinePolicy, EffectiveDeadline, KnownPathology, SizeTier};
pub use events::{JobEvent, JobEventBus};
