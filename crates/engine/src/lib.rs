//! The execution side of the control plane: the message contract, the
//! engine lifecycle state machine, per-job instance management, and the
//! dedicated execution context that hosts the engine.
//!
//! The engine itself is opaque; this crate talks to it only through the
//! [`traits::VectorEngine`] contract.

pub mod context;
pub mod instance;
pub mod messages;
pub mod mock;
pub mod state;
pub mod traits;

pub use context::{ContextError, ExecutionContext};
pub use instance::{InstanceError, InstanceManager};
pub use messages::{EngineRequest, EngineResponse, SuccessData};
pub use state::{EngineState, EngineStateMachine, StateError};
pub use traits::{EngineCallError, EngineFactory, VectorEngine};
