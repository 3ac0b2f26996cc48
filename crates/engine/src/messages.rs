//! The typed message contract between controller and execution context.
//!
//! Messages are JSON with the shape `{"type": "<kind>", "data": {...}}`,
//! deserialized via the internally-tagged `"type"` field. Every message
//! carries the job's correlation id; responses and progress events for a
//! job are matched back to it by that id alone.

use serde::{Deserialize, Serialize};
use tracekit_core::config::{ConfigBag, EngineSettings};
use tracekit_core::types::{ImageDescriptor, JobId, VectorArtifact};

/// Requests travelling controller -> execution context.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum EngineRequest {
    /// Bring the context (back) to `Ready`. Also the recovery path after
    /// the context entered its error state.
    Init {
        id: JobId,
        /// Baseline configuration for subsequent deltas. Defaults when
        /// absent.
        config: Option<ConfigBag>,
    },

    /// Overlay a partial configuration onto the context's stored baseline.
    Configure { id: JobId, config_delta: ConfigBag },

    /// Run one vectorization job. Explicit `settings` must already be
    /// normalized; when absent the context normalizes its stored baseline.
    Process {
        id: JobId,
        image: ImageDescriptor,
        #[serde(default)]
        settings: Option<EngineSettings>,
    },

    /// Mark a job aborted. Honored at message receipt; a running engine
    /// call is not preempted.
    Abort { id: JobId },

    /// Tear down the context. Terminal; no request is accepted afterwards.
    Cleanup { id: JobId },
}

impl EngineRequest {
    /// The correlation id this request belongs to.
    pub fn correlation_id(&self) -> JobId {
        match self {
            EngineRequest::Init { id, .. }
            | EngineRequest::Configure { id, .. }
            | EngineRequest::Process { id, .. }
            | EngineRequest::Abort { id }
            | EngineRequest::Cleanup { id } => *id,
        }
    }
}

/// Responses travelling execution context -> controller.
///
/// `Progress` may be emitted any number of times per `Process`; exactly
/// one `Success` or `Error` concludes each request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum EngineResponse {
    Success { id: JobId, data: SuccessData },

    /// The raw, unclassified failure signal. Classification happens on
    /// the controller side so diagnostics survive the transport verbatim.
    Error { id: JobId, message: String },

    Progress {
        id: JobId,
        stage: String,
        percent: f32,
        message: Option<String>,
    },
}

impl EngineResponse {
    /// The correlation id this response belongs to.
    pub fn correlation_id(&self) -> JobId {
        match self {
            EngineResponse::Success { id, .. }
            | EngineResponse::Error { id, .. }
            | EngineResponse::Progress { id, .. } => *id,
        }
    }

    /// Whether this response concludes its request.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, EngineResponse::Progress { .. })
    }
}

/// What a `Success` response carries, per request kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SuccessData {
    Initialized,
    Configured,
    Completed { artifact: VectorArtifact },
    Aborted,
    CleanedUp,
}

/// Parse a wire message into a typed response.
///
/// Returns `Err` for malformed JSON or unknown `type` values; callers
/// treat that as a protocol failure.
pub fn parse_response(text: &str) -> Result<EngineResponse, serde_json::Error> {
    serde_json::from_str(text)
}

/// Encode a request for the wire.
pub fn encode_request(request: &EngineRequest) -> Result<String, serde_json::Error> {
    serde_json::to_string(request)
}
