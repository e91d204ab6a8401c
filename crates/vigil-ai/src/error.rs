use vigil_core::{CoreError, EntityId, RegionId};
use vigil_sched::{ActionError, SchedError};

/// Alias for `Result<T, AiError>`.
pub type AiResult<T> = Result<T, AiError>;

/// Errors raised by brain management, combat commands, and the behaviour
/// store.
#[derive(Debug, thiserror::Error)]
pub enum AiError {
    /// The body is not in the region.
    #[error("body not found: {0}")]
    BodyNotFound(EntityId),

    /// The body has no brain attached.
    #[error("no brain attached to {0}")]
    NoBrain(EntityId),

    /// The body already has a brain.
    #[error("{0} already has a brain attached")]
    BrainAttached(EntityId),

    /// A pet command was sent to a brain that takes no orders.
    #[error("{0} does not take pet commands")]
    NotAPet(EntityId),

    /// The brain is busy in a think or notification on this same region.
    #[error("brain of {0} is busy")]
    BrainBusy(EntityId),

    /// Crowd control was ended on a body that is not crowd controlled.
    #[error("{0} is not crowd controlled")]
    NotCrowdControlled(EntityId),

    /// No region with this id is loaded.
    #[error("unknown region {0}")]
    UnknownRegion(RegionId),

    /// A region with this id is already loaded.
    #[error("region {0} already exists")]
    RegionExists(RegionId),

    /// The operation needs the server's regions in hand, but they are
    /// running on worker threads.
    #[error("server is running")]
    ServerRunning,

    /// The behaviour store failed.
    #[error("behaviour store error: {0}")]
    Store(String),

    /// Reading a config or behaviour file failed.
    #[error("failed to read {path}: {source}")]
    Io {
        /// File that could not be read.
        path: String,
        /// Underlying OS error.
        source: std::io::Error,
    },

    /// A config or behaviour file is not valid JSON.
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// A registry error.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// A scheduling error.
    #[error(transparent)]
    Sched(#[from] SchedError),
}

impl From<AiError> for ActionError {
    fn from(err: AiError) -> Self {
        ActionError::other(err)
    }
}
