use vigil_core::RegionId;

use crate::action::ActionId;

/// Alias for `Result<T, SchedError>`.
pub type SchedResult<T> = Result<T, SchedError>;

/// Errors raised by the scheduler itself. These are caller mistakes or worker
/// lifecycle failures; failures inside callbacks are [`ActionError`]s.
#[derive(Debug, thiserror::Error)]
pub enum SchedError {
    /// The action was started without a callback bound to it.
    #[error("action {0} has no callback bound")]
    NoCallback(ActionId),

    /// The action has already been stopped and can never run again.
    #[error("action {0} is already stopped")]
    AlreadyStopped(ActionId),

    /// The action is already queued.
    #[error("action {0} is already running")]
    AlreadyRunning(ActionId),

    /// The start delay is outside `1..=max`.
    #[error("invalid delay {delay}ms for action {action} (allowed 1..={max})")]
    InvalidDelay {
        /// The rejected action.
        action: ActionId,
        /// Requested delay.
        delay: u64,
        /// Largest delay the region accepts.
        max: u64,
    },

    /// The scheduler configuration is unusable.
    #[error("invalid scheduler config: {0}")]
    Config(String),

    /// The worker thread could not be spawned.
    #[error("failed to spawn worker for region {region}: {source}")]
    Spawn {
        /// Region whose worker failed to start.
        region: RegionId,
        /// Underlying OS error.
        source: std::io::Error,
    },

    /// The worker thread panicked; the region state is lost.
    #[error("worker for region {0} panicked")]
    WorkerPanicked(RegionId),

    /// The worker did not finish within the shutdown timeout.
    #[error("worker for region {0} did not stop in time")]
    ShutdownTimeout(RegionId),
}

/// A failure reported by a scheduled callback. Logged by the timer manager,
/// never propagated past it.
#[derive(Debug, thiserror::Error)]
pub enum ActionError {
    /// A plain failure message.
    #[error("{0}")]
    Failed(String),

    /// Any other error raised inside the callback.
    #[error(transparent)]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

impl ActionError {
    /// Wrap an arbitrary error.
    pub fn other<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Other(Box::new(err))
    }
}

impl From<vigil_core::CoreError> for ActionError {
    fn from(err: vigil_core::CoreError) -> Self {
        Self::other(err)
    }
}

impl From<SchedError> for ActionError {
    fn from(err: SchedError) -> Self {
        Self::other(err)
    }
}

/// Alias for the result type scheduled callbacks return.
pub type ActionResult<T> = Result<T, ActionError>;
