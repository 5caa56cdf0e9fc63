use std::error::Error as StdError;
use std::sync::Arc;
use std::time::Duration;

pub type BoxError = Box<dyn StdError + Send + Sync>;

/// Why a fetch task failed.
///
/// Cloneable so one failure can be handed to every caller awaiting the same coalesced task and
/// kept as the array's current error at the same time.
#[derive(Clone, Debug, thiserror::Error)]
pub enum FetchError {
    /// The source rejected the request.
    #[error("fetch rejected: {0}")]
    Rejected(#[source] Arc<dyn StdError + Send + Sync>),
    /// A single source call exceeded the configured `fetch_timeout`.
    #[error("fetch timed out after {0:?}")]
    TimedOut(Duration),
    /// The array was destroyed before the task could complete.
    #[error("array destroyed")]
    Cancelled,
}

impl FetchError {
    pub fn rejected(err: impl Into<BoxError>) -> Self {
        Self::Rejected(Arc::from(err.into()))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// Result of a scheduled task.
pub type TaskResult = Result<crate::TaskOutcome, FetchError>;
