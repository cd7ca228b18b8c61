use thiserror::Error;

/// Failures raised by the page/card collaborators.
///
/// Only [`PageError::StaleReference`] is expected during normal operation: the
/// listing re-renders nodes while we poll them. Everything else is a failure of
/// the browser session itself.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PageError {
    #[error("stale element reference: {0}")]
    StaleReference(String),

    #[error("page evaluation failed: {0}")]
    Evaluation(String),

    #[error("browser protocol error: {0}")]
    Protocol(String),
}

impl PageError {
    pub fn is_stale(&self) -> bool {
        matches!(self, PageError::StaleReference(_))
    }
}

#[derive(Debug, Error)]
pub enum HarvestError {
    /// Digits survived cleaning but do not fit a price. Points at a locator or
    /// cleaning mismatch, so it is never retried.
    #[error("malformed price text {text:?}: {reason}")]
    MalformedPrice { text: String, reason: String },

    #[error(transparent)]
    Page(#[from] PageError),

    #[error("harvest cancelled")]
    Cancelled,
}
