use thiserror::Error;

pub type Result<T> = std::result::Result<T, CoreError>;

/// Domain error taxonomy for the commerce core.
///
/// Each component raises these typed errors; the transport boundary maps
/// them to status codes via [`CoreError::status_code`]. Variants that wrap
/// infrastructure failures (`Io`, `Json`, `Csv`, `Internal`) must never be
/// shown to callers verbatim.
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    Validation(String),
    #[error("signature verification failed for order {order_handle}")]
    SignatureMismatch { order_handle: String },
    /// External dependency failure. Safe to retry.
    #[error("{0}")]
    Unavailable(String),
    #[error("internal error: {0}")]
    Internal(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

impl CoreError {
    /// HTTP status the transport layer should answer with.
    pub fn status_code(&self) -> u16 {
        match self {
            CoreError::NotFound(_) => 404,
            CoreError::Conflict(_) => 409,
            CoreError::Forbidden(_) => 403,
            CoreError::Validation(_) | CoreError::SignatureMismatch { .. } => 400,
            CoreError::Unavailable(_) => 503,
            CoreError::Internal(_) | CoreError::Io(_) | CoreError::Json(_) | CoreError::Csv(_) => {
                500
            }
        }
    }

    /// Whether the caller may retry the same request unchanged.
    ///
    /// A signature mismatch is terminal for its order; a fresh order must
    /// be created instead.
    pub fn is_retryable(&self) -> bool {
        matches!(self, CoreError::Unavailable(_))
    }

    /// True for errors that must be logged and replaced with a generic
    /// message before crossing the transport boundary.
    pub fn is_internal(&self) -> bool {
        matches!(
            self,
            CoreError::Internal(_) | CoreError::Io(_) | CoreError::Json(_) | CoreError::Csv(_)
        )
    }
}
