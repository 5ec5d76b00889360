/// Errors produced while decoding gateway frames.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Frame text was not valid JSON.
    #[error("malformed frame: {0}")]
    Json(#[from] serde_json::Error),

    /// Frame was JSON but matched neither the event nor the response shape.
    #[error("unrecognized frame shape: {reason}")]
    UnrecognizedFrame { reason: String },
}

impl Error {
    #[must_use]
    pub fn unrecognized(reason: impl Into<String>) -> Self {
        Self::UnrecognizedFrame {
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
