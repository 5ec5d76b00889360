use botlink_common::FromMessage;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid module name: {name:?}")]
    InvalidModule { name: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error("{message}")]
    Message { message: String },
}

impl Error {
    #[must_use]
    pub fn invalid_module(name: impl Into<String>) -> Self {
        Self::InvalidModule { name: name.into() }
    }
}

impl FromMessage for Error {
    fn from_message(message: String) -> Self {
        Self::Message { message }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

botlink_common::impl_context!();
