use std::path::PathBuf;

use botlink_common::FromMessage;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("missing plugin.toml in {}", dir.display())]
    MissingManifest { dir: PathBuf },

    #[error("invalid plugin.toml in {}: {source}", dir.display())]
    InvalidManifest {
        dir: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("unknown entrypoint: {entrypoint}")]
    UnknownEntrypoint { entrypoint: String },

    #[error("entrypoint {entrypoint} failed to initialize: {message}")]
    Factory { entrypoint: String, message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("{message}")]
    Message { message: String },
}

impl Error {
    #[must_use]
    pub fn unknown_entrypoint(entrypoint: impl Into<String>) -> Self {
        Self::UnknownEntrypoint {
            entrypoint: entrypoint.into(),
        }
    }

    #[must_use]
    pub fn factory(entrypoint: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Factory {
            entrypoint: entrypoint.into(),
            message: message.into(),
        }
    }
}

impl FromMessage for Error {
    fn from_message(message: String) -> Self {
        Self::Message { message }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

botlink_common::impl_context!();
