use std::error::Error as StdError;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[cfg(feature = "prometheus")]
    #[error(transparent)]
    Prometheus(#[from] metrics_exporter_prometheus::BuildError),

    #[error("invalid metrics listen address {address}: {source}")]
    InvalidAddress {
        address: String,
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },
}

pub type Result<T> = std::result::Result<T, Error>;
