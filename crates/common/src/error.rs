use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Broker session dropped or refused. Fatal to the current cycle only.
    #[error("Connectivity error: {0}")]
    Connectivity(String),

    #[error("Broker call timed out: {0}")]
    Timeout(String),

    /// Broker permanently rejects the instrument.
    #[error("Invalid instrument {symbol}: {reason}")]
    InvalidInstrument { symbol: String, reason: String },

    /// Real-money exposure risk (live account, unverifiable account type).
    /// Never retried.
    #[error("Safety violation: {0}")]
    Safety(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Errors the Resilience Loop recovers from by reconnecting.
    pub fn is_connectivity(&self) -> bool {
        matches!(self, Error::Connectivity(_) | Error::Timeout(_))
    }

    /// Errors that must halt the process.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Safety(_))
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
