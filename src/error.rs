//! Error taxonomy for the popularity pipeline.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, PopularityError>;

#[derive(Debug, Error)]
pub enum PopularityError {
    /// Counter store read/write failed or the transaction conflicted.
    /// Callers on the view-tracking path treat this as best-effort.
    #[error("counter store unavailable: {0}")]
    StoreUnavailable(String),

    /// Fewer than two entities or zero variance. Fatal to one scoring run only.
    #[error("degenerate score input: {0}")]
    DegenerateScoreInput(String),

    /// Search engine rejected the publish or could not be reached.
    #[error("search index unavailable: {0}")]
    IndexUnavailable(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl From<sqlx::Error> for PopularityError {
    fn from(err: sqlx::Error) -> Self {
        PopularityError::StoreUnavailable(err.to_string())
    }
}

impl From<sqlx::migrate::MigrateError> for PopularityError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        PopularityError::StoreUnavailable(err.to_string())
    }
}

impl From<reqwest::Error> for PopularityError {
    fn from(err: reqwest::Error) -> Self {
        PopularityError::IndexUnavailable(err.to_string())
    }
}

impl PopularityError {
    pub fn is_degenerate(&self) -> bool {
        matches!(self, PopularityError::DegenerateScoreInput(_))
    }
}
