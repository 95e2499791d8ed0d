/// Error taxonomy shared by the window resolver, the aggregation engine and
/// the collaborators around them.
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StatsError {
    #[error("Invalid period '{0}'. Expected one of: day, isoWeek, week, month")]
    InvalidPeriod(String),

    #[error("Invalid date '{0}'. Expected RFC 3339 or YYYY-MM-DD")]
    InvalidDate(String),

    #[error("Configuration error: {0}")]
    InvalidConfig(String),

    #[error("Source unavailable: {0}")]
    SourceUnavailable(String),

    #[error("Run deadline exceeded")]
    DeadlineExceeded,

    #[error("Run cancelled")]
    Cancelled,

    #[error("Sink error: {0}")]
    Sink(String),

    #[error("Render error: {0}")]
    Render(String),
}

impl From<reqwest::Error> for StatsError {
    fn from(err: reqwest::Error) -> Self {
        StatsError::SourceUnavailable(err.to_string())
    }
}

impl From<rusqlite::Error> for StatsError {
    fn from(err: rusqlite::Error) -> Self {
        StatsError::Sink(err.to_string())
    }
}

impl From<tera::Error> for StatsError {
    fn from(err: tera::Error) -> Self {
        StatsError::Render(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, StatsError>;
