//! CLI error type.

use thiserror::Error;

use pointlayer::coord::CoordinateError;
use pointlayer::logging::LoggingError;
use pointlayer::source::SourceError;
use pointlayer::CacheError;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    Coordinate(#[from] CoordinateError),

    #[error(transparent)]
    Logging(#[from] LoggingError),
}
