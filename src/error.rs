//! Crate-wide error type

pub use crate::search::{SearchError as Error, SearchResult as Result};

impl From<config::ConfigError> for Error {
    fn from(err: config::ConfigError) -> Self {
        Error::Configuration(err.to_string())
    }
}
