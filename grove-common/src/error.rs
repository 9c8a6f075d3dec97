use std::sync::Arc;

use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum GroveError {
    #[error("I/O Error: {0}")]
    Io(#[from] Arc<std::io::Error>),

    #[error("JSON Parsing Error: {0}")]
    Json(#[from] Arc<serde_json::Error>),

    #[error("Semantic Versioning Error: {0}")]
    SemVer(#[from] Arc<semver::Error>),

    #[error("Configuration Error: {0}")]
    Config(String),

    #[error("Resource Not Found: {0}")]
    NotFound(String),

    #[error("Generic Error: {0}")]
    Generic(String),
}

impl From<std::io::Error> for GroveError {
    fn from(err: std::io::Error) -> Self {
        GroveError::Io(Arc::new(err))
    }
}

impl From<serde_json::Error> for GroveError {
    fn from(err: serde_json::Error) -> Self {
        GroveError::Json(Arc::new(err))
    }
}

impl From<semver::Error> for GroveError {
    fn from(err: semver::Error) -> Self {
        GroveError::SemVer(Arc::new(err))
    }
}

pub type Result<T> = std::result::Result<T, GroveError>;
