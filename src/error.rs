use thiserror::Error;

use crate::engine::{EngineError, EngineErrorKind};

#[derive(Debug, Error)]
pub enum Error {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("unauthorized")]
    Unauthorized,

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("upstream engine error: {0}")]
    Upstream(String),

    #[error("engine timed out: {0}")]
    Timeout(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn conflict(what: impl Into<String>) -> Self {
        Self::Conflict(what.into())
    }

    pub fn forbidden(what: impl Into<String>) -> Self {
        Self::Forbidden(what.into())
    }

    pub fn bad_request(what: impl Into<String>) -> Self {
        Self::BadRequest(what.into())
    }
}

impl From<EngineError> for Error {
    fn from(e: EngineError) -> Self {
        match e.kind {
            EngineErrorKind::AlreadyExists => Error::Conflict(e.message),
            EngineErrorKind::NotFound => Error::NotFound(e.message),
            EngineErrorKind::Rejected | EngineErrorKind::Unavailable => {
                Error::Upstream(e.message)
            }
            EngineErrorKind::Timeout => Error::Timeout(e.message),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
