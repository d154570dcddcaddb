//! Backing SQL engine.
//!
//! The engine owns logins, databases, permissions and backups. Every
//! primitive is blocking; callers go through [`EnginePool`], which bounds
//! concurrency, applies timeouts and moves the work onto the blocking
//! thread pool.

mod pool;
mod sqlite;

use std::path::Path;

use thiserror::Error;

pub use pool::EnginePool;
pub use sqlite::SqliteEngine;

use crate::types::PermissionLevel;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineErrorKind {
    AlreadyExists,
    NotFound,
    /// The engine understood the command and refused it.
    Rejected,
    /// The engine could not be reached or the connection broke.
    Unavailable,
    Timeout,
}

#[derive(Debug, Clone, Error)]
#[error("{kind:?}: {message}")]
pub struct EngineError {
    pub kind: EngineErrorKind,
    pub message: String,
}

impl EngineError {
    pub fn new(kind: EngineErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn already_exists(message: impl Into<String>) -> Self {
        Self::new(EngineErrorKind::AlreadyExists, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(EngineErrorKind::NotFound, message)
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self::new(EngineErrorKind::Rejected, message)
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(EngineErrorKind::Unavailable, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(EngineErrorKind::Timeout, message)
    }
}

pub type EngineResult<T> = std::result::Result<T, EngineError>;

/// A single connection to the engine.
pub trait EngineConnection: Send {
    fn create_login(&mut self, login: &str, password: &str) -> EngineResult<()>;
    fn drop_login(&mut self, login: &str) -> EngineResult<()>;

    fn database_exists(&mut self, name: &str) -> EngineResult<bool>;
    fn create_database(&mut self, name: &str, collation: &str) -> EngineResult<()>;
    fn drop_database(&mut self, name: &str) -> EngineResult<()>;
    fn database_size_mb(&mut self, name: &str) -> EngineResult<f64>;

    fn grant(&mut self, database: &str, login: &str, level: PermissionLevel) -> EngineResult<()>;
    fn revoke(&mut self, database: &str, login: &str) -> EngineResult<()>;

    /// Writes a full backup of `name` to `dest` and returns its size in bytes.
    fn backup_database(&mut self, name: &str, dest: &Path) -> EngineResult<u64>;
}

/// Opens engine connections for the pool.
pub trait Engine: Send + Sync {
    fn connect(&self) -> EngineResult<Box<dyn EngineConnection>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_names_kind() {
        let err = EngineError::timeout("command took too long");
        assert_eq!(err.to_string(), "Timeout: command took too long");

        let source: &dyn std::error::Error = &err;
        assert!(source.source().is_none());
    }
}
