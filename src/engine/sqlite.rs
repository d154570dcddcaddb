use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rusqlite::{Connection, DatabaseName, ErrorCode, OpenFlags, OptionalExtension, params};

use super::{Engine, EngineConnection, EngineError, EngineResult};
use crate::auth::PasswordHasher;
use crate::error::Result;
use crate::types::PermissionLevel;

const CATALOG_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS logins (
    name TEXT PRIMARY KEY,
    password_hash TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS databases (
    name TEXT PRIMARY KEY,
    collation TEXT NOT NULL,
    created_at TEXT NOT NULL
);

-- Database role membership per login
CREATE TABLE IF NOT EXISTS permissions (
    database_name TEXT NOT NULL REFERENCES databases(name) ON DELETE CASCADE,
    login_name TEXT NOT NULL REFERENCES logins(name) ON DELETE CASCADE,
    role TEXT NOT NULL,
    PRIMARY KEY (database_name, login_name)
);
"#;

const DATABASE_BOOTSTRAP: &str = r#"
CREATE TABLE IF NOT EXISTS sqlgate_meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;

/// File-backed engine: a catalog database for logins and permissions, and
/// one SQLite file per hosted database.
pub struct SqliteEngine {
    root: PathBuf,
    busy_timeout: Duration,
    hasher: Arc<PasswordHasher>,
}

impl SqliteEngine {
    pub fn open<P: AsRef<Path>>(root: P, busy_timeout: Duration) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(root.join("data"))?;

        let catalog = Connection::open(root.join("catalog.db"))?;
        catalog.pragma_update(None, "foreign_keys", "ON")?;
        catalog.pragma_update(None, "journal_mode", "WAL")?;
        catalog.execute_batch(CATALOG_SCHEMA)?;

        Ok(Self {
            root,
            busy_timeout,
            hasher: Arc::new(PasswordHasher::new()),
        })
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl Engine for SqliteEngine {
    fn connect(&self) -> EngineResult<Box<dyn EngineConnection>> {
        let catalog = Connection::open(self.root.join("catalog.db")).map_err(map_sqlite)?;
        catalog.busy_timeout(self.busy_timeout).map_err(map_sqlite)?;
        catalog
            .pragma_update(None, "foreign_keys", "ON")
            .map_err(map_sqlite)?;

        Ok(Box::new(SqliteEngineConnection {
            catalog,
            data_dir: self.root.join("data"),
            hasher: Arc::clone(&self.hasher),
        }))
    }
}

struct SqliteEngineConnection {
    catalog: Connection,
    data_dir: PathBuf,
    hasher: Arc<PasswordHasher>,
}

impl SqliteEngineConnection {
    fn database_path(&self, name: &str) -> EngineResult<PathBuf> {
        if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(EngineError::rejected(format!(
                "invalid object name '{name}'"
            )));
        }
        Ok(self.data_dir.join(format!("{name}.sqlite")))
    }

    fn login_exists(&self, login: &str) -> EngineResult<bool> {
        self.catalog
            .query_row(
                "SELECT 1 FROM logins WHERE name = ?1",
                params![login],
                |_| Ok(()),
            )
            .optional()
            .map(|r| r.is_some())
            .map_err(map_sqlite)
    }
}

impl EngineConnection for SqliteEngineConnection {
    fn create_login(&mut self, login: &str, password: &str) -> EngineResult<()> {
        if self.login_exists(login)? {
            return Err(EngineError::already_exists(format!(
                "login '{login}' already exists"
            )));
        }

        let hash = self
            .hasher
            .hash(password)
            .map_err(|e| EngineError::rejected(e.to_string()))?;

        self.catalog
            .execute(
                "INSERT INTO logins (name, password_hash, created_at) VALUES (?1, ?2, ?3)",
                params![login, hash, Utc::now().to_rfc3339()],
            )
            .map_err(|e| map_constraint(e, || format!("login '{login}' already exists")))?;
        Ok(())
    }

    fn drop_login(&mut self, login: &str) -> EngineResult<()> {
        let rows = self
            .catalog
            .execute("DELETE FROM logins WHERE name = ?1", params![login])
            .map_err(map_sqlite)?;
        if rows == 0 {
            return Err(EngineError::not_found(format!("login '{login}' not found")));
        }
        Ok(())
    }

    fn database_exists(&mut self, name: &str) -> EngineResult<bool> {
        let in_catalog = self
            .catalog
            .query_row(
                "SELECT 1 FROM databases WHERE name = ?1",
                params![name],
                |_| Ok(()),
            )
            .optional()
            .map_err(map_sqlite)?
            .is_some();
        Ok(in_catalog || self.database_path(name)?.exists())
    }

    fn create_database(&mut self, name: &str, collation: &str) -> EngineResult<()> {
        let path = self.database_path(name)?;
        if self.database_exists(name)? {
            return Err(EngineError::already_exists(format!(
                "database '{name}' already exists"
            )));
        }

        let db = Connection::open(&path).map_err(map_sqlite)?;
        let bootstrap = db.execute_batch(DATABASE_BOOTSTRAP).and_then(|()| {
            db.execute(
                "INSERT INTO sqlgate_meta (key, value) VALUES ('collation', ?1)",
                params![collation],
            )
        });
        drop(db);
        if let Err(e) = bootstrap {
            remove_database_files(&path);
            return Err(map_sqlite(e));
        }

        let registered = self.catalog.execute(
            "INSERT INTO databases (name, collation, created_at) VALUES (?1, ?2, ?3)",
            params![name, collation, Utc::now().to_rfc3339()],
        );
        if let Err(e) = registered {
            remove_database_files(&path);
            return Err(map_constraint(e, || {
                format!("database '{name}' already exists")
            }));
        }

        Ok(())
    }

    fn drop_database(&mut self, name: &str) -> EngineResult<()> {
        let path = self.database_path(name)?;
        let rows = self
            .catalog
            .execute("DELETE FROM databases WHERE name = ?1", params![name])
            .map_err(map_sqlite)?;

        let had_file = path.exists();
        remove_database_files(&path);

        if rows == 0 && !had_file {
            return Err(EngineError::not_found(format!(
                "database '{name}' not found"
            )));
        }
        Ok(())
    }

    fn database_size_mb(&mut self, name: &str) -> EngineResult<f64> {
        let path = self.database_path(name)?;
        match fs::metadata(&path) {
            Ok(meta) => Ok(meta.len() as f64 / (1024.0 * 1024.0)),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(EngineError::not_found(format!(
                "database '{name}' not found"
            ))),
            Err(e) => Err(EngineError::unavailable(e.to_string())),
        }
    }

    fn grant(&mut self, database: &str, login: &str, level: PermissionLevel) -> EngineResult<()> {
        if !self.database_exists(database)? {
            return Err(EngineError::not_found(format!(
                "database '{database}' not found"
            )));
        }
        if !self.login_exists(login)? {
            return Err(EngineError::not_found(format!("login '{login}' not found")));
        }

        self.catalog
            .execute(
                "INSERT INTO permissions (database_name, login_name, role) VALUES (?1, ?2, ?3)
                 ON CONFLICT (database_name, login_name) DO UPDATE SET role = excluded.role",
                params![database, login, level.engine_role()],
            )
            .map_err(map_sqlite)?;
        Ok(())
    }

    fn revoke(&mut self, database: &str, login: &str) -> EngineResult<()> {
        let rows = self
            .catalog
            .execute(
                "DELETE FROM permissions WHERE database_name = ?1 AND login_name = ?2",
                params![database, login],
            )
            .map_err(map_sqlite)?;
        if rows == 0 {
            return Err(EngineError::not_found(format!(
                "login '{login}' has no permission on '{database}'"
            )));
        }
        Ok(())
    }

    fn backup_database(&mut self, name: &str, dest: &Path) -> EngineResult<u64> {
        let path = self.database_path(name)?;
        if !path.exists() {
            return Err(EngineError::not_found(format!(
                "database '{name}' not found"
            )));
        }

        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).map_err(|e| EngineError::unavailable(e.to_string()))?;
        }

        // Readers only ever see a complete file at `dest`.
        let partial = dest.with_extension("partial");
        let _ = fs::remove_file(&partial);

        let src = Connection::open_with_flags(&path, OpenFlags::SQLITE_OPEN_READ_ONLY)
            .map_err(map_sqlite)?;
        if let Err(e) = src.backup(DatabaseName::Main, &partial, None) {
            let _ = fs::remove_file(&partial);
            return Err(map_sqlite(e));
        }
        drop(src);

        fs::rename(&partial, dest).map_err(|e| EngineError::unavailable(e.to_string()))?;
        let size = fs::metadata(dest)
            .map_err(|e| EngineError::unavailable(e.to_string()))?
            .len();
        Ok(size)
    }
}

fn remove_database_files(path: &Path) {
    for suffix in ["", "-journal", "-wal", "-shm"] {
        let mut file = path.as_os_str().to_owned();
        file.push(suffix);
        if let Err(e) = fs::remove_file(&file) {
            if e.kind() != ErrorKind::NotFound {
                tracing::warn!(path = ?file, error = %e, "failed to remove database file");
            }
        }
    }
}

fn map_sqlite(e: rusqlite::Error) -> EngineError {
    match &e {
        rusqlite::Error::SqliteFailure(err, _)
            if matches!(
                err.code,
                ErrorCode::DatabaseBusy
                    | ErrorCode::DatabaseLocked
                    | ErrorCode::CannotOpen
                    | ErrorCode::SystemIoFailure
            ) =>
        {
            EngineError::unavailable(e.to_string())
        }
        _ => EngineError::rejected(e.to_string()),
    }
}

fn map_constraint(e: rusqlite::Error, message: impl FnOnce() -> String) -> EngineError {
    match &e {
        rusqlite::Error::SqliteFailure(err, _) if err.code == ErrorCode::ConstraintViolation => {
            EngineError::already_exists(message())
        }
        _ => map_sqlite(e),
    }
}
