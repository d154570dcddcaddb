use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub data_dir: PathBuf,
    pub engine: EngineConfig,
    pub session: SessionConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Maximum number of concurrent engine connections.
    pub pool_size: u32,
    pub acquire_timeout_secs: u64,
    /// Upper bound on any single engine command.
    pub command_timeout_secs: u64,
    /// Host name shown to tenants alongside their credentials.
    pub public_host: String,
    pub public_port: u16,
    pub default_collation: String,
    /// Collations accepted on database creation.
    pub collations: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub token_ttl_secs: u64,
}

impl ServerConfig {
    /// Reads a TOML config file. Missing keys keep their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: ServerConfig = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("{}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.engine.pool_size == 0 {
            return Err(Error::Config("engine.pool_size must be at least 1".into()));
        }
        if self.engine.command_timeout_secs == 0 {
            return Err(Error::Config(
                "engine.command_timeout_secs must be at least 1".into(),
            ));
        }
        if !self
            .engine
            .collations
            .iter()
            .any(|c| c == &self.engine.default_collation)
        {
            return Err(Error::Config(format!(
                "engine.default_collation '{}' is not in engine.collations",
                self.engine.default_collation
            )));
        }
        Ok(())
    }

    pub fn socket_addr(&self) -> std::result::Result<SocketAddr, std::net::AddrParseError> {
        format!("{}:{}", self.host, self.port).parse()
    }

    #[must_use]
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("sqlgate.db")
    }

    #[must_use]
    pub fn engine_dir(&self) -> PathBuf {
        self.data_dir.join("engine")
    }

    #[must_use]
    pub fn backup_dir(&self) -> PathBuf {
        self.data_dir.join("backups")
    }

    #[must_use]
    pub fn session_key_path(&self) -> PathBuf {
        self.data_dir.join(".session_key")
    }

    #[must_use]
    pub fn credential_key_path(&self) -> PathBuf {
        self.data_dir.join(".credential_key")
    }
}

impl EngineConfig {
    #[must_use]
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.acquire_timeout_secs)
    }

    #[must_use]
    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }
}

impl SessionConfig {
    #[must_use]
    pub fn token_ttl(&self) -> Duration {
        Duration::from_secs(self.token_ttl_secs)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            data_dir: PathBuf::from("./data"),
            engine: EngineConfig::default(),
            session: SessionConfig::default(),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            pool_size: 10,
            acquire_timeout_secs: 10,
            command_timeout_secs: 30,
            public_host: "localhost".to_string(),
            public_port: 1433,
            default_collation: "SQL_Latin1_General_CP1_CI_AS".to_string(),
            collations: [
                "SQL_Latin1_General_CP1_CI_AS",
                "SQL_Latin1_General_CP1_CS_AS",
                "Latin1_General_CI_AS",
                "Latin1_General_CS_AS",
                "Latin1_General_BIN2",
                "Latin1_General_100_CI_AS_SC_UTF8",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            token_ttl_secs: 60 * 60,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("sqlgate.toml");
        std::fs::write(
            &path,
            "port = 9000\n\n[engine]\npool_size = 4\npublic_host = \"sql.example.com\"\n",
        )
        .unwrap();

        let config = ServerConfig::load(&path).unwrap();
        assert_eq!(config.port, 9000);
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.engine.pool_size, 4);
        assert_eq!(config.engine.public_host, "sql.example.com");
        assert_eq!(config.engine.command_timeout_secs, 30);
        assert_eq!(config.session.token_ttl_secs, 3600);
    }

    #[test]
    fn test_default_collation_must_be_allowed() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("sqlgate.toml");
        std::fs::write(
            &path,
            "[engine]\ndefault_collation = \"Klingon_CI\"\n",
        )
        .unwrap();

        assert!(matches!(ServerConfig::load(&path), Err(Error::Config(_))));
    }

    #[test]
    fn test_derived_paths() {
        let config = ServerConfig {
            data_dir: PathBuf::from("/srv/sqlgate"),
            ..ServerConfig::default()
        };
        assert_eq!(config.db_path(), Path::new("/srv/sqlgate/sqlgate.db"));
        assert_eq!(config.backup_dir(), Path::new("/srv/sqlgate/backups"));
        assert_eq!(config.engine_dir(), Path::new("/srv/sqlgate/engine"));
    }
}
