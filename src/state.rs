use std::fs;
use std::path::Path;
use std::sync::Arc;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use rand::RngCore;

use crate::auth::{PasswordHasher, SessionManager};
use crate::config::ServerConfig;
use crate::engine::{Engine, EnginePool, SqliteEngine};
use crate::error::{Error, Result};
use crate::service::{CredentialCipher, LockRegistry};
use crate::store::{SqliteStore, Store};

const SECRET_BYTES: usize = 32;

/// Process-wide state shared by every request.
pub struct AppState {
    pub config: ServerConfig,
    pub store: Arc<dyn Store>,
    pub engine: EnginePool,
    pub locks: LockRegistry,
    pub sessions: SessionManager,
    pub cipher: CredentialCipher,
    pub hasher: PasswordHasher,
}

impl AppState {
    pub fn new(
        config: ServerConfig,
        store: Arc<dyn Store>,
        engine: Arc<dyn Engine>,
        session_key: &[u8],
        credential_key: &[u8],
    ) -> Result<Self> {
        config.validate()?;

        let pool = EnginePool::new(
            engine,
            config.engine.pool_size,
            config.engine.acquire_timeout(),
            config.engine.command_timeout(),
        );

        Ok(Self {
            sessions: SessionManager::new(session_key, config.session.token_ttl())?,
            cipher: CredentialCipher::new(credential_key)?,
            config,
            store,
            engine: pool,
            locks: LockRegistry::default(),
            hasher: PasswordHasher::new(),
        })
    }

    /// Opens the datastore, engine and secrets under `config.data_dir`.
    pub fn open(config: ServerConfig) -> Result<Self> {
        let session_key = read_secret(&config.session_key_path())?;
        let credential_key = read_secret(&config.credential_key_path())?;

        let store = SqliteStore::new(config.db_path())?;
        store.initialize()?;

        let engine = SqliteEngine::open(config.engine_dir(), config.engine.command_timeout())?;

        Self::new(
            config,
            Arc::new(store),
            Arc::new(engine),
            &session_key,
            &credential_key,
        )
    }

    /// Waits for in-flight engine calls, then releases pooled connections.
    pub async fn shutdown(&self) {
        tracing::info!(in_use = self.engine.in_use(), "draining engine pool");
        self.engine.close().await;
    }
}

/// Generates a random 256-bit secret, base64-encoded.
#[must_use]
pub fn generate_secret() -> String {
    let mut bytes = [0u8; SECRET_BYTES];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    STANDARD.encode(bytes)
}

/// Writes a freshly generated secret to `path`, readable only by the owner.
pub fn write_secret(path: &Path) -> Result<()> {
    fs::write(path, generate_secret())?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if let Err(e) = fs::set_permissions(path, fs::Permissions::from_mode(0o600)) {
            tracing::warn!("Failed to set permissions on {}: {e}", path.display());
        }
    }

    Ok(())
}

pub fn read_secret(path: &Path) -> Result<Vec<u8>> {
    let encoded = fs::read_to_string(path).map_err(|e| {
        Error::Config(format!(
            "cannot read secret {}: {e} (run 'sqlgate admin init' first)",
            path.display()
        ))
    })?;
    let bytes = STANDARD
        .decode(encoded.trim())
        .map_err(|e| Error::Config(format!("{} is not valid base64: {e}", path.display())))?;
    if bytes.len() != SECRET_BYTES {
        return Err(Error::Config(format!(
            "{} must hold {SECRET_BYTES} bytes",
            path.display()
        )));
    }
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_secret_round_trip() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(".session_key");

        write_secret(&path).unwrap();
        let secret = read_secret(&path).unwrap();
        assert_eq!(secret.len(), SECRET_BYTES);

        write_secret(&path).unwrap();
        assert_ne!(read_secret(&path).unwrap(), secret);
    }

    #[test]
    fn test_missing_secret_is_config_error() {
        let temp = TempDir::new().unwrap();
        let result = read_secret(&temp.path().join("absent"));
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_open_requires_init() {
        let temp = TempDir::new().unwrap();
        let config = ServerConfig {
            data_dir: temp.path().to_path_buf(),
            ..ServerConfig::default()
        };
        assert!(matches!(AppState::open(config), Err(Error::Config(_))));
    }
}
