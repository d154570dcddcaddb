use chrono::Utc;
use rand::Rng;
use rand::seq::SliceRandom;
use serde::Serialize;

use super::access;
use crate::engine::{EngineErrorKind, EngineResult};
use crate::error::{Error, Result};
use crate::state::AppState;
use crate::types::SqlCredential;

pub const LOGIN_PREFIX: &str = "tenant_";
pub const GENERATED_PASSWORD_LEN: usize = 24;

const UPPER: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ";
const LOWER: &[u8] = b"abcdefghijkmnopqrstuvwxyz";
const DIGITS: &[u8] = b"23456789";
const SYMBOLS: &[u8] = b"!#$%*+-=?@^_";

/// Credentials as shown to their owner.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvisionedCredentials {
    pub username: String,
    pub password: String,
    pub server: String,
    pub port: u16,
}

/// Engine login name for a user. Derived from the user id only, so it is
/// unique and never changes.
#[must_use]
pub fn login_name_for(user_id: &str) -> String {
    let id: String = user_id
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_lowercase())
        .collect();
    format!("{LOGIN_PREFIX}{id}")
}

/// Random password with at least one character from every class.
#[must_use]
pub fn generate_password() -> String {
    let mut rng = rand::thread_rng();
    let classes = [UPPER, LOWER, DIGITS, SYMBOLS];
    let all: Vec<u8> = classes.concat();

    let mut chars: Vec<u8> = classes
        .iter()
        .map(|class| class[rng.gen_range(0..class.len())])
        .collect();
    while chars.len() < GENERATED_PASSWORD_LEN {
        chars.push(all[rng.gen_range(0..all.len())]);
    }
    chars.shuffle(&mut rng);

    chars.into_iter().map(char::from).collect()
}

/// Creates the user's engine login and stores it encrypted. The plaintext
/// is returned here and from [`get_credentials`].
pub async fn create_sql_user(state: &AppState, user_id: &str) -> Result<ProvisionedCredentials> {
    let _guard = state.locks.users.lock(user_id).await;
    let store = state.store.as_ref();

    store
        .get_user(user_id)?
        .ok_or_else(|| Error::not_found("user not found"))?;

    if store.get_sql_credential(user_id)?.is_some() {
        return Err(Error::conflict("SQL login already provisioned"));
    }

    let login = login_name_for(user_id);
    let password = generate_password();
    let encrypted_password = state.cipher.encrypt(&password)?;

    let created = match create_login(state, &login, &password).await {
        // No credential row exists, so the login is left over from an
        // attempt whose create landed after it was given up on.
        Err(e) if e.kind == EngineErrorKind::AlreadyExists => {
            tracing::warn!(user_id, login = %login, "reclaiming orphaned engine login");
            drop_login(state, &login, Landed::Yes).await;
            create_login(state, &login, &password).await
        }
        other => other,
    };
    if let Err(e) = created {
        if matches!(e.kind, EngineErrorKind::Timeout | EngineErrorKind::Unavailable) {
            drop_login(state, &login, Landed::Unknown).await;
        }
        tracing::warn!(user_id, login = %login, error = %e, "engine refused login creation");
        return Err(e.into());
    }

    let credential = SqlCredential {
        user_id: user_id.to_string(),
        login_name: login.clone(),
        encrypted_password,
        server_host: state.config.engine.public_host.clone(),
        port: state.config.engine.public_port,
        created_at: Utc::now(),
    };
    if let Err(e) = store.create_sql_credential(&credential) {
        drop_login(state, &login, Landed::Yes).await;
        return Err(e);
    }

    tracing::info!(user_id, login = %login, "SQL login provisioned");

    access::grant_owned_databases(state, user_id, &login).await;

    Ok(ProvisionedCredentials {
        username: credential.login_name,
        password,
        server: credential.server_host,
        port: credential.port,
    })
}

pub fn get_credentials(state: &AppState, user_id: &str) -> Result<ProvisionedCredentials> {
    let credential = state
        .store
        .get_sql_credential(user_id)?
        .ok_or_else(|| Error::not_found("SQL login not provisioned"))?;

    Ok(ProvisionedCredentials {
        password: state.cipher.decrypt(&credential.encrypted_password)?,
        username: credential.login_name,
        server: credential.server_host,
        port: credential.port,
    })
}

async fn create_login(
    state: &AppState,
    login: &str,
    password: &str,
) -> EngineResult<()> {
    let (login, password) = (login.to_string(), password.to_string());
    state
        .engine
        .run(move |conn| conn.create_login(&login, &password))
        .await
}

/// Whether a login being rolled back is known to exist on the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Landed {
    Yes,
    /// The create timed out or lost its connection and may still land.
    Unknown,
}

async fn drop_login(state: &AppState, login: &str, landed: Landed) {
    let target = login.to_string();
    match state
        .engine
        .run(move |conn| conn.drop_login(&target))
        .await
    {
        Ok(()) => tracing::info!(login, "rolled back engine login"),
        Err(e) if e.kind == EngineErrorKind::NotFound && landed == Landed::Yes => {}
        Err(e) if e.kind == EngineErrorKind::NotFound => tracing::error!(
            login,
            "login not on engine yet; it may still be created and need manual reconciliation"
        ),
        Err(e) => tracing::error!(
            login,
            error = %e,
            "failed to roll back engine login; manual reconciliation required"
        ),
    }
}
