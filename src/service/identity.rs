use chrono::Utc;
use serde::Serialize;
use uuid::Uuid;

use super::validation::{normalize_email, validate_password};
use crate::auth::{PasswordHasher, Session};
use crate::error::{Error, Result};
use crate::state::AppState;
use crate::store::Store;
use crate::types::{Role, User};

/// A user together with a freshly issued session token.
#[derive(Debug, Serialize)]
pub struct AuthOutcome {
    pub user: User,
    pub token: String,
}

/// Creates a user with the given role. Registration always uses
/// `Role::User`; admins are created from the CLI.
pub fn create_user(
    store: &dyn Store,
    hasher: &PasswordHasher,
    email: &str,
    password: &str,
    name: Option<String>,
    role: Role,
) -> Result<User> {
    let email = normalize_email(email)?;
    validate_password(password)?;

    if store.get_user_by_email(&email)?.is_some() {
        return Err(Error::conflict("email already registered"));
    }

    let user = User {
        id: Uuid::new_v4().to_string(),
        email,
        name: name.map(|n| n.trim().to_string()).filter(|n| !n.is_empty()),
        password_hash: hasher.hash(password)?,
        role,
        created_at: Utc::now(),
    };
    store.create_user(&user)?;

    tracing::info!(user_id = %user.id, role = %user.role, "user created");
    Ok(user)
}

pub fn register(
    state: &AppState,
    email: &str,
    password: &str,
    name: Option<String>,
) -> Result<User> {
    create_user(
        state.store.as_ref(),
        &state.hasher,
        email,
        password,
        name,
        Role::User,
    )
}

pub fn login(state: &AppState, email: &str, password: &str) -> Result<AuthOutcome> {
    let email = email.trim().to_ascii_lowercase();
    let Some(user) = state.store.get_user_by_email(&email)? else {
        state.hasher.verify_absent(password);
        return Err(Error::Unauthorized);
    };

    if !state.hasher.verify(password, &user.password_hash)? {
        tracing::debug!(user_id = %user.id, "login rejected");
        return Err(Error::Unauthorized);
    }

    let token = state.sessions.issue(&user)?;
    Ok(AuthOutcome { user, token })
}

/// Trades a valid token for a new one. Expired tokens and tokens for users
/// that no longer exist are `Unauthorized`.
pub fn refresh(state: &AppState, token: &str) -> Result<AuthOutcome> {
    let (session, token) = state.sessions.refresh(token)?;
    let user = state
        .store
        .get_user(&session.user_id)?
        .ok_or(Error::Unauthorized)?;
    Ok(AuthOutcome { user, token })
}

pub fn verify(state: &AppState, token: &str) -> Result<Session> {
    state.sessions.verify(token)
}
