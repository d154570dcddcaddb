use chrono::Utc;

use crate::auth::{self, Session};
use crate::engine::EngineErrorKind;
use crate::error::{Error, Result};
use crate::state::AppState;
use crate::store::Store;
use crate::types::{AccessGrant, DatabaseRecord, DatabaseState, PermissionLevel};

/// Names of the databases the user can reach through their login.
///
/// A user without a login sees nothing, however many databases exist.
pub fn list_accessible_databases(store: &dyn Store, user_id: &str) -> Result<Vec<String>> {
    Ok(list_accessible_records(store, user_id)?
        .into_iter()
        .map(|record| record.name)
        .collect())
}

/// Owned and granted databases for a user with a login, in name order.
pub fn list_accessible_records(store: &dyn Store, user_id: &str) -> Result<Vec<DatabaseRecord>> {
    let Some(credential) = store.get_sql_credential(user_id)? else {
        return Ok(Vec::new());
    };

    Ok(store
        .list_accessible_databases(user_id, &credential.login_name)?
        .into_iter()
        .filter(|record| record.state_desc.is_visible())
        .collect())
}

/// Grants `user_id`'s login `level` on `database`. The actor must own the
/// database or be an admin. Repeating an identical grant is a no-op.
pub async fn grant_access(
    state: &AppState,
    actor: &Session,
    user_id: &str,
    database: &str,
    level: PermissionLevel,
) -> Result<AccessGrant> {
    let _guard = state.locks.databases.lock(database).await;
    let store = state.store.as_ref();

    let record = store
        .get_database_record(database)?
        .ok_or_else(|| Error::not_found("database not found"))?;
    auth::require(actor.role, &actor.user_id, &record.owner_user_id)?;
    if !record.state_desc.is_visible() {
        return Err(Error::conflict(format!("database is {}", record.state_desc)));
    }
    if record.owner_user_id == user_id && level != PermissionLevel::Owner {
        return Err(Error::bad_request("the owner's access cannot be lowered"));
    }

    let credential = store
        .get_sql_credential(user_id)?
        .ok_or_else(|| Error::not_found("user has no SQL login"))?;
    let login = credential.login_name;

    let existing = store.get_access_grant(database, &login)?;
    if let Some(grant) = &existing {
        if grant.permission_level == level {
            return Ok(grant.clone());
        }
    }

    {
        let (database, login) = (database.to_string(), login.clone());
        state
            .engine
            .run(move |conn| conn.grant(&database, &login, level))
            .await?;
    }

    if existing.is_some() {
        store.delete_access_grant(database, &login)?;
    }
    let grant = AccessGrant {
        database_name: database.to_string(),
        login_name: login,
        granted_at: Utc::now(),
        permission_level: level,
    };
    store.create_access_grant(&grant)?;

    tracing::info!(
        actor = %actor.user_id,
        user_id,
        database,
        level = %level,
        "database access granted"
    );
    Ok(grant)
}

/// Removes an explicit grant. The owner's implicit grant cannot be revoked.
pub async fn revoke_access(
    state: &AppState,
    actor: &Session,
    user_id: &str,
    database: &str,
) -> Result<()> {
    let _guard = state.locks.databases.lock(database).await;
    let store = state.store.as_ref();

    let record = store
        .get_database_record(database)?
        .ok_or_else(|| Error::not_found("database not found"))?;
    auth::require(actor.role, &actor.user_id, &record.owner_user_id)?;

    if record.owner_user_id == user_id {
        return Err(Error::bad_request("cannot revoke the owner's access"));
    }

    let credential = store
        .get_sql_credential(user_id)?
        .ok_or_else(|| Error::not_found("user has no SQL login"))?;
    let login = credential.login_name;

    if store.get_access_grant(database, &login)?.is_none() {
        return Err(Error::not_found("grant not found"));
    }

    let revoked = {
        let (database, login) = (database.to_string(), login.clone());
        state
            .engine
            .run(move |conn| conn.revoke(&database, &login))
            .await
    };
    match revoked {
        Ok(()) => {}
        Err(e) if e.kind == EngineErrorKind::NotFound => {}
        Err(e) => return Err(e.into()),
    }

    store.delete_access_grant(database, &login)?;

    tracing::info!(actor = %actor.user_id, user_id, database, "database access revoked");
    Ok(())
}

/// Gives a newly provisioned login owner rights on every database its user
/// already owns. Failures are logged; the owner still sees the databases
/// through ownership.
pub(crate) async fn grant_owned_databases(state: &AppState, user_id: &str, login: &str) {
    let owned = match state.store.list_owned_databases(user_id) {
        Ok(owned) => owned,
        Err(e) => {
            tracing::warn!(user_id, error = %e, "failed to list owned databases");
            return;
        }
    };

    for record in owned {
        let _guard = state.locks.databases.lock(&record.name).await;
        if let Err(e) = grant_owner(state, &record.name, login).await {
            tracing::warn!(
                user_id,
                database = %record.name,
                error = %e,
                "failed to grant owner access"
            );
        }
    }
}

/// Engine and datastore owner grant. Caller holds the database lock.
pub(crate) async fn grant_owner(state: &AppState, database: &str, login: &str) -> Result<()> {
    match state.store.get_database_record(database)? {
        Some(record)
            if record.state_desc.is_visible()
                || record.state_desc == DatabaseState::Provisioning => {}
        _ => return Ok(()),
    }

    {
        let (database, login) = (database.to_string(), login.to_string());
        state
            .engine
            .run(move |conn| conn.grant(&database, &login, PermissionLevel::Owner))
            .await?;
    }

    state.store.create_access_grant(&AccessGrant {
        database_name: database.to_string(),
        login_name: login.to_string(),
        granted_at: Utc::now(),
        permission_level: PermissionLevel::Owner,
    })?;
    Ok(())
}
