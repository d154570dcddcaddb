use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::access;
use super::validation::{resolve_collation, validate_database_name};
use crate::auth::{self, Session};
use crate::engine::EngineErrorKind;
use crate::error::{Error, Result};
use crate::state::AppState;
use crate::types::{DatabaseRecord, DatabaseState};

/// Where a backup landed.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupResult {
    pub database: String,
    pub backup_path: String,
    pub size_bytes: u64,
    pub created_at: DateTime<Utc>,
}

/// Creates a database owned by `owner_user_id` and grants the owner's login
/// full rights. `actor` must be the owner or an admin.
pub async fn create_database(
    state: &AppState,
    actor: &Session,
    owner_user_id: &str,
    name: &str,
    collation: Option<&str>,
) -> Result<DatabaseRecord> {
    validate_database_name(name)?;
    let collation = resolve_collation(&state.config.engine, collation)?;
    auth::require(actor.role, &actor.user_id, owner_user_id)?;

    let store = state.store.as_ref();
    store
        .get_user(owner_user_id)?
        .ok_or_else(|| Error::not_found("owner not found"))?;

    let _guard = state.locks.databases.lock(name).await;

    if store.get_database_record(name)?.is_some() {
        return Err(Error::conflict(format!("database '{name}' already exists")));
    }
    let exists = {
        let name = name.to_string();
        state
            .engine
            .run(move |conn| conn.database_exists(&name))
            .await?
    };
    if exists {
        return Err(Error::conflict(format!("database '{name}' already exists")));
    }

    let mut record = DatabaseRecord {
        name: name.to_string(),
        owner_user_id: owner_user_id.to_string(),
        collation: collation.clone(),
        size_mb: 0.0,
        created_at: Utc::now(),
        state_desc: DatabaseState::Provisioning,
    };
    store.create_database_record(&record)?;

    let created = {
        let (name, collation) = (name.to_string(), collation);
        state
            .engine
            .run(move |conn| conn.create_database(&name, &collation))
            .await
    };
    if let Err(e) = created {
        tracing::warn!(database = name, error = %e, "engine failed to create database");
        let left = match e.kind {
            EngineErrorKind::AlreadyExists
            | EngineErrorKind::Rejected
            | EngineErrorKind::NotFound => Leftover::Nothing,
            EngineErrorKind::Timeout | EngineErrorKind::Unavailable => Leftover::Unknown,
        };
        roll_back_create(state, name, left).await;
        return Err(e.into());
    }

    // Read after the record exists so a concurrent provisioning either
    // sees the record or is seen here.
    if let Some(credential) = store.get_sql_credential(owner_user_id)? {
        if let Err(e) = access::grant_owner(state, name, &credential.login_name).await {
            tracing::warn!(database = name, error = %e, "owner grant failed");
            roll_back_create(state, name, Leftover::Database).await;
            return Err(e);
        }
    }

    let size = {
        let name = name.to_string();
        state
            .engine
            .run(move |conn| conn.database_size_mb(&name))
            .await
    };
    match size {
        Ok(size_mb) => {
            store.update_database_size(name, size_mb)?;
            record.size_mb = size_mb;
        }
        Err(e) => tracing::debug!(database = name, error = %e, "size unavailable"),
    }

    store.update_database_state(name, DatabaseState::Online)?;
    record.state_desc = DatabaseState::Online;

    tracing::info!(
        actor = %actor.user_id,
        owner = owner_user_id,
        database = name,
        collation = %record.collation,
        "database created"
    );
    Ok(record)
}

/// Drops the database and its record. Grants go with the record.
pub async fn delete_database(state: &AppState, actor: &Session, name: &str) -> Result<()> {
    let _guard = state.locks.databases.lock(name).await;
    let store = state.store.as_ref();

    let record = store
        .get_database_record(name)?
        .ok_or_else(|| Error::not_found("database not found"))?;
    auth::require(actor.role, &actor.user_id, &record.owner_user_id)?;

    store.update_database_state(name, DatabaseState::Deleting)?;

    let dropped = {
        let name = name.to_string();
        state
            .engine
            .run(move |conn| conn.drop_database(&name))
            .await
    };
    match dropped {
        Ok(()) => {}
        Err(e) if e.kind == EngineErrorKind::NotFound => {
            tracing::debug!(database = name, "database already gone from engine");
        }
        Err(e) => {
            tracing::error!(
                database = name,
                error = %e,
                "engine drop failed; record marked FAILED"
            );
            store.update_database_state(name, DatabaseState::Failed)?;
            return Err(e.into());
        }
    }

    store.delete_database_record(name)?;

    tracing::info!(actor = %actor.user_id, database = name, "database deleted");
    Ok(())
}

/// Writes a backup to the managed backup directory. Backups of one name
/// never overlap; a failed backup leaves the database online.
pub async fn backup_database(
    state: &AppState,
    actor: &Session,
    name: &str,
) -> Result<BackupResult> {
    let _guard = state.locks.databases.lock(name).await;
    let store = state.store.as_ref();

    let record = store
        .get_database_record(name)?
        .ok_or_else(|| Error::not_found("database not found"))?;
    auth::require(actor.role, &actor.user_id, &record.owner_user_id)?;
    if record.state_desc != DatabaseState::Online {
        return Err(Error::conflict(format!(
            "database is {}, not ONLINE",
            record.state_desc
        )));
    }

    let dir = state.config.backup_dir().join(name);
    tokio::fs::create_dir_all(&dir).await?;

    let created_at = Utc::now();
    let dest = next_backup_file(&dir, name, created_at).await?;

    store.update_database_state(name, DatabaseState::BackingUp)?;
    let written = {
        let (name, dest) = (name.to_string(), dest.clone());
        state
            .engine
            .run(move |conn| conn.backup_database(&name, &dest))
            .await
    };
    store.update_database_state(name, DatabaseState::Online)?;

    let size_bytes = written.map_err(|e| {
        tracing::warn!(database = name, error = %e, "backup failed");
        Error::from(e)
    })?;

    tracing::info!(
        actor = %actor.user_id,
        database = name,
        path = %dest.display(),
        size_bytes,
        "backup written"
    );
    Ok(BackupResult {
        database: name.to_string(),
        backup_path: dest.display().to_string(),
        size_bytes,
        created_at,
    })
}

/// First unused backup path for `at`. Callers hold the database lock, so
/// nothing else picks the same path before the backup is written.
async fn next_backup_file(dir: &Path, name: &str, at: DateTime<Utc>) -> Result<PathBuf> {
    let mut dest = backup_file(dir, name, at, 0);
    let mut seq = 1;
    while tokio::fs::try_exists(&dest).await? {
        dest = backup_file(dir, name, at, seq);
        seq += 1;
    }
    Ok(dest)
}

fn backup_file(dir: &Path, name: &str, at: DateTime<Utc>, seq: u32) -> PathBuf {
    let stamp = at.format("%Y%m%dT%H%M%S%.3fZ");
    match seq {
        0 => dir.join(format!("{name}_{stamp}.bak")),
        n => dir.join(format!("{name}_{stamp}_{n}.bak")),
    }
}

/// What a failed create may have left on the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Leftover {
    /// The engine refused the create.
    Nothing,
    /// The create timed out or lost its connection and may still land.
    Unknown,
    /// The database exists; a later step failed.
    Database,
}

/// Undoes a failed create. When the engine may hold the database it is
/// dropped first; if that fails the record stays as `FAILED`.
async fn roll_back_create(state: &AppState, name: &str, left: Leftover) {
    let store = state.store.as_ref();

    let dropped = if left == Leftover::Nothing {
        Ok(())
    } else {
        let target = name.to_string();
        match state
            .engine
            .run(move |conn| conn.drop_database(&target))
            .await
        {
            // Missing after a timeout proves nothing; the create may be in flight.
            Err(e) if e.kind == EngineErrorKind::NotFound && left == Leftover::Database => Ok(()),
            other => other,
        }
    };

    let outcome = match dropped {
        Ok(()) => store.delete_database_record(name).map(|_| ()),
        Err(e) => {
            tracing::error!(
                database = name,
                error = %e,
                "rollback failed; record marked FAILED"
            );
            store.update_database_state(name, DatabaseState::Failed)
        }
    };
    if let Err(e) = outcome {
        tracing::error!(database = name, error = %e, "failed to record rollback");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_backup_file_name() {
        let at = Utc.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap();
        let path = backup_file(Path::new("/b/shop_db"), "shop_db", at, 0);
        assert_eq!(
            path,
            PathBuf::from("/b/shop_db/shop_db_20240309T140507.000Z.bak")
        );
    }

    #[tokio::test]
    async fn test_backup_in_same_millisecond_gets_new_path() {
        let dir = tempfile::tempdir().unwrap();
        let at = Utc.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap();

        let first = next_backup_file(dir.path(), "shop_db", at).await.unwrap();
        std::fs::write(&first, b"first").unwrap();
        let second = next_backup_file(dir.path(), "shop_db", at).await.unwrap();
        std::fs::write(&second, b"second").unwrap();
        let third = next_backup_file(dir.path(), "shop_db", at).await.unwrap();

        assert_eq!(
            second.file_name().unwrap(),
            "shop_db_20240309T140507.000Z_1.bak"
        );
        assert_eq!(
            third.file_name().unwrap(),
            "shop_db_20240309T140507.000Z_2.bak"
        );
        assert_eq!(std::fs::read(&first).unwrap(), b"first");
    }
}
