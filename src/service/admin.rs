use serde::Serialize;

use super::lifecycle::{self, BackupResult};
use crate::auth::Session;
use crate::error::{Error, Result};
use crate::state::AppState;
use crate::types::{DatabaseRecord, DatabaseSummary};

pub const DEFAULT_PAGE: u32 = 1;
pub const DEFAULT_LIMIT: u32 = 20;
pub const MAX_LIMIT: u32 = 100;

/// One page of the cross-tenant listing.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabasePage {
    pub items: Vec<DatabaseSummary>,
    pub total: u64,
    pub page: u32,
    pub limit: u32,
    pub total_pages: u64,
}

fn require_admin(actor: &Session) -> Result<()> {
    if actor.is_admin() {
        Ok(())
    } else {
        Err(Error::forbidden("administrator role required"))
    }
}

/// Lists every tenant's databases with their owner's email, ignoring grants.
/// `search` matches the database name or owner email.
pub fn list_all_databases(
    state: &AppState,
    actor: &Session,
    page: Option<u32>,
    limit: Option<u32>,
    search: Option<&str>,
) -> Result<DatabasePage> {
    require_admin(actor)?;

    let page = page.unwrap_or(DEFAULT_PAGE);
    let limit = limit.unwrap_or(DEFAULT_LIMIT);
    if page == 0 {
        return Err(Error::bad_request("page must be at least 1"));
    }
    if limit == 0 || limit > MAX_LIMIT {
        return Err(Error::bad_request(format!(
            "limit must be between 1 and {MAX_LIMIT}"
        )));
    }
    let search = search.map(str::trim).filter(|s| !s.is_empty());

    let offset = i64::from(page - 1) * i64::from(limit);
    let items = state
        .store
        .list_all_databases(search, offset, i64::from(limit))?;
    let total = u64::try_from(state.store.count_all_databases(search)?).unwrap_or_default();

    Ok(DatabasePage {
        items,
        total,
        page,
        limit,
        total_pages: total.div_ceil(u64::from(limit)),
    })
}

/// Creates a database on behalf of `owner_user_id`.
pub async fn create_database_for_user(
    state: &AppState,
    actor: &Session,
    owner_user_id: &str,
    name: &str,
    collation: Option<&str>,
) -> Result<DatabaseRecord> {
    require_admin(actor)?;
    lifecycle::create_database(state, actor, owner_user_id, name, collation).await
}

pub async fn delete_database(state: &AppState, actor: &Session, name: &str) -> Result<()> {
    require_admin(actor)?;
    lifecycle::delete_database(state, actor, name).await
}

pub async fn backup_database(
    state: &AppState,
    actor: &Session,
    name: &str,
) -> Result<BackupResult> {
    require_admin(actor)?;
    lifecycle::backup_database(state, actor, name).await
}
