use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{PermissionLevel, Role};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip)]
    pub password_hash: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

/// Engine login belonging to exactly one user.
#[derive(Debug, Clone)]
pub struct SqlCredential {
    pub user_id: String,
    pub login_name: String,
    pub encrypted_password: String,
    pub server_host: String,
    pub port: u16,
    pub created_at: DateTime<Utc>,
}

/// Lifecycle state of a database record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DatabaseState {
    Provisioning,
    Online,
    BackingUp,
    Deleting,
    /// Terminal. Deleting removes the row, so this is only ever reported,
    /// never stored.
    Deleted,
    Failed,
}

impl DatabaseState {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            DatabaseState::Provisioning => "PROVISIONING",
            DatabaseState::Online => "ONLINE",
            DatabaseState::BackingUp => "BACKING_UP",
            DatabaseState::Deleting => "DELETING",
            DatabaseState::Deleted => "DELETED",
            DatabaseState::Failed => "FAILED",
        }
    }

    pub fn parse(s: &str) -> Option<DatabaseState> {
        match s {
            "PROVISIONING" => Some(DatabaseState::Provisioning),
            "ONLINE" => Some(DatabaseState::Online),
            "BACKING_UP" => Some(DatabaseState::BackingUp),
            "DELETING" => Some(DatabaseState::Deleting),
            "DELETED" => Some(DatabaseState::Deleted),
            "FAILED" => Some(DatabaseState::Failed),
            _ => None,
        }
    }

    /// States in which the database is usable by tenants.
    #[must_use]
    pub const fn is_visible(self) -> bool {
        matches!(self, DatabaseState::Online | DatabaseState::BackingUp)
    }
}

impl fmt::Display for DatabaseState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseRecord {
    pub name: String,
    pub owner_user_id: String,
    pub collation: String,
    pub size_mb: f64,
    pub created_at: DateTime<Utc>,
    pub state_desc: DatabaseState,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessGrant {
    pub database_name: String,
    pub login_name: String,
    pub granted_at: DateTime<Utc>,
    pub permission_level: PermissionLevel,
}

/// Cross-tenant listing row, joined with the owner's email.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseSummary {
    pub name: String,
    pub owner_user_id: String,
    pub owner_email: String,
    pub collation: String,
    pub size_mb: f64,
    pub created_at: DateTime<Utc>,
    pub state_desc: DatabaseState,
}
