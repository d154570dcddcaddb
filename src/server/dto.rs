use serde::{Deserialize, Serialize};

use crate::types::{DatabaseRecord, PermissionLevel, User};

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub user: User,
    pub token: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GrantAccessRequest {
    pub database_name: String,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub permission_level: Option<PermissionLevel>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevokeAccessRequest {
    pub database_name: String,
    pub user_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessibleDatabasesResponse {
    pub databases: Vec<String>,
    pub has_credentials: bool,
}

#[derive(Debug, Deserialize)]
pub struct CreateDatabaseRequest {
    pub name: String,
    #[serde(default)]
    pub collation: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminCreateDatabaseRequest {
    pub database_name: String,
    pub user_id: String,
    #[serde(default)]
    pub collation: Option<String>,
}

/// A database as listed to a tenant.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseResponse {
    #[serde(flatten)]
    pub record: DatabaseRecord,
    pub is_owner: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct ConfirmParams {
    #[serde(default)]
    pub confirm: Option<String>,
}

impl ConfirmParams {
    /// True only when `confirm` repeats the target name exactly.
    #[must_use]
    pub fn confirms(&self, name: &str) -> bool {
        self.confirm.as_deref() == Some(name)
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct AdminListParams {
    #[serde(default)]
    pub page: Option<u32>,
    #[serde(default)]
    pub limit: Option<u32>,
    #[serde(default)]
    pub search: Option<String>,
}
