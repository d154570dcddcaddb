mod schema;
mod sqlite;

pub use sqlite::SqliteStore;

use crate::error::Result;
use crate::types::*;

/// Store defines the application datastore interface.
pub trait Store: Send + Sync {
    fn initialize(&self) -> Result<()>;

    // User operations
    /// Fails `Conflict` when the email is taken.
    fn create_user(&self, user: &User) -> Result<()>;
    fn get_user(&self, id: &str) -> Result<Option<User>>;
    fn get_user_by_email(&self, email: &str) -> Result<Option<User>>;
    fn has_admin_user(&self) -> Result<bool>;

    // Credential operations
    /// Fails `Conflict` when the user or login name already has a row.
    fn create_sql_credential(&self, credential: &SqlCredential) -> Result<()>;
    fn get_sql_credential(&self, user_id: &str) -> Result<Option<SqlCredential>>;

    // Database record operations
    /// Fails `Conflict` when the name is taken.
    fn create_database_record(&self, record: &DatabaseRecord) -> Result<()>;
    fn get_database_record(&self, name: &str) -> Result<Option<DatabaseRecord>>;
    fn update_database_state(&self, name: &str, state: DatabaseState) -> Result<()>;
    fn update_database_size(&self, name: &str, size_mb: f64) -> Result<()>;
    /// Hard delete; grants on the database go with it.
    fn delete_database_record(&self, name: &str) -> Result<bool>;
    fn list_owned_databases(&self, owner_user_id: &str) -> Result<Vec<DatabaseRecord>>;
    /// Databases owned by `user_id` or granted to `login_name`, by name.
    fn list_accessible_databases(
        &self,
        user_id: &str,
        login_name: &str,
    ) -> Result<Vec<DatabaseRecord>>;
    fn list_all_databases(
        &self,
        search: Option<&str>,
        offset: i64,
        limit: i64,
    ) -> Result<Vec<DatabaseSummary>>;
    fn count_all_databases(&self, search: Option<&str>) -> Result<i64>;

    // Access grant operations
    /// Returns false when the grant already existed.
    fn create_access_grant(&self, grant: &AccessGrant) -> Result<bool>;
    fn get_access_grant(&self, database_name: &str, login_name: &str)
    -> Result<Option<AccessGrant>>;
    fn delete_access_grant(&self, database_name: &str, login_name: &str) -> Result<bool>;
    fn list_database_grants(&self, database_name: &str) -> Result<Vec<AccessGrant>>;
}
