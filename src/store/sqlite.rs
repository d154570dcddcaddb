use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row, params};

use super::Store;
use super::schema::SCHEMA;
use crate::error::{Error, Result};
use crate::types::*;

const DATABASE_COLUMNS: &str = "name, owner_user_id, collation, size_mb, created_at, state_desc";

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let conn = Connection::open(db_path)?;

        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.pragma_update(None, "journal_mode", "WAL")?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| {
            // Handle SQLite's default datetime format: "YYYY-MM-DD HH:MM:SS"
            chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc())
        })
        .unwrap_or_else(|e| {
            tracing::error!("Invalid datetime in database: '{}' - {}", s, e);
            Utc::now()
        })
}

fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

fn conversion_error(idx: usize, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, message.into())
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    let role: String = row.get(4)?;
    Ok(User {
        id: row.get(0)?,
        email: row.get(1)?,
        name: row.get(2)?,
        password_hash: row.get(3)?,
        role: Role::parse(&role).ok_or_else(|| conversion_error(4, format!("unknown role '{role}'")))?,
        created_at: parse_datetime(&row.get::<_, String>(5)?),
    })
}

fn credential_from_row(row: &Row<'_>) -> rusqlite::Result<SqlCredential> {
    Ok(SqlCredential {
        user_id: row.get(0)?,
        login_name: row.get(1)?,
        encrypted_password: row.get(2)?,
        server_host: row.get(3)?,
        port: row.get(4)?,
        created_at: parse_datetime(&row.get::<_, String>(5)?),
    })
}

fn state_from_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<DatabaseState> {
    let state: String = row.get(idx)?;
    DatabaseState::parse(&state)
        .ok_or_else(|| conversion_error(idx, format!("unknown database state '{state}'")))
}

fn database_from_row(row: &Row<'_>) -> rusqlite::Result<DatabaseRecord> {
    Ok(DatabaseRecord {
        name: row.get(0)?,
        owner_user_id: row.get(1)?,
        collation: row.get(2)?,
        size_mb: row.get(3)?,
        created_at: parse_datetime(&row.get::<_, String>(4)?),
        state_desc: state_from_column(row, 5)?,
    })
}

fn grant_from_row(row: &Row<'_>) -> rusqlite::Result<AccessGrant> {
    let level: String = row.get(3)?;
    Ok(AccessGrant {
        database_name: row.get(0)?,
        login_name: row.get(1)?,
        granted_at: parse_datetime(&row.get::<_, String>(2)?),
        permission_level: PermissionLevel::parse(&level)
            .ok_or_else(|| conversion_error(3, format!("unknown permission '{level}'")))?,
    })
}

/// Maps unique/primary-key violations to `Conflict` and foreign-key
/// violations to `NotFound`.
fn map_constraint(e: rusqlite::Error, conflict: &str, missing: &str) -> Error {
    if let rusqlite::Error::SqliteFailure(err, _) = &e {
        match err.extended_code {
            rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE | rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY => {
                return Error::conflict(conflict);
            }
            rusqlite::ffi::SQLITE_CONSTRAINT_FOREIGNKEY => return Error::not_found(missing),
            _ => {}
        }
    }
    Error::from(e)
}

/// Builds a LIKE pattern matching `search` anywhere, with wildcards escaped.
fn like_pattern(search: Option<&str>) -> Option<String> {
    let search = search.map(str::trim).filter(|s| !s.is_empty())?;
    let escaped = search
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    Some(format!("%{escaped}%"))
}

impl Store for SqliteStore {
    fn initialize(&self) -> Result<()> {
        self.conn().execute_batch(SCHEMA)?;
        Ok(())
    }

    // User operations

    fn create_user(&self, user: &User) -> Result<()> {
        self.conn()
            .execute(
                "INSERT INTO users (id, email, name, password_hash, role, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    user.id,
                    user.email,
                    user.name,
                    user.password_hash,
                    user.role.as_str(),
                    format_datetime(&user.created_at),
                ],
            )
            .map_err(|e| map_constraint(e, "email already registered", "user not found"))?;
        Ok(())
    }

    fn get_user(&self, id: &str) -> Result<Option<User>> {
        let conn = self.conn();
        conn.query_row(
            "SELECT id, email, name, password_hash, role, created_at FROM users WHERE id = ?1",
            params![id],
            user_from_row,
        )
        .optional()
        .map_err(Error::from)
    }

    fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let conn = self.conn();
        conn.query_row(
            "SELECT id, email, name, password_hash, role, created_at FROM users WHERE email = ?1",
            params![email],
            user_from_row,
        )
        .optional()
        .map_err(Error::from)
    }

    fn has_admin_user(&self) -> Result<bool> {
        let count: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM users WHERE role = 'Admin'",
            [],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    // Credential operations

    fn create_sql_credential(&self, credential: &SqlCredential) -> Result<()> {
        self.conn()
            .execute(
                "INSERT INTO sql_credentials (user_id, login_name, encrypted_password, server_host, port, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    credential.user_id,
                    credential.login_name,
                    credential.encrypted_password,
                    credential.server_host,
                    credential.port,
                    format_datetime(&credential.created_at),
                ],
            )
            .map_err(|e| {
                map_constraint(e, "SQL login already provisioned", "user not found")
            })?;
        Ok(())
    }

    fn get_sql_credential(&self, user_id: &str) -> Result<Option<SqlCredential>> {
        let conn = self.conn();
        conn.query_row(
            "SELECT user_id, login_name, encrypted_password, server_host, port, created_at
             FROM sql_credentials WHERE user_id = ?1",
            params![user_id],
            credential_from_row,
        )
        .optional()
        .map_err(Error::from)
    }

    // Database record operations

    fn create_database_record(&self, record: &DatabaseRecord) -> Result<()> {
        self.conn()
            .execute(
                "INSERT INTO database_records (name, owner_user_id, collation, size_mb, created_at, state_desc)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    record.name,
                    record.owner_user_id,
                    record.collation,
                    record.size_mb,
                    format_datetime(&record.created_at),
                    record.state_desc.as_str(),
                ],
            )
            .map_err(|e| map_constraint(e, "database already exists", "owner not found"))?;
        Ok(())
    }

    fn get_database_record(&self, name: &str) -> Result<Option<DatabaseRecord>> {
        let conn = self.conn();
        conn.query_row(
            &format!("SELECT {DATABASE_COLUMNS} FROM database_records WHERE name = ?1"),
            params![name],
            database_from_row,
        )
        .optional()
        .map_err(Error::from)
    }

    fn update_database_state(&self, name: &str, state: DatabaseState) -> Result<()> {
        let rows = self.conn().execute(
            "UPDATE database_records SET state_desc = ?1 WHERE name = ?2",
            params![state.as_str(), name],
        )?;

        if rows == 0 {
            return Err(Error::not_found("database not found"));
        }
        Ok(())
    }

    fn update_database_size(&self, name: &str, size_mb: f64) -> Result<()> {
        let rows = self.conn().execute(
            "UPDATE database_records SET size_mb = ?1 WHERE name = ?2",
            params![size_mb, name],
        )?;

        if rows == 0 {
            return Err(Error::not_found("database not found"));
        }
        Ok(())
    }

    fn delete_database_record(&self, name: &str) -> Result<bool> {
        let rows = self
            .conn()
            .execute("DELETE FROM database_records WHERE name = ?1", params![name])?;
        Ok(rows > 0)
    }

    fn list_owned_databases(&self, owner_user_id: &str) -> Result<Vec<DatabaseRecord>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {DATABASE_COLUMNS} FROM database_records
             WHERE owner_user_id = ?1 ORDER BY name"
        ))?;

        let rows = stmt.query_map(params![owner_user_id], database_from_row)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    fn list_accessible_databases(
        &self,
        user_id: &str,
        login_name: &str,
    ) -> Result<Vec<DatabaseRecord>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {DATABASE_COLUMNS} FROM database_records d
             WHERE d.owner_user_id = ?1
                OR EXISTS (
                    SELECT 1 FROM access_grants g
                    WHERE g.database_name = d.name AND g.login_name = ?2
                )
             ORDER BY d.name"
        ))?;

        let rows = stmt.query_map(params![user_id, login_name], database_from_row)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    fn list_all_databases(
        &self,
        search: Option<&str>,
        offset: i64,
        limit: i64,
    ) -> Result<Vec<DatabaseSummary>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT d.name, d.owner_user_id, u.email, d.collation, d.size_mb, d.created_at, d.state_desc
             FROM database_records d
             JOIN users u ON u.id = d.owner_user_id
             WHERE ?1 IS NULL
                OR d.name LIKE ?1 ESCAPE '\\'
                OR u.email LIKE ?1 ESCAPE '\\'
             ORDER BY d.name
             LIMIT ?2 OFFSET ?3",
        )?;

        let rows = stmt.query_map(params![like_pattern(search), limit, offset], |row| {
            Ok(DatabaseSummary {
                name: row.get(0)?,
                owner_user_id: row.get(1)?,
                owner_email: row.get(2)?,
                collation: row.get(3)?,
                size_mb: row.get(4)?,
                created_at: parse_datetime(&row.get::<_, String>(5)?),
                state_desc: state_from_column(row, 6)?,
            })
        })?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    fn count_all_databases(&self, search: Option<&str>) -> Result<i64> {
        let count = self.conn().query_row(
            "SELECT COUNT(*)
             FROM database_records d
             JOIN users u ON u.id = d.owner_user_id
             WHERE ?1 IS NULL
                OR d.name LIKE ?1 ESCAPE '\\'
                OR u.email LIKE ?1 ESCAPE '\\'",
            params![like_pattern(search)],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    // Access grant operations

    fn create_access_grant(&self, grant: &AccessGrant) -> Result<bool> {
        let rows = self
            .conn()
            .execute(
                "INSERT INTO access_grants (database_name, login_name, granted_at, permission_level)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT (database_name, login_name) DO NOTHING",
                params![
                    grant.database_name,
                    grant.login_name,
                    format_datetime(&grant.granted_at),
                    grant.permission_level.as_str(),
                ],
            )
            .map_err(|e| {
                map_constraint(e, "grant already exists", "database or login not found")
            })?;
        Ok(rows > 0)
    }

    fn get_access_grant(
        &self,
        database_name: &str,
        login_name: &str,
    ) -> Result<Option<AccessGrant>> {
        let conn = self.conn();
        conn.query_row(
            "SELECT database_name, login_name, granted_at, permission_level
             FROM access_grants WHERE database_name = ?1 AND login_name = ?2",
            params![database_name, login_name],
            grant_from_row,
        )
        .optional()
        .map_err(Error::from)
    }

    fn delete_access_grant(&self, database_name: &str, login_name: &str) -> Result<bool> {
        let rows = self.conn().execute(
            "DELETE FROM access_grants WHERE database_name = ?1 AND login_name = ?2",
            params![database_name, login_name],
        )?;
        Ok(rows > 0)
    }

    fn list_database_grants(&self, database_name: &str) -> Result<Vec<AccessGrant>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT database_name, login_name, granted_at, permission_level
             FROM access_grants WHERE database_name = ?1 ORDER BY login_name",
        )?;

        let rows = stmt.query_map(params![database_name], grant_from_row)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store(temp: &TempDir) -> SqliteStore {
        let store = SqliteStore::new(temp.path().join("test.db")).unwrap();
        store.initialize().unwrap();
        store
    }

    fn user(id: &str, email: &str) -> User {
        User {
            id: id.to_string(),
            email: email.to_string(),
            name: None,
            password_hash: "hash".to_string(),
            role: Role::User,
            created_at: Utc::now(),
        }
    }

    fn credential(user_id: &str, login: &str) -> SqlCredential {
        SqlCredential {
            user_id: user_id.to_string(),
            login_name: login.to_string(),
            encrypted_password: "v1:ciphertext".to_string(),
            server_host: "localhost".to_string(),
            port: 1433,
            created_at: Utc::now(),
        }
    }

    fn record(name: &str, owner: &str) -> DatabaseRecord {
        DatabaseRecord {
            name: name.to_string(),
            owner_user_id: owner.to_string(),
            collation: "SQL_Latin1_General_CP1_CI_AS".to_string(),
            size_mb: 0.0,
            created_at: Utc::now(),
            state_desc: DatabaseState::Online,
        }
    }

    fn grant(database: &str, login: &str) -> AccessGrant {
        AccessGrant {
            database_name: database.to_string(),
            login_name: login.to_string(),
            granted_at: Utc::now(),
            permission_level: PermissionLevel::Owner,
        }
    }

    #[test]
    fn test_initialize_creates_tables() {
        let temp = TempDir::new().unwrap();
        let store = store(&temp);

        let conn = store.conn();
        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<std::result::Result<Vec<_>, _>>()
            .unwrap();

        assert!(tables.contains(&"users".to_string()));
        assert!(tables.contains(&"sql_credentials".to_string()));
        assert!(tables.contains(&"database_records".to_string()));
        assert!(tables.contains(&"access_grants".to_string()));
    }

    #[test]
    fn test_duplicate_email_is_conflict() {
        let temp = TempDir::new().unwrap();
        let store = store(&temp);

        store.create_user(&user("u1", "a@x.com")).unwrap();
        let result = store.create_user(&user("u2", "a@x.com"));
        assert!(matches!(result, Err(Error::Conflict(_))));

        let fetched = store.get_user_by_email("a@x.com").unwrap().unwrap();
        assert_eq!(fetched.id, "u1");
        assert_eq!(fetched.role, Role::User);
    }

    #[test]
    fn test_one_credential_per_user() {
        let temp = TempDir::new().unwrap();
        let store = store(&temp);
        store.create_user(&user("u1", "a@x.com")).unwrap();

        store.create_sql_credential(&credential("u1", "tenant_u1")).unwrap();
        let again = store.create_sql_credential(&credential("u1", "tenant_other"));
        assert!(matches!(again, Err(Error::Conflict(_))));

        let fetched = store.get_sql_credential("u1").unwrap().unwrap();
        assert_eq!(fetched.login_name, "tenant_u1");
        assert_eq!(fetched.port, 1433);
    }

    #[test]
    fn test_delete_database_cascades_grants() {
        let temp = TempDir::new().unwrap();
        let store = store(&temp);
        store.create_user(&user("u1", "a@x.com")).unwrap();
        store.create_user(&user("u2", "b@x.com")).unwrap();
        store.create_sql_credential(&credential("u2", "tenant_u2")).unwrap();
        store.create_database_record(&record("shop_db", "u1")).unwrap();

        assert!(store.create_access_grant(&grant("shop_db", "tenant_u2")).unwrap());
        assert!(!store.create_access_grant(&grant("shop_db", "tenant_u2")).unwrap());
        assert_eq!(store.list_database_grants("shop_db").unwrap().len(), 1);

        assert!(store.delete_database_record("shop_db").unwrap());
        assert!(store.list_database_grants("shop_db").unwrap().is_empty());
        assert!(store.get_access_grant("shop_db", "tenant_u2").unwrap().is_none());
    }

    #[test]
    fn test_grant_requires_both_sides() {
        let temp = TempDir::new().unwrap();
        let store = store(&temp);
        store.create_user(&user("u1", "a@x.com")).unwrap();
        store.create_database_record(&record("shop_db", "u1")).unwrap();

        let result = store.create_access_grant(&grant("shop_db", "tenant_missing"));
        assert!(matches!(result, Err(Error::NotFound(_))));
    }

    #[test]
    fn test_accessible_databases_union_owned_and_granted() {
        let temp = TempDir::new().unwrap();
        let store = store(&temp);
        store.create_user(&user("u1", "a@x.com")).unwrap();
        store.create_user(&user("u2", "b@x.com")).unwrap();
        store.create_sql_credential(&credential("u1", "tenant_u1")).unwrap();
        store.create_database_record(&record("mine", "u1")).unwrap();
        store.create_database_record(&record("shared", "u2")).unwrap();
        store.create_database_record(&record("private", "u2")).unwrap();
        store.create_access_grant(&grant("shared", "tenant_u1")).unwrap();

        let names: Vec<String> = store
            .list_accessible_databases("u1", "tenant_u1")
            .unwrap()
            .into_iter()
            .map(|d| d.name)
            .collect();
        assert_eq!(names, vec!["mine".to_string(), "shared".to_string()]);
    }

    #[test]
    fn test_list_all_pagination_and_search() {
        let temp = TempDir::new().unwrap();
        let store = store(&temp);
        store.create_user(&user("u1", "alice@x.com")).unwrap();
        store.create_user(&user("u2", "bob@y.com")).unwrap();
        for name in ["a_db", "b_db", "c_db"] {
            store.create_database_record(&record(name, "u1")).unwrap();
        }
        store.create_database_record(&record("bobs", "u2")).unwrap();
        store.create_database_record(&record("ab", "u2")).unwrap();

        assert_eq!(store.count_all_databases(None).unwrap(), 5);
        let page1 = store.list_all_databases(None, 0, 2).unwrap();
        let page2 = store.list_all_databases(None, 2, 2).unwrap();
        let page3 = store.list_all_databases(None, 4, 2).unwrap();
        assert_eq!(page1.len() + page2.len() + page3.len(), 5);
        assert!(page2.iter().all(|d| !page1.iter().any(|p| p.name == d.name)));
        assert_eq!(page1[0].name, "a_db");
        assert_eq!(page1[0].owner_email, "alice@x.com");

        let by_email = store.list_all_databases(Some("BOB@"), 0, 10).unwrap();
        assert_eq!(by_email.len(), 2);
        assert!(by_email.iter().all(|d| d.owner_email == "bob@y.com"));

        // '_' is literal, not a wildcard
        assert_eq!(store.count_all_databases(Some("_db")).unwrap(), 3);
        assert_eq!(store.count_all_databases(Some("a_")).unwrap(), 1);
    }

    #[test]
    fn test_state_round_trips() {
        let temp = TempDir::new().unwrap();
        let store = store(&temp);
        store.create_user(&user("u1", "a@x.com")).unwrap();
        store.create_database_record(&record("db1", "u1")).unwrap();

        store
            .update_database_state("db1", DatabaseState::BackingUp)
            .unwrap();
        let fetched = store.get_database_record("db1").unwrap().unwrap();
        assert_eq!(fetched.state_desc, DatabaseState::BackingUp);

        assert!(matches!(
            store.update_database_state("nope", DatabaseState::Online),
            Err(Error::NotFound(_))
        ));
    }
}
