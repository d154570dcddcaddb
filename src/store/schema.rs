pub const SCHEMA: &str = r#"
-- Application users; role is fixed at creation
CREATE TABLE IF NOT EXISTS users (
    id TEXT PRIMARY KEY,
    email TEXT NOT NULL UNIQUE,
    name TEXT,
    password_hash TEXT NOT NULL,         -- argon2id hash with embedded salt
    role TEXT NOT NULL CHECK (role IN ('User', 'Admin')),
    created_at TEXT NOT NULL
);

-- One engine login per user. The password is encrypted, not hashed:
-- its owner can ask to see it again.
CREATE TABLE IF NOT EXISTS sql_credentials (
    user_id TEXT PRIMARY KEY REFERENCES users(id) ON DELETE CASCADE,
    login_name TEXT NOT NULL UNIQUE,
    encrypted_password TEXT NOT NULL,
    server_host TEXT NOT NULL,
    port INTEGER NOT NULL,
    created_at TEXT NOT NULL
);

-- Databases hosted on the engine
CREATE TABLE IF NOT EXISTS database_records (
    name TEXT PRIMARY KEY,
    owner_user_id TEXT NOT NULL REFERENCES users(id),
    collation TEXT NOT NULL,
    size_mb REAL NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    state_desc TEXT NOT NULL
);

-- Login <-> database permissions. Removing either side removes the grant.
CREATE TABLE IF NOT EXISTS access_grants (
    database_name TEXT NOT NULL REFERENCES database_records(name) ON DELETE CASCADE,
    login_name TEXT NOT NULL REFERENCES sql_credentials(login_name) ON DELETE CASCADE,
    granted_at TEXT NOT NULL,
    permission_level TEXT NOT NULL,
    PRIMARY KEY (database_name, login_name)
);

CREATE INDEX IF NOT EXISTS idx_database_records_owner ON database_records(owner_user_id);
CREATE INDEX IF NOT EXISTS idx_access_grants_login ON access_grants(login_name);
CREATE INDEX IF NOT EXISTS idx_users_role ON users(role);
"#;
