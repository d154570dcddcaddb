use crate::config::EngineConfig;
use crate::error::{Error, Result};

const MAX_DATABASE_NAME_LEN: usize = 128;
const MAX_COLLATION_LEN: usize = 128;
const MAX_EMAIL_LEN: usize = 254;
pub const MIN_PASSWORD_LEN: usize = 8;

/// System databases and keywords that cannot be used as database names.
const RESERVED_NAMES: &[&str] = &[
    "master", "model", "msdb", "tempdb", "resource", "distribution", "add", "all", "alter",
    "and", "any", "as", "backup", "begin", "by", "case", "check", "column", "commit",
    "constraint", "create", "cross", "current", "database", "default", "delete", "deny",
    "distinct", "drop", "else", "end", "exec", "execute", "exists", "from", "full",
    "function", "grant", "group", "having", "in", "index", "insert", "into", "is", "join",
    "key", "kill", "like", "login", "merge", "not", "null", "or", "order", "primary",
    "procedure", "public", "restore", "revoke", "rollback", "schema", "select", "set",
    "shutdown", "sysadmin", "table", "transaction", "trigger", "truncate", "union", "update",
    "use", "user", "values", "view", "where", "with",
];

pub fn validate_database_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::bad_request("Database name cannot be empty"));
    }
    if name.len() > MAX_DATABASE_NAME_LEN {
        return Err(Error::bad_request(format!(
            "Database name cannot exceed {MAX_DATABASE_NAME_LEN} characters"
        )));
    }
    if !name.starts_with(|c: char| c.is_ascii_alphabetic()) {
        return Err(Error::bad_request("Database name must start with a letter"));
    }
    if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(Error::bad_request(
            "Database name can only contain letters, digits, and underscores",
        ));
    }
    if RESERVED_NAMES
        .iter()
        .any(|reserved| reserved.eq_ignore_ascii_case(name))
    {
        return Err(Error::bad_request(format!(
            "'{name}' is a reserved name"
        )));
    }
    Ok(())
}

/// Returns the collation to use, falling back to the configured default.
pub fn resolve_collation(config: &EngineConfig, requested: Option<&str>) -> Result<String> {
    let collation = match requested.map(str::trim).filter(|c| !c.is_empty()) {
        Some(c) => c,
        None => return Ok(config.default_collation.clone()),
    };

    if collation.len() > MAX_COLLATION_LEN
        || !collation.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        return Err(Error::bad_request("Invalid collation name"));
    }
    if !config.collations.iter().any(|c| c == collation) {
        return Err(Error::bad_request(format!(
            "Unsupported collation '{collation}'"
        )));
    }
    Ok(collation.to_string())
}

/// Normalizes an email address (trimmed, lower-cased) and checks its shape.
pub fn normalize_email(email: &str) -> Result<String> {
    let email = email.trim().to_ascii_lowercase();
    if email.len() > MAX_EMAIL_LEN {
        return Err(Error::bad_request("Email is too long"));
    }
    match email.split_once('@') {
        Some((local, domain))
            if !local.is_empty()
                && !domain.is_empty()
                && !domain.contains('@')
                && !email.contains(char::is_whitespace) =>
        {
            Ok(email)
        }
        _ => Err(Error::bad_request("Invalid email address")),
    }
}

pub fn validate_password(password: &str) -> Result<()> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(Error::bad_request(format!(
            "Password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    Ok(())
}
