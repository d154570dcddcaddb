use std::fmt;

use serde::{Deserialize, Serialize};

/// Permission a login holds on a database. Levels are ordered:
/// owner implies write implies read.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum PermissionLevel {
    Read,
    Write,
    #[default]
    Owner,
}

impl PermissionLevel {
    /// Returns true if this level covers the required one.
    #[must_use]
    pub fn has(self, required: PermissionLevel) -> bool {
        self >= required
    }

    /// Engine role the login is added to for this level.
    #[must_use]
    pub const fn engine_role(self) -> &'static str {
        match self {
            PermissionLevel::Read => "db_datareader",
            PermissionLevel::Write => "db_datawriter",
            PermissionLevel::Owner => "db_owner",
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            PermissionLevel::Read => "read",
            PermissionLevel::Write => "write",
            PermissionLevel::Owner => "owner",
        }
    }

    pub fn parse(s: &str) -> Option<PermissionLevel> {
        match s {
            "read" => Some(PermissionLevel::Read),
            "write" => Some(PermissionLevel::Write),
            "owner" => Some(PermissionLevel::Owner),
            _ => None,
        }
    }
}

impl fmt::Display for PermissionLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
