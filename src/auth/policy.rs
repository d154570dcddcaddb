use crate::error::{Error, Result};
use crate::types::Role;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny,
}

/// Decides whether a requester may act on a resource owned by
/// `resource_owner_id`. Admins may act on anything; everyone else only on
/// what they own.
#[must_use]
pub fn authorize(requester_role: Role, requester_id: &str, resource_owner_id: &str) -> Decision {
    match requester_role {
        Role::Admin => Decision::Allow,
        Role::User if requester_id == resource_owner_id => Decision::Allow,
        Role::User => Decision::Deny,
    }
}

/// [`authorize`], with denial as `Forbidden`.
pub fn require(requester_role: Role, requester_id: &str, resource_owner_id: &str) -> Result<()> {
    match authorize(requester_role, requester_id, resource_owner_id) {
        Decision::Allow => Ok(()),
        Decision::Deny => Err(Error::forbidden(
            "only the owner or an administrator may do this",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_owner_allowed() {
        assert_eq!(authorize(Role::User, "u1", "u1"), Decision::Allow);
    }

    #[test]
    fn test_other_user_denied() {
        assert_eq!(authorize(Role::User, "u1", "u2"), Decision::Deny);
        assert!(matches!(require(Role::User, "u1", "u2"), Err(Error::Forbidden(_))));
    }

    #[test]
    fn test_admin_allowed_everywhere() {
        assert_eq!(authorize(Role::Admin, "admin", "u2"), Decision::Allow);
        assert!(require(Role::Admin, "admin", "u2").is_ok());
    }
}
