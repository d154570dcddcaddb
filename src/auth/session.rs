use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::types::{Role, User};

/// Signed session token payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub role: Role,
    pub iat: i64,
    pub exp: i64,
}

/// Caller identity resolved from a verified token.
#[derive(Debug, Clone)]
pub struct Session {
    pub user_id: String,
    pub role: Role,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.role.is_admin()
    }
}

/// Issues and verifies HS256 session tokens. Verification is stateless.
pub struct SessionManager {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    ttl: Duration,
}

impl SessionManager {
    pub fn new(secret: &[u8], ttl: std::time::Duration) -> Result<Self> {
        if secret.len() < 32 {
            return Err(Error::Config(
                "session signing key must be at least 32 bytes".to_string(),
            ));
        }
        let ttl = Duration::from_std(ttl)
            .map_err(|e| Error::Config(format!("invalid session ttl: {e}")))?;

        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);

        Ok(Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            validation,
            ttl,
        })
    }

    /// Issues a token for the user, valid for the configured ttl.
    pub fn issue(&self, user: &User) -> Result<String> {
        self.issue_for(&user.id, user.role)
    }

    fn issue_for(&self, user_id: &str, role: Role) -> Result<String> {
        let now = Utc::now();
        self.encode_claims(&Claims {
            sub: user_id.to_string(),
            role,
            iat: now.timestamp(),
            exp: (now + self.ttl).timestamp(),
        })
    }

    fn encode_claims(&self, claims: &Claims) -> Result<String> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding)
            .map_err(|e| Error::Internal(format!("failed to sign session token: {e}")))
    }

    /// Resolves the token's claims. Any signature, format or expiry failure
    /// is `Unauthorized`.
    pub fn verify(&self, token: &str) -> Result<Session> {
        let data = decode::<Claims>(token, &self.decoding, &self.validation).map_err(|e| {
            tracing::debug!(error = %e, "session token rejected");
            Error::Unauthorized
        })?;

        let expires_at =
            DateTime::from_timestamp(data.claims.exp, 0).ok_or(Error::Unauthorized)?;

        Ok(Session {
            user_id: data.claims.sub,
            role: data.claims.role,
            expires_at,
        })
    }

    /// Exchanges a still-valid token for a fresh one. Expired tokens force a
    /// new login.
    pub fn refresh(&self, token: &str) -> Result<(Session, String)> {
        let session = self.verify(token)?;
        let fresh = self.issue_for(&session.user_id, session.role)?;
        let renewed = self.verify(&fresh)?;
        Ok((renewed, fresh))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &[u8] = b"0123456789abcdef0123456789abcdef";

    fn manager() -> SessionManager {
        SessionManager::new(SECRET, std::time::Duration::from_secs(3600)).unwrap()
    }

    fn user(role: Role) -> User {
        User {
            id: "user-1".to_string(),
            email: "a@x.com".to_string(),
            name: None,
            password_hash: String::new(),
            role,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_issue_and_verify() {
        let sessions = manager();
        let token = sessions.issue(&user(Role::Admin)).unwrap();

        let session = sessions.verify(&token).unwrap();
        assert_eq!(session.user_id, "user-1");
        assert_eq!(session.role, Role::Admin);
        assert!(session.expires_at > Utc::now());
    }

    #[test]
    fn test_wrong_key_is_unauthorized() {
        let token = manager().issue(&user(Role::User)).unwrap();
        let other =
            SessionManager::new(b"ffffffffffffffffffffffffffffffff", std::time::Duration::from_secs(60))
                .unwrap();

        assert!(matches!(other.verify(&token), Err(Error::Unauthorized)));
    }

    #[test]
    fn test_expired_token_is_unauthorized() {
        let sessions = manager();
        let past = Utc::now() - Duration::minutes(5);
        let token = sessions
            .encode_claims(&Claims {
                sub: "user-1".to_string(),
                role: Role::User,
                iat: (past - Duration::hours(1)).timestamp(),
                exp: past.timestamp(),
            })
            .unwrap();

        assert!(matches!(sessions.verify(&token), Err(Error::Unauthorized)));
        assert!(matches!(sessions.refresh(&token), Err(Error::Unauthorized)));
    }

    #[test]
    fn test_refresh_keeps_identity() {
        let sessions = manager();
        let token = sessions.issue(&user(Role::User)).unwrap();

        let (session, fresh) = sessions.refresh(&token).unwrap();
        assert_eq!(session.user_id, "user-1");
        assert_eq!(session.role, Role::User);
        assert!(sessions.verify(&fresh).is_ok());
    }

    #[test]
    fn test_tampered_token_is_unauthorized() {
        let sessions = manager();
        let mut token = sessions.issue(&user(Role::User)).unwrap();
        token.push('x');

        assert!(matches!(sessions.verify(&token), Err(Error::Unauthorized)));
        assert!(matches!(sessions.verify("garbage"), Err(Error::Unauthorized)));
    }

    #[test]
    fn test_short_secret_rejected() {
        assert!(SessionManager::new(b"short", std::time::Duration::from_secs(60)).is_err());
    }
}
