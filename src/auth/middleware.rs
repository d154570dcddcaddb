use std::sync::Arc;

use axum::{
    Json,
    extract::FromRequestParts,
    http::{HeaderValue, StatusCode, header::AUTHORIZATION, header::WWW_AUTHENTICATE, request::Parts},
    response::{IntoResponse, Response},
};
use serde_json::json;

use super::Session;
use crate::server::AppState;

/// Extractor that requires any valid session
pub struct RequireAuth(pub Session);

/// Extractor that requires a session whose role is Admin
pub struct RequireAdmin(pub Session);

/// Raw bearer token, unverified. Used where the token itself is the input.
pub struct BearerToken(pub String);

#[derive(Debug)]
pub enum AuthError {
    MissingAuth,
    InvalidScheme,
    InvalidToken,
    NotAdmin,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AuthError::MissingAuth => (StatusCode::UNAUTHORIZED, "Authentication required"),
            AuthError::InvalidScheme => (StatusCode::UNAUTHORIZED, "Invalid authorization scheme"),
            AuthError::InvalidToken => (StatusCode::UNAUTHORIZED, "Invalid or expired token"),
            AuthError::NotAdmin => (StatusCode::FORBIDDEN, "Admin access required"),
        };

        let mut response = (status, Json(json!({ "message": message }))).into_response();

        if status == StatusCode::UNAUTHORIZED {
            response.headers_mut().insert(
                WWW_AUTHENTICATE,
                HeaderValue::from_static("Bearer realm=\"sqlgate\""),
            );
        }

        response
    }
}

impl FromRequestParts<Arc<AppState>> for RequireAuth {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let session = extract_and_verify(parts, state)?;
        Ok(RequireAuth(session))
    }
}

impl FromRequestParts<Arc<AppState>> for RequireAdmin {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let session = extract_and_verify(parts, state)?;

        if !session.is_admin() {
            return Err(AuthError::NotAdmin);
        }

        Ok(RequireAdmin(session))
    }
}

impl<S: Send + Sync> FromRequestParts<S> for BearerToken {
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        bearer_token(parts).map(|token| BearerToken(token.to_string()))
    }
}

/// Pulls the bearer token out of the Authorization header.
fn bearer_token(parts: &Parts) -> Result<&str, AuthError> {
    let header = parts
        .headers
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .ok_or(AuthError::MissingAuth)?;

    header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or(AuthError::InvalidScheme)
}

fn extract_and_verify(parts: &Parts, state: &Arc<AppState>) -> Result<Session, AuthError> {
    let token = bearer_token(parts)?;
    state
        .sessions
        .verify(token)
        .map_err(|_| AuthError::InvalidToken)
}
