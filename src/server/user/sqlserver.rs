use std::sync::Arc;

use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
};

use crate::auth::RequireAuth;
use crate::server::AppState;
use crate::server::dto::{AccessibleDatabasesResponse, GrantAccessRequest, RevokeAccessRequest};
use crate::server::response::{ApiError, ApiResponse, MessageResponse};
use crate::service::{access, credentials};
use crate::types::PermissionLevel;

pub async fn get_credentials(
    RequireAuth(session): RequireAuth,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let creds = credentials::get_credentials(&state, &session.user_id)?;
    Ok::<_, ApiError>(Json(ApiResponse::success(creds)))
}

pub async fn create_user(
    RequireAuth(session): RequireAuth,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let creds = credentials::create_sql_user(&state, &session.user_id).await?;
    Ok::<_, ApiError>((StatusCode::CREATED, Json(ApiResponse::success(creds))))
}

pub async fn list_databases(
    RequireAuth(session): RequireAuth,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let has_credentials = state
        .store
        .get_sql_credential(&session.user_id)
        .map_err(ApiError::from)?
        .is_some();
    let databases = access::list_accessible_databases(state.store.as_ref(), &session.user_id)?;

    Ok::<_, ApiError>(Json(ApiResponse::success(AccessibleDatabasesResponse {
        databases,
        has_credentials,
    })))
}

pub async fn grant_access(
    RequireAuth(session): RequireAuth,
    State(state): State<Arc<AppState>>,
    payload: Result<Json<GrantAccessRequest>, JsonRejection>,
) -> impl IntoResponse {
    let Json(req) = payload?;
    let user_id = req.user_id.as_deref().unwrap_or(&session.user_id);
    let level = req.permission_level.unwrap_or(PermissionLevel::Owner);

    let grant = access::grant_access(&state, &session, user_id, &req.database_name, level).await?;
    Ok::<_, ApiError>(Json(ApiResponse::success(grant)))
}

pub async fn revoke_access(
    RequireAuth(session): RequireAuth,
    State(state): State<Arc<AppState>>,
    payload: Result<Json<RevokeAccessRequest>, JsonRejection>,
) -> impl IntoResponse {
    let Json(req) = payload?;
    access::revoke_access(&state, &session, &req.user_id, &req.database_name).await?;

    Ok::<_, ApiError>(Json(MessageResponse::new("Access revoked")))
}
