use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, Query, State, rejection::JsonRejection, rejection::QueryRejection},
    http::StatusCode,
    response::IntoResponse,
};

use crate::auth::RequireAdmin;
use crate::server::AppState;
use crate::server::dto::{AdminCreateDatabaseRequest, AdminListParams, ConfirmParams};
use crate::server::response::{ApiError, ApiResponse, MessageResponse};
use crate::service::admin;

pub async fn list_databases(
    RequireAdmin(session): RequireAdmin,
    State(state): State<Arc<AppState>>,
    params: Result<Query<AdminListParams>, QueryRejection>,
) -> impl IntoResponse {
    let Query(params) = params?;
    let page = admin::list_all_databases(
        &state,
        &session,
        params.page,
        params.limit,
        params.search.as_deref(),
    )?;

    Ok::<_, ApiError>(Json(ApiResponse::success(page)))
}

pub async fn create_database(
    RequireAdmin(session): RequireAdmin,
    State(state): State<Arc<AppState>>,
    payload: Result<Json<AdminCreateDatabaseRequest>, JsonRejection>,
) -> impl IntoResponse {
    let Json(req) = payload?;
    let record = admin::create_database_for_user(
        &state,
        &session,
        &req.user_id,
        req.database_name.trim(),
        req.collation.as_deref(),
    )
    .await?;

    Ok::<_, ApiError>((StatusCode::CREATED, Json(ApiResponse::success(record))))
}

pub async fn delete_database(
    RequireAdmin(session): RequireAdmin,
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    params: Result<Query<ConfirmParams>, QueryRejection>,
) -> impl IntoResponse {
    let Query(params) = params?;
    if !params.confirms(&name) {
        return Err(ApiError::bad_request(
            "Deletion is irreversible; repeat the database name in ?confirm=",
        ));
    }

    admin::delete_database(&state, &session, &name).await?;
    tracing::warn!(admin = %session.user_id, database = %name, "database deleted by admin");

    Ok::<_, ApiError>(Json(MessageResponse::new(format!(
        "Database '{name}' deleted"
    ))))
}

pub async fn backup_database(
    RequireAdmin(session): RequireAdmin,
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> impl IntoResponse {
    let backup = admin::backup_database(&state, &session, &name).await?;
    Ok::<_, ApiError>(Json(ApiResponse::success(backup)))
}
