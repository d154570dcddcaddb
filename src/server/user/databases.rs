use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, Query, State, rejection::JsonRejection, rejection::QueryRejection},
    http::StatusCode,
    response::IntoResponse,
};

use crate::auth::RequireAuth;
use crate::server::AppState;
use crate::server::dto::{ConfirmParams, CreateDatabaseRequest, DatabaseResponse};
use crate::server::response::{ApiError, ApiResponse, MessageResponse};
use crate::service::{access, lifecycle};

pub async fn create_database(
    RequireAuth(session): RequireAuth,
    State(state): State<Arc<AppState>>,
    payload: Result<Json<CreateDatabaseRequest>, JsonRejection>,
) -> impl IntoResponse {
    let Json(req) = payload?;
    let record = lifecycle::create_database(
        &state,
        &session,
        &session.user_id,
        req.name.trim(),
        req.collation.as_deref(),
    )
    .await?;

    Ok::<_, ApiError>((StatusCode::CREATED, Json(ApiResponse::success(record))))
}

pub async fn list_databases(
    RequireAuth(session): RequireAuth,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let databases: Vec<DatabaseResponse> =
        access::list_accessible_records(state.store.as_ref(), &session.user_id)?
            .into_iter()
            .map(|record| DatabaseResponse {
                is_owner: record.owner_user_id == session.user_id,
                record,
            })
            .collect();

    Ok::<_, ApiError>(Json(ApiResponse::success(databases)))
}

pub async fn delete_database(
    RequireAuth(session): RequireAuth,
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

    lifecycle::delete_database(&state, &session, &name).await?;
    Ok::<_, ApiError>(Json(MessageResponse::new(format!(
        "Database '{name}' deleted"
    ))))
}

pub async fn backup_database(
    RequireAuth(session): RequireAuth,
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> impl IntoResponse {
    let backup = lifecycle::backup_database(&state, &session, &name).await?;
    Ok::<_, ApiError>(Json(ApiResponse::success(backup)))
}
