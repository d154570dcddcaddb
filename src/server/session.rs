use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};

use crate::auth::{BearerToken, RequireAuth};
use crate::server::AppState;
use crate::server::dto::{AuthResponse, LoginRequest, RegisterRequest};
use crate::server::response::{ApiError, ApiResponse};
use crate::service::identity;

pub fn session_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/refresh", post(refresh))
        .route("/me", get(me))
}

async fn register(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> impl IntoResponse {
    let Json(req) = payload?;
    let user = identity::register(&state, &req.email, &req.password, req.name)?;

    Ok::<_, ApiError>((StatusCode::CREATED, Json(ApiResponse::success(user))))
}

async fn login(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> impl IntoResponse {
    let Json(req) = payload?;
    let outcome = identity::login(&state, &req.email, &req.password)?;

    Ok::<_, ApiError>(Json(ApiResponse::success(AuthResponse {
        user: outcome.user,
        token: outcome.token,
    })))
}

async fn refresh(
    State(state): State<Arc<AppState>>,
    BearerToken(token): BearerToken,
) -> impl IntoResponse {
    let outcome = identity::refresh(&state, &token).map_err(|e| {
        ApiError::from(e).with_details(serde_json::Value::String("log in again".into()))
    })?;

    Ok::<_, ApiError>(Json(ApiResponse::success(AuthResponse {
        user: outcome.user,
        token: outcome.token,
    })))
}

async fn me(
    RequireAuth(session): RequireAuth,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let user = state
        .store
        .get_user(&session.user_id)
        .map_err(ApiError::from)?
        .ok_or_else(|| ApiError::new(StatusCode::UNAUTHORIZED, "User no longer exists"))?;

    Ok::<_, ApiError>(Json(ApiResponse::success(user)))
}
