mod databases;

use std::sync::Arc;

use axum::{
    Router,
    routing::{delete, get, post},
};

use crate::server::AppState;

pub fn admin_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/databases", get(databases::list_databases))
        .route("/databases", post(databases::create_database))
        .route("/databases/{name}", delete(databases::delete_database))
        .route("/databases/{name}/backup", post(databases::backup_database))
}
