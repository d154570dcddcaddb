mod databases;
mod sqlserver;

use std::sync::Arc;

use axum::{
    Router,
    routing::{delete, get, post},
};

use crate::server::AppState;

pub fn user_router() -> Router<Arc<AppState>> {
    Router::new()
        // Engine login and grants
        .route("/sqlserver/credentials", get(sqlserver::get_credentials))
        .route("/sqlserver/create-user", post(sqlserver::create_user))
        .route("/sqlserver/databases", get(sqlserver::list_databases))
        .route("/sqlserver/grant-access", post(sqlserver::grant_access))
        .route("/sqlserver/revoke-access", post(sqlserver::revoke_access))
        // Databases
        .route("/databases", post(databases::create_database))
        .route("/databases/list", get(databases::list_databases))
        .route("/databases/{name}", delete(databases::delete_database))
        .route("/databases/{name}/backup", post(databases::backup_database))
}
