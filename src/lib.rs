//! # sqlgate
//!
//! Per-tenant login provisioning and database isolation on a shared SQL
//! engine, usable both as a standalone binary and as a library.
//!
//! Each user gets at most one engine login. Databases are created, deleted
//! and backed up through the server, which records ownership and grants so
//! a tenant only ever sees the databases its login can reach.
//!
//! ## Library Usage
//!
//! ```toml
//! [dependencies]
//! sqlgate = { version = "0.0.1", default-features = false }
//! ```
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use sqlgate::config::ServerConfig;
//! use sqlgate::server::{AppState, create_router};
//!
//! let config = ServerConfig::load(std::path::Path::new("sqlgate.toml"))?;
//! let state = Arc::new(AppState::open(config)?);
//! let router = create_router(state);
//! // Serve with axum...
//! ```
//!
//! ## Feature Flags
//!
//! - `cli` (default): Builds the `sqlgate` binary. Disable with `default-features = false`.

pub mod auth;
pub mod config;
pub mod engine;
pub mod error;
pub mod server;
pub mod service;
pub mod state;
pub mod store;
pub mod types;
