mod server;

pub use server::{EngineConfig, ServerConfig, SessionConfig};
