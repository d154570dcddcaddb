mod models;
mod permission;
mod role;

pub use models::*;
pub use permission::PermissionLevel;
pub use role::Role;
