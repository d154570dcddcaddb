mod middleware;
mod password;
mod policy;
mod session;

pub use middleware::{AuthError, BearerToken, RequireAdmin, RequireAuth};
pub use password::PasswordHasher;
pub use policy::{Decision, authorize, require};
pub use session::{Claims, Session, SessionManager};
