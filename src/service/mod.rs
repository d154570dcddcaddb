//! Core operations: identity, credential provisioning, access grants,
//! database lifecycle and admin oversight. Handlers in `server` are thin
//! wrappers around these.

pub mod access;
pub mod admin;
mod cipher;
pub mod credentials;
pub mod identity;
pub mod lifecycle;
mod locks;
pub mod validation;

pub use cipher::CredentialCipher;
pub use locks::{KeyedGuard, KeyedLocks, LockRegistry};
