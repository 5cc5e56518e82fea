// ============================
// crates/backend-lib/src/auth/mod.rs
// ============================
//! Credentials and sessions.

pub mod accounts;
pub mod password;

pub use accounts::{AccountService, LoginOutcome};
pub use password::{hash_password, hash_password_secure, verify_password};
