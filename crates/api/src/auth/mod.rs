//! Authentication module for EcoSort

pub mod middleware;
pub mod session;

pub use middleware::{require_auth, AuthState, Session};
pub use session::{SessionClaims, SessionManager};
