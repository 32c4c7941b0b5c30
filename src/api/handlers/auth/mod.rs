//! Cookie session plumbing shared by the auth endpoints.

pub mod principal;
pub mod session;
pub mod state;
pub mod types;

pub use principal::{CurrentUser, require_session};
pub use state::{AuthConfig, AuthState};
