//! Client for the auth API with a local, observable session cache.
//!
//! Only non-sensitive user metadata is held in memory (and optionally on
//! disk); the session token stays in the transport's cookie jar.

pub mod cache;
pub mod errors;
pub mod storage;
pub mod transport;

pub use cache::{SessionCache, Subscription};
pub use errors::ClientError;
pub use storage::{FileSessionStore, MemorySessionStore, SessionPersistence};
pub use transport::{ApiRequest, ApiResponse, HttpTransport, Transport};
