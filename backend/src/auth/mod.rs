//! Authentication module: token issuance, refresh-token rotation and the
//! bearer-token middleware.
//!
//! The service authenticates one statically configured API user. Access
//! tokens are stateless; refresh tokens are single use and tracked in an
//! in-memory store for the lifetime of the process.

pub mod handlers;
pub mod middleware;
pub mod models;
pub mod refresh_store;
pub mod routes;
pub mod service;

// Re-exports for convenience
pub use middleware::authenticate_request;
pub use models::{AuthenticatedUser, Role, TokenPair};
pub use refresh_store::RefreshTokenStore;
pub use service::{AuthService, Credentials};
