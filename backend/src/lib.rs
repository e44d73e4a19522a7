//! RiceGuard backend: bearer-token authentication and per-client rate
//! limiting in front of a rice leaf disease prediction endpoint.

pub mod api;
pub mod app;
pub mod auth;
pub mod config;
pub mod errors;
pub mod rate_limit;
pub mod services;
pub mod utils;
