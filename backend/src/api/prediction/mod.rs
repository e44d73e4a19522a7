//! Health and image prediction endpoints.

pub mod handlers;
pub mod routes;
