//! Central module for the application's HTTP endpoints outside of the
//! authentication routes, plus the shared error/extractor helpers.

pub mod common;
pub mod prediction;
