//! Module for services that talk to collaborators outside this process.

pub mod inference_service;
