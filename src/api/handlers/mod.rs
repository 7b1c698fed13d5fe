//! REST API Handlers

pub mod admin;
pub mod sessions;
