//! Custom [axum::extract] Extractors.

pub mod json;
pub mod query;
