//! Routes for [axum::Router].

pub mod auth;
pub mod fallback;
pub mod health;
pub mod ping;
pub mod username;
