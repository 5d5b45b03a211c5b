//! Query string extractor that rejects with [`AppError`]s.

use crate::error::AppError;
use axum_macros::FromRequestParts;

/// Like [`axum::extract::Query`], rejecting with an [`AppError`].
#[derive(Debug, Clone, Copy, Default, FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(AppError))]
pub struct Query<T>(pub T);
