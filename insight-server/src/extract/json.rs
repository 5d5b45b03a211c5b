//! JSON body extractor that rejects with [`AppError`]s.

use crate::error::AppError;
use axum::response::{IntoResponse, Response};
use axum_macros::FromRequest;
use serde::Serialize;

/// Like [`axum::Json`], but a malformed body turns into a JSON:API
/// error response instead of a plain text one.
#[derive(Debug, Clone, Copy, Default, FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct Json<T>(pub T);

impl<T: Serialize> IntoResponse for Json<T> {
    fn into_response(self) -> Response {
        let Self(value) = self;
        axum::Json(value).into_response()
    }
}
