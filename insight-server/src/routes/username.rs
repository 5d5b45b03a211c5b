//! Username availability route

use crate::{
    app_state::AppState,
    error::{AppError, AppResult},
    extract::{json::Json, query::Query},
    setups::{ServerSetup, UserStore},
};
use axum::{self, extract::State, http::StatusCode};
use insight_core::common::{ApiResponse, UsernameQuery};
use validator::Validate;

/// GET handler for checking whether a username can still be claimed.
///
/// Pending accounts hold on to their username too.
#[utoipa::path(
    get,
    path = "/api/check-username-unique",
    params(UsernameQuery),
    responses(
        (status = 200, description = "Username is free", body = ApiResponse),
        (status = 400, description = "Invalid username", body = AppError),
        (status = 409, description = "Username is already taken", body = AppError),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn check_username_unique<S: ServerSetup>(
    State(state): State<AppState<S>>,
    Query(query): Query<UsernameQuery>,
) -> AppResult<Json<ApiResponse>> {
    query.validate()?;

    if state
        .user_store
        .find_by_username(&query.username)
        .await?
        .is_some()
    {
        return Err(AppError::new(
            StatusCode::CONFLICT,
            Some("Username is already taken"),
        ));
    }

    Ok(Json(ApiResponse::success("Valid username")))
}
