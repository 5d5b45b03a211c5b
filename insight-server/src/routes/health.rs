//! Healthcheck route.

use crate::{
    app_state::AppState,
    error::AppResult,
    extract::json::Json,
    setups::{ServerSetup, UserStore},
};
use axum::{self, extract::State, http::StatusCode};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// A healthcheck response containing diagnostic information for the service
#[derive(ToSchema, Eq, PartialEq, Debug, Deserialize, Serialize)]
pub struct HealthcheckResponse {
    database_connected: bool,
}

impl HealthcheckResponse {
    /// Whether the service is healthy
    pub fn is_healthy(&self) -> bool {
        self.database_connected
    }

    /// The status code for the healthcheck response
    pub fn status_code(&self) -> StatusCode {
        if self.is_healthy() {
            StatusCode::OK
        } else {
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}

/// GET handler for checking service health.
#[utoipa::path(
    get,
    path = "/healthcheck",
    responses(
        (status = 200, description = "insight-server healthy", body = HealthcheckResponse),
        (status = 503, description = "insight-server not healthy", body = HealthcheckResponse)
    )
)]
pub async fn healthcheck<S: ServerSetup>(
    State(state): State<AppState<S>>,
) -> AppResult<(StatusCode, Json<HealthcheckResponse>)> {
    let database_connected = match state.user_store.healthcheck().await {
        Ok(()) => true,
        Err(err) => {
            tracing::warn!(%err, "User store unreachable");
            false
        }
    };

    let response = HealthcheckResponse { database_connected };

    Ok((response.status_code(), Json(response)))
}
