//! OpenAPI doc generation.

use crate::{
    error::AppError,
    routes::{auth, health, ping, username},
};
use insight_core::common::{
    AccountResponse, ApiResponse, ResendCodeRequest, SignInRequest, SignUpRequest,
    SignUpResponse, VerifyCodeRequest,
};
use utoipa::OpenApi;

/// API documentation generator.
#[derive(OpenApi)]
#[openapi(
    paths(
        health::healthcheck,
        ping::get,
        auth::sign_up,
        auth::verify_code,
        auth::resend_code,
        auth::sign_in,
        username::check_username_unique,
    ),
    components(
        schemas(
            AppError,
            SignUpRequest,
            SignUpResponse,
            VerifyCodeRequest,
            ResendCodeRequest,
            SignInRequest,
            ApiResponse,
            AccountResponse,
            health::HealthcheckResponse
        )
    )
)]

/// Tied to OpenAPI documentation.
#[derive(Debug)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openapi_lists_every_route() {
        let doc = ApiDoc::openapi();

        for path in [
            "/healthcheck",
            "/ping",
            "/api/sign-up",
            "/api/verify-code",
            "/api/resend-code",
            "/api/sign-in",
            "/api/check-username-unique",
        ] {
            assert!(doc.paths.paths.contains_key(path), "missing {path}");
        }
    }
}
