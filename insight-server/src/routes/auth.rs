//! Sign-up, email verification and sign-in routes

use crate::{
    app_state::AppState,
    error::{AppError, AppResult},
    extract::json::Json,
    models::user::NewUser,
    password,
    setups::{ServerSetup, UserStore},
    verification::{IssueTrigger, VerificationLifecycle},
};
use axum::{self, extract::State, http::StatusCode};
use chrono::Utc;
use insight_core::common::{
    AccountResponse, ApiResponse, ResendCodeRequest, SignInRequest, SignUpRequest,
    SignUpResponse, VerifyCodeRequest,
};
use metrics::increment_counter;
use tracing::{debug, info};
use validator::Validate;

/// POST handler for creating a new, unverified account
#[utoipa::path(
    post,
    path = "/api/sign-up",
    request_body = SignUpRequest,
    responses(
        (status = 201, description = "Account created, verification code sent", body = SignUpResponse),
        (status = 400, description = "Invalid request", body = AppError),
        (status = 409, description = "Username or email already taken", body = AppError),
        (status = 429, description = "A code was sent to this email too recently", body = AppError),
        (status = 502, description = "Verification email could not be sent", body = AppError),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn sign_up<S: ServerSetup>(
    State(state): State<AppState<S>>,
    Json(request): Json<SignUpRequest>,
) -> AppResult<(StatusCode, Json<SignUpResponse>)> {
    request.validate()?;

    let now = Utc::now();
    let lifecycle = VerificationLifecycle::new(&state);

    let existing = state.user_store.find_by_email(&request.email).await?;

    let username = match existing {
        Some(existing) if existing.verified => {
            return Err(AppError::new(
                StatusCode::CONFLICT,
                Some("User already exists with this email"),
            ));
        }
        // A pending account keeps the password it signed up with
        Some(existing) => {
            debug!(username = %existing.username, "Email belongs to a pending account, re-issuing");
            lifecycle
                .reissue(&existing, IssueTrigger::SignUp, now)
                .await?;
            existing.username
        }
        None => {
            let password_hash = password::hash(request.password).await?;
            let user = state
                .user_store
                .insert(NewUser::new(request.username, request.email, password_hash))
                .await?;
            increment_counter!("sign_ups_total");
            info!(username = %user.username, "Created account");

            lifecycle
                .issue(
                    &user.username,
                    &VerificationLifecycle::<S>::generate_code(),
                    IssueTrigger::SignUp,
                    now,
                )
                .await?;
            user.username
        }
    };

    Ok((
        StatusCode::CREATED,
        Json(SignUpResponse {
            success: true,
            message: "User registered successfully. Please verify your email".to_string(),
            username,
        }),
    ))
}

/// POST handler for checking an emailed verification code
#[utoipa::path(
    post,
    path = "/api/verify-code",
    request_body = VerifyCodeRequest,
    responses(
        (status = 200, description = "Account verified", body = ApiResponse),
        (status = 400, description = "Malformed, incorrect or expired code", body = AppError),
        (status = 404, description = "User not found", body = AppError),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn verify_code<S: ServerSetup>(
    State(state): State<AppState<S>>,
    Json(request): Json<VerifyCodeRequest>,
) -> AppResult<Json<ApiResponse>> {
    request.validate()?;

    VerificationLifecycle::new(&state)
        .verify(&request.username, &request.code, Utc::now())
        .await?;

    Ok(Json(ApiResponse::success("Account verified successfully")))
}

/// POST handler for replacing a verification code with a fresh one
#[utoipa::path(
    post,
    path = "/api/resend-code",
    request_body = ResendCodeRequest,
    responses(
        (status = 200, description = "New code sent", body = ApiResponse),
        (status = 404, description = "User not found", body = AppError),
        (status = 409, description = "Account already verified", body = AppError),
        (status = 429, description = "A code was sent too recently", body = AppError),
        (status = 502, description = "Verification email could not be sent", body = AppError),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn resend_code<S: ServerSetup>(
    State(state): State<AppState<S>>,
    Json(request): Json<ResendCodeRequest>,
) -> AppResult<Json<ApiResponse>> {
    VerificationLifecycle::new(&state)
        .resend(&request.username, Utc::now())
        .await?;

    Ok(Json(ApiResponse::success(
        "Verification code resent successfully",
    )))
}

/// POST handler for checking credentials of a verified account
#[utoipa::path(
    post,
    path = "/api/sign-in",
    request_body = SignInRequest,
    responses(
        (status = 200, description = "Credentials valid", body = AccountResponse),
        (status = 401, description = "Incorrect credentials", body = AppError),
        (status = 403, description = "Account not verified yet", body = AppError),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn sign_in<S: ServerSetup>(
    State(state): State<AppState<S>>,
    Json(request): Json<SignInRequest>,
) -> AppResult<Json<AccountResponse>> {
    let incorrect = || AppError::new(StatusCode::UNAUTHORIZED, Some("Incorrect credentials"));

    let user = if request.identifier.contains('@') {
        state.user_store.find_by_email(&request.identifier).await?
    } else {
        state.user_store.find_by_username(&request.identifier).await?
    };

    let Some(user) = user else {
        return Err(incorrect());
    };

    if !password::verify(request.password, user.password_hash.clone()).await? {
        debug!(username = %user.username, "Password mismatch");
        return Err(incorrect());
    }

    if !user.verified {
        return Err(AppError::new(
            StatusCode::FORBIDDEN,
            Some("Please verify your account before signing in"),
        ));
    }

    Ok(Json(user.to_response()))
}

#[cfg(test)]
mod tests {
    use crate::{
        error::ErrorResponse,
        settings,
        test_utils::{route_builder::RouteBuilder, test_context::TestContext},
    };
    use chrono::{Duration, Utc};
    use http::{Method, StatusCode};
    use insight_core::common::{AccountResponse, ApiResponse, SignUpResponse};
    use serde_json::json;
    use testresult::TestResult;

    async fn sign_up(
        ctx: &TestContext,
        username: &str,
        email: &str,
        password: &str,
    ) -> TestResult<(StatusCode, serde_json::Value)> {
        Ok(RouteBuilder::new(ctx.app(), Method::POST, "/api/sign-up")
            .with_json_body(json!({
                "username": username,
                "email": email,
                "password": password,
            }))?
            .into_json_response()
            .await?)
    }

    async fn verify(
        ctx: &TestContext,
        username: &str,
        code: &str,
    ) -> TestResult<(StatusCode, serde_json::Value)> {
        Ok(RouteBuilder::new(ctx.app(), Method::POST, "/api/verify-code")
            .with_json_body(json!({ "username": username, "code": code }))?
            .into_json_response()
            .await?)
    }

    async fn resend(ctx: &TestContext, username: &str) -> TestResult<(StatusCode, serde_json::Value)> {
        Ok(RouteBuilder::new(ctx.app(), Method::POST, "/api/resend-code")
            .with_json_body(json!({ "username": username }))?
            .into_json_response()
            .await?)
    }

    async fn sign_in(
        ctx: &TestContext,
        identifier: &str,
        password: &str,
    ) -> TestResult<(StatusCode, serde_json::Value)> {
        Ok(RouteBuilder::new(ctx.app(), Method::POST, "/api/sign-in")
            .with_json_body(json!({ "identifier": identifier, "password": password }))?
            .into_json_response()
            .await?)
    }

    fn last_code(ctx: &TestContext, email: &str) -> String {
        ctx.verification_code_sender()
            .last_code_for(email)
            .expect("No email sent")
    }

    fn error_detail(body: serde_json::Value) -> String {
        let mut response: ErrorResponse = serde_json::from_value(body).unwrap();
        response.errors.remove(0).detail.unwrap_or_default()
    }

    /// Move the account's code window into the past, as if `by` had elapsed
    fn age_code(ctx: &TestContext, username: &str, by: Duration) {
        ctx.user_store().modify(username, |user| {
            user.verify_code_issued_at = user.verify_code_issued_at.map(|t| t - by);
            user.verify_code_expires_at = user.verify_code_expires_at.map(|t| t - by);
        });
    }

    #[test_log::test(tokio::test)]
    async fn test_sign_up_ok() -> TestResult {
        let ctx = TestContext::new()?;

        let (status, body) = sign_up(&ctx, "alice", "alice@example.com", "hunter22").await?;

        assert_eq!(status, StatusCode::CREATED);
        let body: SignUpResponse = serde_json::from_value(body)?;
        assert!(body.success);
        assert_eq!(body.username, "alice");

        let user = ctx.user_store().get("alice").expect("account created");
        assert!(!user.verified);
        assert_ne!(user.password_hash, "hunter22");
        assert_eq!(
            user.verify_code,
            Some(last_code(&ctx, "alice@example.com"))
        );

        Ok(())
    }

    #[test_log::test(tokio::test)]
    async fn test_sign_up_invalid_input() -> TestResult {
        let ctx = TestContext::new()?;

        for (username, email, password) in [
            ("a", "alice@example.com", "hunter22"),
            ("al ice", "alice@example.com", "hunter22"),
            ("alice", "not-an-email", "hunter22"),
            ("alice", "alice@example.com", "12345"),
        ] {
            let (status, _) = sign_up(&ctx, username, email, password).await?;
            assert_eq!(status, StatusCode::BAD_REQUEST);
        }

        assert!(ctx.verification_code_sender().get_emails().is_empty());

        Ok(())
    }

    #[test_log::test(tokio::test)]
    async fn test_sign_up_malformed_body() -> TestResult {
        let ctx = TestContext::new()?;

        let (status, body) = RouteBuilder::new(ctx.app(), Method::POST, "/api/sign-up")
            .with_raw_json_body("{ not json")
            .into_json_response::<ErrorResponse>()
            .await?;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body.errors.len(), 1);

        Ok(())
    }

    #[test_log::test(tokio::test)]
    async fn test_sign_up_same_username_conflict() -> TestResult {
        let ctx = TestContext::new()?;

        let (status, _) = sign_up(&ctx, "alice", "alice@example.com", "hunter22").await?;
        assert_eq!(status, StatusCode::CREATED);

        let (status, body) = sign_up(&ctx, "alice", "alice2@example.com", "hunter22").await?;

        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(error_detail(body), "Username is already taken");

        Ok(())
    }

    #[test_log::test(tokio::test)]
    async fn test_sign_up_verified_email_conflict() -> TestResult {
        let ctx = TestContext::new()?;

        sign_up(&ctx, "alice", "alice@example.com", "hunter22").await?;
        let (status, _) = verify(&ctx, "alice", &last_code(&ctx, "alice@example.com")).await?;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = sign_up(&ctx, "alice2", "alice@example.com", "hunter22").await?;

        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(error_detail(body), "User already exists with this email");
        assert!(ctx.user_store().get("alice2").is_none());

        Ok(())
    }

    #[test_log::test(tokio::test)]
    async fn test_sign_up_pending_email_reissues() -> TestResult {
        let ctx = TestContext::new()?;

        sign_up(&ctx, "alice", "alice@example.com", "hunter22").await?;
        let first_code = last_code(&ctx, "alice@example.com");
        age_code(&ctx, "alice", Duration::minutes(2));

        let (status, body) = sign_up(&ctx, "alice2", "alice@example.com", "other-pw").await?;

        assert_eq!(status, StatusCode::CREATED);
        let body: SignUpResponse = serde_json::from_value(body)?;
        assert_eq!(body.username, "alice");
        assert!(ctx.user_store().get("alice2").is_none());
        assert_eq!(ctx.verification_code_sender().get_emails().len(), 2);

        let second_code = last_code(&ctx, "alice@example.com");
        if first_code != second_code {
            let (status, _) = verify(&ctx, "alice", &first_code).await?;
            assert_eq!(status, StatusCode::BAD_REQUEST);
        }

        let (status, _) = verify(&ctx, "alice", &second_code).await?;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = sign_in(&ctx, "alice", "other-pw").await?;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        let (status, _) = sign_in(&ctx, "alice", "hunter22").await?;
        assert_eq!(status, StatusCode::OK);

        Ok(())
    }

    #[test_log::test(tokio::test)]
    async fn test_sign_up_pending_email_cooldown() -> TestResult {
        let ctx = TestContext::new()?;

        let (status, _) = sign_up(&ctx, "alice", "alice@example.com", "hunter22").await?;
        assert_eq!(status, StatusCode::CREATED);

        for _ in 0..3 {
            let (status, body) = sign_up(&ctx, "alice", "alice@example.com", "hunter22").await?;
            assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
            assert!(error_detail(body).starts_with("Please wait"));
        }

        let (status, _) = resend(&ctx, "alice").await?;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(ctx.verification_code_sender().get_emails().len(), 1);

        Ok(())
    }

    #[test_log::test(tokio::test)]
    async fn test_sign_up_delivery_failure() -> TestResult {
        let ctx = TestContext::new_with_state(|builder| {
            builder.with_verification(settings::Verification {
                resend_cooldown_secs: 0,
                ..Default::default()
            })
        })?;
        ctx.verification_code_sender().set_failing(true);

        let (status, _) = sign_up(&ctx, "alice", "alice@example.com", "hunter22").await?;

        assert_eq!(status, StatusCode::BAD_GATEWAY);
        let user = ctx.user_store().get("alice").expect("account kept");
        assert!(user.verify_code.is_some());

        ctx.verification_code_sender().set_failing(false);
        let (status, _) = resend(&ctx, "alice").await?;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = verify(&ctx, "alice", &last_code(&ctx, "alice@example.com")).await?;
        assert_eq!(status, StatusCode::OK);

        Ok(())
    }

    #[test_log::test(tokio::test)]
    async fn test_verify_ok() -> TestResult {
        let ctx = TestContext::new()?;

        sign_up(&ctx, "alice", "alice@example.com", "hunter22").await?;
        let code = last_code(&ctx, "alice@example.com");

        let (status, body) = verify(&ctx, "alice", &code).await?;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            serde_json::from_value::<ApiResponse>(body)?,
            ApiResponse::success("Account verified successfully")
        );
        let user = ctx.user_store().get("alice").expect("account exists");
        assert!(user.verified);
        assert_eq!(user.verify_code, None);

        let (status, _) = verify(&ctx, "alice", &code).await?;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        Ok(())
    }

    #[test_log::test(tokio::test)]
    async fn test_verify_wrong_code() -> TestResult {
        let ctx = TestContext::new()?;

        sign_up(&ctx, "alice", "alice@example.com", "hunter22").await?;
        let code = last_code(&ctx, "alice@example.com");
        let wrong = if code == "000000" { "000001" } else { "000000" };

        let (status, body) = verify(&ctx, "alice", wrong).await?;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(error_detail(body), "Incorrect verification code");
        assert!(!ctx.user_store().get("alice").expect("account exists").verified);

        Ok(())
    }

    #[test_log::test(tokio::test)]
    async fn test_verify_malformed_code() -> TestResult {
        let ctx = TestContext::new()?;

        sign_up(&ctx, "alice", "alice@example.com", "hunter22").await?;

        let (status, _) = verify(&ctx, "alice", "12345").await?;

        assert_eq!(status, StatusCode::BAD_REQUEST);

        Ok(())
    }

    #[test_log::test(tokio::test)]
    async fn test_verify_expired_code() -> TestResult {
        let ctx = TestContext::new()?;

        sign_up(&ctx, "alice", "alice@example.com", "hunter22").await?;
        let code = last_code(&ctx, "alice@example.com");
        age_code(&ctx, "alice", Duration::hours(2));

        let (status, body) = verify(&ctx, "alice", &code).await?;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(
            error_detail(body),
            "Verification code has expired. Please request a new code."
        );

        Ok(())
    }

    #[test_log::test(tokio::test)]
    async fn test_verify_unknown_user() -> TestResult {
        let ctx = TestContext::new()?;

        let (status, body) = verify(&ctx, "bob", "000000").await?;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(error_detail(body), "User not found");

        Ok(())
    }

    #[test_log::test(tokio::test)]
    async fn test_resend_code() -> TestResult {
        let ctx = TestContext::new()?;

        sign_up(&ctx, "alice", "alice@example.com", "hunter22").await?;

        let (status, body) = resend(&ctx, "alice").await?;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        assert!(error_detail(body).starts_with("Please wait"));

        age_code(&ctx, "alice", Duration::minutes(2));
        let before = Utc::now();

        let (status, body) = resend(&ctx, "alice").await?;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            serde_json::from_value::<ApiResponse>(body)?,
            ApiResponse::success("Verification code resent successfully")
        );
        assert_eq!(ctx.verification_code_sender().get_emails().len(), 2);

        let user = ctx.user_store().get("alice").expect("account exists");
        assert!(user.verify_code_issued_at.expect("code issued") >= before);
        assert_eq!(user.verify_code, Some(last_code(&ctx, "alice@example.com")));

        Ok(())
    }

    #[test_log::test(tokio::test)]
    async fn test_resend_code_verified_account() -> TestResult {
        let ctx = TestContext::new()?;

        sign_up(&ctx, "alice", "alice@example.com", "hunter22").await?;
        verify(&ctx, "alice", &last_code(&ctx, "alice@example.com")).await?;
        age_code(&ctx, "alice", Duration::minutes(2));

        let (status, _) = resend(&ctx, "alice").await?;

        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(ctx.verification_code_sender().get_emails().len(), 1);

        Ok(())
    }

    #[test_log::test(tokio::test)]
    async fn test_resend_code_unknown_user() -> TestResult {
        let ctx = TestContext::new()?;

        let (status, _) = resend(&ctx, "bob").await?;

        assert_eq!(status, StatusCode::NOT_FOUND);

        Ok(())
    }

    #[test_log::test(tokio::test)]
    async fn test_sign_in() -> TestResult {
        let ctx = TestContext::new()?;

        sign_up(&ctx, "alice", "alice@example.com", "hunter22").await?;

        let (status, body) = sign_in(&ctx, "alice", "hunter22").await?;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(
            error_detail(body),
            "Please verify your account before signing in"
        );

        verify(&ctx, "alice", &last_code(&ctx, "alice@example.com")).await?;

        let (status, body) = sign_in(&ctx, "alice", "wrong-password").await?;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(error_detail(body), "Incorrect credentials");

        let (status, body) = sign_in(&ctx, "nobody", "hunter22").await?;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(error_detail(body), "Incorrect credentials");

        for identifier in ["alice", "alice@example.com"] {
            let (status, body) = sign_in(&ctx, identifier, "hunter22").await?;
            assert_eq!(status, StatusCode::OK);
            let account: AccountResponse = serde_json::from_value(body)?;
            assert_eq!(account.username, "alice");
            assert_eq!(account.email, "alice@example.com");
            assert!(account.verified);
        }

        Ok(())
    }
}
