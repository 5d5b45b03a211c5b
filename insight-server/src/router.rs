//! Main [axum::Router] interface for webserver.

use crate::{
    app_state::AppState,
    routes::{auth, fallback::notfound_404, health, ping, username},
    setups::ServerSetup,
};
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

/// Setup main router for application.
pub fn setup_app_router<S: ServerSetup>(app_state: AppState<S>) -> Router {
    let cors = CorsLayer::new()
        // allow `GET` and `POST` when accessing the resource
        .allow_methods([http::Method::GET, http::Method::POST])
        .allow_headers([http::header::CONTENT_TYPE, http::header::ACCEPT])
        // allow requests from any origin
        .allow_origin(Any);

    let api_router = Router::new()
        .route("/sign-up", post(auth::sign_up::<S>))
        .route("/verify-code", post(auth::verify_code::<S>))
        .route("/resend-code", post(auth::resend_code::<S>))
        .route("/sign-in", post(auth::sign_in::<S>))
        .route(
            "/check-username-unique",
            get(username::check_username_unique::<S>),
        )
        .layer(cors)
        .with_state(app_state.clone())
        .fallback(notfound_404);

    let router = Router::new()
        .route("/ping", get(ping::get))
        .nest("/api", api_router)
        .fallback(notfound_404)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().include_headers(true))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        );

    // Healthchecks are polled often, keep them out of the request logs
    let healthcheck_router = Router::new()
        .route("/healthcheck", get(health::healthcheck::<S>))
        .with_state(app_state);

    Router::merge(router, healthcheck_router)
}
