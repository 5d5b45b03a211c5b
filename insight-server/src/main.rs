//! insight-server

use anyhow::{anyhow, Result};
use axum::{routing::get, Router};
use axum_server::Handle;
use clap::Parser;
use http::{header, HeaderName};
use insight_server::{
    app_state::AppState,
    db,
    docs::ApiDoc,
    metrics::setup_metrics_recorder,
    middleware::{self, request_ulid::MakeRequestUlid, runtime},
    router,
    routes::fallback::notfound_404,
    settings::{self, AppEnvironment, Settings},
    setups::{
        local::{LocalSetup, LogCodeSender},
        prod::{EmailVerificationCodeSender, PgUserStore, ProdSetup},
        ServerSetup,
    },
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::{
    future::ready,
    io,
    net::{IpAddr, Ipv4Addr, SocketAddr},
    path::PathBuf,
    process::exit,
    time::Duration,
};
use tokio::signal;
#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;
use tower::ServiceBuilder;
use tower_http::{
    catch_panic::CatchPanicLayer, sensitive_headers::SetSensitiveHeadersLayer,
    timeout::TimeoutLayer, ServiceBuilderExt,
};
use tracing::{error, info};
use tracing_subscriber::{prelude::*, EnvFilter};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

/// Request identifier field.
const REQUEST_ID: &str = "x-request-id";

const DEFAULT_LOG_FILTER: &str = "insight_server=info,tower_http=info";

/// Sign-up and email verification server
#[derive(Debug, Parser)]
#[command(name = "insight-server", version, about)]
struct Cli {
    /// Path to a settings file. Defaults to the bundled config/settings.toml
    #[arg(long)]
    config_path: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = Settings::load(cli.config_path)?;

    let (stdout_writer, _stdout_guard) = tracing_appender::non_blocking(io::stdout());
    setup_tracing(stdout_writer, settings.server.environment.json_logs());

    info!(
        subject = "app_settings",
        category = "init",
        environment = %settings.server.environment,
        port = settings.server.port,
        metrics_port = settings.server.metrics_port,
        verification = ?settings.verification,
        "starting insight-server",
    );

    db::migrations::run(&settings.database.url).await?;
    let db_pool = db::pool(
        &settings.database.url,
        settings.database.connect_timeout,
    )
    .await?;
    let user_store = PgUserStore::new(db_pool);

    let recorder_handle = setup_metrics_recorder()?;
    let cancellation_token = CancellationToken::new();

    let metrics_server = tokio::spawn(serve_metrics(
        recorder_handle,
        settings.server.metrics_port,
        cancellation_token.clone(),
    ));

    let app_server = match settings.server.environment {
        AppEnvironment::Local => {
            let app_state = AppState::<LocalSetup>::builder()
                .with_user_store(user_store)
                .with_verification_code_sender(LogCodeSender)
                .with_verification(settings.verification.clone())
                .finalize()?;

            tokio::spawn(serve_app(
                app_state,
                settings.server.clone(),
                cancellation_token.clone(),
            ))
        }
        _ => {
            let app_state = AppState::<ProdSetup>::builder()
                .with_user_store(user_store)
                .with_verification_code_sender(EmailVerificationCodeSender::new(
                    settings.mailgun.clone(),
                ))
                .with_verification(settings.verification.clone())
                .finalize()?;

            tokio::spawn(serve_app(
                app_state,
                settings.server.clone(),
                cancellation_token.clone(),
            ))
        }
    };

    tokio::spawn(async move {
        capture_sigterm().await;

        cancellation_token.cancel();
        println!("\nCtrl+C received, shutting down. Press Ctrl+C again to force shutdown.");

        capture_sigterm().await;

        exit(130)
    });

    let (metrics, app) = tokio::try_join!(metrics_server, app_server)?;

    if let Err(e) = metrics {
        error!("metrics server crashed: {}", e);
    }

    if let Err(e) = app {
        error!("app server crashed: {}", e);
    }

    Ok(())
}

async fn serve_metrics(
    recorder_handle: PrometheusHandle,
    port: u16,
    token: CancellationToken,
) -> Result<()> {
    let metrics_router = Router::new()
        .route("/metrics", get(move || ready(recorder_handle.render())))
        .fallback(notfound_404);

    let router = metrics_router.layer(CatchPanicLayer::custom(runtime::catch_panic));

    let (server, _) = serve("Metrics", router, port).await?;

    token.cancelled().await;
    server.graceful_shutdown(None);

    Ok(())
}

async fn serve_app<S: ServerSetup>(
    app_state: AppState<S>,
    settings: settings::Server,
    token: CancellationToken,
) -> Result<()> {
    let req_id = HeaderName::from_static(REQUEST_ID);

    let router = router::setup_app_router(app_state)
        .route_layer(axum::middleware::from_fn(middleware::metrics::track))
        // Set and propagate "x-request-id" (as a ulid) per request.
        .layer(
            ServiceBuilder::new()
                .set_request_id(req_id.clone(), MakeRequestUlid)
                .propagate_request_id(req_id),
        )
        // Applies the `tower_http::timeout::Timeout` middleware which
        // applies a timeout to requests.
        .layer(TimeoutLayer::new(Duration::from_millis(settings.timeout_ms)))
        // Catches runtime panics and converts them into
        // `500 Internal Server` responses.
        .layer(CatchPanicLayer::custom(runtime::catch_panic))
        // Mark headers as sensitive on both requests and responses.
        .layer(SetSensitiveHeadersLayer::new([
            header::AUTHORIZATION,
            header::COOKIE,
        ]))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-doc/openapi.json", ApiDoc::openapi()));

    let (server, _) = serve("Application", router, settings.port).await?;

    token.cancelled().await;
    server.graceful_shutdown(Some(Duration::from_secs(10)));

    Ok(())
}

async fn serve(name: &str, app: Router, port: u16) -> Result<(Handle, SocketAddr)> {
    let bind_addr: SocketAddr = SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port);
    info!(
        subject = "app_start",
        category = "init",
        "{} server listening on {}",
        name,
        bind_addr
    );

    let handle = Handle::new();

    tokio::spawn({
        let handle = handle.clone();
        async move {
            axum_server::bind(bind_addr)
                .handle(handle)
                .serve(app.into_make_service_with_connect_info::<SocketAddr>())
                .await
        }
    });

    let addr = handle
        .listening()
        .await
        .ok_or_else(|| anyhow!("{name} server failed to bind {bind_addr}"))?;

    Ok((handle, addr))
}

/// Captures and waits for system signals.
async fn capture_sigterm() {
    #[cfg(unix)]
    let term = async {
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                error!(%err, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await
            }
        }
    };

    #[cfg(not(unix))]
    let term = std::future::pending::<()>();

    tokio::select! {
        _ = signal::ctrl_c() => {},
        _ = term => {}
    };
}

/// Setup the [tracing][tracing] subscriber: JSON lines in staging and prod,
/// human readable lines everywhere else.
fn setup_tracing(writer: tracing_appender::non_blocking::NonBlocking, json: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    let registry = tracing_subscriber::registry().with(filter);

    if json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_writer(writer),
            )
            .init();
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_writer(writer),
            )
            .init();
    }
}
