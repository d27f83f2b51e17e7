//! leadgate-server

use anyhow::{anyhow, Result};
use axum::{body::Body, Router};
use axum_server::Handle;
use clap::Parser;
use http::{header, HeaderName, Request};
use leadgate_server::{
    app_state::{AppState, AppStateBuilder},
    docs::ApiDoc,
    middleware::{request_ulid::MakeRequestUlid, runtime},
    otp, router,
    settings::{AppEnvironment, Settings},
    setups::{
        local::{LocalSetup, LogMailer},
        prod::{ProdSetup, RecaptchaVerifier, SmtpMailer},
        ServerSetup,
    },
};
use std::{
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
    timeout::TimeoutLayer, trace::TraceLayer, ServiceBuilderExt,
};
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

/// Request identifier field.
const REQUEST_ID: &str = "x-request-id";

/// Lead capture and privacy request API
#[derive(Debug, Parser)]
#[command(name = "leadgate-server", version, about)]
struct Cli {
    /// Path to the settings file. Defaults to the bundled `config/settings.toml`.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let (stdout_writer, _stdout_guard) = tracing_appender::non_blocking(io::stdout());

    let settings = Settings::load(cli.config)?;

    setup_tracing(stdout_writer, settings.server.environment);

    info!(
        subject = "app_settings",
        category = "init",
        "starting with settings: {:?}",
        settings,
    );

    settings.ensure_deployable()?;

    let cancellation_token = CancellationToken::new();

    let app_server = tokio::spawn(serve_app(settings, cancellation_token.clone()));

    tokio::spawn(async move {
        capture_sigterm().await;

        cancellation_token.cancel();
        println!("\nCtrl+C received, shutting down. Press Ctrl+C again to force shutdown.");

        capture_sigterm().await;

        exit(130)
    });

    if let Err(e) = app_server.await? {
        error!("app server crashed: {:?}", e);
    }

    Ok(())
}

async fn serve_app(settings: Settings, token: CancellationToken) -> Result<()> {
    let bot_score_verifier = RecaptchaVerifier::new(&settings.bot_score)?;

    let router = match settings.server.environment {
        AppEnvironment::Local => {
            let app_state: AppState<LocalSetup> =
                build_app_state(&settings, LogMailer, bot_score_verifier)?;
            router::setup_app_router(app_state)
        }
        _ => {
            let mailer = SmtpMailer::new(settings.smtp.as_ref())?;
            let app_state: AppState<ProdSetup> =
                build_app_state(&settings, mailer, bot_score_verifier)?;
            router::setup_app_router(app_state)
        }
    };

    let req_id = HeaderName::from_static(REQUEST_ID);

    let router = router
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
                let request_id = request
                    .headers()
                    .get(REQUEST_ID)
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or_default();

                tracing::info_span!(
                    "request",
                    method = %request.method(),
                    uri = %request.uri(),
                    request_id,
                )
            }),
        )
        // Set and propagate "x-request-id" (as a ulid) per request.
        .layer(
            ServiceBuilder::new()
                .set_request_id(req_id.clone(), MakeRequestUlid)
                .propagate_request_id(req_id),
        )
        // Applies the `tower_http::timeout::Timeout` middleware which
        // applies a timeout to requests.
        .layer(TimeoutLayer::new(Duration::from_millis(
            settings.server.timeout_ms,
        )))
        // Catches runtime panics and converts them into
        // `500 Internal Server` responses.
        .layer(CatchPanicLayer::custom(runtime::catch_panic))
        // Mark headers as sensitive on both requests and responses.
        .layer(SetSensitiveHeadersLayer::new([
            header::AUTHORIZATION,
            header::COOKIE,
        ]))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-doc/openapi.json", ApiDoc::openapi()));

    let (server, _) = serve("Application", router, settings.server.port).await?;

    token.cancelled().await;
    server.graceful_shutdown(None);

    Ok(())
}

fn build_app_state<S: ServerSetup>(
    settings: &Settings,
    mailer: S::Mailer,
    bot_score_verifier: S::BotScoreVerifier,
) -> Result<AppState<S>> {
    let otp_backend = otp::backend_from_settings(&settings.otp);

    info!(
        subject = "app_state",
        category = "init",
        otp_backend = otp_backend.name(),
        environment = %settings.server.environment,
        "building app state"
    );

    AppStateBuilder::<S>::default()
        .with_environment(settings.server.environment)
        .with_otp_backend(otp_backend)
        .with_otp_settings(settings.otp.clone())
        .with_rate_limit_settings(settings.rate_limit.clone())
        .with_extra_blocked_domains(settings.lead_capture.extra_blocked_domains.clone())
        .with_mailer(mailer)
        .with_bot_score_verifier(bot_score_verifier)
        .with_bot_score_settings(settings.bot_score.clone())
        .with_organization(settings.organization.clone())
        .finalize()
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
            if let Err(err) = axum_server::bind(bind_addr)
                .handle(handle)
                .serve(app.into_make_service_with_connect_info::<SocketAddr>())
                .await
            {
                error!(?err, "server stopped with an error");
            }
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
                error!(?err, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
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

/// Setup the [tracing][tracing] subscriber: structured JSON in production,
/// human readable lines everywhere else.
fn setup_tracing(
    writer: tracing_appender::non_blocking::NonBlocking,
    environment: AppEnvironment,
) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "leadgate_server=info,tower_http=info".into()),
        )
    });

    let (json_layer, text_layer) = if environment.is_production() {
        (
            Some(
                fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_writer(writer),
            ),
            None,
        )
    } else {
        (None, Some(fmt::layer().with_target(true).with_writer(writer)))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(json_layer)
        .with(text_layer)
        .init();
}
