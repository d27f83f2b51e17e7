//! Main [axum::Router] interface for webserver.

use crate::{
    app_state::AppState,
    routes::{fallback::notfound_404, health, lead_capture, ping, privacy},
    setups::ServerSetup,
};
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};

/// Setup main router for application.
pub fn setup_app_router<S: ServerSetup>(app_state: AppState<S>) -> Router {
    // The marketing site is served from a different origin
    let cors = CorsLayer::new()
        .allow_methods([http::Method::GET, http::Method::POST])
        .allow_headers([http::header::CONTENT_TYPE, http::header::ACCEPT])
        .allow_origin(Any);

    let api_router = Router::new()
        .route(
            "/lead-capture/send-otp",
            post(lead_capture::send_otp::<S>),
        )
        .route(
            "/lead-capture/verify-otp",
            post(lead_capture::verify_otp::<S>),
        )
        .route("/privacy/sar", post(privacy::subject_access_request::<S>))
        .layer(cors);

    Router::new()
        .route("/ping", get(ping::get))
        .route("/healthcheck", get(health::healthcheck::<S>))
        .nest("/api", api_router)
        .fallback(notfound_404)
        .with_state(app_state)
}
