//! Privacy routes.

use crate::{
    app_state::AppState,
    error::{AppError, AppResult},
    extract::json::Json,
    setups::{Mailer, ServerSetup},
    templates,
};
use axum::{self, extract::State, http::StatusCode};
use chrono::Utc;
use leadgate_core::{
    common::{SubjectAccessRequest, SuccessResponse},
    email::normalize_identifier,
};
use validator::Validate;

const INVALID_EMAIL_MESSAGE: &str = "Please provide a valid email address.";
const SEND_FAILED_MESSAGE: &str = "Failed to send the request. Please try again later.";

/// POST handler for subject access requests
#[utoipa::path(
    post,
    path = "/api/privacy/sar",
    request_body = SubjectAccessRequest,
    responses(
        (status = 200, description = "Request received, notice sent", body = SuccessResponse),
        (status = 400, description = "Invalid email address", body = PlainErrorResponse),
        (status = 500, description = "Notice could not be sent", body = PlainErrorResponse),
    )
)]
pub async fn subject_access_request<S: ServerSetup>(
    State(state): State<AppState<S>>,
    request: Result<Json<SubjectAccessRequest>, AppError>,
) -> AppResult<(StatusCode, Json<SuccessResponse>)> {
    let Json(mut request) =
        request.map_err(|_| AppError::bad_request(INVALID_EMAIL_MESSAGE).plain())?;

    request.email = normalize_identifier(&request.email);
    request
        .validate()
        .map_err(|errors| AppError::from(errors).plain())?;

    if !state.mailer.is_configured() {
        tracing::error!(
            email = %request.email,
            "Mail is not configured, can't send subject access notice"
        );
        return Err(AppError::internal(SEND_FAILED_MESSAGE).plain());
    }

    let notice =
        templates::subject_access_notice(&state.organization, &request.email, Utc::now());

    if let Err(err) = state.mailer.send(notice).await {
        tracing::error!(?err, email = %request.email, "Failed to send subject access notice");
        return Err(AppError::internal(SEND_FAILED_MESSAGE).plain());
    }

    tracing::info!(email = %request.email, "Subject access request received");

    Ok((
        StatusCode::OK,
        Json(SuccessResponse::new(format!(
            "Your request has been received. We will respond within {} days.",
            state.organization.response_days
        ))),
    ))
}
