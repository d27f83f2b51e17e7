//! Lead capture routes: passcode issuance and verification.

use crate::{
    app_state::AppState,
    error::{AppError, AppResult},
    extract::json::Json,
    otp::{generate_code, OtpVerification},
    setups::{BotScoreVerifier, BotVerdict, Mailer, ServerSetup},
    templates,
};
use axum::{self, extract::State, http::StatusCode};
use chrono::Utc;
use leadgate_core::{
    common::{
        OtpDebug, SendOtpRequest, SendOtpResponse, SuccessResponse, VerifyOtpRequest,
    },
    email::{normalize_identifier, EmailVerdict},
};
use validator::Validate;

const MISSING_FIELDS_MESSAGE: &str = "Email and phone number are required.";
const INVALID_EMAIL_MESSAGE: &str = "Please provide a valid email address.";
const INVALID_PHONE_MESSAGE: &str = "Please provide a valid phone number.";
const PERSONAL_EMAIL_MESSAGE: &str = "Please use your business email address.";
const BOT_REJECTED_MESSAGE: &str = "Bot verification failed. Please try again.";
const SEND_FAILED_MESSAGE: &str = "Failed to send verification code. Please try again later.";
const CODE_SENT_MESSAGE: &str = "Verification code sent to your email.";
const MISSING_VERIFY_FIELDS_MESSAGE: &str = "Email, code and token are required.";
const INVALID_CODE_MESSAGE: &str = "Invalid or expired verification code.";
const VERIFIED_MESSAGE: &str = "Email verified.";

/// POST handler for requesting a passcode by email
#[utoipa::path(
    post,
    path = "/api/lead-capture/send-otp",
    request_body = SendOtpRequest,
    responses(
        (status = 200, description = "Passcode sent", body = SendOtpResponse),
        (status = 400, description = "Invalid request, personal email or failed bot check", body = ErrorResponse),
        (status = 429, description = "Too many requests", body = ErrorResponse),
        (status = 500, description = "Passcode could not be sent", body = ErrorResponse),
    )
)]
pub async fn send_otp<S: ServerSetup>(
    State(state): State<AppState<S>>,
    request: Result<Json<SendOtpRequest>, AppError>,
) -> AppResult<(StatusCode, Json<SendOtpResponse>)> {
    let Json(request) = request.map_err(|_| AppError::bad_request(MISSING_FIELDS_MESSAGE))?;

    if request.email.trim().is_empty() || request.phone.trim().is_empty() {
        return Err(AppError::bad_request(MISSING_FIELDS_MESSAGE));
    }

    request.validate().map_err(|errors| {
        if errors.field_errors().contains_key("email") {
            AppError::bad_request(INVALID_EMAIL_MESSAGE)
        } else {
            AppError::bad_request(INVALID_PHONE_MESSAGE)
        }
    })?;

    let identifier = normalize_identifier(&request.email);

    if state.email_classifier.classify(&identifier) == EmailVerdict::Personal {
        return Err(AppError::bad_request(PERSONAL_EMAIL_MESSAGE));
    }

    let decision = state.send_rate_limiter.check(&identifier);
    if !decision.allowed {
        return Err(AppError::too_many_requests(
            decision.message.unwrap_or_default(),
        ));
    }

    check_bot_score(&state, request.recaptcha_token.as_deref()).await?;

    let code = generate_code(state.otp_code_length);
    let issued = state
        .otp_backend
        .issue(&identifier, &code, Utc::now())
        .await?;

    let email = templates::otp_email(&state.organization, &identifier, &code, state.otp_ttl);
    if let Err(err) = state.mailer.send(email).await {
        tracing::error!(?err, %identifier, "Failed to send passcode email");
        return Err(AppError::internal(SEND_FAILED_MESSAGE));
    }

    tracing::info!(%identifier, backend = state.otp_backend.name(), "Passcode sent");

    let debug = (!state.environment.is_production()).then_some(OtpDebug { otp: code });

    Ok((
        StatusCode::OK,
        Json(SendOtpResponse {
            success: true,
            message: CODE_SENT_MESSAGE.to_string(),
            expires_at: issued.expires_at,
            signed_token: issued.signed_token,
            debug,
        }),
    ))
}

/// POST handler for checking a passcode previously sent by email
#[utoipa::path(
    post,
    path = "/api/lead-capture/verify-otp",
    request_body = VerifyOtpRequest,
    responses(
        (status = 200, description = "Email verified", body = SuccessResponse),
        (status = 400, description = "Invalid or expired passcode", body = ErrorResponse),
        (status = 429, description = "Too many attempts", body = ErrorResponse),
    )
)]
pub async fn verify_otp<S: ServerSetup>(
    State(state): State<AppState<S>>,
    request: Result<Json<VerifyOtpRequest>, AppError>,
) -> AppResult<(StatusCode, Json<SuccessResponse>)> {
    let Json(request) =
        request.map_err(|_| AppError::bad_request(MISSING_VERIFY_FIELDS_MESSAGE))?;

    if request.email.trim().is_empty()
        || request.code.trim().is_empty()
        || request.signed_token.trim().is_empty()
    {
        return Err(AppError::bad_request(MISSING_VERIFY_FIELDS_MESSAGE));
    }

    let identifier = normalize_identifier(&request.email);

    let decision = state.verify_rate_limiter.check(&identifier);
    if !decision.allowed {
        return Err(AppError::too_many_requests(
            decision.message.unwrap_or_default(),
        ));
    }

    let verification = state
        .otp_backend
        .verify(
            &identifier,
            request.signed_token.trim(),
            request.code.trim(),
            Utc::now(),
        )
        .await;

    match verification {
        OtpVerification::Valid { .. } => {
            tracing::info!(%identifier, "Email verified");
            Ok((StatusCode::OK, Json(SuccessResponse::new(VERIFIED_MESSAGE))))
        }
        OtpVerification::Invalid => Err(AppError::bad_request(INVALID_CODE_MESSAGE)),
    }
}

/// Consult the bot-score provider if the environment and request call for it.
async fn check_bot_score<S: ServerSetup>(
    state: &AppState<S>,
    token: Option<&str>,
) -> AppResult<()> {
    if state.environment.is_development() {
        return Ok(());
    }

    let settings = &state.bot_score_settings;

    let Some(token) = token.map(str::trim).filter(|token| !token.is_empty()) else {
        if settings.require_token {
            tracing::info!("Rejected request without bot challenge token");
            return Err(AppError::bad_request(BOT_REJECTED_MESSAGE));
        }
        return Ok(());
    };

    match state.bot_score_verifier.verify(token).await {
        Ok(BotVerdict::Passed { .. }) => Ok(()),
        Ok(BotVerdict::Rejected { score }) => {
            tracing::info!(?score, "Bot score too low");
            Err(AppError::bad_request(BOT_REJECTED_MESSAGE))
        }
        Err(err) if settings.fail_open => {
            tracing::warn!(?err, "Bot score unavailable, continuing without it");
            Ok(())
        }
        Err(err) => {
            tracing::warn!(?err, "Bot score unavailable, rejecting");
            Err(AppError::bad_request(BOT_REJECTED_MESSAGE))
        }
    }
}
