//! Generic result/error resprentation(s).

use std::convert::Infallible;

use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use leadgate_core::common::{ErrorResponse, PlainErrorResponse};
use validator::ValidationErrors;

/// Standard return type out of routes / handlers
pub type AppResult<T> = std::result::Result<T, AppError>;

/// Message used for any error whose details must stay server-side.
pub const INTERNAL_ERROR_MESSAGE: &str = "Something went wrong. Please try again later.";

/// How an [AppError] is rendered into a response body.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum ErrorFormat {
    /// `{ "success": false, "message": "..." }`
    #[default]
    Envelope,
    /// `{ "error": "..." }`
    Plain,
}

/// An error that is safe to show to the caller.
///
/// The message is always human readable and never contains internal details;
/// those are logged where the error is created.
#[derive(thiserror::Error, Eq, PartialEq, Debug)]
#[error("{status}: {message}")]
pub struct AppError {
    pub(crate) status: StatusCode,
    pub(crate) message: String,
    pub(crate) format: ErrorFormat,
}

impl AppError {
    /// New instance of [AppError].
    pub fn new<M: ToString>(status_code: StatusCode, message: M) -> AppError {
        Self {
            status: status_code,
            message: message.to_string(),
            format: ErrorFormat::default(),
        }
    }

    /// [AppError] for [StatusCode::BAD_REQUEST].
    pub fn bad_request<M: ToString>(message: M) -> AppError {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    /// [AppError] for [StatusCode::TOO_MANY_REQUESTS].
    pub fn too_many_requests<M: ToString>(message: M) -> AppError {
        Self::new(StatusCode::TOO_MANY_REQUESTS, message)
    }

    /// [AppError] for [StatusCode::INTERNAL_SERVER_ERROR].
    pub fn internal<M: ToString>(message: M) -> AppError {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }

    /// Render this error as `{ "error": "..." }`.
    pub fn plain(self) -> AppError {
        Self {
            format: ErrorFormat::Plain,
            ..self
        }
    }

    /// The status code of the response
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// The message shown to the caller
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self.format {
            ErrorFormat::Envelope => (
                self.status,
                Json(ErrorResponse {
                    success: false,
                    message: self.message,
                }),
            )
                .into_response(),
            ErrorFormat::Plain => (
                self.status,
                Json(PlainErrorResponse {
                    error: self.message,
                }),
            )
                .into_response(),
        }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        tracing::error!(?err, "Unhandled error");
        Self::internal(INTERNAL_ERROR_MESSAGE)
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        tracing::debug!(%rejection, "Rejected request body");
        Self::bad_request("Invalid request body.")
    }
}

impl From<ValidationErrors> for AppError {
    fn from(errors: ValidationErrors) -> Self {
        let message = errors
            .field_errors()
            .into_values()
            .flatten()
            .find_map(|err| err.message.clone())
            .map(|message| message.into_owned())
            .unwrap_or_else(|| "Invalid request.".to_string());

        Self::bad_request(message)
    }
}

impl From<Infallible> for AppError {
    fn from(the_impossible: Infallible) -> Self {
        match the_impossible {}
    }
}

#[cfg(test)]
/// Parse the envelope error out of the json body
pub(crate) async fn parse_error(response: Response) -> ErrorResponse {
    let body_bytes = hyper::body::to_bytes(response.into_body()).await.unwrap();
    serde_json::from_slice(&body_bytes).unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;
    use testresult::TestResult;

    #[test]
    fn test_from_anyhow_error_hides_details() {
        let err: AppError = anyhow::anyhow!("connection refused to 10.0.0.3:25").into();

        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.message(), INTERNAL_ERROR_MESSAGE);
        assert_eq!(err.format, ErrorFormat::Envelope);
    }

    #[test]
    fn test_validation_errors_keep_field_message() {
        use validator::Validate;

        let request = leadgate_core::common::SubjectAccessRequest {
            email: "not-an-email".to_string(),
        };
        let err = AppError::from(request.validate().unwrap_err());

        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.message(), "Please provide a valid email address.");
    }

    #[test_log::test(tokio::test)]
    async fn test_envelope_error_response() -> TestResult {
        let response = AppError::too_many_requests("Slow down.").into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);

        let err = parse_error(response).await;

        assert_eq!(
            err,
            ErrorResponse {
                success: false,
                message: "Slow down.".to_string()
            }
        );

        Ok(())
    }

    #[test_log::test(tokio::test)]
    async fn test_plain_error_response() -> TestResult {
        let response = AppError::bad_request("Nope.").plain().into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = hyper::body::to_bytes(response.into_body()).await?;
        let err: PlainErrorResponse = serde_json::from_slice(&body)?;

        assert_eq!(err.error, "Nope.");

        Ok(())
    }
}
