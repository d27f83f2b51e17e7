//! OpenAPI doc generation.

use crate::routes::{health, lead_capture, ping, privacy};
use leadgate_core::common::{
    ErrorResponse, OtpDebug, PlainErrorResponse, SendOtpRequest, SendOtpResponse,
    SubjectAccessRequest, SuccessResponse, VerifyOtpRequest,
};
use utoipa::OpenApi;

/// API documentation generator.
#[derive(OpenApi)]
#[openapi(
    paths(
        health::healthcheck,
        ping::get,
        lead_capture::send_otp,
        lead_capture::verify_otp,
        privacy::subject_access_request,
    ),
    components(
        schemas(
            SendOtpRequest,
            SendOtpResponse,
            OtpDebug,
            VerifyOtpRequest,
            SubjectAccessRequest,
            SuccessResponse,
            ErrorResponse,
            PlainErrorResponse,
            health::HealthcheckResponse
        )
    ),
    tags(
        (name = "leadgate-server", description = "Lead capture and privacy request API")
    )
)]

/// Tied to OpenAPI documentation.
#[derive(Debug)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_documents_all_routes() {
        let doc = ApiDoc::openapi();
        let paths: Vec<_> = doc.paths.paths.keys().cloned().collect();

        for path in [
            "/ping",
            "/healthcheck",
            "/api/lead-capture/send-otp",
            "/api/lead-capture/verify-otp",
            "/api/privacy/sar",
        ] {
            assert!(paths.iter().any(|p| p == path), "{path} missing from {paths:?}");
        }
    }
}
