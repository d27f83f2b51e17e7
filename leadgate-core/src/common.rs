//! Request and response data types that are common and useful between clients of and the leadgate server

use crate::email::{validate_email_address, validate_phone};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

/// Request for a one-time passcode sent to a business email
#[derive(Deserialize, Serialize, Validate, Clone, Debug, Default, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SendOtpRequest {
    /// Business email address of the lead
    #[serde(default)]
    #[validate(custom = "validate_email_address")]
    pub email: String,
    /// Phone number of the lead
    #[serde(default)]
    #[validate(custom = "validate_phone")]
    pub phone: String,
    /// Token obtained from the bot-mitigation challenge on the page
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recaptcha_token: Option<String>,
}

/// Debug information only returned outside of production
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq, ToSchema)]
pub struct OtpDebug {
    /// The passcode that was emailed
    pub otp: String,
}

/// Response to a successful passcode request
#[derive(Deserialize, Serialize, Clone, Debug, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SendOtpResponse {
    /// Always `true`
    pub success: bool,
    /// Human readable status
    pub message: String,
    /// Instant after which the passcode is no longer accepted
    pub expires_at: DateTime<Utc>,
    /// Token the client presents back together with the passcode
    pub signed_token: String,
    /// Present outside of production only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debug: Option<OtpDebug>,
}

/// Request to verify a passcode previously sent by email
#[derive(Deserialize, Serialize, Clone, Debug, Default, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct VerifyOtpRequest {
    /// The email address the passcode was sent to
    #[serde(default)]
    pub email: String,
    /// The passcode typed in by the user
    #[serde(default)]
    pub code: String,
    /// The token returned when the passcode was requested
    #[serde(default)]
    pub signed_token: String,
}

/// Subject access request
#[derive(Deserialize, Serialize, Validate, Clone, Debug, Default, ToSchema)]
pub struct SubjectAccessRequest {
    /// Where to send the compliance notice
    #[serde(default)]
    #[validate(email(message = "Please provide a valid email address."))]
    pub email: String,
}

/// Response type indiciating success
#[derive(Serialize, Deserialize, Clone, Debug, ToSchema)]
pub struct SuccessResponse {
    /// Whether the response was successful
    pub success: bool,
    /// Human readable status
    pub message: String,
}

impl SuccessResponse {
    /// A successful response with the given message
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }
}

/// Error body of the lead capture endpoints
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, ToSchema)]
pub struct ErrorResponse {
    /// Always `false`
    pub success: bool,
    /// Human readable reason
    pub message: String,
}

/// Error body of the privacy endpoints
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, ToSchema)]
pub struct PlainErrorResponse {
    /// Human readable reason
    pub error: String,
}
