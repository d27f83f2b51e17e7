//! Healthcheck route.

use crate::{
    app_state::AppState,
    error::AppResult,
    setups::{Mailer, ServerSetup},
};
use axum::{self, extract::State, http::StatusCode};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// A healthcheck response containing diagnostic information for the service
#[derive(ToSchema, Eq, PartialEq, Debug, Deserialize, Serialize)]
pub struct HealthcheckResponse {
    healthy: bool,
    otp_backend: String,
    mail_configured: bool,
}

impl HealthcheckResponse {
    /// Whether the service is healthy
    pub fn is_healthy(&self) -> bool {
        self.healthy
    }

    /// The status code for the healthcheck response
    pub fn status_code(&self) -> StatusCode {
        if self.is_healthy() {
            StatusCode::OK
        } else {
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}

/// GET handler for checking service health.
#[utoipa::path(
    get,
    path = "/healthcheck",
    responses(
        (status = 200, description = "leadgate-server healthy", body=HealthcheckResponse),
        (status = 503, description = "leadgate-server not healthy", body=HealthcheckResponse)
    )
)]
pub async fn healthcheck<S: ServerSetup>(
    State(state): State<AppState<S>>,
) -> AppResult<(StatusCode, axum::Json<HealthcheckResponse>)> {
    // Mail can be unconfigured on purpose, e.g. in local runs
    let response = HealthcheckResponse {
        healthy: true,
        otp_backend: state.otp_backend.name().to_string(),
        mail_configured: state.mailer.is_configured(),
    };

    Ok((response.status_code(), axum::Json(response)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        setups::test::TestMailer,
        test_utils::{route_builder::RouteBuilder, test_context::TestContext},
    };
    use http::Method;
    use testresult::TestResult;

    #[test_log::test(tokio::test)]
    async fn test_healthcheck() -> TestResult {
        let ctx = TestContext::new()?;

        let (status, response) = RouteBuilder::new(ctx.app(), Method::GET, "/healthcheck")
            .into_json_response::<HealthcheckResponse>()
            .await?;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            response,
            HealthcheckResponse {
                healthy: true,
                otp_backend: "signed".to_string(),
                mail_configured: true,
            }
        );
        Ok(())
    }

    #[test_log::test(tokio::test)]
    async fn test_healthcheck_reports_unconfigured_mail() -> TestResult {
        let ctx =
            TestContext::new_with_state(|builder| builder.with_mailer(TestMailer::unconfigured()))?;

        let (status, response) = RouteBuilder::new(ctx.app(), Method::GET, "/healthcheck")
            .into_json_response::<HealthcheckResponse>()
            .await?;

        assert_eq!(status, StatusCode::OK);
        assert!(!response.mail_configured);
        Ok(())
    }
}
