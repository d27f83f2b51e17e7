//! Production server setup code

use crate::{
    settings,
    setups::{BotScoreVerifier, BotVerdict, Mailer, OutgoingEmail, ServerSetup},
};
use anyhow::{anyhow, Context as _, Result};
use async_trait::async_trait;
use lettre::{
    message::{Mailbox, MultiPart},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_tracing::TracingMiddleware;
use serde::Deserialize;
use std::sync::Arc;
use url::Url;

/// Production implementation of `ServerSetup`.
/// Actually calls out to the SMTP relay and bot-score provider configured in `settings.toml`.
#[derive(Clone, Debug, Default)]
pub struct ProdSetup;

impl ServerSetup for ProdSetup {
    type Mailer = SmtpMailer;
    type BotScoreVerifier = RecaptchaVerifier;
}

/// Port on which SMTP relays speak implicit TLS
const SMTPS_PORT: u16 = 465;

#[derive(Clone)]
struct SmtpRelay {
    transport: Arc<AsyncSmtpTransport<Tokio1Executor>>,
    from: Mailbox,
    host: String,
}

/// Sends email through an SMTP relay.
///
/// Without SMTP settings the mailer is unconfigured and every send fails.
#[derive(Clone)]
pub struct SmtpMailer {
    relay: Option<SmtpRelay>,
}

impl std::fmt::Debug for SmtpMailer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmtpMailer")
            .field("host", &self.relay.as_ref().map(|relay| relay.host.as_str()))
            .field("from", &self.relay.as_ref().map(|relay| relay.from.to_string()))
            .finish()
    }
}

impl SmtpMailer {
    /// Build a mailer from optional SMTP settings.
    pub fn new(settings: Option<&settings::Smtp>) -> Result<Self> {
        let Some(settings) = settings else {
            tracing::warn!("SMTP is not configured, outbound mail will fail");
            return Ok(Self::unconfigured());
        };

        let from: Mailbox = settings
            .from_address
            .parse()
            .with_context(|| format!("Invalid smtp.from_address {:?}", settings.from_address))?;

        let builder = if settings.port == SMTPS_PORT {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&settings.host)
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&settings.host)
        }
        .with_context(|| format!("Invalid smtp.host {:?}", settings.host))?;

        let transport = builder
            .port(settings.port)
            .credentials(Credentials::new(
                settings.username.clone(),
                settings.password.clone(),
            ))
            .build();

        Ok(Self {
            relay: Some(SmtpRelay {
                transport: Arc::new(transport),
                from,
                host: settings.host.clone(),
            }),
        })
    }

    /// A mailer that refuses to send anything
    pub fn unconfigured() -> Self {
        Self { relay: None }
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    fn is_configured(&self) -> bool {
        self.relay.is_some()
    }

    async fn send(&self, email: OutgoingEmail) -> Result<()> {
        let relay = self
            .relay
            .as_ref()
            .ok_or_else(|| anyhow!("SMTP is not configured"))?;

        let to: Mailbox = email
            .to
            .parse()
            .with_context(|| format!("Invalid recipient {:?}", email.to))?;

        let message = Message::builder()
            .from(relay.from.clone())
            .to(to)
            .subject(email.subject.as_str())
            .multipart(MultiPart::alternative_plain_html(email.text, email.html))?;

        tracing::debug!(
            to = %email.to,
            subject = %email.subject,
            host = %relay.host,
            "Sending email"
        );

        relay.transport.send(message).await?;

        Ok(())
    }
}

/// Scores challenge tokens with a reCAPTCHA compatible `siteverify` endpoint.
#[derive(Clone)]
pub struct RecaptchaVerifier {
    client: ClientWithMiddleware,
    verify_url: Url,
    secret_key: Option<String>,
    min_score: f64,
}

impl std::fmt::Debug for RecaptchaVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecaptchaVerifier")
            .field("verify_url", &self.verify_url.as_str())
            .field("min_score", &self.min_score)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Deserialize)]
struct SiteVerifyResponse {
    success: bool,
    #[serde(default)]
    score: Option<f64>,
    #[serde(default)]
    action: Option<String>,
    #[serde(default, rename = "error-codes")]
    error_codes: Vec<String>,
}

impl RecaptchaVerifier {
    /// Create a verifier with a tracing-instrumented HTTP client.
    pub fn new(settings: &settings::BotScore) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(settings.timeout())
            .build()?;

        Self::new_with(
            ClientBuilder::new(client)
                .with(TracingMiddleware::default())
                .build(),
            settings,
        )
    }

    /// Create a verifier using the given client.
    pub fn new_with(client: ClientWithMiddleware, settings: &settings::BotScore) -> Result<Self> {
        let verify_url = Url::parse(&settings.verify_url)
            .with_context(|| format!("Invalid bot_score.verify_url {:?}", settings.verify_url))?;

        Ok(Self {
            client,
            verify_url,
            secret_key: settings.secret_key.clone().filter(|key| !key.is_empty()),
            min_score: settings.min_score,
        })
    }
}

#[async_trait]
impl BotScoreVerifier for RecaptchaVerifier {
    async fn verify(&self, token: &str) -> Result<BotVerdict> {
        let secret = self
            .secret_key
            .as_deref()
            .ok_or_else(|| anyhow!("bot_score.secret_key is not configured"))?;

        let response = self
            .client
            .post(self.verify_url.clone())
            .form(&[("secret", secret), ("response", token)])
            .send()
            .await?
            .error_for_status()?
            .json::<SiteVerifyResponse>()
            .await?;

        tracing::debug!(
            success = response.success,
            score = ?response.score,
            action = ?response.action,
            error_codes = ?response.error_codes,
            "Bot score received"
        );

        let score = response.score;
        let passed = response.success && score.map_or(true, |score| score >= self.min_score);

        Ok(if passed {
            BotVerdict::Passed { score }
        } else {
            BotVerdict::Rejected { score }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;
    use testresult::TestResult;
    use wiremock::{
        matchers::{body_string_contains, method, path},
        Mock, MockServer, ResponseTemplate,
    };

    async fn verifier_for(
        server: &MockServer,
        secret_key: Option<&str>,
    ) -> Result<RecaptchaVerifier> {
        RecaptchaVerifier::new(&settings::BotScore {
            secret_key: secret_key.map(ToString::to_string),
            verify_url: format!("{}/siteverify", server.uri()),
            ..Default::default()
        })
    }

    async fn respond_with(server: &MockServer, body: serde_json::Value) {
        Mock::given(method("POST"))
            .and(path("/siteverify"))
            .and(body_string_contains("secret=s3cret"))
            .and(body_string_contains("response=challenge"))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(server)
            .await;
    }

    #[test_log::test(tokio::test)]
    async fn test_high_score_passes() -> TestResult {
        let server = MockServer::start().await;
        respond_with(&server, json!({ "success": true, "score": 0.9 })).await;

        let verdict = verifier_for(&server, Some("s3cret"))
            .await?
            .verify("challenge")
            .await?;

        assert_eq!(verdict, BotVerdict::Passed { score: Some(0.9) });
        Ok(())
    }

    #[test_log::test(tokio::test)]
    async fn test_score_at_threshold_passes() -> TestResult {
        let server = MockServer::start().await;
        respond_with(&server, json!({ "success": true, "score": 0.5 })).await;

        let verdict = verifier_for(&server, Some("s3cret"))
            .await?
            .verify("challenge")
            .await?;

        assert!(verdict.passed());
        Ok(())
    }

    #[test_log::test(tokio::test)]
    async fn test_low_score_rejected() -> TestResult {
        let server = MockServer::start().await;
        respond_with(&server, json!({ "success": true, "score": 0.1 })).await;

        let verdict = verifier_for(&server, Some("s3cret"))
            .await?
            .verify("challenge")
            .await?;

        assert_eq!(verdict, BotVerdict::Rejected { score: Some(0.1) });
        Ok(())
    }

    #[test_log::test(tokio::test)]
    async fn test_unsuccessful_challenge_rejected() -> TestResult {
        let server = MockServer::start().await;
        respond_with(
            &server,
            json!({ "success": false, "error-codes": ["invalid-input-response"] }),
        )
        .await;

        let verdict = verifier_for(&server, Some("s3cret"))
            .await?
            .verify("challenge")
            .await?;

        assert_eq!(verdict, BotVerdict::Rejected { score: None });
        Ok(())
    }

    #[test_log::test(tokio::test)]
    async fn test_provider_error_is_an_error() -> TestResult {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let result = verifier_for(&server, Some("s3cret"))
            .await?
            .verify("challenge")
            .await;

        assert_matches!(result, Err(_));
        Ok(())
    }

    #[test_log::test(tokio::test)]
    async fn test_missing_secret_is_an_error() -> TestResult {
        let server = MockServer::start().await;

        let result = verifier_for(&server, None).await?.verify("challenge").await;

        assert_matches!(result, Err(_));
        assert!(server.received_requests().await.unwrap_or_default().is_empty());
        Ok(())
    }

    #[test_log::test(tokio::test)]
    async fn test_unconfigured_mailer_fails() {
        let mailer = SmtpMailer::new(None).unwrap();

        assert!(!mailer.is_configured());
        assert_matches!(
            mailer
                .send(OutgoingEmail {
                    to: "jane@acme.com".to_string(),
                    subject: "Hello".to_string(),
                    text: "Hello".to_string(),
                    html: "<p>Hello</p>".to_string(),
                })
                .await,
            Err(_)
        );
    }

    #[test_log::test(tokio::test)]
    async fn test_configured_mailer() -> TestResult {
        let mailer = SmtpMailer::new(Some(&settings::Smtp {
            host: "smtp.example.com".to_string(),
            port: 587,
            username: "mailer".to_string(),
            password: "hunter2".to_string(),
            from_address: "LeadGate <no-reply@leadgate.io>".to_string(),
        }))?;

        assert!(mailer.is_configured());
        assert!(!format!("{mailer:?}").contains("hunter2"));
        Ok(())
    }

    #[test]
    fn test_invalid_from_address() {
        let result = SmtpMailer::new(Some(&settings::Smtp {
            host: "smtp.example.com".to_string(),
            port: 465,
            username: "mailer".to_string(),
            password: "hunter2".to_string(),
            from_address: "not an address".to_string(),
        }));

        assert_matches!(result, Err(_));
    }
}
