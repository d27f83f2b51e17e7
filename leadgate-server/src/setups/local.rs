//! Server setup for local development

use super::{prod::RecaptchaVerifier, Mailer, OutgoingEmail, ServerSetup};
use anyhow::Result;
use async_trait::async_trait;

/// Implementation of `ServerSetup` for local environments.
/// Mail goes to the log instead of an SMTP relay.
#[derive(Debug, Clone)]
pub struct LocalSetup;

impl ServerSetup for LocalSetup {
    type Mailer = LogMailer;
    type BotScoreVerifier = RecaptchaVerifier;
}

/// A `Mailer` that doesn't actually send emails,
/// but instead logs them via tracing.
///
/// Reports itself as unconfigured since nothing ever reaches a mailbox.
#[derive(Debug, Clone, Default)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    fn is_configured(&self) -> bool {
        false
    }

    async fn send(&self, email: OutgoingEmail) -> Result<()> {
        tracing::info!(
            to = %email.to,
            subject = %email.subject,
            body = %email.text,
            "email (not sent, local setup)"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use testresult::TestResult;

    #[test_log::test(tokio::test)]
    async fn test_log_mailer_accepts_but_is_unconfigured() -> TestResult {
        let mailer = LogMailer;

        mailer
            .send(OutgoingEmail {
                to: "jane@acme.com".to_string(),
                subject: "Your code".to_string(),
                text: "123456".to_string(),
                html: "<p>123456</p>".to_string(),
            })
            .await?;

        assert!(!mailer.is_configured());
        Ok(())
    }
}
