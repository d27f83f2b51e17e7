//! The Axum Application State

use crate::{
    otp::OtpBackend,
    rate_limit::RateLimiter,
    settings::{self, AppEnvironment},
    setups::ServerSetup,
};
use anyhow::{anyhow, Result};
use leadgate_core::email::EmailClassifier;
use std::{sync::Arc, time::Duration};

#[derive(Clone)]
/// Global application route state.
pub struct AppState<S: ServerSetup> {
    /// The environment the server runs in
    pub environment: AppEnvironment,
    /// Issues and verifies one-time passcodes
    pub otp_backend: Arc<dyn OtpBackend>,
    /// How long passcodes are valid
    pub otp_ttl: Duration,
    /// Number of digits in a passcode
    pub otp_code_length: usize,
    /// Limits passcode requests per identifier
    pub send_rate_limiter: Arc<RateLimiter>,
    /// Limits passcode verification attempts per identifier
    pub verify_rate_limiter: Arc<RateLimiter>,
    /// Tells business from personal email addresses
    pub email_classifier: Arc<EmailClassifier>,
    /// The service that delivers emails
    pub mailer: S::Mailer,
    /// The service that scores clients for bot-likeness
    pub bot_score_verifier: S::BotScoreVerifier,
    /// When and how bot scores are consulted
    pub bot_score_settings: Arc<settings::BotScore>,
    /// Identity strings rendered into outbound emails
    pub organization: Arc<settings::Organization>,
}

/// Builder for [`AppState`]
#[derive(Debug)]
pub struct AppStateBuilder<S: ServerSetup> {
    environment: AppEnvironment,
    otp_backend: Option<Arc<dyn OtpBackend>>,
    otp_settings: settings::Otp,
    rate_limit_settings: settings::RateLimit,
    extra_blocked_domains: Vec<String>,
    mailer: Option<S::Mailer>,
    bot_score_verifier: Option<S::BotScoreVerifier>,
    bot_score_settings: settings::BotScore,
    organization: settings::Organization,
}

impl<S: ServerSetup> Default for AppStateBuilder<S> {
    fn default() -> Self {
        Self {
            environment: AppEnvironment::Local,
            otp_backend: None,
            otp_settings: Default::default(),
            rate_limit_settings: Default::default(),
            extra_blocked_domains: Default::default(),
            mailer: None,
            bot_score_verifier: None,
            bot_score_settings: Default::default(),
            organization: Default::default(),
        }
    }
}

impl<S: ServerSetup> AppStateBuilder<S> {
    /// Finalize the builder and return the [`AppState`]
    pub fn finalize(self) -> Result<AppState<S>> {
        let otp_backend = self
            .otp_backend
            .ok_or_else(|| anyhow!("otp_backend is required"))?;

        let mailer = self.mailer.ok_or_else(|| anyhow!("mailer is required"))?;

        let bot_score_verifier = self
            .bot_score_verifier
            .ok_or_else(|| anyhow!("bot_score_verifier is required"))?;

        if self.otp_settings.code_length == 0 {
            return Err(anyhow!("otp code_length must be at least 1"));
        }

        let window = self.rate_limit_settings.window();

        Ok(AppState {
            environment: self.environment,
            otp_backend,
            otp_ttl: self.otp_settings.ttl(),
            otp_code_length: self.otp_settings.code_length,
            send_rate_limiter: Arc::new(RateLimiter::new(
                self.rate_limit_settings.max_attempts,
                window,
            )),
            verify_rate_limiter: Arc::new(RateLimiter::new(
                self.rate_limit_settings.verify_max_attempts,
                window,
            )),
            email_classifier: Arc::new(EmailClassifier::new(self.extra_blocked_domains)),
            mailer,
            bot_score_verifier,
            bot_score_settings: Arc::new(self.bot_score_settings),
            organization: Arc::new(self.organization),
        })
    }

    /// Set the environment
    pub fn with_environment(mut self, environment: AppEnvironment) -> Self {
        self.environment = environment;
        self
    }

    /// Set the passcode backend
    pub fn with_otp_backend(mut self, otp_backend: Arc<dyn OtpBackend>) -> Self {
        self.otp_backend = Some(otp_backend);
        self
    }

    /// Set passcode settings (TTL, code length)
    pub fn with_otp_settings(mut self, otp_settings: settings::Otp) -> Self {
        self.otp_settings = otp_settings;
        self
    }

    /// Set rate limiting settings
    pub fn with_rate_limit_settings(mut self, rate_limit_settings: settings::RateLimit) -> Self {
        self.rate_limit_settings = rate_limit_settings;
        self
    }

    /// Reject these domains in addition to the built-in personal providers
    pub fn with_extra_blocked_domains(mut self, domains: Vec<String>) -> Self {
        self.extra_blocked_domains.extend(domains);
        self
    }

    /// Set the service that delivers emails
    pub fn with_mailer(mut self, mailer: S::Mailer) -> Self {
        self.mailer = Some(mailer);
        self
    }

    /// Set the service that scores clients for bot-likeness
    pub fn with_bot_score_verifier(mut self, bot_score_verifier: S::BotScoreVerifier) -> Self {
        self.bot_score_verifier = Some(bot_score_verifier);
        self
    }

    /// Set bot score settings
    pub fn with_bot_score_settings(mut self, bot_score_settings: settings::BotScore) -> Self {
        self.bot_score_settings = bot_score_settings;
        self
    }

    /// Set the organization identity
    pub fn with_organization(mut self, organization: settings::Organization) -> Self {
        self.organization = organization;
        self
    }
}

impl<S> std::fmt::Debug for AppState<S>
where
    S: ServerSetup,
    S::Mailer: std::fmt::Debug,
    S::BotScoreVerifier: std::fmt::Debug,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("environment", &self.environment)
            .field("otp_backend", &self.otp_backend)
            .field("otp_ttl", &self.otp_ttl)
            .field("send_rate_limiter", &self.send_rate_limiter)
            .field("verify_rate_limiter", &self.verify_rate_limiter)
            .field("mailer", &self.mailer)
            .field("bot_score_verifier", &self.bot_score_verifier)
            .field("bot_score_settings", &self.bot_score_settings)
            .finish()
    }
}
