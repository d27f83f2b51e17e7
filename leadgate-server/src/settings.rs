//! Settings / Configuration.

use anyhow::{bail, Result};
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::{path::PathBuf, time::Duration};

/// The signing secret shipped in `config/settings.toml`. Refused in production.
pub const PLACEHOLDER_SIGNING_SECRET: &str = "insecure-development-secret";

/// Names of environments for leadgate-server.
/// Overrides serialization to force lower case in settings and
/// environment variables
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AppEnvironment {
    /// Local environment (local testing).
    Local,
    /// Official Develop environment.
    Dev,
    /// Official environment.
    Staging,
    /// Official Production environment.
    Prod,
}

impl AppEnvironment {
    /// Development environments skip bot checks.
    pub fn is_development(&self) -> bool {
        matches!(self, Self::Local | Self::Dev)
    }

    /// Production never leaks debug information in responses.
    pub fn is_production(&self) -> bool {
        matches!(self, Self::Prod)
    }
}

/// Implement display to force environment to lower case
impl std::fmt::Display for AppEnvironment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", format!("{self:?}").to_lowercase())
    }
}

/// Server settings.
#[derive(Clone, Debug, Deserialize)]
pub struct Server {
    /// Server [AppEnvironment].
    pub environment: AppEnvironment,
    /// Server port.
    pub port: u16,
    /// Server timeout in milliseconds.
    pub timeout_ms: u64,
}

/// Which passcode backend verifies codes
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OtpBackendKind {
    /// Self-contained signed tokens, no shared state between instances
    #[default]
    Signed,
    /// Records kept in this process, the token is an opaque handle
    Store,
}

/// One-time passcode settings.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct Otp {
    /// Which backend issues and verifies passcodes
    pub backend: OtpBackendKind,
    /// How long a passcode is valid, in seconds
    pub ttl_secs: u64,
    /// Number of digits in a passcode
    pub code_length: usize,
    /// Secret the token signing keys are derived from
    pub signing_secret: String,
}

impl Default for Otp {
    fn default() -> Self {
        Self {
            backend: OtpBackendKind::Signed,
            ttl_secs: 300,
            code_length: 6,
            signing_secret: PLACEHOLDER_SIGNING_SECRET.to_string(),
        }
    }
}

impl Otp {
    /// Convert `ttl_secs` to [Duration].
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

impl std::fmt::Debug for Otp {
    fn fmt(&self, fmt: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        fmt.debug_struct("Otp")
            .field("backend", &self.backend)
            .field("ttl_secs", &self.ttl_secs)
            .field("code_length", &self.code_length)
            .finish_non_exhaustive()
    }
}

/// Per-identifier rate limiting settings.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct RateLimit {
    /// Passcode requests allowed per identifier and window
    pub max_attempts: u32,
    /// Verification attempts allowed per identifier and window
    pub verify_max_attempts: u32,
    /// Window length in seconds
    pub window_secs: u64,
}

impl Default for RateLimit {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            verify_max_attempts: 10,
            window_secs: 15 * 60,
        }
    }
}

impl RateLimit {
    /// Convert `window_secs` to [Duration].
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

/// Lead capture settings.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct LeadCapture {
    /// Domains rejected in addition to the built-in personal provider list
    pub extra_blocked_domains: Vec<String>,
}

/// Bot-score provider settings.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct BotScore {
    /// Provider secret. Scoring calls fail without it.
    pub secret_key: Option<String>,
    /// Provider verification endpoint
    pub verify_url: String,
    /// Lowest score that still passes
    pub min_score: f64,
    /// Continue without a score when the provider can't be reached
    pub fail_open: bool,
    /// Reject requests that don't carry a challenge token
    pub require_token: bool,
    /// Outbound request timeout in milliseconds
    pub timeout_ms: u64,
}

impl Default for BotScore {
    fn default() -> Self {
        Self {
            secret_key: None,
            verify_url: "https://www.google.com/recaptcha/api/siteverify".to_string(),
            min_score: 0.5,
            fail_open: true,
            require_token: false,
            timeout_ms: 5_000,
        }
    }
}

impl BotScore {
    /// Convert `timeout_ms` to [Duration].
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl std::fmt::Debug for BotScore {
    fn fmt(&self, fmt: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        fmt.debug_struct("BotScore")
            .field("secret_key", &self.secret_key.as_ref().map(|_| "<redacted>"))
            .field("verify_url", &self.verify_url)
            .field("min_score", &self.min_score)
            .field("fail_open", &self.fail_open)
            .field("require_token", &self.require_token)
            .field("timeout_ms", &self.timeout_ms)
            .finish()
    }
}

/// SMTP settings. Mail can't be sent when these are missing.
#[derive(Clone, Deserialize)]
pub struct Smtp {
    /// SMTP relay host
    pub host: String,
    /// SMTP port. 465 uses implicit TLS, anything else STARTTLS.
    pub port: u16,
    /// SMTP user
    pub username: String,
    /// SMTP password
    pub password: String,
    /// Sender address, e.g. `LeadGate <no-reply@leadgate.io>`
    pub from_address: String,
}

impl std::fmt::Debug for Smtp {
    fn fmt(&self, fmt: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        fmt.debug_struct("Smtp")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("from_address", &self.from_address)
            .finish_non_exhaustive()
    }
}

/// Organization identity rendered into outbound notices.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Organization {
    /// Product name
    pub brand_name: String,
    /// Legal entity acting as data controller
    pub legal_name: String,
    /// Registered postal address of the legal entity
    pub registered_address: String,
    /// Where privacy requests are handled
    pub privacy_email: String,
    /// General support inbox
    pub support_email: String,
    /// Public website
    pub website_url: String,
    /// Privacy policy page
    pub privacy_policy_url: String,
    /// Days within which a subject access request is answered
    pub response_days: u32,
}

impl Default for Organization {
    fn default() -> Self {
        Self {
            brand_name: "LeadGate".to_string(),
            legal_name: "LeadGate Technologies, Inc.".to_string(),
            registered_address: "548 Market Street, Suite 300, San Francisco, CA 94104, USA"
                .to_string(),
            privacy_email: "privacy@leadgate.io".to_string(),
            support_email: "support@leadgate.io".to_string(),
            website_url: "https://leadgate.io".to_string(),
            privacy_policy_url: "https://leadgate.io/privacy".to_string(),
            response_days: 30,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
/// Application settings.
pub struct Settings {
    /// Server settings
    pub server: Server,
    /// Passcode settings
    #[serde(default)]
    pub otp: Otp,
    /// Rate limiting settings
    #[serde(default)]
    pub rate_limit: RateLimit,
    /// Lead capture settings
    #[serde(default)]
    pub lead_capture: LeadCapture,
    /// Bot-score provider settings
    #[serde(default)]
    pub bot_score: BotScore,
    /// SMTP settings, if mail is configured
    #[serde(default)]
    pub smtp: Option<Smtp>,
    /// Organization identity
    #[serde(default)]
    pub organization: Organization,
    /// The path where the settings file resides.
    /// This can't actually be configured in the settings file itself, for obvious reasons.
    #[serde(skip)]
    pub path: Option<PathBuf>,
}

impl Settings {
    /// Load settings.
    pub fn load(config_path: Option<PathBuf>) -> Result<Self, ConfigError> {
        let path = config_path
            .unwrap_or(PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("config/settings.toml"));
        // inject environment variables naming them properly on the settings
        // e.g. [smtp] host="foo"
        // would be injected with environment variable LEADGATE_SERVER__SMTP__HOST="foo"
        let s = Config::builder()
            .add_source(File::with_name(&path.as_path().display().to_string()))
            .add_source(
                Environment::with_prefix("LEADGATE_SERVER")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("lead_capture.extra_blocked_domains"),
            )
            .build()?;
        let mut settings: Self = s.try_deserialize()?;
        settings.path = Some(path);
        Ok(settings)
    }

    /// Refuse configurations that are only acceptable during development.
    pub fn ensure_deployable(&self) -> Result<()> {
        if !self.server.environment.is_production() {
            return Ok(());
        }

        if self.otp.signing_secret.trim().is_empty()
            || self.otp.signing_secret == PLACEHOLDER_SIGNING_SECRET
        {
            bail!("otp.signing_secret must be set to a private value in production");
        }

        if self.otp.code_length == 0 {
            bail!("otp.code_length must be at least 1");
        }

        Ok(())
    }
}
