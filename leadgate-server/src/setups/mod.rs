//! This abstracts leadgate server side-effects into "setups".
//!
//! This module defines the traits, submodules define test, local & production
//! collections of implementations.
use anyhow::Result;
use async_trait::async_trait;

pub mod local;
pub mod prod;

/// This trait groups type parameters to the server's `AppState` struct.
///
/// It captures the setup of the server, distinguishing between e.g.
/// unit testing & production setups.
pub trait ServerSetup: Clone + Send + Sync + 'static {
    /// Which implementation to use to send emails
    type Mailer: Mailer;
    /// Which implementation to use to score clients for bot-likeness
    type BotScoreVerifier: BotScoreVerifier;
}

/// A fully rendered outbound email
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutgoingEmail {
    /// Recipient address
    pub to: String,
    /// Subject line
    pub subject: String,
    /// Plain text body
    pub text: String,
    /// HTML body
    pub html: String,
}

/// The service that delivers emails
#[async_trait]
pub trait Mailer: Clone + Send + Sync + 'static {
    /// Whether this mailer can deliver at all
    fn is_configured(&self) -> bool;

    /// Deliver the email
    async fn send(&self, email: OutgoingEmail) -> Result<()>;
}

/// What the bot-score provider thinks of a client
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum BotVerdict {
    /// Likely a human
    Passed {
        /// Provider score, if it reported one
        score: Option<f64>,
    },
    /// Likely a bot, or the challenge token was bad
    Rejected {
        /// Provider score, if it reported one
        score: Option<f64>,
    },
}

impl BotVerdict {
    /// Whether the client passed
    pub fn passed(&self) -> bool {
        matches!(self, Self::Passed { .. })
    }
}

/// The service that scores challenge tokens from the browser.
///
/// Errors mean the provider couldn't give an answer (unreachable, timeout,
/// not configured), not that the client failed.
#[async_trait]
pub trait BotScoreVerifier: Clone + Send + Sync + 'static {
    /// Score a challenge token
    async fn verify(&self, token: &str) -> Result<BotVerdict>;
}
