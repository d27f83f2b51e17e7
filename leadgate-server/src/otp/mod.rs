//! One-time passcodes: generation, issuance and verification.
//!
//! Issuing and verifying go through [OtpBackend], which has two
//! implementations picked by configuration:
//!
//! - [SignedTokenBackend] hands out self-contained signed tokens, so any
//!   instance holding the same secret can verify them.
//! - [StoreBackend] keeps records in this process and hands out opaque handles.

use crate::settings::{self, OtpBackendKind};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, DurationRound, Utc};
use rand::{rngs::OsRng, Rng};
use std::sync::Arc;

mod signed;
mod store;

pub use signed::{SignedTokenBackend, TokenError, TokenPayload};
pub use store::StoreBackend;

/// A passcode as remembered by the server side.
#[derive(Clone, PartialEq, Eq)]
pub struct OtpRecord {
    /// Normalized email the code was sent to
    pub identifier: String,
    /// The passcode
    pub code: String,
    /// When it was issued
    pub issued_at: DateTime<Utc>,
    /// Last instant at which it is accepted
    pub expires_at: DateTime<Utc>,
}

impl std::fmt::Debug for OtpRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OtpRecord")
            .field("identifier", &self.identifier)
            .field("issued_at", &self.issued_at)
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}

/// What the client gets back after a passcode was issued
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IssuedOtp {
    /// Last instant at which the passcode is accepted
    pub expires_at: DateTime<Utc>,
    /// Token to present together with the passcode
    pub signed_token: String,
}

/// The outcome of a verification.
///
/// Deliberately doesn't say *why* a verification failed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OtpVerification {
    /// Token intact, not expired, code matched. The token is now used up.
    Valid {
        /// The identifier the passcode was issued for
        identifier: String,
    },
    /// Anything else
    Invalid,
}

impl OtpVerification {
    /// Whether this is [OtpVerification::Valid]
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid { .. })
    }
}

/// Issues passcodes and verifies them later.
#[async_trait]
pub trait OtpBackend: Send + Sync + std::fmt::Debug {
    /// Short name for logs and health reports
    fn name(&self) -> &'static str;

    /// Remember `code` for `identifier`, valid from `now` for the configured TTL.
    ///
    /// `now` is truncated to whole milliseconds, `expires_at` is exactly that
    /// instant plus the TTL.
    async fn issue(&self, identifier: &str, code: &str, now: DateTime<Utc>) -> Result<IssuedOtp>;

    /// Check `code` against `token` at `now`, for `identifier` only.
    /// Consumes the token when valid.
    async fn verify(
        &self,
        identifier: &str,
        token: &str,
        code: &str,
        now: DateTime<Utc>,
    ) -> OtpVerification;
}

/// Construct the backend selected in the settings.
pub fn backend_from_settings(settings: &settings::Otp) -> Arc<dyn OtpBackend> {
    match settings.backend {
        OtpBackendKind::Signed => Arc::new(SignedTokenBackend::new(
            &settings.signing_secret,
            settings.ttl(),
        )),
        OtpBackendKind::Store => Arc::new(StoreBackend::new(settings.ttl())),
    }
}

/// Generate a numeric passcode with exactly `length` digits from the OS CSPRNG.
pub fn generate_code(length: usize) -> String {
    (0..length)
        .map(|_| char::from(b'0' + OsRng.gen_range(0..10u8)))
        .collect()
}

/// Drop everything below the millisecond, the resolution tokens carry.
pub fn truncate_to_millis(instant: DateTime<Utc>) -> DateTime<Utc> {
    instant
        .duration_trunc(chrono::Duration::milliseconds(1))
        .unwrap_or(instant)
}

/// Convert a TTL to a chrono duration, saturating on absurd values.
pub(crate) fn chrono_ttl(ttl: std::time::Duration) -> chrono::Duration {
    chrono::Duration::milliseconds(i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX / 2))
}
