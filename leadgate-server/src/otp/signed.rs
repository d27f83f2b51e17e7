//! Stateless passcode tokens.
//!
//! A token is `base64url(payload) "." base64url(tag)`, where the tag is a
//! keyed BLAKE3 hash of the payload bytes. The payload only carries a keyed
//! hash of the passcode, never the passcode itself.

use super::{chrono_ttl, truncate_to_millis, IssuedOtp, OtpBackend, OtpVerification};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::{mapref::entry::Entry, DashMap};
use data_encoding::BASE64URL_NOPAD;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use ulid::Ulid;

const SIGNING_KEY_CONTEXT: &str = "leadgate-server 2026-10-19 otp token signing";
const CODE_KEY_CONTEXT: &str = "leadgate-server 2026-10-19 otp code hashing";

/// Above this many consumed token ids, expired ones are dropped.
const CONSUMED_PRUNE_THRESHOLD: usize = 10_000;

/// Why a token couldn't be decoded. Never shown to callers.
#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    /// Not two base64url parts separated by a dot
    #[error("malformed token")]
    Malformed,
    /// The tag doesn't match the payload
    #[error("token signature mismatch")]
    BadSignature,
    /// The signed payload isn't what we issue
    #[error("invalid token payload: {0}")]
    Payload(#[from] serde_json::Error),
}

/// The signed part of a token.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPayload {
    /// Normalized identifier the passcode was sent to
    pub sub: String,
    /// Keyed hash of identifier and passcode, base64url
    pub code_hash: String,
    /// Issued at, unix milliseconds
    pub iat: i64,
    /// Expires at (inclusive), unix milliseconds
    pub exp: i64,
    /// Unique token id, used to refuse replays
    pub jti: String,
}

/// Issues and verifies self-contained signed passcode tokens.
pub struct SignedTokenBackend {
    signing_key: [u8; 32],
    code_key: [u8; 32],
    ttl: chrono::Duration,
    consumed: DashMap<String, i64>,
}

impl std::fmt::Debug for SignedTokenBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignedTokenBackend")
            .field("ttl", &self.ttl)
            .field("consumed", &self.consumed.len())
            .finish_non_exhaustive()
    }
}

impl SignedTokenBackend {
    /// Derive the signing keys from `secret`.
    pub fn new(secret: &str, ttl: Duration) -> Self {
        Self {
            signing_key: blake3::derive_key(SIGNING_KEY_CONTEXT, secret.as_bytes()),
            code_key: blake3::derive_key(CODE_KEY_CONTEXT, secret.as_bytes()),
            ttl: chrono_ttl(ttl),
            consumed: DashMap::new(),
        }
    }

    /// Sign a payload into a token.
    pub fn encode(&self, payload: &TokenPayload) -> Result<String> {
        let payload_bytes = serde_json::to_vec(payload)?;
        let tag = blake3::keyed_hash(&self.signing_key, &payload_bytes);

        Ok(format!(
            "{}.{}",
            BASE64URL_NOPAD.encode(&payload_bytes),
            BASE64URL_NOPAD.encode(tag.as_bytes())
        ))
    }

    /// Check the signature of a token and return its payload.
    ///
    /// Says nothing about expiry or the passcode.
    pub fn decode(&self, token: &str) -> Result<TokenPayload, TokenError> {
        let (payload_part, tag_part) = token.split_once('.').ok_or(TokenError::Malformed)?;

        let payload_bytes = BASE64URL_NOPAD
            .decode(payload_part.as_bytes())
            .map_err(|_| TokenError::Malformed)?;
        let tag_bytes: [u8; 32] = BASE64URL_NOPAD
            .decode(tag_part.as_bytes())
            .map_err(|_| TokenError::Malformed)?
            .try_into()
            .map_err(|_| TokenError::Malformed)?;

        // blake3::Hash equality is constant time
        if blake3::Hash::from(tag_bytes) != blake3::keyed_hash(&self.signing_key, &payload_bytes) {
            return Err(TokenError::BadSignature);
        }

        Ok(serde_json::from_slice(&payload_bytes)?)
    }

    fn code_hash(&self, identifier: &str, code: &str) -> blake3::Hash {
        let mut hasher = blake3::Hasher::new_keyed(&self.code_key);
        hasher.update(identifier.as_bytes());
        hasher.update(b"\n");
        hasher.update(code.as_bytes());
        hasher.finalize()
    }

    fn code_matches(&self, payload: &TokenPayload, code: &str) -> bool {
        let Ok(expected) = BASE64URL_NOPAD.decode(payload.code_hash.as_bytes()) else {
            return false;
        };
        let Ok(expected) = <[u8; 32]>::try_from(expected) else {
            return false;
        };

        blake3::Hash::from(expected) == self.code_hash(&payload.sub, code)
    }

    /// Record `jti` as used. Returns `false` if it already was.
    fn consume(&self, payload: &TokenPayload, now_ms: i64) -> bool {
        if self.consumed.len() > CONSUMED_PRUNE_THRESHOLD {
            self.consumed.retain(|_, exp| *exp >= now_ms);
        }

        match self.consumed.entry(payload.jti.clone()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(entry) => {
                entry.insert(payload.exp);
                true
            }
        }
    }
}

#[async_trait]
impl OtpBackend for SignedTokenBackend {
    fn name(&self) -> &'static str {
        "signed"
    }

    async fn issue(&self, identifier: &str, code: &str, now: DateTime<Utc>) -> Result<IssuedOtp> {
        let issued_at = truncate_to_millis(now);
        let expires_at = issued_at + self.ttl;

        let payload = TokenPayload {
            sub: identifier.to_string(),
            code_hash: BASE64URL_NOPAD.encode(self.code_hash(identifier, code).as_bytes()),
            iat: issued_at.timestamp_millis(),
            exp: expires_at.timestamp_millis(),
            jti: Ulid::new().to_string(),
        };

        let signed_token = self.encode(&payload)?;

        tracing::debug!(
            identifier,
            jti = %payload.jti,
            %expires_at,
            "Issued signed passcode token"
        );

        Ok(IssuedOtp {
            expires_at,
            signed_token,
        })
    }

    async fn verify(
        &self,
        identifier: &str,
        token: &str,
        code: &str,
        now: DateTime<Utc>,
    ) -> OtpVerification {
        let payload = match self.decode(token) {
            Ok(payload) => payload,
            Err(err) => {
                tracing::debug!(%err, "Rejected passcode token");
                return OtpVerification::Invalid;
            }
        };

        let now_ms = now.timestamp_millis();

        if now_ms > payload.exp {
            tracing::debug!(jti = %payload.jti, "Passcode token expired");
            return OtpVerification::Invalid;
        }

        if payload.sub != identifier {
            tracing::debug!(jti = %payload.jti, "Passcode token belongs to another identifier");
            return OtpVerification::Invalid;
        }

        if !self.code_matches(&payload, code) {
            tracing::debug!(jti = %payload.jti, "Passcode mismatch");
            return OtpVerification::Invalid;
        }

        if !self.consume(&payload, now_ms) {
            tracing::info!(jti = %payload.jti, "Refused replayed passcode token");
            return OtpVerification::Invalid;
        }

        OtpVerification::Valid {
            identifier: payload.sub,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use chrono::TimeZone;
    use testresult::TestResult;

    const JANE: &str = "jane@acme.com";

    fn backend() -> SignedTokenBackend {
        SignedTokenBackend::new("test secret", Duration::from_secs(300))
    }

    fn issued_at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 19, 12, 0, 0).unwrap()
    }

    #[test_log::test(tokio::test)]
    async fn test_issue_expires_after_ttl() -> TestResult {
        let issued = backend()
            .issue("jane@acme.com", "123456", issued_at())
            .await?;

        assert_eq!(issued.expires_at, issued_at() + chrono::Duration::minutes(5));
        assert!(!issued.signed_token.is_empty());
        Ok(())
    }

    #[test_log::test(tokio::test)]
    async fn test_issue_truncates_to_millis() -> TestResult {
        let backend = backend();
        let now = issued_at() + chrono::Duration::nanoseconds(500_700);

        let issued = backend.issue(JANE, "123456", now).await?;
        let payload = backend.decode(&issued.signed_token)?;

        assert_eq!(issued.expires_at, issued_at() + chrono::Duration::minutes(5));
        assert_eq!(payload.iat, issued_at().timestamp_millis());
        assert_eq!(payload.exp, issued.expires_at.timestamp_millis());

        assert!(backend
            .verify(JANE, &issued.signed_token, "123456", issued.expires_at)
            .await
            .is_valid());
        Ok(())
    }

    #[test_log::test(tokio::test)]
    async fn test_other_identifier_does_not_consume() -> TestResult {
        let backend = backend();
        let issued = backend.issue(JANE, "123456", issued_at()).await?;

        assert_eq!(
            backend
                .verify("john@acme.com", &issued.signed_token, "123456", issued_at())
                .await,
            OtpVerification::Invalid
        );
        assert!(backend
            .verify(JANE, &issued.signed_token, "123456", issued_at())
            .await
            .is_valid());
        Ok(())
    }

    #[test_log::test(tokio::test)]
    async fn test_token_does_not_contain_code() -> TestResult {
        let backend = backend();
        let issued = backend.issue("jane@acme.com", "123456", issued_at()).await?;

        let payload = backend.decode(&issued.signed_token)?;
        let payload_json = serde_json::to_string(&payload)?;

        assert_eq!(payload.sub, "jane@acme.com");
        assert!(!payload_json.contains("123456"));
        Ok(())
    }

    #[test_log::test(tokio::test)]
    async fn test_verify_round_trip() -> TestResult {
        let backend = backend();
        let issued = backend.issue("jane@acme.com", "123456", issued_at()).await?;

        let verification = backend
            .verify(
                JANE,
                &issued.signed_token,
                "123456",
                issued_at() + chrono::Duration::minutes(1),
            )
            .await;

        assert_eq!(
            verification,
            OtpVerification::Valid {
                identifier: "jane@acme.com".to_string()
            }
        );
        Ok(())
    }

    #[test_log::test(tokio::test)]
    async fn test_verify_wrong_code() -> TestResult {
        let backend = backend();
        let issued = backend.issue("jane@acme.com", "123456", issued_at()).await?;

        let verification = backend
            .verify(JANE, &issued.signed_token, "654321", issued_at())
            .await;

        assert_eq!(verification, OtpVerification::Invalid);

        // A wrong guess doesn't use the token up
        assert!(backend
            .verify(JANE, &issued.signed_token, "123456", issued_at())
            .await
            .is_valid());
        Ok(())
    }

    #[test_log::test(tokio::test)]
    async fn test_expiry_boundary_is_inclusive() -> TestResult {
        let expires_at = issued_at() + chrono::Duration::minutes(5);

        let backend = backend();
        let issued = backend.issue("jane@acme.com", "123456", issued_at()).await?;
        assert!(backend
            .verify(JANE, &issued.signed_token, "123456", expires_at)
            .await
            .is_valid());

        let backend = self::backend();
        let issued = backend.issue("jane@acme.com", "123456", issued_at()).await?;
        assert_eq!(
            backend
                .verify(
                    JANE,
                    &issued.signed_token,
                    "123456",
                    expires_at + chrono::Duration::milliseconds(1)
                )
                .await,
            OtpVerification::Invalid
        );
        Ok(())
    }

    #[test_log::test(tokio::test)]
    async fn test_token_is_single_use() -> TestResult {
        let backend = backend();
        let issued = backend.issue("jane@acme.com", "123456", issued_at()).await?;

        assert!(backend
            .verify(JANE, &issued.signed_token, "123456", issued_at())
            .await
            .is_valid());
        assert_eq!(
            backend
                .verify(JANE, &issued.signed_token, "123456", issued_at())
                .await,
            OtpVerification::Invalid
        );
        Ok(())
    }

    #[test_log::test(tokio::test)]
    async fn test_any_mutation_invalidates() -> TestResult {
        let backend = backend();
        let issued = backend.issue("jane@acme.com", "123456", issued_at()).await?;
        let token = issued.signed_token;

        for index in 0..token.len() {
            let mut bytes = token.clone().into_bytes();
            bytes[index] = if bytes[index] == b'A' { b'B' } else { b'A' };
            let mutated = String::from_utf8(bytes)?;

            assert_eq!(
                backend.verify(JANE, &mutated, "123456", issued_at()).await,
                OtpVerification::Invalid,
                "mutation at byte {index} was accepted"
            );
        }

        // The untouched token is still good
        assert!(backend
            .verify(JANE, &token, "123456", issued_at())
            .await
            .is_valid());
        Ok(())
    }

    #[test_log::test(tokio::test)]
    async fn test_forged_payload_rejected() -> TestResult {
        let backend = backend();
        let issued = backend.issue("jane@acme.com", "123456", issued_at()).await?;

        let mut payload = backend.decode(&issued.signed_token)?;
        payload.exp += 60 * 60 * 1000;
        let forged_payload = BASE64URL_NOPAD.encode(&serde_json::to_vec(&payload)?);
        let (_, tag) = issued.signed_token.split_once('.').unwrap();

        assert_matches!(
            backend.decode(&format!("{forged_payload}.{tag}")),
            Err(TokenError::BadSignature)
        );
        Ok(())
    }

    #[test_log::test(tokio::test)]
    async fn test_other_secret_rejected() -> TestResult {
        let issued = backend()
            .issue("jane@acme.com", "123456", issued_at())
            .await?;

        let other = SignedTokenBackend::new("another secret", Duration::from_secs(300));

        assert_eq!(
            other.verify(JANE, &issued.signed_token, "123456", issued_at()).await,
            OtpVerification::Invalid
        );
        Ok(())
    }

    #[test]
    fn test_malformed_tokens() {
        let backend = backend();

        assert_matches!(backend.decode(""), Err(TokenError::Malformed));
        assert_matches!(backend.decode("no-dot-here"), Err(TokenError::Malformed));
        assert_matches!(backend.decode("abc.def"), Err(TokenError::Malformed));
        assert_matches!(backend.decode("!!.??"), Err(TokenError::Malformed));
    }
}
