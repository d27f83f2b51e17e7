//! Passcodes remembered in process memory behind opaque handles.

use super::{chrono_ttl, truncate_to_millis, IssuedOtp, OtpBackend, OtpRecord, OtpVerification};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use data_encoding::BASE64URL_NOPAD;
use rand::{rngs::OsRng, RngCore};
use std::time::Duration;

/// Above this many records, expired ones are dropped on the next issue.
const PRUNE_THRESHOLD: usize = 10_000;

/// Keeps one [OtpRecord] per identifier, looked up by a random handle.
pub struct StoreBackend {
    ttl: chrono::Duration,
    prune_threshold: usize,
    records: DashMap<String, OtpRecord>,
    handles: DashMap<String, String>,
}

impl std::fmt::Debug for StoreBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreBackend")
            .field("ttl", &self.ttl)
            .field("records", &self.records.len())
            .finish_non_exhaustive()
    }
}

impl StoreBackend {
    /// Records stay valid for `ttl` after issuance.
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl: chrono_ttl(ttl),
            prune_threshold: PRUNE_THRESHOLD,
            records: DashMap::new(),
            handles: DashMap::new(),
        }
    }

    /// Prune expired records once more than `threshold` are held.
    pub fn with_prune_threshold(mut self, threshold: usize) -> Self {
        self.prune_threshold = threshold;
        self
    }

    /// Number of outstanding records
    pub fn outstanding(&self) -> usize {
        self.records.len()
    }

    /// Drop records that expired before `now`.
    pub fn prune(&self, now: DateTime<Utc>) {
        self.records.retain(|_, record| record.expires_at >= now);
        self.handles
            .retain(|_, handle| self.records.contains_key(handle.as_str()));
    }

    fn new_handle() -> String {
        let mut bytes = [0u8; 32];
        OsRng.fill_bytes(&mut bytes);
        BASE64URL_NOPAD.encode(&bytes)
    }

    fn forget_handle(&self, identifier: &str, handle: &str) {
        self.handles
            .remove_if(identifier, |_, current| current == handle);
    }
}

#[async_trait]
impl OtpBackend for StoreBackend {
    fn name(&self) -> &'static str {
        "store"
    }

    async fn issue(&self, identifier: &str, code: &str, now: DateTime<Utc>) -> Result<IssuedOtp> {
        let issued_at = truncate_to_millis(now);

        if self.records.len() > self.prune_threshold {
            self.prune(issued_at);
        }

        let handle = Self::new_handle();
        let expires_at = issued_at + self.ttl;

        self.records.insert(
            handle.clone(),
            OtpRecord {
                identifier: identifier.to_string(),
                code: code.to_string(),
                issued_at,
                expires_at,
            },
        );

        if let Some(previous) = self.handles.insert(identifier.to_string(), handle.clone()) {
            self.records.remove(&previous);
        }

        tracing::debug!(identifier, %expires_at, "Stored passcode");

        Ok(IssuedOtp {
            expires_at,
            signed_token: handle,
        })
    }

    async fn verify(
        &self,
        identifier: &str,
        token: &str,
        code: &str,
        now: DateTime<Utc>,
    ) -> OtpVerification {
        let expired = self
            .records
            .remove_if(token, |_, record| now > record.expires_at);

        if let Some((handle, record)) = expired {
            self.forget_handle(&record.identifier, &handle);
            tracing::debug!(identifier = %record.identifier, "Passcode expired");
            return OtpVerification::Invalid;
        }

        // blake3::Hash equality is constant time
        let supplied = blake3::hash(code.as_bytes());
        let consumed = self.records.remove_if(token, |_, record| {
            record.identifier == identifier && blake3::hash(record.code.as_bytes()) == supplied
        });

        match consumed {
            Some((handle, record)) => {
                self.forget_handle(&record.identifier, &handle);
                OtpVerification::Valid {
                    identifier: record.identifier,
                }
            }
            None => OtpVerification::Invalid,
        }
    }
}
