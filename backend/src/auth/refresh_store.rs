//! Server-side bookkeeping of outstanding refresh tokens.
//!
//! A record exists for every refresh token that was issued and not yet
//! redeemed. Redemption removes the record before anything else is checked,
//! so a token can be redeemed at most once even under concurrent requests.

use chrono::{DateTime, Utc};
use dashmap::DashMap;

#[derive(Debug, Clone)]
struct RefreshRecord {
    subject: String,
    expires_at: DateTime<Utc>,
}

/// In-memory refresh record table, keyed by refresh id.
#[derive(Debug, Default)]
pub struct RefreshTokenStore {
    records: DashMap<String, RefreshRecord>,
}

impl RefreshTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or overwrites the record for `refresh_id`.
    pub fn save(&self, refresh_id: &str, subject: &str, expires_at: DateTime<Utc>) {
        self.records.insert(
            refresh_id.to_string(),
            RefreshRecord {
                subject: subject.to_string(),
                expires_at,
            },
        );
    }

    /// Atomically redeems `refresh_id`.
    ///
    /// The record is removed whatever the outcome. Returns `true` only when it
    /// existed, belonged to `subject` and expires strictly after `now`.
    pub fn consume(&self, refresh_id: &str, subject: &str, now: DateTime<Utc>) -> bool {
        match self.records.remove(refresh_id) {
            Some((_, record)) => record.subject == subject && record.expires_at > now,
            None => false,
        }
    }

    /// Drops records that are no longer redeemable. Returns how many went.
    pub fn purge_expired(&self, now: DateTime<Utc>) -> usize {
        let before = self.records.len();
        self.records.retain(|_, record| record.expires_at > now);
        before.saturating_sub(self.records.len())
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
