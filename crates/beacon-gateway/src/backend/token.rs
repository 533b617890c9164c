//! Per-client token cache.
//!
//! Records are keyed by the backend client id and refreshed lazily: a
//! record within `REFRESH_MARGIN_SECS` of expiry is treated as stale and
//! re-obtained at the next backend call that needs it. There is no
//! background refresh task.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::HashMap;
use tokio::sync::Mutex;

/// Stale margin before nominal expiry.
const REFRESH_MARGIN_SECS: i64 = 100;

/// One cached token pair for a backend client id.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenRecord {
    pub access_token: String,
    pub refresh_token: String,
    #[serde(default = "default_expires_in")]
    pub expires_in: i64,
    #[serde(skip, default = "Utc::now")]
    pub obtained_at: DateTime<Utc>,
}

fn default_expires_in() -> i64 {
    3600
}

impl TokenRecord {
    pub fn new(access_token: String, refresh_token: String, expires_in: i64) -> Self {
        Self {
            access_token,
            refresh_token,
            expires_in,
            obtained_at: Utc::now(),
        }
    }

    /// Whether the record is close enough to expiry to need a refresh.
    pub fn is_stale(&self) -> bool {
        let age = (Utc::now() - self.obtained_at).num_seconds();
        age >= self.expires_in - REFRESH_MARGIN_SECS
    }
}

/// Token cache shared by every session's backend handle.
pub struct TokenStore {
    /// Refresh token supplied at startup, used as the grant source when a
    /// client id has no record yet.
    primary_refresh: String,
    records: Mutex<HashMap<String, TokenRecord>>,
}

impl TokenStore {
    pub fn new(primary_refresh: String) -> Self {
        Self {
            primary_refresh,
            records: Mutex::new(HashMap::new()),
        }
    }

    pub async fn get(&self, client_id: &str) -> Option<TokenRecord> {
        self.records.lock().await.get(client_id).cloned()
    }

    pub async fn insert(&self, client_id: String, record: TokenRecord) {
        self.records.lock().await.insert(client_id, record);
    }

    /// The refresh token to use when obtaining a token for `client_id`: the
    /// client's own cached one if present, the startup grant otherwise.
    pub async fn refresh_source(&self, client_id: &str) -> String {
        match self.records.lock().await.get(client_id) {
            Some(record) => record.refresh_token.clone(),
            None => self.primary_refresh.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn fresh_record_is_not_stale() {
        let record = TokenRecord::new("a".into(), "r".into(), 3600);
        assert!(!record.is_stale());
    }

    #[test]
    fn near_expiry_record_is_stale() {
        let mut record = TokenRecord::new("a".into(), "r".into(), 3600);
        record.obtained_at = Utc::now() - Duration::seconds(3550);
        assert!(record.is_stale());
    }

    #[tokio::test]
    async fn refresh_source_prefers_cached_record() {
        let store = TokenStore::new("primary".into());
        assert_eq!(store.refresh_source("55").await, "primary");

        store
            .insert("55".into(), TokenRecord::new("a".into(), "mine".into(), 3600))
            .await;
        assert_eq!(store.refresh_source("55").await, "mine");
    }
}
