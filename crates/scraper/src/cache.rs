// ABOUTME: Cache of accepted product records keyed by normalized URL with a freshness window.
// ABOUTME: Defines the CacheStore trait and the sharded in-memory implementation.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::record::ProductRecord;

/// Last accepted record for one normalized URL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    pub url: String,
    pub record: ProductRecord,
    pub scraped_at: DateTime<Utc>,
}

impl CacheEntry {
    /// Entry for `url` stamped with the current time. The key is normalized here.
    pub fn new(url: &str, record: ProductRecord) -> Self {
        Self {
            url: normalize_url(url),
            record,
            scraped_at: Utc::now(),
        }
    }

    pub fn is_fresh(&self, window: Duration, now: DateTime<Utc>) -> bool {
        match chrono::Duration::from_std(window) {
            Ok(window) => now.signed_duration_since(self.scraped_at) < window,
            Err(_) => true,
        }
    }
}

/// Storage for accepted records.
///
/// `get` applies the freshness window itself: a stale entry is a miss.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, url: &str) -> Option<CacheEntry>;

    /// Upserts by normalized URL; the later write wins.
    async fn put(&self, entry: CacheEntry);

    /// Removes stale entries and returns how many were dropped.
    async fn purge_expired(&self) -> usize;

    async fn len(&self) -> usize;
}

/// In-process cache on a sharded concurrent map.
#[derive(Debug)]
pub struct MemoryCache {
    entries: DashMap<String, CacheEntry>,
    freshness: Duration,
}

impl MemoryCache {
    pub fn new(freshness: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            freshness,
        }
    }
}

#[async_trait]
impl CacheStore for MemoryCache {
    async fn get(&self, url: &str) -> Option<CacheEntry> {
        let key = normalize_url(url);
        let entry = self.entries.get(&key)?;
        if entry.is_fresh(self.freshness, Utc::now()) {
            Some(entry.clone())
        } else {
            None
        }
    }

    async fn put(&self, entry: CacheEntry) {
        let key = normalize_url(&entry.url);
        self.entries.insert(key, entry);
    }

    async fn purge_expired(&self) -> usize {
        let now = Utc::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.is_fresh(self.freshness, now));
        before.saturating_sub(self.entries.len())
    }

    async fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Canonical cache key for a URL.
///
/// Lower-cases scheme and host, drops the default port, the fragment and any
/// `utm_*` parameter, sorts the remaining query pairs and strips a trailing
/// slash from non-root paths. Unparseable input is returned trimmed.
pub fn normalize_url(raw: &str) -> String {
    let trimmed = raw.trim();
    let mut url = match Url::parse(trimmed) {
        Ok(url) => url,
        Err(_) => return trimmed.to_string(),
    };

    url.set_fragment(None);

    let mut pairs: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| !k.to_ascii_lowercase().starts_with("utm_"))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    pairs.sort();
    if pairs.is_empty() {
        url.set_query(None);
    } else {
        url.query_pairs_mut().clear().extend_pairs(pairs);
    }

    let path = url.path().to_string();
    if path.len() > 1 && path.ends_with('/') {
        url.set_path(path.trim_end_matches('/'));
        if url.path().is_empty() {
            url.set_path("/");
        }
    }

    url.to_string()
}
