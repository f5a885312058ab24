//! Key Set Cache
//!
//! Background-refreshing cache of JWKS documents, one refresh task per
//! registered URL. Readers block only until the first fetch for a URL has
//! finished.

use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use jsonwebtoken::jwk::JwkSet;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::error::AuthError;

/// Shortest allowed interval between background refreshes.
pub const MIN_REFRESH_INTERVAL: Duration = Duration::from_secs(15 * 60);

/// Longest allowed interval between background refreshes.
pub const MAX_REFRESH_INTERVAL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

// == Fetcher ==
/// Transport used to download a key set.
#[async_trait]
pub trait KeySetFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<JwkSet, AuthError>;
}

/// Fetches key sets over HTTPS.
#[derive(Debug, Clone, Default)]
pub struct HttpKeySetFetcher {
    client: reqwest::Client,
}

impl HttpKeySetFetcher {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl KeySetFetcher for HttpKeySetFetcher {
    async fn fetch(&self, url: &str) -> Result<JwkSet, AuthError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| AuthError::KeyFetch(e.to_string()))?;

        response
            .json::<JwkSet>()
            .await
            .map_err(|e| AuthError::KeyFetch(e.to_string()))
    }
}

#[derive(Debug, Clone)]
enum KeySetState {
    Pending,
    Ready(Arc<JwkSet>),
    Failed(String),
}

// == Jwks Cache ==
pub struct JwksCache {
    fetcher: Arc<dyn KeySetFetcher>,
    refresh_interval: Duration,
    sets: DashMap<String, Arc<watch::Sender<KeySetState>>>,
}

impl JwksCache {
    /// Creates a cache refreshing every `refresh_interval`, clamped to
    /// [`MIN_REFRESH_INTERVAL`, `MAX_REFRESH_INTERVAL`].
    pub fn new(fetcher: Arc<dyn KeySetFetcher>, refresh_interval: Duration) -> Self {
        Self {
            fetcher,
            refresh_interval: clamp_interval(refresh_interval),
            sets: DashMap::new(),
        }
    }

    pub fn refresh_interval(&self) -> Duration {
        self.refresh_interval
    }

    pub fn is_registered(&self, url: &str) -> bool {
        self.sets.contains_key(url)
    }

    /// Registers `url` and starts its refresh task.
    ///
    /// Returns false when the URL was already registered; nothing else happens
    /// in that case.
    pub fn register(&self, url: &str) -> bool {
        let sender = match self.sets.entry(url.to_string()) {
            Entry::Occupied(_) => return false,
            Entry::Vacant(slot) => {
                let (tx, _rx) = watch::channel(KeySetState::Pending);
                let tx = Arc::new(tx);
                slot.insert(Arc::clone(&tx));
                tx
            }
        };

        info!(url, interval_secs = self.refresh_interval.as_secs(), "registered key set");
        tokio::spawn(refresh_loop(
            url.to_string(),
            Arc::clone(&self.fetcher),
            Arc::downgrade(&sender),
            self.refresh_interval,
        ));
        true
    }

    /// Returns the key set for `url`, registering it if needed.
    ///
    /// Waits for the first fetch to finish. If the last fetch failed and no
    /// keys were ever loaded, fetches once more before giving up.
    pub async fn get(&self, url: &str) -> Result<Arc<JwkSet>, AuthError> {
        self.register(url);
        let sender = self
            .sets
            .get(url)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| AuthError::KeyFetch(format!("{} not registered", url)))?;

        let mut rx = sender.subscribe();
        let state = {
            let current = rx
                .wait_for(|state| !matches!(state, KeySetState::Pending))
                .await
                .map_err(|_| AuthError::KeyFetch("key set refresh stopped".to_string()))?;
            current.clone()
        };

        match state {
            KeySetState::Ready(set) => Ok(set),
            KeySetState::Failed(reason) => {
                debug!(url, reason = %reason, "key set unavailable, refetching");
                let set = Arc::new(self.fetcher.fetch(url).await?);
                sender.send_replace(KeySetState::Ready(Arc::clone(&set)));
                Ok(set)
            }
            KeySetState::Pending => Err(AuthError::KeyFetch("key set still pending".to_string())),
        }
    }
}

fn clamp_interval(interval: Duration) -> Duration {
    interval.clamp(MIN_REFRESH_INTERVAL, MAX_REFRESH_INTERVAL)
}

/// Refreshes one URL until the cache drops its sender.
async fn refresh_loop(
    url: String,
    fetcher: Arc<dyn KeySetFetcher>,
    sender: Weak<watch::Sender<KeySetState>>,
    interval: Duration,
) {
    loop {
        let result = fetcher.fetch(&url).await;
        let Some(tx) = sender.upgrade() else {
            return;
        };

        match result {
            Ok(set) => {
                debug!(url = %url, keys = set.keys.len(), "key set refreshed");
                tx.send_replace(KeySetState::Ready(Arc::new(set)));
            }
            Err(e) => {
                warn!(url = %url, error = %e, "key set refresh failed");
                // Previously loaded keys stay in service
                tx.send_if_modified(|state| {
                    if matches!(state, KeySetState::Ready(_)) {
                        false
                    } else {
                        *state = KeySetState::Failed(e.to_string());
                        true
                    }
                });
            }
        }
        drop(tx);

        tokio::time::sleep(interval).await;
    }
}
