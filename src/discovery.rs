//! OpenID configuration discovery with a lazily refreshed, time-bounded cache.
//!
//! The cache holds at most one [`CacheEntry`]. Entries are swapped wholesale,
//! never edited, so concurrent callers can only race on which fully formed
//! entry wins. Any failure while fetching or validating the document evicts
//! the entry so the next caller starts from a clean fetch.

use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tracing::{debug, info, warn};
use url::Url;

use crate::error::DiscoveryError;
use crate::http::{HttpClient, HttpRequest, HttpResponse};
use crate::request::USER_AGENT;

/// How long a fetched configuration is served before re-fetching.
pub const DISCOVERY_TTL: Duration = Duration::from_secs(3600);

/// Endpoints published by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderConfig {
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    pub userinfo_endpoint: String,
}

impl ProviderConfig {
    /// Extract the three endpoints from a discovery document. Extra keys are
    /// ignored; a missing or non-string endpoint is an error.
    pub fn from_document(document: &serde_json::Value) -> Result<Self, DiscoveryError> {
        let field = |name: &'static str| {
            document
                .get(name)
                .and_then(|v| v.as_str())
                .map(String::from)
                .ok_or(DiscoveryError::MissingEndpoint { field: name })
        };

        Ok(Self {
            authorization_endpoint: field("authorization_endpoint")?,
            token_endpoint: field("token_endpoint")?,
            userinfo_endpoint: field("userinfo_endpoint")?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub config: Arc<ProviderConfig>,
    pub fetched_at: SystemTime,
}

impl CacheEntry {
    /// Valid iff `now - fetched_at < DISCOVERY_TTL`. A clock that moved
    /// backwards counts as age zero.
    pub fn is_valid_at(&self, now: SystemTime) -> bool {
        now.duration_since(self.fetched_at)
            .map(|age| age < DISCOVERY_TTL)
            .unwrap_or(true)
    }
}

pub type Clock = Arc<dyn Fn() -> SystemTime + Send + Sync>;

pub struct DiscoveryCache {
    url: String,
    entry: RwLock<Option<CacheEntry>>,
    clock: Clock,
}

impl DiscoveryCache {
    pub fn new(url: impl Into<String>) -> Self {
        Self::with_clock(url, Arc::new(SystemTime::now))
    }

    pub fn with_clock(url: impl Into<String>, clock: Clock) -> Self {
        Self {
            url: url.into(),
            entry: RwLock::new(None),
            clock,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Return the cached configuration, fetching it first if the cache is
    /// empty or expired.
    pub async fn get_config(
        &self,
        http_client: &impl HttpClient,
    ) -> Result<Arc<ProviderConfig>, DiscoveryError> {
        let now = (self.clock)();

        if let Some(config) = self.cached(now) {
            return Ok(config);
        }

        match self.fetch(http_client, now).await {
            Ok(config) => {
                let config = Arc::new(config);
                *self.entry.write().unwrap_or_else(PoisonError::into_inner) = Some(CacheEntry {
                    config: Arc::clone(&config),
                    fetched_at: now,
                });
                info!(url = %self.url, "OpenID configuration refreshed");
                Ok(config)
            }
            Err(err) => {
                self.clear();
                warn!(url = %self.url, error = %err, "OpenID configuration fetch failed");
                Err(err)
            }
        }
    }

    /// Drop the cached entry, if any.
    pub fn clear(&self) {
        self.entry
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }

    /// Snapshot of the current entry.
    pub fn entry(&self) -> Option<CacheEntry> {
        self.entry
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn cached(&self, now: SystemTime) -> Option<Arc<ProviderConfig>> {
        {
            let guard = self.entry.read().unwrap_or_else(PoisonError::into_inner);
            match guard.as_ref() {
                Some(entry) if entry.is_valid_at(now) => return Some(Arc::clone(&entry.config)),
                Some(_) => {}
                None => return None,
            }
        }

        // Expired: evict unless another caller already replaced it.
        let mut guard = self.entry.write().unwrap_or_else(PoisonError::into_inner);
        if guard.as_ref().is_some_and(|entry| !entry.is_valid_at(now)) {
            debug!(url = %self.url, "OpenID configuration expired");
            *guard = None;
        }
        None
    }

    async fn fetch(
        &self,
        http_client: &impl HttpClient,
        now: SystemTime,
    ) -> Result<ProviderConfig, DiscoveryError> {
        let busted = cache_busted_url(&self.url, now)?;

        let response = match http_client.send(discovery_request(busted.as_str())).await {
            Ok(response) => response,
            Err(err) => {
                debug!(url = %self.url, error = %err, "cache-busted fetch failed, retrying bare URL");
                http_client
                    .send(discovery_request(&self.url))
                    .await
                    .map_err(DiscoveryError::Transport)?
            }
        };

        parse_discovery_response(&response)
    }
}

fn discovery_request(url: &str) -> HttpRequest {
    HttpRequest::get(url)
        .header("Accept", "application/json")
        .header("Cache-Control", "no-cache")
        .header("User-Agent", USER_AGENT)
}

/// Append `t=<unix seconds>` to defeat intermediary HTTP caches.
fn cache_busted_url(url: &str, now: SystemTime) -> Result<Url, DiscoveryError> {
    let mut url = Url::parse(url)?;
    let secs = now
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default();
    url.query_pairs_mut().append_pair("t", &secs.to_string());
    Ok(url)
}

fn parse_discovery_response(response: &HttpResponse) -> Result<ProviderConfig, DiscoveryError> {
    if !response.is_success() {
        return Err(DiscoveryError::UnexpectedStatus {
            status: response.status,
        });
    }

    let document: serde_json::Value =
        serde_json::from_slice(&response.body).map_err(DiscoveryError::Parse)?;

    ProviderConfig::from_document(&document)
}
