//! Fetching of style documents, sprites and tiles

use crate::core::config::RetryPolicy;
use crate::prelude::{Arc, HashMap};
use crate::{MapError, Result};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::RwLock;

/// Shared async HTTP client for every fetch the relay performs
pub(crate) static HTTP_CLIENT: Lazy<reqwest::Client> = Lazy::new(|| {
    reqwest::Client::builder()
        .user_agent(concat!("tilerelay/", env!("CARGO_PKG_VERSION")))
        .tcp_keepalive(std::time::Duration::from_secs(30))
        .pool_idle_timeout(std::time::Duration::from_secs(90))
        .pool_max_idle_per_host(16)
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
});

#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>>;
}

/// Fetches over HTTP(S) with the shared client
#[derive(Debug, Default, Clone, Copy)]
pub struct HttpFetcher;

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        let response = HTTP_CLIENT.get(url).send().await.map_err(MapError::Network)?;
        if !response.status().is_success() {
            return Err(MapError::Fetch(format!("HTTP {} for {}", response.status(), url)).into());
        }
        let bytes = response.bytes().await.map_err(MapError::Network)?;
        Ok(bytes.to_vec())
    }
}

/// In-memory fetcher serving registered bodies; unknown URLs fail
#[derive(Debug, Default)]
pub struct StaticFetcher {
    bodies: RwLock<HashMap<String, Vec<u8>>>,
    requests: AtomicUsize,
}

impl StaticFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, url: impl Into<String>, body: impl Into<Vec<u8>>) {
        if let Ok(mut bodies) = self.bodies.write() {
            bodies.insert(url.into(), body.into());
        }
    }

    pub fn insert_json(&self, url: impl Into<String>, value: &serde_json::Value) {
        self.insert(url, value.to_string());
    }

    pub fn remove(&self, url: &str) {
        if let Ok(mut bodies) = self.bodies.write() {
            bodies.remove(url);
        }
    }

    /// Number of fetches attempted so far
    pub fn request_count(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    pub fn into_shared(self) -> Arc<dyn Fetcher> {
        Arc::new(self)
    }
}

#[async_trait]
impl Fetcher for StaticFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        let body = self
            .bodies
            .read()
            .ok()
            .and_then(|bodies| bodies.get(url).cloned());
        body.ok_or_else(|| MapError::Fetch(format!("not found: {url}")).into())
    }
}

#[async_trait]
impl<F: Fetcher + ?Sized> Fetcher for Arc<F> {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        (**self).fetch(url).await
    }
}

/// Fetch `url`, retrying according to `policy`
pub async fn fetch_with_retry(fetcher: &dyn Fetcher, url: &str, policy: RetryPolicy) -> Result<Vec<u8>> {
    let attempts = policy.attempts();
    let mut attempt = 1;
    loop {
        match fetcher.fetch(url).await {
            Ok(body) => return Ok(body),
            Err(e) if attempt < attempts => {
                log::warn!("fetch {} failed on attempt {}: {}", url, attempt, e);
                tokio::time::sleep(policy.delay()).await;
                attempt += 1;
            }
            Err(e) => {
                log::debug!("giving up on {} after {} attempt(s)", url, attempt);
                return Err(e);
            }
        }
    }
}
