//! Registry key set, fetched over HTTP and cached for a fixed time.

use jsonwebtoken::jwk::JwkSet;
use service_core::error::AppError;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

const FETCH_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug)]
enum Source {
    Remote { client: reqwest::Client, url: String },
    Fixed,
}

#[derive(Debug)]
struct Cached {
    fetched_at: Instant,
    keys: Arc<JwkSet>,
}

#[derive(Debug)]
pub struct JwksCache {
    source: Source,
    ttl: Duration,
    cached: RwLock<Option<Cached>>,
}

impl JwksCache {
    pub fn new(url: impl Into<String>, ttl: Duration) -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .timeout(FETCH_TIMEOUT)
            .build()
            .map_err(|e| AppError::ConfigError(anyhow::anyhow!("failed to build http client: {}", e)))?;

        Ok(Self {
            source: Source::Remote {
                client,
                url: url.into(),
            },
            ttl,
            cached: RwLock::new(None),
        })
    }

    /// A cache that always serves `keys` and never fetches.
    pub fn fixed(keys: JwkSet) -> Self {
        Self {
            source: Source::Fixed,
            ttl: Duration::MAX,
            cached: RwLock::new(Some(Cached {
                fetched_at: Instant::now(),
                keys: Arc::new(keys),
            })),
        }
    }

    /// Current key set, refetched once the cached copy is older than the ttl.
    ///
    /// If a refetch fails the stale copy keeps being served.
    pub async fn get(&self) -> Result<Arc<JwkSet>, AppError> {
        {
            let cached = self.cached.read().await;
            if let Some(cached) = cached.as_ref() {
                if cached.fetched_at.elapsed() < self.ttl {
                    return Ok(cached.keys.clone());
                }
            }
        }

        let mut cached = self.cached.write().await;
        // another task may have refreshed while we waited for the lock
        if let Some(current) = cached.as_ref() {
            if current.fetched_at.elapsed() < self.ttl {
                return Ok(current.keys.clone());
            }
        }

        match self.fetch().await {
            Ok(keys) => {
                let keys = Arc::new(keys);
                *cached = Some(Cached {
                    fetched_at: Instant::now(),
                    keys: keys.clone(),
                });
                Ok(keys)
            }
            Err(e) => match cached.as_ref() {
                Some(stale) => {
                    tracing::warn!(error = %e, "jwks refresh failed, serving cached keys");
                    Ok(stale.keys.clone())
                }
                None => Err(e),
            },
        }
    }

    async fn fetch(&self) -> Result<JwkSet, AppError> {
        let Source::Remote { client, url } = &self.source else {
            return Err(AppError::InternalError(anyhow::anyhow!(
                "fixed key set has no remote source"
            )));
        };

        tracing::debug!(url = %url, "fetching jwks");
        let keys = client
            .get(url)
            .send()
            .await
            .and_then(|res| res.error_for_status())
            .map_err(|e| AppError::InternalError(anyhow::anyhow!("failed to fetch jwks: {}", e)))?
            .json::<JwkSet>()
            .await
            .map_err(|e| AppError::InternalError(anyhow::anyhow!("invalid jwks response: {}", e)))?;

        tracing::info!(keys = keys.keys.len(), "jwks refreshed");
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::test_support::TestSigner;
    use axum::{routing::get, Json, Router};
    use std::sync::atomic::{AtomicUsize, Ordering};

    async fn serve_jwks(keys: JwkSet, hits: Arc<AtomicUsize>) -> String {
        let body = serde_json::to_value(&keys).unwrap();
        let app = Router::new().route(
            "/.well-known/jwks.json",
            get(move || {
                let body = body.clone();
                let hits = hits.clone();
                async move {
                    hits.fetch_add(1, Ordering::SeqCst);
                    Json(body)
                }
            }),
        );

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}/.well-known/jwks.json", addr)
    }

    #[tokio::test]
    async fn fixed_cache_serves_its_keys() {
        let signer = TestSigner::new("k1");
        let cache = JwksCache::fixed(signer.jwks());

        let keys = cache.get().await.unwrap();
        assert!(keys.find("k1").is_some());
    }

    #[tokio::test]
    async fn fetched_keys_are_reused_within_ttl() {
        let signer = TestSigner::new("k1");
        let hits = Arc::new(AtomicUsize::new(0));
        let url = serve_jwks(signer.jwks(), hits.clone()).await;

        let cache = JwksCache::new(url, Duration::from_secs(60)).unwrap();
        let first = cache.get().await.unwrap();
        let second = cache.get().await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn expired_entry_is_refetched() {
        let signer = TestSigner::new("k1");
        let hits = Arc::new(AtomicUsize::new(0));
        let url = serve_jwks(signer.jwks(), hits.clone()).await;

        let cache = JwksCache::new(url, Duration::ZERO).unwrap();
        cache.get().await.unwrap();
        cache.get().await.unwrap();

        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn unreachable_registry_without_cache_is_an_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let cache = JwksCache::new(
            format!("http://{}/.well-known/jwks.json", addr),
            Duration::from_secs(60),
        )
        .unwrap();
        assert!(cache.get().await.is_err());
    }
}
