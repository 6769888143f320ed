//! Bearer token acquisition and caching for OAuth-backed deployments.

use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use secrecy::SecretString;
use serde::Deserialize;
use tracing::{debug, info};

use crate::error::AuthError;
use crate::transport::HttpTransport;

/// Something that can mint a fresh bearer token.
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn fetch_token(&self) -> Result<SecretString, AuthError>;
}

/// OAuth 2.0 client-credentials grant.
pub struct ClientCredentials {
    transport: HttpTransport,
    token_url: String,
    client_id: String,
    client_secret: SecretString,
}

impl ClientCredentials {
    pub fn new(
        transport: HttpTransport,
        token_url: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: SecretString,
    ) -> Self {
        Self {
            transport,
            token_url: token_url.into(),
            client_id: client_id.into(),
            client_secret,
        }
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
}

#[async_trait]
impl TokenSource for ClientCredentials {
    async fn fetch_token(&self) -> Result<SecretString, AuthError> {
        use secrecy::ExposeSecret;

        let form = [
            ("grant_type", "client_credentials"),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.expose_secret()),
        ];
        let body = self
            .transport
            .post_form(&self.token_url, &form)
            .await
            .map_err(|e| AuthError::TokenRequest {
                reason: e.to_string(),
            })?;

        let parsed: TokenResponse =
            serde_json::from_value(body).map_err(|e| AuthError::TokenRequest {
                reason: e.to_string(),
            })?;

        parsed
            .access_token
            .filter(|t| !t.is_empty())
            .map(SecretString::from)
            .ok_or(AuthError::MissingToken)
    }
}

struct CachedToken {
    token: SecretString,
    expires_at: Instant,
}

/// Caches a token for a fixed TTL.
///
/// Refreshes are single-flight: callers that find the cache empty queue on
/// `refresh` and re-check the cache once they hold it, so concurrent callers
/// share the one fetch that was already running.
pub struct TokenCache<T> {
    source: T,
    ttl: Duration,
    cached: Mutex<Option<CachedToken>>,
    refresh: tokio::sync::Mutex<()>,
}

impl<T: TokenSource> TokenCache<T> {
    pub fn new(source: T, ttl: Duration) -> Self {
        Self {
            source,
            ttl,
            cached: Mutex::new(None),
            refresh: tokio::sync::Mutex::new(()),
        }
    }

    /// Return a valid token, fetching one only when none is cached or the
    /// cached one has expired.
    pub async fn get_token(&self) -> Result<SecretString, AuthError> {
        if let Some(token) = self.cached_token() {
            return Ok(token);
        }

        let _guard = self.refresh.lock().await;
        if let Some(token) = self.cached_token() {
            debug!("Token refreshed by a concurrent caller");
            return Ok(token);
        }

        let token = self.source.fetch_token().await?;
        let expires_at = Instant::now() + self.ttl;
        *self.cached.lock().unwrap_or_else(PoisonError::into_inner) = Some(CachedToken {
            token: token.clone(),
            expires_at,
        });
        info!(ttl_secs = self.ttl.as_secs(), "Fetched new access token");
        Ok(token)
    }

    /// Forget the cached token; the next `get_token` fetches again.
    pub fn invalidate(&self) {
        *self.cached.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }

    fn cached_token(&self) -> Option<SecretString> {
        let cached = self.cached.lock().unwrap_or_else(PoisonError::into_inner);
        cached
            .as_ref()
            .filter(|c| Instant::now() < c.expires_at)
            .map(|c| c.token.clone())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use secrecy::ExposeSecret;

    use super::*;

    /// Counts fetches and takes a little while to answer.
    struct CountingSource {
        fetches: Arc<AtomicUsize>,
        delay: Duration,
    }

    #[async_trait]
    impl TokenSource for CountingSource {
        async fn fetch_token(&self) -> Result<SecretString, AuthError> {
            let n = self.fetches.fetch_add(1, Ordering::SeqCst) + 1;
            tokio::time::sleep(self.delay).await;
            Ok(SecretString::from(format!("token-{n}")))
        }
    }

    struct FailingSource;

    #[async_trait]
    impl TokenSource for FailingSource {
        async fn fetch_token(&self) -> Result<SecretString, AuthError> {
            Err(AuthError::MissingToken)
        }
    }

    fn cache(ttl: Duration) -> (Arc<TokenCache<CountingSource>>, Arc<AtomicUsize>) {
        let fetches = Arc::new(AtomicUsize::new(0));
        let source = CountingSource {
            fetches: Arc::clone(&fetches),
            delay: Duration::from_millis(30),
        };
        (Arc::new(TokenCache::new(source, ttl)), fetches)
    }

    #[tokio::test]
    async fn concurrent_callers_share_one_fetch() {
        let (cache, fetches) = cache(Duration::from_secs(60));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = Arc::clone(&cache);
                tokio::spawn(async move { cache.get_token().await })
            })
            .collect();

        for handle in handles {
            let token = handle.await.unwrap().unwrap();
            assert_eq!(token.expose_secret(), "token-1");
        }
        assert_eq!(fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cached_token_is_reused_until_expiry() {
        let (cache, fetches) = cache(Duration::from_millis(100));

        cache.get_token().await.unwrap();
        cache.get_token().await.unwrap();
        assert_eq!(fetches.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_millis(150)).await;
        let token = cache.get_token().await.unwrap();
        assert_eq!(token.expose_secret(), "token-2");
        assert_eq!(fetches.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn invalidate_forces_refetch() {
        let (cache, fetches) = cache(Duration::from_secs(60));
        cache.get_token().await.unwrap();
        cache.invalidate();
        cache.get_token().await.unwrap();
        assert_eq!(fetches.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn failures_are_not_cached() {
        let cache = TokenCache::new(FailingSource, Duration::from_secs(60));
        assert!(matches!(cache.get_token().await, Err(AuthError::MissingToken)));
        assert!(matches!(cache.get_token().await, Err(AuthError::MissingToken)));
    }
}
