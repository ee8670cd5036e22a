//! TTL cache in front of an [`AuthProvider`].

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::trace;

use crate::provider::{AuthError, AuthProvider, TokenValidation};

/// Default validity window for cached validations.
pub const DEFAULT_TTL: Duration = Duration::from_secs(300);

/// Default bound on cached tokens.
pub const DEFAULT_CAPACITY: usize = 4096;

struct CacheEntry {
    validation: TokenValidation,
    expires_at: Instant,
}

/// Caches successful validations for a TTL so the authorization server is
/// consulted once per window instead of once per request. Rejections are
/// cached too: a revoked token stays revoked at least until the window
/// rolls over.
pub struct ValidationCache {
    inner: Arc<dyn AuthProvider>,
    ttl: Duration,
    capacity: usize,
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl ValidationCache {
    /// Cache `inner` with the default TTL and capacity.
    pub fn new(inner: Arc<dyn AuthProvider>) -> Self {
        Self::with_ttl(inner, DEFAULT_TTL)
    }

    /// Cache `inner` with an explicit TTL.
    pub fn with_ttl(inner: Arc<dyn AuthProvider>, ttl: Duration) -> Self {
        Self {
            inner,
            ttl,
            capacity: DEFAULT_CAPACITY,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Number of live cache entries.
    pub fn len(&self) -> usize {
        self.entries.lock().expect("auth cache poisoned").len()
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for ValidationCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ValidationCache")
            .field("ttl", &self.ttl)
            .field("entries", &self.len())
            .finish()
    }
}

#[async_trait]
impl AuthProvider for ValidationCache {
    async fn validate_token(&self, token: &str) -> Result<TokenValidation, AuthError> {
        {
            let entries = self.entries.lock().expect("auth cache poisoned");
            if let Some(entry) = entries.get(token)
                && entry.expires_at > Instant::now()
            {
                trace!("auth cache hit");
                return Ok(entry.validation.clone());
            }
        }

        let validation = self.inner.validate_token(token).await?;

        let mut entries = self.entries.lock().expect("auth cache poisoned");
        if entries.len() >= self.capacity {
            entries.clear();
        }
        entries.insert(
            token.to_string(),
            CacheEntry {
                validation: validation.clone(),
                expires_at: Instant::now() + self.ttl,
            },
        );
        Ok(validation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingProvider {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl AuthProvider for CountingProvider {
        async fn validate_token(&self, token: &str) -> Result<TokenValidation, AuthError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(if token == "good" {
                TokenValidation::valid("cli", vec!["tools:execute".into()])
            } else {
                TokenValidation::invalid()
            })
        }
    }

    #[tokio::test]
    async fn repeat_validations_hit_the_cache() {
        let counting = Arc::new(CountingProvider {
            calls: AtomicUsize::new(0),
        });
        let cache = ValidationCache::new(Arc::clone(&counting) as Arc<dyn AuthProvider>);

        for _ in 0..5 {
            let validation = cache.validate_token("good").await.unwrap();
            assert!(validation.valid);
        }
        assert_eq!(counting.calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn expired_entries_revalidate() {
        let counting = Arc::new(CountingProvider {
            calls: AtomicUsize::new(0),
        });
        let cache = ValidationCache::with_ttl(
            Arc::clone(&counting) as Arc<dyn AuthProvider>,
            Duration::from_millis(10),
        );

        cache.validate_token("good").await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        cache.validate_token("good").await.unwrap();
        assert_eq!(counting.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn rejections_are_cached_too() {
        let counting = Arc::new(CountingProvider {
            calls: AtomicUsize::new(0),
        });
        let cache = ValidationCache::new(Arc::clone(&counting) as Arc<dyn AuthProvider>);

        assert!(!cache.validate_token("bad").await.unwrap().valid);
        assert!(!cache.validate_token("bad").await.unwrap().valid);
        assert_eq!(counting.calls.load(Ordering::SeqCst), 1);
    }
}
