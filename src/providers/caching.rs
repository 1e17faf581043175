use crate::provider::CurrencyRateProvider;
use anyhow::{Result, anyhow};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

/// Memoizes currency rates for the lifetime of one process. Display
/// currency rarely changes mid-session, so a plain map is enough.
#[derive(Clone)]
pub struct CachingRateProvider<T: CurrencyRateProvider> {
    inner: T,
    cache: Arc<Mutex<HashMap<String, Result<f64, String>>>>,
}

impl<T: CurrencyRateProvider> CachingRateProvider<T> {
    pub fn new(inner: T) -> Self {
        Self {
            inner,
            cache: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

#[async_trait]
impl<T: CurrencyRateProvider + Send + Sync> CurrencyRateProvider for CachingRateProvider<T> {
    async fn get_rate(&self, from: &str, to: &str) -> Result<f64> {
        let key = format!("{from}-{to}");
        let mut cache = self.cache.lock().await;
        if let Some(cached_result) = cache.get(&key) {
            debug!("Cache hit for currency rate: {}", key);
            return match cached_result {
                Ok(rate) => Ok(*rate),
                Err(e) => Err(anyhow!(e.clone())),
            };
        }
        debug!("Cache miss for currency rate: {}", key);
        let result = self.inner.get_rate(from, to).await;
        cache.insert(key, result.as_ref().map(|r| *r).map_err(|e| e.to_string()));
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct MockRateProvider {
        call_count: AtomicUsize,
    }

    #[async_trait]
    impl<'a> CurrencyRateProvider for &'a MockRateProvider {
        async fn get_rate(&self, from: &str, _to: &str) -> Result<f64> {
            self.call_count.fetch_add(1, Ordering::SeqCst);
            if from == "USD" {
                Ok(0.92)
            } else {
                Err(anyhow!("Unknown currency"))
            }
        }
    }

    #[tokio::test]
    async fn test_caching_rate_provider() {
        let inner = MockRateProvider {
            call_count: AtomicUsize::new(0),
        };
        let caching = CachingRateProvider::new(&inner);

        // First call hits the inner provider
        let rate1 = caching.get_rate("USD", "EUR").await.unwrap();
        assert_eq!(rate1, 0.92);
        assert_eq!(inner.call_count.load(Ordering::SeqCst), 1);

        // Second call is served from cache
        let rate2 = caching.get_rate("USD", "EUR").await.unwrap();
        assert_eq!(rate2, 0.92);
        assert_eq!(inner.call_count.load(Ordering::SeqCst), 1);

        // Errors are memoized too
        let _ = caching.get_rate("XXX", "EUR").await;
        let _ = caching.get_rate("XXX", "EUR").await;
        assert_eq!(inner.call_count.load(Ordering::SeqCst), 2);
    }
}
