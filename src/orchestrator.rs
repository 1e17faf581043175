//! Coordinates all providers for one refresh cycle.
//!
//! Every cycle launches each provider concurrently under a shared
//! deadline, classifies the outcomes independently, merges by provider
//! precedence and publishes the result in one step. The merge is a join:
//! it runs only after every provider has resolved or timed out.

use crate::market::QuoteStore;
use crate::period::Period;
use crate::provider::QuoteProvider;
use crate::quote::{
    CycleStatus, FetchCycleReport, HistorySeries, ProviderFailure, ProviderId, ProviderResult,
    Quote,
};
use futures::future::join_all;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Deadline and retry policy for fetch cycles.
#[derive(Debug, Clone)]
pub struct FetchPolicy {
    /// Shared deadline for every provider call within one cycle.
    pub deadline: Duration,
    /// Extra cycles attempted after a partial or total failure.
    pub max_retries: u32,
    /// First retry delay; doubles per attempt.
    pub backoff_base: Duration,
}

impl Default for FetchPolicy {
    fn default() -> Self {
        Self {
            deadline: Duration::from_secs(4),
            max_retries: 2,
            backoff_base: Duration::from_millis(500),
        }
    }
}

pub struct Orchestrator {
    providers: Vec<Arc<dyn QuoteProvider>>,
    store: Arc<QuoteStore>,
    policy: FetchPolicy,
    next_cycle: AtomicU64,
}

impl Orchestrator {
    pub fn new(
        providers: Vec<Arc<dyn QuoteProvider>>,
        store: Arc<QuoteStore>,
        policy: FetchPolicy,
    ) -> Self {
        Self {
            providers,
            store,
            policy,
            next_cycle: AtomicU64::new(1),
        }
    }

    pub fn store(&self) -> &Arc<QuoteStore> {
        &self.store
    }

    /// Runs one fetch cycle and publishes the merged quotes.
    pub async fn run_cycle(&self, symbols: &[String]) -> FetchCycleReport {
        let cycle_id = self.next_cycle.fetch_add(1, Ordering::SeqCst);
        debug!("Starting fetch cycle {} for {:?}", cycle_id, symbols);

        let deadline = self.policy.deadline;
        let fetches = self.providers.iter().map(|provider| {
            let provider = Arc::clone(provider);
            async move {
                // On deadline expiry the pending fetch is cancelled; any
                // partial data it produced is discarded with it.
                match tokio::time::timeout(deadline, provider.fetch_quotes(symbols)).await {
                    Ok(Ok(quotes)) => (provider.id(), ProviderResult::Success(quotes)),
                    Ok(Err(failure)) => (provider.id(), ProviderResult::Failure(failure)),
                    Err(_) => (provider.id(), ProviderResult::Timeout),
                }
            }
        });
        let provider_results: Vec<(ProviderId, ProviderResult)> = join_all(fetches).await;

        let merged = merge_by_precedence(symbols, &provider_results);
        let status = FetchCycleReport::classify(&provider_results, &merged);

        self.store.publish_quotes(cycle_id, merged.clone());

        // The one structured event each cycle emits.
        let provider_status: Vec<String> = provider_results
            .iter()
            .map(|(id, result)| format!("{id}={}", result.status_label()))
            .collect();
        info!(
            cycle_id,
            status = %status,
            providers = ?provider_status,
            "Fetch cycle complete"
        );

        FetchCycleReport {
            cycle_id,
            provider_results,
            merged,
            status,
        }
    }

    /// Runs cycles until one fully succeeds or the retry budget is spent,
    /// backing off exponentially in between. Returns the last report.
    pub async fn run_cycle_with_retry(&self, symbols: &[String]) -> FetchCycleReport {
        let mut report = self.run_cycle(symbols).await;
        let mut attempt = 0;
        while report.status != CycleStatus::AllSucceeded && attempt < self.policy.max_retries {
            let delay = self.policy.backoff_base * 2u32.pow(attempt);
            debug!(
                "Cycle {} ended {}; retrying in {:?}",
                report.cycle_id, report.status, delay
            );
            tokio::time::sleep(delay).await;
            report = self.run_cycle(symbols).await;
            attempt += 1;
        }
        report
    }

    /// Fetches one history series, walking providers in precedence order
    /// until one succeeds. Each attempt is bounded by the cycle deadline.
    pub async fn fetch_history(
        &self,
        symbol: &str,
        period: Period,
    ) -> Result<HistorySeries, ProviderFailure> {
        let mut last_failure = ProviderFailure::unreachable("no providers configured");
        for provider in &self.providers {
            match tokio::time::timeout(
                self.policy.deadline,
                provider.fetch_history(symbol, period),
            )
            .await
            {
                Ok(Ok(series)) => return Ok(series),
                Ok(Err(failure)) => {
                    warn!("History fetch via {} failed: {}", provider.id(), failure);
                    last_failure = failure;
                }
                Err(_) => {
                    warn!("History fetch via {} timed out", provider.id());
                    last_failure = ProviderFailure::unreachable(format!(
                        "{} history fetch exceeded deadline",
                        provider.id()
                    ));
                }
            }
        }
        Err(last_failure)
    }
}

/// For each symbol the first available quote wins, in provider order.
/// Symbols no provider priced stay absent; the store keeps their prior
/// entries.
fn merge_by_precedence(
    symbols: &[String],
    provider_results: &[(ProviderId, ProviderResult)],
) -> Vec<Quote> {
    let mut merged = Vec::with_capacity(symbols.len());
    for symbol in symbols {
        for (_, result) in provider_results {
            if let ProviderResult::Success(quotes) = result
                && let Some(quote) = quotes.iter().find(|q| &q.symbol == symbol)
            {
                merged.push(quote.clone());
                break;
            }
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::collections::HashMap;

    struct MockProvider {
        id: ProviderId,
        quotes: HashMap<String, f64>,
        change_pct: f64,
        fail: bool,
        delay: Option<Duration>,
    }

    impl MockProvider {
        fn succeeding(id: ProviderId, quotes: &[(&str, f64)], change_pct: f64) -> Self {
            Self {
                id,
                quotes: quotes
                    .iter()
                    .map(|(s, p)| (s.to_string(), *p))
                    .collect(),
                change_pct,
                fail: false,
                delay: None,
            }
        }

        fn failing(id: ProviderId) -> Self {
            Self {
                id,
                quotes: HashMap::new(),
                change_pct: 0.0,
                fail: true,
                delay: None,
            }
        }

        fn slow(id: ProviderId, delay: Duration) -> Self {
            Self {
                id,
                quotes: HashMap::from([("BTC".to_string(), 1.0)]),
                change_pct: 0.0,
                fail: false,
                delay: Some(delay),
            }
        }
    }

    #[async_trait]
    impl QuoteProvider for MockProvider {
        fn id(&self) -> ProviderId {
            self.id
        }

        async fn fetch_quotes(&self, symbols: &[String]) -> Result<Vec<Quote>, ProviderFailure> {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if self.fail {
                return Err(ProviderFailure::unreachable("connection refused"));
            }
            Ok(symbols
                .iter()
                .filter_map(|symbol| {
                    self.quotes.get(symbol).map(|price| Quote {
                        symbol: symbol.clone(),
                        price: *price,
                        change_pct: self.change_pct,
                        timestamp: Utc::now(),
                        source: self.id,
                    })
                })
                .collect())
        }

        async fn fetch_history(
            &self,
            symbol: &str,
            period: Period,
        ) -> Result<HistorySeries, ProviderFailure> {
            if self.fail {
                return Err(ProviderFailure::unreachable("connection refused"));
            }
            Ok(HistorySeries {
                symbol: symbol.to_string(),
                period,
                points: vec![],
                fetched_at: Utc::now(),
            })
        }
    }

    fn orchestrator(providers: Vec<Arc<dyn QuoteProvider>>, deadline_ms: u64) -> Orchestrator {
        Orchestrator::new(
            providers,
            Arc::new(QuoteStore::new()),
            FetchPolicy {
                deadline: Duration::from_millis(deadline_ms),
                max_retries: 0,
                backoff_base: Duration::from_millis(1),
            },
        )
    }

    #[tokio::test]
    async fn test_all_providers_succeed() {
        let orch = orchestrator(
            vec![
                Arc::new(MockProvider::succeeding(
                    ProviderId::FigureMarkets,
                    &[("BTC", 50000.0)],
                    1.0,
                )),
                Arc::new(MockProvider::succeeding(
                    ProviderId::TwelveData,
                    &[("BTC", 49999.0)],
                    1.0,
                )),
            ],
            1000,
        );

        let report = orch.run_cycle(&["BTC".to_string()]).await;

        assert_eq!(report.status, CycleStatus::AllSucceeded);
        assert_eq!(report.merged.len(), 1);
        // Primary provider wins the merge.
        assert_eq!(report.merged[0].price, 50000.0);
        assert_eq!(report.merged[0].source, ProviderId::FigureMarkets);
        assert_eq!(orch.store().latest("BTC").unwrap().price, 50000.0);
    }

    #[tokio::test]
    async fn test_fallback_when_primary_fails() {
        let orch = orchestrator(
            vec![
                Arc::new(MockProvider::failing(ProviderId::FigureMarkets)),
                Arc::new(MockProvider::succeeding(
                    ProviderId::TwelveData,
                    &[("BTC", 50000.0)],
                    2.0,
                )),
            ],
            1000,
        );

        let report = orch.run_cycle(&["BTC".to_string()]).await;

        assert_eq!(report.status, CycleStatus::PartialFailure);
        assert_eq!(report.merged.len(), 1);
        assert_eq!(report.merged[0].price, 50000.0);
        assert_eq!(report.merged[0].change_pct, 2.0);
        assert_eq!(report.merged[0].source, ProviderId::TwelveData);
    }

    #[tokio::test]
    async fn test_slow_provider_classified_timeout() {
        let orch = orchestrator(
            vec![
                Arc::new(MockProvider::slow(
                    ProviderId::FigureMarkets,
                    Duration::from_millis(300),
                )),
                Arc::new(MockProvider::succeeding(
                    ProviderId::TwelveData,
                    &[("BTC", 50000.0)],
                    0.0,
                )),
            ],
            50,
        );

        let report = orch.run_cycle(&["BTC".to_string()]).await;

        assert_eq!(report.status, CycleStatus::PartialFailure);
        let (_, slow_result) = report
            .provider_results
            .iter()
            .find(|(id, _)| *id == ProviderId::FigureMarkets)
            .unwrap();
        assert_eq!(*slow_result, ProviderResult::Timeout);
        // The timed-out provider's data is discarded; the fallback priced it.
        assert_eq!(report.merged[0].source, ProviderId::TwelveData);
    }

    #[tokio::test]
    async fn test_total_failure_keeps_store_intact() {
        let store = Arc::new(QuoteStore::new());
        store.publish_quotes(
            0,
            vec![Quote {
                symbol: "BTC".to_string(),
                price: 48000.0,
                change_pct: 0.0,
                timestamp: Utc::now(),
                source: ProviderId::FigureMarkets,
            }],
        );
        let orch = Orchestrator::new(
            vec![
                Arc::new(MockProvider::failing(ProviderId::FigureMarkets)),
                Arc::new(MockProvider::failing(ProviderId::TwelveData)),
            ],
            Arc::clone(&store),
            FetchPolicy {
                deadline: Duration::from_millis(100),
                max_retries: 0,
                backoff_base: Duration::from_millis(1),
            },
        );

        let report = orch.run_cycle(&["BTC".to_string()]).await;

        assert_eq!(report.status, CycleStatus::TotalFailure);
        assert!(report.merged.is_empty());
        // Stale-but-present beats absent.
        assert_eq!(store.latest("BTC").unwrap().price, 48000.0);
    }

    #[tokio::test]
    async fn test_unpriced_symbol_left_out_of_merge() {
        let orch = orchestrator(
            vec![Arc::new(MockProvider::succeeding(
                ProviderId::FigureMarkets,
                &[("BTC", 50000.0)],
                0.0,
            ))],
            1000,
        );

        let report = orch
            .run_cycle(&["BTC".to_string(), "DOGE".to_string()])
            .await;

        // The provider succeeded without pricing DOGE; that is not a
        // failure, the symbol is just unpriced this cycle.
        assert_eq!(report.status, CycleStatus::AllSucceeded);
        assert_eq!(report.merged.len(), 1);
        assert!(orch.store().latest("DOGE").is_none());
    }

    #[tokio::test]
    async fn test_retry_stops_after_success() {
        let orch = Orchestrator::new(
            vec![Arc::new(MockProvider::succeeding(
                ProviderId::FigureMarkets,
                &[("BTC", 50000.0)],
                0.0,
            ))],
            Arc::new(QuoteStore::new()),
            FetchPolicy {
                deadline: Duration::from_millis(100),
                max_retries: 3,
                backoff_base: Duration::from_millis(1),
            },
        );

        let report = orch.run_cycle_with_retry(&["BTC".to_string()]).await;
        assert_eq!(report.status, CycleStatus::AllSucceeded);
        assert_eq!(report.cycle_id, 1);
    }

    #[tokio::test]
    async fn test_retry_is_bounded() {
        let orch = Orchestrator::new(
            vec![Arc::new(MockProvider::failing(ProviderId::FigureMarkets))],
            Arc::new(QuoteStore::new()),
            FetchPolicy {
                deadline: Duration::from_millis(100),
                max_retries: 2,
                backoff_base: Duration::from_millis(1),
            },
        );

        let report = orch.run_cycle_with_retry(&["BTC".to_string()]).await;
        assert_eq!(report.status, CycleStatus::TotalFailure);
        // Initial cycle plus two retries.
        assert_eq!(report.cycle_id, 3);
    }

    #[tokio::test]
    async fn test_history_falls_back_in_precedence_order() {
        let orch = orchestrator(
            vec![
                Arc::new(MockProvider::failing(ProviderId::FigureMarkets)),
                Arc::new(MockProvider::succeeding(ProviderId::TwelveData, &[], 0.0)),
            ],
            1000,
        );

        let series = orch.fetch_history("BTC", Period::Week).await.unwrap();
        assert_eq!(series.symbol, "BTC");
        assert_eq!(series.period, Period::Week);
    }
}
