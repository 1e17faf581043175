//! Per-card period selection state.
//!
//! A card keeps showing its last good series while a new period loads; a
//! failed fetch leaves that series in place flagged stale instead of
//! blanking the card. Switching periods cancels the previous in-flight
//! fetch for the card.

use crate::orchestrator::Orchestrator;
use crate::period::Period;
use crate::quote::HistorySeries;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::task::AbortHandle;
use tracing::{debug, warn};

/// Read-only card state handed to renderers.
#[derive(Debug, Clone)]
pub struct CardView {
    pub period: Period,
    pub series: Option<HistorySeries>,
    pub stale: bool,
}

struct CardState {
    period: Period,
    series: Option<HistorySeries>,
    stale: bool,
    inflight: Option<AbortHandle>,
}

pub struct PeriodController {
    cards: Arc<Mutex<HashMap<String, CardState>>>,
    orchestrator: Arc<Orchestrator>,
}

impl PeriodController {
    pub fn new(orchestrator: Arc<Orchestrator>) -> Self {
        Self {
            cards: Arc::new(Mutex::new(HashMap::new())),
            orchestrator,
        }
    }

    /// Switches a card to a period and fetches its series. A re-selection
    /// of the current period with data present or a fetch underway is a
    /// no-op.
    pub fn select(&self, card: &str, period: Period) {
        {
            let mut cards = self.cards.lock().unwrap();
            if let Some(state) = cards.get_mut(card) {
                if state.period == period
                    && (state.series.is_some() || state.inflight.is_some())
                {
                    return;
                }
                if let Some(inflight) = state.inflight.take() {
                    debug!("Cancelling in-flight fetch for {}", card);
                    inflight.abort();
                }
                if state.period != period {
                    // The old period's cache entry is gone; the card keeps
                    // rendering the old series, marked stale, until the
                    // new one lands.
                    self.orchestrator.store().clear_history(card, state.period);
                    state.period = period;
                    state.stale = state.series.is_some();
                }
            } else {
                cards.insert(
                    card.to_string(),
                    CardState {
                        period,
                        series: None,
                        stale: false,
                        inflight: None,
                    },
                );
            }
        }

        self.spawn_fetch(card.to_string(), period);
    }

    fn spawn_fetch(&self, card: String, period: Period) {
        let cards = Arc::clone(&self.cards);
        let orchestrator = Arc::clone(&self.orchestrator);
        let symbol = card.clone();

        // The lock is held across the spawn so the task cannot finish and
        // clear `inflight` before the handle lands in the card state.
        let mut states = self.cards.lock().unwrap();
        let handle = tokio::spawn(async move {
            let outcome = orchestrator.fetch_history(&symbol, period).await;
            let mut cards = cards.lock().unwrap();
            let Some(state) = cards.get_mut(&symbol) else {
                return;
            };
            // A later period switch owns the card now; drop this result.
            if state.period != period {
                return;
            }
            match outcome {
                Ok(series) => {
                    orchestrator.store().publish_history(series.clone());
                    state.series = Some(series);
                    state.stale = false;
                }
                Err(failure) => {
                    warn!("History fetch for {} ({}) failed: {}", symbol, period, failure);
                    state.stale = true;
                }
            }
            state.inflight = None;
        });

        if let Some(state) = states.get_mut(&card)
            && state.period == period
        {
            state.inflight = Some(handle.abort_handle());
        }
    }

    pub fn view(&self, card: &str) -> Option<CardView> {
        let cards = self.cards.lock().unwrap();
        cards.get(card).map(|state| CardView {
            period: state.period,
            series: state.series.clone(),
            stale: state.stale,
        })
    }

    /// Aborts every in-flight fetch; used on teardown.
    pub fn shutdown(&self) {
        let mut cards = self.cards.lock().unwrap();
        for state in cards.values_mut() {
            if let Some(inflight) = state.inflight.take() {
                inflight.abort();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::QuoteStore;
    use crate::orchestrator::FetchPolicy;
    use crate::provider::QuoteProvider;
    use crate::quote::{HistoryPoint, ProviderFailure, ProviderId, Quote};
    use async_trait::async_trait;
    use chrono::Utc;
    use std::time::Duration;

    struct MockHistoryProvider {
        delay: Duration,
        fail_periods: Vec<Period>,
    }

    #[async_trait]
    impl QuoteProvider for MockHistoryProvider {
        fn id(&self) -> ProviderId {
            ProviderId::FigureMarkets
        }

        async fn fetch_quotes(&self, _symbols: &[String]) -> Result<Vec<Quote>, ProviderFailure> {
            Ok(vec![])
        }

        async fn fetch_history(
            &self,
            symbol: &str,
            period: Period,
        ) -> Result<HistorySeries, ProviderFailure> {
            tokio::time::sleep(self.delay).await;
            if self.fail_periods.contains(&period) {
                return Err(ProviderFailure::unreachable("connection refused"));
            }
            Ok(HistorySeries {
                symbol: symbol.to_string(),
                period,
                points: vec![HistoryPoint {
                    timestamp: Utc::now(),
                    price: 1.0,
                }],
                fetched_at: Utc::now(),
            })
        }
    }

    fn controller(delay_ms: u64, fail_periods: Vec<Period>) -> PeriodController {
        let orchestrator = Arc::new(Orchestrator::new(
            vec![Arc::new(MockHistoryProvider {
                delay: Duration::from_millis(delay_ms),
                fail_periods,
            })],
            Arc::new(QuoteStore::new()),
            FetchPolicy {
                deadline: Duration::from_secs(1),
                max_retries: 0,
                backoff_base: Duration::from_millis(1),
            },
        ));
        PeriodController::new(orchestrator)
    }

    async fn wait_for_series(controller: &PeriodController, card: &str) -> CardView {
        for _ in 0..100 {
            if let Some(view) = controller.view(card)
                && view.series.is_some()
                && !view.stale
            {
                return view;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("series for {card} never arrived");
    }

    #[tokio::test]
    async fn test_initial_selection_loads_series() {
        let controller = controller(5, vec![]);
        controller.select("BTC", Period::Day);

        let view = wait_for_series(&controller, "BTC").await;
        assert_eq!(view.period, Period::Day);
        assert_eq!(view.series.unwrap().period, Period::Day);
    }

    #[tokio::test]
    async fn test_switch_keeps_old_series_until_new_resolves() {
        let controller = controller(50, vec![]);
        controller.select("BTC", Period::Day);
        wait_for_series(&controller, "BTC").await;

        controller.select("BTC", Period::Week);

        // Immediately after the switch the old series is still shown,
        // flagged stale; the card never flashes empty.
        let view = controller.view("BTC").unwrap();
        assert_eq!(view.period, Period::Week);
        assert!(view.stale);
        assert_eq!(view.series.as_ref().unwrap().period, Period::Day);

        let view = wait_for_series(&controller, "BTC").await;
        assert_eq!(view.series.unwrap().period, Period::Week);
        assert!(!view.stale);
    }

    #[tokio::test]
    async fn test_failed_switch_falls_back_to_last_good_series() {
        let controller = controller(5, vec![Period::Week]);
        controller.select("BTC", Period::Day);
        wait_for_series(&controller, "BTC").await;

        controller.select("BTC", Period::Week);
        tokio::time::sleep(Duration::from_millis(100)).await;

        let view = controller.view("BTC").unwrap();
        assert_eq!(view.period, Period::Week);
        assert!(view.stale);
        // The 24H series is still displayed rather than a blank card.
        assert_eq!(view.series.unwrap().period, Period::Day);
    }

    #[tokio::test]
    async fn test_rapid_switch_discards_previous_fetch() {
        let controller = controller(50, vec![]);
        controller.select("BTC", Period::Day);
        controller.select("BTC", Period::Month);

        let view = wait_for_series(&controller, "BTC").await;
        assert_eq!(view.period, Period::Month);
        assert_eq!(view.series.unwrap().period, Period::Month);
    }

    #[tokio::test]
    async fn test_reselect_same_period_is_noop() {
        let controller = controller(5, vec![]);
        controller.select("BTC", Period::Day);
        let view = wait_for_series(&controller, "BTC").await;
        let fetched_at = view.series.unwrap().fetched_at;

        controller.select("BTC", Period::Day);
        tokio::time::sleep(Duration::from_millis(50)).await;
        let view = controller.view("BTC").unwrap();
        assert_eq!(view.series.unwrap().fetched_at, fetched_at);
    }
}
