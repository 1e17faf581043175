//! Process-wide quote store: single writer (the orchestrator), many readers.
//!
//! Readers see either the full prior state or the full new state of a
//! publish, never a half-applied merge; everything funnels through one
//! write lock. Subscribers are notified after the lock is released.

use crate::period::Period;
use crate::quote::{HistorySeries, Quote};
use std::collections::HashMap;
use std::sync::RwLock;
use tokio::sync::broadcast;
use tracing::debug;

/// Change notification delivered to subscribers after each publish.
#[derive(Debug, Clone)]
pub enum StoreEvent {
    QuotesPublished { cycle_id: u64, symbols: Vec<String> },
    HistoryPublished { symbol: String, period: Period },
    HoldingsChanged,
}

#[derive(Default)]
struct StoreState {
    latest: HashMap<String, Quote>,
    history: HashMap<(String, Period), HistorySeries>,
}

pub struct QuoteStore {
    state: RwLock<StoreState>,
    events: broadcast::Sender<StoreEvent>,
}

impl QuoteStore {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            state: RwLock::new(StoreState::default()),
            events,
        }
    }

    pub fn latest(&self, symbol: &str) -> Option<Quote> {
        self.state.read().unwrap().latest.get(symbol).cloned()
    }

    pub fn history(&self, symbol: &str, period: Period) -> Option<HistorySeries> {
        self.state
            .read()
            .unwrap()
            .history
            .get(&(symbol.to_string(), period))
            .cloned()
    }

    /// Applies a cycle's merged quotes in one atomic step and returns how
    /// many were accepted. A quote older than the stored one for the same
    /// symbol is rejected, which guards against overlapping cycles
    /// completing out of order.
    pub fn publish_quotes(&self, cycle_id: u64, quotes: Vec<Quote>) -> usize {
        let mut accepted = Vec::with_capacity(quotes.len());
        {
            let mut state = self.state.write().unwrap();
            for quote in quotes {
                if let Some(stored) = state.latest.get(&quote.symbol)
                    && stored.timestamp > quote.timestamp
                {
                    debug!(
                        "Rejecting stale quote for {} ({} > {})",
                        quote.symbol, stored.timestamp, quote.timestamp
                    );
                    continue;
                }
                accepted.push(quote.symbol.clone());
                state.latest.insert(quote.symbol.clone(), quote);
            }
        }

        if !accepted.is_empty() {
            let _ = self.events.send(StoreEvent::QuotesPublished {
                cycle_id,
                symbols: accepted.clone(),
            });
        }
        accepted.len()
    }

    /// Replaces the series for (symbol, period) wholesale.
    pub fn publish_history(&self, series: HistorySeries) {
        let symbol = series.symbol.clone();
        let period = series.period;
        {
            let mut state = self.state.write().unwrap();
            state.history.insert((symbol.clone(), period), series);
        }
        let _ = self
            .events
            .send(StoreEvent::HistoryPublished { symbol, period });
    }

    pub fn clear_history(&self, symbol: &str, period: Period) {
        let mut state = self.state.write().unwrap();
        state.history.remove(&(symbol.to_string(), period));
    }

    /// Holdings live outside the store, but renderers observe one event
    /// stream; the engine relays holdings mutations through here.
    pub fn notify_holdings_changed(&self) {
        let _ = self.events.send(StoreEvent::HoldingsChanged);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }
}

impl Default for QuoteStore {
    fn default() -> Self {
        Self::new()
    }
}
