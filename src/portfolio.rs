//! User holdings and the synthetic portfolio aggregate.
//!
//! Holdings are the only persisted state. The aggregate is derived on
//! demand from current holdings plus the quote store and is never stored.

use crate::market::QuoteStore;
use crate::period::Period;
use crate::quote::{HistoryPoint, HistorySeries};
use crate::store::{KeyValueCollection, KeyValueStore};
use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

/// Symbol used by the synthetic aggregate card.
pub const PORTFOLIO_SYMBOL: &str = "PF";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Holding {
    pub symbol: String,
    pub quantity: f64,
}

/// Persisted holdings, one key per symbol. A quantity of zero is
/// equivalent to absence and is stored as a removal.
pub struct HoldingsBook {
    collection: Arc<dyn KeyValueCollection>,
}

impl HoldingsBook {
    pub fn new(store: &KeyValueStore) -> Result<Self> {
        Ok(Self {
            collection: store.collection("holdings")?,
        })
    }

    fn validate(symbol: &str, quantity: f64) -> Result<()> {
        if symbol.trim().is_empty() {
            bail!("Invalid holding: symbol must not be empty");
        }
        if !quantity.is_finite() || quantity < 0.0 {
            bail!("Invalid quantity for {symbol}: must be a non-negative number");
        }
        Ok(())
    }

    /// Creates or replaces a holding. Rejected input leaves holdings
    /// unchanged.
    pub async fn set(&self, symbol: &str, quantity: f64) -> Result<()> {
        Self::validate(symbol, quantity)?;
        if quantity == 0.0 {
            debug!("Zero quantity for {}; removing holding", symbol);
            self.collection.remove(symbol.as_bytes()).await;
            return Ok(());
        }
        let encoded = serde_json::to_vec(&quantity)?;
        self.collection.put(symbol.as_bytes(), &encoded).await;
        Ok(())
    }

    pub async fn remove(&self, symbol: &str) {
        self.collection.remove(symbol.as_bytes()).await;
    }

    pub async fn list(&self) -> Vec<Holding> {
        self.collection
            .entries()
            .await
            .into_iter()
            .filter_map(|(key, value)| {
                let symbol = String::from_utf8(key).ok()?;
                let quantity: f64 = serde_json::from_slice(&value).ok()?;
                Some(Holding { symbol, quantity })
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Constituent {
    pub symbol: String,
    pub quantity: f64,
    pub price: f64,
    pub value: f64,
    pub change_pct: f64,
}

/// Derived aggregate over priced holdings. Holdings without a current
/// quote are excluded from the sums and surfaced in `unpriced`.
#[derive(Debug, Clone, PartialEq)]
pub struct PortfolioSnapshot {
    pub total_value: f64,
    pub change_pct: f64,
    pub constituents: Vec<Constituent>,
    pub unpriced: Vec<String>,
}

/// Recomputes the aggregate from scratch. Returns `None` when no holding
/// is currently priced, in which case no portfolio card should render.
pub fn snapshot(holdings: &[Holding], store: &QuoteStore) -> Option<PortfolioSnapshot> {
    let mut constituents = Vec::new();
    let mut unpriced = Vec::new();

    for holding in holdings {
        if holding.quantity <= 0.0 {
            continue;
        }
        match store.latest(&holding.symbol) {
            Some(quote) => {
                let value = holding.quantity * quote.price;
                constituents.push(Constituent {
                    symbol: holding.symbol.clone(),
                    quantity: holding.quantity,
                    price: quote.price,
                    value,
                    change_pct: quote.change_pct,
                });
            }
            None => unpriced.push(holding.symbol.clone()),
        }
    }

    if constituents.is_empty() {
        return None;
    }

    let total_value: f64 = constituents.iter().map(|c| c.value).sum();
    // Value-weighted, so a large holding's move dominates the aggregate.
    let change_pct = if total_value > 0.0 {
        constituents
            .iter()
            .map(|c| c.value * c.change_pct)
            .sum::<f64>()
            / total_value
    } else {
        0.0
    };

    Some(PortfolioSnapshot {
        total_value,
        change_pct,
        constituents,
        unpriced,
    })
}

/// Sums constituent history into the aggregate's own series for a period.
/// Points are aligned from the newest backwards and truncated to the
/// shortest priced constituent; holdings without a series for the period
/// are left out, holdings with one contribute `quantity x price` per point.
pub fn series(
    holdings: &[Holding],
    store: &QuoteStore,
    period: Period,
) -> Option<HistorySeries> {
    let contributing: Vec<(f64, HistorySeries)> = holdings
        .iter()
        .filter(|h| h.quantity > 0.0)
        .filter_map(|h| {
            store
                .history(&h.symbol, period)
                .map(|series| (h.quantity, series))
        })
        .filter(|(_, series)| !series.points.is_empty())
        .collect();

    if contributing.is_empty() {
        return None;
    }

    let len = contributing
        .iter()
        .map(|(_, series)| series.points.len())
        .min()?;
    let mut points = Vec::with_capacity(len);
    for offset in 0..len {
        let mut value = 0.0;
        let mut timestamp = None;
        for (quantity, series) in &contributing {
            let point = &series.points[series.points.len() - len + offset];
            value += quantity * point.price;
            timestamp.get_or_insert(point.timestamp);
        }
        points.push(HistoryPoint {
            timestamp: timestamp?,
            price: value,
        });
    }

    let fetched_at = contributing
        .iter()
        .map(|(_, series)| series.fetched_at)
        .max()?;
    Some(HistorySeries {
        symbol: PORTFOLIO_SYMBOL.to_string(),
        period,
        points,
        fetched_at,
    })
}
