//! Provider contracts for quotes, history and currency rates.

use crate::period::Period;
use crate::quote::{HistorySeries, ProviderFailure, ProviderId, Quote};
use anyhow::Result;
use async_trait::async_trait;

/// Uniform interface to one external quote source.
///
/// Ordinary network, HTTP and parse failures come back as
/// [`ProviderFailure`], never as a panic. A `Ok` payload may be missing
/// some of the requested symbols; callers treat a missing symbol the same
/// as a failed one. Deadlines are enforced by the caller, not here.
#[async_trait]
pub trait QuoteProvider: Send + Sync {
    fn id(&self) -> ProviderId;

    /// Fetch the latest quote for each requested symbol.
    async fn fetch_quotes(&self, symbols: &[String]) -> Result<Vec<Quote>, ProviderFailure>;

    /// Fetch the history series for one symbol scoped to a period.
    async fn fetch_history(
        &self,
        symbol: &str,
        period: Period,
    ) -> Result<HistorySeries, ProviderFailure>;
}

#[async_trait]
pub trait CurrencyRateProvider: Send + Sync {
    async fn get_rate(&self, from: &str, to: &str) -> Result<f64>;
}
