//! Engine facade wiring the orchestrator, store, holdings and card state
//! together behind the calls the presentation layer makes.

use crate::card::{CardView, PeriodController};
use crate::config::AppConfig;
use crate::market::{QuoteStore, StoreEvent};
use crate::orchestrator::Orchestrator;
use crate::period::Period;
use crate::portfolio::{self, Holding, HoldingsBook, PortfolioSnapshot};
use crate::provider::{CurrencyRateProvider, QuoteProvider};
use crate::providers::caching::CachingRateProvider;
use crate::providers::figure_markets::FigureMarketsProvider;
use crate::providers::twelve_data::{TwelveDataProvider, TwelveDataRates};
use crate::quote::{FetchCycleReport, HistorySeries};
use crate::store::KeyValueStore;
use anyhow::{Result, bail};
use std::sync::{Arc, RwLock};
use tokio::sync::broadcast;

pub struct Engine {
    config: AppConfig,
    store: Arc<QuoteStore>,
    orchestrator: Arc<Orchestrator>,
    cards: PeriodController,
    holdings: HoldingsBook,
    rates: Option<Arc<dyn CurrencyRateProvider>>,
    currency: RwLock<String>,
}

impl Engine {
    /// Builds the engine from config. Provider construction order fixes
    /// the merge precedence: Figure Markets first, Twelve Data second.
    pub fn new(config: AppConfig, kv: &KeyValueStore) -> Result<Self> {
        let store = Arc::new(QuoteStore::new());

        let mut providers: Vec<Arc<dyn QuoteProvider>> = Vec::new();
        if let Some(figure) = &config.providers.figure_markets {
            providers.push(Arc::new(FigureMarketsProvider::new(&figure.base_url)));
        }
        if let Some(twelve) = &config.providers.twelve_data {
            providers.push(Arc::new(TwelveDataProvider::new(
                &twelve.base_url,
                &twelve.api_key,
            )));
        }
        if providers.is_empty() {
            bail!("No quote providers configured");
        }

        let rates: Option<Arc<dyn CurrencyRateProvider>> =
            config.providers.twelve_data.as_ref().map(|twelve| {
                Arc::new(CachingRateProvider::new(TwelveDataRates::new(
                    &twelve.base_url,
                    &twelve.api_key,
                ))) as Arc<dyn CurrencyRateProvider>
            });

        let orchestrator = Arc::new(Orchestrator::new(
            providers,
            Arc::clone(&store),
            config.fetch.policy(),
        ));
        let cards = PeriodController::new(Arc::clone(&orchestrator));
        let holdings = HoldingsBook::new(kv)?;
        let currency = RwLock::new(config.currency.clone());

        Ok(Self {
            config,
            store,
            orchestrator,
            cards,
            holdings,
            rates,
            currency,
        })
    }

    pub fn symbols(&self) -> &[String] {
        &self.config.symbols
    }

    pub fn refresh_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.config.refresh_secs)
    }

    pub fn store(&self) -> &Arc<QuoteStore> {
        &self.store
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.store.subscribe()
    }

    /// One orchestrated quote cycle, with the configured retry policy.
    pub async fn refresh(&self) -> FetchCycleReport {
        self.orchestrator
            .run_cycle_with_retry(&self.config.symbols)
            .await
    }

    /// Starts every configured card on the given period.
    pub fn load_cards(&self, period: Period) {
        for symbol in &self.config.symbols {
            self.cards.select(symbol, period);
        }
    }

    pub fn select_period(&self, card: &str, period: Period) {
        self.cards.select(card, period);
    }

    pub fn card_view(&self, card: &str) -> Option<CardView> {
        self.cards.view(card)
    }

    pub async fn add_holding(&self, symbol: &str, quantity: f64) -> Result<()> {
        self.holdings.set(symbol, quantity).await?;
        self.store.notify_holdings_changed();
        Ok(())
    }

    pub async fn edit_holding(&self, symbol: &str, quantity: f64) -> Result<()> {
        let held = self.holdings.list().await;
        if !held.iter().any(|h| h.symbol == symbol) {
            bail!("No holding for {symbol} to edit");
        }
        self.holdings.set(symbol, quantity).await?;
        self.store.notify_holdings_changed();
        Ok(())
    }

    pub async fn remove_holding(&self, symbol: &str) {
        self.holdings.remove(symbol).await;
        self.store.notify_holdings_changed();
    }

    pub async fn holdings(&self) -> Vec<Holding> {
        self.holdings.list().await
    }

    pub async fn portfolio(&self) -> Option<PortfolioSnapshot> {
        let held = self.holdings.list().await;
        portfolio::snapshot(&held, &self.store)
    }

    pub async fn portfolio_series(&self, period: Period) -> Option<HistorySeries> {
        let held = self.holdings.list().await;
        portfolio::series(&held, &self.store, period)
    }

    pub fn select_currency(&self, code: &str) {
        let mut currency = self.currency.write().unwrap();
        *currency = code.to_uppercase();
    }

    pub fn display_currency(&self) -> String {
        self.currency.read().unwrap().clone()
    }

    /// Conversion rate from quote currency (USD) to the display currency.
    pub async fn display_rate(&self) -> Result<f64> {
        let currency = self.display_currency();
        if currency == "USD" {
            return Ok(1.0);
        }
        match &self.rates {
            Some(rates) => rates.get_rate("USD", &currency).await,
            None => bail!("No rate provider configured for currency {currency}"),
        }
    }

    /// Aborts all in-flight card fetches.
    pub fn shutdown(&self) {
        self.cards.shutdown();
    }
}
