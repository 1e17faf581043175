use anyhow::{Result, anyhow};
use chrono::{NaiveDateTime, Utc};
use serde::Deserialize;
use tracing::{debug, instrument, warn};

use crate::period::Period;
use crate::provider::{CurrencyRateProvider, QuoteProvider};
use crate::quote::{HistoryPoint, HistorySeries, ProviderFailure, ProviderId, Quote};

fn to_pair(symbol: &str) -> String {
    format!("{symbol}/USD")
}

fn series_interval(period: Period) -> &'static str {
    match period {
        Period::Day => "1h",
        Period::Week => "4h",
        Period::Month => "1day",
    }
}

/// Twelve Data client, the fallback quote source. Also serves currency
/// rates for display conversion.
pub struct TwelveDataProvider {
    base_url: String,
    api_key: String,
}

impl TwelveDataProvider {
    pub fn new(base_url: &str, api_key: &str) -> Self {
        TwelveDataProvider {
            base_url: base_url.to_string(),
            api_key: api_key.to_string(),
        }
    }
}

#[derive(Deserialize, Debug)]
struct QuoteResponse {
    close: String,
    percent_change: String,
}

#[derive(Deserialize, Debug)]
struct TimeSeriesResponse {
    values: Vec<TimeSeriesValue>,
}

#[derive(Deserialize, Debug)]
struct TimeSeriesValue {
    datetime: String,
    close: String,
}

#[async_trait::async_trait]
impl QuoteProvider for TwelveDataProvider {
    fn id(&self) -> ProviderId {
        ProviderId::TwelveData
    }

    #[instrument(name = "TwelveDataQuotes", skip(self, symbols))]
    async fn fetch_quotes(&self, symbols: &[String]) -> Result<Vec<Quote>, ProviderFailure> {
        let client = reqwest::Client::builder()
            .user_agent("pulseboard/0.1")
            .build()?;

        let fetched_at = Utc::now();
        let mut quotes = Vec::new();
        for symbol in symbols {
            let url = format!(
                "{}/quote?symbol={}&apikey={}",
                self.base_url,
                to_pair(symbol),
                self.api_key
            );
            debug!("Requesting quote from {}", url);

            let response = client.get(&url).send().await?;
            if !response.status().is_success() {
                return Err(ProviderFailure::bad_status(response.status().as_u16()));
            }

            let text = response.text().await?;
            // Twelve Data reports unknown symbols as a JSON error document
            // with HTTP 200; that drops only the affected symbol.
            let parsed: Result<QuoteResponse, _> = serde_json::from_str(&text);
            match parsed {
                Ok(quote) => match (quote.close.parse(), quote.percent_change.parse()) {
                    (Ok(price), Ok(change_pct)) => quotes.push(Quote {
                        symbol: symbol.clone(),
                        price,
                        change_pct,
                        timestamp: fetched_at,
                        source: ProviderId::TwelveData,
                    }),
                    _ => warn!("Dropping unparsable quote fields for {}", symbol),
                },
                Err(e) => {
                    warn!("Dropping quote for {}: {}", symbol, e);
                }
            }
        }

        Ok(quotes)
    }

    #[instrument(name = "TwelveDataHistory", skip(self), fields(symbol = %symbol, period = %period))]
    async fn fetch_history(
        &self,
        symbol: &str,
        period: Period,
    ) -> Result<HistorySeries, ProviderFailure> {
        let url = format!(
            "{}/time_series?symbol={}&interval={}&outputsize={}&apikey={}",
            self.base_url,
            to_pair(symbol),
            series_interval(period),
            period.point_budget(),
            self.api_key
        );
        debug!("Requesting time series from {}", url);

        let client = reqwest::Client::builder()
            .user_agent("pulseboard/0.1")
            .build()?;
        let response = client.get(&url).send().await?;

        if !response.status().is_success() {
            return Err(ProviderFailure::bad_status(response.status().as_u16()));
        }

        let text = response.text().await?;
        let series: TimeSeriesResponse = serde_json::from_str(&text).map_err(|e| {
            ProviderFailure::parse_error(format!("Failed to parse time series for {symbol}: {e}"))
        })?;

        // Values arrive newest first.
        let mut points: Vec<HistoryPoint> = series
            .values
            .iter()
            .filter_map(|v| {
                let naive =
                    NaiveDateTime::parse_from_str(&v.datetime, "%Y-%m-%d %H:%M:%S").ok()?;
                let price: f64 = v.close.parse().ok()?;
                Some(HistoryPoint {
                    timestamp: naive.and_utc(),
                    price,
                })
            })
            .collect();
        points.sort_by_key(|p| p.timestamp);
        // Keep the newest points when the API over-delivers.
        if points.len() > period.point_budget() {
            points.drain(..points.len() - period.point_budget());
        }

        if points.is_empty() {
            return Err(ProviderFailure::parse_error(format!(
                "No usable time series values for {symbol}"
            )));
        }

        Ok(HistorySeries {
            symbol: symbol.to_string(),
            period,
            points,
            fetched_at: Utc::now(),
        })
    }
}

/// Currency rate lookup backed by the same API.
pub struct TwelveDataRates {
    base_url: String,
    api_key: String,
}

impl TwelveDataRates {
    pub fn new(base_url: &str, api_key: &str) -> Self {
        TwelveDataRates {
            base_url: base_url.to_string(),
            api_key: api_key.to_string(),
        }
    }
}

#[derive(Deserialize, Debug)]
struct ExchangeRateResponse {
    rate: f64,
}

#[async_trait::async_trait]
impl CurrencyRateProvider for TwelveDataRates {
    async fn get_rate(&self, from: &str, to: &str) -> Result<f64> {
        let pair = format!("{from}/{to}");
        let url = format!(
            "{}/exchange_rate?symbol={}&apikey={}",
            self.base_url, pair, self.api_key
        );
        debug!("Requesting exchange rate from {}", url);

        let client = reqwest::Client::builder()
            .user_agent("pulseboard/0.1")
            .build()?;
        let response = client
            .get(&url)
            .send()
            .await
            .map_err(|e| anyhow!("Request error: {} for currency pair: {}", e, pair))?;

        if !response.status().is_success() {
            return Err(anyhow!(
                "HTTP error: {} for currency pair: {}",
                response.status(),
                pair
            ));
        }

        let text = response.text().await?;
        let data: ExchangeRateResponse = serde_json::from_str(&text)
            .map_err(|e| anyhow!("Failed to parse rate response for {}: {}", pair, e))?;

        Ok(data.rate)
    }
}
