use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::{debug, instrument, warn};

use crate::period::Period;
use crate::provider::QuoteProvider;
use crate::quote::{HistoryPoint, HistorySeries, ProviderFailure, ProviderId, Quote};

/// Maps a board symbol to the exchange's market identifier and back.
fn to_market(symbol: &str) -> String {
    format!("{symbol}-USD")
}

fn from_market(market: &str) -> &str {
    market.strip_suffix("-USD").unwrap_or(market)
}

fn candle_interval(period: Period) -> &'static str {
    match period {
        Period::Day => "1H",
        Period::Week => "4H",
        Period::Month => "1D",
    }
}

/// Figure Markets exchange client, the primary quote source.
pub struct FigureMarketsProvider {
    base_url: String,
}

impl FigureMarketsProvider {
    pub fn new(base_url: &str) -> Self {
        FigureMarketsProvider {
            base_url: base_url.to_string(),
        }
    }
}

#[derive(Deserialize, Debug)]
struct MarketsResponse {
    data: Vec<MarketEntry>,
}

#[derive(Deserialize, Debug)]
struct MarketEntry {
    symbol: String,
    #[serde(alias = "midMarketPrice")]
    mid_market_price: String,
    #[serde(alias = "percentageChange24h")]
    percentage_change_24h: String,
}

#[derive(Deserialize, Debug)]
struct CandlesResponse {
    data: Vec<CandleEntry>,
}

#[derive(Deserialize, Debug)]
struct CandleEntry {
    timestamp: DateTime<Utc>,
    close: String,
}

impl MarketEntry {
    /// A market entry with an unparsable price is dropped, not fatal; the
    /// caller treats the symbol as unpriced for this cycle.
    fn to_quote(&self, fetched_at: DateTime<Utc>) -> Option<Quote> {
        let price: f64 = self.mid_market_price.parse().ok()?;
        let change_pct: f64 = self.percentage_change_24h.parse().ok()?;
        Some(Quote {
            symbol: from_market(&self.symbol).to_string(),
            price,
            change_pct,
            timestamp: fetched_at,
            source: ProviderId::FigureMarkets,
        })
    }
}

#[async_trait::async_trait]
impl QuoteProvider for FigureMarketsProvider {
    fn id(&self) -> ProviderId {
        ProviderId::FigureMarkets
    }

    #[instrument(name = "FigureMarketsQuotes", skip(self, symbols))]
    async fn fetch_quotes(&self, symbols: &[String]) -> Result<Vec<Quote>, ProviderFailure> {
        let url = format!("{}/service-hft-exchange/api/v1/markets", self.base_url);
        debug!("Requesting markets from {}", url);

        let client = reqwest::Client::builder()
            .user_agent("pulseboard/0.1")
            .build()?;
        let response = client.get(&url).send().await?;

        if !response.status().is_success() {
            return Err(ProviderFailure::bad_status(response.status().as_u16()));
        }

        let text = response.text().await?;
        let markets: MarketsResponse = serde_json::from_str(&text).map_err(|e| {
            ProviderFailure::parse_error(format!("Failed to parse markets response: {e}"))
        })?;

        let fetched_at = Utc::now();
        let mut quotes = Vec::new();
        for symbol in symbols {
            let market = to_market(symbol);
            let Some(entry) = markets.data.iter().find(|m| m.symbol == market) else {
                debug!("Symbol {} not listed on Figure Markets", symbol);
                continue;
            };
            match entry.to_quote(fetched_at) {
                Some(quote) => quotes.push(quote),
                None => warn!("Dropping unparsable market entry for {}", symbol),
            }
        }

        Ok(quotes)
    }

    #[instrument(name = "FigureMarketsHistory", skip(self), fields(symbol = %symbol, period = %period))]
    async fn fetch_history(
        &self,
        symbol: &str,
        period: Period,
    ) -> Result<HistorySeries, ProviderFailure> {
        let url = format!(
            "{}/service-hft-exchange/api/v1/candles?symbol={}&interval={}&limit={}",
            self.base_url,
            to_market(symbol),
            candle_interval(period),
            period.point_budget()
        );
        debug!("Requesting candles from {}", url);

        let client = reqwest::Client::builder()
            .user_agent("pulseboard/0.1")
            .build()?;
        let response = client.get(&url).send().await?;

        if !response.status().is_success() {
            return Err(ProviderFailure::bad_status(response.status().as_u16()));
        }

        let text = response.text().await?;
        let candles: CandlesResponse = serde_json::from_str(&text).map_err(|e| {
            ProviderFailure::parse_error(format!("Failed to parse candles for {symbol}: {e}"))
        })?;

        let mut points: Vec<HistoryPoint> = candles
            .data
            .iter()
            .filter_map(|c| {
                c.close
                    .parse()
                    .ok()
                    .map(|price| HistoryPoint {
                        timestamp: c.timestamp,
                        price,
                    })
            })
            .collect();
        points.sort_by_key(|p| p.timestamp);
        // Keep the newest points when the exchange over-delivers.
        if points.len() > period.point_budget() {
            points.drain(..points.len() - period.point_budget());
        }

        if points.is_empty() {
            return Err(ProviderFailure::parse_error(format!(
                "No usable candles for {symbol}"
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

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn mock_markets(mock_response: &str) -> MockServer {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/service-hft-exchange/api/v1/markets"))
            .respond_with(ResponseTemplate::new(200).set_body_string(mock_response))
            .mount(&mock_server)
            .await;
        mock_server
    }

    #[tokio::test]
    async fn test_fetch_quotes_maps_market_symbols() {
        let mock_response = r#"{
            "data": [
                {"symbol": "HASH-USD", "midMarketPrice": "0.031", "percentageChange24h": "-1.5"},
                {"symbol": "BTC-USD", "midMarketPrice": "50000.0", "percentageChange24h": "2.0"}
            ]
        }"#;
        let mock_server = mock_markets(mock_response).await;
        let provider = FigureMarketsProvider::new(&mock_server.uri());

        let quotes = provider
            .fetch_quotes(&["HASH".to_string(), "BTC".to_string()])
            .await
            .unwrap();

        assert_eq!(quotes.len(), 2);
        assert_eq!(quotes[0].symbol, "HASH");
        assert_eq!(quotes[0].price, 0.031);
        assert_eq!(quotes[0].change_pct, -1.5);
        assert_eq!(quotes[1].symbol, "BTC");
        assert_eq!(quotes[1].source, ProviderId::FigureMarkets);
    }

    #[tokio::test]
    async fn test_fetch_quotes_skips_unlisted_and_unparsable() {
        let mock_response = r#"{
            "data": [
                {"symbol": "HASH-USD", "midMarketPrice": "not-a-number", "percentageChange24h": "0.1"},
                {"symbol": "BTC-USD", "midMarketPrice": "50000.0", "percentageChange24h": "2.0"}
            ]
        }"#;
        let mock_server = mock_markets(mock_response).await;
        let provider = FigureMarketsProvider::new(&mock_server.uri());

        let quotes = provider
            .fetch_quotes(&["HASH".to_string(), "BTC".to_string(), "ETH".to_string()])
            .await
            .unwrap();

        // HASH dropped (unparsable price), ETH absent (unlisted), BTC kept.
        assert_eq!(quotes.len(), 1);
        assert_eq!(quotes[0].symbol, "BTC");
    }

    #[tokio::test]
    async fn test_fetch_quotes_http_error() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/service-hft-exchange/api/v1/markets"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&mock_server)
            .await;
        let provider = FigureMarketsProvider::new(&mock_server.uri());

        let err = provider
            .fetch_quotes(&["HASH".to_string()])
            .await
            .unwrap_err();
        assert_eq!(err.kind(), crate::quote::FailureKind::BadStatus);
    }

    #[tokio::test]
    async fn test_fetch_quotes_malformed_body() {
        let mock_server = mock_markets(r#"{"markets": []}"#).await;
        let provider = FigureMarketsProvider::new(&mock_server.uri());

        let err = provider
            .fetch_quotes(&["HASH".to_string()])
            .await
            .unwrap_err();
        assert_eq!(err.kind(), crate::quote::FailureKind::ParseError);
    }

    #[tokio::test]
    async fn test_fetch_history_sorts_and_bounds() {
        let mock_server = MockServer::start().await;
        let mock_response = r#"{
            "data": [
                {"timestamp": "2025-08-01T02:00:00Z", "close": "0.033"},
                {"timestamp": "2025-08-01T00:00:00Z", "close": "0.030"},
                {"timestamp": "2025-08-01T01:00:00Z", "close": "0.031"}
            ]
        }"#;
        Mock::given(method("GET"))
            .and(path("/service-hft-exchange/api/v1/candles"))
            .respond_with(ResponseTemplate::new(200).set_body_string(mock_response))
            .mount(&mock_server)
            .await;
        let provider = FigureMarketsProvider::new(&mock_server.uri());

        let series = provider.fetch_history("HASH", Period::Day).await.unwrap();

        assert_eq!(series.symbol, "HASH");
        assert_eq!(series.period, Period::Day);
        assert_eq!(series.points.len(), 3);
        assert!(series.points[0].timestamp < series.points[1].timestamp);
        assert_eq!(series.points[0].price, 0.030);
        assert_eq!(series.points[2].price, 0.033);
    }

    #[tokio::test]
    async fn test_fetch_history_empty_is_parse_error() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/service-hft-exchange/api/v1/candles"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"data": []}"#))
            .mount(&mock_server)
            .await;
        let provider = FigureMarketsProvider::new(&mock_server.uri());

        let err = provider.fetch_history("HASH", Period::Day).await.unwrap_err();
        assert_eq!(err.kind(), crate::quote::FailureKind::ParseError);
    }
}
