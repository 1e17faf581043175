//! Terminal rendering of the dashboard: one row per symbol card plus the
//! synthetic portfolio card. Thin by design; everything it shows comes
//! from engine reads.

use crate::engine::Engine;
use crate::gradient;
use crate::period::Period;
use crate::portfolio::PORTFOLIO_SYMBOL;
use crate::quote::{CycleStatus, FetchCycleReport};
use crate::ui;
use anyhow::Result;
use comfy_table::Cell;
use std::time::Duration;
use tracing::warn;

/// Waits until every card has a series or gave up (stale with none
/// coming). Bounded; rendering proceeds with whatever is there.
pub async fn await_cards(engine: &Engine, timeout: Duration) {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        let settled = engine.symbols().iter().all(|symbol| {
            engine
                .card_view(symbol)
                .is_some_and(|view| view.series.is_some() || view.stale)
        });
        if settled || tokio::time::Instant::now() >= deadline {
            return;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

/// Renders the board for the current engine state.
pub async fn render(engine: &Engine, period: Period) -> Result<String> {
    let currency = engine.display_currency();
    let rate = match engine.display_rate().await {
        Ok(rate) => rate,
        Err(e) => {
            warn!("Falling back to quote currency: {}", e);
            1.0
        }
    };

    let mut output = format!("{}\n\n", ui::style_text("Market Board", ui::StyleType::Title));

    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("Symbol"),
        ui::header_cell(&format!("Price ({currency})")),
        ui::header_cell("24H"),
        ui::header_cell("Period"),
        ui::header_cell("Period Δ"),
        ui::header_cell("Feed"),
    ]);

    for symbol in engine.symbols() {
        let quote = engine.store().latest(symbol);
        let view = engine.card_view(symbol);

        let price_cell = ui::format_optional_cell(quote.as_ref().map(|q| q.price * rate), |p| {
            format!("{p:.2}")
        });
        let change_cell = match &quote {
            Some(q) => ui::gradient_cell(q.change_pct, gradient::intensity(q.change_pct)),
            None => ui::format_optional_cell(None::<f64>, |_: f64| String::new()),
        };

        let (period_label, series_change) = match &view {
            Some(view) => {
                let mut label = view.period.to_string();
                if view.stale {
                    label.push_str(" (stale)");
                }
                (label, view.series.as_ref().and_then(|s| s.change_pct()))
            }
            None => (period.to_string(), None),
        };
        let series_cell = match series_change {
            Some(change) => ui::gradient_cell(change, gradient::intensity(change)),
            None => ui::format_optional_cell(None::<f64>, |_: f64| String::new()),
        };

        table.add_row(vec![
            Cell::new(symbol),
            price_cell,
            change_cell,
            Cell::new(period_label),
            series_cell,
            Cell::new(
                quote
                    .map(|q| q.source.to_string())
                    .unwrap_or_else(|| "-".to_string()),
            ),
        ]);
    }

    if let Some(snapshot) = engine.portfolio().await {
        let pf_series_change = engine
            .portfolio_series(period)
            .await
            .and_then(|s| s.change_pct());
        let series_cell = match pf_series_change {
            Some(change) => ui::gradient_cell(change, gradient::intensity(change)),
            None => ui::format_optional_cell(None::<f64>, |_: f64| String::new()),
        };
        table.add_row(vec![
            Cell::new(format!("{PORTFOLIO_SYMBOL} (Total Portfolio)")),
            Cell::new(format!("{:.2}", snapshot.total_value * rate)),
            ui::gradient_cell(
                snapshot.change_pct,
                gradient::intensity(snapshot.change_pct),
            ),
            Cell::new(period.to_string()),
            series_cell,
            Cell::new("derived"),
        ]);

        if !snapshot.unpriced.is_empty() {
            let note = format!("Unpriced holdings: {}", snapshot.unpriced.join(", "));
            table.add_row(vec![Cell::new(ui::style_text(&note, ui::StyleType::Subtle))]);
        }
    }

    output.push_str(&table.to_string());
    Ok(output)
}

/// One-line cycle outcome banner, styled by severity.
pub fn cycle_banner(report: &FetchCycleReport) -> Option<String> {
    let providers: Vec<String> = report
        .provider_results
        .iter()
        .map(|(id, result)| format!("{id}={}", result.status_label()))
        .collect();
    match report.status {
        CycleStatus::AllSucceeded => None,
        CycleStatus::PartialFailure => Some(ui::style_text(
            &format!(
                "Some providers failed (cycle {}): {}",
                report.cycle_id,
                providers.join(", ")
            ),
            ui::StyleType::Subtle,
        )),
        CycleStatus::TotalFailure => Some(ui::style_text(
            &format!(
                "All providers failed (cycle {}); showing last known data",
                report.cycle_id
            ),
            ui::StyleType::Error,
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quote::{ProviderFailure, ProviderId, ProviderResult};

    fn report(status: CycleStatus) -> FetchCycleReport {
        FetchCycleReport {
            cycle_id: 3,
            provider_results: vec![
                (
                    ProviderId::FigureMarkets,
                    ProviderResult::Failure(ProviderFailure::unreachable("connection refused")),
                ),
                (ProviderId::TwelveData, ProviderResult::Success(vec![])),
            ],
            merged: vec![],
            status,
        }
    }

    #[test]
    fn test_no_banner_when_all_succeeded() {
        assert!(cycle_banner(&report(CycleStatus::AllSucceeded)).is_none());
    }

    #[test]
    fn test_partial_failure_banner_names_providers() {
        let banner = cycle_banner(&report(CycleStatus::PartialFailure)).unwrap();
        assert!(banner.contains("cycle 3"));
        assert!(banner.contains("figure_markets=provider.unreachable"));
        assert!(banner.contains("twelve_data=success(0)"));
    }

    #[test]
    fn test_total_failure_banner_promises_stale_data() {
        let banner = cycle_banner(&report(CycleStatus::TotalFailure)).unwrap();
        assert!(banner.contains("last known data"));
    }
}
