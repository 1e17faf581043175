//! Core quote and fetch-cycle types.

use crate::period::Period;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// External quote sources known to the engine. The configured order of
/// providers is also the merge precedence order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderId {
    FigureMarkets,
    TwelveData,
}

impl ProviderId {
    pub const fn as_str(self) -> &'static str {
        match self {
            ProviderId::FigureMarkets => "figure_markets",
            ProviderId::TwelveData => "twelve_data",
        }
    }
}

impl Display for ProviderId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A priced observation of a symbol at a point in time. Never mutated;
/// a newer observation supersedes it in the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub symbol: String,
    pub price: f64,
    pub change_pct: f64,
    pub timestamp: DateTime<Utc>,
    pub source: ProviderId,
}

/// One point of a history series.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HistoryPoint {
    pub timestamp: DateTime<Utc>,
    pub price: f64,
}

/// Ordered price points for one symbol and one period. Replaced wholesale
/// on each fetch, never appended in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistorySeries {
    pub symbol: String,
    pub period: Period,
    pub points: Vec<HistoryPoint>,
    pub fetched_at: DateTime<Utc>,
}

impl HistorySeries {
    /// Percent change over the whole series, if it has a usable span.
    pub fn change_pct(&self) -> Option<f64> {
        let first = self.points.first()?.price;
        let last = self.points.last()?.price;
        if first > 0.0 {
            Some(((last - first) / first) * 100.0)
        } else {
            None
        }
    }
}

/// How a provider call failed. Timeouts are classified by the orchestrator
/// and are not a provider failure kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Unreachable,
    ParseError,
    BadStatus,
}

/// Structured provider failure carried through the cycle report.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderFailure {
    kind: FailureKind,
    message: String,
}

impl ProviderFailure {
    pub fn unreachable(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Unreachable,
            message: message.into(),
        }
    }

    pub fn parse_error(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::ParseError,
            message: message.into(),
        }
    }

    pub fn bad_status(status: u16) -> Self {
        Self {
            kind: FailureKind::BadStatus,
            message: format!("HTTP status {status}"),
        }
    }

    pub const fn kind(&self) -> FailureKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub const fn code(&self) -> &'static str {
        match self.kind {
            FailureKind::Unreachable => "provider.unreachable",
            FailureKind::ParseError => "provider.parse_error",
            FailureKind::BadStatus => "provider.bad_status",
        }
    }
}

impl Display for ProviderFailure {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.message, self.code())
    }
}

impl std::error::Error for ProviderFailure {}

impl From<reqwest::Error> for ProviderFailure {
    fn from(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            return ProviderFailure::bad_status(status.as_u16());
        }
        if err.is_decode() {
            return ProviderFailure::parse_error(err.to_string());
        }
        ProviderFailure::unreachable(err.to_string())
    }
}

/// Outcome of one provider's contribution to a fetch cycle.
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderResult {
    Success(Vec<Quote>),
    Failure(ProviderFailure),
    Timeout,
}

impl ProviderResult {
    /// Short status label used in the per-cycle tracing event.
    pub fn status_label(&self) -> String {
        match self {
            ProviderResult::Success(quotes) => format!("success({})", quotes.len()),
            ProviderResult::Failure(failure) => failure.code().to_string(),
            ProviderResult::Timeout => "timeout".to_string(),
        }
    }
}

/// Overall classification of a fetch cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleStatus {
    AllSucceeded,
    PartialFailure,
    TotalFailure,
}

impl Display for CycleStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            CycleStatus::AllSucceeded => "all_succeeded",
            CycleStatus::PartialFailure => "partial_failure",
            CycleStatus::TotalFailure => "total_failure",
        })
    }
}

/// Read-only record of one orchestration run.
#[derive(Debug, Clone)]
pub struct FetchCycleReport {
    pub cycle_id: u64,
    pub provider_results: Vec<(ProviderId, ProviderResult)>,
    pub merged: Vec<Quote>,
    pub status: CycleStatus,
}

impl FetchCycleReport {
    pub fn classify(provider_results: &[(ProviderId, ProviderResult)], merged: &[Quote]) -> CycleStatus {
        let all_succeeded = provider_results
            .iter()
            .all(|(_, result)| matches!(result, ProviderResult::Success(_)));
        if all_succeeded {
            CycleStatus::AllSucceeded
        } else if merged.is_empty() {
            CycleStatus::TotalFailure
        } else {
            CycleStatus::PartialFailure
        }
    }
}
