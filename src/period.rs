//! Viewing periods for history series.

use anyhow::Result;
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::str::FromStr;

/// A selectable viewing window for a card's chart. Each period maps to
/// exactly one sampling interval and one point budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub enum Period {
    Day,
    Week,
    Month,
}

pub const ALL_PERIODS: [Period; 3] = [Period::Day, Period::Week, Period::Month];

impl Period {
    /// Width of one sampling bucket within the period window.
    pub fn sample_interval(&self) -> Duration {
        match self {
            Period::Day => Duration::hours(1),
            Period::Week => Duration::hours(4),
            Period::Month => Duration::days(1),
        }
    }

    /// Number of points a full series holds: one per sampling interval.
    pub fn point_budget(&self) -> usize {
        match self {
            Period::Day => 24,
            Period::Week => 42,
            Period::Month => 30,
        }
    }

    pub fn lookback(&self) -> Duration {
        self.sample_interval() * self.point_budget() as i32
    }
}

impl Display for Period {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                Period::Day => "24H",
                Period::Week => "1W",
                Period::Month => "1M",
            }
        )
    }
}

impl FromStr for Period {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "24H" | "1D" => Ok(Period::Day),
            "1W" => Ok(Period::Week),
            "1M" => Ok(Period::Month),
            _ => Err(anyhow::anyhow!("Invalid period: {}", s)),
        }
    }
}
