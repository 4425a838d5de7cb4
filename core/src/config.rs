//! Aggregator thresholds, loadable from a JSON file.
//!
//! Every numeric in the detection and billing rules lives here so an
//! operator can retune without a rebuild. Defaults are the production
//! values; amounts are minor currency units.

use crate::{error::AggregateResult, types::MinorUnits};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FraudConfig {
    /// Attempts in the trailing 1h window above which velocity fires `high`.
    pub velocity_hourly_count: usize,
    /// Attempts in the trailing 24h window above which velocity fires `medium`.
    pub velocity_daily_count: usize,
    /// 1h-window amount sum above which velocity fires `critical`.
    pub velocity_hourly_amount: MinorUnits,
    /// Multiple of the prior average an amount must exceed to fire `high`.
    pub amount_spike_ratio: i64,
    /// Floor under which the spike-ratio rule never fires.
    pub amount_spike_floor: MinorUnits,
    /// Absolute single-attempt amount above which `medium` fires.
    pub amount_absolute_ceiling: MinorUnits,
    /// Payment methods considered for the pattern rule (most recent N).
    pub method_window: usize,
    /// Distinct methods in the window at which `pattern` fires.
    pub method_distinct: usize,
    /// User agents considered for the device rule (most recent N, nulls excluded).
    pub agent_window: usize,
    /// Distinct agents in the window at which `device` fires.
    pub agent_distinct: usize,
    /// IP addresses considered for the location rule (most recent N, nulls excluded).
    pub ip_window: usize,
    /// Distinct first-two-octet prefixes at which `location` fires.
    pub ip_prefix_distinct: usize,
}

impl Default for FraudConfig {
    fn default() -> Self {
        Self {
            velocity_hourly_count: 5,
            velocity_daily_count: 20,
            velocity_hourly_amount: 100_000,
            amount_spike_ratio: 10,
            amount_spike_floor: 50_000,
            amount_absolute_ceiling: 500_000,
            method_window: 5,
            method_distinct: 3,
            agent_window: 10,
            agent_distinct: 4,
            ip_window: 10,
            ip_prefix_distinct: 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyticsConfig {
    /// Calendar-day trend entries retained per customer.
    pub trend_window_days: usize,
    /// Trend entries (most recent) averaged for the busy-days risk signal.
    pub risk_trend_entries: usize,
    /// Average daily attempt count above which the busy-days signal scores.
    pub busy_day_count: u64,
    /// Average transaction amount above which the amount signal scores.
    pub high_average_amount: MinorUnits,
    /// Distinct payment methods above which the variety signal scores.
    pub method_variety: usize,
    /// Risk score above which the tier is `high`.
    pub high_tier_cutoff: u32,
    /// Risk score above which the tier is `medium`.
    pub medium_tier_cutoff: u32,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            trend_window_days: 30,
            risk_trend_entries: 7,
            busy_day_count: 10,
            high_average_amount: 50_000,
            method_variety: 3,
            high_tier_cutoff: 50,
            medium_tier_cutoff: 25,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BillingConfig {
    /// Open-tab amount at which an invoice is generated.
    pub invoice_threshold: MinorUnits,
}

impl Default for BillingConfig {
    fn default() -> Self {
        Self {
            invoice_threshold: 10_000,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub fraud: FraudConfig,
    pub analytics: AnalyticsConfig,
    pub billing: BillingConfig,
}

impl PipelineConfig {
    pub fn from_json_str(raw: &str) -> AggregateResult<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> AggregateResult<Self> {
        let raw = std::fs::read_to_string(path.as_ref())
            .map_err(|e| anyhow::anyhow!("reading {}: {e}", path.as_ref().display()))?;
        Self::from_json_str(&raw)
    }
}
