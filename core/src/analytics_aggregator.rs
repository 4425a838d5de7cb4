//! Analytics aggregator — per-customer behavioral rollups.
//!
//! Consumes attempts and completions:
//!   1. Running totals and integer average transaction amount
//!   2. Payment-method histogram
//!   3. Rolling trend window, one entry per calendar day of the event
//!      timestamp (never the processing wall clock), newest first, capped
//!   4. Derived risk tier, recomputed on every completion
//!
//! Records are created on a customer's first attempt and never deleted.

use crate::{
    config::AnalyticsConfig,
    consumer::{Ack, EventConsumer},
    error::{AggregateError, AggregateResult},
    event::{CompletionStatus, PaymentEvent, TransactionAttempt, TransactionCompleted},
    types::{CustomerId, EventId, MinorUnits, Timestamp, TransactionId},
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::collections::{HashMap, HashSet};

// ── Risk tier scoring (points per signal) ────────────────────────────────────

const RISK_BUSY_TREND: u32 = 30;
const RISK_HIGH_AVERAGE: u32 = 25;
const RISK_METHOD_VARIETY: u32 = 20;

// ── Data structures ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskTier {
    Low,
    Medium,
    High,
}

/// One calendar day of attempt activity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyTrend {
    pub date: NaiveDate,
    pub transaction_count: u64,
    pub total_amount: MinorUnits,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomerAnalytics {
    pub customer_id: CustomerId,
    pub total_transactions: u64,
    pub total_amount: MinorUnits,
    /// totalAmount / totalTransactions, integer minor units.
    pub average_transaction_amount: MinorUnits,
    pub payment_method_preferences: HashMap<String, u64>,
    /// Sorted descending by date, at most `trend_window_days` entries.
    pub transaction_trends: Vec<DailyTrend>,
    pub risk_profile: RiskTier,
    /// Timestamp of the most recent attempt.
    pub last_activity: Timestamp,
}

/// Per-transaction processing timing, known only once the gateway responds
/// with the real transaction id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionTiming {
    pub transaction_id: TransactionId,
    pub customer_id: CustomerId,
    pub status: CompletionStatus,
    /// Delta from the customer's last attempt activity to the completion
    /// timestamp, floored at zero.
    pub processing_ms: i64,
}

// ── Aggregator ───────────────────────────────────────────────────────────────

pub struct AnalyticsAggregator {
    config: AnalyticsConfig,
    customers: HashMap<CustomerId, CustomerAnalytics>,
    timings: HashMap<TransactionId, TransactionTiming>,
    seen: HashSet<EventId>,
}

impl AnalyticsAggregator {
    pub fn new(config: AnalyticsConfig) -> Self {
        Self {
            config,
            customers: HashMap::new(),
            timings: HashMap::new(),
            seen: HashSet::new(),
        }
    }

    /// Create or update the customer's analytics from one attempt.
    pub fn record_attempt(&mut self, event: &TransactionAttempt) -> AggregateResult<Ack> {
        event.validate()?;
        if self.seen.contains(&event.event_id) {
            return Ok(Ack::Duplicate);
        }
        // Rejection must leave state untouched, so the overflow check runs
        // before anything is written.
        let new_total = self
            .customers
            .get(&event.customer_id)
            .map(|c| c.total_amount)
            .unwrap_or(0)
            .checked_add(event.amount)
            .ok_or_else(|| {
                AggregateError::InternalCompute(format!(
                    "total amount overflow for customer {}",
                    event.customer_id
                ))
            })?;
        self.seen.insert(event.event_id.clone());

        let entry = self
            .customers
            .entry(event.customer_id.clone())
            .or_insert_with(|| CustomerAnalytics {
                customer_id: event.customer_id.clone(),
                total_transactions: 0,
                total_amount: 0,
                average_transaction_amount: 0,
                payment_method_preferences: HashMap::new(),
                transaction_trends: Vec::new(),
                risk_profile: RiskTier::Low,
                last_activity: event.timestamp,
            });

        entry.total_transactions += 1;
        entry.total_amount = new_total;
        entry.average_transaction_amount = entry.total_amount / entry.total_transactions as i64;
        *entry
            .payment_method_preferences
            .entry(event.payment_method.clone())
            .or_insert(0) += 1;
        entry.last_activity = event.timestamp;

        // Trend bucket keyed by the event's own calendar day — replay-safe.
        let day = event.timestamp.date_naive();
        match entry.transaction_trends.iter_mut().find(|t| t.date == day) {
            Some(trend) => {
                trend.transaction_count += 1;
                trend.total_amount += event.amount;
            }
            None => entry.transaction_trends.push(DailyTrend {
                date: day,
                transaction_count: 1,
                total_amount: event.amount,
            }),
        }
        entry.transaction_trends.sort_by(|a, b| b.date.cmp(&a.date));
        entry.transaction_trends.truncate(self.config.trend_window_days);

        Ok(Ack::Accepted)
    }

    /// Stamp the transaction's processing delta and recompute the customer's
    /// risk tier. A completion for a customer with no analytics record
    /// violates the producer ordering contract and is rejected.
    pub fn record_completion(&mut self, event: &TransactionCompleted) -> AggregateResult<Ack> {
        event.validate()?;
        if self.seen.contains(&event.event_id) {
            return Ok(Ack::Duplicate);
        }
        let customer = self
            .customers
            .get_mut(&event.customer_id)
            .ok_or_else(|| AggregateError::not_found("customer analytics", &event.customer_id))?;
        self.seen.insert(event.event_id.clone());

        // First moment the real transaction id is known.
        let processing_ms = (event.timestamp - customer.last_activity)
            .num_milliseconds()
            .max(0);
        self.timings.insert(
            event.transaction_id.clone(),
            TransactionTiming {
                transaction_id: event.transaction_id.clone(),
                customer_id: event.customer_id.clone(),
                status: event.status,
                processing_ms,
            },
        );

        let mut score = 0u32;
        let recent_len = customer
            .transaction_trends
            .len()
            .min(self.config.risk_trend_entries);
        if recent_len > 0 {
            let recent = &customer.transaction_trends[..recent_len];
            let daily_average: u64 =
                recent.iter().map(|t| t.transaction_count).sum::<u64>() / recent_len as u64;
            if daily_average > self.config.busy_day_count {
                score += RISK_BUSY_TREND;
            }
        }
        if customer.average_transaction_amount > self.config.high_average_amount {
            score += RISK_HIGH_AVERAGE;
        }
        if customer.payment_method_preferences.len() > self.config.method_variety {
            score += RISK_METHOD_VARIETY;
        }
        customer.risk_profile = if score > self.config.high_tier_cutoff {
            RiskTier::High
        } else if score > self.config.medium_tier_cutoff {
            RiskTier::Medium
        } else {
            RiskTier::Low
        };
        log::debug!(
            "analytics: customer {} risk score {score} -> {:?}",
            event.customer_id,
            customer.risk_profile
        );

        Ok(Ack::Accepted)
    }

    pub fn customer_analytics(&self, customer_id: &str) -> Option<&CustomerAnalytics> {
        self.customers.get(customer_id)
    }

    pub fn high_risk_customers(&self) -> Vec<&CustomerAnalytics> {
        self.customers
            .values()
            .filter(|c| c.risk_profile == RiskTier::High)
            .collect()
    }

    pub fn timing(&self, transaction_id: &str) -> Option<&TransactionTiming> {
        self.timings.get(transaction_id)
    }
}

impl EventConsumer for AnalyticsAggregator {
    fn name(&self) -> &'static str {
        "analytics"
    }

    fn apply(&mut self, event: &PaymentEvent) -> AggregateResult<Ack> {
        match event {
            PaymentEvent::Attempt(attempt) => self.record_attempt(attempt),
            PaymentEvent::Completed(completed) => self.record_completion(completed),
            PaymentEvent::Success(_) => Ok(Ack::Skipped),
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
