//! Fraud aggregator — attempt-stream heuristics and alerting.
//!
//! This aggregator:
//!   1. Detects velocity bursts (1h / 24h windows relative to event time)
//!   2. Detects amount spikes against the customer's prior average
//!   3. Flags payment-method churn and user-agent churn (pattern / device)
//!   4. Flags IP-prefix dispersion (location)
//!   5. Rebuilds the per-customer fraud profile from the full alert set
//!
//! Windows are computed against the event's own timestamp, never wall-clock
//! time, so replaying a historical feed produces identical alerts.

use crate::{
    config::FraudConfig,
    consumer::{Ack, EventConsumer},
    error::{AggregateError, AggregateResult},
    event::{PaymentEvent, TransactionAttempt},
    types::{AlertId, CustomerId, EventId, MinorUnits, Timestamp, TransactionId},
};
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::collections::{BTreeSet, HashMap, HashSet};
use uuid::Uuid;

// ── Severity weights (fraud score contribution) ──────────────────────────────

const WEIGHT_CRITICAL: u32 = 50;
const WEIGHT_HIGH: u32 = 25;
const WEIGHT_MEDIUM: u32 = 10;
const WEIGHT_LOW: u32 = 5;
const SCORE_CAP: u32 = 100;

// ── Data structures ──────────────────────────────────────────────────────────

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum AlertType {
    Velocity,
    Amount,
    Pattern,
    Location,
    Device,
}

/// Declaration order is severity order: Low < Medium < High < Critical.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn weight(self) -> u32 {
        match self {
            Self::Low => WEIGHT_LOW,
            Self::Medium => WEIGHT_MEDIUM,
            Self::High => WEIGHT_HIGH,
            Self::Critical => WEIGHT_CRITICAL,
        }
    }
}

/// Created only by this aggregator; mutable only via `resolve`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FraudAlert {
    pub id: AlertId,
    /// Placeholder derived from the event id — the gateway transaction id
    /// does not exist yet at attempt time.
    pub transaction_id: TransactionId,
    pub customer_id: CustomerId,
    pub alert_type: AlertType,
    pub severity: Severity,
    pub description: String,
    pub timestamp: Timestamp,
    pub resolved: bool,
    pub false_positive: bool,
}

/// Rebuilt in full from the alert set on every analyzed attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomerFraudProfile {
    pub customer_id: CustomerId,
    pub total_alerts: usize,
    /// Alerts with severity high or critical.
    pub high_risk_transactions: usize,
    pub suspicious_patterns: BTreeSet<AlertType>,
    pub last_fraud_check: Timestamp,
    /// Capped weighted sum of alert severities, always in [0, 100].
    pub fraud_score: u32,
    /// Reserved — never set by current logic.
    pub whitelisted: bool,
}

#[derive(Debug, Clone)]
struct AttemptSnapshot {
    timestamp: Timestamp,
    amount: MinorUnits,
    payment_method: String,
    ip_address: Option<String>,
    user_agent: Option<String>,
}

struct RuleHit {
    alert_type: AlertType,
    severity: Severity,
    description: String,
}

// ── Aggregator ───────────────────────────────────────────────────────────────

pub struct FraudAggregator {
    config: FraudConfig,
    history: HashMap<CustomerId, Vec<AttemptSnapshot>>,
    alerts: Vec<FraudAlert>,
    profiles: HashMap<CustomerId, CustomerFraudProfile>,
    /// Alert ids that raised a blocking-level notification (critical severity).
    escalations: Vec<AlertId>,
    seen: HashSet<EventId>,
}

impl FraudAggregator {
    pub fn new(config: FraudConfig) -> Self {
        Self {
            config,
            history: HashMap::new(),
            alerts: Vec::new(),
            profiles: HashMap::new(),
            escalations: Vec::new(),
            seen: HashSet::new(),
        }
    }

    /// Run all heuristics against one attempt and rebuild the customer's
    /// profile. A heuristic failure is logged and surfaced as `Degraded`;
    /// the event still counts as processed.
    pub fn analyze(&mut self, event: &TransactionAttempt) -> AggregateResult<Ack> {
        event.validate()?;
        if !self.seen.insert(event.event_id.clone()) {
            log::debug!(
                "fraud: duplicate event {} for customer {}, ignoring",
                event.event_id,
                event.customer_id
            );
            return Ok(Ack::Duplicate);
        }

        self.history
            .entry(event.customer_id.clone())
            .or_default()
            .push(AttemptSnapshot {
                timestamp: event.timestamp,
                amount: event.amount,
                payment_method: event.payment_method.clone(),
                ip_address: event.ip_address.clone(),
                user_agent: event.user_agent.clone(),
            });

        let mut hits = Vec::new();
        let mut warnings = Vec::new();
        {
            let cfg = &self.config;
            let history = self
                .history
                .get(&event.customer_id)
                .map(Vec::as_slice)
                .unwrap_or(&[]);
            let rules: [(&str, AggregateResult<Vec<RuleHit>>); 4] = [
                ("velocity", velocity_hits(cfg, history, event)),
                ("amount", amount_hits(cfg, history, event)),
                ("pattern", pattern_hits(cfg, history)),
                ("location", location_hits(cfg, history)),
            ];
            for (rule, outcome) in rules {
                match outcome {
                    Ok(mut rule_hits) => hits.append(&mut rule_hits),
                    Err(e) => {
                        log::error!(
                            "fraud: {rule} heuristic failed for customer {}: {e}",
                            event.customer_id
                        );
                        warnings.push(format!("{rule}: {e}"));
                    }
                }
            }
        }

        for hit in hits {
            self.raise_alert(event, hit);
        }
        self.rebuild_profile(&event.customer_id, event.timestamp);

        if warnings.is_empty() {
            Ok(Ack::Accepted)
        } else {
            Ok(Ack::Degraded(warnings))
        }
    }

    fn raise_alert(&mut self, event: &TransactionAttempt, hit: RuleHit) {
        let alert = FraudAlert {
            id: Uuid::new_v4().to_string(),
            transaction_id: event.placeholder_transaction_id(),
            customer_id: event.customer_id.clone(),
            alert_type: hit.alert_type,
            severity: hit.severity,
            description: hit.description,
            timestamp: event.timestamp,
            resolved: false,
            false_positive: false,
        };
        log::warn!(
            "fraud alert {:?}/{:?} for customer {}: {}",
            alert.alert_type,
            alert.severity,
            alert.customer_id,
            alert.description
        );
        if alert.severity == Severity::Critical {
            // Blocking-level notification, not a hard failure.
            log::error!(
                "BLOCKING: critical fraud alert {} for customer {}",
                alert.id,
                alert.customer_id
            );
            self.escalations.push(alert.id.clone());
        }
        self.alerts.push(alert);
    }

    /// Full recompute from the alert set — the profile is recreated, not
    /// incrementally patched, so it can never drift from the alerts.
    fn rebuild_profile(&mut self, customer_id: &str, checked_at: Timestamp) {
        let mut total_alerts = 0;
        let mut high_risk = 0;
        let mut patterns = BTreeSet::new();
        let mut weight_sum = 0u32;
        for alert in self.alerts.iter().filter(|a| a.customer_id == customer_id) {
            total_alerts += 1;
            if alert.severity >= Severity::High {
                high_risk += 1;
            }
            patterns.insert(alert.alert_type);
            // Alerts resolved as false positives drop out of the score;
            // resolved true positives still count.
            if !alert.false_positive {
                weight_sum += alert.severity.weight();
            }
        }
        self.profiles.insert(
            customer_id.to_string(),
            CustomerFraudProfile {
                customer_id: customer_id.to_string(),
                total_alerts,
                high_risk_transactions: high_risk,
                suspicious_patterns: patterns,
                last_fraud_check: checked_at,
                fraud_score: weight_sum.min(SCORE_CAP),
                whitelisted: false,
            },
        );
    }

    /// Mark an alert resolved and recompute the owning customer's profile.
    pub fn resolve(&mut self, alert_id: &str, false_positive: bool) -> AggregateResult<()> {
        let alert = self
            .alerts
            .iter_mut()
            .find(|a| a.id == alert_id)
            .ok_or_else(|| AggregateError::not_found("alert", alert_id))?;
        alert.resolved = true;
        alert.false_positive = false_positive;
        let customer_id = alert.customer_id.clone();
        let checked_at = self
            .profiles
            .get(&customer_id)
            .map(|p| p.last_fraud_check)
            .unwrap_or(alert.timestamp);
        self.rebuild_profile(&customer_id, checked_at);
        Ok(())
    }

    /// All alerts, or only one customer's.
    pub fn alerts(&self, customer_id: Option<&str>) -> Vec<FraudAlert> {
        self.alerts
            .iter()
            .filter(|a| customer_id.map_or(true, |c| a.customer_id == c))
            .cloned()
            .collect()
    }

    pub fn profile(&self, customer_id: &str) -> Option<&CustomerFraudProfile> {
        self.profiles.get(customer_id)
    }

    /// Ids of alerts that raised a blocking-level notification.
    pub fn escalations(&self) -> &[AlertId] {
        &self.escalations
    }
}

impl EventConsumer for FraudAggregator {
    fn name(&self) -> &'static str {
        "fraud"
    }

    fn apply(&mut self, event: &PaymentEvent) -> AggregateResult<Ack> {
        match event {
            PaymentEvent::Attempt(attempt) => self.analyze(attempt),
            _ => Ok(Ack::Skipped),
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

// ── Heuristics ───────────────────────────────────────────────────────────────
//
// Each heuristic is independent: several may fire from one event, and every
// firing is one alert per triggering event, never deduplicated per customer.

/// Rule 1: velocity. History is partitioned into trailing 1h / 24h windows
/// relative to the current event's timestamp.
fn velocity_hits(
    cfg: &FraudConfig,
    history: &[AttemptSnapshot],
    event: &TransactionAttempt,
) -> AggregateResult<Vec<RuleHit>> {
    let hour_ago = event.timestamp - Duration::hours(1);
    let day_ago = event.timestamp - Duration::hours(24);

    let mut hourly_count = 0usize;
    let mut daily_count = 0usize;
    let mut hourly_amount: MinorUnits = 0;
    for snapshot in history {
        if snapshot.timestamp > event.timestamp {
            continue;
        }
        if snapshot.timestamp > day_ago {
            daily_count += 1;
        }
        if snapshot.timestamp > hour_ago {
            hourly_count += 1;
            hourly_amount = hourly_amount.checked_add(snapshot.amount).ok_or_else(|| {
                AggregateError::InternalCompute(format!(
                    "1h amount sum overflow for customer {}",
                    event.customer_id
                ))
            })?;
        }
    }

    let mut hits = Vec::new();
    if hourly_count > cfg.velocity_hourly_count {
        hits.push(RuleHit {
            alert_type: AlertType::Velocity,
            severity: Severity::High,
            description: format!("{hourly_count} attempts in the last hour"),
        });
    }
    if daily_count > cfg.velocity_daily_count {
        hits.push(RuleHit {
            alert_type: AlertType::Velocity,
            severity: Severity::Medium,
            description: format!("{daily_count} attempts in the last 24 hours"),
        });
    }
    if hourly_amount > cfg.velocity_hourly_amount {
        hits.push(RuleHit {
            alert_type: AlertType::Velocity,
            severity: Severity::Critical,
            description: format!("{hourly_amount} minor units attempted in the last hour"),
        });
    }
    Ok(hits)
}

/// Rule 2: amount spike against the prior average (current excluded).
/// Skipped entirely on a customer's first attempt — the mean of an empty
/// history is undefined, not zero.
fn amount_hits(
    cfg: &FraudConfig,
    history: &[AttemptSnapshot],
    event: &TransactionAttempt,
) -> AggregateResult<Vec<RuleHit>> {
    let mut hits = Vec::new();

    let prior = &history[..history.len().saturating_sub(1)];
    if !prior.is_empty() {
        let mut sum: MinorUnits = 0;
        for snapshot in prior {
            sum = sum.checked_add(snapshot.amount).ok_or_else(|| {
                AggregateError::InternalCompute(format!(
                    "prior amount sum overflow for customer {}",
                    event.customer_id
                ))
            })?;
        }
        let average = sum / prior.len() as i64;
        let spike_cutoff = cfg.amount_spike_ratio.checked_mul(average).ok_or_else(|| {
            AggregateError::InternalCompute(format!(
                "spike cutoff overflow for customer {}",
                event.customer_id
            ))
        })?;
        if event.amount > spike_cutoff && event.amount > cfg.amount_spike_floor {
            hits.push(RuleHit {
                alert_type: AlertType::Amount,
                severity: Severity::High,
                description: format!(
                    "amount {} exceeds {}x prior average {}",
                    event.amount, cfg.amount_spike_ratio, average
                ),
            });
        }
    }
    if event.amount > cfg.amount_absolute_ceiling {
        hits.push(RuleHit {
            alert_type: AlertType::Amount,
            severity: Severity::Medium,
            description: format!(
                "amount {} exceeds absolute ceiling {}",
                event.amount, cfg.amount_absolute_ceiling
            ),
        });
    }
    Ok(hits)
}

/// Rule 3: payment-method churn (pattern) and user-agent churn (device),
/// both over the most recent attempts including the current one.
fn pattern_hits(
    cfg: &FraudConfig,
    history: &[AttemptSnapshot],
) -> AggregateResult<Vec<RuleHit>> {
    let mut hits = Vec::new();

    let methods: HashSet<&str> = history
        .iter()
        .rev()
        .take(cfg.method_window)
        .map(|s| s.payment_method.as_str())
        .collect();
    if methods.len() >= cfg.method_distinct {
        hits.push(RuleHit {
            alert_type: AlertType::Pattern,
            severity: Severity::Medium,
            description: format!(
                "{} distinct payment methods in the last {} attempts",
                methods.len(),
                cfg.method_window
            ),
        });
    }

    let agents: HashSet<&str> = history
        .iter()
        .rev()
        .filter_map(|s| s.user_agent.as_deref())
        .take(cfg.agent_window)
        .collect();
    if agents.len() >= cfg.agent_distinct {
        hits.push(RuleHit {
            alert_type: AlertType::Device,
            severity: Severity::Medium,
            description: format!(
                "{} distinct user agents in the last {} attempts",
                agents.len(),
                cfg.agent_window
            ),
        });
    }
    Ok(hits)
}

/// Rule 4: IP dispersion — distinct first-two-octet prefixes among the most
/// recent addresses. A coarse locality heuristic, not real geolocation.
fn location_hits(
    cfg: &FraudConfig,
    history: &[AttemptSnapshot],
) -> AggregateResult<Vec<RuleHit>> {
    let prefixes: HashSet<String> = history
        .iter()
        .rev()
        .filter_map(|s| s.ip_address.as_deref())
        .take(cfg.ip_window)
        .map(ip_prefix)
        .collect();

    let mut hits = Vec::new();
    if prefixes.len() >= cfg.ip_prefix_distinct {
        hits.push(RuleHit {
            alert_type: AlertType::Location,
            severity: Severity::Medium,
            description: format!(
                "{} distinct network prefixes in the last {} addresses",
                prefixes.len(),
                cfg.ip_window
            ),
        });
    }
    Ok(hits)
}

/// First two dot-separated octets. A string with fewer segments becomes its
/// own prefix, which keeps non-IPv4 producers coarse but harmless.
fn ip_prefix(ip: &str) -> String {
    let octets: Vec<&str> = ip.split('.').take(2).collect();
    octets.join(".")
}
