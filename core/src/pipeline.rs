//! The delivery pipeline — fans one event out to every aggregator.
//!
//! DELIVERY ORDER (fixed, documented): fraud, analytics, billing.
//! The contract requires no ordering between aggregators — each depends
//! only on receiving every event — but a fixed order keeps runs
//! reproducible.
//!
//! RULES:
//!   - Boundary validation happens once, before fan-out. A malformed event
//!     reaches no aggregator.
//!   - There is no transaction spanning the three updates: a rejection by
//!     one consumer is recorded in the Delivery and the remaining consumers
//!     still receive the event.
//!   - Callers hold `&mut Pipeline`, so events applied through one pipeline
//!     are serialized; see router.rs for per-customer parallelism.

use crate::{
    analytics_aggregator::AnalyticsAggregator,
    billing_aggregator::BillingAggregator,
    config::PipelineConfig,
    consumer::{Ack, EventConsumer},
    error::AggregateResult,
    event::PaymentEvent,
    fraud_aggregator::FraudAggregator,
    types::EventId,
};

/// Per-consumer outcome as reported to the producer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryStatus {
    Accepted,
    Degraded(Vec<String>),
    Duplicate,
    Skipped,
    /// The consumer refused the event; its state is unchanged.
    Rejected(String),
}

impl From<Ack> for DeliveryStatus {
    fn from(ack: Ack) -> Self {
        match ack {
            Ack::Accepted => Self::Accepted,
            Ack::Degraded(warnings) => Self::Degraded(warnings),
            Ack::Duplicate => Self::Duplicate,
            Ack::Skipped => Self::Skipped,
        }
    }
}

/// Outcome of publishing one event, per consumer.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub event_id: EventId,
    pub statuses: Vec<(&'static str, DeliveryStatus)>,
}

impl Delivery {
    /// True when no consumer rejected or degraded the event.
    pub fn clean(&self) -> bool {
        self.statuses.iter().all(|(_, s)| {
            !matches!(s, DeliveryStatus::Rejected(_) | DeliveryStatus::Degraded(_))
        })
    }

    pub fn status_of(&self, consumer: &str) -> Option<&DeliveryStatus> {
        self.statuses
            .iter()
            .find(|(name, _)| *name == consumer)
            .map(|(_, s)| s)
    }
}

pub struct Pipeline {
    fraud: FraudAggregator,
    analytics: AnalyticsAggregator,
    billing: BillingAggregator,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            fraud: FraudAggregator::new(config.fraud),
            analytics: AnalyticsAggregator::new(config.analytics),
            billing: BillingAggregator::new(config.billing),
        }
    }

    /// Deliver one event to every consumer. `Err` only for events rejected
    /// at the boundary, before any consumer saw them.
    pub fn publish(&mut self, event: &PaymentEvent) -> AggregateResult<Delivery> {
        event.validate()?;

        let consumers: [&mut dyn EventConsumer; 3] =
            [&mut self.fraud, &mut self.analytics, &mut self.billing];
        let mut statuses = Vec::with_capacity(consumers.len());
        for consumer in consumers {
            let name = consumer.name();
            let status = match consumer.apply(event) {
                Ok(ack) => DeliveryStatus::from(ack),
                Err(e) => {
                    log::warn!(
                        "{name}: rejected {} event {}: {e}",
                        event.kind(),
                        event.event_id()
                    );
                    DeliveryStatus::Rejected(e.to_string())
                }
            };
            statuses.push((name, status));
        }
        Ok(Delivery {
            event_id: event.event_id().clone(),
            statuses,
        })
    }

    // ── Query API ──────────────────────────────────────────────────────

    pub fn fraud(&self) -> &FraudAggregator {
        &self.fraud
    }

    pub fn fraud_mut(&mut self) -> &mut FraudAggregator {
        &mut self.fraud
    }

    pub fn analytics(&self) -> &AnalyticsAggregator {
        &self.analytics
    }

    pub fn billing(&self) -> &BillingAggregator {
        &self.billing
    }
}
