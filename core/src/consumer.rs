//! EventConsumer trait — the contract every aggregator fulfills.
//!
//! RULE: The pipeline delivers each event to every registered consumer.
//! A consumer subscribes to the event kinds it cares about and answers
//! `Skipped` for the rest. Consumers never call each other.

use crate::{error::AggregateResult, event::PaymentEvent};
use std::any::Any;

/// Per-consumer outcome of applying one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ack {
    /// Event applied in full.
    Accepted,
    /// Event applied, but one or more internal steps failed and were
    /// logged. Derived state may lag until the producer retries.
    Degraded(Vec<String>),
    /// Event id already seen; state untouched.
    Duplicate,
    /// Consumer does not subscribe to this event kind.
    Skipped,
}

pub trait EventConsumer: Send {
    /// Unique stable name for this consumer.
    fn name(&self) -> &'static str;

    /// Apply one event. `Err` means rejected: the consumer's state is
    /// unchanged and the producer should treat delivery as failed.
    fn apply(&mut self, event: &PaymentEvent) -> AggregateResult<Ack>;

    /// For downcasting in tests and tooling only.
    fn as_any(&self) -> &dyn Any;
}
