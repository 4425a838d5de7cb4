//! paywatch-core: payment-transaction lifecycle aggregation.
//!
//! Three independent aggregators consume the same logical event feed and
//! derive per-customer operational state:
//!   - fraud:     windowed heuristics over attempt history, alerting
//!   - analytics: running totals, method histogram, trend window, risk tier
//!   - billing:   charge accumulation and threshold-triggered invoicing
//!
//! RULES:
//!   - Aggregators communicate ONLY through events.
//!   - An aggregator never calls another aggregator or reads its state.
//!   - Events for the same customer are applied strictly in arrival order;
//!     different customers may proceed in parallel (see router.rs).

pub mod analytics_aggregator;
pub mod billing_aggregator;
pub mod config;
pub mod consumer;
pub mod error;
pub mod event;
pub mod fraud_aggregator;
pub mod pipeline;
pub mod router;
pub mod types;
