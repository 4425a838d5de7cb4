//! Sharded routing — per-customer ordering across threads.
//!
//! Every event for a given customer lands on the same shard, whose
//! `Mutex<Pipeline>` serializes application; different customers hash to
//! different shards and proceed fully in parallel. Windowed and averaging
//! computations are order-sensitive, so this discipline is required, not an
//! optimization.

use crate::{
    analytics_aggregator::CustomerAnalytics,
    billing_aggregator::BillingRecord,
    config::PipelineConfig,
    error::{AggregateError, AggregateResult},
    event::PaymentEvent,
    fraud_aggregator::FraudAlert,
    pipeline::{Delivery, Pipeline},
};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Mutex;

pub struct ShardedRouter {
    shards: Vec<Mutex<Pipeline>>,
}

impl ShardedRouter {
    pub fn new(config: PipelineConfig, shard_count: usize) -> Self {
        let shard_count = shard_count.max(1);
        Self {
            shards: (0..shard_count)
                .map(|_| Mutex::new(Pipeline::new(config.clone())))
                .collect(),
        }
    }

    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    fn shard_index(&self, customer_id: &str) -> usize {
        let mut hasher = DefaultHasher::new();
        customer_id.hash(&mut hasher);
        (hasher.finish() % self.shards.len() as u64) as usize
    }

    /// Publish one event on its customer's shard.
    pub fn publish(&self, event: &PaymentEvent) -> AggregateResult<Delivery> {
        event.validate()?;
        let shard = &self.shards[self.shard_index(event.customer_id())];
        let mut pipeline = shard
            .lock()
            .map_err(|_| AggregateError::InternalCompute("poisoned shard lock".into()))?;
        pipeline.publish(event)
    }

    /// Run a read against the shard owning this customer's state.
    pub fn with_customer<R>(
        &self,
        customer_id: &str,
        read: impl FnOnce(&Pipeline) -> R,
    ) -> AggregateResult<R> {
        let shard = &self.shards[self.shard_index(customer_id)];
        let pipeline = shard
            .lock()
            .map_err(|_| AggregateError::InternalCompute("poisoned shard lock".into()))?;
        Ok(read(&pipeline))
    }

    // ── Cross-shard queries (snapshot clones, shard by shard) ──────────

    pub fn high_risk_customers(&self) -> AggregateResult<Vec<CustomerAnalytics>> {
        self.collect(|p| {
            p.analytics()
                .high_risk_customers()
                .into_iter()
                .cloned()
                .collect()
        })
    }

    pub fn pending_billing(&self) -> AggregateResult<Vec<BillingRecord>> {
        self.collect(|p| p.billing().pending().into_iter().cloned().collect())
    }

    pub fn alerts(&self) -> AggregateResult<Vec<FraudAlert>> {
        self.collect(|p| p.fraud().alerts(None))
    }

    fn collect<T>(
        &self,
        read: impl Fn(&Pipeline) -> Vec<T>,
    ) -> AggregateResult<Vec<T>> {
        let mut out = Vec::new();
        for shard in &self.shards {
            let pipeline = shard
                .lock()
                .map_err(|_| AggregateError::InternalCompute("poisoned shard lock".into()))?;
            out.extend(read(&pipeline));
        }
        Ok(out)
    }
}
