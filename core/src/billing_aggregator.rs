//! Billing aggregator — charge accumulation and threshold invoicing.
//!
//! Consumes success events only. Each success creates a pending billing
//! record and bumps the customer's open-tab accumulator; when the tab
//! reaches the invoice threshold, every pending record for the customer is
//! marked processed under one invoice id and the tab is deleted. Lifetime
//! totals are kept separately and survive invoicing.
//!
//! Replay safety: a duplicate event id OR an already-billed transaction id
//! is a no-op, so retried deliveries never double-count.

use crate::{
    config::BillingConfig,
    consumer::{Ack, EventConsumer},
    error::{AggregateError, AggregateResult},
    event::{PaymentEvent, TransactionSuccess},
    types::{CustomerId, EventId, InvoiceId, MinorUnits, Timestamp, TransactionId},
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

// ── Data structures ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BillingStatus {
    Pending,
    Processed,
    /// Reserved — never set by current logic.
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BillingRecord {
    pub transaction_id: TransactionId,
    pub customer_id: CustomerId,
    pub amount: MinorUnits,
    pub currency: String,
    pub processing_fee: MinorUnits,
    pub billing_date: Timestamp,
    pub status: BillingStatus,
    pub invoice_id: Option<InvoiceId>,
}

/// The customer's open tab. Deleted when an invoice is generated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomerBillingAccumulator {
    pub customer_id: CustomerId,
    pub total_transactions: u64,
    pub total_amount: MinorUnits,
    pub total_fees: MinorUnits,
    pub last_billing_date: Timestamp,
}

/// Running totals that survive invoicing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomerLifetimeTotals {
    pub customer_id: CustomerId,
    pub total_transactions: u64,
    pub total_amount: MinorUnits,
    pub total_fees: MinorUnits,
    pub invoices_generated: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Invoice {
    pub invoice_id: InvoiceId,
    pub customer_id: CustomerId,
    pub record_count: usize,
    pub total_amount: MinorUnits,
    pub total_fees: MinorUnits,
    pub generated_at: Timestamp,
}

// ── Aggregator ───────────────────────────────────────────────────────────────

pub struct BillingAggregator {
    config: BillingConfig,
    records: HashMap<TransactionId, BillingRecord>,
    accumulators: HashMap<CustomerId, CustomerBillingAccumulator>,
    lifetime: HashMap<CustomerId, CustomerLifetimeTotals>,
    invoices: Vec<Invoice>,
    seen: HashSet<EventId>,
}

impl BillingAggregator {
    pub fn new(config: BillingConfig) -> Self {
        Self {
            config,
            records: HashMap::new(),
            accumulators: HashMap::new(),
            lifetime: HashMap::new(),
            invoices: Vec::new(),
            seen: HashSet::new(),
        }
    }

    /// Record one successful transaction and invoice the customer's tab if
    /// it crossed the threshold. The threshold check runs after every
    /// success, so a customer crosses it exactly once per qualifying event.
    pub fn record_success(&mut self, event: &TransactionSuccess) -> AggregateResult<Ack> {
        event.validate()?;
        if self.seen.contains(&event.event_id) {
            return Ok(Ack::Duplicate);
        }
        if self.records.contains_key(&event.transaction_id) {
            log::debug!(
                "billing: transaction {} already billed, ignoring replay",
                event.transaction_id
            );
            return Ok(Ack::Duplicate);
        }
        // Rejection must leave state untouched, so every overflow check runs
        // before anything is written.
        let tab_prior = self.accumulators.get(&event.customer_id);
        let new_tab_amount = tab_prior
            .map(|t| t.total_amount)
            .unwrap_or(0)
            .checked_add(event.amount)
            .ok_or_else(|| overflow("accumulator amount", &event.customer_id))?;
        let new_tab_fees = tab_prior
            .map(|t| t.total_fees)
            .unwrap_or(0)
            .checked_add(event.processing_fee)
            .ok_or_else(|| overflow("accumulator fee", &event.customer_id))?;
        let lifetime_prior = self.lifetime.get(&event.customer_id);
        let new_lifetime_amount = lifetime_prior
            .map(|l| l.total_amount)
            .unwrap_or(0)
            .checked_add(event.amount)
            .ok_or_else(|| overflow("lifetime amount", &event.customer_id))?;
        let new_lifetime_fees = lifetime_prior
            .map(|l| l.total_fees)
            .unwrap_or(0)
            .checked_add(event.processing_fee)
            .ok_or_else(|| overflow("lifetime fee", &event.customer_id))?;
        self.seen.insert(event.event_id.clone());

        let now = Utc::now();
        self.records.insert(
            event.transaction_id.clone(),
            BillingRecord {
                transaction_id: event.transaction_id.clone(),
                customer_id: event.customer_id.clone(),
                amount: event.amount,
                currency: event.currency.clone(),
                processing_fee: event.processing_fee,
                billing_date: now,
                status: BillingStatus::Pending,
                invoice_id: None,
            },
        );

        let tab = self
            .accumulators
            .entry(event.customer_id.clone())
            .or_insert_with(|| CustomerBillingAccumulator {
                customer_id: event.customer_id.clone(),
                total_transactions: 0,
                total_amount: 0,
                total_fees: 0,
                last_billing_date: now,
            });
        tab.total_transactions += 1;
        tab.total_amount = new_tab_amount;
        tab.total_fees = new_tab_fees;
        tab.last_billing_date = now;

        let lifetime = self
            .lifetime
            .entry(event.customer_id.clone())
            .or_insert_with(|| CustomerLifetimeTotals {
                customer_id: event.customer_id.clone(),
                total_transactions: 0,
                total_amount: 0,
                total_fees: 0,
                invoices_generated: 0,
            });
        lifetime.total_transactions += 1;
        lifetime.total_amount = new_lifetime_amount;
        lifetime.total_fees = new_lifetime_fees;

        if tab.total_amount >= self.config.invoice_threshold {
            self.generate_invoice(&event.customer_id);
        }
        Ok(Ack::Accepted)
    }

    /// Close the customer's tab: one invoice id stamped onto every pending
    /// record, the accumulator removed entirely.
    fn generate_invoice(&mut self, customer_id: &str) {
        let invoice_id: InvoiceId = format!("INV-{}", Uuid::new_v4());
        let mut record_count = 0usize;
        let mut total_amount: MinorUnits = 0;
        let mut total_fees: MinorUnits = 0;
        for record in self
            .records
            .values_mut()
            .filter(|r| r.customer_id == customer_id && r.status == BillingStatus::Pending)
        {
            record.status = BillingStatus::Processed;
            record.invoice_id = Some(invoice_id.clone());
            record_count += 1;
            total_amount += record.amount;
            total_fees += record.processing_fee;
        }
        self.accumulators.remove(customer_id);
        if let Some(lifetime) = self.lifetime.get_mut(customer_id) {
            lifetime.invoices_generated += 1;
        }
        log::info!(
            "billing: invoice {invoice_id} for customer {customer_id}: {record_count} records, \
             {total_amount} minor units"
        );
        self.invoices.push(Invoice {
            invoice_id,
            customer_id: customer_id.to_string(),
            record_count,
            total_amount,
            total_fees,
            generated_at: Utc::now(),
        });
    }

    pub fn billing_record(&self, transaction_id: &str) -> Option<&BillingRecord> {
        self.records.get(transaction_id)
    }

    pub fn accumulator(&self, customer_id: &str) -> Option<&CustomerBillingAccumulator> {
        self.accumulators.get(customer_id)
    }

    pub fn lifetime_totals(&self, customer_id: &str) -> Option<&CustomerLifetimeTotals> {
        self.lifetime.get(customer_id)
    }

    pub fn pending(&self) -> Vec<&BillingRecord> {
        self.records
            .values()
            .filter(|r| r.status == BillingStatus::Pending)
            .collect()
    }

    pub fn invoices(&self) -> &[Invoice] {
        &self.invoices
    }
}

fn overflow(what: &str, customer_id: &str) -> AggregateError {
    AggregateError::InternalCompute(format!("{what} overflow for customer {customer_id}"))
}

impl EventConsumer for BillingAggregator {
    fn name(&self) -> &'static str {
        "billing"
    }

    fn apply(&mut self, event: &PaymentEvent) -> AggregateResult<Ack> {
        match event {
            PaymentEvent::Success(success) => self.record_success(success),
            _ => Ok(Ack::Skipped),
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
