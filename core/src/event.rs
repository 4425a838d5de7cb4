//! The event contract — all producer/aggregator communication.
//!
//! RULE: Aggregators consume ONLY these events.
//! The `kind` discriminant is explicit on the wire; an event's type is never
//! inferred from its shape. Field names below ARE the compatibility surface:
//! a rename silently breaks every consumer, so each event is validated at
//! the boundary and rejected (never defaulted) when malformed.

use crate::{
    error::{AggregateError, AggregateResult},
    types::{CustomerId, EventId, MinorUnits, Timestamp, TransactionId},
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

fn fresh_event_id() -> EventId {
    Uuid::new_v4().to_string()
}

fn unknown_method() -> String {
    "unknown".to_string()
}

/// Every lifecycle event a producer may emit.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PaymentEvent {
    Attempt(TransactionAttempt),
    Completed(TransactionCompleted),
    Success(TransactionSuccess),
}

impl PaymentEvent {
    pub fn event_id(&self) -> &EventId {
        match self {
            Self::Attempt(e) => &e.event_id,
            Self::Completed(e) => &e.event_id,
            Self::Success(e) => &e.event_id,
        }
    }

    pub fn customer_id(&self) -> &CustomerId {
        match self {
            Self::Attempt(e) => &e.customer_id,
            Self::Completed(e) => &e.customer_id,
            Self::Success(e) => &e.customer_id,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Attempt(_) => "attempt",
            Self::Completed(_) => "completed",
            Self::Success(_) => "success",
        }
    }

    pub fn validate(&self) -> AggregateResult<()> {
        match self {
            Self::Attempt(e) => e.validate(),
            Self::Completed(e) => e.validate(),
            Self::Success(e) => e.validate(),
        }
    }
}

/// Record of a transaction request, before the gateway outcome is known.
/// Emitted once per attempt; immutable once emitted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionAttempt {
    /// Idempotency key. Generated when a legacy producer omits it, in which
    /// case replay detection degrades to the at-most-once delivery contract.
    #[serde(default = "fresh_event_id")]
    pub event_id: EventId,
    pub customer_id: CustomerId,
    pub amount: MinorUnits,
    pub currency: String,
    #[serde(default = "unknown_method")]
    pub payment_method: String,
    pub timestamp: Timestamp,
    #[serde(default)]
    pub ip_address: Option<String>,
    #[serde(default)]
    pub user_agent: Option<String>,
}

impl TransactionAttempt {
    /// The real transaction id only exists after the gateway responds, so
    /// alerts raised from an attempt carry this placeholder.
    pub fn placeholder_transaction_id(&self) -> TransactionId {
        format!("pending-{}", self.event_id)
    }

    pub fn validate(&self) -> AggregateResult<()> {
        validate_event_id(&self.event_id)?;
        validate_customer(&self.customer_id)?;
        validate_amount(self.amount)?;
        validate_currency(&self.currency)?;
        validate_method(&self.payment_method)?;
        Ok(())
    }
}

/// Gateway outcome classification. Anything the gateway reports outside the
/// known statuses maps to `Other`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum CompletionStatus {
    Completed,
    Failed,
    Other,
}

impl From<String> for CompletionStatus {
    fn from(raw: String) -> Self {
        match raw.as_str() {
            "completed" => Self::Completed,
            "failed" => Self::Failed,
            _ => Self::Other,
        }
    }
}

impl From<CompletionStatus> for String {
    fn from(status: CompletionStatus) -> Self {
        match status {
            CompletionStatus::Completed => "completed".to_string(),
            CompletionStatus::Failed => "failed".to_string(),
            CompletionStatus::Other => "other".to_string(),
        }
    }
}

/// Record of a transaction's final gateway outcome. Emitted once per attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionCompleted {
    #[serde(default = "fresh_event_id")]
    pub event_id: EventId,
    pub transaction_id: TransactionId,
    pub customer_id: CustomerId,
    pub status: CompletionStatus,
    pub amount: MinorUnits,
    pub currency: String,
    pub processing_fee: MinorUnits,
    #[serde(default = "unknown_method")]
    pub payment_method: String,
    pub timestamp: Timestamp,
}

impl TransactionCompleted {
    pub fn validate(&self) -> AggregateResult<()> {
        validate_event_id(&self.event_id)?;
        validate_transaction(&self.transaction_id)?;
        validate_customer(&self.customer_id)?;
        validate_amount(self.amount)?;
        validate_currency(&self.currency)?;
        validate_fee(self.processing_fee)?;
        validate_method(&self.payment_method)?;
        Ok(())
    }
}

/// Derived from a completion with status `completed`.
/// Exactly one per successful transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionSuccess {
    #[serde(default = "fresh_event_id")]
    pub event_id: EventId,
    pub transaction_id: TransactionId,
    pub customer_id: CustomerId,
    pub amount: MinorUnits,
    pub currency: String,
    pub processing_fee: MinorUnits,
    #[serde(default = "unknown_method")]
    pub payment_method: String,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

impl TransactionSuccess {
    /// Derive the success event from a completed-status completion.
    /// Returns `MalformedEvent` for any other status.
    pub fn from_completed(completed: &TransactionCompleted) -> AggregateResult<Self> {
        if completed.status != CompletionStatus::Completed {
            return Err(AggregateError::malformed(format!(
                "cannot derive success from status {:?} for transaction '{}'",
                completed.status, completed.transaction_id
            )));
        }
        Ok(Self {
            event_id: fresh_event_id(),
            transaction_id: completed.transaction_id.clone(),
            customer_id: completed.customer_id.clone(),
            amount: completed.amount,
            currency: completed.currency.clone(),
            processing_fee: completed.processing_fee,
            payment_method: completed.payment_method.clone(),
            metadata: None,
        })
    }

    pub fn validate(&self) -> AggregateResult<()> {
        validate_event_id(&self.event_id)?;
        validate_transaction(&self.transaction_id)?;
        validate_customer(&self.customer_id)?;
        validate_amount(self.amount)?;
        validate_currency(&self.currency)?;
        validate_fee(self.processing_fee)?;
        validate_method(&self.payment_method)?;
        Ok(())
    }
}

// ── Field validators ─────────────────────────────────────────────────────────

fn validate_event_id(id: &str) -> AggregateResult<()> {
    if id.trim().is_empty() {
        return Err(AggregateError::malformed("empty eventId"));
    }
    Ok(())
}

fn validate_customer(id: &str) -> AggregateResult<()> {
    if id.trim().is_empty() {
        return Err(AggregateError::malformed("empty customerId"));
    }
    Ok(())
}

fn validate_transaction(id: &str) -> AggregateResult<()> {
    if id.trim().is_empty() {
        return Err(AggregateError::malformed("empty transactionId"));
    }
    Ok(())
}

fn validate_amount(amount: MinorUnits) -> AggregateResult<()> {
    if amount <= 0 {
        return Err(AggregateError::malformed(format!(
            "non-positive amount {amount}"
        )));
    }
    Ok(())
}

fn validate_fee(fee: MinorUnits) -> AggregateResult<()> {
    if fee < 0 {
        return Err(AggregateError::malformed(format!(
            "negative processingFee {fee}"
        )));
    }
    Ok(())
}

fn validate_currency(currency: &str) -> AggregateResult<()> {
    if currency.len() != 3 || !currency.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(AggregateError::malformed(format!(
            "invalid currency '{currency}'"
        )));
    }
    Ok(())
}

fn validate_method(method: &str) -> AggregateResult<()> {
    if method.trim().is_empty() {
        return Err(AggregateError::malformed("empty paymentMethod"));
    }
    Ok(())
}
