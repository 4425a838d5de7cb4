//! Shared primitive types used across all aggregators.

/// A stable, unique identifier for a customer.
pub type CustomerId = String;

/// Gateway-assigned transaction identifier. Unknown until completion;
/// attempts carry a placeholder derived from the event id.
pub type TransactionId = String;

/// Idempotency key carried by every event.
pub type EventId = String;

/// Unique identifier of a fraud alert.
pub type AlertId = String;

/// Unique identifier of a generated invoice.
pub type InvoiceId = String;

/// Monetary amount in minor currency units. Never floating point.
pub type MinorUnits = i64;

/// All event and derived-state timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;
