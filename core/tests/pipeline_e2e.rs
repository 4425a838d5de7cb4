//! End-to-end pipeline tests: fan-out, boundary rejection, per-consumer
//! delivery statuses, and sharded routing.

use chrono::{Duration, TimeZone, Utc};
use paywatch_core::billing_aggregator::BillingStatus;
use paywatch_core::config::PipelineConfig;
use paywatch_core::error::AggregateError;
use paywatch_core::event::{
    CompletionStatus, PaymentEvent, TransactionAttempt, TransactionCompleted, TransactionSuccess,
};
use paywatch_core::pipeline::{DeliveryStatus, Pipeline};
use paywatch_core::router::ShardedRouter;
use paywatch_core::types::Timestamp;

fn base_time() -> Timestamp {
    Utc.with_ymd_and_hms(2026, 8, 1, 10, 0, 0).unwrap()
}

fn attempt(event_id: &str, customer: &str, amount: i64, timestamp: Timestamp) -> PaymentEvent {
    PaymentEvent::Attempt(TransactionAttempt {
        event_id: event_id.into(),
        customer_id: customer.into(),
        amount,
        currency: "USD".into(),
        payment_method: "card".into(),
        timestamp,
        ip_address: None,
        user_agent: None,
    })
}

/// Spec scenario: attempt(5000 USD) -> completed(fee 175) -> success gives
/// one analytics entry with one transaction, zero fraud alerts, and one
/// pending billing record.
#[test]
fn normal_lifecycle_flows_through_all_aggregators() {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut pipeline = Pipeline::new(PipelineConfig::default());
    let t0 = base_time();

    let delivery = pipeline.publish(&attempt("ev-1", "cust-x", 5_000, t0)).unwrap();
    assert!(delivery.clean());
    assert_eq!(delivery.status_of("fraud"), Some(&DeliveryStatus::Accepted));
    assert_eq!(delivery.status_of("analytics"), Some(&DeliveryStatus::Accepted));
    assert_eq!(delivery.status_of("billing"), Some(&DeliveryStatus::Skipped));

    let completed = TransactionCompleted {
        event_id: "ev-2".into(),
        transaction_id: "txn-1".into(),
        customer_id: "cust-x".into(),
        status: CompletionStatus::Completed,
        amount: 5_000,
        currency: "USD".into(),
        processing_fee: 175,
        payment_method: "card".into(),
        timestamp: t0 + Duration::seconds(3),
    };
    let delivery = pipeline
        .publish(&PaymentEvent::Completed(completed.clone()))
        .unwrap();
    assert!(delivery.clean());

    let success = TransactionSuccess::from_completed(&completed).unwrap();
    let delivery = pipeline.publish(&PaymentEvent::Success(success)).unwrap();
    assert!(delivery.clean());
    assert_eq!(delivery.status_of("fraud"), Some(&DeliveryStatus::Skipped));

    let analytics = pipeline.analytics().customer_analytics("cust-x").unwrap();
    assert_eq!(analytics.total_transactions, 1);
    assert!(
        pipeline.fraud().alerts(Some("cust-x")).is_empty(),
        "a single normal transaction raises no alerts"
    );
    let record = pipeline.billing().billing_record("txn-1").unwrap();
    assert_eq!(record.status, BillingStatus::Pending);
    assert_eq!(record.amount, 5_000);
    assert_eq!(record.processing_fee, 175);
}

#[test]
fn malformed_event_is_rejected_before_fan_out() {
    let mut pipeline = Pipeline::new(PipelineConfig::default());
    let bad_currency = PaymentEvent::Attempt(TransactionAttempt {
        event_id: "ev-bad".into(),
        customer_id: "cust-y".into(),
        amount: 5_000,
        currency: "US".into(),
        payment_method: "card".into(),
        timestamp: base_time(),
        ip_address: None,
        user_agent: None,
    });

    let err = pipeline.publish(&bad_currency).unwrap_err();
    assert!(matches!(err, AggregateError::MalformedEvent { .. }));
    assert!(
        pipeline.analytics().customer_analytics("cust-y").is_none(),
        "no aggregator may see a rejected event"
    );
}

#[test]
fn consumer_rejection_does_not_abort_delivery() {
    let mut pipeline = Pipeline::new(PipelineConfig::default());

    // Completion without a prior attempt: analytics rejects, the event is
    // still offered to the other consumers.
    let orphan = PaymentEvent::Completed(TransactionCompleted {
        event_id: "ev-orphan".into(),
        transaction_id: "txn-orphan".into(),
        customer_id: "cust-z".into(),
        status: CompletionStatus::Failed,
        amount: 1_000,
        currency: "USD".into(),
        processing_fee: 10,
        payment_method: "card".into(),
        timestamp: base_time(),
    });

    let delivery = pipeline.publish(&orphan).unwrap();
    assert!(!delivery.clean());
    assert!(matches!(
        delivery.status_of("analytics"),
        Some(DeliveryStatus::Rejected(_))
    ));
    assert_eq!(delivery.status_of("fraud"), Some(&DeliveryStatus::Skipped));
    assert_eq!(delivery.status_of("billing"), Some(&DeliveryStatus::Skipped));
}

#[test]
fn heuristic_failure_surfaces_as_degraded_delivery() {
    let mut pipeline = Pipeline::new(PipelineConfig::default());
    let t0 = base_time();

    // An extreme first amount makes the fraud spike-cutoff multiply
    // overflow on the next attempt; the delivery reports the degradation
    // while the other consumers proceed normally.
    pipeline
        .publish(&attempt("ev-huge", "cust-w", i64::MAX / 5, t0))
        .unwrap();
    let delivery = pipeline
        .publish(&attempt("ev-after", "cust-w", 100, t0 + Duration::hours(2)))
        .unwrap();

    assert!(!delivery.clean());
    match delivery.status_of("fraud") {
        Some(DeliveryStatus::Degraded(warnings)) => {
            assert!(warnings[0].starts_with("amount:"), "got {warnings:?}");
        }
        other => panic!("expected degraded fraud delivery, got {other:?}"),
    }
    assert_eq!(
        delivery.status_of("analytics"),
        Some(&DeliveryStatus::Accepted),
        "degradation in one consumer must not touch the others"
    );
}

#[test]
fn sharded_router_keeps_customers_independent() {
    let router = ShardedRouter::new(PipelineConfig::default(), 4);
    let t0 = base_time();

    // Concurrent producers, one customer each. Attempts are spaced 20
    // minutes apart so no velocity window trips.
    std::thread::scope(|scope| {
        for customer in ["cust-a", "cust-b", "cust-c", "cust-d"] {
            let router = &router;
            scope.spawn(move || {
                for n in 0..6u64 {
                    let event = attempt(
                        &format!("ev-{customer}-{n}"),
                        customer,
                        1_000,
                        t0 + Duration::minutes(20 * n as i64),
                    );
                    router.publish(&event).unwrap();
                }
            });
        }
    });

    for customer in ["cust-a", "cust-b", "cust-c", "cust-d"] {
        let total = router
            .with_customer(customer, |p| {
                p.analytics()
                    .customer_analytics(customer)
                    .map(|a| a.total_transactions)
            })
            .unwrap();
        assert_eq!(total, Some(6), "all events for {customer} applied in order");
    }
    assert!(router.alerts().unwrap().is_empty());
    assert!(router.high_risk_customers().unwrap().is_empty());
    assert!(router.pending_billing().unwrap().is_empty());
}
