//! feed-runner: headless event-feed driver for paywatch.
//!
//! Usage:
//!   feed-runner --input events.jsonl --shards 4
//!   cat events.jsonl | feed-runner --config thresholds.json --derive-success
//!
//! Reads one JSON event per line, publishes each through the sharded
//! pipeline, and prints a delivery summary as JSON on stdout.

use anyhow::{Context, Result};
use paywatch_core::{
    config::PipelineConfig,
    event::{CompletionStatus, PaymentEvent, TransactionSuccess},
    pipeline::DeliveryStatus,
    router::ShardedRouter,
};
use std::env;
use std::fs::File;
use std::io::{self, BufRead, BufReader};

#[derive(Default, serde::Serialize)]
struct FeedSummary {
    events: u64,
    accepted: u64,
    degraded: u64,
    duplicates: u64,
    rejected: u64,
    malformed: u64,
    derived_successes: u64,
    fraud_alerts: usize,
    high_risk_customers: usize,
    pending_billing_records: usize,
}

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let shards = parse_arg(&args, "--shards", 1usize);
    let derive_success = args.iter().any(|a| a == "--derive-success");
    let config = match args.windows(2).find(|w| w[0] == "--config") {
        Some(w) => PipelineConfig::from_json_file(&w[1])
            .with_context(|| format!("loading config {}", w[1]))?,
        None => PipelineConfig::default(),
    };

    let reader: Box<dyn BufRead> = match args.windows(2).find(|w| w[0] == "--input") {
        Some(w) => Box::new(BufReader::new(
            File::open(&w[1]).with_context(|| format!("opening {}", w[1]))?,
        )),
        None => Box::new(BufReader::new(io::stdin())),
    };

    let router = ShardedRouter::new(config, shards);
    let mut summary = FeedSummary::default();

    for (line_no, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        summary.events += 1;

        let event: PaymentEvent = match serde_json::from_str(&line) {
            Ok(event) => event,
            Err(e) => {
                log::warn!("line {}: unparseable event: {e}", line_no + 1);
                summary.malformed += 1;
                continue;
            }
        };

        publish(&router, &event, &mut summary);

        if derive_success {
            if let PaymentEvent::Completed(completed) = &event {
                if completed.status == CompletionStatus::Completed {
                    match TransactionSuccess::from_completed(completed) {
                        Ok(success) => {
                            summary.derived_successes += 1;
                            publish(&router, &PaymentEvent::Success(success), &mut summary);
                        }
                        Err(e) => log::warn!("line {}: {e}", line_no + 1),
                    }
                }
            }
        }
    }

    summary.fraud_alerts = router.alerts()?.len();
    summary.high_risk_customers = router.high_risk_customers()?.len();
    summary.pending_billing_records = router.pending_billing()?.len();

    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

fn publish(router: &ShardedRouter, event: &PaymentEvent, summary: &mut FeedSummary) {
    match router.publish(event) {
        Ok(delivery) => {
            for (consumer, status) in &delivery.statuses {
                match status {
                    DeliveryStatus::Accepted => summary.accepted += 1,
                    DeliveryStatus::Degraded(warnings) => {
                        summary.degraded += 1;
                        log::warn!("{consumer}: degraded event {}: {warnings:?}", delivery.event_id);
                    }
                    DeliveryStatus::Duplicate => summary.duplicates += 1,
                    DeliveryStatus::Rejected(reason) => {
                        summary.rejected += 1;
                        log::warn!("{consumer}: rejected event {}: {reason}", delivery.event_id);
                    }
                    DeliveryStatus::Skipped => {}
                }
            }
        }
        Err(e) => {
            summary.malformed += 1;
            log::warn!("boundary rejected event {}: {e}", event.event_id());
        }
    }
}

fn parse_arg<T: std::str::FromStr>(args: &[String], flag: &str, default: T) -> T {
    args.windows(2)
        .find(|w| w[0] == flag)
        .and_then(|w| w[1].parse().ok())
        .unwrap_or(default)
}
