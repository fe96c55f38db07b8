//! Metrics for the delivery pipeline
//!
//! Prometheus-compatible counters and histograms covering message intake,
//! job processing, and infrastructure failures.

use metrics::{counter, histogram};
use std::time::Duration;

/// Record a message accepted by the producer
pub fn record_message_accepted() {
    counter!("sms_messages_accepted_total").increment(1);
}

/// Record a persisted message whose job could not be enqueued
pub fn record_enqueue_failure() {
    counter!("sms_enqueue_failures_total").increment(1);
}

/// Record a job resolved to a terminal status
pub fn record_job_processed(delivered: bool, duration: Duration) {
    counter!(
        "sms_jobs_processed_total",
        "delivered" => delivered.to_string()
    )
    .increment(1);

    histogram!("sms_delivery_duration_seconds").record(duration.as_secs_f64());
}

/// Record a job discarded as a no-op (missing or already-resolved message)
pub fn record_job_discarded(reason: &'static str) {
    counter!("sms_jobs_discarded_total", "reason" => reason).increment(1);
}

/// Record a store failure during job processing
pub fn record_store_error(operation: &'static str) {
    counter!("sms_store_errors_total", "operation" => operation).increment(1);
}

/// Record a queue poll error in the worker loop
pub fn record_poll_error() {
    counter!("sms_queue_poll_errors_total").increment(1);
}
