//! Carrier gateway simulation
//!
//! Stands in for a real SMS carrier: a bounded random network delay followed
//! by a weighted success/failure draw. Failures carry a carrier-style reason
//! from a fixed catalog.

use async_trait::async_trait;
use rand::Rng;
use std::ops::Range;
use std::time::Duration;
use tracing::debug;

use sms_common::{DeliveryOutcome, Message};

/// Carrier-style error strings for simulated delivery failures.
pub const FAILURE_REASONS: [&str; 6] = [
    "Destination number not reachable",
    "Network timeout",
    "Invalid destination number",
    "Carrier rejected message",
    "Insufficient balance",
    "Message blocked by carrier",
];

/// Trait for handing a message to a carrier.
#[async_trait]
pub trait CarrierGateway: Send + Sync {
    async fn send(&self, message: &Message) -> DeliveryOutcome;
}

/// Simulated gateway with configurable success rate and latency window.
pub struct SimulatedGateway {
    success_rate: f64,
    latency_ms: Range<u64>,
}

impl SimulatedGateway {
    /// Production-shaped defaults: 80% success, 100-500ms round-trip.
    pub fn new() -> Self {
        Self::with_config(0.8, 100..500)
    }

    pub fn with_config(success_rate: f64, latency_ms: Range<u64>) -> Self {
        Self {
            success_rate,
            latency_ms,
        }
    }
}

impl Default for SimulatedGateway {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CarrierGateway for SimulatedGateway {
    async fn send(&self, message: &Message) -> DeliveryOutcome {
        // Draw everything up front; ThreadRng is not Send across the sleep.
        let (delay_ms, success, reason_index) = {
            let mut rng = rand::thread_rng();
            let delay_ms = if self.latency_ms.is_empty() {
                0
            } else {
                rng.gen_range(self.latency_ms.clone())
            };
            (
                delay_ms,
                rng.gen::<f64>() < self.success_rate,
                rng.gen_range(0..FAILURE_REASONS.len()),
            )
        };

        tokio::time::sleep(Duration::from_millis(delay_ms)).await;

        if success {
            debug!(
                message_id = message.id,
                delay_ms = delay_ms,
                "Carrier accepted message"
            );
            DeliveryOutcome::Delivered
        } else {
            let reason = FAILURE_REASONS[reason_index];
            debug!(
                message_id = message.id,
                delay_ms = delay_ms,
                reason = %reason,
                "Carrier rejected message"
            );
            DeliveryOutcome::Failed {
                reason: reason.to_string(),
            }
        }
    }
}
