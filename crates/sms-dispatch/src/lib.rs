//! Asynchronous delivery pipeline: producer, simulated carrier gateway, and
//! the queue-driven delivery worker.

pub mod gateway;
pub mod metrics;
pub mod producer;
pub mod worker;

pub use gateway::{CarrierGateway, SimulatedGateway, FAILURE_REASONS};
pub use producer::MessageProducer;
pub use worker::{DeliveryWorker, DeliveryWorkerConfig};

use sms_queue::QueueError;
use sms_store::StoreError;

pub type Result<T> = std::result::Result<T, DispatchError>;

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Message {message_id} persisted but enqueue failed: {source}")]
    EnqueueFailed {
        message_id: i64,
        source: QueueError,
    },
}
