use async_trait::async_trait;
use sms_common::{DispatchJob, QueuedJob};

pub mod sqlite;

pub use sqlite::SqliteJobQueue;

pub type Result<T> = std::result::Result<T, QueueError>;

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Receipt not found: {0}")]
    ReceiptNotFound(String),

    #[error("Queue is stopped")]
    Stopped,
}

impl From<sqlx::Error> for QueueError {
    fn from(e: sqlx::Error) -> Self {
        QueueError::Database(e.to_string())
    }
}

/// Trait for publishing dispatch jobs to a queue.
#[async_trait]
pub trait JobPublisher: Send + Sync {
    /// Get the queue identifier
    fn identifier(&self) -> &str;

    /// Publish a job. Publishing the same message id twice is a no-op.
    async fn publish(&self, job: DispatchJob) -> Result<()>;
}

/// Trait for consuming dispatch jobs from a queue.
///
/// Delivery is at-least-once: a job that is polled but never acked becomes
/// visible again after the visibility timeout, and consumers must tolerate
/// duplicate deliveries of the same job.
#[async_trait]
pub trait JobConsumer: Send + Sync {
    /// Get the queue identifier
    fn identifier(&self) -> &str;

    /// Poll for visible jobs, claiming each for the visibility timeout
    async fn poll(&self, max_jobs: u32) -> Result<Vec<QueuedJob>>;

    /// Acknowledge a job (remove from queue)
    async fn ack(&self, receipt_handle: &str) -> Result<()>;

    /// Negative acknowledge a job (make visible again after delay)
    async fn nack(&self, receipt_handle: &str, delay_seconds: Option<u32>) -> Result<()>;

    /// Check if the consumer is healthy
    fn is_healthy(&self) -> bool;

    /// Stop the consumer
    async fn stop(&self);
}

/// Combined consumer and publisher for embedded/dev mode
#[async_trait]
pub trait EmbeddedJobQueue: JobConsumer + JobPublisher {
    /// Initialize the queue schema
    async fn init_schema(&self) -> Result<()>;
}
