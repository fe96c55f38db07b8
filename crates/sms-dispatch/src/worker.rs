//! Delivery worker - consumer side of the pipeline
//!
//! Polls the dispatch queue and resolves each referenced message against the
//! store. Jobs are processed on spawned tasks behind a semaphore, so the
//! simulated carrier latency never blocks unrelated jobs or the poll loop.
//!
//! Processing is idempotent under at-least-once redelivery: a job whose
//! message is missing or already terminal is discarded, and the terminal
//! transition itself is a compare-and-swap in the store, so duplicate
//! concurrent deliveries commit at most one outcome.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, Semaphore};
use tracing::{debug, error, info, warn};

use crate::gateway::CarrierGateway;
use crate::metrics;
use sms_common::{DeliveryOutcome, MessageStatus, QueuedJob};
use sms_queue::{JobConsumer, QueueError};
use sms_store::MessageStore;

#[derive(Debug, Clone)]
pub struct DeliveryWorkerConfig {
    /// Maximum jobs processed concurrently
    pub concurrency: usize,
    /// Maximum jobs claimed per poll
    pub max_batch: u32,
    /// Sleep between polls when the queue is empty or erroring
    pub poll_interval: Duration,
    /// Redelivery delay applied when a job is NACKed
    pub nack_delay_seconds: u32,
}

impl Default for DeliveryWorkerConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            max_batch: 10,
            poll_interval: Duration::from_millis(250),
            nack_delay_seconds: 5,
        }
    }
}

/// What to tell the queue about a processed job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum JobAction {
    Ack,
    Nack,
}

pub struct DeliveryWorker {
    store: Arc<dyn MessageStore>,
    consumer: Arc<dyn JobConsumer>,
    gateway: Arc<dyn CarrierGateway>,
    config: DeliveryWorkerConfig,
    semaphore: Arc<Semaphore>,
    shutdown_tx: broadcast::Sender<()>,
}

impl DeliveryWorker {
    pub fn new(
        store: Arc<dyn MessageStore>,
        consumer: Arc<dyn JobConsumer>,
        gateway: Arc<dyn CarrierGateway>,
        config: DeliveryWorkerConfig,
    ) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        let semaphore = Arc::new(Semaphore::new(config.concurrency));
        Self {
            store,
            consumer,
            gateway,
            config,
            semaphore,
            shutdown_tx,
        }
    }

    /// Sender that can signal shutdown from another task.
    pub fn shutdown_sender(&self) -> broadcast::Sender<()> {
        self.shutdown_tx.clone()
    }

    /// Signal the poll loop to exit.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Run the poll loop until shutdown or the queue stops.
    pub async fn run(&self) {
        info!(
            queue = %self.consumer.identifier(),
            concurrency = self.config.concurrency,
            "Delivery worker started"
        );

        let mut shutdown_rx = self.shutdown_tx.subscribe();

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    info!("Delivery worker shutting down");
                    break;
                }
                polled = self.consumer.poll(self.config.max_batch) => {
                    match polled {
                        Ok(jobs) => {
                            if jobs.is_empty() {
                                tokio::time::sleep(self.config.poll_interval).await;
                                continue;
                            }
                            for queued in jobs {
                                self.dispatch_job(queued).await;
                            }
                        }
                        Err(QueueError::Stopped) => {
                            info!("Queue stopped, delivery worker exiting");
                            break;
                        }
                        Err(e) => {
                            error!(error = %e, "Queue poll failed");
                            metrics::record_poll_error();
                            tokio::time::sleep(self.config.poll_interval).await;
                        }
                    }
                }
            }
        }
    }

    /// Spawn a processing task for one claimed job.
    ///
    /// Each job is isolated on its own task: if processing dies without
    /// reaching an ack or nack, the queue's visibility timeout redelivers the
    /// job rather than losing it.
    async fn dispatch_job(&self, queued: QueuedJob) {
        let permit = match self.semaphore.clone().acquire_owned().await {
            Ok(p) => p,
            Err(_) => {
                error!("Worker semaphore closed");
                return;
            }
        };

        let store = self.store.clone();
        let consumer = self.consumer.clone();
        let gateway = self.gateway.clone();
        let nack_delay = self.config.nack_delay_seconds;

        tokio::spawn(async move {
            let _permit = permit;
            let receipt_handle = queued.receipt_handle.clone();

            let action = process_job(store.as_ref(), gateway.as_ref(), &queued).await;

            match action {
                JobAction::Ack => {
                    if let Err(e) = consumer.ack(&receipt_handle).await {
                        warn!(
                            receipt_handle = %receipt_handle,
                            error = %e,
                            "ACK failed - job may redeliver as a no-op"
                        );
                    }
                }
                JobAction::Nack => {
                    if let Err(e) = consumer.nack(&receipt_handle, Some(nack_delay)).await {
                        warn!(
                            receipt_handle = %receipt_handle,
                            error = %e,
                            "NACK failed - job reappears after visibility timeout"
                        );
                    }
                }
            }
        });
    }
}

/// Resolve one job against the store.
async fn process_job(
    store: &dyn MessageStore,
    gateway: &dyn CarrierGateway,
    queued: &QueuedJob,
) -> JobAction {
    let message_id = queued.job.message_id;

    if queued.receive_count > 1 {
        debug!(
            message_id = message_id,
            receive_count = queued.receive_count,
            "Processing redelivered job"
        );
    }

    let start = Instant::now();

    let message = match store.get(message_id).await {
        Ok(m) => m,
        Err(e) => {
            error!(
                message_id = message_id,
                error = %e,
                "Store fetch failed - leaving job for redelivery"
            );
            metrics::record_store_error("fetch");
            return JobAction::Nack;
        }
    };

    let Some(message) = message else {
        warn!(message_id = message_id, "Message not found, discarding job");
        metrics::record_job_discarded("missing");
        return JobAction::Ack;
    };

    if message.status != MessageStatus::Pending {
        debug!(
            message_id = message_id,
            status = %message.status,
            "Message already resolved, discarding duplicate job"
        );
        metrics::record_job_discarded("already_resolved");
        return JobAction::Ack;
    }

    let outcome = gateway.send(&message).await;

    match store.resolve(message_id, &outcome).await {
        Ok(true) => {
            match &outcome {
                DeliveryOutcome::Delivered => {
                    info!(message_id = message_id, "Message delivered");
                }
                DeliveryOutcome::Failed { reason } => {
                    warn!(message_id = message_id, reason = %reason, "Message delivery failed");
                }
            }
            metrics::record_job_processed(
                matches!(outcome, DeliveryOutcome::Delivered),
                start.elapsed(),
            );
            JobAction::Ack
        }
        Ok(false) => {
            debug!(
                message_id = message_id,
                "Another worker resolved this message first"
            );
            metrics::record_job_discarded("lost_race");
            JobAction::Ack
        }
        Err(e) => {
            error!(
                message_id = message_id,
                error = %e,
                "Store update failed - leaving job for redelivery"
            );
            metrics::record_store_error("resolve");
            JobAction::Nack
        }
    }
}
