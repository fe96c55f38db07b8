//! Producer side of the delivery pipeline
//!
//! Persists accepted messages and hands them to the dispatch queue. The
//! ordering requirement is persist-before-enqueue: no job ever references a
//! message that is not durably recorded.

use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::{metrics, DispatchError, Result};
use sms_common::{DispatchJob, Message};
use sms_queue::JobPublisher;
use sms_store::{MessageStore, NewMessage};

pub struct MessageProducer {
    store: Arc<dyn MessageStore>,
    publisher: Arc<dyn JobPublisher>,
}

impl MessageProducer {
    pub fn new(store: Arc<dyn MessageStore>, publisher: Arc<dyn JobPublisher>) -> Self {
        Self { store, publisher }
    }

    /// Accept a validated submission: persist it as `Pending`, enqueue a
    /// dispatch job for it, and return the persisted message.
    ///
    /// If the store write fails the whole call fails and nothing is enqueued.
    /// If the enqueue fails after a successful persist, the message stays
    /// durably `Pending` with no job in flight and the error names it; there
    /// is no automatic requeue.
    pub async fn accept(&self, new: NewMessage) -> Result<Message> {
        let message = self.store.create(new).await?;

        info!(
            message_id = message.id,
            source = %message.source_address,
            destination = %message.destination_address,
            "Message accepted"
        );
        metrics::record_message_accepted();

        match self.publisher.publish(DispatchJob::new(message.id)).await {
            Ok(()) => {
                debug!(message_id = message.id, "Dispatch job enqueued");
                Ok(message)
            }
            Err(e) => {
                warn!(
                    message_id = message.id,
                    error = %e,
                    "Enqueue failed - message remains PENDING with no job in flight"
                );
                metrics::record_enqueue_failure();
                Err(DispatchError::EnqueueFailed {
                    message_id: message.id,
                    source: e,
                })
            }
        }
    }
}
