//! Message service - business operations behind the HTTP handlers
//!
//! Writes go through the producer (persist + enqueue); reads go straight to
//! the store and reflect the latest committed state at call time.

use std::sync::Arc;

use crate::dto::{MessageView, SendMessageRequest};
use crate::error::ApiError;
use crate::validation::validate_submission;
use sms_dispatch::MessageProducer;
use sms_store::{MessageStore, NewMessage};

pub struct MessageService {
    store: Arc<dyn MessageStore>,
    producer: Arc<MessageProducer>,
}

impl MessageService {
    pub fn new(store: Arc<dyn MessageStore>, producer: Arc<MessageProducer>) -> Self {
        Self { store, producer }
    }

    /// Validate and accept a submission for asynchronous delivery.
    pub async fn send_message(
        &self,
        request: SendMessageRequest,
    ) -> Result<MessageView, ApiError> {
        validate_submission(&request).map_err(|errors| ApiError::Validation { errors })?;

        let message = self
            .producer
            .accept(NewMessage {
                source_address: request.source_address,
                destination_address: request.destination_address,
                content: request.content,
            })
            .await?;

        Ok(MessageView::from(message))
    }

    pub async fn get_message(&self, id: i64) -> Result<MessageView, ApiError> {
        self.store
            .get(id)
            .await?
            .map(MessageView::from)
            .ok_or(ApiError::NotFound(id))
    }

    pub async fn list_by_source(&self, address: &str) -> Result<Vec<MessageView>, ApiError> {
        let messages = self.store.find_by_source(address).await?;
        Ok(messages.into_iter().map(MessageView::from).collect())
    }

    pub async fn list_by_destination(
        &self,
        address: &str,
    ) -> Result<Vec<MessageView>, ApiError> {
        let messages = self.store.find_by_destination(address).await?;
        Ok(messages.into_iter().map(MessageView::from).collect())
    }

    /// Messages where the address is sender or recipient.
    pub async fn list_by_participant(
        &self,
        address: &str,
    ) -> Result<Vec<MessageView>, ApiError> {
        let messages = self.store.find_by_participant(address).await?;
        Ok(messages.into_iter().map(MessageView::from).collect())
    }
}
