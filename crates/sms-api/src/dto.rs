use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use sms_common::{Message, MessageStatus};

/// Incoming send request.
///
/// Fields default to empty so that missing keys surface as validation errors
/// with proper messages instead of a bare deserialization failure.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageRequest {
    #[serde(default)]
    pub source_address: String,
    #[serde(default)]
    pub destination_address: String,
    #[serde(default)]
    pub content: String,
}

/// Message representation returned to clients.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageView {
    pub id: i64,
    pub source_address: String,
    pub destination_address: String,
    pub content: String,
    pub status: MessageStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Message> for MessageView {
    fn from(message: Message) -> Self {
        Self {
            id: message.id,
            source_address: message.source_address,
            destination_address: message.destination_address,
            content: message.content,
            status: message.status,
            failure_reason: message.failure_reason,
            created_at: message.created_at,
            updated_at: message.updated_at,
        }
    }
}
