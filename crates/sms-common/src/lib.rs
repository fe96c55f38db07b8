use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub mod logging;

// ============================================================================
// Message Entity & Status Machine
// ============================================================================

/// Lifecycle status of a message.
///
/// Transitions are one-way: `Pending` resolves to exactly one of `Delivered`
/// or `Failed`, and neither terminal state transitions further.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageStatus {
    /// Accepted and persisted, waiting for the delivery worker
    Pending,
    /// Carrier accepted the message
    Delivered,
    /// Carrier rejected the message; `failure_reason` explains why
    Failed,
}

impl MessageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageStatus::Pending => "PENDING",
            MessageStatus::Delivered => "DELIVERED",
            MessageStatus::Failed => "FAILED",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(MessageStatus::Pending),
            "DELIVERED" => Some(MessageStatus::Delivered),
            "FAILED" => Some(MessageStatus::Failed),
            _ => None,
        }
    }

    /// Terminal states accept no further transition.
    pub fn is_terminal(&self) -> bool {
        matches!(self, MessageStatus::Delivered | MessageStatus::Failed)
    }

    /// Whether a transition from `self` to `next` is allowed.
    pub fn can_transition_to(&self, next: MessageStatus) -> bool {
        *self == MessageStatus::Pending && next.is_terminal()
    }
}

impl std::fmt::Display for MessageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A persisted SMS message.
///
/// `id` is assigned by the store at creation and never changes. `updated_at`
/// moves forward on every status transition; `created_at` never does.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: i64,
    pub source_address: String,
    pub destination_address: String,
    pub content: String,
    pub status: MessageStatus,
    /// Present iff `status == Failed`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Terminal resolution applied to a `Pending` message by the delivery worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered,
    Failed { reason: String },
}

impl DeliveryOutcome {
    pub fn status(&self) -> MessageStatus {
        match self {
            DeliveryOutcome::Delivered => MessageStatus::Delivered,
            DeliveryOutcome::Failed { .. } => MessageStatus::Failed,
        }
    }

    pub fn failure_reason(&self) -> Option<&str> {
        match self {
            DeliveryOutcome::Delivered => None,
            DeliveryOutcome::Failed { reason } => Some(reason),
        }
    }
}

// ============================================================================
// Dispatch Job Types
// ============================================================================

/// Queue payload referencing a persisted message.
///
/// The queue is a notification channel, not a data channel: the worker always
/// re-fetches authoritative state from the store by this id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DispatchJob {
    pub message_id: i64,
}

impl DispatchJob {
    pub fn new(message_id: i64) -> Self {
        Self { message_id }
    }
}

/// A job received from the queue with its delivery tracking metadata.
#[derive(Debug, Clone)]
pub struct QueuedJob {
    pub job: DispatchJob,
    pub receipt_handle: String,
    pub queue_identifier: String,
    /// How many times this job has been delivered (1 on first delivery)
    pub receive_count: u32,
}
