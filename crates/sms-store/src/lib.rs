use async_trait::async_trait;
use sms_common::{DeliveryOutcome, Message, MessageStatus};

pub mod sqlite;

pub use sqlite::SqliteMessageStore;

pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Corrupt record: {0}")]
    Corrupt(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        StoreError::Database(e.to_string())
    }
}

/// Fields supplied by the caller when a message is accepted.
///
/// Addresses and content are validated upstream; the store treats them as
/// opaque strings.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub source_address: String,
    pub destination_address: String,
    pub content: String,
}

/// Durable keyed storage for `Message` records.
///
/// The store assigns ids and owns all status mutation. `resolve` is the only
/// write after creation, and it is conditional on the record still being
/// `Pending`, which serializes concurrent terminal transitions without any
/// external locking.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Persist a new message in `Pending` state and assign its id.
    async fn create(&self, new: NewMessage) -> Result<Message>;

    /// Fetch a message by id.
    async fn get(&self, id: i64) -> Result<Option<Message>>;

    /// Apply a terminal transition iff the message is still `Pending`.
    ///
    /// Returns `false` when the message is missing or already resolved
    /// (another worker won the compare-and-swap).
    async fn resolve(&self, id: i64, outcome: &DeliveryOutcome) -> Result<bool>;

    /// Messages sent from `address`, ordered by creation.
    async fn find_by_source(&self, address: &str) -> Result<Vec<Message>>;

    /// Messages sent to `address`, ordered by creation.
    async fn find_by_destination(&self, address: &str) -> Result<Vec<Message>>;

    /// Messages where `address` is the source or the destination, ordered by
    /// creation. A message whose source equals its destination appears once.
    async fn find_by_participant(&self, address: &str) -> Result<Vec<Message>>;

    /// Messages currently in `status`, ordered by creation.
    async fn find_by_status(&self, status: MessageStatus) -> Result<Vec<Message>>;

    /// Count of messages currently in `status`.
    async fn count_by_status(&self, status: MessageStatus) -> Result<u64>;
}
