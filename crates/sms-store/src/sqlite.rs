use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Pool, Row, Sqlite};
use tracing::{debug, info};

use crate::{MessageStore, NewMessage, Result, StoreError};
use sms_common::{DeliveryOutcome, Message, MessageStatus};

/// SQLite-backed message store.
///
/// Timestamps are stored as unix milliseconds; status as its string form.
pub struct SqliteMessageStore {
    pool: Pool<Sqlite>,
}

impl SqliteMessageStore {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }

    /// Create the messages table and lookup indexes.
    pub async fn init_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS messages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                source_address TEXT NOT NULL,
                destination_address TEXT NOT NULL,
                content TEXT NOT NULL,
                status TEXT NOT NULL,
                failure_reason TEXT,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_messages_source ON messages (source_address)",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_messages_destination ON messages (destination_address)",
        )
        .execute(&self.pool)
        .await?;

        info!("Message store schema initialized");
        Ok(())
    }

    fn row_to_message(row: &sqlx::sqlite::SqliteRow) -> Result<Message> {
        let status_text: String = row.get("status");
        let status = MessageStatus::from_str(&status_text)
            .ok_or_else(|| StoreError::Corrupt(format!("unknown status: {status_text}")))?;

        let created_ms: i64 = row.get("created_at");
        let updated_ms: i64 = row.get("updated_at");

        Ok(Message {
            id: row.get("id"),
            source_address: row.get("source_address"),
            destination_address: row.get("destination_address"),
            content: row.get("content"),
            status,
            failure_reason: row.get("failure_reason"),
            created_at: millis_to_datetime(created_ms)?,
            updated_at: millis_to_datetime(updated_ms)?,
        })
    }

    async fn find_where(&self, clause: &str, value: &str) -> Result<Vec<Message>> {
        let query = format!(
            "SELECT * FROM messages WHERE {clause} ORDER BY created_at, id"
        );
        let rows = sqlx::query(&query)
            .bind(value)
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(Self::row_to_message).collect()
    }
}

fn millis_to_datetime(ms: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms)
        .ok_or_else(|| StoreError::Corrupt(format!("invalid timestamp: {ms}")))
}

#[async_trait]
impl MessageStore for SqliteMessageStore {
    async fn create(&self, new: NewMessage) -> Result<Message> {
        let now = Utc::now();
        let now_ms = now.timestamp_millis();

        let result = sqlx::query(
            r#"
            INSERT INTO messages
                (source_address, destination_address, content, status, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&new.source_address)
        .bind(&new.destination_address)
        .bind(&new.content)
        .bind(MessageStatus::Pending.as_str())
        .bind(now_ms)
        .bind(now_ms)
        .execute(&self.pool)
        .await?;

        let id = result.last_insert_rowid();
        debug!(message_id = id, "Message persisted as PENDING");

        Ok(Message {
            id,
            source_address: new.source_address,
            destination_address: new.destination_address,
            content: new.content,
            status: MessageStatus::Pending,
            failure_reason: None,
            created_at: millis_to_datetime(now_ms)?,
            updated_at: millis_to_datetime(now_ms)?,
        })
    }

    async fn get(&self, id: i64) -> Result<Option<Message>> {
        let row = sqlx::query("SELECT * FROM messages WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::row_to_message).transpose()
    }

    async fn resolve(&self, id: i64, outcome: &DeliveryOutcome) -> Result<bool> {
        let now_ms = Utc::now().timestamp_millis();

        // Conditional on PENDING so a duplicate job can never commit a second
        // terminal state. MAX keeps updated_at strictly after created_at even
        // when the transition lands within the same millisecond.
        let result = sqlx::query(
            r#"
            UPDATE messages
            SET status = ?, failure_reason = ?, updated_at = MAX(?, created_at + 1)
            WHERE id = ? AND status = 'PENDING'
            "#,
        )
        .bind(outcome.status().as_str())
        .bind(outcome.failure_reason())
        .bind(now_ms)
        .bind(id)
        .execute(&self.pool)
        .await?;

        let committed = result.rows_affected() == 1;
        if committed {
            debug!(message_id = id, status = %outcome.status(), "Terminal transition committed");
        } else {
            debug!(message_id = id, "Conditional update skipped - message not PENDING");
        }
        Ok(committed)
    }

    async fn find_by_source(&self, address: &str) -> Result<Vec<Message>> {
        self.find_where("source_address = ?1", address).await
    }

    async fn find_by_destination(&self, address: &str) -> Result<Vec<Message>> {
        self.find_where("destination_address = ?1", address).await
    }

    async fn find_by_participant(&self, address: &str) -> Result<Vec<Message>> {
        self.find_where(
            "source_address = ?1 OR destination_address = ?1",
            address,
        )
        .await
    }

    async fn find_by_status(&self, status: MessageStatus) -> Result<Vec<Message>> {
        self.find_where("status = ?1", status.as_str()).await
    }

    async fn count_by_status(&self, status: MessageStatus) -> Result<u64> {
        let row = sqlx::query("SELECT COUNT(*) AS count FROM messages WHERE status = ?")
            .bind(status.as_str())
            .fetch_one(&self.pool)
            .await?;

        let count: i64 = row.get("count");
        Ok(count as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn create_test_store() -> SqliteMessageStore {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        let store = SqliteMessageStore::new(pool);
        store.init_schema().await.unwrap();
        store
    }

    fn new_message(source: &str, destination: &str) -> NewMessage {
        NewMessage {
            source_address: source.to_string(),
            destination_address: destination.to_string(),
            content: "hello".to_string(),
        }
    }

    #[tokio::test]
    async fn test_create_assigns_id_and_pending_status() {
        let store = create_test_store().await;

        let message = store
            .create(new_message("+15550001111", "+15550002222"))
            .await
            .unwrap();

        assert!(message.id > 0);
        assert_eq!(message.status, MessageStatus::Pending);
        assert!(message.failure_reason.is_none());
        assert_eq!(message.created_at, message.updated_at);

        let fetched = store.get(message.id).await.unwrap().unwrap();
        assert_eq!(fetched.status, MessageStatus::Pending);
        assert_eq!(fetched.source_address, "+15550001111");
    }

    #[tokio::test]
    async fn test_get_unknown_id_returns_none() {
        let store = create_test_store().await;
        assert!(store.get(9999).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_resolve_delivered() {
        let store = create_test_store().await;
        let message = store
            .create(new_message("+15550001111", "+15550002222"))
            .await
            .unwrap();

        let committed = store
            .resolve(message.id, &DeliveryOutcome::Delivered)
            .await
            .unwrap();
        assert!(committed);

        let resolved = store.get(message.id).await.unwrap().unwrap();
        assert_eq!(resolved.status, MessageStatus::Delivered);
        assert!(resolved.failure_reason.is_none());
        assert!(resolved.updated_at > resolved.created_at);
    }

    #[tokio::test]
    async fn test_resolve_failed_sets_reason() {
        let store = create_test_store().await;
        let message = store
            .create(new_message("+15550001111", "+15550002222"))
            .await
            .unwrap();

        let outcome = DeliveryOutcome::Failed {
            reason: "Network timeout".to_string(),
        };
        assert!(store.resolve(message.id, &outcome).await.unwrap());

        let resolved = store.get(message.id).await.unwrap().unwrap();
        assert_eq!(resolved.status, MessageStatus::Failed);
        assert_eq!(resolved.failure_reason.as_deref(), Some("Network timeout"));
    }

    #[tokio::test]
    async fn test_resolve_is_conditional_on_pending() {
        let store = create_test_store().await;
        let message = store
            .create(new_message("+15550001111", "+15550002222"))
            .await
            .unwrap();

        assert!(store
            .resolve(message.id, &DeliveryOutcome::Delivered)
            .await
            .unwrap());

        // A competing resolution loses the compare-and-swap.
        let outcome = DeliveryOutcome::Failed {
            reason: "Carrier rejected message".to_string(),
        };
        assert!(!store.resolve(message.id, &outcome).await.unwrap());

        let resolved = store.get(message.id).await.unwrap().unwrap();
        assert_eq!(resolved.status, MessageStatus::Delivered);
        assert!(resolved.failure_reason.is_none());
    }

    #[tokio::test]
    async fn test_resolve_unknown_id_returns_false() {
        let store = create_test_store().await;
        assert!(!store
            .resolve(404, &DeliveryOutcome::Delivered)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_find_by_source_and_destination() {
        let store = create_test_store().await;
        store
            .create(new_message("+15550001111", "+15550002222"))
            .await
            .unwrap();
        store
            .create(new_message("+15550001111", "+15550003333"))
            .await
            .unwrap();
        store
            .create(new_message("+15550003333", "+15550002222"))
            .await
            .unwrap();

        let from_first = store.find_by_source("+15550001111").await.unwrap();
        assert_eq!(from_first.len(), 2);

        let to_second = store.find_by_destination("+15550002222").await.unwrap();
        assert_eq!(to_second.len(), 2);

        assert!(store.find_by_source("+15550009999").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_find_by_participant_covers_both_directions() {
        let store = create_test_store().await;
        store
            .create(new_message("+15550001111", "+15550002222"))
            .await
            .unwrap();
        store
            .create(new_message("+15550002222", "+15550003333"))
            .await
            .unwrap();
        store
            .create(new_message("+15550004444", "+15550005555"))
            .await
            .unwrap();

        let involving = store.find_by_participant("+15550002222").await.unwrap();
        assert_eq!(involving.len(), 2);
    }

    #[tokio::test]
    async fn test_find_by_participant_self_send_appears_once() {
        let store = create_test_store().await;
        store
            .create(new_message("+15550001111", "+15550001111"))
            .await
            .unwrap();

        let involving = store.find_by_participant("+15550001111").await.unwrap();
        assert_eq!(involving.len(), 1);
    }

    #[tokio::test]
    async fn test_find_and_count_by_status() {
        let store = create_test_store().await;
        let first = store
            .create(new_message("+15550001111", "+15550002222"))
            .await
            .unwrap();
        store
            .create(new_message("+15550001111", "+15550003333"))
            .await
            .unwrap();

        store
            .resolve(first.id, &DeliveryOutcome::Delivered)
            .await
            .unwrap();

        assert_eq!(store.count_by_status(MessageStatus::Pending).await.unwrap(), 1);
        assert_eq!(
            store.count_by_status(MessageStatus::Delivered).await.unwrap(),
            1
        );

        let delivered = store.find_by_status(MessageStatus::Delivered).await.unwrap();
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0].id, first.id);
    }
}
