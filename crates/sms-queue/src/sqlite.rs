use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Pool, Row, Sqlite};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info, warn};

use crate::{EmbeddedJobQueue, JobConsumer, JobPublisher, QueueError, Result};
use sms_common::{DispatchJob, QueuedJob};

/// SQLite-based dispatch queue with SQS-like visibility semantics, used as
/// the embedded transport for local and test deployments.
pub struct SqliteJobQueue {
    pool: Pool<Sqlite>,
    queue_name: String,
    visibility_timeout_seconds: u32,
    running: AtomicBool,
}

impl SqliteJobQueue {
    pub fn new(pool: Pool<Sqlite>, queue_name: String, visibility_timeout_seconds: u32) -> Self {
        Self {
            pool,
            queue_name,
            visibility_timeout_seconds,
            running: AtomicBool::new(true),
        }
    }

    async fn create_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS dispatch_jobs (
                message_id INTEGER NOT NULL,
                queue_name TEXT NOT NULL,
                receipt_handle TEXT,
                visible_at INTEGER NOT NULL,
                payload TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                receive_count INTEGER DEFAULT 0,
                UNIQUE(queue_name, message_id)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_dispatch_jobs_visible
            ON dispatch_jobs (queue_name, visible_at)
            "#,
        )
        .execute(&self.pool)
        .await?;

        info!(queue = %self.queue_name, "SQLite dispatch queue schema initialized");
        Ok(())
    }

    fn generate_receipt_handle(&self) -> String {
        uuid::Uuid::new_v4().to_string()
    }
}

#[async_trait]
impl JobConsumer for SqliteJobQueue {
    fn identifier(&self) -> &str {
        &self.queue_name
    }

    async fn poll(&self, max_jobs: u32) -> Result<Vec<QueuedJob>> {
        if !self.running.load(Ordering::SeqCst) {
            return Err(QueueError::Stopped);
        }

        let now = Utc::now().timestamp_millis();
        let new_visible_at = now + i64::from(self.visibility_timeout_seconds) * 1000;

        let rows = sqlx::query(
            r#"
            SELECT message_id, payload, receive_count
            FROM dispatch_jobs
            WHERE queue_name = ? AND visible_at <= ?
            ORDER BY created_at
            LIMIT ?
            "#,
        )
        .bind(&self.queue_name)
        .bind(now)
        .bind(i64::from(max_jobs))
        .fetch_all(&self.pool)
        .await?;

        let mut jobs = Vec::with_capacity(rows.len());

        for row in rows {
            let message_id: i64 = row.get("message_id");
            let payload: String = row.get("payload");
            let receive_count: i64 = row.get("receive_count");

            let receipt_handle = self.generate_receipt_handle();

            // Conditional claim: if another consumer grabbed the job between
            // the select and this update, rows_affected is 0 and we skip it.
            let updated = sqlx::query(
                r#"
                UPDATE dispatch_jobs
                SET receipt_handle = ?, visible_at = ?, receive_count = receive_count + 1
                WHERE queue_name = ? AND message_id = ? AND visible_at <= ?
                "#,
            )
            .bind(&receipt_handle)
            .bind(new_visible_at)
            .bind(&self.queue_name)
            .bind(message_id)
            .bind(now)
            .execute(&self.pool)
            .await?;

            if updated.rows_affected() == 0 {
                continue;
            }

            let job: DispatchJob = serde_json::from_str(&payload)?;

            jobs.push(QueuedJob {
                job,
                receipt_handle,
                queue_identifier: self.queue_name.clone(),
                receive_count: (receive_count + 1) as u32,
            });
        }

        if !jobs.is_empty() {
            debug!(
                queue = %self.queue_name,
                count = jobs.len(),
                "Polled jobs from SQLite queue"
            );
        }

        Ok(jobs)
    }

    async fn ack(&self, receipt_handle: &str) -> Result<()> {
        let result = sqlx::query(
            "DELETE FROM dispatch_jobs WHERE receipt_handle = ? AND queue_name = ?",
        )
        .bind(receipt_handle)
        .bind(&self.queue_name)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            warn!(
                receipt_handle = %receipt_handle,
                queue = %self.queue_name,
                "ACK failed - job not found or already deleted"
            );
            return Err(QueueError::ReceiptNotFound(receipt_handle.to_string()));
        }

        debug!(
            receipt_handle = %receipt_handle,
            queue = %self.queue_name,
            "Job acknowledged"
        );
        Ok(())
    }

    async fn nack(&self, receipt_handle: &str, delay_seconds: Option<u32>) -> Result<()> {
        let delay_ms = i64::from(delay_seconds.unwrap_or(0)) * 1000;
        let new_visible_at = Utc::now().timestamp_millis() + delay_ms;

        let result = sqlx::query(
            r#"
            UPDATE dispatch_jobs
            SET visible_at = ?, receipt_handle = NULL
            WHERE receipt_handle = ? AND queue_name = ?
            "#,
        )
        .bind(new_visible_at)
        .bind(receipt_handle)
        .bind(&self.queue_name)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            warn!(
                receipt_handle = %receipt_handle,
                queue = %self.queue_name,
                "NACK failed - job not found"
            );
            return Err(QueueError::ReceiptNotFound(receipt_handle.to_string()));
        }

        debug!(
            receipt_handle = %receipt_handle,
            queue = %self.queue_name,
            delay_ms = delay_ms,
            "Job negative acknowledged"
        );
        Ok(())
    }

    fn is_healthy(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    async fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        info!(queue = %self.queue_name, "SQLite queue consumer stopped");
    }
}

#[async_trait]
impl JobPublisher for SqliteJobQueue {
    fn identifier(&self) -> &str {
        &self.queue_name
    }

    async fn publish(&self, job: DispatchJob) -> Result<()> {
        let now_ms = Utc::now().timestamp_millis();
        let payload = serde_json::to_string(&job)?;

        let existing = sqlx::query(
            "SELECT message_id FROM dispatch_jobs WHERE message_id = ? AND queue_name = ?",
        )
        .bind(job.message_id)
        .bind(&self.queue_name)
        .fetch_optional(&self.pool)
        .await?;

        if existing.is_some() {
            debug!(
                message_id = job.message_id,
                queue = %self.queue_name,
                "Duplicate job detected, skipping"
            );
            return Ok(());
        }

        sqlx::query(
            r#"
            INSERT INTO dispatch_jobs (message_id, queue_name, visible_at, payload, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(job.message_id)
        .bind(&self.queue_name)
        .bind(now_ms)
        .bind(&payload)
        .bind(now_ms)
        .execute(&self.pool)
        .await?;

        debug!(
            message_id = job.message_id,
            queue = %self.queue_name,
            "Job published to SQLite queue"
        );

        Ok(())
    }
}

#[async_trait]
impl EmbeddedJobQueue for SqliteJobQueue {
    async fn init_schema(&self) -> Result<()> {
        self.create_schema().await
    }
}
