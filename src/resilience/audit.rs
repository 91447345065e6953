//! # Audit Sink
//!
//! Every executor failure is persisted as an audit row. Persistence is best
//! effort: the executor logs a failed write and moves on.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("Audit write failed: {0}")]
    WriteFailed(String),

    #[cfg(feature = "postgres")]
    #[error("Audit database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Audit row: `{label, error_message, stack_trace, context_json, timestamp, recovery_attempted}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: Uuid,
    pub label: String,
    pub error_message: String,
    pub stack_trace: Option<String>,
    pub context_json: Option<serde_json::Value>,
    pub timestamp: DateTime<Utc>,
    pub recovery_attempted: bool,
}

impl AuditEntry {
    pub fn new(label: &str, error_message: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            label: label.to_string(),
            error_message: error_message.to_string(),
            stack_trace: None,
            context_json: None,
            timestamp: Utc::now(),
            recovery_attempted: false,
        }
    }
}

/// Destination for audit rows
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, entry: &AuditEntry) -> Result<(), AuditError>;
}

/// Writes audit rows to the log stream only
#[derive(Debug, Default, Clone)]
pub struct TracingAuditSink;

#[async_trait]
impl AuditSink for TracingAuditSink {
    async fn record(&self, entry: &AuditEntry) -> Result<(), AuditError> {
        warn!(
            audit_id = %entry.id,
            label = %entry.label,
            error_message = %entry.error_message,
            recovery_attempted = entry.recovery_attempted,
            context = ?entry.context_json,
            "Command failure audited"
        );
        Ok(())
    }
}

/// Persists audit rows into the `error_logs` table
///
/// ```sql
/// CREATE TABLE error_logs (
///     id UUID PRIMARY KEY,
///     label TEXT NOT NULL,
///     error_message TEXT NOT NULL,
///     stack_trace TEXT,
///     context_json JSONB,
///     timestamp TIMESTAMPTZ NOT NULL,
///     recovery_attempted BOOLEAN NOT NULL DEFAULT FALSE
/// );
/// ```
#[cfg(feature = "postgres")]
#[derive(Debug, Clone)]
pub struct PgAuditSink {
    pool: sqlx::PgPool,
}

#[cfg(feature = "postgres")]
impl PgAuditSink {
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self { pool }
    }
}

#[cfg(feature = "postgres")]
#[async_trait]
impl AuditSink for PgAuditSink {
    async fn record(&self, entry: &AuditEntry) -> Result<(), AuditError> {
        sqlx::query(
            r#"
            INSERT INTO error_logs
                (id, label, error_message, stack_trace, context_json, timestamp, recovery_attempted)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(entry.id)
        .bind(&entry.label)
        .bind(&entry.error_message)
        .bind(entry.stack_trace.as_deref())
        .bind(entry.context_json.clone().map(sqlx::types::Json))
        .bind(entry.timestamp)
        .bind(entry.recovery_attempted)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_tracing_sink_never_fails() {
        let mut entry = AuditEntry::new("ban_command", "Missing permission: BAN_MEMBERS");
        entry.context_json = Some(serde_json::json!({"guild_id": "42"}));
        assert!(TracingAuditSink.record(&entry).await.is_ok());
    }

    #[test]
    fn test_entry_serializes_fixed_row_shape() {
        let entry = AuditEntry::new("ban_command", "boom");
        let json = serde_json::to_value(&entry).unwrap();
        for field in [
            "label",
            "error_message",
            "stack_trace",
            "context_json",
            "timestamp",
            "recovery_attempted",
        ] {
            assert!(json.get(field).is_some(), "missing {field}");
        }
    }
}
