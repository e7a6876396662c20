//! Telemetry log: keeps every telemetry record in SQLite for later span
//! reconstruction by correlation id.

use async_trait::async_trait;
use iris_core::{error::IrisError, telemetry::TelemetryEvent, traits::TelemetrySink};
use sqlx::SqlitePool;
use tracing::debug;
use uuid::Uuid;

/// Telemetry sink backed by SQLite.
#[derive(Clone)]
pub struct TelemetryLog {
    pool: SqlitePool,
}

impl TelemetryLog {
    /// Create a new telemetry log sharing the given pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// All records of one logical operation, oldest first.
    pub async fn events_for(&self, correlation_id: &str) -> Result<Vec<(String, String)>, IrisError> {
        let rows: Vec<(String, String)> = sqlx::query_as(
            "SELECT name, properties FROM telemetry_events \
             WHERE correlation_id = ? ORDER BY created_at ASC, rowid ASC",
        )
        .bind(correlation_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| IrisError::Memory(format!("query failed: {e}")))?;
        Ok(rows)
    }
}

#[async_trait]
impl TelemetrySink for TelemetryLog {
    async fn record(&self, event: TelemetryEvent) -> Result<(), IrisError> {
        let id = Uuid::new_v4().to_string();
        let properties = serde_json::Value::Object(event.properties).to_string();

        sqlx::query(
            "INSERT INTO telemetry_events \
             (id, name, correlation_id, user_id, tenant_id, properties, created_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(&event.name)
        .bind(&event.correlation_id)
        .bind(&event.user_id)
        .bind(&event.tenant_id)
        .bind(&properties)
        .bind(event.timestamp.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| IrisError::Memory(format!("telemetry write failed: {e}")))?;

        debug!("telemetry: {} [{}]", event.name, event.correlation_id);
        Ok(())
    }
}
