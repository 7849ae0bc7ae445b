use crate::db::models::AlertRecord;
use crate::error::Error;
use anyhow::Result;
use sqlx::PgPool;
use std::sync::Arc;

/// Alerts repository for the read-only API surface
#[derive(Clone)]
pub struct AlertsRepository {
    pool: Arc<PgPool>,
}

impl AlertsRepository {
    /// Create a new alerts repository
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    /// Get the most recent alerts
    pub async fn recent(&self, limit: i64) -> Result<Vec<AlertRecord>> {
        let result = sqlx::query_as::<_, AlertRecord>(
            r#"
            SELECT alert_id, asset_id, alert_type, alert_message,
                   generated_at, acknowledged_at, acknowledged_by
            FROM alerts
            ORDER BY generated_at DESC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to get recent alerts: {}", e)))?;

        Ok(result)
    }
}
