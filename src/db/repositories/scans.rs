use crate::db::models::ScanRecord;
use crate::error::Error;
use anyhow::Result;
use sqlx::PgPool;
use std::sync::Arc;

/// Read side of the scan history, used by the API only. The ingestion
/// pipeline writes scan events inside its own transaction (see ingest).
#[derive(Clone)]
pub struct ScansRepository {
    pool: Arc<PgPool>,
}

impl ScansRepository {
    /// Create a new scans repository
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    /// Get the most recent accepted scans
    pub async fn recent(&self, limit: i64) -> Result<Vec<ScanRecord>> {
        let result = sqlx::query_as::<_, ScanRecord>(
            r#"
            SELECT s.scan_time, a.asset_code, a.asset_name, r.room_name
            FROM asset_room_scan_events s
            JOIN assets a ON s.asset_id = a.asset_id
            JOIN rooms r ON s.room_id = r.room_id
            ORDER BY s.scan_time DESC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to get recent scans: {}", e)))?;

        Ok(result)
    }
}
