use crate::error::Error;
use anyhow::Result;
use chrono::{Duration, NaiveDateTime};
use sqlx::PgConnection;

/// Suppresses repeat scans of the same asset in the same room within a
/// configurable window. This is a look-back query against scan history, not
/// a cache, and must run inside the same transaction as the eventual insert.
pub struct DuplicateFilter {
    window: Duration,
}

impl DuplicateFilter {
    pub fn new(window_secs: i64) -> Self {
        Self {
            window: Duration::seconds(window_secs),
        }
    }

    /// True iff a scan event for this asset and room exists with a recorded
    /// time strictly after `event_time - window`.
    pub async fn is_duplicate(
        &self,
        conn: &mut PgConnection,
        asset_id: i32,
        room_id: i32,
        event_time: NaiveDateTime,
    ) -> Result<bool> {
        let cutoff = event_time - self.window;

        let row = sqlx::query(
            r#"
            SELECT 1 FROM asset_room_scan_events
            WHERE asset_id = $1
              AND room_id = $2
              AND scan_time > $3
            "#,
        )
        .bind(asset_id)
        .bind(room_id)
        .bind(cutoff)
        .fetch_optional(conn)
        .await
        .map_err(|e| Error::Database(format!("Failed duplicate check for asset {}: {}", asset_id, e)))?;

        Ok(row.is_some())
    }
}
