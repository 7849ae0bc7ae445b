use crate::db::models::AssetStatusRow;
use crate::error::Error;
use anyhow::Result;
use chrono::NaiveDateTime;
use log::{error, warn};
use sqlx::{Acquire, PgConnection, Postgres, Transaction};

pub const ALERT_UNKNOWN_ASSET: &str = "Unknown Asset";
pub const ALERT_GEOFENCING: &str = "Geofencing Alert";
pub const ALERT_MISSING_ASSET: &str = "Missing Asset";

pub const STATUS_ACTIVE: &str = "Active";
pub const STATUS_IDLE: &str = "Idle";
pub const STATUS_MISSING: &str = "Missing";

/// How an unknown-tag scan ended up being recorded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnknownTagOutcome {
    /// Null-asset alert row created
    AlertCreated,
    /// Alert rejected by a NOT NULL constraint; fallback row recorded
    FallbackRecorded,
    /// Both writes failed; event logged and dropped
    Dropped,
}

/// Applies the engine's decisions against the store. Required writes return
/// errors and abort the surrounding transaction; best-effort writes run
/// inside a savepoint and demote their failures to log lines, so a failed
/// statement cannot poison the transaction that holds the required writes.
pub struct TxnWriter {
    system_actor_id: i32,
}

impl TxnWriter {
    pub fn new(system_actor_id: i32) -> Self {
        Self { system_actor_id }
    }

    /// Insert the immutable scan fact. Required.
    pub async fn insert_scan_event(
        &self,
        conn: &mut PgConnection,
        asset_id: i32,
        tag_id: i32,
        reader_id: i32,
        room_id: i32,
        at: NaiveDateTime,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO asset_room_scan_events
            (asset_id, tag_id, reader_id, room_id, scan_time)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(asset_id)
        .bind(tag_id)
        .bind(reader_id)
        .bind(room_id)
        .bind(at)
        .execute(conn)
        .await
        .map_err(|e| Error::Database(format!("Failed to insert scan event: {}", e)))?;

        Ok(())
    }

    /// Append a status row to the asset's time series. Required.
    pub async fn insert_asset_status(
        &self,
        conn: &mut PgConnection,
        asset_id: i32,
        status: &str,
        at: NaiveDateTime,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO asset_status
            (asset_id, status, recorded_at)
            VALUES ($1, $2, $3)
            "#,
        )
        .bind(asset_id)
        .bind(status)
        .bind(at)
        .execute(conn)
        .await
        .map_err(|e| Error::Database(format!("Failed to insert asset status: {}", e)))?;

        Ok(())
    }

    /// Close every open Missing Asset alert for the asset, stamped with the
    /// system actor at the scan's event time. Required. Returns how many
    /// alerts were closed.
    pub async fn acknowledge_missing_alerts(
        &self,
        conn: &mut PgConnection,
        asset_id: i32,
        at: NaiveDateTime,
    ) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE alerts
            SET acknowledged_at = $1,
                acknowledged_by = $2
            WHERE asset_id = $3
              AND alert_type = $4
              AND acknowledged_at IS NULL
            "#,
        )
        .bind(at)
        .bind(self.system_actor_id)
        .bind(asset_id)
        .bind(ALERT_MISSING_ASSET)
        .execute(conn)
        .await
        .map_err(|e| Error::Database(format!("Failed to acknowledge missing alerts: {}", e)))?;

        Ok(result.rows_affected())
    }

    /// Raise a geofence violation alert. Required. Repeated violations raise
    /// repeated alerts; the pipeline does not deduplicate them.
    pub async fn insert_geofence_alert(
        &self,
        conn: &mut PgConnection,
        asset_id: i32,
        message: &str,
        at: NaiveDateTime,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO alerts
            (asset_id, alert_type, alert_message, generated_at)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(asset_id)
        .bind(ALERT_GEOFENCING)
        .bind(message)
        .bind(at)
        .execute(conn)
        .await
        .map_err(|e| Error::Database(format!("Failed to insert geofence alert: {}", e)))?;

        Ok(())
    }

    /// Record an unknown-tag scan: a null-asset alert, or the fallback table
    /// when the alerts schema rejects a null asset reference, or a logged
    /// drop when both fail. Only an unexpected alert-insert failure is
    /// returned as an error (and rolls the unit back).
    pub async fn record_unknown_tag(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        uid: &str,
        reader_id: i32,
        room_id: i32,
        message: &str,
        at: NaiveDateTime,
    ) -> Result<UnknownTagOutcome> {
        let primary: std::result::Result<(), sqlx::Error> = async {
            let mut sp = tx.begin().await?;
            sqlx::query(
                r#"
                INSERT INTO alerts
                (asset_id, alert_type, alert_message, generated_at)
                VALUES (NULL, $1, $2, $3)
                "#,
            )
            .bind(ALERT_UNKNOWN_ASSET)
            .bind(message)
            .bind(at)
            .execute(&mut *sp)
            .await?;
            sp.commit().await?;
            Ok(())
        }
        .await;

        match primary {
            Ok(()) => Ok(UnknownTagOutcome::AlertCreated),
            Err(e) if is_not_null_violation(&e) => {
                warn!(
                    "Cannot create null-asset alert ({}); recording unknown tag {} in unknown_tag_scans",
                    e, uid
                );

                let fallback: std::result::Result<(), sqlx::Error> = async {
                    let mut sp = tx.begin().await?;
                    sqlx::query(
                        r#"
                        INSERT INTO unknown_tag_scans
                        (rfid_uid, reader_id, room_id, scan_time, alert_message)
                        VALUES ($1, $2, $3, $4, $5)
                        "#,
                    )
                    .bind(uid)
                    .bind(reader_id)
                    .bind(room_id)
                    .bind(at)
                    .bind(message)
                    .execute(&mut *sp)
                    .await?;
                    sp.commit().await?;
                    Ok(())
                }
                .await;

                match fallback {
                    Ok(()) => Ok(UnknownTagOutcome::FallbackRecorded),
                    Err(e) => {
                        error!("Unknown tag {} could not be stored anywhere: {}", uid, e);
                        Ok(UnknownTagOutcome::Dropped)
                    }
                }
            }
            Err(e) => {
                Err(Error::Database(format!("Failed to insert unknown-asset alert: {}", e)).into())
            }
        }
    }

    /// Reader telemetry row. Required on the boot path, where it is the only
    /// write of the unit.
    pub async fn insert_health_log(
        &self,
        conn: &mut PgConnection,
        reader_id: i32,
        event_type: &str,
        at: NaiveDateTime,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO reader_health_logs
            (reader_id, event_type, recorded_at)
            VALUES ($1, $2, $3)
            "#,
        )
        .bind(reader_id)
        .bind(event_type)
        .bind(at)
        .execute(conn)
        .await
        .map_err(|e| Error::Database(format!("Failed to insert health log: {}", e)))?;

        Ok(())
    }

    /// Best-effort SCAN telemetry row for the scan path
    pub async fn log_scan_health(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        reader_id: i32,
        at: NaiveDateTime,
    ) {
        let result: std::result::Result<(), sqlx::Error> = async {
            let mut sp = tx.begin().await?;
            sqlx::query(
                r#"
                INSERT INTO reader_health_logs
                (reader_id, event_type, recorded_at)
                VALUES ($1, 'SCAN', $2)
                "#,
            )
            .bind(reader_id)
            .bind(at)
            .execute(&mut *sp)
            .await?;
            sp.commit().await?;
            Ok(())
        }
        .await;

        if let Err(e) = result {
            warn!("Could not log reader health for reader {}: {}", reader_id, e);
        }
    }

    /// Best-effort idle-to-active reactivation record
    pub async fn log_reactivation(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        asset_id: i32,
        idle_minutes: f64,
        at: NaiveDateTime,
    ) {
        let result: std::result::Result<(), sqlx::Error> = async {
            let mut sp = tx.begin().await?;
            sqlx::query(
                r#"
                INSERT INTO asset_utilization_log
                (asset_id, event_type, duration_minutes, recorded_at)
                VALUES ($1, 'REACTIVATED', $2, $3)
                ON CONFLICT DO NOTHING
                "#,
            )
            .bind(asset_id)
            .bind(idle_minutes)
            .bind(at)
            .execute(&mut *sp)
            .await?;
            sp.commit().await?;
            Ok(())
        }
        .await;

        if let Err(e) = result {
            warn!(
                "Could not update utilization metrics for asset {}: {}",
                asset_id, e
            );
        }
    }

    /// Most recent status row strictly before the event time
    pub async fn latest_status_before(
        &self,
        conn: &mut PgConnection,
        asset_id: i32,
        before: NaiveDateTime,
    ) -> Result<Option<AssetStatusRow>> {
        let result = sqlx::query_as::<_, AssetStatusRow>(
            r#"
            SELECT status, recorded_at
            FROM asset_status
            WHERE asset_id = $1
              AND recorded_at < $2
            ORDER BY recorded_at DESC
            LIMIT 1
            "#,
        )
        .bind(asset_id)
        .bind(before)
        .fetch_optional(conn)
        .await
        .map_err(|e| Error::Database(format!("Failed to read previous status: {}", e)))?;

        Ok(result)
    }
}

fn is_not_null_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.code().as_deref() == Some("23502"))
}
