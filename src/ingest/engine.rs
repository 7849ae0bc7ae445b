use crate::config::PipelineConfig;
use crate::error::Error;
use crate::ingest::dedup::DuplicateFilter;
use crate::ingest::message::{BootMessage, InboundMessage, ScanMessage};
use crate::ingest::resolver::ReferenceResolver;
use crate::ingest::writer::{TxnWriter, UnknownTagOutcome, STATUS_ACTIVE, STATUS_IDLE, STATUS_MISSING};
use anyhow::Result;
use log::{info, warn};
use sqlx::PgPool;
use std::sync::Arc;

/// Terminal state of the per-message state machine. Exactly one outcome is
/// reached per message; anything else surfaces as an error and rolls back.
#[derive(Debug, Clone, PartialEq)]
pub enum ScanOutcome {
    BootLogged {
        reader_code: String,
    },
    UnknownReader {
        reader_code: String,
    },
    UnknownTag {
        uid: String,
        recorded: UnknownTagOutcome,
    },
    DuplicateDiscarded {
        asset_id: i32,
        room_id: i32,
    },
    ScanCommitted {
        asset_id: i32,
        room_id: i32,
        geofence_violation: bool,
        acknowledged_missing: u64,
        reactivated_after_minutes: Option<f64>,
    },
    Unrecognized {
        event_type: String,
    },
}

/// The per-message decision engine. Owns one transaction per message: all
/// required writes commit together or not at all, and the duplicate check
/// and catalog reads run inside that same transaction.
pub struct PresenceEngine {
    pool: Arc<PgPool>,
    resolver: ReferenceResolver,
    dedup: DuplicateFilter,
    writer: TxnWriter,
}

impl PresenceEngine {
    pub fn new(pool: Arc<PgPool>, config: &PipelineConfig) -> Self {
        Self {
            pool,
            resolver: ReferenceResolver::new(),
            dedup: DuplicateFilter::new(config.suppression_window_secs),
            writer: TxnWriter::new(config.system_actor_id),
        }
    }

    /// Process one validated message to its terminal outcome.
    pub async fn process(&self, message: InboundMessage) -> Result<ScanOutcome> {
        match message {
            InboundMessage::Unrecognized(event_type) => {
                Ok(ScanOutcome::Unrecognized { event_type })
            }
            InboundMessage::Boot(boot) => self.process_boot(boot).await,
            InboundMessage::Scan(scan) => self.process_scan(scan).await,
        }
    }

    /// Boot messages only record reader telemetry.
    async fn process_boot(&self, msg: BootMessage) -> Result<ScanOutcome> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| Error::Database(format!("Failed to begin transaction: {}", e)))?;

        let reader = match self.resolver.resolve_reader(&mut tx, &msg.reader_code).await? {
            Some(reader) => reader,
            None => {
                self.report_unknown_reader(&mut tx, &msg.reader_code).await;
                return Ok(ScanOutcome::UnknownReader {
                    reader_code: msg.reader_code,
                });
            }
        };

        self.writer
            .insert_health_log(&mut tx, reader.reader_id, "BOOT", msg.event_time)
            .await?;

        tx.commit()
            .await
            .map_err(|e| Error::Database(format!("Failed to commit boot log: {}", e)))?;

        Ok(ScanOutcome::BootLogged {
            reader_code: msg.reader_code,
        })
    }

    async fn process_scan(&self, msg: ScanMessage) -> Result<ScanOutcome> {
        let now = msg.event_time;

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| Error::Database(format!("Failed to begin transaction: {}", e)))?;

        let reader = match self.resolver.resolve_reader(&mut tx, &msg.reader_code).await? {
            Some(reader) => reader,
            None => {
                self.report_unknown_reader(&mut tx, &msg.reader_code).await;
                return Ok(ScanOutcome::UnknownReader {
                    reader_code: msg.reader_code,
                });
            }
        };

        let tag = match self.resolver.resolve_tag(&mut tx, &msg.uid).await? {
            Some(tag) => tag,
            None => {
                // Unknown tag is a business outcome, not an error: one alert
                // row (or its fallback), no scan event.
                warn!(
                    "Unknown RFID tag: {} scanned by reader: {}",
                    msg.uid, msg.reader_code
                );

                let location = self.resolver.resolve_location(&mut tx, reader.room_id).await?;
                let alert_msg = match location {
                    Some(loc) => format!(
                        "Unknown RFID tag ({}) scanned at {}",
                        msg.uid,
                        loc.describe()
                    ),
                    None => format!("Unknown RFID tag scanned: {}", msg.uid),
                };

                let recorded = self
                    .writer
                    .record_unknown_tag(
                        &mut tx,
                        &msg.uid,
                        reader.reader_id,
                        reader.room_id,
                        &alert_msg,
                        now,
                    )
                    .await?;

                tx.commit().await.map_err(|e| {
                    Error::Database(format!("Failed to commit unknown-tag alert: {}", e))
                })?;

                info!("Unknown asset alert created for tag: {}", msg.uid);
                return Ok(ScanOutcome::UnknownTag {
                    uid: msg.uid,
                    recorded,
                });
            }
        };

        if self
            .dedup
            .is_duplicate(&mut tx, tag.asset_id, reader.room_id, now)
            .await?
        {
            return Ok(ScanOutcome::DuplicateDiscarded {
                asset_id: tag.asset_id,
                room_id: reader.room_id,
            });
        }

        // Required writes: the scan fact and the Active status row
        self.writer
            .insert_scan_event(
                &mut tx,
                tag.asset_id,
                tag.tag_id,
                reader.reader_id,
                reader.room_id,
                now,
            )
            .await?;

        self.writer
            .insert_asset_status(&mut tx, tag.asset_id, STATUS_ACTIVE, now)
            .await?;

        // A fresh sighting closes any open Missing Asset alerts
        let acknowledged_missing = self
            .writer
            .acknowledge_missing_alerts(&mut tx, tag.asset_id, now)
            .await?;
        if acknowledged_missing > 0 {
            info!(
                "Auto-acknowledged {} 'Missing Asset' alert(s) for asset {}",
                acknowledged_missing, tag.asset_id
            );
        }

        // Geofence check; an asset with no rules is in violation everywhere
        let allowed = self
            .resolver
            .is_allowed(&mut tx, tag.asset_id, reader.room_id)
            .await?;

        let geofence_violation = !allowed;
        if geofence_violation {
            let location = self.resolver.resolve_location(&mut tx, reader.room_id).await?;
            let alert_msg = match location {
                Some(loc) => format!("Asset scanned in unauthorized location: {}", loc.describe()),
                None => "Asset scanned in unauthorized location".to_string(),
            };

            self.writer
                .insert_geofence_alert(&mut tx, tag.asset_id, &alert_msg, now)
                .await?;

            warn!("Geofence violation alert created for asset {}", tag.asset_id);
        }

        // Reactivation accounting: the status row just written is stamped at
        // the event time, so the strict `< now` read still sees the previous
        // state of the series.
        let previous = self
            .writer
            .latest_status_before(&mut tx, tag.asset_id, now)
            .await?;

        let reactivated_after_minutes = previous
            .filter(|p| p.status == STATUS_IDLE || p.status == STATUS_MISSING)
            .map(|p| (now - p.recorded_at).num_seconds() as f64 / 60.0);

        if let Some(idle_minutes) = reactivated_after_minutes {
            self.writer
                .log_reactivation(&mut tx, tag.asset_id, idle_minutes, now)
                .await;
        }

        // Best-effort reader telemetry
        self.writer
            .log_scan_health(&mut tx, reader.reader_id, now)
            .await;

        tx.commit()
            .await
            .map_err(|e| Error::Database(format!("Failed to commit scan: {}", e)))?;

        Ok(ScanOutcome::ScanCommitted {
            asset_id: tag.asset_id,
            room_id: reader.room_id,
            geofence_violation,
            acknowledged_missing,
            reactivated_after_minutes,
        })
    }

    /// Unknown reader: log the code plus the currently registered codes for
    /// diagnostics, then discard. The open transaction is dropped unused.
    async fn report_unknown_reader(
        &self,
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        reader_code: &str,
    ) {
        warn!("Unknown reader: {}", reader_code);

        match self.resolver.known_reader_codes(tx).await {
            Ok(codes) => warn!("Available readers in database: {:?}", codes),
            Err(e) => warn!("Could not list available readers: {}", e),
        }
    }
}
