use crate::config::{MessageBrokerConfig, PipelineConfig};
use crate::ingest::engine::{PresenceEngine, ScanOutcome};
use crate::ingest::message;
use anyhow::Result;
use chrono::FixedOffset;
use futures_util::stream::StreamExt;
use lapin::{message::Delivery, options::BasicAckOptions};
use log::{debug, error, info, warn};
use std::sync::Arc;
use std::time::Duration;

use crate::messaging::ScanBroker;

/// The always-on scan consumer. Holds the wildcard subscription, re-creating
/// it after any transport failure, and drives the engine one message at a
/// time in delivery order — no overlap, so the time-ordered duplicate and
/// reactivation checks need no per-asset locking.
pub struct IngestService {
    broker: Arc<dyn ScanBroker>,
    engine: PresenceEngine,
    scan_pattern: String,
    reference_zone: FixedOffset,
    retry_delay: Duration,
}

impl IngestService {
    pub fn new(
        broker: Arc<dyn ScanBroker>,
        engine: PresenceEngine,
        pipeline: &PipelineConfig,
        broker_config: &MessageBrokerConfig,
    ) -> Result<Self> {
        let reference_zone = pipeline.reference_zone()?;

        Ok(Self {
            broker,
            engine,
            scan_pattern: pipeline.scan_pattern.clone(),
            reference_zone,
            retry_delay: Duration::from_millis(broker_config.retry_delay_ms),
        })
    }

    /// Run the consumer until the process shuts down. Never returns under
    /// normal operation; every failure path logs, sleeps and resubscribes.
    pub async fn run(self) {
        loop {
            match self.broker.consume_pattern(&self.scan_pattern).await {
                Ok(mut consumer) => {
                    info!("Subscribed to scan topics: {}", self.scan_pattern);

                    while let Some(delivery) = consumer.next().await {
                        match delivery {
                            Ok(delivery) => self.handle_delivery(delivery).await,
                            Err(e) => {
                                error!("Transport error while consuming: {}", e);
                                break;
                            }
                        }
                    }

                    warn!("Scan consumer stream ended; resubscribing");
                }
                Err(e) => {
                    error!("Failed to subscribe to scan topics: {}", e);
                }
            }

            tokio::time::sleep(self.retry_delay).await;
        }
    }

    /// One message, end to end: parse, process, acknowledge. The delivery is
    /// acknowledged exactly once whatever happened — at-most-once semantics;
    /// failed messages are observable in the logs, never requeued by us.
    async fn handle_delivery(&self, delivery: Delivery) {
        let topic = delivery.routing_key.as_str().to_string();

        match message::parse_message(&delivery.data, self.reference_zone) {
            Ok(msg) => match self.engine.process(msg).await {
                Ok(outcome) => log_outcome(&topic, &outcome),
                Err(e) => {
                    // Rolled back; the loop itself carries on
                    error!("Error processing message on {}: {:#}", topic, e);
                }
            },
            Err(e) => {
                warn!("Discarding malformed payload on {}: {:#}", topic, e);
            }
        }

        if let Err(e) = delivery.ack(BasicAckOptions::default()).await {
            error!("Failed to acknowledge message: {}", e);
        }
    }
}

fn log_outcome(topic: &str, outcome: &ScanOutcome) {
    match outcome {
        ScanOutcome::BootLogged { reader_code } => {
            info!("Boot logged: {}", reader_code);
        }
        ScanOutcome::ScanCommitted {
            asset_id, room_id, ..
        } => {
            info!(
                "Scan processed successfully for asset {} in room {}",
                asset_id, room_id
            );
        }
        ScanOutcome::DuplicateDiscarded { asset_id, room_id } => {
            debug!(
                "Duplicate scan ignored for asset {} in room {}",
                asset_id, room_id
            );
        }
        ScanOutcome::UnknownTag { uid, recorded } => {
            debug!("Unknown tag {} on {} recorded as {:?}", uid, topic, recorded);
        }
        ScanOutcome::UnknownReader { reader_code } => {
            debug!("Discarded message from unknown reader {}", reader_code);
        }
        ScanOutcome::Unrecognized { event_type } => {
            debug!("Discarded unrecognized event type {:?} on {}", event_type, topic);
        }
    }
}
