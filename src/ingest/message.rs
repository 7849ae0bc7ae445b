use crate::error::Error;
use anyhow::Result;
use chrono::{DateTime, FixedOffset, NaiveDateTime, Utc};
use log::warn;
use serde::Deserialize;

/// Wire payload as published by the readers, before validation
#[derive(Debug, Deserialize)]
struct RawPayload {
    event_type: Option<String>,
    reader: Option<String>,
    uid: Option<String>,
    timestamp: Option<String>,
    // Older reader firmware publishes the time under this name
    scan_time: Option<String>,
}

/// Where the event time came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimestampSource {
    /// Parsed from the payload and normalized to the reference zone
    Payload,
    /// No timestamp in the payload; server wall clock used
    Absent,
    /// Timestamp present but unparsable; server wall clock used
    Unparsable,
}

/// A validated scan report
#[derive(Debug, Clone, PartialEq)]
pub struct ScanMessage {
    pub reader_code: String,
    pub uid: String,
    pub event_time: NaiveDateTime,
    pub time_source: TimestampSource,
}

/// A validated reader boot report
#[derive(Debug, Clone, PartialEq)]
pub struct BootMessage {
    pub reader_code: String,
    pub event_time: NaiveDateTime,
    pub time_source: TimestampSource,
}

/// Typed inbound message, validated at the transport boundary so nothing
/// dict-shaped reaches the engine.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    Scan(ScanMessage),
    Boot(BootMessage),
    /// Known structure but an event type the pipeline does not handle;
    /// discarded with no side effects.
    Unrecognized(String),
}

/// Parse and validate a raw payload from the scan topic family.
pub fn parse_message(data: &[u8], zone: FixedOffset) -> Result<InboundMessage> {
    let raw: RawPayload = serde_json::from_slice(data)
        .map_err(|e| Error::Parse(format!("Invalid scan payload: {}", e)))?;

    let event_type = raw
        .event_type
        .ok_or_else(|| Error::Parse("Payload missing event_type".to_string()))?;

    let reader_code = match event_type.as_str() {
        "scan" | "boot" => raw
            .reader
            .ok_or_else(|| Error::Parse(format!("{} payload missing reader", event_type)))?,
        _ => return Ok(InboundMessage::Unrecognized(event_type)),
    };

    let raw_time = raw.timestamp.or(raw.scan_time);
    let (event_time, time_source) = normalize_event_time(raw_time.as_deref(), zone);

    match event_type.as_str() {
        "boot" => Ok(InboundMessage::Boot(BootMessage {
            reader_code,
            event_time,
            time_source,
        })),
        "scan" => {
            let uid = raw
                .uid
                .ok_or_else(|| Error::Parse("scan payload missing uid".to_string()))?;
            Ok(InboundMessage::Scan(ScanMessage {
                reader_code,
                uid,
                event_time,
                time_source,
            }))
        }
        _ => unreachable!(),
    }
}

/// Normalize an optional payload timestamp into a zone-naive time in the
/// reference zone. Timezone-aware inputs are converted; naive inputs are
/// taken to already be in the reference zone; anything unparsable falls
/// back to the current wall clock with a logged warning.
pub fn normalize_event_time(
    raw: Option<&str>,
    zone: FixedOffset,
) -> (NaiveDateTime, TimestampSource) {
    let raw = match raw {
        Some(s) => s,
        None => return (now_in_zone(zone), TimestampSource::Absent),
    };

    if let Ok(aware) = DateTime::parse_from_rfc3339(raw) {
        return (
            aware.with_timezone(&zone).naive_local(),
            TimestampSource::Payload,
        );
    }

    // ISO format without an offset, e.g. "2026-01-21T00:53:46.009191"
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
        return (naive, TimestampSource::Payload);
    }

    // "2026-01-21 00:53:46"
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
        return (naive, TimestampSource::Payload);
    }

    warn!(
        "Invalid timestamp in payload: {:?}, using server time",
        raw
    );
    (now_in_zone(zone), TimestampSource::Unparsable)
}

/// Current wall-clock time as a zone-naive value in the reference zone
pub fn now_in_zone(zone: FixedOffset) -> NaiveDateTime {
    Utc::now().with_timezone(&zone).naive_local()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, Timelike};

    fn ist() -> FixedOffset {
        FixedOffset::east_opt(5 * 3600 + 30 * 60).unwrap()
    }

    #[test]
    fn parses_scan_payload() {
        let body = br#"{"event_type":"scan","reader":"R-12A","uid":"04A1B2C3","timestamp":"2025-03-01T10:00:00Z"}"#;
        let msg = parse_message(body, ist()).unwrap();

        match msg {
            InboundMessage::Scan(scan) => {
                assert_eq!(scan.reader_code, "R-12A");
                assert_eq!(scan.uid, "04A1B2C3");
                // 10:00 UTC is 15:30 in the reference zone
                assert_eq!(
                    scan.event_time,
                    NaiveDate::from_ymd_opt(2025, 3, 1)
                        .unwrap()
                        .and_hms_opt(15, 30, 0)
                        .unwrap()
                );
                assert_eq!(scan.time_source, TimestampSource::Payload);
            }
            other => panic!("expected scan, got {:?}", other),
        }
    }

    #[test]
    fn parses_boot_payload() {
        let body = br#"{"event_type":"boot","reader":"R-12A"}"#;
        let msg = parse_message(body, ist()).unwrap();

        match msg {
            InboundMessage::Boot(boot) => {
                assert_eq!(boot.reader_code, "R-12A");
                assert_eq!(boot.time_source, TimestampSource::Absent);
            }
            other => panic!("expected boot, got {:?}", other),
        }
    }

    #[test]
    fn accepts_scan_time_field_name() {
        let body = br#"{"event_type":"scan","reader":"R-1","uid":"AA","scan_time":"2026-01-21 00:53:46"}"#;
        let msg = parse_message(body, ist()).unwrap();

        match msg {
            InboundMessage::Scan(scan) => {
                assert_eq!(
                    scan.event_time,
                    NaiveDate::from_ymd_opt(2026, 1, 21)
                        .unwrap()
                        .and_hms_opt(0, 53, 46)
                        .unwrap()
                );
                assert_eq!(scan.time_source, TimestampSource::Payload);
            }
            other => panic!("expected scan, got {:?}", other),
        }
    }

    #[test]
    fn naive_iso_timestamp_is_taken_as_reference_zone() {
        let (time, source) = normalize_event_time(Some("2026-01-21T00:53:46.009191"), ist());
        assert_eq!(source, TimestampSource::Payload);
        assert_eq!(
            time.date(),
            NaiveDate::from_ymd_opt(2026, 1, 21).unwrap()
        );
        assert_eq!(time.hour(), 0);
    }

    #[test]
    fn unparsable_timestamp_falls_back_to_wall_clock() {
        let before = now_in_zone(ist());
        let (time, source) = normalize_event_time(Some("not-a-timestamp"), ist());
        let after = now_in_zone(ist());

        assert_eq!(source, TimestampSource::Unparsable);
        assert!(time >= before && time <= after);
    }

    #[test]
    fn missing_uid_is_a_parse_error() {
        let body = br#"{"event_type":"scan","reader":"R-1"}"#;
        assert!(parse_message(body, ist()).is_err());
    }

    #[test]
    fn unrecognized_event_type_is_not_an_error() {
        let body = br#"{"event_type":"heartbeat","reader":"R-1"}"#;
        let msg = parse_message(body, ist()).unwrap();
        assert_eq!(
            msg,
            InboundMessage::Unrecognized("heartbeat".to_string())
        );
    }

    #[test]
    fn malformed_json_is_a_parse_error() {
        assert!(parse_message(b"{nope", ist()).is_err());
        assert!(parse_message(b"{}", ist()).is_err());
    }
}
