use crate::db::models::{LocationInfo, ResolvedReader, ResolvedTag};
use crate::error::Error;
use anyhow::Result;
use sqlx::PgConnection;

/// Read-only lookups against the reference catalog. Every method takes the
/// caller's connection so resolutions happen inside the per-message
/// transaction; there is no caching, so catalog edits take effect on the
/// next message.
pub struct ReferenceResolver;

impl ReferenceResolver {
    pub fn new() -> Self {
        Self
    }

    /// Resolve a reader wire code to its reader id and room
    pub async fn resolve_reader(
        &self,
        conn: &mut PgConnection,
        code: &str,
    ) -> Result<Option<ResolvedReader>> {
        let result = sqlx::query_as::<_, ResolvedReader>(
            r#"
            SELECT rr.reader_id, r.room_id
            FROM room_rfid_readers rr
            JOIN rooms r ON rr.room_id = r.room_id
            WHERE rr.reader_code = $1
            "#,
        )
        .bind(code)
        .fetch_optional(conn)
        .await
        .map_err(|e| Error::Database(format!("Failed to resolve reader {}: {}", code, e)))?;

        Ok(result)
    }

    /// All registered reader codes, for unknown-reader diagnostics
    pub async fn known_reader_codes(&self, conn: &mut PgConnection) -> Result<Vec<String>> {
        let rows = sqlx::query_as::<_, (String,)>(
            r#"
            SELECT reader_code
            FROM room_rfid_readers
            ORDER BY reader_code
            "#,
        )
        .fetch_all(conn)
        .await
        .map_err(|e| Error::Database(format!("Failed to list reader codes: {}", e)))?;

        Ok(rows.into_iter().map(|(code,)| code).collect())
    }

    /// Resolve an RFID uid to its tag and asset. A tag row with no asset
    /// mapping does not resolve; the scan is handled as an unknown tag.
    pub async fn resolve_tag(
        &self,
        conn: &mut PgConnection,
        uid: &str,
    ) -> Result<Option<ResolvedTag>> {
        let result = sqlx::query_as::<_, ResolvedTag>(
            r#"
            SELECT tag_id, asset_id
            FROM asset_tags
            WHERE rfid_uid = $1
              AND asset_id IS NOT NULL
            "#,
        )
        .bind(uid)
        .fetch_optional(conn)
        .await
        .map_err(|e| Error::Database(format!("Failed to resolve tag {}: {}", uid, e)))?;

        Ok(result)
    }

    /// Room, floor and building names for alert text. Absence is tolerated;
    /// callers fall back to a generic message.
    pub async fn resolve_location(
        &self,
        conn: &mut PgConnection,
        room_id: i32,
    ) -> Result<Option<LocationInfo>> {
        let result = sqlx::query_as::<_, LocationInfo>(
            r#"
            SELECT r.room_name, f.name AS floor_name, b.name AS building_name
            FROM rooms r
            JOIN floors f ON r.floor_id = f.floor_id
            JOIN buildings b ON f.building_id = b.building_id
            WHERE r.room_id = $1
            "#,
        )
        .bind(room_id)
        .fetch_optional(conn)
        .await
        .map_err(|e| Error::Database(format!("Failed to resolve location {}: {}", room_id, e)))?;

        Ok(result)
    }

    /// True iff any geofence rule for the asset matches the room, its floor
    /// or its building. No rules for an asset means not allowed.
    pub async fn is_allowed(
        &self,
        conn: &mut PgConnection,
        asset_id: i32,
        room_id: i32,
    ) -> Result<bool> {
        let row = sqlx::query(
            r#"
            SELECT 1
            FROM asset_allowed_locations aal
            JOIN rooms r ON r.room_id = $1
            JOIN floors f ON r.floor_id = f.floor_id
            JOIN buildings b ON f.building_id = b.building_id
            WHERE aal.asset_id = $2
              AND (
                aal.room_id = r.room_id OR
                aal.floor_id = f.floor_id OR
                aal.building_id = b.building_id
              )
            "#,
        )
        .bind(room_id)
        .bind(asset_id)
        .fetch_optional(conn)
        .await
        .map_err(|e| Error::Database(format!("Failed geofence check for asset {}: {}", asset_id, e)))?;

        Ok(row.is_some())
    }
}

impl Default for ReferenceResolver {
    fn default() -> Self {
        Self::new()
    }
}
