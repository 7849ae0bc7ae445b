use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Accepted scan joined with asset and room names, as served by the API
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ScanRecord {
    pub scan_time: NaiveDateTime,
    pub asset_code: String,
    pub asset_name: String,
    pub room_name: String,
}

/// One row of the asset status time series
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct AssetStatusRow {
    pub status: String,
    pub recorded_at: NaiveDateTime,
}
