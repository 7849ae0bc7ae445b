use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Alert model
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct AlertRecord {
    pub alert_id: i64,
    pub asset_id: Option<i32>,
    pub alert_type: String,
    pub alert_message: String,
    pub generated_at: NaiveDateTime,
    pub acknowledged_at: Option<NaiveDateTime>,
    pub acknowledged_by: Option<i32>,
}
