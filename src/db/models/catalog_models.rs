use serde::{Deserialize, Serialize};

/// Reader resolved by its wire code
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ResolvedReader {
    pub reader_id: i32,
    pub room_id: i32,
}

/// RFID tag resolved to its cataloged asset
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ResolvedTag {
    pub tag_id: i32,
    pub asset_id: i32,
}

/// Human-readable location names, used for alert text only
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct LocationInfo {
    pub room_name: String,
    pub floor_name: String,
    pub building_name: String,
}

impl LocationInfo {
    pub fn describe(&self) -> String {
        format!(
            "{}, {}, {}",
            self.room_name, self.floor_name, self.building_name
        )
    }
}
