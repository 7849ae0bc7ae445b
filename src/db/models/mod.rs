pub mod alert_models;
pub mod catalog_models;
pub mod scan_models;

pub use alert_models::AlertRecord;
pub use catalog_models::{LocationInfo, ResolvedReader, ResolvedTag};
pub use scan_models::{AssetStatusRow, ScanRecord};
