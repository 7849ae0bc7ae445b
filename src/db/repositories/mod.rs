pub mod alerts;
pub mod scans;
