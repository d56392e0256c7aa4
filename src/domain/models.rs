use serde::{Deserialize, Serialize};

pub const MEASUREMENT_SOURCE_AUTOMATED: &str = "automated";
pub const MEASUREMENT_STATUS_VERIFIED: &str = "verified";

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Station {
    pub id: i64,
    pub station_code: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewMeasurement {
    pub station_id: i64,
    pub measured_at: String,
    pub water_level: Option<f64>,
    pub rainfall_1h: Option<f64>,
    pub rainfall_6h: Option<f64>,
    pub rainfall_12h: Option<f64>,
    pub rainfall_24h: Option<f64>,
    pub rainfall_7to7: Option<f64>,
    pub fetched_at: Option<String>,
    pub source: String,
    pub status: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    Duplicate,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StationMetadataUpdate {
    pub alarm_level: Option<f64>,
    pub flood_level: Option<f64>,
    pub river: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct StationResult {
    pub station: String,
    pub success: bool,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct StationError {
    pub station: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct SyncDetails {
    pub results: Vec<StationResult>,
    pub errors: Vec<StationError>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewSyncLogEntry {
    pub synced_at: String,
    pub success_count: i64,
    pub error_count: i64,
    pub details: SyncDetails,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct SyncLogRecord {
    pub id: String,
    pub synced_at: String,
    pub success_count: i64,
    pub error_count: i64,
    pub details: SyncDetails,
}

/// Summary returned to whoever triggered the run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncReport {
    pub message: String,
    pub success_count: usize,
    pub error_count: usize,
    pub total_stations: usize,
    pub synced_at: String,
    pub details: SyncDetails,
}

impl SyncReport {
    /// A run with partial failures still counts as completed.
    pub fn is_total_failure(&self) -> bool {
        self.success_count == 0 && self.error_count > 0
    }
}
