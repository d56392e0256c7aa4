use std::time::Duration;

use chrono::{FixedOffset, TimeZone, Utc};
use thiserror::Error;
use tracing::Instrument;

use crate::adapters::upstream::{FetchError, HydroClient};
use crate::app::services::{StationStore, StoreError};
use crate::domain::clock::{Clock, to_iso8601};
use crate::domain::models::{
    InsertOutcome, MEASUREMENT_SOURCE_AUTOMATED, MEASUREMENT_STATUS_VERIFIED, NewMeasurement,
    NewSyncLogEntry, Station, StationError, StationMetadataUpdate, StationResult, SyncDetails,
    SyncReport,
};
use crate::domain::upstream_payload::{PayloadError, StationReading, decode_reading};

pub const SYNC_COMPLETED_MESSAGE: &str = "Sync completed";

#[derive(Debug, Clone, Copy)]
pub struct SyncSettings {
    pub request_delay: Duration,
    pub upstream_utc_offset: FixedOffset,
}

/// Errors that stop a run before any station is processed.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Failed to fetch stations: {0}")]
    StationQuery(#[source] StoreError),
    #[error("No active stations found")]
    NoActiveStations,
}

/// Why a single station could not be synced. The `Display` text is what lands
/// in the run details.
#[derive(Debug, Error)]
enum StationFailure {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Payload(#[from] PayloadError),
    #[error(transparent)]
    Store(StoreError),
}

pub struct SyncJob<C, S, Cl> {
    client: C,
    store: S,
    clock: Cl,
    settings: SyncSettings,
}

impl<C, S, Cl> SyncJob<C, S, Cl>
where
    C: HydroClient,
    S: StationStore,
    Cl: Clock,
{
    pub fn new(client: C, store: S, clock: Cl, settings: SyncSettings) -> Self {
        Self {
            client,
            store,
            clock,
            settings,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Runs one sync pass over every active station.
    pub async fn run(&self) -> Result<SyncReport, SyncError> {
        let run_id = uuid::Uuid::new_v4();
        self.run_pass()
            .instrument(tracing::info_span!("sync_run", %run_id))
            .await
    }

    async fn run_pass(&self) -> Result<SyncReport, SyncError> {
        let stations = self.store.list_active_stations().await.map_err(|error| {
            tracing::error!(error = %error, "failed to load active stations");
            SyncError::StationQuery(error)
        })?;

        if stations.is_empty() {
            tracing::warn!("no active stations found; nothing to sync");
            return Err(SyncError::NoActiveStations);
        }

        tracing::info!(stations = stations.len(), "starting sync");

        let mut details = SyncDetails::default();
        for (index, station) in stations.iter().enumerate() {
            if index > 0 && !self.settings.request_delay.is_zero() {
                actix_web::rt::time::sleep(self.settings.request_delay).await;
            }

            match self.sync_station(station).await {
                Ok(InsertOutcome::Inserted) => {
                    tracing::info!(
                        station_code = %station.station_code,
                        name = %station.name,
                        "measurement synced"
                    );
                    details.results.push(StationResult {
                        station: station.station_code.clone(),
                        success: true,
                    });
                }
                Ok(InsertOutcome::Duplicate) => {
                    tracing::info!(
                        station_code = %station.station_code,
                        name = %station.name,
                        "measurement already stored; skipped"
                    );
                    details.results.push(StationResult {
                        station: station.station_code.clone(),
                        success: true,
                    });
                }
                Err(failure) => {
                    tracing::warn!(
                        station_code = %station.station_code,
                        error = %failure,
                        "station sync failed"
                    );
                    details.errors.push(StationError {
                        station: station.station_code.clone(),
                        error: failure.to_string(),
                    });
                }
            }
        }

        let synced_at = to_iso8601(self.clock.now());
        let success_count = details.results.len();
        let error_count = details.errors.len();

        let entry = NewSyncLogEntry {
            synced_at: synced_at.clone(),
            success_count: success_count as i64,
            error_count: error_count as i64,
            details: details.clone(),
        };
        if let Err(error) = self.store.insert_sync_log(&entry).await {
            tracing::error!(error = %error, "failed to record sync log");
        }

        tracing::info!(
            success_count,
            error_count,
            total_stations = stations.len(),
            "sync completed"
        );

        Ok(SyncReport {
            message: SYNC_COMPLETED_MESSAGE.to_string(),
            success_count,
            error_count,
            total_stations: stations.len(),
            synced_at,
            details,
        })
    }

    async fn sync_station(&self, station: &Station) -> Result<InsertOutcome, StationFailure> {
        tracing::debug!(
            station_code = %station.station_code,
            name = %station.name,
            "fetching station reading"
        );

        let envelope = self.client.fetch_station(&station.station_code).await?;
        let reading = decode_reading(envelope)?;
        let measurement = self.build_measurement(station, &reading)?;

        let outcome = self
            .store
            .insert_measurement(&measurement)
            .await
            .map_err(StationFailure::Store);

        if reading.has_thresholds() {
            self.refresh_station_metadata(station, &reading).await;
        }

        outcome
    }

    fn build_measurement(
        &self,
        station: &Station,
        reading: &StationReading,
    ) -> Result<NewMeasurement, PayloadError> {
        let measured_at = self
            .settings
            .upstream_utc_offset
            .from_local_datetime(&reading.measured_at)
            .single()
            .ok_or_else(|| PayloadError::InvalidDate(reading.measured_at.to_string()))?;

        Ok(NewMeasurement {
            station_id: station.id,
            measured_at: to_iso8601(measured_at.with_timezone(&Utc)),
            water_level: reading.water_level_m,
            rainfall_1h: reading.rainfall.last_1h_mm,
            rainfall_6h: reading.rainfall.last_6h_mm,
            rainfall_12h: reading.rainfall.last_12h_mm,
            rainfall_24h: reading.rainfall.last_24h_mm,
            rainfall_7to7: reading.rainfall.seven_to_seven_mm,
            fetched_at: reading.fetched_at.clone(),
            source: MEASUREMENT_SOURCE_AUTOMATED.to_string(),
            status: MEASUREMENT_STATUS_VERIFIED.to_string(),
        })
    }

    /// Best effort: failures are logged and never reach the run details.
    async fn refresh_station_metadata(&self, station: &Station, reading: &StationReading) {
        let update = StationMetadataUpdate {
            alarm_level: reading.alarm_level_m,
            flood_level: reading.flood_level_m,
            river: reading.river.clone(),
        };

        if let Err(error) = self.store.update_station_metadata(station.id, &update).await {
            tracing::warn!(
                station_code = %station.station_code,
                error = %error,
                "failed to update station thresholds"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use chrono::{DateTime, FixedOffset, TimeZone, Utc};
    use rusqlite::Connection;
    use serde_json::json;

    use crate::adapters::db::{
        count_measurements, count_sync_logs, get_station_metadata, insert_station,
        list_recent_sync_logs,
    };
    use crate::adapters::upstream::{FetchError, HydroClient};
    use crate::app::services::{SqliteStationStore, StationStore, StoreError};
    use crate::domain::clock::Clock;
    use crate::domain::models::{
        InsertOutcome, NewMeasurement, NewSyncLogEntry, Station, StationMetadataUpdate,
        SyncLogRecord,
    };
    use crate::domain::upstream_payload::UpstreamEnvelope;
    use crate::test_support::open_test_connection;

    use super::{SyncError, SyncJob, SyncSettings};

    #[derive(Default)]
    struct FakeHydroClient {
        responses: HashMap<String, Result<UpstreamEnvelope, FetchError>>,
        calls: Mutex<Vec<String>>,
    }

    impl FakeHydroClient {
        fn with(mut self, code: &str, response: Result<UpstreamEnvelope, FetchError>) -> Self {
            self.responses.insert(code.to_string(), response);
            self
        }
    }

    impl HydroClient for FakeHydroClient {
        async fn fetch_station(&self, station_code: &str) -> Result<UpstreamEnvelope, FetchError> {
            self.calls
                .lock()
                .expect("calls lock")
                .push(station_code.to_string());
            self.responses
                .get(station_code)
                .cloned()
                .unwrap_or_else(|| Err(FetchError::Transport("connection refused".to_string())))
        }
    }

    struct FixedClock(DateTime<Utc>);

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.0
        }
    }

    fn clock() -> FixedClock {
        FixedClock(
            Utc.with_ymd_and_hms(2025, 12, 2, 4, 0, 0)
                .single()
                .expect("valid fixture"),
        )
    }

    fn settings() -> SyncSettings {
        SyncSettings {
            request_delay: Duration::ZERO,
            upstream_utc_offset: FixedOffset::east_opt(0).expect("valid offset"),
        }
    }

    fn reading(date: &str, water_level: &str) -> Result<UpstreamEnvelope, FetchError> {
        Ok(serde_json::from_value(json!({
            "statusCode": 200,
            "message": "OK",
            "data": {
                "featched_UTC": "2025-12-02T03:35:11Z",
                "river": "Mekong",
                "date": date,
                "lastedWaterLevelM": water_level,
                "rain_1h_mm": "0.4",
                "rain_6h_mm": null,
                "rain_12h_mm": "",
                "rain_24h_mm": "12.0",
                "rain_7to7_mm": "null",
                "alarm_level_m": null,
                "flood_level_m": null
            }
        }))
        .expect("envelope fixture"))
    }

    fn sqlite_store(name: &str) -> (SqliteStationStore, Arc<Mutex<Connection>>) {
        let connection = Arc::new(Mutex::new(open_test_connection(name)));
        (SqliteStationStore::new(Arc::clone(&connection)), connection)
    }

    fn seed(connection: &Arc<Mutex<Connection>>, stations: &[(&str, &str)]) -> Vec<i64> {
        let db = connection.lock().expect("db lock");
        stations
            .iter()
            .map(|(code, name)| insert_station(&db, code, name).expect("station insert"))
            .collect()
    }

    #[actix_web::test]
    async fn mixed_outcomes_are_aggregated_and_logged() {
        let (store, connection) = sqlite_store("job-mixed");
        let ids = seed(
            &connection,
            &[("KH01", "Kratie"), ("KH02", "Stung Treng"), ("LA01", "Pakse")],
        );
        let client = FakeHydroClient::default()
            .with(
                "KH01",
                Err(FetchError::Status {
                    status: 500,
                    reason: "Internal Server Error".to_string(),
                }),
            )
            .with("KH02", reading("12/02/2025 03:30", "4.10"))
            .with("LA01", reading("Dec2,2025 3:30:00AM", "3.52"));
        let job = SyncJob::new(client, store, clock(), settings());

        let report = job.run().await.expect("run should complete");

        assert_eq!(report.message, "Sync completed");
        assert_eq!(report.success_count, 1);
        assert_eq!(report.error_count, 2);
        assert_eq!(report.total_stations, 3);
        assert_eq!(report.synced_at, "2025-12-02T04:00:00.000Z");
        assert!(!report.is_total_failure());
        assert_eq!(report.details.results[0].station, "LA01");
        assert_eq!(report.details.errors[0].station, "KH01");
        assert_eq!(report.details.errors[0].error, "HTTP 500: Internal Server Error");
        assert_eq!(report.details.errors[1].station, "KH02");
        assert_eq!(
            report.details.errors[1].error,
            "Invalid date format: 12/02/2025 03:30"
        );

        let db = connection.lock().expect("db lock");
        assert_eq!(count_measurements(&db, ids[2]).expect("count"), 1);
        assert_eq!(count_measurements(&db, ids[0]).expect("count"), 0);
        let logs = list_recent_sync_logs(&db, 5).expect("logs");
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].success_count, 1);
        assert_eq!(logs[0].error_count, 2);
        assert_eq!(logs[0].details, report.details);
    }

    #[actix_web::test]
    async fn network_failure_does_not_abort_later_stations() {
        let (store, connection) = sqlite_store("job-network-failure");
        seed(&connection, &[("KH01", "Kratie"), ("LA01", "Pakse")]);
        let client = FakeHydroClient::default()
            .with("LA01", reading("Dec2,2025 3:30:00AM", "3.52"));
        let job = SyncJob::new(client, store, clock(), settings());

        let report = job.run().await.expect("run should complete");

        assert_eq!(report.details.errors.len(), 1);
        assert_eq!(report.details.errors[0].station, "KH01");
        assert_eq!(
            report.details.errors[0].error,
            "request failed: connection refused"
        );
        assert_eq!(report.details.results.len(), 1);
        assert_eq!(report.details.results[0].station, "LA01");
        assert!(report.details.results[0].success);
    }

    #[actix_web::test]
    async fn rerun_treats_existing_measurement_as_success() {
        let (store, connection) = sqlite_store("job-duplicate");
        let ids = seed(&connection, &[("KH01", "Kratie")]);
        let client =
            FakeHydroClient::default().with("KH01", reading("Dec2,2025 3:30:00AM", "3.52"));
        let job = SyncJob::new(client, store, clock(), settings());

        let first = job.run().await.expect("first run should complete");
        let second = job.run().await.expect("second run should complete");

        assert_eq!(first.success_count, 1);
        assert_eq!(second.success_count, 1);
        assert_eq!(second.error_count, 0);
        let db = connection.lock().expect("db lock");
        assert_eq!(count_measurements(&db, ids[0]).expect("count"), 1);
        assert_eq!(count_sync_logs(&db).expect("count"), 2);
    }

    #[actix_web::test]
    async fn stores_normalized_measurement_fields() {
        let (store, connection) = sqlite_store("job-measurement-fields");
        let ids = seed(&connection, &[("KH01", "Kratie")]);
        let client =
            FakeHydroClient::default().with("KH01", reading("Dec2,2025 3:30:00AM", "3.52"));
        let job = SyncJob::new(
            client,
            store,
            clock(),
            SyncSettings {
                request_delay: Duration::ZERO,
                upstream_utc_offset: FixedOffset::east_opt(7 * 3600).expect("valid offset"),
            },
        );

        job.run().await.expect("run should complete");

        let db = connection.lock().expect("db lock");
        let row: (String, Option<f64>, Option<f64>, Option<f64>, Option<f64>, String, String) = db
            .query_row(
                "SELECT measured_at, water_level, rainfall_1h, rainfall_12h, rainfall_24h, source, status
                 FROM station_measurements WHERE station_id = ?1",
                [ids[0]],
                |row| {
                    Ok((
                        row.get(0)?,
                        row.get(1)?,
                        row.get(2)?,
                        row.get(3)?,
                        row.get(4)?,
                        row.get(5)?,
                        row.get(6)?,
                    ))
                },
            )
            .expect("measurement row");
        assert_eq!(row.0, "2025-12-01T20:30:00.000Z");
        assert_eq!(row.1, Some(3.52));
        assert_eq!(row.2, Some(0.4));
        assert_eq!(row.3, None);
        assert_eq!(row.4, Some(12.0));
        assert_eq!(row.5, "automated");
        assert_eq!(row.6, "verified");
    }

    #[actix_web::test]
    async fn upstream_logic_errors_are_recorded_per_station() {
        let (store, connection) = sqlite_store("job-upstream-errors");
        seed(&connection, &[("KH01", "Kratie"), ("KH02", "Stung Treng")]);
        let client = FakeHydroClient::default()
            .with(
                "KH01",
                Ok(serde_json::from_value(json!({"statusCode": 404, "message": "Station not found"}))
                    .expect("envelope fixture")),
            )
            .with(
                "KH02",
                Ok(serde_json::from_value(json!({"statusCode": 200, "message": "OK"}))
                    .expect("envelope fixture")),
            );
        let job = SyncJob::new(client, store, clock(), settings());

        let report = job.run().await.expect("run should complete");

        assert!(report.is_total_failure());
        assert_eq!(report.details.errors[0].error, "Station not found");
        assert_eq!(report.details.errors[1].error, "No data returned from API");
    }

    #[actix_web::test]
    async fn thresholds_from_payload_update_station() {
        let (store, connection) = sqlite_store("job-thresholds");
        let ids = seed(&connection, &[("KH01", "Kratie")]);
        let envelope = serde_json::from_value(json!({
            "statusCode": 200,
            "data": {
                "date": "Dec2,2025 3:30:00AM",
                "river": "Mekong",
                "lastedWaterLevelM": "3.52",
                "alarm_level_m": "22.0",
                "flood_level_m": "23.0"
            }
        }))
        .expect("envelope fixture");
        let client = FakeHydroClient::default().with("KH01", Ok(envelope));
        let job = SyncJob::new(client, store, clock(), settings());

        job.run().await.expect("run should complete");

        let db = connection.lock().expect("db lock");
        let metadata = get_station_metadata(&db, ids[0])
            .expect("query should succeed")
            .expect("station should exist");
        assert_eq!(metadata.alarm_level, Some(22.0));
        assert_eq!(metadata.flood_level, Some(23.0));
        assert_eq!(metadata.river.as_deref(), Some("Mekong"));
    }

    #[actix_web::test]
    async fn zero_active_stations_stops_without_sync_log() {
        let (store, connection) = sqlite_store("job-no-stations");
        let job = SyncJob::new(FakeHydroClient::default(), store, clock(), settings());

        let error = job.run().await.expect_err("empty fleet should fail");

        assert!(matches!(error, SyncError::NoActiveStations));
        assert_eq!(error.to_string(), "No active stations found");
        let db = connection.lock().expect("db lock");
        assert_eq!(count_sync_logs(&db).expect("count"), 0);
    }

    #[derive(Default)]
    struct ScriptedStore {
        stations: Option<Vec<Station>>,
        fail_inserts: bool,
        fail_metadata: bool,
        fail_log: bool,
        metadata_updates: Mutex<Vec<i64>>,
        logs: Mutex<Vec<NewSyncLogEntry>>,
    }

    fn rejected(message: &str) -> StoreError {
        StoreError::Rejected {
            status: 500,
            code: None,
            message: message.to_string(),
        }
    }

    impl StationStore for ScriptedStore {
        async fn list_active_stations(&self) -> Result<Vec<Station>, StoreError> {
            self.stations
                .clone()
                .ok_or_else(|| StoreError::Transport("connection reset".to_string()))
        }

        async fn insert_measurement(
            &self,
            _measurement: &NewMeasurement,
        ) -> Result<InsertOutcome, StoreError> {
            if self.fail_inserts {
                Err(rejected("permission denied for table station_measurements"))
            } else {
                Ok(InsertOutcome::Inserted)
            }
        }

        async fn update_station_metadata(
            &self,
            station_id: i64,
            _update: &StationMetadataUpdate,
        ) -> Result<(), StoreError> {
            self.metadata_updates
                .lock()
                .expect("updates lock")
                .push(station_id);
            if self.fail_metadata {
                Err(rejected("stations is read-only"))
            } else {
                Ok(())
            }
        }

        async fn insert_sync_log(&self, entry: &NewSyncLogEntry) -> Result<(), StoreError> {
            if self.fail_log {
                return Err(rejected("sync_logs unavailable"));
            }
            self.logs.lock().expect("logs lock").push(entry.clone());
            Ok(())
        }

        async fn list_recent_sync_logs(
            &self,
            _limit: u32,
        ) -> Result<Vec<SyncLogRecord>, StoreError> {
            Ok(Vec::new())
        }
    }

    fn station(id: i64, code: &str) -> Station {
        Station {
            id,
            station_code: code.to_string(),
            name: format!("Station {code}"),
        }
    }

    #[actix_web::test]
    async fn station_query_failure_is_fatal() {
        let client = FakeHydroClient::default();
        let job = SyncJob::new(client, ScriptedStore::default(), clock(), settings());

        let error = job.run().await.expect_err("query failure should be fatal");

        assert!(matches!(error, SyncError::StationQuery(_)));
        assert!(job.client.calls.lock().expect("calls lock").is_empty());
        assert!(job.store().logs.lock().expect("logs lock").is_empty());
    }

    #[actix_web::test]
    async fn store_failures_are_per_station_and_side_effects_are_best_effort() {
        let store = ScriptedStore {
            stations: Some(vec![station(1, "KH01"), station(2, "LA01")]),
            fail_inserts: true,
            fail_metadata: true,
            ..ScriptedStore::default()
        };
        let envelope = serde_json::from_value(json!({
            "statusCode": 200,
            "data": {"date": "Dec2,2025 3:30:00AM", "flood_level_m": "23.0"}
        }))
        .expect("envelope fixture");
        let client = FakeHydroClient::default()
            .with("KH01", Ok(envelope))
            .with("LA01", reading("Dec2,2025 3:30:00AM", "3.52"));
        let job = SyncJob::new(client, store, clock(), settings());

        let report = job.run().await.expect("run should complete");

        assert_eq!(report.error_count, 2);
        assert_eq!(
            report.details.errors[0].error,
            "permission denied for table station_measurements"
        );
        assert_eq!(
            *job.store().metadata_updates.lock().expect("updates lock"),
            vec![1]
        );
        let logs = job.store().logs.lock().expect("logs lock");
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].error_count, 2);
    }

    #[actix_web::test]
    async fn sync_log_failure_does_not_change_report() {
        let store = ScriptedStore {
            stations: Some(vec![station(1, "KH01")]),
            fail_log: true,
            ..ScriptedStore::default()
        };
        let client =
            FakeHydroClient::default().with("KH01", reading("Dec2,2025 3:30:00AM", "3.52"));
        let job = SyncJob::new(client, store, clock(), settings());

        let report = job.run().await.expect("run should complete");

        assert_eq!(report.success_count, 1);
        assert_eq!(report.error_count, 0);
        assert!(!report.is_total_failure());
    }

    #[actix_web::test]
    async fn stations_are_fetched_in_list_order_with_delay() {
        let store = ScriptedStore {
            stations: Some(vec![station(1, "B"), station(2, "A"), station(3, "C")]),
            ..ScriptedStore::default()
        };
        let job = SyncJob::new(
            FakeHydroClient::default(),
            store,
            clock(),
            SyncSettings {
                request_delay: Duration::from_millis(20),
                upstream_utc_offset: FixedOffset::east_opt(0).expect("valid offset"),
            },
        );

        let started = std::time::Instant::now();
        let report = job.run().await.expect("run should complete");

        assert!(started.elapsed() >= Duration::from_millis(40));
        assert_eq!(report.error_count, 3);
        assert_eq!(
            *job.client.calls.lock().expect("calls lock"),
            vec!["B".to_string(), "A".to_string(), "C".to_string()]
        );
    }
}
