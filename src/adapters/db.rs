use rusqlite::{Connection, ErrorCode, OptionalExtension, params};
use thiserror::Error;

use crate::domain::models::{
    InsertOutcome, NewMeasurement, NewSyncLogEntry, Station, StationMetadataUpdate, SyncDetails,
    SyncLogRecord,
};

pub const LATEST_SCHEMA_VERSION: u32 = 2;

const MIGRATIONS: &[(u32, &str)] = &[
    (
        1,
        r#"
CREATE TABLE IF NOT EXISTS stations (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    station_code TEXT NOT NULL UNIQUE,
    name TEXT NOT NULL,
    is_deleted INTEGER NOT NULL DEFAULT 0,
    alarm_level REAL,
    flood_level REAL,
    river TEXT
);

CREATE TABLE IF NOT EXISTS station_measurements (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    station_id INTEGER NOT NULL REFERENCES stations(id),
    measured_at TEXT NOT NULL,
    water_level REAL,
    rainfall_1h REAL,
    rainfall_6h REAL,
    rainfall_12h REAL,
    rainfall_24h REAL,
    rainfall_7to7 REAL,
    fetched_at TEXT,
    source TEXT NOT NULL,
    status TEXT NOT NULL,
    UNIQUE (station_id, measured_at)
);

CREATE INDEX IF NOT EXISTS idx_station_measurements_measured_at_desc
ON station_measurements (station_id, measured_at DESC);
"#,
    ),
    (
        2,
        r#"
CREATE TABLE IF NOT EXISTS sync_logs (
    id TEXT PRIMARY KEY,
    synced_at TEXT NOT NULL,
    success_count INTEGER NOT NULL,
    error_count INTEGER NOT NULL,
    details TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_sync_logs_synced_at_desc
ON sync_logs (synced_at DESC);
"#,
    ),
];

#[derive(Debug, Error)]
pub enum DbError {
    #[error("database operation failed: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("unsupported schema version {current}; latest supported is {latest}")]
    UnsupportedSchemaVersion { current: u32, latest: u32 },
    #[error("failed to encode sync log details: {0}")]
    Details(#[from] serde_json::Error),
}

pub fn open_connection(path: &str) -> Result<Connection, DbError> {
    let connection = Connection::open(path)?;
    connection.pragma_update(None, "foreign_keys", true)?;
    Ok(connection)
}

pub fn run_migrations(connection: &mut Connection) -> Result<(), DbError> {
    let current_version = schema_version(connection)?;

    if current_version > LATEST_SCHEMA_VERSION {
        return Err(DbError::UnsupportedSchemaVersion {
            current: current_version,
            latest: LATEST_SCHEMA_VERSION,
        });
    }

    let transaction = connection.transaction()?;

    for (version, sql) in MIGRATIONS {
        if *version > current_version {
            transaction.execute_batch(sql)?;
            transaction.pragma_update(None, "user_version", version)?;
        }
    }

    transaction.commit()?;

    Ok(())
}

pub fn schema_version(connection: &Connection) -> Result<u32, DbError> {
    let version = connection.pragma_query_value(None, "user_version", |row| row.get(0))?;
    Ok(version)
}

pub fn insert_station(
    connection: &Connection,
    station_code: &str,
    name: &str,
) -> Result<i64, DbError> {
    connection.execute(
        "INSERT INTO stations (station_code, name) VALUES (?1, ?2)",
        params![station_code, name],
    )?;

    Ok(connection.last_insert_rowid())
}

pub fn list_active_stations(connection: &Connection) -> Result<Vec<Station>, DbError> {
    let mut statement = connection.prepare(
        "SELECT id, station_code, name
         FROM stations
         WHERE is_deleted = 0
         ORDER BY id",
    )?;

    let rows = statement.query_map([], |row| {
        Ok(Station {
            id: row.get(0)?,
            station_code: row.get(1)?,
            name: row.get(2)?,
        })
    })?;

    let mut stations = Vec::new();
    for row in rows {
        stations.push(row?);
    }

    Ok(stations)
}

/// Inserts a measurement; an existing `(station_id, measured_at)` row is reported
/// as [`InsertOutcome::Duplicate`] and left untouched.
pub fn insert_measurement(
    connection: &Connection,
    measurement: &NewMeasurement,
) -> Result<InsertOutcome, DbError> {
    let result = connection.execute(
        "INSERT INTO station_measurements (
            station_id, measured_at, water_level, rainfall_1h, rainfall_6h, rainfall_12h,
            rainfall_24h, rainfall_7to7, fetched_at, source, status
         ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        params![
            measurement.station_id,
            measurement.measured_at,
            measurement.water_level,
            measurement.rainfall_1h,
            measurement.rainfall_6h,
            measurement.rainfall_12h,
            measurement.rainfall_24h,
            measurement.rainfall_7to7,
            measurement.fetched_at,
            measurement.source,
            measurement.status,
        ],
    );

    match result {
        Ok(_) => Ok(InsertOutcome::Inserted),
        Err(error) if is_unique_violation(&error) => Ok(InsertOutcome::Duplicate),
        Err(error) => Err(DbError::from(error)),
    }
}

fn is_unique_violation(error: &rusqlite::Error) -> bool {
    matches!(
        error,
        rusqlite::Error::SqliteFailure(failure, _)
            if failure.code == ErrorCode::ConstraintViolation
                && (failure.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                    || failure.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY)
    )
}

pub fn count_measurements(connection: &Connection, station_id: i64) -> Result<i64, DbError> {
    let count = connection.query_row(
        "SELECT COUNT(*) FROM station_measurements WHERE station_id = ?1",
        params![station_id],
        |row| row.get(0),
    )?;
    Ok(count)
}

pub fn update_station_metadata(
    connection: &Connection,
    station_id: i64,
    update: &StationMetadataUpdate,
) -> Result<(), DbError> {
    connection.execute(
        "UPDATE stations SET alarm_level = ?1, flood_level = ?2, river = ?3 WHERE id = ?4",
        params![update.alarm_level, update.flood_level, update.river, station_id],
    )?;
    Ok(())
}

pub fn get_station_metadata(
    connection: &Connection,
    station_id: i64,
) -> Result<Option<StationMetadataUpdate>, DbError> {
    let metadata = connection
        .query_row(
            "SELECT alarm_level, flood_level, river FROM stations WHERE id = ?1",
            params![station_id],
            |row| {
                Ok(StationMetadataUpdate {
                    alarm_level: row.get(0)?,
                    flood_level: row.get(1)?,
                    river: row.get(2)?,
                })
            },
        )
        .optional()?;
    Ok(metadata)
}

pub fn insert_sync_log(
    connection: &Connection,
    entry: &NewSyncLogEntry,
) -> Result<String, DbError> {
    let id = uuid::Uuid::new_v4().to_string();
    let details = serde_json::to_string(&entry.details)?;

    connection.execute(
        "INSERT INTO sync_logs (id, synced_at, success_count, error_count, details)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![id, entry.synced_at, entry.success_count, entry.error_count, details],
    )?;

    Ok(id)
}

pub fn list_recent_sync_logs(
    connection: &Connection,
    limit: u32,
) -> Result<Vec<SyncLogRecord>, DbError> {
    let mut statement = connection.prepare(
        "SELECT id, synced_at, success_count, error_count, details
         FROM sync_logs
         ORDER BY synced_at DESC, rowid DESC
         LIMIT ?1",
    )?;

    let rows = statement.query_map(params![i64::from(limit)], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, i64>(2)?,
            row.get::<_, i64>(3)?,
            row.get::<_, String>(4)?,
        ))
    })?;

    let mut logs = Vec::new();
    for row in rows {
        let (id, synced_at, success_count, error_count, details) = row?;
        let details: SyncDetails = serde_json::from_str(&details)?;
        logs.push(SyncLogRecord {
            id,
            synced_at,
            success_count,
            error_count,
            details,
        });
    }

    Ok(logs)
}

pub fn count_sync_logs(connection: &Connection) -> Result<i64, DbError> {
    let count = connection.query_row("SELECT COUNT(*) FROM sync_logs", [], |row| row.get(0))?;
    Ok(count)
}
