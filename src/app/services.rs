use std::sync::{Arc, Mutex};

use rusqlite::Connection;
use thiserror::Error;

use crate::adapters::db;
use crate::adapters::db::DbError;
use crate::adapters::rest_store::RestStationStore;
use crate::domain::models::{
    InsertOutcome, NewMeasurement, NewSyncLogEntry, Station, StationMetadataUpdate, SyncLogRecord,
};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database lock poisoned")]
    DbLockPoisoned,
    #[error("database operation failed: {0}")]
    Database(#[from] DbError),
    #[error("store request failed: {0}")]
    Transport(String),
    #[error("{message}")]
    Rejected {
        status: u16,
        code: Option<String>,
        message: String,
    },
    #[error("failed to decode store response: {0}")]
    Decode(String),
}

/// Persistence boundary of the sync job.
#[allow(async_fn_in_trait)]
pub trait StationStore {
    async fn list_active_stations(&self) -> Result<Vec<Station>, StoreError>;
    async fn insert_measurement(
        &self,
        measurement: &NewMeasurement,
    ) -> Result<InsertOutcome, StoreError>;
    async fn update_station_metadata(
        &self,
        station_id: i64,
        update: &StationMetadataUpdate,
    ) -> Result<(), StoreError>;
    async fn insert_sync_log(&self, entry: &NewSyncLogEntry) -> Result<(), StoreError>;
    async fn list_recent_sync_logs(&self, limit: u32) -> Result<Vec<SyncLogRecord>, StoreError>;
}

#[derive(Clone)]
pub struct SqliteStationStore {
    connection: Arc<Mutex<Connection>>,
}

impl SqliteStationStore {
    pub fn new(connection: Arc<Mutex<Connection>>) -> Self {
        Self { connection }
    }

    fn with_connection<T>(
        &self,
        op: impl FnOnce(&Connection) -> Result<T, DbError>,
    ) -> Result<T, StoreError> {
        let connection = self
            .connection
            .lock()
            .map_err(|_| StoreError::DbLockPoisoned)?;
        op(&connection).map_err(StoreError::from)
    }
}

impl StationStore for SqliteStationStore {
    async fn list_active_stations(&self) -> Result<Vec<Station>, StoreError> {
        self.with_connection(db::list_active_stations)
    }

    async fn insert_measurement(
        &self,
        measurement: &NewMeasurement,
    ) -> Result<InsertOutcome, StoreError> {
        self.with_connection(|connection| db::insert_measurement(connection, measurement))
    }

    async fn update_station_metadata(
        &self,
        station_id: i64,
        update: &StationMetadataUpdate,
    ) -> Result<(), StoreError> {
        self.with_connection(|connection| {
            db::update_station_metadata(connection, station_id, update)
        })
    }

    async fn insert_sync_log(&self, entry: &NewSyncLogEntry) -> Result<(), StoreError> {
        self.with_connection(|connection| db::insert_sync_log(connection, entry).map(|_| ()))
    }

    async fn list_recent_sync_logs(&self, limit: u32) -> Result<Vec<SyncLogRecord>, StoreError> {
        self.with_connection(|connection| db::list_recent_sync_logs(connection, limit))
    }
}

/// The store selected by `STORE_URL`.
#[derive(Clone)]
pub enum StoreHandle {
    Sqlite(SqliteStationStore),
    Rest(RestStationStore),
}

impl StationStore for StoreHandle {
    async fn list_active_stations(&self) -> Result<Vec<Station>, StoreError> {
        match self {
            Self::Sqlite(store) => store.list_active_stations().await,
            Self::Rest(store) => store.list_active_stations().await,
        }
    }

    async fn insert_measurement(
        &self,
        measurement: &NewMeasurement,
    ) -> Result<InsertOutcome, StoreError> {
        match self {
            Self::Sqlite(store) => store.insert_measurement(measurement).await,
            Self::Rest(store) => store.insert_measurement(measurement).await,
        }
    }

    async fn update_station_metadata(
        &self,
        station_id: i64,
        update: &StationMetadataUpdate,
    ) -> Result<(), StoreError> {
        match self {
            Self::Sqlite(store) => store.update_station_metadata(station_id, update).await,
            Self::Rest(store) => store.update_station_metadata(station_id, update).await,
        }
    }

    async fn insert_sync_log(&self, entry: &NewSyncLogEntry) -> Result<(), StoreError> {
        match self {
            Self::Sqlite(store) => store.insert_sync_log(entry).await,
            Self::Rest(store) => store.insert_sync_log(entry).await,
        }
    }

    async fn list_recent_sync_logs(&self, limit: u32) -> Result<Vec<SyncLogRecord>, StoreError> {
        match self {
            Self::Sqlite(store) => store.list_recent_sync_logs(limit).await,
            Self::Rest(store) => store.list_recent_sync_logs(limit).await,
        }
    }
}
