use std::time::Duration;

use reqwest::{Client, Method, RequestBuilder, Response};
use serde::Deserialize;
use serde_json::Value;

use crate::app::services::{StationStore, StoreError};
use crate::domain::models::{
    InsertOutcome, NewMeasurement, NewSyncLogEntry, Station, StationMetadataUpdate, SyncDetails,
    SyncLogRecord,
};

const UNIQUE_VIOLATION_CODE: &str = "23505";

/// Store backed by a PostgREST endpoint (e.g. a Supabase project) using a
/// service key, so row-level policies do not apply.
#[derive(Debug, Clone)]
pub struct RestStationStore {
    client: Client,
    base_url: String,
    service_key: String,
}

#[derive(Debug, Deserialize)]
struct PostgrestError {
    code: Option<String>,
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SyncLogRow {
    id: Value,
    synced_at: String,
    success_count: i64,
    error_count: i64,
    #[serde(default)]
    details: Option<SyncDetails>,
}

impl RestStationStore {
    pub fn new(base_url: &str, service_key: &str, timeout: Duration) -> Result<Self, StoreError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| StoreError::Transport(error.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            service_key: service_key.to_string(),
        })
    }

    fn request(&self, method: Method, table: &str) -> RequestBuilder {
        self.client
            .request(method, format!("{}/rest/v1/{table}", self.base_url))
            .header("apikey", &self.service_key)
            .bearer_auth(&self.service_key)
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, StoreError> {
        let response = request
            .send()
            .await
            .map_err(|error| StoreError::Transport(error.to_string()))?;

        if response.status().is_success() {
            Ok(response)
        } else {
            Err(rejection(response).await)
        }
    }
}

async fn rejection(response: Response) -> StoreError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();

    match serde_json::from_str::<PostgrestError>(&body) {
        Ok(error) => StoreError::Rejected {
            status,
            code: error.code,
            message: error.message.unwrap_or(body),
        },
        Err(_) if body.trim().is_empty() => StoreError::Rejected {
            status,
            code: None,
            message: format!("HTTP {status}"),
        },
        Err(_) => StoreError::Rejected {
            status,
            code: None,
            message: body,
        },
    }
}

fn is_unique_violation(error: &StoreError) -> bool {
    match error {
        StoreError::Rejected { code, message, .. } => {
            code.as_deref() == Some(UNIQUE_VIOLATION_CODE)
                || message.contains("duplicate key")
                || message.contains("unique constraint")
        }
        _ => false,
    }
}

impl StationStore for RestStationStore {
    async fn list_active_stations(&self) -> Result<Vec<Station>, StoreError> {
        let request = self
            .request(Method::GET, "stations")
            .query(&[("select", "id,station_code,name"), ("is_deleted", "eq.false")]);

        self.send(request)
            .await?
            .json::<Vec<Station>>()
            .await
            .map_err(|error| StoreError::Decode(error.to_string()))
    }

    async fn insert_measurement(
        &self,
        measurement: &NewMeasurement,
    ) -> Result<InsertOutcome, StoreError> {
        let request = self
            .request(Method::POST, "station_measurements")
            .header("Prefer", "return=minimal")
            .json(measurement);

        match self.send(request).await {
            Ok(_) => Ok(InsertOutcome::Inserted),
            Err(error) if is_unique_violation(&error) => Ok(InsertOutcome::Duplicate),
            Err(error) => Err(error),
        }
    }

    async fn update_station_metadata(
        &self,
        station_id: i64,
        update: &StationMetadataUpdate,
    ) -> Result<(), StoreError> {
        let request = self
            .request(Method::PATCH, "stations")
            .query(&[("id", format!("eq.{station_id}"))])
            .header("Prefer", "return=minimal")
            .json(update);

        self.send(request).await.map(|_| ())
    }

    async fn insert_sync_log(&self, entry: &NewSyncLogEntry) -> Result<(), StoreError> {
        let request = self
            .request(Method::POST, "sync_logs")
            .header("Prefer", "return=minimal")
            .json(entry);

        self.send(request).await.map(|_| ())
    }

    async fn list_recent_sync_logs(&self, limit: u32) -> Result<Vec<SyncLogRecord>, StoreError> {
        let request = self.request(Method::GET, "sync_logs").query(&[
            ("select", "id,synced_at,success_count,error_count,details".to_string()),
            ("order", "synced_at.desc".to_string()),
            ("limit", limit.to_string()),
        ]);

        let rows = self
            .send(request)
            .await?
            .json::<Vec<SyncLogRow>>()
            .await
            .map_err(|error| StoreError::Decode(error.to_string()))?;

        Ok(rows
            .into_iter()
            .map(|row| SyncLogRecord {
                id: match row.id {
                    Value::String(id) => id,
                    other => other.to_string(),
                },
                synced_at: row.synced_at,
                success_count: row.success_count,
                error_count: row.error_count,
                details: row.details.unwrap_or_default(),
            })
            .collect())
    }
}
