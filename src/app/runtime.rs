use std::sync::{Arc, Mutex};
use std::time::Duration;

use actix_web::{App, HttpServer, web};
use serde_json::json;

use crate::adapters::api::{ApiState, AppSyncJob, configure_routes};
use crate::adapters::db::{open_connection, run_migrations};
use crate::adapters::rest_store::RestStationStore;
use crate::adapters::upstream::ReqwestHydroClient;
use crate::app::config::{AppConfig, StoreTarget};
use crate::app::error::AppError;
use crate::app::services::{SqliteStationStore, StoreHandle};
use crate::app::sync_job::{SyncError, SyncJob, SyncSettings};
use crate::domain::clock::SystemClock;
use crate::domain::models::SyncReport;

pub const EXIT_OK: i32 = 0;
pub const EXIT_FAILURE: i32 = 1;
pub const EXIT_NO_STATIONS: i32 = 2;

fn build_store(config: &AppConfig) -> Result<StoreHandle, AppError> {
    match &config.store {
        StoreTarget::Sqlite(path) => {
            let mut connection = open_connection(path).map_err(AppError::store_init)?;
            run_migrations(&mut connection).map_err(AppError::store_init)?;
            Ok(StoreHandle::Sqlite(SqliteStationStore::new(Arc::new(
                Mutex::new(connection),
            ))))
        }
        StoreTarget::Rest(url) => RestStationStore::new(
            url,
            &config.store_service_key,
            Duration::from_secs(config.store_timeout_secs),
        )
        .map(StoreHandle::Rest)
        .map_err(AppError::store_init),
    }
}

fn build_job(config: &AppConfig) -> Result<AppSyncJob, AppError> {
    let store = build_store(config)?;
    let client = ReqwestHydroClient::new(
        &config.upstream_base_url,
        Duration::from_secs(config.upstream_timeout_secs),
    )
    .map_err(AppError::runtime)?;

    Ok(SyncJob::new(
        client,
        store,
        SystemClock,
        SyncSettings {
            request_delay: Duration::from_millis(config.request_delay_ms),
            upstream_utc_offset: config.upstream_utc_offset,
        },
    ))
}

pub fn serve(config: AppConfig) -> Result<(), AppError> {
    let api_state = ApiState {
        job: Arc::new(build_job(&config)?),
    };

    tracing::info!(bind = %config.http_bind, "http server starting");

    actix_web::rt::System::new()
        .block_on(async move {
            HttpServer::new(move || {
                App::new()
                    .app_data(web::Data::new(api_state.clone()))
                    .configure(configure_routes)
            })
            .bind(&config.http_bind)?
            .run()
            .await
        })
        .map_err(AppError::runtime)
}

pub fn run_once(config: AppConfig) -> Result<i32, AppError> {
    let job = build_job(&config)?;
    let outcome = actix_web::rt::System::new().block_on(async move { job.run().await });

    let body = match &outcome {
        Ok(report) => serde_json::to_value(report).map_err(AppError::runtime)?,
        Err(SyncError::StationQuery(source)) => json!({
            "error": "Failed to fetch stations",
            "details": source.to_string()
        }),
        Err(error) => json!({ "error": error.to_string() }),
    };
    let rendered = serde_json::to_string_pretty(&body).map_err(AppError::runtime)?;
    println!("{rendered}");

    Ok(exit_code(&outcome))
}

fn exit_code(outcome: &Result<SyncReport, SyncError>) -> i32 {
    match outcome {
        Ok(report) if report.is_total_failure() => EXIT_FAILURE,
        Ok(_) => EXIT_OK,
        Err(SyncError::NoActiveStations) => EXIT_NO_STATIONS,
        Err(SyncError::StationQuery(_)) => EXIT_FAILURE,
    }
}
