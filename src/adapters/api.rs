use std::sync::Arc;

use actix_web::{HttpResponse, Responder, get, web};
use serde::Deserialize;

use crate::adapters::upstream::ReqwestHydroClient;
use crate::app::services::{StationStore, StoreError, StoreHandle};
use crate::app::sync_job::{SyncError, SyncJob};
use crate::domain::clock::SystemClock;

pub type AppSyncJob = SyncJob<ReqwestHydroClient, StoreHandle, SystemClock>;

#[derive(Clone)]
pub struct ApiState {
    pub job: Arc<AppSyncJob>,
}

#[derive(Debug, Deserialize)]
pub struct SyncLogQuery {
    pub limit: Option<u32>,
}

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(health)
        .service(
            web::resource("/sync-measurements")
                .route(web::get().to(trigger_sync))
                .route(web::post().to(trigger_sync)),
        )
        .service(list_sync_logs_endpoint);
}

#[get("/health")]
async fn health() -> impl Responder {
    HttpResponse::Ok().json(serde_json::json!({ "status": "ok" }))
}

async fn trigger_sync(state: web::Data<ApiState>) -> HttpResponse {
    match state.job.run().await {
        Ok(report) if report.is_total_failure() => {
            HttpResponse::InternalServerError().json(report)
        }
        Ok(report) => HttpResponse::Ok().json(report),
        Err(error) => sync_error_response(error),
    }
}

#[get("/sync-logs")]
async fn list_sync_logs_endpoint(
    state: web::Data<ApiState>,
    query: web::Query<SyncLogQuery>,
) -> impl Responder {
    let limit = query.limit.unwrap_or(20).clamp(1, 200);

    match state.job.store().list_recent_sync_logs(limit).await {
        Ok(logs) => HttpResponse::Ok().json(logs),
        Err(error) => store_error_response(error),
    }
}

fn sync_error_response(error: SyncError) -> HttpResponse {
    match error {
        SyncError::StationQuery(source) => {
            HttpResponse::InternalServerError().json(serde_json::json!({
                "error": "Failed to fetch stations",
                "details": source.to_string()
            }))
        }
        SyncError::NoActiveStations => HttpResponse::NotFound().json(serde_json::json!({
            "error": "No active stations found"
        })),
    }
}

fn store_error_response(error: StoreError) -> HttpResponse {
    HttpResponse::InternalServerError().json(serde_json::json!({
        "error": format!("store query failed: {error}")
    }))
}
