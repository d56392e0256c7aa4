pub mod config;
mod error;
mod logging;
mod runtime;
pub mod services;
pub mod sync_job;

pub use error::AppError;

fn bootstrap() -> Result<config::AppConfig, AppError> {
    let dotenv_loaded = dotenvy::dotenv().is_ok();
    logging::init()?;

    let config = config::AppConfig::from_env()?;

    tracing::info!(
        dotenv_loaded,
        store = ?config.store,
        store_timeout_secs = config.store_timeout_secs,
        upstream_base_url = %config.upstream_base_url,
        upstream_timeout_secs = config.upstream_timeout_secs,
        upstream_utc_offset = %config.upstream_utc_offset,
        request_delay_ms = config.request_delay_ms,
        "application bootstrap initialized"
    );

    Ok(config)
}

/// Serves the HTTP trigger until the process is stopped.
pub fn run_api() -> Result<(), AppError> {
    let config = bootstrap()?;
    runtime::serve(config)
}

/// Runs a single sync pass and returns the process exit code.
pub fn run_job() -> Result<i32, AppError> {
    let config = bootstrap()?;
    runtime::run_once(config)
}
