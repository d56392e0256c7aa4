use chrono::FixedOffset;

use crate::adapters::upstream::DEFAULT_UPSTREAM_BASE_URL;
use crate::app::AppError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreTarget {
    Sqlite(String),
    Rest(String),
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub store: StoreTarget,
    pub store_service_key: String,
    pub store_timeout_secs: u64,
    pub upstream_base_url: String,
    pub upstream_timeout_secs: u64,
    pub upstream_utc_offset: FixedOffset,
    pub request_delay_ms: u64,
    pub http_bind: String,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let store_url = required(&lookup, "STORE_URL")?;
        let store_service_key = required(&lookup, "STORE_SERVICE_KEY")?;

        Ok(Self {
            store: parse_store_target(&store_url)?,
            store_service_key,
            store_timeout_secs: parse_or_default(&lookup, "STORE_TIMEOUT_SECS", 15_u64)?,
            upstream_base_url: optional(&lookup, "UPSTREAM_BASE_URL")
                .unwrap_or_else(|| DEFAULT_UPSTREAM_BASE_URL.to_string()),
            upstream_timeout_secs: parse_or_default(&lookup, "UPSTREAM_TIMEOUT_SECS", 15_u64)?,
            upstream_utc_offset: match optional(&lookup, "UPSTREAM_UTC_OFFSET") {
                Some(raw) => raw.parse::<FixedOffset>().map_err(|_| {
                    AppError::config("UPSTREAM_UTC_OFFSET must look like +07:00")
                })?,
                None => FixedOffset::east_opt(0)
                    .ok_or_else(|| AppError::config("UTC offset out of range"))?,
            },
            request_delay_ms: parse_or_default(&lookup, "REQUEST_DELAY_MS", 100_u64)?,
            http_bind: optional(&lookup, "HTTP_BIND").unwrap_or_else(|| "0.0.0.0:8080".to_string()),
        })
    }
}

fn optional<F>(lookup: &F, key: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn required<F>(lookup: &F, key: &str) -> Result<String, AppError>
where
    F: Fn(&str) -> Option<String>,
{
    optional(lookup, key).ok_or_else(|| AppError::config(format!("{key} is required")))
}

fn parse_store_target(url: &str) -> Result<StoreTarget, AppError> {
    if let Some(path) = url.strip_prefix("sqlite:") {
        let path = path.trim_start_matches("//");
        if path.is_empty() {
            return Err(AppError::config("STORE_URL sqlite path must not be empty"));
        }
        return Ok(StoreTarget::Sqlite(path.to_string()));
    }

    if url.starts_with("http://") || url.starts_with("https://") {
        return Ok(StoreTarget::Rest(url.trim_end_matches('/').to_string()));
    }

    Err(AppError::config(
        "STORE_URL must start with http://, https:// or sqlite:",
    ))
}

fn parse_or_default<T, F>(lookup: &F, key: &str, default: T) -> Result<T, AppError>
where
    T: std::str::FromStr + Copy,
    F: Fn(&str) -> Option<String>,
{
    match optional(lookup, key) {
        Some(raw) => raw
            .parse::<T>()
            .map_err(|_| AppError::config(format!("{key} must be a valid number"))),
        None => Ok(default),
    }
}
