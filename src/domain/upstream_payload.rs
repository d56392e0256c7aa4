use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::normalize::{parse_api_date, to_number};

pub const UPSTREAM_SUCCESS_CODE: i64 = 200;

/// Envelope returned by the monitoring-station endpoint.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct UpstreamEnvelope {
    #[serde(rename = "statusCode")]
    pub status_code: i64,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub data: Option<UpstreamStationData>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct UpstreamStationData {
    // upstream spelling
    #[serde(rename = "featched_UTC", default)]
    pub fetched_utc: Option<String>,
    #[serde(default)]
    pub river: Option<String>,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(rename = "lastedWaterLevelM", default)]
    pub water_level_m: Option<WireNumber>,
    #[serde(rename = "rain_1h_mm", default)]
    pub rain_1h_mm: Option<WireNumber>,
    #[serde(rename = "rain_6h_mm", default)]
    pub rain_6h_mm: Option<WireNumber>,
    #[serde(rename = "rain_12h_mm", default)]
    pub rain_12h_mm: Option<WireNumber>,
    #[serde(rename = "rain_24h_mm", default)]
    pub rain_24h_mm: Option<WireNumber>,
    #[serde(rename = "rain_7to7_mm", default)]
    pub rain_7to7_mm: Option<WireNumber>,
    #[serde(rename = "alarm_level_m", default)]
    pub alarm_level_m: Option<WireNumber>,
    #[serde(rename = "flood_level_m", default)]
    pub flood_level_m: Option<WireNumber>,
}

/// Numeric fields are documented as strings but some stations send bare numbers.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum WireNumber {
    Number(f64),
    Text(String),
}

impl WireNumber {
    fn value(&self) -> Option<f64> {
        match self {
            Self::Number(number) => Some(*number).filter(|value| value.is_finite()),
            Self::Text(text) => to_number(Some(text)),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Rainfall {
    pub last_1h_mm: Option<f64>,
    pub last_6h_mm: Option<f64>,
    pub last_12h_mm: Option<f64>,
    pub last_24h_mm: Option<f64>,
    pub seven_to_seven_mm: Option<f64>,
}

/// A validated reading, ready to be turned into a measurement row.
#[derive(Debug, Clone, PartialEq)]
pub struct StationReading {
    pub measured_at: NaiveDateTime,
    pub water_level_m: Option<f64>,
    pub rainfall: Rainfall,
    pub fetched_at: Option<String>,
    pub river: Option<String>,
    pub alarm_level_m: Option<f64>,
    pub flood_level_m: Option<f64>,
}

impl StationReading {
    pub fn has_thresholds(&self) -> bool {
        self.alarm_level_m.is_some() || self.flood_level_m.is_some()
    }
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum PayloadError {
    #[error("{0}")]
    Upstream(String),
    #[error("No data returned from API")]
    NoData,
    #[error("Invalid date format: {0}")]
    InvalidDate(String),
}

pub fn decode_reading(envelope: UpstreamEnvelope) -> Result<StationReading, PayloadError> {
    if envelope.status_code != UPSTREAM_SUCCESS_CODE {
        return Err(PayloadError::Upstream(envelope.message.unwrap_or_else(|| {
            format!("upstream status code {}", envelope.status_code)
        })));
    }

    let data = envelope.data.ok_or(PayloadError::NoData)?;

    let raw_date = data.date.unwrap_or_default();
    let measured_at =
        parse_api_date(&raw_date).ok_or_else(|| PayloadError::InvalidDate(raw_date.clone()))?;

    Ok(StationReading {
        measured_at,
        water_level_m: number(&data.water_level_m),
        rainfall: Rainfall {
            last_1h_mm: number(&data.rain_1h_mm),
            last_6h_mm: number(&data.rain_6h_mm),
            last_12h_mm: number(&data.rain_12h_mm),
            last_24h_mm: number(&data.rain_24h_mm),
            seven_to_seven_mm: number(&data.rain_7to7_mm),
        },
        fetched_at: data.fetched_utc,
        river: data.river.filter(|river| !river.trim().is_empty()),
        alarm_level_m: number(&data.alarm_level_m),
        flood_level_m: number(&data.flood_level_m),
    })
}

fn number(field: &Option<WireNumber>) -> Option<f64> {
    field.as_ref().and_then(WireNumber::value)
}
