use std::sync::LazyLock;

use chrono::NaiveDateTime;
use regex::Regex;

static MONTH_DAY_YEAR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"([A-Za-z]{3})(\d{1,2}),(\d{4})").expect("month/day/year pattern is valid")
});

static MERIDIEM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(\d)(AM|PM)\b").expect("meridiem pattern is valid"));

const API_DATE_FORMATS: &[&str] = &["%b %d, %Y %I:%M:%S %p", "%b %d, %Y %I:%M %p"];

/// Parses the upstream's compact date format, e.g. `Dec2,2025 3:30:00AM`.
///
/// The value carries no zone information and is returned as-is; callers decide
/// which offset it belongs to. Malformed input yields `None` and is logged.
pub fn parse_api_date(raw: &str) -> Option<NaiveDateTime> {
    let normalized = normalize_api_date(raw);

    let parsed = API_DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(&normalized, format).ok());

    if parsed.is_none() {
        tracing::warn!(raw, normalized = %normalized, "failed to parse upstream date");
    }

    parsed
}

fn normalize_api_date(raw: &str) -> String {
    let spaced_date = MONTH_DAY_YEAR.replace(raw.trim(), "$1 $2, $3");
    let spaced_time = MERIDIEM.replace(&spaced_date, "$1 $2");
    spaced_time.into_owned()
}

/// Coerces an upstream numeric string into a number.
///
/// Missing values, `""`, the literal `"null"` and anything that is not a finite
/// float map to `None`.
pub fn to_number(raw: Option<&str>) -> Option<f64> {
    let text = raw?.trim();
    if text.is_empty() || text == "null" {
        return None;
    }

    text.parse::<f64>().ok().filter(|value| value.is_finite())
}
