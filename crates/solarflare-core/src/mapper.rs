//! Maps raw DONKI `FLR` payloads to [`NewFlare`] values.
//!
//! Each record is mapped on its own: a bad record is skipped, the rest of the
//! batch goes through.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;
use thiserror::Error;

use crate::models::NewFlare;
use crate::time::parse_time;

/// `2025-01-21T10:08:00-FLR-001` and the seconds-less `2025-01-21T10:08-FLR-001`.
static FLARE_TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\d{4}-\d{2}-\d{2}T\d{2}:\d{2}(?::\d{2})?Z?-[A-Z]+-\d+")
        .expect("flare tag pattern is valid")
});

/// Why a single payload could not be mapped.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MapError {
    #[error("payload is not a JSON object")]
    NotAnObject,

    #[error("payload has no flrID")]
    MissingIdentifier,

    #[error("{flare_id}: missing required field '{field}'")]
    MissingField {
        flare_id: String,
        field: &'static str,
    },

    #[error("{flare_id}: invalid timestamp in '{field}': {value}")]
    InvalidTimestamp {
        flare_id: String,
        field: &'static str,
        value: String,
    },
}

/// Derive the stable identifier from a raw `flrID`.
///
/// Returns the embedded `<timestamp>-FLR-<n>` tag when there is one, the
/// trimmed raw value otherwise, and `None` for a blank value.
pub fn extract_flare_id(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    match FLARE_TAG.find(trimmed) {
        Some(tag) => Some(tag.as_str().to_string()),
        None => {
            tracing::debug!(flr_id = %trimmed, "flrID has no timestamp tag, using it verbatim");
            Some(trimmed.to_string())
        }
    }
}

/// Map one upstream payload.
pub fn map_payload(payload: &Value) -> Result<NewFlare, MapError> {
    let fields = payload.as_object().ok_or(MapError::NotAnObject)?;

    let external_id = fields
        .get("flrID")
        .and_then(Value::as_str)
        .and_then(extract_flare_id)
        .ok_or(MapError::MissingIdentifier)?;

    let begin_time = required_time(payload, &external_id, "beginTime")?;
    let peak_time = required_time(payload, &external_id, "peakTime")?;
    let end_time = match non_empty_str(payload, "endTime") {
        Some(raw) => Some(parse_field(&external_id, "endTime", raw)?),
        None => None,
    };

    Ok(NewFlare {
        begin_time,
        peak_time,
        end_time,
        class_type: non_empty_str(payload, "classType")
            .unwrap_or_default()
            .to_string(),
        source_location: non_empty_str(payload, "sourceLocation").map(str::to_string),
        active_region_num: fields
            .get("activeRegionNum")
            .and_then(Value::as_i64)
            .and_then(|n| i32::try_from(n).ok()),
        linked_events: fields.get("linkedEvents").filter(|v| !v.is_null()).cloned(),
        external_id,
    })
}

/// Map a batch, dropping (and logging) records that fail.
///
/// Returns the mapped flares in input order and the number skipped.
pub fn map_batch(payloads: &[Value]) -> (Vec<NewFlare>, usize) {
    let mut flares = Vec::with_capacity(payloads.len());
    let mut skipped = 0;
    for payload in payloads {
        match map_payload(payload) {
            Ok(flare) => flares.push(flare),
            Err(e) => {
                tracing::warn!(error = %e, "Skipping flare payload");
                skipped += 1;
            }
        }
    }
    (flares, skipped)
}

fn non_empty_str<'a>(payload: &'a Value, field: &str) -> Option<&'a str> {
    payload
        .get(field)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

fn required_time(
    payload: &Value,
    flare_id: &str,
    field: &'static str,
) -> Result<chrono::DateTime<chrono::Utc>, MapError> {
    let raw = non_empty_str(payload, field).ok_or_else(|| MapError::MissingField {
        flare_id: flare_id.to_string(),
        field,
    })?;
    parse_field(flare_id, field, raw)
}

fn parse_field(
    flare_id: &str,
    field: &'static str,
    raw: &str,
) -> Result<chrono::DateTime<chrono::Utc>, MapError> {
    parse_time(raw).map_err(|_| MapError::InvalidTimestamp {
        flare_id: flare_id.to_string(),
        field,
        value: raw.to_string(),
    })
}
