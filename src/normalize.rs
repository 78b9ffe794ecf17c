//! Maps the loosely-typed remote result payload into `ScanResult`.
//!
//! Tolerant of unknown extra fields, strict about mandatory ones: a missing
//! `status`, or a completed result without its analysis payload, is a
//! `ResultShape` error — never a silently defaulted value.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::error::ScanError;
use crate::types::{RemoteStatus, ScanResult};

/// Normalizes a raw result payload. Pure and synchronous.
pub fn normalize(raw: &Value) -> Result<ScanResult, ScanError> {
    let object = raw
        .as_object()
        .ok_or_else(|| ScanError::ResultShape("result payload is not an object".to_string()))?;

    let status = match object.get("status") {
        Some(Value::String(s)) => parse_status(s),
        Some(other) => {
            return Err(ScanError::ResultShape(format!(
                "status is not a string: {}",
                other
            )));
        }
        None => return Err(ScanError::ResultShape("missing status field".to_string())),
    };

    if status != RemoteStatus::Completed {
        // Nothing mandatory beyond the status itself for a failed result.
        return Ok(ScanResult {
            status,
            scores: BTreeMap::new(),
            recommendations: Vec::new(),
            generated_at: parse_generated_at(object)?,
        });
    }

    let scores = match object.get("scores") {
        Some(Value::Object(map)) => parse_scores(map)?,
        Some(other) => {
            return Err(ScanError::ResultShape(format!(
                "scores is not an object: {}",
                other
            )));
        }
        None => return Err(ScanError::ResultShape("missing scores field".to_string())),
    };

    let recommendations = match object.get("recommendations") {
        Some(value) => parse_recommendations(value)?,
        None => {
            return Err(ScanError::ResultShape(
                "missing recommendations field".to_string(),
            ));
        }
    };

    let generated_at = parse_generated_at(object)?;
    if generated_at.is_none() {
        return Err(ScanError::ResultShape(
            "missing generated_at field".to_string(),
        ));
    }

    Ok(ScanResult {
        status,
        scores,
        recommendations,
        generated_at,
    })
}

fn parse_status(s: &str) -> RemoteStatus {
    match s {
        "pending" => RemoteStatus::Pending,
        "processing" => RemoteStatus::Processing,
        "completed" => RemoteStatus::Completed,
        "failed" => RemoteStatus::Failed,
        other => RemoteStatus::Other(other.to_string()),
    }
}

fn parse_scores(
    map: &serde_json::Map<String, Value>,
) -> Result<BTreeMap<String, f64>, ScanError> {
    let mut scores = BTreeMap::new();
    for (concern, value) in map {
        let severity = value.as_f64().ok_or_else(|| {
            ScanError::ResultShape(format!("score for '{}' is not a number: {}", concern, value))
        })?;
        scores.insert(concern.clone(), severity);
    }
    Ok(scores)
}

/// Accepts both wire shapes the service has emitted: a flat array of
/// strings, or `{summary, priority_actions: [...]}` flattened in display
/// order (summary first).
fn parse_recommendations(value: &Value) -> Result<Vec<String>, ScanError> {
    match value {
        Value::Array(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                match item {
                    Value::String(s) => out.push(s.clone()),
                    other => {
                        return Err(ScanError::ResultShape(format!(
                            "recommendation is not a string: {}",
                            other
                        )));
                    }
                }
            }
            Ok(out)
        }
        Value::Object(map) => {
            let mut out = Vec::new();
            if let Some(Value::String(summary)) = map.get("summary") {
                out.push(summary.clone());
            }
            if let Some(actions) = map.get("priority_actions") {
                out.extend(parse_recommendations(actions)?);
            }
            if out.is_empty() {
                return Err(ScanError::ResultShape(
                    "recommendations object carries neither summary nor priority_actions"
                        .to_string(),
                ));
            }
            Ok(out)
        }
        other => Err(ScanError::ResultShape(format!(
            "recommendations is neither an array nor an object: {}",
            other
        ))),
    }
}

fn parse_generated_at(
    object: &serde_json::Map<String, Value>,
) -> Result<Option<DateTime<Utc>>, ScanError> {
    let value = object.get("generated_at").or_else(|| object.get("generatedAt"));
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => parse_timestamp(s)
            .map(Some)
            .ok_or_else(|| ScanError::ResultShape(format!("unparseable generated_at: {}", s))),
        Some(other) => Err(ScanError::ResultShape(format!(
            "generated_at is not a string: {}",
            other
        ))),
    }
}

/// The backend emits bare ISO-8601 without an offset; accept that and full
/// RFC 3339.
fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}
