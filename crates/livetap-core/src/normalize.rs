//! Event normalizer.
//!
//! [`normalize`] accepts any `Serialize + Debug` value and produces a
//! [`NormalizedEvent`] whose payload is plain JSON:
//!
//! - object keys starting with `_` are dropped
//! - object fields whose value is `null` are dropped
//! - nesting deeper than [`MAX_DEPTH`] is collapsed into its JSON text
//! - a value that cannot be serialized at all falls back to its `Debug` text
//!
//! The function never fails, so one malformed record cannot halt ingestion.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::debug;

use crate::events::NormalizedEvent;

/// Depth at which nested structures are stringified instead of walked.
pub const MAX_DEPTH: usize = 16;

/// Normalize a raw event received now.
pub fn normalize<E>(event_type: &str, raw: &E) -> NormalizedEvent
where
    E: Serialize + fmt::Debug + ?Sized,
{
    normalize_at(event_type, raw, Utc::now())
}

/// Normalize a raw event with an explicit receive time.
pub fn normalize_at<E>(event_type: &str, raw: &E, timestamp: DateTime<Utc>) -> NormalizedEvent
where
    E: Serialize + fmt::Debug + ?Sized,
{
    let data = match serde_json::to_value(raw) {
        Ok(value) => sanitize(value),
        Err(e) => {
            debug!(event_type, error = %e, "event not serializable, using debug text");
            Value::String(format!("{raw:?}"))
        }
    };
    NormalizedEvent::new(event_type, timestamp, data)
}

/// Strip private keys and null fields, bounding depth.
pub fn sanitize(value: Value) -> Value {
    sanitize_at(value, 0)
}

fn sanitize_at(value: Value, depth: usize) -> Value {
    if depth >= MAX_DEPTH && matches!(value, Value::Object(_) | Value::Array(_)) {
        return Value::String(value.to_string());
    }
    match value {
        Value::Object(map) => {
            let cleaned: Map<String, Value> = map
                .into_iter()
                .filter(|(key, v)| !key.starts_with('_') && !v.is_null())
                .map(|(key, v)| (key, sanitize_at(v, depth + 1)))
                .collect();
            Value::Object(cleaned)
        }
        Value::Array(items) => {
            Value::Array(items.into_iter().map(|v| sanitize_at(v, depth + 1)).collect())
        }
        other => other,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
