use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

// The only field the producer inspects. Everything else passes through as
// raw line text for the consumer to parse.
#[derive(Debug, Deserialize)]
struct ModifiedProbe {
    #[serde(default)]
    last_modified_t: Option<Value>,
}

/// Keep a line iff its modification instant is strictly newer than the
/// watermark. Lines without a usable instant are always kept (fail open).
pub(crate) fn should_include(line: &str, watermark: Option<DateTime<Utc>>) -> bool {
    let Some(watermark) = watermark else {
        return true;
    };

    match extract_modified(line) {
        Some(modified) => modified > watermark,
        None => true,
    }
}

fn extract_modified(line: &str) -> Option<DateTime<Utc>> {
    let probe: ModifiedProbe = match serde_json::from_str(line) {
        Ok(probe) => probe,
        Err(_) => return None,
    };
    let value = probe.last_modified_t?;

    let epoch = match &value {
        Value::Number(number) => number.as_i64(),
        Value::String(raw) => raw.trim().parse::<i64>().ok(),
        _ => None,
    };
    let Some(epoch) = epoch else {
        warn!(value = %value, "unreadable last_modified_t, keeping line");
        return None;
    };

    match DateTime::from_timestamp(epoch, 0) {
        Some(instant) => Some(instant),
        None => {
            warn!(epoch, "last_modified_t out of range, keeping line");
            None
        }
    }
}
