use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};

pub fn now_utc_string() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

pub fn utc_compact_string(ts: DateTime<Utc>) -> String {
    ts.format("%Y%m%dT%H%M%SZ").to_string()
}

pub fn parse_instant(raw: &str) -> Result<DateTime<Utc>> {
    let trimmed = raw.trim();

    // bare ISO-8601 watermarks carry no offset and are UTC by contract
    if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S") {
        return Ok(naive.and_utc());
    }

    let parsed = DateTime::parse_from_rfc3339(trimmed)
        .with_context(|| format!("failed to parse timestamp: {trimmed}"))?;
    Ok(parsed.with_timezone(&Utc))
}

pub fn ensure_directory(path: &Path) -> Result<()> {
    fs::create_dir_all(path)
        .with_context(|| format!("failed to create directory: {}", path.display()))
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

pub fn write_json_pretty<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        ensure_directory(parent)?;
    }

    let data = serde_json::to_vec_pretty(value)
        .with_context(|| format!("failed to serialize json: {}", path.display()))?;

    let mut file = File::create(path)
        .with_context(|| format!("failed to create json file: {}", path.display()))?;
    file.write_all(&data)
        .with_context(|| format!("failed to write json file: {}", path.display()))?;
    file.write_all(b"\n")
        .with_context(|| format!("failed to finalize json file: {}", path.display()))?;

    Ok(())
}
