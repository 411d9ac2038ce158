use std::io::{BufRead, BufReader};

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use tracing::info;

use crate::cli::{CompressionMode, ProduceArgs};
use crate::decode;
use crate::model::{ProduceCounts, ProduceRunManifest};
use crate::store::{FsObjectStore, WatermarkStore};
use crate::util::{now_utc_string, parse_instant, utc_compact_string, write_json_pretty};

use super::chunker::ChunkWriter;
use super::feed;
use super::filter;

pub fn run(args: ProduceArgs) -> Result<()> {
    let started_ts = Utc::now();
    let started_at = now_utc_string();
    let run_id = format!("run-{}", utc_compact_string(started_ts));

    if args.chunk_capacity == 0 {
        bail!("chunk capacity must be positive");
    }

    let data_root = args.data_root.clone();
    let manifest_path = args.manifest_path.clone().unwrap_or_else(|| {
        data_root
            .join("manifests")
            .join(format!("produce_run_{}.json", utc_compact_string(started_ts)))
    });

    info!(source = %args.source_url, run_id = %run_id, "starting produce");

    let watermark_raw = match args.watermark.clone() {
        Some(explicit) => Some(explicit),
        None => WatermarkStore::new(data_root.join("watermark")).get()?,
    };
    let watermark = watermark_raw
        .as_deref()
        .map(parse_instant)
        .transpose()
        .context("invalid watermark")?;

    match watermark {
        Some(watermark) => info!(watermark = %watermark, "filtering records at or below watermark"),
        None => info!("no watermark, importing the full feed"),
    }

    let store = FsObjectStore::new(data_root.join(&args.bucket));
    let source = feed::open_source(&args.source_url)?;
    let decoded = decode::decoded_reader(source, CompressionMode::Auto)?;

    let namespace = utc_compact_string(started_ts);
    let mut writer = ChunkWriter::new(&store, &args.bucket, &namespace, args.chunk_capacity);
    let stats = partition_feed(BufReader::new(decoded), watermark, &mut writer)?;
    let chunks = writer.finish()?;

    let manifest = ProduceRunManifest {
        manifest_version: 1,
        run_id,
        status: "completed".to_string(),
        started_at: started_at.clone(),
        completed_at: now_utc_string(),
        source_url: args.source_url.clone(),
        bucket: args.bucket.clone(),
        chunk_capacity: args.chunk_capacity,
        watermark: watermark_raw,
        next_watermark: started_at,
        counts: ProduceCounts {
            lines_read: stats.lines_read,
            lines_accepted: stats.lines_accepted,
            lines_filtered: stats.lines_filtered,
            chunk_count: chunks.len(),
        },
        chunks,
    };

    write_json_pretty(&manifest_path, &manifest)?;

    info!(path = %manifest_path.display(), "wrote produce run manifest");
    info!(
        lines_read = manifest.counts.lines_read,
        accepted = manifest.counts.lines_accepted,
        filtered = manifest.counts.lines_filtered,
        chunks = manifest.counts.chunk_count,
        "produce completed"
    );

    Ok(())
}

#[derive(Debug, Default)]
pub(crate) struct FeedStats {
    pub(crate) lines_read: usize,
    pub(crate) lines_accepted: usize,
    pub(crate) lines_filtered: usize,
}

pub(crate) fn partition_feed(
    reader: impl BufRead,
    watermark: Option<DateTime<Utc>>,
    writer: &mut ChunkWriter<'_>,
) -> Result<FeedStats> {
    let mut stats = FeedStats::default();

    for line in reader.lines() {
        let line = line.context("failed to read source feed")?;
        if line.trim().is_empty() {
            continue;
        }
        stats.lines_read += 1;

        if filter::should_include(&line, watermark) {
            writer.push(line)?;
            stats.lines_accepted += 1;
        } else {
            stats.lines_filtered += 1;
        }
    }

    Ok(stats)
}
