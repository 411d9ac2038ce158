use std::io::BufReader;
use std::time::Instant;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use rusqlite::{Connection, params};
use tracing::info;

use crate::cli::ConsumeArgs;
use crate::decode;
use crate::model::ConsumeReport;
use crate::store::{FsObjectStore, ObjectStore};
use crate::util::{now_utc_string, write_json_pretty};

use super::db_setup;
use super::loader::{self, LoadOptions};

pub fn run(args: ConsumeArgs) -> Result<()> {
    let started = Instant::now();
    let started_at = now_utc_string();

    if args.batch_size == 0 {
        bail!("batch size must be positive");
    }

    let db_path = args
        .db_path
        .clone()
        .unwrap_or_else(|| args.data_root.join("catalog.sqlite"));

    info!(
        bucket = %args.bucket,
        key = %args.key,
        db = %db_path.display(),
        compression = args.compression.as_str(),
        "starting consume"
    );

    let store = FsObjectStore::new(args.data_root.join(&args.bucket));
    let object = store.get(&args.key)?;
    let decoded = decode::decoded_reader(object, args.compression)?;

    let mut connection = Connection::open(&db_path)
        .with_context(|| format!("failed to open database: {}", db_path.display()))?;
    db_setup::configure_connection(&connection)?;
    db_setup::ensure_schema(&connection)?;

    let options = LoadOptions {
        batch_size: args.batch_size,
        lang: args.lang.clone(),
    };
    let stats = loader::load_chunk(&mut connection, BufReader::new(decoded), &options)?;

    connection.execute(
        "INSERT INTO metadata(key, value) VALUES('last_import_at', ?1)
         ON CONFLICT(key) DO UPDATE SET value=excluded.value",
        params![Utc::now()],
    )?;
    connection.execute(
        "INSERT INTO metadata(key, value) VALUES('last_import_key', ?1)
         ON CONFLICT(key) DO UPDATE SET value=excluded.value",
        [args.key.as_str()],
    )?;

    let report = ConsumeReport {
        bucket: args.bucket.clone(),
        key: args.key.clone(),
        started_at,
        elapsed_ms: started.elapsed().as_millis() as u64,
        lines_read: stats.lines_read,
        processed: stats.processed,
        succeeded: stats.succeeded,
        failed: stats.failed,
        skipped: stats.skipped,
        batches_committed: stats.batches_committed,
        message: format!(
            "imported {} of {} lines from {}",
            stats.processed, stats.lines_read, args.key
        ),
    };

    if let Some(path) = &args.report_path {
        write_json_pretty(path, &report)?;
        info!(path = %path.display(), "wrote consume report");
    }

    info!(
        lines_read = report.lines_read,
        processed = report.processed,
        succeeded = report.succeeded,
        failed = report.failed,
        skipped = report.skipped,
        batches = report.batches_committed,
        elapsed_ms = report.elapsed_ms,
        "consume completed"
    );

    Ok(())
}
