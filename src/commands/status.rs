use std::fs;

use anyhow::{Context, Result};
use rusqlite::{Connection, OptionalExtension};
use tracing::{info, warn};

use crate::cli::StatusArgs;
use crate::store::WatermarkStore;

const COUNTED_TABLES: [&str; 12] = [
    "product",
    "nutriments",
    "tag",
    "category",
    "allergen",
    "country",
    "additive",
    "product_tag",
    "product_category",
    "product_allergen",
    "product_country",
    "product_additive",
];

pub fn run(args: StatusArgs) -> Result<()> {
    let db_path = args
        .db_path
        .clone()
        .unwrap_or_else(|| args.data_root.join("catalog.sqlite"));

    info!(data_root = %args.data_root.display(), "status requested");

    match WatermarkStore::new(args.data_root.join("watermark")).get()? {
        Some(watermark) => info!(%watermark, "stored watermark"),
        None => info!("no stored watermark, the next produce run imports the full feed"),
    }

    let manifest_dir = args.data_root.join("manifests");
    if manifest_dir.exists() {
        let manifest_count = fs::read_dir(&manifest_dir)
            .with_context(|| format!("failed to read {}", manifest_dir.display()))?
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.path().extension().is_some_and(|ext| ext == "json"))
            .count();
        info!(path = %manifest_dir.display(), manifests = manifest_count, "manifest directory");
    } else {
        warn!(path = %manifest_dir.display(), "manifest directory missing");
    }

    if db_path.exists() {
        let connection = Connection::open(&db_path)
            .with_context(|| format!("failed to open {}", db_path.display()))?;

        let schema_version = metadata_value(&connection, "db_schema_version")
            .ok()
            .flatten()
            .unwrap_or_default();
        let last_import_at = metadata_value(&connection, "last_import_at")
            .ok()
            .flatten()
            .unwrap_or_default();
        let last_import_key = metadata_value(&connection, "last_import_key")
            .ok()
            .flatten()
            .unwrap_or_default();

        info!(
            path = %db_path.display(),
            schema_version = %schema_version,
            last_import_at = %last_import_at,
            last_import_key = %last_import_key,
            "database status"
        );

        for table in COUNTED_TABLES {
            let rows =
                query_count(&connection, &format!("SELECT COUNT(*) FROM {table}")).unwrap_or(0);
            info!(table, rows, "table count");
        }
    } else {
        warn!(path = %db_path.display(), "database file missing");
    }

    Ok(())
}

fn metadata_value(connection: &Connection, key: &str) -> Result<Option<String>> {
    let value = connection
        .query_row("SELECT value FROM metadata WHERE key = ?1", [key], |row| {
            row.get(0)
        })
        .optional()?;
    Ok(value)
}

fn query_count(connection: &Connection, sql: &str) -> Result<i64> {
    let count = connection.query_row(sql, [], |row| row.get(0))?;
    Ok(count)
}
