use std::fs;
use std::io::{Cursor, Write};

use flate2::Compression;
use flate2::write::GzEncoder;
use rusqlite::Connection;
use tempfile::tempdir;

use crate::cli::{CompressionMode, ConsumeArgs};
use crate::model::{Dimension, ProductRecord};
use crate::store::{FsObjectStore, ObjectStore};

use super::*;

fn open_db() -> Connection {
    let connection = Connection::open_in_memory().expect("open in-memory db");
    db_setup::configure_connection(&connection).expect("configure");
    db_setup::ensure_schema(&connection).expect("schema");
    connection
}

fn load_lines(connection: &mut Connection, chunk: &str, batch_size: usize) -> loader::LoadStats {
    let options = loader::LoadOptions {
        batch_size,
        lang: "en".to_string(),
    };
    loader::load_chunk(connection, Cursor::new(chunk), &options).expect("load chunk")
}

fn count(connection: &Connection, table: &str) -> i64 {
    connection
        .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| {
            row.get(0)
        })
        .expect("count")
}

fn gzip(text: &str) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(text.as_bytes()).expect("gzip write");
    encoder.finish().expect("gzip finish")
}

#[test]
fn normalize_tags_folds_case_strips_prefix_and_dedups() {
    let raw = vec![
        "en:Dairy".to_string(),
        "fr:Lait".to_string(),
        "EN: Cheese ".to_string(),
        "en:dairy".to_string(),
    ];

    let names = tags::normalize_tags(&raw, "en");

    assert_eq!(names, vec!["dairy".to_string(), "cheese".to_string()]);
}

#[test]
fn normalize_tags_drops_empty_results_and_preserves_first_occurrence_order() {
    let raw = vec![
        "en:  ".to_string(),
        "en:Zucchini".to_string(),
        "en:apple".to_string(),
        "en:Zucchini".to_string(),
    ];

    let names = tags::normalize_tags(&raw, "en");

    assert_eq!(names, vec!["zucchini".to_string(), "apple".to_string()]);
}

#[test]
fn normalize_tags_of_empty_input_is_empty() {
    assert!(tags::normalize_tags(&[], "en").is_empty());
}

#[test]
fn record_codec_tolerates_unknown_fields_and_string_barcodes() {
    let record: ProductRecord = serde_json::from_str(
        r#"{"code":"3017620422003","product_name":"Nutella","brand":"Ferrero","unexpected":{"deep":true}}"#,
    )
    .expect("parse");

    assert_eq!(record.code, Some(3017620422003));
    assert_eq!(record.display_name(), "Nutella");
}

#[test]
fn record_codec_rejects_wrong_typed_fields() {
    assert!(serde_json::from_str::<ProductRecord>(r#"{"code":{"x":1}}"#).is_err());
    assert!(serde_json::from_str::<ProductRecord>(r#"{"code":"12a"}"#).is_err());
    assert!(
        serde_json::from_str::<ProductRecord>(r#"{"code":"1","labels_tags":"not-a-list"}"#)
            .is_err()
    );
}

#[test]
fn record_codec_reads_hyphenated_nutriment_fields() {
    let record: ProductRecord = serde_json::from_str(
        r#"{"code":"1","nutriments":{"saturated-fat":1.5,"saturated-fat_100g":3.0,"energy":10.0}}"#,
    )
    .expect("parse");

    let facts = record.nutriments.expect("nutriments");
    assert_eq!(facts.saturated_fat, Some(1.5));
    assert_eq!(facts.saturated_fat_100g, Some(3.0));
    assert_eq!(facts.energy, Some(10.0));
    assert_eq!(facts.fiber, None);
}

#[test]
fn display_name_falls_back_to_sentinel() {
    let blank: ProductRecord =
        serde_json::from_str(r#"{"code":"1","product_name":"   "}"#).expect("parse");
    assert_eq!(blank.display_name(), "Unknown");

    let missing: ProductRecord = serde_json::from_str(r#"{"code":"1"}"#).expect("parse");
    assert_eq!(missing.display_name(), "Unknown");
}

#[test]
fn loader_imports_valid_lines_and_skips_bad_ones() {
    let mut connection = open_db();
    let chunk = concat!(
        r#"{"code":"1","product_name":"One","categories_tags":["en:Snacks"]}"#,
        "\n",
        r#"{"code":"2","product_name":"Two"}"#,
        "\n",
        "this is not json",
        "\n",
        r#"{"code":"0","product_name":"Zero"}"#,
        "\n",
        r#"{"code":"3","product_name":"Three"}"#,
        "\n",
    );

    let stats = load_lines(&mut connection, chunk, 100);

    assert_eq!(stats.lines_read, 5);
    assert_eq!(stats.processed, 3);
    assert_eq!(stats.succeeded, 3);
    assert_eq!(stats.failed, 0);
    assert_eq!(stats.skipped, 2);
    assert_eq!(
        stats.processed + stats.failed + stats.skipped,
        stats.lines_read
    );
    assert_eq!(count(&connection, "product"), 3);
}

#[test]
fn loader_is_idempotent_across_reruns() {
    let mut connection = open_db();
    let chunk = concat!(
        r#"{"code":"1","product_name":"One","categories_tags":["en:Snacks","en:Sweet"],"countries_tags":["en:France"],"nutriments":{"energy":120.0}}"#,
        "\n",
        r#"{"code":"2","product_name":"Two","categories_tags":["en:Snacks"]}"#,
        "\n",
    );

    let first = load_lines(&mut connection, chunk, 100);
    assert_eq!(first.processed, 2);
    let after_first = [
        count(&connection, "product"),
        count(&connection, "nutriments"),
        count(&connection, "category"),
        count(&connection, "product_category"),
        count(&connection, "product_country"),
    ];

    let second = load_lines(&mut connection, chunk, 100);
    assert_eq!(second.processed, 2);
    let after_second = [
        count(&connection, "product"),
        count(&connection, "nutriments"),
        count(&connection, "category"),
        count(&connection, "product_category"),
        count(&connection, "product_country"),
    ];

    assert_eq!(after_first, after_second);
    assert_eq!(after_first[0], 2);
    assert_eq!(after_first[1], 1);
    assert_eq!(after_first[2], 2);
    assert_eq!(after_first[3], 3);
    assert_eq!(after_first[4], 1);
}

#[test]
fn loader_dedups_dimension_names_across_records() {
    let mut connection = open_db();
    let chunk = concat!(
        r#"{"code":"1","additives_tags":["en:Sugar"]}"#,
        "\n",
        r#"{"code":"2","additives_tags":["en:Sugar"]}"#,
        "\n",
    );

    load_lines(&mut connection, chunk, 100);

    assert_eq!(count(&connection, "additive"), 1);
    assert_eq!(count(&connection, "product_additive"), 2);
    let name: String = connection
        .query_row("SELECT name FROM additive", [], |row| row.get(0))
        .expect("name");
    assert_eq!(name, "sugar");
}

#[test]
fn loader_preserves_existing_nutriment_reference_when_incoming_is_null() {
    let mut connection = open_db();
    load_lines(
        &mut connection,
        concat!(r#"{"code":"1","nutriments":{"energy":50.0}}"#, "\n"),
        100,
    );
    let before: Option<i64> = connection
        .query_row(
            "SELECT nutriment_id FROM product WHERE barcode = 1",
            [],
            |row| row.get(0),
        )
        .expect("nutriment ref");
    assert!(before.is_some());

    load_lines(
        &mut connection,
        concat!(r#"{"code":"1","product_name":"Renamed"}"#, "\n"),
        100,
    );

    let after: Option<i64> = connection
        .query_row(
            "SELECT nutriment_id FROM product WHERE barcode = 1",
            [],
            |row| row.get(0),
        )
        .expect("nutriment ref");
    assert_eq!(after, before);
    let name: String = connection
        .query_row("SELECT name FROM product WHERE barcode = 1", [], |row| {
            row.get(0)
        })
        .expect("name");
    assert_eq!(name, "Renamed");
}

#[test]
fn loader_updates_nutriments_in_place_on_reimport() {
    let mut connection = open_db();
    load_lines(
        &mut connection,
        concat!(r#"{"code":"1","nutriments":{"energy":10.0}}"#, "\n"),
        100,
    );
    load_lines(
        &mut connection,
        concat!(r#"{"code":"1","nutriments":{"energy":99.0}}"#, "\n"),
        100,
    );

    assert_eq!(count(&connection, "nutriments"), 1);
    let energy: f64 = connection
        .query_row(
            "SELECT n.energy FROM nutriments n
             JOIN product p ON p.nutriment_id = n.id
             WHERE p.barcode = 1",
            [],
            |row| row.get(0),
        )
        .expect("energy");
    assert_eq!(energy, 99.0);
}

#[test]
fn loader_reuses_nutriment_rows_for_duplicate_barcodes_in_one_batch() {
    let mut connection = open_db();
    let chunk = concat!(
        r#"{"code":"1","product_name":"First","nutriments":{"energy":10.0}}"#,
        "\n",
        r#"{"code":"1","product_name":"Middle"}"#,
        "\n",
        r#"{"code":"1","product_name":"Second","nutriments":{"energy":99.0}}"#,
        "\n",
    );

    let stats = load_lines(&mut connection, chunk, 100);

    assert_eq!(stats.processed, 3);
    assert_eq!(count(&connection, "product"), 1);
    assert_eq!(count(&connection, "nutriments"), 1);
    let (name, energy): (String, f64) = connection
        .query_row(
            "SELECT p.name, n.energy FROM product p
             JOIN nutriments n ON n.id = p.nutriment_id
             WHERE p.barcode = 1",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .expect("joined row");
    assert_eq!(name, "Second");
    assert_eq!(energy, 99.0);

    load_lines(&mut connection, chunk, 100);
    assert_eq!(count(&connection, "nutriments"), 1);
}

#[test]
fn loader_commits_in_batches() {
    let mut connection = open_db();
    let chunk = concat!(
        r#"{"code":"1"}"#,
        "\n",
        r#"{"code":"2"}"#,
        "\n",
        r#"{"code":"3"}"#,
        "\n",
        r#"{"code":"4"}"#,
        "\n",
        r#"{"code":"5"}"#,
        "\n",
    );

    let stats = load_lines(&mut connection, chunk, 2);
    assert_eq!(stats.batches_committed, 3);
    assert_eq!(count(&connection, "product"), 5);

    let exact = load_lines(
        &mut connection,
        concat!(r#"{"code":"6"}"#, "\n", r#"{"code":"7"}"#, "\n"),
        2,
    );
    assert_eq!(exact.batches_committed, 1);
}

#[test]
fn loader_surfaces_storage_errors_and_keeps_committed_batches() {
    let mut connection = open_db();
    // Leave only a few pages of headroom so the database fills mid-run.
    let page_count: i64 = connection
        .query_row("PRAGMA page_count", [], |row| row.get(0))
        .expect("page count");
    connection
        .pragma_update(None, "max_page_count", page_count + 8)
        .expect("cap page count");

    let filler = "x".repeat(3000);
    let chunk: String = (1..=50)
        .map(|code| format!("{{\"code\":\"{code}\",\"product_name\":\"{filler}\"}}\n"))
        .collect();

    let options = loader::LoadOptions {
        batch_size: 1,
        lang: "en".to_string(),
    };
    let result = loader::load_chunk(&mut connection, Cursor::new(chunk), &options);

    assert!(result.is_err());
    let retained = count(&connection, "product");
    assert!(retained > 0, "committed batches must survive the abort");
    assert!(retained < 50, "the failing batch must not land");
}

#[test]
fn loader_drops_foreign_language_tags() {
    let mut connection = open_db();
    let chunk = concat!(
        r#"{"code":"1","countries_tags":["fr:France","en:France","de:Frankreich"]}"#,
        "\n",
    );

    load_lines(&mut connection, chunk, 100);

    assert_eq!(count(&connection, "country"), 1);
    assert_eq!(count(&connection, "product_country"), 1);
    let name: String = connection
        .query_row("SELECT name FROM country", [], |row| row.get(0))
        .expect("name");
    assert_eq!(name, "france");
}

#[test]
fn resolver_returns_empty_for_empty_input() {
    // No schema on purpose: any table access would fail the call.
    let connection = Connection::open_in_memory().expect("open in-memory db");

    let ids = dimensions::resolve_ids(&connection, Dimension::Tag, &[]).expect("resolve");

    assert!(ids.is_empty());
}

#[test]
fn resolver_reuses_existing_rows() {
    let connection = open_db();
    let names = vec!["snacks".to_string(), "sweet".to_string()];

    let first = dimensions::resolve_ids(&connection, Dimension::Category, &names).expect("resolve");
    assert_eq!(first.len(), 2);

    let reversed = vec!["sweet".to_string(), "snacks".to_string()];
    let second =
        dimensions::resolve_ids(&connection, Dimension::Category, &reversed).expect("resolve");

    assert_eq!(second.len(), 2);
    assert_eq!(first[0], second[1]);
    assert_eq!(first[1], second[0]);
    assert_eq!(count(&connection, "category"), 2);
}

#[test]
fn consume_run_end_to_end_over_a_gzip_chunk() {
    let dir = tempdir().expect("tempdir");
    let data_root = dir.path().to_path_buf();
    let store = FsObjectStore::new(data_root.join("chunks"));
    let chunk = concat!(
        r#"{"code":"1","product_name":"One","categories_tags":["en:Snacks"]}"#,
        "\n",
        r#"{"code":"2","product_name":"Two"}"#,
        "\n",
        "not json",
        "\n",
        r#"{"code":"0"}"#,
        "\n",
        r#"{"code":"3","product_name":"Three","nutriments":{"energy":12.0}}"#,
        "\n",
    );
    store
        .put("run/chunk-0000.jsonl.gz", &gzip(chunk))
        .expect("put chunk");

    let report_path = dir.path().join("report.json");
    run(ConsumeArgs {
        data_root: data_root.clone(),
        bucket: "chunks".to_string(),
        key: "run/chunk-0000.jsonl.gz".to_string(),
        db_path: None,
        batch_size: 2,
        compression: CompressionMode::Auto,
        lang: "en".to_string(),
        report_path: Some(report_path.clone()),
    })
    .expect("consume run");

    let report: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&report_path).expect("read report"))
            .expect("parse report");
    assert_eq!(report["lines_read"], 5);
    assert_eq!(report["processed"], 3);
    assert_eq!(report["succeeded"], 3);
    assert_eq!(report["failed"], 0);
    assert_eq!(report["skipped"], 2);
    assert_eq!(report["key"], "run/chunk-0000.jsonl.gz");

    let connection = Connection::open(data_root.join("catalog.sqlite")).expect("open db");
    assert_eq!(count(&connection, "product"), 3);
    let version: String = connection
        .query_row(
            "SELECT value FROM metadata WHERE key = 'db_schema_version'",
            [],
            |row| row.get(0),
        )
        .expect("schema version");
    assert_eq!(version, db_setup::DB_SCHEMA_VERSION);
    let key: String = connection
        .query_row(
            "SELECT value FROM metadata WHERE key = 'last_import_key'",
            [],
            |row| row.get(0),
        )
        .expect("last import key");
    assert_eq!(key, "run/chunk-0000.jsonl.gz");
}

#[test]
fn consume_rejects_zero_batch_size() {
    let dir = tempdir().expect("tempdir");

    let err = run(ConsumeArgs {
        data_root: dir.path().to_path_buf(),
        bucket: "chunks".to_string(),
        key: "run/chunk-0000.jsonl.gz".to_string(),
        db_path: None,
        batch_size: 0,
        compression: CompressionMode::Auto,
        lang: "en".to_string(),
        report_path: None,
    })
    .expect_err("zero batch size must be rejected");

    assert!(err.to_string().contains("batch size"));
}

#[test]
fn consume_fails_for_missing_chunk_objects() {
    let dir = tempdir().expect("tempdir");

    let err = run(ConsumeArgs {
        data_root: dir.path().to_path_buf(),
        bucket: "chunks".to_string(),
        key: "absent/chunk-0000.jsonl.gz".to_string(),
        db_path: None,
        batch_size: 10,
        compression: CompressionMode::Auto,
        lang: "en".to_string(),
        report_path: None,
    })
    .expect_err("missing object must fail");

    assert!(err.to_string().contains("failed to open object"));
}
