use anyhow::{Context, Result};
use rusqlite::Connection;

use crate::util::now_utc_string;

pub(crate) const DB_SCHEMA_VERSION: &str = "0.1.0";

pub(crate) fn configure_connection(connection: &Connection) -> Result<()> {
    connection
        .pragma_update(None, "journal_mode", "WAL")
        .context("failed to set journal_mode=WAL")?;
    connection
        .pragma_update(None, "synchronous", "NORMAL")
        .context("failed to set synchronous=NORMAL")?;
    // The loader cycles through more distinct statements than the default
    // prepared-statement cache holds.
    connection.set_prepared_statement_cache_capacity(32);
    Ok(())
}

pub(crate) fn ensure_schema(connection: &Connection) -> Result<()> {
    connection.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS metadata (
          key TEXT PRIMARY KEY,
          value TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS nutriments (
          id INTEGER PRIMARY KEY,
          energy REAL,
          energy_100g REAL,
          carbohydrates REAL,
          carbohydrates_100g REAL,
          sugars REAL,
          sugars_100g REAL,
          fat REAL,
          fat_100g REAL,
          saturated_fat REAL,
          saturated_fat_100g REAL,
          proteins REAL,
          proteins_100g REAL,
          salt REAL,
          salt_100g REAL,
          sodium REAL,
          sodium_100g REAL,
          fiber REAL,
          fiber_100g REAL
        );

        CREATE TABLE IF NOT EXISTS product (
          barcode INTEGER PRIMARY KEY,
          nutriment_id INTEGER,
          nutriscore_id INTEGER,
          name TEXT NOT NULL,
          image_url TEXT,
          FOREIGN KEY(nutriment_id) REFERENCES nutriments(id)
        );

        CREATE TABLE IF NOT EXISTS tag (
          id INTEGER PRIMARY KEY,
          name TEXT NOT NULL UNIQUE
        );

        CREATE TABLE IF NOT EXISTS category (
          id INTEGER PRIMARY KEY,
          name TEXT NOT NULL UNIQUE
        );

        CREATE TABLE IF NOT EXISTS allergen (
          id INTEGER PRIMARY KEY,
          name TEXT NOT NULL UNIQUE
        );

        CREATE TABLE IF NOT EXISTS country (
          id INTEGER PRIMARY KEY,
          name TEXT NOT NULL UNIQUE
        );

        CREATE TABLE IF NOT EXISTS additive (
          id INTEGER PRIMARY KEY,
          name TEXT NOT NULL UNIQUE
        );

        CREATE TABLE IF NOT EXISTS product_tag (
          product_barcode INTEGER NOT NULL,
          tag_id INTEGER NOT NULL,
          PRIMARY KEY (product_barcode, tag_id),
          FOREIGN KEY(product_barcode) REFERENCES product(barcode),
          FOREIGN KEY(tag_id) REFERENCES tag(id)
        );

        CREATE TABLE IF NOT EXISTS product_category (
          product_barcode INTEGER NOT NULL,
          category_id INTEGER NOT NULL,
          PRIMARY KEY (product_barcode, category_id),
          FOREIGN KEY(product_barcode) REFERENCES product(barcode),
          FOREIGN KEY(category_id) REFERENCES category(id)
        );

        CREATE TABLE IF NOT EXISTS product_allergen (
          product_barcode INTEGER NOT NULL,
          allergen_id INTEGER NOT NULL,
          PRIMARY KEY (product_barcode, allergen_id),
          FOREIGN KEY(product_barcode) REFERENCES product(barcode),
          FOREIGN KEY(allergen_id) REFERENCES allergen(id)
        );

        CREATE TABLE IF NOT EXISTS product_country (
          product_barcode INTEGER NOT NULL,
          country_id INTEGER NOT NULL,
          PRIMARY KEY (product_barcode, country_id),
          FOREIGN KEY(product_barcode) REFERENCES product(barcode),
          FOREIGN KEY(country_id) REFERENCES country(id)
        );

        CREATE TABLE IF NOT EXISTS product_additive (
          product_barcode INTEGER NOT NULL,
          additive_id INTEGER NOT NULL,
          PRIMARY KEY (product_barcode, additive_id),
          FOREIGN KEY(product_barcode) REFERENCES product(barcode),
          FOREIGN KEY(additive_id) REFERENCES additive(id)
        );

        CREATE INDEX IF NOT EXISTS idx_product_nutriment ON product(nutriment_id);
        ",
    )?;

    let now = now_utc_string();
    connection.execute(
        "INSERT INTO metadata(key, value) VALUES('db_schema_version', ?1)
         ON CONFLICT(key) DO UPDATE SET value=excluded.value",
        [DB_SCHEMA_VERSION],
    )?;
    connection.execute(
        "INSERT INTO metadata(key, value) VALUES('db_updated_at', ?1)
         ON CONFLICT(key) DO UPDATE SET value=excluded.value",
        [now],
    )?;

    Ok(())
}
