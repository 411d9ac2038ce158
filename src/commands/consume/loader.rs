use std::io::BufRead;

use anyhow::{Context, Result};
use rusqlite::{Connection, OptionalExtension, params};
use tracing::{debug, warn};

use crate::model::{Dimension, NutrientFacts, ProductRecord};

use super::dimensions;
use super::tags;

pub(crate) struct LoadOptions {
    pub(crate) batch_size: usize,
    pub(crate) lang: String,
}

#[derive(Debug, Default, Clone)]
pub(crate) struct LoadStats {
    pub(crate) lines_read: usize,
    pub(crate) processed: usize,
    pub(crate) succeeded: usize,
    pub(crate) failed: usize,
    pub(crate) skipped: usize,
    pub(crate) batches_committed: usize,
}

struct FactRow {
    barcode: i64,
    nutriment_id: Option<i64>,
    name: String,
    image_url: Option<String>,
}

/// Writes staged in memory for the current batch. Nothing here has touched
/// the fact or link tables yet; dimension and nutriment rows are written
/// eagerly inside the same transaction during staging.
#[derive(Default)]
struct PendingBatch {
    facts: Vec<FactRow>,
    links: [Vec<(i64, i64)>; 5],
}

impl PendingBatch {
    fn is_empty(&self) -> bool {
        self.facts.is_empty()
    }
}

/// Folds the chunk stream into the database, one transaction per batch.
/// Line-level problems are counted and skipped; a storage error aborts the
/// run and loses only the uncommitted batch.
pub(crate) fn load_chunk(
    connection: &mut Connection,
    reader: impl BufRead,
    options: &LoadOptions,
) -> Result<LoadStats> {
    let mut stats = LoadStats::default();
    let mut lines = reader.lines();
    let mut exhausted = false;

    while !exhausted {
        let tx = connection.transaction()?;
        let mut pending = PendingBatch::default();

        while pending.facts.len() < options.batch_size {
            let Some(line) = lines.next() else {
                exhausted = true;
                break;
            };
            let line = line.context("failed to read chunk stream")?;
            if line.trim().is_empty() {
                continue;
            }
            stats.lines_read += 1;

            let record: ProductRecord = match serde_json::from_str(&line) {
                Ok(record) => record,
                Err(error) => {
                    warn!(%error, "skipping unparseable line");
                    stats.skipped += 1;
                    continue;
                }
            };

            let Some(barcode) = record.code.filter(|code| *code > 0) else {
                warn!(name = %record.display_name(), "skipping record without a positive barcode");
                stats.skipped += 1;
                continue;
            };

            match stage_record(&tx, &record, barcode, &options.lang, &mut pending) {
                Ok(()) => stats.processed += 1,
                Err(error) => {
                    warn!(barcode, %error, "failed to stage record");
                    stats.failed += 1;
                }
            }
        }

        if pending.is_empty() {
            drop(tx);
            continue;
        }

        flush_batch(&tx, &pending)?;
        tx.commit().context("failed to commit batch")?;
        stats.batches_committed += 1;

        let products: i64 =
            connection.query_row("SELECT COUNT(*) FROM product", [], |row| row.get(0))?;
        debug!(
            batch = stats.batches_committed,
            products, "batch committed"
        );
    }

    stats.succeeded = stats.processed;
    Ok(stats)
}

fn stage_record(
    tx: &Connection,
    record: &ProductRecord,
    barcode: i64,
    lang: &str,
    pending: &mut PendingBatch,
) -> Result<()> {
    let mut resolved: [Vec<i64>; 5] = Default::default();
    for (slot, dimension) in Dimension::ALL.into_iter().enumerate() {
        let names = tags::normalize_tags(record.raw_tags(dimension), lang);
        resolved[slot] = dimensions::resolve_ids(tx, dimension, &names)?;
    }

    // The fact upsert for an earlier duplicate of this barcode is still
    // pending, so its nutriment row is findable only through the staged facts.
    let staged_id = pending
        .facts
        .iter()
        .rev()
        .filter(|fact| fact.barcode == barcode)
        .find_map(|fact| fact.nutriment_id);
    let nutriment_id = upsert_nutriments(tx, barcode, staged_id, record.nutriments.as_ref())?;

    pending.facts.push(FactRow {
        barcode,
        nutriment_id,
        name: record.display_name(),
        image_url: record.image_url.clone(),
    });
    for (slot, ids) in resolved.into_iter().enumerate() {
        for id in ids {
            pending.links[slot].push((barcode, id));
        }
    }

    Ok(())
}

// Re-imports update the product's existing nutriment row in place instead of
// inserting a fresh one, so repeated runs do not accumulate orphan rows.
fn upsert_nutriments(
    tx: &Connection,
    barcode: i64,
    staged_id: Option<i64>,
    facts: Option<&NutrientFacts>,
) -> Result<Option<i64>> {
    let Some(facts) = facts else {
        return Ok(None);
    };

    let existing = match staged_id {
        Some(id) => Some(id),
        None => tx
            .prepare_cached("SELECT nutriment_id FROM product WHERE barcode = ?1")?
            .query_row([barcode], |row| row.get::<_, Option<i64>>(0))
            .optional()?
            .flatten(),
    };

    match existing {
        Some(id) => {
            tx.prepare_cached(
                "UPDATE nutriments SET
                   energy = ?1,
                   energy_100g = ?2,
                   carbohydrates = ?3,
                   carbohydrates_100g = ?4,
                   sugars = ?5,
                   sugars_100g = ?6,
                   fat = ?7,
                   fat_100g = ?8,
                   saturated_fat = ?9,
                   saturated_fat_100g = ?10,
                   proteins = ?11,
                   proteins_100g = ?12,
                   salt = ?13,
                   salt_100g = ?14,
                   sodium = ?15,
                   sodium_100g = ?16,
                   fiber = ?17,
                   fiber_100g = ?18
                 WHERE id = ?19",
            )?
            .execute(params![
                facts.energy,
                facts.energy_100g,
                facts.carbohydrates,
                facts.carbohydrates_100g,
                facts.sugars,
                facts.sugars_100g,
                facts.fat,
                facts.fat_100g,
                facts.saturated_fat,
                facts.saturated_fat_100g,
                facts.proteins,
                facts.proteins_100g,
                facts.salt,
                facts.salt_100g,
                facts.sodium,
                facts.sodium_100g,
                facts.fiber,
                facts.fiber_100g,
                id
            ])?;
            Ok(Some(id))
        }
        None => {
            tx.prepare_cached(
                "INSERT INTO nutriments(
                   energy, energy_100g, carbohydrates, carbohydrates_100g,
                   sugars, sugars_100g, fat, fat_100g,
                   saturated_fat, saturated_fat_100g, proteins, proteins_100g,
                   salt, salt_100g, sodium, sodium_100g, fiber, fiber_100g
                 )
                 VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)",
            )?
            .execute(params![
                facts.energy,
                facts.energy_100g,
                facts.carbohydrates,
                facts.carbohydrates_100g,
                facts.sugars,
                facts.sugars_100g,
                facts.fat,
                facts.fat_100g,
                facts.saturated_fat,
                facts.saturated_fat_100g,
                facts.proteins,
                facts.proteins_100g,
                facts.salt,
                facts.salt_100g,
                facts.sodium,
                facts.sodium_100g,
                facts.fiber,
                facts.fiber_100g
            ])?;
            Ok(Some(tx.last_insert_rowid()))
        }
    }
}

fn flush_batch(tx: &Connection, pending: &PendingBatch) -> Result<()> {
    {
        // nutriscore_id stays NULL; the column is reserved for a later
        // scorer. An existing nutriment reference survives a NULL incoming
        // one.
        let mut upsert = tx.prepare_cached(
            "INSERT INTO product(barcode, nutriment_id, nutriscore_id, name, image_url)
             VALUES(?1, ?2, NULL, ?3, ?4)
             ON CONFLICT(barcode) DO UPDATE SET
               name=excluded.name,
               image_url=excluded.image_url,
               nutriment_id=COALESCE(excluded.nutriment_id, product.nutriment_id)",
        )?;
        for fact in &pending.facts {
            upsert.execute(params![
                fact.barcode,
                fact.nutriment_id,
                fact.name,
                fact.image_url
            ])?;
        }
    }

    for (slot, dimension) in Dimension::ALL.into_iter().enumerate() {
        if pending.links[slot].is_empty() {
            continue;
        }

        let mut insert = tx.prepare_cached(&format!(
            "INSERT INTO {}(product_barcode, {}) VALUES(?1, ?2)
             ON CONFLICT(product_barcode, {}) DO NOTHING",
            dimension.link_table(),
            dimension.link_column(),
            dimension.link_column()
        ))?;
        for (barcode, id) in &pending.links[slot] {
            insert.execute(params![barcode, id])?;
        }
    }

    Ok(())
}
