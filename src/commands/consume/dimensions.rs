use anyhow::Result;
use rusqlite::{Connection, OptionalExtension};
use tracing::warn;

use crate::model::Dimension;

/// Insert-if-absent for every name, then a read pass mapping the names back
/// to ids. The insert ignores conflicts, so chunk invocations racing on the
/// same name cannot fail; the read pass yields the id either way.
pub(crate) fn resolve_ids(
    connection: &Connection,
    dimension: Dimension,
    names: &[String],
) -> Result<Vec<i64>> {
    if names.is_empty() {
        return Ok(Vec::new());
    }

    {
        let mut insert = connection.prepare_cached(&format!(
            "INSERT INTO {}(name) VALUES(?1) ON CONFLICT(name) DO NOTHING",
            dimension.table()
        ))?;
        for name in names {
            insert.execute([name.as_str()])?;
        }
    }

    let mut select = connection.prepare_cached(&format!(
        "SELECT id FROM {} WHERE name = ?1",
        dimension.table()
    ))?;

    let mut ids = Vec::with_capacity(names.len());
    for name in names {
        let id: Option<i64> = select
            .query_row([name.as_str()], |row| row.get(0))
            .optional()?;
        match id {
            Some(id) => ids.push(id),
            None => warn!(
                dimension = dimension.table(),
                name = %name,
                "dimension name did not resolve"
            ),
        }
    }

    Ok(ids)
}
