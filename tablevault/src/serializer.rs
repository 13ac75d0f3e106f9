//! Reads a full table snapshot into a [`Container`].

use crate::db::Database;
use crate::inference::InferredSchema;
use crate::types::{Container, Row};
use crate::Result;

/// Read every row of the inferred table and coerce it into the container
/// schema.
///
/// The whole table is materialized in memory. Any value that can't be
/// coerced fails the whole snapshot, a container never holds a partial
/// table.
pub fn snapshot_table(db: &dyn Database, inferred: &InferredSchema) -> Result<Container> {
    let schema = &inferred.schema;
    let rows = db.scan(&schema.name, &inferred.columns)?;

    let rows = rows
        .into_iter()
        .enumerate()
        .map(|(row_idx, row)| {
            schema
                .fields
                .iter()
                .zip(row.into_values())
                .map(|(field, value)| {
                    value.coerce(field.logical_type).map_err(|e| {
                        e.with_context("table", schema.name.as_str())
                            .with_context("row", row_idx.to_string())
                            .with_context("column", field.name.as_str())
                    })
                })
                .collect::<Result<Vec<_>>>()
                .map(Row::new)
        })
        .collect::<Result<Vec<_>>>()?;

    log::debug!("Read {} rows from {}.", rows.len(), schema.name);

    Ok(Container::new(
        schema.clone(),
        inferred.temporal.clone(),
        rows,
    ))
}
