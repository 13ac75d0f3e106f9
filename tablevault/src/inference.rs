//! Infers a container schema from a live table.

use std::str::FromStr;

use crate::db::{ColumnMeta, Database, NativeType};
use crate::types::{FieldDescriptor, LogicalType, TableSchema, TemporalColumns};
use crate::{Error, ErrorKind, Result};

/// What to do with a column whose native type has no logical counterpart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnknownTypePolicy {
    /// Store the column as text and keep going.
    #[default]
    DegradeToText,
    /// Fail inference.
    Reject,
}

impl FromStr for UnknownTypePolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "degrade_to_text" => Ok(UnknownTypePolicy::DegradeToText),
            "reject" => Ok(UnknownTypePolicy::Reject),
            other => Err(Error::new(
                ErrorKind::ConfigInvalid,
                format!("Invalid unknown type policy {other}"),
            )),
        }
    }
}

/// Schema of a table plus the columns that held temporal values.
#[derive(Debug, Clone, PartialEq)]
pub struct InferredSchema {
    /// Container schema.
    pub schema: TableSchema,
    /// Temporal columns, stored as text in the container.
    pub temporal: TemporalColumns,
    /// Native column metadata the schema was inferred from.
    pub columns: Vec<ColumnMeta>,
}

/// Map a native type to its logical type.
///
/// Returns `None` for [`NativeType::Other`]. Temporal types map to text.
pub fn logical_type_of(native_type: &NativeType) -> Option<LogicalType> {
    match native_type {
        NativeType::Integer => Some(LogicalType::Integer),
        NativeType::Float => Some(LogicalType::Float),
        NativeType::Boolean => Some(LogicalType::Boolean),
        NativeType::Date | NativeType::DateTime | NativeType::Text => Some(LogicalType::Text),
        NativeType::Other(_) => None,
    }
}

/// Infer the schema of `table_name`.
///
/// Every field is nullable regardless of the source column.
pub fn infer_schema(
    db: &dyn Database,
    table_name: &str,
    policy: UnknownTypePolicy,
) -> Result<InferredSchema> {
    let columns = db.columns(table_name)?;

    let mut fields = Vec::with_capacity(columns.len());
    let mut temporal = TemporalColumns::new();
    for column in &columns {
        let logical_type = match logical_type_of(&column.native_type) {
            Some(t) => t,
            None if policy == UnknownTypePolicy::DegradeToText => {
                log::warn!(
                    "Column {}.{} has unmapped type {:?}, storing it as text.",
                    table_name,
                    column.name,
                    column.native_type
                );
                LogicalType::Text
            }
            None => {
                return Err(Error::new(
                    ErrorKind::SchemaInference,
                    format!("column type {:?} has no container type", column.native_type),
                )
                .with_context("table", table_name)
                .with_context("column", column.name.as_str()))
            }
        };

        if let Some(kind) = column.native_type.temporal_kind() {
            temporal.insert(column.name.clone(), kind);
        }
        fields.push(FieldDescriptor::new(column.name.as_str(), logical_type));
    }

    log::debug!(
        "Inferred schema of {} with {} fields, {} temporal.",
        table_name,
        fields.len(),
        temporal.len()
    );

    Ok(InferredSchema {
        schema: TableSchema::new(table_name, fields),
        temporal,
        columns,
    })
}
