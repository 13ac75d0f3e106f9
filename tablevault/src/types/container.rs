//! Container is the self-describing avro file holding one table snapshot.

use std::collections::HashMap;

use apache_avro::types::Value as AvroValue;
use apache_avro::Writer as AvroWriter;
use apache_avro::{to_avro_datum, Reader, Schema as AvroSchema};

use crate::types::to_avro::{
    avro_field_names, from_avro_schema, to_avro_schema, NON_NULL_UNION_INDEX,
};
use crate::types::{FieldDescriptor, LogicalType, Row, TableSchema, TemporalColumns, Value};
use crate::{Error, ErrorKind, Result};

/// File extension of every container object.
pub const CONTAINER_EXTENSION: &str = "avro";

const META_TABLE: &str = "tablevault.table";
const META_COLUMNS: &str = "tablevault.columns";
const META_TEMPORAL: &str = "tablevault.temporal";
const META_ROW_COUNT: &str = "tablevault.row-count";

const AVRO_MAGIC: &[u8] = b"Obj\x01";
const EMPTY_SYNC_MARKER: [u8; 16] = *b"tablevault-empty";

/// Schema plus full row snapshot of one table.
#[derive(Debug, Clone, PartialEq)]
pub struct Container {
    /// Schema of the rows.
    pub schema: TableSchema,
    /// Columns that were temporal in the source table.
    pub temporal: TemporalColumns,
    /// Rows in scan order.
    pub rows: Vec<Row>,
}

impl Container {
    /// Creates a container.
    pub fn new(schema: TableSchema, temporal: TemporalColumns, rows: Vec<Row>) -> Self {
        Self {
            schema,
            temporal,
            rows,
        }
    }

    /// Number of rows.
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Object key of a table's container.
    pub fn object_key(table_name: &str) -> String {
        format!("{table_name}.{CONTAINER_EXTENSION}")
    }

    /// Reparse temporal text back into date/datetime values.
    ///
    /// Columns listed in `columns` but absent from the schema are ignored.
    pub fn restore_temporal(&mut self, columns: &TemporalColumns) -> Result<()> {
        let positions: Vec<_> = columns
            .iter()
            .filter_map(|(name, kind)| self.schema.position(name).map(|idx| (idx, name, *kind)))
            .collect();
        if positions.is_empty() {
            return Ok(());
        }

        for (row_idx, row) in self.rows.iter_mut().enumerate() {
            for (idx, name, kind) in &positions {
                let value = std::mem::replace(&mut row.0[*idx], Value::Null);
                row.0[*idx] = value.into_temporal(*kind).map_err(|e| {
                    e.with_context("column", name.as_str())
                        .with_context("row", row_idx.to_string())
                })?;
            }
        }

        Ok(())
    }

    /// Encode into avro container bytes.
    ///
    /// Values must already be coerced to their field's logical type, see
    /// [`Value::coerce`].
    pub fn encode(&self) -> Result<Vec<u8>> {
        let avro_schema = to_avro_schema(&self.schema)?;
        let metadata = self.metadata()?;
        if self.rows.is_empty() {
            return header_only(&avro_schema, metadata);
        }

        let mut writer = AvroWriter::new(&avro_schema, Vec::new());
        for (key, value) in metadata {
            writer
                .add_user_metadata(key.to_string(), value)
                .map_err(serialization_error)?;
        }

        let field_names = avro_field_names(&self.schema);
        for (row_idx, row) in self.rows.iter().enumerate() {
            let record = to_avro_record(&self.schema, &field_names, row)
                .map_err(|e| e.with_context("row", row_idx.to_string()))?;
            writer.append(record).map_err(serialization_error)?;
        }

        writer.into_inner().map_err(serialization_error)
    }

    fn metadata(&self) -> Result<Vec<(&'static str, String)>> {
        let columns: Vec<_> = self.schema.field_names().collect();
        Ok(vec![
            (META_TABLE, self.schema.name.clone()),
            (META_COLUMNS, serde_json::to_string(&columns)?),
            (META_TEMPORAL, serde_json::to_string(&self.temporal)?),
            (META_ROW_COUNT, self.rows.len().to_string()),
        ])
    }

    /// Decode avro container bytes.
    ///
    /// Temporal columns stay as text; call [`Container::restore_temporal`]
    /// with the columns known for the target table.
    pub fn decode(bs: &[u8]) -> Result<Container> {
        let reader = Reader::new(bs).map_err(|e| {
            Error::new(ErrorKind::Format, "container header is unreadable").set_source(e)
        })?;

        let metadata = reader.user_metadata().clone();
        let table_name = match metadata.get(META_TABLE) {
            Some(v) => String::from_utf8(v.clone()).map_err(|e| {
                Error::new(ErrorKind::Format, "table name metadata is not utf8").set_source(e)
            })?,
            None => match reader.writer_schema() {
                apache_avro::Schema::Record(record) => record.name.name.clone(),
                _ => String::new(),
            },
        };
        let mut schema = from_avro_schema(&table_name, reader.writer_schema())?;

        if let Some(v) = metadata.get(META_COLUMNS) {
            let columns: Vec<String> = serde_json::from_slice(v)?;
            if columns.len() != schema.len() {
                return Err(Error::new(
                    ErrorKind::Format,
                    format!(
                        "column metadata names {} columns but schema has {} fields",
                        columns.len(),
                        schema.len()
                    ),
                ));
            }
            for (field, name) in schema.fields.iter_mut().zip(columns) {
                field.name = name;
            }
        }

        let temporal: TemporalColumns = match metadata.get(META_TEMPORAL) {
            Some(v) => serde_json::from_slice(v)?,
            None => TemporalColumns::default(),
        };

        let expected_rows = metadata
            .get(META_ROW_COUNT)
            .map(|v| {
                std::str::from_utf8(v)
                    .ok()
                    .and_then(|s| s.parse::<usize>().ok())
                    .ok_or_else(|| Error::new(ErrorKind::Format, "row count metadata is invalid"))
            })
            .transpose()?;

        let rows = reader
            .enumerate()
            .map(|(row_idx, v)| {
                v.map_err(|e| {
                    Error::new(ErrorKind::Format, "container data is corrupt or truncated")
                        .set_source(e)
                })
                .and_then(|value| from_avro_record(&schema, value))
                .map_err(|e| e.with_context("row", row_idx.to_string()))
            })
            .collect::<Result<Vec<_>>>()?;

        if let Some(expected) = expected_rows {
            if expected != rows.len() {
                return Err(Error::new(
                    ErrorKind::Format,
                    format!(
                        "container is truncated: expected {expected} rows, found {}",
                        rows.len()
                    ),
                ));
            }
        }

        Ok(Container {
            schema,
            temporal,
            rows,
        })
    }
}

fn serialization_error(e: apache_avro::Error) -> Error {
    Error::new(ErrorKind::Serialization, "encoding avro container failed").set_source(e)
}

/// Container with a header and no data blocks.
///
/// The avro writer only emits its header together with the first row.
fn header_only(schema: &AvroSchema, metadata: Vec<(&'static str, String)>) -> Result<Vec<u8>> {
    let schema_json = serde_json::to_string(schema).map_err(|e| {
        Error::new(ErrorKind::Serialization, "encoding avro schema failed").set_source(e)
    })?;

    let mut entries: HashMap<String, AvroValue> = metadata
        .into_iter()
        .map(|(k, v)| (k.to_string(), AvroValue::Bytes(v.into_bytes())))
        .collect();
    entries.insert(
        "avro.schema".to_string(),
        AvroValue::Bytes(schema_json.into_bytes()),
    );
    entries.insert("avro.codec".to_string(), AvroValue::Bytes(b"null".to_vec()));

    let header = to_avro_datum(
        &AvroSchema::Map(Box::new(AvroSchema::Bytes)),
        AvroValue::Map(entries),
    )
    .map_err(serialization_error)?;

    let mut bs = Vec::with_capacity(AVRO_MAGIC.len() + header.len() + EMPTY_SYNC_MARKER.len());
    bs.extend_from_slice(AVRO_MAGIC);
    bs.extend_from_slice(&header);
    bs.extend_from_slice(&EMPTY_SYNC_MARKER);
    Ok(bs)
}

fn to_avro_record(schema: &TableSchema, field_names: &[String], row: &Row) -> Result<AvroValue> {
    if row.values().len() != schema.len() {
        return Err(Error::new(
            ErrorKind::Serialization,
            format!(
                "row has {} values but schema has {} fields",
                row.values().len(),
                schema.len()
            ),
        ));
    }

    let fields = schema
        .fields
        .iter()
        .zip(field_names)
        .zip(row.values())
        .map(|((field, name), value)| Ok((name.clone(), to_avro_value(field, value)?)))
        .collect::<Result<Vec<_>>>()?;

    Ok(AvroValue::Record(fields))
}

fn to_avro_value(field: &FieldDescriptor, value: &Value) -> Result<AvroValue> {
    let primitive = match (field.logical_type, value) {
        (_, Value::Null) if field.nullable => {
            return Ok(AvroValue::Union(0, Box::new(AvroValue::Null)))
        }
        (LogicalType::Integer, Value::Integer(v)) => AvroValue::Long(*v),
        (LogicalType::Float, Value::Float(v)) => AvroValue::Double(*v),
        (LogicalType::Boolean, Value::Boolean(v)) => AvroValue::Boolean(*v),
        (LogicalType::Text, Value::Text(v)) => AvroValue::String(v.clone()),
        (logical_type, value) => {
            return Err(Error::new(
                ErrorKind::Serialization,
                format!(
                    "{} value can't be written to {logical_type} field {}",
                    value.type_name(),
                    field.name
                ),
            ))
        }
    };

    if field.nullable {
        Ok(AvroValue::Union(NON_NULL_UNION_INDEX, Box::new(primitive)))
    } else {
        Ok(primitive)
    }
}

fn from_avro_record(schema: &TableSchema, value: AvroValue) -> Result<Row> {
    let AvroValue::Record(fields) = value else {
        return Err(Error::new(
            ErrorKind::Format,
            "container row is not a record",
        ));
    };

    if fields.len() != schema.len() {
        return Err(Error::new(
            ErrorKind::Format,
            format!(
                "container row has {} values but schema has {} fields",
                fields.len(),
                schema.len()
            ),
        ));
    }

    schema
        .fields
        .iter()
        .zip(fields)
        .map(|(field, (_, value))| from_avro_value(field, value))
        .collect::<Result<Vec<_>>>()
        .map(Row::new)
}

fn from_avro_value(field: &FieldDescriptor, value: AvroValue) -> Result<Value> {
    let value = match value {
        AvroValue::Union(_, inner) => *inner,
        other => other,
    };

    match (field.logical_type, value) {
        (_, AvroValue::Null) => Ok(Value::Null),
        (LogicalType::Integer, AvroValue::Long(v)) => Ok(Value::Integer(v)),
        (LogicalType::Integer, AvroValue::Int(v)) => Ok(Value::Integer(v as i64)),
        (LogicalType::Float, AvroValue::Double(v)) => Ok(Value::Float(v)),
        (LogicalType::Float, AvroValue::Float(v)) => Ok(Value::Float(v as f64)),
        (LogicalType::Boolean, AvroValue::Boolean(v)) => Ok(Value::Boolean(v)),
        (LogicalType::Text, AvroValue::String(v)) => Ok(Value::Text(v)),
        (logical_type, other) => Err(Error::new(
            ErrorKind::Format,
            format!(
                "field {} expects {logical_type} but container holds {other:?}",
                field.name
            ),
        )),
    }
}
