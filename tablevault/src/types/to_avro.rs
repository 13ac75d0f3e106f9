//! Avro schema related functions.

use std::collections::HashSet;

use apache_avro::schema::{RecordField as AvroRecordField, UnionSchema};
use apache_avro::Schema as AvroSchema;
use serde_json::{json, Value as JsonValue};

use crate::error::Result;
use crate::types::{FieldDescriptor, LogicalType, TableSchema};
use crate::{Error, ErrorKind};

/// Convert a [`TableSchema`] into an avro record schema.
///
/// Every field is written as the union `["null", <primitive>]` with a `null`
/// default so that missing values can always be encoded. Field names are
/// those of [`avro_field_names`].
pub fn to_avro_schema(value: &TableSchema) -> Result<AvroSchema> {
    let fields: Vec<JsonValue> = value
        .fields
        .iter()
        .zip(avro_field_names(value))
        .map(|(field, name)| avro_field_json(field, name))
        .collect();

    let record = json!({
        "type": "record",
        "name": avro_name(&value.name),
        "fields": fields,
    });

    AvroSchema::parse(&record).map_err(|e| {
        Error::new(
            ErrorKind::Serialization,
            format!("can't build avro schema for table {}", value.name),
        )
        .set_source(e)
    })
}

fn avro_field_json(field: &FieldDescriptor, name: String) -> JsonValue {
    let primitive = field.logical_type.avro_primitive();
    if field.nullable {
        json!({
            "name": name,
            "type": ["null", primitive],
            "default": JsonValue::Null,
        })
    } else {
        json!({
            "name": name,
            "type": primitive,
        })
    }
}

/// Avro field names of `schema`, in field order.
///
/// Column names that aren't avro names are sanitized, and a position suffix
/// keeps them unique. The column names themselves travel in container
/// metadata.
pub(crate) fn avro_field_names(schema: &TableSchema) -> Vec<String> {
    let mut used = HashSet::with_capacity(schema.len());
    schema
        .fields
        .iter()
        .enumerate()
        .map(|(idx, field)| {
            let mut name = avro_name(&field.name);
            while used.contains(&name) {
                name = format!("{name}_{idx}");
            }
            used.insert(name.clone());
            name
        })
        .collect()
}

/// Avro names only allow `[A-Za-z_][A-Za-z0-9_]*`.
fn avro_name(name: &str) -> String {
    let mut name: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    if !name.starts_with(|c: char| c.is_ascii_alphabetic() || c == '_') {
        name.insert(0, '_');
    }
    name
}

/// Convert an avro writer schema back into a [`TableSchema`].
///
/// Only records whose fields are primitives or nullable unions of one
/// primitive are accepted.
pub fn from_avro_schema(table_name: &str, avro_schema: &AvroSchema) -> Result<TableSchema> {
    let AvroSchema::Record(record) = avro_schema else {
        return Err(Error::new(
            ErrorKind::Format,
            format!("container schema must be a record, got {avro_schema:?}"),
        ));
    };

    let fields = record
        .fields
        .iter()
        .map(field_from_avro)
        .collect::<Result<Vec<_>>>()?;

    Ok(TableSchema::new(table_name, fields))
}

fn field_from_avro(field: &AvroRecordField) -> Result<FieldDescriptor> {
    let (primitive, nullable) = match &field.schema {
        AvroSchema::Union(union) => (nullable_variant(union, &field.name)?, true),
        other => (other, false),
    };

    let logical_type = logical_type_of(primitive).ok_or_else(|| {
        Error::new(
            ErrorKind::Format,
            format!("field {} has unsupported avro type {primitive:?}", field.name),
        )
    })?;

    Ok(FieldDescriptor {
        name: field.name.clone(),
        logical_type,
        nullable,
    })
}

fn nullable_variant<'a>(union: &'a UnionSchema, field_name: &str) -> Result<&'a AvroSchema> {
    let variants = union.variants();
    if variants.len() != 2 || !union.is_nullable() {
        return Err(Error::new(
            ErrorKind::Format,
            format!("field {field_name} must be a union of null and one primitive"),
        ));
    }

    variants
        .iter()
        .find(|v| !matches!(v, AvroSchema::Null))
        .ok_or_else(|| {
            Error::new(
                ErrorKind::Format,
                format!("field {field_name} has no non-null variant"),
            )
        })
}

fn logical_type_of(schema: &AvroSchema) -> Option<LogicalType> {
    match schema {
        AvroSchema::Long | AvroSchema::Int => Some(LogicalType::Integer),
        AvroSchema::Double | AvroSchema::Float => Some(LogicalType::Float),
        AvroSchema::Boolean => Some(LogicalType::Boolean),
        AvroSchema::String => Some(LogicalType::Text),
        _ => None,
    }
}

/// Position of the non-null variant in a nullable union written by
/// [`to_avro_schema`].
pub(crate) const NON_NULL_UNION_INDEX: u32 = 1;
