//! Row-oriented schema of a backed up table.

use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{Error, ErrorKind, Result};

/// Reduced type vocabulary used inside a container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogicalType {
    /// 64 bit signed integer.
    Integer,
    /// 64 bit floating point.
    Float,
    /// Boolean.
    Boolean,
    /// UTF-8 text. Temporal values are carried as ISO-8601 text.
    Text,
}

impl LogicalType {
    /// Name of the avro primitive this type is stored as.
    pub fn avro_primitive(&self) -> &'static str {
        match self {
            LogicalType::Integer => "long",
            LogicalType::Float => "double",
            LogicalType::Boolean => "boolean",
            LogicalType::Text => "string",
        }
    }

    /// Column type used when a table is recreated from a container.
    pub fn sql_type(&self) -> &'static str {
        match self {
            LogicalType::Integer => "INTEGER",
            LogicalType::Float => "REAL",
            LogicalType::Boolean => "BOOLEAN",
            LogicalType::Text => "TEXT",
        }
    }
}

impl Display for LogicalType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            LogicalType::Integer => write!(f, "Integer"),
            LogicalType::Float => write!(f, "Float"),
            LogicalType::Boolean => write!(f, "Boolean"),
            LogicalType::Text => write!(f, "Text"),
        }
    }
}

impl FromStr for LogicalType {
    type Err = Error;

    /// Parse from the avro primitive name.
    fn from_str(s: &str) -> Result<Self> {
        match s {
            "long" | "int" => Ok(LogicalType::Integer),
            "double" | "float" => Ok(LogicalType::Float),
            "boolean" => Ok(LogicalType::Boolean),
            "string" => Ok(LogicalType::Text),
            other => Err(Error::new(
                ErrorKind::Format,
                format!("avro type {other} is not a supported container field type"),
            )),
        }
    }
}

/// One column of a [`TableSchema`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDescriptor {
    /// Column name.
    pub name: String,
    /// Container type of this column.
    pub logical_type: LogicalType,
    /// Always true: a container must tolerate missing values.
    pub nullable: bool,
}

impl FieldDescriptor {
    /// Creates a nullable field.
    pub fn new(name: impl Into<String>, logical_type: LogicalType) -> Self {
        Self {
            name: name.into(),
            logical_type,
            nullable: true,
        }
    }
}

/// Schema of a table as stored in a container.
///
/// Field order is the source table's column order at inference time and is
/// also the order of values in every [`Row`](crate::types::Row).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchema {
    /// Table name, also used as the avro record name.
    pub name: String,
    /// Fields in column order.
    pub fields: Vec<FieldDescriptor>,
}

impl TableSchema {
    /// Creates a schema.
    pub fn new(name: impl Into<String>, fields: Vec<FieldDescriptor>) -> Self {
        Self {
            name: name.into(),
            fields,
        }
    }

    /// Look up a field by name.
    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Position of a field in row tuples.
    pub fn position(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    /// Field names in order.
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }

    /// Number of fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether the schema has no fields.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Which temporal type a text column held in the source table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TemporalKind {
    /// Calendar date, `%Y-%m-%d`.
    Date,
    /// Date and time without zone, `%Y-%m-%dT%H:%M:%S%.f`.
    DateTime,
}

impl TemporalKind {
    /// Column type used when a table is recreated from a container.
    pub fn sql_type(&self) -> &'static str {
        match self {
            TemporalKind::Date => "DATE",
            TemporalKind::DateTime => "DATETIME",
        }
    }
}

/// Columns stored as text that must be reparsed into temporal values.
pub type TemporalColumns = BTreeMap<String, TemporalKind>;
