//! This module defines the relational database api used by backup and
//! restore.

use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::target::UpsertProcedure;
use crate::types::{Row, TableSchema, TemporalColumns, TemporalKind, Value};
use crate::{Error, ErrorKind, Result};

mod sqlite;
pub use sqlite::*;

static TABLE_NAME_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("table name pattern is valid"));

static INTEGER_TYPE_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(UNSIGNED\s+)?(BIG\s+)?(TINY|SMALL|MEDIUM|BIG)?INT(EGER|2|4|8)?(\s+UNSIGNED)?(\s*\(.*\))?$")
        .expect("integer type pattern is valid")
});

/// Table names end up as SQL identifiers, only plain identifiers are allowed.
pub fn validate_table_name(table_name: &str) -> Result<()> {
    if TABLE_NAME_PATTERN.is_match(table_name) {
        Ok(())
    } else {
        Err(Error::new(
            ErrorKind::SchemaInference,
            format!("{table_name:?} is not a valid table name"),
        ))
    }
}

/// Quote an identifier for SQL.
pub(crate) fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// Native column type, classified from the declared SQL type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NativeType {
    /// Integer family: INT, INTEGER, BIGINT, SMALLINT...
    Integer,
    /// Floating point family: REAL, FLOAT, DOUBLE, NUMERIC, DECIMAL...
    Float,
    /// BOOLEAN, BOOL, BIT.
    Boolean,
    /// DATE.
    Date,
    /// DATETIME, TIMESTAMP.
    DateTime,
    /// Character family: TEXT, VARCHAR, CHAR, CLOB...
    Text,
    /// Anything else, with the declared type kept for diagnostics.
    Other(String),
}

impl NativeType {
    /// Temporal kind of this type, if any.
    pub fn temporal_kind(&self) -> Option<TemporalKind> {
        match self {
            NativeType::Date => Some(TemporalKind::Date),
            NativeType::DateTime => Some(TemporalKind::DateTime),
            _ => None,
        }
    }
}

impl From<&str> for NativeType {
    fn from(declared: &str) -> Self {
        let upper = declared.trim().to_uppercase();
        // Order matters: DATETIME must win over DATE.
        if upper.contains("BOOL") || upper == "BIT" {
            NativeType::Boolean
        } else if upper.contains("DATETIME") || upper.contains("TIMESTAMP") {
            NativeType::DateTime
        } else if upper == "DATE" {
            NativeType::Date
        } else if INTEGER_TYPE_PATTERN.is_match(&upper) {
            NativeType::Integer
        } else if ["REAL", "FLOA", "DOUB", "NUMERIC", "DECIMAL"]
            .iter()
            .any(|t| upper.contains(t))
        {
            NativeType::Float
        } else if ["CHAR", "CLOB", "TEXT", "STRING"]
            .iter()
            .any(|t| upper.contains(t))
        {
            NativeType::Text
        } else {
            NativeType::Other(declared.to_string())
        }
    }
}

/// Column name and native type, as declared.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMeta {
    /// Column name.
    pub name: String,
    /// Declared type.
    pub native_type: NativeType,
}

impl ColumnMeta {
    /// Creates column metadata.
    pub fn new(name: impl Into<String>, native_type: NativeType) -> Self {
        Self {
            name: name.into(),
            native_type,
        }
    }
}

/// A live database connection.
///
/// One connection serves exactly one backup or restore call and is dropped
/// at its end.
pub trait Database: Send {
    /// Check table exists.
    fn table_exists(&self, table_name: &str) -> Result<bool>;

    /// Columns of a table in declared order.
    ///
    /// Fails with [`ErrorKind::SchemaInference`] if the table doesn't exist.
    fn columns(&self, table_name: &str) -> Result<Vec<ColumnMeta>>;

    /// Read every row of a table in one statement.
    ///
    /// Values are in `columns` order; temporal columns yield
    /// [`Value::Date`]/[`Value::DateTime`] when their text parses.
    fn scan(&self, table_name: &str, columns: &[ColumnMeta]) -> Result<Vec<Row>>;

    /// Drop and recreate `schema.name`, then insert `rows`.
    fn replace(
        &mut self,
        schema: &TableSchema,
        temporal: &TemporalColumns,
        rows: &[Row],
    ) -> Result<()>;

    /// Execute one upsert with parameters in `procedure.columns` order.
    fn upsert(&mut self, procedure: &UpsertProcedure, params: &[Value]) -> Result<()>;

    /// Execute provisioning DDL.
    fn execute_ddl(&mut self, sql: &str) -> Result<()>;
}

/// Opens fresh database connections.
pub trait ConnectionCreator: Send + Sync {
    /// Open a new connection.
    fn connect(&self) -> Result<Box<dyn Database>>;
}

/// Reference to [`ConnectionCreator`].
pub type ConnectionCreatorRef = Arc<dyn ConnectionCreator>;
