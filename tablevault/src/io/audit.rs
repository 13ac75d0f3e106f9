//! Audit trail of rows rejected during restore.

use chrono::Utc;
use opendal::Operator;
use serde::Serialize;
use serde_json::{Map, Value as JsonValue};

use crate::types::{Row, TableSchema, Value};
use crate::{Error, Result};

/// A row that failed to apply, as written to the rejection log.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RejectedRow {
    /// Position of the row in the container.
    pub row: usize,
    /// Primary key value, when known.
    pub primary_key: Option<String>,
    /// Row values keyed by column name.
    pub record: Map<String, JsonValue>,
    /// Why the row was rejected.
    pub error_message: String,
}

impl RejectedRow {
    /// Build a rejected row from container values.
    pub fn new(
        schema: &TableSchema,
        row_idx: usize,
        row: &Row,
        primary_key: Option<String>,
        err: &Error,
    ) -> Self {
        let record = schema
            .fields
            .iter()
            .zip(row.values())
            .map(|(field, value)| (field.name.clone(), to_json(value)))
            .collect();

        Self {
            row: row_idx,
            primary_key,
            record,
            error_message: err.to_string(),
        }
    }
}

fn to_json(value: &Value) -> JsonValue {
    match value {
        Value::Null => JsonValue::Null,
        Value::Integer(v) => JsonValue::from(*v),
        Value::Float(v) => JsonValue::from(*v),
        Value::Boolean(v) => JsonValue::from(*v),
        other => JsonValue::String(other.to_string()),
    }
}

/// Writes rejected rows as one JSON array per restore call.
#[derive(Debug, Clone)]
pub struct RejectionLog {
    op: Operator,
}

impl RejectionLog {
    /// Creates a rejection log over `op`.
    pub fn new(op: Operator) -> Self {
        Self { op }
    }

    /// Write `rows` to `log_{table}_{timestamp}.log`, returning the key.
    pub async fn write(&self, table_name: &str, rows: &[RejectedRow]) -> Result<String> {
        let key = format!(
            "log_{table_name}_{}.log",
            Utc::now().format("%Y%m%dT%H%M%S%.6fZ")
        );
        let content = serde_json::to_vec(rows)?;

        self.op
            .write(&key, content)
            .await
            .map_err(|e| Error::from(e).with_context("key", key.as_str()))?;

        log::info!("Logged {} rejected rows of {} to {}.", rows.len(), table_name, key);
        Ok(key)
    }
}
