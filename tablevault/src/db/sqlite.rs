//! SQLite backed [`Database`].

use std::path::{Path, PathBuf};

use itertools::Itertools;
use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::{params, params_from_iter, Connection};

use super::{quote_ident, validate_table_name, ColumnMeta, ConnectionCreator, Database, NativeType};
use crate::target::UpsertProcedure;
use crate::types::{format_date, format_datetime, Row, TableSchema, TemporalColumns, Value};
use crate::{Error, ErrorKind, Result};

/// Opens a new [`SqliteDatabase`] on every call.
#[derive(Debug, Clone)]
pub struct SqliteConnectionCreator {
    path: PathBuf,
}

impl SqliteConnectionCreator {
    /// Create a connection creator for the database file at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl ConnectionCreator for SqliteConnectionCreator {
    fn connect(&self) -> Result<Box<dyn Database>> {
        Ok(Box::new(SqliteDatabase::open(&self.path)?))
    }
}

/// A single SQLite connection with foreign keys enforced.
pub struct SqliteDatabase {
    conn: Connection,
}

impl SqliteDatabase {
    /// Open the database file at `path`, creating it when missing.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path).map_err(|e| {
            Error::from(e).with_context("path", path.to_string_lossy().to_string())
        })?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;

        Ok(Self { conn })
    }

    /// Underlying connection.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }
}

impl Database for SqliteDatabase {
    fn table_exists(&self, table_name: &str) -> Result<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT count(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
            params![table_name],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    fn columns(&self, table_name: &str) -> Result<Vec<ColumnMeta>> {
        validate_table_name(table_name)?;

        let schema_error = |e: rusqlite::Error| {
            Error::from(e)
                .with_kind(ErrorKind::SchemaInference)
                .with_context("table", table_name)
        };

        let mut stmt = self
            .conn
            .prepare(&format!("PRAGMA table_info({})", quote_ident(table_name)))
            .map_err(schema_error)?;
        let columns = stmt
            .query_map([], |row| {
                let name: String = row.get(1)?;
                let declared: String = row.get(2)?;
                Ok(ColumnMeta::new(name, NativeType::from(declared.as_str())))
            })
            .map_err(schema_error)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(schema_error)?;

        if columns.is_empty() {
            return Err(Error::new(
                ErrorKind::SchemaInference,
                format!("table {table_name} does not exist"),
            ));
        }

        Ok(columns)
    }

    fn scan(&self, table_name: &str, columns: &[ColumnMeta]) -> Result<Vec<Row>> {
        validate_table_name(table_name)?;
        if columns.is_empty() {
            return Ok(vec![]);
        }

        let sql = format!(
            "SELECT {} FROM {}",
            columns.iter().map(|c| quote_ident(&c.name)).join(", "),
            quote_ident(table_name)
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map([], |row| {
                columns
                    .iter()
                    .enumerate()
                    .map(|(idx, column)| {
                        row.get_ref(idx)
                            .map(|value| read_value(value, &column.native_type))
                    })
                    .collect::<rusqlite::Result<Vec<_>>>()
                    .map(Row::new)
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(rows)
    }

    fn replace(
        &mut self,
        schema: &TableSchema,
        temporal: &TemporalColumns,
        rows: &[Row],
    ) -> Result<()> {
        validate_table_name(&schema.name)?;
        if schema.is_empty() {
            return Err(Error::new(
                ErrorKind::Format,
                format!("container for {} has no columns", schema.name),
            ));
        }

        let table = quote_ident(&schema.name);
        let column_defs = schema
            .fields
            .iter()
            .map(|f| {
                let typ = temporal
                    .get(&f.name)
                    .map(|kind| kind.sql_type())
                    .unwrap_or_else(|| f.logical_type.sql_type());
                format!("{} {typ}", quote_ident(&f.name))
            })
            .join(", ");
        let insert = format!(
            "INSERT INTO {table} ({}) VALUES ({})",
            schema.field_names().map(quote_ident).join(", "),
            (1..=schema.len()).map(|i| format!("?{i}")).join(", ")
        );

        let tx = self.conn.transaction()?;
        tx.execute(&format!("DROP TABLE IF EXISTS {table}"), [])?;
        tx.execute(&format!("CREATE TABLE {table} ({column_defs})"), [])?;
        {
            let mut stmt = tx.prepare(&insert)?;
            for (row_idx, row) in rows.iter().enumerate() {
                stmt.execute(params_from_iter(row.values().iter().map(to_sql_value)))
                    .map_err(|e| Error::from(e).with_context("row", row_idx.to_string()))?;
            }
        }
        tx.commit()?;

        Ok(())
    }

    fn upsert(&mut self, procedure: &UpsertProcedure, params: &[Value]) -> Result<()> {
        let mut stmt = self.conn.prepare_cached(&procedure.statement)?;
        stmt.execute(params_from_iter(params.iter().map(to_sql_value)))?;
        Ok(())
    }

    fn execute_ddl(&mut self, sql: &str) -> Result<()> {
        self.conn.execute_batch(sql)?;
        Ok(())
    }
}

fn read_value(value: ValueRef<'_>, native_type: &NativeType) -> Value {
    let value = match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(v) => Value::Integer(v),
        ValueRef::Real(v) => Value::Float(v),
        ValueRef::Text(v) | ValueRef::Blob(v) => Value::Text(String::from_utf8_lossy(v).into_owned()),
    };

    match (native_type, value) {
        (NativeType::Boolean, Value::Integer(v)) => Value::Boolean(v != 0),
        (native_type, Value::Text(s)) => match native_type.temporal_kind() {
            // Malformed temporal text is kept as text.
            Some(kind) => Value::Text(s.clone()).into_temporal(kind).unwrap_or(Value::Text(s)),
            None => Value::Text(s),
        },
        (_, value) => value,
    }
}

fn to_sql_value(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Integer(v) => SqlValue::Integer(*v),
        Value::Float(v) => SqlValue::Real(*v),
        Value::Boolean(v) => SqlValue::Integer(*v as i64),
        Value::Text(v) => SqlValue::Text(v.clone()),
        Value::Date(v) => SqlValue::Text(format_date(v)),
        Value::DateTime(v) => SqlValue::Text(format_datetime(v)),
    }
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, NaiveDateTime};
    use tempfile::TempDir;

    use super::*;
    use crate::target::BackupTarget;
    use crate::types::{FieldDescriptor, LogicalType, TemporalKind};

    fn open_temp() -> (TempDir, SqliteDatabase) {
        let tmp_dir = TempDir::new().unwrap();
        let db = SqliteDatabase::open(&tmp_dir.path().join("test.db")).unwrap();
        (tmp_dir, db)
    }

    #[test]
    fn test_columns_and_scan() -> Result<()> {
        let (_tmp_dir, db) = open_temp();
        db.connection().execute_batch(
            "CREATE TABLE events (id INTEGER, label VARCHAR(20), ok BOOLEAN, day DATE, at DATETIME, weight REAL);
             INSERT INTO events VALUES (1, 'launch', 1, '2023-05-20', '2023-05-20 10:15:00', 1.5);
             INSERT INTO events VALUES (2, NULL, 0, 'someday', NULL, NULL);",
        )?;

        let columns = db.columns("events")?;
        assert_eq!(
            columns,
            vec![
                ColumnMeta::new("id", NativeType::Integer),
                ColumnMeta::new("label", NativeType::Text),
                ColumnMeta::new("ok", NativeType::Boolean),
                ColumnMeta::new("day", NativeType::Date),
                ColumnMeta::new("at", NativeType::DateTime),
                ColumnMeta::new("weight", NativeType::Float),
            ]
        );

        let rows = db.scan("events", &columns)?;
        assert_eq!(
            rows,
            vec![
                Row::new(vec![
                    Value::Integer(1),
                    Value::Text("launch".to_string()),
                    Value::Boolean(true),
                    Value::Date(NaiveDate::from_ymd_opt(2023, 5, 20).unwrap()),
                    Value::DateTime(
                        NaiveDateTime::parse_from_str("2023-05-20 10:15:00", "%Y-%m-%d %H:%M:%S")
                            .unwrap()
                    ),
                    Value::Float(1.5),
                ]),
                Row::new(vec![
                    Value::Integer(2),
                    Value::Null,
                    Value::Boolean(false),
                    Value::Text("someday".to_string()),
                    Value::Null,
                    Value::Null,
                ]),
            ]
        );
        Ok(())
    }

    #[test]
    fn test_columns_of_missing_table() {
        let (_tmp_dir, db) = open_temp();

        let err = db.columns("nope").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SchemaInference);
        assert!(!db.table_exists("nope").unwrap());
    }

    #[test]
    fn test_replace_recreates_table() -> Result<()> {
        let (_tmp_dir, mut db) = open_temp();
        db.connection().execute_batch(
            "CREATE TABLE notes (id INTEGER, body TEXT, extra TEXT);
             INSERT INTO notes VALUES (9, 'stale', 'x');",
        )?;

        let schema = TableSchema::new(
            "notes",
            vec![
                FieldDescriptor::new("id", LogicalType::Integer),
                FieldDescriptor::new("written", LogicalType::Text),
            ],
        );
        let temporal = TemporalColumns::from([("written".to_string(), TemporalKind::Date)]);
        let rows = vec![Row::new(vec![
            Value::Integer(1),
            Value::Date(NaiveDate::from_ymd_opt(2024, 1, 2).unwrap()),
        ])];

        db.replace(&schema, &temporal, &rows)?;

        let columns = db.columns("notes")?;
        assert_eq!(
            columns,
            vec![
                ColumnMeta::new("id", NativeType::Integer),
                ColumnMeta::new("written", NativeType::Date),
            ]
        );
        assert_eq!(db.scan("notes", &columns)?, rows);
        Ok(())
    }

    #[test]
    fn test_upsert_and_constraint_error() -> Result<()> {
        let (_tmp_dir, mut db) = open_temp();
        for target in BackupTarget::restore_order() {
            db.execute_ddl(&target.create_table_sql())?;
        }

        let procedure = BackupTarget::Jobs.upsert_procedure();
        db.upsert(&procedure, &[Value::Integer(1), Value::Text("Engineer".to_string())])?;
        db.upsert(&procedure, &[Value::Integer(1), Value::Text("Manager".to_string())])?;

        let columns = db.columns("jobs")?;
        assert_eq!(
            db.scan("jobs", &columns)?,
            vec![Row::new(vec![
                Value::Integer(1),
                Value::Text("Manager".to_string())
            ])]
        );

        // Unknown department violates the foreign key.
        let err = db
            .upsert(
                &BackupTarget::HiredEmployees.upsert_procedure(),
                &[
                    Value::Integer(1),
                    Value::Text("Ada".to_string()),
                    Value::Null,
                    Value::Integer(42),
                    Value::Integer(1),
                ],
            )
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Constraint);
        Ok(())
    }
}
