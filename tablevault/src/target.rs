//! Well-known reference tables and their merge contracts.

use std::fmt::{Display, Formatter};

use itertools::Itertools;

use crate::types::{TableSchema, TemporalColumns, TemporalKind};
use crate::{Error, ErrorKind, Result};

/// Foreign key of a reference table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ForeignKey {
    /// Referencing column.
    pub column: &'static str,
    /// Referenced table.
    pub references: BackupTarget,
}

/// One of the reference tables whose restore merges row by row.
///
/// Resolved once from the requested table name, see
/// [`BackupTarget::resolve`]. Anything that doesn't resolve is restored by
/// destructive replace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackupTarget {
    /// `departments(id, department)`
    Departments,
    /// `jobs(id, job)`
    Jobs,
    /// `hired_employees(id, name, datetime, department_id, job_id)`
    HiredEmployees,
}

impl BackupTarget {
    /// Targets in parent-first order, so foreign keys resolve when all of
    /// them are restored in sequence.
    pub fn restore_order() -> [BackupTarget; 3] {
        [
            BackupTarget::Departments,
            BackupTarget::Jobs,
            BackupTarget::HiredEmployees,
        ]
    }

    /// Resolve a table name by exact match. `employees` is accepted as an
    /// alias of `hired_employees`.
    pub fn resolve(table_name: &str) -> Option<BackupTarget> {
        match table_name {
            "departments" => Some(BackupTarget::Departments),
            "jobs" => Some(BackupTarget::Jobs),
            "hired_employees" | "employees" => Some(BackupTarget::HiredEmployees),
            _ => None,
        }
    }

    /// Canonical table name, also the container key stem.
    pub fn table_name(&self) -> &'static str {
        match self {
            BackupTarget::Departments => "departments",
            BackupTarget::Jobs => "jobs",
            BackupTarget::HiredEmployees => "hired_employees",
        }
    }

    /// Primary key column.
    pub fn primary_key(&self) -> &'static str {
        "id"
    }

    /// Columns and their declared types, primary key first.
    pub fn columns(&self) -> &'static [(&'static str, &'static str)] {
        match self {
            BackupTarget::Departments => &[("id", "INTEGER"), ("department", "TEXT")],
            BackupTarget::Jobs => &[("id", "INTEGER"), ("job", "TEXT")],
            BackupTarget::HiredEmployees => &[
                ("id", "INTEGER"),
                ("name", "TEXT"),
                ("datetime", "DATETIME"),
                ("department_id", "INTEGER"),
                ("job_id", "INTEGER"),
            ],
        }
    }

    /// Columns stored as text in a container that must be reparsed.
    pub fn temporal_columns(&self) -> TemporalColumns {
        match self {
            BackupTarget::HiredEmployees => {
                TemporalColumns::from([("datetime".to_string(), TemporalKind::DateTime)])
            }
            _ => TemporalColumns::new(),
        }
    }

    /// Foreign keys to other reference tables.
    pub fn foreign_keys(&self) -> &'static [ForeignKey] {
        match self {
            BackupTarget::HiredEmployees => &[
                ForeignKey {
                    column: "department_id",
                    references: BackupTarget::Departments,
                },
                ForeignKey {
                    column: "job_id",
                    references: BackupTarget::Jobs,
                },
            ],
            _ => &[],
        }
    }

    /// DDL that provisions this table when it's missing.
    pub fn create_table_sql(&self) -> String {
        let columns = self.columns().iter().map(|(name, typ)| {
            if *name == self.primary_key() {
                format!("\"{name}\" {typ} PRIMARY KEY NOT NULL")
            } else {
                format!("\"{name}\" {typ}")
            }
        });
        let foreign_keys = self.foreign_keys().iter().map(|fk| {
            format!(
                "FOREIGN KEY (\"{}\") REFERENCES \"{}\" (\"{}\")",
                fk.column,
                fk.references.table_name(),
                fk.references.primary_key()
            )
        });

        format!(
            "CREATE TABLE IF NOT EXISTS \"{}\" ({})",
            self.table_name(),
            columns.chain(foreign_keys).join(", ")
        )
    }

    /// Insert-or-update keyed by primary key.
    pub fn upsert_procedure(&self) -> UpsertProcedure {
        let columns: Vec<&'static str> = self.columns().iter().map(|(name, _)| *name).collect();
        let pk = self.primary_key();

        let statement = format!(
            "INSERT INTO \"{table}\" ({cols}) VALUES ({placeholders}) \
             ON CONFLICT (\"{pk}\") DO UPDATE SET {updates}",
            table = self.table_name(),
            cols = columns.iter().map(|c| format!("\"{c}\"")).join(", "),
            placeholders = (1..=columns.len()).map(|i| format!("?{i}")).join(", "),
            updates = columns
                .iter()
                .filter(|c| **c != pk)
                .map(|c| format!("\"{c}\" = excluded.\"{c}\""))
                .join(", "),
        );

        UpsertProcedure {
            target: *self,
            columns,
            statement,
        }
    }
}

impl Display for BackupTarget {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.table_name())
    }
}

/// Per-row upsert statement of a [`BackupTarget`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpsertProcedure {
    /// Target this procedure belongs to.
    pub target: BackupTarget,
    /// Parameter order of `statement`.
    pub columns: Vec<&'static str>,
    /// Parameterized statement, `?1..?n` bound in `columns` order.
    pub statement: String,
}

impl UpsertProcedure {
    /// Map each procedure parameter to its position in `schema`.
    ///
    /// Fails with [`ErrorKind::Format`] when the container lacks a column the
    /// procedure needs.
    pub fn bind(&self, schema: &TableSchema) -> Result<Vec<usize>> {
        self.columns
            .iter()
            .map(|column| {
                schema.position(column).ok_or_else(|| {
                    Error::new(
                        ErrorKind::Format,
                        format!(
                            "container for {} has no column {column} required by its merge procedure",
                            self.target
                        ),
                    )
                })
            })
            .collect()
    }

    /// Position of the primary key among procedure parameters.
    pub fn primary_key_index(&self) -> usize {
        self.columns
            .iter()
            .position(|c| *c == self.target.primary_key())
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{FieldDescriptor, LogicalType};

    #[test]
    fn test_resolve() {
        assert_eq!(BackupTarget::resolve("jobs"), Some(BackupTarget::Jobs));
        assert_eq!(
            BackupTarget::resolve("employees"),
            Some(BackupTarget::HiredEmployees)
        );
        assert_eq!(
            BackupTarget::resolve("hired_employees"),
            Some(BackupTarget::HiredEmployees)
        );
        assert_eq!(BackupTarget::resolve("Jobs"), None);
        assert_eq!(BackupTarget::resolve("payroll"), None);
    }

    #[test]
    fn test_upsert_statement() {
        let procedure = BackupTarget::Jobs.upsert_procedure();
        assert_eq!(
            procedure.statement,
            "INSERT INTO \"jobs\" (\"id\", \"job\") VALUES (?1, ?2) \
             ON CONFLICT (\"id\") DO UPDATE SET \"job\" = excluded.\"job\""
        );
    }

    #[test]
    fn test_create_table_sql() {
        assert_eq!(
            BackupTarget::Departments.create_table_sql(),
            "CREATE TABLE IF NOT EXISTS \"departments\" (\"id\" INTEGER PRIMARY KEY NOT NULL, \"department\" TEXT)"
        );
        assert!(BackupTarget::HiredEmployees
            .create_table_sql()
            .contains("FOREIGN KEY (\"job_id\") REFERENCES \"jobs\" (\"id\")"));
    }

    #[test]
    fn test_bind_reorders_columns() -> Result<()> {
        let schema = TableSchema::new(
            "jobs",
            vec![
                FieldDescriptor::new("job", LogicalType::Text),
                FieldDescriptor::new("id", LogicalType::Integer),
            ],
        );

        assert_eq!(BackupTarget::Jobs.upsert_procedure().bind(&schema)?, vec![1, 0]);
        Ok(())
    }

    #[test]
    fn test_bind_missing_column() {
        let schema = TableSchema::new(
            "jobs",
            vec![FieldDescriptor::new("id", LogicalType::Integer)],
        );

        let err = BackupTarget::Jobs.upsert_procedure().bind(&schema).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Format);
    }
}
