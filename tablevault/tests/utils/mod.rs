#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::{Arc, Once};

use itertools::Itertools;
use opendal::services::Memory;
use opendal::Operator;
use tablevault::db::{ConnectionCreatorRef, Database, SqliteConnectionCreator, SqliteDatabase};
use tablevault::io::ContainerStore;
use tablevault::types::Row;
use tablevault::{BackupService, BackupTarget, RestoreService};
use tempfile::TempDir;

static INIT: Once = Once::new();

pub fn set_up() {
    INIT.call_once(env_logger::init);
}

pub const SEED_SQL: &str = "
INSERT INTO departments VALUES (1, 'Supply Chain');
INSERT INTO departments VALUES (2, 'Maintenance');
INSERT INTO departments VALUES (3, 'Staff');
INSERT INTO jobs VALUES (1, 'Recruiter');
INSERT INTO jobs VALUES (2, 'Manager');
INSERT INTO jobs VALUES (3, 'Analyst');
INSERT INTO hired_employees VALUES (1, 'Harold Vogt', '2021-11-07T02:48:42', 2, 1);
INSERT INTO hired_employees VALUES (2, 'Ty Hofer', '2021-05-30T05:43:46', 1, 2);
INSERT INTO hired_employees VALUES (3, 'Lyman Hadye', '2021-09-01T23:27:38.125', 3, 3);
INSERT INTO hired_employees VALUES (4, NULL, NULL, 1, 2);
";

/// DDL of the three reference tables, parents first.
pub fn reference_ddl() -> String {
    BackupTarget::restore_order()
        .iter()
        .map(|t| format!("{};", t.create_table_sql()))
        .join("\n")
}

/// A SQLite file plus an in-memory container store.
pub struct TestFixture {
    tmp_dir: TempDir,
    db_path: PathBuf,
    pub store_op: Operator,
    pub store: ContainerStore,
}

impl TestFixture {
    /// Reference tables, seeded.
    pub fn new() -> Self {
        Self::with_sql(&format!("{}\n{}", reference_ddl(), SEED_SQL))
    }

    /// Database initialized by `sql`.
    pub fn with_sql(sql: &str) -> Self {
        set_up();

        let tmp_dir = TempDir::new().unwrap();
        let db_path = tmp_dir.path().join("tablevault.db");
        let store_op = Operator::new(Memory::default()).unwrap().finish();

        let fixture = Self {
            tmp_dir,
            db_path,
            store: ContainerStore::new(store_op.clone()),
            store_op,
        };
        fixture.execute(sql);
        fixture
    }

    pub fn dir(&self) -> &Path {
        self.tmp_dir.path()
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    pub fn connections(&self) -> ConnectionCreatorRef {
        Arc::new(SqliteConnectionCreator::new(self.db_path.clone()))
    }

    pub fn backup_service(&self) -> BackupService {
        BackupService::new(self.connections(), self.store.clone())
    }

    pub fn restore_service(&self) -> RestoreService {
        RestoreService::new(self.connections(), self.store.clone())
    }

    pub fn execute(&self, sql: &str) {
        self.open().connection().execute_batch(sql).unwrap();
    }

    /// Every row of `table_name` in scan order.
    pub fn rows(&self, table_name: &str) -> Vec<Row> {
        let db = self.open();
        let columns = db.columns(table_name).unwrap();
        db.scan(table_name, &columns).unwrap()
    }

    /// Declared column types of `table_name`.
    pub fn declared_types(&self, table_name: &str) -> Vec<String> {
        let db = self.open();
        let mut stmt = db
            .connection()
            .prepare(&format!("PRAGMA table_info(\"{table_name}\")"))
            .unwrap();
        stmt.query_map([], |row| row.get::<_, String>(2))
            .unwrap()
            .collect::<rusqlite::Result<Vec<_>>>()
            .unwrap()
    }

    fn open(&self) -> SqliteDatabase {
        SqliteDatabase::open(&self.db_path).unwrap()
    }
}
