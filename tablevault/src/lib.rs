//! tablevault backs up relational tables into self-describing
//! [Apache Avro](https://avro.apache.org/) containers on an object store,
//! and restores them by per-row merge or destructive replace.

// Make sure all our public APIs have docs.
#![deny(missing_docs)]

mod error;
pub use error::Error;
pub use error::ErrorKind;
pub use error::Result;

pub mod backup;
pub mod config;
pub mod db;
pub mod inference;
pub mod io;
pub mod response;
pub mod restore;
pub mod serializer;
pub mod target;
pub mod types;

pub use backup::BackupService;
pub use config::VaultConfig;
pub use response::OperationResponse;
pub use restore::{RestoreService, RowFailurePolicy};
pub use target::BackupTarget;
