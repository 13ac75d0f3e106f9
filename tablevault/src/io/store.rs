//! Object store of table containers.

use opendal::Operator;

use crate::types::Container;
use crate::{Error, ErrorKind, Result};

/// Puts and gets containers keyed by `{table}.avro`.
///
/// Backups are not versioned: a put replaces the previous object with the
/// same key, and concurrent puts resolve as last write wins in the store.
#[derive(Debug, Clone)]
pub struct ContainerStore {
    op: Operator,
}

impl ContainerStore {
    /// Creates a container store over `op`.
    pub fn new(op: Operator) -> Self {
        Self { op }
    }

    /// Write container bytes of `table_name`, replacing any previous backup.
    pub async fn put(&self, table_name: &str, bs: Vec<u8>) -> Result<()> {
        let key = Container::object_key(table_name);
        log::debug!("Writing {} bytes to {}.", bs.len(), key);

        self.op
            .write(&key, bs)
            .await
            .map_err(|e| Error::from(e).with_context("key", key))
    }

    /// Read container bytes of `table_name`.
    ///
    /// Fails with [`ErrorKind::NotFound`] when no backup exists.
    pub async fn get(&self, table_name: &str) -> Result<Vec<u8>> {
        let key = Container::object_key(table_name);

        self.op.read(&key).await.map_err(|e| {
            let err = Error::from(e).with_context("key", key.as_str());
            if err.kind() == ErrorKind::NotFound {
                Error::new(
                    ErrorKind::NotFound,
                    format!("no backup exists for table {table_name}"),
                )
                .with_context("key", key.as_str())
            } else {
                err
            }
        })
    }

    /// Check a backup exists for `table_name`.
    pub async fn exists(&self, table_name: &str) -> Result<bool> {
        Ok(self.op.is_exist(&Container::object_key(table_name)).await?)
    }
}
