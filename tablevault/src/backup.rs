//! Backup orchestrator: infer, serialize, encode, then store.

use crate::config::VaultConfig;
use crate::db::ConnectionCreatorRef;
use crate::inference::{infer_schema, UnknownTypePolicy};
use crate::io::ContainerStore;
use crate::response::OperationResponse;
use crate::serializer::snapshot_table;
use crate::target::BackupTarget;
use crate::types::Container;
use crate::Result;

/// Backs up tables into the container store.
///
/// Each call opens its own database connection. The container is fully
/// encoded in memory before the store is touched, so a failed backup never
/// replaces the previous one.
#[derive(Clone)]
pub struct BackupService {
    connections: ConnectionCreatorRef,
    store: ContainerStore,
    unknown_type_policy: UnknownTypePolicy,
}

impl BackupService {
    /// Creates a backup service.
    pub fn new(connections: ConnectionCreatorRef, store: ContainerStore) -> Self {
        Self {
            connections,
            store,
            unknown_type_policy: UnknownTypePolicy::default(),
        }
    }

    /// Creates a backup service from config.
    pub fn from_config(config: &VaultConfig) -> Result<Self> {
        Ok(Self::new(
            config.connection_creator(),
            ContainerStore::new(config.store_operator()?),
        )
        .with_unknown_type_policy(config.schema.unknown_type_policy))
    }

    /// Set what inference does with unmapped column types.
    pub fn with_unknown_type_policy(mut self, policy: UnknownTypePolicy) -> Self {
        self.unknown_type_policy = policy;
        self
    }

    /// Back up `table_name`, folding any failure into the response.
    pub async fn backup(&self, table_name: &str) -> OperationResponse {
        let result = self.try_backup(table_name).await;
        match &result {
            Ok(message) => log::info!("{}", message),
            Err(e) => log::error!("Backup of {} failed: {}", table_name, e),
        }
        result.into()
    }

    /// Back up `table_name`.
    ///
    /// Known targets are stored under their canonical name, so `employees`
    /// and `hired_employees` share one container.
    pub async fn try_backup(&self, table_name: &str) -> Result<String> {
        let table_name = BackupTarget::resolve(table_name)
            .map(|t| t.table_name())
            .unwrap_or(table_name);

        let (bs, row_count) = self.snapshot(table_name)?;
        let size = bs.len();
        self.store.put(table_name, bs).await?;

        Ok(format!(
            "Backed up {row_count} rows of {table_name} to {} ({size} bytes).",
            Container::object_key(table_name)
        ))
    }

    /// Read and encode the table. The connection is released on return.
    fn snapshot(&self, table_name: &str) -> Result<(Vec<u8>, usize)> {
        let db = self.connections.connect()?;
        let inferred = infer_schema(db.as_ref(), table_name, self.unknown_type_policy)?;
        let container = snapshot_table(db.as_ref(), &inferred)?;
        Ok((container.encode()?, container.row_count()))
    }
}
