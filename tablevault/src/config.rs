//! This module contains service configurations.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use opendal::Operator;

use crate::db::{ConnectionCreatorRef, SqliteConnectionCreator};
use crate::error::Result;
use crate::inference::UnknownTypePolicy;
use crate::io::OperatorArgs;
use crate::restore::RowFailurePolicy;
use crate::{Error, ErrorKind};

const CONFIG_PREFIX: &str = "tablevault.";
const DATABASE_PATH: &str = "tablevault.database.path";
const STORE_PREFIX: &str = "tablevault.store.";
const STORE_LOCATION: &str = "tablevault.store.location";
const AUDIT_PREFIX: &str = "tablevault.audit.";
const AUDIT_LOCATION: &str = "tablevault.audit.location";
const ROW_FAILURE_POLICY: &str = "tablevault.restore.row_failure_policy";
const UNKNOWN_TYPE_POLICY: &str = "tablevault.schema.unknown_type_policy";

/// Environment variables with this prefix override config keys.
///
/// `TABLEVAULT__STORE__LOCATION` maps to `tablevault.store.location`.
pub const ENV_PREFIX: &str = "TABLEVAULT__";

/// Service configuration, passed explicitly into every orchestrator.
#[derive(PartialEq, Eq, Debug)]
pub struct VaultConfig {
    /// SQLite database file holding the tables.
    pub database_path: PathBuf,
    /// Store holding containers.
    pub store: OperatorArgs,
    /// Store receiving rejection logs, disabled when `None`.
    pub audit: Option<OperatorArgs>,
    /// Restore configuration.
    pub restore: RestoreConfig,
    /// Schema inference configuration.
    pub schema: SchemaConfig,
}

/// Restore configuration.
#[derive(PartialEq, Eq, Debug, Default)]
pub struct RestoreConfig {
    /// What a merge restore does after a row fails.
    pub row_failure_policy: RowFailurePolicy,
}

/// Schema inference configuration.
#[derive(PartialEq, Eq, Debug, Default)]
pub struct SchemaConfig {
    /// What inference does with unmapped column types.
    pub unknown_type_policy: UnknownTypePolicy,
}

impl VaultConfig {
    /// Opens database connections for this config.
    pub fn connection_creator(&self) -> ConnectionCreatorRef {
        Arc::new(SqliteConnectionCreator::new(self.database_path.clone()))
    }

    /// Operator of the container store.
    pub fn store_operator(&self) -> Result<Operator> {
        Operator::try_from(&self.store)
    }

    /// Operator of the rejection log store, if configured.
    pub fn audit_operator(&self) -> Result<Option<Operator>> {
        self.audit.as_ref().map(Operator::try_from).transpose()
    }
}

impl TryFrom<&'_ HashMap<String, String>> for VaultConfig {
    type Error = Error;

    fn try_from(value: &'_ HashMap<String, String>) -> Result<Self> {
        let database_path = value
            .get(DATABASE_PATH)
            .map(PathBuf::from)
            .ok_or_else(|| {
                Error::new(
                    ErrorKind::ConfigInvalid,
                    format!("Missing required config {DATABASE_PATH}."),
                )
            })?;

        let store = operator_args(value, STORE_PREFIX, STORE_LOCATION)?.ok_or_else(|| {
            Error::new(
                ErrorKind::ConfigInvalid,
                format!("Missing required config {STORE_LOCATION}."),
            )
        })?;

        let audit = operator_args(value, AUDIT_PREFIX, AUDIT_LOCATION)?;

        let mut restore = RestoreConfig::default();
        value
            .get(ROW_FAILURE_POLICY)
            .map(|v| v.parse::<RowFailurePolicy>())
            .transpose()
            .map_err(|e| e.with_context("key", ROW_FAILURE_POLICY))?
            .iter()
            .for_each(|v| restore.row_failure_policy = *v);

        let mut schema = SchemaConfig::default();
        value
            .get(UNKNOWN_TYPE_POLICY)
            .map(|v| v.parse::<UnknownTypePolicy>())
            .transpose()
            .map_err(|e| e.with_context("key", UNKNOWN_TYPE_POLICY))?
            .iter()
            .for_each(|v| schema.unknown_type_policy = *v);

        Ok(VaultConfig {
            database_path,
            store,
            audit,
            restore,
            schema,
        })
    }
}

/// Operator args from `{prefix}location` plus every other `{prefix}*` key.
fn operator_args(
    value: &HashMap<String, String>,
    prefix: &str,
    location_key: &str,
) -> Result<Option<OperatorArgs>> {
    let Some(location) = value.get(location_key) else {
        return Ok(None);
    };

    let extra_args = value
        .iter()
        .filter(|(k, _)| k.as_str() != location_key)
        .filter_map(|(k, v)| k.strip_prefix(prefix).map(|arg| (arg, v)));

    Ok(Some(
        OperatorArgs::builder_from_path(location)
            .map_err(|e| e.with_context("key", location_key))?
            .with_args(extra_args)
            .build(),
    ))
}

/// Overlay `TABLEVAULT__*` environment variables onto config keys.
///
/// Double underscores separate key segments, single underscores are kept:
/// `TABLEVAULT__RESTORE__ROW_FAILURE_POLICY` sets
/// `tablevault.restore.row_failure_policy`.
pub fn overlay_env(
    config: &mut HashMap<String, String>,
    vars: impl IntoIterator<Item = (String, String)>,
) {
    for (key, value) in vars {
        if let Some(rest) = key.strip_prefix(ENV_PREFIX) {
            let key = format!("{CONFIG_PREFIX}{}", rest.to_lowercase().replace("__", "."));
            config.insert(key, value);
        }
    }
}
