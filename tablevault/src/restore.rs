//! Restore orchestrator: fetch, decode, then merge or replace.

use std::fmt::{Display, Formatter};
use std::str::FromStr;

use enum_display::EnumDisplay;
use itertools::Itertools;

use crate::config::VaultConfig;
use crate::db::{validate_table_name, ConnectionCreatorRef};
use crate::io::{ContainerStore, RejectedRow, RejectionLog};
use crate::response::OperationResponse;
use crate::target::BackupTarget;
use crate::types::{Container, Value};
use crate::{Error, ErrorKind, Result};

/// What a merge restore does after a row fails to apply.
///
/// Rows applied before a failure stay applied under either policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RowFailurePolicy {
    /// Stop at the first failing row.
    FailFast,
    /// Apply every row and report all failures.
    #[default]
    CollectAll,
}

impl FromStr for RowFailurePolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "fail_fast" => Ok(RowFailurePolicy::FailFast),
            "collect_all" => Ok(RowFailurePolicy::CollectAll),
            other => Err(Error::new(
                ErrorKind::ConfigInvalid,
                format!("Invalid row failure policy {other}"),
            )),
        }
    }
}

/// Restore progress, logged on every transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumDisplay)]
pub enum RestoreState {
    /// Reading the container from the store.
    Fetching,
    /// Decoding container bytes into rows.
    Decoding,
    /// Writing rows into the database.
    Applying,
    /// Finished, possibly with row failures.
    Done,
    /// Aborted.
    Failed,
}

/// How rows reach the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestoreStrategy {
    /// Per-row upsert keyed by primary key.
    Merge(BackupTarget),
    /// Drop, recreate and bulk insert.
    Replace,
}

impl Display for RestoreStrategy {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            RestoreStrategy::Merge(_) => write!(f, "merge"),
            RestoreStrategy::Replace => write!(f, "replace"),
        }
    }
}

/// A row the merge could not apply.
#[derive(Debug)]
pub struct RowFailure {
    /// Position of the row in the container.
    pub row: usize,
    /// Primary key of the row, when present.
    pub primary_key: Option<String>,
    /// Cause.
    pub error: Error,
}

/// Outcome of a restore that got as far as applying rows.
#[derive(Debug)]
pub struct RestoreReport {
    /// Restored table.
    pub table_name: String,
    /// Strategy used.
    pub strategy: RestoreStrategy,
    /// Rows in the container.
    pub total: usize,
    /// Rows written.
    pub applied: usize,
    /// Rows rejected, in container order.
    pub failures: Vec<RowFailure>,
    /// Key of the rejection log, if one was written.
    pub rejection_log: Option<String>,
    /// Why writing the rejection log failed.
    pub audit_error: Option<String>,
}

impl RestoreReport {
    fn new(table_name: &str, strategy: RestoreStrategy, total: usize) -> Self {
        Self {
            table_name: table_name.to_string(),
            strategy,
            total,
            applied: 0,
            failures: vec![],
            rejection_log: None,
            audit_error: None,
        }
    }

    /// Whether every row was applied.
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty() && self.applied == self.total
    }

    /// Rows skipped after a fail-fast abort.
    pub fn not_attempted(&self) -> usize {
        self.total - self.applied - self.failures.len()
    }

    /// Human readable summary, listing every failed row.
    pub fn message(&self) -> String {
        let mut message = format!(
            "Restored {} of {} rows into {} by {}.",
            self.applied, self.total, self.table_name, self.strategy
        );

        if !self.failures.is_empty() {
            let failures = self
                .failures
                .iter()
                .map(|f| match &f.primary_key {
                    Some(pk) => format!("row {} (id {pk}): {}", f.row, f.error),
                    None => format!("row {}: {}", f.row, f.error),
                })
                .join("; ");
            message.push_str(&format!(" {} failed: {failures}.", self.failures.len()));
        }
        if self.not_attempted() > 0 {
            message.push_str(&format!(" {} not attempted.", self.not_attempted()));
        }
        if let Some(key) = &self.rejection_log {
            message.push_str(&format!(" Rejected rows logged to {key}."));
        }
        if let Some(err) = &self.audit_error {
            message.push_str(&format!(" Writing rejection log failed: {err}."));
        }

        message
    }
}

impl From<Result<RestoreReport>> for OperationResponse {
    fn from(value: Result<RestoreReport>) -> Self {
        match value {
            Ok(report) if report.is_complete() => OperationResponse::success(report.message()),
            Ok(report) => OperationResponse::failure(report.message()),
            Err(e) => OperationResponse::failure(e.to_string()),
        }
    }
}

/// Restores tables from the container store.
///
/// Known targets merge row by row, anything else is dropped and recreated.
/// Each call opens its own database connection.
#[derive(Clone)]
pub struct RestoreService {
    connections: ConnectionCreatorRef,
    store: ContainerStore,
    rejection_log: Option<RejectionLog>,
    row_failure_policy: RowFailurePolicy,
}

impl RestoreService {
    /// Creates a restore service without rejection log.
    pub fn new(connections: ConnectionCreatorRef, store: ContainerStore) -> Self {
        Self {
            connections,
            store,
            rejection_log: None,
            row_failure_policy: RowFailurePolicy::default(),
        }
    }

    /// Creates a restore service from config.
    pub fn from_config(config: &VaultConfig) -> Result<Self> {
        let mut service = Self::new(
            config.connection_creator(),
            ContainerStore::new(config.store_operator()?),
        )
        .with_row_failure_policy(config.restore.row_failure_policy);
        if let Some(op) = config.audit_operator()? {
            service = service.with_rejection_log(RejectionLog::new(op));
        }
        Ok(service)
    }

    /// Write rejected rows to `log`.
    pub fn with_rejection_log(mut self, log: RejectionLog) -> Self {
        self.rejection_log = Some(log);
        self
    }

    /// Set what a merge does after a row fails.
    pub fn with_row_failure_policy(mut self, policy: RowFailurePolicy) -> Self {
        self.row_failure_policy = policy;
        self
    }

    /// Restore `table_name`, folding any failure into the response.
    ///
    /// The response is an error when the restore aborted or any row was
    /// rejected.
    pub async fn restore(&self, table_name: &str) -> OperationResponse {
        let result = self.try_restore(table_name).await;
        match &result {
            Ok(report) if report.is_complete() => log::info!("{}", report.message()),
            Ok(report) => log::error!("{}", report.message()),
            Err(e) => log::error!("Restore of {} failed: {}", table_name, e),
        }
        result.into()
    }

    /// Restore every known target, parents first.
    pub async fn restore_all(&self) -> Vec<(BackupTarget, OperationResponse)> {
        let mut responses = Vec::with_capacity(BackupTarget::restore_order().len());
        for target in BackupTarget::restore_order() {
            responses.push((target, self.restore(target.table_name()).await));
        }
        responses
    }

    /// Restore `table_name`.
    ///
    /// Returns `Err` when the restore aborted before or during applying;
    /// row failures of a merge are reported in [`RestoreReport::failures`].
    pub async fn try_restore(&self, table_name: &str) -> Result<RestoreReport> {
        validate_table_name(table_name)?;
        let target = BackupTarget::resolve(table_name);
        let table_name = target.map(|t| t.table_name()).unwrap_or(table_name);

        let mut state = RestoreState::Fetching;
        log::debug!("Restore of {}: {}", table_name, state);

        let result = self.run(table_name, target, &mut state).await;
        if let Err(e) = &result {
            log::debug!(
                "Restore of {}: {} -> {}: {}",
                table_name,
                state,
                RestoreState::Failed,
                e
            );
        }
        result
    }

    async fn run(
        &self,
        table_name: &str,
        target: Option<BackupTarget>,
        state: &mut RestoreState,
    ) -> Result<RestoreReport> {
        let bs = self.store.get(table_name).await?;

        advance(state, RestoreState::Decoding, table_name);
        let mut container = Container::decode(&bs)?;
        container.schema.name = table_name.to_string();

        advance(state, RestoreState::Applying, table_name);
        let (mut report, rejected) = match target {
            Some(target) => self.merge(target, container)?,
            None => (self.replace(container)?, vec![]),
        };

        if !rejected.is_empty() {
            self.write_rejections(&mut report, &rejected).await;
        }

        advance(state, RestoreState::Done, table_name);
        Ok(report)
    }

    /// Upsert rows one at a time. The connection is released on return.
    fn merge(
        &self,
        target: BackupTarget,
        mut container: Container,
    ) -> Result<(RestoreReport, Vec<RejectedRow>)> {
        let procedure = target.upsert_procedure();
        let positions = procedure.bind(&container.schema)?;
        // Kinds recorded at backup win over the table's declared kinds.
        let mut temporal = target.temporal_columns();
        temporal.extend(container.temporal.clone());
        container.restore_temporal(&temporal)?;

        let mut db = self.connections.connect()?;
        if !db.table_exists(target.table_name())? {
            log::info!("Table {} is missing, creating it.", target);
            db.execute_ddl(&target.create_table_sql())?;
        }

        let pk_idx = procedure.primary_key_index();
        let mut report = RestoreReport::new(
            target.table_name(),
            RestoreStrategy::Merge(target),
            container.row_count(),
        );
        let mut rejected = vec![];

        for (row_idx, row) in container.rows.iter().enumerate() {
            let params: Vec<Value> = positions
                .iter()
                .map(|idx| row.get(*idx).cloned().unwrap_or(Value::Null))
                .collect();

            match db.upsert(&procedure, &params) {
                Ok(()) => report.applied += 1,
                Err(e) => {
                    let primary_key = params
                        .get(pk_idx)
                        .filter(|v| !v.is_null())
                        .map(|v| v.to_string());
                    log::warn!("Row {} of {} rejected: {}", row_idx, target, e);

                    rejected.push(RejectedRow::new(
                        &container.schema,
                        row_idx,
                        row,
                        primary_key.clone(),
                        &e,
                    ));
                    report.failures.push(RowFailure {
                        row: row_idx,
                        primary_key,
                        error: e,
                    });

                    if self.row_failure_policy == RowFailurePolicy::FailFast {
                        break;
                    }
                }
            }
        }

        Ok((report, rejected))
    }

    /// Drop and recreate the table. The connection is released on return.
    fn replace(&self, mut container: Container) -> Result<RestoreReport> {
        log::warn!(
            "{} is not a known table, restoring it by destructive replace.",
            container.schema.name
        );

        let temporal = container.temporal.clone();
        container.restore_temporal(&temporal)?;

        let mut db = self.connections.connect()?;
        db.replace(&container.schema, &temporal, &container.rows)?;

        let mut report = RestoreReport::new(
            &container.schema.name,
            RestoreStrategy::Replace,
            container.row_count(),
        );
        report.applied = container.row_count();
        Ok(report)
    }

    async fn write_rejections(&self, report: &mut RestoreReport, rejected: &[RejectedRow]) {
        let Some(rejection_log) = &self.rejection_log else {
            return;
        };

        match rejection_log.write(&report.table_name, rejected).await {
            Ok(key) => report.rejection_log = Some(key),
            Err(e) => {
                log::error!(
                    "Failed to write rejection log of {}: {}",
                    report.table_name,
                    e
                );
                report.audit_error = Some(e.to_string());
            }
        }
    }
}

fn advance(state: &mut RestoreState, next: RestoreState, table_name: &str) {
    log::debug!("Restore of {}: {} -> {}", table_name, state, next);
    *state = next;
}
