//! Reconciliation engine
//!
//! Drives one submission through its checks and, when the batch is clean,
//! applies it to the record store in a single transaction:
//!
//! 1. form name and token (fail fast)
//! 2. table digest over the submitted key markers (fail fast)
//! 3. parse (fail fast)
//! 4. stale row detection (accumulates; strict mode stops at the first)
//! 5. field validation (accumulates)
//! 6. apply, all or nothing
//!
//! Every call that gets past parsing reissues a token and table digest.

use crate::cell::Submission;
use crate::config::{ConflictMode, GridConfig, ReconcileOptions};
use crate::error::{ConfigError, ReconcileError, StoreError, WriteOp};
use crate::parser;
use crate::report::{dedup_messages, BatchStatus, IssueKind, ReconcileReport, Reissue, RowIssue, WriteSummary};
use crate::store::{bar_decode, RecordStore, StoreTransaction};
use crate::validation::{validate_row, FieldIssue};
use editgrid_integrity::{
    input_digest, DigestContext, IntegrityService, SessionId, SessionStore, TableMaterial,
};
use editgrid_model::{
    Digest, FieldMap, KeyValues, KeyVisibility, Row, RowCollection, RowFlag, TableSchema,
};
use std::collections::HashSet;
use std::sync::Arc;

/// Message for a row whose record changed since render
pub const MSG_RECORD_CHANGED: &str = "record has been changed";
/// Message for a row whose record was removed since render
pub const MSG_RECORD_DELETED: &str = "record has been deleted";

/// Renders grids and reconciles their submissions against one store table
#[derive(Clone)]
pub struct ReconciliationEngine {
    pub(crate) config: GridConfig,
    pub(crate) schema: Arc<TableSchema>,
    pub(crate) integrity: IntegrityService,
    pub(crate) store: Arc<dyn RecordStore>,
}

impl std::fmt::Debug for ReconciliationEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReconciliationEngine")
            .field("form", &self.config.form_name())
            .field("columns", &self.schema.len())
            .field("integrity", &self.integrity)
            .finish_non_exhaustive()
    }
}

impl ReconciliationEngine {
    /// Engine over the columns declared in `config`
    ///
    /// # Errors
    /// `Invalid` when no columns are declared, `Schema` when they do not form a schema
    pub fn new(
        config: GridConfig,
        sessions: Arc<dyn SessionStore>,
        store: Arc<dyn RecordStore>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        if config.columns.is_empty() {
            return Err(ConfigError::Invalid("no columns declared".into()));
        }
        let schema = config.schema()?;
        Ok(Self::with_schema(config, schema, sessions, store))
    }

    /// Engine over an already built schema
    #[must_use]
    pub fn with_schema(
        config: GridConfig,
        schema: Arc<TableSchema>,
        sessions: Arc<dyn SessionStore>,
        store: Arc<dyn RecordStore>,
    ) -> Self {
        let integrity = IntegrityService::new(sessions)
            .with_history_depth(config.history_depth)
            .with_salt_len(config.salt_len);
        Self {
            config,
            schema,
            integrity,
            store,
        }
    }

    /// Engine whose schema is derived from the store's column metadata
    ///
    /// # Errors
    /// `StoreReadFailed` if the metadata cannot be read, `Model` if the keys
    /// in `config` do not match it
    pub async fn from_store(
        config: GridConfig,
        visibility: KeyVisibility,
        sessions: Arc<dyn SessionStore>,
        store: Arc<dyn RecordStore>,
    ) -> Result<Self, ReconcileError> {
        let columns = store
            .columns()
            .await
            .map_err(ReconcileError::StoreReadFailed)?;
        let schema = TableSchema::from_store_columns(&columns, config.keys.iter().cloned(), visibility)?;
        Ok(Self::with_schema(config, Arc::new(schema), sessions, store))
    }

    /// Grid configuration
    #[inline]
    #[must_use]
    pub fn config(&self) -> &GridConfig {
        &self.config
    }

    /// Table schema
    #[inline]
    #[must_use]
    pub fn schema(&self) -> &Arc<TableSchema> {
        &self.schema
    }

    /// Token and digest service
    #[inline]
    #[must_use]
    pub fn integrity(&self) -> &IntegrityService {
        &self.integrity
    }

    /// Effective form name
    #[inline]
    #[must_use]
    pub fn form_name(&self) -> String {
        self.config.form_name()
    }

    /// Request options defaulted from config
    #[inline]
    #[must_use]
    pub fn default_options(&self) -> ReconcileOptions {
        ReconcileOptions::from_config(&self.config)
    }

    /// Row over this engine's schema from a raw store record
    pub(crate) fn record_row(&self, fields: FieldMap) -> Row {
        Row::from_fields(Arc::clone(&self.schema), bar_decode(&self.schema, fields))
    }

    /// Refresh a row's digests after a read from the store
    pub(crate) fn stamp(&self, context: &DigestContext, row: &mut Row) {
        if self.config.record_digest_enabled {
            context.stamp(row);
        } else {
            row.meta_mut().input_digest = Some(input_digest(row));
        }
    }

    /// Reconcile one submission
    ///
    /// Row-level problems produce a `Rejected` report; everything that stops
    /// the request earlier is an error.
    ///
    /// # Errors
    /// - `InvalidToken` for a wrong form name or an unknown/used token
    /// - `TamperedSubmission` when key markers or digests were altered
    /// - `MalformedSubmission` when a started row is incomplete
    /// - `StoreReadFailed` when a conflict re-read fails
    /// - `StoreWriteFailed` when a write fails; nothing is committed
    pub async fn reconcile(
        &self,
        session: &SessionId,
        submission: &Submission,
        options: &ReconcileOptions,
    ) -> Result<ReconcileReport, ReconcileError> {
        let form = self.form_name();
        if submission.form_name != form {
            tracing::warn!(
                "Submission names form {} but this grid is {}",
                submission.form_name,
                form
            );
            return Err(ReconcileError::InvalidToken);
        }
        if !self
            .integrity
            .verify_and_consume_form_token(session, &form, &submission.form_token)
        {
            return Err(ReconcileError::InvalidToken);
        }

        let (context, verified_digest) = self.verify_table(session, &form, submission)?;

        let mut rows = parser::parse(submission, &self.schema).map_err(|e| {
            tracing::warn!("Malformed submission for {}: {}", form, e);
            ReconcileError::from(e)
        })?;

        let mut issues = Vec::new();
        let conflicted = self
            .detect_conflicts(&rows, &context, options.conflict_mode, &mut issues)
            .await?;

        let strict_abort = options.conflict_mode == ConflictMode::Strict && !conflicted.is_empty();
        if !strict_abort {
            self.validate(&mut rows, &conflicted, options.validate_all, &mut issues);
        }

        let (status, writes) = if issues.is_empty() {
            let writes = self.apply(&mut rows, &context).await?;
            (BatchStatus::Committed, writes)
        } else {
            tracing::info!(
                "Rejected submission for {} with {} issues",
                form,
                issues.len()
            );
            (BatchStatus::Rejected, WriteSummary::default())
        };

        let reissue = self.reissue(session, &form, status, &rows, &context, verified_digest.as_ref());
        let messages = dedup_messages(&issues);

        Ok(ReconcileReport {
            status,
            rows,
            issues,
            messages,
            writes,
            reissue,
        })
    }

    fn verify_table(
        &self,
        session: &SessionId,
        form: &str,
        submission: &Submission,
    ) -> Result<(DigestContext, Option<Digest>), ReconcileError> {
        if !self.config.table_digest_enabled {
            let context = self
                .integrity
                .recover_context(session, form, &submission.form_token);
            return Ok((context, None));
        }

        let material = parser::scan_key_markers(submission).map_err(|e| {
            tracing::warn!("Undecodable key marker in submission for {}: {}", form, e);
            ReconcileError::TamperedSubmission(e.to_string())
        })?;
        let verified = self
            .integrity
            .verify_table_digest(session, form, &submission.form_token, &material)
            .map_err(|e| ReconcileError::TamperedSubmission(e.to_string()))?;

        if let Some(carried) = &submission.table_digest {
            if *carried != verified.digest {
                tracing::warn!("Carried table digest altered for {}", form);
                return Err(ReconcileError::TamperedSubmission(
                    "table digest altered".into(),
                ));
            }
        }
        Ok((verified.context, Some(verified.digest)))
    }

    async fn detect_conflicts(
        &self,
        rows: &RowCollection,
        context: &DigestContext,
        mode: ConflictMode,
        issues: &mut Vec<RowIssue>,
    ) -> Result<HashSet<usize>, ReconcileError> {
        let mut conflicted = HashSet::new();
        if !self.config.record_digest_enabled {
            return Ok(conflicted);
        }

        for (i, row) in rows.iter().enumerate() {
            if !needs_conflict_check(row) {
                continue;
            }
            let stored = self
                .store
                .read_by_key(&row.key_values())
                .await
                .map_err(ReconcileError::StoreReadFailed)?;

            let issue = match stored {
                None => Some(RowIssue::row(i, IssueKind::StaleDeleted, MSG_RECORD_DELETED)),
                Some(fields) => {
                    let current = context.record_digest(&self.record_row(fields));
                    (row.meta().record_digest.as_ref() != Some(&current))
                        .then(|| RowIssue::row(i, IssueKind::StaleModified, MSG_RECORD_CHANGED))
                }
            };

            if let Some(issue) = issue {
                tracing::warn!("Row {} is stale: {}", i, issue.message);
                conflicted.insert(i);
                issues.push(issue);
                if mode == ConflictMode::Strict {
                    break;
                }
            }
        }
        Ok(conflicted)
    }

    fn validate(
        &self,
        rows: &mut RowCollection,
        conflicted: &HashSet<usize>,
        validate_all: bool,
        issues: &mut Vec<RowIssue>,
    ) {
        let before = issues.len();
        for (i, row) in rows.iter_mut().enumerate() {
            if row.is_unchanged() || row.is_deleted() || row.is_tombstone() {
                continue;
            }
            if !validate_all && conflicted.contains(&i) {
                continue;
            }
            for FieldIssue { field, message } in validate_row(row) {
                issues.push(RowIssue::cell(i, field, message));
            }
        }
        if issues.len() > before {
            tracing::info!("{} fields failed validation", issues.len() - before);
        }
    }

    async fn apply(
        &self,
        rows: &mut RowCollection,
        context: &DigestContext,
    ) -> Result<WriteSummary, ReconcileError> {
        let mut writes = WriteSummary::default();

        if !rows.iter().any(needs_write) {
            for row in rows.iter_mut() {
                if matches!(row.flag(), RowFlag::Deleted { persisted: false }) && !row.is_tombstone() {
                    tombstone(row);
                }
            }
            tracing::debug!("No store writes needed");
            return Ok(writes);
        }

        let mut tx = self.store.begin().await.map_err(|source| ReconcileError::StoreWriteFailed {
            op: WriteOp::Begin,
            row: None,
            source,
        })?;

        for (i, row) in rows.iter_mut().enumerate() {
            let applied = self
                .apply_row(tx.as_mut(), i, row, context, &mut writes)
                .await;
            if let Err(err) = applied {
                tracing::error!("Row {}: {}; rolling back", i, err);
                if let Err(e) = tx.rollback().await {
                    tracing::error!("Rollback failed: {}", e);
                }
                return Err(err);
            }
        }

        tx.commit().await.map_err(|source| {
            tracing::error!("Commit failed: {}", source);
            ReconcileError::StoreWriteFailed {
                op: WriteOp::Commit,
                row: None,
                source,
            }
        })?;

        tracing::info!(
            "Committed {} inserts, {} updates, {} deletes",
            writes.inserted,
            writes.updated,
            writes.deleted
        );
        Ok(writes)
    }

    async fn apply_row(
        &self,
        tx: &mut dyn StoreTransaction,
        i: usize,
        row: &mut Row,
        context: &DigestContext,
        writes: &mut WriteSummary,
    ) -> Result<(), ReconcileError> {
        if row.is_tombstone() {
            return Ok(());
        }

        match row.flag() {
            RowFlag::Unchanged => {}
            RowFlag::Deleted { persisted } => {
                if persisted {
                    tx.delete_by_key(&row.key_values())
                        .await
                        .map_err(write_failed(WriteOp::Delete, i))?;
                    writes.deleted += 1;
                }
                tombstone(row);
            }
            RowFlag::New => {
                let key = tx
                    .insert(row.writable_fields())
                    .await
                    .map_err(write_failed(WriteOp::Insert, i))?;
                for (field, value) in key.iter() {
                    row.set(field.clone(), value.clone());
                }
                self.refresh(tx, i, row, &key, WriteOp::Insert, context).await?;
                writes.inserted += 1;
            }
            RowFlag::Unflagged => {
                let fields = row.writable_fields();
                if fields.is_empty() {
                    return Ok(());
                }
                tx.update_by_key(&row.key_values(), fields)
                    .await
                    .map_err(write_failed(WriteOp::Update, i))?;
                row.meta_mut().stored_key = None;
                let live = row.live_key();
                self.refresh(tx, i, row, &live, WriteOp::Update, context).await?;
                writes.updated += 1;
            }
        }
        Ok(())
    }

    async fn refresh(
        &self,
        tx: &mut dyn StoreTransaction,
        i: usize,
        row: &mut Row,
        key: &KeyValues,
        op: WriteOp,
        context: &DigestContext,
    ) -> Result<(), ReconcileError> {
        let fields = tx
            .read_by_key(key)
            .await
            .map_err(write_failed(op, i))?
            .ok_or_else(|| write_failed(op, i)(StoreError::NotFound))?;
        row.replace_values(bar_decode(&self.schema, fields));
        row.set_flag(RowFlag::Unflagged);
        self.stamp(context, row);
        Ok(())
    }

    fn reissue(
        &self,
        session: &SessionId,
        form: &str,
        status: BatchStatus,
        rows: &RowCollection,
        context: &DigestContext,
        verified: Option<&Digest>,
    ) -> Reissue {
        let token = self.integrity.issue_form_token(session, form);
        let digest = match (status, verified) {
            (BatchStatus::Rejected, Some(digest)) => {
                self.integrity
                    .store_table_digest(session, form, &token, digest, context.salt());
                digest.clone()
            }
            _ => self.integrity.issue_table_digest(
                session,
                form,
                &token,
                &TableMaterial::from_rows(rows),
                context,
            ),
        };
        let table_digest = self.config.table_digest_enabled.then_some(digest);
        tracing::debug!("Reissued token and digest for {}/{}", session, form);
        Reissue {
            form_name: form.to_string(),
            form_token: token,
            table_digest,
        }
    }
}

fn write_failed(op: WriteOp, row: usize) -> impl Fn(StoreError) -> ReconcileError {
    move |source| ReconcileError::StoreWriteFailed {
        op,
        row: Some(row),
        source,
    }
}

fn tombstone(row: &mut Row) {
    let meta = row.meta_mut();
    meta.record_digest = Some(Digest::tombstone());
    meta.input_digest = None;
}

fn needs_conflict_check(row: &Row) -> bool {
    !row.is_tombstone()
        && matches!(
            row.flag(),
            RowFlag::Unflagged | RowFlag::Deleted { persisted: true }
        )
}

fn needs_write(row: &Row) -> bool {
    if row.is_tombstone() {
        return false;
    }
    match row.flag() {
        RowFlag::Deleted { persisted } => persisted,
        RowFlag::New => true,
        RowFlag::Unchanged => false,
        RowFlag::Unflagged => !row.writable_fields().is_empty(),
    }
}
