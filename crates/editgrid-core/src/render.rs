//! Render path
//!
//! Reads rows, stamps their digests, pads with blank new rows and issues the
//! token and table digest the next submission will be checked against. The
//! resulting [`RenderedGrid`] is what the presentation layer draws.

use crate::cell::{CellId, CellValue, Submission};
use crate::engine::ReconciliationEngine;
use crate::error::ReconcileError;
use crate::report::ReconcileReport;
use editgrid_integrity::{
    encode_key_marker, input_digest, row_key_text, FormToken, SessionId, TableMaterial,
};
use editgrid_model::{
    ColumnType, Digest, KeyValues, ModelError, Row, RowCollection, Value,
};
use serde::Serialize;
use std::sync::Arc;

/// Which records to render
#[derive(Debug, Clone, PartialEq)]
pub enum RowSelection {
    /// Store order, optionally capped
    All {
        /// Maximum number of records
        limit: Option<usize>,
    },
    /// Explicit keys; unknown keys are skipped
    Keys(Vec<KeyValues>),
    /// Bare values of a single-column key
    ScalarKeys(Vec<Value>),
}

impl RowSelection {
    /// Every record
    #[inline]
    #[must_use]
    pub fn all() -> Self {
        Self::All { limit: None }
    }

    /// At most `limit` records
    #[inline]
    #[must_use]
    pub fn limit(limit: usize) -> Self {
        Self::All { limit: Some(limit) }
    }

    /// Explicit keys, de-duplicated in first-seen order
    #[must_use]
    pub fn keys<I>(keys: I) -> Self
    where
        I: IntoIterator<Item = KeyValues>,
    {
        let mut unique: Vec<KeyValues> = Vec::new();
        for key in keys {
            if !unique.iter().any(|k| k.matches(&key)) {
                unique.push(key);
            }
        }
        Self::Keys(unique)
    }

    /// Scalar key values, de-duplicated in first-seen order
    #[must_use]
    pub fn scalar_keys<I, V>(values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let mut unique: Vec<Value> = Vec::new();
        for value in values.into_iter().map(Into::into) {
            if !unique.iter().any(|v| v.to_string() == value.to_string()) {
                unique.push(value);
            }
        }
        Self::ScalarKeys(unique)
    }
}

/// Column header for the presentation layer
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnHeader {
    /// Field name
    pub field: String,
    /// Display label
    pub label: String,
    /// Declared type
    pub column_type: ColumnType,
    /// Editable
    pub writable: bool,
    /// `(value, label)` choices for enumerated columns
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<(String, String)>>,
    /// Multi-select column
    pub multiple: bool,
}

/// One cell of a rendered row
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderedCell {
    /// Field name
    pub field: String,
    /// Declared type
    pub column_type: ColumnType,
    /// Current value
    pub value: Value,
    /// Shown to the user
    pub readable: bool,
    /// Editable by the user
    pub writable: bool,
}

/// One rendered row
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderedRow {
    /// Position in the grid
    pub index: usize,
    /// Base64 compressed key; empty for new rows
    pub key_marker: String,
    /// Record digest to carry back
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record_digest: Option<Digest>,
    /// Input digest to carry back
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_digest: Option<Digest>,
    /// Blank template row
    pub is_new: bool,
    /// Cells of readable or writable columns, in declared order
    pub cells: Vec<RenderedCell>,
}

impl RenderedRow {
    /// Value of `field`
    #[must_use]
    pub fn value(&self, field: &str) -> Option<&Value> {
        self.cells.iter().find(|c| c.field == field).map(|c| &c.value)
    }
}

/// Read-only view handed to the presentation layer
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderedGrid {
    /// Form name
    pub form_name: String,
    /// Token to submit with
    pub form_token: FormToken,
    /// Table digest as issued
    #[serde(skip_serializing_if = "Option::is_none")]
    pub table_digest: Option<Digest>,
    /// Delete checkboxes are offered
    pub deletable: bool,
    /// Readable columns
    pub columns: Vec<ColumnHeader>,
    /// Rows in order
    pub rows: Vec<RenderedRow>,
}

impl RenderedGrid {
    /// Build the view for `rows`
    #[must_use]
    pub fn build(
        form_name: impl Into<String>,
        form_token: FormToken,
        table_digest: Option<Digest>,
        deletable: bool,
        rows: &RowCollection,
    ) -> Self {
        let schema = rows.schema();
        let columns = schema
            .readable()
            .map(|c| ColumnHeader {
                field: c.field.clone(),
                label: c.label().to_string(),
                column_type: c.column_type,
                writable: c.writable,
                options: c.inset.as_ref().map(|set| {
                    set.options()
                        .into_iter()
                        .map(|(v, l)| (v.to_string(), l.to_string()))
                        .collect()
                }),
                multiple: c.is_multiple(),
            })
            .collect();

        let rows = rows
            .iter()
            .enumerate()
            .map(|(index, row)| RenderedRow {
                index,
                key_marker: encode_key_marker(&row_key_text(row)),
                record_digest: row.meta().record_digest.clone(),
                input_digest: row.meta().input_digest.clone(),
                is_new: row.is_new(),
                cells: row
                    .fields()
                    .filter(|(c, _)| c.readable || c.writable)
                    .map(|(c, v)| RenderedCell {
                        field: c.field.clone(),
                        column_type: c.column_type,
                        value: v.unwrap_or_default(),
                        readable: c.readable,
                        writable: c.writable,
                    })
                    .collect(),
            })
            .collect();

        Self {
            form_name: form_name.into(),
            form_token,
            table_digest,
            deletable,
            columns,
            rows,
        }
    }

    /// The flat payload an untouched client would send back
    #[must_use]
    pub fn echo_submission(&self) -> Submission {
        let mut submission = Submission::new(self.form_name.clone(), self.form_token.clone());
        submission.table_digest = self.table_digest.clone();

        for row in &self.rows {
            let n = row.index;
            submission.set_cell(&CellId::Key(n), row.key_marker.as_str());
            if let Some(d) = &row.record_digest {
                submission.set_cell(&CellId::RecordDigest(n), d.as_str());
            }
            if let Some(d) = &row.input_digest {
                submission.set_cell(&CellId::InputDigest(n), d.as_str());
            }
            if self.deletable {
                submission.set_cell(&CellId::Delete(n), false);
            }
            for cell in row.cells.iter().filter(|c| c.writable) {
                let value = match cell.column_type {
                    ColumnType::Boolean => CellValue::Checked(cell.value.as_bool().unwrap_or(false)),
                    _ => CellValue::Text(cell.value.to_string()),
                };
                submission.set_cell(&CellId::field(n, cell.field.as_str()), value);
            }
        }
        submission
    }
}

impl ReconciliationEngine {
    /// Read and render a selection of records
    ///
    /// # Errors
    /// `StoreReadFailed` when the store cannot be read, `Model` when scalar
    /// keys are used with a composite key
    pub async fn render(
        &self,
        session: &SessionId,
        selection: &RowSelection,
    ) -> Result<RenderedGrid, ReconcileError> {
        let records = match selection {
            RowSelection::All { limit } => self
                .store
                .read_all(*limit)
                .await
                .map_err(ReconcileError::StoreReadFailed)?,
            RowSelection::Keys(keys) => self.read_keys(keys).await?,
            RowSelection::ScalarKeys(values) => {
                let [key_field] = self.schema.key_names() else {
                    return Err(ModelError::TypeMismatch(
                        "scalar keys need a single key column".into(),
                    )
                    .into());
                };
                let keys: Vec<KeyValues> = values
                    .iter()
                    .map(|v| KeyValues::new().with(key_field.clone(), v.clone()))
                    .collect();
                self.read_keys(&keys).await?
            }
        };

        let mut rows = RowCollection::new(Arc::clone(&self.schema));
        for record in records {
            rows.push(self.record_row(record))?;
        }
        tracing::debug!("Read {} rows for {}", rows.len(), self.form_name());
        self.render_rows(session, rows)
    }

    async fn read_keys(
        &self,
        keys: &[KeyValues],
    ) -> Result<Vec<editgrid_model::FieldMap>, ReconcileError> {
        let mut seen: Vec<&KeyValues> = Vec::new();
        let mut records = Vec::new();
        for key in keys {
            if seen.iter().any(|k| k.matches(key)) {
                continue;
            }
            seen.push(key);
            match self
                .store
                .read_by_key(key)
                .await
                .map_err(ReconcileError::StoreReadFailed)?
            {
                Some(record) => records.push(record),
                None => tracing::debug!("Skipping missing key {:?}", key),
            }
        }
        Ok(records)
    }

    /// Render caller-supplied rows
    ///
    /// Persisted rows get fresh record and input digests; the grid is padded to
    /// `max_rows` with blank new rows.
    ///
    /// # Errors
    /// `Model` when a padding row cannot be appended
    pub fn render_rows(
        &self,
        session: &SessionId,
        mut rows: RowCollection,
    ) -> Result<RenderedGrid, ReconcileError> {
        let context = self.integrity.fresh_context();
        for row in rows.iter_mut() {
            if row.is_new() {
                row.meta_mut().input_digest = Some(input_digest(row));
            } else {
                self.stamp(&context, row);
            }
        }

        while rows.len() < self.config.max_rows {
            let mut template = Row::template(Arc::clone(rows.schema()));
            template.meta_mut().input_digest = Some(input_digest(&template));
            rows.push(template)?;
        }

        let form = self.form_name();
        let token = self.integrity.issue_form_token(session, &form);
        let digest = self.integrity.issue_table_digest(
            session,
            &form,
            &token,
            &TableMaterial::from_rows(&rows),
            &context,
        );
        let table_digest = self.config.table_digest_enabled.then_some(digest);

        tracing::info!("Rendered {} rows for {}", rows.len(), form);
        Ok(RenderedGrid::build(
            form,
            token,
            table_digest,
            self.config.deletable,
            &rows,
        ))
    }

    /// View continuing from a report, using its reissued token and digest
    #[must_use]
    pub fn continuation(&self, report: &ReconcileReport) -> RenderedGrid {
        RenderedGrid::build(
            report.reissue.form_name.clone(),
            report.reissue.form_token.clone(),
            report.reissue.table_digest.clone(),
            self.config.deletable,
            &report.rows,
        )
    }
}
