//! Submission parser
//!
//! Rebuilds typed rows from the flat cell map and classifies each row's
//! operation. Rows are read in index order until the first absent key marker.

use crate::cell::{CellId, CellValue, Submission};
use crate::error::ParseError;
use editgrid_integrity::{
    decode_key_marker, input_digest, split_compressed_key, IntegrityError, TableMaterial,
};
use editgrid_model::{
    ColumnType, Digest, KeyValues, Row, RowCollection, RowFlag, TableSchema, Value, LIST_SEPARATOR,
};
use std::sync::Arc;

/// Collect the decoded key markers and carried record digests, in row order
///
/// This is the material the table digest is recomputed from, gathered before
/// any row is parsed.
///
/// # Errors
/// `InvalidKeyMarker` for a marker that does not decode
pub fn scan_key_markers(submission: &Submission) -> Result<TableMaterial, IntegrityError> {
    let mut material = TableMaterial::default();
    for n in 0.. {
        let Some(marker) = submission.cell(&CellId::Key(n)) else {
            break;
        };
        let key = decode_key_marker(marker.text())?;
        let record_digest = submission
            .cell(&CellId::RecordDigest(n))
            .map(|c| c.text().to_string())
            .unwrap_or_default();
        material.push(key, record_digest);
    }
    Ok(material)
}

fn carried_digest(submission: &Submission, id: &CellId) -> Option<Digest> {
    submission
        .cell(id)
        .map(CellValue::text)
        .filter(|s| !s.is_empty())
        .map(Digest::from)
}

fn cell_value(column_type: ColumnType, multiple: bool, cell: &CellValue) -> Value {
    if column_type == ColumnType::Boolean {
        return Value::Bool(cell.is_checked());
    }
    let text = cell.text();
    if multiple && text.contains(LIST_SEPARATOR) {
        Value::List(text.split(LIST_SEPARATOR).map(str::to_string).collect())
    } else {
        Value::text(text)
    }
}

/// Parse a submission into classified rows
///
/// # Errors
/// - `InvalidKeyMarker` / `KeyArity` for undecodable or misshapen keys
/// - `MissingCell` when a started row lacks a writable field cell
pub fn parse(submission: &Submission, schema: &Arc<TableSchema>) -> Result<RowCollection, ParseError> {
    let mut rows = RowCollection::new(Arc::clone(schema));
    let key_columns: Vec<&str> = schema.keys().map(|c| c.name()).collect();

    for n in 0.. {
        let Some(marker) = submission.cell(&CellId::Key(n)) else {
            break;
        };
        let compressed = decode_key_marker(marker.text()).map_err(|e| ParseError::InvalidKeyMarker {
            row: n,
            reason: e.to_string(),
        })?;

        let mut row = Row::new(Arc::clone(schema));
        {
            let meta = row.meta_mut();
            meta.record_digest = carried_digest(submission, &CellId::RecordDigest(n));
            meta.input_digest = carried_digest(submission, &CellId::InputDigest(n));
        }

        if compressed.is_empty() {
            row.set_flag(RowFlag::New);
        } else {
            let parts = split_compressed_key(&compressed);
            if parts.len() != key_columns.len() {
                return Err(ParseError::KeyArity {
                    row: n,
                    expected: key_columns.len(),
                    found: parts.len(),
                });
            }
            let key: KeyValues = key_columns
                .iter()
                .zip(parts)
                .map(|(field, part)| ((*field).to_string(), Value::text(part)))
                .collect();
            for (field, value) in key.iter() {
                row.set(field.clone(), value.clone());
            }
            row.meta_mut().stored_key = Some(key);
        }

        let deleted = !row.is_tombstone()
            && submission
                .cell(&CellId::Delete(n))
                .is_some_and(CellValue::is_checked);
        if deleted {
            let persisted = !row.is_new();
            row.set_flag(RowFlag::Deleted { persisted });
        }

        for column in schema.writable() {
            let id = CellId::field(n, column.name());
            let cell = submission.cell(&id).ok_or_else(|| ParseError::MissingCell {
                row: n,
                cell: id.to_string(),
            })?;
            row.set(column.name(), cell_value(column.column_type, column.is_multiple(), cell));
        }

        if !row.is_deleted() {
            let untouched = row
                .meta()
                .input_digest
                .as_ref()
                .map_or(true, |carried| *carried == input_digest(&row));
            if untouched {
                row.set_flag(RowFlag::Unchanged);
            }
        }

        rows.push(row)?;
    }

    tracing::debug!("Parsed {} rows from submission {}", rows.len(), submission.form_name);
    Ok(rows)
}
