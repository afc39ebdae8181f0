//! Rows
//!
//! A [`Row`] holds raw values keyed by field name and interprets them through
//! its [`TableSchema`] on read. Transient edit state (operation flag, stored
//! key snapshot, digests) lives in [`RowMeta`], kept apart from the values so
//! it never leaks into store writes.

use crate::digest::Digest;
use crate::error::ModelError;
use crate::schema::{ColumnSchema, ColumnType, TableSchema};
use crate::value::{FieldMap, KeyValues, Value};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// What a submitted row asks the store to do
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RowFlag {
    /// Existing row, possibly edited
    #[default]
    Unflagged,
    /// Not yet persisted
    New,
    /// Marked for deletion; `persisted` is false for rows that never reached the store
    Deleted { persisted: bool },
    /// Editable content round-tripped untouched
    Unchanged,
}

/// Transient per-row state for one request cycle
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RowMeta {
    /// Operation flag
    pub flag: RowFlag,
    /// Key values as rendered, used to locate the record when keys are editable
    pub stored_key: Option<KeyValues>,
    /// Content digest of the record as last read from the store
    pub record_digest: Option<Digest>,
    /// Digest of the editable fields as rendered
    pub input_digest: Option<Digest>,
}

/// One logical record plus edit metadata
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    schema: Arc<TableSchema>,
    values: FieldMap,
    meta: RowMeta,
}

impl Row {
    /// Empty row over `schema`
    #[inline]
    #[must_use]
    pub fn new(schema: Arc<TableSchema>) -> Self {
        Self::from_fields(schema, FieldMap::new())
    }

    /// Row over `schema` holding `values`
    #[inline]
    #[must_use]
    pub fn from_fields(schema: Arc<TableSchema>, values: FieldMap) -> Self {
        Self {
            schema,
            values,
            meta: RowMeta::default(),
        }
    }

    /// Blank new row carrying every column's default value
    #[must_use]
    pub fn template(schema: Arc<TableSchema>) -> Self {
        let values = schema
            .columns()
            .map(|c| (c.field.clone(), c.default_value()))
            .collect();
        let mut row = Self::from_fields(schema, values);
        row.meta.flag = RowFlag::New;
        row
    }

    /// Schema this row is read through
    #[inline]
    #[must_use]
    pub fn schema(&self) -> &Arc<TableSchema> {
        &self.schema
    }

    /// Value of `field`, coerced through its column type
    ///
    /// Returns `None` for fields neither declared nor present. Fields present
    /// on the row but unknown to the schema are returned raw.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<Value> {
        match self.schema.column(field) {
            Some(column) => self.values.get(field).map(|v| coerce(column, v)),
            None => self.values.get(field).cloned(),
        }
    }

    /// Raw stored value of `field`
    #[inline]
    #[must_use]
    pub fn raw(&self, field: &str) -> Option<&Value> {
        self.values.get(field)
    }

    /// Set a raw value; no coercion, extra fields allowed
    #[inline]
    pub fn set(&mut self, field: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(field.into(), value.into());
    }

    /// Remove a field
    ///
    /// # Errors
    /// `KeyNotFound` if the row does not carry `field`
    pub fn remove(&mut self, field: &str) -> Result<Value, ModelError> {
        self.values
            .shift_remove(field)
            .ok_or_else(|| ModelError::KeyNotFound(field.to_string()))
    }

    /// Whether the row carries `field`
    #[inline]
    #[must_use]
    pub fn has_field(&self, field: &str) -> bool {
        self.values.contains_key(field)
    }

    /// Every schema column with its coerced value
    pub fn fields(&self) -> impl Iterator<Item = (&ColumnSchema, Option<Value>)> + '_ {
        self.schema.columns().map(move |c| (c, self.get(&c.field)))
    }

    /// Readable columns with their coerced values
    pub fn readable(&self) -> impl Iterator<Item = (&ColumnSchema, Option<Value>)> + '_ {
        self.schema.readable().map(move |c| (c, self.get(&c.field)))
    }

    /// Writable columns with their coerced values
    pub fn writable(&self) -> impl Iterator<Item = (&ColumnSchema, Option<Value>)> + '_ {
        self.schema.writable().map(move |c| (c, self.get(&c.field)))
    }

    /// Present writable values, as sent to the store on insert/update
    #[must_use]
    pub fn writable_fields(&self) -> FieldMap {
        self.writable()
            .filter_map(|(c, v)| v.map(|v| (c.field.clone(), v)))
            .collect()
    }

    /// Key that locates this row's record
    ///
    /// Prefers the stored snapshot, since key columns may have been edited.
    #[must_use]
    pub fn key_values(&self) -> KeyValues {
        match &self.meta.stored_key {
            Some(stored) => stored.clone(),
            None => self.live_key(),
        }
    }

    /// Key column values as currently held by the row
    #[must_use]
    pub fn live_key(&self) -> KeyValues {
        self.schema
            .keys()
            .map(|c| (c.field.clone(), self.get(&c.field).unwrap_or_default()))
            .collect()
    }

    /// All raw values
    #[inline]
    #[must_use]
    pub fn values(&self) -> &FieldMap {
        &self.values
    }

    /// Replace all values, keeping the edit metadata
    #[inline]
    pub fn replace_values(&mut self, values: FieldMap) {
        self.values = values;
    }

    /// Consume the row, keeping only its values
    #[inline]
    #[must_use]
    pub fn into_values(self) -> FieldMap {
        self.values
    }

    /// Edit metadata
    #[inline]
    #[must_use]
    pub fn meta(&self) -> &RowMeta {
        &self.meta
    }

    /// Mutable edit metadata
    #[inline]
    pub fn meta_mut(&mut self) -> &mut RowMeta {
        &mut self.meta
    }

    /// Operation flag
    #[inline]
    #[must_use]
    pub fn flag(&self) -> RowFlag {
        self.meta.flag
    }

    /// Replace the operation flag
    #[inline]
    pub fn set_flag(&mut self, flag: RowFlag) {
        self.meta.flag = flag;
    }

    /// Row not yet persisted
    #[inline]
    #[must_use]
    pub fn is_new(&self) -> bool {
        matches!(self.meta.flag, RowFlag::New)
    }

    /// Row marked for deletion
    #[inline]
    #[must_use]
    pub fn is_deleted(&self) -> bool {
        matches!(self.meta.flag, RowFlag::Deleted { .. })
    }

    /// Row left untouched by the client
    #[inline]
    #[must_use]
    pub fn is_unchanged(&self) -> bool {
        matches!(self.meta.flag, RowFlag::Unchanged)
    }

    /// Row already deleted by an earlier submission
    #[inline]
    #[must_use]
    pub fn is_tombstone(&self) -> bool {
        self.meta
            .record_digest
            .as_ref()
            .is_some_and(Digest::is_tombstone)
    }
}

/// Interpret a raw value through a column's declared type
///
/// Empty text is returned verbatim. Integer and number parsing falls back to
/// the raw value when it fails. Short time values are padded to `HH:MM:SS`.
#[must_use]
pub fn coerce(column: &ColumnSchema, value: &Value) -> Value {
    if let Value::Text(s) = value {
        if s.is_empty() {
            return value.clone();
        }
    }

    match (column.column_type, value) {
        (ColumnType::Integer, Value::Text(s)) => s
            .trim()
            .parse::<i64>()
            .map_or_else(|_| value.clone(), Value::Integer),
        (ColumnType::Number, Value::Text(s)) => s
            .trim()
            .parse::<f64>()
            .map_or_else(|_| value.clone(), Value::Number),
        #[allow(clippy::cast_precision_loss)]
        (ColumnType::Number, Value::Integer(i)) => Value::Number(*i as f64),
        (ColumnType::Time, Value::Text(s)) => Value::Text(pad_time(s)),
        _ => value.clone(),
    }
}

fn pad_time(s: &str) -> String {
    let mut parts: Vec<&str> = s.split(':').collect();
    while parts.len() < 3 {
        parts.push("00");
    }
    parts.join(":")
}
