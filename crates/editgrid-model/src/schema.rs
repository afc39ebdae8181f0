//! Column schema
//!
//! [`ColumnSchema`] describes one column; [`TableSchema`] is the ordered set of
//! columns plus the key column list for one grid. Both are immutable once built
//! and shared between rows through an `Arc`.

use crate::error::ModelError;
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt::{self, Display, Formatter};

/// Declared column type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    /// Free text
    #[default]
    String,
    /// Whole number
    Integer,
    /// Floating point number
    Number,
    /// Checkbox
    Boolean,
    /// `YYYY-MM-DD`
    Date,
    /// `HH:MM:SS`
    Time,
    /// `YYYY-MM-DD HH:MM:SS`
    Datetime,
}

impl ColumnType {
    /// Map a store-level column type to a grid column type
    ///
    /// `decimal(p,s)` becomes an integer column when the scale is zero.
    #[must_use]
    pub fn from_store_type(store_type: &str) -> Self {
        let t = store_type.trim().to_ascii_lowercase();
        match t.as_str() {
            "integer" | "bigint" | "id" => Self::Integer,
            "double" | "float" => Self::Number,
            "boolean" => Self::Boolean,
            "date" => Self::Date,
            "time" => Self::Time,
            "datetime" => Self::Datetime,
            _ if t.starts_with("decimal") => {
                let scale = t
                    .trim_start_matches("decimal")
                    .trim_matches(|c: char| c == '(' || c == ')' || c == ' ')
                    .split(',')
                    .nth(1)
                    .and_then(|s| s.trim().parse::<u32>().ok())
                    .unwrap_or(0);
                if scale == 0 {
                    Self::Integer
                } else {
                    Self::Number
                }
            }
            _ => Self::String,
        }
    }

    /// Whether values of this type are numeric
    #[inline]
    #[must_use]
    pub const fn is_numeric(self) -> bool {
        matches!(self, Self::Integer | Self::Number)
    }
}

impl Display for ColumnType {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Date => "date",
            Self::Time => "time",
            Self::Datetime => "datetime",
        };
        f.write_str(s)
    }
}

/// Inclusive numeric range, declared as `[min, max]`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NumericRange(pub f64, pub f64);

impl NumericRange {
    /// Lower bound
    #[inline]
    #[must_use]
    pub const fn min(&self) -> f64 {
        self.0
    }

    /// Upper bound
    #[inline]
    #[must_use]
    pub const fn max(&self) -> f64 {
        self.1
    }

    /// Check membership
    #[inline]
    #[must_use]
    pub fn contains(&self, v: f64) -> bool {
        v >= self.0 && v <= self.1
    }
}

/// Inclusive length range in characters, declared as `[min, max]`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LengthRange(pub usize, pub usize);

impl LengthRange {
    /// Minimum length
    #[inline]
    #[must_use]
    pub const fn min(&self) -> usize {
        self.0
    }

    /// Maximum length
    #[inline]
    #[must_use]
    pub const fn max(&self) -> usize {
        self.1
    }
}

/// Enumerated choice constraint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChoiceSet {
    /// Multi-select column; values travel comma-joined
    #[serde(default)]
    pub multiple: bool,
    /// Value used when nothing is selected
    #[serde(default, alias = "zero", skip_serializing_if = "Option::is_none")]
    pub empty: Option<String>,
    /// Allowed values
    #[serde(alias = "theset")]
    pub allowed: Vec<String>,
    /// Display labels, parallel to `allowed`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labels: Option<Vec<String>>,
}

impl ChoiceSet {
    /// Single-select set of allowed values
    #[must_use]
    pub fn single<I, S>(allowed: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            multiple: false,
            empty: None,
            allowed: allowed.into_iter().map(Into::into).collect(),
            labels: None,
        }
    }

    /// Multi-select set of allowed values
    #[must_use]
    pub fn multiple<I, S>(allowed: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            multiple: true,
            ..Self::single(allowed)
        }
    }

    /// With the empty-selection sentinel
    #[must_use]
    pub fn with_empty(mut self, empty: impl Into<String>) -> Self {
        self.empty = Some(empty.into());
        self
    }

    /// Whether `item` is an accepted choice
    #[must_use]
    pub fn accepts(&self, item: &str) -> bool {
        self.allowed.iter().any(|a| a == item) || self.empty.as_deref() == Some(item)
    }

    /// `(value, label)` pairs for the presentation layer
    #[must_use]
    pub fn options(&self) -> Vec<(&str, &str)> {
        match &self.labels {
            Some(labels) => self
                .allowed
                .iter()
                .zip(labels.iter().map(String::as_str).chain(std::iter::repeat("")))
                .map(|(v, l)| (v.as_str(), if l.is_empty() { v.as_str() } else { l }))
                .collect(),
            None => self.allowed.iter().map(|v| (v.as_str(), v.as_str())).collect(),
        }
    }
}

fn default_true() -> bool {
    true
}

/// Description of one grid column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnSchema {
    /// Field name, unique within a [`TableSchema`]
    pub field: String,
    /// Declared type
    #[serde(rename = "type", default)]
    pub column_type: ColumnType,
    /// Header label; falls back to the field name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Value for freshly created rows
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    /// Shown to the user
    #[serde(default = "default_true")]
    pub readable: bool,
    /// Editable by the user
    #[serde(default = "default_true")]
    pub writable: bool,
    /// Numeric bounds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range: Option<NumericRange>,
    /// Length bounds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub length: Option<LengthRange>,
    /// Enumerated choices
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inset: Option<ChoiceSet>,
    #[serde(skip)]
    key: bool,
}

impl ColumnSchema {
    /// Readable, writable column of the given type
    #[must_use]
    pub fn new(field: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            field: field.into(),
            column_type,
            label: None,
            default: None,
            readable: true,
            writable: true,
            range: None,
            length: None,
            inset: None,
            key: false,
        }
    }

    /// With a header label
    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// With a default value for new rows
    #[must_use]
    pub fn with_default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    /// With numeric bounds
    #[must_use]
    pub fn with_range(mut self, min: f64, max: f64) -> Self {
        self.range = Some(NumericRange(min, max));
        self
    }

    /// With length bounds
    #[must_use]
    pub fn with_length(mut self, min: usize, max: usize) -> Self {
        self.length = Some(LengthRange(min, max));
        self
    }

    /// With enumerated choices
    #[must_use]
    pub fn with_choices(mut self, choices: ChoiceSet) -> Self {
        self.inset = Some(choices);
        self
    }

    /// Shown but not editable
    #[must_use]
    pub fn read_only(mut self) -> Self {
        self.writable = false;
        self
    }

    /// Neither shown nor editable
    #[must_use]
    pub fn hidden(mut self) -> Self {
        self.readable = false;
        self.writable = false;
        self
    }

    /// Field name
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.field
    }

    /// Header label, defaulting to the field name
    #[inline]
    #[must_use]
    pub fn label(&self) -> &str {
        self.label.as_deref().unwrap_or(&self.field)
    }

    /// Default value: declared default, else `false` for booleans and `""` otherwise
    #[must_use]
    pub fn default_value(&self) -> Value {
        match (&self.default, self.column_type) {
            (Some(v), _) => v.clone(),
            (None, ColumnType::Boolean) => Value::Bool(false),
            (None, _) => Value::text(""),
        }
    }

    /// Member of the key column list
    #[inline]
    #[must_use]
    pub fn is_key(&self) -> bool {
        self.key
    }

    /// Multi-select enumerated column
    #[inline]
    #[must_use]
    pub fn is_multiple(&self) -> bool {
        self.inset.as_ref().is_some_and(|c| c.multiple)
    }

    /// Probe a constraint by dotted path, e.g. `"inset.multiple"`
    #[must_use]
    pub fn has_constraint(&self, path: &str) -> bool {
        match path {
            "field" | "type" | "readable" | "writable" => true,
            "label" => self.label.is_some(),
            "default" => self.default.is_some(),
            "range" => self.range.is_some(),
            "length" => self.length.is_some(),
            "inset" | "inset.multiple" | "inset.theset" | "inset.allowed" => self.inset.is_some(),
            "inset.zero" | "inset.empty" => self.inset.as_ref().is_some_and(|c| c.empty.is_some()),
            "inset.labels" => self.inset.as_ref().is_some_and(|c| c.labels.is_some()),
            _ => false,
        }
    }
}

/// Ordered column set with key membership
#[derive(Debug, Clone, PartialEq)]
pub struct TableSchema {
    columns: Vec<ColumnSchema>,
    index: HashMap<String, usize>,
    key_fields: Vec<String>,
}

impl TableSchema {
    /// Build a schema from column descriptors and key column names
    ///
    /// # Errors
    /// - `DuplicateColumn` if two descriptors share a field name
    /// - `UnknownKeyColumn` if a key names a missing column
    pub fn new<K, S>(mut columns: Vec<ColumnSchema>, key_fields: K) -> Result<Self, ModelError>
    where
        K: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let key_fields: Vec<String> = key_fields.into_iter().map(Into::into).collect();
        let mut index = HashMap::with_capacity(columns.len());

        for (i, column) in columns.iter_mut().enumerate() {
            if index.insert(column.field.clone(), i).is_some() {
                return Err(ModelError::DuplicateColumn(column.field.clone()));
            }
            column.key = key_fields.iter().any(|k| *k == column.field);
        }

        if let Some(missing) = key_fields.iter().find(|k| !index.contains_key(k.as_str())) {
            return Err(ModelError::UnknownKeyColumn(missing.clone()));
        }

        Ok(Self {
            columns,
            index,
            key_fields,
        })
    }

    /// Derive a schema from store column metadata
    ///
    /// Key columns are shown only when `visibility.show_keys` and editable only
    /// when `visibility.edit_keys`.
    ///
    /// # Errors
    /// Same as [`TableSchema::new`].
    pub fn from_store_columns<K, S>(
        store_columns: &[StoreColumn],
        key_fields: K,
        visibility: KeyVisibility,
    ) -> Result<Self, ModelError>
    where
        K: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let key_fields: Vec<String> = key_fields.into_iter().map(Into::into).collect();
        let columns = store_columns
            .iter()
            .filter(|c| c.readable)
            .map(|c| {
                let mut column = ColumnSchema::new(&c.name, ColumnType::from_store_type(&c.store_type));
                column.range = c.range;
                column.length = c.length;
                column.inset = c.inset.clone();
                if key_fields.iter().any(|k| *k == c.name) {
                    column.readable = visibility.show_keys;
                    column.writable = visibility.edit_keys && c.writable;
                } else {
                    column.writable = c.writable;
                }
                column
            })
            .collect();
        Self::new(columns, key_fields)
    }

    /// Column by field name
    #[inline]
    #[must_use]
    pub fn column(&self, field: &str) -> Option<&ColumnSchema> {
        self.index.get(field).map(|&i| &self.columns[i])
    }

    /// Whether the schema declares `field`
    #[inline]
    #[must_use]
    pub fn contains(&self, field: &str) -> bool {
        self.index.contains_key(field)
    }

    /// All columns in declared order
    pub fn columns(&self) -> impl Iterator<Item = &ColumnSchema> {
        self.columns.iter()
    }

    /// Readable columns in declared order
    pub fn readable(&self) -> impl Iterator<Item = &ColumnSchema> {
        self.columns.iter().filter(|c| c.readable)
    }

    /// Writable columns in declared order
    pub fn writable(&self) -> impl Iterator<Item = &ColumnSchema> {
        self.columns.iter().filter(|c| c.writable)
    }

    /// Key columns in key-list order
    pub fn keys(&self) -> impl Iterator<Item = &ColumnSchema> {
        self.key_fields.iter().filter_map(|k| self.column(k))
    }

    /// Key column names
    #[inline]
    #[must_use]
    pub fn key_names(&self) -> &[String] {
        &self.key_fields
    }

    /// Number of columns
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// Schema without columns
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

/// Column metadata as reported by a record store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreColumn {
    /// Column name
    pub name: String,
    /// Store type, e.g. `bigint` or `decimal(10,2)`
    pub store_type: String,
    /// Visible in the grid
    #[serde(default = "default_true")]
    pub readable: bool,
    /// Editable in the grid
    #[serde(default = "default_true")]
    pub writable: bool,
    /// Numeric bounds from the store's validators
    #[serde(default)]
    pub range: Option<NumericRange>,
    /// Length bounds from the store's validators
    #[serde(default)]
    pub length: Option<LengthRange>,
    /// Enumerated choices from the store's validators
    #[serde(default)]
    pub inset: Option<ChoiceSet>,
}

impl StoreColumn {
    /// Readable, writable store column
    #[must_use]
    pub fn new(name: impl Into<String>, store_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            store_type: store_type.into(),
            readable: true,
            writable: true,
            range: None,
            length: None,
            inset: None,
        }
    }
}

/// How key columns appear when a schema is derived from store metadata
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyVisibility {
    /// Show key columns
    pub show_keys: bool,
    /// Allow editing key columns
    pub edit_keys: bool,
}

impl Default for KeyVisibility {
    fn default() -> Self {
        Self {
            show_keys: true,
            edit_keys: false,
        }
    }
}
