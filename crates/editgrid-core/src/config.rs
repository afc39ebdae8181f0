//! Grid configuration
//!
//! A [`GridConfig`] describes one editable grid: its table, columns, keys and
//! the integrity and conflict settings its submissions are reconciled with.
//! Every field has a default, so a TOML file only needs what differs.

use crate::error::ConfigError;
use editgrid_integrity::{DEFAULT_HISTORY_DEPTH, DEFAULT_SALT_LEN};
use editgrid_model::{ColumnSchema, TableSchema};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

/// How stale rows affect the rest of the batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictMode {
    /// Check every row and report all conflicts
    #[default]
    Parcel,
    /// Stop at the first conflict
    Strict,
}

/// Configuration of one editable grid
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridConfig {
    /// Form name; `tb_<table>` when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub form_name: Option<String>,
    /// Store table name
    pub table: String,
    /// Whether rows may be deleted
    pub deletable: bool,
    /// Rows shown; short tables are padded with blank new rows
    pub max_rows: usize,
    /// Issue and verify table digests
    pub table_digest_enabled: bool,
    /// Stamp record digests and detect stale rows
    pub record_digest_enabled: bool,
    /// Salt length in bytes
    pub salt_len: usize,
    /// Previous tokens/digests kept valid besides the newest
    pub history_depth: usize,
    /// Conflict mode used when a request does not choose one
    pub default_conflict_mode: ConflictMode,
    /// Validate rows already in conflict when a request does not choose
    pub default_validate_all: bool,
    /// Column descriptors
    pub columns: Vec<ColumnSchema>,
    /// Key column names
    pub keys: Vec<String>,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            form_name: None,
            table: "grid".to_string(),
            deletable: true,
            max_rows: 0,
            table_digest_enabled: true,
            record_digest_enabled: true,
            salt_len: DEFAULT_SALT_LEN,
            history_depth: DEFAULT_HISTORY_DEPTH,
            default_conflict_mode: ConflictMode::Parcel,
            default_validate_all: false,
            columns: Vec::new(),
            keys: vec!["id".to_string()],
        }
    }
}

impl GridConfig {
    /// Default configuration for `table`
    #[must_use]
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            ..Self::default()
        }
    }

    /// Effective form name
    #[must_use]
    pub fn form_name(&self) -> String {
        self.form_name
            .clone()
            .unwrap_or_else(|| format!("tb_{}", self.table))
    }

    /// With an explicit form name
    #[inline]
    #[must_use]
    pub fn with_form_name(mut self, name: impl Into<String>) -> Self {
        self.form_name = Some(name.into());
        self
    }

    /// With column descriptors
    #[inline]
    #[must_use]
    pub fn with_columns(mut self, columns: Vec<ColumnSchema>) -> Self {
        self.columns = columns;
        self
    }

    /// With key column names
    #[must_use]
    pub fn with_keys<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.keys = keys.into_iter().map(Into::into).collect();
        self
    }

    /// With padding up to `max_rows`
    #[inline]
    #[must_use]
    pub fn with_max_rows(mut self, max_rows: usize) -> Self {
        self.max_rows = max_rows;
        self
    }

    /// Allow or forbid deletion
    #[inline]
    #[must_use]
    pub fn with_deletable(mut self, deletable: bool) -> Self {
        self.deletable = deletable;
        self
    }

    /// Enable or disable table digests
    #[inline]
    #[must_use]
    pub fn with_table_digest(mut self, enabled: bool) -> Self {
        self.table_digest_enabled = enabled;
        self
    }

    /// Enable or disable record digests
    #[inline]
    #[must_use]
    pub fn with_record_digest(mut self, enabled: bool) -> Self {
        self.record_digest_enabled = enabled;
        self
    }

    /// With salt length
    #[inline]
    #[must_use]
    pub fn with_salt_len(mut self, len: usize) -> Self {
        self.salt_len = len;
        self
    }

    /// With history depth
    #[inline]
    #[must_use]
    pub fn with_history_depth(mut self, depth: usize) -> Self {
        self.history_depth = depth;
        self
    }

    /// With default conflict mode
    #[inline]
    #[must_use]
    pub fn with_conflict_mode(mut self, mode: ConflictMode) -> Self {
        self.default_conflict_mode = mode;
        self
    }

    /// With default `validate_all`
    #[inline]
    #[must_use]
    pub fn with_validate_all(mut self, validate_all: bool) -> Self {
        self.default_validate_all = validate_all;
        self
    }

    /// Parse a TOML document
    ///
    /// # Errors
    /// `Parse` on bad TOML, plus everything [`GridConfig::validate`] reports
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a TOML file
    ///
    /// # Errors
    /// `Io` when the file cannot be read, otherwise as [`GridConfig::from_toml_str`]
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Render as TOML
    ///
    /// # Errors
    /// `Serialize` if a value has no TOML form
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Check settings and that columns and keys form a schema
    ///
    /// # Errors
    /// `Invalid` for out-of-domain settings, `Schema` for bad columns/keys
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.table.trim().is_empty() {
            return Err(ConfigError::Invalid("table must not be empty".into()));
        }
        if self.salt_len == 0 {
            return Err(ConfigError::Invalid("salt_len must be positive".into()));
        }
        if self.keys.is_empty() {
            return Err(ConfigError::Invalid("at least one key column is required".into()));
        }
        if !self.columns.is_empty() {
            self.schema()?;
        }
        Ok(())
    }

    /// Build the table schema from the declared columns and keys
    ///
    /// # Errors
    /// `Schema` on duplicate columns or unknown keys
    pub fn schema(&self) -> Result<Arc<TableSchema>, ConfigError> {
        Ok(Arc::new(TableSchema::new(
            self.columns.clone(),
            self.keys.iter().cloned(),
        )?))
    }
}

/// Per-request reconcile options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ReconcileOptions {
    /// Conflict handling
    pub conflict_mode: ConflictMode,
    /// Validate rows that are already in conflict
    pub validate_all: bool,
}

impl ReconcileOptions {
    /// Defaults taken from a grid configuration
    #[must_use]
    pub fn from_config(config: &GridConfig) -> Self {
        Self {
            conflict_mode: config.default_conflict_mode,
            validate_all: config.default_validate_all,
        }
    }

    /// Strict conflict handling
    #[inline]
    #[must_use]
    pub fn strict(mut self) -> Self {
        self.conflict_mode = ConflictMode::Strict;
        self
    }

    /// Parcel conflict handling
    #[inline]
    #[must_use]
    pub fn parcel(mut self) -> Self {
        self.conflict_mode = ConflictMode::Parcel;
        self
    }

    /// With `validate_all`
    #[inline]
    #[must_use]
    pub fn with_validate_all(mut self, validate_all: bool) -> Self {
        self.validate_all = validate_all;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use editgrid_model::ColumnType;
    use std::io::Write;

    const SAMPLE: &str = r#"
table = "items"
max_rows = 5
default_conflict_mode = "strict"
keys = ["id"]

[[columns]]
field = "id"
type = "integer"
writable = false

[[columns]]
field = "qty"
type = "integer"
range = [0, 100]

[[columns]]
field = "tags"
inset = { multiple = true, theset = ["a", "b"] }
"#;

    #[test]
    fn defaults() {
        let config = GridConfig::new("items");
        assert_eq!(config.form_name(), "tb_items");
        assert_eq!(config.salt_len, 8);
        assert_eq!(config.history_depth, 4);
        assert!(config.table_digest_enabled && config.record_digest_enabled);
        assert_eq!(config.default_conflict_mode, ConflictMode::Parcel);
        assert!(!config.default_validate_all);
        assert_eq!(config.with_form_name("f").form_name(), "f");
    }

    #[test]
    fn parse_toml() {
        let config = GridConfig::from_toml_str(SAMPLE).unwrap();
        assert_eq!(config.max_rows, 5);
        assert_eq!(config.default_conflict_mode, ConflictMode::Strict);
        let schema = config.schema().unwrap();
        assert_eq!(schema.len(), 3);
        let qty = schema.column("qty").unwrap();
        assert_eq!(qty.column_type, ColumnType::Integer);
        assert_eq!(qty.range.unwrap().max(), 100.0);
        assert!(schema.column("tags").unwrap().is_multiple());
        assert!(schema.column("id").unwrap().is_key());

        let options = ReconcileOptions::from_config(&config);
        assert_eq!(options.conflict_mode, ConflictMode::Strict);
        assert_eq!(options.parcel().conflict_mode, ConflictMode::Parcel);
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();
        let config = GridConfig::from_path(file.path()).unwrap();
        assert_eq!(config.table, "items");

        let missing = GridConfig::from_path("/nonexistent/grid.toml");
        assert!(matches!(missing, Err(ConfigError::Io { .. })));
    }

    #[test]
    fn rejects_bad_settings() {
        assert!(matches!(
            GridConfig::from_toml_str("salt_len = 0"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            GridConfig::from_toml_str("keys = [\"nope\"]\n[[columns]]\nfield = \"a\""),
            Err(ConfigError::Schema(_))
        ));
        assert!(matches!(
            GridConfig::from_toml_str("max_rows = \"many\""),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn toml_round_trip() {
        let config = GridConfig::from_toml_str(SAMPLE).unwrap();
        let text = config.to_toml_string().unwrap();
        assert_eq!(GridConfig::from_toml_str(&text).unwrap(), config);
    }
}
