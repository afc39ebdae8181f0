//! Record store contract
//!
//! The engine only needs keyed reads plus a transaction that can insert,
//! update and delete by key. Staged writes become visible on `commit`; a
//! transaction dropped or rolled back leaves the store untouched.

mod memory;

pub use memory::InMemoryRecordStore;

use crate::error::StoreError;
use async_trait::async_trait;
use editgrid_model::{FieldMap, KeyValues, StoreColumn, TableSchema, Value};

/// Delimiter of multi-select values at rest, e.g. `|a|b|`
pub const BAR: char = '|';

/// Authoritative record storage for one table
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Column metadata, for deriving a schema
    async fn columns(&self) -> Result<Vec<StoreColumn>, StoreError>;

    /// Records in store order, at most `limit` of them
    async fn read_all(&self, limit: Option<usize>) -> Result<Vec<FieldMap>, StoreError>;

    /// Record under `key`, if any
    async fn read_by_key(&self, key: &KeyValues) -> Result<Option<FieldMap>, StoreError>;

    /// Open a write transaction
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>, StoreError>;
}

/// Staged writes against a [`RecordStore`]
#[async_trait]
pub trait StoreTransaction: Send + Sync {
    /// Create a record, returning its (possibly generated) key
    async fn insert(&mut self, fields: FieldMap) -> Result<KeyValues, StoreError>;

    /// Overwrite the given fields of the record under `key`
    async fn update_by_key(&mut self, key: &KeyValues, fields: FieldMap) -> Result<(), StoreError>;

    /// Remove the record under `key`
    async fn delete_by_key(&mut self, key: &KeyValues) -> Result<(), StoreError>;

    /// Read through the transaction, seeing staged writes
    async fn read_by_key(&self, key: &KeyValues) -> Result<Option<FieldMap>, StoreError>;

    /// Publish all staged writes atomically
    async fn commit(self: Box<Self>) -> Result<(), StoreError>;

    /// Discard all staged writes
    async fn rollback(self: Box<Self>) -> Result<(), StoreError>;
}

/// Encode list values as `|a|b|` for storage
#[must_use]
pub fn bar_encode(fields: FieldMap) -> FieldMap {
    fields
        .into_iter()
        .map(|(name, value)| match value {
            Value::List(items) if !items.is_empty() => {
                (name, Value::Text(format!("{BAR}{}{BAR}", items.join(&BAR.to_string()))))
            }
            Value::List(_) => (name, Value::text("")),
            other => (name, other),
        })
        .collect()
}

/// Decode `|a|b|` values of multi-select columns into lists
#[must_use]
pub fn bar_decode(schema: &TableSchema, fields: FieldMap) -> FieldMap {
    fields
        .into_iter()
        .map(|(name, value)| {
            let multiple = schema.column(&name).is_some_and(|c| c.is_multiple());
            match value {
                Value::Text(s) if multiple && s.len() > 1 && s.starts_with(BAR) && s.ends_with(BAR) => {
                    let items = s
                        .trim_matches(BAR)
                        .split(BAR)
                        .filter(|i| !i.is_empty())
                        .map(str::to_string)
                        .collect();
                    (name, Value::List(items))
                }
                other => (name, other),
            }
        })
        .collect()
}
