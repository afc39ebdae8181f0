//! In-process record store
//!
//! Records live in a `Vec` behind a `parking_lot::Mutex`. A transaction works
//! on a private copy and swaps it in on commit; a commit racing another one
//! fails with [`StoreError::Conflict`]. Single-column keys are auto-assigned on
//! insert when absent.

use super::{bar_encode, RecordStore, StoreTransaction};
use crate::error::StoreError;
use async_trait::async_trait;
use editgrid_model::{ColumnType, FieldMap, KeyValues, StoreColumn, TableSchema, Value};
use parking_lot::Mutex;
use std::sync::Arc;

#[derive(Debug, Clone, Default)]
struct TableState {
    records: Vec<FieldMap>,
    next_id: i64,
    version: u64,
    committed_writes: usize,
    transactions: usize,
}

impl TableState {
    fn position(&self, key: &KeyValues) -> Option<usize> {
        self.records.iter().position(|r| key_matches(r, key))
    }

    fn insert(&mut self, key_fields: &[String], fields: FieldMap) -> Result<KeyValues, StoreError> {
        let mut record = bar_encode(fields);

        if let [single] = key_fields {
            if record.get(single).map_or(true, Value::is_blank) {
                record.insert(single.clone(), Value::Integer(self.next_id));
            }
        }

        let key: KeyValues = key_fields
            .iter()
            .map(|k| (k.clone(), record.get(k).cloned().unwrap_or_default()))
            .collect();
        if key.has_blank() {
            return Err(StoreError::Insert("missing key value".into()));
        }
        if self.position(&key).is_some() {
            return Err(StoreError::Insert("duplicate key".into()));
        }

        if let Some(Value::Integer(id)) = key_fields.first().and_then(|k| record.get(k)) {
            self.next_id = self.next_id.max(id + 1);
        }
        self.records.push(record);
        Ok(key)
    }

    fn update(&mut self, key: &KeyValues, fields: FieldMap) -> Result<(), StoreError> {
        let idx = self.position(key).ok_or(StoreError::NotFound)?;
        let mut record = self.records[idx].clone();
        for (name, value) in bar_encode(fields) {
            record.insert(name, value);
        }

        let new_key: KeyValues = key
            .iter()
            .map(|(k, _)| (k.clone(), record.get(k).cloned().unwrap_or_default()))
            .collect();
        if new_key.has_blank() {
            return Err(StoreError::Update("missing key value".into()));
        }
        if self.position(&new_key).is_some_and(|other| other != idx) {
            return Err(StoreError::Update("duplicate key".into()));
        }

        self.records[idx] = record;
        Ok(())
    }

    fn delete(&mut self, key: &KeyValues) -> Result<(), StoreError> {
        let idx = self.position(key).ok_or(StoreError::NotFound)?;
        self.records.remove(idx);
        Ok(())
    }

    fn get(&self, key: &KeyValues) -> Option<FieldMap> {
        self.position(key).map(|i| self.records[i].clone())
    }
}

fn key_matches(record: &FieldMap, key: &KeyValues) -> bool {
    !key.is_empty()
        && key
            .iter()
            .all(|(k, v)| record.get(k).is_some_and(|rv| rv.to_string() == v.to_string()))
}

/// Record store kept in memory, shared between clones
#[derive(Debug, Clone)]
pub struct InMemoryRecordStore {
    columns: Vec<StoreColumn>,
    key_fields: Vec<String>,
    state: Arc<Mutex<TableState>>,
}

impl InMemoryRecordStore {
    /// Empty store with the given column metadata and key columns
    #[must_use]
    pub fn new<K, S>(columns: Vec<StoreColumn>, key_fields: K) -> Self
    where
        K: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            columns,
            key_fields: key_fields.into_iter().map(Into::into).collect(),
            state: Arc::new(Mutex::new(TableState {
                next_id: 1,
                ..TableState::default()
            })),
        }
    }

    /// Empty store whose metadata mirrors a grid schema
    #[must_use]
    pub fn from_schema(schema: &TableSchema) -> Self {
        let columns = schema
            .columns()
            .map(|c| StoreColumn {
                name: c.field.clone(),
                store_type: match c.column_type {
                    ColumnType::Number => "double".to_string(),
                    other => other.to_string(),
                },
                readable: true,
                writable: true,
                range: c.range,
                length: c.length,
                inset: c.inset.clone(),
            })
            .collect();
        Self::new(columns, schema.key_names().iter().cloned())
    }

    /// Seed records (builder style)
    ///
    /// # Errors
    /// Propagates insert failures such as duplicate keys
    pub fn with_records(self, records: Vec<FieldMap>) -> Result<Self, StoreError> {
        for record in records {
            self.insert_record(record)?;
        }
        Ok(self)
    }

    /// Insert outside any transaction, as another writer would
    ///
    /// # Errors
    /// `Insert` on missing or duplicate keys
    pub fn insert_record(&self, fields: FieldMap) -> Result<KeyValues, StoreError> {
        let mut state = self.state.lock();
        let key = state.insert(&self.key_fields, fields)?;
        state.version += 1;
        Ok(key)
    }

    /// Change one field outside any transaction
    ///
    /// # Errors
    /// `NotFound` when no record has `key`, `Update` when the change would
    /// give the record another record's key
    pub fn update_record(
        &self,
        key: &KeyValues,
        field: impl Into<String>,
        value: impl Into<Value>,
    ) -> Result<(), StoreError> {
        let mut fields = FieldMap::new();
        fields.insert(field.into(), value.into());
        let mut state = self.state.lock();
        state.update(key, fields)?;
        state.version += 1;
        Ok(())
    }

    /// Delete outside any transaction
    ///
    /// # Errors
    /// `NotFound` when no record has `key`
    pub fn delete_record(&self, key: &KeyValues) -> Result<(), StoreError> {
        let mut state = self.state.lock();
        state.delete(key)?;
        state.version += 1;
        Ok(())
    }

    /// Snapshot of all records
    #[must_use]
    pub fn records(&self) -> Vec<FieldMap> {
        self.state.lock().records.clone()
    }

    /// Record under `key`, read synchronously
    #[must_use]
    pub fn get(&self, key: &KeyValues) -> Option<FieldMap> {
        self.state.lock().get(key)
    }

    /// Number of records
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.lock().records.len()
    }

    /// No records
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Writes published by committed transactions
    #[must_use]
    pub fn committed_writes(&self) -> usize {
        self.state.lock().committed_writes
    }

    /// Transactions opened so far
    #[must_use]
    pub fn transactions_begun(&self) -> usize {
        self.state.lock().transactions
    }

    /// Key column names
    #[inline]
    #[must_use]
    pub fn key_fields(&self) -> &[String] {
        &self.key_fields
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn columns(&self) -> Result<Vec<StoreColumn>, StoreError> {
        Ok(self.columns.clone())
    }

    async fn read_all(&self, limit: Option<usize>) -> Result<Vec<FieldMap>, StoreError> {
        let state = self.state.lock();
        let take = limit.unwrap_or(usize::MAX);
        Ok(state.records.iter().take(take).cloned().collect())
    }

    async fn read_by_key(&self, key: &KeyValues) -> Result<Option<FieldMap>, StoreError> {
        Ok(self.state.lock().get(key))
    }

    async fn begin(&self) -> Result<Box<dyn StoreTransaction>, StoreError> {
        let mut state = self.state.lock();
        state.transactions += 1;
        Ok(Box::new(MemoryTransaction {
            shared: Arc::clone(&self.state),
            key_fields: self.key_fields.clone(),
            base_version: state.version,
            staged: state.clone(),
            ops: 0,
        }))
    }
}

struct MemoryTransaction {
    shared: Arc<Mutex<TableState>>,
    key_fields: Vec<String>,
    base_version: u64,
    staged: TableState,
    ops: usize,
}

#[async_trait]
impl StoreTransaction for MemoryTransaction {
    async fn insert(&mut self, fields: FieldMap) -> Result<KeyValues, StoreError> {
        let key = self.staged.insert(&self.key_fields, fields)?;
        self.ops += 1;
        Ok(key)
    }

    async fn update_by_key(&mut self, key: &KeyValues, fields: FieldMap) -> Result<(), StoreError> {
        self.staged.update(key, fields)?;
        self.ops += 1;
        Ok(())
    }

    async fn delete_by_key(&mut self, key: &KeyValues) -> Result<(), StoreError> {
        self.staged.delete(key)?;
        self.ops += 1;
        Ok(())
    }

    async fn read_by_key(&self, key: &KeyValues) -> Result<Option<FieldMap>, StoreError> {
        Ok(self.staged.get(key))
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let MemoryTransaction {
            shared,
            base_version,
            staged: mut next,
            ops,
            ..
        } = *self;
        if ops == 0 {
            return Ok(());
        }
        let mut shared = shared.lock();
        if shared.version != base_version {
            return Err(StoreError::Conflict);
        }
        next.version = base_version + 1;
        next.committed_writes = shared.committed_writes + ops;
        next.transactions = shared.transactions;
        *shared = next;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        tracing::debug!("Discarding {} staged writes", self.ops);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> InMemoryRecordStore {
        InMemoryRecordStore::new(
            vec![
                StoreColumn::new("id", "id"),
                StoreColumn::new("name", "string"),
            ],
            ["id"],
        )
    }

    fn record(name: &str) -> FieldMap {
        let mut f = FieldMap::new();
        f.insert("name".into(), Value::text(name));
        f
    }

    #[tokio::test]
    async fn auto_increment_keys() {
        let store = store();
        let a = store.insert_record(record("a")).unwrap();
        let b = store.insert_record(record("b")).unwrap();
        assert_eq!(a.get("id"), Some(&Value::Integer(1)));
        assert_eq!(b.get("id"), Some(&Value::Integer(2)));

        let text_key = KeyValues::new().with("id", "2");
        let found = store.read_by_key(&text_key).await.unwrap().unwrap();
        assert_eq!(found.get("name"), Some(&Value::text("b")));
    }

    #[tokio::test]
    async fn staged_writes_hidden_until_commit() {
        let store = store();
        store.insert_record(record("a")).unwrap();

        let mut tx = store.begin().await.unwrap();
        let key = tx.insert(record("b")).await.unwrap();
        assert!(tx.read_by_key(&key).await.unwrap().is_some());
        assert!(store.read_by_key(&key).await.unwrap().is_none());

        tx.commit().await.unwrap();
        assert_eq!(store.len(), 2);
        assert_eq!(store.committed_writes(), 1);
    }

    #[tokio::test]
    async fn rollback_discards() {
        let store = store();
        let key = store.insert_record(record("a")).unwrap();
        let mut tx = store.begin().await.unwrap();
        tx.delete_by_key(&key).await.unwrap();
        tx.rollback().await.unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(store.committed_writes(), 0);
    }

    #[tokio::test]
    async fn concurrent_commit_conflicts() {
        let store = store();
        let key = store.insert_record(record("a")).unwrap();
        let mut tx = store.begin().await.unwrap();
        tx.update_by_key(&key, record("x")).await.unwrap();
        store.update_record(&key, "name", "other writer").unwrap();
        assert_eq!(tx.commit().await.unwrap_err(), StoreError::Conflict);
        assert_eq!(
            store.get(&key).unwrap().get("name"),
            Some(&Value::text("other writer"))
        );
    }

    #[tokio::test]
    async fn missing_keys_are_errors() {
        let store = store();
        let ghost = KeyValues::new().with("id", 99_i64);
        let mut tx = store.begin().await.unwrap();
        assert_eq!(
            tx.update_by_key(&ghost, record("x")).await.unwrap_err(),
            StoreError::NotFound
        );
        assert_eq!(tx.delete_by_key(&ghost).await.unwrap_err(), StoreError::NotFound);
    }

    #[tokio::test]
    async fn key_rewrite_cannot_collide() {
        let store = store();
        let first = store.insert_record(record("a")).unwrap();
        store.insert_record(record("b")).unwrap();

        let mut onto_second = record("a");
        onto_second.insert("id".into(), Value::Integer(2));
        let mut tx = store.begin().await.unwrap();
        assert_eq!(
            tx.update_by_key(&first, onto_second).await.unwrap_err(),
            StoreError::Update("duplicate key".into())
        );

        let mut free_slot = record("a");
        free_slot.insert("id".into(), Value::Integer(7));
        tx.update_by_key(&first, free_slot).await.unwrap();
        tx.commit().await.unwrap();

        let ids: Vec<String> = store
            .records()
            .iter()
            .map(|r| r.get("id").unwrap().to_string())
            .collect();
        assert_eq!(ids, vec!["7", "2"]);
    }

    #[tokio::test]
    async fn limit_and_bar_encoding() {
        let store = store();
        let mut tagged = record("a");
        tagged.insert("tags".into(), Value::List(vec!["x".into(), "y".into()]));
        store.insert_record(tagged).unwrap();
        store.insert_record(record("b")).unwrap();

        let rows = store.read_all(Some(1)).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("tags"), Some(&Value::text("|x|y|")));
        assert_eq!(store.read_all(None).await.unwrap().len(), 2);
    }
}
