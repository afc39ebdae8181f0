//! Testing utilities for the editgrid workspace
//!
//! Shared fixtures (an `items` grid and its seeded store), a store wrapper
//! that fails on demand, and helpers that edit a rendered grid's echo the way
//! a browser would.

#![allow(missing_docs)]

use async_trait::async_trait;
use editgrid_core::{
    CellId, CellValue, GridConfig, InMemoryRecordStore, RecordStore, ReconciliationEngine,
    RenderedGrid, RowSelection, StoreError, StoreTransaction, Submission,
};
use editgrid_integrity::{encode_key_marker, InMemorySessionStore, SessionId, SessionStore};
use editgrid_model::{
    ChoiceSet, ColumnSchema, ColumnType, FieldMap, KeyValues, StoreColumn, TableSchema, Value,
};
use parking_lot::Mutex;
use std::sync::Arc;

/// Columns of the `items` fixture table
pub fn items_columns() -> Vec<ColumnSchema> {
    vec![
        ColumnSchema::new("id", ColumnType::Integer).read_only(),
        ColumnSchema::new("name", ColumnType::String)
            .with_label("Name")
            .with_length(1, 32),
        ColumnSchema::new("qty", ColumnType::Integer)
            .with_label("Quantity")
            .with_range(0.0, 100.0),
        ColumnSchema::new("price", ColumnType::Number),
        ColumnSchema::new("done", ColumnType::Boolean),
        ColumnSchema::new("tags", ColumnType::String)
            .with_choices(ChoiceSet::multiple(["red", "green", "blue"])),
    ]
}

pub fn items_config() -> GridConfig {
    GridConfig::new("items")
        .with_columns(items_columns())
        .with_keys(["id"])
}

pub fn items_schema() -> Arc<TableSchema> {
    Arc::new(TableSchema::new(items_columns(), ["id"]).unwrap())
}

pub fn item(id: i64, name: &str, qty: i64, price: f64, done: bool, tags: &[&str]) -> FieldMap {
    let mut fields = FieldMap::new();
    fields.insert("id".into(), Value::Integer(id));
    fields.insert("name".into(), Value::text(name));
    fields.insert("qty".into(), Value::Integer(qty));
    fields.insert("price".into(), Value::Number(price));
    fields.insert("done".into(), Value::Bool(done));
    fields.insert(
        "tags".into(),
        Value::List(tags.iter().map(|t| (*t).to_string()).collect()),
    );
    fields
}

pub fn seed_items() -> Vec<FieldMap> {
    vec![
        item(1, "apple", 3, 1.5, false, &["red"]),
        item(2, "pear", 5, 2.25, true, &["green"]),
        item(3, "plum", 0, 0.75, false, &[]),
    ]
}

pub fn seeded_store() -> InMemoryRecordStore {
    InMemoryRecordStore::from_schema(&items_schema())
        .with_records(seed_items())
        .unwrap()
}

pub fn key(id: i64) -> KeyValues {
    KeyValues::new().with("id", id)
}

/// One engine, its backing store and a session
pub struct TestGrid {
    pub engine: ReconciliationEngine,
    pub store: InMemoryRecordStore,
    pub sessions: Arc<InMemorySessionStore>,
    pub session: SessionId,
}

impl TestGrid {
    /// Seeded `items` grid with `config`
    pub fn new(config: GridConfig) -> Self {
        Self::with_store(config, seeded_store())
    }

    pub fn with_store(config: GridConfig, store: InMemoryRecordStore) -> Self {
        let sessions = Arc::new(InMemorySessionStore::new());
        let shared: Arc<dyn SessionStore> = sessions.clone();
        let engine = ReconciliationEngine::new(config, shared, Arc::new(store.clone())).unwrap();
        Self {
            engine,
            store,
            sessions,
            session: SessionId::new("test-session"),
        }
    }

    pub async fn render(&self) -> RenderedGrid {
        self.engine
            .render(&self.session, &RowSelection::all())
            .await
            .unwrap()
    }
}

impl Default for TestGrid {
    fn default() -> Self {
        Self::new(items_config())
    }
}

/// Overwrite a field cell of row `n`
pub fn set_field(submission: &mut Submission, n: usize, field: &str, value: impl Into<CellValue>) {
    submission.set_cell(&CellId::field(n, field), value);
}

/// Tick the delete checkbox of row `n`
pub fn mark_deleted(submission: &mut Submission, n: usize) {
    submission.set_cell(&CellId::Delete(n), true);
}

/// Point row `n` at another key, as a forged marker would
pub fn forge_key(submission: &mut Submission, n: usize, compressed: &str) {
    submission.set_cell(&CellId::Key(n), encode_key_marker(compressed));
}

/// Swap the key markers and record digests of two rows
pub fn swap_rows(submission: &mut Submission, a: usize, b: usize) {
    for id in [CellId::Key as fn(usize) -> CellId, CellId::RecordDigest] {
        let first = submission.remove_cell(&id(a));
        let second = submission.remove_cell(&id(b));
        if let Some(v) = second {
            submission.set_cell(&id(a), v);
        }
        if let Some(v) = first {
            submission.set_cell(&id(b), v);
        }
    }
}

/// Wraps an [`InMemoryRecordStore`] and injects failures
#[derive(Debug, Clone)]
pub struct FailingStore {
    inner: InMemoryRecordStore,
    fail_write_at: Option<usize>,
    fail_commit: bool,
    fail_reads: bool,
    rollbacks: Arc<Mutex<usize>>,
}

impl FailingStore {
    pub fn new(inner: InMemoryRecordStore) -> Self {
        Self {
            inner,
            fail_write_at: None,
            fail_commit: false,
            fail_reads: false,
            rollbacks: Arc::new(Mutex::new(0)),
        }
    }

    /// Fail the `n`th write (zero based) of each transaction
    pub fn fail_write_at(mut self, n: usize) -> Self {
        self.fail_write_at = Some(n);
        self
    }

    pub fn fail_commit(mut self) -> Self {
        self.fail_commit = true;
        self
    }

    pub fn fail_reads(mut self) -> Self {
        self.fail_reads = true;
        self
    }

    pub fn rollbacks(&self) -> usize {
        *self.rollbacks.lock()
    }

    pub fn inner(&self) -> &InMemoryRecordStore {
        &self.inner
    }
}

#[async_trait]
impl RecordStore for FailingStore {
    async fn columns(&self) -> Result<Vec<StoreColumn>, StoreError> {
        self.inner.columns().await
    }

    async fn read_all(&self, limit: Option<usize>) -> Result<Vec<FieldMap>, StoreError> {
        self.inner.read_all(limit).await
    }

    async fn read_by_key(&self, key: &KeyValues) -> Result<Option<FieldMap>, StoreError> {
        if self.fail_reads {
            return Err(StoreError::Read("connection reset".into()));
        }
        self.inner.read_by_key(key).await
    }

    async fn begin(&self) -> Result<Box<dyn StoreTransaction>, StoreError> {
        Ok(Box::new(FailingTransaction {
            inner: self.inner.begin().await?,
            fail_write_at: self.fail_write_at,
            fail_commit: self.fail_commit,
            writes: 0,
            rollbacks: Arc::clone(&self.rollbacks),
        }))
    }
}

struct FailingTransaction {
    inner: Box<dyn StoreTransaction>,
    fail_write_at: Option<usize>,
    fail_commit: bool,
    writes: usize,
    rollbacks: Arc<Mutex<usize>>,
}

impl FailingTransaction {
    fn tick(&mut self) -> bool {
        let failing = self.fail_write_at == Some(self.writes);
        self.writes += 1;
        failing
    }
}

#[async_trait]
impl StoreTransaction for FailingTransaction {
    async fn insert(&mut self, fields: FieldMap) -> Result<KeyValues, StoreError> {
        if self.tick() {
            return Err(StoreError::Insert("injected insert failure".into()));
        }
        self.inner.insert(fields).await
    }

    async fn update_by_key(&mut self, key: &KeyValues, fields: FieldMap) -> Result<(), StoreError> {
        if self.tick() {
            return Err(StoreError::Update("injected update failure".into()));
        }
        self.inner.update_by_key(key, fields).await
    }

    async fn delete_by_key(&mut self, key: &KeyValues) -> Result<(), StoreError> {
        if self.tick() {
            return Err(StoreError::Delete("injected delete failure".into()));
        }
        self.inner.delete_by_key(key).await
    }

    async fn read_by_key(&self, key: &KeyValues) -> Result<Option<FieldMap>, StoreError> {
        self.inner.read_by_key(key).await
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let FailingTransaction {
            inner,
            fail_commit,
            rollbacks,
            ..
        } = *self;
        if fail_commit {
            *rollbacks.lock() += 1;
            inner.rollback().await?;
            return Err(StoreError::Backend("injected commit failure".into()));
        }
        inner.commit().await
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        let FailingTransaction {
            inner, rollbacks, ..
        } = *self;
        *rollbacks.lock() += 1;
        inner.rollback().await
    }
}

/// Engine over a [`FailingStore`] with the `items` config
pub fn failing_engine(store: FailingStore) -> ReconciliationEngine {
    ReconciliationEngine::new(
        items_config(),
        Arc::new(InMemorySessionStore::new()),
        Arc::new(store),
    )
    .unwrap()
}
