//! End-to-end demo scenarios against the in-memory store

use anyhow::Context;
use editgrid_core::{
    CellId, GridConfig, InMemoryRecordStore, ReconcileError, ReconcileReport,
    ReconciliationEngine, RowSelection, Submission,
};
use editgrid_integrity::{InMemorySessionStore, SessionId};
use editgrid_model::{ChoiceSet, ColumnSchema, ColumnType, Digest, FieldMap, KeyValues, Value};
use serde_json::json;
use std::sync::Arc;

/// One demo scenario
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Scenario {
    /// Untouched resubmission
    Unchanged,
    /// Edited row deleted by another writer
    ConcurrentDelete,
    /// New row with a bad integer
    InvalidInsert,
    /// Altered table digest
    Tampered,
}

impl Scenario {
    pub(crate) const ALL: [Scenario; 4] = [
        Self::Unchanged,
        Self::ConcurrentDelete,
        Self::InvalidInsert,
        Self::Tampered,
    ];

    pub(crate) fn parse(name: &str) -> anyhow::Result<Vec<Self>> {
        Ok(match name {
            "a" => vec![Self::Unchanged],
            "b" => vec![Self::ConcurrentDelete],
            "c" => vec![Self::InvalidInsert],
            "d" => vec![Self::Tampered],
            "all" => Self::ALL.to_vec(),
            other => anyhow::bail!("unknown scenario {other}"),
        })
    }

    fn label(self) -> &'static str {
        match self {
            Self::Unchanged => "a",
            Self::ConcurrentDelete => "b",
            Self::InvalidInsert => "c",
            Self::Tampered => "d",
        }
    }
}

fn demo_columns() -> Vec<ColumnSchema> {
    vec![
        ColumnSchema::new("id", ColumnType::Integer).read_only(),
        ColumnSchema::new("name", ColumnType::String).with_length(1, 40),
        ColumnSchema::new("qty", ColumnType::Integer).with_range(0.0, 1000.0),
        ColumnSchema::new("done", ColumnType::Boolean),
        ColumnSchema::new("tags", ColumnType::String)
            .with_choices(ChoiceSet::multiple(["red", "green", "blue"])),
    ]
}

fn demo_records() -> Vec<FieldMap> {
    [("bolts", 120_i64, "red"), ("nuts", 80, "green")]
        .into_iter()
        .map(|(name, qty, tag)| {
            let mut fields = FieldMap::new();
            fields.insert("name".into(), Value::text(name));
            fields.insert("qty".into(), Value::Integer(qty));
            fields.insert("done".into(), Value::Bool(false));
            fields.insert("tags".into(), Value::List(vec![tag.to_string()]));
            fields
        })
        .collect()
}

/// Fill in the demo table layout when `config` declares no columns
pub(crate) fn demo_config(config: Option<GridConfig>) -> anyhow::Result<GridConfig> {
    let config = config.unwrap_or_else(|| GridConfig::new("parts"));
    if !config.columns.is_empty() {
        anyhow::bail!("demo grids use their own columns; remove [[columns]] from the config");
    }
    Ok(config.with_columns(demo_columns()).with_keys(["id"]))
}

struct DemoGrid {
    engine: ReconciliationEngine,
    store: InMemoryRecordStore,
    session: SessionId,
}

impl DemoGrid {
    fn new(config: GridConfig) -> anyhow::Result<Self> {
        let schema = config.schema()?;
        let store = InMemoryRecordStore::from_schema(&schema).with_records(demo_records())?;
        let engine = ReconciliationEngine::new(
            config,
            Arc::new(InMemorySessionStore::new()),
            Arc::new(store.clone()),
        )?;
        Ok(Self {
            engine,
            store,
            session: SessionId::generate(),
        })
    }

    async fn submit(&self, submission: &Submission) -> Result<ReconcileReport, ReconcileError> {
        self.engine
            .reconcile(&self.session, submission, &self.engine.default_options())
            .await
    }
}

/// Run one scenario on a fresh store and describe its outcome as JSON
pub(crate) async fn run(scenario: Scenario, config: &GridConfig) -> anyhow::Result<serde_json::Value> {
    let mut config = config.clone();
    if scenario == Scenario::InvalidInsert {
        config.max_rows = config.max_rows.max(demo_records().len() + 1);
    }
    let grid = DemoGrid::new(config)?;
    let rendered = grid
        .engine
        .render(&grid.session, &RowSelection::all())
        .await
        .context("render failed")?;
    let mut submission = rendered.echo_submission();

    match scenario {
        Scenario::Unchanged => {}
        Scenario::ConcurrentDelete => {
            submission.set_cell(&CellId::field(0, "name"), "hex bolts");
            grid.store
                .delete_record(&KeyValues::new().with("id", 1_i64))?;
        }
        Scenario::InvalidInsert => {
            let n = demo_records().len();
            submission.set_cell(&CellId::field(n, "name"), "washers");
            submission.set_cell(&CellId::field(n, "qty"), "abc");
        }
        Scenario::Tampered => {
            submission.table_digest = Some(Digest::from("0000"));
        }
    }

    tracing::info!("Running scenario {}", scenario.label());
    let outcome = match grid.submit(&submission).await {
        Ok(report) => serde_json::to_value(report.summary())?,
        Err(err) => json!({
            "error": err.user_message(),
            "detail": err.to_string(),
        }),
    };
    Ok(json!({
        "scenario": scenario.label(),
        "records": grid.store.len(),
        "outcome": outcome,
    }))
}
