//! editgrid core - render and reconcile editable grids
//!
//! The server renders a page of records as a grid, each row carrying its key
//! marker and digests, and later receives the whole grid back as a flat map
//! of cells. This crate:
//! - parses that map back into classified rows (new, unchanged, changed, deleted)
//! - rejects replayed tokens and tampered key markers
//! - detects rows whose record changed or vanished since render
//! - validates edited fields against their column constraints
//! - applies every insert, update and delete in one store transaction
//!
//! # Example
//!
//! ```rust,ignore
//! use editgrid_core::{GridConfig, InMemoryRecordStore, ReconciliationEngine, RowSelection};
//! use editgrid_integrity::{InMemorySessionStore, SessionId};
//! use std::sync::Arc;
//!
//! # async fn example(config: GridConfig) -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(InMemoryRecordStore::from_schema(&config.schema()?));
//! let engine = ReconciliationEngine::new(config, Arc::new(InMemorySessionStore::new()), store)?;
//!
//! let session = SessionId::generate();
//! let grid = engine.render(&session, &RowSelection::all()).await?;
//! let report = engine
//!     .reconcile(&session, &grid.echo_submission(), &engine.default_options())
//!     .await?;
//! assert!(report.is_committed());
//! # Ok(())
//! # }
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod cell;
pub mod config;
pub mod engine;
pub mod error;
pub mod parser;
pub mod render;
pub mod report;
pub mod store;
pub mod validation;

pub use cell::{CellId, CellValue, Submission};
pub use config::{ConflictMode, GridConfig, ReconcileOptions};
pub use engine::{ReconciliationEngine, MSG_RECORD_CHANGED, MSG_RECORD_DELETED};
pub use error::{ConfigError, ParseError, ReconcileError, StoreError, WriteOp};
pub use parser::{parse, scan_key_markers};
pub use render::{ColumnHeader, RenderedCell, RenderedGrid, RenderedRow, RowSelection};
pub use report::{
    BatchStatus, IssueKind, ReconcileReport, Reissue, ReportSummary, RowIssue, WriteSummary,
};
pub use store::{bar_decode, bar_encode, InMemoryRecordStore, RecordStore, StoreTransaction};
pub use validation::{validate_row, validate_value, FieldIssue};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for driving a grid
    pub use crate::{
        GridConfig, InMemoryRecordStore, ReconcileOptions, ReconcileReport, ReconciliationEngine,
        RecordStore, RenderedGrid, RowSelection, Submission,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
