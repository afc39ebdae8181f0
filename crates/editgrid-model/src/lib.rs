//! editgrid model - schema-aware rows for editable grids
//!
//! Provides:
//! - [`Value`] and [`KeyValues`]: untyped cell values and key column tuples
//! - [`ColumnSchema`] / [`TableSchema`]: column descriptors shared by rows
//! - [`Row`]: values read through the schema, plus per-request edit metadata
//! - [`RowCollection`]: ordered rows over one schema
//!
//! # Example
//!
//! ```rust
//! use editgrid_model::{ColumnSchema, ColumnType, Row, TableSchema, Value};
//! use std::sync::Arc;
//!
//! let schema = Arc::new(
//!     TableSchema::new(
//!         vec![
//!             ColumnSchema::new("id", ColumnType::Integer).read_only(),
//!             ColumnSchema::new("qty", ColumnType::Integer),
//!         ],
//!         ["id"],
//!     )
//!     .unwrap(),
//! );
//!
//! let mut row = Row::new(schema);
//! row.set("qty", "12");
//! assert_eq!(row.get("qty"), Some(Value::Integer(12)));
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod collection;
pub mod digest;
pub mod error;
pub mod row;
pub mod schema;
pub mod value;

pub use collection::RowCollection;
pub use digest::{Digest, TOMBSTONE_DIGEST};
pub use error::ModelError;
pub use row::{coerce, Row, RowFlag, RowMeta};
pub use schema::{
    ChoiceSet, ColumnSchema, ColumnType, KeyVisibility, LengthRange, NumericRange, StoreColumn,
    TableSchema,
};
pub use value::{FieldMap, KeyValues, Value, LIST_SEPARATOR};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
