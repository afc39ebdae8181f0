//! Errors raised by the data model

/// Errors from schema construction and row/collection access
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ModelError {
    /// Positional access past the end of a collection
    #[error("index {index} out of range for collection of {len} rows")]
    IndexOutOfRange { index: usize, len: usize },

    /// Removal of a field the row does not carry
    #[error("field not found: {0}")]
    KeyNotFound(String),

    /// Row does not belong to the collection's schema
    #[error("type mismatch: {0}")]
    TypeMismatch(String),

    /// Two columns share a field name
    #[error("duplicate column: {0}")]
    DuplicateColumn(String),

    /// Key list names a column the schema does not have
    #[error("key column not in schema: {0}")]
    UnknownKeyColumn(String),
}
