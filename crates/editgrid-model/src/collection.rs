//! Ordered row collections sharing one schema

use crate::error::ModelError;
use crate::row::Row;
use crate::schema::TableSchema;
use crate::value::FieldMap;
use std::sync::Arc;

/// Rows of one grid, in display order
#[derive(Debug, Clone, PartialEq)]
pub struct RowCollection {
    schema: Arc<TableSchema>,
    rows: Vec<Row>,
}

impl RowCollection {
    /// Empty collection over `schema`
    #[inline]
    #[must_use]
    pub fn new(schema: Arc<TableSchema>) -> Self {
        Self {
            schema,
            rows: Vec::new(),
        }
    }

    /// Collection built from raw field maps, one row each
    #[must_use]
    pub fn from_field_maps(schema: Arc<TableSchema>, records: Vec<FieldMap>) -> Self {
        let rows = records
            .into_iter()
            .map(|values| Row::from_fields(Arc::clone(&schema), values))
            .collect();
        Self { schema, rows }
    }

    /// Shared schema
    #[inline]
    #[must_use]
    pub fn schema(&self) -> &Arc<TableSchema> {
        &self.schema
    }

    /// Number of rows
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// No rows
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Row at `index`
    ///
    /// # Errors
    /// `IndexOutOfRange` past the end
    pub fn get(&self, index: usize) -> Result<&Row, ModelError> {
        let len = self.rows.len();
        self.rows
            .get(index)
            .ok_or(ModelError::IndexOutOfRange { index, len })
    }

    /// Mutable row at `index`
    ///
    /// # Errors
    /// `IndexOutOfRange` past the end
    pub fn get_mut(&mut self, index: usize) -> Result<&mut Row, ModelError> {
        let len = self.rows.len();
        self.rows
            .get_mut(index)
            .ok_or(ModelError::IndexOutOfRange { index, len })
    }

    /// Append a row, returning its index
    ///
    /// # Errors
    /// `TypeMismatch` if the row was built over a different schema
    pub fn push(&mut self, row: Row) -> Result<usize, ModelError> {
        if !Arc::ptr_eq(&self.schema, row.schema()) && *self.schema != **row.schema() {
            return Err(ModelError::TypeMismatch(
                "row schema differs from collection schema".to_string(),
            ));
        }
        self.rows.push(row);
        Ok(self.rows.len() - 1)
    }

    /// Rows in order
    pub fn iter(&self) -> std::slice::Iter<'_, Row> {
        self.rows.iter()
    }

    /// Mutable rows in order
    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, Row> {
        self.rows.iter_mut()
    }

    /// Consume into the row vector
    #[inline]
    #[must_use]
    pub fn into_rows(self) -> Vec<Row> {
        self.rows
    }
}

impl<'a> IntoIterator for &'a RowCollection {
    type Item = &'a Row;
    type IntoIter = std::slice::Iter<'a, Row>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.iter()
    }
}

impl IntoIterator for RowCollection {
    type Item = Row;
    type IntoIter = std::vec::IntoIter<Row>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.into_iter()
    }
}
