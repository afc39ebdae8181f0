//! Untyped cell values
//!
//! A [`Value`] is what a store returns and what a submission carries before
//! it has been interpreted through a [`ColumnSchema`](crate::ColumnSchema).

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};

/// Separator used for multi-select values in their text form
pub const LIST_SEPARATOR: char = ',';

/// A single cell value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(untagged)]
pub enum Value {
    /// Boolean (checkbox) value
    Bool(bool),
    /// Whole number
    Integer(i64),
    /// Floating point number
    Number(f64),
    /// Raw text, the form every submitted cell arrives in
    Text(String),
    /// Multi-select choice
    List(Vec<String>),
    /// No value
    #[default]
    Null,
}

impl Value {
    /// Create a text value
    #[inline]
    #[must_use]
    pub fn text(s: impl Into<String>) -> Self {
        Self::Text(s.into())
    }

    /// Null, empty text and empty lists are blank
    #[inline]
    #[must_use]
    pub fn is_blank(&self) -> bool {
        match self {
            Self::Null => true,
            Self::Text(s) => s.is_empty(),
            Self::List(items) => items.is_empty(),
            _ => false,
        }
    }

    /// Borrow the text payload, if this is a text value
    #[inline]
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Truthiness used for checkbox-like interpretation
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            Self::Integer(i) => Some(*i != 0),
            Self::Text(s) => match s.as_str() {
                "on" | "true" | "True" | "1" => Some(true),
                "off" | "false" | "False" | "0" | "" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }

    /// Items of a multi-select value; a scalar is treated as a single item
    #[must_use]
    pub fn items(&self) -> Vec<String> {
        match self {
            Self::List(items) => items.clone(),
            v if v.is_blank() => Vec::new(),
            v => vec![v.to_string()],
        }
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => Ok(()),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Integer(i) => write!(f, "{i}"),
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(s) => f.write_str(s),
            Self::List(items) => {
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, "{LIST_SEPARATOR}")?;
                    }
                    f.write_str(item)?;
                }
                Ok(())
            }
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<Vec<String>> for Value {
    fn from(value: Vec<String>) -> Self {
        Self::List(value)
    }
}

/// Ordered field name to value mapping, as exchanged with a record store
pub type FieldMap = IndexMap<String, Value>;

/// Key column values in key-list order
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct KeyValues(IndexMap<String, Value>);

impl KeyValues {
    /// Create empty key values
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a key column value (builder style)
    #[must_use]
    pub fn with(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(field.into(), value.into());
        self
    }

    /// Set a key column value
    pub fn insert(&mut self, field: impl Into<String>, value: Value) {
        self.0.insert(field.into(), value);
    }

    /// Value of a key column
    #[inline]
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    /// Iterate `(field, value)` pairs in key order
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    /// Number of key columns
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// No key columns at all
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// True if any key column is blank (not yet assigned by the store)
    #[must_use]
    pub fn has_blank(&self) -> bool {
        self.0.values().any(Value::is_blank)
    }

    /// Key values compared by canonical text form
    ///
    /// Keys recovered from a submission are text while store keys are typed,
    /// so equality has to look through the representation.
    #[must_use]
    pub fn matches(&self, other: &KeyValues) -> bool {
        self.0.len() == other.0.len()
            && self
                .0
                .iter()
                .all(|(k, v)| other.0.get(k).is_some_and(|o| o.to_string() == v.to_string()))
    }
}

impl FromIterator<(String, Value)> for KeyValues {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_values() {
        assert!(Value::Null.is_blank());
        assert!(Value::text("").is_blank());
        assert!(Value::List(vec![]).is_blank());
        assert!(!Value::Integer(0).is_blank());
        assert!(!Value::Bool(false).is_blank());
    }

    #[test]
    fn display_forms() {
        assert_eq!(Value::Null.to_string(), "");
        assert_eq!(Value::Integer(42).to_string(), "42");
        assert_eq!(Value::Number(1.5).to_string(), "1.5");
        assert_eq!(Value::Bool(true).to_string(), "true");
        assert_eq!(
            Value::List(vec!["a".into(), "b".into()]).to_string(),
            "a,b"
        );
    }

    #[test]
    fn single_item_list_displays_like_text() {
        assert_eq!(
            Value::List(vec!["a".into()]).to_string(),
            Value::text("a").to_string()
        );
    }

    #[test]
    fn checkbox_truthiness() {
        assert_eq!(Value::text("on").as_bool(), Some(true));
        assert_eq!(Value::text("off").as_bool(), Some(false));
        assert_eq!(Value::text("maybe").as_bool(), None);
    }

    #[test]
    fn key_values_match_across_representations() {
        let typed = KeyValues::new().with("id", 7_i64);
        let text = KeyValues::new().with("id", "7");
        assert!(typed.matches(&text));
        assert!(!typed.matches(&KeyValues::new().with("id", "8")));
    }

    #[test]
    fn value_serde_untagged() {
        let json = r#"[1, 2.5, "x", true, null, ["a","b"]]"#;
        let values: Vec<Value> = serde_json::from_str(json).unwrap();
        assert_eq!(
            values,
            vec![
                Value::Integer(1),
                Value::Number(2.5),
                Value::text("x"),
                Value::Bool(true),
                Value::Null,
                Value::List(vec!["a".into(), "b".into()]),
            ]
        );
    }
}
