//! Flat submission payload
//!
//! The presentation layer round-trips a grid as string-keyed cells. Cell ids
//! encode the row index and the role of the cell:
//!
//! | cell                   | id                 |
//! |------------------------|--------------------|
//! | key marker             | `k(N)`             |
//! | carried record digest  | `k(N)#rechash`     |
//! | carried input digest   | `k(N)#inphash`     |
//! | delete checkbox        | `d(N)`             |
//! | field value            | `cell_N_<field>_`  |

use crate::error::ParseError;
use editgrid_integrity::FormToken;
use editgrid_model::{Digest, Value};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

static KEY_CELL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^k\((\d+)\)(?:#(rechash|inphash))?$").expect("valid key cell regex")
});
static DELETE_CELL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^d\((\d+)\)$").expect("valid delete cell regex"));
static FIELD_CELL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^cell_(\d+)_(.+)_$").expect("valid field cell regex"));

/// Identifier of one submitted cell
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CellId {
    /// Base64 key marker of row N
    Key(usize),
    /// Record digest carried by row N
    RecordDigest(usize),
    /// Input digest carried by row N
    InputDigest(usize),
    /// Delete checkbox of row N
    Delete(usize),
    /// Value of `field` in row N
    Field { row: usize, field: String },
}

impl CellId {
    /// Field cell id
    #[inline]
    #[must_use]
    pub fn field(row: usize, field: impl Into<String>) -> Self {
        Self::Field {
            row,
            field: field.into(),
        }
    }

    /// Row index the cell belongs to
    #[must_use]
    pub fn row(&self) -> usize {
        match self {
            Self::Key(n)
            | Self::RecordDigest(n)
            | Self::InputDigest(n)
            | Self::Delete(n)
            | Self::Field { row: n, .. } => *n,
        }
    }
}

impl Display for CellId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Key(n) => write!(f, "k({n})"),
            Self::RecordDigest(n) => write!(f, "k({n})#rechash"),
            Self::InputDigest(n) => write!(f, "k({n})#inphash"),
            Self::Delete(n) => write!(f, "d({n})"),
            Self::Field { row, field } => write!(f, "cell_{row}_{field}_"),
        }
    }
}

impl FromStr for CellId {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let index = |m: Option<regex::Match<'_>>| {
            m.and_then(|m| m.as_str().parse::<usize>().ok())
                .ok_or_else(|| ParseError::InvalidCellId(s.to_string()))
        };

        if let Some(caps) = KEY_CELL.captures(s) {
            let n = index(caps.get(1))?;
            return Ok(match caps.get(2).map(|m| m.as_str()) {
                Some("rechash") => Self::RecordDigest(n),
                Some(_) => Self::InputDigest(n),
                None => Self::Key(n),
            });
        }
        if let Some(caps) = DELETE_CELL.captures(s) {
            return Ok(Self::Delete(index(caps.get(1))?));
        }
        if let Some(caps) = FIELD_CELL.captures(s) {
            let row = index(caps.get(1))?;
            let field = caps.get(2).map_or("", |m| m.as_str());
            return Ok(Self::field(row, field));
        }
        Err(ParseError::InvalidCellId(s.to_string()))
    }
}

/// Submitted cell content
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellValue {
    /// Checkbox state
    Checked(bool),
    /// Text input
    Text(String),
}

impl CellValue {
    /// Text content; checkbox states read as `"on"`/`""`
    #[must_use]
    pub fn text(&self) -> &str {
        match self {
            Self::Text(s) => s,
            Self::Checked(true) => "on",
            Self::Checked(false) => "",
        }
    }

    /// Checkbox interpretation
    #[must_use]
    pub fn is_checked(&self) -> bool {
        match self {
            Self::Checked(b) => *b,
            Self::Text(s) => Value::text(s.as_str()).as_bool().unwrap_or(false),
        }
    }
}

impl From<&str> for CellValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for CellValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<bool> for CellValue {
    fn from(value: bool) -> Self {
        Self::Checked(value)
    }
}

/// A submitted grid
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Submission {
    /// Form the grid was rendered as
    pub form_name: String,
    /// Anti-replay token issued with the render
    pub form_token: FormToken,
    /// Table digest as rendered
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table_digest: Option<Digest>,
    /// Flat cells keyed by cell id
    #[serde(default)]
    pub cells: BTreeMap<String, CellValue>,
}

impl Submission {
    /// Empty submission for `form_name`
    #[must_use]
    pub fn new(form_name: impl Into<String>, form_token: FormToken) -> Self {
        Self {
            form_name: form_name.into(),
            form_token,
            table_digest: None,
            cells: BTreeMap::new(),
        }
    }

    /// With the table digest as rendered
    #[inline]
    #[must_use]
    pub fn with_table_digest(mut self, digest: Digest) -> Self {
        self.table_digest = Some(digest);
        self
    }

    /// Cell by id
    #[inline]
    #[must_use]
    pub fn cell(&self, id: &CellId) -> Option<&CellValue> {
        self.cells.get(&id.to_string())
    }

    /// Set a cell
    pub fn set_cell(&mut self, id: &CellId, value: impl Into<CellValue>) {
        self.cells.insert(id.to_string(), value.into());
    }

    /// Remove a cell, returning its previous content
    pub fn remove_cell(&mut self, id: &CellId) -> Option<CellValue> {
        self.cells.remove(&id.to_string())
    }

    /// Number of rows, counted up to the first absent key marker
    #[must_use]
    pub fn row_count(&self) -> usize {
        (0..)
            .take_while(|n| self.cell(&CellId::Key(*n)).is_some())
            .count()
    }

    /// Parse from JSON
    ///
    /// # Errors
    /// Propagates `serde_json` errors
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}
