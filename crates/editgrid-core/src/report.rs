//! Reconcile outcome

use editgrid_integrity::FormToken;
use editgrid_model::{Digest, RowCollection};
use serde::{Deserialize, Serialize};

/// Terminal state of a submission that got past parsing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchStatus {
    /// All writes applied (or none were needed)
    Committed,
    /// Row-level problems; nothing written
    Rejected,
}

/// Kind of row-level problem
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    /// Record removed since render
    StaleDeleted,
    /// Record changed since render
    StaleModified,
    /// Field value violates its column constraints
    ValidationFailed,
}

/// One problem found in a submitted row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowIssue {
    /// Row index in submission order
    pub row: usize,
    /// Offending field; `None` marks the whole row
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    /// Problem kind
    pub kind: IssueKind,
    /// User-facing message
    pub message: String,
}

impl RowIssue {
    /// Whole-row issue
    #[must_use]
    pub fn row(row: usize, kind: IssueKind, message: impl Into<String>) -> Self {
        Self {
            row,
            field: None,
            kind,
            message: message.into(),
        }
    }

    /// Single-cell issue
    #[must_use]
    pub fn cell(row: usize, field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            row,
            field: Some(field.into()),
            kind: IssueKind::ValidationFailed,
            message: message.into(),
        }
    }
}

/// Counts of applied store writes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteSummary {
    /// Records created
    pub inserted: usize,
    /// Records changed
    pub updated: usize,
    /// Records removed
    pub deleted: usize,
}

impl WriteSummary {
    /// All writes
    #[inline]
    #[must_use]
    pub fn total(&self) -> usize {
        self.inserted + self.updated + self.deleted
    }
}

/// Fresh challenge issued after a submission, so the client can continue
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reissue {
    /// Form name
    pub form_name: String,
    /// New anti-replay token
    pub form_token: FormToken,
    /// Table digest stored under the new token
    #[serde(skip_serializing_if = "Option::is_none")]
    pub table_digest: Option<Digest>,
}

/// Outcome of one reconcile call
#[derive(Debug, Clone)]
pub struct ReconcileReport {
    /// Terminal state
    pub status: BatchStatus,
    /// Parsed rows, updated in place by a commit
    pub rows: RowCollection,
    /// Row and cell problems
    pub issues: Vec<RowIssue>,
    /// Distinct issue messages in first-seen order
    pub messages: Vec<String>,
    /// Applied writes
    pub writes: WriteSummary,
    /// Challenge for the next submission
    pub reissue: Reissue,
}

impl ReconcileReport {
    /// Whether the batch was committed
    #[inline]
    #[must_use]
    pub fn is_committed(&self) -> bool {
        self.status == BatchStatus::Committed
    }

    /// Issues raised against one row
    pub fn issues_for(&self, row: usize) -> impl Iterator<Item = &RowIssue> {
        self.issues.iter().filter(move |i| i.row == row)
    }

    /// Serializable digest of the report, without the rows
    #[must_use]
    pub fn summary(&self) -> ReportSummary {
        ReportSummary {
            status: self.status,
            rows: self.rows.len(),
            issues: self.issues.clone(),
            messages: self.messages.clone(),
            writes: self.writes,
            reissue: self.reissue.clone(),
        }
    }
}

/// Serializable view of a [`ReconcileReport`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportSummary {
    /// Terminal state
    pub status: BatchStatus,
    /// Number of rows parsed
    pub rows: usize,
    /// Row and cell problems
    pub issues: Vec<RowIssue>,
    /// Distinct messages
    pub messages: Vec<String>,
    /// Applied writes
    pub writes: WriteSummary,
    /// Challenge for the next submission
    pub reissue: Reissue,
}

/// Distinct messages of `issues`, in first-seen order
#[must_use]
pub fn dedup_messages(issues: &[RowIssue]) -> Vec<String> {
    let mut messages: Vec<String> = Vec::new();
    for issue in issues {
        if !messages.contains(&issue.message) {
            messages.push(issue.message.clone());
        }
    }
    messages
}
