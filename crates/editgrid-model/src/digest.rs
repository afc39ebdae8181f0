//! Opaque digest values carried on rows
//!
//! The hashing itself lives in `editgrid-integrity`; rows only need to carry
//! and compare the resulting strings.

use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};

/// Record digest of a row removed by an earlier partial submission
pub const TOMBSTONE_DIGEST: &str = "DUMMY";

/// Hex-encoded content digest
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Digest(String);

impl Digest {
    /// Wrap an already computed digest string
    #[inline]
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Sentinel digest marking an already deleted row
    #[inline]
    #[must_use]
    pub fn tombstone() -> Self {
        Self(TOMBSTONE_DIGEST.to_string())
    }

    /// Whether this is the deleted-row sentinel
    #[inline]
    #[must_use]
    pub fn is_tombstone(&self) -> bool {
        self.0 == TOMBSTONE_DIGEST
    }

    /// Borrow the digest text
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Empty digest string
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Display for Digest {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Digest {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl AsRef<str> for Digest {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
