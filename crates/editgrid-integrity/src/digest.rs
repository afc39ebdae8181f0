//! Salted content digests
//!
//! All digests are `hex(sha256(salt || canonical text))`. Record and table
//! digests use the per-render salt; input digests are unsalted so the same
//! editable content always hashes the same within a session.

use crate::error::IntegrityError;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use editgrid_model::{Digest, KeyValues, Row, Value};
use rand::RngCore;
use sha2::{Digest as _, Sha256};
use std::fmt::Write as _;

/// Salt length in bytes used when none is configured
pub const DEFAULT_SALT_LEN: usize = 8;

/// Separator for compressed keys and table digest material
pub const KEY_SEPARATOR: char = '|';

/// Random per-render salt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Salt(Vec<u8>);

impl Salt {
    /// Fresh random salt of `len` bytes
    #[must_use]
    pub fn generate(len: usize) -> Self {
        let mut bytes = vec![0u8; len];
        rand::rng().fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Wrap raw salt bytes
    #[inline]
    #[must_use]
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    /// Raw bytes
    #[inline]
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Salt length in bytes
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Zero-length salt
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Base64 transport form
    #[must_use]
    pub fn encode(&self) -> String {
        STANDARD.encode(&self.0)
    }

    /// Decode a transported salt, rejecting bad base64 and wrong lengths
    #[must_use]
    pub fn decode(encoded: &str, len: usize) -> Option<Self> {
        STANDARD
            .decode(encoded)
            .ok()
            .filter(|bytes| bytes.len() == len)
            .map(Self)
    }

    /// Decode a transported salt, falling back to a fresh one
    #[must_use]
    pub fn decode_or_fresh(encoded: &str, len: usize) -> Self {
        Self::decode(encoded, len).unwrap_or_else(|| {
            tracing::warn!("Stored salt unusable, substituting a fresh one");
            Self::generate(len)
        })
    }
}

/// Hash `text`, optionally prefixed by `salt`
#[must_use]
pub fn hash_text(salt: Option<&Salt>, text: &str) -> Digest {
    let mut hasher = Sha256::new();
    if let Some(salt) = salt {
        hasher.update(salt.as_bytes());
    }
    hasher.update(text.as_bytes());
    Digest::new(hex::encode(hasher.finalize()))
}

/// Length-prefixed `field=value` encoding of non-blank values
///
/// An unchecked boolean counts as blank: a checkbox cannot echo Null back.
fn canonical_fields<'a, I>(fields: I) -> String
where
    I: IntoIterator<Item = (&'a str, Option<Value>)>,
{
    let mut out = String::new();
    for (name, value) in fields {
        let Some(value) = value.filter(|v| !v.is_blank() && !matches!(v, Value::Bool(false)))
        else {
            continue;
        };
        let text = value.to_string();
        let _ = write!(out, "{}:{}={}:{};", name.len(), name, text.len(), text);
    }
    out
}

/// Unsalted digest of a row's non-blank writable values
#[must_use]
pub fn input_digest(row: &Row) -> Digest {
    let text = canonical_fields(row.writable().map(|(c, v)| (c.name(), v)));
    hash_text(None, &text)
}

/// Key values joined with `|`; empty when every key value is blank
#[must_use]
pub fn compress_key(key: &KeyValues) -> String {
    if key.iter().all(|(_, v)| v.is_blank()) {
        return String::new();
    }
    key.iter()
        .map(|(_, v)| v.to_string())
        .collect::<Vec<_>>()
        .join(&KEY_SEPARATOR.to_string())
}

/// Split a compressed key back into positional parts
#[must_use]
pub fn split_compressed_key(compressed: &str) -> Vec<&str> {
    compressed.split(KEY_SEPARATOR).collect()
}

/// Compressed key of a row as it travels to the client; empty for new rows
#[must_use]
pub fn row_key_text(row: &Row) -> String {
    if row.is_new() {
        String::new()
    } else {
        compress_key(&row.key_values())
    }
}

/// Base64 key marker for a compressed key
#[must_use]
pub fn encode_key_marker(compressed: &str) -> String {
    STANDARD.encode(compressed.as_bytes())
}

/// Recover a compressed key from its marker
///
/// # Errors
/// `InvalidKeyMarker` when the marker is not base64 or not UTF-8
pub fn decode_key_marker(marker: &str) -> Result<String, IntegrityError> {
    let bytes = STANDARD
        .decode(marker)
        .map_err(|e| IntegrityError::InvalidKeyMarker(e.to_string()))?;
    String::from_utf8(bytes).map_err(|e| IntegrityError::InvalidKeyMarker(e.to_string()))
}

/// Ordered input to a table digest
///
/// Holds every row's compressed key followed by every row's record digest, in
/// row order. Empty entries are dropped before hashing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableMaterial {
    keys: Vec<String>,
    record_digests: Vec<String>,
}

impl TableMaterial {
    /// Material from parallel key and record digest lists
    #[must_use]
    pub fn new(keys: Vec<String>, record_digests: Vec<String>) -> Self {
        Self {
            keys,
            record_digests,
        }
    }

    /// Material for rows as they are (about to be) rendered
    #[must_use]
    pub fn from_rows<'a, I>(rows: I) -> Self
    where
        I: IntoIterator<Item = &'a Row>,
    {
        let mut material = Self::default();
        for row in rows {
            material.push(
                row_key_text(row),
                row.meta()
                    .record_digest
                    .as_ref()
                    .map(|d| d.as_str().to_string())
                    .unwrap_or_default(),
            );
        }
        material
    }

    /// Append one row's entries
    pub fn push(&mut self, key: impl Into<String>, record_digest: impl Into<String>) {
        self.keys.push(key.into());
        self.record_digests.push(record_digest.into());
    }

    /// Number of rows covered
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// No rows covered
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Canonical `|`-joined text
    #[must_use]
    pub fn canonical(&self) -> String {
        self.keys
            .iter()
            .chain(self.record_digests.iter())
            .filter(|s| !s.is_empty())
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(&KEY_SEPARATOR.to_string())
    }
}

/// Salt-bound digest computations for one request
#[derive(Debug, Clone)]
pub struct DigestContext {
    salt: Salt,
}

impl DigestContext {
    /// Context over a known salt
    #[inline]
    #[must_use]
    pub fn new(salt: Salt) -> Self {
        Self { salt }
    }

    /// Context with a fresh random salt
    #[inline]
    #[must_use]
    pub fn fresh(salt_len: usize) -> Self {
        Self::new(Salt::generate(salt_len))
    }

    /// Salt in use
    #[inline]
    #[must_use]
    pub fn salt(&self) -> &Salt {
        &self.salt
    }

    /// Salted digest of all present, non-blank schema values
    #[must_use]
    pub fn record_digest(&self, row: &Row) -> Digest {
        let text = canonical_fields(row.fields().map(|(c, v)| (c.name(), v)));
        hash_text(Some(&self.salt), &text)
    }

    /// Unsalted digest of the writable values
    #[inline]
    #[must_use]
    pub fn input_digest(&self, row: &Row) -> Digest {
        input_digest(row)
    }

    /// Salted digest of table material
    #[must_use]
    pub fn table_digest(&self, material: &TableMaterial) -> Digest {
        hash_text(Some(&self.salt), &material.canonical())
    }

    /// Stamp both digests onto a row read from the store
    pub fn stamp(&self, row: &mut Row) {
        let record = self.record_digest(row);
        let input = input_digest(row);
        let meta = row.meta_mut();
        meta.record_digest = Some(record);
        meta.input_digest = Some(input);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use editgrid_model::{ColumnSchema, ColumnType, TableSchema};
    use proptest::prelude::*;
    use std::sync::Arc;

    fn schema() -> Arc<TableSchema> {
        Arc::new(
            TableSchema::new(
                vec![
                    ColumnSchema::new("id", ColumnType::Integer).read_only(),
                    ColumnSchema::new("name", ColumnType::String),
                    ColumnSchema::new("qty", ColumnType::Integer),
                    ColumnSchema::new("done", ColumnType::Boolean),
                ],
                ["id"],
            )
            .unwrap(),
        )
    }

    fn row(id: i64, name: &str, qty: &str) -> Row {
        let mut row = Row::new(schema());
        row.set("id", id);
        row.set("name", name);
        row.set("qty", qty);
        row.set("done", false);
        row
    }

    #[test]
    fn salt_transport() {
        let salt = Salt::generate(DEFAULT_SALT_LEN);
        assert_eq!(salt.len(), 8);
        assert_eq!(Salt::decode(&salt.encode(), 8), Some(salt.clone()));
        assert_eq!(Salt::decode(&salt.encode(), 16), None);
        assert_eq!(Salt::decode("not base64!", 8), None);
        assert_eq!(Salt::decode_or_fresh("###", 8).len(), 8);
    }

    #[test]
    fn salt_changes_digest() {
        let a = hash_text(Some(&Salt::from_bytes(vec![1; 8])), "x");
        let b = hash_text(Some(&Salt::from_bytes(vec![2; 8])), "x");
        assert_ne!(a, b);
        assert_eq!(a.as_str().len(), 64);
    }

    #[test]
    fn input_digest_ignores_read_only_and_representation() {
        let a = row(1, "a", "3");
        let mut b = row(2, "a", "3");
        assert_eq!(input_digest(&a), input_digest(&b));
        b.set("qty", 3_i64);
        assert_eq!(input_digest(&a), input_digest(&b));
        b.set("name", "b");
        assert_ne!(input_digest(&a), input_digest(&b));
    }

    #[test]
    fn unchecked_boolean_digests_like_missing() {
        let unchecked = row(1, "a", "3");
        let mut missing = row(1, "a", "3");
        missing.set("done", Value::Null);
        assert_eq!(input_digest(&unchecked), input_digest(&missing));

        let ctx = DigestContext::fresh(8);
        assert_eq!(ctx.record_digest(&unchecked), ctx.record_digest(&missing));

        let mut checked = row(1, "a", "3");
        checked.set("done", true);
        assert_ne!(input_digest(&unchecked), input_digest(&checked));
    }

    #[test]
    fn record_digest_covers_all_fields() {
        let ctx = DigestContext::fresh(8);
        let a = row(1, "a", "3");
        let b = row(2, "a", "3");
        assert_ne!(ctx.record_digest(&a), ctx.record_digest(&b));
        assert_eq!(ctx.record_digest(&a), ctx.record_digest(&a.clone()));
    }

    #[test]
    fn field_boundaries_are_unambiguous() {
        let a = row(1, "ab", "");
        let mut b = row(1, "a", "");
        b.set("qty", "b");
        assert_ne!(input_digest(&a), input_digest(&b));
    }

    #[test]
    fn key_markers() {
        let key = KeyValues::new().with("a", 10_i64).with("b", "x");
        let compressed = compress_key(&key);
        assert_eq!(compressed, "10|x");
        let marker = encode_key_marker(&compressed);
        assert_eq!(decode_key_marker(&marker).unwrap(), compressed);
        assert_eq!(split_compressed_key(&compressed), vec!["10", "x"]);
        assert!(matches!(
            decode_key_marker("%%%"),
            Err(IntegrityError::InvalidKeyMarker(_))
        ));
        assert_eq!(compress_key(&KeyValues::new().with("a", "")), "");
        assert_eq!(encode_key_marker(""), "");
    }

    #[test]
    fn table_material_drops_empty_entries() {
        let material = TableMaterial::new(
            vec!["1".into(), String::new()],
            vec!["h1".into(), String::new()],
        );
        assert_eq!(material.canonical(), "1|h1");
        assert_eq!(material.len(), 2);
    }

    #[test]
    fn stamping_sets_both_digests() {
        let ctx = DigestContext::fresh(8);
        let mut r = row(1, "a", "3");
        ctx.stamp(&mut r);
        assert_eq!(r.meta().record_digest, Some(ctx.record_digest(&r)));
        assert_eq!(r.meta().input_digest, Some(input_digest(&r)));
    }

    proptest! {
        #[test]
        fn reordering_rows_changes_table_digest(
            keys in proptest::collection::hash_set("[0-9]{1,6}", 2..8)
        ) {
            let ctx = DigestContext::fresh(8);
            let keys: Vec<String> = keys.into_iter().collect();
            let digests: Vec<String> = keys.iter().map(|k| format!("h{k}")).collect();
            let original = TableMaterial::new(keys.clone(), digests.clone());

            let mut swapped_keys = keys.clone();
            swapped_keys.swap(0, 1);
            let mut swapped_digests = digests.clone();
            swapped_digests.swap(0, 1);
            let swapped = TableMaterial::new(swapped_keys, swapped_digests);

            prop_assert_eq!(
                ctx.table_digest(&original),
                ctx.table_digest(&TableMaterial::new(keys, digests))
            );
            prop_assert_ne!(ctx.table_digest(&original), ctx.table_digest(&swapped));
        }
    }
}
