//! Integrity token service
//!
//! Issues and verifies the two per-form challenges a grid round-trip carries:
//! a single-use form token and a salted table digest bound to that token.

use crate::digest::{input_digest, DigestContext, Salt, TableMaterial, DEFAULT_SALT_LEN};
use crate::error::IntegrityError;
use crate::session::{FormToken, SessionId, SessionStore, TableDigestEntry};
use editgrid_model::{Digest, Row};
use std::sync::Arc;

/// Default number of previous entries retained per history
pub const DEFAULT_HISTORY_DEPTH: usize = 4;

/// Outcome of a successful table digest verification
#[derive(Debug, Clone)]
pub struct VerifiedTable {
    /// Digest as issued
    pub digest: Digest,
    /// Context over the recovered salt, used for every later record digest
    pub context: DigestContext,
}

/// Token and digest issuer/verifier over a session store
#[derive(Clone)]
pub struct IntegrityService {
    sessions: Arc<dyn SessionStore>,
    history_depth: usize,
    salt_len: usize,
}

impl std::fmt::Debug for IntegrityService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IntegrityService")
            .field("history_depth", &self.history_depth)
            .field("salt_len", &self.salt_len)
            .finish_non_exhaustive()
    }
}

impl IntegrityService {
    /// Service with default depth and salt length
    #[must_use]
    pub fn new(sessions: Arc<dyn SessionStore>) -> Self {
        Self {
            sessions,
            history_depth: DEFAULT_HISTORY_DEPTH,
            salt_len: DEFAULT_SALT_LEN,
        }
    }

    /// Set how many previous tokens/digests stay valid
    #[must_use]
    pub fn with_history_depth(mut self, depth: usize) -> Self {
        self.history_depth = depth;
        self
    }

    /// Set the salt length in bytes
    #[must_use]
    pub fn with_salt_len(mut self, len: usize) -> Self {
        self.salt_len = len;
        self
    }

    /// Configured salt length
    #[inline]
    #[must_use]
    pub fn salt_len(&self) -> usize {
        self.salt_len
    }

    /// Digest context over a fresh salt
    #[inline]
    #[must_use]
    pub fn fresh_context(&self) -> DigestContext {
        DigestContext::fresh(self.salt_len)
    }

    /// Issue a new form token for `form`
    #[must_use]
    pub fn issue_form_token(&self, session: &SessionId, form: &str) -> FormToken {
        let token = FormToken::generate();
        self.sessions
            .push_form_token(session, form, token.clone(), self.history_depth);
        tracing::debug!("Issued form token for {}/{}", session, form);
        token
    }

    /// Check a presented token and consume it on success
    #[must_use]
    pub fn verify_and_consume_form_token(
        &self,
        session: &SessionId,
        form: &str,
        token: &FormToken,
    ) -> bool {
        let ok = self.sessions.consume_form_token(session, form, token);
        if !ok {
            tracing::warn!("Rejected form token for {}/{}", session, form);
        }
        ok
    }

    /// Compute and record the table digest for rows rendered under `token`
    pub fn issue_table_digest(
        &self,
        session: &SessionId,
        form: &str,
        token: &FormToken,
        material: &TableMaterial,
        context: &DigestContext,
    ) -> Digest {
        let digest = context.table_digest(material);
        self.store_table_digest(session, form, token, &digest, context.salt());
        digest
    }

    /// Record an existing digest under a (new) token
    pub fn store_table_digest(
        &self,
        session: &SessionId,
        form: &str,
        token: &FormToken,
        digest: &Digest,
        salt: &Salt,
    ) {
        let entry = TableDigestEntry {
            digest: digest.as_str().to_string(),
            salt: salt.encode(),
        };
        self.sessions
            .push_table_digest(session, form, token.clone(), entry, self.history_depth);
    }

    /// Verify recomputed material against the digest issued with `token`
    ///
    /// The stored entry is consumed whether or not verification succeeds.
    ///
    /// # Errors
    /// - `DigestMissing` when nothing was issued under `token`
    /// - `DigestMismatch` when the recomputed digest differs
    pub fn verify_table_digest(
        &self,
        session: &SessionId,
        form: &str,
        token: &FormToken,
        material: &TableMaterial,
    ) -> Result<VerifiedTable, IntegrityError> {
        let entry = self
            .sessions
            .take_table_digest(session, form, token)
            .ok_or_else(|| {
                tracing::warn!("No table digest on record for {}/{}", session, form);
                IntegrityError::DigestMissing
            })?;

        let context = DigestContext::new(Salt::decode_or_fresh(&entry.salt, self.salt_len));
        let recomputed = context.table_digest(material);
        if recomputed.as_str() != entry.digest {
            tracing::warn!(
                "Table digest mismatch for {}/{} over {} rows",
                session,
                form,
                material.len()
            );
            return Err(IntegrityError::DigestMismatch);
        }

        Ok(VerifiedTable {
            digest: recomputed,
            context,
        })
    }

    /// Recover the salt recorded under `token` without checking any material
    ///
    /// Consumes the stored entry; falls back to a fresh salt when none exists.
    #[must_use]
    pub fn recover_context(
        &self,
        session: &SessionId,
        form: &str,
        token: &FormToken,
    ) -> DigestContext {
        match self.sessions.take_table_digest(session, form, token) {
            Some(entry) => DigestContext::new(Salt::decode_or_fresh(&entry.salt, self.salt_len)),
            None => {
                tracing::debug!("No salt on record for {}/{}, using a fresh one", session, form);
                self.fresh_context()
            }
        }
    }

    /// Unsalted digest of a row's editable content
    #[inline]
    #[must_use]
    pub fn compute_input_digest(&self, row: &Row) -> Digest {
        input_digest(row)
    }

    /// Salted digest of a row's full content
    #[inline]
    #[must_use]
    pub fn compute_record_digest(&self, context: &DigestContext, row: &Row) -> Digest {
        context.record_digest(row)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::InMemorySessionStore;

    fn service() -> IntegrityService {
        IntegrityService::new(Arc::new(InMemorySessionStore::new()))
    }

    fn material(keys: &[&str]) -> TableMaterial {
        TableMaterial::new(
            keys.iter().map(|k| (*k).to_string()).collect(),
            keys.iter().map(|k| format!("rec{k}")).collect(),
        )
    }

    #[test]
    fn token_verifies_at_most_once() {
        let svc = service();
        let s = SessionId::new("s");
        let token = svc.issue_form_token(&s, "tb_items");
        assert!(svc.verify_and_consume_form_token(&s, "tb_items", &token));
        assert!(!svc.verify_and_consume_form_token(&s, "tb_items", &token));
        assert!(!svc.verify_and_consume_form_token(&s, "tb_items", &FormToken::new("forged")));
    }

    #[test]
    fn history_keeps_last_four_plus_newest() {
        let svc = service();
        let s = SessionId::new("s");
        let tokens: Vec<FormToken> = (0..6).map(|_| svc.issue_form_token(&s, "f")).collect();
        assert!(!svc.verify_and_consume_form_token(&s, "f", &tokens[0]));
        for token in &tokens[1..] {
            assert!(svc.verify_and_consume_form_token(&s, "f", token));
        }
    }

    #[test]
    fn table_digest_round_trip() {
        let svc = service();
        let s = SessionId::new("s");
        let token = svc.issue_form_token(&s, "f");
        let ctx = svc.fresh_context();
        let issued = svc.issue_table_digest(&s, "f", &token, &material(&["1", "2"]), &ctx);

        let verified = svc
            .verify_table_digest(&s, "f", &token, &material(&["1", "2"]))
            .unwrap();
        assert_eq!(verified.digest, issued);
        assert_eq!(verified.context.salt(), ctx.salt());

        assert_eq!(
            svc.verify_table_digest(&s, "f", &token, &material(&["1", "2"]))
                .unwrap_err(),
            IntegrityError::DigestMissing
        );
    }

    #[test]
    fn reordered_material_is_rejected() {
        let svc = service();
        let s = SessionId::new("s");
        let token = svc.issue_form_token(&s, "f");
        let ctx = svc.fresh_context();
        svc.issue_table_digest(&s, "f", &token, &material(&["1", "2"]), &ctx);
        assert_eq!(
            svc.verify_table_digest(&s, "f", &token, &material(&["2", "1"]))
                .unwrap_err(),
            IntegrityError::DigestMismatch
        );
    }

    #[test]
    fn restored_digest_verifies_under_new_token() {
        let svc = service();
        let s = SessionId::new("s");
        let first = svc.issue_form_token(&s, "f");
        let ctx = svc.fresh_context();
        let digest = svc.issue_table_digest(&s, "f", &first, &material(&["7"]), &ctx);
        let verified = svc
            .verify_table_digest(&s, "f", &first, &material(&["7"]))
            .unwrap();

        let second = svc.issue_form_token(&s, "f");
        svc.store_table_digest(&s, "f", &second, &digest, verified.context.salt());
        assert!(svc
            .verify_table_digest(&s, "f", &second, &material(&["7"]))
            .is_ok());
    }
}
