//! Per-session token state
//!
//! Each session holds, per form name, two bounded histories: issued form
//! tokens and issued table digests keyed by the token they were issued with.
//! Check-and-remove on either history happens under one per-session lock.

use crate::history::BoundedHistory;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt::{self, Display, Formatter};
use std::sync::Arc;

/// Opaque session identifier supplied by the host application
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Wrap a host session id
    #[inline]
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Random session id
    #[inline]
    #[must_use]
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Borrow the id
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for SessionId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Single-use anti-replay token
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FormToken(String);

impl FormToken {
    /// Fresh random (UUID v4) token
    #[inline]
    #[must_use]
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Token as presented by a client
    #[inline]
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Borrow the token text
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for FormToken {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Issued table digest with the salt it was computed under
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDigestEntry {
    /// Hex digest
    pub digest: String,
    /// Base64 salt
    pub salt: String,
}

/// Session-scoped storage for issued tokens and table digests
///
/// Implementations must make each push and each check-and-remove atomic with
/// respect to other calls on the same session.
pub trait SessionStore: Send + Sync {
    /// Record an issued form token
    fn push_form_token(&self, session: &SessionId, form: &str, token: FormToken, depth: usize);

    /// Remove `token` from the form's history, reporting whether it was present
    fn consume_form_token(&self, session: &SessionId, form: &str, token: &FormToken) -> bool;

    /// Record a table digest issued alongside `token`
    fn push_table_digest(
        &self,
        session: &SessionId,
        form: &str,
        token: FormToken,
        entry: TableDigestEntry,
        depth: usize,
    );

    /// Remove and return the table digest issued alongside `token`
    fn take_table_digest(
        &self,
        session: &SessionId,
        form: &str,
        token: &FormToken,
    ) -> Option<TableDigestEntry>;
}

#[derive(Debug, Default)]
struct FormHistories {
    tokens: BoundedHistory<FormToken>,
    digests: BoundedHistory<(FormToken, TableDigestEntry)>,
}

#[derive(Debug, Default)]
struct SessionTokenState {
    forms: HashMap<String, FormHistories>,
}

impl SessionTokenState {
    fn form(&mut self, form: &str) -> &mut FormHistories {
        self.forms.entry(form.to_string()).or_default()
    }
}

/// In-process session store
///
/// Sessions live in a `DashMap`; each session's histories sit behind their
/// own mutex so independent sessions never contend.
#[derive(Debug, Default)]
pub struct InMemorySessionStore {
    sessions: DashMap<SessionId, Arc<Mutex<SessionTokenState>>>,
}

impl InMemorySessionStore {
    /// Create an empty store
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of sessions with recorded state
    #[inline]
    #[must_use]
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Number of live form tokens for one session and form
    #[must_use]
    pub fn live_tokens(&self, session: &SessionId, form: &str) -> usize {
        self.sessions.get(session).map_or(0, |state| {
            state.lock().forms.get(form).map_or(0, |f| f.tokens.len())
        })
    }

    /// Forget all state of a session
    pub fn clear_session(&self, session: &SessionId) {
        self.sessions.remove(session);
    }

    fn state(&self, session: &SessionId) -> Arc<Mutex<SessionTokenState>> {
        Arc::clone(self.sessions.entry(session.clone()).or_default().value())
    }

    fn existing(&self, session: &SessionId) -> Option<Arc<Mutex<SessionTokenState>>> {
        self.sessions.get(session).map(|state| Arc::clone(state.value()))
    }
}

impl SessionStore for InMemorySessionStore {
    fn push_form_token(&self, session: &SessionId, form: &str, token: FormToken, depth: usize) {
        let state = self.state(session);
        let mut state = state.lock();
        let histories = state.form(form);
        histories.tokens.set_depth(depth);
        histories.tokens.push(token);
    }

    fn consume_form_token(&self, session: &SessionId, form: &str, token: &FormToken) -> bool {
        let Some(state) = self.existing(session) else {
            return false;
        };
        let mut state = state.lock();
        state
            .forms
            .get_mut(form)
            .and_then(|f| f.tokens.take_where(|t| t == token))
            .is_some()
    }

    fn push_table_digest(
        &self,
        session: &SessionId,
        form: &str,
        token: FormToken,
        entry: TableDigestEntry,
        depth: usize,
    ) {
        let state = self.state(session);
        let mut state = state.lock();
        let histories = state.form(form);
        histories.digests.set_depth(depth);
        histories.digests.push((token, entry));
    }

    fn take_table_digest(
        &self,
        session: &SessionId,
        form: &str,
        token: &FormToken,
    ) -> Option<TableDigestEntry> {
        let state = self.existing(session)?;
        let mut state = state.lock();
        state
            .forms
            .get_mut(form)?
            .digests
            .take_where(|(t, _)| t == token)
            .map(|(_, entry)| entry)
    }
}
