//! editgrid integrity - anti-replay tokens and content digests
//!
//! A rendered grid carries two challenges back to the server:
//! - a single-use [`FormToken`], recorded per session and form in a bounded history
//! - a salted table digest over the rows' keys and record digests, stored under that token
//!
//! Both are checked and consumed through an [`IntegrityService`] backed by a
//! [`SessionStore`].

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod digest;
pub mod error;
pub mod history;
pub mod service;
pub mod session;

pub use digest::{
    compress_key, decode_key_marker, encode_key_marker, hash_text, input_digest, row_key_text,
    split_compressed_key, DigestContext, Salt, TableMaterial, DEFAULT_SALT_LEN, KEY_SEPARATOR,
};
pub use error::IntegrityError;
pub use history::BoundedHistory;
pub use service::{IntegrityService, VerifiedTable, DEFAULT_HISTORY_DEPTH};
pub use session::{FormToken, InMemorySessionStore, SessionId, SessionStore, TableDigestEntry};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
