//! Durable session records for the session pool
//!
//! Manages a JSON file mapping session IDs to credential records. The file
//! is the single source of truth for session identity; the pool reads
//! records at connect time and never caches credentials itself.
//!
//! Records are soft-deleted: `mark_inactive` flips the `active` flag rather
//! than dropping the entry, so a removed session's credential history stays
//! auditable. Each record also carries an artifact manifest — the exact
//! on-disk paths created for the session — so removal deletes precisely
//! what was written instead of pattern-matching filenames.

pub mod error;
pub mod store;

pub use error::{Error, Result};
pub use store::{SessionRecord, SessionStore};
