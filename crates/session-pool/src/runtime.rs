//! Runtime connection abstraction
//!
//! Decouples the pool from the remote service's wire protocol. The pool
//! only needs three things from a live connection: a cheap liveness flag,
//! a bounded health probe, and teardown. `SessionConnector` turns a stored
//! credential blob into such a connection.
//!
//! Uses `Pin<Box<dyn Future>>` return types for dyn-compatibility
//! (`Arc<dyn SessionClient>`, `Arc<dyn SessionConnector>`).

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::error::Result;

/// A live connection to the remote service.
pub trait SessionClient: Send + Sync {
    /// Cheap liveness flag, no I/O. `false` means the connection is
    /// definitively dead; `true` may still be a stale half-open link,
    /// which the bounded `ping` disambiguates.
    fn is_connected(&self) -> bool;

    /// One health probe against the remote service. Callers bound this
    /// with a timeout; the implementation doesn't need its own.
    fn ping(&self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;

    /// Tear the connection down. Infallible by contract — a connection
    /// that fails to close cleanly is simply dropped.
    fn disconnect(&self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>>;
}

/// Opens live connections from stored credentials.
pub trait SessionConnector: Send + Sync {
    /// Start a connection for `session_id` using its credential blob.
    /// `device_label` is a cosmetic runtime hint, not part of identity.
    fn connect<'a>(
        &'a self,
        session_id: &'a str,
        credential: &'a str,
        device_label: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Arc<dyn SessionClient>>> + Send + 'a>>;
}
