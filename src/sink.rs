//! Downstream persistence interface.
//!
//! The concrete sink (file, database, columnar store) is another system's
//! problem; this crate only needs the three operations the orchestrator
//! drives it through.

use async_trait::async_trait;

use crate::error::SyncError;
use crate::model::CanonicalRecord;

/// Capability the orchestrator writes records and bookmarks through.
///
/// Expected to be idempotent on repeated writes of records sharing a line
/// item identifier — the orchestrator relies on that property to make
/// re-fetching a window after a bookmark-write failure safe.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Sink: Send + Sync {
    /// Persist `records`. Called at most once per executed range.
    async fn write(&self, records: &[CanonicalRecord]) -> Result<(), SyncError>;

    /// Read the persisted bookmark instant for `key`, if any.
    ///
    /// Absence (no prior bookmark) is `Ok(None)`, not an error.
    async fn get_bookmark(&self, key: &str) -> Result<Option<String>, SyncError>;

    /// Persist the bookmark `value` (an RFC3339 instant) under `key`.
    async fn set_bookmark(&self, key: &str, value: &str) -> Result<(), SyncError>;
}
