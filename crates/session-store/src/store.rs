//! Session record storage
//!
//! Manages a JSON file mapping session IDs to records. All writes use
//! atomic temp-file + rename to prevent corruption on crash. A tokio Mutex
//! serializes concurrent writes from the pool facade and any admin surface.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::{Error, Result};

/// A single session's persisted record.
///
/// `credential` is an opaque blob; this crate never interprets it. The
/// `artifacts` manifest lists every on-disk path created for this session,
/// recorded at write time so removal can delete exactly those paths.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    /// Opaque credential blob used to open a live connection
    pub credential: String,
    /// Cosmetic device/runtime label shown in diagnostics
    pub device_label: String,
    /// Soft-delete flag; inactive records are invisible to `find_active`
    pub active: bool,
    /// Manifest of on-disk artifact paths belonging to this session
    #[serde(default)]
    pub artifacts: Vec<PathBuf>,
}

/// Thread-safe session record file manager.
///
/// The Mutex serializes all writes. Reads acquire the lock briefly to clone
/// the in-memory state, so pool-side reads don't block on concurrent writes.
pub struct SessionStore {
    path: PathBuf,
    state: Mutex<HashMap<String, SessionRecord>>,
}

impl SessionStore {
    /// Load session records from the given file path.
    ///
    /// If the file doesn't exist, creates it as `{}` (cold start with zero
    /// sessions). The pool will report `unhealthy` until sessions are added.
    pub async fn load(path: PathBuf) -> Result<Self> {
        let state = if path.exists() {
            let contents = tokio::fs::read_to_string(&path)
                .await
                .map_err(|e| Error::Io(format!("reading session file: {e}")))?;
            let records: HashMap<String, SessionRecord> = serde_json::from_str(&contents)
                .map_err(|e| Error::Parse(format!("parsing session file: {e}")))?;
            info!(path = %path.display(), sessions = records.len(), "loaded session records");
            records
        } else {
            info!(path = %path.display(), "session file not found, starting with empty store");
            let records = HashMap::new();
            // Create the empty file so future loads don't need the cold-start path
            write_atomic(&path, &records).await?;
            records
        };

        Ok(Self {
            path,
            state: Mutex::new(state),
        })
    }

    /// Get a clone of a specific record.
    pub async fn find_one(&self, session_id: &str) -> Option<SessionRecord> {
        let state = self.state.lock().await;
        state.get(session_id).cloned()
    }

    /// All records with `active = true`, with their IDs.
    pub async fn find_active(&self) -> Vec<(String, SessionRecord)> {
        let state = self.state.lock().await;
        state
            .iter()
            .filter(|(_, r)| r.active)
            .map(|(id, r)| (id.clone(), r.clone()))
            .collect()
    }

    /// List all session IDs, active or not.
    pub async fn session_ids(&self) -> Vec<String> {
        let state = self.state.lock().await;
        state.keys().cloned().collect()
    }

    /// Insert or replace a record and persist to disk.
    ///
    /// An existing record's artifact manifest is preserved across upsert so
    /// re-registering a session doesn't orphan its earlier artifacts.
    pub async fn upsert(
        &self,
        session_id: &str,
        credential: &str,
        device_label: &str,
        active: bool,
    ) -> Result<()> {
        let mut state = self.state.lock().await;
        let artifacts = state
            .get(session_id)
            .map(|r| r.artifacts.clone())
            .unwrap_or_default();
        state.insert(
            session_id.to_string(),
            SessionRecord {
                credential: credential.to_string(),
                device_label: device_label.to_string(),
                active,
                artifacts,
            },
        );
        debug!(session_id, "upserted session record");
        write_atomic(&self.path, &state).await
    }

    /// Soft-delete a record and persist to disk.
    ///
    /// Returns an error if the session doesn't exist.
    pub async fn mark_inactive(&self, session_id: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        let record = state
            .get_mut(session_id)
            .ok_or_else(|| Error::NotFound(format!("session {session_id} not in store")))?;
        record.active = false;
        debug!(session_id, "marked session inactive");
        write_atomic(&self.path, &state).await
    }

    /// Append a path to a session's artifact manifest and persist.
    ///
    /// Returns an error if the session doesn't exist.
    pub async fn record_artifact(&self, session_id: &str, artifact: PathBuf) -> Result<()> {
        let mut state = self.state.lock().await;
        let record = state
            .get_mut(session_id)
            .ok_or_else(|| Error::NotFound(format!("session {session_id} not in store")))?;
        if !record.artifacts.contains(&artifact) {
            record.artifacts.push(artifact);
        }
        debug!(session_id, "recorded session artifact");
        write_atomic(&self.path, &state).await
    }

    /// Snapshot of a session's artifact manifest, empty if the session is unknown.
    pub async fn artifacts(&self, session_id: &str) -> Vec<PathBuf> {
        let state = self.state.lock().await;
        state
            .get(session_id)
            .map(|r| r.artifacts.clone())
            .unwrap_or_default()
    }

    /// Number of stored records.
    pub async fn len(&self) -> usize {
        let state = self.state.lock().await;
        state.len()
    }

    /// Whether the store is empty.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

/// Write session records to a file atomically.
///
/// Writes to a temporary file in the same directory, then renames it over
/// the target. This prevents corruption if the process crashes mid-write.
/// Sets file permissions to 0600 (owner read/write only) since the file
/// contains credential blobs.
async fn write_atomic(path: &Path, data: &HashMap<String, SessionRecord>) -> Result<()> {
    let json = serde_json::to_string_pretty(data)
        .map_err(|e| Error::Parse(format!("serializing session records: {e}")))?;

    let dir = path
        .parent()
        .ok_or_else(|| Error::Io("session file path has no parent directory".into()))?;

    let tmp_path = dir.join(format!(".sessions.tmp.{}", std::process::id()));

    tokio::fs::write(&tmp_path, json.as_bytes())
        .await
        .map_err(|e| Error::Io(format!("writing temp session file: {e}")))?;

    // Set 0600 permissions (unix only)
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        tokio::fs::set_permissions(&tmp_path, perms)
            .await
            .map_err(|e| Error::Io(format!("setting session file permissions: {e}")))?;
    }

    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|e| Error::Io(format!("renaming temp session file: {e}")))?;

    debug!(path = %path.display(), "persisted session records");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn roundtrip_save_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sessions.json");

        let store = SessionStore::load(path.clone()).await.unwrap();
        store
            .upsert("worker-1", "blob_1", "desktop", true)
            .await
            .unwrap();

        // Load into a new store instance
        let store2 = SessionStore::load(path).await.unwrap();
        let record = store2.find_one("worker-1").await.unwrap();
        assert_eq!(record.credential, "blob_1");
        assert_eq!(record.device_label, "desktop");
        assert!(record.active);
        assert!(record.artifacts.is_empty());
    }

    #[tokio::test]
    async fn cold_start_creates_empty_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sessions.json");

        assert!(!path.exists());
        let store = SessionStore::load(path.clone()).await.unwrap();
        assert!(store.is_empty().await);
        assert!(path.exists());

        let contents = tokio::fs::read_to_string(&path).await.unwrap();
        let parsed: HashMap<String, SessionRecord> = serde_json::from_str(&contents).unwrap();
        assert!(parsed.is_empty());
    }

    #[tokio::test]
    async fn find_active_filters_inactive_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sessions.json");

        let store = SessionStore::load(path).await.unwrap();
        store.upsert("s1", "b1", "d1", true).await.unwrap();
        store.upsert("s2", "b2", "d2", true).await.unwrap();
        store.mark_inactive("s2").await.unwrap();

        let active = store.find_active().await;
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].0, "s1");

        // The inactive record still exists (soft delete)
        assert_eq!(store.len().await, 2);
        assert!(!store.find_one("s2").await.unwrap().active);
    }

    #[tokio::test]
    async fn mark_inactive_unknown_session_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sessions.json");

        let store = SessionStore::load(path).await.unwrap();
        let result = store.mark_inactive("ghost").await;
        assert!(matches!(result, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn upsert_preserves_artifact_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sessions.json");

        let store = SessionStore::load(path).await.unwrap();
        store.upsert("s1", "b1", "d1", true).await.unwrap();
        store
            .record_artifact("s1", PathBuf::from("/var/lib/sessions/s1.session"))
            .await
            .unwrap();

        // Re-register with a new credential; manifest must survive
        store.upsert("s1", "b1_new", "d1", true).await.unwrap();
        let record = store.find_one("s1").await.unwrap();
        assert_eq!(record.credential, "b1_new");
        assert_eq!(
            record.artifacts,
            vec![PathBuf::from("/var/lib/sessions/s1.session")]
        );
    }

    #[tokio::test]
    async fn record_artifact_dedupes_and_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sessions.json");

        let store = SessionStore::load(path.clone()).await.unwrap();
        store.upsert("s1", "b1", "d1", true).await.unwrap();
        let artifact = PathBuf::from("/tmp/s1.bin");
        store.record_artifact("s1", artifact.clone()).await.unwrap();
        store.record_artifact("s1", artifact.clone()).await.unwrap();

        assert_eq!(store.artifacts("s1").await, vec![artifact.clone()]);

        // Manifest survives a reload
        let store2 = SessionStore::load(path).await.unwrap();
        assert_eq!(store2.artifacts("s1").await, vec![artifact]);
    }

    #[tokio::test]
    async fn record_artifact_unknown_session_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sessions.json");

        let store = SessionStore::load(path).await.unwrap();
        let result = store
            .record_artifact("ghost", PathBuf::from("/tmp/x"))
            .await;
        assert!(matches!(result, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn artifacts_unknown_session_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sessions.json");

        let store = SessionStore::load(path).await.unwrap();
        assert!(store.artifacts("ghost").await.is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn file_permissions_are_0600() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sessions.json");

        let store = SessionStore::load(path.clone()).await.unwrap();
        store.upsert("s1", "b1", "d1", true).await.unwrap();

        let metadata = tokio::fs::metadata(&path).await.unwrap();
        let mode = metadata.permissions().mode() & 0o777;
        assert_eq!(mode, 0o600, "session file must be 0600, got {mode:o}");
    }

    #[tokio::test]
    async fn concurrent_writes_dont_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sessions.json");
        let store = std::sync::Arc::new(SessionStore::load(path.clone()).await.unwrap());

        let mut handles = vec![];
        for i in 0..10 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .upsert(&format!("s-{i}"), &format!("b-{i}"), "d", true)
                    .await
                    .unwrap();
            }));
        }

        for h in handles {
            h.await.unwrap();
        }

        assert_eq!(store.len().await, 10);

        // File should be valid JSON with all records
        let contents = tokio::fs::read_to_string(&path).await.unwrap();
        let parsed: HashMap<String, SessionRecord> = serde_json::from_str(&contents).unwrap();
        assert_eq!(parsed.len(), 10);
    }
}
