//! Persisted player identity and the per-session room marker.
//!
//! Identity lives under a durable key and survives restarts. The room marker
//! is scoped to one session (one browser tab in the web client): it records
//! which room this session is sitting in and is cleared when the room view
//! unmounts.

use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex as StdMutex, PoisonError};

use tracing::{debug, warn};

use crate::api::GameApi;
use crate::error::{CaroError, Result};
use crate::protocol::Identity;

/// Durable key holding the serialized [`Identity`].
pub const IDENTITY_KEY: &str = "caro_user";

/// Session-scoped key holding the current room code.
pub const ROOM_MARKER_KEY: &str = "roomId";

/// String key-value storage.
pub trait Storage: Send + Sync {
    /// Read a value. Missing keys yield `Ok(None)`.
    fn get(&self, key: &str) -> Result<Option<String>>;

    fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Remove a value. Removing a missing key is not an error.
    fn remove(&self, key: &str) -> Result<()>;
}

/// One file per key under a directory.
#[derive(Debug, Clone)]
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

impl Storage for FileStorage {
    fn get(&self, key: &str) -> Result<Option<String>> {
        match fs::read_to_string(self.path(key)) {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        fs::write(self.path(key), value)?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        match fs::remove_file(self.path(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Process-local storage. Used for the session marker and in tests.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    values: StdMutex<HashMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn values(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        self.values.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Storage for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.values().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.values().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.values().remove(key);
        Ok(())
    }
}

/// Serialize an identity for storage.
pub fn encode_identity(identity: &Identity) -> Result<String> {
    Ok(serde_json::to_string(identity)?)
}

/// Parse a stored identity. Returns `None` unless both fields are non-empty.
pub fn decode_identity(raw: &str) -> Option<Identity> {
    let identity: Identity = serde_json::from_str(raw).ok()?;
    (!identity.id.trim().is_empty() && !identity.name.trim().is_empty()).then_some(identity)
}

/// The persisted identity, loaded once and cached.
#[derive(Clone)]
pub struct IdentityStore {
    storage: Arc<dyn Storage>,
    current: Option<Identity>,
}

impl IdentityStore {
    /// Load the stored identity.
    ///
    /// A payload that fails to parse or validate is removed and treated as
    /// absent.
    pub fn load(storage: Arc<dyn Storage>) -> Self {
        let current = match storage.get(IDENTITY_KEY) {
            Ok(Some(raw)) => match decode_identity(&raw) {
                Some(identity) => Some(identity),
                None => {
                    warn!("discarding malformed stored identity");
                    if let Err(e) = storage.remove(IDENTITY_KEY) {
                        warn!(error = %e, "failed to remove malformed identity");
                    }
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                warn!(error = %e, "failed to read stored identity");
                None
            }
        };
        Self { storage, current }
    }

    pub fn current(&self) -> Option<&Identity> {
        self.current.as_ref()
    }

    /// The stored identity, required before a room can be opened.
    ///
    /// # Errors
    ///
    /// Returns [`CaroError::IdentityRequired`] if none is stored.
    pub fn require(&self) -> Result<&Identity> {
        self.current.as_ref().ok_or(CaroError::IdentityRequired)
    }

    /// Store `identity`, replacing any previous one.
    pub fn persist(&mut self, identity: Identity) -> Result<()> {
        self.storage.set(IDENTITY_KEY, &encode_identity(&identity)?)?;
        debug!(player = %identity.id, "identity persisted");
        self.current = Some(identity);
        Ok(())
    }

    pub fn clear(&mut self) -> Result<()> {
        self.current = None;
        self.storage.remove(IDENTITY_KEY)
    }

    /// Return the stored identity, registering `name` with the server first
    /// if there is none.
    ///
    /// # Errors
    ///
    /// Returns [`CaroError::InvalidName`] if registration is needed and the
    /// trimmed name is empty, or the server/storage error otherwise. Nothing
    /// is persisted on failure.
    pub async fn ensure<A: GameApi + ?Sized>(&mut self, name: &str, api: &A) -> Result<Identity> {
        if let Some(identity) = &self.current {
            return Ok(identity.clone());
        }
        let name = name.trim();
        if name.is_empty() {
            return Err(CaroError::InvalidName);
        }
        let identity = api.create_identity(name).await?;
        self.persist(identity.clone())?;
        Ok(identity)
    }
}

impl std::fmt::Debug for IdentityStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityStore")
            .field("current", &self.current)
            .finish_non_exhaustive()
    }
}

/// Records the room this session is currently in.
#[derive(Clone)]
pub struct RoomMarker {
    storage: Arc<dyn Storage>,
}

impl RoomMarker {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    /// A marker backed by fresh in-memory storage.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStorage::new()))
    }

    pub fn get(&self) -> Option<String> {
        self.storage.get(ROOM_MARKER_KEY).ok().flatten()
    }

    pub fn set(&self, room_code: &str) {
        if let Err(e) = self.storage.set(ROOM_MARKER_KEY, room_code) {
            warn!(error = %e, "failed to set room marker");
        }
    }

    pub fn clear(&self) {
        if let Err(e) = self.storage.remove(ROOM_MARKER_KEY) {
            warn!(error = %e, "failed to clear room marker");
        }
    }

    /// Clear the marker only if it still names `room_code`.
    pub fn release(&self, room_code: &str) {
        if self.get().as_deref() == Some(room_code) {
            self.clear();
        }
    }
}

impl std::fmt::Debug for RoomMarker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoomMarker")
            .field("room", &self.get())
            .finish()
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use crate::api::HistoryRecord;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Default)]
    struct CountingApi {
        calls: AtomicU32,
        fail: bool,
    }

    #[async_trait]
    impl GameApi for CountingApi {
        async fn create_identity(&self, name: &str) -> Result<Identity> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(CaroError::Http {
                    status: 500,
                    message: "create user failed".into(),
                });
            }
            Ok(Identity::new(format!("id-{n}"), name))
        }

        async fn create_room(&self) -> Result<String> {
            Ok("ROOM01".into())
        }

        async fn fetch_history(&self, _: &str, _: &str) -> Result<HistoryRecord> {
            Err(CaroError::NotConnected)
        }
    }

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("caro-{name}-{}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        dir
    }

    #[test]
    fn decode_rejects_incomplete_payloads() {
        assert_eq!(
            decode_identity(r#"{"id":"u1","name":"Ann"}"#),
            Some(Identity::new("u1", "Ann"))
        );
        assert_eq!(decode_identity(r#"{"id":"","name":"Ann"}"#), None);
        assert_eq!(decode_identity(r#"{"id":"u1"}"#), None);
        assert_eq!(decode_identity("null"), None);
        assert_eq!(decode_identity("{not json"), None);
    }

    #[test]
    fn malformed_identity_is_removed_on_load() {
        let storage = Arc::new(MemoryStorage::new());
        storage.set(IDENTITY_KEY, "{broken").unwrap();

        let store = IdentityStore::load(storage.clone());
        assert!(store.current().is_none());
        assert!(matches!(store.require(), Err(CaroError::IdentityRequired)));
        assert_eq!(storage.get(IDENTITY_KEY).unwrap(), None);
    }

    #[tokio::test]
    async fn ensure_creates_once_and_persists() {
        let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new());
        let api = CountingApi::default();
        let mut store = IdentityStore::load(storage.clone());

        let first = store.ensure("  Ann ", &api).await.unwrap();
        assert_eq!(first.name, "Ann");
        let again = store.ensure("Someone else", &api).await.unwrap();
        assert_eq!(again, first);
        assert_eq!(api.calls.load(Ordering::SeqCst), 1);

        let reloaded = IdentityStore::load(storage);
        assert_eq!(reloaded.current(), Some(&first));
    }

    #[tokio::test]
    async fn ensure_rejects_blank_name_without_calling_server() {
        let api = CountingApi::default();
        let mut store = IdentityStore::load(Arc::new(MemoryStorage::new()));
        let err = store.ensure("   ", &api).await.unwrap_err();
        assert!(matches!(err, CaroError::InvalidName));
        assert_eq!(api.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn failed_registration_persists_nothing() {
        let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new());
        let api = CountingApi {
            fail: true,
            ..CountingApi::default()
        };
        let mut store = IdentityStore::load(storage.clone());
        assert!(store.ensure("Ann", &api).await.is_err());
        assert!(store.current().is_none());
        assert_eq!(storage.get(IDENTITY_KEY).unwrap(), None);
    }

    #[test]
    fn file_storage_round_trips_and_tolerates_missing_keys() {
        let dir = temp_dir("file-storage");
        let storage = FileStorage::new(&dir);

        assert_eq!(storage.get(IDENTITY_KEY).unwrap(), None);
        storage.remove(IDENTITY_KEY).unwrap();

        storage.set(IDENTITY_KEY, r#"{"id":"u1","name":"Ann"}"#).unwrap();
        let store = IdentityStore::load(Arc::new(storage.clone()));
        assert_eq!(store.current(), Some(&Identity::new("u1", "Ann")));

        storage.remove(IDENTITY_KEY).unwrap();
        assert_eq!(storage.get(IDENTITY_KEY).unwrap(), None);
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn room_marker_set_and_clear() {
        let marker = RoomMarker::in_memory();
        assert_eq!(marker.get(), None);
        marker.set("ABC123");
        assert_eq!(marker.get().as_deref(), Some("ABC123"));
        marker.clear();
        marker.clear();
        assert_eq!(marker.get(), None);
    }
}
