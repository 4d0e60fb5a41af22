use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

#[cfg(target_arch = "wasm32")]
use gloo_storage::{LocalStorage, Storage};

const SETTINGS_KEY: &str = "stemstore.playback_settings";
#[cfg(target_arch = "wasm32")]
const LOCAL_STORAGE_PREFIX: &str = "stemstore.";

/// Error type for durable key-value operations
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("storage backend error: {0}")]
    Backend(String),
    #[error("failed to serialize stored value: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl StoreError {
    pub fn backend(msg: impl Into<String>) -> Self {
        Self::Backend(msg.into())
    }
}

/// Durable string key-value storage. Reads never fail loudly: a missing or
/// unreadable key is `None`.
pub trait KeyValueStore {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;
    fn remove(&self, key: &str) -> Result<(), StoreError>;
}

/// Process-local store used by tests and as a fallback when durable storage
/// is unavailable.
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: RefCell<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.values.borrow().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.values
            .borrow_mut()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.values.borrow_mut().remove(key);
        Ok(())
    }
}

/// Browser localStorage, namespaced under `stemstore.`.
#[cfg(target_arch = "wasm32")]
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalStorageStore;

#[cfg(target_arch = "wasm32")]
impl LocalStorageStore {
    fn namespaced(key: &str) -> String {
        if key.starts_with(LOCAL_STORAGE_PREFIX) {
            key.to_string()
        } else {
            format!("{LOCAL_STORAGE_PREFIX}{key}")
        }
    }
}

#[cfg(target_arch = "wasm32")]
impl KeyValueStore for LocalStorageStore {
    fn get(&self, key: &str) -> Option<String> {
        LocalStorage::raw()
            .get_item(&Self::namespaced(key))
            .ok()
            .flatten()
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        LocalStorage::raw()
            .set_item(&Self::namespaced(key), value)
            .map_err(|e| StoreError::backend(format!("{e:?}")))
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        LocalStorage::raw()
            .remove_item(&Self::namespaced(key))
            .map_err(|e| StoreError::backend(format!("{e:?}")))
    }
}

/// SQLite-backed store for native builds.
#[cfg(not(target_arch = "wasm32"))]
pub struct SqliteStore {
    conn: rusqlite::Connection,
}

#[cfg(not(target_arch = "wasm32"))]
impl SqliteStore {
    pub fn open_default() -> Result<Self, StoreError> {
        let data_dir = data_dir().unwrap_or_else(|| std::path::PathBuf::from("."));
        let db_path = data_dir.join("stemstore.db");
        let conn = rusqlite::Connection::open(&db_path)
            .map_err(|e| StoreError::backend(format!("Failed to open database: {}", e)))?;
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = rusqlite::Connection::open_in_memory()
            .map_err(|e| StoreError::backend(e.to_string()))?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: rusqlite::Connection) -> Result<Self, StoreError> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS kv (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            )",
            [],
        )
        .map_err(|e| StoreError::backend(e.to_string()))?;
        Ok(Self { conn })
    }
}

#[cfg(not(target_arch = "wasm32"))]
impl KeyValueStore for SqliteStore {
    fn get(&self, key: &str) -> Option<String> {
        use rusqlite::OptionalExtension;

        self.conn
            .query_row(
                "SELECT value FROM kv WHERE key = ?1",
                [key],
                |row: &rusqlite::Row| row.get(0),
            )
            .optional()
            .unwrap_or_else(|err| {
                tracing::warn!(target: "stemstore::db", "failed to read {key}: {err}");
                None
            })
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.conn
            .execute(
                "INSERT OR REPLACE INTO kv (key, value) VALUES (?1, ?2)",
                [key, value],
            )
            .map_err(|e| StoreError::backend(e.to_string()))?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.conn
            .execute("DELETE FROM kv WHERE key = ?1", [key])
            .map_err(|e| StoreError::backend(e.to_string()))?;
        Ok(())
    }
}

#[cfg(not(target_arch = "wasm32"))]
fn data_dir() -> Option<std::path::PathBuf> {
    let dir = dirs::data_dir()?.join("stemstore");
    std::fs::create_dir_all(&dir).ok()?;
    Some(dir)
}

/// The platform's durable store, falling back to memory when it cannot open.
#[cfg(target_arch = "wasm32")]
pub fn open_default_store() -> Rc<dyn KeyValueStore> {
    Rc::new(LocalStorageStore)
}

#[cfg(not(target_arch = "wasm32"))]
pub fn open_default_store() -> Rc<dyn KeyValueStore> {
    match SqliteStore::open_default() {
        Ok(store) => Rc::new(store),
        Err(err) => {
            tracing::warn!(target: "stemstore::db", "durable storage unavailable, using memory: {err}");
            Rc::new(MemoryStore::new())
        }
    }
}

/// Playback and media-resolution settings stored in the key-value store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaybackSettings {
    #[serde(default)]
    pub content_api_base: String,
    #[serde(default)]
    pub content_api_token: Option<String>,
    /// Base used to absolutize relative upload URLs and build guessed paths.
    #[serde(default)]
    pub media_base: String,
    /// Storage-origin URL prefixes that must be rewritten to `cdn_base`.
    #[serde(default)]
    pub storage_origins: Vec<String>,
    #[serde(default)]
    pub cdn_base: String,
    #[serde(default = "default_upload_paths")]
    pub upload_paths: Vec<String>,
    /// Per-deployment prefixes for `tracks/{prefix}/stems/...` CDN paths.
    #[serde(default)]
    pub cdn_prefixes: Vec<String>,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u32,
    #[serde(default = "default_probe_timeout_secs")]
    pub probe_timeout_secs: u32,
    #[serde(default = "default_suppression_window_ms")]
    pub suppression_window_ms: u32,
    #[serde(default = "default_time_update_interval_ms")]
    pub time_update_interval_ms: u32,
    #[serde(default = "default_seek_step_secs")]
    pub seek_step_secs: f64,
    #[serde(default)]
    pub simulate_missing_media: bool,
    #[serde(default = "default_cache_storage_key")]
    pub cache_storage_key: String,
    #[serde(default)]
    pub featured_track: Option<String>,
}

fn default_upload_paths() -> Vec<String> {
    vec!["uploads".to_string()]
}

fn default_request_timeout_secs() -> u32 {
    4
}

fn default_probe_timeout_secs() -> u32 {
    3
}

fn default_suppression_window_ms() -> u32 {
    1000
}

fn default_time_update_interval_ms() -> u32 {
    250
}

fn default_seek_step_secs() -> f64 {
    5.0
}

fn default_cache_storage_key() -> String {
    "stemUrlCache".to_string()
}

impl Default for PlaybackSettings {
    fn default() -> Self {
        Self {
            content_api_base: String::new(),
            content_api_token: None,
            media_base: String::new(),
            storage_origins: Vec::new(),
            cdn_base: String::new(),
            upload_paths: default_upload_paths(),
            cdn_prefixes: Vec::new(),
            request_timeout_secs: default_request_timeout_secs(),
            probe_timeout_secs: default_probe_timeout_secs(),
            suppression_window_ms: default_suppression_window_ms(),
            time_update_interval_ms: default_time_update_interval_ms(),
            seek_step_secs: default_seek_step_secs(),
            simulate_missing_media: false,
            cache_storage_key: default_cache_storage_key(),
            featured_track: None,
        }
    }
}

impl PlaybackSettings {
    /// Clamp numeric fields into usable ranges and tidy URL bases.
    pub fn normalized(mut self) -> Self {
        self.content_api_base = self.content_api_base.trim().trim_end_matches('/').to_string();
        self.media_base = self.media_base.trim().trim_end_matches('/').to_string();
        self.cdn_base = self.cdn_base.trim().trim_end_matches('/').to_string();
        if self.media_base.is_empty() {
            self.media_base = self.content_api_base.clone();
        }
        self.storage_origins = self
            .storage_origins
            .into_iter()
            .map(|origin| origin.trim().trim_end_matches('/').to_string())
            .filter(|origin| !origin.is_empty())
            .collect();
        self.upload_paths = self
            .upload_paths
            .into_iter()
            .map(|path| path.trim().trim_matches('/').to_string())
            .filter(|path| !path.is_empty())
            .collect();
        self.cdn_prefixes = self
            .cdn_prefixes
            .into_iter()
            .map(|prefix| prefix.trim().trim_matches('/').to_string())
            .filter(|prefix| !prefix.is_empty())
            .collect();
        self.request_timeout_secs = self.request_timeout_secs.clamp(1, 30);
        self.probe_timeout_secs = self.probe_timeout_secs.clamp(1, 30);
        self.suppression_window_ms = self.suppression_window_ms.min(10_000);
        self.time_update_interval_ms = self.time_update_interval_ms.clamp(50, 2000);
        if !self.seek_step_secs.is_finite() || self.seek_step_secs <= 0.0 {
            self.seek_step_secs = default_seek_step_secs();
        }
        if self.cache_storage_key.trim().is_empty() {
            self.cache_storage_key = default_cache_storage_key();
        }
        self
    }
}

pub fn load_settings(store: &dyn KeyValueStore) -> PlaybackSettings {
    let settings = match store.get(SETTINGS_KEY) {
        Some(json) => serde_json::from_str::<PlaybackSettings>(&json).unwrap_or_else(|err| {
            tracing::warn!(target: "stemstore::db", "ignoring malformed settings: {err}");
            PlaybackSettings::default()
        }),
        None => PlaybackSettings::default(),
    };
    settings.normalized()
}

pub fn save_settings(
    store: &dyn KeyValueStore,
    settings: &PlaybackSettings,
) -> Result<(), StoreError> {
    let json = serde_json::to_string(settings)?;
    store.set(SETTINGS_KEY, &json)
}
