//! Key/value store abstraction and the typed game helpers built on it.

use async_trait::async_trait;
use serde_json::Value;
use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, Ordering},
    },
};
use tokio::sync::RwLock;

use super::{StoreError, StoreResult};
use crate::game::{Game, GameRecord, RoomId};

const GAME_PREFIX: &str = "game:";
const AUTO_REPEAT_PREFIX: &str = "auto_repeat:";

/// Durable JSON key/value storage plus an append-only history.
#[async_trait]
pub trait Store: Send + Sync {
    async fn get(&self, key: &str) -> StoreResult<Option<Value>>;

    /// Insert or replace the value under `key`.
    async fn put(&self, key: &str, value: Value) -> StoreResult<()>;

    /// Remove `key`. Returns whether it existed.
    async fn delete(&self, key: &str) -> StoreResult<bool>;

    /// Append a finished round to the history.
    async fn archive(&self, record: &GameRecord) -> StoreResult<()>;

    /// All keys starting with `prefix`.
    async fn keys(&self, prefix: &str) -> StoreResult<Vec<String>>;
}

/// In-process store used for development and tests.
#[derive(Default)]
pub struct MemoryStore {
    values: RwLock<HashMap<String, Value>>,
    history: RwLock<Vec<GameRecord>>,
    unavailable: AtomicBool,
    failing_prefix: Mutex<Option<String>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following call fail until switched back.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Fail reads and writes of keys starting with `prefix`. `None` heals.
    pub fn fail_keys_with_prefix(&self, prefix: Option<&str>) {
        *self
            .failing_prefix
            .lock()
            .unwrap_or_else(|e| e.into_inner()) = prefix.map(str::to_string);
    }

    /// Archived rounds, oldest first.
    pub async fn history(&self) -> Vec<GameRecord> {
        self.history.read().await.clone()
    }

    fn check(&self) -> StoreResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory store switched off".into()));
        }
        Ok(())
    }

    fn check_key(&self, key: &str) -> StoreResult<()> {
        self.check()?;
        let failing = self.failing_prefix.lock().unwrap_or_else(|e| e.into_inner());
        match failing.as_deref() {
            Some(prefix) if key.starts_with(prefix) => {
                Err(StoreError::Unavailable(format!("key {key} switched off")))
            }
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get(&self, key: &str) -> StoreResult<Option<Value>> {
        self.check_key(key)?;
        Ok(self.values.read().await.get(key).cloned())
    }

    async fn put(&self, key: &str, value: Value) -> StoreResult<()> {
        self.check_key(key)?;
        self.values.write().await.insert(key.to_string(), value);
        Ok(())
    }

    async fn delete(&self, key: &str) -> StoreResult<bool> {
        self.check_key(key)?;
        Ok(self.values.write().await.remove(key).is_some())
    }

    async fn archive(&self, record: &GameRecord) -> StoreResult<()> {
        self.check()?;
        self.history.write().await.push(record.clone());
        Ok(())
    }

    async fn keys(&self, prefix: &str) -> StoreResult<Vec<String>> {
        self.check()?;
        let mut keys: Vec<String> = self
            .values
            .read()
            .await
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect();
        keys.sort();
        Ok(keys)
    }
}

/// Typed access to the records the room actors persist.
#[derive(Clone)]
pub struct GameStore {
    store: Arc<dyn Store>,
}

impl GameStore {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub async fn load_game(&self, room: RoomId) -> StoreResult<Option<Game>> {
        match self.store.get(&game_key(room)).await? {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    pub async fn save_game(&self, game: &Game) -> StoreResult<()> {
        let value = serde_json::to_value(game)?;
        self.store.put(&game_key(game.room_id), value).await
    }

    pub async fn delete_game(&self, room: RoomId) -> StoreResult<bool> {
        self.store.delete(&game_key(room)).await
    }

    /// Whether auto-repeat is on. Missing means off.
    pub async fn auto_repeat(&self, room: RoomId) -> StoreResult<bool> {
        let value = self.store.get(&auto_repeat_key(room)).await?;
        Ok(value.and_then(|v| v.as_bool()).unwrap_or(false))
    }

    pub async fn set_auto_repeat(&self, room: RoomId, enabled: bool) -> StoreResult<()> {
        if enabled {
            self.store
                .put(&auto_repeat_key(room), Value::Bool(true))
                .await
        } else {
            self.store.delete(&auto_repeat_key(room)).await.map(|_| ())
        }
    }

    pub async fn archive(&self, record: &GameRecord) -> StoreResult<()> {
        self.store.archive(record).await
    }

    /// Rooms that have a persisted game or auto-repeat flag, for startup.
    ///
    /// Keys that do not parse as a room are skipped.
    pub async fn known_rooms(&self) -> StoreResult<Vec<RoomId>> {
        let mut rooms = Vec::new();
        for prefix in [GAME_PREFIX, AUTO_REPEAT_PREFIX] {
            for key in self.store.keys(prefix).await? {
                match key[prefix.len()..].parse::<RoomId>() {
                    Ok(room) => rooms.push(room),
                    Err(_) => log::warn!("Skipping unrecognized key {}", key),
                }
            }
        }
        rooms.sort_unstable();
        rooms.dedup();
        Ok(rooms)
    }
}

fn game_key(room: RoomId) -> String {
    format!("{GAME_PREFIX}{room}")
}

fn auto_repeat_key(room: RoomId) -> String {
    format!("{AUTO_REPEAT_PREFIX}{room}")
}
