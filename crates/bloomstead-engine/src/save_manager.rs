//! Save file management system.
//!
//! This module provides:
//! - SaveManager: one interface over the local and on-chain backends
//! - Save throttling (one save per throttle window)
//! - A loading guard that drops saves while a load is running
//! - Error handling at the boundary: callers get `bool` / `Option`

use alloy_primitives::Address;
use bloomstead_gameplay::{GameEvent, GameSession};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::chain::{ChainError, ChainSaveBackend, ContractTransport, InMemoryContract};
use crate::config::EngineConfig;
use crate::game_save::GameSave;
use crate::storage::{FileStore, KeyValueStore, StorageError};

/// Default minimum time between saves.
pub const DEFAULT_SAVE_THROTTLE: Duration = Duration::from_secs(1);

/// Persistence backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SaveProvider {
    /// Synchronous key-value store
    LocalStorage,
    /// `GameSave` contract
    Blockchain,
}

impl SaveProvider {
    /// Short tag used in events and logs.
    #[must_use]
    pub fn tag(self) -> &'static str {
        match self {
            Self::LocalStorage => "localstorage",
            Self::Blockchain => "blockchain",
        }
    }
}

impl fmt::Display for SaveProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Errors that can occur during save operations.
#[derive(Debug, Error)]
pub enum SaveError {
    /// Local storage error.
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Save blob could not be (de)serialized.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Chain call failed.
    #[error("Chain error: {0}")]
    Chain(#[from] ChainError),

    /// Blockchain provider requested without a chain backend.
    #[error("Blockchain saves are not configured")]
    ChainDisabled,
}

/// Result type for save operations.
pub type SaveResult<T> = Result<T, SaveError>;

/// Clears the loading flag when a load ends, however it ends.
struct LoadingGuard<'a>(&'a AtomicBool);

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Saves and restores sessions through either backend.
pub struct SaveManager {
    store: Arc<dyn KeyValueStore>,
    save_key: String,
    chain: Option<ChainSaveBackend>,
    throttle: Duration,
    last_save: Mutex<Option<Instant>>,
    loading: AtomicBool,
}

impl fmt::Debug for SaveManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SaveManager")
            .field("store", &self.store.name())
            .field("save_key", &self.save_key)
            .field("chain", &self.chain)
            .field("throttle", &self.throttle)
            .field("loading", &self.is_loading())
            .finish()
    }
}

impl SaveManager {
    /// Creates a manager over a local store with no chain backend.
    #[must_use]
    pub fn new(store: Arc<dyn KeyValueStore>, save_key: impl Into<String>) -> Self {
        Self {
            store,
            save_key: save_key.into(),
            chain: None,
            throttle: DEFAULT_SAVE_THROTTLE,
            last_save: Mutex::new(None),
            loading: AtomicBool::new(false),
        }
    }

    /// Builds the manager described by an engine config.
    ///
    /// Saves go to a [`FileStore`] in the save directory. With chain saves
    /// enabled and simulated, the chain backend runs on an
    /// [`InMemoryContract`].
    #[must_use]
    pub fn from_config(config: &EngineConfig) -> Self {
        let store: Arc<dyn KeyValueStore> = Arc::new(FileStore::new(&config.save_dir));
        let mut manager =
            Self::new(store, config.save_key.clone()).with_throttle(config.save_throttle());

        if config.chain.enabled {
            match (config.player_address(), config.chain.simulated) {
                (Some(player), true) => {
                    let transport: Arc<dyn ContractTransport> = Arc::new(InMemoryContract::new());
                    manager = manager.with_chain(ChainSaveBackend::new(transport, player));
                },
                (Some(_), false) => {
                    warn!("No chain transport available outside simulation, chain saves disabled");
                },
                (None, _) => {
                    warn!("Invalid player address, chain saves disabled");
                },
            }
        }
        manager
    }

    /// Sets the chain backend.
    #[must_use]
    pub fn with_chain(mut self, chain: ChainSaveBackend) -> Self {
        self.chain = Some(chain);
        self
    }

    /// Sets the minimum time between saves.
    #[must_use]
    pub fn with_throttle(mut self, throttle: Duration) -> Self {
        self.throttle = throttle;
        self
    }

    /// Local save key.
    #[must_use]
    pub fn save_key(&self) -> &str {
        &self.save_key
    }

    /// Player address of the chain backend, if configured.
    #[must_use]
    pub fn chain_player(&self) -> Option<Address> {
        self.chain.as_ref().map(ChainSaveBackend::player)
    }

    /// Checks if a load is running.
    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.loading.load(Ordering::Acquire)
    }

    fn begin_load(&self) -> Option<LoadingGuard<'_>> {
        self.loading
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| LoadingGuard(&self.loading))
    }

    /// Claims the save window. False if the last save is too recent.
    fn claim_save_window(&self) -> bool {
        let mut last = self.last_save.lock();
        let now = Instant::now();
        if let Some(previous) = *last {
            if now.duration_since(previous) < self.throttle {
                return false;
            }
        }
        *last = Some(now);
        true
    }

    fn chain(&self) -> SaveResult<&ChainSaveBackend> {
        self.chain.as_ref().ok_or(SaveError::ChainDisabled)
    }

    /// Saves the session. Returns false when throttled, while a load is
    /// running, or on any backend failure.
    pub async fn save_game(&self, provider: SaveProvider, session: &mut GameSession) -> bool {
        if self.is_loading() {
            debug!("Save skipped: load in progress");
            return false;
        }
        if !self.claim_save_window() {
            debug!("Save skipped: throttled");
            return false;
        }

        let save = GameSave::capture(session);
        match self.write(provider, &save).await {
            Ok(()) => {
                info!(
                    provider = %provider,
                    day = save.current_day,
                    slots = save.inventory.len(),
                    crops = save.farming.len(),
                    "Game saved"
                );
                session.events().publish(GameEvent::GameSaved {
                    provider: provider.tag().to_string(),
                });
                session.pump_events();
                true
            },
            Err(e) => {
                error!("Failed to save to {provider}: {e}");
                false
            },
        }
    }

    /// Loads the saved game into the session, replacing its state.
    /// Returns false if there is no save or the backend fails.
    pub async fn load_game(&self, provider: SaveProvider, session: &mut GameSession) -> bool {
        let Some(_guard) = self.begin_load() else {
            warn!("Load skipped: another load is in progress");
            return false;
        };

        let save = match self.read(provider).await {
            Ok(Some(save)) => save,
            Ok(None) => {
                info!("No saved game in {provider}");
                return false;
            },
            Err(e) => {
                error!("Failed to load from {provider}: {e}");
                return false;
            },
        };

        let summary = save.apply(session);
        info!(
            provider = %provider,
            day = save.current_day,
            slots = summary.slots,
            crops = summary.crops,
            skipped = summary.skipped,
            "Game loaded"
        );
        session.events().publish(GameEvent::GameLoaded {
            provider: provider.tag().to_string(),
        });
        session.pump_events();
        true
    }

    /// Reads the saved game without applying it.
    pub async fn read(&self, provider: SaveProvider) -> SaveResult<Option<GameSave>> {
        match provider {
            SaveProvider::LocalStorage => self
                .store
                .get(&self.save_key)?
                .map(|json| GameSave::from_json(&json))
                .transpose()
                .map_err(SaveError::from),
            SaveProvider::Blockchain => Ok(self.chain()?.load().await?),
        }
    }

    /// Writes a snapshot, bypassing the throttle and loading guard.
    pub async fn write(&self, provider: SaveProvider, save: &GameSave) -> SaveResult<()> {
        match provider {
            SaveProvider::LocalStorage => {
                let json = save.to_json()?;
                self.store.set(&self.save_key, &json)?;
                Ok(())
            },
            SaveProvider::Blockchain => Ok(self.chain()?.save(save).await?),
        }
    }

    /// Checks if a save exists.
    pub async fn has_save(&self, provider: SaveProvider) -> bool {
        let result = match provider {
            SaveProvider::LocalStorage => self.store.contains(&self.save_key).map_err(SaveError::from),
            SaveProvider::Blockchain => match self.chain() {
                Ok(chain) => chain.has_save().await.map_err(SaveError::from),
                Err(e) => Err(e),
            },
        };
        result.unwrap_or_else(|e| {
            warn!("Failed to check {provider} save: {e}");
            false
        })
    }

    /// Deletes the save. Returns whether one was deleted.
    pub async fn delete_save(&self, provider: SaveProvider) -> bool {
        let result = match provider {
            SaveProvider::LocalStorage => self.store.remove(&self.save_key).map_err(SaveError::from),
            SaveProvider::Blockchain => match self.chain() {
                Ok(chain) => chain.delete().await.map(|()| true).map_err(SaveError::from),
                Err(e) => Err(e),
            },
        };
        match result {
            Ok(deleted) => {
                if deleted {
                    info!("Deleted {provider} save");
                }
                deleted
            },
            Err(e) => {
                warn!("Failed to delete {provider} save: {e}");
                false
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use bloomstead_common::InventoryId;
    use bloomstead_gameplay::{EventKind, GameData, SessionConfig};
    use std::cell::RefCell;
    use std::rc::Rc;
    use tempfile::TempDir;

    fn session() -> GameSession {
        let data = GameData::builtin().expect("shipped data");
        GameSession::new(data, SessionConfig::default()).expect("session")
    }

    fn unthrottled(store: Arc<dyn KeyValueStore>) -> SaveManager {
        SaveManager::new(store, "test_save").with_throttle(Duration::ZERO)
    }

    fn chain_manager() -> (SaveManager, Arc<InMemoryContract>) {
        let contract = Arc::new(InMemoryContract::new());
        let transport: Arc<dyn ContractTransport> = contract.clone();
        let manager = unthrottled(Arc::new(MemoryStore::new()))
            .with_chain(ChainSaveBackend::new(transport, Address::repeat_byte(7)));
        (manager, contract)
    }

    fn stock(session: &mut GameSession) {
        for (id, qty) in [("wood", 10), ("stone", 4), ("carrot_seed", 6)] {
            let item = session.create_item(id, qty).expect("known material");
            assert!(session.give_player(item));
        }
    }

    fn slot_map(session: &GameSession) -> Vec<(usize, String, u32)> {
        session
            .inventory()
            .player()
            .slots()
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.as_ref().map(|item| (i, item.id().to_string(), item.quantity)))
            .collect()
    }

    #[test]
    fn test_provider_tags() {
        assert_eq!(SaveProvider::LocalStorage.tag(), "localstorage");
        assert_eq!(SaveProvider::Blockchain.to_string(), "blockchain");
        let parsed: SaveProvider = serde_json::from_str("\"localstorage\"").expect("parse");
        assert_eq!(parsed, SaveProvider::LocalStorage);
    }

    #[tokio::test]
    async fn test_local_round_trip_restores_slots() {
        let manager = unthrottled(Arc::new(MemoryStore::new()));
        let mut source = session();
        stock(&mut source);

        assert!(!manager.has_save(SaveProvider::LocalStorage).await);
        assert!(manager.save_game(SaveProvider::LocalStorage, &mut source).await);
        assert!(manager.has_save(SaveProvider::LocalStorage).await);

        let mut target = session();
        let junk = target.create_item("fiber", 9).expect("fiber");
        target.give_player(junk);
        assert!(target
            .inventory_mut()
            .move_item(0, 12, None, &InventoryId::player()));

        assert!(manager.load_game(SaveProvider::LocalStorage, &mut target).await);
        assert_eq!(slot_map(&target), slot_map(&source));
        assert!(!manager.is_loading());
    }

    #[tokio::test]
    async fn test_save_is_throttled() {
        let manager =
            SaveManager::new(Arc::new(MemoryStore::new()), "throttled").with_throttle(Duration::from_secs(60));
        let mut session = session();

        assert!(manager.save_game(SaveProvider::LocalStorage, &mut session).await);
        assert!(!manager.save_game(SaveProvider::LocalStorage, &mut session).await);
    }

    #[tokio::test]
    async fn test_save_dropped_while_loading() {
        let manager = unthrottled(Arc::new(MemoryStore::new()));
        let mut session = session();

        let guard = manager.begin_load().expect("first load");
        assert!(manager.begin_load().is_none());
        assert!(!manager.save_game(SaveProvider::LocalStorage, &mut session).await);
        assert!(!manager.load_game(SaveProvider::LocalStorage, &mut session).await);
        drop(guard);

        assert!(!manager.is_loading());
        assert!(manager.save_game(SaveProvider::LocalStorage, &mut session).await);
    }

    #[tokio::test]
    async fn test_load_without_save() {
        let manager = unthrottled(Arc::new(MemoryStore::new()));
        let mut session = session();
        assert!(!manager.load_game(SaveProvider::LocalStorage, &mut session).await);
        assert!(!manager.load_game(SaveProvider::Blockchain, &mut session).await);
        assert!(!manager.is_loading());
    }

    #[tokio::test]
    async fn test_corrupt_local_save() {
        let store = Arc::new(MemoryStore::new());
        store.set("test_save", "{not json").expect("set");
        let manager = unthrottled(store);
        assert!(matches!(
            manager.read(SaveProvider::LocalStorage).await,
            Err(SaveError::Serialization(_))
        ));
        assert!(!manager.load_game(SaveProvider::LocalStorage, &mut session()).await);
    }

    #[tokio::test]
    async fn test_chain_round_trip_and_events() {
        let (manager, contract) = chain_manager();
        let mut source = session();
        stock(&mut source);
        source.player_mut().set_position(33.5, 7.0);

        assert!(manager.save_game(SaveProvider::Blockchain, &mut source).await);
        assert_eq!(contract.save_count(), 1);

        let mut target = session();
        let loaded = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&loaded);
        target.events().subscribe(EventKind::GameLoaded, move |event| {
            sink.borrow_mut().push(event.clone());
        });

        assert!(manager.load_game(SaveProvider::Blockchain, &mut target).await);
        assert_eq!(slot_map(&target), slot_map(&source));
        assert_eq!(target.player().x, 33.5);
        assert_eq!(
            *loaded.borrow(),
            vec![GameEvent::GameLoaded {
                provider: "blockchain".into()
            }]
        );
    }

    #[tokio::test]
    async fn test_chain_failures_become_false() {
        let (manager, contract) = chain_manager();
        let mut session = session();

        contract.set_offline(true);
        assert!(!manager.save_game(SaveProvider::Blockchain, &mut session).await);
        assert!(!manager.has_save(SaveProvider::Blockchain).await);
        assert!(!manager.load_game(SaveProvider::Blockchain, &mut session).await);
        assert!(!manager.delete_save(SaveProvider::Blockchain).await);

        contract.set_offline(false);
        assert!(manager.save_game(SaveProvider::Blockchain, &mut session).await);
        assert!(manager.delete_save(SaveProvider::Blockchain).await);
        assert!(!manager.has_save(SaveProvider::Blockchain).await);
    }

    #[tokio::test]
    async fn test_blockchain_without_backend() {
        let manager = unthrottled(Arc::new(MemoryStore::new()));
        let mut session = session();
        assert!(!manager.save_game(SaveProvider::Blockchain, &mut session).await);
        assert!(matches!(
            manager.read(SaveProvider::Blockchain).await,
            Err(SaveError::ChainDisabled)
        ));
    }

    #[tokio::test]
    async fn test_file_backed_manager_from_config() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let mut config = EngineConfig::default();
        config.save_dir = dir.path().join("saves");
        config.save_throttle_ms = 0;
        config.chain.enabled = true;

        let manager = SaveManager::from_config(&config);
        assert_eq!(manager.chain_player(), Some(Address::ZERO));

        let mut session = session();
        stock(&mut session);
        assert!(manager.save_game(SaveProvider::LocalStorage, &mut session).await);
        assert!(dir.path().join("saves/bloomstead_save.json").exists());

        assert!(manager.delete_save(SaveProvider::LocalStorage).await);
        assert!(!manager.delete_save(SaveProvider::LocalStorage).await);
    }
}
