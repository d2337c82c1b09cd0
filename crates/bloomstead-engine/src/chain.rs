//! On-chain save backend.
//!
//! The deployed `GameSave` contract stores one [`SaveData`] struct per player
//! address. [`ChainSaveBackend`] maps a [`GameSave`] to that layout and talks
//! to the contract through a [`ContractTransport`], which only moves ABI
//! encoded calldata and return data. [`InMemoryContract`] decodes the same
//! calldata in process and stands in for a node.

use alloy_primitives::Address;
use alloy_sol_types::{SolCall, SolInterface};
use bloomstead_common::{SchemaVersion, TilePos};
use bloomstead_gameplay::TileChange;
use futures::future::{self, BoxFuture, FutureExt};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

use crate::game_save::{CropSave, GameSave, PlayerSave, SlotSave};

mod abi {
    // The sol! macro generates items we can't document
    #![allow(missing_docs)]

    use alloy_sol_types::sol;

    sol! {
        #[derive(Debug)]
        struct PlayerData {
            int32 x;
            int32 y;
            uint32 health;
            uint32 maxHealth;
            uint32 hotbarSelection;
        }

        #[derive(Debug)]
        struct SlotData {
            uint32 slot;
            string itemId;
            uint32 quantity;
        }

        #[derive(Debug)]
        struct CropData {
            int32 x;
            int32 y;
            string cropId;
            uint32 plantedDay;
            uint32 lastWateredDay;
            uint32 waterLevel;
            uint32 daysGrown;
            bool wateredToday;
            bool grown;
        }

        #[derive(Debug)]
        struct TileData {
            string layer;
            int32 x;
            int32 y;
            int32 tileIndex;
        }

        #[derive(Debug)]
        struct SaveData {
            uint32 version;
            uint64 timestamp;
            uint32 currentDay;
            PlayerData player;
            SlotData[] inventory;
            CropData[] farming;
            TileData[] mapChanges;
        }

        /// Per-player save storage.
        #[derive(Debug)]
        interface IGameSave {
            /// Stores the caller's save, replacing the previous one.
            function saveGame(SaveData data) external;

            /// Reads a player's save. Reverts if there is none.
            function loadGame(address player) external view returns (SaveData data);

            /// Checks if a player has a save.
            function hasSaveData(address player) external view returns (bool exists);

            /// Deletes the caller's save.
            function deleteSaveData() external;
        }
    }
}

pub use abi::{CropData, IGameSave, PlayerData, SaveData, SlotData, TileData};

/// Scale of the fixed-point player position stored on chain.
pub const POSITION_SCALE: f32 = 100.0;

/// Chain error types.
#[derive(Debug, Error)]
pub enum ChainError {
    /// Calldata or return data failed to encode or decode.
    #[error("ABI error: {0}")]
    Abi(#[from] alloy_sol_types::Error),

    /// Contract reverted.
    #[error("Reverted: {0}")]
    Reverted(String),

    /// Transport unavailable.
    #[error("Transport error: {0}")]
    Transport(String),

    /// A value does not fit its on-chain type.
    #[error("{0} out of range")]
    OutOfRange(&'static str),
}

/// Result type for chain operations.
pub type ChainResult<T> = Result<T, ChainError>;

/// Moves encoded calls to the contract.
pub trait ContractTransport: Send + Sync {
    /// Transport name.
    fn name(&self) -> &str;

    /// Runs a view call and returns the encoded return data.
    fn call(&self, from: Address, calldata: Vec<u8>) -> BoxFuture<'_, ChainResult<Vec<u8>>>;

    /// Submits a transaction and waits for it to be included.
    fn send(&self, from: Address, calldata: Vec<u8>) -> BoxFuture<'_, ChainResult<Vec<u8>>>;
}

/// In-process `GameSave` contract.
#[derive(Debug, Default)]
pub struct InMemoryContract {
    saves: RwLock<HashMap<Address, SaveData>>,
    offline: AtomicBool,
}

impl InMemoryContract {
    /// Creates an empty contract.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every following call fail with a transport error.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::Relaxed);
    }

    /// Number of players with a save.
    #[must_use]
    pub fn save_count(&self) -> usize {
        self.saves.read().len()
    }

    fn execute(&self, from: Address, calldata: &[u8], view: bool) -> ChainResult<Vec<u8>> {
        if self.offline.load(Ordering::Relaxed) {
            return Err(ChainError::Transport("contract offline".into()));
        }

        let call = IGameSave::IGameSaveCalls::abi_decode(calldata, true)?;
        match call {
            IGameSave::IGameSaveCalls::loadGame(IGameSave::loadGameCall { player }) => {
                let saves = self.saves.read();
                let data = saves
                    .get(&player)
                    .ok_or_else(|| ChainError::Reverted("no save data".into()))?;
                Ok(IGameSave::loadGameCall::abi_encode_returns(&(data.clone(),)))
            },
            IGameSave::IGameSaveCalls::hasSaveData(IGameSave::hasSaveDataCall { player }) => {
                let exists = self.saves.read().contains_key(&player);
                Ok(IGameSave::hasSaveDataCall::abi_encode_returns(&(exists,)))
            },
            IGameSave::IGameSaveCalls::saveGame(_) | IGameSave::IGameSaveCalls::deleteSaveData(_)
                if view =>
            {
                Err(ChainError::Reverted("state change in a view call".into()))
            },
            IGameSave::IGameSaveCalls::saveGame(IGameSave::saveGameCall { data }) => {
                self.saves.write().insert(from, data);
                Ok(Vec::new())
            },
            IGameSave::IGameSaveCalls::deleteSaveData(_) => {
                if self.saves.write().remove(&from).is_none() {
                    return Err(ChainError::Reverted("no save data".into()));
                }
                Ok(Vec::new())
            },
        }
    }
}

impl ContractTransport for InMemoryContract {
    fn name(&self) -> &str {
        "InMemory"
    }

    fn call(&self, from: Address, calldata: Vec<u8>) -> BoxFuture<'_, ChainResult<Vec<u8>>> {
        future::ready(self.execute(from, &calldata, true)).boxed()
    }

    fn send(&self, from: Address, calldata: Vec<u8>) -> BoxFuture<'_, ChainResult<Vec<u8>>> {
        future::ready(self.execute(from, &calldata, false)).boxed()
    }
}

fn to_fixed(value: f32) -> i32 {
    (value * POSITION_SCALE).round() as i32
}

fn from_fixed(value: i32) -> f32 {
    value as f32 / POSITION_SCALE
}

fn to_u32(value: usize, what: &'static str) -> ChainResult<u32> {
    u32::try_from(value).map_err(|_| ChainError::OutOfRange(what))
}

/// Maps a snapshot to the contract layout.
pub fn encode_save(save: &GameSave) -> ChainResult<SaveData> {
    let inventory = save
        .inventory
        .iter()
        .map(|slot| {
            Ok(SlotData {
                slot: to_u32(slot.slot, "inventory slot")?,
                itemId: slot.item_id.to_string(),
                quantity: slot.quantity,
            })
        })
        .collect::<ChainResult<Vec<_>>>()?;

    let farming = save
        .farming
        .iter()
        .map(|crop| CropData {
            x: crop.position.x,
            y: crop.position.y,
            cropId: crop.crop_id.to_string(),
            plantedDay: crop.planted_day,
            lastWateredDay: crop.last_watered_day,
            waterLevel: crop.water_level,
            daysGrown: crop.days_grown,
            wateredToday: crop.watered_today,
            grown: crop.grown,
        })
        .collect();

    let map_changes = save
        .map_changes
        .iter()
        .map(|change| TileData {
            layer: change.layer.clone(),
            x: change.pos.x,
            y: change.pos.y,
            tileIndex: change.tile_index,
        })
        .collect();

    Ok(SaveData {
        version: save.version.pack(),
        timestamp: save.timestamp,
        currentDay: save.current_day,
        player: PlayerData {
            x: to_fixed(save.player.x),
            y: to_fixed(save.player.y),
            health: save.player.health,
            maxHealth: save.player.max_health,
            hotbarSelection: to_u32(save.player.hotbar_selection, "hotbar selection")?,
        },
        inventory,
        farming,
        mapChanges: map_changes,
    })
}

/// Maps the contract layout back to a snapshot.
#[must_use]
pub fn decode_save(data: SaveData) -> GameSave {
    GameSave {
        version: SchemaVersion::unpack(data.version),
        timestamp: data.timestamp,
        current_day: data.currentDay,
        player: PlayerSave {
            x: from_fixed(data.player.x),
            y: from_fixed(data.player.y),
            health: data.player.health,
            max_health: data.player.maxHealth,
            hotbar_selection: data.player.hotbarSelection as usize,
        },
        inventory: data
            .inventory
            .into_iter()
            .map(|slot| SlotSave {
                slot: slot.slot as usize,
                item_id: slot.itemId.as_str().into(),
                quantity: slot.quantity,
            })
            .collect(),
        farming: data
            .farming
            .into_iter()
            .map(|crop| CropSave {
                position: TilePos::new(crop.x, crop.y),
                crop_id: crop.cropId.as_str().into(),
                planted_day: crop.plantedDay,
                last_watered_day: crop.lastWateredDay,
                water_level: crop.waterLevel,
                watered_today: crop.wateredToday,
                days_grown: crop.daysGrown,
                grown: crop.grown,
            })
            .collect(),
        map_changes: data
            .mapChanges
            .into_iter()
            .map(|tile| TileChange {
                layer: tile.layer,
                pos: TilePos::new(tile.x, tile.y),
                tile_index: tile.tileIndex,
            })
            .collect(),
    }
}

/// Saves and loads one player's game through the contract.
#[derive(Clone)]
pub struct ChainSaveBackend {
    transport: Arc<dyn ContractTransport>,
    player: Address,
}

impl std::fmt::Debug for ChainSaveBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChainSaveBackend")
            .field("transport", &self.transport.name())
            .field("player", &self.player)
            .finish()
    }
}

impl ChainSaveBackend {
    /// Creates a backend for `player`.
    #[must_use]
    pub fn new(transport: Arc<dyn ContractTransport>, player: Address) -> Self {
        Self { transport, player }
    }

    /// Player address.
    #[must_use]
    pub fn player(&self) -> Address {
        self.player
    }

    /// Writes a save.
    pub async fn save(&self, save: &GameSave) -> ChainResult<()> {
        let call = IGameSave::saveGameCall {
            data: encode_save(save)?,
        };
        let calldata = call.abi_encode();
        debug!(bytes = calldata.len(), "sending saveGame");
        self.transport.send(self.player, calldata).await?;
        info!(player = %self.player, "Saved game on chain");
        Ok(())
    }

    /// Reads the player's save, if there is one.
    pub async fn load(&self) -> ChainResult<Option<GameSave>> {
        if !self.has_save().await? {
            return Ok(None);
        }
        let call = IGameSave::loadGameCall {
            player: self.player,
        };
        let output = self.transport.call(self.player, call.abi_encode()).await?;
        let decoded = IGameSave::loadGameCall::abi_decode_returns(&output, true)?;
        Ok(Some(decode_save(decoded.data)))
    }

    /// Checks if the player has a save.
    pub async fn has_save(&self) -> ChainResult<bool> {
        let call = IGameSave::hasSaveDataCall {
            player: self.player,
        };
        let output = self.transport.call(self.player, call.abi_encode()).await?;
        Ok(IGameSave::hasSaveDataCall::abi_decode_returns(&output, true)?.exists)
    }

    /// Deletes the player's save.
    pub async fn delete(&self) -> ChainResult<()> {
        let calldata = IGameSave::deleteSaveDataCall {}.abi_encode();
        self.transport.send(self.player, calldata).await?;
        info!(player = %self.player, "Deleted chain save");
        Ok(())
    }
}
