//! # Bloomstead Engine
//!
//! Persistence and runtime for Bloomstead.
//!
//! This crate ties the gameplay session to storage:
//! - Game save snapshots and their restore path
//! - Local key-value storage
//! - On-chain saves through the `GameSave` contract
//! - The throttled save manager
//! - Engine configuration and the headless demo loop

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(clippy::unwrap_used)]

pub mod app;
pub mod chain;
pub mod config;
pub mod game_save;
pub mod save_manager;
pub mod storage;


/// Prelude for convenient imports
pub mod prelude {
    pub use crate::chain::{ChainError, ChainSaveBackend, ContractTransport, InMemoryContract};
    pub use crate::config::EngineConfig;
    pub use crate::game_save::{GameSave, RestoreSummary};
    pub use crate::save_manager::{SaveError, SaveManager, SaveProvider};
    pub use crate::storage::{FileStore, KeyValueStore, MemoryStore, StorageError};
}

pub use prelude::*;
