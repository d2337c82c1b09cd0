//! Engine configuration.
//!
//! Provides data and save locations, session layout, debug and chain
//! settings. Configuration can be loaded from and saved to a TOML file.

use alloy_primitives::Address;
use bloomstead_gameplay::{
    SessionConfig, DEFAULT_HISTORY_CAPACITY, DEFAULT_HOTBAR_SLOTS, DEFAULT_PLAYER_SLOTS,
    HOTBAR_SIZE,
};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

use crate::save_manager::SaveProvider;

/// Configuration file name.
pub const CONFIG_FILE: &str = "bloomstead.toml";

/// Key of the local save blob.
pub const DEFAULT_SAVE_KEY: &str = "bloomstead_save";

/// Chain persistence settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChainConfig {
    /// Allow blockchain saves
    pub enabled: bool,
    /// Player wallet address (hex)
    pub player_address: String,
    /// Use the in-process contract instead of a node
    pub simulated: bool,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            player_address: Address::ZERO.to_string(),
            simulated: true,
        }
    }
}

/// Engine configuration parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    // === Data Settings ===
    /// Directory holding materials.toml, recipes.toml and crops.toml
    pub data_dir: PathBuf,
    /// Directory for local saves
    pub save_dir: PathBuf,
    /// Key of the local save blob
    pub save_key: String,
    /// Backend used by the binary
    pub save_provider: SaveProvider,
    /// Minimum time between saves in milliseconds
    pub save_throttle_ms: u64,

    // === Session Settings ===
    /// Player inventory size
    pub player_slots: usize,
    /// Player inventory slots behind the hotbar
    pub hotbar_slots: [usize; HOTBAR_SIZE],
    /// Water added per watering
    pub watering_amount: u32,

    // === Debug Settings ===
    /// Record dispatched events
    pub debug_events: bool,
    /// Number of events kept when recording
    pub event_history_capacity: usize,

    // === Chain Settings ===
    /// Blockchain save settings
    pub chain: ChainConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            // Data
            data_dir: PathBuf::from("assets/data"),
            save_dir: PathBuf::from("saves"),
            save_key: DEFAULT_SAVE_KEY.to_string(),
            save_provider: SaveProvider::LocalStorage,
            save_throttle_ms: 1000,

            // Session
            player_slots: DEFAULT_PLAYER_SLOTS,
            hotbar_slots: DEFAULT_HOTBAR_SLOTS,
            watering_amount: 1,

            // Debug
            debug_events: cfg!(debug_assertions),
            event_history_capacity: DEFAULT_HISTORY_CAPACITY,

            // Chain
            chain: ChainConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from the default file location.
    /// Returns default config if file doesn't exist.
    pub fn load() -> Self {
        Self::load_from(Self::config_path())
    }

    /// Load configuration from a specific path.
    /// Returns default config if file doesn't exist or is invalid.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();

        if !path.exists() {
            info!("Config file not found, using defaults");
            return Self::default();
        }

        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) => {
                warn!("Failed to read config file: {e}");
                return Self::default();
            },
        };

        match toml::from_str::<Self>(&contents) {
            Ok(mut config) => {
                info!("Loaded config from {}", path.display());
                config.validate();
                config
            },
            Err(e) => {
                warn!("Failed to parse config file: {e}");
                Self::default()
            },
        }
    }

    /// Save configuration to a specific path.
    pub fn save_to<P: AsRef<Path>>(&self, path: P) -> io::Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        fs::write(path, contents)?;

        info!("Saved config to {}", path.display());
        Ok(())
    }

    /// Get the default configuration file path.
    fn config_path() -> PathBuf {
        let local = PathBuf::from(CONFIG_FILE);
        if local.exists() {
            return local;
        }
        dirs::config_dir().map_or(local, |dir| dir.join("bloomstead").join(CONFIG_FILE))
    }

    /// Validate and clamp configuration values to sensible ranges.
    pub fn validate(&mut self) {
        self.player_slots = self.player_slots.clamp(HOTBAR_SIZE, 256);
        if self.hotbar_slots.iter().any(|&slot| slot >= self.player_slots) {
            warn!(
                "Hotbar slots {:?} do not fit {} player slots, using defaults",
                self.hotbar_slots, self.player_slots
            );
            self.hotbar_slots = DEFAULT_HOTBAR_SLOTS;
        }
        self.save_throttle_ms = self.save_throttle_ms.min(60_000);
        self.watering_amount = self.watering_amount.clamp(1, 10);
        self.event_history_capacity = self.event_history_capacity.clamp(1, 10_000);
        if self.save_key.trim().is_empty() {
            self.save_key = DEFAULT_SAVE_KEY.to_string();
        }
        if self.chain.enabled && self.player_address().is_none() {
            warn!(
                "Invalid player address {:?}, disabling chain saves",
                self.chain.player_address
            );
            self.chain.enabled = false;
        }
    }

    /// Minimum time between saves.
    #[must_use]
    pub fn save_throttle(&self) -> Duration {
        Duration::from_millis(self.save_throttle_ms)
    }

    /// Parsed player wallet address.
    #[must_use]
    pub fn player_address(&self) -> Option<Address> {
        self.chain.player_address.parse().ok()
    }

    /// Session layout derived from this config.
    #[must_use]
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            player_slots: self.player_slots,
            hotbar_slots: self.hotbar_slots,
            event_history: self.debug_events.then_some(self.event_history_capacity),
            watering_amount: self.watering_amount,
            ..SessionConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.player_slots, 27);
        assert_eq!(config.save_throttle(), Duration::from_secs(1));
        assert_eq!(config.save_provider, SaveProvider::LocalStorage);
        assert_eq!(config.player_address(), Some(Address::ZERO));
    }

    #[test]
    fn test_config_validation() {
        let mut config = EngineConfig::default();
        config.player_slots = 3;
        config.hotbar_slots = [10, 11, 12, 13, 14];
        config.watering_amount = 0;
        config.chain.enabled = true;
        config.chain.player_address = "not-an-address".into();

        config.validate();

        assert_eq!(config.player_slots, HOTBAR_SIZE);
        assert_eq!(config.hotbar_slots, DEFAULT_HOTBAR_SLOTS);
        assert_eq!(config.watering_amount, 1);
        assert!(!config.chain.enabled);
    }

    #[test]
    fn test_config_save_load() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let config_path = temp_dir.path().join("test_config.toml");

        let mut config = EngineConfig::default();
        config.player_slots = 36;
        config.hotbar_slots = [31, 32, 33, 34, 35];
        config.save_provider = SaveProvider::Blockchain;
        config.chain.enabled = true;
        config.chain.player_address = "0x00000000000000000000000000000000000000aa".into();

        config.save_to(&config_path).expect("Failed to save config");

        let loaded = EngineConfig::load_from(&config_path);
        assert_eq!(loaded, config);
        assert!(loaded.player_address().is_some());
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let config_path = temp_dir.path().join("partial.toml");
        fs::write(&config_path, "save_throttle_ms = 250\n[chain]\nsimulated = false\n")
            .expect("write");

        let loaded = EngineConfig::load_from(&config_path);
        assert_eq!(loaded.save_throttle_ms, 250);
        assert!(!loaded.chain.simulated);
        assert_eq!(loaded.player_slots, DEFAULT_PLAYER_SLOTS);
    }

    #[test]
    fn test_config_load_missing_or_invalid_file() {
        let config = EngineConfig::load_from("/nonexistent/path/config.toml");
        assert_eq!(config, EngineConfig::default());

        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let config_path = temp_dir.path().join("broken.toml");
        fs::write(&config_path, "player_slots = \"many\"").expect("write");
        assert_eq!(EngineConfig::load_from(&config_path), EngineConfig::default());
    }

    #[test]
    fn test_session_config() {
        let mut config = EngineConfig::default();
        config.debug_events = true;
        config.event_history_capacity = 12;
        let session = config.session_config();
        assert_eq!(session.event_history, Some(12));
        assert_eq!(session.player_slots, 27);
    }
}
