//! Versioned game snapshot.
//!
//! [`GameSave`] flattens a [`GameSession`] into plain records: player,
//! player inventory slots, planted crops and the ordered tile change log.
//! Loading replaces state wholesale: inventory slots are cleared before the
//! saved ones are written, the crop list is swapped out and the map is
//! rebuilt by replaying every change.

use bloomstead_common::{CropId, InventoryId, MaterialId, SchemaVersion, TilePos};
use bloomstead_gameplay::{GameSession, PlantedCrop, TileChange};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, warn};

/// Player record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerSave {
    /// World X
    pub x: f32,
    /// World Y
    pub y: f32,
    /// Current health
    pub health: u32,
    /// Maximum health
    pub max_health: u32,
    /// Selected hotbar entry
    pub hotbar_selection: usize,
}

/// One occupied inventory slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotSave {
    /// Slot index
    pub slot: usize,
    /// Material in the slot
    pub item_id: MaterialId,
    /// Quantity
    pub quantity: u32,
}

/// One planted crop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CropSave {
    /// Tile position
    pub position: TilePos,
    /// Crop definition
    pub crop_id: CropId,
    /// Day of planting
    pub planted_day: u32,
    /// Last day watered, 0 if never
    pub last_watered_day: u32,
    /// Stored water
    pub water_level: u32,
    /// Watered during the saved day
    pub watered_today: bool,
    /// Growth stage (watered days so far)
    pub days_grown: u32,
    /// Ready to harvest
    pub grown: bool,
}

/// Flattened snapshot of a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameSave {
    /// Format version
    pub version: SchemaVersion,
    /// Unix time of the save in seconds
    pub timestamp: u64,
    /// In-game day
    pub current_day: u32,
    /// Player record
    pub player: PlayerSave,
    /// Occupied player inventory slots
    pub inventory: Vec<SlotSave>,
    /// Planted crops
    pub farming: Vec<CropSave>,
    /// Tile changes in the order they happened
    pub map_changes: Vec<TileChange>,
}

/// What a restore applied and skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RestoreSummary {
    /// Inventory slots written
    pub slots: usize,
    /// Crops planted
    pub crops: usize,
    /// Tile changes replayed
    pub tile_changes: usize,
    /// Entries dropped because they reference unknown data
    pub skipped: usize,
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

impl GameSave {
    /// Captures the current state of a session.
    #[must_use]
    pub fn capture(session: &GameSession) -> Self {
        let player = session.player();
        let inventory = session.inventory();

        let slots = inventory
            .player()
            .slots()
            .iter()
            .enumerate()
            .filter_map(|(slot, item)| {
                item.as_ref().map(|item| SlotSave {
                    slot,
                    item_id: item.id().clone(),
                    quantity: item.quantity,
                })
            })
            .collect();

        let farming = session
            .farming()
            .crops()
            .into_iter()
            .map(|crop| CropSave {
                position: crop.position,
                crop_id: crop.definition.id.clone(),
                planted_day: crop.planted_day,
                last_watered_day: crop.last_watered_day.unwrap_or(0),
                water_level: crop.water_level,
                watered_today: crop.watered_today,
                days_grown: crop.days_grown,
                grown: crop.grown,
            })
            .collect();

        Self {
            version: SchemaVersion::SAVE_FORMAT,
            timestamp: unix_now(),
            current_day: session.farming().current_day(),
            player: PlayerSave {
                x: player.x,
                y: player.y,
                health: player.health,
                max_health: player.max_health,
                hotbar_selection: inventory.selected_hotbar(),
            },
            inventory: slots,
            farming,
            map_changes: session.tiles().changes().to_vec(),
        }
    }

    /// Replaces the session's state with this snapshot.
    pub fn apply(&self, session: &mut GameSession) -> RestoreSummary {
        if self.version != SchemaVersion::SAVE_FORMAT {
            warn!(
                "Save version {} differs from {}, loading anyway",
                self.version,
                SchemaVersion::SAVE_FORMAT
            );
        }
        let mut summary = RestoreSummary::default();
        let registry = Arc::clone(session.registry());

        let player = session.player_mut();
        player.set_position(self.player.x, self.player.y);
        player.max_health = self.player.max_health.max(1);
        player.health = self.player.health.min(player.max_health);

        let mut entries = Vec::with_capacity(self.inventory.len());
        for slot in &self.inventory {
            match registry.create_item(slot.item_id.as_str(), slot.quantity) {
                Some(item) => entries.push((slot.slot, item)),
                None => {
                    warn!(slot = slot.slot, item = %slot.item_id, "unknown saved item, skipped");
                    summary.skipped += 1;
                },
            }
        }
        summary.slots = entries.len();
        let inventory = session.inventory_mut();
        if let Err(e) = inventory.restore(&InventoryId::player(), entries) {
            warn!("Failed to restore inventory: {e}");
        }
        if !inventory.select_hotbar(self.player.hotbar_selection) {
            warn!(index = self.player.hotbar_selection, "invalid saved hotbar selection");
        }

        session.restore_map(&self.map_changes);
        summary.tile_changes = self.map_changes.len();

        let farming = session.farming_mut();
        let mut crops = Vec::with_capacity(self.farming.len());
        for saved in &self.farming {
            let Some(definition) = farming.crop_definition(&saved.crop_id).cloned() else {
                warn!(crop = %saved.crop_id, position = %saved.position, "unknown saved crop, skipped");
                summary.skipped += 1;
                continue;
            };
            let mut crop = PlantedCrop::new(saved.position, definition, saved.planted_day);
            crop.last_watered_day = (saved.last_watered_day > 0).then_some(saved.last_watered_day);
            crop.water_level = saved.water_level;
            crop.watered_today = saved.watered_today;
            crop.days_grown = saved.days_grown;
            crop.grown = saved.grown;
            crops.push(crop);
        }
        summary.crops = crops.len();
        farming.restore_crops(self.current_day, crops);

        session.pump_events();
        debug!(?summary, "save applied");
        summary
    }

    /// Serializes to the local JSON blob.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Parses the local JSON blob.
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bloomstead_gameplay::{GameData, SessionConfig, FARM_LAYER};

    fn session() -> GameSession {
        let data = GameData::builtin().expect("shipped data");
        GameSession::new(data, SessionConfig::default()).expect("session")
    }

    #[test]
    fn test_capture_flattens_session() {
        let mut session = session();
        let seeds = session.create_item("carrot_seed", 5).expect("seeds");
        session.give_player(seeds);
        let pos = TilePos::new(3, 3);
        session.till_soil(pos);
        session.plant_seed_from_hotbar(pos);
        session.player_mut().set_position(48.0, 64.0);

        let save = GameSave::capture(&session);
        assert_eq!(save.version, SchemaVersion::SAVE_FORMAT);
        assert_eq!(save.current_day, 1);
        assert_eq!(save.player.x, 48.0);
        assert_eq!(
            save.inventory,
            vec![SlotSave {
                slot: 0,
                item_id: "carrot_seed".into(),
                quantity: 4,
            }]
        );
        assert_eq!(save.farming.len(), 1);
        assert_eq!(save.farming[0].last_watered_day, 0);
        assert_eq!(save.map_changes.len(), 1);
        assert_eq!(save.map_changes[0].layer, FARM_LAYER);
    }

    #[test]
    fn test_apply_replaces_state() {
        let mut source = session();
        let wood = source.create_item("wood", 7).expect("wood");
        source.give_player(wood);
        source.till_soil(TilePos::new(1, 1));
        let seed = source.create_item("wheat_seed", 1).expect("seed");
        source.give_player(seed);
        source.inventory_mut().select_hotbar(1);
        source.plant_seed_from_hotbar(TilePos::new(1, 1));
        source.water_crop(TilePos::new(1, 1));
        source.end_day();
        source.water_crop(TilePos::new(1, 1));
        let save = GameSave::capture(&source);

        let mut target = session();
        let stone = target.create_item("stone", 3).expect("stone");
        target.give_player(stone);
        target.till_soil(TilePos::new(8, 8));

        let summary = save.apply(&mut target);
        assert_eq!(summary.skipped, 0);
        assert_eq!(summary.crops, 1);

        assert_eq!(GameSave::capture(&target).inventory, save.inventory);
        assert_eq!(target.inventory().selected_hotbar(), 1);
        assert_eq!(target.farming().current_day(), 2);
        let crop = target.farming().crop_at(TilePos::new(1, 1)).expect("crop");
        assert_eq!(crop.days_grown, 1);
        assert!(crop.watered_today);
        assert_eq!(crop.last_watered_day, Some(2));
        assert!(!target.farming().is_farmable(TilePos::new(8, 8)));
        assert_eq!(target.tiles().changes(), source.tiles().changes());
    }

    #[test]
    fn test_unknown_entries_skipped() {
        let mut save = GameSave::capture(&session());
        save.version = SchemaVersion::new(0, 9, 0);
        save.inventory.push(SlotSave {
            slot: 2,
            item_id: "moon_rock".into(),
            quantity: 1,
        });
        save.farming.push(CropSave {
            position: TilePos::new(0, 0),
            crop_id: "moonflower".into(),
            planted_day: 1,
            last_watered_day: 0,
            water_level: 0,
            watered_today: false,
            days_grown: 0,
            grown: false,
        });

        let mut target = session();
        let summary = save.apply(&mut target);
        assert_eq!(summary.skipped, 2);
        assert!(target.inventory().player().is_empty());
        assert_eq!(target.farming().crop_count(), 0);
    }

    #[test]
    fn test_json_shape() {
        let save = GameSave::capture(&session());
        let value: serde_json::Value =
            serde_json::from_str(&save.to_json().expect("serialize")).expect("json");
        for field in ["version", "timestamp", "current_day", "player", "inventory", "farming", "map_changes"] {
            assert!(value.get(field).is_some(), "missing {field}");
        }
        assert_eq!(GameSave::from_json(&save.to_json().expect("serialize")).expect("parse"), save);
    }
}
