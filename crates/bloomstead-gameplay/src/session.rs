//! Game session context.
//!
//! A [`GameSession`] is built once when a game starts and owns every
//! gameplay system. Callers reach the managers through it instead of
//! through globals. The convenience operations pump the event bus before
//! returning, so subscribers have seen every event an operation caused.

use bloomstead_common::{InventoryId, RecipeId, TilePos};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::crafting::CraftingManager;
use crate::data::GameData;
use crate::events::{EventBus, DEFAULT_HISTORY_CAPACITY};
use crate::farming::FarmingManager;
use crate::inventory::{
    InventoryManager, InventoryResult, DEFAULT_HOTBAR_SLOTS, DEFAULT_PLAYER_SLOTS, HOTBAR_SIZE,
};
use crate::item::{Item, ItemRegistry};
use crate::player::PlayerState;
use crate::tilemap::{
    GridTileMap, RecordingTileMap, TileChange, TileMap, FARM_LAYER, TILLED_SOIL_TILE,
};

/// Settings for building a session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Player inventory size
    pub player_slots: usize,
    /// Player inventory slots behind the hotbar
    pub hotbar_slots: [usize; HOTBAR_SIZE],
    /// Debug event history size, if enabled
    pub event_history: Option<usize>,
    /// Water added per watering
    pub watering_amount: u32,
    /// Player spawn point
    pub spawn: (f32, f32),
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            player_slots: DEFAULT_PLAYER_SLOTS,
            hotbar_slots: DEFAULT_HOTBAR_SLOTS,
            event_history: None,
            watering_amount: 1,
            spawn: (0.0, 0.0),
        }
    }
}

impl SessionConfig {
    /// Enables the debug event history with the default size.
    #[must_use]
    pub fn with_debug_history(mut self) -> Self {
        self.event_history = Some(DEFAULT_HISTORY_CAPACITY);
        self
    }
}

/// Everything one running game owns.
#[derive(Debug)]
pub struct GameSession {
    registry: Arc<ItemRegistry>,
    player: PlayerState,
    inventory: InventoryManager,
    crafting: CraftingManager,
    farming: FarmingManager,
    tiles: RecordingTileMap,
    bus: EventBus,
}

impl GameSession {
    /// Creates a session over an in-memory tile map.
    pub fn new(data: GameData, config: SessionConfig) -> InventoryResult<Self> {
        Self::with_tile_map(data, config, Box::new(GridTileMap::new()))
    }

    /// Creates a session over the given tile map.
    pub fn with_tile_map(
        data: GameData,
        config: SessionConfig,
        map: Box<dyn TileMap>,
    ) -> InventoryResult<Self> {
        let mut bus = match config.event_history {
            Some(capacity) => EventBus::with_history(capacity),
            None => EventBus::new(),
        };
        let registry = Arc::new(data.registry);

        let inventory =
            InventoryManager::new(config.player_slots, config.hotbar_slots, bus.sender())?;

        let mut crafting = CraftingManager::new(Arc::clone(&registry), bus.sender());
        for recipe in data.recipes {
            crafting.register_recipe(recipe);
        }

        let mut farming = FarmingManager::new(Arc::clone(&registry), bus.sender())
            .with_watering_amount(config.watering_amount);
        for crop in data.crops {
            farming.register_crop(crop);
        }

        let tiles = RecordingTileMap::new(map, bus.sender());
        bus.pump();

        info!(
            materials = registry.len(),
            recipes = crafting.recipe_count(),
            "session started"
        );
        Ok(Self {
            registry,
            player: PlayerState::new(config.spawn.0, config.spawn.1),
            inventory,
            crafting,
            farming,
            tiles,
            bus,
        })
    }

    /// Material table.
    #[must_use]
    pub fn registry(&self) -> &Arc<ItemRegistry> {
        &self.registry
    }

    /// Player state.
    #[must_use]
    pub fn player(&self) -> &PlayerState {
        &self.player
    }

    /// Mutable player state.
    pub fn player_mut(&mut self) -> &mut PlayerState {
        &mut self.player
    }

    /// Inventory manager.
    #[must_use]
    pub fn inventory(&self) -> &InventoryManager {
        &self.inventory
    }

    /// Mutable inventory manager. Call [`Self::pump_events`] afterwards.
    pub fn inventory_mut(&mut self) -> &mut InventoryManager {
        &mut self.inventory
    }

    /// Crafting manager.
    #[must_use]
    pub fn crafting(&self) -> &CraftingManager {
        &self.crafting
    }

    /// Farming manager.
    #[must_use]
    pub fn farming(&self) -> &FarmingManager {
        &self.farming
    }

    /// Mutable farming manager. Call [`Self::pump_events`] afterwards.
    pub fn farming_mut(&mut self) -> &mut FarmingManager {
        &mut self.farming
    }

    /// Recording tile map.
    #[must_use]
    pub fn tiles(&self) -> &RecordingTileMap {
        &self.tiles
    }

    /// Mutable tile map. Call [`Self::pump_events`] afterwards.
    pub fn tiles_mut(&mut self) -> &mut RecordingTileMap {
        &mut self.tiles
    }

    /// Event bus, for subscribing.
    pub fn events(&mut self) -> &mut EventBus {
        &mut self.bus
    }

    /// Dispatches queued events.
    pub fn pump_events(&mut self) -> usize {
        self.bus.pump()
    }

    /// Creates an item of a registered material.
    #[must_use]
    pub fn create_item(&self, id: &str, quantity: u32) -> Option<Item> {
        self.registry.create_item(id, quantity)
    }

    /// Adds an item to the player inventory.
    pub fn give_player(&mut self, item: Item) -> bool {
        let added = self.inventory.add_item(item, &InventoryId::player());
        self.bus.pump();
        added
    }

    /// Tills a tile: places soil on the farm layer and makes the tile
    /// farmable. Returns false if it already was.
    pub fn till_soil(&mut self, pos: TilePos) -> bool {
        if self.farming.is_farmable(pos) {
            return false;
        }
        self.tiles.put_tile(FARM_LAYER, pos, TILLED_SOIL_TILE);
        self.farming.register_farmable(pos);
        self.bus.pump();
        true
    }

    /// Plants the seed in the selected hotbar entry. One seed is taken
    /// from the hotbar slot on success.
    pub fn plant_seed_from_hotbar(&mut self, pos: TilePos) -> bool {
        let selected = self.inventory.selected_hotbar();
        let (Some(slot), Some(seed)) = (
            self.inventory.hotbar_slot_index(selected),
            self.inventory.selected_item().cloned(),
        ) else {
            debug!("no item in hotbar entry {selected}");
            return false;
        };

        if !self.farming.plant_seed(&seed, pos) {
            self.bus.pump();
            return false;
        }
        let taken = self
            .inventory
            .remove_item_from_slot(slot, Some(1), &InventoryId::player());
        if !taken {
            warn!(slot, "planted seed could not be taken from the hotbar");
        }
        self.bus.pump();
        true
    }

    /// Waters the crop at a position.
    pub fn water_crop(&mut self, pos: TilePos) -> bool {
        let watered = self.farming.water_crop(pos);
        self.bus.pump();
        watered
    }

    /// Harvests a grown crop into the player inventory. The crop stays in
    /// the ground if the inventory has no room.
    pub fn harvest_crop(&mut self, pos: TilePos) -> Option<Item> {
        let produce = self
            .farming
            .crop_at(pos)
            .filter(|crop| crop.grown)
            .map(|crop| crop.definition.produce.clone())?;
        let material = self.registry.get(produce.as_str())?;
        if self.inventory.player().free_capacity_for(material) == 0 {
            debug!(%pos, "no room for harvest");
            return None;
        }

        let item = self.farming.harvest_crop(pos)?;
        self.inventory
            .add_item(item.clone(), &InventoryId::player());
        self.bus.pump();
        Some(item)
    }

    /// Crafts a recipe from the player inventory.
    pub fn craft(&mut self, recipe_id: &RecipeId) -> bool {
        let crafted = match self.inventory.view(&InventoryId::player()) {
            Ok(mut view) => self.crafting.craft_item(recipe_id, &mut view),
            Err(e) => {
                warn!("craft failed: {e}");
                false
            },
        };
        self.bus.pump();
        crafted
    }

    /// Ends the day. Returns the positions of crops that finished growing.
    pub fn end_day(&mut self) -> Vec<TilePos> {
        let grown = self.farming.advance_day();
        self.bus.pump();
        grown
    }

    /// Replaces the map with a replay of `changes`. Farmable tiles are
    /// rebuilt from the farm layer and every crop is removed.
    pub fn restore_map(&mut self, changes: &[TileChange]) {
        self.tiles.reset();
        self.farming.reset();
        self.tiles.replay(changes);
        for change in changes.iter().filter(|c| c.layer == FARM_LAYER) {
            if change.is_removal() {
                self.farming.unregister_farmable(change.pos);
            } else {
                self.farming.register_farmable(change.pos);
            }
        }
        self.bus.pump();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crafting::Recipe;
    use crate::events::{EventKind, GameEvent};
    use crate::farming::CropDefinition;
    use crate::item::{Material, MaterialCategory};
    use std::cell::RefCell;
    use std::rc::Rc;

    fn data() -> GameData {
        let mut registry = ItemRegistry::new();
        registry.register(Material::new("carrot_seed", "Carrot Seeds", MaterialCategory::Seed));
        registry.register(Material::new("carrot", "Carrot", MaterialCategory::Crop).with_max_stack(2));
        registry.register(Material::new("soup", "Soup", MaterialCategory::Consumable));
        GameData {
            registry,
            recipes: vec![Recipe::new("soup", "Soup", "soup", 1).with_ingredient("carrot", 2)],
            crops: vec![CropDefinition::new("carrot", "Carrot", "carrot_seed", "carrot", 1)],
        }
    }

    fn session() -> GameSession {
        let mut session = GameSession::new(data(), SessionConfig::default().with_debug_history())
            .expect("default layout");
        let seeds = session.create_item("carrot_seed", 3).expect("seeds");
        assert!(session.give_player(seeds));
        session
    }

    #[test]
    fn test_farm_day_cycle() {
        let mut session = session();
        let pos = TilePos::new(4, 4);

        assert!(!session.plant_seed_from_hotbar(pos));
        assert!(session.till_soil(pos));
        assert!(!session.till_soil(pos));
        assert!(session.plant_seed_from_hotbar(pos));
        assert_eq!(
            session.inventory().hotbar_item(0).map(|i| i.quantity),
            Some(2)
        );

        assert!(session.water_crop(pos));
        assert!(session.harvest_crop(pos).is_none());
        assert_eq!(session.end_day(), vec![pos]);

        let carrot = session.harvest_crop(pos).expect("grown");
        assert_eq!(carrot.id().as_str(), "carrot");
        assert_eq!(
            session
                .inventory()
                .count_material(&InventoryId::player(), &"carrot".into()),
            1
        );
        assert!(session.farming().crop_at(pos).is_none());
    }

    #[test]
    fn test_craft_from_player_inventory() {
        let mut session = session();
        let carrots = session.create_item("carrot", 2).expect("carrots");
        session.give_player(carrots);

        let completed = Rc::new(RefCell::new(false));
        let flag = Rc::clone(&completed);
        session
            .events()
            .subscribe(EventKind::CraftCompleted, move |_| *flag.borrow_mut() = true);

        assert!(session.craft(&"soup".into()));
        assert!(*completed.borrow());
        assert!(!session.craft(&"soup".into()));
    }

    #[test]
    fn test_events_recorded_in_history() {
        let mut session = session();
        session.till_soil(TilePos::new(0, 0));
        session.end_day();

        let history = session.events().history().expect("debug history");
        let kinds: Vec<_> = history.entries().map(|e| e.event.kind()).collect();
        assert!(kinds.contains(&EventKind::TileChanged));
        assert!(kinds.contains(&EventKind::DayChanged));
        assert!(matches!(
            history.entries().last().map(|e| &e.event),
            Some(GameEvent::DayChanged { day: 2 })
        ));
    }

    #[test]
    fn test_restore_map_rebuilds_farmland() {
        let mut session = session();
        session.till_soil(TilePos::new(0, 0));
        session.till_soil(TilePos::new(1, 0));
        session.tiles_mut().remove_tile(FARM_LAYER, TilePos::new(0, 0));
        let changes = session.tiles().changes().to_vec();

        let mut other = GameSession::new(data(), SessionConfig::default()).expect("session");
        other.till_soil(TilePos::new(9, 9));
        other.restore_map(&changes);

        assert_eq!(other.farming().farmable_tiles(), vec![TilePos::new(1, 0)]);
        assert_eq!(other.tiles().changes(), changes.as_slice());
        assert_eq!(other.tiles().tile_at(FARM_LAYER, TilePos::new(9, 9)), None);
    }
}
