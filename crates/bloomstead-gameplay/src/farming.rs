//! Crop farming.
//!
//! Crops live on registered farmable tiles, at most one per tile. Each crop
//! follows `planted -> (daily tick, watered or not) -> grown`; a grown crop
//! stays in the ground until harvested. Growth only happens in
//! [`FarmingManager::advance_day`], and only for crops whose water level met
//! the daily requirement.

use ahash::{AHashMap, AHashSet};
use bloomstead_common::{CropId, MaterialId, TilePos};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::events::{EventSender, GameEvent};
use crate::item::{Item, ItemRegistry};

/// Farming error types.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FarmingError {
    /// Tile was never tilled
    #[error("Tile {0} is not farmable")]
    NotFarmable(TilePos),
    /// Tile already has a crop
    #[error("Tile {0} already has a crop")]
    Occupied(TilePos),
    /// No crop grows from this item
    #[error("{0} is not a seed")]
    NotASeed(MaterialId),
    /// Nothing planted here
    #[error("No crop at {0}")]
    NoCrop(TilePos),
    /// Watered earlier the same day
    #[error("Crop at {0} was already watered today")]
    AlreadyWatered(TilePos),
    /// Crop still growing
    #[error("Crop at {0} is not grown yet")]
    NotGrown(TilePos),
    /// Produce material is not registered
    #[error("Unknown produce material: {0}")]
    UnknownProduce(MaterialId),
}

/// Result type for farming operations.
pub type FarmingResult<T> = Result<T, FarmingError>;

fn default_water_requirement() -> u32 {
    1
}

/// Static growth data for one crop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CropDefinition {
    /// Crop identifier
    pub id: CropId,
    /// Display name
    pub name: String,
    /// Material that plants this crop
    pub seed: MaterialId,
    /// Material handed out on harvest
    pub produce: MaterialId,
    /// Watered days needed to grow
    pub growth_days: u32,
    /// Water consumed per day
    #[serde(default = "default_water_requirement")]
    pub water_requirement: u32,
}

impl CropDefinition {
    /// Creates a crop definition needing one unit of water per day.
    #[must_use]
    pub fn new(
        id: impl Into<CropId>,
        name: impl Into<String>,
        seed: impl Into<MaterialId>,
        produce: impl Into<MaterialId>,
        growth_days: u32,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            seed: seed.into(),
            produce: produce.into(),
            growth_days,
            water_requirement: 1,
        }
    }

    /// Sets the daily water requirement.
    #[must_use]
    pub fn with_water_requirement(mut self, water: u32) -> Self {
        self.water_requirement = water;
        self
    }
}

/// One crop in the ground.
#[derive(Debug, Clone, PartialEq)]
pub struct PlantedCrop {
    /// Tile position
    pub position: TilePos,
    /// Growth data
    pub definition: Arc<CropDefinition>,
    /// Day of planting
    pub planted_day: u32,
    /// Last day the crop was watered
    pub last_watered_day: Option<u32>,
    /// Water stored for the next tick
    pub water_level: u32,
    /// Watered during the current day
    pub watered_today: bool,
    /// Days the water requirement was met
    pub days_grown: u32,
    /// Ready to harvest
    pub grown: bool,
}

impl PlantedCrop {
    /// Creates a freshly planted crop.
    #[must_use]
    pub fn new(position: TilePos, definition: Arc<CropDefinition>, planted_day: u32) -> Self {
        Self {
            position,
            definition,
            planted_day,
            last_watered_day: None,
            water_level: 0,
            watered_today: false,
            days_grown: 0,
            grown: false,
        }
    }

    /// Growth progress in `[0.0, 1.0]`.
    #[must_use]
    pub fn progress(&self) -> f32 {
        if self.grown || self.definition.growth_days == 0 {
            return 1.0;
        }
        (self.days_grown as f32 / self.definition.growth_days as f32).min(1.0)
    }

    /// Runs the day-change tick. Returns true if the crop became grown.
    fn tick(&mut self) -> bool {
        let requirement = self.definition.water_requirement;
        let met = self.water_level >= requirement;
        let mut became_grown = false;

        if met && !self.grown {
            self.days_grown += 1;
            if self.days_grown >= self.definition.growth_days {
                self.grown = true;
                became_grown = true;
            }
        }

        self.water_level = self.water_level.saturating_sub(requirement);
        self.watered_today = false;
        became_grown
    }
}

/// Farming system manager.
#[derive(Debug)]
pub struct FarmingManager {
    definitions: AHashMap<CropId, Arc<CropDefinition>>,
    by_seed: AHashMap<MaterialId, CropId>,
    crops: AHashMap<TilePos, PlantedCrop>,
    farmable: AHashSet<TilePos>,
    current_day: u32,
    watering_amount: u32,
    registry: Arc<ItemRegistry>,
    events: EventSender,
}

impl FarmingManager {
    /// Creates a new farming manager starting on day 1.
    #[must_use]
    pub fn new(registry: Arc<ItemRegistry>, events: EventSender) -> Self {
        Self {
            definitions: AHashMap::new(),
            by_seed: AHashMap::new(),
            crops: AHashMap::new(),
            farmable: AHashSet::new(),
            current_day: 1,
            watering_amount: 1,
            registry,
            events,
        }
    }

    /// Sets how much water one watering adds.
    #[must_use]
    pub fn with_watering_amount(mut self, amount: u32) -> Self {
        self.watering_amount = amount;
        self
    }

    /// Registers a crop definition.
    pub fn register_crop(&mut self, definition: CropDefinition) {
        self.by_seed
            .insert(definition.seed.clone(), definition.id.clone());
        self.definitions
            .insert(definition.id.clone(), Arc::new(definition));
    }

    /// Gets a crop definition by ID.
    #[must_use]
    pub fn crop_definition(&self, id: &CropId) -> Option<&Arc<CropDefinition>> {
        self.definitions.get(id)
    }

    /// Gets the crop a seed plants.
    #[must_use]
    pub fn definition_for_seed(&self, seed: &MaterialId) -> Option<&Arc<CropDefinition>> {
        self.by_seed
            .get(seed)
            .and_then(|id| self.definitions.get(id))
    }

    /// Marks a tile as farmable.
    pub fn register_farmable(&mut self, pos: TilePos) {
        self.farmable.insert(pos);
    }

    /// Unmarks a tile. Fails while a crop grows there.
    pub fn unregister_farmable(&mut self, pos: TilePos) -> bool {
        if self.crops.contains_key(&pos) {
            return false;
        }
        self.farmable.remove(&pos)
    }

    /// Checks if a tile accepts seeds.
    #[must_use]
    pub fn is_farmable(&self, pos: TilePos) -> bool {
        self.farmable.contains(&pos)
    }

    /// All farmable tiles, sorted.
    #[must_use]
    pub fn farmable_tiles(&self) -> Vec<TilePos> {
        let mut tiles: Vec<_> = self.farmable.iter().copied().collect();
        tiles.sort_unstable();
        tiles
    }

    /// Crop at a position, if any.
    #[must_use]
    pub fn crop_at(&self, pos: TilePos) -> Option<&PlantedCrop> {
        self.crops.get(&pos)
    }

    /// All crops, sorted by position.
    #[must_use]
    pub fn crops(&self) -> Vec<&PlantedCrop> {
        let mut crops: Vec<_> = self.crops.values().collect();
        crops.sort_unstable_by_key(|crop| crop.position);
        crops
    }

    /// Number of planted crops.
    #[must_use]
    pub fn crop_count(&self) -> usize {
        self.crops.len()
    }

    /// Current in-game day.
    #[must_use]
    pub fn current_day(&self) -> u32 {
        self.current_day
    }

    /// Plants a seed. The seed item itself is not consumed here.
    pub fn plant_seed(&mut self, seed: &Item, pos: TilePos) -> bool {
        match self.try_plant_seed(seed, pos) {
            Ok(()) => true,
            Err(e) => {
                debug!("plant_seed failed: {e}");
                false
            },
        }
    }

    fn try_plant_seed(&mut self, seed: &Item, pos: TilePos) -> FarmingResult<()> {
        if !self.farmable.contains(&pos) {
            return Err(FarmingError::NotFarmable(pos));
        }
        if self.crops.contains_key(&pos) {
            return Err(FarmingError::Occupied(pos));
        }
        let definition = self
            .definition_for_seed(seed.id())
            .cloned()
            .ok_or_else(|| FarmingError::NotASeed(seed.id().clone()))?;

        let crop_id = definition.id.clone();
        self.crops
            .insert(pos, PlantedCrop::new(pos, definition, self.current_day));
        self.events.emit(GameEvent::CropPlanted {
            position: pos,
            crop_id,
            day: self.current_day,
        });
        Ok(())
    }

    /// Waters a crop. At most once per crop per day.
    pub fn water_crop(&mut self, pos: TilePos) -> bool {
        match self.try_water_crop(pos) {
            Ok(()) => true,
            Err(e) => {
                debug!("water_crop failed: {e}");
                false
            },
        }
    }

    fn try_water_crop(&mut self, pos: TilePos) -> FarmingResult<()> {
        let crop = self.crops.get_mut(&pos).ok_or(FarmingError::NoCrop(pos))?;
        if crop.watered_today {
            return Err(FarmingError::AlreadyWatered(pos));
        }
        crop.watered_today = true;
        crop.last_watered_day = Some(self.current_day);
        crop.water_level = crop.water_level.saturating_add(self.watering_amount);
        self.events.emit(GameEvent::CropWatered {
            position: pos,
            day: self.current_day,
        });
        Ok(())
    }

    /// Ends the current day: ticks every crop and moves to the next day.
    /// Returns the positions of crops that finished growing, sorted.
    pub fn advance_day(&mut self) -> Vec<TilePos> {
        let mut grown: Vec<(TilePos, CropId)> = self
            .crops
            .values_mut()
            .filter_map(|crop| {
                crop.tick()
                    .then(|| (crop.position, crop.definition.id.clone()))
            })
            .collect();
        grown.sort_unstable_by_key(|(pos, _)| *pos);

        self.current_day += 1;
        info!(day = self.current_day, grown = grown.len(), "day advanced");
        self.events.emit(GameEvent::DayChanged {
            day: self.current_day,
        });
        for (position, crop_id) in &grown {
            self.events.emit(GameEvent::CropGrown {
                position: *position,
                crop_id: crop_id.clone(),
            });
        }
        grown.into_iter().map(|(pos, _)| pos).collect()
    }

    /// Harvests a grown crop: removes it and returns one unit of produce.
    /// The tile stays farmable.
    pub fn harvest_crop(&mut self, pos: TilePos) -> Option<Item> {
        match self.try_harvest_crop(pos) {
            Ok(item) => Some(item),
            Err(e @ FarmingError::UnknownProduce(_)) => {
                warn!("harvest_crop failed: {e}");
                None
            },
            Err(e) => {
                debug!("harvest_crop failed: {e}");
                None
            },
        }
    }

    fn try_harvest_crop(&mut self, pos: TilePos) -> FarmingResult<Item> {
        let crop = self.crops.get(&pos).ok_or(FarmingError::NoCrop(pos))?;
        if !crop.grown {
            return Err(FarmingError::NotGrown(pos));
        }
        let produce = crop.definition.produce.clone();
        let item = self
            .registry
            .create_item(produce.as_str(), 1)
            .ok_or_else(|| FarmingError::UnknownProduce(produce.clone()))?;

        let crop_id = crop.definition.id.clone();
        self.crops.remove(&pos);
        self.events.emit(GameEvent::CropHarvested {
            position: pos,
            crop_id,
            produce,
        });
        Ok(item)
    }

    /// Replaces the whole crop list and the current day. Every crop's tile
    /// is registered as farmable.
    pub fn restore_crops(&mut self, current_day: u32, crops: Vec<PlantedCrop>) {
        self.crops.clear();
        self.current_day = current_day.max(1);
        for crop in crops {
            self.farmable.insert(crop.position);
            if let Some(previous) = self.crops.insert(crop.position, crop) {
                warn!(position = %previous.position, "duplicate saved crop, keeping the last");
            }
        }
        debug!(day = self.current_day, crops = self.crops.len(), "crops restored");
        self.events.emit(GameEvent::CropsRestored {
            day: self.current_day,
            crops: self.crops.len(),
        });
    }

    /// Removes every crop and farmable tile and resets to day 1.
    pub fn reset(&mut self) {
        self.crops.clear();
        self.farmable.clear();
        self.current_day = 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{EventBus, EventKind};
    use crate::item::{Material, MaterialCategory};
    use std::cell::RefCell;
    use std::rc::Rc;

    fn registry() -> Arc<ItemRegistry> {
        let mut registry = ItemRegistry::new();
        registry.register(Material::new("carrot_seed", "Carrot Seed", MaterialCategory::Seed));
        registry.register(Material::new("carrot", "Carrot", MaterialCategory::Crop));
        registry.register(Material::new("wood", "Wood", MaterialCategory::Resource));
        Arc::new(registry)
    }

    fn farming(events: EventSender) -> (FarmingManager, Item) {
        let registry = registry();
        let seed = registry.create_item("carrot_seed", 1).expect("seed");
        let mut farming = FarmingManager::new(registry, events);
        farming.register_crop(CropDefinition::new("carrot", "Carrot", "carrot_seed", "carrot", 3));
        farming.register_farmable(TilePos::new(2, 3));
        (farming, seed)
    }

    #[test]
    fn test_plant_requires_farmable_empty_tile_and_seed() {
        let (mut farming, seed) = farming(EventSender::detached());
        let pos = TilePos::new(2, 3);

        assert!(!farming.plant_seed(&seed, TilePos::new(0, 0)));
        assert!(farming.plant_seed(&seed, pos));
        assert!(!farming.plant_seed(&seed, pos));

        farming.register_farmable(TilePos::new(5, 5));
        let wood = registry().create_item("wood", 1).expect("wood");
        assert!(!farming.plant_seed(&wood, TilePos::new(5, 5)));
        assert_eq!(farming.crop_count(), 1);
        assert_eq!(farming.crop_at(pos).map(|c| c.planted_day), Some(1));
    }

    #[test]
    fn test_water_once_per_day() {
        let (mut farming, seed) = farming(EventSender::detached());
        let pos = TilePos::new(2, 3);
        farming.plant_seed(&seed, pos);

        assert!(farming.water_crop(pos));
        assert!(!farming.water_crop(pos));
        assert!(!farming.water_crop(TilePos::new(9, 9)));

        farming.advance_day();
        assert!(farming.water_crop(pos));
        assert_eq!(farming.crop_at(pos).and_then(|c| c.last_watered_day), Some(2));
    }

    #[test]
    fn test_grows_after_three_watered_days() {
        let (mut farming, seed) = farming(EventSender::detached());
        let pos = TilePos::new(2, 3);
        farming.plant_seed(&seed, pos);

        for day in 1..=3 {
            assert_eq!(farming.current_day(), day);
            assert!(farming.water_crop(pos));
            assert!(farming.harvest_crop(pos).is_none(), "not grown before day {day} tick");
            let grown = farming.advance_day();
            assert_eq!(grown.is_empty(), day < 3);
        }

        assert!(farming.crop_at(pos).is_some_and(|c| c.grown));
        let produce = farming.harvest_crop(pos).expect("grown crop");
        assert_eq!(produce.id().as_str(), "carrot");
        assert_eq!(produce.quantity, 1);
        assert!(farming.crop_at(pos).is_none());
        assert!(farming.is_farmable(pos));
    }

    #[test]
    fn test_dry_day_does_not_grow() {
        let (mut farming, seed) = farming(EventSender::detached());
        let pos = TilePos::new(2, 3);
        farming.plant_seed(&seed, pos);

        farming.water_crop(pos);
        farming.advance_day();
        farming.advance_day();
        farming.water_crop(pos);
        farming.advance_day();

        let crop = farming.crop_at(pos).expect("crop");
        assert_eq!(crop.days_grown, 2);
        assert!(!crop.grown);
        assert_eq!(crop.water_level, 0);
    }

    #[test]
    fn test_water_requirement_above_one() {
        let registry = registry();
        let seed = registry.create_item("carrot_seed", 1).expect("seed");
        let mut farming = FarmingManager::new(registry, EventSender::detached()).with_watering_amount(1);
        farming.register_crop(
            CropDefinition::new("carrot", "Carrot", "carrot_seed", "carrot", 1).with_water_requirement(2),
        );
        let pos = TilePos::new(0, 0);
        farming.register_farmable(pos);
        farming.plant_seed(&seed, pos);

        farming.water_crop(pos);
        assert!(farming.advance_day().is_empty());
        farming.water_crop(pos);
        farming.advance_day();
        farming.water_crop(pos);
        farming.water_crop(pos);
        let crop = farming.crop_at(pos).expect("crop");
        assert_eq!(crop.water_level, 1);
        assert!(!crop.grown);
    }

    #[test]
    fn test_crop_grown_fires_once() {
        let mut bus = EventBus::new();
        let (mut farming, seed) = farming(bus.sender());
        let pos = TilePos::new(2, 3);
        farming.plant_seed(&seed, pos);

        let grown = Rc::new(RefCell::new(0));
        let counter = Rc::clone(&grown);
        bus.subscribe(EventKind::CropGrown, move |_| *counter.borrow_mut() += 1);

        for _ in 0..6 {
            farming.water_crop(pos);
            farming.advance_day();
        }
        bus.pump();
        assert_eq!(*grown.borrow(), 1);
    }

    #[test]
    fn test_unregister_farmable_only_when_empty() {
        let (mut farming, seed) = farming(EventSender::detached());
        let pos = TilePos::new(2, 3);
        farming.plant_seed(&seed, pos);
        assert!(!farming.unregister_farmable(pos));
        assert!(farming.is_farmable(pos));
    }

    #[test]
    fn test_restore_replaces_crops() {
        let (mut farming, seed) = farming(EventSender::detached());
        farming.plant_seed(&seed, TilePos::new(2, 3));

        let definition = Arc::clone(farming.crop_definition(&"carrot".into()).expect("carrot"));
        let mut restored = PlantedCrop::new(TilePos::new(7, 7), definition, 4);
        restored.days_grown = 2;
        farming.restore_crops(6, vec![restored.clone()]);

        assert_eq!(farming.current_day(), 6);
        assert_eq!(farming.crops(), vec![&restored]);
        assert!(farming.is_farmable(TilePos::new(7, 7)));
        assert!(farming.crop_at(TilePos::new(2, 3)).is_none());
    }

    #[test]
    fn test_restore_announces_new_state() {
        let mut bus = EventBus::new();
        let (mut farming, _) = farming(bus.sender());
        let definition = Arc::clone(farming.crop_definition(&"carrot".into()).expect("carrot"));
        let crops = vec![
            PlantedCrop::new(TilePos::new(0, 0), Arc::clone(&definition), 1),
            PlantedCrop::new(TilePos::new(0, 1), definition, 1),
        ];

        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        bus.subscribe(EventKind::CropsRestored, move |event| {
            sink.borrow_mut().push(event.clone());
        });

        farming.restore_crops(0, crops);
        bus.pump();
        assert_eq!(*seen.borrow(), vec![GameEvent::CropsRestored { day: 1, crops: 2 }]);
    }
}
