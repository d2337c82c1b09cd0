//! Slot-based inventory system.
//!
//! Every inventory is a fixed row of slots, each holding at most one
//! [`Item`] whose quantity never exceeds its material's max stack. The
//! player inventory always exists; five of its slots double as the hotbar.
//! Every mutation publishes [`GameEvent::InventoryUpdated`] with the full
//! resulting slot list.

use bloomstead_common::{InventoryId, MaterialId};
use std::collections::HashMap;
use thiserror::Error;
use tracing::{debug, warn};

use crate::events::{EventSender, GameEvent, InventoryAction, SlotSnapshot};
use crate::item::{Item, Material};

/// Default player inventory size.
pub const DEFAULT_PLAYER_SLOTS: usize = 27;

/// Number of hotbar entries.
pub const HOTBAR_SIZE: usize = 5;

/// Default hotbar slot mapping.
pub const DEFAULT_HOTBAR_SLOTS: [usize; HOTBAR_SIZE] = [0, 1, 2, 3, 4];

/// Inventory error types.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum InventoryError {
    /// No inventory with this ID
    #[error("Unknown inventory: {0}")]
    UnknownInventory(InventoryId),
    /// Inventory ID already taken
    #[error("Inventory already exists: {0}")]
    AlreadyExists(InventoryId),
    /// The player inventory cannot be removed
    #[error("The player inventory cannot be removed")]
    PlayerInventory,
    /// Slot index past the end
    #[error("Slot {slot} out of range (size {size})")]
    SlotOutOfRange {
        /// Requested slot
        slot: usize,
        /// Inventory size
        size: usize,
    },
    /// Slot holds nothing
    #[error("Slot {0} is empty")]
    EmptySlot(usize),
    /// Not enough items
    #[error("Not enough items: need {needed}, have {have}")]
    NotEnough {
        /// Amount needed
        needed: u32,
        /// Amount available
        have: u32,
    },
    /// Quantity of zero requested
    #[error("Quantity must be greater than zero")]
    ZeroQuantity,
    /// Target cannot take the items
    #[error("Not enough space: need {needed}, free {free}")]
    NoSpace {
        /// Units to place
        needed: u32,
        /// Units that fit
        free: u32,
    },
    /// Source and target are the same
    #[error("Source and target are the same")]
    SameLocation,
    /// Swap would leave a partial stack behind
    #[error("Cannot swap a partial stack")]
    PartialSwap,
    /// Target stack is already full
    #[error("Target stack is full")]
    StackFull,
    /// Slot holds a different material than expected
    #[error("Slot {slot} does not hold {expected}")]
    WrongItem {
        /// Slot checked
        slot: usize,
        /// Material expected
        expected: MaterialId,
    },
    /// Hotbar index past the end
    #[error("Invalid hotbar index: {0}")]
    InvalidHotbarIndex(usize),
}

/// Result type for inventory operations.
pub type InventoryResult<T> = Result<T, InventoryError>;

/// How much of an added item found a slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddOutcome {
    /// Units placed
    pub placed: u32,
    /// Units that did not fit
    pub leftover: Option<Item>,
}

impl AddOutcome {
    /// Checks if every unit was placed.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.leftover.is_none()
    }
}

/// An inventory container.
#[derive(Debug, Clone)]
pub struct Inventory {
    id: InventoryId,
    slots: Vec<Option<Item>>,
}

impl Inventory {
    /// Creates an empty inventory with the given number of slots.
    #[must_use]
    pub fn new(id: InventoryId, size: usize) -> Self {
        Self {
            id,
            slots: vec![None; size],
        }
    }

    /// Inventory identifier.
    #[must_use]
    pub fn id(&self) -> &InventoryId {
        &self.id
    }

    /// Number of slots.
    #[must_use]
    pub fn size(&self) -> usize {
        self.slots.len()
    }

    /// All slots in order.
    #[must_use]
    pub fn slots(&self) -> &[Option<Item>] {
        &self.slots
    }

    /// Contents of one slot.
    #[must_use]
    pub fn slot(&self, index: usize) -> Option<&Item> {
        self.slots.get(index).and_then(Option::as_ref)
    }

    /// Checks if every slot is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(Option::is_none)
    }

    /// Total units of a material across all slots.
    #[must_use]
    pub fn count_material(&self, material: &MaterialId) -> u32 {
        self.slots
            .iter()
            .flatten()
            .filter(|item| item.id() == material)
            .map(|item| item.quantity)
            .sum()
    }

    /// Units of a material that would still fit.
    #[must_use]
    pub fn free_capacity_for(&self, material: &Material) -> u32 {
        let max = material.effective_max_stack();
        self.slots
            .iter()
            .map(|slot| match slot {
                None => max,
                Some(item) if material.stackable && item.material.id == material.id => {
                    max.saturating_sub(item.quantity)
                },
                Some(_) => 0,
            })
            .fold(0u32, u32::saturating_add)
    }

    /// Units of a material that would fit once `removals` are taken out,
    /// using the same slot order as a real removal.
    #[must_use]
    pub fn free_capacity_after(&self, material: &Material, removals: &[(MaterialId, u32)]) -> u32 {
        let mut scratch = self.clone();
        for (removed, quantity) in removals {
            scratch.take_material(removed, *quantity);
        }
        scratch.free_capacity_for(material)
    }

    /// Snapshot of the slot contents for events.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Option<SlotSnapshot>> {
        self.slots
            .iter()
            .map(|slot| {
                slot.as_ref().map(|item| SlotSnapshot {
                    item_id: item.id().clone(),
                    quantity: item.quantity,
                })
            })
            .collect()
    }

    fn check_slot(&self, slot: usize) -> InventoryResult<()> {
        if slot >= self.slots.len() {
            return Err(InventoryError::SlotOutOfRange {
                slot,
                size: self.slots.len(),
            });
        }
        Ok(())
    }

    /// Stacks onto matching slots first, then fills empty slots.
    fn place(&mut self, mut item: Item) -> AddOutcome {
        let requested = item.quantity;
        let max = item.max_stack();

        if item.material.stackable {
            for existing in self.slots.iter_mut().flatten() {
                if item.quantity == 0 {
                    break;
                }
                if existing.can_stack_with(&item) && existing.quantity < max {
                    let moved = (max - existing.quantity).min(item.quantity);
                    existing.quantity += moved;
                    item.quantity -= moved;
                }
            }
        }

        for slot in &mut self.slots {
            if item.quantity == 0 {
                break;
            }
            if slot.is_none() {
                let moved = item.quantity.min(max);
                *slot = Some(item.clone_with_quantity(moved));
                item.quantity -= moved;
            }
        }

        AddOutcome {
            placed: requested - item.quantity,
            leftover: (item.quantity > 0).then_some(item),
        }
    }

    /// Removes `quantity` units of a material, last slots first.
    /// Caller must have checked the count.
    fn take_material(&mut self, material: &MaterialId, mut quantity: u32) {
        for slot in self.slots.iter_mut().rev() {
            if quantity == 0 {
                break;
            }
            if let Some(item) = slot {
                if item.id() == material {
                    let taken = item.quantity.min(quantity);
                    item.quantity -= taken;
                    quantity -= taken;
                    if item.is_empty() {
                        *slot = None;
                    }
                }
            }
        }
    }

    fn clear(&mut self) {
        self.slots.iter_mut().for_each(|slot| *slot = None);
    }
}

/// Owner of every inventory in a session.
#[derive(Debug)]
pub struct InventoryManager {
    player: Inventory,
    others: HashMap<InventoryId, Inventory>,
    hotbar: [usize; HOTBAR_SIZE],
    selected_hotbar: usize,
    events: EventSender,
}

impl InventoryManager {
    /// Creates a manager with a player inventory of `player_slots` slots
    /// whose hotbar aliases the given slot indices.
    pub fn new(
        player_slots: usize,
        hotbar: [usize; HOTBAR_SIZE],
        events: EventSender,
    ) -> InventoryResult<Self> {
        if let Some(&slot) = hotbar.iter().find(|&&slot| slot >= player_slots) {
            return Err(InventoryError::SlotOutOfRange {
                slot,
                size: player_slots,
            });
        }
        Ok(Self {
            player: Inventory::new(InventoryId::player(), player_slots),
            others: HashMap::new(),
            hotbar,
            selected_hotbar: 0,
            events,
        })
    }

    /// Creates a manager with the default player inventory layout.
    #[must_use]
    pub fn with_defaults(events: EventSender) -> Self {
        Self {
            player: Inventory::new(InventoryId::player(), DEFAULT_PLAYER_SLOTS),
            others: HashMap::new(),
            hotbar: DEFAULT_HOTBAR_SLOTS,
            selected_hotbar: 0,
            events,
        }
    }

    /// The player inventory.
    #[must_use]
    pub fn player(&self) -> &Inventory {
        &self.player
    }

    /// Gets an inventory by ID.
    #[must_use]
    pub fn get(&self, id: &InventoryId) -> Option<&Inventory> {
        if id.is_player() {
            Some(&self.player)
        } else {
            self.others.get(id)
        }
    }

    fn get_mut(&mut self, id: &InventoryId) -> InventoryResult<&mut Inventory> {
        if id.is_player() {
            Ok(&mut self.player)
        } else {
            self.others
                .get_mut(id)
                .ok_or_else(|| InventoryError::UnknownInventory(id.clone()))
        }
    }

    /// Registers a new inventory (chest, shipping bin).
    pub fn create_inventory(&mut self, id: InventoryId, size: usize) -> InventoryResult<()> {
        if self.get(&id).is_some() {
            return Err(InventoryError::AlreadyExists(id));
        }
        self.others.insert(id.clone(), Inventory::new(id, size));
        Ok(())
    }

    /// Removes an inventory and returns it.
    pub fn remove_inventory(&mut self, id: &InventoryId) -> InventoryResult<Inventory> {
        if id.is_player() {
            return Err(InventoryError::PlayerInventory);
        }
        self.others
            .remove(id)
            .ok_or_else(|| InventoryError::UnknownInventory(id.clone()))
    }

    /// IDs of every inventory, player first.
    #[must_use]
    pub fn inventory_ids(&self) -> Vec<InventoryId> {
        let mut others: Vec<_> = self.others.keys().cloned().collect();
        others.sort();
        std::iter::once(self.player.id.clone()).chain(others).collect()
    }

    /// Borrows one inventory as a crafting source and sink.
    pub fn view(&mut self, inventory_id: &InventoryId) -> InventoryResult<InventoryView<'_>> {
        if self.get(inventory_id).is_none() {
            return Err(InventoryError::UnknownInventory(inventory_id.clone()));
        }
        Ok(InventoryView {
            manager: self,
            inventory: inventory_id.clone(),
        })
    }

    /// Total units of a material in an inventory.
    #[must_use]
    pub fn count_material(&self, inventory_id: &InventoryId, material: &MaterialId) -> u32 {
        self.get(inventory_id)
            .map_or(0, |inv| inv.count_material(material))
    }

    fn notify(&self, inventory_id: &InventoryId, action: InventoryAction) {
        if let Some(inventory) = self.get(inventory_id) {
            self.events.emit(GameEvent::InventoryUpdated {
                inventory_id: inventory_id.clone(),
                action,
                slots: inventory.snapshot(),
            });
        }
    }

    /// Adds an item, stacking onto matching slots before filling empty
    /// ones. Returns whether the whole quantity was placed. Units that did
    /// fit stay placed either way; use [`Self::add_item_detailed`] to learn
    /// how many.
    pub fn add_item(&mut self, item: Item, inventory_id: &InventoryId) -> bool {
        match self.add_item_detailed(item, inventory_id) {
            Ok(outcome) => {
                if let Some(leftover) = &outcome.leftover {
                    debug!(
                        inventory = %inventory_id,
                        leftover = ?leftover,
                        "inventory full, item only partially added"
                    );
                }
                outcome.is_complete()
            },
            Err(e) => {
                warn!(inventory = %inventory_id, "add_item failed: {e}");
                false
            },
        }
    }

    /// Adds an item and reports how much was placed.
    pub fn add_item_detailed(
        &mut self,
        item: Item,
        inventory_id: &InventoryId,
    ) -> InventoryResult<AddOutcome> {
        if item.is_empty() {
            return Err(InventoryError::ZeroQuantity);
        }
        let outcome = self.get_mut(inventory_id)?.place(item);
        if outcome.placed > 0 {
            self.notify(inventory_id, InventoryAction::Add);
        }
        Ok(outcome)
    }

    /// Removes `quantity` units (or the whole stack) from a slot.
    /// Fails without changes if the slot is empty or holds too few.
    pub fn remove_item_from_slot(
        &mut self,
        slot: usize,
        quantity: Option<u32>,
        inventory_id: &InventoryId,
    ) -> bool {
        match self.take_from_slot(slot, quantity, inventory_id) {
            Ok(_) => true,
            Err(e) => {
                debug!(inventory = %inventory_id, slot, "remove_item_from_slot failed: {e}");
                false
            },
        }
    }

    /// Removes units from a slot and returns them.
    pub fn take_from_slot(
        &mut self,
        slot: usize,
        quantity: Option<u32>,
        inventory_id: &InventoryId,
    ) -> InventoryResult<Item> {
        let inventory = self.get_mut(inventory_id)?;
        inventory.check_slot(slot)?;
        let entry = &mut inventory.slots[slot];
        let item = entry.as_mut().ok_or(InventoryError::EmptySlot(slot))?;
        let quantity = quantity.unwrap_or(item.quantity);
        if quantity == 0 {
            return Err(InventoryError::ZeroQuantity);
        }
        let removed = item.split(quantity).ok_or(InventoryError::NotEnough {
            needed: quantity,
            have: item.quantity,
        })?;
        if item.is_empty() {
            *entry = None;
        }
        self.notify(inventory_id, InventoryAction::Remove);
        Ok(removed)
    }

    /// Moves items between two slots of one inventory.
    ///
    /// - Empty target: the items move over.
    /// - Same stackable material: merges up to the max stack, leaving any
    ///   remainder in the source.
    /// - Anything else: the slots swap, but only when the whole source
    ///   stack moves.
    pub fn move_item(
        &mut self,
        from: usize,
        to: usize,
        quantity: Option<u32>,
        inventory_id: &InventoryId,
    ) -> bool {
        match self.try_move_item(from, to, quantity, inventory_id) {
            Ok(action) => {
                self.notify(inventory_id, action);
                true
            },
            Err(e) => {
                debug!(inventory = %inventory_id, from, to, "move_item rejected: {e}");
                false
            },
        }
    }

    fn try_move_item(
        &mut self,
        from: usize,
        to: usize,
        quantity: Option<u32>,
        inventory_id: &InventoryId,
    ) -> InventoryResult<InventoryAction> {
        let inventory = self.get_mut(inventory_id)?;
        inventory.check_slot(from)?;
        inventory.check_slot(to)?;
        if from == to {
            return Err(InventoryError::SameLocation);
        }

        let source = inventory.slots[from]
            .as_ref()
            .ok_or(InventoryError::EmptySlot(from))?;
        let quantity = quantity.unwrap_or(source.quantity);
        if quantity == 0 {
            return Err(InventoryError::ZeroQuantity);
        }
        if quantity > source.quantity {
            return Err(InventoryError::NotEnough {
                needed: quantity,
                have: source.quantity,
            });
        }
        let whole_stack = quantity == source.quantity;

        match &inventory.slots[to] {
            None => {
                let moved = if whole_stack {
                    inventory.slots[from].take()
                } else {
                    inventory.slots[from]
                        .as_mut()
                        .and_then(|item| item.split(quantity))
                };
                inventory.slots[to] = moved;
                Ok(InventoryAction::Move)
            },
            Some(target) if target.can_stack_with(source) => {
                let space = target.max_stack().saturating_sub(target.quantity);
                if space == 0 {
                    return Err(InventoryError::StackFull);
                }
                let moved = space.min(quantity);
                if let Some(target) = inventory.slots[to].as_mut() {
                    target.quantity += moved;
                }
                let emptied = inventory.slots[from].as_mut().is_some_and(|item| {
                    item.quantity -= moved;
                    item.is_empty()
                });
                if emptied {
                    inventory.slots[from] = None;
                }
                Ok(InventoryAction::Merge)
            },
            Some(_) => {
                if !whole_stack {
                    return Err(InventoryError::PartialSwap);
                }
                inventory.slots.swap(from, to);
                Ok(InventoryAction::Swap)
            },
        }
    }

    /// Moves an item into another inventory. The target's free space is
    /// checked before anything leaves the source.
    ///
    /// With `source_slot`, the units come from that slot (which must hold
    /// the item's material); otherwise from anywhere in the source.
    pub fn transfer_item(
        &mut self,
        item: &Item,
        source_id: &InventoryId,
        target_id: &InventoryId,
        source_slot: Option<usize>,
    ) -> bool {
        match self.try_transfer_item(item, source_id, target_id, source_slot) {
            Ok(()) => {
                self.notify(source_id, InventoryAction::TransferOut);
                self.notify(target_id, InventoryAction::TransferIn);
                true
            },
            Err(e) => {
                debug!(source = %source_id, target = %target_id, "transfer_item failed: {e}");
                false
            },
        }
    }

    fn try_transfer_item(
        &mut self,
        item: &Item,
        source_id: &InventoryId,
        target_id: &InventoryId,
        source_slot: Option<usize>,
    ) -> InventoryResult<()> {
        if source_id == target_id {
            return Err(InventoryError::SameLocation);
        }
        if item.is_empty() {
            return Err(InventoryError::ZeroQuantity);
        }
        let quantity = item.quantity;
        let source = self
            .get(source_id)
            .ok_or_else(|| InventoryError::UnknownInventory(source_id.clone()))?;
        let target = self
            .get(target_id)
            .ok_or_else(|| InventoryError::UnknownInventory(target_id.clone()))?;

        let have = match source_slot {
            Some(slot) => {
                source.check_slot(slot)?;
                let held = source.slot(slot).ok_or(InventoryError::EmptySlot(slot))?;
                if held.id() != item.id() {
                    return Err(InventoryError::WrongItem {
                        slot,
                        expected: item.id().clone(),
                    });
                }
                held.quantity
            },
            None => source.count_material(item.id()),
        };
        if have < quantity {
            return Err(InventoryError::NotEnough {
                needed: quantity,
                have,
            });
        }

        let free = target.free_capacity_for(&item.material);
        if free < quantity {
            return Err(InventoryError::NoSpace {
                needed: quantity,
                free,
            });
        }

        let source = self.get_mut(source_id)?;
        let moving = match source_slot {
            Some(slot) => {
                let entry = &mut source.slots[slot];
                let moving = entry.as_mut().and_then(|held| held.split(quantity));
                if entry.as_ref().is_some_and(Item::is_empty) {
                    *entry = None;
                }
                moving.ok_or(InventoryError::EmptySlot(slot))?
            },
            None => {
                source.take_material(item.id(), quantity);
                item.clone_with_quantity(quantity)
            },
        };

        let outcome = self.get_mut(target_id)?.place(moving);
        debug_assert!(outcome.is_complete(), "capacity was checked before moving");
        Ok(())
    }

    /// Removes every listed material/quantity pair, or nothing at all if
    /// any one of them is short.
    pub fn consume_materials(
        &mut self,
        inventory_id: &InventoryId,
        requirements: &[(MaterialId, u32)],
    ) -> bool {
        let Ok(inventory) = self.get_mut(inventory_id) else {
            warn!(inventory = %inventory_id, "consume_materials on unknown inventory");
            return false;
        };

        let mut totals: HashMap<&MaterialId, u32> = HashMap::new();
        for (material, quantity) in requirements {
            let total = totals.entry(material).or_insert(0);
            *total = total.saturating_add(*quantity);
        }
        if totals
            .iter()
            .any(|(material, &needed)| inventory.count_material(material) < needed)
        {
            return false;
        }

        for (material, needed) in totals {
            inventory.take_material(material, needed);
        }
        self.notify(inventory_id, InventoryAction::Consume);
        true
    }

    /// Empties every slot of an inventory.
    pub fn clear(&mut self, inventory_id: &InventoryId) -> bool {
        match self.get_mut(inventory_id) {
            Ok(inventory) => {
                inventory.clear();
                self.notify(inventory_id, InventoryAction::Clear);
                true
            },
            Err(e) => {
                warn!("clear failed: {e}");
                false
            },
        }
    }

    /// Replaces an inventory's contents: all slots are cleared, then each
    /// `(slot, item)` entry is written. Quantities above the max stack are
    /// clamped and out-of-range slots skipped, both with a warning.
    pub fn restore(
        &mut self,
        inventory_id: &InventoryId,
        entries: Vec<(usize, Item)>,
    ) -> InventoryResult<()> {
        let inventory = self.get_mut(inventory_id)?;
        inventory.clear();
        for (slot, mut item) in entries {
            if slot >= inventory.size() {
                warn!(inventory = %inventory_id, slot, "saved slot out of range, skipped");
                continue;
            }
            if item.is_empty() {
                continue;
            }
            if item.quantity > item.max_stack() {
                warn!(
                    inventory = %inventory_id,
                    slot,
                    quantity = item.quantity,
                    "saved quantity exceeds max stack, clamped"
                );
                item.quantity = item.max_stack();
            }
            inventory.slots[slot] = Some(item);
        }
        self.notify(inventory_id, InventoryAction::Restore);
        Ok(())
    }

    /// Slot indices the hotbar maps to.
    #[must_use]
    pub fn hotbar_slots(&self) -> [usize; HOTBAR_SIZE] {
        self.hotbar
    }

    /// Player inventory slot behind a hotbar entry.
    #[must_use]
    pub fn hotbar_slot_index(&self, hotbar_index: usize) -> Option<usize> {
        self.hotbar.get(hotbar_index).copied()
    }

    /// Item shown in a hotbar entry.
    #[must_use]
    pub fn hotbar_item(&self, hotbar_index: usize) -> Option<&Item> {
        self.hotbar_slot_index(hotbar_index)
            .and_then(|slot| self.player.slot(slot))
    }

    /// Selects a hotbar entry.
    pub fn select_hotbar(&mut self, hotbar_index: usize) -> bool {
        if hotbar_index >= HOTBAR_SIZE {
            debug!("{}", InventoryError::InvalidHotbarIndex(hotbar_index));
            return false;
        }
        self.selected_hotbar = hotbar_index;
        self.events.emit(GameEvent::HotbarSelected {
            index: hotbar_index,
        });
        true
    }

    /// Currently selected hotbar entry.
    #[must_use]
    pub fn selected_hotbar(&self) -> usize {
        self.selected_hotbar
    }

    /// Item in the selected hotbar entry.
    #[must_use]
    pub fn selected_item(&self) -> Option<&Item> {
        self.hotbar_item(self.selected_hotbar)
    }
}

/// One inventory of an [`InventoryManager`], borrowed for crafting.
#[derive(Debug)]
pub struct InventoryView<'a> {
    pub(crate) manager: &'a mut InventoryManager,
    pub(crate) inventory: InventoryId,
}

impl InventoryView<'_> {
    /// The viewed inventory's ID.
    #[must_use]
    pub fn inventory_id(&self) -> &InventoryId {
        &self.inventory
    }
}
