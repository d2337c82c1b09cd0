//! Crafting system.
//!
//! The recipe engine never touches an inventory directly. It checks and
//! consumes ingredients through [`ItemSource`] and hands the result to an
//! [`ItemSink`], so the same recipes work against a player inventory, a
//! chest, or a plain slot list.

use bloomstead_common::{MaterialId, RecipeId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

use crate::events::{EventSender, GameEvent};
use crate::inventory::InventoryView;
use crate::item::{Item, ItemRegistry};

/// Crafting error types.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CraftingError {
    /// Recipe not found
    #[error("Recipe not found: {0}")]
    RecipeNotFound(RecipeId),
    /// Missing specific ingredient
    #[error("Missing ingredient: {item}, need {needed}, have {have}")]
    MissingIngredient {
        /// Material that's missing
        item: MaterialId,
        /// Amount needed
        needed: u32,
        /// Amount available
        have: u32,
    },
    /// Result material is not registered
    #[error("Unknown result material: {0}")]
    UnknownResult(MaterialId),
    /// The sink cannot take the result
    #[error("Inventory full: cannot add crafted item")]
    InventoryFull,
    /// The source refused to give up the ingredients
    #[error("Ingredient consumption failed")]
    ConsumeFailed,
}

/// Result type for crafting operations.
pub type CraftingResult<T> = Result<T, CraftingError>;

/// Read and consume access to a pool of items.
pub trait ItemSource {
    /// Total units of a material available.
    fn count_material(&self, material: &MaterialId) -> u32;

    /// Removes every ingredient, or nothing if any one is short.
    fn consume(&mut self, ingredients: &[Ingredient]) -> bool;
}

/// Somewhere crafted items can go.
pub trait ItemSink {
    /// Checks if the whole item would fit.
    fn can_accept(&self, item: &Item) -> bool;

    /// Checks if the whole item would fit once `consumed` has been taken
    /// out of the same storage.
    fn can_accept_after(&self, item: &Item, _consumed: &[Ingredient]) -> bool {
        self.can_accept(item)
    }

    /// Stores the item. Returns false if not all of it fit.
    fn deposit(&mut self, item: Item) -> bool;
}

/// Sums ingredient quantities per material, keeping first-seen order.
fn required_totals(ingredients: &[Ingredient]) -> Vec<(MaterialId, u32)> {
    let mut totals: Vec<(MaterialId, u32)> = Vec::with_capacity(ingredients.len());
    for ingredient in ingredients {
        match totals.iter_mut().find(|(item, _)| *item == ingredient.item) {
            Some((_, total)) => *total = total.saturating_add(ingredient.quantity),
            None => totals.push((ingredient.item.clone(), ingredient.quantity)),
        }
    }
    totals
}

impl ItemSource for [Option<Item>] {
    fn count_material(&self, material: &MaterialId) -> u32 {
        self.iter()
            .flatten()
            .filter(|item| item.id() == material)
            .map(|item| item.quantity)
            .sum()
    }

    fn consume(&mut self, ingredients: &[Ingredient]) -> bool {
        let totals = required_totals(ingredients);
        if totals
            .iter()
            .any(|(material, needed)| self.count_material(material) < *needed)
        {
            return false;
        }
        for (material, needed) in &totals {
            let mut remaining = *needed;
            for slot in self.iter_mut() {
                if remaining == 0 {
                    break;
                }
                if let Some(item) = slot {
                    if item.id() == material {
                        let taken = item.quantity.min(remaining);
                        item.quantity -= taken;
                        remaining -= taken;
                        if item.is_empty() {
                            *slot = None;
                        }
                    }
                }
            }
        }
        true
    }
}

impl ItemSource for InventoryView<'_> {
    fn count_material(&self, material: &MaterialId) -> u32 {
        self.manager.count_material(&self.inventory, material)
    }

    fn consume(&mut self, ingredients: &[Ingredient]) -> bool {
        self.manager
            .consume_materials(&self.inventory, &required_totals(ingredients))
    }
}

impl ItemSink for InventoryView<'_> {
    fn can_accept(&self, item: &Item) -> bool {
        self.manager
            .get(&self.inventory)
            .is_some_and(|inv| inv.free_capacity_for(&item.material) >= item.quantity)
    }

    fn can_accept_after(&self, item: &Item, consumed: &[Ingredient]) -> bool {
        self.manager.get(&self.inventory).is_some_and(|inv| {
            inv.free_capacity_after(&item.material, &required_totals(consumed)) >= item.quantity
        })
    }

    fn deposit(&mut self, item: Item) -> bool {
        self.manager.add_item(item, &self.inventory)
    }
}

/// An ingredient for a recipe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ingredient {
    /// Material required
    pub item: MaterialId,
    /// Quantity required
    pub quantity: u32,
}

impl Ingredient {
    /// Creates a new ingredient requirement.
    #[must_use]
    pub fn new(item: impl Into<MaterialId>, quantity: u32) -> Self {
        Self {
            item: item.into(),
            quantity,
        }
    }
}

/// A crafting recipe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipe {
    /// Recipe identifier
    pub id: RecipeId,
    /// Recipe name
    pub name: String,
    /// Required ingredients, in display order
    #[serde(default)]
    pub ingredients: Vec<Ingredient>,
    /// Output material and quantity
    pub result: Ingredient,
}

impl Recipe {
    /// Creates a recipe with no ingredients.
    #[must_use]
    pub fn new(
        id: impl Into<RecipeId>,
        name: impl Into<String>,
        result: impl Into<MaterialId>,
        quantity: u32,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            ingredients: Vec::new(),
            result: Ingredient::new(result, quantity),
        }
    }

    /// Adds an ingredient requirement.
    #[must_use]
    pub fn with_ingredient(mut self, item: impl Into<MaterialId>, quantity: u32) -> Self {
        self.ingredients.push(Ingredient::new(item, quantity));
        self
    }
}

/// Recipe registry and crafting engine.
#[derive(Debug)]
pub struct CraftingManager {
    recipes: HashMap<RecipeId, Recipe>,
    registry: Arc<ItemRegistry>,
    events: EventSender,
}

impl CraftingManager {
    /// Creates a new crafting manager.
    #[must_use]
    pub fn new(registry: Arc<ItemRegistry>, events: EventSender) -> Self {
        Self {
            recipes: HashMap::new(),
            registry,
            events,
        }
    }

    /// Registers a recipe, replacing one with the same ID.
    pub fn register_recipe(&mut self, recipe: Recipe) {
        self.recipes.insert(recipe.id.clone(), recipe);
    }

    /// Gets a recipe by ID.
    #[must_use]
    pub fn get_recipe(&self, id: &RecipeId) -> Option<&Recipe> {
        self.recipes.get(id)
    }

    /// Returns the number of registered recipes.
    #[must_use]
    pub fn recipe_count(&self) -> usize {
        self.recipes.len()
    }

    /// Returns all registered recipes.
    pub fn recipes(&self) -> impl Iterator<Item = &Recipe> {
        self.recipes.values()
    }

    /// Checks every ingredient against the source.
    pub fn validate_craft<S>(&self, recipe_id: &RecipeId, source: &S) -> CraftingResult<()>
    where
        S: ItemSource + ?Sized,
    {
        let recipe = self
            .recipes
            .get(recipe_id)
            .ok_or_else(|| CraftingError::RecipeNotFound(recipe_id.clone()))?;

        // Ingredients listed twice count against the same pool.
        for (item, needed) in required_totals(&recipe.ingredients) {
            let have = source.count_material(&item);
            if have < needed {
                return Err(CraftingError::MissingIngredient { item, needed, have });
            }
        }
        Ok(())
    }

    /// Checks if a recipe can be crafted from the source. Never mutates.
    pub fn can_craft<S>(&self, recipe_id: &RecipeId, source: &S) -> bool
    where
        S: ItemSource + ?Sized,
    {
        self.validate_craft(recipe_id, source).is_ok()
    }

    /// Crafts a recipe: re-validates, consumes the ingredients, then
    /// deposits the result. Nothing changes unless every step succeeds.
    pub fn craft_item<S>(&self, recipe_id: &RecipeId, inventory: &mut S) -> bool
    where
        S: ItemSource + ItemSink + ?Sized,
    {
        match self.try_craft(recipe_id, inventory) {
            Ok(item) => {
                info!(recipe = %recipe_id, result = ?item, "crafted");
                true
            },
            Err(e) => {
                debug!(recipe = %recipe_id, "craft failed: {e}");
                false
            },
        }
    }

    /// Crafts a recipe and returns a copy of the produced item.
    pub fn try_craft<S>(&self, recipe_id: &RecipeId, inventory: &mut S) -> CraftingResult<Item>
    where
        S: ItemSource + ItemSink + ?Sized,
    {
        self.validate_craft(recipe_id, &*inventory)?;
        let recipe = self
            .recipes
            .get(recipe_id)
            .ok_or_else(|| CraftingError::RecipeNotFound(recipe_id.clone()))?;

        let result = self
            .registry
            .create_item(recipe.result.item.as_str(), recipe.result.quantity)
            .ok_or_else(|| CraftingError::UnknownResult(recipe.result.item.clone()))?;

        if !inventory.can_accept_after(&result, &recipe.ingredients) {
            return Err(CraftingError::InventoryFull);
        }
        if !inventory.consume(&recipe.ingredients) {
            return Err(CraftingError::ConsumeFailed);
        }
        let produced = result.clone();
        if !inventory.deposit(result) {
            return Err(CraftingError::InventoryFull);
        }

        self.events.emit(GameEvent::CraftCompleted {
            recipe_id: recipe.id.clone(),
            result: recipe.result.item.clone(),
            quantity: recipe.result.quantity,
        });
        Ok(produced)
    }

    /// Recipes that can be crafted from the source right now, by ID.
    pub fn available_recipes<S>(&self, source: &S) -> Vec<&Recipe>
    where
        S: ItemSource + ?Sized,
    {
        let mut available: Vec<&Recipe> = self
            .recipes
            .values()
            .filter(|recipe| self.can_craft(&recipe.id, source))
            .collect();
        available.sort_by(|a, b| a.id.cmp(&b.id));
        available
    }
}
