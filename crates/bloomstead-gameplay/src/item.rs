//! Materials (item types) and quantity-bearing items.

use bloomstead_common::MaterialId;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

/// Default max stack size for stackable materials.
pub const DEFAULT_MAX_STACK: u32 = 99;

/// Broad grouping of materials.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MaterialCategory {
    /// Raw resources (wood, stone)
    Resource,
    /// Tools (hoe, watering can)
    Tool,
    /// Plantable seeds
    Seed,
    /// Harvested crops
    Crop,
    /// Caught fish
    Fish,
    /// Placeable furniture
    Furniture,
    /// Food and potions
    Consumable,
    /// Anything else
    #[default]
    Other,
}

impl MaterialCategory {
    /// Get the display name of this category.
    #[must_use]
    pub fn display_name(self) -> &'static str {
        match self {
            Self::Resource => "Resource",
            Self::Tool => "Tool",
            Self::Seed => "Seed",
            Self::Crop => "Crop",
            Self::Fish => "Fish",
            Self::Furniture => "Furniture",
            Self::Consumable => "Consumable",
            Self::Other => "Other",
        }
    }
}

fn default_stackable() -> bool {
    true
}

fn default_max_stack() -> u32 {
    DEFAULT_MAX_STACK
}

/// Static definition of an item type. Loaded once and shared by every
/// [`Item`] of that type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Material {
    /// Unique identifier
    pub id: MaterialId,
    /// Display name
    pub name: String,
    /// Category
    #[serde(default)]
    pub category: MaterialCategory,
    /// Whether several units share one slot
    #[serde(default = "default_stackable")]
    pub stackable: bool,
    /// Units per slot when stackable
    #[serde(default = "default_max_stack")]
    pub max_stack: u32,
    /// Icon reference for the presentation layer
    #[serde(default)]
    pub icon: Option<String>,
    /// Free-form extra data
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl Material {
    /// Creates a stackable material with the default stack size.
    #[must_use]
    pub fn new(id: impl Into<MaterialId>, name: impl Into<String>, category: MaterialCategory) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            category,
            stackable: true,
            max_stack: DEFAULT_MAX_STACK,
            icon: None,
            metadata: BTreeMap::new(),
        }
    }

    /// Sets the max stack size.
    #[must_use]
    pub fn with_max_stack(mut self, max_stack: u32) -> Self {
        self.max_stack = max_stack;
        self
    }

    /// Makes the material non-stackable.
    #[must_use]
    pub fn non_stackable(mut self) -> Self {
        self.stackable = false;
        self.max_stack = 1;
        self
    }

    /// Sets the icon reference.
    #[must_use]
    pub fn with_icon(mut self, icon: impl Into<String>) -> Self {
        self.icon = Some(icon.into());
        self
    }

    /// Units one slot can hold. Always at least 1.
    #[must_use]
    pub fn effective_max_stack(&self) -> u32 {
        if self.stackable {
            self.max_stack.max(1)
        } else {
            1
        }
    }
}

/// A quantity of one material.
#[derive(Clone)]
pub struct Item {
    /// Shared material definition
    pub material: Arc<Material>,
    /// Units held
    pub quantity: u32,
}

impl Item {
    /// Creates an item.
    #[must_use]
    pub fn new(material: Arc<Material>, quantity: u32) -> Self {
        Self { material, quantity }
    }

    /// Material identifier.
    #[must_use]
    pub fn id(&self) -> &MaterialId {
        &self.material.id
    }

    /// Units one slot can hold for this item.
    #[must_use]
    pub fn max_stack(&self) -> u32 {
        self.material.effective_max_stack()
    }

    /// Checks if the item holds no units.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.quantity == 0
    }

    /// New item of the same material with another quantity.
    #[must_use]
    pub fn clone_with_quantity(&self, quantity: u32) -> Self {
        Self {
            material: Arc::clone(&self.material),
            quantity,
        }
    }

    /// Checks if `other` may be merged onto this item's slot.
    #[must_use]
    pub fn can_stack_with(&self, other: &Item) -> bool {
        self.material.stackable && self.material.id == other.material.id
    }

    /// Takes `quantity` units off this item into a new one.
    /// Returns `None` if not enough units are held.
    pub fn split(&mut self, quantity: u32) -> Option<Item> {
        if quantity > self.quantity {
            return None;
        }
        self.quantity -= quantity;
        Some(self.clone_with_quantity(quantity))
    }
}

impl PartialEq for Item {
    fn eq(&self, other: &Self) -> bool {
        self.material.id == other.material.id && self.quantity == other.quantity
    }
}

impl Eq for Item {}

impl fmt::Debug for Item {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Item({} x{})", self.material.id, self.quantity)
    }
}

/// Lookup table of all materials.
#[derive(Debug, Clone, Default)]
pub struct ItemRegistry {
    materials: HashMap<MaterialId, Arc<Material>>,
}

impl ItemRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a material, replacing any previous definition.
    pub fn register(&mut self, material: Material) -> Arc<Material> {
        let material = Arc::new(material);
        self.materials
            .insert(material.id.clone(), Arc::clone(&material));
        material
    }

    /// Gets a material by ID.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&Arc<Material>> {
        self.materials.get(id)
    }

    /// Checks if a material is registered.
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.materials.contains_key(id)
    }

    /// Creates an item of a registered material.
    #[must_use]
    pub fn create_item(&self, id: &str, quantity: u32) -> Option<Item> {
        self.get(id).map(|m| Item::new(Arc::clone(m), quantity))
    }

    /// Number of registered materials.
    #[must_use]
    pub fn len(&self) -> usize {
        self.materials.len()
    }

    /// Checks if no materials are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.materials.is_empty()
    }

    /// Iterate over all materials.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<Material>> {
        self.materials.values()
    }
}
