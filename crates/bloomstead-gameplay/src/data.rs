//! Static game data loading.
//!
//! Materials, recipes and crops come from three TOML files in a data
//! directory:
//!
//! ```toml
//! # materials.toml
//! [[material]]
//! id = "wood"
//! name = "Wood"
//! category = "resource"
//!
//! # recipes.toml
//! [[recipe]]
//! id = "fence"
//! name = "Wooden Fence"
//! result = { item = "fence", quantity = 2 }
//! ingredients = [{ item = "wood", quantity = 3 }]
//!
//! # crops.toml
//! [[crop]]
//! id = "carrot"
//! name = "Carrot"
//! seed = "carrot_seed"
//! produce = "carrot"
//! growth_days = 3
//! ```

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use bloomstead_common::{CropId, RecipeId};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::crafting::Recipe;
use crate::farming::CropDefinition;
use crate::item::{ItemRegistry, Material};

/// Material table file name.
pub const MATERIALS_FILE: &str = "materials.toml";

/// Recipe table file name.
pub const RECIPES_FILE: &str = "recipes.toml";

/// Crop table file name.
pub const CROPS_FILE: &str = "crops.toml";

/// Errors that can occur while loading game data.
#[derive(Debug, Error)]
pub enum DataLoadError {
    /// Failed to read a file
    #[error("Failed to read {path:?}: {source}")]
    Read {
        /// File path
        path: PathBuf,
        /// Underlying error
        source: std::io::Error,
    },
    /// Failed to parse TOML
    #[error("Failed to parse {file}: {source}")]
    Parse {
        /// File name
        file: String,
        /// Underlying error
        source: toml::de::Error,
    },
    /// Same ID defined twice
    #[error("Duplicate {kind} ID: {id}")]
    DuplicateId {
        /// Table the ID belongs to
        kind: &'static str,
        /// The duplicated ID
        id: String,
    },
    /// Reference to a material that does not exist
    #[error("{owner} references unknown material {material}")]
    UnknownMaterial {
        /// Recipe or crop holding the reference
        owner: String,
        /// Missing material
        material: String,
    },
    /// Entry fails a value check
    #[error("Invalid entry {id}: {reason}")]
    Invalid {
        /// Offending entry
        id: String,
        /// What is wrong
        reason: String,
    },
}

/// Result type for data loading.
pub type DataLoadResult<T> = Result<T, DataLoadError>;

#[derive(Debug, Default, Serialize, Deserialize)]
struct MaterialFile {
    #[serde(default, rename = "material")]
    materials: Vec<Material>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct RecipeFile {
    #[serde(default, rename = "recipe")]
    recipes: Vec<Recipe>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct CropFile {
    #[serde(default, rename = "crop")]
    crops: Vec<CropDefinition>,
}

/// All static tables of the game.
#[derive(Debug, Clone, Default)]
pub struct GameData {
    /// Material table
    pub registry: ItemRegistry,
    /// Recipe list
    pub recipes: Vec<Recipe>,
    /// Crop list
    pub crops: Vec<CropDefinition>,
}

impl GameData {
    /// Parses and validates the three tables. Any bad entry fails the load.
    pub fn from_sources(materials: &str, recipes: &str, crops: &str) -> DataLoadResult<Self> {
        let materials: MaterialFile = parse(MATERIALS_FILE, materials)?;
        let recipes: RecipeFile = parse(RECIPES_FILE, recipes)?;
        let crops: CropFile = parse(CROPS_FILE, crops)?;
        assemble(materials, recipes, crops, true)
    }

    /// The tables shipped with the game.
    pub fn builtin() -> DataLoadResult<Self> {
        Self::from_sources(
            include_str!("../../../assets/data/materials.toml"),
            include_str!("../../../assets/data/recipes.toml"),
            include_str!("../../../assets/data/crops.toml"),
        )
    }

    /// Loads all tables from a directory.
    pub fn load_from_dir(dir: &Path) -> DataLoadResult<Self> {
        debug!("Loading game data from {:?}", dir);
        let read = |file: &str| {
            let path = dir.join(file);
            fs::read_to_string(&path).map_err(|source| DataLoadError::Read { path, source })
        };
        let data = Self::from_sources(&read(MATERIALS_FILE)?, &read(RECIPES_FILE)?, &read(CROPS_FILE)?)?;
        data.log_summary();
        Ok(data)
    }

    /// Loads what it can: an unreadable file becomes an empty table and a
    /// bad entry is skipped, each with a warning.
    #[must_use]
    pub fn load_or_empty(dir: &Path) -> Self {
        let materials: MaterialFile = load_lenient(dir, MATERIALS_FILE);
        let recipes: RecipeFile = load_lenient(dir, RECIPES_FILE);
        let crops: CropFile = load_lenient(dir, CROPS_FILE);
        match assemble(materials, recipes, crops, false) {
            Ok(data) => {
                data.log_summary();
                data
            },
            Err(e) => {
                // Lenient assembly only skips entries.
                warn!("Game data unusable, starting empty: {}", e);
                Self::default()
            },
        }
    }

    fn log_summary(&self) {
        info!(
            "Loaded {} materials, {} recipes, {} crops",
            self.registry.len(),
            self.recipes.len(),
            self.crops.len()
        );
    }
}

fn parse<T: for<'de> Deserialize<'de>>(file: &str, content: &str) -> DataLoadResult<T> {
    toml::from_str(content).map_err(|source| DataLoadError::Parse {
        file: file.to_string(),
        source,
    })
}

fn load_lenient<T: for<'de> Deserialize<'de> + Default>(dir: &Path, file: &str) -> T {
    let path = dir.join(file);
    let loaded = fs::read_to_string(&path)
        .map_err(|source| DataLoadError::Read {
            path: path.clone(),
            source,
        })
        .and_then(|content| parse(file, &content));
    match loaded {
        Ok(table) => table,
        Err(e) => {
            warn!("Failed to load {:?}, using an empty table: {}", path, e);
            T::default()
        },
    }
}

/// Applies `result` strictly (propagate) or leniently (warn and skip).
fn check(strict: bool, result: DataLoadResult<()>) -> DataLoadResult<bool> {
    match result {
        Ok(()) => Ok(true),
        Err(e) if strict => Err(e),
        Err(e) => {
            warn!("Skipping data entry: {}", e);
            Ok(false)
        },
    }
}

fn known(registry: &ItemRegistry, owner: &str, material: &str) -> DataLoadResult<()> {
    if registry.contains(material) {
        Ok(())
    } else {
        Err(DataLoadError::UnknownMaterial {
            owner: owner.to_string(),
            material: material.to_string(),
        })
    }
}

fn validate_recipe(
    recipe: &Recipe,
    registry: &ItemRegistry,
    seen: &mut HashSet<RecipeId>,
) -> DataLoadResult<()> {
    if !seen.insert(recipe.id.clone()) {
        return Err(DataLoadError::DuplicateId {
            kind: "recipe",
            id: recipe.id.to_string(),
        });
    }
    if recipe.result.quantity == 0 {
        return Err(DataLoadError::Invalid {
            id: recipe.id.to_string(),
            reason: "result quantity is zero".into(),
        });
    }
    let owner = format!("recipe {}", recipe.id);
    known(registry, &owner, recipe.result.item.as_str())?;
    recipe
        .ingredients
        .iter()
        .try_for_each(|ingredient| known(registry, &owner, ingredient.item.as_str()))
}

fn validate_crop(
    crop: &CropDefinition,
    registry: &ItemRegistry,
    seen: &mut HashSet<CropId>,
) -> DataLoadResult<()> {
    if !seen.insert(crop.id.clone()) {
        return Err(DataLoadError::DuplicateId {
            kind: "crop",
            id: crop.id.to_string(),
        });
    }
    if crop.growth_days == 0 {
        return Err(DataLoadError::Invalid {
            id: crop.id.to_string(),
            reason: "growth_days is zero".into(),
        });
    }
    let owner = format!("crop {}", crop.id);
    known(registry, &owner, crop.seed.as_str())?;
    known(registry, &owner, crop.produce.as_str())
}

fn assemble(
    materials: MaterialFile,
    recipes: RecipeFile,
    crops: CropFile,
    strict: bool,
) -> DataLoadResult<GameData> {
    let mut registry = ItemRegistry::new();
    for material in materials.materials {
        let result = if registry.contains(material.id.as_str()) {
            Err(DataLoadError::DuplicateId {
                kind: "material",
                id: material.id.to_string(),
            })
        } else {
            Ok(())
        };
        if check(strict, result)? {
            registry.register(material);
        }
    }

    let mut recipe_ids = HashSet::new();
    let mut kept_recipes = Vec::new();
    for recipe in recipes.recipes {
        if check(strict, validate_recipe(&recipe, &registry, &mut recipe_ids))? {
            kept_recipes.push(recipe);
        }
    }

    let mut crop_ids = HashSet::new();
    let mut kept_crops = Vec::new();
    for crop in crops.crops {
        if check(strict, validate_crop(&crop, &registry, &mut crop_ids))? {
            kept_crops.push(crop);
        }
    }

    Ok(GameData {
        registry,
        recipes: kept_recipes,
        crops: kept_crops,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const MATERIALS: &str = r#"
        [[material]]
        id = "wood"
        name = "Wood"
        category = "resource"

        [[material]]
        id = "fence"
        name = "Fence"
        category = "furniture"
        max_stack = 20

        [[material]]
        id = "carrot_seed"
        name = "Carrot Seed"
        category = "seed"

        [[material]]
        id = "carrot"
        name = "Carrot"
        category = "crop"
    "#;

    const RECIPES: &str = r#"
        [[recipe]]
        id = "fence"
        name = "Fence"
        result = { item = "fence", quantity = 2 }
        ingredients = [{ item = "wood", quantity = 3 }]
    "#;

    const CROPS: &str = r#"
        [[crop]]
        id = "carrot"
        name = "Carrot"
        seed = "carrot_seed"
        produce = "carrot"
        growth_days = 3
    "#;

    #[test]
    fn test_from_sources() {
        let data = GameData::from_sources(MATERIALS, RECIPES, CROPS).expect("valid data");
        assert_eq!(data.registry.len(), 4);
        assert_eq!(data.registry.get("fence").map(|m| m.max_stack), Some(20));
        assert_eq!(data.recipes.len(), 1);
        assert_eq!(data.crops[0].water_requirement, 1);
    }

    #[test]
    fn test_unknown_material_rejected() {
        let recipes = r#"
            [[recipe]]
            id = "gate"
            name = "Gate"
            result = { item = "gate", quantity = 1 }
        "#;
        let err = GameData::from_sources(MATERIALS, recipes, CROPS).expect_err("gate is unknown");
        assert!(matches!(err, DataLoadError::UnknownMaterial { .. }));
    }

    #[test]
    fn test_duplicate_material_rejected() {
        let materials = format!("{MATERIALS}\n[[material]]\nid = \"wood\"\nname = \"Wood again\"\n");
        let err = GameData::from_sources(&materials, RECIPES, CROPS).expect_err("duplicate");
        assert!(matches!(err, DataLoadError::DuplicateId { kind: "material", .. }));
    }

    #[test]
    fn test_load_from_dir_and_lenient_fallback() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(dir.path().join(MATERIALS_FILE), MATERIALS).expect("write");
        fs::write(dir.path().join(RECIPES_FILE), RECIPES).expect("write");

        assert!(matches!(
            GameData::load_from_dir(dir.path()),
            Err(DataLoadError::Read { .. })
        ));

        let data = GameData::load_or_empty(dir.path());
        assert_eq!(data.registry.len(), 4);
        assert_eq!(data.recipes.len(), 1);
        assert!(data.crops.is_empty());

        fs::write(dir.path().join(CROPS_FILE), CROPS).expect("write");
        let data = GameData::load_from_dir(dir.path()).expect("complete data");
        assert_eq!(data.crops.len(), 1);
    }

    #[test]
    fn test_lenient_skips_bad_entries() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(dir.path().join(MATERIALS_FILE), MATERIALS).expect("write");
        let crops = format!("{CROPS}\n[[crop]]\nid = \"ghost\"\nname = \"Ghost\"\nseed = \"nope\"\nproduce = \"carrot\"\ngrowth_days = 1\n");
        fs::write(dir.path().join(CROPS_FILE), crops).expect("write");

        let data = GameData::load_or_empty(dir.path());
        assert_eq!(data.crops.len(), 1);
        assert_eq!(data.crops[0].id.as_str(), "carrot");
    }

    #[test]
    fn test_builtin_data_is_valid() {
        let data = GameData::builtin().expect("shipped data");
        assert!(!data.registry.is_empty());
        assert!(!data.recipes.is_empty());
        assert!(!data.crops.is_empty());
    }
}
