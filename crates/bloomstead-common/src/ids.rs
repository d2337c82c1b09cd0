//! Identifier newtypes.
//!
//! Every identifier in the data files is a short string key such as
//! `"wood"` or `"carrot_seed"`. Wrapping them keeps material, recipe, crop
//! and inventory keys from being mixed up at call sites.

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Creates an identifier from a string key.
            #[must_use]
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Returns the raw string key.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self::new(id)
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(id)
            }
        }

        impl Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }
    };
}

string_id!(
    /// Identifier of a material (item type).
    MaterialId
);

string_id!(
    /// Identifier of a crafting recipe.
    RecipeId
);

string_id!(
    /// Identifier of a crop growth definition.
    CropId
);

string_id!(
    /// Identifier of an inventory container.
    InventoryId
);

impl InventoryId {
    /// Key of the player inventory, which always exists.
    pub const PLAYER: &'static str = "player";

    /// The player inventory identifier.
    #[must_use]
    pub fn player() -> Self {
        Self::new(Self::PLAYER)
    }

    /// Checks if this is the player inventory.
    #[must_use]
    pub fn is_player(&self) -> bool {
        self.0 == Self::PLAYER
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_ids_serialize_as_plain_strings() {
        let id = MaterialId::new("wood");
        let json = serde_json::to_string(&id).expect("serialize");
        assert_eq!(json, "\"wood\"");
        let back: MaterialId = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, id);
    }

    #[test]
    fn test_lookup_by_str() {
        let mut map = HashMap::new();
        map.insert(CropId::new("carrot"), 3);
        assert_eq!(map.get("carrot"), Some(&3));
    }
}
