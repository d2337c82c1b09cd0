//! # Bloomstead Common
//!
//! Common types shared by every Bloomstead crate:
//! - Identifier newtypes (materials, recipes, crops, inventories)
//! - Tile grid coordinates
//! - Schema versions for persisted data

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(clippy::unwrap_used)]

pub mod coords;
pub mod ids;
pub mod version;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::coords::*;
    pub use crate::ids::*;
    pub use crate::version::*;
}

pub use prelude::*;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tile_pos_offset() {
        let pos = TilePos::new(4, 7);
        assert_eq!(pos.offset(-1, 2), TilePos::new(3, 9));
    }

    #[test]
    fn test_player_inventory_id() {
        assert!(InventoryId::player().is_player());
        assert!(!InventoryId::new("chest_1").is_player());
    }

    #[test]
    fn test_version_compatibility() {
        let v1 = SchemaVersion::new(1, 0, 0);
        let v2 = SchemaVersion::new(1, 1, 0);
        let v3 = SchemaVersion::new(2, 0, 0);

        assert!(v2.is_compatible_with(&v1));
        assert!(!v1.is_compatible_with(&v2));
        assert!(!v1.can_read(&v3));
    }
}
