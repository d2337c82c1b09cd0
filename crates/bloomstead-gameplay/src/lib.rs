//! # Bloomstead Gameplay
//!
//! Gameplay systems for Bloomstead.
//!
//! This crate provides the simulation core the rendering layer drives:
//! - Materials, items and the item registry
//! - Static data loading (materials, recipes, crops)
//! - Slot-based inventories with a hotbar
//! - Recipe crafting over item sources and sinks
//! - Crop farming on a day clock
//! - Recorded tile map changes
//! - Event bus for inter-system communication
//! - The game session that owns all of the above

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(clippy::unwrap_used)]

pub mod crafting;
pub mod data;
pub mod events;
pub mod farming;
pub mod inventory;
pub mod item;
pub mod player;
pub mod session;
pub mod tilemap;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::crafting::*;
    pub use crate::data::*;
    pub use crate::events::*;
    pub use crate::farming::*;
    pub use crate::inventory::*;
    pub use crate::item::*;
    pub use crate::player::*;
    pub use crate::session::*;
    pub use crate::tilemap::*;
}

pub use prelude::*;
