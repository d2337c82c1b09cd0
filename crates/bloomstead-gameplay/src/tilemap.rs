//! Tile map access with change recording.
//!
//! The map itself belongs to the presentation layer and is reached through
//! the [`TileMap`] trait. Gameplay code mutates it only via
//! [`RecordingTileMap`], which keeps an ordered log of every placement and
//! removal so a save can replay them onto a fresh map.

use ahash::AHashMap;
use bloomstead_common::TilePos;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{trace, warn};

use crate::events::{EventSender, GameEvent};

/// Tile index recorded for a removal.
pub const REMOVED_TILE: i32 = -1;

/// Layer tilled soil is placed on.
pub const FARM_LAYER: &str = "farmland";

/// Tile index of tilled soil.
pub const TILLED_SOIL_TILE: u32 = 1;

/// Layered tile storage owned by the rendering side.
pub trait TileMap: fmt::Debug {
    /// Places a tile.
    fn put_tile(&mut self, layer: &str, pos: TilePos, index: u32);

    /// Removes a tile. Returns the index that was there.
    fn remove_tile(&mut self, layer: &str, pos: TilePos) -> Option<u32>;

    /// Tile index at a position.
    fn tile_at(&self, layer: &str, pos: TilePos) -> Option<u32>;

    /// Removes every tile from every layer.
    fn clear(&mut self);
}

/// One recorded map mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TileChange {
    /// Layer name
    pub layer: String,
    /// Tile position
    pub pos: TilePos,
    /// New tile index, or [`REMOVED_TILE`]
    pub tile_index: i32,
}

impl TileChange {
    /// Checks if this change removed a tile.
    #[must_use]
    pub fn is_removal(&self) -> bool {
        self.tile_index < 0
    }
}

/// In-memory layered tile map.
#[derive(Debug, Clone, Default)]
pub struct GridTileMap {
    layers: AHashMap<String, AHashMap<TilePos, u32>>,
}

impl GridTileMap {
    /// Creates an empty map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of tiles on a layer.
    #[must_use]
    pub fn tile_count(&self, layer: &str) -> usize {
        self.layers.get(layer).map_or(0, |tiles| tiles.len())
    }
}

impl TileMap for GridTileMap {
    fn put_tile(&mut self, layer: &str, pos: TilePos, index: u32) {
        self.layers
            .entry(layer.to_string())
            .or_default()
            .insert(pos, index);
    }

    fn remove_tile(&mut self, layer: &str, pos: TilePos) -> Option<u32> {
        self.layers.get_mut(layer).and_then(|tiles| tiles.remove(&pos))
    }

    fn tile_at(&self, layer: &str, pos: TilePos) -> Option<u32> {
        self.layers.get(layer).and_then(|tiles| tiles.get(&pos).copied())
    }

    fn clear(&mut self) {
        self.layers.clear();
    }
}

/// Wraps a [`TileMap`] and logs every mutation in order.
#[derive(Debug)]
pub struct RecordingTileMap {
    inner: Box<dyn TileMap>,
    log: Vec<TileChange>,
    events: EventSender,
}

impl RecordingTileMap {
    /// Wraps a map with an empty log.
    #[must_use]
    pub fn new(inner: Box<dyn TileMap>, events: EventSender) -> Self {
        Self {
            inner,
            log: Vec::new(),
            events,
        }
    }

    /// The wrapped map.
    #[must_use]
    pub fn inner(&self) -> &dyn TileMap {
        self.inner.as_ref()
    }

    /// Places a tile and records it. Indices that do not fit the log's
    /// `i32` are rejected and leave the map unchanged.
    pub fn put_tile(&mut self, layer: &str, pos: TilePos, index: u32) -> bool {
        let Ok(tile_index) = i32::try_from(index) else {
            warn!(layer, %pos, index, "tile index out of range, not placed");
            return false;
        };
        self.inner.put_tile(layer, pos, index);
        self.record(TileChange {
            layer: layer.to_string(),
            pos,
            tile_index,
        });
        true
    }

    /// Removes a tile and records the removal. Nothing is recorded if the
    /// position was already empty.
    pub fn remove_tile(&mut self, layer: &str, pos: TilePos) -> Option<u32> {
        let removed = self.inner.remove_tile(layer, pos)?;
        self.record(TileChange {
            layer: layer.to_string(),
            pos,
            tile_index: REMOVED_TILE,
        });
        Some(removed)
    }

    /// Tile index at a position.
    #[must_use]
    pub fn tile_at(&self, layer: &str, pos: TilePos) -> Option<u32> {
        self.inner.tile_at(layer, pos)
    }

    fn record(&mut self, change: TileChange) {
        trace!(layer = %change.layer, pos = %change.pos, index = change.tile_index, "tile change");
        self.events.emit(GameEvent::TileChanged {
            change: change.clone(),
        });
        self.log.push(change);
    }

    /// Recorded changes, oldest first.
    #[must_use]
    pub fn changes(&self) -> &[TileChange] {
        &self.log
    }

    /// Drops the log without touching the map.
    pub fn clear_log(&mut self) {
        self.log.clear();
    }

    /// Empties the map and the log.
    pub fn reset(&mut self) {
        self.inner.clear();
        self.log.clear();
    }

    /// Re-applies a change list in order, recording each change again.
    pub fn replay(&mut self, changes: &[TileChange]) {
        for change in changes {
            if change.is_removal() {
                self.remove_tile(&change.layer, change.pos);
            } else {
                // Non-removal indices are never negative.
                self.put_tile(&change.layer, change.pos, change.tile_index as u32);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recording() -> RecordingTileMap {
        RecordingTileMap::new(Box::new(GridTileMap::new()), EventSender::detached())
    }

    #[test]
    fn test_records_puts_and_removals() {
        let mut map = recording();
        let pos = TilePos::new(1, 2);
        map.put_tile(FARM_LAYER, pos, 4);
        assert_eq!(map.remove_tile(FARM_LAYER, pos), Some(4));
        assert_eq!(map.remove_tile(FARM_LAYER, pos), None);

        let indices: Vec<_> = map.changes().iter().map(|c| c.tile_index).collect();
        assert_eq!(indices, vec![4, REMOVED_TILE]);
    }

    #[test]
    fn test_oversized_index_rejected() {
        let mut map = recording();
        let pos = TilePos::new(0, 0);
        assert!(!map.put_tile("decor", pos, u32::MAX));
        assert_eq!(map.tile_at("decor", pos), None);
        assert!(map.changes().is_empty());

        assert!(map.put_tile("decor", pos, i32::MAX.unsigned_abs()));
        assert_eq!(map.changes()[0].tile_index, i32::MAX);
    }

    #[test]
    fn test_grid_tile_count() {
        let mut grid = GridTileMap::new();
        assert_eq!(grid.tile_count(FARM_LAYER), 0);
        grid.put_tile(FARM_LAYER, TilePos::new(0, 0), 1);
        grid.put_tile(FARM_LAYER, TilePos::new(0, 1), 1);
        grid.put_tile("decor", TilePos::new(0, 0), 3);
        assert_eq!(grid.tile_count(FARM_LAYER), 2);
        grid.remove_tile(FARM_LAYER, TilePos::new(0, 0));
        assert_eq!(grid.tile_count(FARM_LAYER), 1);
    }

    #[test]
    fn test_replay_rebuilds_map() {
        let mut original = recording();
        original.put_tile(FARM_LAYER, TilePos::new(0, 0), 1);
        original.put_tile("decor", TilePos::new(3, 3), 9);
        original.put_tile(FARM_LAYER, TilePos::new(1, 0), 1);
        original.remove_tile(FARM_LAYER, TilePos::new(0, 0));
        let log = original.changes().to_vec();

        let mut fresh = recording();
        fresh.replay(&log);

        assert_eq!(fresh.changes(), log.as_slice());
        assert_eq!(fresh.tile_at(FARM_LAYER, TilePos::new(0, 0)), None);
        assert_eq!(fresh.tile_at(FARM_LAYER, TilePos::new(1, 0)), Some(1));
        assert_eq!(fresh.tile_at("decor", TilePos::new(3, 3)), Some(9));
    }

    #[test]
    fn test_change_serializes_removal_as_minus_one() {
        let change = TileChange {
            layer: "decor".into(),
            pos: TilePos::new(5, 6),
            tile_index: REMOVED_TILE,
        };
        let json = serde_json::to_value(&change).expect("serialize");
        assert_eq!(json["tile_index"], -1);
        assert!(change.is_removal());
    }
}
