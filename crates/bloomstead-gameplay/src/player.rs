//! Player state tracked by the simulation.
//!
//! Movement and animation are driven by the rendering layer; the core only
//! keeps what a save needs plus the tile the player is acting on.

use bloomstead_common::TilePos;
use serde::{Deserialize, Serialize};

/// Size of one map tile in world units.
pub const TILE_SIZE: f32 = 16.0;

/// Default maximum health.
pub const DEFAULT_MAX_HEALTH: u32 = 100;

/// Direction the player is facing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Facing up
    Up,
    /// Facing down (default)
    #[default]
    Down,
    /// Facing left
    Left,
    /// Facing right
    Right,
}

impl Direction {
    /// Tile offset one step in this direction.
    #[must_use]
    pub const fn delta(self) -> (i32, i32) {
        match self {
            Direction::Up => (0, -1),
            Direction::Down => (0, 1),
            Direction::Left => (-1, 0),
            Direction::Right => (1, 0),
        }
    }
}

/// Position and vitals of the player.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerState {
    /// World X
    pub x: f32,
    /// World Y
    pub y: f32,
    /// Current health
    pub health: u32,
    /// Maximum health
    pub max_health: u32,
    /// Facing direction
    #[serde(default)]
    pub facing: Direction,
}

impl Default for PlayerState {
    fn default() -> Self {
        Self::new(0.0, 0.0)
    }
}

impl PlayerState {
    /// Creates a player at full health.
    #[must_use]
    pub fn new(x: f32, y: f32) -> Self {
        Self {
            x,
            y,
            health: DEFAULT_MAX_HEALTH,
            max_health: DEFAULT_MAX_HEALTH,
            facing: Direction::Down,
        }
    }

    /// Moves the player.
    pub fn set_position(&mut self, x: f32, y: f32) {
        self.x = x;
        self.y = y;
    }

    /// Tile the player stands on.
    #[must_use]
    pub fn tile_position(&self) -> TilePos {
        TilePos::new(
            (self.x / TILE_SIZE).floor() as i32,
            (self.y / TILE_SIZE).floor() as i32,
        )
    }

    /// Tile in front of the player.
    #[must_use]
    pub fn facing_tile(&self) -> TilePos {
        let (dx, dy) = self.facing.delta();
        self.tile_position().offset(dx, dy)
    }

    /// Applies damage, stopping at zero.
    pub fn damage(&mut self, amount: u32) {
        self.health = self.health.saturating_sub(amount);
    }

    /// Restores health up to the maximum.
    pub fn heal(&mut self, amount: u32) {
        self.health = self.health.saturating_add(amount).min(self.max_health);
    }

    /// Checks if the player has health left.
    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.health > 0
    }
}
