// Core types shared across the simulation.
//
// Defines tile coordinates (`TileCoord`), undo/redo group ids, and the
// small closed enums that operation payloads carry (`StructureKind`,
// `ItemKind`, `SimSpeed`). Everything derives `Serialize`/`Deserialize`:
// these values end up inside the operation journal, so they must survive a
// save/load cycle unchanged.
//
// **Critical constraint: determinism.** Operation payloads refer to world
// entities by coordinates, never by live handles. Even the world's own maps
// are keyed by position (see `world.rs`), so iteration order depends only on
// what is on the map, not on the history that put it there.

use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Spatial types
// ---------------------------------------------------------------------------

/// A tile on the 2D colony map. X grows east, Y grows south.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TileCoord {
    pub x: i32,
    pub y: i32,
}

impl TileCoord {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    pub const fn offset(self, dx: i32, dy: i32) -> Self {
        Self::new(self.x + dx, self.y + dy)
    }

    pub fn manhattan_distance(self, other: Self) -> u32 {
        (self.x - other.x).unsigned_abs() + (self.y - other.y).unsigned_abs()
    }

    /// True if `other` shares an edge with `self` (4-neighbourhood).
    pub fn is_adjacent(self, other: Self) -> bool {
        self.manhattan_distance(other) == 1
    }

    /// The four edge neighbours, in a fixed order (E, W, S, N).
    pub fn neighbors(self) -> [TileCoord; 4] {
        [
            self.offset(1, 0),
            self.offset(-1, 0),
            self.offset(0, 1),
            self.offset(0, -1),
        ]
    }
}

impl fmt::Display for TileCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// A circular area on the map, used by structures that watch a region
/// (stock catchment, guard-house patrol).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Area {
    pub center: TileCoord,
    pub radius: u16,
}

impl Area {
    pub fn contains(&self, tile: TileCoord) -> bool {
        self.center.manhattan_distance(tile) <= self.radius as u32
    }
}

// ---------------------------------------------------------------------------
// Undo/redo groups
// ---------------------------------------------------------------------------

/// Undo/redo group. Operations sharing a group id undo and redo as one step.
///
/// Forward (player-issued) groups count up from 1. Inverses carry the
/// reflected id `MAX - group`, which keeps them disjoint from forward ids
/// and maps back onto the forward id when the inverse is itself inverted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GroupId(pub u32);

impl GroupId {
    pub const NONE: GroupId = GroupId(0);
    pub const MAX: GroupId = GroupId(u32::MAX);

    pub const fn reflect(self) -> Self {
        GroupId(Self::MAX.0 - self.0)
    }

    /// True for ids handed out by the scheduler's counter.
    pub const fn is_forward(self) -> bool {
        self.0 != 0 && self.0 <= Self::MAX.0 / 2
    }
}

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "g{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Simulation enums
// ---------------------------------------------------------------------------

/// Simulation speed settings.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SimSpeed {
    Paused,
    Normal,
    Fast,
}

/// Building types a player can place.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum StructureKind {
    Woodcutter,
    Sawmill,
    Quarry,
    Stock,
    GuardHouse,
}

impl StructureKind {
    /// Tile of the entrance flag for a structure anchored at `anchor`.
    pub const fn entrance(anchor: TileCoord) -> TileCoord {
        anchor.offset(1, 0)
    }

    /// Whether the structure consumes inputs (and so has an input buffer).
    pub fn has_input_buffer(self) -> bool {
        matches!(self, StructureKind::Sawmill)
    }

    /// Whether the structure watches an area.
    pub fn has_monitored_area(self) -> bool {
        matches!(self, StructureKind::Stock | StructureKind::GuardHouse)
    }

    pub fn has_stock_thresholds(self) -> bool {
        matches!(self, StructureKind::Stock)
    }
}

/// Goods carried along roads and kept in stock.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ItemKind {
    Log,
    Plank,
    Stone,
}

impl ItemKind {
    pub const ALL: [ItemKind; 3] = [ItemKind::Log, ItemKind::Plank, ItemKind::Stone];
}
