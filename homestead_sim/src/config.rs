// Data-driven game configuration.
//
// All tunable simulation parameters live in `GameConfig`, loaded from JSON
// at startup. World logic reads limits and intervals from here instead of
// hard-coding them, so balance changes need no recompilation.
//
// A config change alters simulation output. Replaying an old journal under
// a new config is exactly the "intentional logic change" case: run the
// replay with `ChecksumPolicy::Repair` to re-baseline the checksum table (see
// `checksum.rs`).
//
// See also: `world.rs` which reads the per-structure data and road defaults,
// `handler.rs` which reads `record_checksums`.
//
// **Critical constraint: determinism.** Config values feed directly into
// simulation logic. A recorded journal only replays cleanly under the config
// it was recorded with.

use crate::types::{ItemKind, StructureKind};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Per-structure-kind tuning.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StructureData {
    /// Upper bound for `ChangeWorkerCount`.
    pub max_workers: u8,
    /// Worker-ticks needed to produce one item.
    pub production_interval_ticks: u32,
    /// What the structure produces, if anything.
    pub output: Option<ItemKind>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GameConfig {
    /// Map width and height in tiles.
    pub map_size: (u32, u32),
    pub structures: BTreeMap<StructureKind, StructureData>,
    /// Route priority given to roads created without an explicit one.
    pub default_road_priority: i8,
    /// Haulers assigned to roads created without an explicit count.
    pub default_road_haulers: u8,
    pub max_road_haulers: u8,
    /// Items a flag can hold before production stalls.
    pub flag_item_capacity: u16,
    /// Per-tick probability (numerator / denominator) that a hauler moves
    /// one item along its road.
    pub haul_chance: (u32, u32),
    /// Record one checksum per tick while not replaying.
    pub record_checksums: bool,
}

impl Default for GameConfig {
    fn default() -> Self {
        let mut structures = BTreeMap::new();
        structures.insert(
            StructureKind::Woodcutter,
            StructureData {
                max_workers: 2,
                production_interval_ticks: 40,
                output: Some(ItemKind::Log),
            },
        );
        structures.insert(
            StructureKind::Sawmill,
            StructureData {
                max_workers: 3,
                production_interval_ticks: 60,
                output: Some(ItemKind::Plank),
            },
        );
        structures.insert(
            StructureKind::Quarry,
            StructureData {
                max_workers: 4,
                production_interval_ticks: 80,
                output: Some(ItemKind::Stone),
            },
        );
        structures.insert(
            StructureKind::Stock,
            StructureData {
                max_workers: 6,
                production_interval_ticks: 1,
                output: None,
            },
        );
        structures.insert(
            StructureKind::GuardHouse,
            StructureData {
                max_workers: 2,
                production_interval_ticks: 1,
                output: None,
            },
        );

        Self {
            map_size: (64, 64),
            structures,
            default_road_priority: 0,
            default_road_haulers: 1,
            max_road_haulers: 4,
            flag_item_capacity: 8,
            haul_chance: (1, 3),
            record_checksums: true,
        }
    }
}

impl GameConfig {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Tuning for `kind`. Kinds missing from the table get a zero-worker,
    /// non-producing entry.
    pub fn structure(&self, kind: StructureKind) -> StructureData {
        self.structures.get(&kind).cloned().unwrap_or(StructureData {
            max_workers: 0,
            production_interval_ticks: 1,
            output: None,
        })
    }
}
