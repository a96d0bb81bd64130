// The colony map that operations mutate.
//
// `ColonyWorld` is a bounded 2D tile map holding three kinds of entity:
// - **Flags** (junctions) that hold a count of items waiting to be carried.
// - **Roads**: explicit tile paths between two flags, with a route priority
//   and a hauler count.
// - **Structures** anchored on a tile, each with an entrance flag at
//   `anchor + (1, 0)` and a bag of player-adjustable settings.
//
// All three are stored in `BTreeMap`s keyed by position: flags by their
// tile, structures by their anchor, roads by their first interior tile
// (`path[1]`, unique because interior tiles belong to exactly one road).
// Positional keys keep iteration order a function of what is on the map,
// so a world rebuilt by replay iterates identically to the recorded one.
//
// Mutation happens only through the `pub(crate)` methods below, which
// `operation.rs` calls from `execute_and_invert`. Each one validates its
// preconditions up front and returns `None` without touching anything when
// they do not hold, which is what lets an operation report failure without
// leaving the world half-modified.
//
// `update()` is the per-tick world logic: structures produce, stocks
// absorb, haulers carry items along roads. Every random decision goes
// through `SimContext` (and so into the tick checksum), and every item that
// moves is additionally fed in as a marker.
//
// See also: `operation.rs` for the operations built on these primitives,
// `handler.rs` which calls `update()` once per tick, `config.rs` for limits
// and intervals.
//
// **Critical constraint: determinism.** No `HashMap`, no floats, no
// iteration over anything whose order depends on insertion history.

use crate::config::{GameConfig, StructureData};
use crate::context::SimContext;
use crate::types::{Area, ItemKind, StructureKind, TileCoord};
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet};

/// Items a structure with an input buffer can hold in it.
pub const INPUT_BUFFER_CAPACITY: u16 = 2;

// Checksum markers for item movements.
const MARK_PRODUCED: u32 = 0x5052_0000;
const MARK_BUFFERED: u32 = 0x4255_4646;
const MARK_STORED: u32 = 0x5354_4f52;
const MARK_HAULED: u32 = 0x4841_554c;

// ---------------------------------------------------------------------------
// Entities
// ---------------------------------------------------------------------------

/// A junction. Roads start and end at flags; structures deliver to the flag
/// at their entrance.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Flag {
    pub items: u16,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Road {
    /// Every tile from the start flag to the end flag, inclusive. At least
    /// three tiles, since flags are never adjacent.
    pub path: Vec<TileCoord>,
    /// Higher-priority roads are served first each tick.
    pub priority: i8,
    pub haulers: u8,
}

impl Road {
    pub fn start(&self) -> TileCoord {
        self.path[0]
    }

    pub fn end(&self) -> TileCoord {
        self.path[self.path.len() - 1]
    }

    pub fn interior(&self) -> &[TileCoord] {
        &self.path[1..self.path.len() - 1]
    }

    /// True if the road starts or ends at `flag`.
    pub fn touches(&self, flag: TileCoord) -> bool {
        self.start() == flag || self.end() == flag
    }

    fn key(&self) -> TileCoord {
        self.path[1]
    }
}

/// Low/high stock thresholds for one item kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockLimits {
    pub low: u16,
    pub high: u16,
}

impl Default for StockLimits {
    fn default() -> Self {
        Self { low: 0, high: 16 }
    }
}

/// Everything about a structure besides its kind and position. Carried
/// whole by `CreateStructure`, so removing a structure and undoing the
/// removal brings it back exactly as it was.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructureState {
    pub workers: u8,
    pub stock_limits: BTreeMap<ItemKind, StockLimits>,
    pub input_buffer: bool,
    pub monitored_area: Option<Area>,
    /// Worker-ticks accumulated toward the next item.
    pub progress: u32,
    /// Items held in the input buffer.
    pub buffered: u16,
    /// Items absorbed (stocks only).
    pub stored: u32,
}

impl StructureState {
    /// Settings of a freshly built structure: one worker, default
    /// thresholds for kinds that keep stock.
    pub fn new(kind: StructureKind) -> Self {
        let stock_limits = if kind.has_stock_thresholds() {
            ItemKind::ALL
                .iter()
                .map(|&item| (item, StockLimits::default()))
                .collect()
        } else {
            BTreeMap::new()
        };
        Self {
            workers: 1,
            stock_limits,
            input_buffer: false,
            monitored_area: None,
            progress: 0,
            buffered: 0,
            stored: 0,
        }
    }

    /// Items a stock accepts before it stops absorbing.
    pub fn stock_capacity(&self) -> u32 {
        self.stock_limits.values().map(|l| l.high as u32).sum()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Structure {
    pub kind: StructureKind,
    pub state: StructureState,
}

// ---------------------------------------------------------------------------
// ColonyWorld
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ColonyWorld {
    pub config: GameConfig,
    #[serde(with = "tile_map")]
    flags: BTreeMap<TileCoord, Flag>,
    #[serde(with = "tile_map")]
    roads: BTreeMap<TileCoord, Road>,
    #[serde(with = "tile_map")]
    structures: BTreeMap<TileCoord, Structure>,
}

impl ColonyWorld {
    /// An empty map sized from `config.map_size`.
    pub fn new(config: GameConfig) -> Self {
        Self {
            config,
            flags: BTreeMap::new(),
            roads: BTreeMap::new(),
            structures: BTreeMap::new(),
        }
    }

    pub fn in_bounds(&self, tile: TileCoord) -> bool {
        let (width, height) = self.config.map_size;
        tile.x >= 0 && tile.y >= 0 && (tile.x as u32) < width && (tile.y as u32) < height
    }

    pub fn flag(&self, at: TileCoord) -> Option<&Flag> {
        self.flags.get(&at)
    }

    pub fn flags(&self) -> impl Iterator<Item = (TileCoord, &Flag)> {
        self.flags.iter().map(|(&tile, flag)| (tile, flag))
    }

    /// The road whose interior contains `at`.
    pub fn road(&self, at: TileCoord) -> Option<&Road> {
        self.road_key_at(at).and_then(|key| self.roads.get(&key))
    }

    pub fn roads(&self) -> impl Iterator<Item = &Road> {
        self.roads.values()
    }

    /// First interior tile of every road that starts or ends at `flag`.
    /// Any of them can be passed back to `road()` or a road operation.
    pub fn roads_ending_at(&self, flag: TileCoord) -> Vec<TileCoord> {
        self.roads
            .iter()
            .filter(|(_, road)| road.touches(flag))
            .map(|(&key, _)| key)
            .collect()
    }

    pub fn structure(&self, anchor: TileCoord) -> Option<&Structure> {
        self.structures.get(&anchor)
    }

    pub fn structures(&self) -> impl Iterator<Item = (TileCoord, &Structure)> {
        self.structures.iter().map(|(&tile, s)| (tile, s))
    }

    /// Anchor of the structure whose entrance is the flag at `flag`.
    pub fn structure_at_entrance(&self, flag: TileCoord) -> Option<TileCoord> {
        let anchor = flag.offset(-1, 0);
        self.structures.contains_key(&anchor).then_some(anchor)
    }

    /// Every item on the map: on flags, in input buffers and in stocks.
    pub fn item_total(&self) -> u64 {
        let on_flags: u64 = self.flags.values().map(|f| f.items as u64).sum();
        let held: u64 = self
            .structures
            .values()
            .map(|s| s.state.buffered as u64 + s.state.stored as u64)
            .sum();
        on_flags + held
    }

    fn road_key_at(&self, at: TileCoord) -> Option<TileCoord> {
        self.roads
            .iter()
            .find(|(_, road)| road.interior().contains(&at))
            .map(|(&key, _)| key)
    }

    fn on_road_interior(&self, tile: TileCoord) -> bool {
        self.road_key_at(tile).is_some()
    }

    fn on_any_road(&self, tile: TileCoord) -> bool {
        self.roads.values().any(|road| road.path.contains(&tile))
    }

    /// In bounds and not used by any flag, structure or road.
    fn is_free(&self, tile: TileCoord) -> bool {
        self.in_bounds(tile)
            && !self.flags.contains_key(&tile)
            && !self.structures.contains_key(&tile)
            && !self.on_any_road(tile)
    }

    fn has_flag_neighbor(&self, tile: TileCoord, ignore: Option<TileCoord>) -> bool {
        tile.neighbors()
            .iter()
            .any(|n| Some(*n) != ignore && self.flags.contains_key(n))
    }

    // -----------------------------------------------------------------------
    // Flags
    // -----------------------------------------------------------------------

    /// Place a flag holding `items`. The tile may be a road interior tile;
    /// the road is not split until `split_road` runs.
    pub(crate) fn place_flag(&mut self, at: TileCoord, items: u16) -> Option<()> {
        if !self.in_bounds(at)
            || self.flags.contains_key(&at)
            || self.structures.contains_key(&at)
            || self.has_flag_neighbor(at, None)
        {
            return None;
        }
        self.flags.insert(at, Flag { items });
        Some(())
    }

    /// Remove a flag nothing is attached to.
    pub(crate) fn take_flag(&mut self, at: TileCoord) -> Option<Flag> {
        if !self.roads_ending_at(at).is_empty() || self.structure_at_entrance(at).is_some() {
            return None;
        }
        self.flags.remove(&at)
    }

    /// Move the flag at `from` to the adjacent tile `to`, dragging the roads
    /// that end there along: a road whose next tile is `to` is shortened
    /// onto it, any other road is lengthened by one tile. At most one road
    /// may be lengthened, since `from` becomes its interior.
    pub(crate) fn move_flag(&mut self, from: TileCoord, to: TileCoord) -> Option<()> {
        if !from.is_adjacent(to)
            || !self.in_bounds(to)
            || !self.flags.contains_key(&from)
            || self.flags.contains_key(&to)
            || self.structures.contains_key(&to)
            || self.structure_at_entrance(from).is_some()
            || self.on_road_interior(from)
            || self.has_flag_neighbor(to, Some(from))
        {
            return None;
        }

        let attached = self.roads_ending_at(from);
        let mut reshaped = Vec::with_capacity(attached.len());
        let mut trimmed = BTreeSet::new();
        let mut extended = 0;
        for key in &attached {
            let road = self.roads.get(key)?;
            let mut path = road.path.clone();
            let at_start = road.start() == from;
            if !at_start {
                path.reverse();
            }
            if path[1] == to {
                path.remove(0);
                if path.len() < 3 {
                    return None;
                }
                trimmed.insert(*key);
            } else {
                path.insert(0, to);
                extended += 1;
            }
            if !at_start {
                path.reverse();
            }
            reshaped.push(Road {
                path,
                priority: road.priority,
                haulers: road.haulers,
            });
        }
        if extended > 1 {
            return None;
        }
        if let Some(key) = self.road_key_at(to)
            && !trimmed.contains(&key)
        {
            return None;
        }

        for key in &attached {
            self.roads.remove(key);
        }
        for road in reshaped {
            self.roads.insert(road.key(), road);
        }
        let flag = self.flags.remove(&from)?;
        self.flags.insert(to, flag);
        Some(())
    }

    // -----------------------------------------------------------------------
    // Roads
    // -----------------------------------------------------------------------

    fn road_is_placeable(&self, road: &Road) -> bool {
        let path = &road.path;
        if path.len() < 3 || road.haulers > self.config.max_road_haulers {
            return false;
        }
        if !path.iter().all(|&t| self.in_bounds(t)) {
            return false;
        }
        if !path.windows(2).all(|w| w[0].is_adjacent(w[1])) {
            return false;
        }
        let mut seen = BTreeSet::new();
        if !path.iter().all(|t| seen.insert(*t)) {
            return false;
        }
        let (start, end) = (road.start(), road.end());
        if !self.flags.contains_key(&start) || !self.flags.contains_key(&end) {
            return false;
        }
        if self.on_road_interior(start) || self.on_road_interior(end) {
            return false;
        }
        road.interior().iter().all(|&tile| {
            // A flag on the interior is a junction the road passes through;
            // it must not already terminate other roads.
            !self.structures.contains_key(&tile)
                && !self.on_any_road(tile)
                && !(self.flags.contains_key(&tile)
                    && self.roads.values().any(|r| r.touches(tile)))
        })
    }

    pub(crate) fn place_road(&mut self, road: Road) -> Option<()> {
        if !self.road_is_placeable(&road) {
            return None;
        }
        self.roads.insert(road.key(), road);
        Some(())
    }

    /// Remove the road whose interior contains `at`.
    pub(crate) fn take_road(&mut self, at: TileCoord) -> Option<Road> {
        let key = self.road_key_at(at)?;
        self.roads.remove(&key)
    }

    /// Split the road running through the flag at `flag` into two roads
    /// meeting there. Both halves keep the road's priority and haulers.
    pub(crate) fn split_road(&mut self, flag: TileCoord) -> Option<()> {
        if !self.flags.contains_key(&flag) {
            return None;
        }
        let key = self.road_key_at(flag)?;
        let road = self.roads.get(&key)?;
        let i = road.path.iter().position(|&t| t == flag)?;
        if i < 2 || i + 3 > road.path.len() {
            return None;
        }
        let road = self.roads.remove(&key)?;
        let first = Road {
            path: road.path[..=i].to_vec(),
            priority: road.priority,
            haulers: road.haulers,
        };
        let second = Road {
            path: road.path[i..].to_vec(),
            ..road
        };
        self.roads.insert(first.key(), first);
        self.roads.insert(second.key(), second);
        Some(())
    }

    /// Join the road ending at `flag` with the road starting there. Fails
    /// unless exactly those two roads touch the flag, no structure uses it,
    /// and their settings agree.
    pub(crate) fn merge_roads(&mut self, flag: TileCoord) -> Option<()> {
        if !self.flags.contains_key(&flag) || self.structure_at_entrance(flag).is_some() {
            return None;
        }
        let attached = self.roads_ending_at(flag);
        let [a, b] = attached.as_slice() else {
            return None;
        };
        let (first_key, second_key) = match (self.roads.get(a)?, self.roads.get(b)?) {
            (x, y) if x.end() == flag && y.start() == flag => (*a, *b),
            (x, y) if y.end() == flag && x.start() == flag => (*b, *a),
            _ => return None,
        };
        let first = self.roads.get(&first_key)?;
        let second = self.roads.get(&second_key)?;
        if first.priority != second.priority
            || first.haulers != second.haulers
            || first.start() == second.end()
        {
            return None;
        }
        let mut path = first.path.clone();
        path.extend_from_slice(&second.path[1..]);
        let merged = Road {
            path,
            priority: first.priority,
            haulers: first.haulers,
        };
        self.roads.remove(&first_key);
        self.roads.remove(&second_key);
        self.roads.insert(merged.key(), merged);
        Some(())
    }

    /// Move the interior road tile `from` to the free tile `to`, which must
    /// touch both of `from`'s neighbours along the path.
    pub(crate) fn move_road_node(&mut self, from: TileCoord, to: TileCoord) -> Option<()> {
        if from == to || self.flags.contains_key(&from) || !self.is_free(to) {
            return None;
        }
        let key = self.road_key_at(from)?;
        let road = self.roads.get(&key)?;
        let i = road.path.iter().position(|&t| t == from)?;
        if !to.is_adjacent(road.path[i - 1]) || !to.is_adjacent(road.path[i + 1]) {
            return None;
        }
        let mut road = self.roads.remove(&key)?;
        road.path[i] = to;
        self.roads.insert(road.key(), road);
        Some(())
    }

    /// Returns the previous priority.
    pub(crate) fn set_route_priority(&mut self, at: TileCoord, priority: i8) -> Option<i8> {
        let key = self.road_key_at(at)?;
        let road = self.roads.get_mut(&key)?;
        Some(std::mem::replace(&mut road.priority, priority))
    }

    // -----------------------------------------------------------------------
    // Structures
    // -----------------------------------------------------------------------

    pub(crate) fn place_structure(
        &mut self,
        kind: StructureKind,
        anchor: TileCoord,
        state: StructureState,
    ) -> Option<()> {
        if !self.is_free(anchor)
            || !self.flags.contains_key(&StructureKind::entrance(anchor))
            || state.workers > self.config.structure(kind).max_workers
        {
            return None;
        }
        self.structures.insert(anchor, Structure { kind, state });
        Some(())
    }

    pub(crate) fn take_structure(&mut self, anchor: TileCoord) -> Option<Structure> {
        self.structures.remove(&anchor)
    }

    /// Returns the previous worker count.
    pub(crate) fn set_workers(&mut self, anchor: TileCoord, workers: u8) -> Option<u8> {
        let kind = self.structures.get(&anchor)?.kind;
        if workers > self.config.structure(kind).max_workers {
            return None;
        }
        let structure = self.structures.get_mut(&anchor)?;
        Some(std::mem::replace(&mut structure.state.workers, workers))
    }

    /// Returns the previous thresholds for `item`. Only items the structure
    /// already keeps thresholds for can be adjusted.
    pub(crate) fn set_stock_limits(
        &mut self,
        anchor: TileCoord,
        item: ItemKind,
        limits: StockLimits,
    ) -> Option<StockLimits> {
        let structure = self.structures.get_mut(&anchor)?;
        if !structure.kind.has_stock_thresholds() || limits.low > limits.high {
            return None;
        }
        let slot = structure.state.stock_limits.get_mut(&item)?;
        Some(std::mem::replace(slot, limits))
    }

    /// Returns the previous setting.
    pub(crate) fn set_input_buffer(&mut self, anchor: TileCoord, enabled: bool) -> Option<bool> {
        let structure = self.structures.get_mut(&anchor)?;
        if !structure.kind.has_input_buffer() {
            return None;
        }
        Some(std::mem::replace(&mut structure.state.input_buffer, enabled))
    }

    /// Returns the previous area.
    pub(crate) fn set_monitored_area(
        &mut self,
        anchor: TileCoord,
        area: Option<Area>,
    ) -> Option<Option<Area>> {
        if area.is_some_and(|a| !self.in_bounds(a.center)) {
            return None;
        }
        let structure = self.structures.get_mut(&anchor)?;
        if !structure.kind.has_monitored_area() {
            return None;
        }
        Some(std::mem::replace(&mut structure.state.monitored_area, area))
    }

    // -----------------------------------------------------------------------
    // Per-tick update
    // -----------------------------------------------------------------------

    /// Advance the world by one tick.
    pub fn update(&mut self, ctx: &mut SimContext) {
        self.run_production(ctx);
        self.run_hauling(ctx);
    }

    fn run_production(&mut self, ctx: &mut SimContext) {
        let Self {
            config,
            flags,
            structures,
            ..
        } = self;
        let capacity = config.flag_item_capacity;
        for (&anchor, structure) in structures.iter_mut() {
            let state = &mut structure.state;
            if state.workers == 0 {
                continue;
            }
            let Some(flag) = flags.get_mut(&StructureKind::entrance(anchor)) else {
                continue;
            };
            match structure.kind {
                StructureKind::Stock => {
                    if flag.items > 0 && state.stored < state.stock_capacity() {
                        flag.items -= 1;
                        state.stored += 1;
                        ctx.observe(MARK_STORED);
                    }
                }
                StructureKind::GuardHouse => {}
                kind => produce(
                    &config.structure(kind),
                    kind.has_input_buffer(),
                    capacity,
                    state,
                    flag,
                    ctx,
                ),
            }
        }
    }

    /// Each hauler gets one chance per tick to carry an item from the fuller
    /// end of its road to the emptier one. Roads are served by descending
    /// priority, ties in map order.
    fn run_hauling(&mut self, ctx: &mut SimContext) {
        let (numerator, denominator) = self.config.haul_chance;
        let capacity = self.config.flag_item_capacity;
        let mut order: Vec<(i8, TileCoord, TileCoord, u8)> = self
            .roads
            .values()
            .map(|r| (r.priority, r.start(), r.end(), r.haulers))
            .collect();
        order.sort_by_key(|&(priority, ..)| Reverse(priority));

        for (_, a, b, haulers) in order {
            for _ in 0..haulers {
                if !ctx.chance(numerator, denominator) {
                    continue;
                }
                let items_a = self.flags.get(&a).map_or(0, |f| f.items);
                let items_b = self.flags.get(&b).map_or(0, |f| f.items);
                let (src, dst) = if items_a >= items_b + 2 {
                    (a, b)
                } else if items_b >= items_a + 2 {
                    (b, a)
                } else {
                    continue;
                };
                if items_a.min(items_b) >= capacity {
                    continue;
                }
                if let Some(flag) = self.flags.get_mut(&src) {
                    flag.items -= 1;
                }
                if let Some(flag) = self.flags.get_mut(&dst) {
                    flag.items += 1;
                }
                ctx.observe(MARK_HAULED);
            }
        }
    }
}

fn produce(
    data: &StructureData,
    needs_input: bool,
    capacity: u16,
    state: &mut StructureState,
    flag: &mut Flag,
    ctx: &mut SimContext,
) {
    if needs_input && state.input_buffer && state.buffered < INPUT_BUFFER_CAPACITY && flag.items > 0
    {
        flag.items -= 1;
        state.buffered += 1;
        ctx.observe(MARK_BUFFERED);
    }
    let Some(output) = data.output else {
        return;
    };
    let interval = data.production_interval_ticks;
    state.progress = (state.progress + state.workers as u32).min(interval);
    if state.progress < interval || flag.items >= capacity {
        return;
    }
    if needs_input {
        if state.buffered > 0 {
            state.buffered -= 1;
        } else if flag.items > 0 {
            flag.items -= 1;
        } else {
            return;
        }
    }
    flag.items += 1;
    state.progress = 0;
    ctx.observe(MARK_PRODUCED | output as u32);
}

/// Serde adapter for tile-keyed maps. JSON object keys must be strings, so
/// the map is written as a list of `[tile, value]` pairs.
mod tile_map {
    use crate::types::TileCoord;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::collections::BTreeMap;

    pub fn serialize<S, V>(map: &BTreeMap<TileCoord, V>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
        V: Serialize,
    {
        serializer.collect_seq(map.iter())
    }

    pub fn deserialize<'de, D, V>(deserializer: D) -> Result<BTreeMap<TileCoord, V>, D::Error>
    where
        D: Deserializer<'de>,
        V: Deserialize<'de>,
    {
        let entries = Vec::<(TileCoord, V)>::deserialize(deserializer)?;
        Ok(entries.into_iter().collect())
    }
}
