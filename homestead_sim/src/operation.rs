// Operations: serializable, invertible world mutations.
//
// Every change a player or planner makes to the colony goes through an
// `Operation`. An operation is plain data: the `OperationKind` names the
// mutation and carries its payload as coordinates and small values (never
// references into the world), so a journal of operations replays against a
// freshly loaded world exactly as it ran against the live one.
//
// The single behaviour is `execute_and_invert()`. It performs the mutation
// and, if the mutation applied, returns a *new* operation that undoes it:
// the inverse kind, the reflected group id (`GroupId::reflect`) and the
// history source the handler should file it under (`Source::inverse`). The
// executed operation is never modified, so the log entry stays a faithful
// record of what was scheduled. A mutation whose preconditions no longer
// hold (target gone, tile occupied, limit exceeded) returns `None` and
// leaves the world untouched.
//
// Kinds and their inverses:
// - `CreateStructure` / `RemoveStructure`: removal captures the full
//   `StructureState`, so undo restores workers, settings and progress.
// - `CreateRoad` / `RemoveRoad`: roads are addressed by any interior tile;
//   removal captures the whole path and settings.
// - `CreateFlag` / `RemoveFlag`: a flag can only be removed once nothing is
//   attached to it; see `OperationHandler::schedule_remove_flag` for the
//   cascade that detaches everything first.
// - `CaptureRoads`: split the road under a flag (`release: false`) or merge
//   the two roads meeting at it (`release: true`); each undoes the other.
// - `MoveFlag`, `MoveRoadSegment`: the inverse swaps `from` and `to`.
// - Setting changes (`ChangeMonitoredArea`, `ChangeRoutePriority`,
//   `ChangeWorkerCount`, `AdjustStockThresholds`, `ToggleInputBuffer`): the
//   inverse sets the previous value.
//
// See also: `world.rs` for the primitives and their preconditions,
// `handler.rs` which schedules, executes and files inverses, `log.rs` for
// the journal these are stored in.
//
// **Critical constraint: determinism.** Execution never draws from the
// random source and never searches for a target: any choice (a road's
// path, which tile to move to) was made by the producer and is in the
// payload.

use crate::types::{Area, GroupId, ItemKind, StructureKind, TileCoord};
use crate::world::{ColonyWorld, Road, StockLimits, StructureState};
use serde::{Deserialize, Serialize};

/// Which history stack an executed operation's inverse belongs on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Source {
    /// Scheduled by a producer.
    Manual,
    /// Popped from the undo stack.
    Undo,
    /// Popped from the redo stack.
    Redo,
}

impl Source {
    /// Source stamped on the inverse of an operation from `self`. Undoing
    /// yields something to redo; doing (or redoing) yields something to
    /// undo.
    pub fn inverse(self) -> Source {
        match self {
            Source::Manual => Source::Undo,
            Source::Undo => Source::Redo,
            Source::Redo => Source::Undo,
        }
    }
}

/// The mutation an operation performs.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperationKind {
    /// Build a structure. `state: None` means a freshly built one.
    CreateStructure {
        kind: StructureKind,
        anchor: TileCoord,
        state: Option<StructureState>,
    },
    RemoveStructure {
        anchor: TileCoord,
    },
    /// Lay a road along an explicit path between two flags.
    CreateRoad {
        path: Vec<TileCoord>,
        priority: i8,
        haulers: u8,
    },
    /// Remove the road whose interior contains `at`.
    RemoveRoad {
        at: TileCoord,
    },
    CreateFlag {
        at: TileCoord,
        items: u16,
    },
    RemoveFlag {
        at: TileCoord,
    },
    /// Split the road through `flag` in two (`release: false`) or merge the
    /// two roads meeting at `flag` into one (`release: true`).
    CaptureRoads {
        flag: TileCoord,
        release: bool,
    },
    ChangeMonitoredArea {
        anchor: TileCoord,
        area: Option<Area>,
    },
    /// Move a flag one tile, dragging attached roads along.
    MoveFlag {
        from: TileCoord,
        to: TileCoord,
    },
    /// Move one interior tile of a road.
    MoveRoadSegment {
        from: TileCoord,
        to: TileCoord,
    },
    /// `at` is any interior tile of the road.
    ChangeRoutePriority {
        at: TileCoord,
        priority: i8,
    },
    ChangeWorkerCount {
        anchor: TileCoord,
        workers: u8,
    },
    AdjustStockThresholds {
        anchor: TileCoord,
        item: ItemKind,
        low: u16,
        high: u16,
    },
    ToggleInputBuffer {
        anchor: TileCoord,
        enabled: bool,
    },
}

impl OperationKind {
    /// Apply the mutation to `world`. Returns the kind that reverses it, or
    /// `None` (with `world` untouched) if it does not apply.
    pub fn apply(&self, world: &mut ColonyWorld) -> Option<OperationKind> {
        use OperationKind::*;
        let inverse = match self {
            CreateStructure {
                kind,
                anchor,
                state,
            } => {
                let state = state.clone().unwrap_or_else(|| {
                    let mut fresh = StructureState::new(*kind);
                    fresh.workers = fresh
                        .workers
                        .min(world.config.structure(*kind).max_workers);
                    fresh
                });
                world.place_structure(*kind, *anchor, state)?;
                RemoveStructure { anchor: *anchor }
            }
            RemoveStructure { anchor } => {
                let structure = world.take_structure(*anchor)?;
                CreateStructure {
                    kind: structure.kind,
                    anchor: *anchor,
                    state: Some(structure.state),
                }
            }
            CreateRoad {
                path,
                priority,
                haulers,
            } => {
                world.place_road(Road {
                    path: path.clone(),
                    priority: *priority,
                    haulers: *haulers,
                })?;
                RemoveRoad { at: path[1] }
            }
            RemoveRoad { at } => {
                let road = world.take_road(*at)?;
                CreateRoad {
                    path: road.path,
                    priority: road.priority,
                    haulers: road.haulers,
                }
            }
            CreateFlag { at, items } => {
                world.place_flag(*at, *items)?;
                RemoveFlag { at: *at }
            }
            RemoveFlag { at } => {
                let flag = world.take_flag(*at)?;
                CreateFlag {
                    at: *at,
                    items: flag.items,
                }
            }
            CaptureRoads { flag, release } => {
                if *release {
                    world.merge_roads(*flag)?;
                } else {
                    world.split_road(*flag)?;
                }
                CaptureRoads {
                    flag: *flag,
                    release: !release,
                }
            }
            ChangeMonitoredArea { anchor, area } => {
                let previous = world.set_monitored_area(*anchor, *area)?;
                ChangeMonitoredArea {
                    anchor: *anchor,
                    area: previous,
                }
            }
            MoveFlag { from, to } => {
                world.move_flag(*from, *to)?;
                MoveFlag {
                    from: *to,
                    to: *from,
                }
            }
            MoveRoadSegment { from, to } => {
                world.move_road_node(*from, *to)?;
                MoveRoadSegment {
                    from: *to,
                    to: *from,
                }
            }
            ChangeRoutePriority { at, priority } => {
                let previous = world.set_route_priority(*at, *priority)?;
                ChangeRoutePriority {
                    at: *at,
                    priority: previous,
                }
            }
            ChangeWorkerCount { anchor, workers } => {
                let previous = world.set_workers(*anchor, *workers)?;
                ChangeWorkerCount {
                    anchor: *anchor,
                    workers: previous,
                }
            }
            AdjustStockThresholds {
                anchor,
                item,
                low,
                high,
            } => {
                let limits = StockLimits {
                    low: *low,
                    high: *high,
                };
                let previous = world.set_stock_limits(*anchor, *item, limits)?;
                AdjustStockThresholds {
                    anchor: *anchor,
                    item: *item,
                    low: previous.low,
                    high: previous.high,
                }
            }
            ToggleInputBuffer { anchor, enabled } => {
                let previous = world.set_input_buffer(*anchor, *enabled)?;
                ToggleInputBuffer {
                    anchor: *anchor,
                    enabled: previous,
                }
            }
        };
        Some(inverse)
    }

    /// Short name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            OperationKind::CreateStructure { .. } => "create_structure",
            OperationKind::RemoveStructure { .. } => "remove_structure",
            OperationKind::CreateRoad { .. } => "create_road",
            OperationKind::RemoveRoad { .. } => "remove_road",
            OperationKind::CreateFlag { .. } => "create_flag",
            OperationKind::RemoveFlag { .. } => "remove_flag",
            OperationKind::CaptureRoads { .. } => "capture_roads",
            OperationKind::ChangeMonitoredArea { .. } => "change_monitored_area",
            OperationKind::MoveFlag { .. } => "move_flag",
            OperationKind::MoveRoadSegment { .. } => "move_road_segment",
            OperationKind::ChangeRoutePriority { .. } => "change_route_priority",
            OperationKind::ChangeWorkerCount { .. } => "change_worker_count",
            OperationKind::AdjustStockThresholds { .. } => "adjust_stock_thresholds",
            OperationKind::ToggleInputBuffer { .. } => "toggle_input_buffer",
        }
    }
}

/// One scheduled mutation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operation {
    pub kind: OperationKind,
    /// Undo/redo atom this operation belongs to.
    pub group: GroupId,
    pub source: Source,
    /// Tick at which the handler executes it.
    pub scheduled_tick: u64,
}

impl Operation {
    /// A manual operation with no group or tick yet. The handler stamps both
    /// when it is scheduled.
    pub fn new(kind: OperationKind) -> Self {
        Self {
            kind,
            group: GroupId::NONE,
            source: Source::Manual,
            scheduled_tick: 0,
        }
    }

    /// Same operation, tagged with `group` (for cascades scheduled with
    /// `standalone == false`).
    pub fn in_group(mut self, group: GroupId) -> Self {
        self.group = group;
        self
    }

    /// Perform the mutation. On success returns the inverse operation, a
    /// new value with the reflected group and the source of the history
    /// stack it belongs on.
    pub fn execute_and_invert(&self, world: &mut ColonyWorld) -> Option<Operation> {
        let kind = self.kind.apply(world)?;
        Some(Operation {
            kind,
            group: self.group.reflect(),
            source: self.source.inverse(),
            scheduled_tick: self.scheduled_tick,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GameConfig;

    fn t(x: i32, y: i32) -> TileCoord {
        TileCoord::new(x, y)
    }

    /// Flags at (2,5), (8,6), (5,8) and (12,12), a bent road between the
    /// first two, a stock at (1,5) and a sawmill at (4,8).
    fn colony() -> ColonyWorld {
        let mut world = ColonyWorld::new(GameConfig::default());
        for (at, items) in [(t(2, 5), 3), (t(8, 6), 0), (t(5, 8), 1), (t(12, 12), 0)] {
            OperationKind::CreateFlag { at, items }
                .apply(&mut world)
                .unwrap();
        }
        OperationKind::CreateRoad {
            path: vec![
                t(2, 5),
                t(3, 5),
                t(4, 5),
                t(5, 5),
                t(6, 5),
                t(7, 5),
                t(7, 6),
                t(8, 6),
            ],
            priority: 0,
            haulers: 1,
        }
        .apply(&mut world)
        .unwrap();
        for (kind, anchor) in [
            (StructureKind::Stock, t(1, 5)),
            (StructureKind::Sawmill, t(4, 8)),
        ] {
            OperationKind::CreateStructure {
                kind,
                anchor,
                state: None,
            }
            .apply(&mut world)
            .unwrap();
        }
        world
    }

    /// Execute `kind`, then its inverse, then the inverse of that: the world
    /// must return to the starting state and then to the mutated state.
    fn assert_inverts(kind: OperationKind) {
        let mut world = colony();
        let before = world.clone();
        let op = Operation::new(kind.clone()).in_group(GroupId(4));

        let inverse = op
            .execute_and_invert(&mut world)
            .unwrap_or_else(|| panic!("{} did not apply", kind.name()));
        assert_ne!(world, before, "{} changed nothing", kind.name());
        let after = world.clone();

        let redo = inverse.execute_and_invert(&mut world).unwrap();
        assert_eq!(world, before, "inverse of {} is inexact", kind.name());

        redo.execute_and_invert(&mut world).unwrap();
        assert_eq!(world, after, "redo of {} is inexact", kind.name());
    }

    #[test]
    fn every_kind_inverts_exactly() {
        let cases = vec![
            OperationKind::CreateStructure {
                kind: StructureKind::Woodcutter,
                anchor: t(11, 12),
                state: None,
            },
            OperationKind::RemoveStructure { anchor: t(1, 5) },
            OperationKind::CreateRoad {
                path: vec![t(5, 8), t(6, 8), t(7, 8), t(8, 8), t(8, 7), t(8, 6)],
                priority: 2,
                haulers: 2,
            },
            OperationKind::RemoveRoad { at: t(6, 5) },
            OperationKind::CreateFlag {
                at: t(20, 20),
                items: 4,
            },
            OperationKind::CaptureRoads {
                flag: t(5, 5),
                release: false,
            },
            OperationKind::ChangeMonitoredArea {
                anchor: t(1, 5),
                area: Some(Area {
                    center: t(1, 1),
                    radius: 3,
                }),
            },
            OperationKind::MoveFlag {
                from: t(8, 6),
                to: t(9, 6),
            },
            OperationKind::MoveRoadSegment {
                from: t(7, 5),
                to: t(6, 6),
            },
            OperationKind::ChangeRoutePriority {
                at: t(3, 5),
                priority: -2,
            },
            OperationKind::ChangeWorkerCount {
                anchor: t(4, 8),
                workers: 3,
            },
            OperationKind::AdjustStockThresholds {
                anchor: t(1, 5),
                item: ItemKind::Plank,
                low: 2,
                high: 9,
            },
            OperationKind::ToggleInputBuffer {
                anchor: t(4, 8),
                enabled: true,
            },
        ];
        for kind in cases {
            if let OperationKind::CaptureRoads { flag, .. } = kind {
                // Needs a flag on the road first.
                let mut world = colony();
                OperationKind::CreateFlag { at: flag, items: 0 }
                    .apply(&mut world)
                    .unwrap();
                let before = world.clone();
                let inverse = kind.apply(&mut world).unwrap();
                assert_eq!(world.roads().count(), 2);
                inverse.apply(&mut world).unwrap();
                assert_eq!(world, before);
                continue;
            }
            assert_inverts(kind);
        }
    }

    #[test]
    fn remove_flag_inverts_once_detached() {
        let mut world = colony();
        let before = world.clone();
        let inverse = OperationKind::RemoveFlag { at: t(5, 8) }.apply(&mut world);
        // The sawmill still uses it.
        assert!(inverse.is_none());
        assert_eq!(world, before);

        OperationKind::RemoveStructure { anchor: t(4, 8) }
            .apply(&mut world)
            .unwrap();
        let detached = world.clone();
        let inverse = OperationKind::RemoveFlag { at: t(5, 8) }
            .apply(&mut world)
            .unwrap();
        assert_eq!(inverse, OperationKind::CreateFlag { at: t(5, 8), items: 1 });
        inverse.apply(&mut world).unwrap();
        assert_eq!(world, detached);
    }

    #[test]
    fn removed_structure_comes_back_with_its_state() {
        let mut world = colony();
        OperationKind::ChangeWorkerCount {
            anchor: t(4, 8),
            workers: 2,
        }
        .apply(&mut world)
        .unwrap();
        let inverse = OperationKind::RemoveStructure { anchor: t(4, 8) }
            .apply(&mut world)
            .unwrap();
        match &inverse {
            OperationKind::CreateStructure { state: Some(s), .. } => assert_eq!(s.workers, 2),
            other => panic!("unexpected inverse {other:?}"),
        }
    }

    #[test]
    fn failed_execution_leaves_world_untouched() {
        let mut world = colony();
        let before = world.clone();
        let op = Operation::new(OperationKind::RemoveRoad { at: t(30, 30) });
        assert!(op.execute_and_invert(&mut world).is_none());
        let op = Operation::new(OperationKind::ChangeWorkerCount {
            anchor: t(4, 8),
            workers: 200,
        });
        assert!(op.execute_and_invert(&mut world).is_none());
        let op = Operation::new(OperationKind::ToggleInputBuffer {
            anchor: t(1, 5),
            enabled: true,
        });
        assert!(op.execute_and_invert(&mut world).is_none());
        assert_eq!(world, before);
    }

    #[test]
    fn inverse_is_a_new_operation() {
        let mut world = colony();
        let op = Operation {
            kind: OperationKind::ChangeRoutePriority {
                at: t(3, 5),
                priority: 5,
            },
            group: GroupId(9),
            source: Source::Manual,
            scheduled_tick: 12,
        };
        let snapshot = op.clone();
        let inverse = op.execute_and_invert(&mut world).unwrap();
        assert_eq!(op, snapshot);
        assert_eq!(inverse.group, GroupId(9).reflect());
        assert_eq!(inverse.source, Source::Undo);
        assert_eq!(
            inverse.kind,
            OperationKind::ChangeRoutePriority {
                at: t(3, 5),
                priority: 0
            }
        );
        let redo = inverse.execute_and_invert(&mut world).unwrap();
        assert_eq!(redo.group, GroupId(9));
        assert_eq!(redo.source, Source::Redo);
    }

    #[test]
    fn source_mapping() {
        assert_eq!(Source::Manual.inverse(), Source::Undo);
        assert_eq!(Source::Undo.inverse(), Source::Redo);
        assert_eq!(Source::Redo.inverse(), Source::Undo);
    }

    #[test]
    fn operation_json_roundtrip() {
        let op = Operation {
            kind: OperationKind::CreateRoad {
                path: vec![t(0, 0), t(1, 0), t(2, 0)],
                priority: 1,
                haulers: 2,
            },
            group: GroupId(3),
            source: Source::Redo,
            scheduled_tick: 40,
        };
        let json = serde_json::to_string(&op).unwrap();
        assert!(json.contains("CreateRoad"));
        let restored: Operation = serde_json::from_str(&json).unwrap();
        assert_eq!(op, restored);
    }
}
