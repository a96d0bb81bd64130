// Events reported by the operation handler.
//
// The handler never returns errors to producers: an operation scheduled now
// runs ticks later, when the producer is long gone. What happened instead
// comes back as `OperationEvent`s, collected per tick into a `TickReport`
// (from `OperationHandler::advance`) or returned directly from `undo()` /
// `redo()`. A UI can use them to tell the player that an action no longer
// applied; tests use them to observe execution order.
//
// See also: `handler.rs` which emits these, `operation.rs` for the
// operation kinds they carry.

use crate::operation::{OperationKind, Source};
use crate::types::GroupId;
use serde::{Deserialize, Serialize};

/// Something the handler did during a tick or a history step.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationEvent {
    pub tick: u64,
    pub kind: OperationEventKind,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperationEventKind {
    /// An operation applied; its inverse went onto a history stack.
    Executed {
        operation: OperationKind,
        group: GroupId,
        source: Source,
    },
    /// An operation's preconditions no longer held. Nothing changed and no
    /// history was recorded.
    Rejected {
        operation: OperationKind,
        group: GroupId,
        source: Source,
    },
    /// A replay under `ChecksumPolicy::Repair` overwrote a recorded checksum.
    ChecksumRepaired { recorded: u32, computed: u32 },
    /// The replay caught up with the log and recording resumed.
    ReplayFinished,
}

/// Outcome of one tick.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickReport {
    pub tick: u64,
    /// Checksum computed for this tick.
    pub checksum: u32,
    pub events: Vec<OperationEvent>,
}

impl TickReport {
    pub fn executed(&self) -> usize {
        self.events
            .iter()
            .filter(|e| matches!(e.kind, OperationEventKind::Executed { .. }))
            .count()
    }

    pub fn rejected(&self) -> usize {
        self.events
            .iter()
            .filter(|e| matches!(e.kind, OperationEventKind::Rejected { .. }))
            .count()
    }
}
