// The operation log: every operation ever scheduled, in execution order.
//
// Entries are ordered by `scheduled_tick` (non-decreasing). Within a tick,
// log order is execution order. The handler's execution cursor walks the
// log; everything before the cursor has run, everything after is due at the
// current tick or later.
//
// The log is append-only while recording, with one exception: undo and
// redo steps run immediately, so the handler journals them by inserting at
// the cursor (stamped with the tick that just finished) and stepping the
// cursor past them. That keeps the log a complete, replayable record of
// every mutation in the order it happened. `truncate()` is used only by
// `cancel_replay` to discard the part of the log that has not been replayed.
//
// See also: `handler.rs` which owns the log and the cursor, `journal.rs`
// which persists it.

use crate::operation::Operation;
use crate::types::GroupId;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OperationLog {
    entries: Vec<Operation>,
}

impl OperationLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Operation> {
        self.entries.get(index)
    }

    pub fn entries(&self) -> &[Operation] {
        &self.entries
    }

    pub fn last(&self) -> Option<&Operation> {
        self.entries.last()
    }

    /// Append `op`. Panics if it is scheduled before the last entry.
    pub fn append(&mut self, op: Operation) {
        if let Some(last) = self.entries.last() {
            assert!(
                last.scheduled_tick <= op.scheduled_tick,
                "operation log out of order: tick {} appended after tick {}",
                op.scheduled_tick,
                last.scheduled_tick
            );
        }
        self.entries.push(op);
    }

    /// Insert `op` at `index`. Panics if that would break tick ordering.
    pub fn insert_at(&mut self, index: usize, op: Operation) {
        assert!(index <= self.entries.len(), "log insert past end");
        let fits_before = index == 0 || self.entries[index - 1].scheduled_tick <= op.scheduled_tick;
        let fits_after =
            index == self.entries.len() || op.scheduled_tick <= self.entries[index].scheduled_tick;
        assert!(
            fits_before && fits_after,
            "operation log out of order: tick {} inserted at {}",
            op.scheduled_tick,
            index
        );
        self.entries.insert(index, op);
    }

    /// Keep only the first `len` entries.
    pub fn truncate(&mut self, len: usize) {
        self.entries.truncate(len);
    }

    /// True if every entry is scheduled no earlier than the one before it.
    pub fn is_ordered(&self) -> bool {
        self.entries
            .windows(2)
            .all(|w| w[0].scheduled_tick <= w[1].scheduled_tick)
    }

    /// Highest forward (producer-allocated) group id in the log.
    pub fn max_forward_group(&self) -> Option<GroupId> {
        self.entries
            .iter()
            .map(|op| if op.group.is_forward() { op.group } else { op.group.reflect() })
            .filter(|g| g.is_forward())
            .max()
    }
}
