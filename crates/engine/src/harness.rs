//! Test harness for tracked edits with event collection.
//!
//! `TrackHarness` owns a [`MemoryDocument`] and a [`ChangeTrack`] and:
//! - collects every log notification,
//! - applies batches of [`Op`]s with atomic/non-atomic semantics,
//! - undoes recorded edits in the document and the log together.
//!
//! Use it to test log invariants over whole edit sequences.

use std::sync::{Arc, Mutex, MutexGuard};

use redline_core::{Axis, CellAddress, CellRange, CellValue};

use crate::action::ActionId;
use crate::document::{Document, StructuralEdit};
use crate::error::TrackError;
use crate::events::EventCollector;
use crate::memory::MemoryDocument;
use crate::track::ChangeTrack;

/// One tracked edit on sheet 0.
#[derive(Debug, Clone, PartialEq)]
pub enum Op {
    Insert { axis: Axis, start: u32, count: u32 },
    Delete { axis: Axis, start: u32, count: u32 },
    Move { from: CellRange, to: CellAddress },
    SetCell { row: u32, col: u32, value: String },
    /// Fails without touching anything (for testing rollback).
    SimulateError,
}

/// Result of applying operations.
#[derive(Debug, Clone)]
pub struct ApplyResult {
    /// Number of ops successfully applied.
    pub applied: usize,
    /// Records left in the log by this batch.
    pub recorded: Vec<ActionId>,
    /// Index and error of the failing op, if any.
    pub error: Option<(usize, String)>,
}

/// How to take one recorded edit back out of the document.
#[derive(Debug, Clone)]
enum Revert {
    Structural(StructuralEdit, Vec<(CellAddress, CellValue)>),
    Cell(CellAddress, CellValue),
}

pub struct TrackHarness {
    pub doc: MemoryDocument,
    pub track: ChangeTrack,
    events: Arc<Mutex<EventCollector>>,
    reverts: Vec<(ActionId, Revert)>,
}

impl TrackHarness {
    /// One sheet of `rows` x `cols`.
    pub fn new(rows: u32, cols: u32) -> Self {
        let events = Arc::new(Mutex::new(EventCollector::new()));
        let sink = Arc::clone(&events);
        let mut track = ChangeTrack::default();
        track.add_listener(Box::new(move |e| {
            if let Ok(mut collector) = sink.lock() {
                collector.push(*e);
            }
        }));
        Self { doc: MemoryDocument::new(1, rows, cols), track, events, reverts: Vec::new() }
    }

    pub fn events(&self) -> MutexGuard<'_, EventCollector> {
        self.events.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn clear_events(&self) {
        self.events().clear();
    }

    /// Apply operations with specified atomicity.
    ///
    /// - `atomic=true`: all-or-nothing; on error everything this batch did is
    ///   undone.
    /// - `atomic=false`: on error, ops before the failing one stay applied.
    pub fn apply_ops(&mut self, ops: &[Op], atomic: bool) -> ApplyResult {
        let mut recorded = Vec::new();
        let mut error = None;

        self.track.start_block();
        for (idx, op) in ops.iter().enumerate() {
            match self.apply_single_op(op) {
                Ok(mut ids) => recorded.append(&mut ids),
                Err(e) => {
                    error = Some((idx, e.to_string()));
                    break;
                }
            }
        }

        let applied = error.as_ref().map_or(ops.len(), |(idx, _)| *idx);
        if error.is_some() && atomic {
            for _ in 0..recorded.len() {
                self.undo();
            }
            self.track.end_block();
            return ApplyResult { applied: 0, recorded: Vec::new(), error };
        }
        self.track.end_block();
        ApplyResult { applied, recorded, error }
    }

    fn apply_single_op(&mut self, op: &Op) -> Result<Vec<ActionId>, TrackError> {
        match op {
            Op::Insert { axis, start, count } => {
                let edit = StructuralEdit::Insert { axis: *axis, sheet: 0, start: *start, count: *count };
                let overflow = self.overflow(*axis, *count);
                let id = self.track.insert(&mut self.doc, *axis, 0, *start, *count)?;
                self.reverts.push((id, Revert::Structural(edit, overflow)));
                Ok(vec![id])
            }
            Op::Delete { axis, start, count } => {
                let edit = StructuralEdit::Delete { axis: *axis, sheet: 0, start: *start, count: *count };
                let before = self.doc.cells(0);
                let ids = self.track.delete(&mut self.doc, *axis, 0..=0, *start, *count)?;
                for id in &ids {
                    self.reverts.push((*id, Revert::Structural(edit, before.clone())));
                }
                Ok(ids)
            }
            Op::Move { from, to } => {
                let before = self.doc.cells(0);
                let id = self.track.move_range(&mut self.doc, *from, *to)?;
                self.reverts.push((id, Revert::Structural(StructuralEdit::Move { from: *from, to: *to }, before)));
                Ok(vec![id])
            }
            Op::SetCell { row, col, value } => {
                let pos = CellAddress::new(0, *row, *col);
                let old = self.doc.get(pos);
                let id = self.track.set_cell(&mut self.doc, pos, CellValue::from(value.as_str()))?;
                self.reverts.push((id, Revert::Cell(pos, old)));
                Ok(vec![id])
            }
            Op::SimulateError => Err(TrackError::EmptyEdit),
        }
    }

    /// Cells an insert of `count` pushes off the end of the sheet.
    fn overflow(&self, axis: Axis, count: u32) -> Vec<(CellAddress, CellValue)> {
        let max = self.doc.bounds().max(axis);
        self.doc.cells(0).into_iter().filter(|(pos, _)| pos.get(axis) + count > max).collect()
    }

    /// Take back the newest recorded edit in both document and log.
    pub fn undo(&mut self) -> Option<ActionId> {
        let (id, revert) = self.reverts.pop()?;
        match revert {
            Revert::Structural(edit, saved) => {
                if let Err(e) = self.doc.undo_structural_edit(&edit) {
                    log::warn!("harness undo of {} failed: {}", id, e);
                }
                for (pos, value) in saved {
                    if self.doc.get(pos).is_empty() {
                        self.doc.set(pos, value);
                    }
                }
            }
            Revert::Cell(pos, old) => self.doc.set(pos, old),
        }
        self.track.undo_last()
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use redline_core::BigRange;

    use super::*;

    fn config() -> ProptestConfig {
        ProptestConfig {
            cases: std::env::var("PROPTEST_CASES").ok().and_then(|s| s.parse().ok()).unwrap_or(128),
            failure_persistence: None,
            ..ProptestConfig::default()
        }
    }

    fn set(row: u32, col: u32, value: &str) -> Op {
        Op::SetCell { row, col, value: value.to_string() }
    }

    #[test]
    fn test_harness_basic_apply() {
        let mut h = TrackHarness::new(20, 5);
        let result = h.apply_ops(
            &[set(0, 0, "a"), Op::Insert { axis: Axis::Rows, start: 0, count: 2 }, set(0, 0, "b")],
            true,
        );
        assert_eq!(result.applied, 3);
        assert_eq!(result.recorded.len(), 3);
        assert!(result.error.is_none());
        assert_eq!(h.doc.get(CellAddress::new(0, 2, 0)), CellValue::from("a"));
        // One coalesced append event for the whole batch.
        assert_eq!(h.events().appended().len(), 1);
    }

    #[test]
    fn test_harness_atomic_rollback() {
        let mut h = TrackHarness::new(20, 5);
        h.apply_ops(&[set(3, 0, "keep")], true);
        h.clear_events();

        let result = h.apply_ops(
            &[Op::Delete { axis: Axis::Rows, start: 0, count: 2 }, set(0, 1, "x"), Op::SimulateError],
            true,
        );
        assert_eq!(result.applied, 0);
        assert_eq!(result.error.as_ref().map(|(i, _)| *i), Some(2));
        assert_eq!(h.track.len(), 1);
        assert_eq!(h.doc.cells(0), vec![(CellAddress::new(0, 3, 0), CellValue::from("keep"))]);
        assert_eq!(h.track.get(ActionId(1)).unwrap().range(), BigRange::cell(0, 3, 0));
        h.track.chain.assert_consistent();
    }

    #[test]
    fn test_harness_partial_failure_keeps_prefix() {
        let mut h = TrackHarness::new(20, 5);
        let result = h.apply_ops(&[set(0, 0, "a"), Op::SimulateError, set(1, 0, "b")], false);
        assert_eq!(result.applied, 1);
        assert_eq!(h.track.len(), 1);
    }

    fn arb_structural() -> impl Strategy<Value = Op> {
        let axis = prop_oneof![Just(Axis::Rows), Just(Axis::Cols)];
        prop_oneof![
            (axis.clone(), 0u32..12, 1u32..4).prop_map(|(axis, start, count)| Op::Insert { axis, start, count }),
            (axis, 0u32..12, 1u32..4).prop_map(|(axis, start, count)| Op::Delete { axis, start, count }),
            (0u32..10, 0u32..6, 0u32..3, 0u32..10, 0u32..6).prop_map(|(r, c, h, tr, tc)| Op::Move {
                from: CellRange::new(CellAddress::new(0, r, c), CellAddress::new(0, r + h, c + 1)),
                to: CellAddress::new(0, tr, tc),
            }),
        ]
    }

    proptest! {
        #![proptest_config(config())]

        /// Undoing structural edits newest first puts every earlier record
        /// back where it was, with links intact at every step.
        #[test]
        fn prop_structural_undo_is_exact_inverse(
            cells in proptest::collection::vec((0u32..16, 0u32..8), 1..8),
            ops in proptest::collection::vec(arb_structural(), 1..8),
        ) {
            let mut h = TrackHarness::new(24, 12);
            for (row, col) in &cells {
                h.apply_ops(&[set(*row, *col, "v")], false);
            }
            let before: Vec<_> = h.track.actions().map(|a| (a.id(), a.range())).collect();

            let mut structural = 0;
            for op in &ops {
                let result = h.apply_ops(std::slice::from_ref(op), false);
                structural += result.recorded.len();
                h.track.chain.assert_consistent();
            }
            for _ in 0..structural {
                prop_assert!(h.undo().is_some());
                h.track.chain.assert_consistent();
            }

            let after: Vec<_> = h.track.actions().map(|a| (a.id(), a.range())).collect();
            prop_assert_eq!(before, after);
            prop_assert!(h.track.actions().all(|a| a.is_live()));
            prop_assert!(h.track.chain().generated_ids().is_empty());
        }
    }
}
