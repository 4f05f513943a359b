//! The document the change log is recorded against.
//!
//! The engine never owns the grid. It mutates it only through [`Document`],
//! and only on behalf of tracked edits: recording, rejecting, selecting.

use std::ops::{Deref, DerefMut};

use redline_core::{Axis, BigRange, CellAddress, CellRange, CellValue, DocumentBounds};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DocumentError {
    #[error("{0} is protected")]
    Protected(String),

    #[error("{0} is outside the document")]
    OutOfBounds(String),

    #[error("sheet {0} does not exist")]
    NoSuchSheet(u32),
}

/// One structural change to the grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StructuralEdit {
    /// `count` rows/cols before position `start` on `sheet`. For sheets,
    /// `sheet` is ignored and `start` is the sheet index.
    Insert { axis: Axis, sheet: u32, start: u32, count: u32 },
    Delete { axis: Axis, sheet: u32, start: u32, count: u32 },
    /// Cut `from` and paste it with its top-left corner at `to`.
    Move { from: CellRange, to: CellAddress },
}

impl StructuralEdit {
    pub fn inverse(&self) -> StructuralEdit {
        match *self {
            StructuralEdit::Insert { axis, sheet, start, count } => {
                StructuralEdit::Delete { axis, sheet, start, count }
            }
            StructuralEdit::Delete { axis, sheet, start, count } => {
                StructuralEdit::Insert { axis, sheet, start, count }
            }
            StructuralEdit::Move { from, to } => StructuralEdit::Move {
                from: destination(&from, to),
                to: from.start,
            },
        }
    }

    /// Log range of the edit: whole rows/cols/sheets, or the move destination.
    pub fn big_range(&self) -> BigRange {
        match *self {
            StructuralEdit::Insert { axis, sheet, start, count }
            | StructuralEdit::Delete { axis, sheet, start, count } => BigRange::structural(
                axis,
                i64::from(sheet),
                i64::from(start),
                i64::from(start) + i64::from(count) - 1,
            ),
            StructuralEdit::Move { from, to } => BigRange::from_concrete(destination(&from, to)),
        }
    }

    /// Inverse of [`StructuralEdit::big_range`] for a recorded structural action.
    /// `None` if the range does not describe a contiguous span on `axis`.
    pub(crate) fn from_range(axis: Axis, range: &BigRange, insert: bool) -> Option<StructuralEdit> {
        let (first, last) = range.span(axis);
        if first < 0 || last < first || last > i64::from(u32::MAX) {
            return None;
        }
        let sheet = if axis == Axis::Sheets { 0 } else { u32::try_from(range.start.sheet).ok()? };
        let start = first as u32;
        let count = (last - first + 1) as u32;
        Some(if insert {
            StructuralEdit::Insert { axis, sheet, start, count }
        } else {
            StructuralEdit::Delete { axis, sheet, start, count }
        })
    }
}

/// Destination rectangle of moving `from` to `to`.
pub fn destination(from: &CellRange, to: CellAddress) -> CellRange {
    let end = CellAddress::new(
        to.sheet + (from.end.sheet - from.start.sheet),
        to.row + (from.end.row - from.start.row),
        to.col + (from.end.col - from.start.col),
    );
    CellRange::new(to, end)
}

/// Grid operations the change log needs from its host document.
pub trait Document {
    fn bounds(&self) -> DocumentBounds;

    fn apply_structural_edit(&mut self, edit: &StructuralEdit) -> Result<(), DocumentError>;

    fn undo_structural_edit(&mut self, edit: &StructuralEdit) -> Result<(), DocumentError> {
        self.apply_structural_edit(&edit.inverse())
    }

    fn read_cell(&self, pos: CellAddress) -> CellValue;

    fn write_cell(&mut self, pos: CellAddress, value: CellValue) -> Result<(), DocumentError>;

    fn is_editable(&self, range: &CellRange) -> bool;

    /// Non-empty cells inside `range`.
    fn occupied_cells(&self, range: &CellRange) -> Vec<CellAddress>;

    fn auto_recalc(&self) -> bool {
        false
    }

    fn set_auto_recalc(&mut self, _enabled: bool) {}

    /// Whether formula reference listeners react to edits.
    fn listening(&self) -> bool {
        false
    }

    fn set_listening(&mut self, _enabled: bool) {}
}

/// Holds off recalculation and reference listening for as long as it lives,
/// then restores whatever the document had before.
pub struct SuspendRecalc<'a, D: Document + ?Sized> {
    doc: &'a mut D,
    auto_recalc: bool,
    listening: bool,
}

impl<'a, D: Document + ?Sized> SuspendRecalc<'a, D> {
    pub fn new(doc: &'a mut D) -> Self {
        let auto_recalc = doc.auto_recalc();
        let listening = doc.listening();
        doc.set_auto_recalc(false);
        doc.set_listening(false);
        Self { doc, auto_recalc, listening }
    }
}

impl<D: Document + ?Sized> Deref for SuspendRecalc<'_, D> {
    type Target = D;

    fn deref(&self) -> &D {
        self.doc
    }
}

impl<D: Document + ?Sized> DerefMut for SuspendRecalc<'_, D> {
    fn deref_mut(&mut self) -> &mut D {
        self.doc
    }
}

impl<D: Document + ?Sized> Drop for SuspendRecalc<'_, D> {
    fn drop(&mut self) {
        self.doc.set_listening(self.listening);
        self.doc.set_auto_recalc(self.auto_recalc);
    }
}

#[derive(Debug, Clone)]
enum JournalEntry {
    Structural(StructuralEdit),
    Cell(CellAddress, CellValue),
}

/// Document wrapper remembering how to take back every mutation made
/// through it. Dropping it without [`Journal::rollback`] keeps the changes.
pub(crate) struct Journal<'a, D: Document + ?Sized> {
    doc: &'a mut D,
    entries: Vec<JournalEntry>,
}

impl<'a, D: Document + ?Sized> Journal<'a, D> {
    pub(crate) fn new(doc: &'a mut D) -> Self {
        Self { doc, entries: Vec::new() }
    }

    /// Cells an edit would destroy, saved before it runs.
    fn save_cells(&mut self, range: &CellRange) {
        for pos in self.doc.occupied_cells(range) {
            let value = self.doc.read_cell(pos);
            self.entries.push(JournalEntry::Cell(pos, value));
        }
    }

    fn save_destroyed(&mut self, edit: &StructuralEdit) {
        let bounds = self.doc.bounds();
        let range = match *edit {
            StructuralEdit::Delete { axis, sheet, start, count } => {
                BigRange::structural(axis, i64::from(sheet), i64::from(start), i64::from(start) + i64::from(count) - 1)
                    .make_concrete(&bounds)
            }
            // Cells pushed past the last row/col fall off the grid.
            StructuralEdit::Insert { axis, sheet, count, .. } if axis != Axis::Sheets => {
                let max = i64::from(bounds.max(axis));
                BigRange::structural(axis, i64::from(sheet), (max - i64::from(count) + 1).max(0), max)
                    .make_concrete(&bounds)
            }
            StructuralEdit::Insert { .. } => None,
            StructuralEdit::Move { from, to } => Some(destination(&from, to)),
        };
        if let Some(range) = range {
            self.save_cells(&range);
        }
    }

    /// Take back everything, newest first.
    pub(crate) fn rollback(mut self) {
        while let Some(entry) = self.entries.pop() {
            let result = match entry {
                JournalEntry::Structural(edit) => self.doc.undo_structural_edit(&edit),
                JournalEntry::Cell(pos, value) => self.doc.write_cell(pos, value),
            };
            if let Err(e) = result {
                log::warn!("rollback step failed: {}", e);
            }
        }
    }
}

impl<D: Document + ?Sized> Document for Journal<'_, D> {
    fn bounds(&self) -> DocumentBounds {
        self.doc.bounds()
    }

    fn apply_structural_edit(&mut self, edit: &StructuralEdit) -> Result<(), DocumentError> {
        let mark = self.entries.len();
        self.save_destroyed(edit);
        match self.doc.apply_structural_edit(edit) {
            Ok(()) => {
                self.entries.push(JournalEntry::Structural(*edit));
                Ok(())
            }
            Err(e) => {
                self.entries.truncate(mark);
                Err(e)
            }
        }
    }

    fn read_cell(&self, pos: CellAddress) -> CellValue {
        self.doc.read_cell(pos)
    }

    fn write_cell(&mut self, pos: CellAddress, value: CellValue) -> Result<(), DocumentError> {
        let old = self.doc.read_cell(pos);
        self.doc.write_cell(pos, value)?;
        self.entries.push(JournalEntry::Cell(pos, old));
        Ok(())
    }

    fn is_editable(&self, range: &CellRange) -> bool {
        self.doc.is_editable(range)
    }

    fn occupied_cells(&self, range: &CellRange) -> Vec<CellAddress> {
        self.doc.occupied_cells(range)
    }

    fn auto_recalc(&self) -> bool {
        self.doc.auto_recalc()
    }

    fn set_auto_recalc(&mut self, enabled: bool) {
        self.doc.set_auto_recalc(enabled)
    }

    fn listening(&self) -> bool {
        self.doc.listening()
    }

    fn set_listening(&mut self, enabled: bool) {
        self.doc.set_listening(enabled)
    }
}
