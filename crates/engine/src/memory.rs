//! Sparse in-memory document.
//!
//! Reference host for the change log: a stack of sheets holding only
//! non-empty cells, with optional protected ranges. Structural edits shift
//! cells the way a spreadsheet does; anything pushed past the last row or
//! column falls off.

use redline_core::{Axis, CellAddress, CellRange, CellValue, DocumentBounds};
use rustc_hash::FxHashMap;

use crate::document::{destination, Document, DocumentError, StructuralEdit};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MemorySheet {
    cells: FxHashMap<(u32, u32), CellValue>,
}

impl MemorySheet {
    fn shift(&mut self, axis: Axis, at: u32, count: u32, max: u32, insert: bool) {
        let key = |r: u32, c: u32| if axis == Axis::Rows { r } else { c };

        if !insert {
            self.cells.retain(|&(r, c), _| !(at..at + count).contains(&key(r, c)));
        }

        // Collect all cells that need to be shifted
        let threshold = if insert { at } else { at + count };
        let to_shift: Vec<_> = self
            .cells
            .iter()
            .filter(|((r, c), _)| key(*r, *c) >= threshold)
            .map(|(&pos, value)| (pos, value.clone()))
            .collect();

        // Remove old positions
        for (pos, _) in &to_shift {
            self.cells.remove(pos);
        }

        // Insert at new positions
        for ((r, c), value) in to_shift {
            let moved = |v: u32| if insert { v.checked_add(count).filter(|n| *n <= max) } else { Some(v - count) };
            let pos = match axis {
                Axis::Rows => moved(r).map(|r| (r, c)),
                _ => moved(c).map(|c| (r, c)),
            };
            if let Some(pos) = pos {
                self.cells.insert(pos, value);
            }
        }
    }
}

/// In-memory [`Document`].
#[derive(Debug, Clone)]
pub struct MemoryDocument {
    sheets: Vec<MemorySheet>,
    max_row: u32,
    max_col: u32,
    protected: Vec<CellRange>,
    auto_recalc: bool,
    listening: bool,
    /// Recalc flag observed by the most recent structural edit.
    recalc_during_last_edit: Option<bool>,
}

impl MemoryDocument {
    /// `sheets` sheets of `rows` x `cols` cells each.
    pub fn new(sheets: u32, rows: u32, cols: u32) -> Self {
        Self {
            sheets: (0..sheets.max(1)).map(|_| MemorySheet::default()).collect(),
            max_row: rows.max(1) - 1,
            max_col: cols.max(1) - 1,
            protected: Vec::new(),
            auto_recalc: true,
            listening: true,
            recalc_during_last_edit: None,
        }
    }

    pub fn sheet_count(&self) -> usize {
        self.sheets.len()
    }

    /// Untracked write, as if the host edited the cell directly.
    pub fn set(&mut self, pos: CellAddress, value: impl Into<CellValue>) {
        let value = value.into();
        if let Some(sheet) = self.sheets.get_mut(pos.sheet as usize) {
            if value.is_empty() {
                sheet.cells.remove(&(pos.row, pos.col));
            } else {
                sheet.cells.insert((pos.row, pos.col), value);
            }
        }
    }

    pub fn get(&self, pos: CellAddress) -> CellValue {
        self.sheets
            .get(pos.sheet as usize)
            .and_then(|s| s.cells.get(&(pos.row, pos.col)))
            .cloned()
            .unwrap_or_default()
    }

    pub fn protect(&mut self, range: CellRange) {
        self.protected.push(range);
    }

    pub fn unprotect_all(&mut self) {
        self.protected.clear();
    }

    pub fn recalc_during_last_edit(&self) -> Option<bool> {
        self.recalc_during_last_edit
    }

    /// Non-empty cells of one sheet, sorted by position.
    pub fn cells(&self, sheet: u32) -> Vec<(CellAddress, CellValue)> {
        let mut cells: Vec<_> = self
            .sheets
            .get(sheet as usize)
            .map(|s| {
                s.cells
                    .iter()
                    .map(|(&(r, c), v)| (CellAddress::new(sheet, r, c), v.clone()))
                    .collect()
            })
            .unwrap_or_default();
        cells.sort_by_key(|(pos, _)| *pos);
        cells
    }

    fn check_sheet(&self, sheet: u32) -> Result<(), DocumentError> {
        if (sheet as usize) < self.sheets.len() {
            Ok(())
        } else {
            Err(DocumentError::NoSuchSheet(sheet))
        }
    }

    fn check_editable(&self, range: &CellRange) -> Result<(), DocumentError> {
        match self.protected.iter().find(|p| p.intersects(range)) {
            Some(p) => Err(DocumentError::Protected(format!("{}:{}", p.start, p.end.to_a1()))),
            None => Ok(()),
        }
    }

    fn whole_span(&self, axis: Axis, sheet: u32, start: u32, count: u32) -> CellRange {
        let last = start + count - 1;
        match axis {
            Axis::Rows => CellRange::new(CellAddress::new(sheet, start, 0), CellAddress::new(sheet, last, self.max_col)),
            Axis::Cols => CellRange::new(CellAddress::new(sheet, 0, start), CellAddress::new(sheet, self.max_row, last)),
            Axis::Sheets => CellRange::new(
                CellAddress::new(start, 0, 0),
                CellAddress::new(last, self.max_row, self.max_col),
            ),
        }
    }

    fn insert(&mut self, axis: Axis, sheet: u32, start: u32, count: u32) -> Result<(), DocumentError> {
        if count == 0 {
            return Ok(());
        }
        if axis == Axis::Sheets {
            if start as usize > self.sheets.len() {
                return Err(DocumentError::NoSuchSheet(start));
            }
            for _ in 0..count {
                self.sheets.insert(start as usize, MemorySheet::default());
            }
            return Ok(());
        }
        self.check_sheet(sheet)?;
        let max = if axis == Axis::Rows { self.max_row } else { self.max_col };
        if start > max {
            return Err(DocumentError::OutOfBounds(format!("{:?} {} on sheet {}", axis, start, sheet)));
        }
        // Everything from `start` on moves, so protection there blocks it.
        self.check_editable(&self.whole_span(axis, sheet, start, max - start + 1))?;
        if let Some(s) = self.sheets.get_mut(sheet as usize) {
            s.shift(axis, start, count, max, true);
        }
        Ok(())
    }

    fn delete(&mut self, axis: Axis, sheet: u32, start: u32, count: u32) -> Result<(), DocumentError> {
        if count == 0 {
            return Ok(());
        }
        if axis == Axis::Sheets {
            let end = start as usize + count as usize;
            if end > self.sheets.len() || count as usize >= self.sheets.len() {
                return Err(DocumentError::NoSuchSheet(start + count - 1));
            }
            self.check_editable(&self.whole_span(axis, start, start, count))?;
            self.sheets.drain(start as usize..end);
            return Ok(());
        }
        self.check_sheet(sheet)?;
        let max = if axis == Axis::Rows { self.max_row } else { self.max_col };
        if start.checked_add(count - 1).map_or(true, |last| last > max) {
            return Err(DocumentError::OutOfBounds(format!("{:?} {}+{} on sheet {}", axis, start, count, sheet)));
        }
        self.check_editable(&self.whole_span(axis, sheet, start, max - start + 1))?;
        if let Some(s) = self.sheets.get_mut(sheet as usize) {
            s.shift(axis, start, count, max, false);
        }
        Ok(())
    }

    fn move_cells(&mut self, from: CellRange, to: CellAddress) -> Result<(), DocumentError> {
        let dest = destination(&from, to);
        let bounds = self.bounds();
        for corner in [from.end, dest.end] {
            if corner.sheet > bounds.max_sheet || corner.row > bounds.max_row || corner.col > bounds.max_col {
                return Err(DocumentError::OutOfBounds(corner.to_string()));
            }
        }
        self.check_editable(&from)?;
        self.check_editable(&dest)?;

        let moved: Vec<_> = self
            .occupied_cells(&from)
            .into_iter()
            .map(|pos| (pos, self.get(pos)))
            .collect();
        for pos in self.occupied_cells(&from).into_iter().chain(self.occupied_cells(&dest)) {
            self.set(pos, CellValue::Empty);
        }
        for (pos, value) in moved {
            let target = CellAddress::new(
                dest.start.sheet + (pos.sheet - from.start.sheet),
                dest.start.row + (pos.row - from.start.row),
                dest.start.col + (pos.col - from.start.col),
            );
            self.set(target, value);
        }
        Ok(())
    }
}

impl Document for MemoryDocument {
    fn bounds(&self) -> DocumentBounds {
        DocumentBounds::new(self.max_col, self.max_row, self.sheets.len().saturating_sub(1) as u32)
    }

    fn apply_structural_edit(&mut self, edit: &StructuralEdit) -> Result<(), DocumentError> {
        self.recalc_during_last_edit = Some(self.auto_recalc);
        match *edit {
            StructuralEdit::Insert { axis, sheet, start, count } => self.insert(axis, sheet, start, count),
            StructuralEdit::Delete { axis, sheet, start, count } => self.delete(axis, sheet, start, count),
            StructuralEdit::Move { from, to } => self.move_cells(from, to),
        }
    }

    fn read_cell(&self, pos: CellAddress) -> CellValue {
        self.get(pos)
    }

    fn write_cell(&mut self, pos: CellAddress, value: CellValue) -> Result<(), DocumentError> {
        self.check_sheet(pos.sheet)?;
        if pos.row > self.max_row || pos.col > self.max_col {
            return Err(DocumentError::OutOfBounds(pos.to_string()));
        }
        self.check_editable(&CellRange::single(pos))?;
        self.set(pos, value);
        Ok(())
    }

    fn is_editable(&self, range: &CellRange) -> bool {
        self.check_editable(range).is_ok()
    }

    fn occupied_cells(&self, range: &CellRange) -> Vec<CellAddress> {
        let mut found: Vec<_> = (range.start.sheet..=range.end.sheet)
            .filter_map(|sheet| self.sheets.get(sheet as usize).map(|s| (sheet, s)))
            .flat_map(|(sheet, s)| {
                s.cells
                    .keys()
                    .map(move |&(r, c)| CellAddress::new(sheet, r, c))
                    .filter(|pos| range.contains(pos))
            })
            .collect();
        found.sort();
        found
    }

    fn auto_recalc(&self) -> bool {
        self.auto_recalc
    }

    fn set_auto_recalc(&mut self, enabled: bool) {
        self.auto_recalc = enabled;
    }

    fn listening(&self) -> bool {
        self.listening
    }

    fn set_listening(&mut self, enabled: bool) {
        self.listening = enabled;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::SuspendRecalc;

    fn at(row: u32, col: u32) -> CellAddress {
        CellAddress::new(0, row, col)
    }

    #[test]
    fn test_insert_rows_shifts_down() {
        let mut doc = MemoryDocument::new(1, 10, 4);
        doc.set(at(8, 0), "x");
        doc.set(at(2, 0), "y");
        doc.apply_structural_edit(&StructuralEdit::Insert { axis: Axis::Rows, sheet: 0, start: 5, count: 3 })
            .unwrap();
        assert_eq!(doc.get(at(2, 0)), CellValue::from("y"));
        // Row 8 + 3 falls off a 10-row sheet.
        assert!(doc.occupied_cells(&CellRange::new(at(0, 0), at(9, 3))).len() == 1);
    }

    #[test]
    fn test_delete_cols_shifts_left() {
        let mut doc = MemoryDocument::new(1, 10, 10);
        doc.set(at(0, 1), "gone");
        doc.set(at(0, 4), "kept");
        doc.apply_structural_edit(&StructuralEdit::Delete { axis: Axis::Cols, sheet: 0, start: 1, count: 2 })
            .unwrap();
        assert_eq!(doc.get(at(0, 2)), CellValue::from("kept"));
        assert_eq!(doc.get(at(0, 1)), CellValue::Empty);
    }

    #[test]
    fn test_move_overwrites_destination() {
        let mut doc = MemoryDocument::new(1, 10, 10);
        doc.set(at(0, 0), "a");
        doc.set(at(5, 5), "old");
        let from = CellRange::new(at(0, 0), at(1, 1));
        doc.apply_structural_edit(&StructuralEdit::Move { from, to: at(5, 5) }).unwrap();
        assert_eq!(doc.get(at(5, 5)), CellValue::from("a"));
        assert_eq!(doc.get(at(0, 0)), CellValue::Empty);
    }

    #[test]
    fn test_protected_rows_block_delete() {
        let mut doc = MemoryDocument::new(1, 10, 4);
        doc.protect(CellRange::single(at(7, 0)));
        let err = doc
            .apply_structural_edit(&StructuralEdit::Delete { axis: Axis::Rows, sheet: 0, start: 2, count: 1 })
            .unwrap_err();
        assert!(matches!(err, DocumentError::Protected(_)));
        assert!(doc.write_cell(at(7, 0), CellValue::Number(1.0)).is_err());
        assert!(doc.write_cell(at(6, 0), CellValue::Number(1.0)).is_ok());
    }

    #[test]
    fn test_sheet_insert_and_delete() {
        let mut doc = MemoryDocument::new(2, 5, 5);
        doc.set(CellAddress::new(1, 0, 0), "s1");
        doc.apply_structural_edit(&StructuralEdit::Insert { axis: Axis::Sheets, sheet: 0, start: 0, count: 1 })
            .unwrap();
        assert_eq!(doc.bounds().max_sheet, 2);
        assert_eq!(doc.get(CellAddress::new(2, 0, 0)), CellValue::from("s1"));
        doc.apply_structural_edit(&StructuralEdit::Delete { axis: Axis::Sheets, sheet: 0, start: 0, count: 2 })
            .unwrap();
        assert_eq!(doc.get(CellAddress::new(0, 0, 0)), CellValue::from("s1"));
    }

    #[test]
    fn test_suspend_recalc_restores_flags() {
        let mut doc = MemoryDocument::new(1, 10, 4);
        {
            let mut guard = SuspendRecalc::new(&mut doc);
            assert!(!guard.auto_recalc());
            assert!(!guard.listening());
            guard
                .apply_structural_edit(&StructuralEdit::Insert { axis: Axis::Rows, sheet: 0, start: 0, count: 1 })
                .unwrap();
        }
        assert_eq!(doc.recalc_during_last_edit(), Some(false));
        assert!(doc.auto_recalc());
        assert!(doc.listening());
    }
}
