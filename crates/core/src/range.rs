//! Rectangular 3-D ranges (sheet × row × column).

use serde::{Deserialize, Serialize};

use crate::address::{Axis, BigAddress, CellAddress, DocumentBounds};

/// A concrete range inside a live document. Both corners inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CellRange {
    pub start: CellAddress,
    pub end: CellAddress,
}

impl CellRange {
    pub fn new(start: CellAddress, end: CellAddress) -> Self {
        Self { start, end }
    }

    pub fn single(addr: CellAddress) -> Self {
        Self { start: addr, end: addr }
    }

    pub fn contains(&self, addr: &CellAddress) -> bool {
        Axis::ALL
            .iter()
            .all(|&a| self.start.get(a) <= addr.get(a) && addr.get(a) <= self.end.get(a))
    }

    pub fn intersects(&self, other: &CellRange) -> bool {
        Axis::ALL.iter().all(|&a| {
            self.start.get(a) <= other.end.get(a) && other.start.get(a) <= self.end.get(a)
        })
    }

    /// Number of cells along `axis`.
    pub fn len(&self, axis: Axis) -> u32 {
        self.end.get(axis) - self.start.get(axis) + 1
    }

    /// Iterate every address in the range, sheet-major then row-major.
    pub fn addresses(&self) -> impl Iterator<Item = CellAddress> + '_ {
        (self.start.sheet..=self.end.sheet).flat_map(move |sheet| {
            (self.start.row..=self.end.row).flat_map(move |row| {
                (self.start.col..=self.end.col).map(move |col| CellAddress::new(sheet, row, col))
            })
        })
    }
}

/// Extended-precision range stored in recorded actions.
///
/// An axis spanning `{MIN, MAX}` means "the whole axis" (whole rows for a
/// column range, whole sheets, and so on). Plain integer comparison handles
/// these correctly against concrete sub-ranges since the sentinels bracket
/// every real coordinate.
///
/// A `BigRange` may be transiently invalid (outside the document, or with
/// `start > end` on one axis while a cut-off is pending) between structural
/// edits. Call [`BigRange::is_valid`] before mapping it onto a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BigRange {
    pub start: BigAddress,
    pub end: BigAddress,
}

impl BigRange {
    pub fn new(start: BigAddress, end: BigAddress) -> Self {
        Self { start, end }
    }

    pub fn single(addr: BigAddress) -> Self {
        Self { start: addr, end: addr }
    }

    pub fn cell(sheet: i64, row: i64, col: i64) -> Self {
        Self::single(BigAddress::new(col, row, sheet))
    }

    /// Rows `first..=last` on `sheet`, all columns.
    pub fn whole_rows(sheet: i64, first: i64, last: i64) -> Self {
        Self::new(
            BigAddress::new(BigAddress::MIN, first, sheet),
            BigAddress::new(BigAddress::MAX, last, sheet),
        )
    }

    /// Columns `first..=last` on `sheet`, all rows.
    pub fn whole_cols(sheet: i64, first: i64, last: i64) -> Self {
        Self::new(
            BigAddress::new(first, BigAddress::MIN, sheet),
            BigAddress::new(last, BigAddress::MAX, sheet),
        )
    }

    /// Sheets `first..=last`, every cell.
    pub fn whole_sheets(first: i64, last: i64) -> Self {
        Self::new(
            BigAddress::new(BigAddress::MIN, BigAddress::MIN, first),
            BigAddress::new(BigAddress::MAX, BigAddress::MAX, last),
        )
    }

    /// Whole-axis structural range: rows/cols on one sheet, or sheets.
    pub fn structural(axis: Axis, sheet: i64, first: i64, last: i64) -> Self {
        match axis {
            Axis::Cols => Self::whole_cols(sheet, first, last),
            Axis::Rows => Self::whole_rows(sheet, first, last),
            Axis::Sheets => Self::whole_sheets(first, last),
        }
    }

    /// `(start, end)` along `axis`.
    #[inline]
    pub fn span(&self, axis: Axis) -> (i64, i64) {
        (self.start.get(axis), self.end.get(axis))
    }

    pub fn set_span(&mut self, axis: Axis, (start, end): (i64, i64)) {
        self.start.set(axis, start);
        self.end.set(axis, end);
    }

    /// Number of positions along `axis`.
    pub fn len(&self, axis: Axis) -> i64 {
        let (a, b) = self.span(axis);
        b - a + 1
    }

    /// True if the range covers the whole of `axis`.
    pub fn is_whole(&self, axis: Axis) -> bool {
        self.span(axis) == (BigAddress::MIN, BigAddress::MAX)
    }

    pub fn contains(&self, other: &BigRange) -> bool {
        Axis::ALL.iter().all(|&a| self.contains_span(a, other))
    }

    /// True if `other`'s extent along `axis` lies within ours.
    pub fn contains_span(&self, axis: Axis, other: &BigRange) -> bool {
        let (s, e) = self.span(axis);
        let (os, oe) = other.span(axis);
        s <= os && oe <= e
    }

    pub fn contains_address(&self, addr: &BigAddress) -> bool {
        Axis::ALL
            .iter()
            .all(|&a| self.start.get(a) <= addr.get(a) && addr.get(a) <= self.end.get(a))
    }

    pub fn intersects(&self, other: &BigRange) -> bool {
        Axis::ALL.iter().all(|&a| {
            self.start.get(a) <= other.end.get(a) && other.start.get(a) <= self.end.get(a)
        })
    }

    /// Both corners valid for `bounds` and ordered.
    pub fn is_valid(&self, bounds: &DocumentBounds) -> bool {
        self.start.is_valid(bounds)
            && self.end.is_valid(bounds)
            && Axis::ALL.iter().all(|&a| self.start.get(a) <= self.end.get(a))
    }

    pub fn make_concrete(&self, bounds: &DocumentBounds) -> Option<CellRange> {
        if !self.is_valid(bounds) {
            return None;
        }
        Some(CellRange::new(self.start.make_concrete(bounds)?, self.end.make_concrete(bounds)?))
    }

    pub fn from_concrete(range: CellRange) -> Self {
        Self::new(BigAddress::from_concrete(range.start), BigAddress::from_concrete(range.end))
    }

    /// Move both corners by `delta`, sentinels untouched.
    pub fn translate(&mut self, delta: &BigAddress) {
        self.start.translate(delta);
        self.end.translate(delta);
    }

    pub fn translated(mut self, delta: &BigAddress) -> Self {
        self.translate(delta);
        self
    }
}

impl From<CellRange> for BigRange {
    fn from(range: CellRange) -> Self {
        Self::from_concrete(range)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bounds() -> DocumentBounds {
        DocumentBounds::new(255, 9, 2)
    }

    #[test]
    fn test_whole_axis_contains_concrete() {
        let rows = BigRange::whole_rows(0, 4, 6);
        assert!(rows.contains(&BigRange::cell(0, 5, 200)));
        assert!(!rows.contains(&BigRange::cell(0, 7, 0)));
        assert!(!rows.contains(&BigRange::cell(1, 5, 0)));
        assert!(rows.is_whole(Axis::Cols));
        assert!(!rows.is_whole(Axis::Rows));
    }

    #[test]
    fn test_intersects() {
        let a = BigRange::new(BigAddress::new(0, 0, 0), BigAddress::new(3, 3, 0));
        let b = BigRange::new(BigAddress::new(3, 3, 0), BigAddress::new(5, 5, 0));
        let c = BigRange::new(BigAddress::new(4, 4, 0), BigAddress::new(5, 5, 0));
        assert!(a.intersects(&b));
        assert!(!a.intersects(&c));
        assert!(BigRange::whole_sheets(0, 0).intersects(&c));
    }

    #[test]
    fn test_concrete_round_trip() {
        let range = BigRange::whole_rows(1, 2, 3);
        let concrete = range.make_concrete(&bounds()).unwrap();
        assert_eq!(concrete.start, CellAddress::new(1, 2, 0));
        assert_eq!(concrete.end, CellAddress::new(1, 3, 255));
        assert_eq!(
            BigRange::from_concrete(concrete),
            BigRange::new(BigAddress::new(0, 2, 1), BigAddress::new(255, 3, 1))
        );
    }

    #[test]
    fn test_invalid_outside_document() {
        // Row 12 was deleted from a 10-row document.
        assert!(!BigRange::whole_rows(0, 12, 12).is_valid(&bounds()));
        // Sheet 3 no longer exists.
        assert!(BigRange::cell(3, 0, 0).make_concrete(&bounds()).is_none());
        // Inverted span while a cut-off is pending.
        let mut r = BigRange::whole_rows(0, 4, 6);
        r.set_span(Axis::Rows, (5, 4));
        assert!(!r.is_valid(&bounds()));
    }

    #[test]
    fn test_addresses_iteration() {
        let r = CellRange::new(CellAddress::new(0, 0, 0), CellAddress::new(0, 1, 1));
        let all: Vec<_> = r.addresses().collect();
        assert_eq!(all.len(), 4);
        assert_eq!(all[1], CellAddress::new(0, 0, 1));
    }
}
