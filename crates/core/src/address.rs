//! Cell addresses.
//!
//! Two flavours exist side by side:
//! - [`CellAddress`] is a concrete, 0-based position inside a live document.
//! - [`BigAddress`] is the extended-precision form stored in the change log.
//!   It can hold positions outside the current document bounds (a row that
//!   was deleted, a sheet that no longer exists) and uses the sentinels
//!   [`BigAddress::MIN`] / [`BigAddress::MAX`] to mean "grew without bound".

use serde::{Deserialize, Serialize};

/// One of the three structural axes of a workbook.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Axis {
    Cols,
    Rows,
    Sheets,
}

impl Axis {
    pub const ALL: [Axis; 3] = [Axis::Cols, Axis::Rows, Axis::Sheets];

    /// The two axes that are not `self`.
    pub fn others(self) -> [Axis; 2] {
        match self {
            Axis::Cols => [Axis::Rows, Axis::Sheets],
            Axis::Rows => [Axis::Cols, Axis::Sheets],
            Axis::Sheets => [Axis::Cols, Axis::Rows],
        }
    }
}

/// Inclusive upper bounds of a concrete document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DocumentBounds {
    pub max_col: u32,
    pub max_row: u32,
    pub max_sheet: u32,
}

impl DocumentBounds {
    pub fn new(max_col: u32, max_row: u32, max_sheet: u32) -> Self {
        Self { max_col, max_row, max_sheet }
    }

    pub fn max(&self, axis: Axis) -> u32 {
        match axis {
            Axis::Cols => self.max_col,
            Axis::Rows => self.max_row,
            Axis::Sheets => self.max_sheet,
        }
    }
}

/// A concrete cell position (0-based).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CellAddress {
    pub sheet: u32,
    pub row: u32,
    pub col: u32,
}

impl CellAddress {
    #[inline]
    pub fn new(sheet: u32, row: u32, col: u32) -> Self {
        Self { sheet, row, col }
    }

    pub fn get(&self, axis: Axis) -> u32 {
        match axis {
            Axis::Cols => self.col,
            Axis::Rows => self.row,
            Axis::Sheets => self.sheet,
        }
    }

    /// "A1" notation without the sheet.
    pub fn to_a1(&self) -> String {
        format!("{}{}", col_to_letters(self.col), self.row + 1)
    }
}

impl std::fmt::Display for CellAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Sheet{}!{}", self.sheet + 1, self.to_a1())
    }
}

/// Convert 0-based column index to spreadsheet letter(s): 0=A, 25=Z, 26=AA.
pub fn col_to_letters(col: u32) -> String {
    let mut result = String::new();
    let mut n = col;
    loop {
        result.insert(0, (b'A' + (n % 26) as u8) as char);
        if n < 26 {
            break;
        }
        n = n / 26 - 1;
    }
    result
}

/// Extended-precision address used by recorded actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BigAddress {
    pub col: i64,
    pub row: i64,
    pub sheet: i64,
}

impl BigAddress {
    /// "Unbounded towards the start of the axis".
    pub const MIN: i64 = i32::MIN as i64;
    /// "Unbounded towards the end of the axis".
    pub const MAX: i64 = i32::MAX as i64;

    #[inline]
    pub const fn new(col: i64, row: i64, sheet: i64) -> Self {
        Self { col, row, sheet }
    }

    pub fn get(&self, axis: Axis) -> i64 {
        match axis {
            Axis::Cols => self.col,
            Axis::Rows => self.row,
            Axis::Sheets => self.sheet,
        }
    }

    pub fn set(&mut self, axis: Axis, value: i64) {
        match axis {
            Axis::Cols => self.col = value,
            Axis::Rows => self.row = value,
            Axis::Sheets => self.sheet = value,
        }
    }

    /// True if `value` is one of the unbounded sentinels.
    #[inline]
    pub fn is_sentinel(value: i64) -> bool {
        value == Self::MIN || value == Self::MAX
    }

    /// Componentwise `self - other`. Sentinel components yield 0.
    pub fn delta_from(&self, other: &BigAddress) -> BigAddress {
        let d = |a: i64, b: i64| {
            if Self::is_sentinel(a) || Self::is_sentinel(b) {
                0
            } else {
                a - b
            }
        };
        BigAddress::new(d(self.col, other.col), d(self.row, other.row), d(self.sheet, other.sheet))
    }

    /// Move by `delta`, leaving sentinel components untouched.
    pub fn translate(&mut self, delta: &BigAddress) {
        for axis in Axis::ALL {
            let v = self.get(axis);
            if !Self::is_sentinel(v) {
                self.set(axis, v + delta.get(axis));
            }
        }
    }

    pub fn is_valid(&self, bounds: &DocumentBounds) -> bool {
        Axis::ALL.iter().all(|&axis| {
            let v = self.get(axis);
            Self::is_sentinel(v) || (0..=i64::from(bounds.max(axis))).contains(&v)
        })
    }

    /// Clamp sentinels to the document edges. `None` if a finite component is
    /// outside the document.
    pub fn make_concrete(&self, bounds: &DocumentBounds) -> Option<CellAddress> {
        let conv = |axis: Axis| -> Option<u32> {
            let v = self.get(axis);
            let max = bounds.max(axis);
            if v == Self::MIN {
                Some(0)
            } else if v == Self::MAX {
                Some(max)
            } else if (0..=i64::from(max)).contains(&v) {
                Some(v as u32)
            } else {
                None
            }
        };
        Some(CellAddress::new(conv(Axis::Sheets)?, conv(Axis::Rows)?, conv(Axis::Cols)?))
    }

    pub fn from_concrete(addr: CellAddress) -> Self {
        Self::new(i64::from(addr.col), i64::from(addr.row), i64::from(addr.sheet))
    }
}

impl From<CellAddress> for BigAddress {
    fn from(addr: CellAddress) -> Self {
        Self::from_concrete(addr)
    }
}
