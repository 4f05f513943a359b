//! `redline-core`: value types shared by the change-tracking crates.
//!
//! Pure data: no IO, no document access.

pub mod address;
pub mod range;
pub mod value;

pub use address::{col_to_letters, Axis, BigAddress, CellAddress, DocumentBounds};
pub use range::{BigRange, CellRange};
pub use value::CellValue;
