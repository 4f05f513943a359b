//! Human-readable descriptions of recorded changes, for change lists and
//! tooltips.

use redline_config::TrackSettings;
use redline_core::{col_to_letters, Axis, BigAddress, BigRange, CellValue};

use crate::action::{Action, ActionBody};

/// Turns a record into one line of text.
pub trait DescribeAction {
    fn describe(&self, action: &Action) -> String;
}

/// English descriptions in A1 notation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlainDescriber {
    pub max_value_length: usize,
}

impl Default for PlainDescriber {
    fn default() -> Self {
        Self { max_value_length: 32 }
    }
}

impl PlainDescriber {
    pub fn new(settings: &TrackSettings) -> Self {
        Self { max_value_length: settings.describe_max_value_length }
    }

    fn value(&self, value: &CellValue) -> String {
        if value.is_empty() {
            return "(empty)".to_string();
        }
        let text = value.raw_display();
        if text.chars().count() <= self.max_value_length {
            return format!("'{}'", text);
        }
        let cut: String = text.chars().take(self.max_value_length).collect();
        format!("'{}...'", cut)
    }
}

fn cell(addr: &BigAddress) -> String {
    let col = if addr.col < 0 || BigAddress::is_sentinel(addr.col) { "?".to_string() } else { col_to_letters(addr.col as u32) };
    format!("{}{}", col, addr.row + 1)
}

fn sheet_prefix(range: &BigRange) -> String {
    if BigAddress::is_sentinel(range.start.sheet) {
        String::new()
    } else {
        format!("Sheet{}!", range.start.sheet + 1)
    }
}

fn area(range: &BigRange) -> String {
    if range.start == range.end {
        format!("{}{}", sheet_prefix(range), cell(&range.start))
    } else {
        format!("{}{}:{}", sheet_prefix(range), cell(&range.start), cell(&range.end))
    }
}

/// "rows 6-8 on Sheet1", "column C on Sheet2", "sheet 3".
fn span(axis: Axis, range: &BigRange) -> String {
    let (a, b) = range.span(axis);
    let (one, many) = match axis {
        Axis::Rows => ("row", "rows"),
        Axis::Cols => ("column", "columns"),
        Axis::Sheets => ("sheet", "sheets"),
    };
    let label = |v: i64| match axis {
        Axis::Cols if v >= 0 => col_to_letters(v as u32),
        _ => (v + 1).to_string(),
    };
    let what = if a == b { format!("{} {}", one, label(a)) } else { format!("{} {}-{}", many, label(a), label(b)) };
    if axis == Axis::Sheets {
        what
    } else {
        format!("{} on Sheet{}", what, range.start.sheet + 1)
    }
}

impl DescribeAction for PlainDescriber {
    fn describe(&self, action: &Action) -> String {
        let range = action.range();
        let mut text = match action.body() {
            ActionBody::Insert { axis } => format!("Inserted {}", span(*axis, &range)),
            ActionBody::Delete(info) => format!("Deleted {}", span(info.axis, &range)),
            ActionBody::Move(info) => format!("Moved {} to {}", area(&info.from), area(&range)),
            ActionBody::Content(info) => format!(
                "Changed {} from {} to {}",
                area(&range),
                self.value(&info.old),
                self.value(&info.new)
            ),
            ActionBody::Reject => format!("Discarded change at {}", area(&range)),
        };
        if let Some(target) = action.reject_target() {
            text.push_str(&format!(" (rejecting #{})", target));
        }
        text
    }
}
