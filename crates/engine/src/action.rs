//! Action records: one entry in the change log per tracked edit.
//!
//! Records never hold references to each other. Every link (who swallowed
//! whom, who depends on whom, the per-cell content chain) is an [`ActionId`]
//! resolved through [`crate::chain::ActionChain`], which is the sole owner.

use chrono::{DateTime, Utc};
use redline_core::{Axis, BigAddress, BigRange, CellValue};
use serde::{Deserialize, Serialize};

/// Lowest id of the generated-record space. Regular ids count up from 1,
/// generated ids count down from `u64::MAX`.
pub const GENERATED_FLOOR: u64 = 1 << 63;

/// Stable identity of an action. Never reused while the record lives.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ActionId(pub u64);

impl ActionId {
    #[inline]
    pub fn raw(self) -> u64 {
        self.0
    }

    /// True for ephemeral records remembering untracked cell values.
    #[inline]
    pub fn is_generated(self) -> bool {
        self.0 >= GENERATED_FLOOR
    }
}

impl std::fmt::Display for ActionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_generated() {
            write!(f, "g{}", u64::MAX - self.0)
        } else {
            write!(f, "{}", self.0)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActionKind {
    InsertCols,
    InsertRows,
    InsertSheets,
    DeleteCols,
    DeleteRows,
    DeleteSheets,
    Move,
    Content,
    Reject,
}

impl ActionKind {
    pub fn insert(axis: Axis) -> Self {
        match axis {
            Axis::Cols => ActionKind::InsertCols,
            Axis::Rows => ActionKind::InsertRows,
            Axis::Sheets => ActionKind::InsertSheets,
        }
    }

    pub fn delete(axis: Axis) -> Self {
        match axis {
            Axis::Cols => ActionKind::DeleteCols,
            Axis::Rows => ActionKind::DeleteRows,
            Axis::Sheets => ActionKind::DeleteSheets,
        }
    }

    pub fn is_insert(self) -> bool {
        matches!(self, ActionKind::InsertCols | ActionKind::InsertRows | ActionKind::InsertSheets)
    }

    pub fn is_delete(self) -> bool {
        matches!(self, ActionKind::DeleteCols | ActionKind::DeleteRows | ActionKind::DeleteSheets)
    }

    /// Axis of an insert or delete.
    pub fn axis(self) -> Option<Axis> {
        match self {
            ActionKind::InsertCols | ActionKind::DeleteCols => Some(Axis::Cols),
            ActionKind::InsertRows | ActionKind::DeleteRows => Some(Axis::Rows),
            ActionKind::InsertSheets | ActionKind::DeleteSheets => Some(Axis::Sheets),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActionState {
    #[default]
    Virgin,
    Accepted,
    Rejected,
}

/// Which range of a record a cut-off applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RangePart {
    Range,
    /// Source range of a move.
    From,
}

/// Clip a deleting pass applied to one endpoint pair of another record.
/// `start` is how far the start endpoint was pulled forward, `end` how far
/// the end endpoint was pulled back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CutOff {
    pub id: ActionId,
    pub part: RangePart,
    pub start: i64,
    pub end: i64,
}

/// A record frozen by a structural action, with the action's anchor at the
/// moment of freezing. Resurrection moves the record by however far the
/// anchor has travelled since.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Swallowed {
    pub id: ActionId,
    pub anchor: BigAddress,
}

/// Annotations a structural action leaves on the log so its pass can be
/// reversed exactly.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RebaseMarks {
    pub swallowed: Vec<Swallowed>,
    pub cut_offs: Vec<CutOff>,
}

impl RebaseMarks {
    pub fn is_empty(&self) -> bool {
        self.swallowed.is_empty() && self.cut_offs.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeleteInfo {
    pub axis: Axis,
    /// Position inside a multi-sheet delete produced by one user action,
    /// one record per sheet. It does not group stacked single-row or
    /// single-column deletes; those are independent records with offset 0.
    pub offset: u32,
    /// Content records (tracked or generated) whose values this delete
    /// destroyed, in the order they are restored on reject.
    pub deleted_contents: Vec<ActionId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MoveInfo {
    pub from: BigRange,
    /// Destination contents overwritten by the move.
    pub deleted_contents: Vec<ActionId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentInfo {
    pub old: CellValue,
    pub new: CellValue,
    pub prev: Option<ActionId>,
    pub next: Option<ActionId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ActionBody {
    Insert { axis: Axis },
    Delete(DeleteInfo),
    Move(MoveInfo),
    Content(ContentInfo),
    /// Rejection whose document effect was subsumed by an outer rejection.
    Reject,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Links {
    /// Structural actions currently holding this record frozen. The first
    /// entry is the outermost.
    pub deleted_in: Vec<ActionId>,
    /// Virgin records this one cannot be resolved without.
    pub depends_on: Vec<ActionId>,
    pub dependents: Vec<ActionId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    pub(crate) id: ActionId,
    pub(crate) range: BigRange,
    pub(crate) state: ActionState,
    pub(crate) reject_target: Option<ActionId>,
    pub(crate) author: String,
    pub(crate) timestamp: DateTime<Utc>,
    pub(crate) comment: String,
    pub(crate) body: ActionBody,
    pub(crate) links: Links,
    pub(crate) marks: RebaseMarks,
}

impl Action {
    pub(crate) fn new(id: ActionId, range: BigRange, body: ActionBody, author: &str) -> Self {
        Self {
            id,
            range,
            state: ActionState::Virgin,
            reject_target: None,
            author: author.to_string(),
            timestamp: Utc::now(),
            comment: String::new(),
            body,
            links: Links::default(),
            marks: RebaseMarks::default(),
        }
    }

    pub fn id(&self) -> ActionId {
        self.id
    }

    pub fn kind(&self) -> ActionKind {
        match &self.body {
            ActionBody::Insert { axis } => ActionKind::insert(*axis),
            ActionBody::Delete(info) => ActionKind::delete(info.axis),
            ActionBody::Move(_) => ActionKind::Move,
            ActionBody::Content(_) => ActionKind::Content,
            ActionBody::Reject => ActionKind::Reject,
        }
    }

    pub fn range(&self) -> BigRange {
        self.range
    }

    pub fn state(&self) -> ActionState {
        self.state
    }

    /// The action this one compensates, if it was appended by a reject.
    pub fn reject_target(&self) -> Option<ActionId> {
        self.reject_target
    }

    pub fn author(&self) -> &str {
        &self.author
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn comment(&self) -> &str {
        &self.comment
    }

    pub fn body(&self) -> &ActionBody {
        &self.body
    }

    pub fn links(&self) -> &Links {
        &self.links
    }

    pub fn marks(&self) -> &RebaseMarks {
        &self.marks
    }

    pub fn is_virgin(&self) -> bool {
        self.state == ActionState::Virgin
    }

    pub fn is_accepted(&self) -> bool {
        self.state == ActionState::Accepted
    }

    pub fn is_rejected(&self) -> bool {
        self.state == ActionState::Rejected
    }

    /// Not frozen by any structural action.
    pub fn is_live(&self) -> bool {
        self.links.deleted_in.is_empty()
    }

    pub fn is_deleted_in(&self, by: ActionId) -> bool {
        self.links.deleted_in.contains(&by)
    }

    pub fn has_dependents(&self) -> bool {
        !self.links.dependents.is_empty()
    }

    pub fn is_compensation(&self) -> bool {
        self.reject_target.is_some()
    }

    pub fn is_structural(&self) -> bool {
        matches!(self.body, ActionBody::Insert { .. } | ActionBody::Delete(_) | ActionBody::Move(_))
    }

    pub fn is_content(&self) -> bool {
        matches!(self.body, ActionBody::Content(_))
    }

    /// Axis of an insert or delete.
    pub fn axis(&self) -> Option<Axis> {
        self.kind().axis()
    }

    pub fn content(&self) -> Option<&ContentInfo> {
        match &self.body {
            ActionBody::Content(info) => Some(info),
            _ => None,
        }
    }

    pub(crate) fn content_mut(&mut self) -> Option<&mut ContentInfo> {
        match &mut self.body {
            ActionBody::Content(info) => Some(info),
            _ => None,
        }
    }

    pub fn delete_info(&self) -> Option<&DeleteInfo> {
        match &self.body {
            ActionBody::Delete(info) => Some(info),
            _ => None,
        }
    }

    pub fn move_info(&self) -> Option<&MoveInfo> {
        match &self.body {
            ActionBody::Move(info) => Some(info),
            _ => None,
        }
    }

    /// Source range of a move.
    pub fn from_range(&self) -> Option<BigRange> {
        self.move_info().map(|m| m.from)
    }

    /// Contents whose values a delete or move destroyed.
    pub fn deleted_contents(&self) -> &[ActionId] {
        match &self.body {
            ActionBody::Delete(info) => &info.deleted_contents,
            ActionBody::Move(info) => &info.deleted_contents,
            _ => &[],
        }
    }

    pub(crate) fn deleted_contents_mut(&mut self) -> Option<&mut Vec<ActionId>> {
        match &mut self.body {
            ActionBody::Delete(info) => Some(&mut info.deleted_contents),
            ActionBody::Move(info) => Some(&mut info.deleted_contents),
            _ => None,
        }
    }

    /// Top of its content chain: no later edit at the same cell.
    pub fn is_top_content(&self) -> bool {
        self.content().is_some_and(|c| c.next.is_none())
    }

    /// Eligible for accept/reject from the outside.
    pub fn is_touchable(&self) -> bool {
        if !self.is_live() {
            return false;
        }
        match &self.body {
            ActionBody::Content(c) => c.next.is_none(),
            ActionBody::Reject => false,
            _ => true,
        }
    }

    /// Ranges this record occupies: the main range, plus the source for a move.
    pub(crate) fn parts(&self) -> &'static [RangePart] {
        match self.body {
            ActionBody::Move(_) => &[RangePart::Range, RangePart::From],
            _ => &[RangePart::Range],
        }
    }

    pub(crate) fn part(&self, part: RangePart) -> Option<BigRange> {
        match part {
            RangePart::Range => Some(self.range),
            RangePart::From => self.from_range(),
        }
    }

    pub(crate) fn part_mut(&mut self, part: RangePart) -> Option<&mut BigRange> {
        match part {
            RangePart::Range => Some(&mut self.range),
            RangePart::From => match &mut self.body {
                ActionBody::Move(info) => Some(&mut info.from),
                _ => None,
            },
        }
    }

    /// Move every range of the record by `delta`.
    pub(crate) fn translate(&mut self, delta: &BigAddress) {
        self.range.translate(delta);
        if let ActionBody::Move(info) = &mut self.body {
            info.from.translate(delta);
        }
    }
}
