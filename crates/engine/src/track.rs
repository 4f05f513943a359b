//! Recording tracked edits.
//!
//! [`ChangeTrack`] owns the action log. The recording entry points apply an
//! edit to the document and then append a record for it; the `append_*`
//! variants only record, for hosts that already applied the edit.
//!
//! Appending a record runs, in order:
//! 1. dependency discovery against still-virgin records,
//! 2. content-chain linking (Content records),
//! 3. the forward rebase pass (structural records),
//! 4. notifications.

use std::ops::RangeInclusive;

use redline_config::TrackSettings;
use redline_core::{Axis, BigAddress, BigRange, CellAddress, CellRange, CellValue};

use crate::action::{
    Action, ActionBody, ActionId, ActionState, ContentInfo, DeleteInfo, MoveInfo,
};
use crate::chain::ActionChain;
use crate::document::{destination, Document, StructuralEdit, SuspendRecalc};
use crate::error::TrackError;
use crate::events::{EventBlock, LogCallback, LogEvent, LogEventKind};
use crate::rebase::RebaseContext;

/// A record about to be appended.
#[derive(Debug, Clone)]
pub(crate) struct NewAction {
    pub range: BigRange,
    pub body: ActionBody,
    pub state: ActionState,
    pub reject_target: Option<ActionId>,
    /// Run the forward rebase pass after appending.
    pub rebase: bool,
}

impl NewAction {
    pub fn virgin(range: BigRange, body: ActionBody) -> Self {
        Self { range, body, state: ActionState::Virgin, reject_target: None, rebase: true }
    }

    /// Accepted record documenting the rejection of `target`.
    pub fn compensation(range: BigRange, body: ActionBody, target: ActionId) -> Self {
        Self { range, body, state: ActionState::Accepted, reject_target: Some(target), rebase: true }
    }
}

/// Read every non-empty cell of `range` in `doc`.
pub fn snapshot_cells<D: Document + ?Sized>(doc: &D, range: &BigRange) -> Vec<(CellAddress, CellValue)> {
    let Some(concrete) = range.make_concrete(&doc.bounds()) else {
        return Vec::new();
    };
    doc.occupied_cells(&concrete)
        .into_iter()
        .map(|pos| (pos, doc.read_cell(pos)))
        .collect()
}

/// The change-tracking log of one document.
pub struct ChangeTrack {
    pub(crate) chain: ActionChain,
    pub(crate) settings: TrackSettings,
    author: String,
    listeners: Vec<LogCallback>,
    pub(crate) block: EventBlock,
}

impl std::fmt::Debug for ChangeTrack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeTrack")
            .field("actions", &self.chain.len())
            .field("author", &self.author)
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

impl Default for ChangeTrack {
    fn default() -> Self {
        Self::new(TrackSettings::default())
    }
}

impl ChangeTrack {
    pub fn new(settings: TrackSettings) -> Self {
        Self {
            chain: ActionChain::new(settings.content_rows_per_slot),
            author: settings.author.clone(),
            settings,
            listeners: Vec::new(),
            block: EventBlock::default(),
        }
    }

    pub fn settings(&self) -> &TrackSettings {
        &self.settings
    }

    pub fn chain(&self) -> &ActionChain {
        &self.chain
    }

    pub fn author(&self) -> &str {
        &self.author
    }

    /// Author stamped on records appended from now on.
    pub fn set_author(&mut self, author: impl Into<String>) {
        self.author = author.into();
    }

    // ========================================================================
    // Queries
    // ========================================================================

    pub fn get(&self, id: ActionId) -> Option<&Action> {
        self.chain.get(id)
    }

    /// Every record in chronological order.
    pub fn actions(&self) -> impl DoubleEndedIterator<Item = &Action> + '_ {
        self.chain.iter()
    }

    pub fn len(&self) -> usize {
        self.chain.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chain.is_empty()
    }

    pub fn last_id(&self) -> Option<ActionId> {
        self.chain.last()
    }

    /// Content chain through `id`, oldest first.
    pub fn content_chain(&self, id: ActionId) -> Vec<ActionId> {
        self.chain.content_chain(id)
    }

    /// Newest member of the content chain through `id`.
    pub fn top_content(&self, id: ActionId) -> Option<ActionId> {
        self.chain.content_chain(id).last().copied()
    }

    /// Top of the live content chain at a cell.
    pub fn content_at(&self, pos: CellAddress) -> Option<ActionId> {
        self.chain.search_content_at(&BigAddress::from(pos))
    }

    pub fn dependents(&self, id: ActionId) -> Vec<ActionId> {
        self.chain.get(id).map(|a| a.links.dependents.clone()).unwrap_or_default()
    }

    pub fn is_deleted_in(&self, id: ActionId, by: ActionId) -> bool {
        self.chain.get(id).is_some_and(|a| a.is_deleted_in(by))
    }

    pub fn set_comment(&mut self, id: ActionId, comment: impl Into<String>) -> Result<(), TrackError> {
        let action = self.chain.get_mut(id).ok_or(TrackError::UnknownAction(id))?;
        action.comment = comment.into();
        self.notify(LogEventKind::Change, id, id);
        Ok(())
    }

    // ========================================================================
    // Notifications
    // ========================================================================

    pub fn add_listener(&mut self, callback: LogCallback) {
        self.listeners.push(callback);
    }

    /// Buffer notifications until the matching [`ChangeTrack::end_block`].
    pub fn start_block(&mut self) {
        self.block.open();
    }

    pub fn end_block(&mut self) {
        let events = self.block.close();
        self.dispatch(&events);
    }

    pub(crate) fn notify(&mut self, kind: LogEventKind, start: ActionId, end: ActionId) {
        let event = LogEvent::new(kind, start, end);
        if self.block.is_open() {
            self.block.push(event);
        } else {
            self.dispatch(&[event]);
        }
    }

    fn dispatch(&mut self, events: &[LogEvent]) {
        for event in events {
            for listener in &mut self.listeners {
                listener(event);
            }
        }
    }

    // ========================================================================
    // Recording: edit the document, then record
    // ========================================================================

    /// Insert `count` rows/cols on `sheet` (or sheets) before `start`.
    pub fn insert<D: Document + ?Sized>(
        &mut self,
        doc: &mut D,
        axis: Axis,
        sheet: u32,
        start: u32,
        count: u32,
    ) -> Result<ActionId, TrackError> {
        if count == 0 {
            return Err(TrackError::EmptyEdit);
        }
        let edit = StructuralEdit::Insert { axis, sheet, start, count };
        SuspendRecalc::new(doc).apply_structural_edit(&edit)?;
        Ok(self.append_insert(axis, edit.big_range()))
    }

    /// Delete `count` rows/cols starting at `start` on every sheet in
    /// `sheets`, one record per sheet. For [`Axis::Sheets`] `sheets` is
    /// ignored and a single record is made.
    ///
    /// Sheets are edited one after another; if one fails, the sheets before
    /// it stay deleted and recorded.
    pub fn delete<D: Document + ?Sized>(
        &mut self,
        doc: &mut D,
        axis: Axis,
        sheets: RangeInclusive<u32>,
        start: u32,
        count: u32,
    ) -> Result<Vec<ActionId>, TrackError> {
        if count == 0 || sheets.is_empty() {
            return Err(TrackError::EmptyEdit);
        }
        let sheets: Vec<u32> = if axis == Axis::Sheets { vec![0] } else { sheets.collect() };

        self.start_block();
        let mut ids = Vec::with_capacity(sheets.len());
        let mut result = Ok(());
        for (offset, sheet) in sheets.into_iter().enumerate() {
            let edit = StructuralEdit::Delete { axis, sheet, start, count };
            let range = edit.big_range();
            let destroyed = snapshot_cells(doc, &range);
            if let Err(e) = SuspendRecalc::new(&mut *doc).apply_structural_edit(&edit) {
                result = Err(e.into());
                break;
            }
            ids.push(self.record_delete(axis, range, offset as u32, destroyed));
        }
        self.end_block();
        result.map(|()| ids)
    }

    /// Cut `from` and paste it at `to`.
    pub fn move_range<D: Document + ?Sized>(
        &mut self,
        doc: &mut D,
        from: CellRange,
        to: CellAddress,
    ) -> Result<ActionId, TrackError> {
        let dest = destination(&from, to);
        let destroyed: Vec<_> = doc
            .occupied_cells(&dest)
            .into_iter()
            .filter(|pos| !from.contains(pos))
            .map(|pos| (pos, doc.read_cell(pos)))
            .collect();
        SuspendRecalc::new(doc).apply_structural_edit(&StructuralEdit::Move { from, to })?;
        Ok(self.append_move(BigRange::from(from), BigRange::from(dest), destroyed))
    }

    /// Write a cell and record the change.
    pub fn set_cell<D: Document + ?Sized>(
        &mut self,
        doc: &mut D,
        pos: CellAddress,
        value: CellValue,
    ) -> Result<ActionId, TrackError> {
        let old = doc.read_cell(pos);
        doc.write_cell(pos, value.clone())?;
        Ok(self.append_content(pos, old, value))
    }

    // ========================================================================
    // Recording: the document already changed
    // ========================================================================

    pub fn append_insert(&mut self, axis: Axis, range: BigRange) -> ActionId {
        log::debug!("record insert {:?} {:?}", axis, range.span(axis));
        self.record(NewAction::virgin(range, ActionBody::Insert { axis }), &RebaseContext::default())
    }

    /// `destroyed` lists the non-empty cells the delete removed, as they were
    /// before it ([`snapshot_cells`]).
    pub fn append_delete(
        &mut self,
        axis: Axis,
        range: BigRange,
        destroyed: Vec<(CellAddress, CellValue)>,
    ) -> ActionId {
        self.record_delete(axis, range, 0, destroyed)
    }

    /// `destroyed` lists destination cells outside `from` the move overwrote.
    pub fn append_move(
        &mut self,
        from: BigRange,
        to: BigRange,
        destroyed: Vec<(CellAddress, CellValue)>,
    ) -> ActionId {
        log::debug!("record move {:?} -> {:?}", from, to);
        let body = ActionBody::Move(MoveInfo { from, deleted_contents: Vec::new() });
        let id = self.record(NewAction::virgin(to, body), &RebaseContext::default());
        self.collect_deleted_contents(id, destroyed);
        id
    }

    pub fn append_content(&mut self, pos: CellAddress, old: CellValue, new: CellValue) -> ActionId {
        let body = ActionBody::Content(ContentInfo { old, new, prev: None, next: None });
        self.record(NewAction::virgin(BigRange::from(CellRange::single(pos)), body), &RebaseContext::default())
    }

    fn record_delete(
        &mut self,
        axis: Axis,
        range: BigRange,
        offset: u32,
        destroyed: Vec<(CellAddress, CellValue)>,
    ) -> ActionId {
        log::debug!("record delete {:?} {:?} offset {}", axis, range.span(axis), offset);
        let body = ActionBody::Delete(DeleteInfo { axis, offset, deleted_contents: Vec::new() });
        let id = self.record(NewAction::virgin(range, body), &RebaseContext::default());
        self.collect_deleted_contents(id, destroyed);
        id
    }

    /// Append a record and bring the rest of the log up to date with it.
    pub(crate) fn record(&mut self, new: NewAction, ctx: &RebaseContext) -> ActionId {
        let id = self.chain.allocate_id();
        let mut action = Action::new(id, new.range, new.body, &self.author);
        action.state = new.state;
        action.reject_target = new.reject_target;

        let deps = if action.is_virgin() { self.find_dependencies(&action, ctx) } else { Vec::new() };
        let is_content = action.is_content();
        let structural = action.is_structural();
        self.chain.append(action);

        if is_content {
            self.link_new_content(id, ctx);
        }
        for on in &deps {
            self.chain.add_dependency(id, *on);
        }
        if structural && new.rebase {
            self.chain.update_reference(id, false, ctx);
        }

        self.notify(LogEventKind::Append, id, id);
        for on in deps {
            self.notify(LogEventKind::ParentLink, on, on);
        }
        id
    }

    fn link_new_content(&mut self, id: ActionId, ctx: &RebaseContext) {
        let Some(pos) = self.chain.get(id).map(|a| a.range.start) else { return };
        let prev = self.chain.search_content_at_filtered(&pos, |a| a.id != id && ctx.links_to(a.id));
        if prev.is_some() {
            self.chain.link_content(id, prev);
            return;
        }
        // Only held records at this cell: go in front of them.
        if ctx.held.is_some() {
            if let Some(top) = self.chain.search_content_at_filtered(&pos, |a| a.id != id) {
                if let Some(&head) = self.chain.content_chain(top).first() {
                    self.chain.link_content_before(id, head);
                }
            }
        }
    }

    /// Still-virgin records `action` cannot be resolved without. Runs before
    /// the record's own rebase pass, against the coordinates it was made in.
    pub(crate) fn find_dependencies(&self, action: &Action, ctx: &RebaseContext) -> Vec<ActionId> {
        let range = action.range;
        let candidates = self
            .chain
            .iter()
            .filter(|q| q.id != action.id && q.is_virgin() && q.is_live() && ctx.links_to(q.id));

        let depends = |q: &Action| -> bool {
            match (&action.body, &q.body) {
                (ActionBody::Content(_), ActionBody::Insert { .. } | ActionBody::Move(_)) => {
                    q.range.contains(&range)
                }
                (ActionBody::Insert { axis }, ActionBody::Insert { axis: q_axis }) if axis == q_axis => {
                    let (s, _) = range.span(*axis);
                    let (qs, qe) = q.range.span(*axis);
                    axis.others().iter().all(|&o| q.range.contains_span(o, &range)) && qs < s && s <= qe
                }
                (ActionBody::Delete(info), ActionBody::Insert { axis }) => {
                    info.axis == *axis && q.range.intersects(&range)
                }
                (ActionBody::Delete(_), ActionBody::Move(m)) => {
                    q.range.intersects(&range) || m.from.intersects(&range)
                }
                (ActionBody::Move(own), ActionBody::Insert { .. }) => {
                    q.range.intersects(&range) || q.range.intersects(&own.from)
                }
                (ActionBody::Move(own), ActionBody::Move(_)) => {
                    q.range.intersects(&range) || q.range.intersects(&own.from)
                }
                _ => false,
            }
        };
        candidates.filter(|q| depends(q)).map(|q| q.id).collect()
    }

    /// Fill the deleted-contents list of delete/move `id` from the cells it
    /// destroyed. Cells whose value matches the tracked top content at that
    /// position reuse it; the rest get a generated record.
    fn collect_deleted_contents(&mut self, id: ActionId, destroyed: Vec<(CellAddress, CellValue)>) {
        let Some(action) = self.chain.get(id) else { return };
        let anchor = action.range.start;
        let swallowed: Vec<ActionId> = action.marks.swallowed.iter().map(|s| s.id).collect();
        let mut list = Vec::new();

        for (pos, value) in destroyed {
            let bpos = BigAddress::from(pos);
            let tracked = swallowed
                .iter()
                .filter_map(|s| self.chain.get(*s))
                .find(|a| a.is_top_content() && a.range.start == bpos)
                .and_then(|a| a.content().map(|c| (a.id, c.new.clone())));

            match tracked {
                Some((tid, new)) if new == value => list.push(tid),
                tracked => {
                    if !self.settings.generate_deleted_contents {
                        continue;
                    }
                    let old = tracked.map(|(_, new)| new).unwrap_or_default();
                    let gid = self.chain.allocate_generated_id();
                    let body = ActionBody::Content(ContentInfo { old, new: value, prev: None, next: None });
                    self.chain.append(Action::new(gid, BigRange::single(bpos), body, &self.author));
                    self.chain.swallow(gid, id, anchor);
                    list.push(gid);
                }
            }
        }

        log::trace!("{} destroyed {} contents", id, list.len());
        if let Some(slot) = self.chain.get_mut(id).and_then(|a| a.deleted_contents_mut()) {
            *slot = list;
        }
    }

    pub(crate) fn set_state(&mut self, id: ActionId, state: ActionState) {
        if let Some(action) = self.chain.get_mut(id) {
            action.state = state;
            self.notify(LogEventKind::Change, id, id);
        }
    }

    /// Drop the generated records a delete/move holds and forget its
    /// deleted-contents list.
    pub(crate) fn discard_deleted_contents(&mut self, id: ActionId) {
        let list = self
            .chain
            .get_mut(id)
            .and_then(|a| a.deleted_contents_mut())
            .map(std::mem::take)
            .unwrap_or_default();
        for c in list.into_iter().filter(|c| c.is_generated()) {
            self.chain.remove(c);
        }
    }

    // ========================================================================
    // Removal
    // ========================================================================

    /// Take back the newest record (the host undid its edit).
    pub fn undo_last(&mut self) -> Option<ActionId> {
        let id = self.chain.last()?;
        self.remove(id).ok()?;
        Some(id)
    }

    /// Remove `id`, which must be the newest record.
    pub fn remove(&mut self, id: ActionId) -> Result<(), TrackError> {
        if !self.chain.contains(id) {
            return Err(TrackError::UnknownAction(id));
        }
        if self.chain.last() != Some(id) {
            return Err(TrackError::NotLast(id));
        }
        if self.chain.get(id).is_some_and(Action::is_structural) {
            self.chain.update_reference(id, true, &RebaseContext::default());
        }
        self.discard_deleted_contents(id);
        self.chain.remove(id);
        log::debug!("removed {}", id);
        self.notify(LogEventKind::Remove, id, id);
        Ok(())
    }

    /// Forget every record.
    pub fn clear(&mut self) {
        let range = self.chain.first().zip(self.chain.last());
        self.chain.clear();
        if let Some((first, last)) = range {
            self.notify(LogEventKind::Remove, first, last);
        }
    }
}
