//! Accepting, rejecting and selecting recorded changes.
//!
//! Every record moves `Virgin -> Accepted` or `Virgin -> Rejected` exactly
//! once. A reject changes the document back and appends an Accepted
//! compensating record pointing at what it undid, so the log never forgets
//! what happened.
//!
//! Rejects are atomic: the log is snapshotted, document mutations go through
//! a [`Journal`], and any failure rolls both back.

use rustc_hash::FxHashSet;

use redline_core::{Axis, BigRange};

use crate::action::{ActionBody, ActionId, ActionState, ContentInfo, DeleteInfo, MoveInfo};
use crate::document::{Document, Journal, StructuralEdit, SuspendRecalc};
use crate::error::TrackError;
use crate::rebase::RebaseContext;
use crate::track::{ChangeTrack, NewAction};

impl ChangeTrack {
    /// Eligible for accept/reject from the outside. A content record below
    /// the top of its chain counts once every later edit has been rejected.
    pub fn is_touchable(&self, id: ActionId) -> bool {
        let Some(action) = self.chain.get(id) else { return false };
        if action.is_touchable() {
            return true;
        }
        if !action.is_content() || !action.is_live() {
            return false;
        }
        let members = self.chain.content_chain(id);
        members.iter().skip_while(|m| **m != id).skip(1).all(|m| self.is_settled_against(*m))
    }

    /// A later chain member that no longer stands over earlier values: rejected,
    /// or the compensation written for a rejected record.
    fn is_settled_against(&self, id: ActionId) -> bool {
        let Some(action) = self.chain.get(id) else { return true };
        action.is_rejected()
            || action.reject_target().is_some_and(|t| self.chain.get(t).map_or(true, |a| a.is_rejected()))
    }

    // ========================================================================
    // Accept
    // ========================================================================

    /// Accept `id`. True if it is (now) accepted.
    pub fn accept(&mut self, id: ActionId) -> bool {
        self.try_accept(id).is_ok()
    }

    pub fn try_accept(&mut self, id: ActionId) -> Result<(), TrackError> {
        let action = self.chain.get(id).ok_or(TrackError::UnknownAction(id))?;
        match action.state() {
            ActionState::Accepted => return Ok(()),
            ActionState::Rejected => return Err(TrackError::NotVirgin(id)),
            ActionState::Virgin => {}
        }
        if !self.is_touchable(id) {
            return Err(TrackError::NotTouchable(id));
        }

        self.start_block();
        for member in self.delete_group(id) {
            self.accept_unchecked(member);
        }
        self.end_block();
        Ok(())
    }

    fn accept_unchecked(&mut self, id: ActionId) {
        let Some(action) = self.chain.get(id) else { return };
        if !action.is_virgin() {
            return;
        }
        // Accepting an insert implies nothing about what depends on it.
        if !matches!(action.body(), ActionBody::Insert { .. }) {
            for other in self.accept_closure(id) {
                self.set_state(other, ActionState::Accepted);
                self.discard_deleted_contents(other);
            }
        }
        log::debug!("accept {}", id);
        self.set_state(id, ActionState::Accepted);
        self.discard_deleted_contents(id);
    }

    /// Virgin records accepting `id` implies: what it swallowed, what it
    /// depends on, and for content the earlier members of its chain.
    /// Depth-first, each record visited once.
    fn accept_closure(&self, id: ActionId) -> Vec<ActionId> {
        let mut seen = FxHashSet::default();
        seen.insert(id);
        let mut stack = vec![id];
        let mut out = Vec::new();

        while let Some(cur) = stack.pop() {
            let Some(action) = self.chain.get(cur) else {
                log::warn!("accept: {} is gone, treating as absent", cur);
                continue;
            };
            let mut next: Vec<ActionId> = action.marks.swallowed.iter().map(|s| s.id).collect();
            next.extend(action.links.depends_on.iter().copied());
            if let Some(prev) = action.content().and_then(|c| c.prev) {
                next.push(prev);
            }
            for n in next {
                if n.is_generated() || !seen.insert(n) {
                    continue;
                }
                if self.chain.get(n).is_some_and(|a| a.is_virgin()) {
                    out.push(n);
                    stack.push(n);
                }
            }
        }
        out
    }

    /// Members of the multi-sheet delete `id` belongs to, or just `id`.
    fn delete_group(&self, id: ActionId) -> Vec<ActionId> {
        let Some(info) = self.chain.get(id).and_then(|a| a.delete_info()) else {
            return vec![id];
        };
        let head = ActionId(id.0 - u64::from(info.offset));
        let mut group = Vec::new();
        for offset in 0u32.. {
            let member = ActionId(head.0 + u64::from(offset));
            match self.chain.get(member).and_then(|a| a.delete_info()) {
                Some(m) if m.offset == offset && m.axis == info.axis => group.push(member),
                _ => break,
            }
        }
        if !group.contains(&id) {
            log::warn!("delete {} not found in its own group", id);
            return vec![id];
        }
        group
    }

    /// Accept every touchable virgin record. Returns how many were accepted
    /// directly.
    pub fn accept_all(&mut self) -> usize {
        self.start_block();
        let mut count = 0;
        for id in self.chain.ids() {
            if self.chain.get(id).is_some_and(|a| a.is_virgin()) && self.is_touchable(id) && self.accept(id) {
                count += 1;
            }
        }
        self.end_block();
        count
    }

    // ========================================================================
    // Reject
    // ========================================================================

    /// Reject `id`, changing the document back. True if it is (now)
    /// rejected; false leaves log and document untouched.
    pub fn reject<D: Document + ?Sized>(&mut self, doc: &mut D, id: ActionId) -> bool {
        match self.try_reject(doc, id) {
            Ok(()) => true,
            Err(e) => {
                log::debug!("reject {} failed: {}", id, e);
                false
            }
        }
    }

    pub fn try_reject<D: Document + ?Sized>(&mut self, doc: &mut D, id: ActionId) -> Result<(), TrackError> {
        let action = self.chain.get(id).ok_or(TrackError::UnknownAction(id))?;
        match action.state() {
            ActionState::Rejected => return Ok(()),
            ActionState::Accepted => return Err(TrackError::NotVirgin(id)),
            ActionState::Virgin => {}
        }
        if !self.is_touchable(id) {
            return Err(TrackError::NotTouchable(id));
        }

        self.atomically(doc, |track, doc| {
            let mut group = track.delete_group(id);
            group.reverse();
            for member in group {
                track.reject_action(doc, member)?;
            }
            Ok(())
        })
    }

    /// Reject every touchable virgin record, newest first. Returns how many
    /// rejects succeeded.
    pub fn reject_all<D: Document + ?Sized>(&mut self, doc: &mut D) -> usize {
        self.start_block();
        let mut count = 0;
        for id in self.chain.ids().into_iter().rev() {
            if self.chain.get(id).is_some_and(|a| a.is_virgin()) && self.is_touchable(id) && self.reject(doc, id) {
                count += 1;
            }
        }
        self.end_block();
        count
    }

    /// Run `op` so that it either fully succeeds or leaves log, document
    /// and pending notifications exactly as they were.
    fn atomically<D, F>(&mut self, doc: &mut D, op: F) -> Result<(), TrackError>
    where
        D: Document + ?Sized,
        F: FnOnce(&mut Self, &mut Journal<'_, D>) -> Result<(), TrackError>,
    {
        let snapshot = self.chain.clone();
        self.start_block();
        let mark = self.block.mark();
        let mut journal = Journal::new(doc);

        let result = op(self, &mut journal);
        match result {
            Ok(()) => {
                self.end_block();
                Ok(())
            }
            Err(e) => {
                journal.rollback();
                self.chain = snapshot;
                self.block.discard_since(mark);
                self.end_block();
                Err(e)
            }
        }
    }

    /// Reject one record, dispatching on its kind. Document writes go
    /// through `doc` with recalculation suspended.
    pub(crate) fn reject_action<D: Document + ?Sized>(&mut self, doc: &mut D, id: ActionId) -> Result<(), TrackError> {
        let action = self.chain.get(id).ok_or(TrackError::UnknownAction(id))?;
        if action.is_rejected() {
            return Ok(());
        }
        if !action.is_virgin() {
            return Err(TrackError::NotVirgin(id));
        }
        log::debug!("reject {:?} {}", action.kind(), id);
        let mut doc = SuspendRecalc::new(doc);
        match action.body() {
            ActionBody::Insert { axis } => {
                let axis = *axis;
                self.reject_insert(&mut *doc, id, axis)
            }
            ActionBody::Delete(info) => {
                let axis = info.axis;
                self.reject_delete(&mut *doc, id, axis)
            }
            ActionBody::Move(_) => self.reject_move(&mut *doc, id),
            ActionBody::Content(_) => self.reject_content(&mut *doc, id),
            ActionBody::Reject => Err(TrackError::NotTouchable(id)),
        }
    }

    /// Virgin dependents of `id`, newest first.
    fn virgin_dependents(&self, id: ActionId) -> Vec<ActionId> {
        let mut deps: Vec<ActionId> = self
            .dependents(id)
            .into_iter()
            .filter(|d| self.chain.get(*d).is_some_and(|a| a.is_virgin()))
            .collect();
        deps.sort_unstable_by(|a, b| b.cmp(a));
        deps
    }

    fn reject_insert<D: Document + ?Sized>(&mut self, doc: &mut D, id: ActionId, axis: Axis) -> Result<(), TrackError> {
        let range = self.chain.get(id).map(|a| a.range).ok_or(TrackError::UnknownAction(id))?;

        for dep in self.virgin_dependents(id) {
            let Some(d) = self.chain.get(dep) else { continue };
            if !d.is_virgin() {
                continue;
            }
            let inside = d.parts().iter().all(|&p| d.part(p).is_some_and(|r| range.contains(&r)));
            if inside && d.is_live() {
                // Its effect on the document goes away with the inserted span.
                self.mark_subsumed(dep);
            } else {
                self.reject_action(doc, dep)?;
            }
        }

        let range = self.chain.get(id).map(|a| a.range).ok_or(TrackError::UnknownAction(id))?;
        if range.make_concrete(&doc.bounds()).is_none() {
            return Err(TrackError::InvalidRange { id, range });
        }
        let edit = StructuralEdit::from_range(axis, &range, false).ok_or(TrackError::InvalidRange { id, range })?;
        doc.apply_structural_edit(&edit)?;

        self.set_state(id, ActionState::Rejected);
        let body = ActionBody::Delete(DeleteInfo { axis, offset: 0, deleted_contents: Vec::new() });
        self.record(NewAction::compensation(range, body, id), &RebaseContext::default());
        Ok(())
    }

    /// Reject `id` without touching the document, leaving a Reject marker.
    fn mark_subsumed(&mut self, id: ActionId) {
        let Some(range) = self.chain.get(id).map(|a| a.range) else { return };
        log::trace!("reject {} subsumed by outer reject", id);
        self.set_state(id, ActionState::Rejected);
        self.record(NewAction::compensation(range, ActionBody::Reject, id), &RebaseContext::default());
    }

    fn reject_delete<D: Document + ?Sized>(&mut self, doc: &mut D, id: ActionId, axis: Axis) -> Result<(), TrackError> {
        let range = self.chain.get(id).map(|a| a.range).ok_or(TrackError::UnknownAction(id))?;
        let edit = StructuralEdit::from_range(axis, &range, true).ok_or(TrackError::InvalidRange { id, range })?;
        doc.apply_structural_edit(&edit)?;

        self.set_state(id, ActionState::Rejected);
        self.record(NewAction::compensation(range, ActionBody::Insert { axis }, id), &RebaseContext::default());

        // The compensating insert pushed the delete along with everything
        // at its anchor; it stays where its rows reappeared.
        if let Some(action) = self.chain.get_mut(id) {
            action.range = range;
        }
        self.chain.restore_marks_at(id, Some(axis), range.start);
        self.restore_deleted_contents(doc, id)
    }

    fn reject_move<D: Document + ?Sized>(&mut self, doc: &mut D, id: ActionId) -> Result<(), TrackError> {
        for dep in self.virgin_dependents(id) {
            self.reject_action(doc, dep)?;
        }

        let action = self.chain.get(id).ok_or(TrackError::UnknownAction(id))?;
        let to = action.range;
        let from = action.from_range().ok_or(TrackError::UnknownAction(id))?;
        let bounds = doc.bounds();
        let concrete_to = to.make_concrete(&bounds).ok_or(TrackError::InvalidRange { id, range: to })?;
        let concrete_from = from.make_concrete(&bounds).ok_or(TrackError::InvalidRange { id, range: from })?;
        if !doc.is_editable(&concrete_to) || !doc.is_editable(&concrete_from) {
            return Err(TrackError::NotEditable(id));
        }
        doc.apply_structural_edit(&StructuralEdit::Move { from: concrete_to, to: concrete_from.start })?;

        self.set_state(id, ActionState::Rejected);
        let body = ActionBody::Move(MoveInfo { from: to, deleted_contents: Vec::new() });
        self.record(NewAction::compensation(from, body, id), &RebaseContext::default());
        self.chain.restore_marks_at(id, None, to.start);
        self.restore_deleted_contents(doc, id)
    }

    fn reject_content<D: Document + ?Sized>(&mut self, doc: &mut D, id: ActionId) -> Result<(), TrackError> {
        let action = self.chain.get(id).ok_or(TrackError::UnknownAction(id))?;
        let range = action.range;
        let old = action.content().map(|c| c.old.clone()).ok_or(TrackError::NotContent(id))?;
        let pos = range.start.make_concrete(&doc.bounds()).ok_or(TrackError::InvalidRange { id, range })?;
        if !doc.is_editable(&redline_core::CellRange::single(pos)) {
            return Err(TrackError::NotEditable(id));
        }

        let current = doc.read_cell(pos);
        doc.write_cell(pos, old.clone())?;

        // Later edits of the same cell go with it.
        let chain = self.chain.content_chain(id);
        let later = chain.iter().skip_while(|m| **m != id).skip(1);
        let later: Vec<ActionId> =
            later.filter(|m| self.chain.get(**m).is_some_and(|a| a.is_virgin())).copied().collect();
        for m in later {
            self.set_state(m, ActionState::Rejected);
        }
        self.set_state(id, ActionState::Rejected);
        let body = ActionBody::Content(ContentInfo { old: current, new: old, prev: None, next: None });
        self.record(NewAction::compensation(range, body, id), &RebaseContext::default());
        Ok(())
    }

    /// Write back the values a delete or move destroyed, then forget them.
    fn restore_deleted_contents<D: Document + ?Sized>(&mut self, doc: &mut D, id: ActionId) -> Result<(), TrackError> {
        let list = self.chain.get(id).map(|a| a.deleted_contents().to_vec()).unwrap_or_default();
        let bounds = doc.bounds();
        for c in list {
            let Some(content) = self.chain.get(c) else {
                log::warn!("deleted content {} of {} is gone", c, id);
                continue;
            };
            let range = content.range;
            let Some(value) = content.content().map(|i| i.new.clone()) else { continue };
            let pos = range.start.make_concrete(&bounds).ok_or(TrackError::InvalidRange { id: c, range })?;
            doc.write_cell(pos, value)?;
        }
        self.discard_deleted_contents(id);
        Ok(())
    }

    // ========================================================================
    // Select
    // ========================================================================

    /// Settle the content chain of `id` on that record's value.
    ///
    /// With `keep_oldest`, earlier virgin members are accepted and later ones
    /// rejected, and the cell gets `id`'s value back. Otherwise earlier
    /// members are rejected and later ones accepted, and the cell keeps the
    /// newest value.
    pub fn select<D: Document + ?Sized>(&mut self, doc: &mut D, id: ActionId, keep_oldest: bool) -> bool {
        match self.try_select(doc, id, keep_oldest) {
            Ok(()) => true,
            Err(e) => {
                log::debug!("select {} failed: {}", id, e);
                false
            }
        }
    }

    pub fn try_select<D: Document + ?Sized>(
        &mut self,
        doc: &mut D,
        id: ActionId,
        keep_oldest: bool,
    ) -> Result<(), TrackError> {
        let action = self.chain.get(id).ok_or(TrackError::UnknownAction(id))?;
        if !action.is_content() {
            return Err(TrackError::NotContent(id));
        }
        if !action.is_virgin() {
            return Err(TrackError::NotVirgin(id));
        }
        if !action.is_live() {
            return Err(TrackError::NotTouchable(id));
        }

        let members = self.chain.content_chain(id);
        let idx = members.iter().position(|m| *m == id).unwrap_or(0);
        // An accepted later edit is final; nothing may be written over it.
        if let Some(m) = members[idx + 1..]
            .iter()
            .find(|m| self.chain.get(**m).is_some_and(|a| !a.is_virgin()) && !self.is_settled_against(**m))
        {
            return Err(TrackError::NotVirgin(*m));
        }
        let is_virgin = |track: &Self, m: &ActionId| {
            track.chain.get(*m).is_some_and(|a| a.is_virgin() && !a.is_compensation())
        };
        let earlier: Vec<ActionId> = members[..idx].iter().filter(|m| is_virgin(self, m)).copied().collect();
        let later: Vec<ActionId> = members[idx + 1..].iter().filter(|m| is_virgin(self, m)).copied().collect();

        self.atomically(doc, |track, doc| {
            if keep_oldest {
                for m in earlier {
                    track.set_state(m, ActionState::Accepted);
                }
                track.set_state(id, ActionState::Accepted);
                for m in &later {
                    track.set_state(*m, ActionState::Rejected);
                }
                // With no virgin edit above it the cell already holds its value.
                if let Some(newest) = later.last() {
                    track.write_selected(doc, id, *newest)?;
                }
            } else {
                for m in earlier {
                    track.set_state(m, ActionState::Rejected);
                }
                track.set_state(id, ActionState::Accepted);
                for m in later {
                    track.set_state(m, ActionState::Accepted);
                }
            }
            Ok(())
        })
    }

    /// Put the value of `chosen` back into its cell, recorded as the
    /// compensation for the rejected edit `undone`.
    fn write_selected<D: Document + ?Sized>(&mut self, doc: &mut D, chosen: ActionId, undone: ActionId) -> Result<(), TrackError> {
        let action = self.chain.get(chosen).ok_or(TrackError::UnknownAction(chosen))?;
        let range: BigRange = action.range;
        let value = action.content().map(|c| c.new.clone()).ok_or(TrackError::NotContent(chosen))?;
        let pos = range.start.make_concrete(&doc.bounds()).ok_or(TrackError::InvalidRange { id: chosen, range })?;

        let mut doc = SuspendRecalc::new(doc);
        let current = doc.read_cell(pos);
        doc.write_cell(pos, value.clone())?;
        let body = ActionBody::Content(ContentInfo { old: current, new: value, prev: None, next: None });
        self.record(NewAction::compensation(range, body, undone), &RebaseContext::default());
        Ok(())
    }
}
