//! Reference rebasing.
//!
//! Every structural action (insert, delete, move) moves the coordinates of
//! the records around it. [`ActionChain::update_reference`] runs that
//! adjustment forward when the action is applied and backward when it is
//! undone, and the two directions are exact inverses:
//!
//! ```text
//! deleting passes:  Delete forward, Insert undo, Move forward (destination)
//! inserting passes: Insert forward, Delete undo, Move undo
//! ```
//!
//! A deleting pass never loses information. Records fully inside the span are
//! frozen (swallowed) together with the action's anchor, endpoints clipped at
//! the span boundary leave a [`CutOff`] behind, and everything else shifts.
//! The matching inserting pass shifts back, re-applies the cut amounts and
//! resurrects swallowed records relative to wherever the anchor is now.

use redline_core::{Axis, BigAddress, BigRange};
use serde::{Deserialize, Serialize};

use crate::action::{Action, ActionBody, ActionId, CutOff};
use crate::chain::ActionChain;

/// Merge phase a rebase pass runs in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MergeState {
    #[default]
    None,
    /// Un-applying records back to the shared base.
    Prepare,
    /// Re-applying local records on top of imported ones.
    Own,
    /// Appending imported records.
    Other,
}

/// Local records a merge has taken off the document: ids strictly between
/// `after` and `end` are currently un-applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeldWindow {
    pub after: ActionId,
    pub end: ActionId,
}

impl HeldWindow {
    pub fn contains(&self, id: ActionId) -> bool {
        self.after < id && id < self.end
    }
}

/// Explicit rebase context. Outside a merge this is `RebaseContext::default()`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RebaseContext {
    pub merge: MergeState,
    pub held: Option<HeldWindow>,
}

impl RebaseContext {
    pub fn merging(merge: MergeState, held: HeldWindow) -> Self {
        Self { merge, held: Some(held) }
    }

    /// True if `id` is a record the merge has currently un-applied.
    pub fn is_unapplied(&self, id: ActionId) -> bool {
        self.held.is_some_and(|h| h.contains(id))
    }

    /// May a new record link to `id` (dependencies, content chains)?
    pub fn links_to(&self, id: ActionId) -> bool {
        !self.is_unapplied(id)
    }
}

/// Does a structural range reach `target` on the two axes it does not act on?
fn applies(action: &BigRange, axis: Axis, target: &BigRange) -> bool {
    axis.others().iter().all(|&o| action.contains_span(o, target))
}

fn span_within(span: (i64, i64), s: i64, e: i64) -> bool {
    let (a, b) = span;
    !BigAddress::is_sentinel(a) && !BigAddress::is_sentinel(b) && s <= a && b <= e
}

fn axis_delta(axis: Axis, amount: i64) -> BigAddress {
    let mut delta = BigAddress::new(0, 0, 0);
    delta.set(axis, amount);
    delta
}

/// New start endpoint after deleting `[s, e]`, and how far it was clipped.
fn clip_start(a: i64, s: i64, e: i64) -> (i64, i64) {
    if BigAddress::is_sentinel(a) || a < s {
        (a, 0)
    } else if a <= e {
        (s, e + 1 - a)
    } else {
        (a - (e - s + 1), 0)
    }
}

/// New end endpoint after deleting `[s, e]`, and how far it was clipped.
fn clip_end(b: i64, s: i64, e: i64) -> (i64, i64) {
    if BigAddress::is_sentinel(b) || b < s {
        (b, 0)
    } else if b <= e {
        (s - 1, b - s + 1)
    } else {
        (b - (e - s + 1), 0)
    }
}

fn shift_endpoint(x: i64, s: i64, n: i64) -> i64 {
    if !BigAddress::is_sentinel(x) && x >= s {
        x + n
    } else {
        x
    }
}

impl ActionChain {
    /// Adjust every other record for structural action `trigger` being
    /// applied (`undo == false`) or taken back (`undo == true`).
    pub fn update_reference(&mut self, trigger: ActionId, undo: bool, ctx: &RebaseContext) {
        let Some(action) = self.get(trigger) else {
            log::warn!("update_reference: unknown action {}", trigger);
            return;
        };
        let range = action.range;
        let kind = action.kind();
        log::debug!("rebase {:?} {} undo={} merge={:?}", kind, trigger, undo, ctx.merge);

        match &action.body {
            ActionBody::Insert { axis } => {
                let axis = *axis;
                if undo {
                    self.deleting_pass(trigger, axis, range, ctx);
                } else {
                    self.inserting_pass(trigger, axis, range, ctx);
                    self.restore_marks(trigger, Some(axis));
                }
            }
            ActionBody::Delete(info) => {
                let axis = info.axis;
                if undo {
                    self.inserting_pass(trigger, axis, range, ctx);
                    self.restore_marks(trigger, Some(axis));
                } else {
                    self.deleting_pass(trigger, axis, range, ctx);
                }
            }
            ActionBody::Move(info) => {
                let from = info.from;
                if undo {
                    self.move_undo(trigger, from, range);
                } else {
                    self.move_forward(trigger, from, range);
                }
            }
            ActionBody::Content(_) | ActionBody::Reject => {}
        }
    }

    /// Every record a pass may touch: main arena, then generated records.
    fn pass_targets(&self, trigger: ActionId) -> Vec<ActionId> {
        let mut ids = self.ids();
        ids.extend(self.generated_ids());
        ids.retain(|id| *id != trigger && self.get(*id).is_some_and(Action::is_live));
        ids
    }

    /// Records that move as a whole with their start point.
    fn is_anchored(&self, action: &Action, ctx: &RebaseContext) -> bool {
        match action.body {
            ActionBody::Delete(_) => true,
            ActionBody::Insert { .. } => ctx.is_unapplied(action.id),
            _ => false,
        }
    }

    fn deleting_pass(&mut self, trigger: ActionId, axis: Axis, range: BigRange, ctx: &RebaseContext) {
        let (s, e) = range.span(axis);
        let shift = axis_delta(axis, -(e - s + 1));
        let anchor = range.start;
        let mut cut_offs = Vec::new();

        for id in self.pass_targets(trigger) {
            let Some(p) = self.get(id) else { continue };

            if self.is_anchored(p, ctx) {
                if !applies(&range, axis, &p.range) {
                    continue;
                }
                let x = p.range.start.get(axis);
                if BigAddress::is_sentinel(x) {
                    continue;
                }
                if s <= x && x <= e {
                    log::trace!("  {} swallows anchored {}", trigger, id);
                    self.swallow(id, trigger, anchor);
                } else if x > e {
                    if let Some(p) = self.get_mut(id) {
                        p.translate(&shift);
                    }
                }
                continue;
            }

            let parts = p.parts();
            let contained = parts.iter().all(|&part| {
                p.part(part)
                    .is_some_and(|r| applies(&range, axis, &r) && span_within(r.span(axis), s, e))
            });
            if contained {
                log::trace!("  {} swallows {}", trigger, id);
                self.swallow(id, trigger, anchor);
                continue;
            }

            let old_row = p.range.start.row;
            let Some(p) = self.get_mut(id) else { continue };
            for &part in parts {
                let Some(r) = p.part_mut(part) else { continue };
                if !applies(&range, axis, r) {
                    continue;
                }
                let (a, b) = r.span(axis);
                let (na, start_cut) = clip_start(a, s, e);
                let (nb, end_cut) = clip_end(b, s, e);
                r.set_span(axis, (na, nb));
                if start_cut != 0 || end_cut != 0 {
                    log::trace!("  {} cuts {} by ({}, {})", trigger, id, start_cut, end_cut);
                    cut_offs.push(CutOff { id, part, start: start_cut, end: end_cut });
                }
            }
            self.reslot(id, old_row);
        }

        if let Some(action) = self.get_mut(trigger) {
            action.marks.cut_offs.extend(cut_offs);
        }
    }

    fn inserting_pass(&mut self, trigger: ActionId, axis: Axis, range: BigRange, ctx: &RebaseContext) {
        let (s, e) = range.span(axis);
        let n = e - s + 1;
        let shift = axis_delta(axis, n);

        for id in self.pass_targets(trigger) {
            let Some(p) = self.get(id) else { continue };
            let anchored = self.is_anchored(p, ctx);
            let old_row = p.range.start.row;
            let Some(p) = self.get_mut(id) else { continue };

            if anchored {
                let x = p.range.start.get(axis);
                if applies(&range, axis, &p.range) && !BigAddress::is_sentinel(x) && x >= s {
                    p.translate(&shift);
                }
                continue;
            }

            for &part in p.parts() {
                let Some(r) = p.part_mut(part) else { continue };
                if !applies(&range, axis, r) {
                    continue;
                }
                let (a, b) = r.span(axis);
                r.set_span(axis, (shift_endpoint(a, s, n), shift_endpoint(b, s, n)));
            }
            self.reslot(id, old_row);
        }
    }

    fn move_forward(&mut self, trigger: ActionId, from: BigRange, to: BigRange) {
        let delta = to.start.delta_from(&from.start);
        for id in self.pass_targets(trigger) {
            let Some(p) = self.get(id) else { continue };
            let inside = |outer: &BigRange| {
                p.parts().iter().all(|&part| p.part(part).is_some_and(|r| outer.contains(&r)))
            };
            if inside(&from) {
                let old_row = p.range.start.row;
                if let Some(p) = self.get_mut(id) {
                    p.translate(&delta);
                }
                self.reslot(id, old_row);
            } else if inside(&to) {
                log::trace!("  move {} overwrites {}", trigger, id);
                self.swallow(id, trigger, to.start);
            }
        }
    }

    fn move_undo(&mut self, trigger: ActionId, from: BigRange, to: BigRange) {
        let back = from.start.delta_from(&to.start);
        for id in self.pass_targets(trigger) {
            let Some(p) = self.get(id) else { continue };
            let inside = p.parts().iter().all(|&part| p.part(part).is_some_and(|r| to.contains(&r)));
            if inside {
                let old_row = p.range.start.row;
                if let Some(p) = self.get_mut(id) {
                    p.translate(&back);
                }
                self.reslot(id, old_row);
            }
        }
        self.restore_marks(trigger, None);
    }

    /// Re-apply cut amounts and resurrect swallowed records relative to the
    /// current anchor of `trigger`. Consumes its marks.
    fn restore_marks(&mut self, trigger: ActionId, axis: Option<Axis>) {
        let Some(anchor_now) = self.get(trigger).map(|a| a.range.start) else { return };
        self.restore_marks_at(trigger, axis, anchor_now);
    }

    /// Like [`ActionChain::restore_marks`] with an explicit anchor, for
    /// resolution paths where `trigger` itself was moved by a compensation.
    pub(crate) fn restore_marks_at(&mut self, trigger: ActionId, axis: Option<Axis>, anchor_now: BigAddress) {
        let Some(action) = self.get_mut(trigger) else { return };
        let marks = std::mem::take(&mut action.marks);

        if let Some(axis) = axis {
            for cut in marks.cut_offs {
                let Some(p) = self.get_mut(cut.id) else {
                    log::warn!("cut-off target {} of {} is gone", cut.id, trigger);
                    continue;
                };
                let old_row = p.range.start.row;
                if let Some(r) = p.part_mut(cut.part) {
                    let (a, b) = r.span(axis);
                    r.set_span(axis, (a - cut.start, b + cut.end));
                }
                self.reslot(cut.id, old_row);
            }
        }

        for sw in marks.swallowed {
            let Some(p) = self.get_mut(sw.id) else {
                log::warn!("swallowed record {} of {} is gone", sw.id, trigger);
                continue;
            };
            let old_row = p.range.start.row;
            p.translate(&anchor_now.delta_from(&sw.anchor));
            p.links.deleted_in.retain(|d| *d != trigger);
            log::trace!("  {} resurrects {}", trigger, sw.id);
            self.reslot(sw.id, old_row);
        }
    }
}
