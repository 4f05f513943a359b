//! Folding another copy's log into this one.
//!
//! Both logs share every record up to `base`. The merge takes the local
//! records after `base` off the document's coordinate space, appends the
//! incoming records after `base` as if they happened first, then re-applies
//! the local records on top of them:
//!
//! ```text
//! Prepare  incoming clone and local tail are un-applied, newest first
//! Other    incoming snapshots appended with fresh ids
//! Own      held local records re-applied, oldest first
//! States   resolutions made on the other side copied over
//! ```
//!
//! Only the log changes. The host is expected to bring its document to the
//! merged state itself (typically by loading the other copy's grid).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::action::{Action, ActionBody, ActionId, GENERATED_FLOOR};
use crate::events::LogEventKind;
use crate::rebase::{HeldWindow, MergeState, RebaseContext};
use crate::track::{ChangeTrack, NewAction};

/// Outcome of [`ChangeTrack::merge`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeReport {
    pub base: ActionId,
    /// Incoming id -> id the record got in the local log.
    pub mapping: BTreeMap<ActionId, ActionId>,
    /// Local records whose state was copied from the incoming log.
    pub states_copied: Vec<ActionId>,
}

impl MergeReport {
    /// Local id of incoming record `id`. Shared records keep their id.
    pub fn mapped(&self, id: ActionId) -> Option<ActionId> {
        if id <= self.base {
            Some(id)
        } else {
            self.mapping.get(&id).copied()
        }
    }

    pub fn imported(&self) -> usize {
        self.mapping.len()
    }
}

/// Does `action` move other records during a merge? A rejected record and
/// its compensation net out, so when both fall after `base` neither runs.
fn rebases_in_merge(action: &Action, base: ActionId) -> bool {
    if !action.is_structural() {
        return false;
    }
    if action.is_rejected() && action.id() > base {
        return false;
    }
    !action.reject_target().is_some_and(|t| t > base)
}

/// Copy of an incoming record, detached from the links of its old log.
fn detach(action: &Action) -> ActionBody {
    match action.body() {
        ActionBody::Content(info) => {
            let mut info = info.clone();
            info.prev = None;
            info.next = None;
            ActionBody::Content(info)
        }
        ActionBody::Delete(info) => {
            let mut info = info.clone();
            info.deleted_contents.clear();
            ActionBody::Delete(info)
        }
        ActionBody::Move(info) => {
            let mut info = info.clone();
            info.deleted_contents.clear();
            ActionBody::Move(info)
        }
        body => body.clone(),
    }
}

impl ChangeTrack {
    /// Merge the records `incoming` appended after `base` into this log.
    pub fn merge(&mut self, incoming: &ChangeTrack, base: ActionId) -> MergeReport {
        log::debug!(
            "merge: {} local and {} incoming records after {}",
            self.chain.ids_after(base).len(),
            incoming.chain.ids_after(base).len(),
            base
        );
        let mut report = MergeReport { base, ..MergeReport::default() };
        self.start_block();

        let snapshots = Self::prepare_incoming(incoming, base);
        let held = self.chain.ids_after(base);
        self.prepare_local(base, &held);

        let end = self.chain.peek_next_id();
        self.import(snapshots, base, end, &mut report);
        self.reapply_own(base, &held, end);

        if self.settings.merge_copy_resolved_states {
            self.copy_resolved_states(incoming, &mut report);
        }

        self.end_block();
        log::debug!("merge: imported {}, copied {} states", report.imported(), report.states_copied.len());
        report
    }

    /// Records of `incoming` after `base`, each with the coordinates it had
    /// when it was recorded. Chronological.
    fn prepare_incoming(incoming: &ChangeTrack, base: ActionId) -> Vec<Action> {
        let mut theirs = incoming.chain.clone();
        let mut snapshots = Vec::new();
        for id in theirs.ids_after(base).into_iter().rev() {
            let Some(action) = theirs.get(id) else { continue };
            let snapshot = action.clone();
            if rebases_in_merge(&snapshot, base) {
                let held = HeldWindow { after: id, end: ActionId(GENERATED_FLOOR) };
                theirs.update_reference(id, true, &RebaseContext::merging(MergeState::Prepare, held));
            }
            snapshots.push(snapshot);
        }
        snapshots.reverse();
        snapshots
    }

    fn prepare_local(&mut self, base: ActionId, held: &[ActionId]) {
        let end = self.chain.peek_next_id();
        for &id in held.iter().rev() {
            if !self.chain.get(id).is_some_and(|a| rebases_in_merge(a, base)) {
                continue;
            }
            let ctx = RebaseContext::merging(MergeState::Prepare, HeldWindow { after: id, end });
            self.chain.update_reference(id, true, &ctx);
            self.notify(LogEventKind::Change, id, id);
        }
    }

    fn import(&mut self, snapshots: Vec<Action>, base: ActionId, end: ActionId, report: &mut MergeReport) {
        let ctx = RebaseContext::merging(MergeState::Other, HeldWindow { after: base, end });
        for snap in snapshots {
            let reject_target = snap.reject_target().and_then(|t| report.mapped(t));
            if snap.reject_target().is_some() && reject_target.is_none() {
                log::warn!("merge: reject target of {} not imported", snap.id());
            }
            let new = NewAction {
                range: snap.range(),
                body: detach(&snap),
                state: snap.state(),
                reject_target,
                rebase: rebases_in_merge(&snap, base),
            };
            let id = self.record(new, &ctx);
            if let Some(action) = self.chain.get_mut(id) {
                action.author = snap.author().to_string();
                action.timestamp = snap.timestamp();
                action.comment = snap.comment().to_string();
            }
            log::trace!("merge: {} imported as {}", snap.id(), id);
            report.mapping.insert(snap.id(), id);
        }
    }

    fn reapply_own(&mut self, base: ActionId, held: &[ActionId], end: ActionId) {
        for &id in held {
            let ctx = RebaseContext::merging(MergeState::Own, HeldWindow { after: id, end });
            let Some(action) = self.chain.get(id) else { continue };

            let deps: Vec<ActionId> = if action.is_virgin() && action.is_live() {
                self.find_dependencies(action, &ctx).into_iter().filter(|d| *d >= end).collect()
            } else {
                Vec::new()
            };
            let rebase = rebases_in_merge(action, base);

            for on in deps {
                self.chain.add_dependency(id, on);
                self.notify(LogEventKind::ParentLink, on, on);
            }
            if rebase {
                self.chain.update_reference(id, false, &ctx);
                self.notify(LogEventKind::Change, id, id);
            }
        }
    }

    /// Shared records still virgin here but resolved on the other side take
    /// the other side's state.
    fn copy_resolved_states(&mut self, incoming: &ChangeTrack, report: &mut MergeReport) {
        let shared: Vec<ActionId> = self.chain.ids().into_iter().take_while(|id| *id <= report.base).collect();
        for id in shared {
            if !self.chain.get(id).is_some_and(Action::is_virgin) {
                continue;
            }
            let Some(theirs) = incoming.chain.get(id) else { continue };
            if theirs.is_virgin() {
                continue;
            }
            let state = theirs.state();
            let target = theirs.reject_target().and_then(|t| report.mapped(t));
            if let Some(action) = self.chain.get_mut(id) {
                action.state = state;
                action.reject_target = target;
            }
            self.notify(LogEventKind::Change, id, id);
            report.states_copied.push(id);
        }
    }
}
