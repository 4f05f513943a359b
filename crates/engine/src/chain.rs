//! Link index over the change log.
//!
//! Owns every [`Action`] and answers id lookups for all link kinds.
//!
//! # Invariants
//!
//! 1. **Unique, monotonic ids:** the id map's key order is chronological
//!    order, so head and tail of the chain are the first and last keys.
//! 2. **Two arenas:** generated records live in their own map with a
//!    descending counter; [`ActionId::is_generated`] routes lookups.
//! 3. **Bidirectional links:** `a ∈ b.depends_on` iff `b ∈ a.dependents`;
//!    `a ∈ b.deleted_in` iff `b` lists `a` in its swallowed marks.
//! 4. **Slot table:** every Content record in the main arena sits in exactly
//!    one slot, the one its current row maps to.
//! 5. **Remove order:** [`ActionChain::remove`] drops a record from the maps
//!    and the slot table before it tears down the links others hold to it.

use std::collections::BTreeMap;

use redline_core::BigAddress;
use rustc_hash::FxHashMap;

use crate::action::{Action, ActionId, Swallowed, GENERATED_FLOOR};

#[derive(Debug, Clone)]
pub struct ActionChain {
    actions: BTreeMap<ActionId, Action>,
    generated: BTreeMap<ActionId, Action>,
    next_id: u64,
    next_generated: u64,
    /// Content records keyed by `row.div_euclid(rows_per_slot)`.
    slots: FxHashMap<i64, Vec<ActionId>>,
    rows_per_slot: i64,
}

impl Default for ActionChain {
    fn default() -> Self {
        Self::new(64)
    }
}

impl ActionChain {
    pub fn new(rows_per_slot: u32) -> Self {
        Self {
            actions: BTreeMap::new(),
            generated: BTreeMap::new(),
            next_id: 1,
            next_generated: u64::MAX,
            slots: FxHashMap::default(),
            rows_per_slot: i64::from(rows_per_slot.max(1)),
        }
    }

    // ========================================================================
    // Ids
    // ========================================================================

    /// Id the next appended record will receive.
    pub fn peek_next_id(&self) -> ActionId {
        ActionId(self.next_id)
    }

    pub(crate) fn allocate_id(&mut self) -> ActionId {
        let id = ActionId(self.next_id);
        self.next_id += 1;
        id
    }

    pub(crate) fn allocate_generated_id(&mut self) -> ActionId {
        debug_assert!(self.next_generated >= GENERATED_FLOOR, "generated id space exhausted");
        let id = ActionId(self.next_generated);
        self.next_generated -= 1;
        id
    }

    pub fn is_generated(id: ActionId) -> bool {
        id.is_generated()
    }

    // ========================================================================
    // Lookup
    // ========================================================================

    pub fn get(&self, id: ActionId) -> Option<&Action> {
        if id.is_generated() {
            self.generated.get(&id)
        } else {
            self.actions.get(&id)
        }
    }

    pub(crate) fn get_mut(&mut self, id: ActionId) -> Option<&mut Action> {
        if id.is_generated() {
            self.generated.get_mut(&id)
        } else {
            self.actions.get_mut(&id)
        }
    }

    pub fn contains(&self, id: ActionId) -> bool {
        self.get(id).is_some()
    }

    pub fn first(&self) -> Option<ActionId> {
        self.actions.keys().next().copied()
    }

    pub fn last(&self) -> Option<ActionId> {
        self.actions.keys().next_back().copied()
    }

    /// Records of the main arena in chronological order.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &Action> + '_ {
        self.actions.values()
    }

    /// Snapshot of main-arena ids, for passes that mutate while walking.
    pub fn ids(&self) -> Vec<ActionId> {
        self.actions.keys().copied().collect()
    }

    /// Ids strictly after `after`, chronological.
    pub fn ids_after(&self, after: ActionId) -> Vec<ActionId> {
        self.actions
            .range((std::ops::Bound::Excluded(after), std::ops::Bound::Unbounded))
            .map(|(id, _)| *id)
            .collect()
    }

    pub fn generated_ids(&self) -> Vec<ActionId> {
        self.generated.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    // ========================================================================
    // Append / remove
    // ========================================================================

    /// Add a record to the arena its id belongs to. Content records in the
    /// main arena are slotted by row.
    pub(crate) fn append(&mut self, action: Action) {
        let id = action.id;
        debug_assert!(!self.contains(id), "duplicate action id {}", id);
        if id.is_generated() {
            self.generated.insert(id, action);
            return;
        }
        debug_assert!(self.last().map_or(true, |last| last < id), "ids must be appended in order");
        if id.0 >= self.next_id {
            self.next_id = id.0 + 1;
        }
        if action.is_content() {
            let row = action.range.start.row;
            self.insert_in_slot(id, row);
        }
        self.actions.insert(id, action);
    }

    /// Take a record out of the log.
    ///
    /// The record leaves the maps and the slot table first; only then are the
    /// links other records hold to it dismantled, so no link teardown can
    /// observe a half-removed record.
    pub(crate) fn remove(&mut self, id: ActionId) -> Option<Action> {
        let action = if id.is_generated() {
            self.generated.remove(&id)?
        } else {
            self.actions.remove(&id)?
        };
        if action.is_content() && !id.is_generated() {
            self.remove_from_slot(id, action.range.start.row);
        }

        for dep in &action.links.depends_on {
            if let Some(other) = self.get_mut(*dep) {
                other.links.dependents.retain(|d| *d != id);
            }
        }
        for dependent in &action.links.dependents {
            if let Some(other) = self.get_mut(*dependent) {
                other.links.depends_on.retain(|d| *d != id);
            }
        }
        for by in &action.links.deleted_in {
            if let Some(deleter) = self.get_mut(*by) {
                deleter.marks.swallowed.retain(|s| s.id != id);
                if let Some(list) = deleter.deleted_contents_mut() {
                    list.retain(|c| *c != id);
                }
            }
        }
        for sw in &action.marks.swallowed {
            if let Some(frozen) = self.get_mut(sw.id) {
                log::warn!("action {} removed while still holding {} frozen", id, sw.id);
                frozen.links.deleted_in.retain(|d| *d != id);
            }
        }
        if let Some(content) = action.content() {
            if let Some(prev) = content.prev.and_then(|p| self.get_mut(p)) {
                if let Some(c) = prev.content_mut() {
                    c.next = content.next;
                }
            }
            if let Some(next) = content.next.and_then(|n| self.get_mut(n)) {
                if let Some(c) = next.content_mut() {
                    c.prev = content.prev;
                }
            }
        }
        for other in self.actions.values_mut() {
            other.marks.cut_offs.retain(|c| c.id != id);
        }
        Some(action)
    }

    /// Drop every record and reset the id counters.
    pub fn clear(&mut self) {
        let rows_per_slot = self.rows_per_slot;
        *self = Self::new(rows_per_slot as u32);
    }

    // ========================================================================
    // Content slots
    // ========================================================================

    pub fn compute_slot(&self, row: i64) -> i64 {
        row.div_euclid(self.rows_per_slot)
    }

    fn insert_in_slot(&mut self, id: ActionId, row: i64) {
        let slot = self.compute_slot(row);
        self.slots.entry(slot).or_default().push(id);
    }

    fn remove_from_slot(&mut self, id: ActionId, row: i64) {
        let slot = self.compute_slot(row);
        if let Some(ids) = self.slots.get_mut(&slot) {
            ids.retain(|x| *x != id);
            if ids.is_empty() {
                self.slots.remove(&slot);
            }
        }
    }

    /// Re-slot a content record after its row changed from `old_row`.
    pub(crate) fn reslot(&mut self, id: ActionId, old_row: i64) {
        if id.is_generated() {
            return;
        }
        let Some(new_row) = self.actions.get(&id).filter(|a| a.is_content()).map(|a| a.range.start.row) else {
            return;
        };
        if self.compute_slot(old_row) != self.compute_slot(new_row) {
            self.remove_from_slot(id, old_row);
            self.insert_in_slot(id, new_row);
        }
    }

    /// Top of the live content chain at `pos`, considering only records
    /// `accept` lets through.
    pub fn search_content_at_filtered(
        &self,
        pos: &BigAddress,
        accept: impl Fn(&Action) -> bool,
    ) -> Option<ActionId> {
        let slot = self.compute_slot(pos.row);
        let ids = self.slots.get(&slot)?;
        let mut found = ids.iter().rev().filter_map(|id| self.actions.get(id)).find(|a| {
            a.range.start == *pos && a.is_live() && accept(a)
        })?;
        // Climb to the newest visible member.
        while let Some(next) = found.content().and_then(|c| c.next).and_then(|n| self.actions.get(&n)) {
            if !next.is_live() || !accept(next) {
                break;
            }
            found = next;
        }
        Some(found.id)
    }

    /// Top of the live content chain at `pos`.
    pub fn search_content_at(&self, pos: &BigAddress) -> Option<ActionId> {
        self.search_content_at_filtered(pos, |_| true)
    }

    /// Ids of every content record in the slot `row` maps to.
    pub fn slot_members(&self, row: i64) -> &[ActionId] {
        self.slots.get(&self.compute_slot(row)).map(Vec::as_slice).unwrap_or(&[])
    }

    // ========================================================================
    // Links
    // ========================================================================

    /// Record that `dependent` cannot be resolved without `on`.
    pub(crate) fn add_dependency(&mut self, dependent: ActionId, on: ActionId) {
        if dependent == on || !self.contains(dependent) || !self.contains(on) {
            return;
        }
        if let Some(a) = self.get_mut(dependent) {
            if a.links.depends_on.contains(&on) {
                return;
            }
            a.links.depends_on.push(on);
        }
        if let Some(b) = self.get_mut(on) {
            b.links.dependents.push(dependent);
        }
    }

    /// Freeze `id` under structural action `by`, anchored at `anchor`.
    pub(crate) fn swallow(&mut self, id: ActionId, by: ActionId, anchor: BigAddress) {
        let Some(frozen) = self.get_mut(id) else {
            log::warn!("swallow: unknown action {}", id);
            return;
        };
        frozen.links.deleted_in.push(by);
        if let Some(deleter) = self.get_mut(by) {
            deleter.marks.swallowed.push(Swallowed { id, anchor });
        }
    }

    /// Splice content `id` into the chain of its cell, directly after `prev`.
    pub(crate) fn link_content(&mut self, id: ActionId, prev: Option<ActionId>) {
        let next = prev.and_then(|p| self.get(p)).and_then(|a| a.content()).and_then(|c| c.next);
        if let Some(c) = self.get_mut(id).and_then(|a| a.content_mut()) {
            c.prev = prev;
            c.next = next;
        }
        if let Some(c) = prev.and_then(|p| self.get_mut(p)).and_then(|a| a.content_mut()) {
            c.next = Some(id);
        }
        if let Some(c) = next.and_then(|n| self.get_mut(n)).and_then(|a| a.content_mut()) {
            c.prev = Some(id);
        }
    }

    /// Splice content `id` into a chain directly before `next`.
    pub(crate) fn link_content_before(&mut self, id: ActionId, next: ActionId) {
        let prev = self.get(next).and_then(|a| a.content()).and_then(|c| c.prev);
        if let Some(c) = self.get_mut(id).and_then(|a| a.content_mut()) {
            c.prev = prev;
            c.next = Some(next);
        }
        if let Some(c) = self.get_mut(next).and_then(|a| a.content_mut()) {
            c.prev = Some(id);
        }
        if let Some(c) = prev.and_then(|p| self.get_mut(p)).and_then(|a| a.content_mut()) {
            c.next = Some(id);
        }
    }

    /// Content chain containing `id`, oldest first.
    pub fn content_chain(&self, id: ActionId) -> Vec<ActionId> {
        let mut first = id;
        while let Some(prev) = self.get(first).and_then(|a| a.content()).and_then(|c| c.prev) {
            first = prev;
        }
        let mut chain = Vec::new();
        let mut cursor = Some(first);
        while let Some(cur) = cursor {
            if !self.get(cur).is_some_and(Action::is_content) {
                break;
            }
            chain.push(cur);
            cursor = self.get(cur).and_then(|a| a.content()).and_then(|c| c.next);
        }
        chain
    }

    /// Check the bidirectional link and slot invariants. Test builds only.
    #[cfg(test)]
    pub(crate) fn assert_consistent(&self) {
        for a in self.actions.values().chain(self.generated.values()) {
            for on in &a.links.depends_on {
                let other = self.get(*on).expect("dangling depends_on");
                assert!(other.links.dependents.contains(&a.id), "{} -> {} not mirrored", a.id, on);
            }
            for d in &a.links.dependents {
                let other = self.get(*d).expect("dangling dependent");
                assert!(other.links.depends_on.contains(&a.id), "{} <- {} not mirrored", a.id, d);
            }
            for by in &a.links.deleted_in {
                let deleter = self.get(*by).expect("dangling deleted_in");
                assert!(deleter.marks.swallowed.iter().any(|s| s.id == a.id));
            }
            for sw in &a.marks.swallowed {
                let frozen = self.get(sw.id).expect("dangling swallowed");
                assert!(frozen.links.deleted_in.contains(&a.id));
            }
            if let Some(c) = a.content() {
                if let Some(next) = c.next {
                    assert_eq!(self.get(next).and_then(|n| n.content()).and_then(|n| n.prev), Some(a.id));
                }
            }
        }
        for a in self.actions.values().filter(|a| a.is_content()) {
            assert!(self.slot_members(a.range.start.row).contains(&a.id), "{} not slotted", a.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use redline_core::{BigRange, CellValue};

    use super::*;
    use crate::action::{ActionBody, ContentInfo};

    fn content(id: u64, row: i64) -> Action {
        Action::new(
            ActionId(id),
            BigRange::cell(0, row, 0),
            ActionBody::Content(ContentInfo {
                old: CellValue::Empty,
                new: CellValue::Number(id as f64),
                prev: None,
                next: None,
            }),
            "",
        )
    }

    #[test]
    fn test_slots_bucket_by_row() {
        let mut chain = ActionChain::new(4);
        assert_eq!(chain.compute_slot(3), 0);
        assert_eq!(chain.compute_slot(4), 1);
        assert_eq!(chain.compute_slot(-1), -1);
        chain.append(content(1, 5));
        assert_eq!(chain.slot_members(7), &[ActionId(1)]);
        assert!(chain.slot_members(0).is_empty());
    }

    #[test]
    fn test_search_finds_chain_top() {
        let mut chain = ActionChain::new(64);
        chain.append(content(1, 2));
        chain.append(content(2, 2));
        chain.link_content(ActionId(2), Some(ActionId(1)));
        chain.append(content(3, 9));
        let pos = BigAddress::new(0, 2, 0);
        assert_eq!(chain.search_content_at(&pos), Some(ActionId(2)));
        assert_eq!(chain.content_chain(ActionId(1)), vec![ActionId(1), ActionId(2)]);
        chain.assert_consistent();
    }

    #[test]
    fn test_generated_arena_routing() {
        let mut chain = ActionChain::new(64);
        let g = chain.allocate_generated_id();
        assert_eq!(g, ActionId(u64::MAX));
        chain.append(content(g.0, 0));
        assert!(chain.get(g).is_some());
        assert!(chain.is_empty(), "generated records stay out of the chain");
        assert_eq!(chain.allocate_generated_id(), ActionId(u64::MAX - 1));
    }

    #[test]
    fn test_remove_unlinks_everything() {
        let mut chain = ActionChain::new(64);
        chain.append(content(1, 0));
        chain.append(content(2, 0));
        chain.link_content(ActionId(2), Some(ActionId(1)));
        chain.append(content(3, 0));
        chain.link_content(ActionId(3), Some(ActionId(2)));
        chain.add_dependency(ActionId(3), ActionId(1));

        let removed = chain.remove(ActionId(2)).unwrap();
        assert_eq!(removed.id(), ActionId(2));
        assert_eq!(chain.content_chain(ActionId(3)), vec![ActionId(1), ActionId(3)]);
        assert!(!chain.slot_members(0).contains(&ActionId(2)));
        chain.assert_consistent();

        chain.remove(ActionId(1));
        assert!(chain.get(ActionId(3)).unwrap().links().depends_on.is_empty());
        chain.assert_consistent();
    }

    #[test]
    fn test_clear_resets_ids() {
        let mut chain = ActionChain::new(64);
        assert_eq!(chain.allocate_id(), ActionId(1));
        assert_eq!(chain.allocate_id(), ActionId(2));
        chain.clear();
        assert_eq!(chain.peek_next_id(), ActionId(1));
    }
}
