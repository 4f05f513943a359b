//! Change notifications for the action log.
//!
//! Views listing the log (a changes panel, a merge dialog) subscribe to
//! these instead of polling. Inside a block, events are buffered and
//! adjacent ranges of the same kind coalesced, so one user action that
//! produces many records is reported once.

use crate::action::ActionId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogEventKind {
    /// Records were appended.
    Append,
    /// Records were removed (undo of the tail, clear).
    Remove,
    /// State, range or links of existing records changed.
    Change,
    /// A dependency link was added to records in the range.
    ParentLink,
}

/// Inclusive id range affected by one change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogEvent {
    pub kind: LogEventKind,
    pub start: ActionId,
    pub end: ActionId,
}

impl LogEvent {
    pub fn new(kind: LogEventKind, start: ActionId, end: ActionId) -> Self {
        Self { kind, start, end }
    }

    pub fn single(kind: LogEventKind, id: ActionId) -> Self {
        Self::new(kind, id, id)
    }

    /// Widen `self` to cover `other` if they are the same kind and touch.
    fn absorb(&mut self, other: &LogEvent) -> bool {
        if self.kind != other.kind {
            return false;
        }
        let touches = other.start.0 <= self.end.0.saturating_add(1) && self.start.0 <= other.end.0.saturating_add(1);
        if touches {
            self.start = self.start.min(other.start);
            self.end = self.end.max(other.end);
        }
        touches
    }
}

/// Callback type for receiving log events.
pub type LogCallback = Box<dyn FnMut(&LogEvent) + Send>;

/// Nesting depth and buffered events of `start_block`/`end_block`.
#[derive(Debug, Default)]
pub(crate) struct EventBlock {
    depth: usize,
    pending: Vec<LogEvent>,
    /// Events before this index belong to an earlier operation and are
    /// never widened by later ones.
    barrier: usize,
}

impl EventBlock {
    pub(crate) fn is_open(&self) -> bool {
        self.depth > 0
    }

    pub(crate) fn open(&mut self) {
        self.depth += 1;
    }

    /// Close one level. Returns the buffered events once the outermost
    /// block closes.
    pub(crate) fn close(&mut self) -> Vec<LogEvent> {
        if self.depth == 0 {
            log::warn!("end_block without matching start_block");
            return Vec::new();
        }
        self.depth -= 1;
        if self.depth == 0 {
            self.barrier = 0;
            std::mem::take(&mut self.pending)
        } else {
            Vec::new()
        }
    }

    pub(crate) fn push(&mut self, event: LogEvent) {
        if let Some(last) = self.pending[self.barrier..].last_mut() {
            if last.absorb(&event) {
                return;
            }
        }
        self.pending.push(event);
    }

    /// Start an operation whose events may have to be discarded.
    pub(crate) fn mark(&mut self) -> usize {
        self.barrier = self.pending.len();
        self.barrier
    }

    /// Drop everything buffered since `mark`.
    pub(crate) fn discard_since(&mut self, mark: usize) {
        self.pending.truncate(mark);
        self.barrier = self.barrier.min(mark);
    }
}

/// Simple event collector for testing.
#[derive(Debug, Default)]
pub struct EventCollector {
    events: Vec<LogEvent>,
}

impl EventCollector {
    pub fn new() -> Self {
        Self { events: Vec::new() }
    }

    pub fn push(&mut self, event: LogEvent) {
        self.events.push(event);
    }

    pub fn events(&self) -> &[LogEvent] {
        &self.events
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Events of one kind, in arrival order.
    pub fn of_kind(&self, kind: LogEventKind) -> Vec<&LogEvent> {
        self.events.iter().filter(|e| e.kind == kind).collect()
    }

    pub fn appended(&self) -> Vec<&LogEvent> {
        self.of_kind(LogEventKind::Append)
    }

    pub fn removed(&self) -> Vec<&LogEvent> {
        self.of_kind(LogEventKind::Remove)
    }

    pub fn changed(&self) -> Vec<&LogEvent> {
        self.of_kind(LogEventKind::Change)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_collector_filtering() {
        let mut collector = EventCollector::new();
        collector.push(LogEvent::single(LogEventKind::Append, ActionId(1)));
        collector.push(LogEvent::single(LogEventKind::Change, ActionId(1)));
        collector.push(LogEvent::single(LogEventKind::Remove, ActionId(1)));

        assert_eq!(collector.len(), 3);
        assert_eq!(collector.appended().len(), 1);
        assert_eq!(collector.changed().len(), 1);
        assert_eq!(collector.removed().len(), 1);
    }

    #[test]
    fn test_block_coalesces_adjacent_ranges() {
        let mut block = EventBlock::default();
        block.open();
        block.push(LogEvent::single(LogEventKind::Append, ActionId(3)));
        block.push(LogEvent::single(LogEventKind::Append, ActionId(4)));
        block.push(LogEvent::single(LogEventKind::Change, ActionId(1)));
        block.push(LogEvent::single(LogEventKind::Append, ActionId(9)));
        block.open();
        assert!(block.close().is_empty());
        let out = block.close();
        assert_eq!(
            out,
            vec![
                LogEvent::new(LogEventKind::Append, ActionId(3), ActionId(4)),
                LogEvent::single(LogEventKind::Change, ActionId(1)),
                LogEvent::single(LogEventKind::Append, ActionId(9)),
            ]
        );
        assert!(!block.is_open());
    }

    #[test]
    fn test_discard_keeps_earlier_events_intact() {
        let mut block = EventBlock::default();
        block.open();
        block.push(LogEvent::single(LogEventKind::Append, ActionId(1)));
        let mark = block.mark();
        block.push(LogEvent::single(LogEventKind::Append, ActionId(2)));
        block.discard_since(mark);
        assert_eq!(block.close(), vec![LogEvent::single(LogEventKind::Append, ActionId(1))]);
    }
}
