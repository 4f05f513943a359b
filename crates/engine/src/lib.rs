pub mod action;
pub mod chain;
pub mod describe;
pub mod document;
pub mod error;
pub mod events;
pub mod memory;
pub mod merge;
pub mod rebase;
pub mod resolve;
pub mod track;

#[cfg(test)]
pub mod harness;

pub use action::{Action, ActionBody, ActionId, ActionKind, ActionState};
pub use chain::ActionChain;
pub use describe::{DescribeAction, PlainDescriber};
pub use document::{Document, DocumentError, StructuralEdit, SuspendRecalc};
pub use error::TrackError;
pub use events::{EventCollector, LogCallback, LogEvent, LogEventKind};
pub use memory::MemoryDocument;
pub use merge::MergeReport;
pub use rebase::{HeldWindow, MergeState, RebaseContext};
pub use track::{snapshot_cells, ChangeTrack};
