use redline_core::BigRange;

use crate::action::ActionId;
use crate::document::DocumentError;

/// Why a tracked operation could not be carried out.
///
/// The boolean entry points (`accept`, `reject`, `select`) collapse these to
/// `false`; the `try_*` variants surface them.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TrackError {
    #[error("no action with id {0}")]
    UnknownAction(ActionId),

    #[error("action {0} is already resolved")]
    NotVirgin(ActionId),

    /// Swallowed by a later structural action, or not the top of its
    /// content chain, or a reject marker.
    #[error("action {0} cannot be resolved in its current position")]
    NotTouchable(ActionId),

    #[error("range {range:?} of action {id} does not map onto the document")]
    InvalidRange { id: ActionId, range: BigRange },

    #[error("action {0} touches a part of the document that is not editable")]
    NotEditable(ActionId),

    #[error("action {0} is not the last action in the log")]
    NotLast(ActionId),

    #[error("action {0} is not a content change")]
    NotContent(ActionId),

    #[error("edit covers no cells")]
    EmptyEdit,

    #[error(transparent)]
    Document(#[from] DocumentError),
}
