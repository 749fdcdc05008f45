use std::fmt;

use crate::domain::state::{EntityId, ParticipantId};

/// Reasons the authority refuses a command. None of these are fatal; the
/// command is dropped and logged.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncError {
    UnknownEntity(EntityId),
    EntityLocked,
    DragDenied { holder: ParticipantId },
    NotDragOwner { owner: ParticipantId },
    NonFinitePose,
    InvalidShape,
}

impl fmt::Display for SyncError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncError::UnknownEntity(id) => write!(f, "unknown entity {id}"),
            SyncError::EntityLocked => write!(f, "entity is locked"),
            SyncError::DragDenied { holder } => write!(f, "drag already held by participant {holder}"),
            SyncError::NotDragOwner { owner } => {
                write!(f, "sender is not the drag owner (owner is {owner})")
            }
            SyncError::NonFinitePose => write!(f, "pose contains non-finite values"),
            SyncError::InvalidShape => write!(f, "token half extents must be positive"),
        }
    }
}

impl std::error::Error for SyncError {}
