// Use-case level inputs/outputs for the table loop.

use crate::domain::{EntityCommand, EntityId, ParticipantId, Pose, ReliableFields, SpawnRequest, SyncedEntity};

#[derive(Debug, Clone)]
pub enum TableEvent {
    Join {
        participant_id: ParticipantId,
    },
    Leave {
        participant_id: ParticipantId,
    },
    Command {
        participant_id: ParticipantId,
        entity_id: EntityId,
        command: EntityCommand,
    },
    Spawn {
        participant_id: ParticipantId,
        request: SpawnRequest,
    },
    Despawn {
        participant_id: ParticipantId,
        entity_id: EntityId,
    },
}

impl TableEvent {
    /// Events that may be dropped under backpressure. Ownership changes,
    /// final placements and discrete edits must reach the table.
    pub fn is_droppable(&self) -> bool {
        matches!(self, TableEvent::Command { command, .. } if command.is_pose_update())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PoseSample {
    pub entity_id: EntityId,
    pub pose: Pose,
}

/// Frequent-channel payload: every entity's replicated pose for one tick.
#[derive(Debug, Clone, PartialEq)]
pub struct PoseBatch {
    pub tick: u64,
    pub timestamp: f64,
    pub poses: Vec<PoseSample>,
}

/// Reliable, ordered table events.
#[derive(Debug, Clone, PartialEq)]
pub enum ReliableEvent {
    FieldsChanged {
        entity_id: EntityId,
        fields: ReliableFields,
    },
    Snap {
        entity_id: EntityId,
        timestamp: f64,
        pose: Pose,
    },
    ClearSnapshots {
        entity_id: EntityId,
    },
    Spawned {
        entity: SyncedEntity,
    },
    Despawned {
        entity_id: EntityId,
    },
}

/// Full table state, used for joins and resyncs after lag.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TableSnapshot {
    pub tick: u64,
    pub timestamp: f64,
    pub entities: Vec<SyncedEntity>,
}
