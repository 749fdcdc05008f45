// Wire protocol DTOs and conversions for public table server messages.
// Vectors travel as [x, y, z], quaternions as [x, y, z, w].

use crate::domain::{
    EntityCommand, EntityId, ParticipantId, Pose, ReliableFields, SpawnRequest, SyncError, SyncedEntity,
    TokenShape,
};
use crate::use_cases::{PoseBatch, PoseSample, ReliableEvent, TableSnapshot};
use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};

/// Messages the server sends to connected clients over the WebSocket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ServerMessage {
    // Assigned identity after Join is accepted.
    Identity { participant_id: u64, server_time: f64 },
    // Frequent channel: every replicated pose for one tick.
    PoseBatch(PoseBatchDto),
    // Reliable channel: discrete field changes, snaps, spawns.
    Reliable(ReliableEventDto),
    // Full state for the initial sync and lag recovery.
    TableState(TableStateDto),
}

/// Messages the client sends to the server over the WebSocket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ClientMessage {
    // Initial handshake message.
    Join(JoinPayload),
    Command(CommandPayload),
    Spawn(SpawnPayload),
    Despawn(DespawnPayload),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinPayload {
    #[serde(default)]
    pub display_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandPayload {
    pub entity_id: u64,
    pub command: CommandDto,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CommandDto {
    BeginDrag,
    EndDragFinal { position: [f32; 3], rotation: [f32; 4] },
    UpdatePosition { position: [f32; 3] },
    UpdateRotation { rotation: [f32; 4] },
    MoveTo { position: [f32; 3] },
    SetLocked { locked: bool },
    SetScale { scale: f32 },
    SetState { state: i32 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpawnPayload {
    pub position: [f32; 3],
    #[serde(default)]
    pub rotation: Option<[f32; 4]>,
    #[serde(default)]
    pub scale: Option<f32>,
    #[serde(default)]
    pub state: Option<i32>,
    /// Unit-scale half extents; the default token shape when absent.
    #[serde(default)]
    pub half_extents: Option<[f32; 3]>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DespawnPayload {
    pub entity_id: u64,
}

fn vec3(v: [f32; 3]) -> Result<Vec3, SyncError> {
    let v = Vec3::from_array(v);
    if v.is_finite() { Ok(v) } else { Err(SyncError::NonFinitePose) }
}

fn quat(q: [f32; 4]) -> Result<Quat, SyncError> {
    let q = Quat::from_array(q);
    if q.is_finite() { Ok(q) } else { Err(SyncError::NonFinitePose) }
}

impl TryFrom<CommandDto> for EntityCommand {
    type Error = SyncError;

    fn try_from(command: CommandDto) -> Result<Self, Self::Error> {
        Ok(match command {
            CommandDto::BeginDrag => EntityCommand::BeginDrag,
            CommandDto::EndDragFinal { position, rotation } => {
                EntityCommand::EndDragFinal(Pose::new(vec3(position)?, quat(rotation)?))
            }
            CommandDto::UpdatePosition { position } => EntityCommand::UpdatePosition(vec3(position)?),
            CommandDto::UpdateRotation { rotation } => EntityCommand::UpdateRotation(quat(rotation)?),
            CommandDto::MoveTo { position } => EntityCommand::MoveTo(vec3(position)?),
            CommandDto::SetLocked { locked } => EntityCommand::SetLocked(locked),
            // Range clamping happens in the authority; NaN is rejected there too.
            CommandDto::SetScale { scale } => EntityCommand::SetScale(scale),
            CommandDto::SetState { state } => EntityCommand::SetState(state),
        })
    }
}

impl From<EntityCommand> for CommandDto {
    fn from(command: EntityCommand) -> Self {
        match command {
            EntityCommand::BeginDrag => CommandDto::BeginDrag,
            EntityCommand::EndDragFinal(pose) => CommandDto::EndDragFinal {
                position: pose.position.to_array(),
                rotation: pose.rotation.to_array(),
            },
            EntityCommand::UpdatePosition(position) => CommandDto::UpdatePosition {
                position: position.to_array(),
            },
            EntityCommand::UpdateRotation(rotation) => CommandDto::UpdateRotation {
                rotation: rotation.to_array(),
            },
            EntityCommand::MoveTo(position) => CommandDto::MoveTo {
                position: position.to_array(),
            },
            EntityCommand::SetLocked(locked) => CommandDto::SetLocked { locked },
            EntityCommand::SetScale(scale) => CommandDto::SetScale { scale },
            EntityCommand::SetState(state) => CommandDto::SetState { state },
        }
    }
}

impl TryFrom<SpawnPayload> for SpawnRequest {
    type Error = SyncError;

    fn try_from(payload: SpawnPayload) -> Result<Self, Self::Error> {
        let rotation = match payload.rotation {
            Some(rotation) => quat(rotation)?,
            None => Quat::IDENTITY,
        };
        let mut shape = TokenShape::default();
        if let Some(half_extents) = payload.half_extents {
            let half_extents = vec3(half_extents)?;
            if half_extents.min_element() <= 0.0 {
                return Err(SyncError::InvalidShape);
            }
            shape.half_extents = half_extents;
        }
        Ok(SpawnRequest {
            pose: Pose::new(vec3(payload.position)?, rotation),
            scale: payload.scale,
            state: payload.state,
            shape,
        })
    }
}

/// One entity's pose inside a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoseSampleDto {
    pub id: u64,
    pub position: [f32; 3],
    pub rotation: [f32; 4],
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoseBatchDto {
    pub tick: u64,
    pub timestamp: f64,
    pub poses: Vec<PoseSampleDto>,
}

impl From<&PoseBatch> for PoseBatchDto {
    fn from(batch: &PoseBatch) -> Self {
        Self {
            tick: batch.tick,
            timestamp: batch.timestamp,
            poses: batch
                .poses
                .iter()
                .map(|sample| PoseSampleDto {
                    id: sample.entity_id.0,
                    position: sample.pose.position.to_array(),
                    rotation: sample.pose.rotation.to_array(),
                })
                .collect(),
        }
    }
}

// Client-side decoding. Server output is already validated, so these are
// infallible.
impl From<&PoseBatchDto> for PoseBatch {
    fn from(dto: &PoseBatchDto) -> Self {
        Self {
            tick: dto.tick,
            timestamp: dto.timestamp,
            poses: dto
                .poses
                .iter()
                .map(|sample| PoseSample {
                    entity_id: EntityId(sample.id),
                    pose: Pose::new(Vec3::from_array(sample.position), Quat::from_array(sample.rotation)),
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReliableFieldsDto {
    pub scale: f32,
    pub state: i32,
    pub locked: bool,
    pub dragging: bool,
    /// Zero when nobody holds the drag.
    pub drag_owner: u64,
}

impl From<&ReliableFields> for ReliableFieldsDto {
    fn from(fields: &ReliableFields) -> Self {
        Self {
            scale: fields.scale,
            state: fields.discrete_state,
            locked: fields.locked,
            dragging: fields.dragging,
            drag_owner: fields.drag_owner.map_or(0, |p| p.0),
        }
    }
}

impl From<&ReliableFieldsDto> for ReliableFields {
    fn from(dto: &ReliableFieldsDto) -> Self {
        Self {
            scale: dto.scale,
            discrete_state: dto.state,
            locked: dto.locked,
            dragging: dto.dragging,
            drag_owner: (dto.drag_owner != 0).then_some(ParticipantId(dto.drag_owner)),
        }
    }
}

/// Flattened token state for spawns and full-state sync.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityStateDto {
    pub id: u64,
    pub position: [f32; 3],
    pub rotation: [f32; 4],
    pub half_extents: [f32; 3],
    pub pivot_to_bottom: f32,
    #[serde(flatten)]
    pub fields: ReliableFieldsDto,
}

impl From<&SyncedEntity> for EntityStateDto {
    fn from(entity: &SyncedEntity) -> Self {
        Self {
            id: entity.id.0,
            position: entity.position.to_array(),
            rotation: entity.rotation.to_array(),
            half_extents: entity.shape.half_extents.to_array(),
            pivot_to_bottom: entity.shape.pivot_to_bottom,
            fields: ReliableFieldsDto::from(&entity.reliable_fields()),
        }
    }
}

impl From<&EntityStateDto> for SyncedEntity {
    fn from(dto: &EntityStateDto) -> Self {
        let fields = ReliableFields::from(&dto.fields);
        Self {
            id: EntityId(dto.id),
            position: Vec3::from_array(dto.position),
            rotation: Quat::from_array(dto.rotation),
            scale: fields.scale,
            discrete_state: fields.discrete_state,
            locked: fields.locked,
            dragging: fields.dragging,
            drag_owner: fields.drag_owner,
            shape: TokenShape {
                half_extents: Vec3::from_array(dto.half_extents),
                pivot_to_bottom: dto.pivot_to_bottom,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReliableEventDto {
    FieldsChanged {
        entity_id: u64,
        fields: ReliableFieldsDto,
    },
    Snap {
        entity_id: u64,
        timestamp: f64,
        position: [f32; 3],
        rotation: [f32; 4],
    },
    ClearSnapshots {
        entity_id: u64,
    },
    Spawned {
        entity: EntityStateDto,
    },
    Despawned {
        entity_id: u64,
    },
}

impl From<&ReliableEvent> for ReliableEventDto {
    fn from(event: &ReliableEvent) -> Self {
        match event {
            ReliableEvent::FieldsChanged { entity_id, fields } => ReliableEventDto::FieldsChanged {
                entity_id: entity_id.0,
                fields: fields.into(),
            },
            ReliableEvent::Snap {
                entity_id,
                timestamp,
                pose,
            } => ReliableEventDto::Snap {
                entity_id: entity_id.0,
                timestamp: *timestamp,
                position: pose.position.to_array(),
                rotation: pose.rotation.to_array(),
            },
            ReliableEvent::ClearSnapshots { entity_id } => ReliableEventDto::ClearSnapshots {
                entity_id: entity_id.0,
            },
            ReliableEvent::Spawned { entity } => ReliableEventDto::Spawned {
                entity: entity.into(),
            },
            ReliableEvent::Despawned { entity_id } => ReliableEventDto::Despawned {
                entity_id: entity_id.0,
            },
        }
    }
}

impl From<&ReliableEventDto> for ReliableEvent {
    fn from(dto: &ReliableEventDto) -> Self {
        match dto {
            ReliableEventDto::FieldsChanged { entity_id, fields } => ReliableEvent::FieldsChanged {
                entity_id: EntityId(*entity_id),
                fields: fields.into(),
            },
            ReliableEventDto::Snap {
                entity_id,
                timestamp,
                position,
                rotation,
            } => ReliableEvent::Snap {
                entity_id: EntityId(*entity_id),
                timestamp: *timestamp,
                pose: Pose::new(Vec3::from_array(*position), Quat::from_array(*rotation)),
            },
            ReliableEventDto::ClearSnapshots { entity_id } => ReliableEvent::ClearSnapshots {
                entity_id: EntityId(*entity_id),
            },
            ReliableEventDto::Spawned { entity } => ReliableEvent::Spawned {
                entity: entity.into(),
            },
            ReliableEventDto::Despawned { entity_id } => ReliableEvent::Despawned {
                entity_id: EntityId(*entity_id),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableStateDto {
    pub tick: u64,
    pub timestamp: f64,
    pub entities: Vec<EntityStateDto>,
}

impl From<&TableSnapshot> for TableStateDto {
    fn from(snapshot: &TableSnapshot) -> Self {
        Self {
            tick: snapshot.tick,
            timestamp: snapshot.timestamp,
            entities: snapshot.entities.iter().map(EntityStateDto::from).collect(),
        }
    }
}

impl From<&TableStateDto> for TableSnapshot {
    fn from(dto: &TableStateDto) -> Self {
        Self {
            tick: dto.tick,
            timestamp: dto.timestamp,
            entities: dto.entities.iter().map(SyncedEntity::from).collect(),
        }
    }
}
