// Domain-level identifiers, poses, snapshots and the commands that mutate tokens.

use glam::{Quat, Vec3};
use std::fmt;

use crate::domain::entity::TokenShape;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityId(pub u64);

/// Participant identity. Zero is reserved for "nobody" on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ParticipantId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ColliderId(pub u64);

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for ColliderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pose {
    pub position: Vec3,
    pub rotation: Quat,
}

impl Pose {
    pub const IDENTITY: Pose = Pose {
        position: Vec3::ZERO,
        rotation: Quat::IDENTITY,
    };

    pub fn new(position: Vec3, rotation: Quat) -> Self {
        Self { position, rotation }
    }

    pub fn at(position: Vec3) -> Self {
        Self::new(position, Quat::IDENTITY)
    }

    /// Linear position blend with spherical rotation blend.
    pub fn interpolate(self, other: Pose, t: f32) -> Pose {
        Pose {
            position: self.position.lerp(other.position, t),
            rotation: self.rotation.slerp(other.rotation, t),
        }
    }

    pub fn is_finite(&self) -> bool {
        self.position.is_finite() && self.rotation.is_finite()
    }
}

impl Default for Pose {
    fn default() -> Self {
        Self::IDENTITY
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Snapshot {
    /// Network clock time in seconds.
    pub timestamp: f64,
    pub pose: Pose,
}

/// Commands a participant may issue against a single token.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EntityCommand {
    BeginDrag,
    EndDragFinal(Pose),
    UpdatePosition(Vec3),
    UpdateRotation(Quat),
    // Direct placement outside a drag; observers snap to it.
    MoveTo(Vec3),
    SetLocked(bool),
    SetScale(f32),
    SetState(i32),
}

impl EntityCommand {
    /// Streaming drag updates; each one supersedes the last.
    pub fn is_pose_update(&self) -> bool {
        matches!(self, EntityCommand::UpdatePosition(_) | EntityCommand::UpdateRotation(_))
    }

    pub fn name(&self) -> &'static str {
        match self {
            EntityCommand::BeginDrag => "begin_drag",
            EntityCommand::EndDragFinal(_) => "end_drag_final",
            EntityCommand::UpdatePosition(_) => "update_position",
            EntityCommand::UpdateRotation(_) => "update_rotation",
            EntityCommand::MoveTo(_) => "move_to",
            EntityCommand::SetLocked(_) => "set_locked",
            EntityCommand::SetScale(_) => "set_scale",
            EntityCommand::SetState(_) => "set_state",
        }
    }
}

/// Parameters for a server-side token spawn.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpawnRequest {
    pub pose: Pose,
    pub scale: Option<f32>,
    pub state: Option<i32>,
    pub shape: TokenShape,
}

impl SpawnRequest {
    pub fn at(position: Vec3) -> Self {
        Self {
            pose: Pose::at(position),
            scale: None,
            state: None,
            shape: TokenShape::default(),
        }
    }
}
