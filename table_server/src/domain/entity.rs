use glam::{Quat, Vec2, Vec3};

use crate::domain::state::{EntityId, ParticipantId, Pose, SpawnRequest};
use crate::domain::tuning::TokenTuning;

/// Collision footprint of a token at unit scale.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TokenShape {
    pub half_extents: Vec3,
    /// Distance from the pivot down to the bottom face.
    pub pivot_to_bottom: f32,
}

impl Default for TokenShape {
    fn default() -> Self {
        // Pivot sits on the bottom face.
        Self {
            half_extents: Vec3::new(0.5, 0.1, 0.5),
            pivot_to_bottom: 0.0,
        }
    }
}

impl TokenShape {
    pub fn scaled_half_extents(&self, scale: f32) -> Vec3 {
        self.half_extents * scale
    }

    pub fn bottom_y(&self, pivot_y: f32, scale: f32) -> f32 {
        pivot_y - self.pivot_to_bottom * scale
    }

    pub fn pivot_y(&self, bottom_y: f32, scale: f32) -> f32 {
        bottom_y + self.pivot_to_bottom * scale
    }
}

/// Box the ground resolver sweeps with.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Footprint {
    /// Horizontal center of the token.
    pub center: Vec2,
    pub bottom_y: f32,
    pub half_extents: Vec3,
    pub orientation: Quat,
}

impl Footprint {
    pub fn height(&self) -> f32 {
        self.half_extents.y * 2.0
    }

    pub fn center_at(&self, bottom_y: f32) -> Vec3 {
        Vec3::new(self.center.x, bottom_y + self.half_extents.y, self.center.y)
    }
}

/// Discrete fields replicated reliably on change.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReliableFields {
    pub scale: f32,
    pub discrete_state: i32,
    pub locked: bool,
    pub dragging: bool,
    pub drag_owner: Option<ParticipantId>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FieldChanges {
    pub scale: bool,
    pub discrete_state: bool,
    pub locked: bool,
    pub dragging: bool,
    pub drag_owner: bool,
}

impl FieldChanges {
    pub fn any(&self) -> bool {
        self.scale || self.discrete_state || self.locked || self.dragging || self.drag_owner
    }
}

/// A networked token. Position and rotation travel on the frequent
/// channel; everything in [`ReliableFields`] travels reliably.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SyncedEntity {
    pub id: EntityId,
    pub position: Vec3,
    pub rotation: Quat,
    pub scale: f32,
    pub discrete_state: i32,
    pub locked: bool,
    pub dragging: bool,
    pub drag_owner: Option<ParticipantId>,
    pub shape: TokenShape,
}

impl SyncedEntity {
    pub fn spawn(id: EntityId, request: &SpawnRequest, tuning: &TokenTuning) -> Self {
        Self {
            id,
            position: request.pose.position,
            rotation: request.pose.rotation,
            scale: tuning.clamp_scale(request.scale.unwrap_or(tuning.default_scale)),
            discrete_state: tuning.clamp_state(request.state.unwrap_or(tuning.default_state)),
            locked: false,
            dragging: false,
            drag_owner: None,
            shape: request.shape,
        }
    }

    pub fn pose(&self) -> Pose {
        Pose::new(self.position, self.rotation)
    }

    pub fn current_pose(&self) -> Pose {
        self.pose()
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    pub fn is_dragging(&self) -> bool {
        self.dragging
    }

    pub fn drag_owner(&self) -> Option<ParticipantId> {
        self.drag_owner
    }

    pub fn set_pose(&mut self, pose: Pose) {
        self.position = pose.position;
        self.rotation = pose.rotation;
    }

    pub fn bottom_y(&self) -> f32 {
        self.shape.bottom_y(self.position.y, self.scale)
    }

    pub fn set_bottom_y(&mut self, bottom_y: f32) {
        self.position.y = self.shape.pivot_y(bottom_y, self.scale);
    }

    pub fn footprint(&self) -> Footprint {
        Footprint {
            center: Vec2::new(self.position.x, self.position.z),
            bottom_y: self.bottom_y(),
            half_extents: self.shape.scaled_half_extents(self.scale),
            orientation: self.rotation,
        }
    }

    pub fn reliable_fields(&self) -> ReliableFields {
        ReliableFields {
            scale: self.scale,
            discrete_state: self.discrete_state,
            locked: self.locked,
            dragging: self.dragging,
            drag_owner: self.drag_owner,
        }
    }

    /// Overwrites the discrete fields and reports which ones moved.
    pub fn apply_reliable(&mut self, fields: ReliableFields) -> FieldChanges {
        let changes = FieldChanges {
            scale: self.scale != fields.scale,
            discrete_state: self.discrete_state != fields.discrete_state,
            locked: self.locked != fields.locked,
            dragging: self.dragging != fields.dragging,
            drag_owner: self.drag_owner != fields.drag_owner,
        };
        self.scale = fields.scale;
        self.discrete_state = fields.discrete_state;
        self.locked = fields.locked;
        self.dragging = fields.dragging;
        self.drag_owner = fields.drag_owner;
        changes
    }
}
