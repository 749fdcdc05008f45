// Ports the synchronization core depends on. Engines, transports and input
// devices plug in behind these.

use glam::{Quat, Vec3};

use crate::domain::entity::{ReliableFields, SyncedEntity};
use crate::domain::state::{ColliderId, EntityCommand, EntityId, Pose};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hit {
    pub point: Vec3,
    pub normal: Vec3,
    pub distance: f32,
    pub collider: ColliderId,
}

/// Penetration of a query box into a collider. `direction * depth` is the
/// minimum translation that separates them.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Overlap {
    pub collider: ColliderId,
    pub direction: Vec3,
    pub depth: f32,
}

/// Downward scene queries used for ground placement.
pub trait CollisionQuery {
    /// All hits along a straight-down ray, in any order.
    fn cast_ray_down(&self, origin: Vec3, max_distance: f32) -> Vec<Hit>;

    /// All hits of a box swept straight down, in any order.
    fn cast_box_down(
        &self,
        origin: Vec3,
        half_extents: Vec3,
        orientation: Quat,
        max_distance: f32,
    ) -> Vec<Hit>;

    /// Colliders the box currently penetrates. Engines without overlap
    /// queries skip penetration correction.
    fn overlap_box(&self, _center: Vec3, _half_extents: Vec3, _orientation: Quat) -> Vec<Overlap> {
        Vec::new()
    }
}

/// Shared approximate time base, in seconds.
pub trait NetworkClock: Send + Sync {
    fn now(&self) -> f64;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ray {
    pub origin: Vec3,
    pub direction: Vec3,
}

impl Ray {
    pub fn point_at(&self, distance: f32) -> Vec3 {
        self.origin + self.direction * distance
    }
}

/// One frame of pointer state for the manipulating participant.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ManipulationFrame {
    pub pointer_ray: Ray,
    pub primary_pressed: bool,
    pub primary_released: bool,
    pub modifier_held: bool,
    pub scroll_delta: f32,
}

pub trait ManipulationInput {
    fn frame(&self) -> ManipulationFrame;
    fn resolve_target_under_pointer(&self) -> Option<EntityId>;
}

/// Authority-side outbound replication.
pub trait ReplicationChannel {
    /// Unreliable, unordered pose update. Loss is tolerated.
    fn push_frequent(&mut self, entity: EntityId, timestamp: f64, pose: Pose);
    /// Reliable ordered update of the discrete fields.
    fn push_reliable(&mut self, entity: EntityId, fields: ReliableFields);
    /// Reliable: observers clear their buffer and jump to `pose`.
    fn push_snap(&mut self, entity: EntityId, timestamp: f64, pose: Pose);
    /// Reliable: observers discard buffered snapshots.
    fn push_clear(&mut self, entity: EntityId);
    fn push_spawned(&mut self, entity: &SyncedEntity);
    fn push_despawned(&mut self, entity: EntityId);
    /// End of a tick; transports that batch frequent updates send them here.
    fn flush(&mut self, _tick: u64, _timestamp: f64) {}
}

/// Client-side outbound command path to the authority.
pub trait CommandTransport {
    fn send(&mut self, entity: EntityId, command: EntityCommand);
}
