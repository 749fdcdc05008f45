// Domain layer: synced token types, interpolation, ground placement and drag ownership.

pub mod entity;
pub mod errors;
pub mod ground;
pub mod ownership;
pub mod ports;
pub mod scene;
pub mod snapshot_buffer;
pub mod state;
pub mod tuning;

pub use entity::{FieldChanges, Footprint, ReliableFields, SyncedEntity, TokenShape};
pub use errors::SyncError;
pub use ground::{GroundPlacementContext, GroundResolver, PenetrationOutcome, Placement};
pub use ownership::{DragGrant, Ownership, OwnershipPolicy, OwnershipRules, OwnershipState};
pub use ports::{CollisionQuery, CommandTransport, NetworkClock, ReplicationChannel};
pub use scene::{StaticCollider, StaticScene};
pub use snapshot_buffer::SnapshotBuffer;
pub use state::{ColliderId, EntityCommand, EntityId, ParticipantId, Pose, Snapshot, SpawnRequest};
