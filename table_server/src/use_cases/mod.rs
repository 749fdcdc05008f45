// Use cases layer: application workflows for the table server.

pub mod authority;
pub mod drag;
pub mod observer;
pub mod registry;
pub mod replication;
pub mod table;
pub mod types;

#[cfg(test)]
pub(crate) mod test_support;

pub use authority::{AuthoritySettings, TableAuthority};
pub use drag::{DragController, DragStep};
pub use observer::{ObservedEntity, ReplicaHooks, ReplicaSettings, TableReplica};
pub use registry::{SharedCollision, TableError, TableHandle, TableRegistry, TableSettings};
pub use replication::BroadcastReplication;
pub use types::{PoseBatch, PoseSample, ReliableEvent, TableEvent, TableSnapshot};
