// ReplicationChannel backed by tokio broadcast channels. Frequent poses are
// batched per tick; reliable events go out as they happen.

use tokio::sync::broadcast;

use super::types::{PoseBatch, PoseSample, ReliableEvent};
use crate::domain::{EntityId, Pose, ReliableFields, ReplicationChannel, SyncedEntity};

pub struct BroadcastReplication {
    pose_tx: broadcast::Sender<PoseBatch>,
    reliable_tx: broadcast::Sender<ReliableEvent>,
    pending: Vec<PoseSample>,
}

impl BroadcastReplication {
    pub fn new(
        pose_tx: broadcast::Sender<PoseBatch>,
        reliable_tx: broadcast::Sender<ReliableEvent>,
    ) -> Self {
        Self {
            pose_tx,
            reliable_tx,
            pending: Vec::new(),
        }
    }

    fn send_reliable(&self, event: ReliableEvent) {
        // No subscribers is fine; late joiners get a full table state.
        let _ = self.reliable_tx.send(event);
    }
}

impl ReplicationChannel for BroadcastReplication {
    fn push_frequent(&mut self, entity: EntityId, _timestamp: f64, pose: Pose) {
        self.pending.push(PoseSample {
            entity_id: entity,
            pose,
        });
    }

    fn push_reliable(&mut self, entity: EntityId, fields: ReliableFields) {
        self.send_reliable(ReliableEvent::FieldsChanged {
            entity_id: entity,
            fields,
        });
    }

    fn push_snap(&mut self, entity: EntityId, timestamp: f64, pose: Pose) {
        self.send_reliable(ReliableEvent::Snap {
            entity_id: entity,
            timestamp,
            pose,
        });
    }

    fn push_clear(&mut self, entity: EntityId) {
        self.send_reliable(ReliableEvent::ClearSnapshots { entity_id: entity });
    }

    fn push_spawned(&mut self, entity: &SyncedEntity) {
        self.send_reliable(ReliableEvent::Spawned { entity: *entity });
    }

    fn push_despawned(&mut self, entity: EntityId) {
        self.send_reliable(ReliableEvent::Despawned { entity_id: entity });
    }

    fn flush(&mut self, tick: u64, timestamp: f64) {
        if self.pending.is_empty() {
            return;
        }
        let _ = self.pose_tx.send(PoseBatch {
            tick,
            timestamp,
            poses: std::mem::take(&mut self.pending),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    #[tokio::test]
    async fn flush_sends_one_batch_per_tick() {
        let (pose_tx, mut pose_rx) = broadcast::channel(8);
        let (reliable_tx, _reliable_rx) = broadcast::channel(8);
        let mut replication = BroadcastReplication::new(pose_tx, reliable_tx);

        replication.push_frequent(EntityId(1), 0.5, Pose::at(Vec3::X));
        replication.push_frequent(EntityId(2), 0.5, Pose::at(Vec3::Z));
        replication.flush(3, 0.5);
        replication.flush(4, 0.52);

        let batch = pose_rx.recv().await.expect("batch sent");
        assert_eq!(batch.tick, 3);
        assert_eq!(batch.poses.len(), 2);
        assert!(pose_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn reliable_events_are_sent_immediately() {
        let (pose_tx, _pose_rx) = broadcast::channel(8);
        let (reliable_tx, mut reliable_rx) = broadcast::channel(8);
        let mut replication = BroadcastReplication::new(pose_tx, reliable_tx);

        replication.push_clear(EntityId(7));

        assert_eq!(
            reliable_rx.recv().await.ok(),
            Some(ReliableEvent::ClearSnapshots { entity_id: EntityId(7) })
        );
    }
}
