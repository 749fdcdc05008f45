use std::cell::Cell;

use glam::Vec3;

use crate::domain::ports::{
    CommandTransport, ManipulationFrame, ManipulationInput, NetworkClock, Ray, ReplicationChannel,
};
use crate::domain::{EntityCommand, EntityId, Pose, ReliableFields, SyncedEntity};
use crate::use_cases::types::ReliableEvent;

// Shared fixed time source for deterministic use-case tests.
pub(crate) struct FixedClock(pub(crate) f64);

impl NetworkClock for FixedClock {
    fn now(&self) -> f64 {
        self.0
    }
}

/// Captures everything the authority pushes.
#[derive(Default)]
pub(crate) struct RecordingReplication {
    pub frequent: Vec<(EntityId, f64, Pose)>,
    pub reliable: Vec<ReliableEvent>,
    pub flushed_ticks: Vec<u64>,
}

impl RecordingReplication {
    pub(crate) fn last_frequent(&self, entity: EntityId) -> Option<Pose> {
        self.frequent
            .iter()
            .rev()
            .find(|(id, _, _)| *id == entity)
            .map(|(_, _, pose)| *pose)
    }

    pub(crate) fn take_reliable(&mut self) -> Vec<ReliableEvent> {
        std::mem::take(&mut self.reliable)
    }
}

impl ReplicationChannel for RecordingReplication {
    fn push_frequent(&mut self, entity: EntityId, timestamp: f64, pose: Pose) {
        self.frequent.push((entity, timestamp, pose));
    }

    fn push_reliable(&mut self, entity: EntityId, fields: ReliableFields) {
        self.reliable.push(ReliableEvent::FieldsChanged {
            entity_id: entity,
            fields,
        });
    }

    fn push_snap(&mut self, entity: EntityId, timestamp: f64, pose: Pose) {
        self.reliable.push(ReliableEvent::Snap {
            entity_id: entity,
            timestamp,
            pose,
        });
    }

    fn push_clear(&mut self, entity: EntityId) {
        self.reliable
            .push(ReliableEvent::ClearSnapshots { entity_id: entity });
    }

    fn push_spawned(&mut self, entity: &SyncedEntity) {
        self.reliable.push(ReliableEvent::Spawned { entity: *entity });
    }

    fn push_despawned(&mut self, entity: EntityId) {
        self.reliable
            .push(ReliableEvent::Despawned { entity_id: entity });
    }

    fn flush(&mut self, tick: u64, _timestamp: f64) {
        self.flushed_ticks.push(tick);
    }
}

impl CommandTransport for Vec<(EntityId, EntityCommand)> {
    fn send(&mut self, entity: EntityId, command: EntityCommand) {
        self.push((entity, command));
    }
}

/// Pointer that looks straight down from above the table.
pub(crate) struct ScriptedInput {
    pub frame: Cell<ManipulationFrame>,
    pub target: Cell<Option<EntityId>>,
}

impl ScriptedInput {
    pub(crate) fn new() -> Self {
        Self {
            frame: Cell::new(ManipulationFrame {
                pointer_ray: Ray {
                    origin: Vec3::new(0.0, 10.0, 0.0),
                    direction: Vec3::NEG_Y,
                },
                primary_pressed: false,
                primary_released: false,
                modifier_held: false,
                scroll_delta: 0.0,
            }),
            target: Cell::new(None),
        }
    }

    pub(crate) fn point_at(&self, x: f32, z: f32) {
        let mut frame = self.frame.get();
        frame.pointer_ray.origin = Vec3::new(x, 10.0, z);
        frame.primary_pressed = false;
        frame.primary_released = false;
        self.frame.set(frame);
    }

    pub(crate) fn press(&self, target: EntityId) {
        let mut frame = self.frame.get();
        frame.primary_pressed = true;
        self.frame.set(frame);
        self.target.set(Some(target));
    }

    pub(crate) fn release(&self) {
        let mut frame = self.frame.get();
        frame.primary_pressed = false;
        frame.primary_released = true;
        self.frame.set(frame);
    }

    pub(crate) fn scroll(&self, delta: f32, modifier_held: bool) {
        let mut frame = self.frame.get();
        frame.scroll_delta = delta;
        frame.modifier_held = modifier_held;
        self.frame.set(frame);
    }
}

impl ManipulationInput for ScriptedInput {
    fn frame(&self) -> ManipulationFrame {
        self.frame.get()
    }

    fn resolve_target_under_pointer(&self) -> Option<EntityId> {
        self.target.get()
    }
}
