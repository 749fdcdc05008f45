// Participant-side view of a table. Entities this participant is not driving
// are rendered from their snapshot buffers; discrete fields apply on arrival.

use std::collections::BTreeMap;

use glam::{Quat, Vec3};
use tracing::{debug, warn};

use super::types::{PoseBatch, ReliableEvent, TableSnapshot};
use crate::domain::tuning::{GroundTuning, InterpolationTuning};
use crate::domain::{
    CollisionQuery, CommandTransport, EntityCommand, EntityId, FieldChanges, GroundPlacementContext,
    GroundResolver, ParticipantId, Pose, SnapshotBuffer, SyncError, SyncedEntity,
};

/// Presentation callbacks raised while applying replicated state.
pub trait ReplicaHooks {
    fn on_fields_changed(&mut self, _entity: &SyncedEntity, _changes: FieldChanges) {}
    fn on_spawned(&mut self, _entity: &SyncedEntity) {}
    fn on_despawned(&mut self, _entity_id: EntityId) {}
}

impl ReplicaHooks for () {}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ReplicaSettings {
    pub interpolation: InterpolationTuning,
    pub ground: GroundTuning,
}

#[derive(Debug, Clone)]
pub struct ObservedEntity {
    entity: SyncedEntity,
    buffer: SnapshotBuffer,
    ground: GroundPlacementContext,
    render_pose: Pose,
    local_drag: bool,
}

impl ObservedEntity {
    fn new(entity: SyncedEntity, tuning: InterpolationTuning, timestamp: f64) -> Self {
        let mut buffer = SnapshotBuffer::new(tuning);
        buffer.snap_to(entity.pose(), timestamp);
        Self {
            ground: GroundPlacementContext::new(entity.bottom_y()),
            render_pose: entity.pose(),
            local_drag: false,
            buffer,
            entity,
        }
    }

    pub fn entity(&self) -> &SyncedEntity {
        &self.entity
    }

    pub fn buffer(&self) -> &SnapshotBuffer {
        &self.buffer
    }

    pub fn render_pose(&self) -> Pose {
        self.render_pose
    }

    fn snap(&mut self, pose: Pose, timestamp: f64) {
        self.entity.set_pose(pose);
        self.buffer.snap_to(pose, timestamp);
        self.render_pose = pose;
        self.ground.reset(self.entity.bottom_y());
    }
}

fn driven_by(observed: &ObservedEntity, local: ParticipantId) -> bool {
    observed.local_drag || (observed.entity.dragging && observed.entity.drag_owner == Some(local))
}

pub struct TableReplica {
    local: ParticipantId,
    settings: ReplicaSettings,
    resolver: GroundResolver,
    entities: BTreeMap<EntityId, ObservedEntity>,
}

impl TableReplica {
    pub fn new(local: ParticipantId, settings: ReplicaSettings) -> Self {
        Self {
            local,
            resolver: GroundResolver::new(settings.ground),
            settings,
            entities: BTreeMap::new(),
        }
    }

    pub fn local_participant(&self) -> ParticipantId {
        self.local
    }

    pub fn entity(&self, entity_id: EntityId) -> Option<&ObservedEntity> {
        self.entities.get(&entity_id)
    }

    pub fn render_pose(&self, entity_id: EntityId) -> Option<Pose> {
        self.entities.get(&entity_id).map(|e| e.render_pose)
    }

    pub fn entity_ids(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.entities.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// True while this participant drives the entity: either a local drag
    /// is in progress or the authority names us as drag owner.
    pub fn is_locally_driven(&self, entity_id: EntityId) -> bool {
        self.entities
            .get(&entity_id)
            .is_some_and(|e| driven_by(e, self.local))
    }

    /// Full-state sync: adds, updates and drops entities to match `state`.
    pub fn apply_table_state<H: ReplicaHooks + ?Sized>(
        &mut self,
        state: &TableSnapshot,
        now: f64,
        hooks: &mut H,
    ) {
        let tuning = self.settings.interpolation;
        let local = self.local;

        self.entities.retain(|id, _| {
            let keep = state.entities.iter().any(|e| e.id == *id);
            if !keep {
                hooks.on_despawned(*id);
            }
            keep
        });

        for incoming in &state.entities {
            match self.entities.get_mut(&incoming.id) {
                Some(observed) => {
                    let changes = observed.entity.apply_reliable(incoming.reliable_fields());
                    if changes.any() {
                        hooks.on_fields_changed(&observed.entity, changes);
                    }
                    if !driven_by(observed, local) {
                        observed.buffer.push(state.timestamp, incoming.pose(), now);
                    }
                }
                None => {
                    let observed = ObservedEntity::new(*incoming, tuning, state.timestamp);
                    hooks.on_spawned(&observed.entity);
                    self.entities.insert(incoming.id, observed);
                }
            }
        }
    }

    /// Frequent channel. Samples for entities we drive or do not know yet
    /// are ignored.
    pub fn apply_pose_batch(&mut self, batch: &PoseBatch, now: f64) {
        let local = self.local;
        for sample in &batch.poses {
            let Some(observed) = self.entities.get_mut(&sample.entity_id) else {
                debug!(entity_id = sample.entity_id.0, "pose for unknown entity skipped");
                continue;
            };
            if driven_by(observed, local) {
                continue;
            }
            observed.buffer.push(batch.timestamp, sample.pose, now);
        }
    }

    pub fn apply_reliable<H: ReplicaHooks + ?Sized>(&mut self, event: &ReliableEvent, now: f64, hooks: &mut H) {
        match event {
            ReliableEvent::FieldsChanged { entity_id, fields } => {
                let Some(observed) = self.entities.get_mut(entity_id) else {
                    debug!(entity_id = entity_id.0, "fields for unknown entity skipped");
                    return;
                };
                let changes = observed.entity.apply_reliable(*fields);
                // Someone else took the drag over from us.
                if observed.local_drag && fields.dragging && fields.drag_owner != Some(self.local) {
                    observed.local_drag = false;
                    observed.buffer.clear();
                }
                if changes.any() {
                    hooks.on_fields_changed(&observed.entity, changes);
                }
            }
            ReliableEvent::Snap {
                entity_id,
                timestamp,
                pose,
            } => {
                if let Some(observed) = self.entities.get_mut(entity_id) {
                    observed.local_drag = false;
                    observed.snap(*pose, *timestamp);
                }
            }
            ReliableEvent::ClearSnapshots { entity_id } => {
                if let Some(observed) = self.entities.get_mut(entity_id) {
                    observed.buffer.clear();
                }
            }
            ReliableEvent::Spawned { entity } => {
                let observed = ObservedEntity::new(*entity, self.settings.interpolation, now);
                hooks.on_spawned(&observed.entity);
                self.entities.insert(entity.id, observed);
            }
            ReliableEvent::Despawned { entity_id } => {
                if self.entities.remove(entity_id).is_some() {
                    hooks.on_despawned(*entity_id);
                }
            }
        }
    }

    /// Samples every buffer we do not drive. An empty buffer keeps the
    /// last rendered pose.
    pub fn update(&mut self, now: f64) {
        let local = self.local;
        for observed in self.entities.values_mut() {
            if driven_by(observed, local) {
                continue;
            }
            if let Some(pose) = observed.buffer.sample_at(now) {
                observed.render_pose = pose;
            }
        }
    }

    /// `update` followed by local ground placement of the rendered poses.
    pub fn update_with_ground<Q: CollisionQuery + ?Sized>(&mut self, now: f64, dt: f32, collision: &Q) {
        self.update(now);

        let local = self.local;
        let resolver = self.resolver;
        for observed in self.entities.values_mut() {
            if driven_by(observed, local) {
                continue;
            }
            let mut shown = observed.entity;
            shown.set_pose(observed.render_pose);
            let placement = resolver.step(&mut observed.ground, &shown.footprint(), collision, &[], dt);
            shown.set_bottom_y(placement.bottom_y);
            observed.render_pose = shown.pose();
        }
    }

    /// Marks the entity as driven locally. Acquiring drops buffered history.
    pub fn set_local_drag(&mut self, entity_id: EntityId, active: bool) -> Result<(), SyncError> {
        let observed = self.known_mut(entity_id)?;
        if active && !observed.local_drag {
            observed.buffer.clear();
        }
        observed.local_drag = active;
        Ok(())
    }

    /// Writes the locally computed pose of an entity we drive.
    pub fn drive_local(&mut self, entity_id: EntityId, pose: Pose) -> Result<(), SyncError> {
        let local = self.local;
        let observed = self.known_mut(entity_id)?;
        if !driven_by(observed, local) {
            return Err(SyncError::NotDragOwner {
                owner: observed.entity.drag_owner.unwrap_or(local),
            });
        }
        observed.entity.set_pose(pose);
        observed.render_pose = pose;
        Ok(())
    }

    pub fn request_begin_drag<T: CommandTransport + ?Sized>(
        &mut self,
        entity_id: EntityId,
        transport: &mut T,
    ) -> Result<(), SyncError> {
        self.set_local_drag(entity_id, true)?;
        transport.send(entity_id, EntityCommand::BeginDrag);
        Ok(())
    }

    /// Sends the final pose and releases local control. The authority's
    /// snap finishes the handoff.
    pub fn request_end_drag<T: CommandTransport + ?Sized>(
        &mut self,
        entity_id: EntityId,
        pose: Pose,
        transport: &mut T,
    ) -> Result<(), SyncError> {
        let observed = self.known_mut(entity_id)?;
        observed.local_drag = false;
        observed.entity.set_pose(pose);
        observed.render_pose = pose;
        transport.send(entity_id, EntityCommand::EndDragFinal(pose));
        Ok(())
    }

    pub fn request_move<T: CommandTransport + ?Sized>(
        &mut self,
        entity_id: EntityId,
        position: Vec3,
        transport: &mut T,
    ) -> Result<(), SyncError> {
        self.send_known(entity_id, EntityCommand::UpdatePosition(position), transport)
    }

    pub fn request_rotate<T: CommandTransport + ?Sized>(
        &mut self,
        entity_id: EntityId,
        rotation: Quat,
        transport: &mut T,
    ) -> Result<(), SyncError> {
        self.send_known(entity_id, EntityCommand::UpdateRotation(rotation), transport)
    }

    pub fn request_place<T: CommandTransport + ?Sized>(
        &mut self,
        entity_id: EntityId,
        position: Vec3,
        transport: &mut T,
    ) -> Result<(), SyncError> {
        self.send_known(entity_id, EntityCommand::MoveTo(position), transport)
    }

    pub fn request_set_locked<T: CommandTransport + ?Sized>(
        &mut self,
        entity_id: EntityId,
        locked: bool,
        transport: &mut T,
    ) -> Result<(), SyncError> {
        self.send_known(entity_id, EntityCommand::SetLocked(locked), transport)
    }

    pub fn request_set_scale<T: CommandTransport + ?Sized>(
        &mut self,
        entity_id: EntityId,
        scale: f32,
        transport: &mut T,
    ) -> Result<(), SyncError> {
        self.send_known(entity_id, EntityCommand::SetScale(scale), transport)
    }

    pub fn request_set_state<T: CommandTransport + ?Sized>(
        &mut self,
        entity_id: EntityId,
        state: i32,
        transport: &mut T,
    ) -> Result<(), SyncError> {
        self.send_known(entity_id, EntityCommand::SetState(state), transport)
    }

    fn send_known<T: CommandTransport + ?Sized>(
        &mut self,
        entity_id: EntityId,
        command: EntityCommand,
        transport: &mut T,
    ) -> Result<(), SyncError> {
        self.known_mut(entity_id)?;
        transport.send(entity_id, command);
        Ok(())
    }

    fn known_mut(&mut self, entity_id: EntityId) -> Result<&mut ObservedEntity, SyncError> {
        match self.entities.get_mut(&entity_id) {
            Some(observed) => Ok(observed),
            None => {
                warn!(entity_id = entity_id.0, "command for unreplicated entity dropped");
                Err(SyncError::UnknownEntity(entity_id))
            }
        }
    }
}
