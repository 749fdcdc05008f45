// Authoritative table state: applies participant commands, runs ground
// placement for idle tokens and pushes replication each tick.

use std::collections::{BTreeMap, HashSet};

use glam::Quat;
use tracing::{debug, info, warn};

use super::types::{TableEvent, TableSnapshot};
use crate::domain::ground::PenetrationOutcome;
use crate::domain::tuning::{GroundTuning, SyncTuning, TokenTuning};
use crate::domain::{
    CollisionQuery, DragGrant, EntityCommand, EntityId, GroundPlacementContext, GroundResolver,
    Ownership, OwnershipRules, OwnershipState, ParticipantId, Pose, ReliableFields,
    ReplicationChannel, SpawnRequest, SyncError, SyncedEntity,
};

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AuthoritySettings {
    pub ownership: OwnershipRules,
    pub sync: SyncTuning,
    pub ground: GroundTuning,
    pub token: TokenTuning,
}

#[derive(Debug, Clone)]
struct AuthorityEntity {
    entity: SyncedEntity,
    ownership: Ownership,
    ground: GroundPlacementContext,
    // Last pose handed to the frequent channel.
    replicated_pose: Pose,
    replicated_fields: ReliableFields,
}

impl AuthorityEntity {
    fn new(entity: SyncedEntity) -> Self {
        Self {
            ground: GroundPlacementContext::new(entity.bottom_y()),
            replicated_pose: entity.pose(),
            replicated_fields: entity.reliable_fields(),
            ownership: Ownership::default(),
            entity,
        }
    }

    fn sync_ownership_fields(&mut self) {
        self.entity.dragging = self.ownership.is_dragging();
        self.entity.drag_owner = self.ownership.owner();
    }

    // Teleport-style placement: adopt verbatim and forget placement history.
    fn settle(&mut self, pose: Pose) {
        self.entity.set_pose(pose);
        self.replicated_pose = pose;
        self.ground.reset(self.entity.bottom_y());
    }

    fn refresh_replicated_pose(&mut self, sync: &SyncTuning) {
        let moved = self.entity.position.distance(self.replicated_pose.position) > sync.position_threshold;
        let turned = self
            .entity
            .rotation
            .angle_between(self.replicated_pose.rotation)
            .to_degrees()
            > sync.rotation_threshold_degrees;
        if moved || turned {
            self.replicated_pose = self.entity.pose();
        }
    }
}

pub struct TableAuthority {
    settings: AuthoritySettings,
    resolver: GroundResolver,
    entities: BTreeMap<EntityId, AuthorityEntity>,
    participants: HashSet<ParticipantId>,
    next_entity_id: u64,
    tick: u64,
}

impl TableAuthority {
    pub fn new(settings: AuthoritySettings) -> Self {
        Self {
            resolver: GroundResolver::new(settings.ground),
            settings,
            entities: BTreeMap::new(),
            participants: HashSet::new(),
            next_entity_id: 1,
            tick: 0,
        }
    }

    pub fn settings(&self) -> &AuthoritySettings {
        &self.settings
    }

    pub fn tick_count(&self) -> u64 {
        self.tick
    }

    pub fn entity(&self, entity_id: EntityId) -> Option<&SyncedEntity> {
        self.entities.get(&entity_id).map(|r| &r.entity)
    }

    pub fn ownership(&self, entity_id: EntityId) -> Option<OwnershipState> {
        self.entities.get(&entity_id).map(|r| r.ownership.state())
    }

    pub fn participant_count(&self) -> usize {
        self.participants.len()
    }

    /// Applies one inbound event. Rejected commands are logged and dropped.
    pub fn handle_event<R: ReplicationChannel + ?Sized>(
        &mut self,
        event: TableEvent,
        now: f64,
        replication: &mut R,
    ) {
        match event {
            TableEvent::Join { participant_id } => {
                info!(participant_id = participant_id.0, "participant joined");
                self.participants.insert(participant_id);
            }
            TableEvent::Leave { participant_id } => {
                info!(participant_id = participant_id.0, "participant left");
                self.participants.remove(&participant_id);
                self.release_drags_of(participant_id, now, replication);
            }
            TableEvent::Command {
                participant_id,
                entity_id,
                command,
            } => {
                if let Err(err) = self.apply_command(participant_id, entity_id, command, now, replication) {
                    warn!(
                        participant_id = participant_id.0,
                        entity_id = entity_id.0,
                        command = command.name(),
                        error = %err,
                        "command rejected"
                    );
                }
            }
            TableEvent::Spawn {
                participant_id,
                request,
            } => match self.spawn(request, replication) {
                Ok(entity_id) => {
                    info!(participant_id = participant_id.0, entity_id = entity_id.0, "entity spawned");
                }
                Err(err) => {
                    warn!(participant_id = participant_id.0, error = %err, "spawn rejected");
                }
            },
            TableEvent::Despawn {
                participant_id,
                entity_id,
            } => match self.despawn(entity_id, replication) {
                Ok(()) => {
                    info!(participant_id = participant_id.0, entity_id = entity_id.0, "entity despawned");
                }
                Err(err) => {
                    warn!(participant_id = participant_id.0, error = %err, "despawn rejected");
                }
            },
        }
    }

    pub fn spawn<R: ReplicationChannel + ?Sized>(
        &mut self,
        mut request: SpawnRequest,
        replication: &mut R,
    ) -> Result<EntityId, SyncError> {
        if !request.pose.position.is_finite() {
            return Err(SyncError::NonFinitePose);
        }
        request.pose.rotation = sanitize_rotation(request.pose.rotation)?;
        let half_extents = request.shape.half_extents;
        if !half_extents.is_finite() || half_extents.min_element() <= 0.0 {
            return Err(SyncError::InvalidShape);
        }

        let entity_id = EntityId(self.next_entity_id);
        self.next_entity_id += 1;

        let record = AuthorityEntity::new(SyncedEntity::spawn(entity_id, &request, &self.settings.token));
        replication.push_spawned(&record.entity);
        self.entities.insert(entity_id, record);
        Ok(entity_id)
    }

    pub fn despawn<R: ReplicationChannel + ?Sized>(
        &mut self,
        entity_id: EntityId,
        replication: &mut R,
    ) -> Result<(), SyncError> {
        self.entities
            .remove(&entity_id)
            .ok_or(SyncError::UnknownEntity(entity_id))?;
        replication.push_despawned(entity_id);
        Ok(())
    }

    pub fn apply_command<R: ReplicationChannel + ?Sized>(
        &mut self,
        participant_id: ParticipantId,
        entity_id: EntityId,
        command: EntityCommand,
        now: f64,
        replication: &mut R,
    ) -> Result<(), SyncError> {
        let rules = self.settings.ownership;
        let token = self.settings.token;
        let record = self
            .entities
            .get_mut(&entity_id)
            .ok_or(SyncError::UnknownEntity(entity_id))?;

        match command {
            EntityCommand::BeginDrag => {
                let grant = record
                    .ownership
                    .begin_drag(participant_id, record.entity.locked, &rules, now)?;
                record.sync_ownership_fields();
                replication.push_clear(entity_id);
                match grant {
                    DragGrant::TakenOver { previous } => info!(
                        participant_id = participant_id.0,
                        entity_id = entity_id.0,
                        previous_owner = previous.0,
                        "drag taken over"
                    ),
                    _ => debug!(participant_id = participant_id.0, entity_id = entity_id.0, "drag granted"),
                }
            }
            EntityCommand::EndDragFinal(pose) => {
                if !pose.position.is_finite() {
                    return Err(SyncError::NonFinitePose);
                }
                let rotation = sanitize_rotation(pose.rotation)?;
                record.ownership.end_drag(participant_id, &rules)?;
                record.sync_ownership_fields();
                let pose = Pose::new(pose.position, rotation);
                record.settle(pose);
                replication.push_snap(entity_id, now, pose);
            }
            EntityCommand::UpdatePosition(position) => {
                if !position.is_finite() {
                    return Err(SyncError::NonFinitePose);
                }
                record.ownership.authorize_update(participant_id, &rules, now)?;
                record.entity.position = position;
            }
            EntityCommand::UpdateRotation(rotation) => {
                let rotation = sanitize_rotation(rotation)?;
                record.ownership.authorize_update(participant_id, &rules, now)?;
                record.entity.rotation = rotation;
            }
            EntityCommand::MoveTo(position) => {
                if !position.is_finite() {
                    return Err(SyncError::NonFinitePose);
                }
                record.ownership.authorize_update(participant_id, &rules, now)?;
                let pose = Pose::new(position, record.entity.rotation);
                record.settle(pose);
                replication.push_snap(entity_id, now, pose);
            }
            EntityCommand::SetLocked(locked) => record.entity.locked = locked,
            EntityCommand::SetScale(scale) => record.entity.scale = token.clamp_scale(scale),
            EntityCommand::SetState(state) => record.entity.discrete_state = token.clamp_state(state),
        }
        Ok(())
    }

    /// One authority tick: drag timeouts, ground placement for tokens no
    /// one is dragging, then the frequent push for every entity and reliable
    /// pushes for changed fields.
    pub fn tick<Q, R>(&mut self, now: f64, dt: f32, collision: &Q, replication: &mut R)
    where
        Q: CollisionQuery + ?Sized,
        R: ReplicationChannel + ?Sized,
    {
        self.tick += 1;
        let rules = self.settings.ownership;
        let sync = self.settings.sync;
        let resolver = self.resolver;

        for (&entity_id, record) in self.entities.iter_mut() {
            if record.ownership.timed_out(&rules, now) {
                warn!(
                    entity_id = entity_id.0,
                    owner = ?record.ownership.owner().map(|p| p.0),
                    "drag timed out, forcing end"
                );
                force_end_drag(entity_id, record, now, replication);
            }

            if !record.ownership.is_dragging() {
                let footprint = record.entity.footprint();
                let placement = resolver.step(&mut record.ground, &footprint, collision, &[], dt);
                record.entity.set_bottom_y(placement.bottom_y);
                if placement.penetration == PenetrationOutcome::Unresolved {
                    debug!(entity_id = entity_id.0, "penetration unresolved, holding position");
                }
            }

            record.refresh_replicated_pose(&sync);
            replication.push_frequent(entity_id, now, record.replicated_pose);

            let fields = record.entity.reliable_fields();
            if fields != record.replicated_fields {
                record.replicated_fields = fields;
                replication.push_reliable(entity_id, fields);
            }
        }

        replication.flush(self.tick, now);
    }

    /// Full state with replicated poses, for joins and resyncs.
    pub fn snapshot(&self, now: f64) -> TableSnapshot {
        TableSnapshot {
            tick: self.tick,
            timestamp: now,
            entities: self
                .entities
                .values()
                .map(|record| {
                    let mut entity = record.entity;
                    entity.set_pose(record.replicated_pose);
                    entity
                })
                .collect(),
        }
    }

    fn release_drags_of<R: ReplicationChannel + ?Sized>(
        &mut self,
        participant_id: ParticipantId,
        now: f64,
        replication: &mut R,
    ) {
        for (&entity_id, record) in self.entities.iter_mut() {
            if record.ownership.is_owned_by(participant_id) {
                info!(
                    participant_id = participant_id.0,
                    entity_id = entity_id.0,
                    "owner left mid-drag, forcing end"
                );
                force_end_drag(entity_id, record, now, replication);
            }
        }
    }
}

// Ends a drag on the owner's behalf using the last known pose.
fn force_end_drag<R: ReplicationChannel + ?Sized>(
    entity_id: EntityId,
    record: &mut AuthorityEntity,
    now: f64,
    replication: &mut R,
) {
    record.ownership.force_release();
    record.sync_ownership_fields();
    let pose = record.entity.pose();
    record.settle(pose);
    replication.push_snap(entity_id, now, pose);
}

fn sanitize_rotation(rotation: Quat) -> Result<Quat, SyncError> {
    let length_squared = rotation.length_squared();
    if !rotation.is_finite() || length_squared < 1e-12 {
        return Err(SyncError::NonFinitePose);
    }
    // Unit input is kept bit-for-bit.
    if (length_squared - 1.0).abs() > 1e-6 {
        return Ok(rotation.normalize());
    }
    Ok(rotation)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::StaticScene;
    use crate::domain::ownership::OwnershipPolicy;
    use crate::use_cases::test_support::RecordingReplication;
    use crate::use_cases::types::ReliableEvent;
    use glam::Vec3;

    const DT: f32 = 0.02;
    const ALICE: ParticipantId = ParticipantId(1);
    const BOB: ParticipantId = ParticipantId(2);

    fn setup(settings: AuthoritySettings) -> (TableAuthority, StaticScene, RecordingReplication, EntityId) {
        let mut authority = TableAuthority::new(settings);
        let mut replication = RecordingReplication::default();
        let entity_id = authority
            .spawn(SpawnRequest::at(Vec3::ZERO), &mut replication)
            .expect("spawn succeeds");
        replication.take_reliable();
        (authority, StaticScene::flat_floor(50.0), replication, entity_id)
    }

    fn command(
        authority: &mut TableAuthority,
        replication: &mut RecordingReplication,
        participant_id: ParticipantId,
        entity_id: EntityId,
        command: EntityCommand,
    ) {
        authority.handle_event(
            TableEvent::Command {
                participant_id,
                entity_id,
                command,
            },
            0.0,
            replication,
        );
    }

    #[test]
    fn spawn_announces_entity_and_allocates_ids() {
        let mut authority = TableAuthority::new(AuthoritySettings::default());
        let mut replication = RecordingReplication::default();

        let first = authority.spawn(SpawnRequest::at(Vec3::ZERO), &mut replication).unwrap();
        let second = authority.spawn(SpawnRequest::at(Vec3::X), &mut replication).unwrap();

        assert_ne!(first, second);
        assert!(matches!(
            replication.reliable[0],
            ReliableEvent::Spawned { entity } if entity.id == first
        ));
        assert_eq!(authority.entity(first).map(|e| e.scale), Some(0.8));
    }

    #[test]
    fn spawn_rejects_degenerate_shape() {
        let mut authority = TableAuthority::new(AuthoritySettings::default());
        let mut replication = RecordingReplication::default();
        let mut request = SpawnRequest::at(Vec3::ZERO);
        request.shape.half_extents = Vec3::new(0.5, 0.0, 0.5);

        assert_eq!(authority.spawn(request, &mut replication), Err(SyncError::InvalidShape));
        assert!(replication.reliable.is_empty());
    }

    #[test]
    fn idle_entity_settles_onto_floor() {
        let (mut authority, scene, mut replication, _) = setup(AuthoritySettings::default());
        let floating = authority
            .spawn(SpawnRequest::at(Vec3::new(2.0, 1.5, 0.0)), &mut replication)
            .unwrap();

        authority.tick(0.02, DT, &scene, &mut replication);

        let pose = replication.last_frequent(floating).expect("pushed every tick");
        assert_eq!(pose.position, Vec3::new(2.0, 0.0, 0.0));
        assert_eq!(replication.flushed_ticks, vec![1]);
    }

    #[test]
    fn begin_drag_clears_observers_and_marks_owner() {
        let (mut authority, scene, mut replication, entity_id) = setup(AuthoritySettings::default());

        command(&mut authority, &mut replication, ALICE, entity_id, EntityCommand::BeginDrag);
        authority.tick(0.02, DT, &scene, &mut replication);

        let events = replication.take_reliable();
        assert_eq!(events[0], ReliableEvent::ClearSnapshots { entity_id });
        assert!(matches!(
            events[1],
            ReliableEvent::FieldsChanged { fields, .. } if fields.dragging && fields.drag_owner == Some(ALICE)
        ));
        assert_eq!(
            authority.ownership(entity_id),
            Some(OwnershipState::Dragging { owner: ALICE })
        );
    }

    #[test]
    fn end_drag_adopts_pose_and_snaps_observers() {
        let (mut authority, _scene, mut replication, entity_id) = setup(AuthoritySettings::default());
        let final_pose = Pose::new(Vec3::new(3.0, 0.0, -1.0), Quat::from_rotation_y(0.5));

        command(&mut authority, &mut replication, ALICE, entity_id, EntityCommand::BeginDrag);
        command(
            &mut authority,
            &mut replication,
            ALICE,
            entity_id,
            EntityCommand::EndDragFinal(final_pose),
        );

        let events = replication.take_reliable();
        assert_eq!(
            events.last(),
            Some(&ReliableEvent::Snap {
                entity_id,
                timestamp: 0.0,
                pose: final_pose
            })
        );
        let entity = authority.entity(entity_id).unwrap();
        assert_eq!(entity.pose(), final_pose);
        assert!(!entity.dragging);
        assert_eq!(entity.drag_owner, None);
    }

    #[test]
    fn permissive_policy_lets_both_concurrent_drags_through() {
        let (mut authority, _scene, mut replication, entity_id) = setup(AuthoritySettings::default());

        command(&mut authority, &mut replication, ALICE, entity_id, EntityCommand::BeginDrag);
        command(&mut authority, &mut replication, BOB, entity_id, EntityCommand::BeginDrag);

        assert_eq!(
            authority.ownership(entity_id),
            Some(OwnershipState::Dragging { owner: BOB })
        );
    }

    #[test]
    fn exclusive_policy_keeps_the_first_owner() {
        let settings = AuthoritySettings {
            ownership: OwnershipRules {
                policy: OwnershipPolicy::Exclusive,
                ..OwnershipRules::default()
            },
            ..AuthoritySettings::default()
        };
        let (mut authority, _scene, mut replication, entity_id) = setup(settings);

        command(&mut authority, &mut replication, ALICE, entity_id, EntityCommand::BeginDrag);
        let denied = authority.apply_command(BOB, entity_id, EntityCommand::BeginDrag, 0.0, &mut replication);
        let moved = authority.apply_command(
            BOB,
            entity_id,
            EntityCommand::UpdatePosition(Vec3::X),
            0.0,
            &mut replication,
        );

        assert_eq!(denied, Err(SyncError::DragDenied { holder: ALICE }));
        assert_eq!(moved, Err(SyncError::NotDragOwner { owner: ALICE }));
        assert_eq!(authority.entity(entity_id).unwrap().position, Vec3::ZERO);
    }

    #[test]
    fn owner_leaving_forces_end_with_last_pose() {
        let (mut authority, _scene, mut replication, entity_id) = setup(AuthoritySettings::default());
        let last = Vec3::new(1.0, 0.0, 1.0);

        command(&mut authority, &mut replication, ALICE, entity_id, EntityCommand::BeginDrag);
        command(&mut authority, &mut replication, ALICE, entity_id, EntityCommand::UpdatePosition(last));
        replication.take_reliable();
        authority.handle_event(TableEvent::Leave { participant_id: ALICE }, 0.5, &mut replication);

        assert_eq!(authority.ownership(entity_id), Some(OwnershipState::Idle));
        assert!(matches!(
            replication.reliable.as_slice(),
            [ReliableEvent::Snap { pose, .. }] if pose.position == last
        ));
    }

    #[test]
    fn silent_drag_times_out() {
        let settings = AuthoritySettings {
            ownership: OwnershipRules {
                drag_timeout: Some(1.0),
                ..OwnershipRules::default()
            },
            ..AuthoritySettings::default()
        };
        let (mut authority, scene, mut replication, entity_id) = setup(settings);

        command(&mut authority, &mut replication, ALICE, entity_id, EntityCommand::BeginDrag);
        authority.tick(0.5, DT, &scene, &mut replication);
        assert!(authority.entity(entity_id).unwrap().dragging);

        authority.tick(1.2, DT, &scene, &mut replication);
        assert!(!authority.entity(entity_id).unwrap().dragging);
    }

    #[test]
    fn dragged_entity_skips_ground_placement() {
        let (mut authority, scene, mut replication, entity_id) = setup(AuthoritySettings::default());
        let lifted = Vec3::new(0.0, 1.0, 0.0);

        command(&mut authority, &mut replication, ALICE, entity_id, EntityCommand::BeginDrag);
        command(&mut authority, &mut replication, ALICE, entity_id, EntityCommand::UpdatePosition(lifted));
        authority.tick(0.02, DT, &scene, &mut replication);

        assert_eq!(authority.entity(entity_id).unwrap().position, lifted);
    }

    #[test]
    fn small_moves_do_not_refresh_replicated_pose() {
        let (mut authority, scene, mut replication, entity_id) = setup(AuthoritySettings::default());
        command(&mut authority, &mut replication, ALICE, entity_id, EntityCommand::BeginDrag);

        command(
            &mut authority,
            &mut replication,
            ALICE,
            entity_id,
            EntityCommand::UpdatePosition(Vec3::new(0.005, 0.0, 0.0)),
        );
        authority.tick(0.02, DT, &scene, &mut replication);
        assert_eq!(replication.last_frequent(entity_id).unwrap().position, Vec3::ZERO);

        command(
            &mut authority,
            &mut replication,
            ALICE,
            entity_id,
            EntityCommand::UpdatePosition(Vec3::new(0.05, 0.0, 0.0)),
        );
        authority.tick(0.04, DT, &scene, &mut replication);
        assert_eq!(
            replication.last_frequent(entity_id).unwrap().position,
            Vec3::new(0.05, 0.0, 0.0)
        );
    }

    #[test]
    fn discrete_fields_replicate_once_per_change() {
        let (mut authority, scene, mut replication, entity_id) = setup(AuthoritySettings::default());

        command(&mut authority, &mut replication, ALICE, entity_id, EntityCommand::SetScale(9.0));
        command(&mut authority, &mut replication, ALICE, entity_id, EntityCommand::SetLocked(true));
        authority.tick(0.02, DT, &scene, &mut replication);
        authority.tick(0.04, DT, &scene, &mut replication);

        let events = replication.take_reliable();
        assert_eq!(events.len(), 1);
        assert!(matches!(
            events[0],
            ReliableEvent::FieldsChanged { fields, .. } if fields.scale == 4.0 && fields.locked
        ));
    }

    #[test]
    fn unknown_entity_is_rejected() {
        let mut authority = TableAuthority::new(AuthoritySettings::default());
        let mut replication = RecordingReplication::default();

        let result = authority.apply_command(
            ALICE,
            EntityId(99),
            EntityCommand::BeginDrag,
            0.0,
            &mut replication,
        );

        assert_eq!(result, Err(SyncError::UnknownEntity(EntityId(99))));
        assert!(replication.reliable.is_empty());
    }

    #[test]
    fn move_to_snaps_observers() {
        let (mut authority, _scene, mut replication, entity_id) = setup(AuthoritySettings::default());
        let target = Vec3::new(4.0, 0.0, 4.0);

        command(&mut authority, &mut replication, ALICE, entity_id, EntityCommand::MoveTo(target));

        assert!(matches!(
            replication.reliable.as_slice(),
            [ReliableEvent::Snap { pose, .. }] if pose.position == target
        ));
    }

    #[test]
    fn despawn_announces_removal() {
        let (mut authority, _scene, mut replication, entity_id) = setup(AuthoritySettings::default());

        authority.handle_event(
            TableEvent::Despawn {
                participant_id: ALICE,
                entity_id,
            },
            0.0,
            &mut replication,
        );

        assert_eq!(authority.entity(entity_id), None);
        assert_eq!(replication.reliable, vec![ReliableEvent::Despawned { entity_id }]);
    }
}
