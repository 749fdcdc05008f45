// Local manipulation for the participant holding a drag: pointer projection,
// speed clamp, scroll rotation, ground placement and throttled updates.

use glam::{Quat, Vec2, Vec3};
use tracing::debug;

use super::observer::TableReplica;
use crate::domain::ports::{ManipulationFrame, ManipulationInput, Ray};
use crate::domain::tuning::{DragTuning, GroundTuning};
use crate::domain::{
    CollisionQuery, CommandTransport, EntityId, GroundPlacementContext, GroundResolver, Pose, SyncError,
    SyncedEntity,
};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DragStep {
    Idle,
    Started(EntityId),
    Moved { entity_id: EntityId, pose: Pose },
    Finished { entity_id: EntityId, pose: Pose },
    /// Another participant took the entity over, or it was despawned.
    Lost(EntityId),
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct DragPlane {
    point: Vec3,
    normal: Vec3,
}

impl DragPlane {
    fn horizontal(point: Vec3) -> Self {
        Self {
            point,
            normal: Vec3::Y,
        }
    }

    fn intersect(&self, ray: &Ray, max_distance: f32) -> Option<Vec3> {
        let denom = self.normal.dot(ray.direction);
        if denom.abs() < 1e-6 {
            return None;
        }
        let distance = (self.point - ray.origin).dot(self.normal) / denom;
        (0.0..=max_distance)
            .contains(&distance)
            .then(|| ray.point_at(distance))
    }
}

#[derive(Debug, Clone)]
struct ActiveDrag {
    entity_id: EntityId,
    plane: DragPlane,
    grab_offset: Vec3,
    pose: Pose,
    ground: GroundPlacementContext,
    last_sent: Option<f64>,
}

pub struct DragController {
    tuning: DragTuning,
    resolver: GroundResolver,
    active: Option<ActiveDrag>,
}

impl DragController {
    pub fn new(tuning: DragTuning, ground: GroundTuning) -> Self {
        Self {
            tuning,
            resolver: GroundResolver::new(ground),
            active: None,
        }
    }

    pub fn active_entity(&self) -> Option<EntityId> {
        self.active.as_ref().map(|d| d.entity_id)
    }

    /// Runs one frame of the gesture.
    pub fn update<I, Q, T>(
        &mut self,
        input: &I,
        replica: &mut TableReplica,
        collision: &Q,
        transport: &mut T,
        now: f64,
        dt: f32,
    ) -> DragStep
    where
        I: ManipulationInput + ?Sized,
        Q: CollisionQuery + ?Sized,
        T: CommandTransport + ?Sized,
    {
        let frame = input.frame();

        let Some(mut drag) = self.active.take() else {
            if !frame.primary_pressed {
                return DragStep::Idle;
            }
            let Some(entity_id) = input.resolve_target_under_pointer() else {
                return DragStep::Idle;
            };
            return match self.begin(entity_id, &frame, replica, collision, transport) {
                Some(drag) => {
                    self.active = Some(drag);
                    DragStep::Started(entity_id)
                }
                None => DragStep::Idle,
            };
        };

        let entity_id = drag.entity_id;
        let Some(entity) = replica.entity(entity_id).map(|o| *o.entity()) else {
            return DragStep::Lost(entity_id);
        };
        if !replica.is_locally_driven(entity_id) {
            debug!(entity_id = entity_id.0, "local drag lost");
            return DragStep::Lost(entity_id);
        }

        if frame.primary_released {
            let pose = drag.pose;
            if replica.request_end_drag(entity_id, pose, transport).is_err() {
                return DragStep::Lost(entity_id);
            }
            return DragStep::Finished { entity_id, pose };
        }

        self.advance(&mut drag, &entity, &frame, collision, dt);
        let pose = drag.pose;
        if let Err(e) = self.publish(&mut drag, replica, transport, now) {
            debug!(entity_id = entity_id.0, error = %e, "local drag ended");
            return DragStep::Lost(entity_id);
        }

        self.active = Some(drag);
        DragStep::Moved { entity_id, pose }
    }

    /// Drives the local replica and sends the pose once per send interval.
    fn publish<T: CommandTransport + ?Sized>(
        &self,
        drag: &mut ActiveDrag,
        replica: &mut TableReplica,
        transport: &mut T,
        now: f64,
    ) -> Result<(), SyncError> {
        let pose = drag.pose;
        replica.drive_local(drag.entity_id, pose)?;

        if drag
            .last_sent
            .is_none_or(|sent| now - sent >= self.tuning.send_interval)
        {
            replica.request_move(drag.entity_id, pose.position, transport)?;
            replica.request_rotate(drag.entity_id, pose.rotation, transport)?;
            drag.last_sent = Some(now);
        }
        Ok(())
    }

    fn begin<Q, T>(
        &self,
        entity_id: EntityId,
        frame: &ManipulationFrame,
        replica: &mut TableReplica,
        collision: &Q,
        transport: &mut T,
    ) -> Option<ActiveDrag>
    where
        Q: CollisionQuery + ?Sized,
        T: CommandTransport + ?Sized,
    {
        let observed = replica.entity(entity_id)?;
        let pose = observed.render_pose();
        let bottom_y = observed.entity().bottom_y();

        // Plane through the support under the grab point.
        let max_distance = self.tuning.max_pointer_distance;
        let grab = DragPlane::horizontal(Vec3::new(pose.position.x, bottom_y, pose.position.z))
            .intersect(&frame.pointer_ray, max_distance)
            .unwrap_or(pose.position);
        let ground = self.resolver.tuning();
        let ray_origin = Vec3::new(grab.x, bottom_y + ground.ray_start_height, grab.z);
        let plane = match self.resolver.cast_down(
            ray_origin,
            ground.ray_start_height + ground.search_down,
            collision,
            &[],
        ) {
            Some(hit) => DragPlane {
                point: hit.point,
                normal: hit.normal.normalize_or(Vec3::Y),
            },
            None => DragPlane::horizontal(pose.position),
        };
        let grab_point = plane
            .intersect(&frame.pointer_ray, max_distance)
            .unwrap_or(grab);

        replica.request_begin_drag(entity_id, transport).ok()?;

        Some(ActiveDrag {
            entity_id,
            plane,
            grab_offset: pose.position - grab_point,
            pose,
            ground: GroundPlacementContext::new(bottom_y),
            last_sent: None,
        })
    }

    fn advance<Q: CollisionQuery + ?Sized>(
        &self,
        drag: &mut ActiveDrag,
        entity: &SyncedEntity,
        frame: &ManipulationFrame,
        collision: &Q,
        dt: f32,
    ) {
        let max_distance = self.tuning.max_pointer_distance;
        let target = drag
            .plane
            .intersect(&frame.pointer_ray, max_distance)
            .or_else(|| DragPlane::horizontal(drag.pose.position).intersect(&frame.pointer_ray, max_distance));

        if let Some(point) = target {
            let desired = point + drag.grab_offset;
            let delta = Vec2::new(desired.x - drag.pose.position.x, desired.z - drag.pose.position.z)
                .clamp_length_max(self.tuning.max_horizontal_speed * dt.max(0.0));
            drag.pose.position.x += delta.x;
            drag.pose.position.z += delta.y;
        }

        if frame.modifier_held && frame.scroll_delta.abs() > self.tuning.scroll_dead_zone {
            let degrees = frame.scroll_delta * self.tuning.rotation_speed * dt;
            drag.pose.rotation = (Quat::from_rotation_y(degrees.to_radians()) * drag.pose.rotation).normalize();
        }

        let mut shown = *entity;
        shown.set_pose(drag.pose);
        let placement = self
            .resolver
            .step(&mut drag.ground, &shown.footprint(), collision, &[], dt);
        shown.set_bottom_y(placement.bottom_y);
        drag.pose = shown.pose();
    }
}
