// Static table scenery as axis-aligned boxes. Serves as the server's
// collision world when no engine is attached.

use glam::{Mat3, Quat, Vec3};

use crate::domain::ports::{CollisionQuery, Hit, Overlap};
use crate::domain::state::ColliderId;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StaticCollider {
    pub id: ColliderId,
    pub min: Vec3,
    pub max: Vec3,
    /// Normal reported for hits on the top face.
    pub top_normal: Vec3,
}

impl StaticCollider {
    pub fn new(id: ColliderId, min: Vec3, max: Vec3) -> Self {
        Self {
            id,
            min: min.min(max),
            max: min.max(max),
            top_normal: Vec3::Y,
        }
    }

    pub fn with_top_normal(mut self, normal: Vec3) -> Self {
        self.top_normal = normal.normalize_or(Vec3::Y);
        self
    }

    fn contains_xz(&self, point: Vec3) -> bool {
        point.x >= self.min.x && point.x <= self.max.x && point.z >= self.min.z && point.z <= self.max.z
    }
}

#[derive(Debug, Clone, Default)]
pub struct StaticScene {
    colliders: Vec<StaticCollider>,
}

impl StaticScene {
    pub fn new(colliders: Vec<StaticCollider>) -> Self {
        Self { colliders }
    }

    /// Square floor whose top face sits at y = 0.
    pub fn flat_floor(half_size: f32) -> Self {
        Self::new(vec![StaticCollider::new(
            ColliderId(0),
            Vec3::new(-half_size, -1.0, -half_size),
            Vec3::new(half_size, 0.0, half_size),
        )])
    }

    pub fn with_collider(mut self, collider: StaticCollider) -> Self {
        self.colliders.push(collider);
        self
    }

    pub fn colliders(&self) -> &[StaticCollider] {
        &self.colliders
    }

    pub fn len(&self) -> usize {
        self.colliders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.colliders.is_empty()
    }
}

// World-space half extents of an oriented box.
fn world_half_extents(half_extents: Vec3, orientation: Quat) -> Vec3 {
    let m = Mat3::from_quat(orientation.normalize());
    m.x_axis.abs() * half_extents.x + m.y_axis.abs() * half_extents.y + m.z_axis.abs() * half_extents.z
}

impl CollisionQuery for StaticScene {
    fn cast_ray_down(&self, origin: Vec3, max_distance: f32) -> Vec<Hit> {
        self.colliders
            .iter()
            .filter(|c| c.contains_xz(origin) && origin.y >= c.max.y)
            .filter_map(|c| {
                let distance = origin.y - c.max.y;
                (distance <= max_distance).then(|| Hit {
                    point: Vec3::new(origin.x, c.max.y, origin.z),
                    normal: c.top_normal,
                    distance,
                    collider: c.id,
                })
            })
            .collect()
    }

    fn cast_box_down(
        &self,
        origin: Vec3,
        half_extents: Vec3,
        orientation: Quat,
        max_distance: f32,
    ) -> Vec<Hit> {
        let extent = world_half_extents(half_extents, orientation);
        let box_min = origin - extent;
        let box_max = origin + extent;

        self.colliders
            .iter()
            .filter(|c| {
                box_min.x < c.max.x && box_max.x > c.min.x && box_min.z < c.max.z && box_max.z > c.min.z
            })
            .filter_map(|c| {
                let distance = box_min.y - c.max.y;
                if distance < 0.0 || distance > max_distance {
                    return None;
                }
                let point = Vec3::new(
                    origin.x.clamp(c.min.x, c.max.x),
                    c.max.y,
                    origin.z.clamp(c.min.z, c.max.z),
                );
                Some(Hit {
                    point,
                    normal: c.top_normal,
                    distance,
                    collider: c.id,
                })
            })
            .collect()
    }

    fn overlap_box(&self, center: Vec3, half_extents: Vec3, orientation: Quat) -> Vec<Overlap> {
        let extent = world_half_extents(half_extents, orientation);
        let box_min = center - extent;
        let box_max = center + extent;

        self.colliders
            .iter()
            .filter_map(|c| {
                let pos = c.max - box_min;
                let neg = box_max - c.min;
                let depth = pos.min(neg);
                if depth.min_element() <= 0.0 {
                    return None;
                }

                // Separate along the axis of least penetration, away from
                // the collider's center.
                let collider_center = (c.min + c.max) * 0.5;
                let (axis, amount) = if depth.x <= depth.y && depth.x <= depth.z {
                    (Vec3::X, depth.x)
                } else if depth.y <= depth.z {
                    (Vec3::Y, depth.y)
                } else {
                    (Vec3::Z, depth.z)
                };
                let side = if (center - collider_center).dot(axis) >= 0.0 {
                    1.0
                } else {
                    -1.0
                };
                Some(Overlap {
                    collider: c.id,
                    direction: axis * side,
                    depth: amount,
                })
            })
            .collect()
    }
}
