use glam::{Vec2, Vec3};

use crate::domain::entity::Footprint;
use crate::domain::ports::{CollisionQuery, Hit};
use crate::domain::state::ColliderId;
use crate::domain::tuning::GroundTuning;

/// Per-entity placement memory carried across frames.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GroundPlacementContext {
    pub current_bottom_y: f32,
    /// Reference height for the step-up limit.
    pub support_baseline_y: f32,
    pub last_horizontal_position: Option<Vec2>,
}

impl GroundPlacementContext {
    pub fn new(bottom_y: f32) -> Self {
        Self {
            current_bottom_y: bottom_y,
            support_baseline_y: bottom_y,
            last_horizontal_position: None,
        }
    }

    /// Forget history, e.g. after a teleport or a drag ends.
    pub fn reset(&mut self, bottom_y: f32) {
        *self = Self::new(bottom_y);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupportSource {
    Center,
    Sweep,
    Ledge,
    Deep,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Support {
    pub height: f32,
    pub normal: Vec3,
    pub collider: ColliderId,
    pub source: SupportSource,
    /// Raw surface was above the step-up limit.
    pub clamped: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PenetrationOutcome {
    Clear,
    Lifted { lift: f32, iterations: u32 },
    /// Iteration cap hit; the pre-pass height was kept.
    Unresolved,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    pub bottom_y: f32,
    /// `None` means no valid support; height was held.
    pub support: Option<Support>,
    pub penetration: PenetrationOutcome,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct GroundResolver {
    tuning: GroundTuning,
}

impl GroundResolver {
    pub fn new(tuning: GroundTuning) -> Self {
        Self { tuning }
    }

    pub fn tuning(&self) -> &GroundTuning {
        &self.tuning
    }

    /// One frame of vertical placement: support search, smoothing and the
    /// upward penetration pass. Horizontal position is never touched.
    pub fn step<Q: CollisionQuery + ?Sized>(
        &self,
        ctx: &mut GroundPlacementContext,
        footprint: &Footprint,
        query: &Q,
        own: &[ColliderId],
        dt: f32,
    ) -> Placement {
        let bottom = footprint.bottom_y;
        let support = self.find_support(ctx, footprint, query, own);

        let next = match support {
            Some(s) => self.approach(bottom, s.height + self.tuning.feet_lift, dt),
            None => bottom,
        };

        // A surface being climbed onto within the step limit is expected to
        // overlap until smoothing catches up.
        let mut ignored = own.to_vec();
        if let Some(s) = support.filter(|s| !s.clamped) {
            ignored.push(s.collider);
        }
        let (bottom_y, penetration) = self.correct_penetration(next, footprint, query, &ignored);

        ctx.current_bottom_y = bottom_y;
        Placement {
            bottom_y,
            support,
            penetration,
        }
    }

    /// Picks the supporting surface under the footprint and updates the
    /// step-up baseline. `None` when no query finds walkable ground.
    pub fn find_support<Q: CollisionQuery + ?Sized>(
        &self,
        ctx: &mut GroundPlacementContext,
        footprint: &Footprint,
        query: &Q,
        own: &[ColliderId],
    ) -> Option<Support> {
        let t = &self.tuning;
        let bottom = footprint.bottom_y;
        self.update_baseline(ctx, footprint);
        let allowed_max = ctx.support_baseline_y + t.max_step_up;

        let origin_y = bottom + footprint.height() + t.ray_start_height;
        let reach = footprint.height() + t.ray_start_height + t.search_down;
        let origin = Vec3::new(footprint.center.x, origin_y, footprint.center.y);

        let sweep_half = Vec3::new(
            (footprint.half_extents.x - t.footprint_inset).max(0.0),
            t.sweep_half_height,
            (footprint.half_extents.z - t.footprint_inset).max(0.0),
        );
        let center = self.nearest_valid(query.cast_ray_down(origin, reach), own);
        let sweep = self.nearest_valid(
            query.cast_box_down(origin, sweep_half, footprint.orientation, reach),
            own,
        );

        if let Some(center) = center {
            let cy = center.point.y;
            if cy < bottom {
                return Some(support_from(&center, SupportSource::Center, false));
            }

            let mut best = support_from(&center, SupportSource::Center, cy > allowed_max);
            best.height = cy.min(allowed_max);
            if let Some(sweep) = sweep {
                let sy = sweep.point.y;
                if sy.min(allowed_max) > best.height {
                    best = support_from(&sweep, SupportSource::Sweep, sy > allowed_max);
                    best.height = sy.min(allowed_max);
                }
            }
            return Some(best);
        }

        if let Some(corner) = self.lowest_corner(footprint, origin_y, reach, query, own) {
            if corner.point.y <= bottom - t.step_down_min_drop {
                return Some(support_from(&corner, SupportSource::Ledge, false));
            }
        }

        let deep = self.nearest_valid(query.cast_ray_down(origin, t.max_ray_distance), own);
        match (sweep, deep) {
            (Some(sweep), Some(deep)) if deep.point.y < sweep.point.y - t.deep_drop_tolerance => {
                Some(support_from(&deep, SupportSource::Deep, false))
            }
            (Some(sweep), _) => {
                let sy = sweep.point.y;
                let mut support = support_from(&sweep, SupportSource::Sweep, sy > allowed_max);
                support.height = sy.min(allowed_max);
                Some(support)
            }
            (None, Some(deep)) => Some(support_from(&deep, SupportSource::Deep, false)),
            (None, None) => None,
        }
    }

    /// Lifts the box straight up out of static geometry. Returns the new
    /// bottom height, or the input height if the cap is hit first.
    pub fn correct_penetration<Q: CollisionQuery + ?Sized>(
        &self,
        bottom_y: f32,
        footprint: &Footprint,
        query: &Q,
        ignored: &[ColliderId],
    ) -> (f32, PenetrationOutcome) {
        let mut lifted = bottom_y;
        for iteration in 0..self.tuning.penetration_max_iterations {
            let lift = query
                .overlap_box(
                    footprint.center_at(lifted),
                    footprint.half_extents,
                    footprint.orientation,
                )
                .into_iter()
                .filter(|o| !ignored.contains(&o.collider))
                .map(|o| o.direction.normalize_or_zero().y * o.depth)
                .fold(0.0_f32, f32::max);

            if lift <= self.tuning.penetration_min_lift {
                let outcome = if iteration == 0 {
                    PenetrationOutcome::Clear
                } else {
                    PenetrationOutcome::Lifted {
                        lift: lifted - bottom_y,
                        iterations: iteration,
                    }
                };
                return (lifted, outcome);
            }
            lifted += lift;
        }
        (bottom_y, PenetrationOutcome::Unresolved)
    }

    /// Nearest walkable hit straight below `origin`.
    pub fn cast_down<Q: CollisionQuery + ?Sized>(
        &self,
        origin: Vec3,
        max_distance: f32,
        query: &Q,
        own: &[ColliderId],
    ) -> Option<Hit> {
        self.nearest_valid(query.cast_ray_down(origin, max_distance), own)
    }

    fn approach(&self, current: f32, target: f32, dt: f32) -> f32 {
        if target <= current {
            return target;
        }
        let alpha = 1.0 - (-self.tuning.smooth_speed * dt.max(0.0)).exp();
        current + (target - current) * alpha
    }

    fn update_baseline(&self, ctx: &mut GroundPlacementContext, footprint: &Footprint) {
        let bottom = footprint.bottom_y;
        let moved = ctx
            .last_horizontal_position
            .is_none_or(|prev| prev.distance(footprint.center) > self.tuning.horizontal_epsilon);
        ctx.support_baseline_y = if moved {
            bottom
        } else {
            ctx.support_baseline_y.min(bottom)
        };
        ctx.last_horizontal_position = Some(footprint.center);
        ctx.current_bottom_y = bottom;
    }

    fn lowest_corner<Q: CollisionQuery + ?Sized>(
        &self,
        footprint: &Footprint,
        origin_y: f32,
        reach: f32,
        query: &Q,
        own: &[ColliderId],
    ) -> Option<Hit> {
        let px = (footprint.half_extents.x - self.tuning.footprint_inset).max(0.0);
        let pz = (footprint.half_extents.z - self.tuning.footprint_inset).max(0.0);
        let center = Vec3::new(footprint.center.x, origin_y, footprint.center.y);

        [(px, pz), (-px, pz), (px, -pz), (-px, -pz)]
            .into_iter()
            .filter_map(|(x, z)| {
                let offset = footprint.orientation * Vec3::new(x, 0.0, z);
                let origin = center + Vec3::new(offset.x, 0.0, offset.z);
                self.nearest_valid(query.cast_ray_down(origin, reach), own)
            })
            .min_by(|a, b| a.point.y.total_cmp(&b.point.y))
    }

    fn nearest_valid(&self, hits: Vec<Hit>, own: &[ColliderId]) -> Option<Hit> {
        hits.into_iter()
            .filter(|h| h.normal.y >= self.tuning.min_ground_normal_y && !own.contains(&h.collider))
            .min_by(|a, b| a.distance.total_cmp(&b.distance))
    }
}

fn support_from(hit: &Hit, source: SupportSource, clamped: bool) -> Support {
    Support {
        height: hit.point.y,
        normal: hit.normal,
        collider: hit.collider,
        source,
        clamped,
    }
}
