/// Tuning for ground placement of tokens resting on static scenery.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GroundTuning {
    /// Minimum up component of a surface normal to count as walkable.
    pub min_ground_normal_y: f32,
    /// Largest rise accepted relative to the support baseline.
    pub max_step_up: f32,
    /// Corner drop that switches to a ledge step-down.
    pub step_down_min_drop: f32,
    /// Ray origin height above the top of the token.
    pub ray_start_height: f32,
    /// Ray reach below the bottom of the token.
    pub search_down: f32,
    pub max_ray_distance: f32,
    /// Exponential smoothing rate for ascent, per second.
    pub smooth_speed: f32,
    pub footprint_inset: f32,
    /// Half height of the box used for the footprint sweep.
    pub sweep_half_height: f32,
    /// Horizontal motion below this does not reset the support baseline.
    pub horizontal_epsilon: f32,
    /// Deep-ray hits must sit this far below the sweep height to be preferred.
    pub deep_drop_tolerance: f32,
    /// Extra clearance added on top of the support height.
    pub feet_lift: f32,
    pub penetration_max_iterations: u32,
    pub penetration_min_lift: f32,
}

impl Default for GroundTuning {
    fn default() -> Self {
        Self {
            min_ground_normal_y: 0.4,
            max_step_up: 0.2,
            step_down_min_drop: 0.35,
            ray_start_height: 2.0,
            search_down: 2.5,
            max_ray_distance: 1000.0,
            smooth_speed: 10.0,
            footprint_inset: 0.02,
            sweep_half_height: 0.01,
            horizontal_epsilon: 0.001,
            deep_drop_tolerance: 0.05,
            feet_lift: 0.0,
            penetration_max_iterations: 5,
            penetration_min_lift: 0.0005,
        }
    }
}
