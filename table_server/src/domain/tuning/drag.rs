/// Local manipulation tuning for the dragging participant.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DragTuning {
    /// Horizontal speed clamp in meters per second.
    pub max_horizontal_speed: f32,
    /// Degrees per second per unit of scroll while the modifier is held.
    pub rotation_speed: f32,
    /// Minimum seconds between outgoing pose updates.
    pub send_interval: f64,
    pub max_pointer_distance: f32,
    pub scroll_dead_zone: f32,
}

impl Default for DragTuning {
    fn default() -> Self {
        Self {
            max_horizontal_speed: 8.0,
            rotation_speed: 200.0,
            send_interval: 0.03,
            max_pointer_distance: 1000.0,
            scroll_dead_zone: 0.01,
        }
    }
}
