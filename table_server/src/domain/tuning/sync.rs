/// Authority-side replication thresholds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SyncTuning {
    /// Position change (meters) that refreshes the replicated pose.
    pub position_threshold: f32,
    /// Rotation change (degrees) that refreshes the replicated pose.
    pub rotation_threshold_degrees: f32,
}

impl Default for SyncTuning {
    fn default() -> Self {
        Self {
            position_threshold: 0.01,
            rotation_threshold_degrees: 1.0,
        }
    }
}
