/// Observer-side playback tuning for the snapshot buffer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InterpolationTuning {
    /// Playback delay behind the network clock, in seconds.
    pub interpolation_back_time: f64,
    /// Snapshots older than this (relative to now) are dropped.
    pub history_seconds: f64,
    pub max_snapshots: usize,
}

impl Default for InterpolationTuning {
    fn default() -> Self {
        Self {
            interpolation_back_time: 0.06,
            history_seconds: 1.0,
            max_snapshots: 64,
        }
    }
}
