use std::collections::VecDeque;

use crate::domain::state::{Pose, Snapshot};
use crate::domain::tuning::InterpolationTuning;

// Brackets closer than this are treated as this far apart.
const MIN_SPAN_SECONDS: f64 = 0.0001;

/// Time-ordered pose history for one observed entity, sampled at a fixed
/// delay behind the network clock.
#[derive(Debug, Clone)]
pub struct SnapshotBuffer {
    snapshots: VecDeque<Snapshot>,
    tuning: InterpolationTuning,
}

impl Default for SnapshotBuffer {
    fn default() -> Self {
        Self::new(InterpolationTuning::default())
    }
}

impl SnapshotBuffer {
    pub fn new(tuning: InterpolationTuning) -> Self {
        Self {
            snapshots: VecDeque::with_capacity(tuning.max_snapshots),
            tuning,
        }
    }

    /// Records a pose and trims history relative to `now`.
    ///
    /// Late arrivals are inserted at their timestamp; equal timestamps keep
    /// arrival order.
    pub fn push(&mut self, timestamp: f64, pose: Pose, now: f64) {
        let index = self.snapshots.partition_point(|s| s.timestamp <= timestamp);
        self.snapshots.insert(index, Snapshot { timestamp, pose });
        self.trim(now);
    }

    pub fn render_time(&self, now: f64) -> f64 {
        now - self.tuning.interpolation_back_time
    }

    /// Samples at `now - interpolation_back_time`.
    pub fn sample_at(&self, now: f64) -> Option<Pose> {
        self.sample(self.render_time(now))
    }

    /// Interpolated pose at `render_time`, clamped to the retained span.
    /// `None` when nothing is buffered; callers keep their last pose.
    pub fn sample(&self, render_time: f64) -> Option<Pose> {
        let newest = self.snapshots.back()?;
        if render_time >= newest.timestamp {
            return Some(newest.pose);
        }

        for i in (0..self.snapshots.len() - 1).rev() {
            let lhs = self.snapshots[i];
            if render_time >= lhs.timestamp {
                let rhs = self.snapshots[i + 1];
                let span = (rhs.timestamp - lhs.timestamp).max(MIN_SPAN_SECONDS);
                let t = ((render_time - lhs.timestamp) / span).clamp(0.0, 1.0);
                return Some(lhs.pose.interpolate(rhs.pose, t as f32));
            }
        }

        self.snapshots.front().map(|s| s.pose)
    }

    pub fn clear(&mut self) {
        self.snapshots.clear();
    }

    /// Hard reset: the buffer holds exactly `pose` at `now`.
    pub fn snap_to(&mut self, pose: Pose, now: f64) {
        self.snapshots.clear();
        self.snapshots.push_back(Snapshot {
            timestamp: now,
            pose,
        });
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    pub fn newest(&self) -> Option<&Snapshot> {
        self.snapshots.back()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Snapshot> {
        self.snapshots.iter()
    }

    fn trim(&mut self, now: f64) {
        let cutoff = now - self.tuning.history_seconds;
        while self.snapshots.front().is_some_and(|s| s.timestamp < cutoff) {
            self.snapshots.pop_front();
        }
        while self.snapshots.len() > self.tuning.max_snapshots {
            self.snapshots.pop_front();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::{Quat, Vec3};

    fn at_x(x: f32) -> Pose {
        Pose::at(Vec3::new(x, 0.0, 0.0))
    }

    fn assert_near(actual: Vec3, expected: Vec3) {
        assert!(
            (actual - expected).length() < 1e-4,
            "expected {expected:?}, got {actual:?}"
        );
    }

    #[test]
    fn samples_between_bracketing_snapshots() {
        let mut buffer = SnapshotBuffer::default();
        buffer.push(0.0, at_x(0.0), 0.0);
        buffer.push(0.1, at_x(1.0), 0.1);

        // now 0.1 renders at 0.04, forty percent of the way.
        let pose = buffer.sample_at(0.1).expect("buffer has snapshots");

        assert_near(pose.position, Vec3::new(0.4, 0.0, 0.0));
    }

    #[test]
    fn clamps_to_newest_and_oldest() {
        let mut buffer = SnapshotBuffer::default();
        buffer.push(1.0, at_x(1.0), 1.0);
        buffer.push(1.1, at_x(2.0), 1.1);
        buffer.push(1.2, at_x(3.0), 1.2);

        assert_eq!(buffer.sample(1.2), Some(at_x(3.0)));
        assert_eq!(buffer.sample(5.0), Some(at_x(3.0)));
        assert_eq!(buffer.sample(1.0), Some(at_x(1.0)));
        assert_eq!(buffer.sample(0.5), Some(at_x(1.0)));
    }

    #[test]
    fn empty_buffer_samples_nothing() {
        let buffer = SnapshotBuffer::default();
        assert_eq!(buffer.sample(0.0), None);
    }

    #[test]
    fn interpolation_is_linear_within_a_bracket() {
        let mut buffer = SnapshotBuffer::default();
        buffer.push(0.0, at_x(0.0), 0.0);
        buffer.push(1.0, at_x(10.0), 0.5);

        let mut previous = buffer.sample(0.0).map(|p| p.position.x).unwrap_or_default();
        for step in 1..=10 {
            let t = step as f64 * 0.1;
            let x = buffer.sample(t).map(|p| p.position.x).unwrap_or_default();
            assert!((x - (t as f32) * 10.0).abs() < 1e-3);
            assert!(x >= previous);
            previous = x;
        }
    }

    #[test]
    fn rotation_uses_shortest_arc() {
        let mut buffer = SnapshotBuffer::default();
        let start = Quat::from_rotation_y(0.0);
        let end = Quat::from_rotation_y(std::f32::consts::FRAC_PI_2);
        buffer.push(0.0, Pose::new(Vec3::ZERO, start), 0.0);
        buffer.push(1.0, Pose::new(Vec3::ZERO, end), 0.0);

        let mid = buffer.sample(0.5).expect("buffer has snapshots");

        let expected = Quat::from_rotation_y(std::f32::consts::FRAC_PI_4);
        assert!(mid.rotation.angle_between(expected) < 1e-3);
    }

    #[test]
    fn late_snapshot_is_inserted_in_order() {
        let mut buffer = SnapshotBuffer::default();
        buffer.push(0.0, at_x(0.0), 0.2);
        buffer.push(0.2, at_x(2.0), 0.2);
        buffer.push(0.1, at_x(1.0), 0.2);

        let timestamps: Vec<f64> = buffer.iter().map(|s| s.timestamp).collect();
        assert_eq!(timestamps, vec![0.0, 0.1, 0.2]);
        assert_near(
            buffer.sample(0.15).map(|p| p.position).unwrap_or_default(),
            Vec3::new(1.5, 0.0, 0.0),
        );
    }

    #[test]
    fn trim_enforces_history_window_and_capacity() {
        let tuning = InterpolationTuning {
            max_snapshots: 8,
            ..InterpolationTuning::default()
        };
        let mut buffer = SnapshotBuffer::new(tuning);

        for i in 0..200 {
            let now = i as f64 * 0.02;
            buffer.push(now, at_x(i as f32), now);
            assert!(buffer.len() <= tuning.max_snapshots);
            assert!(buffer.iter().all(|s| s.timestamp >= now - tuning.history_seconds));
        }
    }

    #[test]
    fn history_window_drops_stale_snapshots() {
        let mut buffer = SnapshotBuffer::default();
        buffer.push(0.0, at_x(0.0), 0.0);
        buffer.push(0.5, at_x(1.0), 0.5);
        buffer.push(1.6, at_x(2.0), 1.6);

        let timestamps: Vec<f64> = buffer.iter().map(|s| s.timestamp).collect();
        assert_eq!(timestamps, vec![1.6]);
    }

    #[test]
    fn snap_to_replaces_history() {
        let mut buffer = SnapshotBuffer::default();
        buffer.push(0.0, at_x(0.0), 0.0);
        buffer.push(0.1, at_x(1.0), 0.1);

        let target = Pose::new(Vec3::new(5.0, 0.0, 5.0), Quat::from_rotation_y(1.0));
        buffer.snap_to(target, 0.2);

        assert_eq!(buffer.len(), 1);
        assert_eq!(buffer.sample_at(0.2), Some(target));
        assert_eq!(buffer.sample(0.0), Some(target));
    }

    #[test]
    fn coincident_timestamps_do_not_divide_by_zero() {
        let mut buffer = SnapshotBuffer::default();
        buffer.push(1.0, at_x(0.0), 1.0);
        buffer.push(1.0, at_x(1.0), 1.0);
        buffer.push(2.0, at_x(2.0), 1.0);

        let pose = buffer.sample(1.5).expect("buffer has snapshots");
        assert!(pose.is_finite());
    }
}
