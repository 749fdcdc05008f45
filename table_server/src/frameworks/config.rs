use crate::domain::{OwnershipPolicy, OwnershipRules};
use std::{env, path::PathBuf, time::Duration};
use tracing::warn;

// Runtime/server constants (not table tuning).

pub fn http_port() -> u16 {
    env::var("TABLE_SERVER_PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(3001)
}

pub fn tick_interval() -> Duration {
    let hz = env::var("TABLE_TICK_HZ")
        .ok()
        .and_then(|v| v.parse::<u32>().ok())
        .filter(|hz| (1..=240).contains(hz))
        .unwrap_or(DEFAULT_TICK_HZ);
    Duration::from_secs_f64(1.0 / hz as f64)
}

/// Scene file to load; a flat floor is used when unset.
pub fn scene_path() -> Option<PathBuf> {
    env::var("TABLE_SCENE_PATH")
        .ok()
        .filter(|v| !v.trim().is_empty())
        .map(PathBuf::from)
}

pub fn ownership_rules() -> OwnershipRules {
    let mut rules = OwnershipRules::default();

    if let Ok(raw) = env::var("TABLE_OWNERSHIP") {
        match raw.parse::<OwnershipPolicy>() {
            Ok(policy) => rules.policy = policy,
            Err(e) => warn!(error = %e, "ignoring TABLE_OWNERSHIP"),
        }
    }

    if let Ok(raw) = env::var("TABLE_LOCK_BLOCKS_DRAG") {
        match raw.trim().parse::<bool>() {
            Ok(value) => rules.lock_blocks_drag = value,
            Err(_) => warn!(value = %raw, "ignoring TABLE_LOCK_BLOCKS_DRAG"),
        }
    }

    if let Some(ms) = env::var("TABLE_DRAG_TIMEOUT_MS")
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
    {
        // Zero disables the timeout.
        rules.drag_timeout = (ms > 0).then(|| ms as f64 / 1000.0);
    }

    rules
}

pub const INPUT_CHANNEL_CAPACITY: usize = 1024;
pub const BROADCAST_CAPACITY: usize = 128;

pub const DEFAULT_TICK_HZ: u32 = 50;
pub const DEFAULT_TABLE_ID: &str = "default";
// Half size of the fallback floor in meters.
pub const DEFAULT_FLOOR_HALF_SIZE: f32 = 50.0;
