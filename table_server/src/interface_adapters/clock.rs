use crate::domain::NetworkClock;
use std::time::Instant;

/// Seconds since the server started. Every table shares one instance so
/// timestamps are comparable across tables.
#[derive(Debug, Clone, Copy)]
pub struct ServerClock {
    started: Instant,
}

impl ServerClock {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
        }
    }
}

impl Default for ServerClock {
    fn default() -> Self {
        Self::new()
    }
}

impl NetworkClock for ServerClock {
    fn now(&self) -> f64 {
        self.started.elapsed().as_secs_f64()
    }
}
