use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{info, warn};

/// Alarm on the depth of a queue that must never block its producers.
///
/// Logs a warning once when the depth crosses the threshold and an info line
/// once it falls back below half of it.
#[derive(Debug)]
pub struct HighWaterMark {
    name: &'static str,
    threshold: usize,
    tripped: AtomicBool,
}

impl HighWaterMark {
    pub fn new(name: &'static str, threshold: usize) -> Self {
        Self {
            name,
            threshold,
            tripped: AtomicBool::new(false),
        }
    }

    /// Record the current depth. Returns true while above the threshold.
    pub fn observe(&self, depth: usize) -> bool {
        if depth >= self.threshold {
            if !self.tripped.swap(true, Ordering::Relaxed) {
                warn!(
                    queue = self.name,
                    depth,
                    threshold = self.threshold,
                    "Queue depth crossed high-water mark"
                );
            }
            true
        } else {
            if depth <= self.threshold / 2 && self.tripped.swap(false, Ordering::Relaxed) {
                info!(queue = self.name, depth, "Queue depth recovered below high-water mark");
            }
            false
        }
    }

    pub fn is_tripped(&self) -> bool {
        self.tripped.load(Ordering::Relaxed)
    }
}
