// FILE: crates/playback-engine/src/tracker.rs
//! Periodic playback position sampler

use crate::resource::PlaybackResource;
use std::time::Duration;
use tokio::time::Instant;

/// Samples the open resource's position at a fixed interval
///
/// The tracker owns only its schedule. It is started and stopped by the
/// session's transitions and reads the resource it is handed, so it cannot
/// keep sampling after the resource is gone. Positions always come from the
/// resource; nothing is extrapolated between ticks.
#[derive(Debug)]
pub struct ProgressTracker {
    interval: Duration,
    next_due: Option<Instant>,
    samples: u64,
}

impl ProgressTracker {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            next_due: None,
            samples: 0,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn is_active(&self) -> bool {
        self.next_due.is_some()
    }

    /// When the next sample should be taken, if running
    pub fn next_due(&self) -> Option<Instant> {
        self.next_due
    }

    /// Number of samples taken since creation
    pub fn samples(&self) -> u64 {
        self.samples
    }

    pub fn start(&mut self) {
        self.next_due = Some(Instant::now() + self.interval);
        log::debug!("Progress sampler started ({:?})", self.interval);
    }

    pub fn stop(&mut self) {
        if self.next_due.take().is_some() {
            log::debug!("Progress sampler stopped");
        }
    }

    /// Restarts the interval after a manual seek
    ///
    /// A tick that was scheduled before the seek is pushed back a full
    /// interval, so the first sample after a seek already sees the new
    /// position on the resource.
    pub fn reconcile(&mut self) {
        if self.next_due.is_some() {
            self.next_due = Some(Instant::now() + self.interval);
        }
    }

    /// Reads the resource position and schedules the next tick
    ///
    /// Returns `None` if the tracker is stopped.
    pub fn sample(&mut self, resource: &PlaybackResource) -> Option<f64> {
        self.next_due?;
        self.samples += 1;
        self.next_due = Some(Instant::now() + self.interval);
        Some(resource.current_position())
    }
}
