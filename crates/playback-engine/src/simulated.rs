// FILE: crates/playback-engine/src/simulated.rs
//! Clock-driven virtual audio backend
//!
//! Handles advance their position with the tokio clock instead of decoding
//! audio, so sessions can be driven end to end without a sound device. Under
//! a paused test clock, time only moves when the test advances it.

use crate::resource::{AudioBackend, AudioHandle, ResourceEvents, ResourceFault};
use chaptercast_core::{PlaybackRate, SourceRef};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Switch that makes `play()` fail as if no user gesture had happened
#[derive(Debug, Clone, Default)]
pub struct PlaybackGate(Arc<AtomicBool>);

impl PlaybackGate {
    pub fn block(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn allow(&self) {
        self.0.store(false, Ordering::SeqCst);
    }

    pub fn is_blocked(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Audio backend whose resources are timers
#[derive(Debug, Clone, Default)]
pub struct SimulatedBackend {
    durations: HashMap<SourceRef, f64>,
    default_duration: Option<f64>,
    open_latency: Duration,
    failing: HashSet<SourceRef>,
    gate: PlaybackGate,
    open_handles: Arc<AtomicUsize>,
    opens: Arc<AtomicUsize>,
}

impl SimulatedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the length reported for one source
    pub fn with_duration(mut self, source: impl Into<SourceRef>, seconds: f64) -> Self {
        self.durations.insert(source.into(), seconds);
        self
    }

    /// Length reported for sources without an explicit duration
    ///
    /// Without one, such sources report no duration and never end.
    pub fn with_default_duration(mut self, seconds: f64) -> Self {
        self.default_duration = Some(seconds);
        self
    }

    /// Delay between `open` and the opened/failed report
    pub fn with_open_latency(mut self, latency: Duration) -> Self {
        self.open_latency = latency;
        self
    }

    /// Makes every open of `source` fail
    pub fn with_failing_source(mut self, source: impl Into<SourceRef>) -> Self {
        self.failing.insert(source.into());
        self
    }

    /// Shared switch controlling whether `play()` is refused
    pub fn gate(&self) -> PlaybackGate {
        self.gate.clone()
    }

    /// Handles opened and not yet closed
    pub fn open_handles(&self) -> usize {
        self.open_handles.load(Ordering::SeqCst)
    }

    /// Total open requests received
    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    fn duration_of(&self, source: &SourceRef) -> Option<f64> {
        self.durations
            .get(source)
            .copied()
            .or(self.default_duration)
    }
}

impl AudioBackend for SimulatedBackend {
    fn open(&mut self, source: &SourceRef, events: ResourceEvents) {
        self.opens.fetch_add(1, Ordering::SeqCst);

        let Ok(runtime) = Handle::try_current() else {
            events.failed("simulated audio needs a tokio runtime");
            return;
        };

        let failing = self.failing.contains(source);
        let duration = self.duration_of(source);
        let latency = self.open_latency;
        let gate = self.gate.clone();
        let open_handles = Arc::clone(&self.open_handles);
        let source = source.clone();

        log::debug!("Simulating open of {} for load {}", source, events.token());

        runtime.spawn(async move {
            if !latency.is_zero() {
                tokio::time::sleep(latency).await;
            }
            if failing {
                events.failed(format!("cannot open {}", source));
                return;
            }
            open_handles.fetch_add(1, Ordering::SeqCst);
            let handle = SimulatedHandle {
                duration,
                anchor_position: 0.0,
                started: None,
                rate: PlaybackRate::NORMAL.value(),
                gate,
                events: events.clone(),
                end_timer: None,
                open_handles,
                closed: false,
            };
            events.opened(Box::new(handle));
        });
    }
}

struct SimulatedHandle {
    duration: Option<f64>,
    /// Position at the moment `started` was taken, or the paused position
    anchor_position: f64,
    started: Option<Instant>,
    rate: f32,
    gate: PlaybackGate,
    events: ResourceEvents,
    end_timer: Option<JoinHandle<()>>,
    open_handles: Arc<AtomicUsize>,
    closed: bool,
}

impl SimulatedHandle {
    fn position_at(&self, now: Instant) -> f64 {
        let position = match self.started {
            Some(started) => {
                let elapsed = now.saturating_duration_since(started).as_secs_f64();
                self.anchor_position + elapsed * f64::from(self.rate)
            }
            None => self.anchor_position,
        };
        match self.duration {
            Some(duration) => position.min(duration),
            None => position,
        }
    }

    /// Folds elapsed time into the anchor so rate or position can change
    fn rebase(&mut self) {
        let now = Instant::now();
        self.anchor_position = self.position_at(now);
        if self.started.is_some() {
            self.started = Some(now);
        }
    }

    fn cancel_end_timer(&mut self) {
        if let Some(timer) = self.end_timer.take() {
            timer.abort();
        }
    }

    fn schedule_end(&mut self) {
        self.cancel_end_timer();
        let (Some(duration), Some(_)) = (self.duration, self.started) else {
            return;
        };
        let remaining = (duration - self.anchor_position).max(0.0) / f64::from(self.rate);
        if !remaining.is_finite() {
            return;
        }
        let Ok(runtime) = Handle::try_current() else {
            log::warn!("No runtime for simulated end of load {}", self.events.token());
            return;
        };
        let events = self.events.clone();
        self.end_timer = Some(runtime.spawn(async move {
            tokio::time::sleep(Duration::from_secs_f64(remaining)).await;
            events.ended();
        }));
    }
}

impl AudioHandle for SimulatedHandle {
    fn play(&mut self) -> Result<(), ResourceFault> {
        if self.closed {
            return Err(ResourceFault::Failed("handle is closed".to_string()));
        }
        if self.gate.is_blocked() {
            return Err(ResourceFault::Blocked(
                "playback requires a user gesture".to_string(),
            ));
        }
        if self.started.is_none() {
            self.started = Some(Instant::now());
            self.schedule_end();
        }
        Ok(())
    }

    fn pause(&mut self) {
        self.rebase();
        self.started = None;
        self.cancel_end_timer();
    }

    fn seek(&mut self, offset_seconds: f64) {
        self.rebase();
        self.anchor_position = match self.duration {
            Some(duration) => offset_seconds.clamp(0.0, duration),
            None => offset_seconds.max(0.0),
        };
        self.schedule_end();
    }

    fn set_volume(&mut self, _volume: u8) {}

    fn set_muted(&mut self, _muted: bool) {}

    fn set_rate(&mut self, rate: PlaybackRate) {
        self.rebase();
        self.rate = rate.value();
        self.schedule_end();
    }

    fn current_position(&self) -> f64 {
        self.position_at(Instant::now())
    }

    fn duration(&self) -> Option<f64> {
        self.duration
    }

    fn close(&mut self) {
        self.cancel_end_timer();
        if !self.closed {
            self.closed = true;
            self.started = None;
            self.open_handles.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

impl Drop for SimulatedHandle {
    fn drop(&mut self) {
        self.close();
    }
}
