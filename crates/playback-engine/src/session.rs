// FILE: crates/playback-engine/src/session.rs
//! Playback session state machine
//!
//! ```text
//! Idle -> Loading -> Ready -> Playing <-> Paused -> Ended
//!            |                  |           |
//!            +------------> Error <---------+
//! ```
//!
//! `Seeking` is published transiently while a seek is applied. Idle and
//! Error are the only phases without an open resource.

use crate::bookmarks::PositionSnapshot;
use crate::catalog::{ChapterCatalog, Direction};
use crate::error::{EngineError, EngineResult};
use crate::resource::{
    AudioBackend, AudioHandle, LoadToken, PlaybackResource, ResourceEvent, ResourceEventKind,
    ResourceEventReceiver, ResourceEvents, ResourceFault,
};
use crate::tracker::ProgressTracker;
use chaptercast_core::{
    Bookmark, Chapter, ChapterId, FailureKind, PlaybackFailure, PlaybackPhase, PlaybackRate,
    PlaybackState, VOLUME_RANGE,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;

/// Initial audio settings and limits for a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSettings {
    pub volume: u8,
    pub muted: bool,
    pub rate: f32,
    /// Rates accepted by `set_rate`
    pub allowed_rates: Vec<f32>,
    /// How often the position is sampled while playing
    pub sample_interval: Duration,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            volume: 100,
            muted: false,
            rate: 1.0,
            allowed_rates: PlaybackRate::STANDARD.to_vec(),
            sample_interval: Duration::from_secs(1),
        }
    }
}

/// Handle returned by `subscribe`, used to unsubscribe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Receives every published state
pub type StateListener = Box<dyn FnMut(&PlaybackState) + Send>;

#[derive(Debug)]
struct PendingLoad {
    token: LoadToken,
    chapter_id: ChapterId,
    start_at: Option<f64>,
    autoplay: bool,
}

/// Clamps a timeline position into `[0, duration]`
///
/// Returns `None` for inputs that cannot be placed on the timeline: NaN,
/// and positive infinity while the duration is unknown.
fn clamp_position(offset: f64, duration: Option<f64>) -> Option<f64> {
    if offset.is_nan() {
        return None;
    }
    let lower = offset.max(0.0);
    match duration {
        Some(d) => Some(lower.min(d.max(0.0))),
        None if lower.is_finite() => Some(lower),
        None => None,
    }
}

/// One live playback session over a chapter catalog
///
/// All mutation happens through `&mut self`, so operations are totally
/// ordered. Asynchronous resource outcomes arrive as [`ResourceEvent`]s on
/// the receiver returned by [`PlaybackSession::new`] and must be fed back
/// through [`PlaybackSession::handle_event`].
pub struct PlaybackSession<B: AudioBackend> {
    catalog: Arc<ChapterCatalog>,
    backend: B,
    state: PlaybackState,
    allowed_rates: Vec<f32>,
    resource: Option<PlaybackResource>,
    pending: Option<PendingLoad>,
    last_token: Option<LoadToken>,
    tracker: ProgressTracker,
    listeners: Vec<(SubscriptionId, StateListener)>,
    next_subscription: u64,
    events_tx: mpsc::UnboundedSender<ResourceEvent>,
}

impl<B: AudioBackend> PlaybackSession<B> {
    /// Creates an idle session
    ///
    /// Fails with `InvalidParameter` if the settings are out of range.
    pub fn new(
        catalog: Arc<ChapterCatalog>,
        backend: B,
        settings: SessionSettings,
    ) -> EngineResult<(Self, ResourceEventReceiver)> {
        if settings.allowed_rates.is_empty() {
            return Err(EngineError::invalid_parameter(
                "allowed_rates",
                "[]",
                "at least one rate is required",
            ));
        }
        if let Some(bad) = settings
            .allowed_rates
            .iter()
            .find(|rate| !rate.is_finite() || **rate <= 0.0)
        {
            return Err(EngineError::invalid_parameter(
                "allowed_rates",
                bad,
                "rates must be positive",
            ));
        }
        if !VOLUME_RANGE.contains(&settings.volume) {
            return Err(EngineError::invalid_parameter(
                "volume",
                settings.volume,
                "must be between 0 and 100",
            ));
        }
        if settings.sample_interval.is_zero() {
            return Err(EngineError::invalid_parameter(
                "sample_interval",
                "0s",
                "must be greater than zero",
            ));
        }
        let rate = PlaybackRate::from_allowed(settings.rate, &settings.allowed_rates)
            .map_err(|reason| EngineError::invalid_parameter("rate", settings.rate, reason))?;

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let session = Self {
            catalog,
            backend,
            state: PlaybackState::new(settings.volume, settings.muted, rate),
            allowed_rates: settings.allowed_rates,
            resource: None,
            pending: None,
            last_token: None,
            tracker: ProgressTracker::new(settings.sample_interval),
            listeners: Vec::new(),
            next_subscription: 0,
            events_tx,
        };
        Ok((session, events_rx))
    }

    pub fn catalog(&self) -> &Arc<ChapterCatalog> {
        &self.catalog
    }

    /// Current published state
    pub fn state(&self) -> &PlaybackState {
        &self.state
    }

    pub fn phase(&self) -> &PlaybackPhase {
        &self.state.phase
    }

    /// The chapter the session is on, if any
    pub fn current_chapter(&self) -> Option<&Chapter> {
        self.state
            .chapter_id
            .as_ref()
            .and_then(|id| self.catalog.get(id))
    }

    /// Token of the open resource, if any
    pub fn resource_token(&self) -> Option<LoadToken> {
        self.resource.as_ref().map(PlaybackResource::token)
    }

    /// Token of the in-flight load, if any
    pub fn pending_token(&self) -> Option<LoadToken> {
        self.pending.as_ref().map(|p| p.token)
    }

    /// Returns true while the position sampler is running
    pub fn is_sampling(&self) -> bool {
        self.tracker.is_active()
    }

    /// When the sampler wants its next tick
    pub fn next_sample_due(&self) -> Option<Instant> {
        self.tracker.next_due()
    }

    /// Registers a listener
    ///
    /// The listener is called once with the current state, then after every
    /// transition and every sampled position change.
    pub fn subscribe<F>(&mut self, mut listener: F) -> SubscriptionId
    where
        F: FnMut(&PlaybackState) + Send + 'static,
    {
        self.next_subscription += 1;
        let id = SubscriptionId(self.next_subscription);
        listener(&self.state);
        self.listeners.push((id, Box::new(listener)));
        id
    }

    /// Removes a listener; returns false if it was not registered
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(existing, _)| *existing != id);
        self.listeners.len() != before
    }

    /// Loads a chapter from its beginning
    pub fn load(&mut self, chapter_id: &ChapterId) -> EngineResult<()> {
        self.begin_load(chapter_id.clone(), None, false)
    }

    /// Loads a chapter and starts at `offset_seconds` once it is ready
    ///
    /// The offset is clamped to the chapter's duration when it is known.
    pub fn load_at(&mut self, chapter_id: &ChapterId, offset_seconds: f64) -> EngineResult<()> {
        if offset_seconds.is_nan() {
            return Err(EngineError::invalid_parameter(
                "offset",
                offset_seconds,
                "must be a number",
            ));
        }
        self.begin_load(chapter_id.clone(), Some(offset_seconds), false)
    }

    /// Loads the chapter of a bookmark at its stored offset
    pub fn resume_bookmark(&mut self, bookmark: &Bookmark) -> EngineResult<()> {
        if &bookmark.audiobook_id != self.catalog.audiobook_id() {
            return Err(EngineError::invalid_parameter(
                "bookmark",
                bookmark.id,
                format!("belongs to audiobook {}", bookmark.audiobook_id),
            ));
        }
        self.load_at(&bookmark.chapter_id, bookmark.offset_seconds)
    }

    fn begin_load(
        &mut self,
        chapter_id: ChapterId,
        start_at: Option<f64>,
        autoplay: bool,
    ) -> EngineResult<()> {
        let (source, known_duration) = match self.catalog.get(&chapter_id) {
            Some(chapter) => (chapter.source.clone(), chapter.duration),
            None => return Err(EngineError::UnknownChapter(chapter_id)),
        };

        self.tracker.stop();
        // Release the previous resource before opening the next one.
        self.resource = None;

        let token = self.last_token.map_or_else(LoadToken::first, LoadToken::next);
        self.last_token = Some(token);

        if let Some(superseded) = self.pending.take() {
            log::debug!(
                "Load {} of {} superseded by {}",
                superseded.token,
                superseded.chapter_id,
                token
            );
        }

        log::info!("Loading chapter {} ({}) as {}", chapter_id, source, token);

        self.pending = Some(PendingLoad {
            token,
            chapter_id: chapter_id.clone(),
            start_at,
            autoplay,
        });
        self.state.chapter_id = Some(chapter_id);
        self.state.position_seconds = 0.0;
        self.state.duration_seconds = known_duration;
        self.state.is_playing = false;
        self.state.phase = PlaybackPhase::Loading;
        self.publish();

        let events = ResourceEvents::new(token, self.events_tx.clone());
        self.backend.open(&source, events);
        Ok(())
    }

    /// Applies an asynchronous resource outcome
    pub fn handle_event(&mut self, event: ResourceEvent) {
        let ResourceEvent { token, kind } = event;
        match kind {
            ResourceEventKind::Opened(handle) => self.on_opened(token, handle),
            ResourceEventKind::Ended => self.on_ended(token),
            ResourceEventKind::Failed(reason) => self.on_failed(token, reason),
        }
    }

    fn on_opened(&mut self, token: LoadToken, mut handle: Box<dyn AudioHandle>) {
        let pending = match self.pending.take() {
            Some(pending) if pending.token == token => pending,
            other => {
                self.pending = other;
                log::debug!("Discarding stale open for load {}", token);
                handle.close();
                return;
            }
        };

        handle.set_volume(self.state.volume);
        handle.set_muted(self.state.muted);
        handle.set_rate(self.state.rate);

        let duration = handle.duration().or_else(|| {
            self.catalog
                .get(&pending.chapter_id)
                .and_then(|chapter| chapter.duration)
        });
        let start = pending
            .start_at
            .and_then(|offset| clamp_position(offset, duration))
            .unwrap_or(0.0);
        if start > 0.0 {
            handle.seek(start);
        }

        log::info!(
            "Chapter {} ready (duration: {:?}, start: {})",
            pending.chapter_id,
            duration,
            start
        );

        self.resource = Some(PlaybackResource::new(token, pending.chapter_id, handle));
        self.state.position_seconds = start;
        self.state.duration_seconds = duration;
        self.state.is_playing = false;
        self.state.phase = PlaybackPhase::Ready;
        self.publish();

        if pending.autoplay {
            if let Err(e) = self.play() {
                log::warn!("Autoplay after load {} failed: {}", token, e);
            }
        }
    }

    fn on_failed(&mut self, token: LoadToken, reason: String) {
        if self.pending.as_ref().is_some_and(|p| p.token == token) {
            log::error!("Load {} failed: {}", token, reason);
            self.enter_error(FailureKind::ResourceLoad, reason);
        } else if self.resource_token() == Some(token) {
            log::error!("Resource {} failed: {}", token, reason);
            self.enter_error(FailureKind::Playback, reason);
        } else {
            log::debug!("Ignoring failure of stale load {}: {}", token, reason);
        }
    }

    fn on_ended(&mut self, token: LoadToken) {
        if self.resource_token() != Some(token) {
            log::debug!("Ignoring end of stale resource {}", token);
            return;
        }
        self.tracker.stop();

        let Some(current) = self.state.chapter_id.clone() else {
            return;
        };

        if let Some(next) = self.catalog.neighbor(&current, Direction::Next) {
            let next_id = next.id.clone();
            log::info!("Chapter {} finished, advancing to {}", current, next_id);
            if let Err(e) = self.begin_load(next_id, None, true) {
                log::error!("Auto-advance from {} failed: {}", current, e);
            }
            return;
        }

        let end = self
            .state
            .duration_seconds
            .or_else(|| self.resource.as_ref().map(PlaybackResource::current_position))
            .unwrap_or(self.state.position_seconds);

        log::info!("Reached the end of {}", self.catalog.title());
        self.state.duration_seconds = Some(end);
        self.state.position_seconds = end;
        self.state.is_playing = false;
        self.state.phase = PlaybackPhase::Ended;
        self.publish();
    }

    fn enter_error(&mut self, kind: FailureKind, reason: String) {
        self.tracker.stop();
        self.pending = None;
        self.resource = None;
        self.state.is_playing = false;
        self.state.phase = PlaybackPhase::Error(PlaybackFailure::new(kind, reason));
        self.publish();
    }

    /// Starts or resumes playback
    ///
    /// Valid from Ready, Paused and Ended (which restarts the chapter at 0).
    /// A no-op while Idle, Loading, in Error, or already Playing.
    pub fn play(&mut self) -> EngineResult<()> {
        match self.state.phase {
            PlaybackPhase::Ready | PlaybackPhase::Paused => {}
            PlaybackPhase::Ended => self.rewind(),
            ref other => {
                log::debug!("play() ignored while {}", other.name());
                return Ok(());
            }
        }

        let Some(resource) = self.resource.as_mut() else {
            return Ok(());
        };

        match resource.handle_mut().play() {
            Ok(()) => {
                self.state.is_playing = true;
                self.state.phase = PlaybackPhase::Playing;
                self.tracker.start();
                self.publish();
                Ok(())
            }
            Err(ResourceFault::Blocked(reason)) => {
                log::warn!("Playback blocked: {}", reason);
                Err(EngineError::PlaybackBlocked(reason))
            }
            Err(ResourceFault::Failed(reason)) => {
                self.enter_error(FailureKind::Playback, reason.clone());
                Err(EngineError::ResourceFailed(reason))
            }
        }
    }

    /// Moves an ended chapter back to its start, paused
    fn rewind(&mut self) {
        if let Some(resource) = self.resource.as_mut() {
            resource.handle_mut().seek(0.0);
        }
        self.state.position_seconds = 0.0;
        self.state.phase = PlaybackPhase::Paused;
        self.publish();
    }

    /// Pauses playback, keeping the resource open
    ///
    /// While a load is in flight this cancels the pending autoplay instead.
    pub fn pause(&mut self) {
        if let Some(pending) = self.pending.as_mut() {
            pending.autoplay = false;
        }
        if self.state.phase != PlaybackPhase::Playing {
            return;
        }

        self.tracker.stop();
        let position = match self.resource.as_mut() {
            Some(resource) => {
                resource.handle_mut().pause();
                resource.current_position()
            }
            None => self.state.position_seconds,
        };

        if let Some(position) = clamp_position(position, self.state.duration_seconds) {
            self.state.position_seconds = position;
        }
        self.state.is_playing = false;
        self.state.phase = PlaybackPhase::Paused;
        self.publish();
    }

    /// Moves the playhead, clamping into `[0, duration]`
    ///
    /// Returns the applied position, or `None` when there is no open resource
    /// or the offset cannot be placed (NaN). While playing, the sampler's
    /// next tick is rescheduled so it reads the new position.
    pub fn seek(&mut self, offset_seconds: f64) -> Option<f64> {
        if !self.state.has_resource() || self.resource.is_none() {
            log::debug!("seek() ignored while {}", self.state.phase.name());
            return None;
        }
        let Some(target) = clamp_position(offset_seconds, self.state.duration_seconds) else {
            log::warn!("Ignoring seek to {}", offset_seconds);
            return None;
        };

        let resume_phase = match &self.state.phase {
            PlaybackPhase::Ended => match self.state.duration_seconds {
                Some(end) if target < end => PlaybackPhase::Paused,
                _ => PlaybackPhase::Ended,
            },
            other => other.clone(),
        };

        self.state.phase = PlaybackPhase::Seeking;
        self.publish();

        if let Some(resource) = self.resource.as_mut() {
            resource.handle_mut().seek(target);
        }
        self.tracker.reconcile();

        self.state.position_seconds = target;
        self.state.phase = resume_phase;
        self.publish();
        Some(target)
    }

    /// Sets the volume (0-100); out-of-range values are rejected
    pub fn set_volume(&mut self, volume: u8) -> EngineResult<()> {
        if !VOLUME_RANGE.contains(&volume) {
            log::warn!("Rejected volume {}", volume);
            return Err(EngineError::invalid_parameter(
                "volume",
                volume,
                "must be between 0 and 100",
            ));
        }
        if let Some(resource) = self.resource.as_mut() {
            resource.handle_mut().set_volume(volume);
        }
        self.state.volume = volume;
        self.publish();
        Ok(())
    }

    pub fn set_muted(&mut self, muted: bool) {
        if let Some(resource) = self.resource.as_mut() {
            resource.handle_mut().set_muted(muted);
        }
        self.state.muted = muted;
        self.publish();
    }

    /// Sets the playback rate; only configured rates are accepted
    pub fn set_rate(&mut self, rate: f32) -> EngineResult<()> {
        let rate = PlaybackRate::from_allowed(rate, &self.allowed_rates).map_err(|reason| {
            log::warn!("Rejected rate {}", rate);
            EngineError::invalid_parameter("rate", rate, reason)
        })?;
        if let Some(resource) = self.resource.as_mut() {
            resource.handle_mut().set_rate(rate);
        }
        self.state.rate = rate;
        self.publish();
        Ok(())
    }

    /// Loads the next chapter; returns false at the last chapter
    pub fn skip_to_next(&mut self) -> bool {
        self.skip(Direction::Next)
    }

    /// Loads the previous chapter; returns false at the first chapter
    pub fn skip_to_previous(&mut self) -> bool {
        self.skip(Direction::Previous)
    }

    fn skip(&mut self, direction: Direction) -> bool {
        let Some(current) = self.state.chapter_id.clone() else {
            return false;
        };
        let Some(target) = self
            .catalog
            .neighbor(&current, direction)
            .map(|chapter| chapter.id.clone())
        else {
            log::debug!("No chapter {:?} of {}", direction, current);
            return false;
        };

        let autoplay =
            self.state.is_playing || self.pending.as_ref().is_some_and(|p| p.autoplay);
        match self.begin_load(target, None, autoplay) {
            Ok(()) => true,
            Err(e) => {
                log::error!("Skip from {} failed: {}", current, e);
                false
            }
        }
    }

    /// Reads the resource position now, outside the sampler schedule
    fn refresh_position(&mut self) {
        let Some(resource) = self.resource.as_ref() else {
            return;
        };
        if let Some(position) =
            clamp_position(resource.current_position(), self.state.duration_seconds)
        {
            self.state.position_seconds = position;
        }
    }

    /// Sampler tick: republishes the resource position
    ///
    /// Returns false if the sampler was not running.
    pub fn sample_progress(&mut self) -> bool {
        let Some(resource) = self.resource.as_ref() else {
            self.tracker.stop();
            return false;
        };
        let Some(raw) = self.tracker.sample(resource) else {
            return false;
        };

        if let Some(position) = clamp_position(raw, self.state.duration_seconds) {
            if position != self.state.position_seconds {
                self.state.position_seconds = position;
                self.publish();
            }
        }
        true
    }

    /// Snapshots the current chapter and position for a bookmark
    ///
    /// Both fields come from one state value. While playing, the position is
    /// refreshed from the resource first.
    pub fn capture_position(&mut self) -> EngineResult<PositionSnapshot> {
        if !self.state.has_resource() {
            return Err(EngineError::NothingToBookmark(format!(
                "session is {}",
                self.state.phase.name()
            )));
        }
        if self.state.phase == PlaybackPhase::Playing {
            self.refresh_position();
            self.publish();
        }

        let state = &self.state;
        let chapter_id = state
            .chapter_id
            .clone()
            .ok_or_else(|| EngineError::NothingToBookmark("no chapter loaded".to_string()))?;
        Ok(PositionSnapshot {
            audiobook_id: self.catalog.audiobook_id().clone(),
            chapter_id,
            offset_seconds: state.position_seconds,
        })
    }

    /// Stops sampling, closes the resource and returns to Idle
    pub fn teardown(&mut self) {
        self.tracker.stop();
        self.pending = None;
        self.resource = None;
        self.state.chapter_id = None;
        self.state.position_seconds = 0.0;
        self.state.duration_seconds = None;
        self.state.is_playing = false;
        self.state.phase = PlaybackPhase::Idle;
        self.publish();
    }

    fn publish(&mut self) {
        log::debug!(
            "State: {} {:?} @ {:.2}",
            self.state.phase,
            self.state.chapter_id,
            self.state.position_seconds
        );
        let state = &self.state;
        for (_, listener) in self.listeners.iter_mut() {
            listener(state);
        }
    }
}

impl<B: AudioBackend> std::fmt::Debug for PlaybackSession<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaybackSession")
            .field("audiobook", self.catalog.audiobook_id())
            .field("state", &self.state)
            .field("resource", &self.resource)
            .field("pending", &self.pending)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp_position() {
        assert_eq!(clamp_position(-5.0, Some(100.0)), Some(0.0));
        assert_eq!(clamp_position(150.0, Some(100.0)), Some(100.0));
        assert_eq!(clamp_position(42.0, Some(100.0)), Some(42.0));
        assert_eq!(clamp_position(f64::INFINITY, Some(100.0)), Some(100.0));
        assert_eq!(clamp_position(f64::NEG_INFINITY, Some(100.0)), Some(0.0));
        assert_eq!(clamp_position(f64::NAN, Some(100.0)), None);
    }

    #[test]
    fn test_clamp_position_unknown_duration() {
        assert_eq!(clamp_position(500.0, None), Some(500.0));
        assert_eq!(clamp_position(-1.0, None), Some(0.0));
        assert_eq!(clamp_position(f64::INFINITY, None), None);
    }

    #[test]
    fn test_default_settings() {
        let settings = SessionSettings::default();
        assert_eq!(settings.volume, 100);
        assert_eq!(settings.rate, 1.0);
        assert!(settings.allowed_rates.contains(&2.0));
        assert_eq!(settings.sample_interval, Duration::from_secs(1));
    }
}
