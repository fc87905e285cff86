// crates/playback-engine/tests/common/mod.rs
//! Shared test doubles for the session integration tests

#![allow(dead_code)]

use chaptercast_core::{
    Audiobook, AudiobookId, Bookmark, BookmarkId, BookmarkRepository, Chapter, ChapterId,
    PlaybackRate, SourceRef,
};
use playback_engine::{
    AudioBackend, AudioHandle, ChapterCatalog, InMemoryBookmarkRepository, PlaybackSession,
    ResourceEventReceiver, ResourceEvents, ResourceFault, SessionSettings,
};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// Observable state of one fake handle
#[derive(Debug, Default)]
pub struct HandleState {
    pub position: f64,
    pub duration: Option<f64>,
    pub playing: bool,
    pub volume: Option<u8>,
    pub muted: Option<bool>,
    pub rate: Option<f32>,
    pub seeks: Vec<f64>,
    pub closed: bool,
    pub play_fault: Option<ResourceFault>,
}

/// Test-side control over a handle the session owns
#[derive(Debug, Clone, Default)]
pub struct HandleProbe(Arc<Mutex<HandleState>>);

impl HandleProbe {
    pub fn with_duration(duration: Option<f64>) -> Self {
        let probe = Self::default();
        probe.state().duration = duration;
        probe
    }

    pub fn state(&self) -> MutexGuard<'_, HandleState> {
        self.0.lock().unwrap()
    }

    /// Moves the playhead as if audio had been playing
    pub fn set_position(&self, seconds: f64) {
        self.state().position = seconds;
    }

    pub fn fail_next_play(&self, fault: ResourceFault) {
        self.state().play_fault = Some(fault);
    }

    pub fn is_closed(&self) -> bool {
        self.state().closed
    }

    pub fn handle(&self) -> Box<dyn AudioHandle> {
        Box::new(FakeHandle(self.clone()))
    }
}

pub struct FakeHandle(HandleProbe);

impl AudioHandle for FakeHandle {
    fn play(&mut self) -> Result<(), ResourceFault> {
        let mut state = self.0.state();
        if let Some(fault) = state.play_fault.take() {
            return Err(fault);
        }
        state.playing = true;
        Ok(())
    }

    fn pause(&mut self) {
        self.0.state().playing = false;
    }

    fn seek(&mut self, offset_seconds: f64) {
        let mut state = self.0.state();
        state.position = offset_seconds;
        state.seeks.push(offset_seconds);
    }

    fn set_volume(&mut self, volume: u8) {
        self.0.state().volume = Some(volume);
    }

    fn set_muted(&mut self, muted: bool) {
        self.0.state().muted = Some(muted);
    }

    fn set_rate(&mut self, rate: PlaybackRate) {
        self.0.state().rate = Some(rate.value());
    }

    fn current_position(&self) -> f64 {
        self.0.state().position
    }

    fn duration(&self) -> Option<f64> {
        self.0.state().duration
    }

    fn close(&mut self) {
        let mut state = self.0.state();
        state.closed = true;
        state.playing = false;
    }
}

/// Backend that records open requests and lets the test answer them
#[derive(Clone, Default)]
pub struct ScriptedBackend {
    requests: Arc<Mutex<Vec<(SourceRef, ResourceEvents)>>>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    /// Source and listener of the n-th open request
    pub fn request(&self, index: usize) -> (SourceRef, ResourceEvents) {
        self.requests.lock().unwrap()[index].clone()
    }

    /// Listener of the most recent open request
    pub fn last(&self) -> ResourceEvents {
        let requests = self.requests.lock().unwrap();
        requests.last().expect("no open request").1.clone()
    }

    pub fn last_source(&self) -> SourceRef {
        let requests = self.requests.lock().unwrap();
        requests.last().expect("no open request").0.clone()
    }
}

impl AudioBackend for ScriptedBackend {
    fn open(&mut self, source: &SourceRef, events: ResourceEvents) {
        self.requests.lock().unwrap().push((source.clone(), events));
    }
}

/// Ch1 (100s), Ch2 (200s)
pub fn two_chapter_catalog() -> Arc<ChapterCatalog> {
    let book = Audiobook::new("book-1", "Two Chapters")
        .with_chapter(Chapter::new("Ch1", "One", "ch1.mp3", 1).with_duration(100.0))
        .with_chapter(Chapter::new("Ch2", "Two", "ch2.mp3", 2).with_duration(200.0));
    Arc::new(ChapterCatalog::from_audiobook(book).unwrap())
}

/// Three chapters without known durations
pub fn unknown_duration_catalog() -> Arc<ChapterCatalog> {
    let book = Audiobook::new("book-2", "Unknown Lengths")
        .with_chapter(Chapter::new("a", "A", "a.mp3", 1))
        .with_chapter(Chapter::new("b", "B", "b.mp3", 2))
        .with_chapter(Chapter::new("c", "C", "c.mp3", 3));
    Arc::new(ChapterCatalog::from_audiobook(book).unwrap())
}

pub fn new_session(
    catalog: Arc<ChapterCatalog>,
) -> (PlaybackSession<ScriptedBackend>, ResourceEventReceiver, ScriptedBackend) {
    let backend = ScriptedBackend::new();
    let (session, events) =
        PlaybackSession::new(catalog, backend.clone(), SessionSettings::default()).unwrap();
    (session, events, backend)
}

/// Feeds every queued resource event into the session
pub fn pump(session: &mut PlaybackSession<ScriptedBackend>, events: &mut ResourceEventReceiver) {
    while let Ok(event) = events.try_recv() {
        session.handle_event(event);
    }
}

/// Completes the most recent open with a fresh handle and returns its probe
pub fn complete_open(
    session: &mut PlaybackSession<ScriptedBackend>,
    events: &mut ResourceEventReceiver,
    backend: &ScriptedBackend,
    duration: Option<f64>,
) -> HandleProbe {
    let probe = HandleProbe::with_duration(duration);
    backend.last().opened(probe.handle());
    pump(session, events);
    probe
}

/// Repository that applies writes and reads at once but answers late
///
/// Lets a test hold a listing or a create acknowledgement in flight while
/// other commands settle.
#[derive(Debug, Clone, Default)]
pub struct DelayedRepository {
    inner: InMemoryBookmarkRepository,
    list_delay: Duration,
    create_delay: Duration,
}

impl DelayedRepository {
    pub fn new(inner: InMemoryBookmarkRepository) -> Self {
        Self {
            inner,
            ..Default::default()
        }
    }

    pub fn with_list_delay(mut self, delay: Duration) -> Self {
        self.list_delay = delay;
        self
    }

    pub fn with_create_delay(mut self, delay: Duration) -> Self {
        self.create_delay = delay;
        self
    }
}

impl BookmarkRepository for DelayedRepository {
    async fn create_bookmark(
        &self,
        audiobook_id: &AudiobookId,
        chapter_id: &ChapterId,
        offset_seconds: f64,
    ) -> chaptercast_core::Result<Bookmark> {
        let stored = self
            .inner
            .create_bookmark(audiobook_id, chapter_id, offset_seconds)
            .await;
        tokio::time::sleep(self.create_delay).await;
        stored
    }

    async fn list_bookmarks(
        &self,
        audiobook_id: &AudiobookId,
    ) -> chaptercast_core::Result<Vec<Bookmark>> {
        let listing = self.inner.list_bookmarks(audiobook_id).await;
        tokio::time::sleep(self.list_delay).await;
        listing
    }

    async fn delete_bookmark(&self, id: BookmarkId) -> chaptercast_core::Result<()> {
        self.inner.delete_bookmark(id).await
    }
}
