// FILE: crates/playback-engine/src/resource.rs
//! Audio resource primitives and the owning wrapper around an open handle

use chaptercast_core::{ChapterId, PlaybackRate, SourceRef};
use std::fmt;
use tokio::sync::mpsc;

/// Identifies one `load()` request
///
/// Tokens increase monotonically per session. Every resource event carries
/// the token of the load that produced it, so completions of superseded
/// loads can be recognised and dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LoadToken(u64);

impl LoadToken {
    pub(crate) fn first() -> Self {
        Self(1)
    }

    pub(crate) fn next(self) -> Self {
        Self(self.0 + 1)
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for LoadToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Failure reported synchronously by a handle operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceFault {
    /// The platform needs a user gesture before audio may start
    Blocked(String),
    /// The resource is no longer usable
    Failed(String),
}

impl fmt::Display for ResourceFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Blocked(reason) => write!(f, "blocked: {}", reason),
            Self::Failed(reason) => write!(f, "failed: {}", reason),
        }
    }
}

/// An open platform audio handle
///
/// Positions and durations are in seconds. `current_position` and
/// `duration` may be queried any time after the open succeeded.
pub trait AudioHandle: Send {
    fn play(&mut self) -> Result<(), ResourceFault>;
    fn pause(&mut self);
    fn seek(&mut self, offset_seconds: f64);
    fn set_volume(&mut self, volume: u8);
    fn set_muted(&mut self, muted: bool);
    fn set_rate(&mut self, rate: PlaybackRate);
    fn current_position(&self) -> f64;
    fn duration(&self) -> Option<f64>;

    /// Releases the platform resource; called exactly once
    fn close(&mut self) {}
}

/// Opens audio handles
pub trait AudioBackend: Send + 'static {
    /// Starts opening `source`
    ///
    /// The outcome, and every later signal of the opened handle, must be
    /// reported through `events`. Opening may complete synchronously
    /// (before this call returns) or at any later time.
    fn open(&mut self, source: &SourceRef, events: ResourceEvents);
}

/// What happened to a resource
pub enum ResourceEventKind {
    Opened(Box<dyn AudioHandle>),
    Ended,
    Failed(String),
}

impl fmt::Debug for ResourceEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Opened(_) => f.write_str("Opened"),
            Self::Ended => f.write_str("Ended"),
            Self::Failed(reason) => f.debug_tuple("Failed").field(reason).finish(),
        }
    }
}

/// A resource signal tagged with the load that produced it
#[derive(Debug)]
pub struct ResourceEvent {
    pub token: LoadToken,
    pub kind: ResourceEventKind,
}

/// Receiving side of a session's resource events
pub type ResourceEventReceiver = mpsc::UnboundedReceiver<ResourceEvent>;

/// Per-load listener handed to the backend
///
/// Scoped to one session and one load request. Sending after the session
/// is gone is silently ignored.
#[derive(Debug, Clone)]
pub struct ResourceEvents {
    token: LoadToken,
    tx: mpsc::UnboundedSender<ResourceEvent>,
}

impl ResourceEvents {
    pub(crate) fn new(token: LoadToken, tx: mpsc::UnboundedSender<ResourceEvent>) -> Self {
        Self { token, tx }
    }

    pub fn token(&self) -> LoadToken {
        self.token
    }

    /// Reports a successful open
    pub fn opened(&self, handle: Box<dyn AudioHandle>) {
        self.send(ResourceEventKind::Opened(handle));
    }

    /// Reports that the resource played to its natural end
    pub fn ended(&self) {
        self.send(ResourceEventKind::Ended);
    }

    /// Reports an open failure or a failure of an open resource
    pub fn failed(&self, reason: impl Into<String>) {
        self.send(ResourceEventKind::Failed(reason.into()));
    }

    fn send(&self, kind: ResourceEventKind) {
        if self
            .tx
            .send(ResourceEvent {
                token: self.token,
                kind,
            })
            .is_err()
        {
            log::debug!("Resource event for load {} dropped: session gone", self.token);
        }
    }
}

/// Exclusive owner of one open audio handle
///
/// The handle is closed when the wrapper is dropped, so replacing or
/// clearing the session's resource always releases the previous one.
pub struct PlaybackResource {
    token: LoadToken,
    chapter_id: ChapterId,
    handle: Box<dyn AudioHandle>,
}

impl PlaybackResource {
    pub(crate) fn new(token: LoadToken, chapter_id: ChapterId, handle: Box<dyn AudioHandle>) -> Self {
        Self {
            token,
            chapter_id,
            handle,
        }
    }

    pub fn token(&self) -> LoadToken {
        self.token
    }

    pub fn chapter_id(&self) -> &ChapterId {
        &self.chapter_id
    }

    pub fn current_position(&self) -> f64 {
        self.handle.current_position()
    }

    pub fn duration(&self) -> Option<f64> {
        self.handle.duration()
    }

    pub(crate) fn handle_mut(&mut self) -> &mut dyn AudioHandle {
        self.handle.as_mut()
    }
}

impl fmt::Debug for PlaybackResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlaybackResource")
            .field("token", &self.token)
            .field("chapter_id", &self.chapter_id)
            .finish_non_exhaustive()
    }
}

impl Drop for PlaybackResource {
    fn drop(&mut self) {
        log::debug!(
            "Closing resource {} for chapter {}",
            self.token,
            self.chapter_id
        );
        self.handle.close();
    }
}
