// FILE: crates/playback-engine/src/driver.rs
//! Async control surface for a playback session
//!
//! A session is moved into one tokio task that owns it exclusively. Front
//! ends talk to it through a cloneable [`SessionHandle`]; every operation is
//! a command on a channel, so operations from any number of handles are
//! applied strictly one after another.

use crate::bookmarks::{BookmarkStore, PendingId, PositionSnapshot, RefreshTicket, RemoveOutcome};
use crate::catalog::Direction;
use crate::error::{EngineError, EngineResult};
use crate::resource::{AudioBackend, ResourceEventReceiver};
use crate::session::PlaybackSession;
use chaptercast_core::{AppError, Bookmark, BookmarkId, BookmarkRepository, ChapterId, PlaybackState};
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, oneshot};
use tokio::time::{sleep_until, Instant};

const COMMAND_BUFFER: usize = 32;

/// Stream of published states returned by [`SessionHandle::subscribe`]
pub type StateStream = mpsc::UnboundedReceiver<PlaybackState>;

type Reply<T> = oneshot::Sender<T>;

enum SessionCommand {
    Load {
        chapter_id: ChapterId,
        offset: Option<f64>,
        reply: Reply<EngineResult<()>>,
    },
    ResumeBookmark {
        id: BookmarkId,
        reply: Reply<EngineResult<()>>,
    },
    Play(Reply<EngineResult<()>>),
    Pause(Reply<()>),
    Seek {
        offset: f64,
        reply: Reply<Option<f64>>,
    },
    SetVolume {
        volume: u8,
        reply: Reply<EngineResult<()>>,
    },
    SetMuted {
        muted: bool,
        reply: Reply<()>,
    },
    SetRate {
        rate: f32,
        reply: Reply<EngineResult<()>>,
    },
    Skip {
        direction: Direction,
        reply: Reply<bool>,
    },
    CreateBookmark(Reply<EngineResult<Bookmark>>),
    ListBookmarks(Reply<Vec<Bookmark>>),
    RemoveBookmark {
        id: BookmarkId,
        reply: Reply<EngineResult<RemoveOutcome>>,
    },
    RefreshBookmarks(Reply<EngineResult<usize>>),
    State(Reply<PlaybackState>),
    Subscribe(Reply<StateStream>),
    Shutdown(Reply<()>),
}

/// Outcome of a background persistence call, applied back on the loop
enum Settlement {
    Created {
        local_id: PendingId,
        result: Result<Bookmark, AppError>,
        reply: Reply<EngineResult<Bookmark>>,
    },
    Removed {
        id: BookmarkId,
        result: Result<(), AppError>,
        reply: Reply<EngineResult<RemoveOutcome>>,
    },
    Refreshed {
        ticket: RefreshTicket,
        result: Result<Vec<Bookmark>, AppError>,
        reply: Option<Reply<EngineResult<usize>>>,
    },
}

type Subscribers = Arc<Mutex<Vec<mpsc::UnboundedSender<PlaybackState>>>>;

/// Runs a session on its own task
pub struct SessionDriver<B: AudioBackend, R: BookmarkRepository> {
    session: PlaybackSession<B>,
    events: ResourceEventReceiver,
    store: BookmarkStore<R>,
    commands: mpsc::Receiver<SessionCommand>,
    settlements_tx: mpsc::UnboundedSender<Settlement>,
    settlements: mpsc::UnboundedReceiver<Settlement>,
    subscribers: Subscribers,
}

impl<B, R> SessionDriver<B, R>
where
    B: AudioBackend,
    R: BookmarkRepository + Clone + 'static,
{
    /// Moves the session onto a new task and returns its control handle
    ///
    /// Must be called within a tokio runtime. Stored bookmarks are loaded
    /// in the background right away.
    pub fn spawn(
        mut session: PlaybackSession<B>,
        events: ResourceEventReceiver,
        store: BookmarkStore<R>,
    ) -> SessionHandle {
        let (commands_tx, commands) = mpsc::channel(COMMAND_BUFFER);
        let (settlements_tx, settlements) = mpsc::unbounded_channel();

        let subscribers: Subscribers = Arc::new(Mutex::new(Vec::new()));
        let forward = Arc::clone(&subscribers);
        session.subscribe(move |state| {
            let mut senders = forward.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            senders.retain(|tx| tx.send(state.clone()).is_ok());
        });

        let mut driver = Self {
            session,
            events,
            store,
            commands,
            settlements_tx,
            settlements,
            subscribers,
        };
        driver.spawn_refresh(None);

        log::info!(
            "Session started for {}",
            driver.session.catalog().audiobook_id()
        );
        tokio::spawn(driver.run());

        SessionHandle {
            commands: commands_tx,
        }
    }

    async fn run(mut self) {
        let mut shutdown_reply = None;

        loop {
            let due = self.session.next_sample_due();
            tokio::select! {
                biased;

                command = self.commands.recv() => match command {
                    Some(SessionCommand::Shutdown(reply)) => {
                        shutdown_reply = Some(reply);
                        break;
                    }
                    Some(command) => self.handle_command(command),
                    None => {
                        log::debug!("All session handles dropped");
                        break;
                    }
                },
                Some(event) = self.events.recv() => self.session.handle_event(event),
                Some(settlement) = self.settlements.recv() => self.settle(settlement),
                _ = sleep_until(due.unwrap_or_else(Instant::now)), if due.is_some() => {
                    self.session.sample_progress();
                }
            }
        }

        self.session.teardown();
        self.subscribers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clear();
        log::info!(
            "Session for {} shut down",
            self.session.catalog().audiobook_id()
        );

        if let Some(reply) = shutdown_reply {
            let _ = reply.send(());
        }
    }

    fn handle_command(&mut self, command: SessionCommand) {
        match command {
            SessionCommand::Load {
                chapter_id,
                offset,
                reply,
            } => {
                let result = match offset {
                    Some(offset) => self.session.load_at(&chapter_id, offset),
                    None => self.session.load(&chapter_id),
                };
                let _ = reply.send(result);
            }
            SessionCommand::ResumeBookmark { id, reply } => {
                let result = match self.store.get(id).cloned() {
                    Some(bookmark) => self.session.resume_bookmark(&bookmark),
                    None => Err(EngineError::NotFound(id)),
                };
                let _ = reply.send(result);
            }
            SessionCommand::Play(reply) => {
                let _ = reply.send(self.session.play());
            }
            SessionCommand::Pause(reply) => {
                self.session.pause();
                let _ = reply.send(());
            }
            SessionCommand::Seek { offset, reply } => {
                let _ = reply.send(self.session.seek(offset));
            }
            SessionCommand::SetVolume { volume, reply } => {
                let _ = reply.send(self.session.set_volume(volume));
            }
            SessionCommand::SetMuted { muted, reply } => {
                self.session.set_muted(muted);
                let _ = reply.send(());
            }
            SessionCommand::SetRate { rate, reply } => {
                let _ = reply.send(self.session.set_rate(rate));
            }
            SessionCommand::Skip { direction, reply } => {
                let moved = match direction {
                    Direction::Next => self.session.skip_to_next(),
                    Direction::Previous => self.session.skip_to_previous(),
                };
                let _ = reply.send(moved);
            }
            SessionCommand::CreateBookmark(reply) => self.create_bookmark(reply),
            SessionCommand::ListBookmarks(reply) => {
                let _ = reply.send(self.store.list());
            }
            SessionCommand::RemoveBookmark { id, reply } => self.remove_bookmark(id, reply),
            SessionCommand::RefreshBookmarks(reply) => self.spawn_refresh(Some(reply)),
            SessionCommand::State(reply) => {
                let _ = reply.send(self.session.state().clone());
            }
            SessionCommand::Subscribe(reply) => {
                let (tx, rx) = mpsc::unbounded_channel();
                if tx.send(self.session.state().clone()).is_ok() {
                    self.subscribers
                        .lock()
                        .unwrap_or_else(|poisoned| poisoned.into_inner())
                        .push(tx);
                }
                let _ = reply.send(rx);
            }
            SessionCommand::Shutdown(reply) => {
                let _ = reply.send(());
            }
        }
    }

    /// Snapshots now, persists in the background
    fn create_bookmark(&mut self, reply: Reply<EngineResult<Bookmark>>) {
        let snapshot: PositionSnapshot = match self.session.capture_position() {
            Ok(snapshot) => snapshot,
            Err(e) => {
                let _ = reply.send(Err(e));
                return;
            }
        };
        let local_id = match self.store.begin_create(&snapshot) {
            Ok(local_id) => local_id,
            Err(e) => {
                let _ = reply.send(Err(e));
                return;
            }
        };

        let repository = self.store.repository().clone();
        let settlements = self.settlements_tx.clone();
        tokio::spawn(async move {
            let result = repository
                .create_bookmark(
                    &snapshot.audiobook_id,
                    &snapshot.chapter_id,
                    snapshot.offset_seconds,
                )
                .await;
            let _ = settlements.send(Settlement::Created {
                local_id,
                result,
                reply,
            });
        });
    }

    fn remove_bookmark(&mut self, id: BookmarkId, reply: Reply<EngineResult<RemoveOutcome>>) {
        if !self.store.begin_remove(id) {
            log::debug!("Bookmark {} not held locally, asking storage anyway", id);
        }

        let repository = self.store.repository().clone();
        let settlements = self.settlements_tx.clone();
        tokio::spawn(async move {
            let result = repository.delete_bookmark(id).await;
            let _ = settlements.send(Settlement::Removed { id, result, reply });
        });
    }

    fn spawn_refresh(&mut self, reply: Option<Reply<EngineResult<usize>>>) {
        let repository = self.store.repository().clone();
        let audiobook_id = self.store.audiobook_id().clone();
        let settlements = self.settlements_tx.clone();
        let ticket = self.store.begin_refresh();
        tokio::spawn(async move {
            let result = repository.list_bookmarks(&audiobook_id).await;
            let _ = settlements.send(Settlement::Refreshed {
                ticket,
                result,
                reply,
            });
        });
    }

    fn settle(&mut self, settlement: Settlement) {
        match settlement {
            Settlement::Created {
                local_id,
                result,
                reply,
            } => {
                let _ = reply.send(self.store.settle_create(local_id, result));
            }
            Settlement::Removed { id, result, reply } => {
                let _ = reply.send(self.store.settle_remove(id, result));
            }
            Settlement::Refreshed {
                ticket,
                result,
                reply,
            } => {
                let outcome = self.store.settle_refresh(ticket, result);
                match reply {
                    Some(reply) => {
                        let _ = reply.send(outcome);
                    }
                    None => {
                        if let Err(e) = outcome {
                            log::warn!("Could not load stored bookmarks: {}", e);
                        }
                    }
                }
            }
        }
    }
}

/// Cloneable handle to a running session
///
/// Every method fails with [`EngineError::SessionClosed`] once the session
/// task has stopped.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    commands: mpsc::Sender<SessionCommand>,
}

impl SessionHandle {
    async fn request<T>(
        &self,
        build: impl FnOnce(Reply<T>) -> SessionCommand,
    ) -> EngineResult<T> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(build(reply))
            .await
            .map_err(|_| EngineError::SessionClosed)?;
        response.await.map_err(|_| EngineError::SessionClosed)
    }

    pub async fn load(&self, chapter_id: ChapterId) -> EngineResult<()> {
        self.request(|reply| SessionCommand::Load {
            chapter_id,
            offset: None,
            reply,
        })
        .await?
    }

    pub async fn load_at(&self, chapter_id: ChapterId, offset_seconds: f64) -> EngineResult<()> {
        self.request(|reply| SessionCommand::Load {
            chapter_id,
            offset: Some(offset_seconds),
            reply,
        })
        .await?
    }

    /// Loads the chapter of a stored bookmark at its offset
    pub async fn resume_bookmark(&self, id: BookmarkId) -> EngineResult<()> {
        self.request(|reply| SessionCommand::ResumeBookmark { id, reply })
            .await?
    }

    pub async fn play(&self) -> EngineResult<()> {
        self.request(SessionCommand::Play).await?
    }

    pub async fn pause(&self) -> EngineResult<()> {
        self.request(SessionCommand::Pause).await
    }

    /// Returns the clamped position applied, or `None` if nothing is loaded
    pub async fn seek(&self, offset_seconds: f64) -> EngineResult<Option<f64>> {
        self.request(|reply| SessionCommand::Seek {
            offset: offset_seconds,
            reply,
        })
        .await
    }

    pub async fn set_volume(&self, volume: u8) -> EngineResult<()> {
        self.request(|reply| SessionCommand::SetVolume { volume, reply })
            .await?
    }

    pub async fn set_muted(&self, muted: bool) -> EngineResult<()> {
        self.request(|reply| SessionCommand::SetMuted { muted, reply })
            .await
    }

    pub async fn set_rate(&self, rate: f32) -> EngineResult<()> {
        self.request(|reply| SessionCommand::SetRate { rate, reply })
            .await?
    }

    pub async fn skip_to_next(&self) -> EngineResult<bool> {
        self.request(|reply| SessionCommand::Skip {
            direction: Direction::Next,
            reply,
        })
        .await
    }

    pub async fn skip_to_previous(&self) -> EngineResult<bool> {
        self.request(|reply| SessionCommand::Skip {
            direction: Direction::Previous,
            reply,
        })
        .await
    }

    /// Bookmarks the current chapter and position
    ///
    /// The position is captured when the command is applied; later
    /// commands cannot change it while it is being stored.
    pub async fn bookmark_current_position(&self) -> EngineResult<Bookmark> {
        self.request(SessionCommand::CreateBookmark).await?
    }

    /// Confirmed bookmarks, newest first
    pub async fn bookmarks(&self) -> EngineResult<Vec<Bookmark>> {
        self.request(SessionCommand::ListBookmarks).await
    }

    pub async fn remove_bookmark(&self, id: BookmarkId) -> EngineResult<RemoveOutcome> {
        self.request(|reply| SessionCommand::RemoveBookmark { id, reply })
            .await?
    }

    pub async fn refresh_bookmarks(&self) -> EngineResult<usize> {
        self.request(SessionCommand::RefreshBookmarks).await?
    }

    pub async fn state(&self) -> EngineResult<PlaybackState> {
        self.request(SessionCommand::State).await
    }

    /// Receives the current state, then every published state
    pub async fn subscribe(&self) -> EngineResult<StateStream> {
        self.request(SessionCommand::Subscribe).await
    }

    /// Stops the session task, closing any open resource
    ///
    /// Shutting down an already stopped session succeeds.
    pub async fn shutdown(&self) -> EngineResult<()> {
        match self.request(SessionCommand::Shutdown).await {
            Err(EngineError::SessionClosed) => Ok(()),
            other => other,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.commands.is_closed()
    }
}

impl std::fmt::Debug for SessionCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Load { .. } => "Load",
            Self::ResumeBookmark { .. } => "ResumeBookmark",
            Self::Play(_) => "Play",
            Self::Pause(_) => "Pause",
            Self::Seek { .. } => "Seek",
            Self::SetVolume { .. } => "SetVolume",
            Self::SetMuted { .. } => "SetMuted",
            Self::SetRate { .. } => "SetRate",
            Self::Skip { .. } => "Skip",
            Self::CreateBookmark(_) => "CreateBookmark",
            Self::ListBookmarks(_) => "ListBookmarks",
            Self::RemoveBookmark { .. } => "RemoveBookmark",
            Self::RefreshBookmarks(_) => "RefreshBookmarks",
            Self::State(_) => "State",
            Self::Subscribe(_) => "Subscribe",
            Self::Shutdown(_) => "Shutdown",
        };
        f.write_str(name)
    }
}
