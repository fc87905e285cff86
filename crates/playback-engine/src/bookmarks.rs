// FILE: crates/playback-engine/src/bookmarks.rs
//! Bookmark list for the open audiobook with two-phase persistence
//!
//! Every mutation is applied locally first and then settled against the
//! backend's answer: confirmed, or rolled back.

use crate::error::{EngineError, EngineResult};
use chaptercast_core::{
    AppError, AudiobookId, Bookmark, BookmarkId, BookmarkRepository, ChapterId, Timestamp,
};
use serde::Serialize;
use std::collections::{HashMap, HashSet};

/// Chapter and offset read from one consistent playback state
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PositionSnapshot {
    pub audiobook_id: AudiobookId,
    pub chapter_id: ChapterId,
    pub offset_seconds: f64,
}

/// Local handle for a bookmark whose creation has not settled yet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PendingId(u64);

/// A bookmark shown before the backend confirmed it
#[derive(Debug, Clone, PartialEq)]
pub struct PendingBookmark {
    pub local_id: PendingId,
    pub chapter_id: ChapterId,
    pub offset_seconds: f64,
    pub requested_at: Timestamp,
}

/// One row of the local bookmark list
#[derive(Debug, Clone, PartialEq)]
pub enum BookmarkEntry {
    Confirmed(Bookmark),
    /// Created locally, waiting for the backend
    Pending(PendingBookmark),
    /// Removal requested, waiting for the backend
    Removing(Bookmark),
}

impl BookmarkEntry {
    pub fn is_pending(&self) -> bool {
        !matches!(self, Self::Confirmed(_))
    }

    fn bookmark_id(&self) -> Option<BookmarkId> {
        match self {
            Self::Confirmed(b) | Self::Removing(b) => Some(b.id),
            Self::Pending(_) => None,
        }
    }
}

/// Marks the point at which a backend listing was requested
///
/// Local settlements that happen after this point win over the listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use = "the ticket must be passed to settle_refresh"]
pub struct RefreshTicket {
    generation: u64,
}

/// Result of a removal that did not fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoveOutcome {
    Removed,
    /// The backend had no such bookmark; nothing to remove
    NotFound,
}

/// Bookmarks of one audiobook, backed by a [`BookmarkRepository`]
pub struct BookmarkStore<R: BookmarkRepository> {
    audiobook_id: AudiobookId,
    repository: R,
    entries: Vec<BookmarkEntry>,
    next_pending: u64,
    /// Bumped by every settled create or removal
    generation: u64,
    /// Generation at which each bookmark was last settled locally
    settled_at: HashMap<BookmarkId, u64>,
    refreshes_in_flight: usize,
}

impl<R: BookmarkRepository> BookmarkStore<R> {
    pub fn new(audiobook_id: AudiobookId, repository: R) -> Self {
        Self {
            audiobook_id,
            repository,
            entries: Vec::new(),
            next_pending: 0,
            generation: 0,
            settled_at: HashMap::new(),
            refreshes_in_flight: 0,
        }
    }

    pub fn audiobook_id(&self) -> &AudiobookId {
        &self.audiobook_id
    }

    pub fn repository(&self) -> &R {
        &self.repository
    }

    /// Confirmed bookmarks, newest first
    ///
    /// Bookmarks with equal timestamps are ordered by arrival, latest first.
    pub fn list(&self) -> Vec<Bookmark> {
        let mut confirmed: Vec<Bookmark> = self
            .entries
            .iter()
            .rev()
            .filter_map(|entry| match entry {
                BookmarkEntry::Confirmed(bookmark) => Some(bookmark.clone()),
                _ => None,
            })
            .collect();
        confirmed.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        confirmed
    }

    /// Every local entry including unsettled ones, in arrival order
    pub fn entries(&self) -> &[BookmarkEntry] {
        &self.entries
    }

    pub fn get(&self, id: BookmarkId) -> Option<&Bookmark> {
        self.entries.iter().find_map(|entry| match entry {
            BookmarkEntry::Confirmed(bookmark) if bookmark.id == id => Some(bookmark),
            _ => None,
        })
    }

    /// Number of unsettled entries
    pub fn pending_count(&self) -> usize {
        self.entries.iter().filter(|e| e.is_pending()).count()
    }

    fn record_settled(&mut self, id: BookmarkId) {
        self.generation += 1;
        if self.refreshes_in_flight > 0 {
            self.settled_at.insert(id, self.generation);
        }
    }

    fn settled_after(&self, id: BookmarkId, ticket: RefreshTicket) -> bool {
        self.settled_at
            .get(&id)
            .is_some_and(|generation| *generation > ticket.generation)
    }

    /// Records a local create intent for a snapshot
    pub fn begin_create(&mut self, snapshot: &PositionSnapshot) -> EngineResult<PendingId> {
        if snapshot.audiobook_id != self.audiobook_id {
            return Err(EngineError::invalid_parameter(
                "snapshot",
                &snapshot.audiobook_id,
                format!("store holds bookmarks of {}", self.audiobook_id),
            ));
        }
        if !snapshot.offset_seconds.is_finite() || snapshot.offset_seconds < 0.0 {
            return Err(EngineError::invalid_parameter(
                "offset",
                snapshot.offset_seconds,
                "must be a non-negative number",
            ));
        }

        self.next_pending += 1;
        let local_id = PendingId(self.next_pending);
        self.entries.push(BookmarkEntry::Pending(PendingBookmark {
            local_id,
            chapter_id: snapshot.chapter_id.clone(),
            offset_seconds: snapshot.offset_seconds,
            requested_at: Timestamp::now(),
        }));
        Ok(local_id)
    }

    /// Applies the backend's answer to a pending create
    ///
    /// On success the pending entry is replaced in place by the stored
    /// bookmark; on failure it is dropped and the error is returned.
    pub fn settle_create(
        &mut self,
        local_id: PendingId,
        result: Result<Bookmark, AppError>,
    ) -> EngineResult<Bookmark> {
        let index = self.entries.iter().position(|entry| {
            matches!(entry, BookmarkEntry::Pending(p) if p.local_id == local_id)
        });

        match result {
            Ok(bookmark) => {
                log::info!("Bookmark {} saved ({})", bookmark.id, bookmark.display_string());
                let known = self
                    .entries
                    .iter()
                    .any(|entry| entry.bookmark_id() == Some(bookmark.id));
                let entry = BookmarkEntry::Confirmed(bookmark.clone());
                match (index, known) {
                    // A listing already delivered it; keep that entry only.
                    (Some(i), true) => {
                        self.entries.remove(i);
                    }
                    (Some(i), false) => self.entries[i] = entry,
                    (None, false) => self.entries.push(entry),
                    (None, true) => {}
                }
                self.record_settled(bookmark.id);
                Ok(bookmark)
            }
            Err(e) => {
                log::warn!("Rolling back bookmark {:?}: {}", local_id, e);
                if let Some(i) = index {
                    self.entries.remove(i);
                }
                Err(EngineError::Storage(e))
            }
        }
    }

    /// Marks a bookmark as being removed; it leaves `list()` immediately
    ///
    /// Returns false if the bookmark is not known locally. The backend may
    /// still hold it, so the removal should be sent either way.
    pub fn begin_remove(&mut self, id: BookmarkId) -> bool {
        for entry in self.entries.iter_mut() {
            if let BookmarkEntry::Confirmed(bookmark) = entry {
                if bookmark.id == id {
                    *entry = BookmarkEntry::Removing(bookmark.clone());
                    return true;
                }
            }
        }
        false
    }

    /// Applies the backend's answer to a removal
    ///
    /// A backend NotFound counts as already removed. Other failures restore
    /// the bookmark.
    pub fn settle_remove(
        &mut self,
        id: BookmarkId,
        result: Result<(), AppError>,
    ) -> EngineResult<RemoveOutcome> {
        match result {
            Ok(()) => {
                self.entries.retain(|entry| entry.bookmark_id() != Some(id));
                self.record_settled(id);
                log::info!("Bookmark {} removed", id);
                Ok(RemoveOutcome::Removed)
            }
            Err(e) if e.is_not_found() => {
                self.entries.retain(|entry| entry.bookmark_id() != Some(id));
                self.record_settled(id);
                log::debug!("Bookmark {} was already gone", id);
                Ok(RemoveOutcome::NotFound)
            }
            Err(e) => {
                log::warn!("Restoring bookmark {} after failed removal: {}", id, e);
                for entry in self.entries.iter_mut() {
                    if let BookmarkEntry::Removing(bookmark) = entry {
                        if bookmark.id == id {
                            *entry = BookmarkEntry::Confirmed(bookmark.clone());
                        }
                    }
                }
                Err(EngineError::Storage(e))
            }
        }
    }

    /// Creates and persists a bookmark for a snapshot
    pub async fn create(&mut self, snapshot: &PositionSnapshot) -> EngineResult<Bookmark> {
        let local_id = self.begin_create(snapshot)?;
        let result = self
            .repository
            .create_bookmark(&snapshot.audiobook_id, &snapshot.chapter_id, snapshot.offset_seconds)
            .await;
        self.settle_create(local_id, result)
    }

    /// Removes a bookmark; removing an unknown id reports `NotFound`
    pub async fn remove(&mut self, id: BookmarkId) -> EngineResult<RemoveOutcome> {
        self.begin_remove(id);
        let result = self.repository.delete_bookmark(id).await;
        self.settle_remove(id, result)
    }

    /// Starts a backend listing; pass the ticket to [`Self::settle_refresh`]
    pub fn begin_refresh(&mut self) -> RefreshTicket {
        self.refreshes_in_flight += 1;
        RefreshTicket {
            generation: self.generation,
        }
    }

    /// Merges a backend listing requested under `ticket`
    ///
    /// Bookmarks created or removed locally after the ticket was issued keep
    /// their local state; everything else follows the listing. Unsettled
    /// entries are kept. On failure the local list is unchanged.
    pub fn settle_refresh(
        &mut self,
        ticket: RefreshTicket,
        result: Result<Vec<Bookmark>, AppError>,
    ) -> EngineResult<usize> {
        self.refreshes_in_flight = self.refreshes_in_flight.saturating_sub(1);
        let outcome = result.map(|stored| self.merge_listing(ticket, stored));
        if self.refreshes_in_flight == 0 {
            self.settled_at.clear();
        }
        let count = outcome?;

        log::debug!("Loaded {} bookmark(s) for {}", count, self.audiobook_id);
        Ok(count)
    }

    fn merge_listing(&mut self, ticket: RefreshTicket, mut stored: Vec<Bookmark>) -> usize {
        // Backend order is newest first; entries are kept in arrival order.
        stored.reverse();
        let count = stored.len();

        let mut listed: HashSet<BookmarkId> = stored.iter().map(|b| b.id).collect();
        let local = std::mem::take(&mut self.entries);

        let mut kept = Vec::with_capacity(local.len());
        for entry in local {
            match entry {
                BookmarkEntry::Confirmed(bookmark) => {
                    let in_listing = listed.remove(&bookmark.id);
                    if in_listing || self.settled_after(bookmark.id, ticket) {
                        kept.push(BookmarkEntry::Confirmed(bookmark));
                    } else {
                        log::debug!("Bookmark {} no longer stored", bookmark.id);
                    }
                }
                BookmarkEntry::Removing(bookmark) => {
                    listed.remove(&bookmark.id);
                    kept.push(BookmarkEntry::Removing(bookmark));
                }
                pending @ BookmarkEntry::Pending(_) => kept.push(pending),
            }
        }

        let mut merged: Vec<BookmarkEntry> = stored
            .into_iter()
            .filter(|b| listed.contains(&b.id) && !self.settled_after(b.id, ticket))
            .map(BookmarkEntry::Confirmed)
            .collect();
        merged.extend(kept);
        self.entries = merged;
        count
    }

    /// Reloads confirmed bookmarks from the backend
    pub async fn refresh(&mut self) -> EngineResult<usize> {
        let ticket = self.begin_refresh();
        let result = self.repository.list_bookmarks(&self.audiobook_id).await;
        self.settle_refresh(ticket, result)
    }
}

impl<R: BookmarkRepository> std::fmt::Debug for BookmarkStore<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BookmarkStore")
            .field("audiobook_id", &self.audiobook_id)
            .field("entries", &self.entries)
            .finish_non_exhaustive()
    }
}
