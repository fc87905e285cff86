//! Bookmark domain model

use crate::types::{format_seconds, AudiobookId, ChapterId, Timestamp, Validator};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a bookmark
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BookmarkId(Uuid);

impl BookmarkId {
    /// Creates a new random BookmarkId
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a BookmarkId from a UUID string
    pub fn from_string(s: &str) -> Result<Self, uuid::Error> {
        Ok(Self(Uuid::parse_str(s)?))
    }

    /// Returns the BookmarkId as a string
    pub fn as_string(&self) -> String {
        self.0.to_string()
    }
}

impl Default for BookmarkId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for BookmarkId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A persisted (chapter, offset) marker inside an audiobook
///
/// Bookmarks are immutable once created; the only lifecycle operation after
/// creation is deletion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bookmark {
    pub id: BookmarkId,
    pub audiobook_id: AudiobookId,
    pub chapter_id: ChapterId,
    pub offset_seconds: f64,
    pub created_at: Timestamp,
}

impl Bookmark {
    /// Creates a new bookmark stamped with the current time
    pub fn new(audiobook_id: AudiobookId, chapter_id: ChapterId, offset_seconds: f64) -> Self {
        Self {
            id: BookmarkId::new(),
            audiobook_id,
            chapter_id,
            offset_seconds,
            created_at: Timestamp::now(),
        }
    }

    /// Short label such as `ch3 @ 0:12:05`
    pub fn display_string(&self) -> String {
        format!("{} @ {}", self.chapter_id, format_seconds(self.offset_seconds))
    }
}

impl Validator for Bookmark {
    fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if !self.offset_seconds.is_finite() || self.offset_seconds < 0.0 {
            errors.push(format!(
                "Bookmark offset must be a non-negative number, got {}",
                self.offset_seconds
            ));
        }

        if self.chapter_id.as_str().trim().is_empty() {
            errors.push("Bookmark chapter id cannot be empty".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
