// FILE: crates/playback-engine/src/catalog.rs
//! Ordered chapter catalog for one audiobook

use crate::error::{EngineError, EngineResult};
use chaptercast_core::{Audiobook, AudiobookId, Chapter, ChapterId, Validator};
use std::path::Path;

/// Direction of travel through the catalog
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Next,
    Previous,
}

/// Immutable, ordered chapter list of one audiobook
///
/// Chapters are sorted by their `order` field once, at construction.
#[derive(Debug, Clone)]
pub struct ChapterCatalog {
    audiobook_id: AudiobookId,
    title: String,
    narrator: Option<String>,
    chapters: Vec<Chapter>,
}

impl ChapterCatalog {
    /// Builds a catalog from audiobook metadata
    ///
    /// Fails if the audiobook has no chapters, duplicate chapter ids,
    /// duplicate order values or invalid durations.
    pub fn from_audiobook(audiobook: Audiobook) -> EngineResult<Self> {
        audiobook
            .validate()
            .map_err(|errors| EngineError::InvalidCatalog(errors.join("; ")))?;

        let Audiobook {
            id,
            title,
            narrator,
            mut chapters,
        } = audiobook;
        chapters.sort_by_key(|chapter| chapter.order);

        log::debug!("Catalog for {} with {} chapter(s)", id, chapters.len());

        Ok(Self {
            audiobook_id: id,
            title,
            narrator,
            chapters,
        })
    }

    /// Parses an audiobook manifest in JSON form
    pub fn from_json(json: &str) -> EngineResult<Self> {
        let audiobook: Audiobook = serde_json::from_str(json)?;
        Self::from_audiobook(audiobook)
    }

    /// Reads a JSON manifest from disk
    pub fn from_path<P: AsRef<Path>>(path: P) -> EngineResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json(&contents)
    }

    pub fn audiobook_id(&self) -> &AudiobookId {
        &self.audiobook_id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn narrator(&self) -> Option<&str> {
        self.narrator.as_deref()
    }

    /// Returns the number of chapters
    pub fn len(&self) -> usize {
        self.chapters.len()
    }

    /// Always false for a successfully built catalog
    pub fn is_empty(&self) -> bool {
        self.chapters.is_empty()
    }

    /// Returns all chapters in playback order
    pub fn chapters(&self) -> &[Chapter] {
        &self.chapters
    }

    /// Gets a chapter by id
    pub fn get(&self, id: &ChapterId) -> Option<&Chapter> {
        self.chapters.iter().find(|chapter| &chapter.id == id)
    }

    pub fn contains(&self, id: &ChapterId) -> bool {
        self.get(id).is_some()
    }

    /// Position of a chapter in playback order (0-based)
    pub fn index_of(&self, id: &ChapterId) -> Option<usize> {
        self.chapters.iter().position(|chapter| &chapter.id == id)
    }

    /// The first chapter in playback order
    pub fn first(&self) -> Option<&Chapter> {
        self.chapters.first()
    }

    /// The chapter adjacent to `id` in the given direction
    ///
    /// Returns `None` at either end of the book and for unknown ids;
    /// navigation never wraps around.
    pub fn neighbor(&self, id: &ChapterId, direction: Direction) -> Option<&Chapter> {
        let index = self.index_of(id)?;
        match direction {
            Direction::Next => self.chapters.get(index + 1),
            Direction::Previous => index.checked_sub(1).and_then(|i| self.chapters.get(i)),
        }
    }

    /// Sum of all chapter durations
    ///
    /// `None` means at least one chapter has not reported its length yet,
    /// which is different from an empty book.
    pub fn total_duration(&self) -> Option<f64> {
        self.chapters.iter().map(|chapter| chapter.duration).sum()
    }

    /// Offset of a chapter position measured from the start of the book
    ///
    /// `None` if the chapter is unknown or any earlier chapter has no known
    /// duration.
    pub fn offset_in_book(&self, id: &ChapterId, position_seconds: f64) -> Option<f64> {
        let index = self.index_of(id)?;
        let before: Option<f64> = self.chapters[..index]
            .iter()
            .map(|chapter| chapter.duration)
            .sum();
        before.map(|seconds| seconds + position_seconds.max(0.0))
    }

    /// Formatted chapter position, e.g. "3/15"
    pub fn chapter_progress(&self, id: &ChapterId) -> String {
        match self.index_of(id) {
            Some(index) => format!("{}/{}", index + 1, self.len()),
            None => format!("?/{}", self.len()),
        }
    }
}
