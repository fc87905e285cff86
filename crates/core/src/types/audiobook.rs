//! Audiobook and chapter domain models

use crate::types::Validator;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

/// Unique identifier for an audiobook
///
/// Identifiers arrive pre-formed from the content layer, so any non-empty
/// string is accepted. `new()` mints a random one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AudiobookId(String);

impl AudiobookId {
    /// Creates a new random AudiobookId
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Returns the identifier as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for AudiobookId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<&str> for AudiobookId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for AudiobookId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl std::fmt::Display for AudiobookId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Unique identifier for a chapter within an audiobook
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChapterId(String);

impl ChapterId {
    /// Creates a new random ChapterId
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Returns the identifier as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ChapterId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<&str> for ChapterId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for ChapterId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl std::fmt::Display for ChapterId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Reference to the audio behind a chapter (a path or URL)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceRef(String);

impl SourceRef {
    pub fn new(source: impl Into<String>) -> Self {
        Self(source.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for SourceRef {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for SourceRef {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl std::fmt::Display for SourceRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A single chapter of an audiobook
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chapter {
    pub id: ChapterId,
    pub title: String,
    pub source: SourceRef,
    /// Length in seconds; unknown until the audio resource reports it
    #[serde(default)]
    pub duration: Option<f64>,
    /// Position of the chapter in the book; unique and strictly increasing
    pub order: u32,
}

impl Chapter {
    /// Creates a chapter whose duration is not yet known
    pub fn new(
        id: impl Into<ChapterId>,
        title: impl Into<String>,
        source: impl Into<String>,
        order: u32,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            source: SourceRef::new(source),
            duration: None,
            order,
        }
    }

    /// Sets a known duration in seconds
    pub fn with_duration(mut self, seconds: f64) -> Self {
        self.duration = Some(seconds);
        self
    }
}

/// An audiobook with its ordered chapters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Audiobook {
    pub id: AudiobookId,
    pub title: String,
    #[serde(default)]
    pub narrator: Option<String>,
    pub chapters: Vec<Chapter>,
}

impl Audiobook {
    /// Creates an audiobook with no chapters
    pub fn new(id: impl Into<AudiobookId>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            narrator: None,
            chapters: Vec::new(),
        }
    }

    /// Sets the narrator
    pub fn with_narrator(mut self, narrator: impl Into<String>) -> Self {
        self.narrator = Some(narrator.into());
        self
    }

    /// Appends a chapter
    pub fn with_chapter(mut self, chapter: Chapter) -> Self {
        self.chapters.push(chapter);
        self
    }
}

impl Validator for Audiobook {
    fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.id.as_str().trim().is_empty() {
            errors.push("Audiobook id cannot be empty".to_string());
        }

        if self.title.trim().is_empty() {
            errors.push("Audiobook title cannot be empty".to_string());
        }

        if self.chapters.is_empty() {
            errors.push("Audiobook must have at least one chapter".to_string());
        }

        let mut seen = HashSet::new();
        for chapter in &self.chapters {
            if chapter.id.as_str().trim().is_empty() {
                errors.push("Chapter id cannot be empty".to_string());
            }
            if !seen.insert(&chapter.id) {
                errors.push(format!("Duplicate chapter id: {}", chapter.id));
            }
            if let Some(duration) = chapter.duration {
                if !duration.is_finite() || duration < 0.0 {
                    errors.push(format!(
                        "Chapter {} has an invalid duration: {}",
                        chapter.id, duration
                    ));
                }
            }
        }

        let mut orders: Vec<u32> = self.chapters.iter().map(|c| c.order).collect();
        orders.sort_unstable();
        if orders.windows(2).any(|pair| pair[0] == pair[1]) {
            errors.push("Chapter order values must be unique".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_book() -> Audiobook {
        Audiobook::new("book-1", "The Long Road")
            .with_narrator("A. Reader")
            .with_chapter(Chapter::new("ch1", "Departure", "audio/ch1.mp3", 1).with_duration(100.0))
            .with_chapter(Chapter::new("ch2", "Arrival", "audio/ch2.mp3", 2))
    }

    #[test]
    fn test_ids_from_strings() {
        let id = ChapterId::from("ch1");
        assert_eq!(id.as_str(), "ch1");
        assert_eq!(id.to_string(), "ch1");
        assert_ne!(AudiobookId::new(), AudiobookId::new());
    }

    #[test]
    fn test_chapter_duration_defaults_to_unknown() {
        let chapter = Chapter::new("ch1", "One", "a.mp3", 1);
        assert!(chapter.duration.is_none());
        assert_eq!(chapter.with_duration(12.5).duration, Some(12.5));
    }

    #[test]
    fn test_valid_audiobook() {
        assert!(sample_book().is_valid());
    }

    #[test]
    fn test_empty_audiobook_is_invalid() {
        let book = Audiobook::new("book-1", "Empty");
        assert!(!book.is_valid());
    }

    #[test]
    fn test_duplicate_chapter_ids_are_invalid() {
        let book = Audiobook::new("book-1", "Dupes")
            .with_chapter(Chapter::new("ch1", "One", "a.mp3", 1))
            .with_chapter(Chapter::new("ch1", "Two", "b.mp3", 2));
        let errors = book.validate().unwrap_err();
        assert!(errors.iter().any(|e| e.contains("Duplicate")));
    }

    #[test]
    fn test_duplicate_order_is_invalid() {
        let book = Audiobook::new("book-1", "Orders")
            .with_chapter(Chapter::new("ch1", "One", "a.mp3", 3))
            .with_chapter(Chapter::new("ch2", "Two", "b.mp3", 3));
        assert!(!book.is_valid());
    }

    #[test]
    fn test_negative_duration_is_invalid() {
        let book = Audiobook::new("book-1", "Negative")
            .with_chapter(Chapter::new("ch1", "One", "a.mp3", 1).with_duration(-1.0));
        assert!(!book.is_valid());
    }

    #[test]
    fn test_manifest_json_shape() {
        let json = r#"{
            "id": "book-1",
            "title": "The Long Road",
            "chapters": [
                { "id": "ch1", "title": "Departure", "source": "a.mp3", "order": 1, "duration": 100.0 },
                { "id": "ch2", "title": "Arrival", "source": "b.mp3", "order": 2 }
            ]
        }"#;
        let book: Audiobook = serde_json::from_str(json).unwrap();
        assert_eq!(book.chapters.len(), 2);
        assert!(book.narrator.is_none());
        assert_eq!(book.chapters[1].duration, None);
        assert_eq!(book.chapters[0].source.as_str(), "a.mp3");
    }
}
