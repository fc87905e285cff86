//! Playback Engine - Chapter navigation and playback state machine for Chaptercast
//!
//! A [`PlaybackSession`] owns at most one open audio resource and walks an
//! ordered [`ChapterCatalog`]. Audio itself comes from an [`AudioBackend`];
//! [`SimulatedBackend`] provides one driven by the tokio clock. Sessions are
//! usually run through [`SessionDriver::spawn`] and controlled with the
//! returned [`SessionHandle`].

mod bookmarks;
mod catalog;
mod driver;
mod error;
mod memory;
mod resource;
mod session;
mod simulated;
mod tracker;

pub use bookmarks::{
    BookmarkEntry, BookmarkStore, PendingBookmark, PendingId, PositionSnapshot, RefreshTicket,
    RemoveOutcome,
};
pub use catalog::{ChapterCatalog, Direction};
pub use driver::{SessionDriver, SessionHandle, StateStream};
pub use error::{EngineError, EngineResult};
pub use memory::InMemoryBookmarkRepository;
pub use resource::{
    AudioBackend, AudioHandle, LoadToken, PlaybackResource, ResourceEvent, ResourceEventKind,
    ResourceEventReceiver, ResourceEvents, ResourceFault,
};
pub use session::{PlaybackSession, SessionSettings, StateListener, SubscriptionId};
pub use simulated::{PlaybackGate, SimulatedBackend};
pub use tracker::ProgressTracker;

pub use chaptercast_core::{PlaybackPhase, PlaybackRate, PlaybackState};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_defaults() {
        let settings = SessionSettings::default();
        assert_eq!(settings.volume, 100);
        assert!(!settings.muted);
        assert_eq!(settings.rate, 1.0);
        assert!(settings.allowed_rates.contains(&settings.rate));

        let backend = SimulatedBackend::new();
        assert_eq!(backend.opens(), 0);
        assert_eq!(backend.open_handles(), 0);

        assert!(InMemoryBookmarkRepository::new().is_empty());
    }

    #[test]
    fn test_error_display() {
        let error = EngineError::PlaybackBlocked("needs gesture".to_string());
        assert!(format!("{}", error).contains("needs gesture"));
    }
}
