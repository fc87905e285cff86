//! Playback-related domain models

use crate::types::ChapterId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lowest and highest volume values accepted by the player
pub const VOLUME_RANGE: std::ops::RangeInclusive<u8> = 0..=100;

/// Playback rate chosen from a fixed set of allowed values
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlaybackRate(f32);

impl PlaybackRate {
    /// The rates offered when no other set is configured
    pub const STANDARD: [f32; 7] = [0.5, 0.75, 1.0, 1.25, 1.5, 1.75, 2.0];

    /// Normal speed
    pub const NORMAL: Self = Self(1.0);

    /// Creates a rate if `value` is one of `allowed`
    pub fn from_allowed(value: f32, allowed: &[f32]) -> Result<Self, String> {
        if allowed.iter().any(|rate| *rate == value) {
            Ok(Self(value))
        } else {
            Err(format!(
                "rate must be one of {}",
                allowed
                    .iter()
                    .map(|r| r.to_string())
                    .collect::<Vec<_>>()
                    .join(", ")
            ))
        }
    }

    /// Returns the rate multiplier
    pub fn value(&self) -> f32 {
        self.0
    }
}

impl Default for PlaybackRate {
    fn default() -> Self {
        Self::NORMAL
    }
}

impl fmt::Display for PlaybackRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x", self.0)
    }
}

/// Category of a failure that put a session into the error phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureKind {
    /// The audio resource could not be opened
    ResourceLoad,
    /// An open resource failed while it was in use
    Playback,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ResourceLoad => write!(f, "Resource load failed"),
            Self::Playback => write!(f, "Playback failed"),
        }
    }
}

/// A recoverable playback failure with its reason
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaybackFailure {
    pub kind: FailureKind,
    pub reason: String,
}

impl PlaybackFailure {
    pub fn new(kind: FailureKind, reason: impl Into<String>) -> Self {
        Self {
            kind,
            reason: reason.into(),
        }
    }
}

impl fmt::Display for PlaybackFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.reason)
    }
}

/// Lifecycle phase of a playback session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PlaybackPhase {
    /// Nothing loaded
    Idle,
    /// A resource open is in flight
    Loading,
    /// Resource open, not yet started
    Ready,
    Playing,
    Paused,
    /// Transient phase published while a seek is applied
    Seeking,
    /// The last chapter finished
    Ended,
    /// A failure left the session without a resource
    Error(PlaybackFailure),
}

impl PlaybackPhase {
    /// Returns true for phases that hold an open resource
    pub fn has_resource(&self) -> bool {
        !matches!(self, Self::Idle | Self::Loading | Self::Error(_))
    }

    /// Short lowercase name, used in logs and terminal output
    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Loading => "loading",
            Self::Ready => "ready",
            Self::Playing => "playing",
            Self::Paused => "paused",
            Self::Seeking => "seeking",
            Self::Ended => "ended",
            Self::Error(_) => "error",
        }
    }
}

impl fmt::Display for PlaybackPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Error(failure) => write!(f, "error ({})", failure),
            other => f.write_str(other.name()),
        }
    }
}

/// Published state of a playback session
///
/// Only the session mutates this; everyone else receives copies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaybackState {
    pub chapter_id: Option<ChapterId>,
    pub position_seconds: f64,
    /// Length of the current chapter, if known
    pub duration_seconds: Option<f64>,
    pub is_playing: bool,
    pub volume: u8,
    pub muted: bool,
    pub rate: PlaybackRate,
    pub phase: PlaybackPhase,
}

impl PlaybackState {
    /// Creates an idle state with the given audio settings
    pub fn new(volume: u8, muted: bool, rate: PlaybackRate) -> Self {
        Self {
            chapter_id: None,
            position_seconds: 0.0,
            duration_seconds: None,
            is_playing: false,
            volume,
            muted,
            rate,
            phase: PlaybackPhase::Idle,
        }
    }

    /// Progress through the current chapter in percent, if the duration is known
    pub fn progress_percentage(&self) -> Option<f32> {
        self.duration_seconds.map(|d| {
            if d <= 0.0 {
                0.0
            } else {
                ((self.position_seconds / d) * 100.0) as f32
            }
        })
    }

    /// Time left in the current chapter, if the duration is known
    pub fn remaining(&self) -> Option<f64> {
        self.duration_seconds
            .map(|d| (d - self.position_seconds).max(0.0))
    }

    /// Returns true if the session holds an open resource
    pub fn has_resource(&self) -> bool {
        self.phase.has_resource()
    }

    /// Returns the failure if the session is in the error phase
    pub fn failure(&self) -> Option<&PlaybackFailure> {
        match &self.phase {
            PlaybackPhase::Error(failure) => Some(failure),
            _ => None,
        }
    }
}

impl Default for PlaybackState {
    fn default() -> Self {
        Self::new(*VOLUME_RANGE.end(), false, PlaybackRate::NORMAL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_from_allowed() {
        let rate = PlaybackRate::from_allowed(1.5, &PlaybackRate::STANDARD).unwrap();
        assert_eq!(rate.value(), 1.5);
        assert_eq!(rate.to_string(), "1.5x");
    }

    #[test]
    fn test_rate_outside_allowed_set() {
        assert!(PlaybackRate::from_allowed(1.1, &PlaybackRate::STANDARD).is_err());
        assert!(PlaybackRate::from_allowed(f32::NAN, &PlaybackRate::STANDARD).is_err());
        assert!(PlaybackRate::from_allowed(1.0, &[]).is_err());
    }

    #[test]
    fn test_default_state_is_idle() {
        let state = PlaybackState::default();
        assert_eq!(state.phase, PlaybackPhase::Idle);
        assert!(state.chapter_id.is_none());
        assert!(!state.is_playing);
        assert_eq!(state.volume, 100);
        assert!(!state.has_resource());
    }

    #[test]
    fn test_progress_and_remaining() {
        let mut state = PlaybackState::default();
        assert_eq!(state.progress_percentage(), None);
        assert_eq!(state.remaining(), None);

        state.duration_seconds = Some(200.0);
        state.position_seconds = 50.0;
        assert_eq!(state.progress_percentage(), Some(25.0));
        assert_eq!(state.remaining(), Some(150.0));
    }

    #[test]
    fn test_progress_zero_duration() {
        let mut state = PlaybackState::default();
        state.duration_seconds = Some(0.0);
        assert_eq!(state.progress_percentage(), Some(0.0));
    }

    #[test]
    fn test_phase_resource_ownership() {
        assert!(!PlaybackPhase::Idle.has_resource());
        assert!(!PlaybackPhase::Loading.has_resource());
        assert!(PlaybackPhase::Ready.has_resource());
        assert!(PlaybackPhase::Ended.has_resource());
        let failed = PlaybackPhase::Error(PlaybackFailure::new(FailureKind::Playback, "boom"));
        assert!(!failed.has_resource());
    }

    #[test]
    fn test_failure_accessor_and_display() {
        let mut state = PlaybackState::default();
        assert!(state.failure().is_none());

        state.phase = PlaybackPhase::Error(PlaybackFailure::new(
            FailureKind::ResourceLoad,
            "file missing",
        ));
        let failure = state.failure().unwrap();
        assert_eq!(failure.kind, FailureKind::ResourceLoad);
        assert_eq!(
            state.phase.to_string(),
            "error (Resource load failed: file missing)"
        );
    }
}
