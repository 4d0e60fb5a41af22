// Shared playback identity, state and event types.
use serde::{Deserialize, Serialize};
use std::fmt;

/// What is conceptually playing, independent of the media element holding it.
/// `stem_id == None` is the track's main mix.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PlaybackIdentity {
    pub track_id: String,
    #[serde(default)]
    pub stem_id: Option<String>,
}

impl PlaybackIdentity {
    pub fn main_mix(track_id: impl Into<String>) -> Self {
        Self {
            track_id: track_id.into(),
            stem_id: None,
        }
    }

    pub fn stem(track_id: impl Into<String>, stem_id: impl Into<String>) -> Self {
        Self {
            track_id: track_id.into(),
            stem_id: Some(stem_id.into()),
        }
    }

    pub fn is_main_mix(&self) -> bool {
        self.stem_id.is_none()
    }
}

impl fmt::Display for PlaybackIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.stem_id {
            Some(stem) => write!(f, "{}/{}", self.track_id, stem),
            None => write!(f, "{}", self.track_id),
        }
    }
}

/// Derived view of the coordinator, recomputed on demand.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PlaybackState {
    pub is_playing: bool,
    pub current_time: f64,
    pub duration: f64,
    pub identity: Option<PlaybackIdentity>,
}

/// Coordinator event stream. Every event carries the identity it concerns
/// and the element position in seconds at emission time.
#[derive(Debug, Clone, PartialEq)]
pub enum PlaybackEvent {
    Play {
        identity: PlaybackIdentity,
        position: f64,
    },
    Pause {
        identity: PlaybackIdentity,
        position: f64,
    },
    Stop {
        identity: PlaybackIdentity,
        position: f64,
    },
    Ended {
        identity: PlaybackIdentity,
        position: f64,
    },
    TimeUpdate {
        identity: PlaybackIdentity,
        position: f64,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackEventKind {
    Play,
    Pause,
    Stop,
    Ended,
    TimeUpdate,
}

impl PlaybackEvent {
    pub fn identity(&self) -> &PlaybackIdentity {
        match self {
            Self::Play { identity, .. }
            | Self::Pause { identity, .. }
            | Self::Stop { identity, .. }
            | Self::Ended { identity, .. }
            | Self::TimeUpdate { identity, .. } => identity,
        }
    }

    pub fn position(&self) -> f64 {
        match self {
            Self::Play { position, .. }
            | Self::Pause { position, .. }
            | Self::Stop { position, .. }
            | Self::Ended { position, .. }
            | Self::TimeUpdate { position, .. } => *position,
        }
    }

    pub fn kind(&self) -> PlaybackEventKind {
        match self {
            Self::Play { .. } => PlaybackEventKind::Play,
            Self::Pause { .. } => PlaybackEventKind::Pause,
            Self::Stop { .. } => PlaybackEventKind::Stop,
            Self::Ended { .. } => PlaybackEventKind::Ended,
            Self::TimeUpdate { .. } => PlaybackEventKind::TimeUpdate,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlaybackError {
    /// The element refused to start (autoplay policy, decode or network error).
    #[error("playback rejected: {0}")]
    Rejected(String),
    /// The element was torn down before it could start.
    #[error("media element is no longer available")]
    ElementGone,
}
