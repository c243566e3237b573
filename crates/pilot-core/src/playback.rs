//! Server-side playback sessions and progress-bar seeking.

use crate::{PlaybackId, RecordingId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Status of a playback session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackStatus {
    Active,
    Paused,
    Stopped,
}

impl fmt::Display for PlaybackStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Active => "active",
            Self::Paused => "paused",
            Self::Stopped => "stopped",
        })
    }
}

/// A control action applied to an active playback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackAction {
    Play,
    Pause,
    Stop,
    Seek,
}

impl PlaybackAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Play => "play",
            Self::Pause => "pause",
            Self::Stop => "stop",
            Self::Seek => "seek",
        }
    }
}

impl fmt::Display for PlaybackAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Playback of a completed recording, as last reported by the backend.
///
/// `current_time` is authoritative on the server. The client never advances
/// it locally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackSession {
    pub id: PlaybackId,
    pub recording_id: RecordingId,
    pub status: PlaybackStatus,
    #[serde(default)]
    pub current_time: f64,
    #[serde(default)]
    pub duration: f64,
    #[serde(default = "default_rate")]
    pub playback_rate: f64,
    /// Stream URL for the playback, when the backend serves one.
    #[serde(default)]
    pub stream_url: Option<String>,
}

fn default_rate() -> f64 {
    1.0
}

impl PlaybackSession {
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.status == PlaybackStatus::Stopped
    }

    /// Target position for a progress-bar fraction.
    ///
    /// Returns `None` when the duration is unknown (zero, negative or not
    /// finite), in which case no seek should be issued.
    pub fn seek_target(&self, fraction: f64) -> Option<f64> {
        if !self.duration.is_finite() || self.duration <= 0.0 || !fraction.is_finite() {
            return None;
        }
        Some(fraction.clamp(0.0, 1.0) * self.duration)
    }

    /// Playback progress in `[0, 1]`, or 0 when the duration is unknown.
    pub fn progress(&self) -> f64 {
        if !self.duration.is_finite() || self.duration <= 0.0 {
            return 0.0;
        }
        (self.current_time / self.duration).clamp(0.0, 1.0)
    }
}

/// Converts a pointer position on a progress bar into a fraction.
///
/// `bar_left` and `bar_width` are the bar's geometry in the same coordinate
/// space as `pointer_x`. Returns `None` for a zero-width (or invalid) bar.
pub fn seek_fraction(pointer_x: f64, bar_left: f64, bar_width: f64) -> Option<f64> {
    if !bar_width.is_finite() || bar_width <= 0.0 || !pointer_x.is_finite() || !bar_left.is_finite()
    {
        return None;
    }
    Some(((pointer_x - bar_left) / bar_width).clamp(0.0, 1.0))
}
