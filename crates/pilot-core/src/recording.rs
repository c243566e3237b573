//! Recording entities mirrored from the backend.

use crate::{RecordingId, SessionId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle status of a recording.
///
/// `Recording → Processing → Completed | Failed`, or `Stopped` when the
/// backend abandons it. Only the backend moves a recording out of
/// `Processing`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordingStatus {
    Recording,
    Processing,
    Completed,
    Failed,
    Stopped,
}

impl RecordingStatus {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Recording => "recording",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Stopped => "stopped",
        }
    }

    /// Returns true once the backend will no longer change the status.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Stopped)
    }
}

impl fmt::Display for RecordingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Container and video metadata reported for a recording.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordingFormat {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub codec: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fps: Option<u32>,
}

/// Options sent with a start-recording request.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordingOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fps: Option<u32>,
}

/// A recording as last reported by the backend.
///
/// Instances are only ever replaced wholesale by newer server payloads; the
/// client never edits individual fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordingSession {
    pub id: RecordingId,
    pub session_id: SessionId,
    pub status: RecordingStatus,
    #[serde(default)]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub file_size: Option<u64>,
    #[serde(default)]
    pub format: RecordingFormat,
    /// Media URL once the backend has one.
    #[serde(default)]
    pub url: Option<String>,
}

impl RecordingSession {
    pub fn new(id: RecordingId, session_id: SessionId, status: RecordingStatus) -> Self {
        Self {
            id,
            session_id,
            status,
            start_time: None,
            end_time: None,
            file_size: None,
            format: RecordingFormat::default(),
            url: None,
        }
    }

    #[must_use]
    pub fn is_recording(&self) -> bool {
        self.status == RecordingStatus::Recording
    }

    #[must_use]
    pub fn is_playable(&self) -> bool {
        self.status == RecordingStatus::Completed
    }

    /// Wall-clock length, if both ends are known.
    pub fn duration(&self) -> Option<chrono::Duration> {
        match (self.start_time, self.end_time) {
            (Some(start), Some(end)) if end >= start => Some(end - start),
            _ => None,
        }
    }

    /// Human readable file size (e.g. "1.5 MB").
    pub fn size_label(&self) -> String {
        const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
        let Some(bytes) = self.file_size else {
            return "-".to_string();
        };
        let mut value = bytes as f64;
        let mut unit = "B";
        for next in UNITS.iter().skip(1) {
            if value < 1024.0 {
                break;
            }
            value /= 1024.0;
            unit = next;
        }
        if unit == "B" {
            format!("{bytes} B")
        } else {
            format!("{value:.1} {unit}")
        }
    }
}
