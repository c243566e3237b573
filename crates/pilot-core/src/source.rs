//! Visual source selection for a stream view.
//!
//! A view shows exactly one source at a time. The choice is a pure function
//! of the most recent URL fields, evaluated with fixed precedence:
//!
//! ```text
//! live > recording > screenshot > none
//! ```
//!
//! Empty URLs count as absent.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The authoritative visual source of a remote browser session.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", content = "url", rename_all = "lowercase")]
pub enum StreamSource {
    Live(String),
    Recording(String),
    Screenshot(String),
    #[default]
    None,
}

impl StreamSource {
    /// Selects the source from candidate URLs using fixed precedence.
    pub fn select(live: Option<&str>, recording: Option<&str>, screenshot: Option<&str>) -> Self {
        if let Some(url) = present(live) {
            return Self::Live(url.to_string());
        }
        if let Some(url) = present(recording) {
            return Self::Recording(url.to_string());
        }
        if let Some(url) = present(screenshot) {
            return Self::Screenshot(url.to_string());
        }
        Self::None
    }

    pub fn url(&self) -> Option<&str> {
        match self {
            Self::Live(url) | Self::Recording(url) | Self::Screenshot(url) => Some(url),
            Self::None => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Live(_) => "live",
            Self::Recording(_) => "recording",
            Self::Screenshot(_) => "screenshot",
            Self::None => "none",
        }
    }

    #[must_use]
    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }
}

impl fmt::Display for StreamSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.url() {
            Some(url) => write!(f, "{} ({url})", self.kind()),
            None => f.write_str(self.kind()),
        }
    }
}

fn present(url: Option<&str>) -> Option<&str> {
    url.filter(|u| !u.trim().is_empty())
}

/// Latest URL fields received for a view.
///
/// Each field is replaced wholesale whenever a newer value arrives.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SourceFields {
    pub live_url: Option<String>,
    pub recording_url: Option<String>,
    pub screenshot_url: Option<String>,
}

impl SourceFields {
    /// Selects the source from the stored fields.
    pub fn source(&self) -> StreamSource {
        self.source_with_recording(None)
    }

    /// Selects the source, letting `recording_override` (the URL of an
    /// active playback) take the recording slot when present.
    pub fn source_with_recording(&self, recording_override: Option<&str>) -> StreamSource {
        let recording = present(recording_override).or(self.recording_url.as_deref());
        StreamSource::select(
            self.live_url.as_deref(),
            recording,
            self.screenshot_url.as_deref(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_live_wins_over_everything() {
        let source = StreamSource::select(Some("L"), Some("R"), Some("S"));
        assert_eq!(source, StreamSource::Live("L".into()));
    }

    #[test]
    fn test_precedence_across_all_combinations() {
        let candidates = [None, Some("x")];
        for live in candidates {
            for recording in candidates {
                for screenshot in candidates {
                    let source = StreamSource::select(live, recording, screenshot);
                    let expected = if live.is_some() {
                        "live"
                    } else if recording.is_some() {
                        "recording"
                    } else if screenshot.is_some() {
                        "screenshot"
                    } else {
                        "none"
                    };
                    assert_eq!(source.kind(), expected);
                }
            }
        }
    }

    #[test]
    fn test_empty_urls_are_absent() {
        let source = StreamSource::select(Some(""), Some("  "), Some("S"));
        assert_eq!(source, StreamSource::Screenshot("S".into()));
    }

    #[test]
    fn test_playback_url_overrides_recording_field() {
        let fields = SourceFields {
            live_url: None,
            recording_url: Some("socket-rec".into()),
            screenshot_url: Some("shot".into()),
        };
        assert_eq!(
            fields.source_with_recording(Some("playback-rec")),
            StreamSource::Recording("playback-rec".into())
        );
        assert_eq!(
            fields.source(),
            StreamSource::Recording("socket-rec".into())
        );
    }

    #[test]
    fn test_playback_url_never_beats_live() {
        let fields = SourceFields {
            live_url: Some("live".into()),
            ..Default::default()
        };
        assert_eq!(
            fields.source_with_recording(Some("playback-rec")),
            StreamSource::Live("live".into())
        );
    }

    #[test]
    fn test_display() {
        assert_eq!(StreamSource::None.to_string(), "none");
        assert_eq!(
            StreamSource::Screenshot("a.png".into()).to_string(),
            "screenshot (a.png)"
        );
    }
}
