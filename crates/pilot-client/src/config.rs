//! Client configuration.
//!
//! Values are resolved in this order, first match wins:
//!
//! 1. Environment (`PILOT_API_URL`, `PILOT_WS_URL`)
//! 2. Config file (`<config_dir>/pilot/config.toml`, or `--config`)
//! 3. `PILOT_WS_URL` baked in at build time (socket base only)
//! 4. Defaults; the socket base is derived from the API origin

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use pilot_core::{SessionId, Topic};
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use crate::api::HttpRecordingApi;
use crate::channel::{ChannelSpec, ChannelTiming};
use crate::error::ConfigError;

pub const DEFAULT_API_URL: &str = "http://localhost:3001/";
pub const API_URL_ENV: &str = "PILOT_API_URL";
pub const WS_URL_ENV: &str = "PILOT_WS_URL";

/// Front-end dev server port and the backend port next to it.
const DEV_FRONTEND_PORT: u16 = 3000;
const DEV_BACKEND_PORT: u16 = 3001;

/// On-disk configuration. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigFile {
    pub api_url: Option<String>,
    pub ws_url: Option<String>,
    pub probe_timeout_ms: Option<u64>,
    pub backoff_base_ms: Option<u64>,
    pub backoff_cap_ms: Option<u64>,
    pub max_reconnect_attempts: Option<u32>,
}

impl ConfigFile {
    /// Reads and parses a config file.
    pub fn read(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        toml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }
}

/// Resolved client configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    /// Origin of the REST API
    pub api_base: Url,
    /// Base of all socket endpoints
    pub ws_base: Url,
    pub timing: ChannelTiming,
}

impl ClientConfig {
    /// Default location of the config file.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("pilot").join("config.toml"))
    }

    /// Loads configuration from the environment and a config file.
    ///
    /// An explicit `path` must exist; the default location may be absent.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the file cannot be read or parsed, or a
    /// resulting URL is invalid.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let file = match path {
            Some(path) => ConfigFile::read(path)?,
            None => match Self::default_path() {
                Some(path) if path.exists() => ConfigFile::read(&path)?,
                _ => ConfigFile::default(),
            },
        };
        Self::from_sources(file, |key| std::env::var(key).ok())
    }

    /// Resolves configuration from a parsed file and an environment lookup.
    pub fn from_sources(
        file: ConfigFile,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let api_url = non_empty(env(API_URL_ENV))
            .or_else(|| non_empty(file.api_url.clone()))
            .unwrap_or_else(|| DEFAULT_API_URL.to_string());
        let api_base = parse_url("api_url", &api_url, &["http", "https"])?;

        let explicit_ws = non_empty(env(WS_URL_ENV))
            .or_else(|| non_empty(file.ws_url.clone()))
            .or_else(|| non_empty(option_env!("PILOT_WS_URL").map(str::to_string)));
        let ws_base = match explicit_ws {
            Some(ws_url) => parse_url("ws_url", &ws_url, &["ws", "wss"])?,
            None => derive_ws_base(&api_base)?,
        };

        let mut timing = ChannelTiming::default();
        if let Some(ms) = file.probe_timeout_ms {
            timing.probe_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = file.backoff_base_ms {
            timing.backoff.base = Duration::from_millis(ms);
        }
        if let Some(ms) = file.backoff_cap_ms {
            timing.backoff.cap = Duration::from_millis(ms);
        }
        if let Some(attempts) = file.max_reconnect_attempts {
            timing.backoff.max_attempts = attempts;
        }

        debug!(api = %api_base, ws = %ws_base, "Resolved client configuration");
        Ok(Self {
            api_base,
            ws_base,
            timing,
        })
    }

    /// The agents channel (`{ws}/ws/agents`).
    pub fn agents_channel(&self) -> Result<ChannelSpec, ConfigError> {
        Ok(ChannelSpec::new(join(&self.ws_base, &["ws", "agents"])?))
    }

    /// The stream channel for one session.
    ///
    /// Primary `{ws}/ws/tasks`, legacy fallback `{ws}/ws/stream/{session}`.
    /// Frames without a routing id belong to the session.
    pub fn stream_channel(&self, session_id: &SessionId) -> Result<ChannelSpec, ConfigError> {
        let primary = join(&self.ws_base, &["ws", "tasks"])?;
        let fallback = join(&self.ws_base, &["ws", "stream", session_id.as_str()])?;
        Ok(ChannelSpec::new(primary)
            .with_fallback(fallback)
            .with_implicit_topic(Topic::session(session_id)))
    }

    pub fn recording_api(&self) -> HttpRecordingApi {
        HttpRecordingApi::new(self.api_base.clone())
    }
}

/// Derives the socket base from an HTTP origin.
///
/// `http` maps to `ws` and `https` to `wss`; the front-end dev port maps to
/// the backend port. Path, query and fragment are dropped.
pub fn derive_ws_base(origin: &Url) -> Result<Url, ConfigError> {
    let invalid = |reason: &str| ConfigError::InvalidUrl {
        field: "ws_url",
        value: origin.to_string(),
        reason: reason.to_string(),
    };

    let scheme = match origin.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        _ => return Err(invalid("origin must be http or https")),
    };

    let mut ws = origin.clone();
    ws.set_scheme(scheme)
        .map_err(|()| invalid("cannot switch scheme"))?;
    if ws.port() == Some(DEV_FRONTEND_PORT) {
        ws.set_port(Some(DEV_BACKEND_PORT))
            .map_err(|()| invalid("cannot set port"))?;
    }
    ws.set_path("/");
    ws.set_query(None);
    ws.set_fragment(None);
    Ok(ws)
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_url(field: &'static str, value: &str, schemes: &[&str]) -> Result<Url, ConfigError> {
    let url = Url::parse(value).map_err(|e| ConfigError::InvalidUrl {
        field,
        value: value.to_string(),
        reason: e.to_string(),
    })?;
    if !schemes.contains(&url.scheme()) {
        return Err(ConfigError::InvalidUrl {
            field,
            value: value.to_string(),
            reason: format!("scheme must be one of {}", schemes.join(", ")),
        });
    }
    Ok(url)
}

/// Appends path segments to a base URL.
fn join(base: &Url, segments: &[&str]) -> Result<Url, ConfigError> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|()| ConfigError::InvalidUrl {
            field: "ws_url",
            value: base.to_string(),
            reason: "cannot be a base".to_string(),
        })?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn test_defaults() {
        let config = ClientConfig::from_sources(ConfigFile::default(), no_env).unwrap();
        assert_eq!(config.api_base.as_str(), DEFAULT_API_URL);
        assert_eq!(config.timing, ChannelTiming::default());
        if option_env!("PILOT_WS_URL").is_none() {
            assert_eq!(config.ws_base.as_str(), "ws://localhost:3001/");
        }
    }

    #[test]
    fn test_derive_ws_base() {
        assert_eq!(
            derive_ws_base(&url("http://localhost:3000/app/page?x=1")).unwrap().as_str(),
            "ws://localhost:3001/"
        );
        assert_eq!(
            derive_ws_base(&url("https://pilot.example.com/")).unwrap().as_str(),
            "wss://pilot.example.com/"
        );
        assert_eq!(
            derive_ws_base(&url("http://10.0.0.5:8080")).unwrap().as_str(),
            "ws://10.0.0.5:8080/"
        );
        assert!(derive_ws_base(&url("ftp://example.com/")).is_err());
    }

    #[test]
    fn test_env_overrides_file() {
        let file = ConfigFile {
            api_url: Some("http://file:9000/".into()),
            ws_url: Some("ws://file-ws:9001/".into()),
            ..Default::default()
        };
        let env: HashMap<&str, &str> = [
            (API_URL_ENV, "https://env.example.com/"),
            (WS_URL_ENV, "wss://env-ws.example.com/"),
        ]
        .into_iter()
        .collect();

        let config =
            ClientConfig::from_sources(file, |k| env.get(k).map(|v| v.to_string())).unwrap();
        assert_eq!(config.api_base.as_str(), "https://env.example.com/");
        assert_eq!(config.ws_base.as_str(), "wss://env-ws.example.com/");
    }

    #[test]
    fn test_empty_env_is_ignored() {
        let file = ConfigFile {
            api_url: Some("https://file.example.com/".into()),
            ..Default::default()
        };
        let config = ClientConfig::from_sources(file, |_| Some("  ".to_string())).unwrap();
        assert_eq!(config.api_base.as_str(), "https://file.example.com/");
    }

    #[test]
    fn test_ws_base_derived_from_api() {
        let file = ConfigFile {
            api_url: Some("https://api.example.com:3000/".into()),
            ..Default::default()
        };
        let config = ClientConfig::from_sources(file, no_env).unwrap();
        if option_env!("PILOT_WS_URL").is_none() {
            assert_eq!(config.ws_base.as_str(), "wss://api.example.com:3001/");
        }
    }

    #[test]
    fn test_rejects_wrong_scheme() {
        let file = ConfigFile {
            ws_url: Some("http://not-a-socket/".into()),
            ..Default::default()
        };
        let err = ClientConfig::from_sources(file, no_env).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidUrl { field: "ws_url", .. }));
    }

    #[test]
    fn test_channel_specs() {
        let file = ConfigFile {
            ws_url: Some("wss://backend.example.com/".into()),
            ..Default::default()
        };
        let config = ClientConfig::from_sources(file, no_env).unwrap();

        let agents = config.agents_channel().unwrap();
        assert_eq!(agents.primary.as_str(), "wss://backend.example.com/ws/agents");
        assert!(agents.fallback.is_none());

        let session = SessionId::new("S1");
        let stream = config.stream_channel(&session).unwrap();
        assert_eq!(stream.primary.as_str(), "wss://backend.example.com/ws/tasks");
        assert_eq!(
            stream.fallback.as_ref().map(Url::as_str),
            Some("wss://backend.example.com/ws/stream/S1")
        );
        assert_eq!(stream.implicit_topic, Some(Topic::session(&session)));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
api_url = "http://backend.internal:4000/"
probe_timeout_ms = 500
backoff_base_ms = 250
backoff_cap_ms = 4000
max_reconnect_attempts = 8
"#
        )
        .unwrap();

        let parsed = ConfigFile::read(file.path()).unwrap();
        let config = ClientConfig::from_sources(parsed, no_env).unwrap();
        assert_eq!(config.api_base.as_str(), "http://backend.internal:4000/");
        assert_eq!(config.timing.probe_timeout, Duration::from_millis(500));
        assert_eq!(config.timing.backoff.base, Duration::from_millis(250));
        assert_eq!(config.timing.backoff.cap, Duration::from_secs(4));
        assert_eq!(config.timing.backoff.max_attempts, 8);
    }

    #[test]
    fn test_unknown_key_is_a_parse_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "api_ur1 = \"http://typo/\"").unwrap();

        let err = ConfigFile::read(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = ConfigFile::read(&dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
