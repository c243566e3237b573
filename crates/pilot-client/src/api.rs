//! Recordings REST API client.
//!
//! [`RecordingApi`] is the seam the stream controller talks through;
//! [`HttpRecordingApi`] is the `reqwest` implementation against the backend.

use async_trait::async_trait;
use pilot_core::{
    PlaybackId, PlaybackSession, RecordingId, RecordingOptions, RecordingSession, SessionId,
};
use pilot_protocol::{
    PlaybackControlRequest, PlaybackEnvelope, RecordingEnvelope, RecordingListEnvelope,
    StartRecordingRequest,
};
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use tracing::debug;
use url::Url;

use crate::error::ApiError;

/// Recording lifecycle commands.
#[async_trait]
pub trait RecordingApi: Send + Sync + 'static {
    /// Starts recording a session.
    async fn start_recording(
        &self,
        session_id: &SessionId,
        options: &RecordingOptions,
    ) -> Result<RecordingSession, ApiError>;

    /// Stops an active recording.
    async fn stop_recording(&self, id: &RecordingId) -> Result<RecordingSession, ApiError>;

    /// Deletes a recording.
    async fn delete_recording(&self, id: &RecordingId) -> Result<(), ApiError>;

    /// Opens a playback session for a completed recording.
    async fn start_playback(&self, id: &RecordingId) -> Result<PlaybackSession, ApiError>;

    /// Plays, pauses, stops or seeks a playback session.
    async fn control_playback(
        &self,
        id: &PlaybackId,
        request: &PlaybackControlRequest,
    ) -> Result<PlaybackSession, ApiError>;

    /// Lists recordings, optionally only those of one session.
    async fn list_recordings(
        &self,
        session_id: Option<&SessionId>,
    ) -> Result<Vec<RecordingSession>, ApiError>;
}

/// HTTP client for the backend's recordings API.
#[derive(Debug, Clone)]
pub struct HttpRecordingApi {
    http: Client,
    base: Url,
}

impl HttpRecordingApi {
    /// Creates a client rooted at `base` (e.g. `http://localhost:3001/`).
    pub fn new(base: Url) -> Self {
        Self::with_client(Client::new(), base)
    }

    pub fn with_client(http: Client, base: Url) -> Self {
        Self { http, base }
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    /// Builds `{base}/api/recordings/{segments...}`.
    ///
    /// Segments are percent-encoded, so ids can never change the path shape.
    pub fn endpoint(&self, segments: &[&str]) -> Result<Url, ApiError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|()| ApiError::InvalidUrl(self.base.to_string()))?
            .pop_if_empty()
            .extend(["api", "recordings"])
            .extend(segments);
        Ok(url)
    }
}

/// Decodes a success body or turns the status into an error.
async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T, ApiError> {
    let response = check_status(response).await?;
    Ok(response.json::<T>().await?)
}

async fn check_status(response: Response) -> Result<Response, ApiError> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        let body = response.text().await.unwrap_or_default();
        Err(ApiError::UnexpectedStatus { status, body })
    }
}

#[async_trait]
impl RecordingApi for HttpRecordingApi {
    async fn start_recording(
        &self,
        session_id: &SessionId,
        options: &RecordingOptions,
    ) -> Result<RecordingSession, ApiError> {
        let url = self.endpoint(&["start"])?;
        debug!(%url, session_id = %session_id, "POST start recording");
        let body = StartRecordingRequest {
            session_id: session_id.clone(),
            options: options.clone(),
        };
        let response = self.http.post(url).json(&body).send().await?;
        read_json::<RecordingEnvelope>(response)
            .await
            .map(RecordingEnvelope::into_inner)
    }

    async fn stop_recording(&self, id: &RecordingId) -> Result<RecordingSession, ApiError> {
        let url = self.endpoint(&[id.as_str(), "stop"])?;
        debug!(%url, "POST stop recording");
        let response = self.http.post(url).send().await?;
        read_json::<RecordingEnvelope>(response)
            .await
            .map(RecordingEnvelope::into_inner)
    }

    async fn delete_recording(&self, id: &RecordingId) -> Result<(), ApiError> {
        let url = self.endpoint(&[id.as_str()])?;
        debug!(%url, "DELETE recording");
        let response = self.http.delete(url).send().await?;
        check_status(response).await.map(|_| ())
    }

    async fn start_playback(&self, id: &RecordingId) -> Result<PlaybackSession, ApiError> {
        let url = self.endpoint(&[id.as_str(), "playback"])?;
        debug!(%url, "POST start playback");
        let response = self.http.post(url).send().await?;
        read_json::<PlaybackEnvelope>(response)
            .await
            .map(PlaybackEnvelope::into_inner)
    }

    async fn control_playback(
        &self,
        id: &PlaybackId,
        request: &PlaybackControlRequest,
    ) -> Result<PlaybackSession, ApiError> {
        let url = self.endpoint(&["playback", id.as_str(), "control"])?;
        debug!(%url, action = %request.action, value = ?request.value, "POST playback control");
        let response = self.http.post(url).json(request).send().await?;
        read_json::<PlaybackEnvelope>(response)
            .await
            .map(PlaybackEnvelope::into_inner)
    }

    async fn list_recordings(
        &self,
        session_id: Option<&SessionId>,
    ) -> Result<Vec<RecordingSession>, ApiError> {
        let url = match session_id {
            Some(id) => self.endpoint(&["session", id.as_str()])?,
            None => self.endpoint(&[])?,
        };
        debug!(%url, "GET recordings");
        let response = self.http.get(url).send().await?;
        read_json::<RecordingListEnvelope>(response)
            .await
            .map(RecordingListEnvelope::into_inner)
    }
}
