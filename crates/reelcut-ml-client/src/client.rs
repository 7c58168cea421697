//! HTTP event detector.
//!
//! `POST {base_url}/v1/events` with `{"video_path": "..."}` answers
//! `{"events": [{"time": 12.5, "confidence": 0.9, "type": "kill"}]}`.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

use reelcut_media::{EventDetector, MediaResult};
use reelcut_models::DetectedEvent;

use crate::error::{MlClientError, MlClientResult};

/// Longest response body kept in errors.
const ERROR_BODY_CHARS: usize = 500;

/// Event detector endpoint settings.
#[derive(Debug, Clone)]
pub struct EventDetectorConfig {
    pub base_url: String,
    pub timeout: Duration,
}

impl EventDetectorConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            timeout: Duration::from_secs(120),
        }
    }

    /// Read `EVENT_DETECTOR_URL`; `None` when the oracle is not configured.
    pub fn from_env() -> Option<Self> {
        let base_url = std::env::var("EVENT_DETECTOR_URL")
            .ok()
            .filter(|s| !s.trim().is_empty())?;
        let timeout = std::env::var("EVENT_DETECTOR_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(120);
        Some(Self {
            base_url,
            timeout: Duration::from_secs(timeout),
        })
    }
}

#[derive(Debug, Serialize)]
struct EventsRequest<'a> {
    video_path: &'a str,
}

#[derive(Debug, Deserialize)]
struct EventsResponse {
    #[serde(default)]
    events: Vec<DetectedEvent>,
}

/// Client for the external event-detection service.
#[derive(Debug, Clone)]
pub struct HttpEventDetector {
    client: Client,
    endpoint: Url,
}

impl HttpEventDetector {
    pub fn new(config: EventDetectorConfig) -> MlClientResult<Self> {
        let mut base = config.base_url.trim().to_string();
        if base.is_empty() {
            return Err(MlClientError::config("empty base URL"));
        }
        if !base.ends_with('/') {
            base.push('/');
        }
        let endpoint = Url::parse(&base)?.join("v1/events")?;

        let client = Client::builder().timeout(config.timeout).build()?;
        info!(endpoint = %endpoint, "Event detector configured");
        Ok(Self { client, endpoint })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Ask the service for events in one source video.
    pub async fn fetch_events(&self, video_path: &Path) -> MlClientResult<Vec<DetectedEvent>> {
        let video_path = video_path.to_string_lossy();
        let response = self
            .client
            .post(self.endpoint.clone())
            .json(&EventsRequest {
                video_path: &video_path,
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body: String = response
                .text()
                .await
                .unwrap_or_default()
                .chars()
                .take(ERROR_BODY_CHARS)
                .collect();
            return Err(MlClientError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: EventsResponse = response.json().await?;
        debug!(
            video = %video_path,
            events = parsed.events.len(),
            "Received detected events"
        );
        Ok(parsed.events)
    }
}

#[async_trait]
impl EventDetector for HttpEventDetector {
    async fn detect_events(&self, video_path: &Path) -> MediaResult<Vec<DetectedEvent>> {
        Ok(self.fetch_events(video_path).await?)
    }
}
