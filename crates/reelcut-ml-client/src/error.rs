//! Event-detector client errors.

use thiserror::Error;

pub type MlClientResult<T> = Result<T, MlClientError>;

#[derive(Debug, Error)]
pub enum MlClientError {
    #[error("Event detector not configured: {0}")]
    Config(String),

    #[error("Invalid event detector URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Event detector request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Event detector returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
}

impl MlClientError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}

impl From<MlClientError> for reelcut_media::MediaError {
    fn from(err: MlClientError) -> Self {
        reelcut_media::MediaError::event_detector(err.to_string())
    }
}
