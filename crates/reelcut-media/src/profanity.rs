//! Profanity span detection over the highlight timeline.
//!
//! Uploads may carry a word-timed transcript sidecar (`<video>.words.json`)
//! produced upstream by a speech-to-text pass. Blocklisted words inside the
//! selected takes are mapped onto the concatenated timeline as mute spans.

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use reelcut_models::Selection;

use crate::audio::MuteSpan;
use crate::error::MediaResult;

/// Words muted when no blocklist is configured.
pub const DEFAULT_BLOCKLIST: &[&str] = &[
    "fuck",
    "fucking",
    "motherfucker",
    "shit",
    "bitch",
    "cunt",
    "asshole",
];

/// Seconds of padding added around each muted word.
pub const DEFAULT_PADDING_SECS: f64 = 0.15;

/// Finds spans of the rendered timeline that must be silenced.
#[async_trait]
pub trait ProfanityDetector: Send + Sync {
    async fn detect(&self, selection: &Selection) -> MediaResult<Vec<MuteSpan>>;
}

/// Detector that never mutes anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProfanityDetector;

#[async_trait]
impl ProfanityDetector for NoProfanityDetector {
    async fn detect(&self, _selection: &Selection) -> MediaResult<Vec<MuteSpan>> {
        Ok(Vec::new())
    }
}

/// One transcribed word with source-relative timing.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TranscriptWord {
    pub word: String,
    pub start: f64,
    pub end: f64,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TranscriptFile {
    Words(Vec<TranscriptWord>),
    Wrapped { words: Vec<TranscriptWord> },
}

impl TranscriptFile {
    fn into_words(self) -> Vec<TranscriptWord> {
        match self {
            TranscriptFile::Words(words) | TranscriptFile::Wrapped { words } => words,
        }
    }
}

/// Sidecar path for a video (`clip.mp4` -> `clip.mp4.words.json`).
pub fn transcript_path(video_path: &Path) -> PathBuf {
    let mut name = video_path.as_os_str().to_os_string();
    name.push(".words.json");
    PathBuf::from(name)
}

/// Blocklist matcher over transcript sidecars.
#[derive(Debug, Clone)]
pub struct TranscriptProfanityDetector {
    blocklist: HashSet<String>,
    padding: f64,
}

impl Default for TranscriptProfanityDetector {
    fn default() -> Self {
        Self::new(DEFAULT_BLOCKLIST.iter().map(|w| w.to_string()))
    }
}

impl TranscriptProfanityDetector {
    pub fn new<I, S>(words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            blocklist: words
                .into_iter()
                .map(|w| normalize_word(w.as_ref()))
                .filter(|w| !w.is_empty())
                .collect(),
            padding: DEFAULT_PADDING_SECS,
        }
    }

    pub fn with_padding(mut self, padding: f64) -> Self {
        self.padding = padding.max(0.0);
        self
    }

    /// Map blocklisted words of each take onto the concatenated timeline.
    pub fn spans_for(
        &self,
        selection: &Selection,
        transcripts: &HashMap<PathBuf, Vec<TranscriptWord>>,
    ) -> Vec<MuteSpan> {
        let mut spans = Vec::new();
        let mut offset = 0.0;

        for entry in &selection.entries {
            let take_start = entry.start;
            let take_end = entry.start + entry.take_duration;

            if let Some(words) = transcripts.get(&entry.source_path) {
                for word in words {
                    if word.end <= take_start || word.start >= take_end {
                        continue;
                    }
                    if !self.blocklist.contains(&normalize_word(&word.word)) {
                        continue;
                    }
                    let start = (word.start - self.padding).max(take_start);
                    let end = (word.end + self.padding).min(take_end);
                    spans.push(MuteSpan::new(
                        offset + start - take_start,
                        offset + end - take_start,
                    ));
                }
            }
            offset += entry.take_duration;
        }

        merge_spans(spans)
    }
}

#[async_trait]
impl ProfanityDetector for TranscriptProfanityDetector {
    async fn detect(&self, selection: &Selection) -> MediaResult<Vec<MuteSpan>> {
        let mut transcripts = HashMap::new();

        for entry in &selection.entries {
            if transcripts.contains_key(&entry.source_path) {
                continue;
            }
            let sidecar = transcript_path(&entry.source_path);
            let bytes = match tokio::fs::read(&sidecar).await {
                Ok(bytes) => bytes,
                Err(_) => {
                    debug!(path = %sidecar.display(), "No transcript sidecar");
                    continue;
                }
            };
            match serde_json::from_slice::<TranscriptFile>(&bytes) {
                Ok(file) => {
                    transcripts.insert(entry.source_path.clone(), file.into_words());
                }
                Err(e) => warn!(path = %sidecar.display(), error = %e, "Unreadable transcript sidecar"),
            }
        }

        Ok(self.spans_for(selection, &transcripts))
    }
}

fn normalize_word(word: &str) -> String {
    word.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

/// Sort and coalesce overlapping spans.
pub fn merge_spans(mut spans: Vec<MuteSpan>) -> Vec<MuteSpan> {
    spans.sort_by(|a, b| a.start.total_cmp(&b.start));
    let mut merged: Vec<MuteSpan> = Vec::with_capacity(spans.len());
    for span in spans {
        match merged.last_mut() {
            Some(last) if span.start <= last.end => last.end = last.end.max(span.end),
            _ => merged.push(span),
        }
    }
    merged
}
