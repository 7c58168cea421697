//! Pipeline stages and their failure semantics.

use std::fmt;

use reelcut_media::MediaError;
use reelcut_models::ErrorDetail;

/// A named pipeline stage with its slice of the progress bar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageDescriptor {
    pub name: &'static str,
    /// Failure of a critical stage fails the job
    pub critical: bool,
    pub start: u8,
    pub end: u8,
}

impl StageDescriptor {
    /// Percentage reached after `fraction` of this stage.
    pub fn percent_at(&self, fraction: f64) -> u8 {
        let fraction = if fraction.is_finite() {
            fraction.clamp(0.0, 1.0)
        } else {
            0.0
        };
        let span = f64::from(self.end - self.start);
        self.start + (span * fraction).round() as u8
    }
}

pub const COLLECT: StageDescriptor = StageDescriptor {
    name: "collect",
    critical: true,
    start: 0,
    end: 5,
};

pub const PREPROCESS: StageDescriptor = StageDescriptor {
    name: "preprocess",
    critical: true,
    start: 5,
    end: 20,
};

/// Scene detection, signal scoring and selection.
pub const DETECT: StageDescriptor = StageDescriptor {
    name: "detect",
    critical: false,
    start: 20,
    end: 50,
};

pub const RENDER: StageDescriptor = StageDescriptor {
    name: "render",
    critical: true,
    start: 50,
    end: 80,
};

pub const MUSIC: StageDescriptor = StageDescriptor {
    name: "music",
    critical: false,
    start: 80,
    end: 85,
};

pub const PROFANITY: StageDescriptor = StageDescriptor {
    name: "profanity",
    critical: false,
    start: 85,
    end: 87,
};

pub const MIX: StageDescriptor = StageDescriptor {
    name: "mix",
    critical: false,
    start: 87,
    end: 95,
};

pub const UPLOAD: StageDescriptor = StageDescriptor {
    name: "upload",
    critical: false,
    start: 95,
    end: 100,
};

pub const ALL_STAGES: [StageDescriptor; 8] =
    [COLLECT, PREPROCESS, DETECT, RENDER, MUSIC, PROFANITY, MIX, UPLOAD];

/// Failure of one stage (or one item within it).
#[derive(Debug, Clone, PartialEq)]
pub struct StageError {
    pub stage: &'static str,
    /// Short sanitized message for the job record
    pub message: String,
    /// Command line, stderr and other internals
    pub diagnostics: String,
    pub retryable: bool,
}

impl StageError {
    pub fn new(stage: &StageDescriptor, message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            stage: stage.name,
            diagnostics: message.clone(),
            message,
            retryable: false,
        }
    }

    pub fn from_media(stage: &StageDescriptor, err: &MediaError) -> Self {
        Self {
            stage: stage.name,
            message: err.user_message(),
            diagnostics: err.diagnostics(),
            retryable: err.is_retryable(),
        }
    }

    pub fn with_diagnostics(mut self, diagnostics: impl Into<String>) -> Self {
        self.diagnostics = diagnostics.into();
        self
    }

    pub fn retryable(mut self, retryable: bool) -> Self {
        self.retryable = retryable;
        self
    }

    /// Detail entry; the record's `error` field only ever gets `message`.
    pub fn to_detail(&self, critical: bool) -> ErrorDetail {
        let detail = if critical {
            ErrorDetail::critical(self.stage, &self.diagnostics)
        } else {
            ErrorDetail::warning(self.stage, &self.diagnostics)
        };
        detail.with_retryable(self.retryable)
    }
}

impl fmt::Display for StageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} stage failed: {}", self.stage, self.message)
    }
}

impl std::error::Error for StageError {}

pub type StageResult<T> = Result<T, StageError>;

#[cfg(test)]
mod tests {
    use super::*;
    use reelcut_models::ErrorCategory;

    #[test]
    fn test_stage_ranges_are_contiguous() {
        assert_eq!(ALL_STAGES[0].start, 0);
        for pair in ALL_STAGES.windows(2) {
            assert_eq!(pair[0].end, pair[1].start);
        }
        assert_eq!(ALL_STAGES[ALL_STAGES.len() - 1].end, 100);
    }

    #[test]
    fn test_critical_stages() {
        let critical: Vec<&str> = ALL_STAGES
            .iter()
            .filter(|s| s.critical)
            .map(|s| s.name)
            .collect();
        assert_eq!(critical, vec!["collect", "preprocess", "render"]);
    }

    #[test]
    fn test_percent_at() {
        assert_eq!(RENDER.percent_at(0.0), 50);
        assert_eq!(RENDER.percent_at(0.5), 65);
        assert_eq!(RENDER.percent_at(2.0), 80);
        assert_eq!(RENDER.percent_at(f64::NAN), 50);
    }

    #[test]
    fn test_detail_keeps_diagnostics_out_of_message() {
        let err = StageError::new(&MUSIC, "Music generation failed.")
            .with_diagnostics("ffmpeg -f lavfi ... exit 1")
            .retryable(true);
        let detail = err.to_detail(false);
        assert_eq!(detail.category, ErrorCategory::Warning);
        assert_eq!(detail.stage, "music");
        assert!(detail.error.contains("exit 1"));
        assert!(detail.retryable);
        assert_eq!(err.message, "Music generation failed.");
    }
}
