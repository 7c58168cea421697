//! Resolved tool binaries plus the executor that runs them.

use std::path::{Path, PathBuf};

use crate::command::{check_ffmpeg, check_ffprobe, FfmpegCommand, ToolCommand};
use crate::error::MediaResult;
use crate::executor::{ProcessExecutor, RetryPolicy, ToolOutput};

/// Handle shared by every media component.
#[derive(Debug, Clone)]
pub struct MediaTools {
    ffmpeg: PathBuf,
    ffprobe: PathBuf,
    executor: ProcessExecutor,
}

impl MediaTools {
    pub fn new(ffmpeg: impl AsRef<Path>, ffprobe: impl AsRef<Path>, executor: ProcessExecutor) -> Self {
        Self {
            ffmpeg: ffmpeg.as_ref().to_path_buf(),
            ffprobe: ffprobe.as_ref().to_path_buf(),
            executor,
        }
    }

    /// Locate ffmpeg and ffprobe on PATH.
    pub fn discover(policy: RetryPolicy) -> MediaResult<Self> {
        let ffmpeg = check_ffmpeg()?;
        let ffprobe = check_ffprobe()?;
        Ok(Self::new(ffmpeg, ffprobe, ProcessExecutor::new(policy)))
    }

    pub fn ffmpeg_path(&self) -> &Path {
        &self.ffmpeg
    }

    pub fn ffprobe_path(&self) -> &Path {
        &self.ffprobe
    }

    pub fn executor(&self) -> &ProcessExecutor {
        &self.executor
    }

    /// Same binaries, different retry policy.
    pub fn with_policy(&self, policy: RetryPolicy) -> Self {
        Self {
            ffmpeg: self.ffmpeg.clone(),
            ffprobe: self.ffprobe.clone(),
            executor: ProcessExecutor::new(policy),
        }
    }

    /// Run an ffmpeg command through the executor.
    pub async fn ffmpeg(&self, cmd: FfmpegCommand) -> MediaResult<ToolOutput> {
        self.executor.run(&cmd.into_tool_command(&self.ffmpeg)).await
    }

    /// Run ffprobe with the given arguments through the executor.
    pub async fn ffprobe<I, S>(&self, args: I) -> MediaResult<ToolOutput>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.executor
            .run(&ToolCommand::new(&self.ffprobe).args(args))
            .await
    }
}
