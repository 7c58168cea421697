//! Music bed generation.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::command::FfmpegCommand;
use crate::error::{MediaError, MediaResult};
use crate::render::ensure_non_empty;
use crate::tools::MediaTools;

/// Produces a music bed of a given length.
#[async_trait]
pub trait MusicGenerator: Send + Sync {
    async fn generate(&self, duration: f64, output_path: &Path) -> MediaResult<PathBuf>;
}

/// Synthesizes a soft tonal loop with ffmpeg's `aevalsrc`.
#[derive(Debug, Clone)]
pub struct ProceduralMusicGenerator {
    tools: MediaTools,
    /// Root note in Hz
    root_hz: f64,
}

impl ProceduralMusicGenerator {
    pub fn new(tools: MediaTools) -> Self {
        Self {
            tools,
            root_hz: 110.0,
        }
    }

    pub fn with_root(mut self, root_hz: f64) -> Self {
        self.root_hz = root_hz;
        self
    }
}

/// lavfi source for a root/fifth/octave pad with a slow pulse.
pub fn music_source(root_hz: f64, duration: f64) -> String {
    format!(
        "aevalsrc='0.22*sin(2*PI*{r}*t)*(0.6+0.4*sin(2*PI*0.5*t))+0.14*sin(2*PI*{f}*t)+0.08*sin(2*PI*{o}*t)*(0.5+0.5*sin(2*PI*2*t))':s=44100:d={d:.3}",
        r = root_hz,
        f = root_hz * 1.5,
        o = root_hz * 2.0,
        d = duration
    )
}

/// Fade in and out, each at most one second.
pub fn fade_filter(duration: f64) -> String {
    let fade = (duration / 4.0).min(1.0);
    format!(
        "afade=t=in:st=0:d={fade:.3},afade=t=out:st={out:.3}:d={fade:.3}",
        fade = fade,
        out = (duration - fade).max(0.0)
    )
}

#[async_trait]
impl MusicGenerator for ProceduralMusicGenerator {
    async fn generate(&self, duration: f64, output_path: &Path) -> MediaResult<PathBuf> {
        if duration.is_nan() || duration <= 0.0 {
            return Err(MediaError::internal(format!(
                "Cannot generate music of length {}",
                duration
            )));
        }

        let cmd = FfmpegCommand::new(output_path)
            .input_args(["-f", "lavfi"])
            .input_source(music_source(self.root_hz, duration))
            .audio_filter(fade_filter(duration))
            .output_args(["-c:a", "aac", "-b:a", "128k"]);

        self.tools.ffmpeg(cmd).await?;
        ensure_non_empty(output_path).await?;

        info!(duration, output = %output_path.display(), "Generated music bed");
        Ok(output_path.to_path_buf())
    }
}
