//! Background-bed mixing through ffmpeg.

use async_trait::async_trait;
use tokio::process::Command;
use voxline_core::error::CoreError;
use voxline_core::services::{AudioMixerService, RenderedAudio};

use super::subprocess::{create_parent_dir, run_command};

/// [`AudioMixerService`] that mixes a background track under the primary
/// input with ffmpeg's `amix` filter. The output is as long as the input.
#[derive(Debug, Clone)]
pub struct FfmpegMixer {
    ffmpeg: String,
}

impl FfmpegMixer {
    pub fn new(ffmpeg: impl Into<String>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
        }
    }

    fn command(
        &self,
        input_path: &str,
        background_path: &str,
        output_path: &str,
        volume: f64,
    ) -> Command {
        let filter = format!("[1:a]volume={volume}[bg];[0:a][bg]amix=inputs=2:duration=first");
        let mut cmd = Command::new(&self.ffmpeg);
        cmd.args(["-y", "-hide_banner", "-loglevel", "error"])
            .args(["-i", input_path, "-i", background_path])
            .args(["-filter_complex", &filter])
            .arg(output_path);
        cmd
    }
}

#[async_trait]
impl AudioMixerService for FfmpegMixer {
    async fn mix(
        &self,
        input_path: &str,
        background_path: &str,
        output_path: &str,
        volume: f64,
    ) -> Result<RenderedAudio, CoreError> {
        create_parent_dir(output_path).await?;
        run_command(&mut self.command(input_path, background_path, output_path, volume)).await?;
        tracing::debug!(input_path, background_path, output_path, volume, "Mix rendered");
        Ok(RenderedAudio::new(output_path))
    }
}
