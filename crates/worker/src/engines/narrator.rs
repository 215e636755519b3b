//! Text-to-speech through a command-line synthesizer.

use async_trait::async_trait;
use tokio::process::Command;
use voxline_core::error::CoreError;
use voxline_core::services::{NarratorService, RenderedAudio};

use super::subprocess::{create_parent_dir, run_command};

/// [`NarratorService`] that shells out to an espeak-compatible program:
/// `<program> -v <voice> -w <output> -- <text>`.
#[derive(Debug, Clone)]
pub struct CommandNarrator {
    program: String,
}

impl CommandNarrator {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn command(&self, text: &str, voice_id: &str, output_path: &str) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(["-v", voice_id, "-w", output_path, "--"]).arg(text);
        cmd
    }
}

#[async_trait]
impl NarratorService for CommandNarrator {
    async fn narrate(
        &self,
        text: &str,
        voice_id: &str,
        output_path: &str,
    ) -> Result<RenderedAudio, CoreError> {
        create_parent_dir(output_path).await?;
        run_command(&mut self.command(text, voice_id, output_path)).await?;
        tracing::debug!(voice_id, output_path, "Narration rendered");
        Ok(RenderedAudio::new(output_path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_line_layout() {
        let narrator = CommandNarrator::new("espeak-ng");
        let cmd = narrator.command("-hello", "en-us", "/out/a.wav");
        let inner = cmd.as_std();
        assert_eq!(inner.get_program(), "espeak-ng");
        let args: Vec<_> = inner.get_args().map(|a| a.to_string_lossy().into_owned()).collect();
        assert_eq!(args, ["-v", "en-us", "-w", "/out/a.wav", "--", "-hello"]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn reports_written_path() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("nested/line.wav");
        // `true` ignores its arguments and exits 0.
        let narrator = CommandNarrator::new("true");

        let rendered = narrator
            .narrate("hello", "v1", output.to_str().unwrap())
            .await
            .unwrap();

        assert_eq!(rendered.output_path, output.to_str().unwrap());
        assert!(output.parent().unwrap().is_dir());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn failing_program_is_service_error() {
        let narrator = CommandNarrator::new("false");
        let err = narrator.narrate("hello", "v1", "out.wav").await.unwrap_err();
        assert!(matches!(err, CoreError::Service(_)));
    }
}
