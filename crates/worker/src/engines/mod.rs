//! Job execution engines.
//!
//! The pool only sees the collaborator traits; [`CommandNarrator`] and
//! [`FfmpegMixer`] are the reference implementations the binary wires in.

use std::sync::Arc;

use voxline_core::error::CoreError;
use voxline_core::job::{Job, JobPayload};
use voxline_core::services::{AudioMixerService, NarratorService, RenderedAudio};

pub mod mixer;
pub mod narrator;
pub mod subprocess;

pub use mixer::FfmpegMixer;
pub use narrator::CommandNarrator;

/// The engines a worker routes jobs to, by payload type.
#[derive(Clone)]
pub struct Engines {
    pub narrator: Arc<dyn NarratorService>,
    pub mixer: Arc<dyn AudioMixerService>,
}

impl Engines {
    pub fn new(narrator: Arc<dyn NarratorService>, mixer: Arc<dyn AudioMixerService>) -> Self {
        Self { narrator, mixer }
    }

    /// Run the engine matching `job`'s payload.
    pub async fn execute(&self, job: &Job) -> Result<RenderedAudio, CoreError> {
        match job.payload() {
            JobPayload::Narration {
                text_content,
                voice_id,
            } => {
                self.narrator
                    .narrate(text_content, voice_id, job.output_file_path())
                    .await
            }
            JobPayload::Mixing {
                background_audio_file_path,
                volume,
            } => {
                self.mixer
                    .mix(
                        job.input_file_path(),
                        background_audio_file_path,
                        job.output_file_path(),
                        *volume,
                    )
                    .await
            }
        }
    }
}
