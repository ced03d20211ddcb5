//! Job context threaded through all stages

use crate::error::PipelineError;
use crate::params::JobParams;
use crate::progress::{ProgressReporter, ProgressSink};
use crate::storyboard::{Storyboard, TaskId, VideoResult};
use crate::template::FrameTemplate;
use crate::tts::TtsSelection;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Mutable state of one job
///
/// Owned by the driver for the lifetime of the job and mutated in place by
/// stages, one at a time.
#[derive(Debug)]
pub struct JobContext {
    /// Topic (generate mode) or script (fixed mode)
    pub input_text: String,
    pub params: JobParams,
    pub task_id: Option<TaskId>,
    pub task_dir: Option<PathBuf>,
    /// Frame template, parsed at setup
    pub template: Option<FrameTemplate>,
    /// Speech settings, resolved at setup
    pub tts: Option<TtsSelection>,
    /// Concatenated video inside the task directory
    pub artifact_path: Option<PathBuf>,
    /// Path reported to the caller; differs from `artifact_path` once the
    /// video has been copied to `params.output_path`
    pub final_video_path: Option<PathBuf>,
    pub narrations: Vec<String>,
    pub title: Option<String>,
    /// One slot per narration; `None` when the template needs no media
    pub image_prompts: Vec<Option<String>>,
    pub storyboard: Option<Storyboard>,
    pub result: Option<VideoResult>,
    pub progress: ProgressReporter,
}

impl JobContext {
    /// New context for `input_text`
    #[must_use]
    pub fn new(input_text: impl Into<String>, params: JobParams) -> Self {
        Self {
            input_text: input_text.into(),
            params,
            task_id: None,
            task_dir: None,
            template: None,
            tts: None,
            artifact_path: None,
            final_video_path: None,
            narrations: Vec::new(),
            title: None,
            image_prompts: Vec::new(),
            storyboard: None,
            result: None,
            progress: ProgressReporter::disabled(),
        }
    }

    /// With progress sink
    #[must_use]
    pub fn with_progress(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.progress = ProgressReporter::new(sink);
        self
    }

    /// Task id assigned at setup
    ///
    /// # Errors
    /// `PipelineError::InvalidState` before setup
    pub fn require_task_id(&self) -> Result<TaskId, PipelineError> {
        self.task_id
            .ok_or(PipelineError::InvalidState("task id not assigned"))
    }

    /// Frame template parsed at setup
    ///
    /// # Errors
    /// `PipelineError::InvalidState` before setup
    pub fn require_template(&self) -> Result<&FrameTemplate, PipelineError> {
        self.template
            .as_ref()
            .ok_or(PipelineError::InvalidState("frame template not resolved"))
    }

    /// Speech settings resolved at setup
    ///
    /// # Errors
    /// `PipelineError::InvalidState` before setup
    pub fn require_tts(&self) -> Result<&TtsSelection, PipelineError> {
        self.tts
            .as_ref()
            .ok_or(PipelineError::InvalidState("tts settings not resolved"))
    }

    /// Internal artifact path assigned at setup
    ///
    /// # Errors
    /// `PipelineError::InvalidState` before setup
    pub fn require_artifact_path(&self) -> Result<&Path, PipelineError> {
        self.artifact_path
            .as_deref()
            .ok_or(PipelineError::InvalidState("artifact path not assigned"))
    }

    /// Title resolved by the title stage
    ///
    /// # Errors
    /// `PipelineError::InvalidState` before title resolution
    pub fn require_title(&self) -> Result<&str, PipelineError> {
        self.title
            .as_deref()
            .ok_or(PipelineError::InvalidState("title not resolved"))
    }

    /// Storyboard built by the storyboard stage
    ///
    /// # Errors
    /// `PipelineError::InvalidState` before storyboard initialization
    pub fn require_storyboard(&self) -> Result<&Storyboard, PipelineError> {
        self.storyboard
            .as_ref()
            .ok_or(PipelineError::InvalidState("storyboard not initialized"))
    }

    /// Mutable storyboard
    ///
    /// # Errors
    /// `PipelineError::InvalidState` before storyboard initialization
    pub fn require_storyboard_mut(&mut self) -> Result<&mut Storyboard, PipelineError> {
        self.storyboard
            .as_mut()
            .ok_or(PipelineError::InvalidState("storyboard not initialized"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_context_has_no_derived_state() {
        let ctx = JobContext::new("topic", JobParams::new());
        assert!(ctx.require_task_id().is_err());
        assert!(ctx.require_title().is_err());
        assert!(ctx.require_template().is_err());
        assert!(ctx.require_tts().is_err());
        assert!(matches!(
            ctx.require_storyboard(),
            Err(PipelineError::InvalidState("storyboard not initialized"))
        ));
        assert!(!ctx.progress.is_enabled());
    }

    #[test]
    fn with_progress_enables_reporter() {
        let ctx = JobContext::new("topic", JobParams::new())
            .with_progress(Arc::new(|_event: crate::progress::ProgressEvent| {}));
        assert!(ctx.progress.is_enabled());
    }
}
