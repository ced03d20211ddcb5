//! Standard video pipeline
//!
//! Topic or fixed script in, one concatenated video out:
//!
//! 1. Setup - template and TTS resolution, task id, task directory
//!    (configuration errors surface here, before any collaborator call)
//! 2. Content - narrations from a topic, or the split script
//! 3. Title - caller title, else generated
//! 4. Visuals - image prompts when the frame template renders media
//! 5. Storyboard - TTS resolution, config snapshot, frames
//! 6. Assets - per-scene production through [`FanOut`]
//! 7. Post-production - concatenation, optional copy to `output_path`
//! 8. Finalize - result snapshot, best-effort persistence

use crate::config::{PromptPrefixOverride, SharedConfig};
use crate::context::JobContext;
use crate::error::{PersistError, PipelineError};
use crate::fanout::{AssetPolicy, FanOut};
use crate::params::GenerationMode;
use crate::pipeline::VideoPipeline;
use crate::progress::{ProgressEvent, ProgressPhase, ProgressWindow};
use crate::services::{BgmOptions, Services, TitleStrategy};
use crate::storyboard::{
    EngineSummary, ResultSummary, Storyboard, StoryboardConfig, TaskId, TaskMetadata, VideoResult,
};
use crate::template::FrameTemplate;
use crate::tts::resolve_tts;
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;

/// Overall progress checkpoints
pub mod milestones {
    /// Narration generation or script splitting started
    pub const CONTENT: f64 = 0.05;
    /// Title generation started
    pub const TITLE: f64 = 0.10;
    /// Image prompt window start
    pub const PROMPTS_START: f64 = 0.10;
    /// Image prompt window width
    pub const PROMPTS_SPAN: f64 = 0.10;
    /// Asset production window start
    pub const ASSETS_START: f64 = 0.20;
    /// Asset production window width
    pub const ASSETS_SPAN: f64 = 0.60;
    /// Concatenation started
    pub const CONCAT: f64 = 0.85;
    /// Job complete
    pub const DONE: f64 = 1.0;
}

/// Join a prompt prefix and a generated prompt
#[must_use]
pub fn compose_image_prompt(prefix: Option<&str>, prompt: &str) -> String {
    match prefix.map(str::trim).filter(|p| !p.is_empty()) {
        Some(prefix) => format!("{prefix}, {prompt}"),
        None => prompt.to_string(),
    }
}

/// The default pipeline
#[derive(Debug, Clone)]
pub struct StandardPipeline {
    services: Services,
    config: SharedConfig,
}

impl StandardPipeline {
    /// Create pipeline over collaborators and shared configuration
    #[must_use]
    pub fn new(services: Services, config: SharedConfig) -> Self {
        Self { services, config }
    }

    /// Collaborators
    #[must_use]
    pub fn services(&self) -> &Services {
        &self.services
    }

    /// Shared configuration
    #[must_use]
    pub fn config(&self) -> &SharedConfig {
        &self.config
    }

    /// Generate image prompts while the caller's prefix override is active
    async fn generate_prompts(
        &self,
        ctx: &JobContext,
    ) -> Result<Vec<Option<String>>, PipelineError> {
        let params = &ctx.params;
        let _override = params.prompt_prefix.as_deref().map(|prefix| {
            tracing::info!(prefix, "Using custom prompt prefix");
            PromptPrefixOverride::acquire(&self.config, prefix)
        });

        let reporter = ctx.progress.clone();
        let window = ProgressWindow::new(milestones::PROMPTS_START, milestones::PROMPTS_SPAN);
        let on_batch = move |completed: usize, total: usize, message: &str| {
            #[allow(clippy::cast_precision_loss)]
            let fraction = if total > 0 {
                completed as f64 / total as f64
            } else {
                0.0
            };
            reporter.emit(
                ProgressEvent::new(ProgressPhase::GeneratingImagePrompts, window.map(fraction))
                    .with_extra(message),
            );
        };

        let prompts = self
            .services
            .image_prompts
            .generate_image_prompts(
                &ctx.narrations,
                params.min_image_prompt_words,
                params.max_image_prompt_words,
                &on_batch,
            )
            .await
            .map_err(|e| PipelineError::generation("image prompt", e))?;

        if prompts.len() != ctx.narrations.len() {
            return Err(PipelineError::InvalidOutput {
                what: "image prompt",
                message: format!(
                    "expected {} prompts, got {}",
                    ctx.narrations.len(),
                    prompts.len()
                ),
            });
        }

        let prefix = self.config.read().media.prompt_prefix.clone();
        Ok(prompts
            .iter()
            .map(|prompt| Some(compose_image_prompt(prefix.as_deref(), prompt)))
            .collect())
    }

    /// Save metadata and storyboard
    async fn persist_task_data(
        &self,
        ctx: &JobContext,
        result: &VideoResult,
    ) -> Result<(), PersistError> {
        let storyboard = &result.storyboard;
        let task_id = storyboard.config.task_id;
        let metadata = self.build_metadata(ctx, task_id, result)?;

        self.services
            .persistence
            .save_task_metadata(task_id, &metadata)
            .await
            .map_err(|source| PersistError::Save {
                task_id: task_id.to_string(),
                what: "metadata",
                source,
            })?;
        tracing::info!(%task_id, "Saved task metadata");

        self.services
            .persistence
            .save_storyboard(task_id, storyboard)
            .await
            .map_err(|source| PersistError::Save {
                task_id: task_id.to_string(),
                what: "storyboard",
                source,
            })?;
        tracing::info!(%task_id, "Saved storyboard");
        Ok(())
    }

    fn build_metadata(
        &self,
        ctx: &JobContext,
        task_id: TaskId,
        result: &VideoResult,
    ) -> Result<TaskMetadata, PersistError> {
        let storyboard = &result.storyboard;
        let mut input = serde_json::to_value(&ctx.params)?;
        if let Some(fields) = input.as_object_mut() {
            fields.insert("text".to_string(), ctx.input_text.clone().into());
            fields.insert("title".to_string(), storyboard.title.clone().into());
        }

        let config = self.config.read();
        Ok(TaskMetadata {
            task_id,
            created_at: storyboard.created_at,
            completed_at: storyboard.completed_at,
            status: "completed".to_string(),
            input,
            result: ResultSummary {
                video_path: result.video_path.clone(),
                duration: result.duration,
                file_size: result.file_size,
                n_frames: result.frame_count,
            },
            config: EngineSummary {
                llm_model: config.llm.model.clone(),
                llm_base_url: config.llm.base_url.clone(),
                media_service_url: config.media.service_url.clone(),
                concurrent_backend_enabled: config.media.api_key_configured,
            },
        })
    }
}

#[async_trait]
impl VideoPipeline for StandardPipeline {
    fn name(&self) -> &str {
        "standard"
    }

    async fn setup_environment(&self, ctx: &mut JobContext) -> Result<(), PipelineError> {
        ctx.params.validate()?;
        let template = FrameTemplate::parse(ctx.params.frame_template())?;
        let default_voice = self.config.read().tts.default_voice.clone();
        let tts = resolve_tts(&ctx.params, &default_voice)?;
        tracing::info!(
            mode = ?ctx.params.mode,
            text_chars = ctx.input_text.chars().count(),
            "Starting standard pipeline"
        );

        let (tasks_root, video_name) = {
            let config = self.config.read();
            (config.tasks_root.clone(), config.final_video_name.clone())
        };

        let task_id = TaskId::new();
        let task_dir = tasks_root.join(task_id.to_string());
        tokio::fs::create_dir_all(&task_dir)
            .await
            .map_err(|e| PipelineError::io(&task_dir, e))?;

        let artifact = task_dir.join(video_name);
        tracing::info!(%task_id, dir = %task_dir.display(), "Task directory created");
        if let Some(output) = &ctx.params.output_path {
            tracing::info!(output = %output.display(), "Final video will be copied");
        }

        ctx.template = Some(template);
        ctx.tts = Some(tts);
        ctx.task_id = Some(task_id);
        ctx.task_dir = Some(task_dir);
        ctx.final_video_path = Some(artifact.clone());
        ctx.artifact_path = Some(artifact);
        Ok(())
    }

    async fn generate_content(&self, ctx: &mut JobContext) -> Result<(), PipelineError> {
        let params = &ctx.params;
        let narrations = match params.mode {
            GenerationMode::Generate => {
                ctx.progress.phase(ProgressPhase::GeneratingNarrations, milestones::CONTENT);
                let narrations = self
                    .services
                    .narrations
                    .generate_narrations(
                        &ctx.input_text,
                        params.n_scenes,
                        params.min_narration_words,
                        params.max_narration_words,
                    )
                    .await
                    .map_err(|e| PipelineError::generation("narration", e))?;
                tracing::info!(count = narrations.len(), "Generated narrations");
                narrations
            }
            GenerationMode::Fixed => {
                ctx.progress.phase(ProgressPhase::SplittingScript, milestones::CONTENT);
                let narrations = self
                    .services
                    .splitter
                    .split(&ctx.input_text, params.split_mode)
                    .await
                    .map_err(|e| PipelineError::generation("script split", e))?;
                tracing::info!(
                    count = narrations.len(),
                    split_mode = ?params.split_mode,
                    "Split script into segments"
                );
                tracing::info!(
                    n_scenes = params.n_scenes,
                    "Requested scene count ignored in fixed mode"
                );
                narrations
            }
        };

        if narrations.is_empty() {
            return Err(PipelineError::InvalidOutput {
                what: "narration",
                message: "no narrations produced".to_string(),
            });
        }
        ctx.narrations = narrations;
        Ok(())
    }

    async fn determine_title(&self, ctx: &mut JobContext) -> Result<(), PipelineError> {
        if ctx.title.is_some() {
            return Ok(());
        }

        let caller_title = ctx.params.title.as_deref().filter(|t| !t.trim().is_empty());
        if let Some(title) = caller_title {
            tracing::info!(title, "Using caller title");
            ctx.title = Some(title.to_string());
            return Ok(());
        }

        ctx.progress.phase(ProgressPhase::GeneratingTitle, milestones::TITLE);
        let strategy = match ctx.params.mode {
            GenerationMode::Generate => TitleStrategy::Auto,
            GenerationMode::Fixed => TitleStrategy::Llm,
        };
        let title = self
            .services
            .titles
            .generate_title(&ctx.input_text, strategy)
            .await
            .map_err(|e| PipelineError::generation("title", e))?;
        tracing::info!(title, ?strategy, "Generated title");
        ctx.title = Some(title);
        Ok(())
    }

    async fn plan_visuals(&self, ctx: &mut JobContext) -> Result<(), PipelineError> {
        let template = ctx.require_template()?.clone();
        let kind = template.kind();

        if !kind.requires_media() {
            tracing::info!(
                template = template.reference(),
                skipped_calls = ctx.narrations.len(),
                "Static template, skipping image prompt generation"
            );
            ctx.image_prompts = vec![None; ctx.narrations.len()];
            return Ok(());
        }

        tracing::info!(
            template = template.reference(),
            ?kind,
            "Template requires generated media"
        );
        ctx.progress.phase(ProgressPhase::GeneratingImagePrompts, milestones::PROMPTS_START);
        ctx.image_prompts = self.generate_prompts(ctx).await?;
        tracing::info!(count = ctx.image_prompts.len(), "Generated image prompts");
        Ok(())
    }

    async fn initialize_storyboard(&self, ctx: &mut JobContext) -> Result<(), PipelineError> {
        let template = ctx.require_template()?;
        let tts = ctx.require_tts()?.clone();
        let task_id = ctx.require_task_id()?;
        let title = ctx.require_title()?.to_string();

        if ctx.image_prompts.len() != ctx.narrations.len() {
            return Err(PipelineError::InvalidState("image prompts not planned"));
        }

        let n_frames = ctx.narrations.len();
        let config = StoryboardConfig::from_params(task_id, n_frames, &ctx.params, tts, template);
        let storyboard = Storyboard::new(title, config, &ctx.narrations, &ctx.image_prompts)
            .with_content_metadata(ctx.params.content_metadata.clone());

        tracing::info!(frames = storyboard.frame_count(), "Storyboard initialized");
        ctx.storyboard = Some(storyboard);
        Ok(())
    }

    async fn produce_assets(&self, ctx: &mut JobContext) -> Result<(), PipelineError> {
        let (prefix, limit) = {
            let config = self.config.read();
            (
                config.media.concurrent_backend_prefix.clone(),
                config.media.concurrent_limit,
            )
        };

        let reporter = ctx.progress.clone();
        let storyboard = ctx.require_storyboard_mut()?;
        let policy = AssetPolicy::select(storyboard.config.uses_concurrent_backend(&prefix), limit);
        let fanout = FanOut::new(
            Arc::clone(&self.services.frames),
            reporter,
            ProgressWindow::new(milestones::ASSETS_START, milestones::ASSETS_SPAN),
        );

        let produced = fanout
            .run(policy, storyboard.frames.clone(), Arc::new(storyboard.config.clone()))
            .await?;

        for frame in produced {
            storyboard.record_produced(frame);
        }
        tracing::info!(
            ?policy,
            total_duration = storyboard.total_duration,
            "All scenes produced"
        );
        Ok(())
    }

    async fn post_production(&self, ctx: &mut JobContext) -> Result<(), PipelineError> {
        ctx.progress.phase(ProgressPhase::Concatenating, milestones::CONCAT);

        let artifact = ctx.require_artifact_path()?.to_path_buf();
        let segments = ctx
            .require_storyboard()?
            .segment_paths()
            .ok_or(PipelineError::InvalidState("scenes not produced"))?;

        let bgm = ctx.params.bgm_path.clone().map(|path| BgmOptions {
            path,
            volume: ctx.params.bgm_volume,
            mode: ctx.params.bgm_mode,
        });

        let written = self
            .services
            .compositor
            .concat(&segments, &artifact, bgm.as_ref())
            .await
            .map_err(|e| PipelineError::composition("segment concatenation", e))?;
        ctx.artifact_path = Some(written.clone());
        ctx.final_video_path = Some(written.clone());

        if let Some(output) = ctx.params.output_path.clone() {
            if output != written {
                if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
                    tokio::fs::create_dir_all(parent)
                        .await
                        .map_err(|e| PipelineError::composition("create output directory", e))?;
                }
                tokio::fs::copy(&written, &output)
                    .await
                    .map_err(|e| PipelineError::composition("copy to output path", e))?;
                tracing::info!(output = %output.display(), "Final video copied");
                ctx.final_video_path = Some(output);
            }
        }

        let visible = ctx.final_video_path.clone();
        let storyboard = ctx.require_storyboard_mut()?;
        storyboard.final_video_path = visible;
        storyboard.completed_at = Some(Utc::now());
        tracing::info!(video = %written.display(), "Video composed");
        Ok(())
    }

    async fn finalize(&self, ctx: &mut JobContext) -> Result<VideoResult, PipelineError> {
        let artifact = ctx.require_artifact_path()?.to_path_buf();
        let metadata = tokio::fs::metadata(&artifact)
            .await
            .map_err(|e| PipelineError::io(&artifact, e))?;

        let storyboard = ctx.require_storyboard()?.clone();
        let video_path = ctx.final_video_path.clone().unwrap_or_else(|| artifact.clone());
        let result = VideoResult {
            video_path,
            duration: storyboard.total_duration,
            file_size: metadata.len(),
            frame_count: storyboard.frame_count(),
            storyboard,
        };

        ctx.progress.phase(ProgressPhase::Completed, milestones::DONE);
        #[allow(clippy::cast_precision_loss)]
        let size_mb = result.file_size as f64 / (1024.0 * 1024.0);
        tracing::info!(
            video = %result.video_path.display(),
            duration = result.duration,
            size_mb,
            frames = result.frame_count,
            "Generated video"
        );

        if ctx.task_id.is_none() {
            tracing::warn!("No task id assigned, skipping persistence");
        } else if let Err(e) = self.persist_task_data(ctx, &result).await {
            tracing::error!("Failed to persist task data: {}", e);
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_prefix_joined_when_present() {
        assert_eq!(
            compose_image_prompt(Some("anime style"), "a cat"),
            "anime style, a cat"
        );
        assert_eq!(compose_image_prompt(Some("  "), "a cat"), "a cat");
        assert_eq!(compose_image_prompt(None, "a cat"), "a cat");
    }

    #[test]
    fn milestones_are_ordered() {
        let points = [
            milestones::CONTENT,
            milestones::TITLE,
            milestones::PROMPTS_START + milestones::PROMPTS_SPAN,
            milestones::ASSETS_START + milestones::ASSETS_SPAN,
            milestones::CONCAT,
            milestones::DONE,
        ];
        assert!(points.windows(2).all(|w| w[0] <= w[1]));
        let prompts_end = milestones::PROMPTS_START + milestones::PROMPTS_SPAN;
        assert!((prompts_end - milestones::ASSETS_START).abs() < 1e-12);
    }
}
