//! Pipeline driver
//!
//! A job runs a fixed sequence of named stages over one [`JobContext`]:
//!
//! ```text
//! setup → content → title → visuals → storyboard → assets
//!       → post_production → finalize
//! ```
//!
//! A concrete pipeline implements [`VideoPipeline`], supplying one method per
//! stage. [`PipelineDriver`] owns the sequencing, lifecycle logging and the
//! error policy: stages never retry or get skipped, and the first failing
//! stage ends the job with its error, unchanged.

use crate::context::JobContext;
use crate::error::PipelineError;
use crate::storyboard::VideoResult;
use async_trait::async_trait;
use std::fmt;
use std::time::Instant;
use tracing::Instrument;

/// Named pipeline stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Task id and directories
    Setup,
    /// Narrations from a topic or a split script
    Content,
    /// Title resolution
    Title,
    /// Image prompt planning
    Visuals,
    /// Storyboard and frame initialization
    Storyboard,
    /// Per-scene asset production
    Assets,
    /// Concatenation and output copy
    PostProduction,
    /// Result snapshot and metadata persistence
    Finalize,
}

impl Stage {
    /// Every stage, in execution order
    pub const ALL: [Stage; 8] = [
        Stage::Setup,
        Stage::Content,
        Stage::Title,
        Stage::Visuals,
        Stage::Storyboard,
        Stage::Assets,
        Stage::PostProduction,
        Stage::Finalize,
    ];

    /// Stable stage name
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Setup => "setup",
            Self::Content => "content",
            Self::Title => "title",
            Self::Visuals => "visuals",
            Self::Storyboard => "storyboard",
            Self::Assets => "assets",
            Self::PostProduction => "post_production",
            Self::Finalize => "finalize",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One implementation per stage
///
/// Alternate workflows implement this trait, typically delegating most stages
/// to an existing pipeline and overriding a few.
#[async_trait]
pub trait VideoPipeline: Send + Sync {
    /// Pipeline name (for logging)
    fn name(&self) -> &str;

    /// Assign task id and output locations
    async fn setup_environment(&self, ctx: &mut JobContext) -> Result<(), PipelineError>;

    /// Produce the narrations
    async fn generate_content(&self, ctx: &mut JobContext) -> Result<(), PipelineError>;

    /// Resolve the title
    async fn determine_title(&self, ctx: &mut JobContext) -> Result<(), PipelineError>;

    /// Produce image prompts, or leave every slot empty
    async fn plan_visuals(&self, ctx: &mut JobContext) -> Result<(), PipelineError>;

    /// Build the configuration snapshot and scene frames
    async fn initialize_storyboard(&self, ctx: &mut JobContext) -> Result<(), PipelineError>;

    /// Produce every scene
    async fn produce_assets(&self, ctx: &mut JobContext) -> Result<(), PipelineError>;

    /// Concatenate scenes into the final video
    async fn post_production(&self, ctx: &mut JobContext) -> Result<(), PipelineError>;

    /// Compute the result and persist metadata
    async fn finalize(&self, ctx: &mut JobContext) -> Result<VideoResult, PipelineError>;

    /// Run one stage by name
    async fn run_stage(&self, stage: Stage, ctx: &mut JobContext) -> Result<(), PipelineError> {
        match stage {
            Stage::Setup => self.setup_environment(ctx).await,
            Stage::Content => self.generate_content(ctx).await,
            Stage::Title => self.determine_title(ctx).await,
            Stage::Visuals => self.plan_visuals(ctx).await,
            Stage::Storyboard => self.initialize_storyboard(ctx).await,
            Stage::Assets => self.produce_assets(ctx).await,
            Stage::PostProduction => self.post_production(ctx).await,
            Stage::Finalize => {
                let result = self.finalize(ctx).await?;
                ctx.result = Some(result);
                Ok(())
            }
        }
    }
}

/// Runs a pipeline's stages in the fixed order
#[derive(Debug)]
pub struct PipelineDriver<P> {
    pipeline: P,
}

impl<P: VideoPipeline> PipelineDriver<P> {
    /// Create driver
    #[inline]
    #[must_use]
    pub fn new(pipeline: P) -> Self {
        Self { pipeline }
    }

    /// Wrapped pipeline
    #[inline]
    #[must_use]
    pub fn pipeline(&self) -> &P {
        &self.pipeline
    }

    /// Run every stage against `ctx`
    ///
    /// # Errors
    /// The error of the first failing stage, as the stage returned it
    pub async fn run(&self, ctx: &mut JobContext) -> Result<VideoResult, PipelineError> {
        let name = self.pipeline.name().to_string();
        let job_start = Instant::now();
        tracing::info!(pipeline = %name, "Starting job");

        for stage in Stage::ALL {
            let span = tracing::info_span!("stage", name = stage.name());
            let stage_start = Instant::now();
            tracing::debug!(parent: &span, "Stage started");

            let outcome = self
                .pipeline
                .run_stage(stage, ctx)
                .instrument(span.clone())
                .await;
            let elapsed_ms = u64::try_from(stage_start.elapsed().as_millis()).unwrap_or(u64::MAX);

            if let Err(e) = outcome {
                tracing::error!(
                    parent: &span,
                    pipeline = %name,
                    category = ?e.category(),
                    elapsed_ms,
                    "Stage failed: {}",
                    e
                );
                return Err(e);
            }
            tracing::info!(parent: &span, elapsed_ms, "Stage completed");
        }

        let result = ctx
            .result
            .clone()
            .ok_or(PipelineError::InvalidState("finalize produced no result"))?;

        tracing::info!(
            pipeline = %name,
            elapsed_ms = u64::try_from(job_start.elapsed().as_millis()).unwrap_or(u64::MAX),
            video = %result.video_path.display(),
            "Job completed"
        );
        Ok(result)
    }
}
