//! Reel Core - staged video generation engine
//!
//! Turns a topic or a fixed script into a narrated video by running a fixed
//! sequence of stages over one job context:
//! - Narration generation or script splitting
//! - Title resolution with caller precedence
//! - Image prompt planning driven by the frame template
//! - Per-scene production, serial or bounded-concurrent
//! - Concatenation and best-effort metadata persistence
//!
//! Content generation, rendering and storage are collaborators behind the
//! traits in [`services`].
//!
//! # Example
//!
//! ```rust,ignore
//! use reel_core::prelude::*;
//!
//! # async fn example(services: Services) -> Result<(), Box<dyn std::error::Error>> {
//! let config = EngineConfig::new().with_tasks_root("output").into_shared();
//! let driver = PipelineDriver::new(StandardPipeline::new(services, config));
//!
//! let mut ctx = JobContext::new("Why cats purr", JobParams::new().with_scenes(5));
//! let result = driver.run(&mut ctx).await?;
//!
//! println!("{} ({} scenes)", result.video_path.display(), result.frame_count);
//! # Ok(())
//! # }
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod config;
pub mod context;
pub mod error;
pub mod fanout;
pub mod params;
pub mod pipeline;
pub mod progress;
pub mod services;
pub mod split;
pub mod standard;
pub mod storyboard;
pub mod template;
pub mod tts;

// Re-exports for convenience
pub use config::{
    EngineConfig, LlmConfig, MediaConfig, PromptPrefixOverride, SharedConfig, TtsConfig,
};
pub use context::JobContext;
pub use error::{BoxError, ConfigError, ErrorCategory, PersistError, PipelineError};
pub use fanout::{AssetPolicy, FanOut};
pub use params::{BgmMode, GenerationMode, JobParams, SplitMode, TtsInferenceMode};
pub use pipeline::{PipelineDriver, Stage, VideoPipeline};
pub use progress::{
    ProgressEvent, ProgressPhase, ProgressReporter, ProgressSink, ProgressWindow, WindowedSink,
};
pub use services::{
    BatchProgress, BgmOptions, FrameProducer, ImagePromptGenerator, NarrationGenerator,
    PersistenceStore, ScriptSplitter, Services, TitleGenerator, TitleStrategy, VideoCompositor,
};
pub use split::TextSplitter;
pub use standard::{compose_image_prompt, StandardPipeline};
pub use storyboard::{
    EngineSummary, ResultSummary, Storyboard, StoryboardConfig, StoryboardFrame, TaskId,
    TaskMetadata, VideoResult,
};
pub use template::{FrameTemplate, TemplateKind};
pub use tts::{resolve_tts, TtsSelection};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for running jobs
    pub use crate::{
        EngineConfig, GenerationMode, JobContext, JobParams, PipelineDriver, PipelineError,
        ProgressEvent, ProgressSink, Services, SharedConfig, SplitMode, StandardPipeline,
        VideoPipeline, VideoResult,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
