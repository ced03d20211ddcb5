//! Collaborator contracts
//!
//! The engine never generates content, renders media or touches the metadata
//! store itself; it calls these traits. Implementations must be safe to share
//! across tasks.

use crate::error::BoxError;
use crate::params::{BgmMode, SplitMode};
use crate::progress::ProgressSink;
use crate::storyboard::{Storyboard, StoryboardConfig, StoryboardFrame, TaskId, TaskMetadata};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Batch progress callback: `(completed, total, message)`
pub type BatchProgress<'a> = &'a (dyn Fn(usize, usize, &str) + Send + Sync);

/// Title derivation strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TitleStrategy {
    /// Use the topic directly when it is short, otherwise summarize
    Auto,
    /// Always ask the language model to derive a title
    Llm,
}

/// Writes narrations from a topic
#[async_trait]
pub trait NarrationGenerator: Send + Sync {
    /// Generate `n_scenes` narrations of `min_words..=max_words` words each
    async fn generate_narrations(
        &self,
        topic: &str,
        n_scenes: usize,
        min_words: usize,
        max_words: usize,
    ) -> Result<Vec<String>, BoxError>;
}

/// Splits a fixed script into narrations
#[async_trait]
pub trait ScriptSplitter: Send + Sync {
    /// Split `text` according to `mode`
    async fn split(&self, text: &str, mode: SplitMode) -> Result<Vec<String>, BoxError>;
}

/// Derives a video title
#[async_trait]
pub trait TitleGenerator: Send + Sync {
    /// Produce a title for `text`
    async fn generate_title(&self, text: &str, strategy: TitleStrategy) -> Result<String, BoxError>;
}

/// Writes one image prompt per narration
#[async_trait]
pub trait ImagePromptGenerator: Send + Sync {
    /// Returns exactly one prompt per narration, in order
    async fn generate_image_prompts(
        &self,
        narrations: &[String],
        min_words: usize,
        max_words: usize,
        progress: BatchProgress<'_>,
    ) -> Result<Vec<String>, BoxError>;
}

/// Produces the audio, visual and composed segment of one scene
///
/// Must report sub-progress in `[0, 1]` through `progress`, and must be safe
/// to call concurrently for distinct frames.
#[async_trait]
pub trait FrameProducer: Send + Sync {
    /// Returns `frame` with `video_segment_path` and `duration` filled in
    async fn produce_frame(
        &self,
        frame: StoryboardFrame,
        config: &StoryboardConfig,
        total_frames: usize,
        progress: &dyn ProgressSink,
    ) -> Result<StoryboardFrame, BoxError>;
}

/// Background music settings for concatenation
#[derive(Debug, Clone, PartialEq)]
pub struct BgmOptions {
    pub path: PathBuf,
    /// Mix volume in `[0, 1]`
    pub volume: f64,
    pub mode: BgmMode,
}

/// Concatenates scene segments into the final video
#[async_trait]
pub trait VideoCompositor: Send + Sync {
    /// Concatenate `segments` in the given order into `output`
    ///
    /// Returns the path actually written.
    async fn concat(
        &self,
        segments: &[PathBuf],
        output: &Path,
        bgm: Option<&BgmOptions>,
    ) -> Result<PathBuf, BoxError>;
}

/// Stores job metadata and storyboards
#[async_trait]
pub trait PersistenceStore: Send + Sync {
    /// Save the metadata snapshot of a task
    async fn save_task_metadata(
        &self,
        task_id: TaskId,
        metadata: &TaskMetadata,
    ) -> Result<(), BoxError>;

    /// Save the full storyboard of a task
    async fn save_storyboard(
        &self,
        task_id: TaskId,
        storyboard: &Storyboard,
    ) -> Result<(), BoxError>;
}

/// Collaborators used by the standard pipeline
#[derive(Clone)]
pub struct Services {
    pub narrations: Arc<dyn NarrationGenerator>,
    pub splitter: Arc<dyn ScriptSplitter>,
    pub titles: Arc<dyn TitleGenerator>,
    pub image_prompts: Arc<dyn ImagePromptGenerator>,
    pub frames: Arc<dyn FrameProducer>,
    pub compositor: Arc<dyn VideoCompositor>,
    pub persistence: Arc<dyn PersistenceStore>,
}

impl std::fmt::Debug for Services {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Services").finish_non_exhaustive()
    }
}
