//! Testing utilities for the reel workspace
//!
//! In-memory collaborators that record how the pipeline drives them.

#![allow(missing_docs)]

use async_trait::async_trait;
use parking_lot::Mutex;
use reel_core::{
    BatchProgress, BgmOptions, BoxError, FrameProducer, ImagePromptGenerator, NarrationGenerator,
    PersistenceStore, ProgressEvent, ProgressPhase, ProgressSink, ScriptSplitter, Services,
    SharedConfig, SplitMode, Storyboard, StoryboardConfig, StoryboardFrame, TaskId, TaskMetadata,
    TextSplitter, TitleGenerator, TitleStrategy, VideoCompositor,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Narration generator returning `"{topic} scene {i}"` for each requested scene
#[derive(Debug, Default)]
pub struct ScriptedNarrations {
    pub calls: Mutex<Vec<(String, usize)>>,
    pub fail: bool,
}

#[async_trait]
impl NarrationGenerator for ScriptedNarrations {
    async fn generate_narrations(
        &self,
        topic: &str,
        n_scenes: usize,
        _min_words: usize,
        _max_words: usize,
    ) -> Result<Vec<String>, BoxError> {
        self.calls.lock().push((topic.to_string(), n_scenes));
        if self.fail {
            return Err("narration backend unavailable".into());
        }
        Ok((0..n_scenes).map(|i| format!("{topic} scene {i}")).collect())
    }
}

/// Splitter delegating to [`TextSplitter`] and counting calls
#[derive(Debug, Default)]
pub struct CountingSplitter {
    pub calls: Mutex<Vec<SplitMode>>,
}

#[async_trait]
impl ScriptSplitter for CountingSplitter {
    async fn split(&self, text: &str, mode: SplitMode) -> Result<Vec<String>, BoxError> {
        self.calls.lock().push(mode);
        Ok(TextSplitter::split_text(text, mode))
    }
}

/// Title generator returning a fixed title and recording strategies
#[derive(Debug)]
pub struct RecordingTitles {
    pub title: String,
    pub calls: Mutex<Vec<TitleStrategy>>,
}

impl Default for RecordingTitles {
    fn default() -> Self {
        Self {
            title: "Generated Title".to_string(),
            calls: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl TitleGenerator for RecordingTitles {
    async fn generate_title(
        &self,
        _text: &str,
        strategy: TitleStrategy,
    ) -> Result<String, BoxError> {
        self.calls.lock().push(strategy);
        Ok(self.title.clone())
    }
}

/// Image prompt generator that records the configured prefix it observes
#[derive(Debug)]
pub struct CountingPrompts {
    config: SharedConfig,
    pub calls: Mutex<usize>,
    /// Prefix visible in the shared configuration during each call
    pub observed_prefixes: Mutex<Vec<Option<String>>>,
    pub fail: bool,
    /// Return one prompt fewer than requested
    pub short: bool,
}

impl CountingPrompts {
    pub fn new(config: SharedConfig) -> Self {
        Self {
            config,
            calls: Mutex::new(0),
            observed_prefixes: Mutex::new(Vec::new()),
            fail: false,
            short: false,
        }
    }

    pub fn call_count(&self) -> usize {
        *self.calls.lock()
    }
}

#[async_trait]
impl ImagePromptGenerator for CountingPrompts {
    async fn generate_image_prompts(
        &self,
        narrations: &[String],
        _min_words: usize,
        _max_words: usize,
        progress: BatchProgress<'_>,
    ) -> Result<Vec<String>, BoxError> {
        *self.calls.lock() += 1;
        let prefix = self.config.read().media.prompt_prefix.clone();
        self.observed_prefixes.lock().push(prefix);

        if self.fail {
            return Err("prompt backend unavailable".into());
        }

        let total = narrations.len();
        let mut prompts = Vec::with_capacity(total);
        for (i, narration) in narrations.iter().enumerate() {
            prompts.push(format!("picture of {narration}"));
            progress(i + 1, total, "batch done");
        }
        if self.short {
            prompts.pop();
        }
        Ok(prompts)
    }
}

/// Frame producer with per-scene durations, delays and an optional failure
#[derive(Debug)]
pub struct FakeFrameProducer {
    segment_dir: PathBuf,
    durations: Vec<f64>,
    delays: Vec<Duration>,
    fail_at: Option<usize>,
    in_flight: Mutex<usize>,
    pub max_in_flight: Mutex<usize>,
    /// Scene indices in call order
    pub started: Mutex<Vec<usize>>,
}

impl FakeFrameProducer {
    /// Producer yielding `durations[i]` seconds for scene `i` (1.0 past the end)
    pub fn new(segment_dir: impl Into<PathBuf>, durations: Vec<f64>) -> Self {
        Self {
            segment_dir: segment_dir.into(),
            durations,
            delays: Vec::new(),
            fail_at: None,
            in_flight: Mutex::new(0),
            max_in_flight: Mutex::new(0),
            started: Mutex::new(Vec::new()),
        }
    }

    /// Sleep `delays[i]` inside scene `i`
    #[must_use]
    pub fn with_delays(mut self, delays: Vec<Duration>) -> Self {
        self.delays = delays;
        self
    }

    /// Fail scene `index`
    #[must_use]
    pub fn failing_at(mut self, index: usize) -> Self {
        self.fail_at = Some(index);
        self
    }

    pub fn max_in_flight(&self) -> usize {
        *self.max_in_flight.lock()
    }

    pub fn started(&self) -> Vec<usize> {
        self.started.lock().clone()
    }
}

#[async_trait]
impl FrameProducer for FakeFrameProducer {
    async fn produce_frame(
        &self,
        mut frame: StoryboardFrame,
        _config: &StoryboardConfig,
        _total_frames: usize,
        progress: &dyn ProgressSink,
    ) -> Result<StoryboardFrame, BoxError> {
        let index = frame.index;
        self.started.lock().push(index);
        {
            let mut in_flight = self.in_flight.lock();
            *in_flight += 1;
            let mut max = self.max_in_flight.lock();
            *max = (*max).max(*in_flight);
        }

        progress.report(ProgressEvent::new(ProgressPhase::ProcessingFrame, 0.0).with_step("audio"));
        if let Some(delay) = self.delays.get(index) {
            tokio::time::sleep(*delay).await;
        }
        progress.report(
            ProgressEvent::new(ProgressPhase::ProcessingFrame, 0.5).with_step("compose"),
        );

        *self.in_flight.lock() -= 1;
        if self.fail_at == Some(index) {
            return Err(format!("render failed for scene {index}").into());
        }

        progress.report(ProgressEvent::new(ProgressPhase::ProcessingFrame, 1.0).with_step("done"));
        frame.video_segment_path = Some(self.segment_dir.join(format!("segment_{index}.mp4")));
        frame.duration = self.durations.get(index).copied().unwrap_or(1.0);
        Ok(frame)
    }
}

/// Compositor writing placeholder bytes to the output path
#[derive(Debug, Default)]
pub struct FakeCompositor {
    /// Segment lists in call order
    pub calls: Mutex<Vec<Vec<PathBuf>>>,
    pub bgm: Mutex<Vec<Option<BgmOptions>>>,
    pub fail: bool,
}

impl FakeCompositor {
    /// Bytes written per concatenated segment
    pub const BYTES_PER_SEGMENT: usize = 16;

    pub fn last_segments(&self) -> Option<Vec<PathBuf>> {
        self.calls.lock().last().cloned()
    }
}

#[async_trait]
impl VideoCompositor for FakeCompositor {
    async fn concat(
        &self,
        segments: &[PathBuf],
        output: &Path,
        bgm: Option<&BgmOptions>,
    ) -> Result<PathBuf, BoxError> {
        self.calls.lock().push(segments.to_vec());
        self.bgm.lock().push(bgm.cloned());
        if self.fail {
            return Err("ffmpeg exited with status 1".into());
        }
        let bytes = vec![0_u8; segments.len() * Self::BYTES_PER_SEGMENT];
        tokio::fs::write(output, bytes).await?;
        Ok(output.to_path_buf())
    }
}

/// Persistence store keeping everything in memory
#[derive(Debug, Default)]
pub struct MemoryPersistence {
    pub metadata: Mutex<Vec<(TaskId, TaskMetadata)>>,
    pub storyboards: Mutex<Vec<(TaskId, Storyboard)>>,
    pub fail_metadata: bool,
    pub fail_storyboard: bool,
}

#[async_trait]
impl PersistenceStore for MemoryPersistence {
    async fn save_task_metadata(
        &self,
        task_id: TaskId,
        metadata: &TaskMetadata,
    ) -> Result<(), BoxError> {
        if self.fail_metadata {
            return Err("metadata store offline".into());
        }
        self.metadata.lock().push((task_id, metadata.clone()));
        Ok(())
    }

    async fn save_storyboard(
        &self,
        task_id: TaskId,
        storyboard: &Storyboard,
    ) -> Result<(), BoxError> {
        if self.fail_storyboard {
            return Err("storyboard store offline".into());
        }
        self.storyboards.lock().push((task_id, storyboard.clone()));
        Ok(())
    }
}

/// Progress sink collecting every event
#[derive(Debug, Default)]
pub struct CollectingSink {
    events: Mutex<Vec<ProgressEvent>>,
}

impl CollectingSink {
    pub fn events(&self) -> Vec<ProgressEvent> {
        self.events.lock().clone()
    }

    pub fn values(&self) -> Vec<f64> {
        self.events.lock().iter().map(|e| e.progress).collect()
    }
}

impl ProgressSink for CollectingSink {
    fn report(&self, event: ProgressEvent) {
        self.events.lock().push(event);
    }
}

/// Concrete fakes behind a [`Services`] bundle
#[derive(Debug)]
pub struct TestServices {
    pub narrations: Arc<ScriptedNarrations>,
    pub splitter: Arc<CountingSplitter>,
    pub titles: Arc<RecordingTitles>,
    pub prompts: Arc<CountingPrompts>,
    pub frames: Arc<FakeFrameProducer>,
    pub compositor: Arc<FakeCompositor>,
    pub persistence: Arc<MemoryPersistence>,
}

impl TestServices {
    /// Default fakes; segments are named under `segment_dir`
    pub fn new(config: &SharedConfig, segment_dir: impl Into<PathBuf>) -> Self {
        Self {
            narrations: Arc::new(ScriptedNarrations::default()),
            splitter: Arc::new(CountingSplitter::default()),
            titles: Arc::new(RecordingTitles::default()),
            prompts: Arc::new(CountingPrompts::new(Arc::clone(config))),
            frames: Arc::new(FakeFrameProducer::new(segment_dir, Vec::new())),
            compositor: Arc::new(FakeCompositor::default()),
            persistence: Arc::new(MemoryPersistence::default()),
        }
    }

    #[must_use]
    pub fn with_frames(mut self, frames: FakeFrameProducer) -> Self {
        self.frames = Arc::new(frames);
        self
    }

    #[must_use]
    pub fn with_prompts(mut self, prompts: CountingPrompts) -> Self {
        self.prompts = Arc::new(prompts);
        self
    }

    #[must_use]
    pub fn with_compositor(mut self, compositor: FakeCompositor) -> Self {
        self.compositor = Arc::new(compositor);
        self
    }

    #[must_use]
    pub fn with_persistence(mut self, persistence: MemoryPersistence) -> Self {
        self.persistence = Arc::new(persistence);
        self
    }

    #[must_use]
    pub fn with_narrations(mut self, narrations: ScriptedNarrations) -> Self {
        self.narrations = Arc::new(narrations);
        self
    }

    /// Trait-object bundle for the pipeline
    pub fn services(&self) -> Services {
        Services {
            narrations: self.narrations.clone(),
            splitter: self.splitter.clone(),
            titles: self.titles.clone(),
            image_prompts: self.prompts.clone(),
            frames: self.frames.clone(),
            compositor: self.compositor.clone(),
            persistence: self.persistence.clone(),
        }
    }
}
