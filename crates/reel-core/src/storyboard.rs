//! Storyboard data model
//!
//! The storyboard is the aggregate artifact of a job: a configuration
//! snapshot, the ordered scene frames, and the cumulative duration.

use crate::params::{JobParams, TtsInferenceMode};
use crate::template::FrameTemplate;
use crate::tts::TtsSelection;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use ulid::Ulid;

/// Unique task identifier (ULID for sortability)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TaskId(pub Ulid);

impl TaskId {
    /// Generate new task ID
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for TaskId {
    type Err = ulid::DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ulid::from_string(s).map(Self)
    }
}

/// Immutable configuration snapshot shared by every scene
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoryboardConfig {
    pub task_id: TaskId,
    /// Actual scene count
    pub n_storyboard: usize,
    pub min_narration_words: usize,
    pub max_narration_words: usize,
    pub min_image_prompt_words: usize,
    pub max_image_prompt_words: usize,
    pub video_fps: u32,
    pub tts_inference_mode: TtsInferenceMode,
    pub voice_id: Option<String>,
    pub tts_workflow: Option<String>,
    pub tts_speed: f64,
    pub ref_audio: Option<PathBuf>,
    pub media_width: Option<u32>,
    pub media_height: Option<u32>,
    pub media_workflow: Option<String>,
    pub frame_template: String,
    pub template_params: Option<serde_json::Map<String, serde_json::Value>>,
}

impl StoryboardConfig {
    /// Build snapshot from request parameters and resolved settings
    #[must_use]
    pub fn from_params(
        task_id: TaskId,
        n_storyboard: usize,
        params: &JobParams,
        tts: TtsSelection,
        template: &FrameTemplate,
    ) -> Self {
        Self {
            task_id,
            n_storyboard,
            min_narration_words: params.min_narration_words,
            max_narration_words: params.max_narration_words,
            min_image_prompt_words: params.min_image_prompt_words,
            max_image_prompt_words: params.max_image_prompt_words,
            video_fps: params.video_fps,
            tts_inference_mode: tts.mode,
            voice_id: tts.voice_id,
            tts_workflow: tts.workflow,
            tts_speed: params.tts_speed,
            ref_audio: params.ref_audio.clone(),
            media_width: params.media_width,
            media_height: params.media_height,
            media_workflow: params.media_workflow.clone(),
            frame_template: template.reference().to_string(),
            template_params: params.template_params.clone(),
        }
    }

    /// Whether any workflow runs on the backend that accepts concurrent calls
    #[must_use]
    pub fn uses_concurrent_backend(&self, prefix: &str) -> bool {
        if prefix.is_empty() {
            return false;
        }
        [&self.tts_workflow, &self.media_workflow]
            .into_iter()
            .flatten()
            .any(|workflow| workflow.starts_with(prefix))
    }
}

/// One scene
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoryboardFrame {
    /// 0-based position; the only ordering used for concatenation
    pub index: usize,
    pub narration: String,
    /// `None` when the template needs no generated media
    pub image_prompt: Option<String>,
    /// Produced video segment
    pub video_segment_path: Option<PathBuf>,
    /// Segment duration in seconds
    pub duration: f64,
    pub created_at: DateTime<Utc>,
}

impl StoryboardFrame {
    /// Unproduced frame
    #[must_use]
    pub fn new(index: usize, narration: impl Into<String>, image_prompt: Option<String>) -> Self {
        Self {
            index,
            narration: narration.into(),
            image_prompt,
            video_segment_path: None,
            duration: 0.0,
            created_at: Utc::now(),
        }
    }

    /// Whether the producer has filled in the segment
    #[must_use]
    pub fn is_produced(&self) -> bool {
        self.video_segment_path.is_some()
    }
}

/// Aggregate job artifact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Storyboard {
    pub title: String,
    pub config: StoryboardConfig,
    pub frames: Vec<StoryboardFrame>,
    /// Sum of produced frame durations
    pub total_duration: f64,
    pub content_metadata: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub final_video_path: Option<PathBuf>,
}

impl Storyboard {
    /// Storyboard with frames built from narrations and prompts
    ///
    /// `image_prompts` must be as long as `narrations`.
    #[must_use]
    pub fn new(
        title: impl Into<String>,
        config: StoryboardConfig,
        narrations: &[String],
        image_prompts: &[Option<String>],
    ) -> Self {
        let frames = narrations
            .iter()
            .zip(image_prompts)
            .enumerate()
            .map(|(index, (narration, prompt))| {
                StoryboardFrame::new(index, narration.clone(), prompt.clone())
            })
            .collect();

        Self {
            title: title.into(),
            config,
            frames,
            total_duration: 0.0,
            content_metadata: None,
            created_at: Utc::now(),
            completed_at: None,
            final_video_path: None,
        }
    }

    /// With content metadata
    #[must_use]
    pub fn with_content_metadata(mut self, metadata: Option<serde_json::Value>) -> Self {
        self.content_metadata = metadata;
        self
    }

    /// Number of scenes
    #[must_use]
    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    /// Store a produced frame in its slot and add its duration
    pub fn record_produced(&mut self, frame: StoryboardFrame) {
        self.total_duration += frame.duration;
        let index = frame.index;
        self.frames[index] = frame;
    }

    /// Segment paths in index order; `None` if any scene is unproduced
    #[must_use]
    pub fn segment_paths(&self) -> Option<Vec<PathBuf>> {
        self.frames
            .iter()
            .map(|f| f.video_segment_path.clone())
            .collect()
    }
}

/// Result of a successful job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoResult {
    /// Externally visible video path
    pub video_path: PathBuf,
    /// Total duration in seconds
    pub duration: f64,
    /// Artifact size in bytes
    pub file_size: u64,
    pub frame_count: usize,
    pub storyboard: Storyboard,
}

/// Metadata snapshot persisted after success
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskMetadata {
    pub task_id: TaskId,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub status: String,
    /// Request parameters plus `text` and the resolved `title`
    pub input: serde_json::Value,
    pub result: ResultSummary,
    pub config: EngineSummary,
}

/// Result section of [`TaskMetadata`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultSummary {
    pub video_path: PathBuf,
    pub duration: f64,
    pub file_size: u64,
    pub n_frames: usize,
}

/// Engine section of [`TaskMetadata`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineSummary {
    pub llm_model: String,
    pub llm_base_url: String,
    pub media_service_url: String,
    pub concurrent_backend_enabled: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::JobParams;

    fn config(tts_workflow: Option<&str>, media_workflow: Option<&str>) -> StoryboardConfig {
        let template = FrameTemplate::parse(JobParams::DEFAULT_TEMPLATE).unwrap();
        let tts = TtsSelection {
            mode: TtsInferenceMode::Local,
            voice_id: Some("v".into()),
            workflow: tts_workflow.map(Into::into),
        };
        let mut params = JobParams::new();
        params.media_workflow = media_workflow.map(Into::into);
        StoryboardConfig::from_params(TaskId::new(), 3, &params, tts, &template)
    }

    #[test]
    fn concurrent_backend_detection() {
        assert!(config(Some("runninghub/tts.json"), None).uses_concurrent_backend("runninghub/"));
        assert!(config(None, Some("runninghub/img.json")).uses_concurrent_backend("runninghub/"));
        assert!(!config(Some("selfhost/tts.json"), None).uses_concurrent_backend("runninghub/"));
        assert!(!config(Some("runninghub/tts.json"), None).uses_concurrent_backend(""));
    }

    #[test]
    fn storyboard_frames_follow_narration_order() {
        let narrations = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let prompts = vec![None, Some("p".to_string()), None];
        let board = Storyboard::new("t", config(None, None), &narrations, &prompts);

        assert_eq!(board.frame_count(), 3);
        for (i, frame) in board.frames.iter().enumerate() {
            assert_eq!(frame.index, i);
            assert_eq!(frame.narration, narrations[i]);
            assert!(!frame.is_produced());
        }
        assert_eq!(board.frames[1].image_prompt.as_deref(), Some("p"));
        assert_eq!(board.segment_paths(), None);
    }

    #[test]
    fn record_produced_accumulates_duration() {
        let narrations = vec!["a".to_string(), "b".to_string()];
        let mut board = Storyboard::new("t", config(None, None), &narrations, &[None, None]);

        let mut second = board.frames[1].clone();
        second.video_segment_path = Some(PathBuf::from("b.mp4"));
        second.duration = 2.5;
        board.record_produced(second);

        let mut first = board.frames[0].clone();
        first.video_segment_path = Some(PathBuf::from("a.mp4"));
        first.duration = 1.5;
        board.record_produced(first);

        assert!((board.total_duration - 4.0).abs() < f64::EPSILON);
        assert_eq!(
            board.segment_paths(),
            Some(vec![PathBuf::from("a.mp4"), PathBuf::from("b.mp4")])
        );
    }

    #[test]
    fn task_id_roundtrips_through_display() {
        let id = TaskId::new();
        let parsed: TaskId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
    }
}
