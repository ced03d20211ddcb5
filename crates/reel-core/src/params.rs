//! Job request parameters

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// How narrations are obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationMode {
    /// Language model writes narrations from a topic
    #[default]
    Generate,
    /// Caller supplies the script; it is split as-is
    Fixed,
}

/// Script split strategy for fixed mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SplitMode {
    /// Blank-line separated blocks
    #[default]
    Paragraph,
    /// Every non-empty line
    Line,
    /// Sentence-terminating punctuation
    Sentence,
}

impl std::str::FromStr for SplitMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "paragraph" => Ok(Self::Paragraph),
            "line" => Ok(Self::Line),
            "sentence" => Ok(Self::Sentence),
            other => Err(ConfigError::invalid_param(
                "split_mode",
                format!("unknown split mode '{other}'"),
            )),
        }
    }
}

/// Where speech is synthesized
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TtsInferenceMode {
    /// Local voice synthesis, selected by voice id
    Local,
    /// External workflow service, selected by workflow id
    #[serde(alias = "comfyui")]
    External,
}

/// Background music fitting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BgmMode {
    /// Repeat to cover the whole video
    #[default]
    Loop,
    /// Play once, trimmed to the video length
    Once,
}

/// Parameters of one job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobParams {
    pub mode: GenerationMode,
    /// Caller-supplied title; wins over any generated one
    pub title: Option<String>,
    /// Requested scene count (generate mode only)
    pub n_scenes: usize,
    pub split_mode: SplitMode,
    pub min_narration_words: usize,
    pub max_narration_words: usize,
    pub min_image_prompt_words: usize,
    pub max_image_prompt_words: usize,
    /// Frame template reference, e.g. `1080x1920/image_default.html`
    pub frame_template: Option<String>,
    /// Overrides the configured image prompt prefix for this job
    pub prompt_prefix: Option<String>,
    pub tts_inference_mode: Option<TtsInferenceMode>,
    pub tts_voice: Option<String>,
    /// Legacy voice field
    pub voice_id: Option<String>,
    pub tts_workflow: Option<String>,
    pub tts_speed: f64,
    pub ref_audio: Option<PathBuf>,
    pub media_width: Option<u32>,
    pub media_height: Option<u32>,
    pub media_workflow: Option<String>,
    pub video_fps: u32,
    pub template_params: Option<serde_json::Map<String, serde_json::Value>>,
    /// Extra copy destination for the final video
    pub output_path: Option<PathBuf>,
    pub bgm_path: Option<PathBuf>,
    pub bgm_volume: f64,
    pub bgm_mode: BgmMode,
    pub content_metadata: Option<serde_json::Value>,
}

impl JobParams {
    /// Default frame template
    pub const DEFAULT_TEMPLATE: &'static str = "1080x1920/default.html";

    /// Create default parameters
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fixed-script parameters
    #[inline]
    #[must_use]
    pub fn fixed(split_mode: SplitMode) -> Self {
        Self {
            mode: GenerationMode::Fixed,
            split_mode,
            ..Self::default()
        }
    }

    /// With title
    #[inline]
    #[must_use]
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// With requested scene count
    #[inline]
    #[must_use]
    pub fn with_scenes(mut self, n_scenes: usize) -> Self {
        self.n_scenes = n_scenes;
        self
    }

    /// With frame template
    #[inline]
    #[must_use]
    pub fn with_template(mut self, template: impl Into<String>) -> Self {
        self.frame_template = Some(template.into());
        self
    }

    /// Frame template reference, falling back to the default
    #[must_use]
    pub fn frame_template(&self) -> &str {
        self.frame_template
            .as_deref()
            .filter(|t| !t.trim().is_empty())
            .unwrap_or(Self::DEFAULT_TEMPLATE)
    }

    /// Check word bounds, speed and volume
    ///
    /// # Errors
    /// `ConfigError::InvalidParam` naming the first offending field
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_narration_words > self.max_narration_words {
            return Err(ConfigError::invalid_param(
                "min_narration_words",
                "exceeds max_narration_words",
            ));
        }
        if self.min_image_prompt_words > self.max_image_prompt_words {
            return Err(ConfigError::invalid_param(
                "min_image_prompt_words",
                "exceeds max_image_prompt_words",
            ));
        }
        if self.mode == GenerationMode::Generate && self.n_scenes == 0 {
            return Err(ConfigError::invalid_param("n_scenes", "must be at least 1"));
        }
        if !(self.tts_speed.is_finite() && self.tts_speed > 0.0) {
            return Err(ConfigError::invalid_param("tts_speed", "must be positive"));
        }
        if !(0.0..=1.0).contains(&self.bgm_volume) {
            return Err(ConfigError::invalid_param("bgm_volume", "must be within [0, 1]"));
        }
        Ok(())
    }
}

impl Default for JobParams {
    fn default() -> Self {
        Self {
            mode: GenerationMode::Generate,
            title: None,
            n_scenes: 5,
            split_mode: SplitMode::Paragraph,
            min_narration_words: 5,
            max_narration_words: 20,
            min_image_prompt_words: 30,
            max_image_prompt_words: 60,
            frame_template: None,
            prompt_prefix: None,
            tts_inference_mode: None,
            tts_voice: None,
            voice_id: None,
            tts_workflow: None,
            tts_speed: 1.2,
            ref_audio: None,
            media_width: None,
            media_height: None,
            media_workflow: None,
            video_fps: 30,
            template_params: None,
            output_path: None,
            bgm_path: None,
            bgm_volume: 0.2,
            bgm_mode: BgmMode::Loop,
            content_metadata: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_standard_job() {
        let params = JobParams::new();
        assert_eq!(params.mode, GenerationMode::Generate);
        assert_eq!(params.n_scenes, 5);
        assert_eq!(params.frame_template(), JobParams::DEFAULT_TEMPLATE);
        assert!(params.validate().is_ok());
    }

    #[test]
    fn deserialize_request() {
        let params: JobParams = serde_json::from_value(serde_json::json!({
            "mode": "fixed",
            "split_mode": "line",
            "tts_inference_mode": "comfyui",
            "tts_workflow": "runninghub/tts.json",
            "bgm_mode": "once"
        }))
        .unwrap();

        assert_eq!(params.mode, GenerationMode::Fixed);
        assert_eq!(params.split_mode, SplitMode::Line);
        assert_eq!(params.tts_inference_mode, Some(TtsInferenceMode::External));
        assert_eq!(params.bgm_mode, BgmMode::Once);
        assert_eq!(params.max_image_prompt_words, 60);
    }

    #[test]
    fn blank_template_falls_back() {
        let params = JobParams::new().with_template("  ");
        assert_eq!(params.frame_template(), JobParams::DEFAULT_TEMPLATE);
    }

    #[test]
    fn split_mode_from_str() {
        assert_eq!("Sentence".parse::<SplitMode>().unwrap(), SplitMode::Sentence);
        assert!("words".parse::<SplitMode>().is_err());
    }

    #[test]
    fn validate_rejects_inverted_bounds() {
        let mut params = JobParams::new();
        params.min_narration_words = 30;
        assert!(matches!(
            params.validate(),
            Err(ConfigError::InvalidParam { name: "min_narration_words", .. })
        ));
    }

    #[test]
    fn fixed_mode_ignores_zero_scene_hint() {
        let params = JobParams::fixed(SplitMode::Paragraph).with_scenes(0);
        assert!(params.validate().is_ok());
    }
}
