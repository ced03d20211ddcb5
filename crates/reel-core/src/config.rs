//! Engine configuration
//!
//! Engine-wide settings loaded from TOML, shared between the pipeline and
//! collaborators through [`SharedConfig`].

use crate::error::ConfigError;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Semaphore;

/// Configuration shared with collaborators at call time
pub type SharedConfig = Arc<RwLock<EngineConfig>>;

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Root directory for per-task output directories
    pub tasks_root: PathBuf,
    /// File name of the concatenated video inside a task directory
    pub final_video_name: String,
    /// Language model settings (recorded in task metadata)
    pub llm: LlmConfig,
    /// Text-to-speech defaults
    pub tts: TtsConfig,
    /// Media generation backend settings
    pub media: MediaConfig,
}

impl EngineConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse from TOML text
    ///
    /// # Errors
    /// `ConfigError::Parse` if the text is not a valid configuration
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a TOML file
    ///
    /// # Errors
    /// `ConfigError::Io` if the file cannot be read, `ConfigError::Parse` if
    /// it is malformed
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Check value ranges
    ///
    /// # Errors
    /// `ConfigError::InvalidParam` for a concurrency limit outside
    /// `1..=Semaphore::MAX_PERMITS` or an empty video file name
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.media.concurrent_limit == 0 {
            return Err(ConfigError::invalid_param(
                "media.concurrent_limit",
                "must be at least 1",
            ));
        }
        if self.media.concurrent_limit > Semaphore::MAX_PERMITS {
            return Err(ConfigError::invalid_param(
                "media.concurrent_limit",
                format!("must not exceed {}", Semaphore::MAX_PERMITS),
            ));
        }
        if self.final_video_name.trim().is_empty() {
            return Err(ConfigError::invalid_param(
                "final_video_name",
                "must not be empty",
            ));
        }
        Ok(())
    }

    /// With tasks root
    #[inline]
    #[must_use]
    pub fn with_tasks_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.tasks_root = root.into();
        self
    }

    /// With concurrent scene limit
    #[inline]
    #[must_use]
    pub fn with_concurrent_limit(mut self, limit: usize) -> Self {
        self.media.concurrent_limit = limit;
        self
    }

    /// With configured image prompt prefix
    #[inline]
    #[must_use]
    pub fn with_prompt_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.media.prompt_prefix = Some(prefix.into());
        self
    }

    /// Wrap for sharing
    #[must_use]
    pub fn into_shared(self) -> SharedConfig {
        Arc::new(RwLock::new(self))
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tasks_root: PathBuf::from("output"),
            final_video_name: "final.mp4".to_string(),
            llm: LlmConfig::default(),
            tts: TtsConfig::default(),
            media: MediaConfig::default(),
        }
    }
}

/// Language model settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Model name
    pub model: String,
    /// API base URL
    pub base_url: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: "unknown".to_string(),
            base_url: "unknown".to_string(),
        }
    }
}

/// Text-to-speech defaults
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TtsConfig {
    /// Voice used when the request names none
    pub default_voice: String,
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            default_voice: "zh-CN-YunjianNeural".to_string(),
        }
    }
}

/// Media generation backend settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MediaConfig {
    /// Media service URL (recorded in task metadata)
    pub service_url: String,
    /// Whether a key for the concurrent-capable backend is configured
    pub api_key_configured: bool,
    /// Workflow identifier prefix of the backend that accepts concurrent calls
    pub concurrent_backend_prefix: String,
    /// Maximum scene producer calls in flight on that backend
    pub concurrent_limit: usize,
    /// Prefix prepended to every image prompt
    pub prompt_prefix: Option<String>,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            service_url: "unknown".to_string(),
            api_key_configured: false,
            concurrent_backend_prefix: "runninghub/".to_string(),
            concurrent_limit: 1,
            prompt_prefix: None,
        }
    }
}

/// Scoped override of the media prompt prefix
///
/// Acquiring swaps the prefix in the shared configuration; dropping the guard
/// puts the prior value back (including "unset"), on every exit path.
#[derive(Debug)]
#[must_use = "the override is restored as soon as the guard is dropped"]
pub struct PromptPrefixOverride {
    config: SharedConfig,
    previous: Option<String>,
}

impl PromptPrefixOverride {
    /// Install `prefix`, remembering the current value
    pub fn acquire(config: &SharedConfig, prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        let previous = {
            let mut guard = config.write();
            guard.media.prompt_prefix.replace(prefix)
        };
        Self {
            config: Arc::clone(config),
            previous,
        }
    }

    /// Value that will be restored
    #[must_use]
    pub fn previous(&self) -> Option<&str> {
        self.previous.as_deref()
    }
}

impl Drop for PromptPrefixOverride {
    fn drop(&mut self) {
        self.config.write().media.prompt_prefix = self.previous.take();
    }
}
