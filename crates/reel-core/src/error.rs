//! Error types for the pipeline engine
//!
//! Failures are classified once, where they happen:
//! - Configuration and resolution errors (before any external call)
//! - Generation errors from narration/title/prompt collaborators
//! - Per-scene asset production errors
//! - Composition errors (concatenation, copy to output)
//! - Persistence errors, which are recovered locally and never escalated

use std::path::PathBuf;

/// Error type returned by external collaborators
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Fatal pipeline error
///
/// A stage is the unit of failure: the first stage returning one of these
/// terminates the job, and the driver propagates it unchanged.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Configuration or parameter resolution failed
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A content collaborator (narrations, title, prompts) failed
    #[error("{what} generation failed: {source}")]
    Generation {
        /// What was being generated
        what: &'static str,
        /// Collaborator error
        #[source]
        source: BoxError,
    },

    /// A collaborator returned output that breaks a job invariant
    #[error("{what} generation returned invalid output: {message}")]
    InvalidOutput {
        /// What was being generated
        what: &'static str,
        /// Description of the violation
        message: String,
    },

    /// Asset production for one scene failed
    #[error("scene {index} failed: {source}")]
    SceneFailed {
        /// Scene index (0-based)
        index: usize,
        /// Producer error
        #[source]
        source: BoxError,
    },

    /// A produced scene frame is unusable
    #[error("scene {index} produced an invalid frame: {message}")]
    InvalidFrame {
        /// Scene index (0-based)
        index: usize,
        /// Description of the violation
        message: String,
    },

    /// A scene task panicked or was torn down unexpectedly
    #[error("scene task aborted: {0}")]
    SceneTask(String),

    /// Concatenation or output copy failed
    #[error("composition failed: {message}")]
    Composition {
        /// What failed
        message: String,
        /// Underlying error
        #[source]
        source: BoxError,
    },

    /// Filesystem error on the task directory or final artifact
    #[error("io error at {path}: {source}")]
    Io {
        /// Path involved
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// A stage ran before the state it depends on was produced
    #[error("job state not ready: {0}")]
    InvalidState(&'static str),
}

impl PipelineError {
    /// Wrap a content collaborator failure
    pub fn generation(what: &'static str, source: impl Into<BoxError>) -> Self {
        Self::Generation {
            what,
            source: source.into(),
        }
    }

    /// Wrap a composition failure
    pub fn composition(message: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::Composition {
            message: message.into(),
            source: source.into(),
        }
    }

    /// Wrap an IO failure for path
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Classify the failure
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Config(_) => ErrorCategory::Config,
            Self::Generation { .. } | Self::InvalidOutput { .. } => ErrorCategory::Generation,
            Self::SceneFailed { .. } | Self::InvalidFrame { .. } | Self::SceneTask(_) => {
                ErrorCategory::Scene
            }
            Self::Composition { .. } => ErrorCategory::Composition,
            Self::Io { .. } | Self::InvalidState(_) => ErrorCategory::System,
        }
    }
}

/// Failure classes surfaced to callers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Unresolvable settings, missing template
    Config,
    /// Content, title or prompt generation
    Generation,
    /// Per-scene asset production
    Scene,
    /// Concatenation or output copy
    Composition,
    /// Filesystem or internal state
    System,
}

/// Configuration and resolution errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Frame template reference is empty or not a template file
    #[error("missing frame template: '{0}'")]
    MissingTemplate(String),

    /// TTS settings cannot produce a voice or a workflow
    #[error("unresolvable TTS settings: {0}")]
    UnresolvableTts(String),

    /// Parameter out of range
    #[error("invalid parameter {name}: {message}")]
    InvalidParam {
        /// Parameter name
        name: &'static str,
        /// Description
        message: String,
    },

    /// Config file could not be read
    #[error("io error reading {path}: {source}")]
    Io {
        /// Path involved
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Config file could not be parsed
    #[error("config parse error: {0}")]
    Parse(#[from] toml::de::Error),
}

impl ConfigError {
    /// Create parameter error
    pub fn invalid_param(name: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidParam {
            name,
            message: message.into(),
        }
    }
}

/// Persistence failure
///
/// Never fatal: finalize logs it and still returns the computed result.
#[derive(Debug, thiserror::Error)]
pub enum PersistError {
    /// Store rejected the write
    #[error("failed to save {what} for task {task_id}: {source}")]
    Save {
        /// Task identifier
        task_id: String,
        /// `metadata` or `storyboard`
        what: &'static str,
        /// Store error
        #[source]
        source: BoxError,
    },

    /// Metadata could not be encoded
    #[error("failed to encode metadata: {0}")]
    Encode(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pipeline_error_display() {
        let err = PipelineError::generation("narration", "llm unavailable");
        assert_eq!(
            err.to_string(),
            "narration generation failed: llm unavailable"
        );
    }

    #[test]
    fn pipeline_error_category() {
        let scene = PipelineError::SceneFailed {
            index: 3,
            source: "render failed".into(),
        };
        assert_eq!(scene.category(), ErrorCategory::Scene);
        assert!(scene.to_string().contains("scene 3"));

        let config: PipelineError = ConfigError::MissingTemplate(String::new()).into();
        assert_eq!(config.category(), ErrorCategory::Config);

        let comp = PipelineError::composition("concat", "ffmpeg exited 1");
        assert_eq!(comp.category(), ErrorCategory::Composition);
    }

    #[test]
    fn scene_error_keeps_source() {
        use std::error::Error as _;

        let err = PipelineError::SceneFailed {
            index: 1,
            source: "timeout".into(),
        };
        assert_eq!(err.source().map(ToString::to_string).as_deref(), Some("timeout"));
    }
}
