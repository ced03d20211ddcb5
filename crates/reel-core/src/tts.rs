//! Text-to-speech selection
//!
//! Requests may use the mode-based shape (`tts_inference_mode` + voice or
//! workflow) or the older direct-voice shape (`voice_id` / `tts_voice`).
//! Both resolve to exactly one of a voice id or a workflow id.

use crate::error::ConfigError;
use crate::params::{JobParams, TtsInferenceMode};
use serde::{Deserialize, Serialize};

/// Resolved speech settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TtsSelection {
    /// Synthesis location
    pub mode: TtsInferenceMode,
    /// Local voice; `None` for external synthesis
    pub voice_id: Option<String>,
    /// External workflow; `None` for local synthesis
    pub workflow: Option<String>,
}

fn non_empty(value: Option<&String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty()).cloned()
}

/// Resolve the speech settings of a request
///
/// # Errors
/// `ConfigError::UnresolvableTts` when external synthesis is requested
/// without a workflow id
pub fn resolve_tts(params: &JobParams, default_voice: &str) -> Result<TtsSelection, ConfigError> {
    let selection = match params.tts_inference_mode {
        Some(TtsInferenceMode::Local) => TtsSelection {
            mode: TtsInferenceMode::Local,
            voice_id: Some(
                non_empty(params.tts_voice.as_ref()).unwrap_or_else(|| default_voice.to_string()),
            ),
            workflow: None,
        },
        Some(TtsInferenceMode::External) => {
            let workflow = non_empty(params.tts_workflow.as_ref()).ok_or_else(|| {
                ConfigError::UnresolvableTts(
                    "external inference mode requires a tts_workflow".to_string(),
                )
            })?;
            TtsSelection {
                mode: TtsInferenceMode::External,
                voice_id: None,
                workflow: Some(workflow),
            }
        }
        None => {
            let voice = non_empty(params.voice_id.as_ref())
                .or_else(|| non_empty(params.tts_voice.as_ref()))
                .unwrap_or_else(|| default_voice.to_string());
            TtsSelection {
                mode: TtsInferenceMode::Local,
                voice_id: Some(voice),
                workflow: non_empty(params.tts_workflow.as_ref()),
            }
        }
    };

    tracing::debug!(
        mode = ?selection.mode,
        voice = selection.voice_id.as_deref().unwrap_or("-"),
        workflow = selection.workflow.as_deref().unwrap_or("-"),
        "Resolved TTS settings"
    );
    Ok(selection)
}
