//! Frame template classification

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// What a frame template renders behind the narration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemplateKind {
    /// Text and styling only; no generated media
    Static,
    /// One generated image per scene
    Image,
    /// One generated video clip per scene
    Video,
}

impl TemplateKind {
    /// Whether scenes need generated media (and therefore image prompts)
    #[inline]
    #[must_use]
    pub fn requires_media(self) -> bool {
        !matches!(self, Self::Static)
    }
}

/// Validated frame template reference
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameTemplate {
    reference: String,
    kind: TemplateKind,
}

impl FrameTemplate {
    /// Parse a reference such as `1080x1920/static_quote.html`
    ///
    /// The kind comes from the file-name prefix: `static_` and `video_` are
    /// recognised, everything else renders images.
    ///
    /// # Errors
    /// `ConfigError::MissingTemplate` if the reference has no `.html` file name
    pub fn parse(reference: &str) -> Result<Self, ConfigError> {
        let name = Path::new(reference.trim())
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default();

        let stem = name
            .strip_suffix(".html")
            .filter(|stem| !stem.is_empty())
            .ok_or_else(|| ConfigError::MissingTemplate(reference.to_string()))?;

        let kind = if stem.starts_with("static_") {
            TemplateKind::Static
        } else if stem.starts_with("video_") {
            TemplateKind::Video
        } else {
            TemplateKind::Image
        };

        Ok(Self {
            reference: reference.trim().to_string(),
            kind,
        })
    }

    /// Template reference as given
    #[must_use]
    pub fn reference(&self) -> &str {
        &self.reference
    }

    /// Template kind
    #[must_use]
    pub fn kind(&self) -> TemplateKind {
        self.kind
    }
}
