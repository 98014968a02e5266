//! Gallery preview configuration.

use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

use crate::error::ConfigError;
use crate::scanner::SchemePolicy;
use crate::upload::UploadTrigger;

/// Options for gallery previews and uploads.
///
/// Every field has a default, so partial configs deserialize.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct GalleryConfig {
    /// Render galleries at all.
    pub preview: bool,
    /// Upload images pasted into the editor.
    pub paste: bool,
    /// Upload images dropped onto the editor.
    pub drop: bool,
    /// Width over height for images that have not decoded (or failed to).
    pub default_aspect_ratio: f32,
    /// Prefix of host-created local handles, e.g. `blob:`.
    pub local_handle_prefix: SmolStr,
    /// Also preview images whose url is a local handle.
    pub preview_local_handles: bool,
}

impl Default for GalleryConfig {
    fn default() -> Self {
        Self {
            preview: true,
            paste: true,
            drop: true,
            default_aspect_ratio: 1.0,
            local_handle_prefix: SmolStr::new_static("blob:"),
            preview_local_handles: false,
        }
    }
}

impl GalleryConfig {
    /// Scheme policy the parser should run with.
    pub fn scheme_policy(&self) -> SchemePolicy {
        if self.preview_local_handles {
            SchemePolicy::with_local_handles(self.local_handle_prefix.clone())
        } else {
            SchemePolicy::web_only()
        }
    }

    /// Check whether uploads from `trigger` are enabled.
    pub fn accepts(&self, trigger: UploadTrigger) -> bool {
        match trigger {
            UploadTrigger::Paste => self.paste,
            UploadTrigger::Drop { .. } => self.drop,
            UploadTrigger::Picker => true,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.default_aspect_ratio.is_finite() || self.default_aspect_ratio <= 0.0 {
            return Err(ConfigError::InvalidValue {
                key: "default-aspect-ratio".into(),
                reason: format!("must be a positive number, got {}", self.default_aspect_ratio),
            });
        }
        if self.preview_local_handles && self.local_handle_prefix.is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "local-handle-prefix".into(),
                reason: "must not be empty when local handles are previewed".into(),
            });
        }
        Ok(())
    }
}
