//! KDL config file loading.
//!
//! ```kdl
//! preview true
//! paste true
//! drop false
//! default-aspect-ratio 1.5
//! local-handle-prefix "blob:"
//! preview-local-handles false
//! ```

use std::path::{Path, PathBuf};

use kdl::{KdlDocument, KdlValue};
use weaver_gallery::{ConfigError, GalleryConfig, SmolStr};

pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("weaver").join("gallery.kdl"))
}

/// Load config from `path`, or the default location if `None`.
///
/// A missing default file yields the defaults; a missing explicit file is
/// an error.
pub fn load_config(path: Option<&Path>) -> Result<GalleryConfig, ConfigError> {
    let (path, explicit) = match path {
        Some(path) => (path.to_path_buf(), true),
        None => match default_config_path() {
            Some(path) => (path, false),
            None => return Ok(GalleryConfig::default()),
        },
    };

    if !explicit && !path.exists() {
        tracing::debug!(path = %path.display(), "no gallery config, using defaults");
        return Ok(GalleryConfig::default());
    }

    let content = std::fs::read_to_string(&path)?;
    let config = parse_config(&content)?;
    tracing::debug!(path = %path.display(), ?config, "loaded gallery config");
    Ok(config)
}

pub fn parse_config(content: &str) -> Result<GalleryConfig, ConfigError> {
    let doc: KdlDocument = content
        .parse()
        .map_err(|err: kdl::KdlError| ConfigError::Parse(err.to_string()))?;
    let mut config = GalleryConfig::default();

    if let Some(value) = first_arg(&doc, "preview") {
        config.preview = as_bool("preview", value)?;
    }
    if let Some(value) = first_arg(&doc, "paste") {
        config.paste = as_bool("paste", value)?;
    }
    if let Some(value) = first_arg(&doc, "drop") {
        config.drop = as_bool("drop", value)?;
    }
    if let Some(value) = first_arg(&doc, "default-aspect-ratio") {
        let ratio = value
            .as_f64()
            .or_else(|| value.as_i64().map(|v| v as f64))
            .ok_or_else(|| invalid("default-aspect-ratio", "expected a number"))?;
        config.default_aspect_ratio = ratio as f32;
    }
    if let Some(value) = first_arg(&doc, "local-handle-prefix") {
        let prefix = value
            .as_string()
            .ok_or_else(|| invalid("local-handle-prefix", "expected a string"))?;
        config.local_handle_prefix = SmolStr::new(prefix);
    }
    if let Some(value) = first_arg(&doc, "preview-local-handles") {
        config.preview_local_handles = as_bool("preview-local-handles", value)?;
    }

    config.validate()?;
    Ok(config)
}

fn first_arg<'a>(doc: &'a KdlDocument, name: &str) -> Option<&'a KdlValue> {
    doc.get(name)?.entries().first().map(|entry| entry.value())
}

fn as_bool(key: &str, value: &KdlValue) -> Result<bool, ConfigError> {
    value.as_bool().ok_or_else(|| invalid(key, "expected true or false"))
}

fn invalid(key: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_config() {
        let config = parse_config(
            r#"
            preview true
            paste false
            drop true
            default-aspect-ratio 1.5
            local-handle-prefix "blob:"
            preview-local-handles true
            "#,
        )
        .unwrap();
        assert!(!config.paste);
        assert!(config.preview_local_handles);
        assert_eq!(config.default_aspect_ratio, 1.5);
    }

    #[test]
    fn test_integer_ratio_and_defaults() {
        let config = parse_config("default-aspect-ratio 2").unwrap();
        assert_eq!(config.default_aspect_ratio, 2.0);
        assert!(config.preview);
        assert_eq!(config.local_handle_prefix, "blob:");
    }

    #[test]
    fn test_bad_values() {
        assert!(matches!(
            parse_config("paste \"yes\""),
            Err(ConfigError::InvalidValue { .. })
        ));
        assert!(matches!(
            parse_config("default-aspect-ratio -1.0"),
            Err(ConfigError::InvalidValue { .. })
        ));
        assert!(matches!(parse_config("preview {"), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_missing_explicit_file() {
        let missing = Path::new("/nonexistent/weaver/gallery.kdl");
        assert!(matches!(load_config(Some(missing)), Err(ConfigError::Io(_))));
    }
}
