//! Error types for gallery parsing, image probing, and uploads.

use miette::Diagnostic;
use thiserror::Error;

/// Why the scanner did not recognize an image construct at a position.
///
/// These never reach the user: any of them voids the whole paragraph's
/// gallery and the paragraph renders as plain text.
#[derive(Error, Debug, Clone, PartialEq, Eq, Diagnostic)]
#[non_exhaustive]
pub enum ScanError {
    /// No `![` at the scan position.
    #[error("expected `![` at byte {pos}")]
    #[diagnostic(code(gallery::scan::not_an_image))]
    NotAnImage { pos: usize },

    /// Text ended before the alt text's brackets balanced.
    #[error("unbalanced brackets in alt text starting at byte {pos}")]
    #[diagnostic(code(gallery::scan::unbalanced_alt_text))]
    UnbalancedAltText { pos: usize },

    /// The closing `]` is not immediately followed by `(`.
    #[error("missing `(` after alt text at byte {pos}")]
    #[diagnostic(code(gallery::scan::missing_destination))]
    MissingDestination { pos: usize },

    /// Empty or malformed link destination.
    #[error("malformed link destination at byte {pos}")]
    #[diagnostic(code(gallery::scan::malformed_href))]
    MalformedHref { pos: usize },

    /// The destination is not an absolute http(s) URL.
    #[error("link destination `{href}` is not an allowed image url")]
    #[diagnostic(
        code(gallery::scan::disallowed_scheme),
        help("only absolute http:// and https:// urls are previewed")
    )]
    DisallowedScheme { href: String },

    /// A quoted title was opened but never closed.
    #[error("unterminated title at byte {pos}")]
    #[diagnostic(code(gallery::scan::malformed_title))]
    MalformedTitle { pos: usize },

    /// No `)` after the destination and optional title.
    #[error("missing `)` at byte {pos}")]
    #[diagnostic(code(gallery::scan::unclosed))]
    Unclosed { pos: usize },
}

/// Failure to decode or load an image for aspect-ratio probing.
#[derive(Error, Debug, Clone, PartialEq, Diagnostic)]
pub enum ProbeError {
    /// The image could not be fetched.
    #[error("failed to load image {url}: {reason}")]
    #[diagnostic(code(gallery::probe::load))]
    Load { url: String, reason: String },

    /// The image loaded but reported a zero dimension.
    #[error("image {url} has empty dimensions")]
    #[diagnostic(code(gallery::probe::empty))]
    EmptyDimensions { url: String },
}

/// Errors produced by the upload transport or lifecycle.
#[derive(Error, Debug, Clone, PartialEq, Eq, Diagnostic)]
#[non_exhaustive]
pub enum UploadError {
    /// The upload transport rejected or failed the file.
    #[error("upload of {file_name} failed: {reason}")]
    #[diagnostic(code(gallery::upload::transport))]
    Transport { file_name: String, reason: String },

    /// The transport resolved, but not to a previewable url.
    #[error("upload of {file_name} returned an unusable url `{url}`")]
    #[diagnostic(code(gallery::upload::invalid_url))]
    InvalidUrl { file_name: String, url: String },
}

/// Errors while loading gallery configuration.
#[derive(Error, Debug, Diagnostic)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("io error: {0}")]
    #[diagnostic(code(gallery::config::io))]
    Io(#[from] std::io::Error),

    #[error("invalid value for `{key}`: {reason}")]
    #[diagnostic(code(gallery::config::invalid_value))]
    InvalidValue { key: String, reason: String },

    #[error("failed to parse config: {0}")]
    #[diagnostic(code(gallery::config::parse))]
    Parse(String),
}
