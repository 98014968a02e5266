//! Capabilities supplied by the host editor.
//!
//! These traits abstract over external concerns:
//! - Finding paragraph spans in the document
//! - Resolving image urls to thumbnail urls
//! - Probing image dimensions
//! - Creating and releasing local resource handles
//! - Uploading files
//!
//! Implementations are provided by the consuming application.

use std::future::Future;
use std::ops::Range;
use std::sync::Arc;

use smol_str::SmolStr;

use crate::error::{ProbeError, UploadError};

/// Block classification used when asking the host for spans.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlockKind {
    Paragraph,
    Heading,
    CodeBlock,
}

/// Classifies the document into blocks.
///
/// Spans are char ranges of the current document text.
pub trait BlockSource {
    fn spans_of_type(&self, kind: BlockKind) -> Vec<Range<usize>>;
}

impl<T: BlockSource> BlockSource for &T {
    fn spans_of_type(&self, kind: BlockKind) -> Vec<Range<usize>> {
        (*self).spans_of_type(kind)
    }
}

/// Minimal block splitter: blocks are runs of non-blank lines.
///
/// A block whose first line starts with `#` is a heading; a fence of three
/// backticks or tildes opens a code block that runs to the matching fence,
/// blank lines included. Everything else is a paragraph. Spans exclude the
/// final line break.
#[derive(Debug, Clone, Copy)]
pub struct BlankLineBlocks<'a> {
    text: &'a str,
}

impl<'a> BlankLineBlocks<'a> {
    pub fn new(text: &'a str) -> Self {
        Self { text }
    }

    fn blocks(&self) -> Vec<(BlockKind, Range<usize>)> {
        let mut blocks = Vec::new();
        let mut open: Option<(BlockKind, usize, usize)> = None;
        let mut fence: Option<&str> = None;
        let mut offset = 0usize;

        for line in self.text.split_inclusive('\n') {
            let line_len = line.chars().count();
            let content = line.trim_end_matches(['\n', '\r']);
            let content_end = offset + content.chars().count();
            let trimmed = content.trim_start();

            if let Some(marker) = fence {
                if trimmed.starts_with(marker) {
                    if let Some((kind, start, _)) = open.take() {
                        blocks.push((kind, start..content_end));
                    }
                    fence = None;
                } else if let Some(block) = open.as_mut() {
                    block.2 = content_end;
                }
            } else if trimmed.is_empty() {
                if let Some((kind, start, end)) = open.take() {
                    blocks.push((kind, start..end));
                }
            } else if let Some(marker) = ["```", "~~~"].into_iter().find(|m| trimmed.starts_with(m)) {
                if let Some((kind, start, end)) = open.take() {
                    blocks.push((kind, start..end));
                }
                fence = Some(marker);
                open = Some((BlockKind::CodeBlock, offset, content_end));
            } else if let Some(block) = open.as_mut() {
                block.2 = content_end;
            } else {
                let kind = if trimmed.starts_with('#') {
                    BlockKind::Heading
                } else {
                    BlockKind::Paragraph
                };
                open = Some((kind, offset, content_end));
            }

            offset += line_len;
        }

        if let Some((kind, start, end)) = open {
            blocks.push((kind, start..end));
        }
        blocks
    }
}

impl BlockSource for BlankLineBlocks<'_> {
    fn spans_of_type(&self, kind: BlockKind) -> Vec<Range<usize>> {
        self.blocks()
            .into_iter()
            .filter(|(k, _)| *k == kind)
            .map(|(_, span)| span)
            .collect()
    }
}

/// Resolves image urls to the url actually displayed.
///
/// Applied at render time; parsing always keeps the source url.
pub trait ThumbnailResolver {
    /// Returns `None` to display the source url unchanged.
    fn thumbnail_url(&self, source_url: &str) -> Option<String>;
}

/// Unit type implementation - no thumbnails.
impl ThumbnailResolver for () {
    fn thumbnail_url(&self, _source_url: &str) -> Option<String> {
        None
    }
}

impl<T: ThumbnailResolver> ThumbnailResolver for &T {
    fn thumbnail_url(&self, source_url: &str) -> Option<String> {
        (*self).thumbnail_url(source_url)
    }
}

impl<T: ThumbnailResolver> ThumbnailResolver for Option<T> {
    fn thumbnail_url(&self, source_url: &str) -> Option<String> {
        self.as_ref().and_then(|r| r.thumbnail_url(source_url))
    }
}

/// Adapts a closure into a [`ThumbnailResolver`].
#[derive(Clone, Copy)]
pub struct ThumbnailFn<F>(pub F);

impl<F: Fn(&str) -> String> ThumbnailResolver for ThumbnailFn<F> {
    fn thumbnail_url(&self, source_url: &str) -> Option<String> {
        Some((self.0)(source_url))
    }
}

/// Natural dimensions of a decoded image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageSize {
    pub width: u32,
    pub height: u32,
}

impl ImageSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Width over height, `None` for degenerate sizes.
    pub fn aspect_ratio(&self) -> Option<f32> {
        if self.width == 0 || self.height == 0 {
            None
        } else {
            Some(self.width as f32 / self.height as f32)
        }
    }
}

/// Loads an image far enough to know its dimensions.
pub trait ImageProbe {
    fn probe(&self, url: &str) -> impl Future<Output = Result<ImageSize, ProbeError>>;
}

/// A file offered for upload (pasted, dropped, or picked).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingFile {
    pub name: SmolStr,
    /// Media type as reported by the platform, e.g. `image/png`.
    pub media_type: SmolStr,
    pub data: Arc<[u8]>,
}

impl PendingFile {
    pub fn new(name: impl Into<SmolStr>, media_type: impl Into<SmolStr>, data: impl Into<Arc<[u8]>>) -> Self {
        Self {
            name: name.into(),
            media_type: media_type.into(),
            data: data.into(),
        }
    }

    pub fn is_image(&self) -> bool {
        self.media_type.starts_with("image/")
    }
}

/// Creates and releases locally-addressable resource handles (e.g. object
/// urls for upload previews). Each handle must be released exactly once.
pub trait LocalHandles {
    fn create(&self, file: &PendingFile) -> SmolStr;
    fn release(&self, handle: &str);
}

/// Upload transport.
pub trait Uploader {
    /// Upload one file, reporting progress in percent, resolving to the
    /// final url.
    fn upload(
        &self,
        file: &PendingFile,
        progress: &dyn Fn(u8),
    ) -> impl Future<Output = Result<String, UploadError>>;
}

/// Receives upload progress keyed by local handle.
pub trait ProgressSink {
    fn report(&self, handle: &str, percent: u8);
}

impl<F: Fn(&str, u8)> ProgressSink for F {
    fn report(&self, handle: &str, percent: u8) {
        self(handle, percent)
    }
}

/// Progress sink that drops every report.
pub fn ignore_progress(_handle: &str, _percent: u8) {}

#[cfg(test)]
mod tests {
    use super::*;

    struct CdnThumbnails;

    impl ThumbnailResolver for CdnThumbnails {
        fn thumbnail_url(&self, source_url: &str) -> Option<String> {
            source_url
                .strip_prefix("https://images.example.com/")
                .map(|path| format!("https://cdn.example.com/thumb/{path}"))
        }
    }

    #[test]
    fn test_thumbnail_resolver_impls() {
        let cdn = CdnThumbnails;
        assert_eq!(
            cdn.thumbnail_url("https://images.example.com/a.png").as_deref(),
            Some("https://cdn.example.com/thumb/a.png")
        );
        assert_eq!(cdn.thumbnail_url("https://other.example.com/a.png"), None);
        assert!((&cdn).thumbnail_url("https://images.example.com/b.png").is_some());
        assert_eq!(().thumbnail_url("https://images.example.com/a.png"), None);
        assert_eq!(None::<CdnThumbnails>.thumbnail_url("https://images.example.com/a.png"), None);
    }

    #[test]
    fn test_blank_line_blocks() {
        let text = "# Title\n\n![a](http://x/a.png)\n![b](http://x/b.png)\n\nplain text\n\n```\ncode\n\nmore\n```\n\nlast";
        let blocks = BlankLineBlocks::new(text);

        let paragraphs = blocks.spans_of_type(BlockKind::Paragraph);
        let slices: Vec<String> = paragraphs
            .iter()
            .map(|r| text.chars().skip(r.start).take(r.len()).collect())
            .collect();
        assert_eq!(
            slices,
            vec![
                "![a](http://x/a.png)\n![b](http://x/b.png)",
                "plain text",
                "last"
            ]
        );

        assert_eq!(blocks.spans_of_type(BlockKind::Heading), vec![0..7]);
        let code = blocks.spans_of_type(BlockKind::CodeBlock);
        assert_eq!(code.len(), 1);
        let code_text: String = text.chars().skip(code[0].start).take(code[0].len()).collect();
        assert_eq!(code_text, "```\ncode\n\nmore\n```");
    }

    #[test]
    fn test_blank_line_blocks_char_offsets() {
        let text = "héllo\n\n![a](http://x/a.png)";
        let paragraphs = BlankLineBlocks::new(text).spans_of_type(BlockKind::Paragraph);
        assert_eq!(paragraphs, vec![0..5, 7..27]);
    }

    #[test]
    fn test_image_size_ratio() {
        assert_eq!(ImageSize::new(400, 200).aspect_ratio(), Some(2.0));
        assert_eq!(ImageSize::new(0, 200).aspect_ratio(), None);
    }

    #[test]
    fn test_pending_file_filter() {
        let png = PendingFile::new("a.png", "image/png", vec![1u8, 2, 3]);
        let txt = PendingFile::new("a.txt", "text/plain", Vec::<u8>::new());
        assert!(png.is_image());
        assert!(!txt.is_image());
    }
}
