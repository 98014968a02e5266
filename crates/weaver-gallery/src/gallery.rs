//! Gallery data model: image references grouped into rows.

use std::ops::Range;

use smol_str::SmolStr;

use crate::host::ThumbnailResolver;
use crate::paragraph::parse_paragraph_with;
use crate::scanner::{ScannedImage, SchemePolicy};

/// One parsed markdown image construct.
///
/// Offsets are char offsets relative to the start of the owning paragraph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageReference {
    /// Destination as written in the source. Thumbnails are resolved at
    /// render time, never stored here.
    pub source_url: String,
    pub alt_text: String,
    pub title: Option<String>,
    pub relative_from: usize,
    pub relative_to: usize,
}

impl ImageReference {
    pub(crate) fn from_scanned(scanned: ScannedImage, from: usize, to: usize) -> Self {
        Self {
            source_url: scanned.href,
            alt_text: scanned.alt_text,
            title: scanned.title,
            relative_from: from,
            relative_to: to,
        }
    }

    /// Absolute char range given the paragraph's anchor.
    pub fn absolute_range(&self, anchor_offset: usize) -> Range<usize> {
        anchor_offset + self.relative_from..anchor_offset + self.relative_to
    }

    /// Url to display, as decided by the host's thumbnail resolver.
    pub fn thumbnail_url<R: ThumbnailResolver>(&self, resolver: &R) -> String {
        resolver
            .thumbnail_url(&self.source_url)
            .unwrap_or_else(|| self.source_url.clone())
    }
}

/// Images sharing one visual line. Never empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    images: Vec<ImageReference>,
}

impl Row {
    /// Returns `None` for an empty image list.
    pub fn new(images: Vec<ImageReference>) -> Option<Self> {
        if images.is_empty() {
            None
        } else {
            Some(Self { images })
        }
    }

    pub fn images(&self) -> &[ImageReference] {
        &self.images
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    /// Always false; rows are non-empty by construction.
    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ImageReference> {
        self.images.iter()
    }
}

impl<'a> IntoIterator for &'a Row {
    type Item = &'a ImageReference;
    type IntoIter = std::slice::Iter<'a, ImageReference>;

    fn into_iter(self) -> Self::IntoIter {
        self.images.iter()
    }
}

/// Structural identity of a gallery for reuse decisions.
///
/// Two galleries with equal keys show the same images in the same layout.
/// Alt text and titles are deliberately not part of the key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GalleryKey {
    /// Source urls, `|` within a row and `$` between rows.
    pub identity: SmolStr,
    /// Per-row image counts joined with `|`.
    pub columns: SmolStr,
}

/// All rows parsed from one paragraph, anchored at the paragraph start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Gallery {
    rows: Vec<Row>,
    anchor_offset: usize,
}

impl Gallery {
    /// Parse a paragraph with the web-only scheme policy.
    pub fn parse(text: &str, anchor_offset: usize) -> Option<Self> {
        Self::parse_with(text, anchor_offset, &SchemePolicy::web_only())
    }

    pub fn parse_with(text: &str, anchor_offset: usize, policy: &SchemePolicy) -> Option<Self> {
        Self::from_rows(parse_paragraph_with(text, policy), anchor_offset)
    }

    /// Returns `None` when there are no rows.
    pub fn from_rows(rows: Vec<Row>, anchor_offset: usize) -> Option<Self> {
        if rows.is_empty() {
            return None;
        }
        Some(Self {
            rows,
            anchor_offset,
        })
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn anchor_offset(&self) -> usize {
        self.anchor_offset
    }

    /// Copy of this gallery at a new anchor. Relative offsets are untouched.
    pub fn with_anchor(&self, anchor_offset: usize) -> Self {
        Self {
            rows: self.rows.clone(),
            anchor_offset,
        }
    }

    /// All images in parse order.
    pub fn images(&self) -> impl Iterator<Item = &ImageReference> {
        self.rows.iter().flat_map(|row| row.iter())
    }

    /// Total number of images.
    pub fn image_count(&self) -> usize {
        self.rows.iter().map(Row::len).sum()
    }

    /// Absolute char range from the first image's start to the last's end.
    pub fn span(&self) -> Range<usize> {
        let mut images = self.images();
        let start = images.next().map(|img| img.relative_from).unwrap_or(0);
        let end = self
            .rows
            .last()
            .and_then(|row| row.images().last())
            .map(|img| img.relative_to)
            .unwrap_or(start);
        self.anchor_offset + start..self.anchor_offset + end
    }

    pub fn identity_key(&self) -> SmolStr {
        let rows: Vec<String> = self
            .rows
            .iter()
            .map(|row| {
                row.iter()
                    .map(|img| img.source_url.as_str())
                    .collect::<Vec<_>>()
                    .join("|")
            })
            .collect();
        SmolStr::new(rows.join("$"))
    }

    pub fn columns_signature(&self) -> SmolStr {
        let counts: Vec<String> = self.rows.iter().map(|row| row.len().to_string()).collect();
        SmolStr::new(counts.join("|"))
    }

    pub fn key(&self) -> GalleryKey {
        GalleryKey {
            identity: self.identity_key(),
            columns: self.columns_signature(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::ThumbnailFn;

    #[test]
    fn test_keys() {
        let text = "![a](http://x/1.png) ![b](http://x/2.png)\n![c](http://x/3.png)";
        let gallery = Gallery::parse(text, 40).unwrap();
        assert_eq!(
            gallery.identity_key(),
            "http://x/1.png|http://x/2.png$http://x/3.png"
        );
        assert_eq!(gallery.columns_signature(), "2|1");
        assert_eq!(gallery.image_count(), 3);
    }

    #[test]
    fn test_alt_and_title_not_in_key() {
        let a = Gallery::parse("![one](http://x/1.png)", 0).unwrap();
        let b = Gallery::parse("![two](http://x/1.png \"t\")", 0).unwrap();
        assert_eq!(a.key(), b.key());
        assert_ne!(a, b);
    }

    #[test]
    fn test_span_and_absolute_ranges() {
        let text = "  ![a](http://x/a.png)\n![b](http://x/b.png)  ";
        let gallery = Gallery::parse(text, 100).unwrap();
        assert_eq!(gallery.span(), 102..143);
        let first = &gallery.rows()[0].images()[0];
        assert_eq!(first.absolute_range(gallery.anchor_offset()), 102..122);
    }

    #[test]
    fn test_with_anchor_keeps_relative_offsets() {
        let gallery = Gallery::parse("![a](http://x/a.png)", 10).unwrap();
        let moved = gallery.with_anchor(25);
        assert_eq!(moved.anchor_offset(), 25);
        assert_eq!(moved.rows(), gallery.rows());
    }

    #[test]
    fn test_thumbnail_resolution() {
        let gallery = Gallery::parse("![a](http://x/a.png)", 0).unwrap();
        let img = &gallery.rows()[0].images()[0];
        assert_eq!(img.thumbnail_url(&()), "http://x/a.png");
        let thumbs = ThumbnailFn(|url: &str| format!("{url}?w=320"));
        assert_eq!(img.thumbnail_url(&thumbs), "http://x/a.png?w=320");
    }

    #[test]
    fn test_empty_rows() {
        assert!(Row::new(vec![]).is_none());
        assert!(Gallery::from_rows(vec![], 0).is_none());
    }
}
