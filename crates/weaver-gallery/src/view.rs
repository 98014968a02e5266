//! Render-ready gallery description.
//!
//! A view is always built from the current parse of a gallery, so alt text
//! and titles reflect the latest edit even when the render state (ID and
//! decoded ratios) is reused from an earlier parse.

use smol_str::SmolStr;

use crate::decode::row_flex;
use crate::events::{GalleryEvent, GalleryIntent};
use crate::gallery::{Gallery, ImageReference};
use crate::host::ThumbnailResolver;
use crate::render_cache::{ImageStatus, RetainedRenderState};

/// One tile, ready to hand to a renderer.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedImage {
    /// Absolute char range of the image construct.
    pub from: usize,
    pub to: usize,
    pub source_url: String,
    pub display_url: String,
    pub alt_text: String,
    pub title: Option<String>,
    pub status: ImageStatus,
    /// Relative width within the row.
    pub flex: f32,
}

impl RenderedImage {
    /// Event for an interaction with this tile.
    pub fn event(&self, intent: GalleryIntent) -> GalleryEvent {
        GalleryEvent {
            intent,
            from: self.from,
            to: self.to,
            source_url: self.source_url.clone(),
        }
    }
}

/// A gallery laid out as rows of tiles.
#[derive(Debug, Clone, PartialEq)]
pub struct GalleryView {
    pub id: SmolStr,
    pub anchor_offset: usize,
    pub rows: Vec<Vec<RenderedImage>>,
}

impl GalleryView {
    /// Build a view of `gallery` using retained `state`.
    ///
    /// Images without a decoded ratio lay out with `default_ratio`.
    pub fn build<R: ThumbnailResolver>(
        gallery: &Gallery,
        state: &RetainedRenderState,
        resolver: &R,
        default_ratio: f32,
    ) -> Self {
        let anchor = gallery.anchor_offset();
        let mut index = 0;
        let rows = gallery
            .rows()
            .iter()
            .map(|row| {
                let statuses: Vec<ImageStatus> = row
                    .iter()
                    .map(|_| {
                        let status = state.images.get(index).copied().unwrap_or_default();
                        index += 1;
                        status
                    })
                    .collect();
                let ratios: Vec<f32> = statuses.iter().map(|s| s.ratio_or(default_ratio)).collect();
                let flex = row_flex(&ratios);

                row.iter()
                    .zip(statuses)
                    .zip(flex)
                    .map(|((img, status), flex)| tile(img, anchor, resolver, status, flex))
                    .collect()
            })
            .collect();

        Self {
            id: state.id.clone(),
            anchor_offset: anchor,
            rows,
        }
    }

    pub fn tiles(&self) -> impl Iterator<Item = &RenderedImage> {
        self.rows.iter().flatten()
    }
}

fn tile<R: ThumbnailResolver>(
    img: &ImageReference,
    anchor: usize,
    resolver: &R,
    status: ImageStatus,
    flex: f32,
) -> RenderedImage {
    let range = img.absolute_range(anchor);
    RenderedImage {
        from: range.start,
        to: range.end,
        source_url: img.source_url.clone(),
        display_url: img.thumbnail_url(resolver),
        alt_text: img.alt_text.clone(),
        title: img.title.clone(),
        status,
        flex,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::ThumbnailFn;
    use crate::render_cache::GalleryCache;

    #[test]
    fn test_view_layout() {
        let text = "![wide](http://x/w.png \"W\") ![square](http://x/s.png)\n![solo](http://x/o.png)";
        let gallery = Gallery::parse(text, 10).unwrap();
        let mut cache = GalleryCache::new();
        let report = cache.reconcile_all(std::slice::from_ref(&gallery));
        let state = report.results[0]
            .state
            .with_image(0, ImageStatus::Loaded { ratio: 2.0 });

        let thumbs = ThumbnailFn(|url: &str| url.replace(".png", ".webp"));
        let view = GalleryView::build(&gallery, &state, &thumbs, 1.0);

        assert_eq!(view.id, state.id);
        assert_eq!(view.rows.len(), 2);
        let first = &view.rows[0][0];
        assert_eq!((first.from, first.to), (10, 37));
        assert_eq!(first.display_url, "http://x/w.webp");
        assert_eq!(first.source_url, "http://x/w.png");
        assert_eq!(first.title.as_deref(), Some("W"));
        assert_eq!(first.flex, 1.0);
        assert_eq!(view.rows[0][1].flex, 0.5);
        assert_eq!(view.rows[1][0].flex, 1.0);
        assert_eq!(view.tiles().count(), 3);
    }

    #[test]
    fn test_view_uses_fresh_alt_text() {
        let before = Gallery::parse("![old](http://x/a.png)", 0).unwrap();
        let mut cache = GalleryCache::new();
        cache.reconcile_all(std::slice::from_ref(&before));

        let after = Gallery::parse("![new](http://x/a.png)", 0).unwrap();
        let report = cache.reconcile_all(std::slice::from_ref(&after));
        assert!(report.results[0].reuse);

        let view = GalleryView::build(&after, &report.results[0].state, &(), 1.0);
        assert_eq!(view.rows[0][0].alt_text, "new");
    }

    #[test]
    fn test_tile_event() {
        let gallery = Gallery::parse("![a](http://x/a.png)", 5).unwrap();
        let mut cache = GalleryCache::new();
        let report = cache.reconcile_all(std::slice::from_ref(&gallery));
        let view = GalleryView::build(&gallery, &report.results[0].state, &(), 1.0);

        let event = view.rows[0][0].event(GalleryIntent::Delete);
        assert_eq!(event.intent, GalleryIntent::Delete);
        assert_eq!((event.from, event.to), (5, 25));
        assert_eq!(event.source_url, "http://x/a.png");
    }
}
