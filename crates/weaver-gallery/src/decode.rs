//! Aspect-ratio probing for gallery tiles.
//!
//! Probes run asynchronously and may finish after the gallery they were
//! started for has been evicted. Each request carries the owning record's
//! cancellation token, and results are only applied while it is live.

use smol_str::SmolStr;
use tokio_util::sync::CancellationToken;

use crate::error::ProbeError;
use crate::gallery::Gallery;
use crate::host::{ImageProbe, ImageSize, ThumbnailResolver};
use crate::render_cache::{ImageStatus, RetainedRenderState};

/// A pending probe for one image of one rendered gallery.
#[derive(Debug, Clone)]
pub struct DecodeRequest {
    pub gallery_id: SmolStr,
    /// Index in parse order.
    pub index: usize,
    /// Display url (after thumbnail resolution).
    pub url: String,
    pub token: CancellationToken,
}

/// Outcome of a probe, addressed back to its gallery.
#[derive(Debug, Clone)]
pub struct DecodeResult {
    pub gallery_id: SmolStr,
    pub index: usize,
    pub token: CancellationToken,
    pub outcome: Result<ImageSize, ProbeError>,
}

impl DecodeResult {
    /// Status to store for this result. Zero-sized images count as failures.
    pub fn status(&self) -> ImageStatus {
        match &self.outcome {
            Ok(size) => size
                .aspect_ratio()
                .map(|ratio| ImageStatus::Loaded { ratio })
                .unwrap_or(ImageStatus::Failed),
            Err(_) => ImageStatus::Failed,
        }
    }
}

/// Requests for every image of `gallery` that is still pending in `state`.
pub fn decode_requests<R: ThumbnailResolver>(
    gallery: &Gallery,
    state: &RetainedRenderState,
    resolver: &R,
) -> Vec<DecodeRequest> {
    if state.is_evicted() {
        return Vec::new();
    }
    gallery
        .images()
        .enumerate()
        .filter(|(index, _)| state.images.get(*index).is_some_and(ImageStatus::is_pending))
        .map(|(index, img)| DecodeRequest {
            gallery_id: state.id.clone(),
            index,
            url: img.thumbnail_url(resolver),
            token: state.cancel.clone(),
        })
        .collect()
}

/// Run one probe. Skips the load if the gallery was evicted already.
pub async fn probe_one<P: ImageProbe>(probe: &P, request: DecodeRequest) -> DecodeResult {
    let outcome = if request.token.is_cancelled() {
        Err(ProbeError::Load {
            url: request.url.clone(),
            reason: "gallery evicted".into(),
        })
    } else {
        match probe.probe(&request.url).await {
            Ok(size) if size.aspect_ratio().is_none() => Err(ProbeError::EmptyDimensions {
                url: request.url.clone(),
            }),
            other => other,
        }
    };

    if let Err(err) = &outcome {
        tracing::debug!(target: "weaver::gallery", %err, "image probe failed");
    }

    DecodeResult {
        gallery_id: request.gallery_id,
        index: request.index,
        token: request.token,
        outcome,
    }
}

/// Probe all requests concurrently. Results keep request order.
pub async fn probe_gallery<P: ImageProbe>(probe: &P, requests: Vec<DecodeRequest>) -> Vec<DecodeResult> {
    n0_future::join_all(requests.into_iter().map(|req| probe_one(probe, req))).await
}

/// Flex-grow factors for one row: each ratio over the row's largest ratio.
///
/// Tiles in a row share a height, so widths follow aspect ratio.
pub fn row_flex(ratios: &[f32]) -> Vec<f32> {
    let max = ratios.iter().copied().fold(0.0_f32, f32::max);
    if max <= 0.0 {
        return vec![1.0; ratios.len()];
    }
    ratios.iter().map(|ratio| ratio / max).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::ThumbnailFn;
    use crate::render_cache::GalleryCache;

    struct FixedSizes;

    impl ImageProbe for FixedSizes {
        async fn probe(&self, url: &str) -> Result<ImageSize, ProbeError> {
            if url.contains("wide") {
                Ok(ImageSize::new(400, 200))
            } else if url.contains("empty") {
                Ok(ImageSize::new(0, 0))
            } else if url.contains("broken") {
                Err(ProbeError::Load {
                    url: url.to_string(),
                    reason: "404".into(),
                })
            } else {
                Ok(ImageSize::new(100, 100))
            }
        }
    }

    fn setup(text: &str) -> (Gallery, GalleryCache) {
        let gallery = Gallery::parse(text, 0).unwrap();
        let mut cache = GalleryCache::new();
        cache.reconcile_all(std::slice::from_ref(&gallery));
        (gallery, cache)
    }

    #[test]
    fn test_requests_use_display_urls() {
        let (gallery, cache) = setup("![a](http://x/a.png) ![b](http://x/b.png)");
        let thumbs = ThumbnailFn(|url: &str| format!("{url}?thumb"));
        let requests = decode_requests(&gallery, &cache.states()[0], &thumbs);
        let urls: Vec<&str> = requests.iter().map(|r| r.url.as_str()).collect();
        assert_eq!(urls, vec!["http://x/a.png?thumb", "http://x/b.png?thumb"]);
    }

    #[test]
    fn test_requests_skip_settled_images() {
        let (gallery, cache) = setup("![a](http://x/a.png) ![b](http://x/b.png)");
        let state = cache.states()[0].with_image(0, ImageStatus::Loaded { ratio: 1.0 });
        let requests = decode_requests(&gallery, &state, &());
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].index, 1);
    }

    #[tokio::test]
    async fn test_probe_gallery_statuses() {
        let (gallery, mut cache) =
            setup("![a](http://x/wide.png) ![b](http://x/broken.png) ![c](http://x/empty.png)");
        let requests = decode_requests(&gallery, &cache.states()[0], &());
        let results = probe_gallery(&FixedSizes, requests).await;

        let statuses: Vec<ImageStatus> = results.iter().map(DecodeResult::status).collect();
        assert_eq!(
            statuses,
            vec![
                ImageStatus::Loaded { ratio: 2.0 },
                ImageStatus::Failed,
                ImageStatus::Failed
            ]
        );
        assert!(matches!(
            results[2].outcome,
            Err(ProbeError::EmptyDimensions { .. })
        ));

        for result in &results {
            assert!(cache.apply_decode(result));
        }
        assert_eq!(cache.states()[0].images, statuses);
    }

    #[tokio::test]
    async fn test_probe_skipped_after_eviction() {
        let (gallery, mut cache) = setup("![a](http://x/wide.png)");
        let requests = decode_requests(&gallery, &cache.states()[0], &());
        cache.clear();
        let results = probe_gallery(&FixedSizes, requests).await;
        assert!(results[0].outcome.is_err());
        assert!(!cache.apply_decode(&results[0]));
    }

    #[test]
    fn test_row_flex() {
        assert_eq!(row_flex(&[2.0, 1.0, 0.5]), vec![1.0, 0.5, 0.25]);
        assert_eq!(row_flex(&[]), Vec::<f32>::new());
        assert_eq!(row_flex(&[0.0, 0.0]), vec![1.0, 1.0]);
    }
}
