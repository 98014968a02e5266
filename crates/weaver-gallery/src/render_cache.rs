//! Gallery reconciliation and retained render state.
//!
//! Rendered galleries carry state that is expensive or impossible to rebuild:
//! decoded aspect ratios, and previews of images that are still uploading.
//! On every re-parse the new gallery is compared against the retained state
//! by structural key. Matching galleries reuse their record with the new
//! anchor offset; others get a fresh record.
//!
//! Records are immutable. The table replaces whole records through
//! [`GalleryCache::update_anchor`] and [`GalleryCache::apply_decode`], so
//! there is exactly one holder of each gallery's anchor offset.

use std::collections::{HashMap, HashSet};

use smol_str::{SmolStr, format_smolstr};
use tokio_util::sync::CancellationToken;

use crate::decode::DecodeResult;
use crate::gallery::{Gallery, GalleryKey};

/// Decode state of one image in a rendered gallery.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum ImageStatus {
    #[default]
    Pending,
    Loaded {
        ratio: f32,
    },
    /// Load or decode failed; renders with a placeholder.
    Failed,
}

impl ImageStatus {
    /// Aspect ratio to lay out with, falling back to `default`.
    pub fn ratio_or(&self, default: f32) -> f32 {
        match self {
            ImageStatus::Loaded { ratio } => *ratio,
            ImageStatus::Pending | ImageStatus::Failed => default,
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, ImageStatus::Pending)
    }
}

/// Render state retained for one on-screen gallery.
#[derive(Debug, Clone)]
pub struct RetainedRenderState {
    /// Stable ID for DOM identity (format: `g-{n}`).
    pub id: SmolStr,
    pub key: GalleryKey,
    pub anchor_offset: usize,
    /// One entry per image, in parse order.
    pub images: Vec<ImageStatus>,
    /// Cancelled when the gallery is evicted; guards late decode results.
    pub cancel: CancellationToken,
}

impl RetainedRenderState {
    /// Fresh state with every image pending.
    pub fn fresh(id: SmolStr, gallery: &Gallery) -> Self {
        Self {
            id,
            key: gallery.key(),
            anchor_offset: gallery.anchor_offset(),
            images: vec![ImageStatus::Pending; gallery.image_count()],
            cancel: CancellationToken::new(),
        }
    }

    /// Check if `gallery` can be shown with this state.
    ///
    /// Row count, per-row counts and every url in order must match.
    pub fn matches(&self, gallery: &Gallery) -> bool {
        self.key.columns == gallery.columns_signature()
            && self.key.identity == gallery.identity_key()
    }

    /// Copy of this record at a new anchor offset.
    pub fn with_anchor(&self, anchor_offset: usize) -> Self {
        Self {
            anchor_offset,
            ..self.clone()
        }
    }

    /// Copy of this record with one image's decode status replaced.
    pub fn with_image(&self, index: usize, status: ImageStatus) -> Self {
        let mut images = self.images.clone();
        if let Some(slot) = images.get_mut(index) {
            *slot = status;
        }
        Self {
            images,
            ..self.clone()
        }
    }

    pub fn is_evicted(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// Generate a gallery ID from a monotonic counter.
pub fn make_gallery_id(index: usize) -> SmolStr {
    format_smolstr!("g-{}", index)
}

/// Monotonic source of gallery IDs.
#[derive(Debug, Clone, Default)]
pub struct GalleryIds {
    next: usize,
}

impl GalleryIds {
    pub fn next_id(&mut self) -> SmolStr {
        let id = make_gallery_id(self.next);
        self.next += 1;
        id
    }
}

/// Outcome of reconciling one candidate gallery.
#[derive(Debug, Clone)]
pub struct Reconciled {
    pub reuse: bool,
    pub state: RetainedRenderState,
}

/// Decide whether `candidate` can reuse `previous`.
///
/// On reuse the returned state is `previous` at the candidate's anchor,
/// decode results and cancellation token kept. Otherwise it is a fresh
/// record with a new ID and nothing decoded.
pub fn reconcile(
    previous: Option<&RetainedRenderState>,
    candidate: &Gallery,
    ids: &mut GalleryIds,
) -> Reconciled {
    match previous {
        Some(prev) if prev.matches(candidate) => Reconciled {
            reuse: true,
            state: prev.with_anchor(candidate.anchor_offset()),
        },
        _ => Reconciled {
            reuse: false,
            state: RetainedRenderState::fresh(ids.next_id(), candidate),
        },
    }
}

/// Result of one reconciliation pass over a document.
#[derive(Debug, Clone, Default)]
pub struct ReconcileReport {
    /// One entry per input gallery, same order.
    pub results: Vec<Reconciled>,
    /// Records that no gallery claimed.
    pub evicted: usize,
}

impl ReconcileReport {
    pub fn reused(&self) -> usize {
        self.results.iter().filter(|r| r.reuse).count()
    }

    pub fn rebuilt(&self) -> usize {
        self.results.len() - self.reused()
    }
}

/// Reconciliation table: retained state for every live gallery.
#[derive(Debug, Default)]
pub struct GalleryCache {
    /// Live records, in document order.
    entries: Vec<RetainedRenderState>,
    ids: GalleryIds,
}

impl GalleryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reconcile the full set of galleries currently in the document.
    ///
    /// Candidates claim records with the same key, preferring one already
    /// at the candidate's anchor so identical galleries keep their own
    /// records. Unclaimed records are evicted and their tokens cancelled.
    pub fn reconcile_all(&mut self, galleries: &[Gallery]) -> ReconcileReport {
        self.reconcile_claimed(galleries, &[])
    }

    /// Like [`reconcile_all`](Self::reconcile_all), with the record ID each
    /// gallery is known to own (same order as `galleries`; missing or `None`
    /// means unknown).
    ///
    /// A claimed record goes to its owner even when another gallery with the
    /// same key comes first or sits at the record's anchor.
    pub fn reconcile_claimed(&mut self, galleries: &[Gallery], claims: &[Option<SmolStr>]) -> ReconcileReport {
        let mut by_key: HashMap<GalleryKey, Vec<RetainedRenderState>> = HashMap::new();
        for entry in self.entries.drain(..) {
            by_key.entry(entry.key.clone()).or_default().push(entry);
        }
        let reserved: HashSet<&str> = claims.iter().flatten().map(SmolStr::as_str).collect();

        let mut results = Vec::with_capacity(galleries.len());
        for (index, gallery) in galleries.iter().enumerate() {
            let claim = claims.get(index).and_then(Option::as_ref);
            let previous = by_key.get_mut(&gallery.key()).and_then(|candidates| {
                let idx = match claim {
                    Some(id) => candidates.iter().position(|s| s.id == *id),
                    None => None,
                }
                .or_else(|| {
                    let free = |s: &RetainedRenderState| !reserved.contains(s.id.as_str());
                    candidates
                        .iter()
                        .position(|s| free(s) && s.anchor_offset == gallery.anchor_offset())
                        .or_else(|| candidates.iter().position(free))
                })?;
                Some(candidates.remove(idx))
            });

            let reconciled = reconcile(previous.as_ref(), gallery, &mut self.ids);
            tracing::trace!(
                target: "weaver::gallery",
                id = %reconciled.state.id,
                reuse = reconciled.reuse,
                anchor = gallery.anchor_offset(),
                "reconciled gallery"
            );
            results.push(reconciled);
        }

        let mut evicted = 0;
        for stale in by_key.into_values().flatten() {
            tracing::trace!(target: "weaver::gallery", id = %stale.id, "evicting gallery state");
            stale.cancel.cancel();
            evicted += 1;
        }

        self.entries = results.iter().map(|r| r.state.clone()).collect();

        tracing::debug!(
            target: "weaver::gallery",
            galleries = results.len(),
            evicted,
            "reconcile pass complete"
        );

        ReconcileReport { results, evicted }
    }

    /// Move a record to a new anchor offset. Returns false if `id` is unknown.
    pub fn update_anchor(&mut self, id: &str, anchor_offset: usize) -> bool {
        match self.entries.iter_mut().find(|e| e.id == id) {
            Some(entry) => {
                *entry = entry.with_anchor(anchor_offset);
                true
            }
            None => false,
        }
    }

    /// Apply an asynchronous decode result.
    ///
    /// Dropped if the owning gallery was evicted since the probe started,
    /// or if the record no longer has the image slot.
    pub fn apply_decode(&mut self, result: &DecodeResult) -> bool {
        if result.token.is_cancelled() {
            tracing::trace!(
                target: "weaver::gallery",
                id = %result.gallery_id,
                index = result.index,
                "dropping decode result for evicted gallery"
            );
            return false;
        }
        let Some(entry) = self.entries.iter_mut().find(|e| e.id == result.gallery_id) else {
            return false;
        };
        if result.index >= entry.images.len() {
            return false;
        }
        *entry = entry.with_image(result.index, result.status());
        true
    }

    pub fn get(&self, id: &str) -> Option<&RetainedRenderState> {
        self.entries.iter().find(|e| e.id == id)
    }

    pub fn find_by_anchor(&self, anchor_offset: usize) -> Option<&RetainedRenderState> {
        self.entries.iter().find(|e| e.anchor_offset == anchor_offset)
    }

    pub fn states(&self) -> &[RetainedRenderState] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Evict everything.
    pub fn clear(&mut self) {
        for entry in self.entries.drain(..) {
            entry.cancel.cancel();
        }
    }
}
