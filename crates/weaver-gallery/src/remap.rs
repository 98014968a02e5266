//! Position remapping and the document-level gallery field.
//!
//! After an edit, galleries whose paragraph text did not change are moved to
//! their new anchor without re-parsing. Everything else is re-parsed and
//! reconciled against the retained render state.

use std::collections::HashMap;
use std::ops::Range;

use smol_str::SmolStr;

use crate::config::GalleryConfig;
use crate::decode::{DecodeRequest, DecodeResult, decode_requests};
use crate::gallery::Gallery;
use crate::host::{BlockKind, BlockSource, ThumbnailResolver};
use crate::paragraph::hash_source;
use crate::render_cache::GalleryCache;
use crate::text::TextBuffer;
use crate::types::Affinity;
use crate::view::GalleryView;

/// Maps pre-edit positions to post-edit positions.
pub trait PositionMapper {
    fn map_pos(&self, pos: usize, affinity: Affinity) -> usize;
}

/// Replacement of `from..to` (pre-edit chars) with `insert_len` new chars.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Change {
    pub from: usize,
    pub to: usize,
    pub insert_len: usize,
}

impl Change {
    pub fn new(from: usize, to: usize, insert_len: usize) -> Self {
        Self { from, to, insert_len }
    }

    pub fn insert(at: usize, len: usize) -> Self {
        Self::new(at, at, len)
    }

    pub fn delete(range: Range<usize>) -> Self {
        Self::new(range.start, range.end, 0)
    }

    pub fn deleted_len(&self) -> usize {
        self.to - self.from
    }
}

/// Changes of one edit, applied simultaneously.
///
/// Ranges are in pre-edit coordinates, sorted and non-overlapping.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    changes: Vec<Change>,
}

impl ChangeSet {
    /// Sorts by start position. Overlapping changes are merged.
    pub fn new(mut changes: Vec<Change>) -> Self {
        changes.sort_by_key(|c| (c.from, c.to));
        let mut merged: Vec<Change> = Vec::with_capacity(changes.len());
        for change in changes {
            match merged.last_mut() {
                Some(last) if change.from < last.to => {
                    last.to = last.to.max(change.to);
                    last.insert_len += change.insert_len;
                }
                _ => merged.push(change),
            }
        }
        Self { changes: merged }
    }

    pub fn single(change: Change) -> Self {
        Self {
            changes: vec![change],
        }
    }

    pub fn changes(&self) -> &[Change] {
        &self.changes
    }

    /// True if no change inserts or deletes anything.
    pub fn is_empty(&self) -> bool {
        self.changes
            .iter()
            .all(|c| c.from == c.to && c.insert_len == 0)
    }

    /// Net change in document length.
    pub fn len_delta(&self) -> isize {
        self.changes
            .iter()
            .map(|c| c.insert_len as isize - c.deleted_len() as isize)
            .sum()
    }
}

impl PositionMapper for ChangeSet {
    fn map_pos(&self, pos: usize, affinity: Affinity) -> usize {
        let mut shift: isize = 0;
        for change in &self.changes {
            if pos < change.from {
                break;
            }
            let delta = change.insert_len as isize - change.deleted_len() as isize;
            if pos > change.to {
                shift += delta;
                continue;
            }
            let before = (change.from as isize + shift) as usize;
            if pos < change.to {
                return match affinity {
                    Affinity::Before => before,
                    Affinity::After => before + change.insert_len,
                };
            }
            // At the end of the change: past the new text, unless this is an
            // insertion and the position sticks before it. Later changes at
            // the same point still apply.
            if change.from == change.to && affinity == Affinity::Before {
                return before;
            }
            shift += delta;
        }
        (pos as isize + shift) as usize
    }
}

impl<T: PositionMapper> PositionMapper for &T {
    fn map_pos(&self, pos: usize, affinity: Affinity) -> usize {
        (*self).map_pos(pos, affinity)
    }
}

/// What one [`GalleryField::update`] did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateSummary {
    /// Moved to a new anchor without re-parsing.
    pub remapped: usize,
    /// Re-parsed and matched existing render state.
    pub reused: usize,
    /// Re-parsed and given fresh render state.
    pub rebuilt: usize,
    /// Render state evicted.
    pub dropped: usize,
}

#[derive(Debug, Clone)]
struct GalleryEntry {
    gallery: Gallery,
    source_hash: u64,
    /// Render state record, once reconciled.
    id: Option<SmolStr>,
}

/// Galleries of a document, kept in step with its edits.
#[derive(Debug, Default)]
pub struct GalleryField {
    config: GalleryConfig,
    entries: Vec<GalleryEntry>,
    cache: GalleryCache,
}

impl GalleryField {
    pub fn new(config: GalleryConfig) -> Self {
        Self {
            config,
            entries: Vec::new(),
            cache: GalleryCache::new(),
        }
    }

    pub fn config(&self) -> &GalleryConfig {
        &self.config
    }

    /// Parse every paragraph of `doc` from scratch.
    pub fn rebuild<T, B>(&mut self, doc: &T, blocks: &B) -> UpdateSummary
    where
        T: TextBuffer + ?Sized,
        B: BlockSource,
    {
        self.sync(doc, blocks, &HashMap::new())
    }

    /// Bring galleries up to date after an edit.
    ///
    /// `changes` is `None` for transactions that did not touch the text, in
    /// which case nothing happens.
    pub fn update<T, B>(&mut self, doc: &T, blocks: &B, changes: Option<&ChangeSet>) -> UpdateSummary
    where
        T: TextBuffer + ?Sized,
        B: BlockSource,
    {
        let Some(changes) = changes else {
            return UpdateSummary::default();
        };
        if changes.is_empty() {
            return UpdateSummary::default();
        }

        // Entries are in document order, so when a deletion lands two anchors
        // on the same spot the later gallery, which survived it, wins.
        let mut mapped: HashMap<usize, GalleryEntry> = HashMap::new();
        for entry in self.entries.drain(..) {
            let anchor = changes.map_pos(entry.gallery.anchor_offset(), Affinity::Before);
            mapped.insert(anchor, entry);
        }
        self.sync(doc, blocks, &mapped)
    }

    fn sync<T, B>(&mut self, doc: &T, blocks: &B, mapped: &HashMap<usize, GalleryEntry>) -> UpdateSummary
    where
        T: TextBuffer + ?Sized,
        B: BlockSource,
    {
        let mut summary = UpdateSummary::default();
        if !self.config.preview {
            summary.dropped = self.cache.len();
            self.cache.clear();
            self.entries.clear();
            return summary;
        }

        let policy = self.config.scheme_policy();
        let mut entries = Vec::new();

        for span in blocks.spans_of_type(BlockKind::Paragraph) {
            let Some(text) = doc.slice(span.clone()) else {
                continue;
            };
            let source_hash = hash_source(&text);

            if let Some(prev) = mapped.get(&span.start).filter(|e| e.source_hash == source_hash) {
                let id = prev
                    .id
                    .clone()
                    .filter(|id| self.cache.update_anchor(id, span.start));
                entries.push(GalleryEntry {
                    gallery: prev.gallery.with_anchor(span.start),
                    source_hash,
                    id,
                });
                continue;
            }

            if let Some(gallery) = Gallery::parse_with(&text, span.start, &policy) {
                entries.push(GalleryEntry {
                    gallery,
                    source_hash,
                    id: None,
                });
            }
        }

        let galleries: Vec<Gallery> = entries.iter().map(|e| e.gallery.clone()).collect();
        let claims: Vec<Option<SmolStr>> = entries.iter().map(|e| e.id.clone()).collect();
        let report = self.cache.reconcile_claimed(&galleries, &claims);
        summary.dropped = report.evicted;
        for (entry, result) in entries.iter_mut().zip(&report.results) {
            let was_remapped = entry.id.as_ref() == Some(&result.state.id);
            if was_remapped {
                summary.remapped += 1;
            } else if result.reuse {
                summary.reused += 1;
            } else {
                summary.rebuilt += 1;
            }
            entry.id = Some(result.state.id.clone());
        }
        self.entries = entries;

        tracing::debug!(
            target: "weaver::gallery",
            galleries = self.entries.len(),
            remapped = summary.remapped,
            reused = summary.reused,
            rebuilt = summary.rebuilt,
            dropped = summary.dropped,
            "gallery field updated"
        );
        summary
    }

    /// Current galleries in document order.
    pub fn galleries(&self) -> impl Iterator<Item = &Gallery> {
        self.entries.iter().map(|e| &e.gallery)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn cache(&self) -> &GalleryCache {
        &self.cache
    }

    pub fn gallery_at(&self, anchor_offset: usize) -> Option<&Gallery> {
        self.galleries().find(|g| g.anchor_offset() == anchor_offset)
    }

    /// Render-ready view of the gallery anchored at `anchor_offset`.
    pub fn view<R: ThumbnailResolver>(&self, anchor_offset: usize, resolver: &R) -> Option<GalleryView> {
        let entry = self.entries.iter().find(|e| e.gallery.anchor_offset() == anchor_offset)?;
        let gallery = &entry.gallery;
        let state = self.cache.get(entry.id.as_deref()?)?;
        Some(GalleryView::build(
            gallery,
            state,
            resolver,
            self.config.default_aspect_ratio,
        ))
    }

    /// Views of every gallery, in document order.
    pub fn views<R: ThumbnailResolver>(&self, resolver: &R) -> Vec<GalleryView> {
        self.galleries()
            .filter_map(|g| self.view(g.anchor_offset(), resolver))
            .collect()
    }

    /// Probe requests for every image still waiting on its dimensions.
    pub fn decode_requests<R: ThumbnailResolver>(&self, resolver: &R) -> Vec<DecodeRequest> {
        self.entries
            .iter()
            .filter_map(|e| {
                let state = self.cache.get(e.id.as_deref()?)?;
                Some(decode_requests(&e.gallery, state, resolver))
            })
            .flatten()
            .collect()
    }

    pub fn apply_decode(&mut self, result: &DecodeResult) -> bool {
        self.cache.apply_decode(result)
    }
}
