//! weaver-gallery: Markdown image galleries for the editor.
//!
//! This crate provides:
//! - `scanner` - recognizer for one `![alt](href "title")` construct
//! - `paragraph` / `gallery` - image-only paragraphs grouped into rows
//! - `render_cache` - reuse-or-rebuild reconciliation of rendered galleries
//! - `remap` - position mapping and `GalleryField`, the document-level driver
//! - `decode` - async aspect-ratio probing guarded by cancellation tokens
//! - `upload` - placeholder insertion and completion for uploaded images
//! - `events` - tile interactions turned into edits and selections
//!
//! Host editor capabilities are injected through the traits in `host`.

pub mod config;
pub mod decode;
pub mod error;
pub mod events;
pub mod gallery;
pub mod host;
pub mod paragraph;
pub mod remap;
pub mod render_cache;
pub mod scanner;
pub mod text;
pub mod types;
pub mod upload;
pub mod view;

pub use config::GalleryConfig;
pub use decode::{DecodeRequest, DecodeResult, decode_requests, probe_gallery, row_flex};
pub use error::{ConfigError, ProbeError, ScanError, UploadError};
pub use events::{GalleryEvent, GalleryIntent, apply_event};
pub use gallery::{Gallery, GalleryKey, ImageReference, Row};
pub use host::{
    BlankLineBlocks, BlockKind, BlockSource, ImageProbe, ImageSize, LocalHandles, PendingFile,
    ProgressSink, ThumbnailFn, ThumbnailResolver, Uploader, ignore_progress,
};
pub use paragraph::{hash_source, parse_paragraph, parse_paragraph_with};
pub use remap::{Change, ChangeSet, GalleryField, PositionMapper, UpdateSummary};
pub use render_cache::{
    GalleryCache, ImageStatus, ReconcileReport, Reconciled, RetainedRenderState,
    make_gallery_id, reconcile,
};
pub use scanner::{ScannedImage, SchemePolicy, scan_one, scan_one_with};
pub use smol_str::SmolStr;
pub use text::{EditorRope, TextBuffer};
pub use types::{Affinity, Selection};
pub use upload::{
    HandleRegistry, UploadBatch, UploadOutcome, UploadPlaceholder, UploadState, UploadTask,
    UploadTrigger, accept_files, begin_uploads, complete_upload, handle_files,
    placeholder_markdown, prepare_image_block,
};
pub use view::{GalleryView, RenderedImage};
