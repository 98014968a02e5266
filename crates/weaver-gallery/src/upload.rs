//! Upload placeholder lifecycle.
//!
//! Pasted, dropped or picked images are inserted as markdown placeholders
//! pointing at a local handle, so they preview immediately. When the upload
//! resolves, the placeholder is located by its exact text and rewritten to
//! point at the final url. If the user has edited the placeholder in the
//! meantime, the result is discarded.
//!
//! ```text
//! Idle -> Inserted -> Completed { url }
//!                  -> Failed { reason }
//!                  -> Detached
//! ```
//!
//! Every local handle is released exactly once, whichever way the upload
//! ends.

use std::collections::HashSet;
use std::ops::Range;

use futures_util::StreamExt;
use futures_util::stream::FuturesUnordered;
use smol_str::SmolStr;
use web_time::Instant;

use crate::config::GalleryConfig;
use crate::error::UploadError;
use crate::host::{LocalHandles, PendingFile, ProgressSink, Uploader};
use crate::text::{TextBuffer, is_blank_line, line_bounds};

/// Where a batch of files came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadTrigger {
    Paste,
    /// Dropped files, with the char offset under the pointer if the host
    /// could resolve one.
    Drop { at: Option<usize> },
    /// Explicit file picker; never disabled by config.
    Picker,
}

/// Keep only image files. Others are dropped silently.
pub fn accept_files(files: impl IntoIterator<Item = PendingFile>) -> Vec<PendingFile> {
    files.into_iter().filter(PendingFile::is_image).collect()
}

/// Tracks which local handles are live so each is released exactly once.
#[derive(Debug)]
pub struct HandleRegistry<H> {
    handles: H,
    live: HashSet<SmolStr>,
}

impl<H: LocalHandles> HandleRegistry<H> {
    pub fn new(handles: H) -> Self {
        Self {
            handles,
            live: HashSet::new(),
        }
    }

    pub fn create(&mut self, file: &PendingFile) -> SmolStr {
        let handle = self.handles.create(file);
        tracing::trace!(target: "weaver::gallery", %handle, file = %file.name, "created local handle");
        self.live.insert(handle.clone());
        handle
    }

    /// Release `handle`. Returns false if it was not live.
    pub fn release(&mut self, handle: &str) -> bool {
        if self.live.remove(handle) {
            self.handles.release(handle);
            tracing::trace!(target: "weaver::gallery", %handle, "released local handle");
            true
        } else {
            false
        }
    }

    pub fn is_live(&self, handle: &str) -> bool {
        self.live.contains(handle)
    }

    pub fn live_count(&self) -> usize {
        self.live.len()
    }

    pub fn handles(&self) -> &H {
        &self.handles
    }
}

/// Make sure the images land in their own paragraph.
///
/// Unless the cursor is on the first line, a line break is appended to the
/// cursor's line when it has content, and another when the previous line
/// has content. Returns the cursor position to insert at.
pub fn prepare_image_block<T: TextBuffer + ?Sized>(doc: &mut T, cursor: usize) -> usize {
    let line = line_bounds(doc, cursor);
    if line.start == 0 {
        return cursor.min(doc.len_chars());
    }

    let mut insert = String::new();
    if !is_blank_line(doc, line.clone()) {
        insert.push('\n');
    }
    let prev = line_bounds(doc, line.start - 1);
    if !is_blank_line(doc, prev) {
        insert.push('\n');
    }

    if insert.is_empty() {
        return cursor.min(doc.len_chars());
    }
    doc.insert(line.end, &insert);
    line.end + insert.len()
}

/// Markdown for an image with an angle-bracket destination.
pub fn placeholder_markdown(file_name: &str, url: &str) -> String {
    let mut alt = String::with_capacity(file_name.len());
    for c in file_name.chars() {
        if matches!(c, '[' | ']' | '\\') {
            alt.push('\\');
        }
        alt.push(c);
    }
    format!("![{alt}](<{url}>)")
}

/// Lifecycle state of one placeholder.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum UploadState {
    #[default]
    Idle,
    Inserted,
    Completed {
        url: String,
    },
    Failed {
        reason: String,
    },
    /// The placeholder text was edited away before the upload finished.
    Detached,
}

/// A placeholder inserted for one file.
#[derive(Debug, Clone)]
pub struct UploadPlaceholder {
    pub handle: SmolStr,
    pub file_name: SmolStr,
    /// Exact placeholder markdown, used to find it again.
    pub text: String,
    /// Char span at insertion time. Only valid until the next edit.
    pub inserted_span: Range<usize>,
    pub started: Instant,
    pub state: UploadState,
}

/// One file to upload along with its placeholder.
#[derive(Debug, Clone)]
pub struct UploadTask {
    pub file: PendingFile,
    pub placeholder: UploadPlaceholder,
}

impl UploadTask {
    /// Upload the file, forwarding progress keyed by the placeholder's handle.
    pub async fn run<U, P>(self, uploader: &U, progress: &P) -> (UploadPlaceholder, Result<String, UploadError>)
    where
        U: Uploader,
        P: ProgressSink,
    {
        let handle = self.placeholder.handle.clone();
        let forward = |percent: u8| progress.report(&handle, percent.min(100));
        let result = uploader.upload(&self.file, &forward).await;
        (self.placeholder, result)
    }
}

/// Placeholders inserted for one paste/drop/pick.
#[derive(Debug, Clone)]
pub struct UploadBatch {
    pub tasks: Vec<UploadTask>,
    /// Cursor after the inserted placeholders.
    pub cursor: usize,
}

impl UploadBatch {
    /// Run every upload concurrently, completing each as it resolves.
    ///
    /// Outcomes are in completion order.
    pub async fn drive<T, U, H, P>(
        self,
        doc: &mut T,
        uploader: &U,
        handles: &mut HandleRegistry<H>,
        progress: &P,
    ) -> Vec<UploadOutcome>
    where
        T: TextBuffer + ?Sized,
        U: Uploader,
        H: LocalHandles,
        P: ProgressSink,
    {
        let mut pending: FuturesUnordered<_> = self
            .tasks
            .into_iter()
            .map(|task| task.run(uploader, progress))
            .collect();

        let mut outcomes = Vec::new();
        while let Some((mut placeholder, result)) = pending.next().await {
            outcomes.push(complete_upload(doc, &mut placeholder, result, handles));
        }
        outcomes
    }
}

/// Insert placeholders for `files` at `cursor`.
///
/// Non-image files are skipped; returns `None` if nothing is left.
pub fn begin_uploads<T, H>(
    doc: &mut T,
    cursor: usize,
    files: impl IntoIterator<Item = PendingFile>,
    handles: &mut HandleRegistry<H>,
) -> Option<UploadBatch>
where
    T: TextBuffer + ?Sized,
    H: LocalHandles,
{
    let images = accept_files(files);
    if images.is_empty() {
        return None;
    }

    let mut cursor = prepare_image_block(doc, cursor);
    let count = images.len();
    let mut tasks = Vec::with_capacity(count);

    for (index, file) in images.into_iter().enumerate() {
        let handle = handles.create(&file);
        let text = placeholder_markdown(&file.name, &handle);

        let prefix = if index > 0 { " " } else { "" };
        let suffix = if index == count - 1 { "\n\n" } else { "" };
        doc.insert(cursor, &format!("{prefix}{text}{suffix}"));

        let start = cursor + prefix.len();
        let end = start + text.chars().count();
        cursor = end + suffix.len();

        tasks.push(UploadTask {
            placeholder: UploadPlaceholder {
                handle,
                file_name: file.name.clone(),
                text,
                inserted_span: start..end,
                started: Instant::now(),
                state: UploadState::Inserted,
            },
            file,
        });
    }

    tracing::debug!(target: "weaver::gallery", count, cursor, "inserted upload placeholders");
    Some(UploadBatch { tasks, cursor })
}

/// Entry point for host file events: checks the trigger against config and
/// moves the cursor to the drop point.
pub fn handle_files<T, H>(
    doc: &mut T,
    cursor: usize,
    files: impl IntoIterator<Item = PendingFile>,
    trigger: UploadTrigger,
    config: &GalleryConfig,
    handles: &mut HandleRegistry<H>,
) -> Option<UploadBatch>
where
    T: TextBuffer + ?Sized,
    H: LocalHandles,
{
    if !config.accepts(trigger) {
        tracing::trace!(target: "weaver::gallery", ?trigger, "uploads disabled for trigger");
        return None;
    }
    let cursor = match trigger {
        UploadTrigger::Drop { at: Some(pos) } => pos.min(doc.len_chars()),
        _ => cursor,
    };
    begin_uploads(doc, cursor, files, handles)
}

/// How an upload ended.
#[derive(Debug, Clone, PartialEq)]
pub enum UploadOutcome {
    /// Placeholder rewritten; `span` is the new image's char range.
    Completed {
        handle: SmolStr,
        url: String,
        span: Range<usize>,
    },
    /// Placeholder no longer in the document; url discarded.
    Detached { handle: SmolStr, url: String },
    /// Upload failed; placeholder removed if still present.
    Failed { handle: SmolStr, error: UploadError },
}

/// Whether `url` can sit inside `<...>` and still scan as an image.
fn is_angle_safe(url: &str) -> bool {
    !url.trim().is_empty() && !url.contains(['<', '>', '\\', '\n', '\r', '\0'])
}

/// Settle one upload and release its handle.
pub fn complete_upload<T, H>(
    doc: &mut T,
    placeholder: &mut UploadPlaceholder,
    result: Result<String, UploadError>,
    handles: &mut HandleRegistry<H>,
) -> UploadOutcome
where
    T: TextBuffer + ?Sized,
    H: LocalHandles,
{
    let handle = placeholder.handle.clone();
    let elapsed_ms = placeholder.started.elapsed().as_millis() as u64;
    let result = result.and_then(|url| {
        if !is_angle_safe(&url) {
            Err(UploadError::InvalidUrl {
                file_name: placeholder.file_name.to_string(),
                url,
            })
        } else {
            Ok(url)
        }
    });

    let outcome = match result {
        Ok(url) => match doc.find(&placeholder.text) {
            Some(span) => {
                let replacement = placeholder_markdown(&placeholder.file_name, &url);
                let new_len = replacement.chars().count();
                doc.replace(span.clone(), &replacement);
                tracing::debug!(target: "weaver::gallery", %handle, %url, elapsed_ms, "upload complete");
                placeholder.state = UploadState::Completed { url: url.clone() };
                UploadOutcome::Completed {
                    handle: handle.clone(),
                    url,
                    span: span.start..span.start + new_len,
                }
            }
            None => {
                tracing::debug!(target: "weaver::gallery", %handle, elapsed_ms, "placeholder edited, discarding upload url");
                placeholder.state = UploadState::Detached;
                UploadOutcome::Detached {
                    handle: handle.clone(),
                    url,
                }
            }
        },
        Err(error) => {
            if let Some(span) = doc.find(&placeholder.text) {
                doc.delete(span);
            }
            tracing::warn!(target: "weaver::gallery", %handle, %error, elapsed_ms, "upload failed");
            placeholder.state = UploadState::Failed {
                reason: error.to_string(),
            };
            UploadOutcome::Failed {
                handle: handle.clone(),
                error,
            }
        }
    };

    handles.release(&handle);
    outcome
}
