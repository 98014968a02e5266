use std::cell::Cell;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use miette::{IntoDiagnostic, Result};
use weaver_gallery::{
    BlankLineBlocks, Change, ChangeSet, EditorRope, GalleryConfig, GalleryField, GalleryView,
    HandleRegistry, LocalHandles, PendingFile, SmolStr, TextBuffer, ThumbnailFn, UploadError,
    UploadOutcome, UploadTrigger, Uploader, handle_files,
};

mod config;

#[derive(Parser)]
#[command(version, about = "Weaver gallery - inspect and stage markdown image galleries", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to gallery config (KDL)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the galleries found in a markdown file
    Scan {
        file: PathBuf,

        /// Prefix prepended to every image url for display
        #[arg(long)]
        thumbnail_prefix: Option<String>,
    },
    /// Replay the edit between two versions of a file through the reconciler
    Replay { before: PathBuf, after: PathBuf },
    /// Copy images next to a document and insert them as a gallery
    Stage {
        /// Markdown document to insert into
        doc: PathBuf,

        /// Image files to insert
        #[arg(required = true)]
        images: Vec<PathBuf>,

        /// Directory the images are copied into
        #[arg(long, default_value = "images")]
        dest: PathBuf,

        /// Url prefix the copied images are served from
        #[arg(long)]
        base_url: String,

        /// Char offset to insert at (defaults to the end of the document)
        #[arg(long)]
        at: Option<usize>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    init_miette()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = config::load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Scan {
            file,
            thumbnail_prefix,
        } => scan(&file, thumbnail_prefix, config).await?,
        Commands::Replay { before, after } => replay(&before, &after, config).await?,
        Commands::Stage {
            doc,
            images,
            dest,
            base_url,
            at,
        } => stage(&doc, images, dest, base_url, at, config).await?,
    }

    Ok(())
}

fn init_miette() -> Result<()> {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .with_cause_chain()
                .color(true)
                .context_lines(5)
                .tab_width(2)
                .break_words(true)
                .build(),
        )
    }))
    .into_diagnostic()?;
    miette::set_panic_hook();
    Ok(())
}

async fn read_doc(path: &Path) -> Result<EditorRope> {
    let text = tokio::fs::read_to_string(path).await.into_diagnostic()?;
    Ok(EditorRope::from_str(&text))
}

async fn scan(file: &Path, thumbnail_prefix: Option<String>, config: GalleryConfig) -> Result<()> {
    let doc = read_doc(file).await?;
    let text = doc.to_string();
    let mut field = GalleryField::new(config);
    field.rebuild(&doc, &BlankLineBlocks::new(&text));

    let resolver = thumbnail_prefix.map(|prefix| ThumbnailFn(move |url: &str| format!("{prefix}{url}")));
    let views = field.views(&resolver);
    if views.is_empty() {
        println!("No galleries in {}", file.display());
    }
    for view in &views {
        print_view(view);
    }
    Ok(())
}

fn print_view(view: &GalleryView) {
    println!("{} @ {}", view.id, view.anchor_offset);
    for (index, row) in view.rows.iter().enumerate() {
        println!("  row {}:", index + 1);
        for tile in row {
            let title = tile
                .title
                .as_deref()
                .map(|t| format!(" \"{t}\""))
                .unwrap_or_default();
            println!(
                "    [{}..{}] {}{} -> {}",
                tile.from, tile.to, tile.alt_text, title, tile.display_url
            );
        }
    }
}

/// Single change turning `before` into `after`, from their common prefix
/// and suffix in chars.
fn change_between(before: &str, after: &str) -> Option<Change> {
    let old: Vec<char> = before.chars().collect();
    let new: Vec<char> = after.chars().collect();

    let prefix = old.iter().zip(&new).take_while(|(a, b)| a == b).count();
    if prefix == old.len() && prefix == new.len() {
        return None;
    }
    let max_suffix = old.len().min(new.len()) - prefix;
    let suffix = old
        .iter()
        .rev()
        .zip(new.iter().rev())
        .take(max_suffix)
        .take_while(|(a, b)| a == b)
        .count();

    Some(Change::new(
        prefix,
        old.len() - suffix,
        new.len() - suffix - prefix,
    ))
}

async fn replay(before: &Path, after: &Path, config: GalleryConfig) -> Result<()> {
    let old_doc = read_doc(before).await?;
    let new_doc = read_doc(after).await?;
    let old_text = old_doc.to_string();
    let new_text = new_doc.to_string();

    let mut field = GalleryField::new(config);
    field.rebuild(&old_doc, &BlankLineBlocks::new(&old_text));
    println!("before: {} galleries", field.len());

    let changes = change_between(&old_text, &new_text).map(ChangeSet::single);
    if let Some(change) = changes.as_ref().and_then(|c| c.changes().first()) {
        println!(
            "edit: replace {}..{} with {} chars",
            change.from, change.to, change.insert_len
        );
    }
    let summary = field.update(&new_doc, &BlankLineBlocks::new(&new_text), changes.as_ref());
    println!(
        "after: {} galleries (remapped {}, reused {}, rebuilt {}, dropped {})",
        field.len(),
        summary.remapped,
        summary.reused,
        summary.rebuilt,
        summary.dropped
    );
    for view in field.views(&()) {
        print_view(&view);
    }
    Ok(())
}

/// Handles of the form `blob:weaver-gallery/<n>`.
#[derive(Default)]
struct CounterHandles {
    next: Cell<usize>,
}

impl LocalHandles for CounterHandles {
    fn create(&self, _file: &PendingFile) -> SmolStr {
        let n = self.next.get() + 1;
        self.next.set(n);
        SmolStr::new(format!("blob:weaver-gallery/{n}"))
    }

    fn release(&self, handle: &str) {
        tracing::trace!(handle, "released");
    }
}

/// "Uploads" by writing the file into a directory served at `base_url`.
struct DirectoryUploader {
    dest: PathBuf,
    base_url: String,
}

impl Uploader for DirectoryUploader {
    async fn upload(&self, file: &PendingFile, progress: &dyn Fn(u8)) -> Result<String, UploadError> {
        progress(0);
        let target = self.dest.join(file.name.as_str());
        tokio::fs::write(&target, &file.data)
            .await
            .map_err(|err| UploadError::Transport {
                file_name: file.name.to_string(),
                reason: err.to_string(),
            })?;
        progress(100);
        Ok(format!("{}/{}", self.base_url.trim_end_matches('/'), file.name))
    }
}

fn media_type(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    match ext.as_deref() {
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("avif") => "image/avif",
        Some("svg") => "image/svg+xml",
        _ => "application/octet-stream",
    }
}

async fn stage(
    doc_path: &Path,
    images: Vec<PathBuf>,
    dest: PathBuf,
    base_url: String,
    at: Option<usize>,
    config: GalleryConfig,
) -> Result<()> {
    let mut doc = read_doc(doc_path).await?;

    let mut files = Vec::with_capacity(images.len());
    for path in &images {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| miette::miette!("Not a file path: {}", path.display()))?;
        let media = media_type(path);
        if !media.starts_with("image/") {
            tracing::warn!(path = %path.display(), "skipping non-image file");
        }
        let data = tokio::fs::read(path).await.into_diagnostic()?;
        files.push(PendingFile::new(name, media, data));
    }

    tokio::fs::create_dir_all(&dest).await.into_diagnostic()?;

    let mut handles = HandleRegistry::new(CounterHandles::default());
    let cursor = at.unwrap_or_else(|| doc.len_chars());
    let Some(batch) = handle_files(
        &mut doc,
        cursor,
        files,
        UploadTrigger::Picker,
        &config,
        &mut handles,
    ) else {
        println!("No images to stage");
        return Ok(());
    };

    let uploader = DirectoryUploader { dest, base_url };
    let progress = |handle: &str, percent: u8| tracing::debug!(handle, percent, "upload progress");
    let outcomes = batch
        .drive(&mut doc, &uploader, &mut handles, &progress)
        .await;

    let mut failed = 0;
    for outcome in &outcomes {
        match outcome {
            UploadOutcome::Completed { url, .. } => println!("staged {url}"),
            UploadOutcome::Detached { url, .. } => println!("staged {url} (placeholder missing)"),
            UploadOutcome::Failed { error, .. } => {
                failed += 1;
                eprintln!("{error}");
            }
        }
    }

    tokio::fs::write(doc_path, doc.to_string())
        .await
        .into_diagnostic()?;

    if failed > 0 {
        return Err(miette::miette!("{failed} of {} images failed", outcomes.len()));
    }
    Ok(())
}
