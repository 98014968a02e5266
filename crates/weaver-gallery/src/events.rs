//! Interactions with rendered gallery tiles.
//!
//! The renderer reports what the user did to a tile as a [`GalleryEvent`];
//! [`apply_event`] turns it into a buffer edit and the selection to show.

use crate::gallery::{Gallery, ImageReference};
use crate::host::LocalHandles;
use crate::text::TextBuffer;
use crate::types::Selection;
use crate::upload::HandleRegistry;

/// What the user did to a tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GalleryIntent {
    /// Click: move the cursor to just after the image source.
    Locate,
    /// Select the image's source text.
    Select,
    /// Remove the image from the document.
    Delete,
}

/// A tile interaction, addressed by absolute char range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GalleryEvent {
    pub intent: GalleryIntent,
    pub from: usize,
    pub to: usize,
    pub source_url: String,
}

impl GalleryEvent {
    /// Event for `image` as it sits in `gallery`.
    pub fn for_image(intent: GalleryIntent, gallery: &Gallery, image: &ImageReference) -> Self {
        let range = image.absolute_range(gallery.anchor_offset());
        Self {
            intent,
            from: range.start,
            to: range.end,
            source_url: image.source_url.clone(),
        }
    }
}

/// Apply an event to the document, returning the new selection.
///
/// Offsets are clamped to the current document. Deleting an image whose
/// url is a live local handle releases that handle.
pub fn apply_event<T, H>(
    doc: &mut T,
    event: &GalleryEvent,
    handles: &mut HandleRegistry<H>,
) -> Selection
where
    T: TextBuffer + ?Sized,
    H: LocalHandles,
{
    let span = Selection::from(event.from..event.to)
        .clamp(doc.len_chars())
        .to_range();
    let (from, to) = (span.start, span.end);

    match event.intent {
        GalleryIntent::Locate => Selection::collapsed(to),
        GalleryIntent::Select => Selection::new(from, to),
        GalleryIntent::Delete => {
            doc.delete(from..to);
            if handles.is_live(&event.source_url) {
                handles.release(&event.source_url);
            }
            tracing::debug!(
                target: "weaver::gallery",
                from,
                to,
                url = %event.source_url,
                "deleted gallery image"
            );
            Selection::collapsed(from)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::PendingFile;
    use crate::text::EditorRope;
    use smol_str::{SmolStr, format_smolstr};
    use std::cell::RefCell;

    #[derive(Default)]
    struct Handles {
        released: RefCell<Vec<String>>,
    }

    impl LocalHandles for Handles {
        fn create(&self, file: &PendingFile) -> SmolStr {
            format_smolstr!("blob:{}", file.name)
        }

        fn release(&self, handle: &str) {
            self.released.borrow_mut().push(handle.to_string());
        }
    }

    const TEXT: &str = "intro\n\n![a](http://x/a.png) ![b](http://x/b.png)";

    fn second_image_event(intent: GalleryIntent) -> GalleryEvent {
        let gallery = Gallery::parse(&TEXT[7..], 7).unwrap();
        let image = &gallery.rows()[0].images()[1];
        GalleryEvent::for_image(intent, &gallery, image)
    }

    #[test]
    fn test_locate_and_select() {
        let mut doc = EditorRope::from_str(TEXT);
        let mut handles = HandleRegistry::new(Handles::default());

        let event = second_image_event(GalleryIntent::Locate);
        assert_eq!((event.from, event.to), (28, 48));
        assert_eq!(apply_event(&mut doc, &event, &mut handles), Selection::collapsed(48));

        let event = second_image_event(GalleryIntent::Select);
        assert_eq!(apply_event(&mut doc, &event, &mut handles), Selection::new(28, 48));
        assert_eq!(doc.to_string(), TEXT);
    }

    #[test]
    fn test_delete_removes_span() {
        let mut doc = EditorRope::from_str(TEXT);
        let mut handles = HandleRegistry::new(Handles::default());
        let event = second_image_event(GalleryIntent::Delete);

        let selection = apply_event(&mut doc, &event, &mut handles);
        assert_eq!(selection, Selection::collapsed(28));
        assert_eq!(doc.to_string(), "intro\n\n![a](http://x/a.png) ");
        assert!(handles.handles().released.borrow().is_empty());
    }

    #[test]
    fn test_delete_releases_local_handle() {
        let mut handles = HandleRegistry::new(Handles::default());
        let handle = handles.create(&PendingFile::new("shot.png", "image/png", vec![0u8]));
        let text = format!("![shot.png](<{handle}>)");
        let mut doc = EditorRope::from_str(&text);

        let event = GalleryEvent {
            intent: GalleryIntent::Delete,
            from: 0,
            to: text.chars().count(),
            source_url: handle.to_string(),
        };
        apply_event(&mut doc, &event, &mut handles);
        assert!(doc.is_empty());
        assert_eq!(*handles.handles().released.borrow(), vec!["blob:shot.png"]);
        assert_eq!(handles.live_count(), 0);
    }

    #[test]
    fn test_out_of_range_event_is_clamped() {
        let mut doc = EditorRope::from_str("short");
        let mut handles = HandleRegistry::new(Handles::default());
        let event = GalleryEvent {
            intent: GalleryIntent::Delete,
            from: 3,
            to: 50,
            source_url: "http://x/a.png".into(),
        };
        assert_eq!(apply_event(&mut doc, &event, &mut handles), Selection::collapsed(3));
        assert_eq!(doc.to_string(), "sho");
    }
}
