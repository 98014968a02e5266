//! Paragraph-level gallery parsing.
//!
//! A paragraph is a gallery only if it consists entirely of image constructs
//! separated by whitespace. A line break between two constructs starts a new
//! row. Anything else voids the whole paragraph: there are no partial
//! galleries mixing literal markdown with image tiles.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use crate::gallery::{ImageReference, Row};
use crate::scanner::{self, SchemePolicy, skip_whitespace};

/// Parse a paragraph into rows with the web-only scheme policy.
///
/// An empty result means the paragraph is not a gallery.
pub fn parse_paragraph(text: &str) -> Vec<Row> {
    parse_paragraph_with(text, &SchemePolicy::web_only())
}

/// Parse a paragraph into rows of image references.
///
/// Reference offsets are char offsets relative to the start of `text`.
pub fn parse_paragraph_with(text: &str, policy: &SchemePolicy) -> Vec<Row> {
    let bytes = text.as_bytes();
    let mut pos = skip_whitespace(bytes, 0);
    if pos == bytes.len() {
        return Vec::new();
    }

    let mut chars = CharCursor::new(text);
    let mut rows: Vec<Row> = Vec::new();
    let mut current: Vec<ImageReference> = Vec::new();

    loop {
        let scanned = match scanner::scan_one_with(text, pos, policy) {
            Ok(scanned) => scanned,
            Err(err) => {
                tracing::trace!(
                    target: "weaver::gallery",
                    %err,
                    parsed_images = current.len() + rows.iter().map(Row::len).sum::<usize>(),
                    "paragraph is not a gallery"
                );
                if tracing::enabled!(target: "weaver::gallery", tracing::Level::TRACE) {
                    let tail: String = text[pos..].chars().take(40).collect();
                    tracing::trace!(
                        target: "weaver::gallery",
                        pos,
                        tail = %tail.escape_debug(),
                        "scan stopped here"
                    );
                }
                return Vec::new();
            }
        };

        let from = chars.advance_to(scanned.span.start);
        let to = chars.advance_to(scanned.span.end);
        let gap_start = scanned.next_pos();
        current.push(ImageReference::from_scanned(scanned, from, to));

        pos = skip_whitespace(bytes, gap_start);
        if pos == bytes.len() {
            break;
        }
        if bytes[gap_start..pos].contains(&b'\n') {
            rows.extend(Row::new(std::mem::take(&mut current)));
        }
    }
    rows.extend(Row::new(current));

    tracing::trace!(
        target: "weaver::gallery",
        rows = rows.len(),
        "parsed gallery paragraph"
    );
    rows
}

/// Simple hash function for source text comparison.
///
/// Used to quickly detect if paragraph content has changed.
pub fn hash_source(text: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    text.hash(&mut hasher);
    hasher.finish()
}

/// Monotonic byte-to-char offset converter.
struct CharCursor<'a> {
    text: &'a str,
    byte: usize,
    char: usize,
}

impl<'a> CharCursor<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            text,
            byte: 0,
            char: 0,
        }
    }

    /// `byte` must be a char boundary at or after the last position.
    fn advance_to(&mut self, byte: usize) -> usize {
        self.char += self.text[self.byte..byte].chars().count();
        self.byte = byte;
        self.char
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn urls(rows: &[Row]) -> Vec<Vec<&str>> {
        rows.iter()
            .map(|row| row.iter().map(|img| img.source_url.as_str()).collect())
            .collect()
    }

    #[test]
    fn test_hash_source() {
        let h1 = hash_source("hello world");
        let h2 = hash_source("hello world");
        let h3 = hash_source("hello world!");

        assert_eq!(h1, h2);
        assert_ne!(h1, h3);
    }

    #[test]
    fn test_single_row_exact_bounds() {
        let parts = [
            "![a](http://x/a.png)",
            "![b](https://x/b.png \"B\")",
            "![c](<http://x/c c.png>)",
        ];
        let text = parts.join(" ");
        let rows = parse_paragraph(&text);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].len(), 3);
        for (img, part) in rows[0].iter().zip(parts) {
            assert_eq!(&text[img.relative_from..img.relative_to], part);
        }
    }

    #[test]
    fn test_newline_breaks_rows() {
        let rows = parse_paragraph("![a](http://x/a.png)\n![b](http://x/b.png)");
        assert_eq!(urls(&rows), vec![vec!["http://x/a.png"], vec!["http://x/b.png"]]);
    }

    #[test]
    fn test_rows_with_mixed_separators() {
        let text = "![a](http://x/a.png) ![b](http://x/b.png)  \n  ![c](http://x/c.png)\t![d](http://x/d.png)";
        let rows = parse_paragraph(text);
        assert_eq!(
            urls(&rows),
            vec![
                vec!["http://x/a.png", "http://x/b.png"],
                vec!["http://x/c.png", "http://x/d.png"]
            ]
        );
    }

    #[test]
    fn test_adjacent_images_share_row() {
        let rows = parse_paragraph("![a](http://x/a.png)![b](http://x/b.png)");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].len(), 2);
        assert_eq!(rows[0].images()[1].relative_from, 20);
    }

    #[test]
    fn test_trailing_text_voids_paragraph() {
        assert!(parse_paragraph("![a](http://x/a.png) extra").is_empty());
        assert!(parse_paragraph("![a](http://x/a.png)\n").len() == 1);
    }

    #[test]
    fn test_leading_text_voids_paragraph() {
        assert!(parse_paragraph("see ![a](http://x/a.png)").is_empty());
    }

    #[test]
    fn test_bad_scheme_voids_paragraph() {
        assert!(parse_paragraph("![a](http://x/a.png) ![b](ftp://x/b.png)").is_empty());
        assert!(parse_paragraph("![a](/local.png)\n![b](http://x/b.png)").is_empty());
    }

    #[test]
    fn test_blank_paragraph() {
        assert!(parse_paragraph("").is_empty());
        assert!(parse_paragraph(" \n\t ").is_empty());
    }

    #[test]
    fn test_offsets_are_chars() {
        let text = "![ünï](http://x/a.png) ![b](http://x/b.png)";
        let rows = parse_paragraph(text);
        let second = &rows[0].images()[1];
        // "![ünï](http://x/a.png) " is 23 chars but 25 bytes.
        assert_eq!(second.relative_from, 23);
        assert_eq!(second.relative_to, 43);
        assert_eq!(rows[0].images()[0].alt_text, "ünï");
    }

    #[test]
    fn test_local_handles_need_policy() {
        let text = "![shot.png](<blob:weaver/1>)";
        assert!(parse_paragraph(text).is_empty());
        let rows = parse_paragraph_with(text, &SchemePolicy::with_local_handles("blob:"));
        assert_eq!(urls(&rows), vec![vec!["blob:weaver/1"]]);
    }
}
