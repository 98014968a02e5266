//! Recognizer for a single markdown image construct.
//!
//! ```text
//! ![alt [nested]](https://host/a.png "title")
//! ```
//!
//! Every function takes the scan position explicitly and hands back the
//! position just past what it consumed, so scanning is reentrant and the
//! caller owns the cursor. Positions are UTF-8 byte offsets into the
//! caller's text; every delimiter in the grammar is ASCII.

use std::ops::Range;

use smol_str::SmolStr;
use url::Url;

use crate::error::ScanError;

/// One recognized image construct.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedImage {
    /// Byte range from `!` to just past `)`.
    pub span: Range<usize>,
    /// Raw alt text between the outer brackets (escapes kept).
    pub alt_text: String,
    /// Link destination, without angle brackets.
    pub href: String,
    /// Title without its outer quotes.
    pub title: Option<String>,
}

impl ScannedImage {
    /// Position to resume scanning from.
    pub fn next_pos(&self) -> usize {
        self.span.end
    }
}

/// Which link destinations may be previewed.
///
/// Absolute `http`/`https` urls are always allowed. Local resource handles
/// (upload previews) are allowed only when a prefix is configured.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchemePolicy {
    local_handle_prefix: Option<SmolStr>,
}

impl SchemePolicy {
    /// Only absolute web urls.
    pub fn web_only() -> Self {
        Self::default()
    }

    /// Web urls plus hrefs starting with `prefix` (e.g. `blob:`).
    pub fn with_local_handles(prefix: impl Into<SmolStr>) -> Self {
        Self {
            local_handle_prefix: Some(prefix.into()),
        }
    }

    pub fn allows(&self, href: &str) -> bool {
        if let Some(prefix) = &self.local_handle_prefix {
            if !prefix.is_empty() && href.starts_with(prefix.as_str()) {
                return true;
            }
        }
        is_web_url(href)
    }
}

/// Check that `href` is an absolute `http` or `https` url with a host.
///
/// The raw text must already spell `http://` or `https://`; `Url::parse`
/// alone would accept forms like `https:host/a.png` after normalizing.
pub fn is_web_url(href: &str) -> bool {
    let has_prefix = ["http://", "https://"].iter().any(|prefix| {
        href.get(..prefix.len())
            .is_some_and(|head| head.eq_ignore_ascii_case(prefix))
    });
    if !has_prefix {
        return false;
    }
    match Url::parse(href) {
        Ok(url) => matches!(url.scheme(), "http" | "https") && url.has_host(),
        Err(_) => false,
    }
}

/// Scan one image construct at `pos` with the default web-only policy.
pub fn scan_one(text: &str, pos: usize) -> Result<ScannedImage, ScanError> {
    scan_one_with(text, pos, &SchemePolicy::web_only())
}

/// Scan one image construct at `pos`.
pub fn scan_one_with(
    text: &str,
    pos: usize,
    policy: &SchemePolicy,
) -> Result<ScannedImage, ScanError> {
    let bytes = text.as_bytes();

    if !text.get(pos..).is_some_and(|rest| rest.starts_with("![")) {
        return Err(ScanError::NotAnImage { pos });
    }

    let (alt_range, after_alt) = parse_link_text(text, pos + 2)?;
    if bytes.get(after_alt) != Some(&b'(') {
        return Err(ScanError::MissingDestination { pos: after_alt });
    }

    let (href, after_href) = parse_link_href(text, after_alt + 1)?;
    if !policy.allows(&href) {
        return Err(ScanError::DisallowedScheme { href });
    }

    let (title, after_title) = match parse_link_title(text, after_href)? {
        Some((title, end)) => (Some(title), end),
        None => (None, after_href),
    };

    let close = skip_whitespace(bytes, after_title);
    if bytes.get(close) != Some(&b')') {
        return Err(ScanError::Unclosed { pos: close });
    }

    Ok(ScannedImage {
        span: pos..close + 1,
        alt_text: text[alt_range].to_string(),
        href,
        title,
    })
}

/// Find the `]` matching an already-consumed `[`.
///
/// `start` is the byte just after the opening bracket. A backslash escapes
/// the byte after it, so `\\]` closes while `\]` does not. Returns the alt
/// text range and the position just past the closing bracket.
pub fn parse_link_text(text: &str, start: usize) -> Result<(Range<usize>, usize), ScanError> {
    let bytes = text.as_bytes();
    let mut depth = 1usize;
    let mut i = start;

    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b'[' => {
                depth += 1;
                i += 1;
            }
            b']' => {
                depth -= 1;
                if depth == 0 {
                    return Ok((start..i, i + 1));
                }
                i += 1;
            }
            _ => i += 1,
        }
    }

    Err(ScanError::UnbalancedAltText { pos: start })
}

/// Read a link destination starting just after `(`.
///
/// `<...>` may contain spaces but no `<`, newline, backslash or NUL. The
/// bare form is a run of non-space bytes ending at whitespace or `)`.
pub fn parse_link_href(text: &str, pos: usize) -> Result<(String, usize), ScanError> {
    let bytes = text.as_bytes();

    if bytes.get(pos) == Some(&b'<') {
        let mut i = pos + 1;
        while i < bytes.len() {
            match bytes[i] {
                b'>' => return Ok((text[pos + 1..i].to_string(), i + 1)),
                b'<' | b'\n' | b'\\' | 0 => break,
                _ => i += 1,
            }
        }
        return Err(ScanError::MalformedHref { pos });
    }

    let mut i = pos;
    while i < bytes.len() && !bytes[i].is_ascii_whitespace() && bytes[i] != b')' {
        i += 1;
    }
    if i == pos {
        return Err(ScanError::MalformedHref { pos });
    }
    Ok((text[pos..i].to_string(), i))
}

/// Read an optional quoted title after the destination.
///
/// Requires at least one whitespace byte before the quote. Returns `None`
/// when there is no title; the outer quotes are stripped and the content is
/// returned verbatim. An escaped quote only stays escaped if a later
/// unescaped quote closes the title; otherwise the last escaped quote is
/// taken as the terminator.
pub fn parse_link_title(text: &str, pos: usize) -> Result<Option<(String, usize)>, ScanError> {
    let bytes = text.as_bytes();
    let open = skip_whitespace(bytes, pos);
    if open == pos {
        return Ok(None);
    }
    let quote = match bytes.get(open) {
        Some(&q @ (b'"' | b'\'')) => q,
        _ => return Ok(None),
    };

    let content_start = open + 1;
    let mut last_escaped_quote = None;
    let mut i = content_start;
    while i < bytes.len() {
        if bytes[i] == b'\\' && bytes.get(i + 1) == Some(&quote) {
            last_escaped_quote = Some(i + 1);
            i += 2;
        } else if bytes[i] == quote {
            return Ok(Some((text[content_start..i].to_string(), i + 1)));
        } else {
            i += 1;
        }
    }

    match last_escaped_quote {
        Some(q) => Ok(Some((text[content_start..q].to_string(), q + 1))),
        None => Err(ScanError::MalformedTitle { pos: open }),
    }
}

/// Advance past ASCII whitespace (including newlines).
pub fn skip_whitespace(bytes: &[u8], mut pos: usize) -> usize {
    while pos < bytes.len() && bytes[pos].is_ascii_whitespace() {
        pos += 1;
    }
    pos
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scan_basic() {
        let text = "![cat](https://example.com/cat.png)";
        let img = scan_one(text, 0).unwrap();
        assert_eq!(img.span, 0..text.len());
        assert_eq!(img.alt_text, "cat");
        assert_eq!(img.href, "https://example.com/cat.png");
        assert_eq!(img.title, None);
        assert_eq!(img.next_pos(), text.len());
    }

    #[test]
    fn test_scan_at_offset() {
        let text = "  ![a](http://x/a.png) tail";
        let img = scan_one(text, 2).unwrap();
        assert_eq!(img.span, 2..22);
        assert_eq!(&text[img.span.clone()], "![a](http://x/a.png)");
    }

    #[test]
    fn test_nested_brackets_in_alt() {
        let img = scan_one("![a[b]c](http://x/i.png)", 0).unwrap();
        assert_eq!(img.alt_text, "a[b]c");
    }

    #[test]
    fn test_escaped_bracket_does_not_close() {
        let img = scan_one(r"![a\]b](http://x/i.png)", 0).unwrap();
        assert_eq!(img.alt_text, r"a\]b");
    }

    #[test]
    fn test_even_backslashes_do_not_escape() {
        // `\\` is an escaped backslash, the following `]` closes the alt text.
        let img = scan_one(r"![a\\](http://x/i.png)", 0).unwrap();
        assert_eq!(img.alt_text, r"a\\");
    }

    #[test]
    fn test_unbalanced_alt_text() {
        assert_eq!(
            scan_one("![a[b](http://x/i.png)", 0),
            Err(ScanError::UnbalancedAltText { pos: 2 })
        );
    }

    #[test]
    fn test_missing_paren() {
        assert_eq!(
            scan_one("![a] (http://x/i.png)", 0),
            Err(ScanError::MissingDestination { pos: 4 })
        );
    }

    #[test]
    fn test_not_an_image() {
        assert_eq!(
            scan_one("[a](http://x/i.png)", 0),
            Err(ScanError::NotAnImage { pos: 0 })
        );
        // Mid-codepoint positions are never a match.
        assert!(scan_one("é![a](http://x/i.png)", 1).is_err());
    }

    #[test]
    fn test_angle_href() {
        let img = scan_one("![a](<https://x/a b.png>)", 0).unwrap();
        assert_eq!(img.href, "https://x/a b.png");
    }

    #[test]
    fn test_angle_href_rejects_newline() {
        assert_eq!(
            scan_one("![a](<https://x/\na.png>)", 0),
            Err(ScanError::MalformedHref { pos: 5 })
        );
    }

    #[test]
    fn test_empty_href() {
        assert_eq!(
            scan_one("![a]()", 0),
            Err(ScanError::MalformedHref { pos: 5 })
        );
    }

    #[test]
    fn test_disallowed_schemes() {
        for href in [
            "ftp://x/a.png",
            "/local.png",
            "a.png",
            "mailto:me@x",
            "blob:abc",
            "https:example.com/a.png",
            "http:/x/a.png",
            r"http:\\x\a.png",
            "<  https://x/a.png>",
        ] {
            let text = format!("![a]({href})");
            assert!(
                matches!(scan_one(&text, 0), Err(ScanError::DisallowedScheme { .. })),
                "{href} should be rejected"
            );
        }
    }

    #[test]
    fn test_web_url_prefix_is_case_insensitive() {
        assert!(is_web_url("HTTPS://x/a.png"));
        assert!(is_web_url("http://x/a.png"));
        assert!(!is_web_url("https:x/a.png"));
        assert!(!is_web_url(" https://x/a.png"));
    }

    #[test]
    fn test_local_handle_policy() {
        let policy = SchemePolicy::with_local_handles("blob:");
        let img = scan_one_with("![a](<blob:abc-123>)", 0, &policy).unwrap();
        assert_eq!(img.href, "blob:abc-123");
        assert!(scan_one_with("![a](ftp://x/a.png)", 0, &policy).is_err());
    }

    #[test]
    fn test_titles_strip_outer_quotes() {
        let img = scan_one(r#"![a](http://x/a.png "say \"hi\"")"#, 0).unwrap();
        assert_eq!(img.title.as_deref(), Some(r#"say \"hi\""#));

        let img = scan_one(r"![a](http://x/a.png 'it\'s')", 0).unwrap();
        assert_eq!(img.title.as_deref(), Some(r"it\'s"));
    }

    #[test]
    fn test_title_trailing_backslash_quote() {
        // No later quote, so the escaped quote terminates the title.
        let img = scan_one(r#"![a](http://x/a.png "a\")"#, 0).unwrap();
        assert_eq!(img.title.as_deref(), Some(r"a\"));
    }

    #[test]
    fn test_unterminated_title() {
        assert!(matches!(
            scan_one(r#"![a](http://x/a.png "oops)"#, 0),
            Err(ScanError::MalformedTitle { .. })
        ));
    }

    #[test]
    fn test_whitespace_before_close() {
        let img = scan_one("![a](http://x/a.png   )", 0).unwrap();
        assert_eq!(img.span.end, 23);
    }

    #[test]
    fn test_junk_before_close() {
        assert!(matches!(
            scan_one("![a](http://x/a.png junk)", 0),
            Err(ScanError::Unclosed { .. })
        ));
    }
}
