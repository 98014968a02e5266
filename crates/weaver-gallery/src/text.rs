//! Text buffer abstraction for gallery edits.
//!
//! The `TextBuffer` trait is the slice of the host editor's buffer that
//! placeholder insertion, event handling and re-parsing need. `EditorRope`
//! is a ropey-backed implementation that also records the change set of its
//! last edit for the position remapper.

use smol_str::{SmolStr, ToSmolStr};
use std::ops::Range;

use crate::remap::{Change, ChangeSet};

/// A text buffer that supports editing and slicing.
///
/// All offsets are in Unicode scalar values (chars), not bytes or UTF-16.
pub trait TextBuffer {
    /// Total length in chars (Unicode scalar values).
    fn len_chars(&self) -> usize;

    /// Check if empty.
    fn is_empty(&self) -> bool {
        self.len_chars() == 0
    }

    /// Insert text at char offset.
    fn insert(&mut self, char_offset: usize, text: &str);

    /// Delete char range.
    fn delete(&mut self, char_range: Range<usize>);

    /// Replace char range with text.
    fn replace(&mut self, char_range: Range<usize>, text: &str) {
        self.delete(char_range.clone());
        self.insert(char_range.start, text);
    }

    /// Get a slice as SmolStr. Returns None if range is invalid.
    fn slice(&self, char_range: Range<usize>) -> Option<SmolStr>;

    /// Get character at offset. Returns None if out of bounds.
    fn char_at(&self, char_offset: usize) -> Option<char>;

    /// Convert entire buffer to String.
    fn to_string(&self) -> String;

    /// Char range of the first exact occurrence of `needle`.
    fn find(&self, needle: &str) -> Option<Range<usize>> {
        if needle.is_empty() {
            return None;
        }
        let text = self.to_string();
        let byte = text.find(needle)?;
        let start = text[..byte].chars().count();
        Some(start..start + needle.chars().count())
    }

    /// Change set of the most recent edit, if any.
    fn last_change(&self) -> Option<ChangeSet>;
}

/// Ropey-backed text buffer.
#[derive(Clone, Default)]
pub struct EditorRope {
    rope: ropey::Rope,
    last_change: Option<ChangeSet>,
}

impl EditorRope {
    /// Create a new empty rope.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create from string.
    pub fn from_str(s: &str) -> Self {
        Self {
            rope: ropey::Rope::from_str(s),
            last_change: None,
        }
    }

    /// Get a reference to the underlying rope.
    pub fn rope(&self) -> &ropey::Rope {
        &self.rope
    }
}

impl TextBuffer for EditorRope {
    fn len_chars(&self) -> usize {
        self.rope.len_chars()
    }

    fn insert(&mut self, char_offset: usize, text: &str) {
        self.rope.insert(char_offset, text);
        self.last_change = Some(ChangeSet::single(Change::insert(
            char_offset,
            text.chars().count(),
        )));
    }

    fn delete(&mut self, char_range: Range<usize>) {
        self.rope.remove(char_range.clone());
        self.last_change = Some(ChangeSet::single(Change::delete(char_range)));
    }

    // One change record instead of a delete followed by an insert.
    fn replace(&mut self, char_range: Range<usize>, text: &str) {
        self.rope.remove(char_range.clone());
        self.rope.insert(char_range.start, text);
        self.last_change = Some(ChangeSet::single(Change::new(
            char_range.start,
            char_range.end,
            text.chars().count(),
        )));
    }

    fn slice(&self, char_range: Range<usize>) -> Option<SmolStr> {
        if char_range.start > char_range.end || char_range.end > self.len_chars() {
            return None;
        }
        Some(self.rope.slice(char_range).to_smolstr())
    }

    fn char_at(&self, char_offset: usize) -> Option<char> {
        if char_offset >= self.len_chars() {
            return None;
        }
        Some(self.rope.char(char_offset))
    }

    fn to_string(&self) -> String {
        self.rope.to_string()
    }

    fn find(&self, needle: &str) -> Option<Range<usize>> {
        if needle.is_empty() {
            return None;
        }
        let text = self.rope.to_string();
        let byte = text.find(needle)?;
        let start = self.rope.byte_to_char(byte);
        Some(start..start + needle.chars().count())
    }

    fn last_change(&self) -> Option<ChangeSet> {
        self.last_change.clone()
    }
}

impl From<&str> for EditorRope {
    fn from(s: &str) -> Self {
        Self::from_str(s)
    }
}

impl From<String> for EditorRope {
    fn from(s: String) -> Self {
        Self::from_str(&s)
    }
}

/// Char range of the line containing `offset`, excluding its line break.
pub fn line_bounds<T: TextBuffer + ?Sized>(doc: &T, offset: usize) -> Range<usize> {
    let len = doc.len_chars();
    let offset = offset.min(len);

    let mut start = offset;
    while start > 0 {
        if let Some('\n') = doc.char_at(start - 1) {
            break;
        }
        start -= 1;
    }

    let mut end = offset;
    while end < len {
        if let Some('\n') = doc.char_at(end) {
            break;
        }
        end += 1;
    }

    start..end
}

/// Check whether a line contains only whitespace.
pub fn is_blank_line<T: TextBuffer + ?Sized>(doc: &T, line: Range<usize>) -> bool {
    doc.slice(line)
        .map(|s| s.trim().is_empty())
        .unwrap_or(true)
}
