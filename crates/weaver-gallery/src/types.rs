//! Position and selection types shared by the remapper and event handlers.

use std::ops::Range;

/// Which side of an edit a position sticks to when text is inserted
/// exactly at it.
///
/// `Before` keeps the position ahead of the inserted text; `After` moves it
/// past the insertion.
#[derive(Clone, Debug, Copy, PartialEq, Eq, Default)]
pub enum Affinity {
    #[default]
    Before,
    After,
}

/// Selection resulting from a gallery event: `anchor` stays put, `head`
/// carries the cursor.
#[derive(Clone, Debug, Copy, PartialEq, Eq)]
pub struct Selection {
    pub anchor: usize,
    pub head: usize,
}

impl Selection {
    pub fn new(anchor: usize, head: usize) -> Self {
        Self { anchor, head }
    }

    /// Cursor at `offset`.
    pub fn collapsed(offset: usize) -> Self {
        Self::new(offset, offset)
    }

    /// Ordered bounds.
    pub fn to_range(&self) -> Range<usize> {
        self.anchor.min(self.head)..self.anchor.max(self.head)
    }

    /// Clamp both ends to a document of `len` chars.
    pub fn clamp(self, len: usize) -> Self {
        Self::new(self.anchor.min(len), self.head.min(len))
    }
}

impl From<Range<usize>> for Selection {
    fn from(r: Range<usize>) -> Self {
        Self::new(r.start, r.end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_range_orders_bounds() {
        assert_eq!(Selection::new(5, 10).to_range(), 5..10);
        assert_eq!(Selection::new(10, 5).to_range(), 5..10);
        assert_eq!(Selection::collapsed(7).to_range(), 7..7);
    }

    #[test]
    fn test_selection_clamp() {
        let sel = Selection::new(12, 40).clamp(20);
        assert_eq!(sel.to_range(), 12..20);
        assert_eq!(Selection::from(3..8).clamp(100), Selection::new(3, 8));
        assert_eq!(Selection::from(30..50).clamp(20), Selection::collapsed(20));
    }
}
