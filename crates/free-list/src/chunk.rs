use core::{fmt, ops::Range};

use derive_more::Display;
use mark_bitmap::HeapWord;

/// Handle of a chunk linked into a [`FreeList`](crate::FreeList).
///
/// A `NodeId` stays valid while its chunk is linked. Once the chunk is
/// consumed or unlinked, the id may be reused for a later chunk.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[display("#{_0}")]
pub struct NodeId(pub(crate) usize);

impl NodeId {
    /// Returns the arena slot index of this node.
    #[must_use]
    pub fn index(self) -> usize {
        self.0
    }
}

/// A contiguous span of free heap words.
///
/// The start address is the identity of a chunk and never changes. The size
/// is mutable because slicing shrinks a donor chunk in place.
///
/// Inside a [`FreeList`](crate::FreeList) the successor of a chunk is kept by
/// the list (see [`FreeList::next`](crate::FreeList::next)); a `FreeChunk`
/// handed out by an allocation is detached and owned by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FreeChunk {
    start: HeapWord,
    size: usize,
}

impl FreeChunk {
    /// Creates a chunk covering `size` words from `start`.
    ///
    /// # Panics
    ///
    /// Panics if `size` is zero or the chunk end overflows the address space.
    #[must_use]
    #[track_caller]
    pub fn new(start: HeapWord, size: usize) -> Self {
        assert!(size > 0, "free chunk at {start} must not be empty");
        assert!(
            start.checked_add(size).is_some(),
            "free chunk at {start} with {size} words overflows the address space"
        );
        Self { start, size }
    }

    #[must_use]
    pub fn start(&self) -> HeapWord {
        self.start
    }

    /// Size of the chunk in words.
    #[must_use]
    pub fn size(&self) -> usize {
        self.size
    }

    /// Resizes the chunk, keeping its start address.
    ///
    /// # Panics
    ///
    /// Panics if `size` is zero.
    #[track_caller]
    pub fn set_size(&mut self, size: usize) {
        assert!(size > 0, "free chunk at {} must not be empty", self.start);
        self.size = size;
    }

    /// Returns the address one past the last word of the chunk.
    #[must_use]
    pub fn end(&self) -> HeapWord {
        self.start + self.size
    }

    /// Returns the address of the last word of the chunk.
    #[must_use]
    pub fn last_word(&self) -> HeapWord {
        self.start + (self.size - 1)
    }

    #[must_use]
    pub fn range(&self) -> Range<HeapWord> {
        self.start..self.end()
    }

    #[must_use]
    pub fn contains(&self, addr: HeapWord) -> bool {
        self.range().contains(&addr)
    }

    #[must_use]
    pub fn overlaps(&self, other: &Self) -> bool {
        self.start < other.end() && other.start < self.end()
    }
}

impl fmt::Display for FreeChunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}) ({} words)", self.start, self.end(), self.size)
    }
}
