use alloc::vec::Vec;
use core::{fmt, iter::FusedIterator, ops::Range};

use log::{debug, trace};
use mark_bitmap::{BoundaryMarker, HeapWord};

use crate::{
    chunk::{FreeChunk, NodeId},
    config::{ConfigError, FreeListConfig},
};

/// Counters of what a [`FreeList`] has done since it was created.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FreeListStats {
    /// Chunks linked by [`FreeList::append`] and the helpers built on it.
    pub appends: usize,
    /// Allocations carved out of a larger chunk.
    pub splits: usize,
    /// Allocations that consumed a whole chunk.
    pub exact_fits: usize,
    /// First-fit searches that found nothing.
    pub misses: usize,
    /// Chunks unlinked by [`FreeList::remove_next`].
    pub removals: usize,
}

#[derive(Debug)]
struct Node {
    chunk: FreeChunk,
    next: Option<NodeId>,
}

/// Insertion-ordered free list over a heap word range, with boundary tags.
///
/// Chunks are kept in a singly linked chain whose nodes live in an arena
/// owned by the list; links are [`NodeId`]s. While a chunk is linked, its
/// first and last words are marked in the injected [`BoundaryMarker`], and
/// the list clears both marks when the chunk leaves. Adjacent chunks are
/// never merged here; that is the job of a sweep over the boundary tags.
///
/// All mutating operations take `&mut self`. Wrap the list in a
/// [`LockedFreeList`](crate::LockedFreeList) to share it between threads.
///
/// # Examples
///
/// ```
/// use free_list::{FreeChunk, FreeList};
/// use mark_bitmap::{HeapWord, MarkBitmap};
///
/// let bitmap = MarkBitmap::with_words(HeapWord::new(0), 64).unwrap();
/// let mut list = FreeList::with_alignment(&bitmap, 2).unwrap();
///
/// list.append(FreeChunk::new(HeapWord::new(0), 10));
/// let chunk = list.get_first_fit(3).unwrap();
///
/// // The request is rounded up to 4 words and carved from the high end.
/// assert_eq!(chunk, FreeChunk::new(HeapWord::new(6), 4));
/// assert_eq!(list.free_words(), 6);
/// assert!(bitmap.is_marked(HeapWord::new(5)));
/// assert!(!bitmap.is_marked(HeapWord::new(9)));
/// ```
pub struct FreeList<M> {
    marker: M,
    alignment: usize,
    nodes: Vec<Option<Node>>,
    vacant: Vec<NodeId>,
    head: Option<NodeId>,
    tail: Option<NodeId>,
    len: usize,
    stats: FreeListStats,
}

impl<M> FreeList<M> {
    /// Creates an empty list that tags chunk boundaries through `marker`.
    pub fn new(marker: M, config: FreeListConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            marker,
            alignment: config.chunk_size_alignment,
            nodes: Vec::new(),
            vacant: Vec::new(),
            head: None,
            tail: None,
            len: 0,
            stats: FreeListStats::default(),
        })
    }

    /// Creates an empty list whose chunk sizes are multiples of `alignment`.
    pub fn with_alignment(marker: M, alignment: usize) -> Result<Self, ConfigError> {
        Self::new(marker, FreeListConfig::new(alignment))
    }

    /// Returns the chunk size alignment in words.
    #[must_use]
    pub fn alignment(&self) -> usize {
        self.alignment
    }

    #[must_use]
    pub fn marker(&self) -> &M {
        &self.marker
    }

    /// Returns the number of linked chunks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    #[must_use]
    pub fn head(&self) -> Option<NodeId> {
        self.head
    }

    #[must_use]
    pub fn tail(&self) -> Option<NodeId> {
        self.tail
    }

    #[must_use]
    pub fn stats(&self) -> &FreeListStats {
        &self.stats
    }

    /// Returns the chunk linked as `node`.
    ///
    /// # Panics
    ///
    /// Panics if `node` is not linked.
    #[must_use]
    #[track_caller]
    pub fn chunk(&self, node: NodeId) -> &FreeChunk {
        &self.node(node).chunk
    }

    /// Returns the successor of `node` in the list.
    ///
    /// # Panics
    ///
    /// Panics if `node` is not linked.
    #[must_use]
    #[track_caller]
    pub fn next(&self, node: NodeId) -> Option<NodeId> {
        self.node(node).next
    }

    /// Rounds `size` up to the next multiple of the chunk size alignment.
    ///
    /// # Panics
    ///
    /// Panics if the rounded size overflows.
    #[must_use]
    pub fn adjust_chunk_size(&self, size: usize) -> usize {
        size.next_multiple_of(self.alignment)
    }

    /// Like [`adjust_chunk_size`](Self::adjust_chunk_size), but returns
    /// `None` if the rounded size overflows.
    #[must_use]
    pub fn checked_adjust_chunk_size(&self, size: usize) -> Option<usize> {
        size.checked_next_multiple_of(self.alignment)
    }

    /// Returns an iterator over the linked chunks in list order.
    #[must_use]
    pub fn iter(&self) -> Iter<'_, M> {
        Iter {
            list: self,
            next: self.head,
        }
    }

    /// Total number of free words in the list.
    #[must_use]
    pub fn free_words(&self) -> usize {
        self.iter().map(FreeChunk::size).sum()
    }

    /// Size of the largest linked chunk, or zero if the list is empty.
    ///
    /// This is the largest request [`get_first_fit`](Self::get_first_fit)
    /// can currently satisfy.
    #[must_use]
    pub fn largest_chunk(&self) -> usize {
        self.iter().map(FreeChunk::size).max().unwrap_or(0)
    }

    /// Returns `true` if `addr` lies inside a linked chunk.
    #[must_use]
    pub fn contains_free_word(&self, addr: HeapWord) -> bool {
        self.iter().any(|chunk| chunk.contains(addr))
    }

    #[track_caller]
    fn node(&self, node: NodeId) -> &Node {
        self.nodes
            .get(node.0)
            .and_then(Option::as_ref)
            .unwrap_or_else(|| panic!("free list node {node} is not linked"))
    }

    #[track_caller]
    fn node_mut(&mut self, node: NodeId) -> &mut Node {
        self.nodes
            .get_mut(node.0)
            .and_then(Option::as_mut)
            .unwrap_or_else(|| panic!("free list node {node} is not linked"))
    }

    fn insert_node(&mut self, chunk: FreeChunk) -> NodeId {
        let node = Node { chunk, next: None };
        if let Some(id) = self.vacant.pop() {
            self.nodes[id.0] = Some(node);
            return id;
        }
        self.nodes.push(Some(node));
        NodeId(self.nodes.len() - 1)
    }

    #[track_caller]
    fn take_node(&mut self, node: NodeId) -> Node {
        let taken = self
            .nodes
            .get_mut(node.0)
            .and_then(Option::take)
            .unwrap_or_else(|| panic!("free list node {node} is not linked"));
        self.vacant.push(node);
        taken
    }

    fn is_predecessor(&self, prev: Option<NodeId>, node: NodeId) -> bool {
        match prev {
            None => self.head == Some(node),
            Some(prev) => self.next(prev) == Some(node),
        }
    }
}

impl<M> FreeList<M>
where
    M: BoundaryMarker,
{
    /// Sets the boundary tags of `node`: its first and its last word.
    ///
    /// The list keeps the tags of linked chunks up to date by itself; this
    /// is exposed for passes that rebuild the tags from scratch.
    #[track_caller]
    pub fn mark(&self, node: NodeId) {
        let chunk = self.chunk(node);
        self.marker.mark(chunk.start());
        self.marker.mark(chunk.last_word());
    }

    /// Clears the boundary tags of `node`.
    #[track_caller]
    pub fn unmark(&self, node: NodeId) {
        let chunk = self.chunk(node);
        self.marker.clear(chunk.start());
        self.marker.clear(chunk.last_word());
    }

    /// Returns `true` if both boundary tags of `chunk` are set.
    #[must_use]
    pub fn is_tagged(&self, chunk: &FreeChunk) -> bool {
        self.marker.is_marked(chunk.start()) && self.marker.is_marked(chunk.last_word())
    }

    /// Links `chunk` at the tail of the list and tags its boundaries.
    ///
    /// The chunk is not merged with its neighbors.
    ///
    /// # Panics
    ///
    /// Panics if the size of `chunk` is not a multiple of the chunk size
    /// alignment.
    #[track_caller]
    pub fn append(&mut self, chunk: FreeChunk) -> NodeId {
        assert_eq!(
            chunk.size() % self.alignment,
            0,
            "size of {chunk} is not a multiple of the chunk size alignment {}",
            self.alignment
        );

        let id = self.insert_node(chunk);
        match self.tail {
            None => {
                assert!(self.head.is_none(), "free list has a head but no tail");
                self.head = Some(id);
            }
            Some(tail) => self.node_mut(tail).next = Some(id),
        }
        self.tail = Some(id);
        self.len += 1;
        self.mark(id);
        self.stats.appends += 1;

        trace!("free list: appended {chunk} as {id}");
        id
    }

    /// Returns an allocated chunk to the list.
    ///
    /// Same as [`append`](Self::append); in debug builds it also checks that
    /// the chunk does not overlap a chunk that is already free.
    #[track_caller]
    pub fn release(&mut self, chunk: FreeChunk) -> NodeId {
        debug_assert!(
            !self.iter().any(|free| free.overlaps(&chunk)),
            "released chunk {chunk} overlaps a free chunk"
        );
        self.append(chunk)
    }

    /// Links the aligned prefix of a span discovered by a sweep.
    ///
    /// The span is rounded down to the chunk size alignment. A span shorter
    /// than one alignment unit is not linked and `None` is returned.
    #[track_caller]
    pub fn add_span(&mut self, start: HeapWord, words: usize) -> Option<NodeId> {
        let aligned = words - words % self.alignment;
        if aligned == 0 {
            debug!("free list: dropped {words}-word span at {start}");
            return None;
        }
        if aligned < words {
            debug!(
                "free list: dropped {}-word tail of span at {start}",
                words - aligned
            );
        }
        Some(self.append(FreeChunk::new(start, aligned)))
    }

    /// Unlinks `node`, whose predecessor is `prev` (`None` if `node` is the
    /// head), clears its boundary tags and returns its chunk.
    ///
    /// # Panics
    ///
    /// Panics if `node` is not tagged in the marker, or if `prev` is not its
    /// predecessor.
    #[track_caller]
    pub fn remove_next(&mut self, node: NodeId, prev: Option<NodeId>) -> FreeChunk {
        let chunk = *self.chunk(node);
        assert!(
            self.is_tagged(&chunk),
            "free list node {node} {chunk} is not tagged"
        );
        assert!(
            self.is_predecessor(prev, node),
            "free list node {prev:?} is not the predecessor of {node}"
        );

        self.unmark(node);
        let Node { next, .. } = self.take_node(node);
        match prev {
            None => self.head = next,
            Some(prev) => self.node_mut(prev).next = next,
        }
        if self.tail == Some(node) {
            self.tail = prev;
        }
        self.len -= 1;
        self.stats.removals += 1;

        trace!("free list: removed {node} {chunk}");
        chunk
    }

    /// Carves `size` words from the high end of `node`.
    ///
    /// If `node` is larger than `size`, it shrinks in place, keeps its
    /// position in the list, and is re-tagged at its new last word; the
    /// returned chunk covers the words past the remainder. If the sizes are
    /// equal, `node` is unlinked (see [`remove_next`](Self::remove_next))
    /// and its chunk is returned.
    ///
    /// In both cases the returned chunk is detached from the list and none
    /// of its words keep a boundary tag.
    ///
    /// # Panics
    ///
    /// Panics if `size` is zero, not aligned, or larger than the chunk of
    /// `node`.
    #[track_caller]
    pub fn slice_node(&mut self, node: NodeId, size: usize, prev: Option<NodeId>) -> FreeChunk {
        let donor = *self.chunk(node);
        assert!(size > 0, "cannot slice an empty chunk off {donor}");
        assert_eq!(
            size % self.alignment,
            0,
            "slice size {size} is not a multiple of the chunk size alignment {}",
            self.alignment
        );
        assert!(
            size <= donor.size(),
            "cannot slice {size} words off {donor}"
        );
        debug_assert!(self.is_predecessor(prev, node));

        let remainder = donor.size() - size;
        if remainder == 0 {
            self.stats.exact_fits += 1;
            return self.remove_next(node, prev);
        }

        self.marker.clear(donor.last_word());
        let donor = &mut self.node_mut(node).chunk;
        donor.set_size(remainder);
        let donor = *donor;
        self.marker.mark(donor.last_word());
        self.stats.splits += 1;

        let sliced = FreeChunk::new(donor.end(), size);
        trace!("free list: sliced {sliced} off {node}, {donor} remains");
        sliced
    }

    /// Allocates `size` words from the first chunk, in list order, that is
    /// large enough.
    ///
    /// The request is rounded up with
    /// [`adjust_chunk_size`](Self::adjust_chunk_size) first. Returns `None`
    /// if no chunk fits.
    ///
    /// # Panics
    ///
    /// Panics if `size` is zero.
    #[track_caller]
    pub fn get_first_fit(&mut self, size: usize) -> Option<FreeChunk> {
        assert!(size > 0, "requested size must not be zero");
        let Some(size) = self.checked_adjust_chunk_size(size) else {
            return self.miss(size);
        };
        let Some(head) = self.head else {
            return self.miss(size);
        };

        if self.chunk(head).size() >= size {
            return Some(self.slice_node(head, size, None));
        }

        let mut prev = head;
        while let Some(node) = self.next(prev) {
            if self.chunk(node).size() >= size {
                return Some(self.slice_node(node, size, Some(prev)));
            }
            prev = node;
        }

        self.miss(size)
    }

    fn miss(&mut self, size: usize) -> Option<FreeChunk> {
        self.stats.misses += 1;
        debug!(
            "free list: no chunk fits {size} words ({} chunks, largest {} words)",
            self.len,
            self.largest_chunk()
        );
        None
    }

    /// Unlinks every chunk and clears its boundary tags.
    pub fn clear(&mut self) {
        let mut next = self.head;
        while let Some(node) = next {
            self.unmark(node);
            next = self.next(node);
        }
        self.nodes.clear();
        self.vacant.clear();
        self.head = None;
        self.tail = None;
        self.len = 0;
    }

    /// Replaces the contents of the list with the aligned prefix of `range`.
    pub fn reset(&mut self, range: Range<HeapWord>) {
        self.clear();
        if let Some(words) = range.end.checked_sub(range.start) {
            self.add_span(range.start, words);
        }
    }
}

impl<M> fmt::Debug for FreeList<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FreeList")
            .field("alignment", &self.alignment)
            .field("head", &self.head)
            .field("tail", &self.tail)
            .field("chunks", &self.iter().collect::<Vec<_>>())
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

impl<M> fmt::Display for FreeList<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "free list: {} chunks, {} free words, alignment {}",
            self.len,
            self.free_words(),
            self.alignment
        )?;
        let mut next = self.head;
        while let Some(node) = next {
            writeln!(f, "  #{:<3} {}", node.index(), self.chunk(node))?;
            next = self.next(node);
        }
        Ok(())
    }
}

/// Iterator over the chunks of a [`FreeList`], in list order.
pub struct Iter<'a, M> {
    list: &'a FreeList<M>,
    next: Option<NodeId>,
}

impl<'a, M> Iterator for Iter<'a, M> {
    type Item = &'a FreeChunk;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.list.node(self.next?);
        self.next = node.next;
        Some(&node.chunk)
    }
}

impl<M> FusedIterator for Iter<'_, M> {}

impl<'a, M> IntoIterator for &'a FreeList<M> {
    type Item = &'a FreeChunk;
    type IntoIter = Iter<'a, M>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg_attr(coverage_nightly, coverage(off))]
#[cfg(test)]
mod tests {
    use std::{cell::RefCell, collections::BTreeSet};

    use mark_bitmap::MarkBitmap;

    use super::*;

    const HEAP_WORDS: usize = 256;

    fn w(word: usize) -> HeapWord {
        HeapWord::new(word)
    }

    fn chunk(start: usize, size: usize) -> FreeChunk {
        FreeChunk::new(w(start), size)
    }

    fn bitmap() -> MarkBitmap {
        MarkBitmap::with_words(w(0), HEAP_WORDS).unwrap()
    }

    fn with_list<F>(alignment: usize, chunks: &[(usize, usize)], test_fn: F)
    where
        F: FnOnce(&mut FreeList<&MarkBitmap>, &MarkBitmap),
    {
        let bitmap = bitmap();
        let mut list = FreeList::with_alignment(&bitmap, alignment).unwrap();
        for &(start, size) in chunks {
            list.append(chunk(start, size));
        }
        test_fn(&mut list, &bitmap);
        list.verify().unwrap();
    }

    fn contents<M>(list: &FreeList<M>) -> Vec<(usize, usize)> {
        list.iter()
            .map(|c| (c.start().value(), c.size()))
            .collect()
    }

    fn assert_untagged(bitmap: &MarkBitmap, chunk: &FreeChunk) {
        assert!(!bitmap.is_marked(chunk.start()), "{chunk} start is tagged");
        assert!(!bitmap.is_marked(chunk.last_word()), "{chunk} end is tagged");
    }

    #[test]
    fn test_adjust_chunk_size() {
        with_list(4, &[], |list, _| {
            assert_eq!(list.adjust_chunk_size(0), 0);
            assert_eq!(list.adjust_chunk_size(1), 4);
            assert_eq!(list.adjust_chunk_size(4), 4);
            assert_eq!(list.adjust_chunk_size(5), 8);
        });
        with_list(1, &[], |list, _| {
            assert_eq!(list.adjust_chunk_size(7), 7);
        });
    }

    #[test]
    fn test_checked_adjust_chunk_size() {
        with_list(4, &[], |list, _| {
            assert_eq!(list.checked_adjust_chunk_size(5), Some(8));
            assert_eq!(list.checked_adjust_chunk_size(usize::MAX), None);
            assert_eq!(list.checked_adjust_chunk_size(usize::MAX - 2), None);
            // the largest multiple of 4
            assert_eq!(
                list.checked_adjust_chunk_size(usize::MAX - 4),
                Some(usize::MAX - 3)
            );
        });
    }

    #[test]
    fn test_invalid_alignment_is_rejected() {
        let bitmap = bitmap();
        assert!(FreeList::with_alignment(&bitmap, 0).is_err());
        assert!(FreeList::with_alignment(&bitmap, 3).is_err());
    }

    #[test]
    fn test_append_links_and_tags() {
        with_list(2, &[], |list, bitmap| {
            assert!(list.is_empty());
            assert_eq!(list.head(), None);
            assert_eq!(list.tail(), None);

            let a = list.append(chunk(0, 4));
            assert_eq!(list.head(), Some(a));
            assert_eq!(list.tail(), Some(a));

            let b = list.append(chunk(20, 6));
            assert_eq!(list.head(), Some(a));
            assert_eq!(list.tail(), Some(b));
            assert_eq!(list.next(a), Some(b));
            assert_eq!(list.next(b), None);
            assert_eq!(list.len(), 2);

            for word in [0, 3, 20, 25] {
                assert!(bitmap.is_marked(w(word)));
            }
            assert_eq!(bitmap.count_marked(), 4);
        });
    }

    #[test]
    fn test_append_keeps_insertion_order() {
        with_list(2, &[(100, 8), (0, 2), (50, 4)], |list, _| {
            assert_eq!(contents(list), [(100, 8), (0, 2), (50, 4)]);
        });
    }

    #[test]
    #[should_panic = "is not a multiple of the chunk size alignment"]
    fn test_append_misaligned_panics() {
        with_list(4, &[], |list, _| {
            list.append(chunk(0, 6));
        });
    }

    #[test]
    fn test_mark_and_unmark() {
        with_list(2, &[(10, 6)], |list, bitmap| {
            let node = list.head().unwrap();
            list.unmark(node);
            assert_eq!(bitmap.count_marked(), 0);
            list.mark(node);
            assert!(bitmap.is_marked(w(10)));
            assert!(bitmap.is_marked(w(15)));
        });
    }

    #[test]
    fn test_remove_sole_node() {
        with_list(2, &[(0, 4)], |list, bitmap| {
            let node = list.head().unwrap();
            let removed = list.remove_next(node, None);
            assert_eq!(removed, chunk(0, 4));
            assert!(list.is_empty());
            assert_eq!(list.tail(), None);
            assert_untagged(bitmap, &removed);
        });
    }

    #[test]
    fn test_remove_head_with_successor() {
        with_list(2, &[(0, 4), (10, 2), (20, 2)], |list, bitmap| {
            let head = list.head().unwrap();
            let second = list.next(head).unwrap();
            let tail = list.tail().unwrap();

            list.remove_next(head, None);
            assert_eq!(list.head(), Some(second));
            assert_eq!(list.tail(), Some(tail));
            assert_eq!(contents(list), [(10, 2), (20, 2)]);
            assert_untagged(bitmap, &chunk(0, 4));
        });
    }

    #[test]
    fn test_remove_tail() {
        with_list(2, &[(0, 4), (10, 2), (20, 2)], |list, _| {
            let second = list.next(list.head().unwrap()).unwrap();
            let tail = list.tail().unwrap();

            list.remove_next(tail, Some(second));
            assert_eq!(list.tail(), Some(second));
            assert_eq!(list.next(second), None);
            assert_eq!(contents(list), [(0, 4), (10, 2)]);

            // appending after a tail removal links behind the new tail
            list.append(chunk(30, 2));
            assert_eq!(contents(list), [(0, 4), (10, 2), (30, 2)]);
        });
    }

    #[test]
    fn test_remove_middle() {
        with_list(2, &[(0, 4), (10, 2), (20, 2)], |list, _| {
            let head = list.head().unwrap();
            let second = list.next(head).unwrap();

            list.remove_next(second, Some(head));
            assert_eq!(contents(list), [(0, 4), (20, 2)]);
            assert_eq!(list.next(head), list.tail());
        });
    }

    #[test]
    #[should_panic = "is not tagged"]
    fn test_remove_untagged_panics() {
        with_list(2, &[(0, 4)], |list, _| {
            let node = list.head().unwrap();
            list.unmark(node);
            list.remove_next(node, None);
        });
    }

    #[test]
    #[should_panic = "is not the predecessor"]
    fn test_remove_with_wrong_predecessor_panics() {
        with_list(2, &[(0, 4), (10, 2), (20, 2)], |list, _| {
            let tail = list.tail().unwrap();
            list.remove_next(tail, None);
        });
    }

    #[test]
    fn test_slice_with_remainder() {
        with_list(2, &[(0, 10)], |list, bitmap| {
            let node = list.head().unwrap();
            let sliced = list.slice_node(node, 4, None);

            assert_eq!(sliced, chunk(6, 4));
            assert_eq!(list.head(), Some(node));
            assert_eq!(contents(list), [(0, 6)]);
            assert!(bitmap.is_marked(w(0)));
            assert!(bitmap.is_marked(w(5)));
            assert_untagged(bitmap, &sliced);
            assert_eq!(bitmap.count_marked(), 2);
        });
    }

    #[test]
    fn test_slice_exact_removes() {
        with_list(2, &[(0, 4)], |list, bitmap| {
            let node = list.head().unwrap();
            let sliced = list.slice_node(node, 4, None);
            assert_eq!(sliced, chunk(0, 4));
            assert!(list.is_empty());
            assert_eq!(bitmap.count_marked(), 0);
        });
    }

    #[test]
    fn test_slice_to_single_word_remainder() {
        with_list(1, &[(0, 5)], |list, bitmap| {
            let node = list.head().unwrap();
            let sliced = list.slice_node(node, 4, None);
            assert_eq!(sliced, chunk(1, 4));
            assert_eq!(contents(list), [(0, 1)]);
            assert!(bitmap.is_marked(w(0)));
            assert_eq!(bitmap.count_marked(), 1);
        });
    }

    #[test]
    #[should_panic = "cannot slice 12 words off"]
    fn test_slice_too_large_panics() {
        with_list(2, &[(0, 10)], |list, _| {
            let node = list.head().unwrap();
            list.slice_node(node, 12, None);
        });
    }

    #[test]
    fn test_first_fit_from_head() {
        with_list(2, &[(0, 10)], |list, _| {
            assert_eq!(list.get_first_fit(4), Some(chunk(6, 4)));
            assert_eq!(contents(list), [(0, 6)]);
        });
    }

    #[test]
    fn test_first_fit_exact_head() {
        with_list(2, &[(0, 4)], |list, _| {
            assert_eq!(list.get_first_fit(4), Some(chunk(0, 4)));
            assert!(list.is_empty());
        });
    }

    #[test]
    fn test_first_fit_on_empty_list() {
        with_list(2, &[], |list, _| {
            assert_eq!(list.get_first_fit(4), None);
            assert_eq!(list.stats().misses, 1);
        });
    }

    #[test]
    fn test_first_fit_skips_small_head() {
        with_list(2, &[(0, 2), (10, 8)], |list, bitmap| {
            assert_eq!(list.get_first_fit(6), Some(chunk(12, 6)));
            assert_eq!(contents(list), [(0, 2), (10, 2)]);
            let head = list.head().unwrap();
            assert_eq!(list.next(head), list.tail());
            assert!(bitmap.is_marked(w(10)));
            assert!(bitmap.is_marked(w(11)));
            assert!(!bitmap.is_marked(w(17)));
        });
    }

    #[test]
    fn test_first_fit_rounds_request() {
        with_list(4, &[(0, 4), (8, 8)], |list, _| {
            assert_eq!(list.get_first_fit(5), Some(chunk(8, 8)));
            assert_eq!(contents(list), [(0, 4)]);
            assert_eq!(list.tail(), list.head());
        });
    }

    #[test]
    fn test_first_fit_takes_first_not_best() {
        with_list(2, &[(0, 2), (10, 20), (40, 6)], |list, _| {
            assert_eq!(list.get_first_fit(6), Some(chunk(24, 6)));
            assert_eq!(contents(list), [(0, 2), (10, 14), (40, 6)]);
        });
    }

    #[test]
    fn test_first_fit_exact_tail() {
        with_list(2, &[(0, 2), (10, 2), (20, 6)], |list, _| {
            assert_eq!(list.get_first_fit(6), Some(chunk(20, 6)));
            assert_eq!(contents(list), [(0, 2), (10, 2)]);
            let tail = list.tail().unwrap();
            assert_eq!(list.chunk(tail), &chunk(10, 2));
            assert_eq!(list.next(tail), None);
        });
    }

    #[test]
    fn test_first_fit_no_fit() {
        with_list(2, &[(0, 2), (10, 4)], |list, bitmap| {
            assert_eq!(list.get_first_fit(6), None);
            assert_eq!(contents(list), [(0, 2), (10, 4)]);
            assert_eq!(bitmap.count_marked(), 4);
        });
    }

    #[test]
    fn test_first_fit_huge_request_misses() {
        with_list(2, &[(0, 4)], |list, _| {
            assert_eq!(list.get_first_fit(usize::MAX), None);
        });
    }

    #[test]
    #[should_panic = "must not be zero"]
    fn test_first_fit_zero_panics() {
        with_list(2, &[(0, 4)], |list, _| {
            let _ = list.get_first_fit(0);
        });
    }

    #[test]
    fn test_append_then_first_fit_round_trip() {
        for size in [2, 4, 64] {
            with_list(2, &[], |list, bitmap| {
                let original = chunk(32, size);
                list.append(original);
                assert_eq!(list.get_first_fit(size), Some(original));
                assert!(list.is_empty());
                assert_eq!(bitmap.count_marked(), 0);
            });
        }
    }

    #[test]
    fn test_allocate_until_exhausted() {
        with_list(2, &[(0, 64), (100, 32)], |list, bitmap| {
            let mut allocated = Vec::new();
            while let Some(c) = list.get_first_fit(6) {
                assert_untagged(bitmap, &c);
                allocated.push(c);
            }
            // 64 = 10 * 6 + 4, 32 = 5 * 6 + 2
            assert_eq!(allocated.len(), 15);
            assert_eq!(contents(list), [(0, 4), (100, 2)]);

            for (i, a) in allocated.iter().enumerate() {
                for b in &allocated[i + 1..] {
                    assert!(!a.overlaps(b), "{a} overlaps {b}");
                }
            }

            for c in allocated {
                list.release(c);
            }
            assert_eq!(list.free_words(), 96);
            assert_eq!(list.len(), 17);
        });
    }

    #[test]
    fn test_node_slots_are_reused() {
        with_list(2, &[(0, 4), (10, 4)], |list, _| {
            let head = list.head().unwrap();
            let taken = list.get_first_fit(4).unwrap();
            assert_eq!(taken, chunk(0, 4));
            let again = list.release(taken);
            assert_eq!(again, head);
            assert_eq!(contents(list), [(10, 4), (0, 4)]);
        });
    }

    #[test]
    fn test_add_span_rounds_down() {
        with_list(4, &[], |list, _| {
            assert!(list.add_span(w(0), 3).is_none());
            assert!(list.add_span(w(10), 11).is_some());
            assert_eq!(contents(list), [(10, 8)]);
        });
    }

    #[test]
    fn test_queries() {
        with_list(2, &[(0, 2), (10, 8), (40, 4)], |list, _| {
            assert_eq!(list.free_words(), 14);
            assert_eq!(list.largest_chunk(), 8);
            assert!(list.contains_free_word(w(17)));
            assert!(!list.contains_free_word(w(18)));
            assert_eq!((&*list).into_iter().count(), 3);
        });
        with_list(2, &[], |list, _| {
            assert_eq!(list.largest_chunk(), 0);
            assert_eq!(list.free_words(), 0);
        });
    }

    #[test]
    fn test_clear_and_reset() {
        with_list(2, &[(0, 2), (10, 8), (40, 4)], |list, bitmap| {
            list.clear();
            assert!(list.is_empty());
            assert_eq!(bitmap.count_marked(), 0);

            list.reset(w(16)..w(33));
            assert_eq!(contents(list), [(16, 16)]);
            assert_eq!(bitmap.count_marked(), 2);
        });
    }

    #[test]
    fn test_stats() {
        with_list(2, &[(0, 2), (10, 8)], |list, _| {
            let _ = list.get_first_fit(2);
            let _ = list.get_first_fit(4);
            let _ = list.get_first_fit(16);
            assert_eq!(
                *list.stats(),
                FreeListStats {
                    appends: 2,
                    splits: 1,
                    exact_fits: 1,
                    misses: 1,
                    removals: 1,
                }
            );
        });
    }

    #[derive(Default)]
    struct RecordingMarker {
        marked: RefCell<BTreeSet<HeapWord>>,
        log: RefCell<Vec<(bool, HeapWord)>>,
    }

    impl BoundaryMarker for RecordingMarker {
        fn mark(&self, addr: HeapWord) {
            self.marked.borrow_mut().insert(addr);
            self.log.borrow_mut().push((true, addr));
        }

        fn clear(&self, addr: HeapWord) {
            self.marked.borrow_mut().remove(&addr);
            self.log.borrow_mut().push((false, addr));
        }

        fn is_marked(&self, addr: HeapWord) -> bool {
            self.marked.borrow().contains(&addr)
        }
    }

    #[test]
    fn test_marker_sees_only_boundary_words() {
        let mut list = FreeList::with_alignment(RecordingMarker::default(), 2).unwrap();
        list.append(chunk(1000, 10));
        let sliced = list.get_first_fit(4).unwrap();
        assert_eq!(sliced, chunk(1006, 4));
        list.verify().unwrap();

        let marker = list.marker();
        assert_eq!(
            *marker.log.borrow(),
            [(true, w(1000)), (true, w(1009)), (false, w(1009)), (true, w(1005))]
        );
        assert_eq!(
            marker.marked.borrow().iter().copied().collect::<Vec<_>>(),
            [w(1000), w(1005)]
        );
    }

    #[test]
    fn test_display() {
        with_list(2, &[(0, 2), (10, 8)], |list, _| {
            let text = list.to_string();
            assert_eq!(
                text,
                "free list: 2 chunks, 10 free words, alignment 2\n  #0   [0, 2) (2 words)\n  #1   [10, 18) (8 words)\n"
            );
        });
    }
}
