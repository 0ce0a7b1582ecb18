use alloc::{boxed::Box, vec::Vec};
use core::{
    fmt,
    iter::FusedIterator,
    ops::Range,
    sync::atomic::{AtomicUsize, Ordering},
};

use snafu::{OptionExt as _, Snafu, ensure};
use snafu_utils::Location;

use crate::{BoundaryMarker, HeapWord};

const BITS_PER_WORD: usize = usize::BITS as usize;

/// Errors that can occur while creating a [`MarkBitmap`].
#[derive(Debug, Snafu)]
#[snafu(module)]
pub enum MarkBitmapError {
    #[snafu(display("covered range {start}..{end} is inverted"))]
    #[snafu(provide(ref, priority, Location => location))]
    InvertedRange {
        start: HeapWord,
        end: HeapWord,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("{words} words starting at {base} overflow the address space"))]
    #[snafu(provide(ref, priority, Location => location))]
    Overflow {
        base: HeapWord,
        words: usize,
        #[snafu(implicit)]
        location: Location,
    },
}

/// A bit-per-word bitmap over a contiguous range of heap words.
///
/// Bits are stored in atomic words and updated with read-modify-write
/// operations, so several owners (e.g. one free list per region) can set and
/// clear bits of the same bitmap through shared references without tearing
/// each other's updates.
///
/// Addressing a word outside of [`covered`](Self::covered) is a bug in the
/// caller and panics.
///
/// # Examples
///
/// ```
/// use mark_bitmap::{HeapWord, MarkBitmap};
///
/// let bitmap = MarkBitmap::with_words(HeapWord::new(0), 128).unwrap();
/// bitmap.set(HeapWord::new(3));
/// bitmap.set(HeapWord::new(70));
/// assert!(bitmap.is_marked(HeapWord::new(3)));
/// assert_eq!(
///     bitmap.find_next_marked(HeapWord::new(4), HeapWord::new(128)),
///     Some(HeapWord::new(70))
/// );
/// ```
pub struct MarkBitmap {
    base: HeapWord,
    words: usize,
    bits: Box<[AtomicUsize]>,
}

impl fmt::Debug for MarkBitmap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MarkBitmap")
            .field("covered", &self.covered())
            .field("marked", &self.count_marked())
            .finish()
    }
}

impl MarkBitmap {
    /// Creates an all-clear bitmap covering `covered`.
    pub fn new(covered: Range<HeapWord>) -> Result<Self, MarkBitmapError> {
        let Range { start, end } = covered;
        let words = end
            .checked_sub(start)
            .context(mark_bitmap_error::InvertedRangeSnafu { start, end })?;
        Self::with_words(start, words)
    }

    /// Creates an all-clear bitmap covering `words` words from `base`.
    pub fn with_words(base: HeapWord, words: usize) -> Result<Self, MarkBitmapError> {
        ensure!(
            base.checked_add(words).is_some(),
            mark_bitmap_error::OverflowSnafu { base, words }
        );
        let bits = (0..words.div_ceil(BITS_PER_WORD))
            .map(|_| AtomicUsize::new(0))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Ok(Self { base, words, bits })
    }

    /// Returns the range of heap words this bitmap has a bit for.
    #[must_use]
    pub fn covered(&self) -> Range<HeapWord> {
        self.base..self.base + self.words
    }

    #[must_use]
    pub fn contains(&self, addr: HeapWord) -> bool {
        self.covered().contains(&addr)
    }

    #[track_caller]
    fn bit_position(&self, addr: HeapWord) -> (usize, usize) {
        assert!(
            self.contains(addr),
            "heap word {addr} is outside of the covered range {:?}",
            self.covered()
        );
        let offset = addr - self.base;
        (offset / BITS_PER_WORD, offset % BITS_PER_WORD)
    }

    /// Sets the bit for `addr`. Setting an already set bit is a no-op.
    ///
    /// # Panics
    ///
    /// Panics if `addr` is not covered by the bitmap.
    #[track_caller]
    pub fn set(&self, addr: HeapWord) {
        let (index, bit) = self.bit_position(addr);
        self.bits[index].fetch_or(1 << bit, Ordering::AcqRel);
    }

    /// Clears the bit for `addr`. Clearing an already clear bit is a no-op.
    ///
    /// # Panics
    ///
    /// Panics if `addr` is not covered by the bitmap.
    #[track_caller]
    pub fn clear(&self, addr: HeapWord) {
        let (index, bit) = self.bit_position(addr);
        self.bits[index].fetch_and(!(1 << bit), Ordering::AcqRel);
    }

    /// # Panics
    ///
    /// Panics if `addr` is not covered by the bitmap.
    #[must_use]
    #[track_caller]
    pub fn is_marked(&self, addr: HeapWord) -> bool {
        let (index, bit) = self.bit_position(addr);
        self.bits[index].load(Ordering::Acquire) & (1 << bit) != 0
    }

    /// Clears every bit.
    pub fn clear_all(&self) {
        for word in &self.bits {
            word.store(0, Ordering::Release);
        }
    }

    #[must_use]
    pub fn count_marked(&self) -> usize {
        self.bits
            .iter()
            .map(|word| word.load(Ordering::Acquire).count_ones() as usize)
            .sum()
    }

    /// Returns the lowest marked word in `from..limit`.
    ///
    /// `limit` is clamped to the end of the covered range.
    ///
    /// # Panics
    ///
    /// Panics if `from` is below the covered range.
    #[must_use]
    pub fn find_next_marked(&self, from: HeapWord, limit: HeapWord) -> Option<HeapWord> {
        let limit = HeapWord::min(limit, self.covered().end);
        if from >= limit {
            return None;
        }
        let (mut index, bit) = self.bit_position(from);
        let end = limit - self.base;

        let mut bits = self.bits[index].load(Ordering::Acquire) & (usize::MAX << bit);
        loop {
            if bits != 0 {
                let offset = index * BITS_PER_WORD + bits.trailing_zeros() as usize;
                return (offset < end).then(|| self.base + offset);
            }
            index += 1;
            if index * BITS_PER_WORD >= end {
                return None;
            }
            bits = self.bits[index].load(Ordering::Acquire);
        }
    }

    /// Returns an iterator that pairs up consecutive marked words in `range`.
    ///
    /// Each item spans from one marked word up to and including the next
    /// marked word. When every marked span was tagged at both ends and is at
    /// least two words long, the items are exactly those spans. A trailing
    /// unpaired mark is ignored.
    #[must_use]
    pub fn boundary_pairs(&self, range: Range<HeapWord>) -> BoundaryPairs<'_> {
        BoundaryPairs {
            bitmap: self,
            next: range.start,
            limit: range.end,
        }
    }
}

impl BoundaryMarker for MarkBitmap {
    fn mark(&self, addr: HeapWord) {
        self.set(addr);
    }

    fn clear(&self, addr: HeapWord) {
        Self::clear(self, addr);
    }

    fn is_marked(&self, addr: HeapWord) -> bool {
        Self::is_marked(self, addr)
    }
}

/// Iterator returned by [`MarkBitmap::boundary_pairs`].
#[derive(Debug)]
pub struct BoundaryPairs<'a> {
    bitmap: &'a MarkBitmap,
    next: HeapWord,
    limit: HeapWord,
}

impl Iterator for BoundaryPairs<'_> {
    type Item = Range<HeapWord>;

    fn next(&mut self) -> Option<Self::Item> {
        let first = self.bitmap.find_next_marked(self.next, self.limit)?;
        let Some(last) = self.bitmap.find_next_marked(first + 1, self.limit) else {
            self.next = self.limit;
            return None;
        };
        self.next = last + 1;
        Some(first..last + 1)
    }
}

impl FusedIterator for BoundaryPairs<'_> {}
