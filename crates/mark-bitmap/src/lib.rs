//! Boundary-tag bookkeeping for free-list heaps.
//!
//! A free-list allocator tags the first and the last word of every free
//! chunk in a bit-per-word side table. A sweeping or coalescing pass can then
//! recognize free chunk boundaries by inspecting the bitmap alone, without
//! walking the free list.
//!
//! This crate provides:
//!
//! - [`HeapWord`], a word-granular heap address,
//! - [`BoundaryMarker`], the contract the allocator uses to set, clear and
//!   query boundary bits,
//! - [`MarkBitmap`], the in-memory bitmap implementation of that contract.
//!
//! # Sharing a bitmap
//!
//! [`BoundaryMarker`] methods take `&self`, and it is implemented for `&T`
//! and [`Arc<T>`], so one bitmap can back several independently locked free
//! lists:
//!
//! ```
//! use std::sync::Arc;
//!
//! use mark_bitmap::{BoundaryMarker, HeapWord, MarkBitmap};
//!
//! let bitmap = Arc::new(MarkBitmap::with_words(HeapWord::new(0), 64).unwrap());
//! let region_a = Arc::clone(&bitmap);
//! let region_b = Arc::clone(&bitmap);
//!
//! region_a.mark(HeapWord::new(1));
//! region_b.mark(HeapWord::new(40));
//! assert_eq!(bitmap.count_marked(), 2);
//! ```

#![feature(error_generic_member_access)]
#![cfg_attr(not(test), no_std)]
#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

extern crate alloc;

use alloc::sync::Arc;

pub use self::{
    address::HeapWord,
    bitmap::{BoundaryPairs, MarkBitmap, MarkBitmapError},
};

mod address;
mod bitmap;

/// Sets, clears and queries the boundary bit of single heap words.
///
/// Implementations must make `mark` and `clear` idempotent. Passing a word
/// the implementation does not cover is a caller bug and may panic.
pub trait BoundaryMarker {
    /// Sets the boundary bit of `addr`.
    fn mark(&self, addr: HeapWord);

    /// Clears the boundary bit of `addr`.
    fn clear(&self, addr: HeapWord);

    /// Returns `true` if the boundary bit of `addr` is set.
    fn is_marked(&self, addr: HeapWord) -> bool;
}

impl<T> BoundaryMarker for &T
where
    T: BoundaryMarker + ?Sized,
{
    fn mark(&self, addr: HeapWord) {
        (**self).mark(addr);
    }

    fn clear(&self, addr: HeapWord) {
        (**self).clear(addr);
    }

    fn is_marked(&self, addr: HeapWord) -> bool {
        (**self).is_marked(addr)
    }
}

impl<T> BoundaryMarker for Arc<T>
where
    T: BoundaryMarker + ?Sized,
{
    fn mark(&self, addr: HeapWord) {
        (**self).mark(addr);
    }

    fn clear(&self, addr: HeapWord) {
        (**self).clear(addr);
    }

    fn is_marked(&self, addr: HeapWord) -> bool {
        (**self).is_marked(addr)
    }
}
