//! First-fit free list with boundary tags for a swept heap.
//!
//! After a sweep, the collector hands every free span it found to a
//! [`FreeList`]. Allocation requests then walk the list in insertion order
//! and carve the request out of the first chunk that is large enough:
//!
//! - the request is rounded up to the chunk size alignment,
//! - a larger chunk is shrunk in place and the request is taken from its
//!   high end, so the donor keeps its start address and its place in the
//!   list,
//! - a chunk of exactly the requested size is unlinked and returned whole.
//!
//! While a chunk is linked, its first and last words are tagged in a
//! [`BoundaryMarker`](mark_bitmap::BoundaryMarker), typically a
//! [`MarkBitmap`](mark_bitmap::MarkBitmap). A later sweep can find free
//! chunk boundaries from the bitmap alone.
//!
//! ```
//! use free_list::{FreeChunk, FreeList, FreeListConfig};
//! use mark_bitmap::{HeapWord, MarkBitmap};
//!
//! let bitmap = MarkBitmap::with_words(HeapWord::new(0), 32).unwrap();
//! let mut list = FreeList::new(&bitmap, FreeListConfig::default()).unwrap();
//!
//! list.append(FreeChunk::new(HeapWord::new(0), 2));
//! list.append(FreeChunk::new(HeapWord::new(10), 8));
//!
//! // The 2-word head is too small; the request is sliced off the high end of
//! // the second chunk, which shrinks to [10, 12).
//! let chunk = list.get_first_fit(6).unwrap();
//! assert_eq!(chunk, FreeChunk::new(HeapWord::new(12), 6));
//! assert_eq!(list.free_words(), 4);
//!
//! // Nothing left can hold 4 words.
//! assert_eq!(list.get_first_fit(4), None);
//! ```
//!
//! # Failure model
//!
//! Not finding a fitting chunk is an ordinary outcome and is reported as
//! `None`. Broken preconditions, such as appending a misaligned chunk or
//! unlinking a chunk whose tags are missing, are bugs in the collector and
//! panic.

#![feature(error_generic_member_access)]
#![cfg_attr(not(test), no_std)]
#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

extern crate alloc;

pub use self::{
    chunk::{FreeChunk, NodeId},
    config::{ConfigError, FreeListConfig},
    list::{FreeList, FreeListStats, Iter},
    locked::LockedFreeList,
    verify::VerifyError,
};

mod chunk;
mod config;
mod list;
mod locked;
mod verify;
