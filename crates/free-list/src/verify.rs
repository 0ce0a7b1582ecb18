use alloc::vec::Vec;

use mark_bitmap::{BoundaryMarker, HeapWord};
use snafu::{Snafu, ensure};
use snafu_utils::Location;

use crate::{FreeChunk, FreeList, NodeId};

/// A broken free list invariant, reported by [`FreeList::verify`].
#[derive(Debug, Snafu)]
#[snafu(module)]
pub enum VerifyError {
    #[snafu(display("free list head {head:?} and tail {tail:?} disagree on emptiness"))]
    #[snafu(provide(ref, priority, Location => location))]
    HeadTailMismatch {
        head: Option<NodeId>,
        tail: Option<NodeId>,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("free list ends at {last:?} but its tail is {tail:?}"))]
    #[snafu(provide(ref, priority, Location => location))]
    DanglingTail {
        last: Option<NodeId>,
        tail: Option<NodeId>,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("free list links more than the {len} chunks it counts"))]
    #[snafu(provide(ref, priority, Location => location))]
    Cycle {
        len: usize,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("free list counts {len} chunks but links {linked}"))]
    #[snafu(provide(ref, priority, Location => location))]
    LengthMismatch {
        len: usize,
        linked: usize,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("size of {chunk} is not a multiple of the chunk size alignment {alignment}"))]
    #[snafu(provide(ref, priority, Location => location))]
    Misaligned {
        chunk: FreeChunk,
        alignment: usize,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("boundary word {addr} of {chunk} is not tagged"))]
    #[snafu(provide(ref, priority, Location => location))]
    Untagged {
        chunk: FreeChunk,
        addr: HeapWord,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("free chunks {first} and {second} overlap"))]
    #[snafu(provide(ref, priority, Location => location))]
    Overlap {
        first: FreeChunk,
        second: FreeChunk,
        #[snafu(implicit)]
        location: Location,
    },
}

impl<M> FreeList<M>
where
    M: BoundaryMarker,
{
    /// Checks the list invariants.
    ///
    /// - the list is empty exactly when both head and tail are unset,
    /// - following the links from the head ends at the tail after
    ///   [`len`](Self::len) chunks,
    /// - every chunk size is a multiple of the chunk size alignment,
    /// - both boundary words of every chunk are tagged,
    /// - no two chunks overlap.
    ///
    /// Runs in O(n log n) in the number of chunks. Tags of words outside of
    /// the linked chunks are not inspected.
    pub fn verify(&self) -> Result<(), VerifyError> {
        let (head, tail) = (self.head(), self.tail());
        ensure!(
            head.is_none() == tail.is_none(),
            verify_error::HeadTailMismatchSnafu { head, tail }
        );

        let len = self.len();
        let mut chunks = Vec::with_capacity(len);
        let mut last = None;
        let mut next = head;
        while let Some(node) = next {
            ensure!(chunks.len() < len, verify_error::CycleSnafu { len });
            let chunk = *self.chunk(node);
            ensure!(
                chunk.size() % self.alignment() == 0,
                verify_error::MisalignedSnafu {
                    chunk,
                    alignment: self.alignment(),
                }
            );
            for addr in [chunk.start(), chunk.last_word()] {
                ensure!(
                    self.marker().is_marked(addr),
                    verify_error::UntaggedSnafu { chunk, addr }
                );
            }
            chunks.push(chunk);
            last = Some(node);
            next = self.next(node);
        }
        ensure!(
            chunks.len() == len,
            verify_error::LengthMismatchSnafu {
                len,
                linked: chunks.len(),
            }
        );
        ensure!(last == tail, verify_error::DanglingTailSnafu { last, tail });

        chunks.sort_unstable_by_key(FreeChunk::start);
        for pair in chunks.windows(2) {
            let [first, second] = [pair[0], pair[1]];
            ensure!(
                !first.overlaps(&second),
                verify_error::OverlapSnafu { first, second }
            );
        }
        Ok(())
    }
}
