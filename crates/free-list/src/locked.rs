use mark_bitmap::BoundaryMarker;
use spin::{Mutex, MutexGuard};

use crate::{FreeChunk, FreeList, NodeId};

/// A [`FreeList`] behind a spin lock.
///
/// A `FreeList` is not internally synchronized: every mutating operation
/// needs `&mut FreeList`. This wrapper hands that out only through a lock
/// guard, so a list shared between threads is always accessed by one
/// thread at a time. Lists of different regions can still share one
/// bitmap, e.g. through an `Arc<MarkBitmap>` marker.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
///
/// use free_list::{FreeChunk, FreeList, LockedFreeList};
/// use mark_bitmap::{HeapWord, MarkBitmap};
///
/// let bitmap = Arc::new(MarkBitmap::with_words(HeapWord::new(0), 64).unwrap());
/// let list = LockedFreeList::new(FreeList::with_alignment(Arc::clone(&bitmap), 2).unwrap());
///
/// list.append(FreeChunk::new(HeapWord::new(0), 16));
/// let chunk = list.get_first_fit(4).unwrap();
/// assert_eq!(chunk.start(), HeapWord::new(12));
/// assert_eq!(list.lock().free_words(), 12);
/// ```
#[derive(Debug)]
pub struct LockedFreeList<M> {
    inner: Mutex<FreeList<M>>,
}

impl<M> LockedFreeList<M> {
    #[must_use]
    pub const fn new(list: FreeList<M>) -> Self {
        Self {
            inner: Mutex::new(list),
        }
    }

    /// Locks the list, spinning until it is available.
    pub fn lock(&self) -> MutexGuard<'_, FreeList<M>> {
        self.inner.lock()
    }

    /// Locks the list if it is not locked already.
    pub fn try_lock(&self) -> Option<MutexGuard<'_, FreeList<M>>> {
        self.inner.try_lock()
    }

    #[must_use]
    pub fn into_inner(self) -> FreeList<M> {
        self.inner.into_inner()
    }
}

impl<M> LockedFreeList<M>
where
    M: BoundaryMarker,
{
    /// Locks the list for one [`FreeList::get_first_fit`] call.
    pub fn get_first_fit(&self, size: usize) -> Option<FreeChunk> {
        self.lock().get_first_fit(size)
    }

    /// Locks the list for one [`FreeList::append`] call.
    pub fn append(&self, chunk: FreeChunk) -> NodeId {
        self.lock().append(chunk)
    }

    /// Locks the list for one [`FreeList::release`] call.
    pub fn release(&self, chunk: FreeChunk) -> NodeId {
        self.lock().release(chunk)
    }
}
