use std::{collections::BTreeMap, fmt, ops::Range, sync::Arc};

use free_list::{ConfigError, FreeChunk, FreeList, FreeListConfig, FreeListStats, VerifyError};
use log::{debug, info, warn};
use mark_bitmap::{HeapWord, MarkBitmap, MarkBitmapError};
use snafu::{OptionExt as _, ResultExt as _, Snafu, ensure};
use snafu_utils::Location;

use crate::trace::{Op, Step};

#[derive(Debug, Snafu)]
#[snafu(module)]
pub enum SimError {
    #[snafu(display("failed to create the boundary bitmap"))]
    #[snafu(provide(ref, priority, Location => location))]
    Bitmap {
        #[snafu(implicit)]
        location: Location,
        #[snafu(source)]
        source: MarkBitmapError,
    },
    #[snafu(display("invalid free list configuration"))]
    #[snafu(provide(ref, priority, Location => location))]
    Config {
        #[snafu(implicit)]
        location: Location,
        #[snafu(source)]
        source: ConfigError,
    },
    #[snafu(display("line {line}: no live allocation starts at {start}"))]
    #[snafu(provide(ref, priority, Location => location))]
    UnknownAllocation {
        line: usize,
        start: HeapWord,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display(
        "line {line}: allocation at {start} has {allocated} words, but {freed} were freed"
    ))]
    #[snafu(provide(ref, priority, Location => location))]
    SizeMismatch {
        line: usize,
        start: HeapWord,
        allocated: usize,
        freed: usize,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display(
        "line {line}: freed size {words} at {start} overflows when rounded to the chunk size alignment"
    ))]
    #[snafu(provide(ref, priority, Location => location))]
    FreeSizeOverflow {
        line: usize,
        start: HeapWord,
        words: usize,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("line {line}: free list verification failed"))]
    #[snafu(provide(ref, priority, Location => location))]
    Verify {
        line: usize,
        #[snafu(implicit)]
        location: Location,
        #[snafu(source)]
        source: VerifyError,
    },
    #[snafu(display(
        "line {line}: bitmap tags {pairs} boundary pairs, but the free list holds {chunks} chunks"
    ))]
    #[snafu(provide(ref, priority, Location => location))]
    BoundaryMismatch {
        line: usize,
        pairs: usize,
        chunks: usize,
        #[snafu(implicit)]
        location: Location,
    },
}

/// What a replayed trace did to the heap.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Summary {
    pub allocations: usize,
    pub failed_allocations: usize,
    pub frees: usize,
    pub live_words: usize,
    pub free_words: usize,
    pub free_chunks: usize,
    pub largest_chunk: usize,
    pub stats: FreeListStats,
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "allocations: {} ({} failed), frees: {}",
            self.allocations, self.failed_allocations, self.frees
        )?;
        writeln!(
            f,
            "live words: {}, free words: {} in {} chunks (largest {})",
            self.live_words, self.free_words, self.free_chunks, self.largest_chunk
        )?;
        let FreeListStats {
            appends,
            splits,
            exact_fits,
            misses,
            removals,
        } = self.stats;
        writeln!(
            f,
            "free list: {appends} appends, {splits} splits, {exact_fits} exact fits, {misses} misses, {removals} removals"
        )
    }
}

/// A heap of `heap_words` words starting at word 0, managed by one free
/// list whose boundary tags live in a [`MarkBitmap`].
pub struct Simulator {
    heap: Range<HeapWord>,
    bitmap: Arc<MarkBitmap>,
    list: FreeList<Arc<MarkBitmap>>,
    live: BTreeMap<HeapWord, FreeChunk>,
    allocations: usize,
    failed_allocations: usize,
    frees: usize,
}

impl Simulator {
    pub fn new(heap_words: usize, config: FreeListConfig) -> Result<Self, SimError> {
        let bitmap = Arc::new(
            MarkBitmap::with_words(HeapWord::MIN, heap_words).context(sim_error::BitmapSnafu)?,
        );
        let heap = bitmap.covered();
        let mut list =
            FreeList::new(Arc::clone(&bitmap), config).context(sim_error::ConfigSnafu)?;
        list.reset(heap.clone());
        info!(
            "heap of {heap_words} words, chunk size alignment {}",
            list.alignment()
        );
        Ok(Self {
            heap,
            bitmap,
            list,
            live: BTreeMap::new(),
            allocations: 0,
            failed_allocations: 0,
            frees: 0,
        })
    }

    #[must_use]
    pub fn list(&self) -> &FreeList<Arc<MarkBitmap>> {
        &self.list
    }

    pub fn run(&mut self, steps: &[Step]) -> Result<(), SimError> {
        for step in steps {
            self.apply(*step)?;
        }
        Ok(())
    }

    pub fn apply(&mut self, Step { line, op }: Step) -> Result<(), SimError> {
        match op {
            Op::Alloc { words } => {
                if let Some(chunk) = self.list.get_first_fit(words) {
                    debug!("line {line}: allocated {chunk}");
                    self.live.insert(chunk.start(), chunk);
                    self.allocations += 1;
                } else {
                    warn!(
                        "line {line}: no free chunk fits {words} words (largest {})",
                        self.list.largest_chunk()
                    );
                    self.failed_allocations += 1;
                }
            }
            Op::Free { start, words } => {
                let chunk = *self
                    .live
                    .get(&start)
                    .context(sim_error::UnknownAllocationSnafu { line, start })?;
                let freed = self
                    .list
                    .checked_adjust_chunk_size(words)
                    .context(sim_error::FreeSizeOverflowSnafu { line, start, words })?;
                ensure!(
                    freed == chunk.size(),
                    sim_error::SizeMismatchSnafu {
                        line,
                        start,
                        allocated: chunk.size(),
                        freed,
                    }
                );
                self.live.remove(&start);
                self.list.release(chunk);
                self.frees += 1;
                debug!("line {line}: freed {chunk}");
            }
            Op::Reset => {
                self.live.clear();
                self.list.reset(self.heap.clone());
                info!("line {line}: heap reset");
            }
            Op::Verify => self.verify(line)?,
            Op::Dump => print!("{}", self.list),
        }
        Ok(())
    }

    /// Verifies the free list, and cross-checks it against the chunks the
    /// bitmap alone describes when every chunk is at least two words long.
    pub fn verify(&self, line: usize) -> Result<(), SimError> {
        self.list
            .verify()
            .context(sim_error::VerifySnafu { line })?;
        if self.list.alignment() >= 2 {
            let pairs = self.bitmap.boundary_pairs(self.heap.clone()).count();
            let chunks = self.list.len();
            ensure!(
                pairs == chunks,
                sim_error::BoundaryMismatchSnafu {
                    line,
                    pairs,
                    chunks,
                }
            );
        }
        debug!("line {line}: free list verified");
        Ok(())
    }

    #[must_use]
    pub fn summary(&self) -> Summary {
        Summary {
            allocations: self.allocations,
            failed_allocations: self.failed_allocations,
            frees: self.frees,
            live_words: self.live.values().map(FreeChunk::size).sum(),
            free_words: self.list.free_words(),
            free_chunks: self.list.len(),
            largest_chunk: self.list.largest_chunk(),
            stats: *self.list.stats(),
        }
    }
}
