use snafu::{Snafu, ensure};
use snafu_utils::Location;

/// Errors reported for an invalid [`FreeListConfig`].
#[derive(Debug, Snafu)]
#[snafu(module)]
pub enum ConfigError {
    #[snafu(display("chunk size alignment must not be zero"))]
    #[snafu(provide(ref, priority, Location => location))]
    ZeroAlignment {
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("chunk size alignment {alignment} is not a power of two"))]
    #[snafu(provide(ref, priority, Location => location))]
    AlignmentNotPowerOfTwo {
        alignment: usize,
        #[snafu(implicit)]
        location: Location,
    },
}

/// Construction parameters of a [`FreeList`](crate::FreeList).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FreeListConfig {
    /// Granularity, in words, of every chunk size the list stores or hands
    /// out. Must be a power of two.
    pub chunk_size_alignment: usize,
}

impl Default for FreeListConfig {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CHUNK_SIZE_ALIGNMENT)
    }
}

impl FreeListConfig {
    /// Two words: the smallest alignment for which every chunk has distinct
    /// first and last words.
    pub const DEFAULT_CHUNK_SIZE_ALIGNMENT: usize = 2;

    #[must_use]
    pub const fn new(chunk_size_alignment: usize) -> Self {
        Self {
            chunk_size_alignment,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let alignment = self.chunk_size_alignment;
        ensure!(alignment != 0, config_error::ZeroAlignmentSnafu);
        ensure!(
            alignment.is_power_of_two(),
            config_error::AlignmentNotPowerOfTwoSnafu { alignment }
        );
        Ok(())
    }
}
