use core::{
    fmt,
    ops::{Add, AddAssign, Sub},
};

use derive_more::{Display, From};

macro_rules! impl_hex {
    ($ty:ty) => {
        impl fmt::LowerHex for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::LowerHex::fmt(&self.0, f)
            }
        }

        impl fmt::UpperHex for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::UpperHex::fmt(&self.0, f)
            }
        }
    };
}

/// Address of a heap word.
///
/// Heap addresses in this workspace are word indices, not byte addresses:
/// `HeapWord::new(3) + 1 == HeapWord::new(4)` names the word right after the
/// fourth one. Every size that goes together with a `HeapWord` is a word
/// count.
#[derive(Debug, Display, From, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct HeapWord(usize);
impl_hex!(HeapWord);

impl HeapWord {
    /// The lowest heap word address.
    pub const MIN: Self = Self(0);
    /// The highest heap word address.
    pub const MAX: Self = Self(usize::MAX);

    #[must_use]
    pub const fn new(word: usize) -> Self {
        Self(word)
    }

    /// Returns the raw word index.
    #[must_use]
    pub const fn value(self) -> usize {
        self.0
    }

    /// Adds `words` to this address.
    ///
    /// Returns `None` if the result would overflow.
    #[must_use]
    pub const fn checked_add(self, words: usize) -> Option<Self> {
        match self.0.checked_add(words) {
            Some(word) => Some(Self(word)),
            None => None,
        }
    }

    /// Returns the number of words from `rhs` to `self`.
    ///
    /// Returns `None` if `rhs` is above `self`.
    #[must_use]
    pub const fn checked_sub(self, rhs: Self) -> Option<usize> {
        self.0.checked_sub(rhs.0)
    }
}

impl Add<usize> for HeapWord {
    type Output = Self;

    fn add(self, rhs: usize) -> Self::Output {
        self.checked_add(rhs).unwrap()
    }
}

impl AddAssign<usize> for HeapWord {
    fn add_assign(&mut self, rhs: usize) {
        *self = *self + rhs;
    }
}

impl Sub for HeapWord {
    type Output = usize;

    fn sub(self, rhs: Self) -> Self::Output {
        self.checked_sub(rhs).unwrap()
    }
}
