//! Modular sequence-number arithmetic.

/// A sequence-number space of `size` values, `0..size`, that wraps around.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeqSpace(u32);

impl SeqSpace {
    pub fn new(size: u32) -> Self {
        debug_assert!(size > 0, "sequence space must be non-empty");
        Self(size)
    }

    pub fn size(&self) -> u32 {
        self.0
    }

    #[inline]
    pub fn next(&self, seq: u32) -> u32 {
        self.add(seq, 1)
    }

    #[inline]
    pub fn add(&self, seq: u32, n: u32) -> u32 {
        ((seq as u64 + n as u64) % self.0 as u64) as u32
    }

    /// Forward distance from `from` to `to`, in `0..size`.
    #[inline]
    pub fn distance(&self, from: u32, to: u32) -> u32 {
        ((to as u64 + self.0 as u64 - from as u64 % self.0 as u64) % self.0 as u64) as u32
    }

    /// Whether `x` lies in the `len` numbers starting at `lo`, wrapping past
    /// the top of the space. An empty range contains nothing, and values
    /// outside the space (damaged headers) are never contained.
    pub fn contains(&self, lo: u32, len: u32, x: u32) -> bool {
        if len == 0 || x >= self.0 {
            return false;
        }
        let hi = self.add(lo, len - 1);
        if lo <= hi {
            lo <= x && x <= hi
        } else {
            x >= lo || x <= hi
        }
    }
}
