//! Occupation strings as bit patterns and the combinatorics around them.
//!
//! A string is a `u64` whose bit `p` is set when orbital `p` is occupied, so
//! at most 63 orbitals can be described.

use std::hash::BuildHasherDefault;
use indexmap::IndexSet;
use itertools::Itertools;
use rustc_hash::FxHasher;

pub(crate) type FxIndexSet<T> = IndexSet<T, BuildHasherDefault<FxHasher>>;

/// Largest number of orbitals representable by a string.
pub const MAX_ORBITALS: usize = 63;

/// Binomial coefficient `n choose k`, zero if `k > n`.
pub fn binomial(n: usize, k: usize) -> usize {
    if k > n { return 0; }
    let k = k.min(n - k);
    (0..k).fold(1_u128, |acc, j| acc * (n - j) as u128 / (j as u128 + 1))
        as usize
}

/// Return the occupied orbitals of a string in ascending order.
pub fn integer_index(string: u64) -> Vec<usize> {
    let mut s = string;
    let mut occ: Vec<usize> = Vec::with_capacity(string.count_ones() as usize);
    while s != 0 {
        occ.push(s.trailing_zeros() as usize);
        s &= s - 1;
    }
    occ
}

/// Return the string with the given orbitals occupied.
pub fn reverse_integer_index(orbitals: &[usize]) -> u64 {
    orbitals.iter().fold(0_u64, |acc, &p| acc | (1 << p))
}

/// Number of occupied orbitals with index strictly smaller than `p`.
#[inline]
pub fn count_bits_below(string: u64, p: usize) -> u32 {
    (string & ((1_u64 << p) - 1)).count_ones()
}

/// `+1` or `-1` for an even or odd count.
#[inline]
pub(crate) fn parity_sign(count: u32) -> f64 {
    if count % 2 == 0 { 1.0 } else { -1.0 }
}

/// All strings with `k` of `norb` orbitals occupied, in ascending integer
/// order.
pub fn lexical_strings(norb: usize, k: usize) -> Vec<u64> {
    (0..norb).combinations(k)
        .map(|orbs| reverse_integer_index(&orbs))
        .sorted_unstable()
        .collect()
}

/// The ordered set of strings with a fixed number of occupied orbitals, with
/// constant-time conversion between strings and their ranks.
///
/// The same structure indexes sorted orbital tuples (a tuple being the string
/// with exactly those orbitals occupied), which is how operator terms are
/// addressed.
#[derive(Clone, Debug)]
pub struct StringSpace {
    norb: usize,
    nelec: usize,
    strings: FxIndexSet<u64>,
}

impl StringSpace {
    /// Enumerate all strings of `nelec` electrons in `norb` orbitals.
    ///
    /// The caller is responsible for `nelec <= norb <= MAX_ORBITALS`.
    pub fn new(norb: usize, nelec: usize) -> Self {
        let strings: FxIndexSet<u64>
            = lexical_strings(norb, nelec).into_iter().collect();
        Self { norb, nelec, strings }
    }

    pub fn norb(&self) -> usize { self.norb }

    pub fn nelec(&self) -> usize { self.nelec }

    pub fn len(&self) -> usize { self.strings.len() }

    pub fn is_empty(&self) -> bool { self.strings.is_empty() }

    /// Get the string with a given rank.
    pub fn string(&self, rank: usize) -> Option<u64> {
        self.strings.get_index(rank).copied()
    }

    /// Get the rank of a string, if it belongs to the space.
    pub fn rank(&self, string: u64) -> Option<usize> {
        self.strings.get_index_of(&string)
    }

    /// Iterate over all strings in rank order.
    pub fn iter(&self) -> impl Iterator<Item = u64> + '_ {
        self.strings.iter().copied()
    }
}
