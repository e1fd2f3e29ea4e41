//! Sign-correct excitation maps over a single spin species, and the bounded
//! cache that memoizes them.

use std::{
    hash::BuildHasherDefault,
    sync::{ Arc, PoisonError, RwLock },
};
use indexmap::IndexMap;
use log::trace;
use rustc_hash::FxHasher;
use crate::bitstring::{ StringSpace, count_bits_below, parity_sign };

/// Spin species of an electron.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Spin {
    Alpha,
    Beta,
}

/// A single non-vanishing matrix element of an operator string between two
/// configuration strings.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Excitation {
    /// Rank of the configuration the operator acts on.
    pub source: usize,
    /// Rank of the resulting configuration.
    pub target: usize,
    /// Fermionic sign of the matrix element, `+1` or `-1`.
    pub sign: f64,
}

/// Apply `a+_{dag[0]} ... a+_{dag[k-1]} a_{undag[0]} ... a_{undag[k-1]}` to a
/// string, returning the resulting string and its sign, or `None` if the
/// configuration is annihilated.
///
/// Operators act right to left. Every operation on orbital `p` contributes
/// `(-1)^n` where `n` is the number of occupied orbitals below `p` at that
/// point.
pub fn apply_string(string: u64, dag: &[usize], undag: &[usize])
    -> Option<(u64, f64)>
{
    let mut s = string;
    let mut count: u32 = 0;
    for &q in undag.iter().rev() {
        let bit = 1_u64 << q;
        if s & bit == 0 { return None; }
        count += count_bits_below(s, q);
        s ^= bit;
    }
    for &p in dag.iter().rev() {
        let bit = 1_u64 << p;
        if s & bit != 0 { return None; }
        count += count_bits_below(s, p);
        s |= bit;
    }
    Some((s, parity_sign(count)))
}

/// Ordered list of all non-vanishing `(source, target, sign)` elements of an
/// operator string over a [`StringSpace`].
///
/// An empty map is valid: it means no configuration survives the operator.
/// The map for empty creation and annihilation lists is the identity.
#[derive(Clone, Debug)]
pub struct ExcitationMap {
    dag: Vec<usize>,
    undag: Vec<usize>,
    entries: Vec<Excitation>,
}

impl ExcitationMap {
    /// Build a map by applying the operator string to every configuration in
    /// `space`, in rank order.
    pub fn build(space: &StringSpace, dag: &[usize], undag: &[usize]) -> Self {
        let entries: Vec<Excitation>
            = space.iter().enumerate()
            .filter_map(|(source, string)| {
                let (new, sign) = apply_string(string, dag, undag)?;
                let target = space.rank(new)?;
                Some(Excitation { source, target, sign })
            })
            .collect();
        Self { dag: dag.to_vec(), undag: undag.to_vec(), entries }
    }

    pub fn dag(&self) -> &[usize] { &self.dag }

    pub fn undag(&self) -> &[usize] { &self.undag }

    pub fn len(&self) -> usize { self.entries.len() }

    pub fn is_empty(&self) -> bool { self.entries.is_empty() }

    pub fn entries(&self) -> &[Excitation] { &self.entries }

    pub fn iter(&self) -> std::slice::Iter<'_, Excitation> {
        self.entries.iter()
    }
}

impl<'a> IntoIterator for &'a ExcitationMap {
    type Item = &'a Excitation;
    type IntoIter = std::slice::Iter<'a, Excitation>;

    fn into_iter(self) -> Self::IntoIter { self.entries.iter() }
}

/* Cache **********************************************************************/

/// Longest operator string (creation plus annihilation orbitals) that can be
/// packed into a signature id.
pub const MAX_PACKED_ORBITALS: usize = 9;

const LEN_BITS: u32 = 3;
const ORB_BITS: u32 = 6;

/// Pack a map signature into a single integer: one spin bit, two 3-bit list
/// lengths, then 6 bits per orbital (creation orbitals first).
///
/// Returns `None` for signatures that do not fit.
pub fn signature_id(spin: Spin, dag: &[usize], undag: &[usize])
    -> Option<u64>
{
    let max_len: usize = (1 << LEN_BITS) - 1;
    if dag.len() > max_len
        || undag.len() > max_len
        || dag.len() + undag.len() > MAX_PACKED_ORBITALS
        || dag.iter().chain(undag).any(|&p| p >= (1 << ORB_BITS))
    {
        return None;
    }
    let mut id: u64 = match spin { Spin::Alpha => 0, Spin::Beta => 1 };
    id |= (dag.len() as u64) << 1;
    id |= (undag.len() as u64) << (1 + LEN_BITS);
    let mut shift: u32 = 1 + 2 * LEN_BITS;
    for &p in dag.iter().chain(undag) {
        id |= (p as u64) << shift;
        shift += ORB_BITS;
    }
    Some(id)
}

type MapStore = IndexMap<u64, Arc<ExcitationMap>, BuildHasherDefault<FxHasher>>;

/// Bounded, thread-safe store of excitation maps keyed by signature id.
///
/// Many readers may look up maps concurrently; insertion takes an exclusive
/// lock. When full, the oldest map is evicted first.
#[derive(Debug)]
pub(crate) struct MapCache {
    capacity: usize,
    maps: RwLock<MapStore>,
}

impl MapCache {
    pub(crate) fn new(capacity: usize) -> Self {
        Self { capacity, maps: RwLock::new(MapStore::default()) }
    }

    pub(crate) fn capacity(&self) -> usize { self.capacity }

    pub(crate) fn len(&self) -> usize {
        self.maps.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub(crate) fn get(&self, id: u64) -> Option<Arc<ExcitationMap>> {
        self.maps.read().unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned()
    }

    /// Return the map under `id`, building and inserting it with `build` if
    /// absent.
    pub(crate) fn get_or_insert_with<F>(&self, id: u64, build: F)
        -> Arc<ExcitationMap>
    where F: FnOnce() -> ExcitationMap
    {
        if let Some(map) = self.get(id) { return map; }
        let map = Arc::new(build());
        if self.capacity == 0 { return map; }
        let mut maps
            = self.maps.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(existing) = maps.get(&id) { return existing.clone(); }
        while maps.len() >= self.capacity {
            if let Some((old, _)) = maps.shift_remove_index(0) {
                trace!("evicted excitation map {old:#x}");
            }
        }
        maps.insert(id, map.clone());
        map
    }
}
