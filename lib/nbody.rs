//! Reduction of n-body operator tensors to spin-resolved blocks over sorted
//! orbital tuples.
//!
//! Any term `a+_{p1} ... a+_{pn} a_{q1} ... a_{qn}` that conserves both
//! electron counts can be reordered, up to a sign, into
//! `(a+_{Pa} a_{Qa}) (a+_{Pb} a_{Qb})` where `Pa`, `Qa` are sorted tuples of
//! `ka` alpha orbitals and `Pb`, `Qb` sorted tuples of `kb` beta orbitals.
//! Each such product is a pair of excitation maps, one per species, so an
//! operator becomes a set of weight matrices `W[(Pa, Qa), (Pb, Qb)]` for each
//! `(ka, kb)`. The same canonical form addresses the blocks of reduced density
//! matrices.

use std::hash::BuildHasherDefault;
use indexmap::IndexMap;
use ndarray::{ self as nd, Dimension };
use num_complex::Complex64 as C64;
use rustc_hash::FxHasher;
use crate::{
    bitstring::{ StringSpace, integer_index, parity_sign },
    config::SpinOrder,
    error::{ SectorError, SectorResult },
};

/// Highest supported operator rank.
pub const MAX_BODY: usize = 4;

/// How the indices of an operator tensor address orbitals.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Layout {
    /// Indices run over `norb` spatial orbitals and the operator is summed
    /// over spins, pairing creation index `m` with annihilation index `m`.
    Spatial,
    /// Indices run over `2 norb` spin-orbitals in the given order.
    SpinOrbital(SpinOrder),
}

/// Check a set of operator tensors and determine their common layout.
///
/// Entry `k` of `tensors`, if present, must have rank `2 (k + 1)`; all present
/// tensors must have every extent equal to `norb` (spatial) or `2 norb`
/// (spin-orbital), the same for all of them.
pub fn detect_layout(
    tensors: &[Option<nd::ArrayD<C64>>],
    norb: usize,
    spin_order: SpinOrder,
) -> SectorResult<Layout>
{
    if tensors.is_empty() {
        return Err(SectorError::Shape("no operator tensors supplied".into()));
    }
    if tensors.len() > MAX_BODY {
        return Err(SectorError::Shape(format!(
            "operators of rank above {MAX_BODY} are not supported, got {}",
            tensors.len())));
    }
    let mut extent: Option<usize> = None;
    for (k, h) in tensors.iter().enumerate() {
        let Some(h) = h else { continue; };
        if h.ndim() != 2 * (k + 1) {
            return Err(SectorError::Shape(format!(
                "operator tensor {k} must have {} indices, got {}",
                2 * (k + 1), h.ndim())));
        }
        let d = h.shape()[0];
        if h.shape().iter().any(|&dk| dk != d) {
            return Err(SectorError::Shape(format!(
                "operator tensor {k} is not square: {:?}", h.shape())));
        }
        if d != norb && d != 2 * norb {
            return Err(SectorError::Shape(format!(
                "operator tensor {k} has extent {d}, expected {norb} or {}",
                2 * norb)));
        }
        match extent {
            None => { extent = Some(d); },
            Some(e) if e != d => {
                return Err(SectorError::Shape(format!(
                    "operator tensors mix extents {e} and {d}")));
            },
            Some(_) => { },
        }
    }
    match extent {
        None => Err(SectorError::Shape("all operator tensors are empty".into())),
        Some(d) if d == norb => Ok(Layout::Spatial),
        Some(_) => Ok(Layout::SpinOrbital(spin_order)),
    }
}

/* Canonical terms ************************************************************/

/// A term `sign (a+_{pa} a_{qa}) (a+_{pb} a_{qb})` with tuples given as
/// strings.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Term {
    pub ka: usize,
    pub kb: usize,
    pub pa: u64,
    pub qa: u64,
    pub pb: u64,
    pub qb: u64,
    pub sign: f64,
}

// sort `(orbital, is_beta)` operators with alpha first, returning the parity
// of the sort, or `None` if an operator repeats
fn sort_parity(ops: &[(usize, bool)]) -> Option<(f64, u64, u64, usize)> {
    let key = |&(p, down): &(usize, bool)| usize::from(down) * 64 + p;
    let mut inversions: u32 = 0;
    for (m, a) in ops.iter().enumerate() {
        for b in ops[m + 1..].iter() {
            let (ka, kb) = (key(a), key(b));
            if ka == kb { return None; }
            if ka > kb { inversions += 1; }
        }
    }
    let mut alpha: u64 = 0;
    let mut beta: u64 = 0;
    for &(p, down) in ops.iter() {
        if down { beta |= 1 << p; } else { alpha |= 1 << p; }
    }
    Some((parity_sign(inversions), alpha, beta, alpha.count_ones() as usize))
}

/// Bring `a+_{dag[0]} ... a+_{dag[n-1]} a_{undag[0]} ... a_{undag[n-1]}`,
/// with operators given as `(orbital, is_beta)`, into canonical form.
///
/// Returns `None` if the term vanishes identically or does not conserve the
/// number of electrons of each species.
pub fn canonical_term(dag: &[(usize, bool)], undag: &[(usize, bool)])
    -> Option<Term>
{
    let (sc, pa, pb, ka) = sort_parity(dag)?;
    let (su, qa, qb, ka_u) = sort_parity(undag)?;
    if ka != ka_u || dag.len() != undag.len() { return None; }
    let kb = dag.len() - ka;
    let sign = sc * su * parity_sign((ka * kb) as u32);
    Some(Term { ka, kb, pa, qa, pb, qb, sign })
}

/// Iterate over the canonical terms of the spin-summed spatial string
/// `a+_{i1 s1} ... a+_{in sn} a_{j1 s1} ... a_{jn sn}` for all spin patterns.
pub fn spatial_terms<'a>(dag: &'a [usize], undag: &'a [usize])
    -> impl Iterator<Item = Term> + 'a
{
    let n = dag.len();
    (0_usize..1 << n).filter_map(move |pattern| {
        let spin = |m: usize| pattern >> m & 1 == 1;
        let d: Vec<(usize, bool)>
            = dag.iter().enumerate().map(|(m, &p)| (p, spin(m))).collect();
        let u: Vec<(usize, bool)>
            = undag.iter().enumerate().map(|(m, &q)| (q, spin(m))).collect();
        canonical_term(&d, &u)
    })
}

/// Canonical form of a spin-orbital string.
pub fn spin_orbital_term(
    dag: &[usize],
    undag: &[usize],
    spin_order: SpinOrder,
    norb: usize,
) -> Option<Term>
{
    let d: Vec<(usize, bool)>
        = dag.iter().map(|&p| spin_order.split(p, norb)).collect();
    let u: Vec<(usize, bool)>
        = undag.iter().map(|&q| spin_order.split(q, norb)).collect();
    canonical_term(&d, &u)
}

/* Tuple pairs ****************************************************************/

/// Sorted orbital tuples of lengths `0..=MAX_BODY`, with pairs `(P, Q)` of
/// equal-length tuples flattened to `rank(P) * len + rank(Q)`.
#[derive(Clone, Debug)]
pub struct TupleSpaces {
    spaces: Vec<StringSpace>,
}

impl TupleSpaces {
    pub fn new(norb: usize) -> Self {
        let spaces: Vec<StringSpace>
            = (0..=MAX_BODY).map(|k| StringSpace::new(norb, k)).collect();
        Self { spaces }
    }

    /// Number of `(P, Q)` pairs of `k`-tuples.
    pub fn num_pairs(&self, k: usize) -> usize {
        let n = self.spaces[k].len();
        n * n
    }

    /// Flat index of a pair of tuples, or `None` if either does not have `k`
    /// orbitals.
    pub fn pair_index(&self, k: usize, p: u64, q: u64) -> Option<usize> {
        let space = self.spaces.get(k)?;
        Some(space.rank(p)? * space.len() + space.rank(q)?)
    }

    /// Orbital lists `(P, Q)` of a flat pair index.
    pub fn pair_orbitals(&self, k: usize, index: usize)
        -> (Vec<usize>, Vec<usize>)
    {
        let space = &self.spaces[k];
        let n = space.len();
        let p = space.string(index / n).unwrap_or(0);
        let q = space.string(index % n).unwrap_or(0);
        (integer_index(p), integer_index(q))
    }
}

/* Reduced operators **********************************************************/

type BlockMap = IndexMap<(usize, usize), nd::Array2<C64>, BuildHasherDefault<FxHasher>>;

/// Weight matrix for a single `(ka, kb)` block, with rows indexed by alpha
/// tuple pairs and columns by beta tuple pairs.
#[derive(Clone, Debug)]
pub struct ReducedBlock {
    pub ka: usize,
    pub kb: usize,
    pub weights: nd::Array2<C64>,
}

/// An operator as a sum of `(ka, kb)` blocks.
#[derive(Clone, Debug)]
pub struct ReducedOperator {
    tuples: TupleSpaces,
    blocks: Vec<ReducedBlock>,
}

impl ReducedOperator {
    /// Reduce a set of operator tensors with a known layout.
    pub fn new(
        tensors: &[Option<nd::ArrayD<C64>>],
        layout: Layout,
        norb: usize,
    ) -> Self
    {
        let tuples = TupleSpaces::new(norb);
        let mut blocks = BlockMap::default();
        let mut accumulate = |term: Term, value: C64| {
            let w = blocks.entry((term.ka, term.kb))
                .or_insert_with(|| {
                    nd::Array2::zeros(
                        (tuples.num_pairs(term.ka), tuples.num_pairs(term.kb)))
                });
            if let (Some(row), Some(col)) = (
                tuples.pair_index(term.ka, term.pa, term.qa),
                tuples.pair_index(term.kb, term.pb, term.qb),
            ) {
                w[[row, col]] += value * term.sign;
            }
        };
        for h in tensors.iter().flatten() {
            let n = h.ndim() / 2;
            for (idx, &value) in h.indexed_iter() {
                if value == C64::from(0.0) { continue; }
                let idx = idx.slice();
                let (dag, undag) = idx.split_at(n);
                match layout {
                    Layout::Spatial => {
                        spatial_terms(dag, undag)
                            .for_each(|term| accumulate(term, value));
                    },
                    Layout::SpinOrbital(order) => {
                        if let Some(term)
                            = spin_orbital_term(dag, undag, order, norb)
                        {
                            accumulate(term, value);
                        }
                    },
                }
            }
        }
        let blocks: Vec<ReducedBlock>
            = blocks.into_iter()
            .map(|((ka, kb), weights)| ReducedBlock { ka, kb, weights })
            .collect();
        Self { tuples, blocks }
    }

    pub fn tuples(&self) -> &TupleSpaces { &self.tuples }

    pub fn blocks(&self) -> &[ReducedBlock] { &self.blocks }

    pub fn is_empty(&self) -> bool { self.blocks.is_empty() }
}

/* Reduced density matrices ***************************************************/

/// Blocks `R[(Pa, Qa), (Pb, Qb)] = <bra| (a+_{Pa} a_{Qa}) (a+_{Pb} a_{Qb}) |ket>`
/// of a transition density, from which density matrix elements of any layout
/// are read off.
#[derive(Clone, Debug)]
pub struct ReducedDensity {
    tuples: TupleSpaces,
    blocks: BlockMap,
}

impl ReducedDensity {
    pub fn new(tuples: TupleSpaces) -> Self {
        Self { tuples, blocks: BlockMap::default() }
    }

    pub fn tuples(&self) -> &TupleSpaces { &self.tuples }

    pub fn insert(&mut self, ka: usize, kb: usize, block: nd::Array2<C64>) {
        self.blocks.insert((ka, kb), block);
    }

    pub fn contains(&self, ka: usize, kb: usize) -> bool {
        self.blocks.contains_key(&(ka, kb))
    }

    /// Expectation value of a canonical term; blocks that were never
    /// inserted count as zero.
    pub fn term_value(&self, term: &Term) -> C64 {
        let Some(block) = self.blocks.get(&(term.ka, term.kb))
            else { return C64::from(0.0); };
        let row = self.tuples.pair_index(term.ka, term.pa, term.qa);
        let col = self.tuples.pair_index(term.kb, term.pb, term.qb);
        match (row, col) {
            (Some(r), Some(c)) => block[[r, c]] * term.sign,
            _ => C64::from(0.0),
        }
    }

    /// Spin-summed spatial `n`-particle density matrix
    /// `D[i1..in, j1..jn] = sum_s <a+_{i1 s1} .. a+_{in sn} a_{j1 s1} .. a_{jn sn}>`.
    pub fn spatial(&self, n: usize, norb: usize) -> nd::ArrayD<C64> {
        let shape = vec![norb; 2 * n];
        nd::ArrayD::from_shape_fn(shape, |idx| {
            let idx = idx.slice();
            let (dag, undag) = idx.split_at(n);
            spatial_terms(dag, undag)
                .map(|term| self.term_value(&term))
                .sum()
        })
    }

    /// Spin-orbital `n`-particle density matrix
    /// `D[p1..pn, q1..qn] = <a+_{p1} .. a+_{pn} a_{q1} .. a_{qn}>` with
    /// `2 norb` spin-orbitals in the given order.
    pub fn spin_orbital(&self, n: usize, norb: usize, spin_order: SpinOrder)
        -> nd::ArrayD<C64>
    {
        let shape = vec![2 * norb; 2 * n];
        nd::ArrayD::from_shape_fn(shape, |idx| {
            let idx = idx.slice();
            let (dag, undag) = idx.split_at(n);
            spin_orbital_term(dag, undag, spin_order, norb)
                .map(|term| self.term_value(&term))
                .unwrap_or(C64::from(0.0))
        })
    }

    /// Density matrix element for operators given as `(orbital, is_beta)`.
    pub fn element(&self, dag: &[(usize, bool)], undag: &[(usize, bool)])
        -> C64
    {
        canonical_term(dag, undag)
            .map(|term| self.term_value(&term))
            .unwrap_or(C64::from(0.0))
    }
}
