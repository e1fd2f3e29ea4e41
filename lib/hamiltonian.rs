//! Number-conserving Hamiltonians as sums of operator tensors.
//!
//! A Hamiltonian is a list of tensors `h[k]` with `2 (k + 1)` indices, each
//! the coefficients of a `(k + 1)`-body term
//! `sum h[k][p1..pn, q1..qn] a+_{p1} .. a+_{pn} a_{q1} .. a_{qn}`, plus a
//! scalar energy shift. How the indices address orbitals (spatial or
//! spin-orbital) is read off from their extent when the tensors are applied
//! to a [`Sector`][crate::sector::Sector].

use ndarray as nd;
use num_complex::Complex64 as C64;
use num_traits::Zero;
use crate::error::{ SectorError, SectorResult };

/// Basic requirements for any Hamiltonian.
pub trait Hamiltonian {
    /// Extent of every tensor index: `norb` for spatial tensors, `2 norb`
    /// for spin-orbital tensors.
    fn dim(&self) -> usize;

    /// Operator tensors, where entry `k` is either absent or has
    /// `2 (k + 1)` indices.
    fn tensors(&self) -> &[Option<nd::ArrayD<C64>>];

    /// Constant energy shift.
    fn e_0(&self) -> C64 { C64::zero() }

    /// Number of indices of the highest-order tensor present.
    fn rank(&self) -> usize {
        self.tensors().iter()
            .rposition(|h| h.is_some())
            .map(|k| 2 * (k + 1))
            .unwrap_or(0)
    }

    /// Return `true` if the Hamiltonian has at most one-body terms.
    fn quadratic(&self) -> bool { self.rank() <= 2 }

    /// Tensors of `-i time H` for use in Taylor or Krylov expansions of
    /// `exp(-i time H)`. The energy shift is not included.
    fn iht(&self, time: f64) -> Vec<Option<nd::ArrayD<C64>>> {
        let z = -C64::i() * time;
        self.tensors().iter()
            .map(|h| h.as_ref().map(|h| h.mapv(|x| z * x)))
            .collect()
    }
}

// every tensor present must have 2 (k + 1) equal extents
fn check_tensors(tensors: &[Option<nd::ArrayD<C64>>]) -> SectorResult<usize> {
    let mut dim: Option<usize> = None;
    for (k, h) in tensors.iter().enumerate() {
        let Some(h) = h else { continue; };
        if h.ndim() != 2 * (k + 1) {
            return Err(SectorError::Shape(format!(
                "tensor {k} must have {} indices, got {}", 2 * (k + 1), h.ndim())));
        }
        let d = h.shape()[0];
        if h.shape().iter().any(|&n| n != d) || dim.is_some_and(|prev| prev != d) {
            return Err(SectorError::Shape(format!(
                "tensor {k} has extents {:?}; all extents must be equal", h.shape())));
        }
        dim = Some(d);
    }
    dim.ok_or_else(|| SectorError::Shape("no operator tensors given".to_string()))
}

/// A Hamiltonian from general operator tensors.
#[derive(Clone, Debug)]
pub struct GsoHamiltonian {
    tensors: Vec<Option<nd::ArrayD<C64>>>,
    dim: usize,
    e_0: C64,
}

impl GsoHamiltonian {
    /// Create a new Hamiltonian, checking that tensor `k` has `2 (k + 1)`
    /// indices and that all indices share one extent.
    pub fn new(tensors: Vec<Option<nd::ArrayD<C64>>>, e_0: C64)
        -> SectorResult<Self>
    {
        let dim = check_tensors(&tensors)?;
        Ok(Self { tensors, dim, e_0 })
    }

    /// The tensor with `rank` indices, if present.
    pub fn tensor(&self, rank: usize) -> Option<&nd::ArrayD<C64>> {
        if rank == 0 || rank % 2 != 0 { return None; }
        self.tensors.get(rank / 2 - 1)?.as_ref()
    }

    /// Transform the one-body tensor by a change of orbital basis,
    /// `trans+ h1 trans`.
    ///
    /// Fails if there is no one-body tensor or `trans` is not `dim x dim`.
    pub fn transform(&self, trans: &nd::Array2<C64>) -> SectorResult<nd::Array2<C64>> {
        let h1 = self.tensor(2)
            .ok_or_else(|| SectorError::Shape("no one-body tensor to transform".to_string()))?
            .view()
            .into_dimensionality::<nd::Ix2>()
            .map_err(|e| SectorError::Shape(e.to_string()))?;
        if trans.shape() != [self.dim, self.dim] {
            return Err(SectorError::Shape(format!(
                "expected a {0} x {0} transformation, got {1:?}",
                self.dim, trans.shape())));
        }
        let trans_h = trans.t().mapv(|x| x.conj());
        Ok(trans_h.dot(&h1).dot(trans))
    }
}

impl Hamiltonian for GsoHamiltonian {
    fn dim(&self) -> usize { self.dim }

    fn tensors(&self) -> &[Option<nd::ArrayD<C64>>] { &self.tensors }

    fn e_0(&self) -> C64 { self.e_0 }
}

/// A diagonal Coulomb Hamiltonian
/// `sum_i diag_i n_i + sum_ij vij_ij n_i n_j + e_0`, with spin-summed
/// occupations `n_i`.
#[derive(Clone, Debug)]
pub struct DiagonalCoulomb {
    diag: nd::Array1<C64>,
    vij: nd::Array2<C64>,
    tensors: Vec<Option<nd::ArrayD<C64>>>,
    e_0: C64,
}

impl DiagonalCoulomb {
    /// Create a new Hamiltonian with no energy shift.
    ///
    /// Fails if `vij` is not `norb x norb` for `norb = diag.len()`.
    pub fn new(diag: nd::Array1<C64>, vij: nd::Array2<C64>) -> SectorResult<Self> {
        let norb = diag.len();
        if vij.shape() != [norb, norb] {
            return Err(SectorError::Shape(format!(
                "expected a {norb} x {norb} interaction, got {:?}", vij.shape())));
        }
        // n_i n_j = -sum_st a+_{is} a+_{jt} a_{is} a_{jt} + delta_ij n_i
        let mut h1: nd::ArrayD<C64> = nd::ArrayD::zeros(vec![norb; 2]);
        let mut h2: nd::ArrayD<C64> = nd::ArrayD::zeros(vec![norb; 4]);
        for i in 0..norb {
            h1[[i, i].as_slice()] = diag[i] + vij[[i, i]];
            for j in 0..norb {
                h2[[i, j, i, j].as_slice()] = -vij[[i, j]];
            }
        }
        Ok(Self { diag, vij, tensors: vec![Some(h1), Some(h2)], e_0: C64::zero() })
    }

    pub fn with_e_0(mut self, e_0: C64) -> Self {
        self.e_0 = e_0;
        self
    }

    pub fn diag(&self) -> &nd::Array1<C64> { &self.diag }

    pub fn vij(&self) -> &nd::Array2<C64> { &self.vij }

    /// `-i time diag` and `-i time vij`, ready for
    /// [`Sector::evolve_diagonal_coulomb`][crate::sector::Sector::evolve_diagonal_coulomb].
    pub fn iht_diagonal(&self, time: f64) -> (nd::Array1<C64>, nd::Array2<C64>) {
        let z = -C64::i() * time;
        (self.diag.mapv(|x| z * x), self.vij.mapv(|x| z * x))
    }
}

impl Hamiltonian for DiagonalCoulomb {
    fn dim(&self) -> usize { self.diag.len() }

    fn tensors(&self) -> &[Option<nd::ArrayD<C64>>] { &self.tensors }

    fn e_0(&self) -> C64 { self.e_0 }
}
