//! Closed-form time evolution under diagonal and single-term generators.

use itertools::Itertools;
use ndarray::{ self as nd, Zip };
use num_complex::Complex64 as C64;
use num_traits::Zero;
use crate::{
    bitstring::reverse_integer_index,
    error::{ SectorError, SectorResult },
    excitation::Spin,
    sector::Sector,
};

// occupation masks selecting the configurations on which `E+ E` (domain) and
// `E E+` (range) act as the identity, for `E = a+_{dag} a_{undag}`
#[derive(Copy, Clone, Debug)]
struct Support {
    dag: u64,
    undag: u64,
}

impl Support {
    fn new(dag: &[usize], undag: &[usize]) -> Self {
        Self { dag: reverse_integer_index(dag), undag: reverse_integer_index(undag) }
    }

    fn in_domain(&self, string: u64) -> bool {
        let dag_only = self.dag & !self.undag;
        string & self.undag == self.undag && string & dag_only == 0
    }

    fn in_range(&self, string: u64) -> bool {
        let undag_only = self.undag & !self.dag;
        string & self.dag == self.dag && string & undag_only == 0
    }

    fn is_diagonal(&self) -> bool { self.dag == self.undag }
}

impl Sector {
    /// Multiply each amplitude by `exp` of the sum of `h` over its occupied
    /// orbitals.
    ///
    /// `h` holds either `norb` values shared by both spins or `2 norb` values
    /// ordered as [`Settings::spin_order`][crate::config::Settings::spin_order].
    pub fn evolve_diagonal_inplace(&mut self, h: &nd::Array1<C64>)
        -> SectorResult<()>
    {
        let norb = self.norb();
        let (ha, hb) = if h.len() == norb {
            (h.to_vec(), h.to_vec())
        } else if h.len() == 2 * norb {
            self.split_spin_orbital(h)
        } else {
            return Err(SectorError::dimension(
                format!("{norb} or {}", 2 * norb), h.len()));
        };
        let (fa, fb) = self.diagonal_sums(&ha, &hb);
        let fb = fb.mapv(C64::exp);
        Zip::from(self.coeff.rows_mut())
            .and(&fa)
            .par_for_each(|mut row, &a| {
                let ea = a.exp();
                row.iter_mut().zip(fb.iter())
                    .for_each(|(c, &eb)| { *c *= ea * eb; });
            });
        Ok(())
    }

    /// Like [`Self::evolve_diagonal_inplace`], returning a new sector.
    pub fn evolve_diagonal(&self, h: &nd::Array1<C64>) -> SectorResult<Self> {
        let mut out = self.clone();
        out.evolve_diagonal_inplace(h)?;
        Ok(out)
    }

    /// Multiply each amplitude by
    /// `exp(sum_i diag_i n_i + sum_ij vij_ij n_i n_j)`, where `n_i` counts
    /// the electrons of both spins in orbital `i`.
    pub fn evolve_diagonal_coulomb_inplace(
        &mut self,
        diag: &nd::Array1<C64>,
        vij: &nd::Array2<C64>,
    ) -> SectorResult<()>
    {
        let phases = self.diagonal_coulomb_values(diag, vij)?.mapv(C64::exp);
        self.coeff *= &phases;
        Ok(())
    }

    /// Like [`Self::evolve_diagonal_coulomb_inplace`], returning a new sector.
    pub fn evolve_diagonal_coulomb(
        &self,
        diag: &nd::Array1<C64>,
        vij: &nd::Array2<C64>,
    ) -> SectorResult<Self>
    {
        let mut out = self.clone();
        out.evolve_diagonal_coulomb_inplace(diag, vij)?;
        Ok(out)
    }

    /// Evolve under `coeff N + coeff* N` for the number-operator product
    /// `N = prod_{p in opa} n_{p up} prod_{p in opb} n_{p down}`: every
    /// configuration with all of `opa` and `opb` occupied is multiplied by
    /// `exp(-2 i time Re(coeff))`.
    pub fn evolve_inplace_individual_nbody_trivial(
        &mut self,
        time: f64,
        coeff: C64,
        opa: &[usize],
        opb: &[usize],
    ) -> SectorResult<()>
    {
        let norb = self.norb();
        if let Some(&p) = opa.iter().chain(opb).find(|&&p| p >= norb) {
            return Err(SectorError::Shape(format!(
                "orbital {p} out of range for {norb} orbitals")));
        }
        let mask_a = reverse_integer_index(opa);
        let mask_b = reverse_integer_index(opb);
        let phase = C64::new(0.0, -2.0 * time * coeff.re).exp();
        let graph = self.graph().clone();
        let rows: Vec<usize>
            = (0..self.lena())
            .filter(|&a| graph.string_alpha(a).is_some_and(|s| s & mask_a == mask_a))
            .collect();
        let cols: Vec<usize>
            = (0..self.lenb())
            .filter(|&b| graph.string_beta(b).is_some_and(|s| s & mask_b == mask_b))
            .collect();
        for &a in rows.iter() {
            for &b in cols.iter() {
                self.coeff[[a, b]] *= phase;
            }
        }
        Ok(())
    }

    /// Evolve for `time` under `H = coeff E + coeff* E+`, with
    /// `E = (a+_{daga} a_{undaga}) (a+_{dagb} a_{undagb})`, returning
    /// `exp(-i time H) C` as a new sector.
    ///
    /// For non-diagonal `E`, `H^2 = |coeff|^2 (E+ E + E E+)` is a projector
    /// times a scalar, so the result is `C` with its components on that
    /// projector scaled by `cos(time |coeff|)`, plus
    /// `-i sin(time |coeff|) / |coeff| H C`. Diagonal `E` reduces to
    /// [`Self::evolve_inplace_individual_nbody_trivial`]. A vanishing
    /// coefficient or operator leaves the state unchanged.
    pub fn evolve_individual_nbody_nontrivial(
        &self,
        time: f64,
        coeff: C64,
        daga: &[usize],
        undaga: &[usize],
        dagb: &[usize],
        undagb: &[usize],
    ) -> SectorResult<Self>
    {
        let amap = self.graph().excitation_map(Spin::Alpha, daga, undaga)?;
        let bmap = self.graph().excitation_map(Spin::Beta, dagb, undagb)?;
        let unique = [daga, undaga, dagb, undagb].iter()
            .all(|orbs| orbs.iter().all_unique());
        if coeff.is_zero() || !unique || amap.is_empty() || bmap.is_empty() {
            return Ok(self.clone());
        }

        let supp_a = Support::new(daga, undaga);
        let supp_b = Support::new(dagb, undagb);
        if supp_a.is_diagonal() && supp_b.is_diagonal() {
            let sign = amap.entries()[0].sign * bmap.entries()[0].sign;
            let mut out = self.clone();
            out.evolve_inplace_individual_nbody_trivial(
                time, coeff * sign, daga, dagb)?;
            return Ok(out);
        }

        let abs = coeff.norm();
        let (cos, sin) = ((time * abs).cos(), (time * abs).sin());
        let graph = self.graph();
        let strings = |spin: Spin| -> Vec<u64> { graph.space(spin).iter().collect() };
        let (sa, sb) = (strings(Spin::Alpha), strings(Spin::Beta));
        let mut out = self.clone();
        for (a, &alpha) in sa.iter().enumerate() {
            let (dom_a, rng_a) = (supp_a.in_domain(alpha), supp_a.in_range(alpha));
            if !dom_a && !rng_a { continue; }
            for (b, &beta) in sb.iter().enumerate() {
                if (dom_a && supp_b.in_domain(beta)) || (rng_a && supp_b.in_range(beta)) {
                    out.coeff[[a, b]] *= cos;
                }
            }
        }
        let scale = C64::new(0.0, -sin / abs);
        let rev = |orbs: &[usize]| -> Vec<usize> { orbs.iter().rev().copied().collect() };
        out.apply_individual_nbody_accumulate(
            scale * coeff, self, daga, undaga, dagb, undagb)?;
        out.apply_individual_nbody_accumulate(
            scale * coeff.conj(),
            self,
            &rev(undaga),
            &rev(daga),
            &rev(undagb),
            &rev(dagb),
        )?;
        Ok(out)
    }
}
