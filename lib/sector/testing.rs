//! Brute-force Fock-space reference for checking the sector kernels.
//!
//! States live on all `2^(2 norb)` occupation patterns of `2 norb`
//! spin-orbitals in block order (alpha orbital `p` is mode `p`, beta orbital
//! `p` is mode `norb + p`). In that ordering the sector amplitude `coeff[a][b]`
//! is the Fock amplitude of pattern `a | (b << norb)` with no extra sign.

use ndarray as nd;
use num_complex::Complex64 as C64;
use rand::{ Rng, SeedableRng, rngs::StdRng };
use crate::{
    config::{ Settings, SpinOrder },
    excitation::apply_string,
    nbody::Layout,
    sector::Sector,
};

/// Dense state over all occupation patterns.
pub(crate) struct Fock {
    norb: usize,
    amps: Vec<C64>,
}

impl Fock {
    pub(crate) fn from_sector(sector: &Sector) -> Self {
        let norb = sector.norb();
        let mut amps = vec![C64::from(0.0); 1 << (2 * norb)];
        for (a, b, c) in sector.iter_strings() {
            amps[(a | (b << norb)) as usize] = c;
        }
        Self { norb, amps }
    }

    /// Project onto the sector of `template`.
    pub(crate) fn to_coeff(&self, template: &Sector) -> nd::Array2<C64> {
        let graph = template.graph();
        let mask = (1_u64 << self.norb) - 1;
        let mut coeff = nd::Array2::zeros((template.lena(), template.lenb()));
        for (x, c) in self.amps.iter().enumerate() {
            let x = x as u64;
            if let (Some(a), Some(b))
                = (graph.index_alpha(x & mask), graph.index_beta(x >> self.norb))
            {
                coeff[[a, b]] = *c;
            }
        }
        coeff
    }

    fn zeros_like(&self) -> Self {
        Self { norb: self.norb, amps: vec![C64::from(0.0); self.amps.len()] }
    }

    /// `out += w * a+_{dag} a_{undag} self` with block-order spin-orbitals.
    fn accumulate_string(
        &self,
        out: &mut Self,
        w: C64,
        dag: &[usize],
        undag: &[usize],
    ) {
        for (x, c) in self.amps.iter().enumerate() {
            if *c == C64::from(0.0) { continue; }
            if let Some((y, sign)) = apply_string(x as u64, dag, undag) {
                out.amps[y as usize] += w * sign * c;
            }
        }
    }

    /// Apply a sum of operator tensors.
    pub(crate) fn apply(&self, tensors: &[Option<nd::ArrayD<C64>>], layout: Layout)
        -> Self
    {
        let mut out = self.zeros_like();
        for h in tensors.iter().flatten() {
            let n = h.ndim() / 2;
            for (idx, &value) in h.indexed_iter() {
                if value == C64::from(0.0) { continue; }
                let idx: Vec<usize> = (0..2 * n).map(|k| idx[k]).collect();
                for (dag, undag) in self.block_strings(&idx[..n], &idx[n..], layout) {
                    self.accumulate_string(&mut out, value, &dag, &undag);
                }
            }
        }
        out
    }

    // all block-order spin-orbital strings generated by one tensor element
    fn block_strings(&self, dag: &[usize], undag: &[usize], layout: Layout)
        -> Vec<(Vec<usize>, Vec<usize>)>
    {
        let norb = self.norb;
        match layout {
            Layout::Spatial => {
                let n = dag.len();
                (0_usize..1 << n)
                    .map(|pattern| {
                        let shift = |m: usize| norb * (pattern >> m & 1);
                        let d = dag.iter().enumerate().map(|(m, &p)| p + shift(m)).collect();
                        let u = undag.iter().enumerate().map(|(m, &q)| q + shift(m)).collect();
                        (d, u)
                    })
                    .collect()
            },
            Layout::SpinOrbital(order) => {
                let to_block = |p: usize| {
                    let (orb, down) = order.split(p, norb);
                    SpinOrder::Block.join(orb, down, norb)
                };
                vec![(
                    dag.iter().map(|&p| to_block(p)).collect(),
                    undag.iter().map(|&q| to_block(q)).collect(),
                )]
            },
        }
    }

    /// `<bra| a+_{dag} a_{undag} |self>` with block-order spin-orbitals.
    pub(crate) fn expectation(&self, bra: &Self, dag: &[usize], undag: &[usize])
        -> C64
    {
        let mut out = self.zeros_like();
        self.accumulate_string(&mut out, C64::from(1.0), dag, undag);
        bra.amps.iter().zip(out.amps.iter())
            .map(|(b, k)| b.conj() * k)
            .sum()
    }
}

/// Reference result of applying operator tensors to a sector.
pub(crate) fn reference_apply(
    sector: &Sector,
    tensors: &[Option<nd::ArrayD<C64>>],
    layout: Layout,
) -> nd::Array2<C64>
{
    Fock::from_sector(sector).apply(tensors, layout).to_coeff(sector)
}

/// A sector with reproducible random amplitudes.
pub(crate) fn random_sector(
    nalpha: usize,
    nbeta: usize,
    norb: usize,
    settings: Settings,
    seed: u64,
) -> Sector
{
    let mut sector = Sector::with_settings(nalpha, nbeta, norb, settings).unwrap();
    sector.set_wfn_random_with(&mut StdRng::seed_from_u64(seed));
    sector
}

/// A tensor of `2 n` indices of extent `d` with reproducible random entries.
pub(crate) fn random_tensor(n: usize, d: usize, seed: u64) -> nd::ArrayD<C64> {
    let mut rng = StdRng::seed_from_u64(seed);
    nd::ArrayD::from_shape_fn(vec![d; 2 * n], |_| {
        C64::new(rng.gen_range(-1.0..1.0), rng.gen_range(-1.0..1.0))
    })
}

/// Maximum elementwise distance between two matrices.
pub(crate) fn max_diff<S, T, D>(a: &nd::ArrayBase<S, D>, b: &nd::ArrayBase<T, D>) -> f64
where
    S: nd::Data<Elem = C64>,
    T: nd::Data<Elem = C64>,
    D: nd::Dimension,
{
    a.iter().zip(b.iter())
        .map(|(x, y)| (x - y).norm())
        .fold(0.0, f64::max)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn fock_round_trip() {
        let sector = random_sector(2, 1, 3, Settings::default(), 7);
        let fock = Fock::from_sector(&sector);
        assert_eq!(fock.amps.len(), 64);
        assert_eq!(max_diff(&fock.to_coeff(&sector), sector.coeff()), 0.0);
    }

    #[test]
    fn number_operator() {
        let sector = random_sector(2, 1, 3, Settings::default(), 8);
        let mut h = nd::Array2::<C64>::zeros((3, 3));
        for p in 0..3 { h[[p, p]] = C64::from(1.0); }
        let out = reference_apply(&sector, &[Some(h.into_dyn())], Layout::Spatial);
        let expected = sector.coeff() * C64::from(3.0);
        assert!(max_diff(&out, &expected) < 1e-12);
    }
}
