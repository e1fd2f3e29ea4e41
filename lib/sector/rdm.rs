//! Reduced density matrices of a sector, or transition density matrices
//! between two states of the same sector.
//!
//! Every density matrix element is read off from the blocks
//! `R[(Pa, Qa), (Pb, Qb)] = <bra| (a+_{Pa} a_{Qa}) (a+_{Pb} a_{Qb}) |ket>` over
//! sorted orbital tuples (see [`ReducedDensity`]). The blocks are contracted
//! either densely, from per-species excitation intermediates built once per
//! tuple length and shared between orders, or sparsely, by enumerating pairs
//! of excitation maps.

use std::sync::Arc;
use itertools::iproduct;
use log::debug;
use ndarray::{ self as nd, Zip };
use num_complex::Complex64 as C64;
use rayon::prelude::*;
use crate::{
    config::SpinOrder,
    error::{ SectorError, SectorResult },
    excitation::{ ExcitationMap, Spin },
    hamiltonian::Hamiltonian,
    nbody::{ MAX_BODY, ReducedDensity, TupleSpaces },
    sector::{ Contraction, Sector },
};

type TupleMaps = Vec<(usize, Arc<ExcitationMap>)>;

fn fix_dim<D>(a: nd::ArrayD<C64>) -> SectorResult<nd::Array<C64, D>>
where D: nd::Dimension
{
    a.into_dimensionality::<D>()
        .map_err(|e| SectorError::Shape(e.to_string()))
}

// place the rows and columns of a contracted sub-block into a full block
fn scatter(
    sub: &nd::Array2<C64>,
    rows: &TupleMaps,
    cols: &TupleMaps,
    shape: (usize, usize),
) -> nd::Array2<C64>
{
    let mut full: nd::Array2<C64> = nd::Array2::zeros(shape);
    for (r, (i, _)) in rows.iter().enumerate() {
        for (c, (j, _)) in cols.iter().enumerate() {
            full[[*i, *j]] = sub[[r, c]];
        }
    }
    full
}

impl Sector {
    // `U[i] = (E^alpha_i)^T conj(bra)` for each alpha tuple pair map
    fn alpha_bra_intermediate(&self, bra: &Sector, maps: &TupleMaps)
        -> nd::Array3<C64>
    {
        let mut u: nd::Array3<C64>
            = nd::Array3::zeros((maps.len(), self.lena(), self.lenb()));
        let maps: nd::Array1<&ExcitationMap>
            = maps.iter().map(|(_, map)| map.as_ref()).collect();
        let bra_conj = bra.coeff.mapv(|c| c.conj());
        Zip::from(u.outer_iter_mut())
            .and(&maps)
            .par_for_each(|mut ui, map| {
                for e in map.iter() {
                    ui.row_mut(e.source)
                        .scaled_add(C64::from(e.sign), &bra_conj.row(e.target));
                }
            });
        u
    }

    fn flatten(&self, a: nd::Array3<C64>) -> SectorResult<nd::Array2<C64>> {
        let n = a.shape()[0];
        a.into_shape((n, self.lena() * self.lenb()))
            .map_err(|e| SectorError::Shape(e.to_string()))
    }

    fn sparse_density_block(&self, bra: &Sector, amaps: &TupleMaps, bmaps: &TupleMaps)
        -> nd::Array2<C64>
    {
        let mut sub: nd::Array2<C64> = nd::Array2::zeros((amaps.len(), bmaps.len()));
        for (r, (_, amap)) in amaps.iter().enumerate() {
            for (c, (_, bmap)) in bmaps.iter().enumerate() {
                let mut acc = C64::from(0.0);
                for ea in amap.iter() {
                    for eb in bmap.iter() {
                        acc += bra.coeff[[ea.target, eb.target]].conj()
                            * self.coeff[[ea.source, eb.source]]
                            * (ea.sign * eb.sign);
                    }
                }
                sub[[r, c]] = acc;
            }
        }
        sub
    }

    /// Compute the transition density blocks `<bra| (a+_{Pa} a_{Qa})
    /// (a+_{Pb} a_{Qb}) |self>` for all `1 <= |Pa| + |Pb| <= max_order`.
    ///
    /// `bra = None` uses `self`. A dense contraction whose intermediates
    /// exceed [`Settings::max_elements`][crate::config::Settings::max_elements]
    /// falls back to the sparse one.
    pub fn reduced_density(
        &self,
        bra: Option<&Sector>,
        max_order: usize,
        contraction: Contraction,
    ) -> SectorResult<ReducedDensity>
    {
        let bra = bra.unwrap_or(self);
        self.check_compatible(bra)?;
        if max_order == 0 || max_order > MAX_BODY {
            return Err(SectorError::Shape(format!(
                "density matrices of order {max_order} are not supported")));
        }
        let tuples = TupleSpaces::new(self.norb());
        let kmax_a = max_order.min(self.nalpha());
        let kmax_b = max_order.min(self.nbeta());
        let orders: Vec<(usize, usize)>
            = iproduct!(0..=kmax_a, 0..=kmax_b)
            .filter(|&(ka, kb)| ka + kb >= 1 && ka + kb <= max_order)
            .collect();
        let maps = |spin: Spin, kmax: usize| -> SectorResult<Vec<TupleMaps>> {
            (0..=kmax)
                .map(|k| self.tuple_maps(spin, &tuples, k, 0..tuples.num_pairs(k)))
                .collect()
        };
        let amaps = maps(Spin::Alpha, kmax_a)?;
        let bmaps = maps(Spin::Beta, kmax_b)?;

        let size = self.lena() * self.lenb();
        let dense = match contraction {
            Contraction::Sparse => false,
            Contraction::Dense => {
                let n: usize
                    = amaps.iter().chain(bmaps.iter()).map(|m| m.len()).sum();
                match self.check_budget(n.saturating_mul(size)) {
                    Ok(()) => true,
                    Err(e) => {
                        debug!("{e}; using sparse density contraction");
                        false
                    },
                }
            },
        };

        let blocks: Vec<((usize, usize), nd::Array2<C64>)> = if dense {
            let us: Vec<nd::Array2<C64>>
                = amaps.iter()
                .map(|m| self.flatten(self.alpha_bra_intermediate(bra, m)))
                .collect::<SectorResult<_>>()?;
            let ts: Vec<nd::Array2<C64>>
                = bmaps.iter()
                .map(|m| self.flatten(self.beta_intermediate(&self.coeff, m)))
                .collect::<SectorResult<_>>()?;
            orders.par_iter()
                .map(|&(ka, kb)| {
                    let sub = us[ka].dot(&ts[kb].t());
                    let shape = (tuples.num_pairs(ka), tuples.num_pairs(kb));
                    ((ka, kb), scatter(&sub, &amaps[ka], &bmaps[kb], shape))
                })
                .collect()
        } else {
            orders.par_iter()
                .map(|&(ka, kb)| {
                    let sub = self.sparse_density_block(bra, &amaps[ka], &bmaps[kb]);
                    let shape = (tuples.num_pairs(ka), tuples.num_pairs(kb));
                    ((ka, kb), scatter(&sub, &amaps[ka], &bmaps[kb], shape))
                })
                .collect()
        };

        let mut density = ReducedDensity::new(tuples);
        for ((ka, kb), block) in blocks.into_iter() {
            density.insert(ka, kb, block);
        }
        Ok(density)
    }

    /// Spin-summed density matrices of orders `1..=max_order`, with
    /// `D_n[i1..in, j1..jn] = sum_s <bra| a+_{i1 s1} .. a+_{in sn} a_{j1 s1} ..
    /// a_{jn sn} |self>`.
    pub fn rdm_with(
        &self,
        max_order: usize,
        bra: Option<&Sector>,
        contraction: Contraction,
    ) -> SectorResult<Vec<nd::ArrayD<C64>>>
    {
        let density = self.reduced_density(bra, max_order, contraction)?;
        Ok((1..=max_order).map(|n| density.spatial(n, self.norb())).collect())
    }

    fn rdms(&self, max_order: usize, bra: Option<&Sector>)
        -> SectorResult<Vec<nd::ArrayD<C64>>>
    {
        self.rdm_with(max_order, bra, self.contraction())
    }

    /// Spin-summed one-particle density matrix
    /// `D1[i, j] = sum_s <bra| a+_{i s} a_{j s} |self>`.
    pub fn rdm1(&self, bra: Option<&Sector>) -> SectorResult<nd::Array2<C64>> {
        let mut rdms = self.rdms(1, bra)?.into_iter();
        fix_dim(rdms.next().unwrap_or_default())
    }

    /// Spin-summed one- and two-particle density matrices, with
    /// `D2[i, j, k, l] = sum_st <bra| a+_{i s} a+_{j t} a_{k s} a_{l t} |self>`.
    pub fn rdm12(&self, bra: Option<&Sector>)
        -> SectorResult<(nd::Array2<C64>, nd::Array4<C64>)>
    {
        let mut rdms = self.rdms(2, bra)?.into_iter();
        Ok((
            fix_dim(rdms.next().unwrap_or_default())?,
            fix_dim(rdms.next().unwrap_or_default())?,
        ))
    }

    /// [`Self::rdm12`] by dense contraction, regardless of filling.
    pub fn rdm12_halffilling(&self, bra: Option<&Sector>)
        -> SectorResult<(nd::Array2<C64>, nd::Array4<C64>)>
    {
        let mut rdms = self.rdm_with(2, bra, Contraction::Dense)?.into_iter();
        Ok((
            fix_dim(rdms.next().unwrap_or_default())?,
            fix_dim(rdms.next().unwrap_or_default())?,
        ))
    }

    /// [`Self::rdm12`] by sparse contraction, regardless of filling.
    pub fn rdm12_lowfilling(&self, bra: Option<&Sector>)
        -> SectorResult<(nd::Array2<C64>, nd::Array4<C64>)>
    {
        let mut rdms = self.rdm_with(2, bra, Contraction::Sparse)?.into_iter();
        Ok((
            fix_dim(rdms.next().unwrap_or_default())?,
            fix_dim(rdms.next().unwrap_or_default())?,
        ))
    }

    /// Spin-summed one- through three-particle density matrices.
    pub fn rdm123(&self, bra: Option<&Sector>)
        -> SectorResult<(nd::Array2<C64>, nd::Array4<C64>, nd::Array6<C64>)>
    {
        let mut rdms = self.rdms(3, bra)?.into_iter();
        Ok((
            fix_dim(rdms.next().unwrap_or_default())?,
            fix_dim(rdms.next().unwrap_or_default())?,
            fix_dim(rdms.next().unwrap_or_default())?,
        ))
    }

    /// Spin-summed one- through four-particle density matrices. The
    /// four-particle matrix has eight indices and is returned with dynamic
    /// dimension.
    #[allow(clippy::type_complexity)]
    pub fn rdm1234(&self, bra: Option<&Sector>)
        -> SectorResult<(
            nd::Array2<C64>,
            nd::Array4<C64>,
            nd::Array6<C64>,
            nd::ArrayD<C64>,
        )>
    {
        let mut rdms = self.rdms(4, bra)?.into_iter();
        Ok((
            fix_dim(rdms.next().unwrap_or_default())?,
            fix_dim(rdms.next().unwrap_or_default())?,
            fix_dim(rdms.next().unwrap_or_default())?,
            rdms.next().unwrap_or_default(),
        ))
    }

    /* Spin-resolved matrices *************************************************/

    fn self_density(&self, max_order: usize) -> SectorResult<ReducedDensity> {
        self.reduced_density(None, max_order, self.contraction())
    }

    /// Spin-resolved one-particle density matrices
    /// `(<a+_{i up} a_{j up}>, <a+_{i down} a_{j down}>)`.
    pub fn get_spin_opdm(&self)
        -> SectorResult<(nd::Array2<C64>, nd::Array2<C64>)>
    {
        let norb = self.norb();
        let density = self.self_density(1)?;
        let opdm = |down: bool| {
            nd::Array2::from_shape_fn((norb, norb), |(i, j)| {
                density.element(&[(i, down)], &[(j, down)])
            })
        };
        Ok((opdm(false), opdm(true)))
    }

    /// Mixed-spin two-particle density matrix
    /// `<a+_{i up} a+_{j down} a_{k down} a_{l up}>`.
    pub fn get_ab_tpdm(&self) -> SectorResult<nd::Array4<C64>> {
        let norb = self.norb();
        let density = self.self_density(2)?;
        Ok(nd::Array4::from_shape_fn((norb, norb, norb, norb), |(i, j, k, l)| {
            density.element(&[(i, false), (j, true)], &[(k, true), (l, false)])
        }))
    }

    fn same_spin_tpdm(&self, down: bool)
        -> SectorResult<(nd::Array2<C64>, nd::Array4<C64>)>
    {
        let norb = self.norb();
        let density = self.self_density(2)?;
        let opdm = nd::Array2::from_shape_fn((norb, norb), |(i, j)| {
            density.element(&[(i, down)], &[(j, down)])
        });
        let tpdm = nd::Array4::from_shape_fn((norb, norb, norb, norb), |(i, j, k, l)| {
            density.element(&[(i, down), (j, down)], &[(k, down), (l, down)])
        });
        Ok((opdm, tpdm))
    }

    /// Alpha one-particle density matrix and alpha-alpha two-particle density
    /// matrix `<a+_{i up} a+_{j up} a_{k up} a_{l up}>`.
    pub fn get_aa_tpdm(&self) -> SectorResult<(nd::Array2<C64>, nd::Array4<C64>)> {
        self.same_spin_tpdm(false)
    }

    /// Beta one-particle density matrix and beta-beta two-particle density
    /// matrix `<a+_{i down} a+_{j down} a_{k down} a_{l down}>`.
    pub fn get_bb_tpdm(&self) -> SectorResult<(nd::Array2<C64>, nd::Array4<C64>)> {
        self.same_spin_tpdm(true)
    }

    /// One- and two-particle density matrices over interleaved spin-orbitals
    /// (`2 p` up, `2 p + 1` down): `<a+_p a_q>` and `<a+_p a+_q a_r a_s>`.
    pub fn get_openfermion_rdms(&self)
        -> SectorResult<(nd::Array2<C64>, nd::Array4<C64>)>
    {
        let norb = self.norb();
        let density = self.self_density(2)?;
        Ok((
            fix_dim(density.spin_orbital(1, norb, SpinOrder::Interleaved))?,
            fix_dim(density.spin_orbital(2, norb, SpinOrder::Interleaved))?,
        ))
    }

    /// Three-particle density matrix over interleaved spin-orbitals,
    /// `<a+_p a+_q a+_r a_s a_t a_u>`.
    pub fn get_three_pdm(&self) -> SectorResult<nd::Array6<C64>> {
        let density = self.self_density(3)?;
        fix_dim(density.spin_orbital(3, self.norb(), SpinOrder::Interleaved))
    }

    /// `<self| H |self>` for a Hamiltonian, including its energy shift.
    pub fn expectation_value<H>(&self, hamiltonian: &H) -> SectorResult<C64>
    where H: Hamiltonian + ?Sized
    {
        self.vdot(&self.apply_hamiltonian(hamiltonian)?)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        config::Settings,
        nbody::Layout,
        sector::testing::*,
    };

    fn normalized(nalpha: usize, nbeta: usize, norb: usize, seed: u64) -> Sector {
        let mut sector = random_sector(nalpha, nbeta, norb, Settings::default(), seed);
        sector.normalize();
        sector
    }

    #[test]
    fn trace_and_partial_trace() {
        let sector = normalized(2, 1, 4, 20);
        let n = sector.n_electrons() as f64;
        let (d1, d2) = sector.rdm12(None).unwrap();
        let trace: C64 = (0..4).map(|i| d1[[i, i]]).sum();
        assert!((trace - C64::from(n)).norm() < 1e-12);
        for i in 0..4 {
            for k in 0..4 {
                let partial: C64 = (0..4).map(|j| d2[[i, j, k, j]]).sum();
                assert!((partial + d1[[i, k]] * (n - 1.0)).norm() < 1e-12);
            }
        }
    }

    #[test]
    fn matches_fock_reference() {
        let ket = normalized(2, 2, 3, 21);
        let bra = normalized(2, 2, 3, 22);
        let (fk, fb) = (Fock::from_sector(&ket), Fock::from_sector(&bra));
        let norb = 3;
        let (d1, d2, d3) = ket.rdm123(Some(&bra)).unwrap();
        for i in 0..norb {
            for j in 0..norb {
                let expected: C64 = [0, norb].iter()
                    .map(|s| fk.expectation(&fb, &[i + s], &[j + s]))
                    .sum();
                assert!((d1[[i, j]] - expected).norm() < 1e-12);
            }
        }
        for (idx, v) in d2.indexed_iter() {
            let (i, j, k, l) = idx;
            let mut expected = C64::from(0.0);
            for s in [0, norb] {
                for t in [0, norb] {
                    expected += fk.expectation(&fb, &[i + s, j + t], &[k + s, l + t]);
                }
            }
            assert!((v - expected).norm() < 1e-12);
        }
        let (i, j, k, l, m, n) = (0, 2, 1, 1, 0, 2);
        let mut expected = C64::from(0.0);
        for s in [0, norb] {
            for t in [0, norb] {
                for u in [0, norb] {
                    expected += fk.expectation(
                        &fb, &[i + s, j + t, k + u], &[l + s, m + t, n + u]);
                }
            }
        }
        assert!((d3[[i, j, k, l, m, n]] - expected).norm() < 1e-12);
    }

    #[test]
    fn dense_and_sparse_agree() {
        for (na, nb, norb) in [(2, 2, 4), (1, 2, 5), (3, 1, 4), (1, 0, 3)] {
            let ket = normalized(na, nb, norb, 23);
            let bra = normalized(na, nb, norb, 24);
            let max_order = (na + nb).min(4);
            let dense = ket.rdm_with(max_order, Some(&bra), Contraction::Dense).unwrap();
            let sparse = ket.rdm_with(max_order, Some(&bra), Contraction::Sparse).unwrap();
            for (d, s) in dense.iter().zip(sparse.iter()) {
                assert!(max_diff(d, s) < 1e-7);
            }
        }
        let sector = normalized(2, 2, 4, 25);
        let (a1, a2) = sector.rdm12_halffilling(None).unwrap();
        let (b1, b2) = sector.rdm12_lowfilling(None).unwrap();
        assert!(max_diff(&a1, &b1) < 1e-7);
        assert!(max_diff(&a2, &b2) < 1e-7);
    }

    #[test]
    fn lower_orders_consistent() {
        let sector = normalized(2, 2, 3, 26);
        let d1 = sector.rdm1(None).unwrap();
        let (e1, e2, e3, e4) = sector.rdm1234(None).unwrap();
        let (f1, f2) = sector.rdm12(None).unwrap();
        assert!(max_diff(&d1, &e1) < 1e-12);
        assert!(max_diff(&f1, &e1) < 1e-12);
        assert!(max_diff(&f2, &e2) < 1e-12);
        assert_eq!(e3.shape(), &[3; 6]);
        assert_eq!(e4.shape(), &[3; 8]);
        // contracting the last pair of the four-particle matrix
        let n = sector.n_electrons() as f64;
        let (i, j, k, l, m, o) = (0, 1, 2, 2, 0, 1);
        let partial: C64 = (0..3).map(|p| e4[[i, j, k, p, l, m, o, p].as_slice()]).sum();
        assert!((partial + e3[[i, j, k, l, m, o]] * (n - 3.0)).norm() < 1e-10);
    }

    #[test]
    fn spin_resolved() {
        let ket = normalized(2, 1, 3, 27);
        let fk = Fock::from_sector(&ket);
        let norb = 3;
        let (da, db) = ket.get_spin_opdm().unwrap();
        let ab = ket.get_ab_tpdm().unwrap();
        let (_, aa) = ket.get_aa_tpdm().unwrap();
        let (bb1, bb) = ket.get_bb_tpdm().unwrap();
        assert!(max_diff(&bb1, &db) < 1e-12);
        for i in 0..norb {
            for j in 0..norb {
                assert!((da[[i, j]] - fk.expectation(&fk, &[i], &[j])).norm() < 1e-12);
                assert!((db[[i, j]] - fk.expectation(&fk, &[i + norb], &[j + norb])).norm() < 1e-12);
            }
        }
        for ((i, j, k, l), v) in ab.indexed_iter() {
            let expected = fk.expectation(&fk, &[i, j + norb], &[k + norb, l]);
            assert!((v - expected).norm() < 1e-12);
        }
        for ((i, j, k, l), v) in aa.indexed_iter() {
            assert!((v - fk.expectation(&fk, &[i, j], &[k, l])).norm() < 1e-12);
        }
        // a single beta electron has no beta-beta pairs
        assert!(bb.iter().all(|x| x.norm() < 1e-12));
    }

    #[test]
    fn openfermion_layout() {
        let ket = normalized(1, 2, 3, 28);
        let fk = Fock::from_sector(&ket);
        let norb = 3;
        // interleaved spin-orbital to block spin-orbital
        let block = |p: usize| if p % 2 == 0 { p / 2 } else { norb + p / 2 };
        let (opdm, tpdm) = ket.get_openfermion_rdms().unwrap();
        assert_eq!(opdm.shape(), &[6, 6]);
        for ((p, q), v) in opdm.indexed_iter() {
            assert!((v - fk.expectation(&fk, &[block(p)], &[block(q)])).norm() < 1e-12);
        }
        for ((p, q, r, s), v) in tpdm.indexed_iter() {
            let expected = fk.expectation(&fk, &[block(p), block(q)], &[block(r), block(s)]);
            assert!((v - expected).norm() < 1e-12);
        }
        let three = ket.get_three_pdm().unwrap();
        let (p, q, r, s, t, u) = (1, 0, 3, 3, 1, 0);
        let expected = fk.expectation(
            &fk,
            &[block(p), block(q), block(r)],
            &[block(s), block(t), block(u)],
        );
        assert!((three[[p, q, r, s, t, u]] - expected).norm() < 1e-12);
    }

    #[test]
    fn energy_from_rdms() {
        let norb = 4;
        let sector = normalized(2, 1, norb, 29);
        let h1 = random_tensor(1, norb, 291);
        let h2 = random_tensor(2, norb, 292);
        let tensors = vec![Some(h1.clone()), Some(h2.clone())];
        let applied = sector.apply(&tensors).unwrap();
        let direct = sector.vdot(&applied).unwrap();
        let (d1, d2) = sector.rdm12(None).unwrap();
        let from_rdms: C64
            = h1.iter().zip(d1.iter()).map(|(h, d)| h * d).sum::<C64>()
            + h2.iter().zip(d2.iter()).map(|(h, d)| h * d).sum::<C64>();
        assert!((direct - from_rdms).norm() < 1e-10);
        let reference = reference_apply(&sector, &tensors, Layout::Spatial);
        assert!(max_diff(applied.coeff(), &reference) < 1e-10);
    }

    #[test]
    fn invalid_requests() {
        let sector = normalized(1, 1, 2, 30);
        let other = normalized(2, 0, 2, 31);
        assert!(sector.rdm1(Some(&other)).is_err());
        assert!(sector.rdm_with(5, None, Contraction::Dense).is_err());
        assert!(sector.rdm_with(0, None, Contraction::Dense).is_err());
    }
}
