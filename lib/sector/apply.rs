//! Application of fermionic operators to a sector.
//!
//! General operators are first reduced to spin-resolved weight blocks (see
//! [`crate::nbody`]) and then contracted either densely or sparsely. A
//! specialized backend handles one-body operators and spatial one- plus
//! two-body operators through single excitations only. All paths give the
//! same result up to rounding.

use std::sync::Arc;
use log::debug;
use ndarray::{ self as nd, Zip, s };
use num_complex::Complex64 as C64;
use num_traits::Zero;
use crate::{
    config::Backend,
    error::{ SectorError, SectorResult },
    excitation::{ ExcitationMap, Spin },
    hamiltonian::Hamiltonian,
    nbody::{ Layout, ReducedBlock, ReducedOperator, TupleSpaces, detect_layout },
    sector::{ Contraction, Sector },
};

// `out += w * E_ij x` for the spin-summed single excitation `E_ij`
fn accumulate_single(
    sector: &Sector,
    i: usize,
    j: usize,
    w: C64,
    x: nd::ArrayView2<C64>,
    out: &mut nd::Array2<C64>,
) {
    let graph = sector.graph();
    for e in graph.single_map(Spin::Alpha, i, j).iter() {
        out.row_mut(e.target).scaled_add(w * e.sign, &x.row(e.source));
    }
    for e in graph.single_map(Spin::Beta, i, j).iter() {
        out.column_mut(e.target).scaled_add(w * e.sign, &x.column(e.source));
    }
}

fn is_zero_row(row: nd::ArrayView1<C64>) -> bool {
    row.iter().all(|w| w.is_zero())
}

impl Sector {
    /* General operators ******************************************************/

    /// Apply a sum of operator tensors, returning a new sector.
    ///
    /// Entry `k` of `tensors` is either `None` or a `(k + 1)`-body tensor
    /// `h[p1..pn, q1..qn]` representing `sum h a+_{p1} .. a+_{pn} a_{q1} ..
    /// a_{qn}`, with all indices over `norb` spatial orbitals (spin-summed) or
    /// over `2 norb` spin-orbitals in the order set by
    /// [`Settings::spin_order`][crate::config::Settings::spin_order]. Terms
    /// that change either electron count contribute nothing.
    ///
    /// Fails if no tensor is present or any tensor has the wrong rank or
    /// extent.
    pub fn apply(&self, tensors: &[Option<nd::ArrayD<C64>>])
        -> SectorResult<Self>
    {
        self.apply_with(tensors, self.settings().backend, self.contraction())
    }

    /// Like [`Self::apply`], but overwrite `self` with the result. `self` is
    /// left untouched on failure.
    pub fn apply_inplace(&mut self, tensors: &[Option<nd::ArrayD<C64>>])
        -> SectorResult<()>
    {
        let out = self.apply(tensors)?;
        self.coeff = out.coeff;
        Ok(())
    }

    /// Like [`Self::apply`], with an explicit choice of kernels.
    pub fn apply_with(
        &self,
        tensors: &[Option<nd::ArrayD<C64>>],
        backend: Backend,
        contraction: Contraction,
    ) -> SectorResult<Self>
    {
        let layout = detect_layout(tensors, self.norb(), self.settings().spin_order)?;
        if backend == Backend::Specialized {
            if let Some(coeff) = self.apply_specialized(tensors, layout)? {
                return Ok(self.with_coeff(coeff));
            }
        }
        let op = ReducedOperator::new(tensors, layout, self.norb());
        let mut out = nd::Array2::zeros(self.coeff.raw_dim());
        for block in op.blocks().iter() {
            if block.ka > self.nalpha() || block.kb > self.nbeta() { continue; }
            match contraction {
                Contraction::Dense => {
                    match self.accumulate_block_dense(block, op.tuples(), &mut out) {
                        Err(SectorError::Resource(req, max)) => {
                            debug!(
                                "dense ({}, {}) block needs {req} elements \
                                (limit {max}); using sparse contraction",
                                block.ka, block.kb,
                            );
                            self.accumulate_block_sparse(block, op.tuples(), &mut out)?;
                        },
                        res => res?,
                    }
                },
                Contraction::Sparse => {
                    self.accumulate_block_sparse(block, op.tuples(), &mut out)?;
                },
            }
        }
        Ok(self.with_coeff(out))
    }

    // excitation maps of the selected tuple pairs
    pub(crate) fn tuple_maps<I>(
        &self,
        spin: Spin,
        tuples: &TupleSpaces,
        k: usize,
        pairs: I,
    ) -> SectorResult<Vec<(usize, Arc<ExcitationMap>)>>
    where I: IntoIterator<Item = usize>
    {
        let mut maps: Vec<(usize, Arc<ExcitationMap>)> = Vec::new();
        for idx in pairs {
            let (p, q) = tuples.pair_orbitals(k, idx);
            let map = self.graph().excitation_map(spin, &p, &q)?;
            if !map.is_empty() { maps.push((idx, map)); }
        }
        Ok(maps)
    }

    // `T[j] = E^beta_j C` for each beta tuple pair map
    pub(crate) fn beta_intermediate(
        &self,
        coeff: &nd::Array2<C64>,
        maps: &[(usize, Arc<ExcitationMap>)],
    ) -> nd::Array3<C64>
    {
        let mut t: nd::Array3<C64>
            = nd::Array3::zeros((maps.len(), self.lena(), self.lenb()));
        let maps: nd::Array1<&ExcitationMap>
            = maps.iter().map(|(_, map)| map.as_ref()).collect();
        Zip::from(t.outer_iter_mut())
            .and(&maps)
            .par_for_each(|mut tj, map| {
                for e in map.iter() {
                    tj.column_mut(e.target)
                        .scaled_add(C64::from(e.sign), &coeff.column(e.source));
                }
            });
        t
    }

    fn accumulate_block_dense(
        &self,
        block: &ReducedBlock,
        tuples: &TupleSpaces,
        out: &mut nd::Array2<C64>,
    ) -> SectorResult<()>
    {
        let w = &block.weights;
        let rows = (0..w.nrows()).filter(|&i| !is_zero_row(w.row(i)));
        let cols = (0..w.ncols()).filter(|&j| !is_zero_row(w.column(j)));
        let amaps = self.tuple_maps(Spin::Alpha, tuples, block.ka, rows)?;
        let bmaps = self.tuple_maps(Spin::Beta, tuples, block.kb, cols)?;
        if amaps.is_empty() || bmaps.is_empty() { return Ok(()); }
        let size = self.lena() * self.lenb();
        self.check_budget((amaps.len() + bmaps.len()).saturating_mul(size))?;

        let t = self.beta_intermediate(&self.coeff, &bmaps)
            .into_shape((bmaps.len(), size))
            .map_err(|e| SectorError::Shape(e.to_string()))?;
        let row_idx: Vec<usize> = amaps.iter().map(|(i, _)| *i).collect();
        let col_idx: Vec<usize> = bmaps.iter().map(|(j, _)| *j).collect();
        let wsub = w.select(nd::Axis(0), &row_idx).select(nd::Axis(1), &col_idx);
        let g = wsub.dot(&t)
            .into_shape((amaps.len(), self.lena(), self.lenb()))
            .map_err(|e| SectorError::Shape(e.to_string()))?;
        for (k, (_, map)) in amaps.iter().enumerate() {
            for e in map.iter() {
                out.row_mut(e.target)
                    .scaled_add(C64::from(e.sign), &g.slice(s![k, e.source, ..]));
            }
        }
        Ok(())
    }

    fn accumulate_block_sparse(
        &self,
        block: &ReducedBlock,
        tuples: &TupleSpaces,
        out: &mut nd::Array2<C64>,
    ) -> SectorResult<()>
    {
        let w = &block.weights;
        let rows = (0..w.nrows()).filter(|&i| !is_zero_row(w.row(i)));
        let cols = (0..w.ncols()).filter(|&j| !is_zero_row(w.column(j)));
        let amaps = self.tuple_maps(Spin::Alpha, tuples, block.ka, rows)?;
        let bmaps = self.tuple_maps(Spin::Beta, tuples, block.kb, cols)?;
        for (i, amap) in amaps.iter() {
            for (j, bmap) in bmaps.iter() {
                let wij = w[[*i, *j]];
                if wij.is_zero() { continue; }
                for ea in amap.iter() {
                    for eb in bmap.iter() {
                        out[[ea.target, eb.target]]
                            += wij * (ea.sign * eb.sign)
                            * self.coeff[[ea.source, eb.source]];
                    }
                }
            }
        }
        Ok(())
    }

    /* Specialized kernels ****************************************************/

    // returns `None` when no specialized kernel covers the operator
    fn apply_specialized(
        &self,
        tensors: &[Option<nd::ArrayD<C64>>],
        layout: Layout,
    ) -> SectorResult<Option<nd::Array2<C64>>>
    {
        let present: Vec<usize>
            = tensors.iter().enumerate()
            .filter_map(|(k, h)| h.as_ref().map(|_| k))
            .collect();
        let norb = self.norb();
        let as2 = |h: &nd::ArrayD<C64>| -> SectorResult<nd::Array2<C64>> {
            h.clone().into_dimensionality::<nd::Ix2>()
                .map_err(|e| SectorError::Shape(e.to_string()))
        };
        match (layout, present.as_slice()) {
            (Layout::Spatial, [0]) => {
                let Some(h) = &tensors[0] else { return Ok(None); };
                let h = as2(h)?;
                Ok(Some(self.apply_one_body(h.view(), h.view())))
            },
            (Layout::SpinOrbital(order), [0]) => {
                let Some(h) = &tensors[0] else { return Ok(None); };
                let h = as2(h)?;
                let block = |down: bool| {
                    nd::Array2::from_shape_fn((norb, norb), |(i, j)| {
                        h[[order.join(i, down, norb), order.join(j, down, norb)]]
                    })
                };
                let (ha, hb) = (block(false), block(true));
                Ok(Some(self.apply_one_body(ha.view(), hb.view())))
            },
            (Layout::Spatial, [1]) | (Layout::Spatial, [0, 1]) => {
                let size = self.lena() * self.lenb();
                if self.check_budget((2 * norb * norb).saturating_mul(size)).is_err() {
                    debug!("single-excitation intermediate exceeds budget; using generic kernels");
                    return Ok(None);
                }
                let h1 = match &tensors[0] {
                    Some(h) => as2(h)?,
                    None => nd::Array2::zeros((norb, norb)),
                };
                let Some(h2) = &tensors[1] else { return Ok(None); };
                let h2 = h2.clone().into_dimensionality::<nd::Ix4>()
                    .map_err(|e| SectorError::Shape(e.to_string()))?;
                self.apply_spatial_one_two(h1.view(), h2.view()).map(Some)
            },
            _ => Ok(None),
        }
    }

    // `sum_ij ha[i, j] E^alpha_ij + hb[i, j] E^beta_ij`
    fn apply_one_body(&self, ha: nd::ArrayView2<C64>, hb: nd::ArrayView2<C64>)
        -> nd::Array2<C64>
    {
        let norb = self.norb();
        let graph = self.graph();
        let pairs = |h: nd::ArrayView2<C64>| -> Vec<(usize, usize, C64)> {
            h.indexed_iter()
                .filter(|(_, w)| !w.is_zero())
                .map(|((i, j), w)| (i, j, *w))
                .collect()
        };
        let (pa, pb) = (pairs(ha), pairs(hb));
        let mut out: nd::Array2<C64> = nd::Array2::zeros(self.coeff.raw_dim());
        if norb == 0 { return out; }
        Zip::from(out.columns_mut())
            .and(self.coeff.columns())
            .par_for_each(|mut ocol, ccol| {
                for &(i, j, w) in pa.iter() {
                    for e in graph.single_map(Spin::Alpha, i, j).iter() {
                        ocol[e.target] += w * e.sign * ccol[e.source];
                    }
                }
            });
        Zip::from(out.rows_mut())
            .and(self.coeff.rows())
            .par_for_each(|mut orow, crow| {
                for &(i, j, w) in pb.iter() {
                    for e in graph.single_map(Spin::Beta, i, j).iter() {
                        orow[e.target] += w * e.sign * crow[e.source];
                    }
                }
            });
        out
    }

    /// Single excitations `dvec[i, j] = E_ij C` of a coefficient matrix, for
    /// the spin-summed `E_ij = a+_{i up} a_{j up} + a+_{i down} a_{j down}`.
    pub fn calculate_dvec(&self, coeff: &nd::Array2<C64>) -> nd::Array4<C64> {
        let norb = self.norb();
        let graph = self.graph();
        let mut dvec: nd::Array4<C64>
            = nd::Array4::zeros((norb, norb, self.lena(), self.lenb()));
        let orbs: nd::Array1<usize> = (0..norb).collect();
        Zip::from(dvec.outer_iter_mut())
            .and(&orbs)
            .par_for_each(|mut di, &i| {
                for (j, mut d) in di.outer_iter_mut().enumerate() {
                    for e in graph.single_map(Spin::Alpha, i, j).iter() {
                        d.row_mut(e.target)
                            .scaled_add(C64::from(e.sign), &coeff.row(e.source));
                    }
                    for e in graph.single_map(Spin::Beta, i, j).iter() {
                        d.column_mut(e.target)
                            .scaled_add(C64::from(e.sign), &coeff.column(e.source));
                    }
                }
            });
        dvec
    }

    /// Spin-resolved single excitations `(E^alpha_ij C, E^beta_ij C)` of the
    /// sector's amplitudes.
    pub fn calculate_dvec_spin(&self) -> (nd::Array4<C64>, nd::Array4<C64>) {
        let norb = self.norb();
        let shape = (norb, norb, self.lena(), self.lenb());
        let mut da: nd::Array4<C64> = nd::Array4::zeros(shape);
        let mut db: nd::Array4<C64> = nd::Array4::zeros(shape);
        for i in 0..norb {
            for j in 0..norb {
                let mut dij = da.slice_mut(s![i, j, .., ..]);
                for e in self.graph().single_map(Spin::Alpha, i, j).iter() {
                    dij.row_mut(e.target)
                        .scaled_add(C64::from(e.sign), &self.coeff.row(e.source));
                }
                let mut dij = db.slice_mut(s![i, j, .., ..]);
                for e in self.graph().single_map(Spin::Beta, i, j).iter() {
                    dij.column_mut(e.target)
                        .scaled_add(C64::from(e.sign), &self.coeff.column(e.source));
                }
            }
        }
        (da, db)
    }

    // spin-summed one- plus two-body operator via
    // `H = sum_il (h1 + sum_k h2[i,k,k,l]) E_il - sum_ijkl h2[ijkl] E_ik E_jl`
    fn apply_spatial_one_two(
        &self,
        h1: nd::ArrayView2<C64>,
        h2: nd::ArrayView4<C64>,
    ) -> SectorResult<nd::Array2<C64>>
    {
        let norb = self.norb();
        let (lena, lenb) = (self.lena(), self.lenb());
        let size = lena * lenb;
        // flattened below, so the layout must be row-major
        let mut h1p = h1.as_standard_layout().into_owned();
        for i in 0..norb {
            for l in 0..norb {
                h1p[[i, l]] += (0..norb).map(|k| h2[[i, k, k, l]]).sum::<C64>();
            }
        }
        let dvec = self.calculate_dvec(&self.coeff)
            .into_shape((norb * norb, size))
            .map_err(|e| SectorError::Shape(e.to_string()))?;
        let h1p = h1p.into_shape(norb * norb)
            .map_err(|e| SectorError::Shape(e.to_string()))?;
        let mut out = h1p.dot(&dvec).into_shape((lena, lenb))
            .map_err(|e| SectorError::Shape(e.to_string()))?;
        // M[(i, k), (j, l)] = h2[i, j, k, l]
        let m = h2.permuted_axes([0, 2, 1, 3])
            .as_standard_layout()
            .into_owned()
            .into_shape((norb * norb, norb * norb))
            .map_err(|e| SectorError::Shape(e.to_string()))?;
        let g = m.dot(&dvec).into_shape((norb * norb, lena, lenb))
            .map_err(|e| SectorError::Shape(e.to_string()))?;
        for (ik, gik) in g.outer_iter().enumerate() {
            let (i, k) = (ik / norb, ik % norb);
            accumulate_single(self, i, k, -C64::from(1.0), gik, &mut out);
        }
        Ok(out)
    }

    /* Diagonal operators *****************************************************/

    // per-rank sums of diagonal elements over occupied orbitals
    pub(crate) fn diagonal_sums(&self, ha: &[C64], hb: &[C64])
        -> (nd::Array1<C64>, nd::Array1<C64>)
    {
        let graph = self.graph();
        let fa: nd::Array1<C64>
            = (0..self.lena())
            .map(|a| graph.occupied_alpha(a).into_iter().map(|p| ha[p]).sum::<C64>())
            .collect();
        let fb: nd::Array1<C64>
            = (0..self.lenb())
            .map(|b| graph.occupied_beta(b).into_iter().map(|p| hb[p]).sum::<C64>())
            .collect();
        (fa, fb)
    }

    // split `2 norb` spin-orbital values into alpha and beta parts following
    // `Settings::spin_order`
    pub(crate) fn split_spin_orbital(&self, h: &nd::Array1<C64>)
        -> (Vec<C64>, Vec<C64>)
    {
        let norb = self.norb();
        let order = self.settings().spin_order;
        let part = |down: bool| -> Vec<C64> {
            (0..norb).map(|p| h[order.join(p, down, norb)]).collect()
        };
        (part(false), part(true))
    }

    /// Multiply each amplitude by the sum of `h` over its occupied
    /// spin-orbitals, where `h` holds `2 norb` values ordered as
    /// [`Settings::spin_order`][crate::config::Settings::spin_order].
    pub fn apply_diagonal_inplace(&mut self, h: &nd::Array1<C64>)
        -> SectorResult<()>
    {
        let norb = self.norb();
        if h.len() != 2 * norb {
            return Err(SectorError::dimension(format!("{}", 2 * norb), h.len()));
        }
        let (ha, hb) = self.split_spin_orbital(h);
        let (fa, fb) = self.diagonal_sums(&ha, &hb);
        Zip::from(self.coeff.rows_mut())
            .and(&fa)
            .par_for_each(|mut row, &a| {
                row.iter_mut().zip(fb.iter())
                    .for_each(|(c, &b)| { *c *= a + b; });
            });
        Ok(())
    }

    /// Like [`Self::apply_diagonal_inplace`], returning a new sector.
    pub fn apply_diagonal(&self, h: &nd::Array1<C64>) -> SectorResult<Self> {
        let mut out = self.clone();
        out.apply_diagonal_inplace(h)?;
        Ok(out)
    }

    // `sum_i diag_i n_i + sum_ij vij n_i n_j` for every configuration, with
    // spin-summed occupations
    pub(crate) fn diagonal_coulomb_values(
        &self,
        diag: &nd::Array1<C64>,
        vij: &nd::Array2<C64>,
    ) -> SectorResult<nd::Array2<C64>>
    {
        let norb = self.norb();
        if diag.len() != norb {
            return Err(SectorError::dimension(format!("{norb}"), diag.len()));
        }
        if vij.shape() != [norb, norb] {
            return Err(SectorError::Shape(format!(
                "expected a {norb} x {norb} interaction, got {:?}", vij.shape())));
        }
        let graph = self.graph();
        let occ = |string: Option<u64>| -> Vec<f64> {
            let s = string.unwrap_or(0);
            (0..norb).map(|p| ((s >> p) & 1) as f64).collect()
        };
        let occ_a: Vec<Vec<f64>> = (0..self.lena()).map(|a| occ(graph.string_alpha(a))).collect();
        let occ_b: Vec<Vec<f64>> = (0..self.lenb()).map(|b| occ(graph.string_beta(b))).collect();
        let mut values: nd::Array2<C64> = nd::Array2::zeros(self.coeff.raw_dim());
        let ranks: nd::Array1<usize> = (0..self.lena()).collect();
        Zip::from(values.rows_mut())
            .and(&ranks)
            .par_for_each(|mut row, &a| {
                for (b, v) in row.iter_mut().enumerate() {
                    let n: Vec<f64>
                        = occ_a[a].iter().zip(occ_b[b].iter())
                        .map(|(x, y)| x + y)
                        .collect();
                    let mut acc = C64::zero();
                    for i in 0..norb {
                        if n[i] == 0.0 { continue; }
                        acc += diag[i] * n[i];
                        for j in 0..norb {
                            if n[j] == 0.0 { continue; }
                            acc += vij[[i, j]] * (n[i] * n[j]);
                        }
                    }
                    *v = acc;
                }
            });
        Ok(values)
    }

    /// Multiply each amplitude by `sum_i diag_i n_i + sum_ij vij_ij n_i n_j`,
    /// where `n_i` counts the electrons of both spins in orbital `i`.
    pub fn apply_diagonal_coulomb_inplace(
        &mut self,
        diag: &nd::Array1<C64>,
        vij: &nd::Array2<C64>,
    ) -> SectorResult<()>
    {
        let values = self.diagonal_coulomb_values(diag, vij)?;
        self.coeff *= &values;
        Ok(())
    }

    /// Like [`Self::apply_diagonal_coulomb_inplace`], returning a new sector.
    pub fn apply_diagonal_coulomb(
        &self,
        diag: &nd::Array1<C64>,
        vij: &nd::Array2<C64>,
    ) -> SectorResult<Self>
    {
        let values = self.diagonal_coulomb_values(diag, vij)?;
        Ok(self.with_coeff(&self.coeff * &values))
    }

    /* Individual operator strings ********************************************/

    /// `self += coeff * (a+_{daga} a_{undaga}) (a+_{dagb} a_{undagb}) source`,
    /// with the alpha string acting on alpha orbitals and the beta string on
    /// beta orbitals.
    ///
    /// Operator strings annihilating every configuration are a no-op. Fails
    /// if `source` belongs to another sector, or if a string has unequal
    /// creation and annihilation counts or names an orbital outside the
    /// sector.
    pub fn apply_individual_nbody_accumulate(
        &mut self,
        coeff: C64,
        source: &Self,
        daga: &[usize],
        undaga: &[usize],
        dagb: &[usize],
        undagb: &[usize],
    ) -> SectorResult<()>
    {
        self.check_compatible(source)?;
        let amap = self.graph().excitation_map(Spin::Alpha, daga, undaga)?;
        let bmap = self.graph().excitation_map(Spin::Beta, dagb, undagb)?;
        for ea in amap.iter() {
            for eb in bmap.iter() {
                self.coeff[[ea.target, eb.target]]
                    += coeff * (ea.sign * eb.sign)
                    * source.coeff[[ea.source, eb.source]];
            }
        }
        Ok(())
    }

    /// Apply `coeff * (a+_{daga} a_{undaga}) (a+_{dagb} a_{undagb})`,
    /// returning a new sector.
    pub fn apply_individual_nbody(
        &self,
        coeff: C64,
        daga: &[usize],
        undaga: &[usize],
        dagb: &[usize],
        undagb: &[usize],
    ) -> SectorResult<Self>
    {
        let mut out = self.empty_copy();
        out.apply_individual_nbody_accumulate(
            coeff, self, daga, undaga, dagb, undagb)?;
        Ok(out)
    }

    /// For each alpha column `i` of `ua` and then each beta column `i` of
    /// `ub`, update `C <- C + sum_p U[p, i] a+_p a_i C` on that species, each
    /// update acting on the result of the previous one.
    pub fn apply_columns_recursive_inplace(
        &mut self,
        ua: &nd::Array2<C64>,
        ub: &nd::Array2<C64>,
    ) -> SectorResult<()>
    {
        let norb = self.norb();
        for u in [ua, ub] {
            if u.shape() != [norb, norb] {
                return Err(SectorError::Shape(format!(
                    "expected a {norb} x {norb} column matrix, got {:?}",
                    u.shape())));
            }
        }
        let graph = self.graph().clone();
        for i in 0..norb {
            let mut delta: nd::Array2<C64> = nd::Array2::zeros(self.coeff.raw_dim());
            for p in 0..norb {
                let w = ua[[p, i]];
                if w.is_zero() { continue; }
                for e in graph.single_map(Spin::Alpha, p, i).iter() {
                    delta.row_mut(e.target)
                        .scaled_add(w * e.sign, &self.coeff.row(e.source));
                }
            }
            self.coeff += &delta;
        }
        for i in 0..norb {
            let mut delta: nd::Array2<C64> = nd::Array2::zeros(self.coeff.raw_dim());
            for p in 0..norb {
                let w = ub[[p, i]];
                if w.is_zero() { continue; }
                for e in graph.single_map(Spin::Beta, p, i).iter() {
                    delta.column_mut(e.target)
                        .scaled_add(w * e.sign, &self.coeff.column(e.source));
                }
            }
            self.coeff += &delta;
        }
        Ok(())
    }

    /// Apply the total spin-squared operator
    /// `S^2 = S_z (S_z + 1) + N_beta - sum_ij E^alpha_ij E^beta_ji` in place.
    pub fn apply_inplace_s2(&mut self) {
        let norb = self.norb();
        let sz = self.sz2() as f64 / 2.0;
        let diag = sz + sz * sz + self.nbeta() as f64;
        let graph = self.graph().clone();
        let mut out = &self.coeff * C64::from(diag);
        for i in 0..norb {
            for j in 0..norb {
                let amap = graph.single_map(Spin::Alpha, i, j);
                let bmap = graph.single_map(Spin::Beta, j, i);
                for ea in amap.iter() {
                    for eb in bmap.iter() {
                        out[[ea.target, eb.target]]
                            -= self.coeff[[ea.source, eb.source]] * (ea.sign * eb.sign);
                    }
                }
            }
        }
        self.coeff = out;
    }

    /// Apply a Hamiltonian, including its constant energy shift, returning a
    /// new sector.
    pub fn apply_hamiltonian<H>(&self, hamiltonian: &H) -> SectorResult<Self>
    where H: Hamiltonian + ?Sized
    {
        let tensors = hamiltonian.tensors();
        let e_0 = hamiltonian.e_0();
        let mut out = if tensors.iter().any(|h| h.is_some()) {
            self.apply(tensors)?
        } else {
            self.empty_copy()
        };
        if !e_0.is_zero() { out.coeff.scaled_add(e_0, &self.coeff); }
        Ok(out)
    }
}
