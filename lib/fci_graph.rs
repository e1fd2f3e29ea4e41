//! The configuration index of a fixed-particle, fixed-spin sector.
//!
//! An [`FciGraph`] enumerates the alpha and beta occupation strings of a
//! sector, ranks them, and hands out excitation maps over them. It is
//! immutable apart from its excitation map cache and is meant to be shared
//! between state containers behind an [`Arc`].

use std::sync::Arc;
use log::debug;
use crate::{
    bitstring::{ MAX_ORBITALS, StringSpace, integer_index },
    config::DEF_MAP_CACHE_CAPACITY,
    error::{ SectorError, SectorResult },
    excitation::{ ExcitationMap, MapCache, Spin, signature_id },
};

/// Configuration index for `nalpha` up and `nbeta` down electrons in `norb`
/// spatial orbitals.
///
/// Strings of both species are ranked in ascending integer order, so equal
/// parameters always produce equal rank assignments.
#[derive(Debug)]
pub struct FciGraph {
    nalpha: usize,
    nbeta: usize,
    norb: usize,
    alpha: StringSpace,
    beta: StringSpace,
    // single excitations, indexed by `i * norb + j` for `a+_i a_j`
    singles_alpha: Vec<Arc<ExcitationMap>>,
    singles_beta: Vec<Arc<ExcitationMap>>,
    cache: MapCache,
}

impl FciGraph {
    /// Build the index with the default excitation map cache capacity.
    ///
    /// Fails if either electron count exceeds `norb` or if `norb` exceeds the
    /// width of a string.
    pub fn new(nalpha: usize, nbeta: usize, norb: usize) -> SectorResult<Self> {
        Self::with_cache_capacity(nalpha, nbeta, norb, DEF_MAP_CACHE_CAPACITY)
    }

    /// Build the index, retaining at most `capacity` cached multi-orbital
    /// excitation maps. Single excitations are always built eagerly and kept.
    pub fn with_cache_capacity(
        nalpha: usize,
        nbeta: usize,
        norb: usize,
        capacity: usize,
    ) -> SectorResult<Self>
    {
        if norb > MAX_ORBITALS {
            return Err(SectorError::Construction(format!(
                "{norb} orbitals exceeds the maximum of {MAX_ORBITALS}")));
        }
        if nalpha > norb || nbeta > norb {
            return Err(SectorError::Construction(format!(
                "cannot place {nalpha} alpha and {nbeta} beta electrons in \
                {norb} orbitals")));
        }
        let alpha = StringSpace::new(norb, nalpha);
        let beta = StringSpace::new(norb, nbeta);
        let singles = |space: &StringSpace| -> Vec<Arc<ExcitationMap>> {
            (0..norb * norb)
                .map(|ij| {
                    let (i, j) = (ij / norb, ij % norb);
                    Arc::new(ExcitationMap::build(space, &[i], &[j]))
                })
                .collect()
        };
        let singles_alpha = singles(&alpha);
        let singles_beta = singles(&beta);
        debug!(
            "built configuration index ({nalpha}, {nbeta}, {norb}) with {} x {} \
            strings",
            alpha.len(), beta.len(),
        );
        Ok(Self {
            nalpha,
            nbeta,
            norb,
            alpha,
            beta,
            singles_alpha,
            singles_beta,
            cache: MapCache::new(capacity),
        })
    }

    pub fn nalpha(&self) -> usize { self.nalpha }

    pub fn nbeta(&self) -> usize { self.nbeta }

    pub fn norb(&self) -> usize { self.norb }

    /// Number of alpha strings.
    pub fn lena(&self) -> usize { self.alpha.len() }

    /// Number of beta strings.
    pub fn lenb(&self) -> usize { self.beta.len() }

    /// Return `true` if `self` indexes the sector `(nalpha, nbeta, norb)`.
    pub fn matches(&self, nalpha: usize, nbeta: usize, norb: usize) -> bool {
        self.nalpha == nalpha && self.nbeta == nbeta && self.norb == norb
    }

    /// Strings of a given species.
    pub fn space(&self, spin: Spin) -> &StringSpace {
        match spin {
            Spin::Alpha => &self.alpha,
            Spin::Beta => &self.beta,
        }
    }

    /// Get the alpha string with a given rank.
    pub fn string_alpha(&self, rank: usize) -> Option<u64> {
        self.alpha.string(rank)
    }

    /// Get the beta string with a given rank.
    pub fn string_beta(&self, rank: usize) -> Option<u64> {
        self.beta.string(rank)
    }

    /// Get the rank of an alpha string.
    pub fn index_alpha(&self, string: u64) -> Option<usize> {
        self.alpha.rank(string)
    }

    /// Get the rank of a beta string.
    pub fn index_beta(&self, string: u64) -> Option<usize> {
        self.beta.rank(string)
    }

    /// Occupied orbitals of the alpha string with a given rank.
    pub fn occupied_alpha(&self, rank: usize) -> Vec<usize> {
        self.alpha.string(rank).map(integer_index).unwrap_or_default()
    }

    /// Occupied orbitals of the beta string with a given rank.
    pub fn occupied_beta(&self, rank: usize) -> Vec<usize> {
        self.beta.string(rank).map(integer_index).unwrap_or_default()
    }

    /// Get the map for `a+_i a_j` on one species.
    ///
    /// *Panics* if `i` or `j` is not less than `norb`.
    pub fn single_map(&self, spin: Spin, i: usize, j: usize)
        -> &Arc<ExcitationMap>
    {
        match spin {
            Spin::Alpha => &self.singles_alpha[i * self.norb + j],
            Spin::Beta => &self.singles_beta[i * self.norb + j],
        }
    }

    /// Get the map for `a+_{dag[0]} ... a+_{dag[k-1]} a_{undag[0]} ...
    /// a_{undag[k-1]}` on one species, building and caching it if needed.
    ///
    /// Fails if the lists differ in length or name an orbital outside the
    /// sector.
    pub fn excitation_map(&self, spin: Spin, dag: &[usize], undag: &[usize])
        -> SectorResult<Arc<ExcitationMap>>
    {
        if dag.len() != undag.len() {
            return Err(SectorError::Shape(format!(
                "operator string has {} creation and {} annihilation orbitals",
                dag.len(), undag.len())));
        }
        if let Some(&p) = dag.iter().chain(undag).find(|&&p| p >= self.norb) {
            return Err(SectorError::Shape(format!(
                "orbital {p} out of range for {} orbitals", self.norb)));
        }
        if dag.len() == 1 {
            return Ok(self.single_map(spin, dag[0], undag[0]).clone());
        }
        let space = self.space(spin);
        let build = || ExcitationMap::build(space, dag, undag);
        match signature_id(spin, dag, undag) {
            Some(id) => Ok(self.cache.get_or_insert_with(id, build)),
            None => Ok(Arc::new(build())),
        }
    }

    /// Number of excitation maps currently held in the cache (excluding
    /// single excitations).
    pub fn cached_maps(&self) -> usize { self.cache.len() }

    /// Maximum number of cached excitation maps.
    pub fn cache_capacity(&self) -> usize { self.cache.capacity() }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::bitstring::binomial;

    #[test]
    fn dimensions() {
        for (na, nb, norb) in [(0, 0, 0), (1, 1, 2), (2, 1, 3), (3, 2, 6), (0, 4, 4)] {
            let graph = FciGraph::new(na, nb, norb).unwrap();
            assert_eq!(graph.lena(), binomial(norb, na));
            assert_eq!(graph.lenb(), binomial(norb, nb));
            assert!(graph.matches(na, nb, norb));
        }
        let vacuum = FciGraph::new(0, 0, 3).unwrap();
        assert_eq!((vacuum.lena(), vacuum.lenb()), (1, 1));
    }

    #[test]
    fn invalid_construction() {
        assert!(matches!(FciGraph::new(3, 1, 2), Err(SectorError::Construction(_))));
        assert!(matches!(FciGraph::new(1, 3, 2), Err(SectorError::Construction(_))));
        assert!(matches!(FciGraph::new(1, 1, 64), Err(SectorError::Construction(_))));
    }

    #[test]
    fn string_lookup() {
        let graph = FciGraph::new(2, 1, 3).unwrap();
        assert_eq!(graph.string_alpha(0), Some(0b011));
        assert_eq!(graph.string_alpha(1), Some(0b101));
        assert_eq!(graph.string_alpha(2), Some(0b110));
        assert_eq!(graph.string_beta(2), Some(0b100));
        assert_eq!(graph.index_alpha(0b110), Some(2));
        assert_eq!(graph.index_beta(0b010), Some(1));
        assert_eq!(graph.index_beta(0b011), None);
        assert_eq!(graph.occupied_alpha(1), vec![0, 2]);
        assert_eq!(graph.occupied_beta(0), vec![0]);
    }

    #[test]
    fn identical_parameters_identical_ranks() {
        let a = FciGraph::new(3, 2, 6).unwrap();
        let b = FciGraph::new(3, 2, 6).unwrap();
        for rank in 0..a.lena() {
            assert_eq!(a.string_alpha(rank), b.string_alpha(rank));
        }
        for rank in 0..a.lenb() {
            assert_eq!(a.string_beta(rank), b.string_beta(rank));
        }
    }

    #[test]
    fn excitation_maps() {
        let graph = FciGraph::with_cache_capacity(2, 2, 4, 4).unwrap();
        let single = graph.excitation_map(Spin::Alpha, &[2], &[0]).unwrap();
        assert_eq!(single.len(), 2);
        assert_eq!(graph.cached_maps(), 0);

        let double = graph.excitation_map(Spin::Beta, &[2, 3], &[1, 0]).unwrap();
        assert_eq!(double.len(), 1);
        assert_eq!(double.entries()[0].source, 0);
        assert_eq!(double.entries()[0].target, 5);
        assert_eq!(graph.cached_maps(), 1);
        let again = graph.excitation_map(Spin::Beta, &[2, 3], &[1, 0]).unwrap();
        assert!(Arc::ptr_eq(&double, &again));

        let empty = graph.excitation_map(Spin::Alpha, &[0, 1, 2], &[0, 1, 2]).unwrap();
        assert!(empty.is_empty());

        let identity = graph.excitation_map(Spin::Alpha, &[], &[]).unwrap();
        assert_eq!(identity.len(), graph.lena());
    }

    #[test]
    fn invalid_signatures() {
        let graph = FciGraph::new(1, 1, 3).unwrap();
        assert!(matches!(
            graph.excitation_map(Spin::Alpha, &[0, 1], &[0]),
            Err(SectorError::Shape(_)),
        ));
        assert!(matches!(
            graph.excitation_map(Spin::Beta, &[3], &[0]),
            Err(SectorError::Shape(_)),
        ));
    }
}
