//! Dense amplitude storage for a single fixed-particle, fixed-spin sector.
//!
//! A [`Sector`] holds the amplitudes `coeff[a][b]` of all configurations with
//! alpha string of rank `a` and beta string of rank `b`, where the amplitude
//! multiplies
//! ```text
//! (prod_{p in a, ascending} a+_{p, up}) (prod_{p in b, ascending} a+_{p, down}) |vac>
//! ```
//! Operator application, time evolution, and reduced density matrices are
//! implemented in the submodules as further methods on [`Sector`].

use std::sync::Arc;
use ndarray as nd;
use num_complex::Complex64 as C64;
use num_traits::Zero;
use rand::{ prelude as rnd, Rng };
use crate::{
    bitstring::binomial,
    config::Settings,
    error::{ SectorError, SectorResult },
    fci_graph::FciGraph,
};

pub mod apply;
pub mod evolve;
pub mod rdm;
pub mod display;

/// Contraction strategy for operator application and density matrices.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Contraction {
    /// Build excitation-applied intermediates for every active orbital tuple
    /// pair and contract them with matrix products.
    Dense,
    /// Enumerate non-empty excitation map pairs directly.
    Sparse,
}

/// Initialization strategy for [`Sector::set_wfn`].
#[derive(Clone, Debug, PartialEq)]
pub enum InitStrategy {
    /// Every amplitude set to 1.
    Ones,
    /// Every amplitude set to 0.
    Zero,
    /// The first configuration (rank `(0, 0)`) set to 1, all others to 0.
    HartreeFock,
    /// Amplitudes copied from a matrix of shape `(lena, lenb)`.
    FromData(nd::Array2<C64>),
    /// Real and imaginary parts drawn uniformly from `[-1, 1)`.
    Random,
}

impl InitStrategy {
    /// Parse a strategy by name, attaching raw data where the strategy
    /// requires it.
    ///
    /// Recognized names are `ones`, `zero`, `hartree-fock`, `from_data`, and
    /// `random`. Data must be supplied for `from_data` and only for
    /// `from_data`.
    pub fn from_name(name: &str, data: Option<nd::Array2<C64>>)
        -> SectorResult<Self>
    {
        match (name, data) {
            ("from_data", Some(data)) => Ok(Self::FromData(data)),
            ("from_data", None) => Err(SectorError::Strategy(
                "no data supplied for strategy 'from_data'".into())),
            (name, Some(_))
                if matches!(name, "ones" | "zero" | "hartree-fock" | "random")
            => Err(SectorError::Strategy(format!(
                "data supplied for strategy '{name}', which does not take data"))),
            ("ones", None) => Ok(Self::Ones),
            ("zero", None) => Ok(Self::Zero),
            ("hartree-fock", None) => Ok(Self::HartreeFock),
            ("random", None) => Ok(Self::Random),
            (name, _) => Err(SectorError::Strategy(format!(
                "unknown initialization strategy '{name}'"))),
        }
    }
}

/// Amplitudes of a state with fixed alpha and beta electron counts.
///
/// Cloning shares the configuration index and copies the amplitudes.
#[derive(Clone, Debug)]
pub struct Sector {
    graph: Arc<FciGraph>,
    settings: Settings,
    coeff: nd::Array2<C64>,
}

impl Sector {
    /// Create an all-zero sector with default settings.
    pub fn new(nalpha: usize, nbeta: usize, norb: usize) -> SectorResult<Self> {
        Self::with_settings(nalpha, nbeta, norb, Settings::default())
    }

    /// Create an all-zero sector.
    ///
    /// Fails if the electron counts do not fit in `norb` orbitals or if the
    /// number of amplitudes exceeds [`Settings::max_elements`].
    pub fn with_settings(
        nalpha: usize,
        nbeta: usize,
        norb: usize,
        settings: Settings,
    ) -> SectorResult<Self>
    {
        if nalpha <= norb && nbeta <= norb {
            let elements
                = binomial(norb, nalpha).saturating_mul(binomial(norb, nbeta));
            if elements > settings.max_elements {
                return Err(SectorError::Resource(elements, settings.max_elements));
            }
        }
        let graph = FciGraph::with_cache_capacity(
            nalpha, nbeta, norb, settings.map_cache_capacity)?;
        Self::from_graph(Arc::new(graph), settings)
    }

    /// Create an all-zero sector on an existing configuration index, which
    /// must index `(nalpha, nbeta, norb)`.
    pub fn with_graph(
        nalpha: usize,
        nbeta: usize,
        norb: usize,
        graph: Arc<FciGraph>,
    ) -> SectorResult<Self>
    {
        if !graph.matches(nalpha, nbeta, norb) {
            return Err(SectorError::Construction(format!(
                "configuration index for ({}, {}, {}) does not match \
                ({nalpha}, {nbeta}, {norb})",
                graph.nalpha(), graph.nbeta(), graph.norb())));
        }
        Self::from_graph(graph, Settings::default())
    }

    /// Create an all-zero sector on an existing configuration index.
    pub fn from_graph(graph: Arc<FciGraph>, settings: Settings)
        -> SectorResult<Self>
    {
        let elements = graph.lena().saturating_mul(graph.lenb());
        if elements > settings.max_elements {
            return Err(SectorError::Resource(elements, settings.max_elements));
        }
        let coeff = nd::Array2::zeros((graph.lena(), graph.lenb()));
        Ok(Self { graph, settings, coeff })
    }

    /// Create an all-zero sector sharing the configuration index and settings
    /// of `self`.
    pub fn empty_copy(&self) -> Self {
        Self {
            graph: self.graph.clone(),
            settings: self.settings,
            coeff: nd::Array2::zeros(self.coeff.raw_dim()),
        }
    }

    // new sector sharing index and settings with different amplitudes; the
    // shape must already agree
    pub(crate) fn with_coeff(&self, coeff: nd::Array2<C64>) -> Self {
        Self { graph: self.graph.clone(), settings: self.settings, coeff }
    }

    pub fn nalpha(&self) -> usize { self.graph.nalpha() }

    pub fn nbeta(&self) -> usize { self.graph.nbeta() }

    pub fn norb(&self) -> usize { self.graph.norb() }

    /// Total number of electrons.
    pub fn n_electrons(&self) -> usize { self.nalpha() + self.nbeta() }

    /// Twice the spin projection, `nalpha - nbeta`.
    pub fn sz2(&self) -> isize { self.nalpha() as isize - self.nbeta() as isize }

    pub fn lena(&self) -> usize { self.graph.lena() }

    pub fn lenb(&self) -> usize { self.graph.lenb() }

    pub fn graph(&self) -> &Arc<FciGraph> { &self.graph }

    pub fn settings(&self) -> &Settings { &self.settings }

    /// Amplitudes, indexed by `[alpha rank, beta rank]`.
    pub fn coeff(&self) -> &nd::Array2<C64> { &self.coeff }

    /// Mutable view of the amplitudes. The shape is fixed.
    pub fn coeff_mut(&mut self) -> nd::ArrayViewMut2<'_, C64> {
        self.coeff.view_mut()
    }

    /// Return `true` if `other` describes the same sector.
    pub fn is_compatible(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.graph, &other.graph)
            || other.graph.matches(self.nalpha(), self.nbeta(), self.norb())
    }

    pub(crate) fn check_compatible(&self, other: &Self) -> SectorResult<()> {
        if self.is_compatible(other) {
            Ok(())
        } else {
            Err(SectorError::Shape(format!(
                "sectors ({}, {}, {}) and ({}, {}, {}) are incompatible",
                self.nalpha(), self.nbeta(), self.norb(),
                other.nalpha(), other.nbeta(), other.norb())))
        }
    }

    /// Contraction strategy selected by the filling of the sector and
    /// [`Settings::low_filling_threshold`].
    pub fn contraction(&self) -> Contraction {
        if self.settings.is_low_filling(self.nalpha(), self.nbeta(), self.norb()) {
            Contraction::Sparse
        } else {
            Contraction::Dense
        }
    }

    pub(crate) fn check_budget(&self, elements: usize) -> SectorResult<()> {
        if elements > self.settings.max_elements {
            Err(SectorError::Resource(elements, self.settings.max_elements))
        } else {
            Ok(())
        }
    }

    /* Initialization *********************************************************/

    /// Set every amplitude to `value`.
    pub fn fill(&mut self, value: C64) { self.coeff.fill(value); }

    /// Initialize the amplitudes.
    ///
    /// Fails if [`InitStrategy::FromData`] carries a matrix of the wrong
    /// shape.
    pub fn set_wfn(&mut self, strategy: InitStrategy) -> SectorResult<()> {
        match strategy {
            InitStrategy::Ones => { self.fill(C64::from(1.0)); },
            InitStrategy::Zero => { self.fill(C64::zero()); },
            InitStrategy::HartreeFock => {
                self.fill(C64::zero());
                self.coeff[[0, 0]] = C64::from(1.0);
            },
            InitStrategy::FromData(data) => {
                if data.shape() != self.coeff.shape() {
                    return Err(SectorError::Shape(format!(
                        "data of shape {:?} cannot initialize a sector of \
                        shape {:?}",
                        data.shape(), self.coeff.shape())));
                }
                self.coeff.assign(&data);
            },
            InitStrategy::Random => {
                let mut rng = rnd::thread_rng();
                self.set_wfn_random_with(&mut rng);
            },
        }
        Ok(())
    }

    /// Initialize the amplitudes from a strategy name; see
    /// [`InitStrategy::from_name`].
    pub fn set_wfn_named(&mut self, name: &str, data: Option<nd::Array2<C64>>)
        -> SectorResult<()>
    {
        self.set_wfn(InitStrategy::from_name(name, data)?)
    }

    /// Fill with uniformly random amplitudes drawn from a given generator.
    pub fn set_wfn_random_with<R>(&mut self, rng: &mut R)
    where R: Rng
    {
        self.coeff.iter_mut()
            .for_each(|c| {
                *c = C64::new(rng.gen_range(-1.0..1.0), rng.gen_range(-1.0..1.0));
            });
    }

    /* Arithmetic *************************************************************/

    /// Multiply every amplitude by `z`.
    pub fn scale(&mut self, z: C64) { self.coeff *= z; }

    /// Frobenius norm of the amplitudes.
    pub fn norm(&self) -> f64 {
        self.coeff.iter().map(|c| c.norm_sqr()).sum::<f64>().sqrt()
    }

    /// Scale to unit norm. A zero state is left unchanged.
    pub fn normalize(&mut self) {
        let norm = self.norm();
        if norm > 0.0 { self.scale(C64::from(norm.recip())); }
    }

    /// Complex-conjugate every amplitude.
    pub fn conj(&mut self) { self.coeff.mapv_inplace(|c| c.conj()); }

    /// Return a copy of the amplitudes with the beta rank order reversed.
    pub fn beta_inversion(&self) -> nd::Array2<C64> {
        self.coeff.slice(nd::s![.., ..;-1]).to_owned()
    }

    /// `self += a * x`.
    pub fn ax_plus_y(&mut self, a: C64, x: &Self) -> SectorResult<()> {
        self.check_compatible(x)?;
        self.coeff.scaled_add(a, &x.coeff);
        Ok(())
    }

    /// Inner product `<self|other>`, conjugating `self`.
    pub fn vdot(&self, other: &Self) -> SectorResult<C64> {
        self.check_compatible(other)?;
        Ok(
            self.coeff.iter().zip(other.coeff.iter())
                .map(|(a, b)| a.conj() * b)
                .sum()
        )
    }

    /* Element access *********************************************************/

    fn ranks_of(&self, alpha: u64, beta: u64) -> SectorResult<(usize, usize)> {
        let a = self.graph.index_alpha(alpha);
        let b = self.graph.index_beta(beta);
        match (a, b) {
            (Some(a), Some(b)) => Ok((a, b)),
            _ => Err(SectorError::Shape(format!(
                "configuration {alpha:b}:{beta:b} is not in the sector"))),
        }
    }

    /// Amplitude of the configuration with the given alpha and beta strings.
    pub fn get_element(&self, alpha: u64, beta: u64) -> SectorResult<C64> {
        let (a, b) = self.ranks_of(alpha, beta)?;
        Ok(self.coeff[[a, b]])
    }

    /// Set the amplitude of the configuration with the given alpha and beta
    /// strings.
    pub fn set_element(&mut self, alpha: u64, beta: u64, value: C64)
        -> SectorResult<()>
    {
        let (a, b) = self.ranks_of(alpha, beta)?;
        self.coeff[[a, b]] = value;
        Ok(())
    }

    /// Iterate over `(alpha rank, beta rank, amplitude)` in rank order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, usize, C64)> + '_ {
        self.coeff.indexed_iter().map(|((a, b), &c)| (a, b, c))
    }

    /// Iterate over `(alpha string, beta string, amplitude)` in rank order.
    pub fn iter_strings(&self) -> impl Iterator<Item = (u64, u64, C64)> + '_ {
        let graph = &self.graph;
        self.iter()
            .filter_map(move |(a, b, c)| {
                Some((graph.string_alpha(a)?, graph.string_beta(b)?, c))
            })
    }
}

#[cfg(test)]
pub(crate) mod testing;

#[cfg(test)]
mod test {
    use super::*;
    use approx::assert_abs_diff_eq;
    use rand::{ SeedableRng, rngs::StdRng };

    fn c(re: f64, im: f64) -> C64 { C64::new(re, im) }

    #[test]
    fn construction() {
        let sector = Sector::new(2, 1, 3).unwrap();
        assert_eq!((sector.lena(), sector.lenb()), (3, 3));
        assert_eq!(sector.coeff().shape(), &[3, 3]);
        assert_eq!(sector.n_electrons(), 3);
        assert_eq!(sector.sz2(), 1);
        assert!(sector.coeff().iter().all(|c| *c == C64::zero()));

        let vacuum = Sector::new(0, 0, 4).unwrap();
        assert_eq!(vacuum.coeff().shape(), &[1, 1]);

        assert!(matches!(Sector::new(3, 1, 2), Err(SectorError::Construction(_))));
    }

    #[test]
    fn shared_graph() {
        let graph = Arc::new(FciGraph::new(2, 4, 10).unwrap());
        let sector = Sector::with_graph(2, 4, 10, graph.clone()).unwrap();
        assert!(Arc::ptr_eq(sector.graph(), &graph));
        assert!(matches!(
            Sector::with_graph(1, 4, 10, graph.clone()),
            Err(SectorError::Construction(_)),
        ));
        let small = Arc::new(FciGraph::new(1, 1, 2).unwrap());
        assert!(matches!(
            Sector::with_graph(1, 1, 3, small),
            Err(SectorError::Construction(_)),
        ));
    }

    #[test]
    fn resource_limit() {
        let settings = Settings::default().with_max_elements(100);
        assert!(matches!(
            Sector::with_settings(3, 3, 8, settings),
            Err(SectorError::Resource(3136, 100)),
        ));
        assert!(Sector::with_settings(1, 1, 8, settings).is_ok());
    }

    #[test]
    fn strategies() {
        let mut sector = Sector::new(1, 1, 2).unwrap();
        sector.set_wfn(InitStrategy::Ones).unwrap();
        assert!(sector.coeff().iter().all(|c| *c == c64_one()));
        sector.set_wfn(InitStrategy::Zero).unwrap();
        assert!(sector.coeff().iter().all(|c| *c == C64::zero()));
        sector.set_wfn(InitStrategy::HartreeFock).unwrap();
        assert_eq!(sector.coeff()[[0, 0]], c64_one());
        assert_eq!(sector.norm(), 1.0);

        let data = nd::array![[c(1.0, 2.0), c(0.0, 1.0)], [c(-1.0, 0.0), c(0.5, 0.5)]];
        sector.set_wfn(InitStrategy::FromData(data.clone())).unwrap();
        assert_eq!(sector.coeff(), &data);

        sector.set_wfn(InitStrategy::Random).unwrap();
        assert!(sector.coeff().iter().all(|c| c.re.abs() <= 1.0 && c.im.abs() <= 1.0));
        assert!(sector.norm() > 0.0);
    }

    fn c64_one() -> C64 { C64::from(1.0) }

    #[test]
    fn strategy_errors() {
        let mut sector = Sector::new(1, 1, 2).unwrap();
        let data = nd::Array2::<C64>::zeros((2, 2));
        assert!(matches!(
            sector.set_wfn_named("from_data", None),
            Err(SectorError::Strategy(_)),
        ));
        assert!(matches!(
            sector.set_wfn_named("ones", Some(data.clone())),
            Err(SectorError::Strategy(_)),
        ));
        assert!(matches!(
            sector.set_wfn_named("onse", None),
            Err(SectorError::Strategy(_)),
        ));
        assert!(matches!(
            sector.set_wfn_named("from_data", Some(nd::Array2::zeros((5, 3)))),
            Err(SectorError::Shape(_)),
        ));
        assert!(matches!(
            sector.set_wfn(InitStrategy::FromData(nd::Array2::zeros((4, 6)))),
            Err(SectorError::Shape(_)),
        ));
        sector.set_wfn_named("hartree-fock", None).unwrap();
        assert_eq!(sector.coeff()[[0, 0]], c64_one());
        sector.set_wfn_named("from_data", Some(data)).unwrap();
        assert_eq!(sector.norm(), 0.0);
    }

    #[test]
    fn seeded_random() {
        let mut a = Sector::new(2, 2, 4).unwrap();
        let mut b = a.empty_copy();
        a.set_wfn_random_with(&mut StdRng::seed_from_u64(10101));
        b.set_wfn_random_with(&mut StdRng::seed_from_u64(10101));
        assert_eq!(a.coeff(), b.coeff());
    }

    #[test]
    fn arithmetic() {
        let mut sector = Sector::new(1, 1, 2).unwrap();
        sector.fill(c(1.0, 1.0));
        assert_abs_diff_eq!(sector.norm(), 8.0_f64.sqrt(), epsilon = 1e-14);
        sector.scale(c(0.0, 2.0));
        assert!(sector.coeff().iter().all(|x| *x == c(-2.0, 2.0)));
        sector.conj();
        assert!(sector.coeff().iter().all(|x| *x == c(-2.0, -2.0)));
        sector.normalize();
        assert_abs_diff_eq!(sector.norm(), 1.0, epsilon = 1e-14);

        let mut other = sector.clone();
        other.ax_plus_y(c(1.0, 0.0), &sector).unwrap();
        assert_abs_diff_eq!(other.norm(), 2.0, epsilon = 1e-14);
        assert_abs_diff_eq!(sector.vdot(&other).unwrap(), c(2.0, 0.0), epsilon = 1e-14);

        let wrong = Sector::new(2, 0, 2).unwrap();
        assert!(other.ax_plus_y(c(1.0, 0.0), &wrong).is_err());
        assert!(sector.vdot(&wrong).is_err());
    }

    #[test]
    fn beta_order_reversal() {
        let mut sector = Sector::new(1, 1, 3).unwrap();
        let data = nd::Array2::from_shape_fn((3, 3), |(a, b)| c((3 * a + b) as f64, 0.0));
        sector.set_wfn(InitStrategy::FromData(data)).unwrap();
        let inv = sector.beta_inversion();
        for a in 0..3 {
            for b in 0..3 {
                assert_eq!(inv[[a, b]], sector.coeff()[[a, 2 - b]]);
            }
        }
    }

    #[test]
    fn elements() {
        let mut sector = Sector::new(2, 1, 3).unwrap();
        sector.set_element(0b101, 0b010, c(3.0, -1.0)).unwrap();
        assert_eq!(sector.coeff()[[1, 1]], c(3.0, -1.0));
        assert_eq!(sector.get_element(0b101, 0b010).unwrap(), c(3.0, -1.0));
        assert!(sector.get_element(0b001, 0b010).is_err());
        assert!(sector.set_element(0b101, 0b011, C64::zero()).is_err());
    }

    #[test]
    fn iteration_order() {
        let mut sector = Sector::new(2, 1, 3).unwrap();
        let data = nd::Array2::from_shape_fn((3, 3), |(a, b)| c(a as f64, b as f64));
        sector.set_wfn(InitStrategy::FromData(data)).unwrap();
        let triples: Vec<(usize, usize, C64)> = sector.iter().collect();
        assert_eq!(triples.len(), 9);
        for (k, (a, b, v)) in triples.iter().enumerate() {
            assert_eq!((*a, *b), (k / 3, k % 3));
            assert_eq!(*v, c(*a as f64, *b as f64));
        }
        // restartable
        assert_eq!(sector.iter().count(), 9);

        let strings: Vec<(u64, u64)>
            = sector.iter_strings().map(|(a, b, _)| (a, b)).collect();
        assert_eq!(strings[0], (0b011, 0b001));
        assert_eq!(strings[5], (0b101, 0b100));
        assert_eq!(strings[8], (0b110, 0b100));
    }
}
