//! Run-time settings for sectors: path selection, spin-orbital layout, and
//! resource limits.
//!
//! Settings are fixed when a [`Sector`][crate::sector::Sector] is built and
//! never change mid-computation. They can be written out in code or read from
//! a TOML document with a `[sector]` table:
//!
//! ```toml
//! [sector]
//! low_filling_threshold = 0.3
//! backend = "generic"
//! spin_order = "interleaved"
//! max_elements = 100000000
//! map_cache_capacity = 512
//! ```

use std::path::Path;
use serde::Deserialize;
use crate::error::SectorResult;

/// Default fractional filling below which sparse kernels are used.
pub const DEF_LOW_FILLING_THRESHOLD: f64 = 0.25;

/// Default upper bound on the number of complex elements in a coefficient
/// matrix or a dense intermediate.
pub const DEF_MAX_ELEMENTS: usize = 1 << 28;

/// Default number of excitation maps held by a configuration index.
pub const DEF_MAP_CACHE_CAPACITY: usize = 1024;

/// Choice of kernels for operator application.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Always use the general reduced-operator kernels.
    Generic,
    /// Use hand-specialized kernels for one-body and spatial one-plus-two-body
    /// operators, falling back to the general kernels otherwise.
    #[default]
    Specialized,
}

/// Ordering of spin-orbitals in spin-orbital operator tensors.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpinOrder {
    /// Spatial orbital `p` maps to `p` (up) and `norb + p` (down).
    #[default]
    Block,
    /// Spatial orbital `p` maps to `2 p` (up) and `2 p + 1` (down).
    Interleaved,
}

impl SpinOrder {
    /// Split a spin-orbital index into a spatial orbital and a spin flag
    /// (`false` for up, `true` for down).
    pub fn split(self, so: usize, norb: usize) -> (usize, bool) {
        match self {
            Self::Block => if so < norb { (so, false) } else { (so - norb, true) },
            Self::Interleaved => (so / 2, so % 2 == 1),
        }
    }

    /// Inverse of [`Self::split`].
    pub fn join(self, orb: usize, down: bool, norb: usize) -> usize {
        match self {
            Self::Block => if down { orb + norb } else { orb },
            Self::Interleaved => 2 * orb + usize::from(down),
        }
    }
}

/// Settings carried by a sector.
#[derive(Copy, Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Fractional filling `(nalpha + nbeta) / (2 norb)` below which the sparse
    /// kernels are selected.
    pub low_filling_threshold: f64,
    /// Kernel family for operator application.
    pub backend: Backend,
    /// Layout of spin-orbital input tensors.
    pub spin_order: SpinOrder,
    /// Upper bound on the number of elements in a coefficient matrix or dense
    /// intermediate.
    pub max_elements: usize,
    /// Maximum number of excitation maps retained per configuration index.
    pub map_cache_capacity: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            low_filling_threshold: DEF_LOW_FILLING_THRESHOLD,
            backend: Backend::default(),
            spin_order: SpinOrder::default(),
            max_elements: DEF_MAX_ELEMENTS,
            map_cache_capacity: DEF_MAP_CACHE_CAPACITY,
        }
    }
}

#[derive(Deserialize)]
struct SettingsDoc {
    #[serde(default)]
    sector: Settings,
}

impl Settings {
    /// Parse settings from the `[sector]` table of a TOML document. Missing
    /// keys (or a missing table) take their default values.
    pub fn from_toml_str(src: &str) -> SectorResult<Self> {
        let doc: SettingsDoc = toml::from_str(src)?;
        Ok(doc.sector)
    }

    /// Read settings from a TOML file.
    pub fn from_file<P>(path: P) -> SectorResult<Self>
    where P: AsRef<Path>
    {
        let src = std::fs::read_to_string(path)?;
        Self::from_toml_str(&src)
    }

    /// Return `true` if a sector with these electron and orbital counts
    /// should use sparse kernels.
    pub fn is_low_filling(&self, nalpha: usize, nbeta: usize, norb: usize)
        -> bool
    {
        norb > 0
            && ((nalpha + nbeta) as f64) / (2.0 * norb as f64)
                < self.low_filling_threshold
    }

    pub fn with_low_filling_threshold(mut self, threshold: f64) -> Self {
        self.low_filling_threshold = threshold;
        self
    }

    pub fn with_backend(mut self, backend: Backend) -> Self {
        self.backend = backend;
        self
    }

    pub fn with_spin_order(mut self, spin_order: SpinOrder) -> Self {
        self.spin_order = spin_order;
        self
    }

    pub fn with_max_elements(mut self, max_elements: usize) -> Self {
        self.max_elements = max_elements;
        self
    }

    pub fn with_map_cache_capacity(mut self, capacity: usize) -> Self {
        self.map_cache_capacity = capacity;
        self
    }
}
