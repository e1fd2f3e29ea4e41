#![allow(non_snake_case)]

//! Amplitudes of a fermionic many-body state restricted to a sector of fixed
//! alpha and beta electron counts, with operator application, time
//! evolution, and reduced density matrices computed directly on the
//! `(alpha string, beta string)` amplitude matrix.

pub mod error;
pub mod config;
pub mod bitstring;
pub mod excitation;
pub mod fci_graph;
pub mod nbody;
pub mod hamiltonian;
pub mod sector;

pub use error::{ SectorError, SectorResult };
pub use config::{ Backend, Settings, SpinOrder };
pub use excitation::{ ExcitationMap, Spin };
pub use fci_graph::FciGraph;
pub use hamiltonian::{ DiagonalCoulomb, GsoHamiltonian, Hamiltonian };
pub use sector::{ Contraction, InitStrategy, Sector };
