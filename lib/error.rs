//! Error type shared by every fallible operation in the crate.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SectorError {
    /// Returned when a configuration index or state container cannot be built
    /// for the requested electron and orbital counts, or when a supplied
    /// configuration index does not agree with them.
    #[error("error in sector construction: {0}")]
    Construction(String),

    /// Returned when an operator tensor, coefficient matrix, or orbital list
    /// does not have the shape its operation requires.
    #[error("error in operator or data shape: {0}")]
    Shape(String),

    /// Returned for unknown initialization strategies or data supplied
    /// inconsistently with the strategy.
    #[error("error in initialization strategy: {0}")]
    Strategy(String),

    /// Returned when a diagonal operator has the wrong length.
    #[error("error in diagonal operator: expected length {expected}, got {got}")]
    Dimension { expected: String, got: usize },

    /// Returned when a coefficient matrix or intermediate would exceed the
    /// configured element budget.
    #[error("error in resource budget: {0} elements requested with a limit of {1}")]
    Resource(usize, usize),

    /// Returned when a settings document cannot be parsed.
    #[error("error in settings: {0}")]
    Settings(#[from] toml::de::Error),

    /// Returned when a settings file cannot be read.
    #[error("error reading settings file: {0}")]
    Io(#[from] std::io::Error),
}
pub type SectorResult<T> = Result<T, SectorError>;

impl SectorError {
    pub(crate) fn dimension<S>(expected: S, got: usize) -> Self
    where S: Into<String>
    {
        Self::Dimension { expected: expected.into(), got }
    }
}
