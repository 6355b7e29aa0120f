//! Estimation errors.
//!
//! Every fallible estimator operation reports one of these. None are retried internally,
//! recovery (for example re-initialising with an inflated covariance) is left to the caller.

use std::fmt;

/// Errors that can occur during estimation.
#[derive(Debug, Clone, PartialEq)]
pub enum EstimateError {
    /// Bad construction or initialisation arguments.
    Configuration {
        /// Description of the configuration issue
        description: String,
    },

    /// Vector or matrix size disagreement at call time.
    DimensionMismatch {
        /// What was being checked (e.g. "measurement")
        context: &'static str,
        /// What was expected
        expected: usize,
        /// What was received
        actual: usize,
    },

    /// A covariance lost positive definiteness, or weights became non numeric.
    NumericalInstability {
        /// Description of the issue
        description: String,
    },

    /// Every particle likelihood was zero.
    DegenerateWeights {
        /// Number of particles in the set
        particles: usize,
    },
}

impl EstimateError {
    pub(crate) fn configuration(description: impl Into<String>) -> Self {
        EstimateError::Configuration {
            description: description.into(),
        }
    }

    pub(crate) fn numerical(description: impl Into<String>) -> Self {
        EstimateError::NumericalInstability {
            description: description.into(),
        }
    }

    /// Fails with `DimensionMismatch` unless `actual == expected`.
    pub(crate) fn check_dim(
        context: &'static str,
        expected: usize,
        actual: usize,
    ) -> Result<(), EstimateError> {
        if expected == actual {
            Ok(())
        } else {
            Err(EstimateError::DimensionMismatch {
                context,
                expected,
                actual,
            })
        }
    }
}

impl fmt::Display for EstimateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EstimateError::Configuration { description } => {
                write!(f, "Configuration error: {}", description)
            }
            EstimateError::DimensionMismatch {
                context,
                expected,
                actual,
            } => {
                write!(
                    f,
                    "Dimension mismatch for {}: expected {}, got {}",
                    context, expected, actual
                )
            }
            EstimateError::NumericalInstability { description } => {
                write!(f, "Numerical instability: {}", description)
            }
            EstimateError::DegenerateWeights { particles } => {
                write!(f, "All {} particle weights are zero", particles)
            }
        }
    }
}

impl std::error::Error for EstimateError {}
