#![allow(non_snake_case)]

//! Bayesian estimation noise models.
//!
//! Linear Noise models are represented as structs.

use nalgebra as na;
use na::{allocator::Allocator, DefaultAllocator, Dim, OMatrix, OVector, RealField, U1};
use rand_core::RngCore;
use rand_distr::{Distribution, StandardNormal};

use crate::error::EstimateError;
use crate::linalg::{cholesky, rcond};

/// Noise represented as a the noise variance vector.
#[derive(Debug, Clone)]
pub struct UncorrelatedNoise<N: RealField, QD: Dim>
where
    DefaultAllocator: Allocator<QD>,
{
    /// Noise variance
    pub q: OVector<N, QD>,
}

/// Noise represented as a the noise covariance matrix.
#[derive(Debug, Clone)]
pub struct CorrelatedNoise<N: RealField, D: Dim>
where
    DefaultAllocator: Allocator<D, D>,
{
    /// Noise covariance
    pub Q: OMatrix<N, D, D>,
}

impl<N: RealField + Copy, QD: Dim> UncorrelatedNoise<N, QD>
where
    DefaultAllocator: Allocator<QD>,
{
    /// Reciprocal condition number of the variances, negative if any is negative.
    pub fn rcond(&self) -> N {
        rcond::rcond_vec(&self.q)
    }
}

impl<N: RealField + Copy, D: Dim> CorrelatedNoise<N, D>
where
    DefaultAllocator: Allocator<D, D> + Allocator<D>,
{
    /// Creates a CorrelatedNoise from an UncorrelatedNoise.
    pub fn from_uncorrelated(uncorrelated: &UncorrelatedNoise<N, D>) -> Self {
        CorrelatedNoise {
            Q: OMatrix::from_diagonal(&uncorrelated.q),
        }
    }

    /// Number of noise dimensions.
    pub fn dim(&self) -> usize {
        self.Q.nrows()
    }

    /// Reciprocal condition number of `Q`, negative if `Q` is not PSD or not square.
    pub fn rcond(&self) -> N {
        if !self.Q.is_square() {
            return -N::one();
        }
        cholesky::UdUrcond(&self.Q)
    }

    /// A sampler of zero mean normal noise with covariance `Q`.
    ///
    /// `Q` may be semi-definite, in which case the samples lie in a sub-space.
    pub fn sampler(&self) -> Result<impl Fn(&mut dyn RngCore) -> OVector<N, D>, EstimateError> {
        if !self.Q.is_square() {
            return Err(EstimateError::configuration("noise covariance not square"));
        }
        let G = cholesky::psd_sqrt(&self.Q)
            .ok_or_else(|| EstimateError::configuration("noise covariance not PSD"))?;
        let d = self.Q.shape_generic().0;
        Ok(move |rng: &mut dyn RngCore| &G * normal_vector(d, rng))
    }
}

/// A vector of independent standard normal draws.
pub fn normal_vector<N: RealField + Copy, D: Dim>(d: D, rng: &mut dyn RngCore) -> OVector<N, D>
where
    DefaultAllocator: Allocator<D>,
{
    let mut v = OVector::<N, D>::zeros_generic(d, U1);
    for i in 0..v.nrows() {
        let e: f64 = StandardNormal.sample(&mut *rng);
        v[i] = na::convert(e);
    }
    v
}
