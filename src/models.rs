#![allow(non_snake_case)]

//! Bayesian estimation models.
//!
//! State representations are modeled as structs.
//! Common Bayesian discrete system estimation operations are defined as traits.
//!
//! Prediction and observation models wrap caller supplied functions together with their noise.
//! Additive and non-additive noise are distinct model types, the estimator is specialised for the model it is
//! constructed with. Every model function takes a single auxiliary input `&A` (use `()` when there is none).

use nalgebra as na;
use na::{allocator::Allocator, DefaultAllocator, Dim, OMatrix, OVector, RealField, U1};

use crate::error::EstimateError;
use crate::linalg::{cholesky, symmetrize};
use crate::noise::CorrelatedNoise;

/// Kalman State.
///
/// Linear representation as a state vector and the state covariance (symmetric positive semi-definite) matrix.
#[derive(PartialEq, Clone, Debug)]
pub struct KalmanState<N: RealField, D: Dim>
where
    DefaultAllocator: Allocator<D, D> + Allocator<D>,
{
    /// State vector
    pub x: OVector<N, D>,
    /// State covariance matrix (symmetric positive semi-definite)
    pub X: OMatrix<N, D, D>,
}

impl<N: RealField + Copy, D: Dim> KalmanState<N, D>
where
    DefaultAllocator: Allocator<D, D> + Allocator<D>,
{
    pub fn new_zero(d: D) -> KalmanState<N, D> {
        KalmanState {
            x: OVector::zeros_generic(d, U1),
            X: OMatrix::zeros_generic(d, d),
        }
    }

    /// A KalmanState with checked dimensions.
    ///
    /// The covariance must be square with the size of the state vector.
    pub fn new(x: OVector<N, D>, X: OMatrix<N, D, D>) -> Result<Self, EstimateError> {
        let state = KalmanState { x, X };
        state.check_dims()?;
        Ok(state)
    }

    /// The state dimension, if the covariance agrees with it.
    pub fn check_dims(&self) -> Result<usize, EstimateError> {
        let n = self.x.nrows();
        if self.X.nrows() != n || self.X.ncols() != n {
            return Err(EstimateError::configuration(format!(
                "state of size {} with covariance {}x{}",
                n,
                self.X.nrows(),
                self.X.ncols()
            )));
        }
        Ok(n)
    }

    /// Reciprocal condition number of the covariance, `Configuration` error if it is not PSD.
    pub fn check_psd(&self) -> Result<N, EstimateError> {
        let rcond = cholesky::UdUrcond(&self.X);
        if rcond < N::zero() {
            return Err(EstimateError::configuration("state covariance not PSD"));
        }
        Ok(rcond)
    }

    /// Remove round-off asymmetry from the covariance.
    pub fn symmetrize(&mut self) {
        symmetrize(&mut self.X);
    }
}

/// A state estimator.
pub trait Estimator<N: RealField, D: Dim>
where
    DefaultAllocator: Allocator<D>,
{
    /// The estimator's estimate of the system's state.
    fn state(&self) -> Result<OVector<N, D>, EstimateError>;
}

/// A Kalman estimator.
///
/// The linear Kalman state representation x,X is used to represent the system.
pub trait KalmanEstimator<N: RealField, D: Dim>: Estimator<N, D>
where
    DefaultAllocator: Allocator<D, D> + Allocator<D>,
{
    /// Initialise the estimator with a KalmanState.
    ///
    /// Returns the reciprocal condition number of the state covariance.
    fn init(&mut self, state: &KalmanState<N, D>) -> Result<N, EstimateError>;

    /// The estimator's estimate of the system's KalmanState.
    fn kalman_state(&self) -> Result<KalmanState<N, D>, EstimateError>;
}

/// Noise checks made when an estimator is constructed.
pub trait NoiseModel {
    /// Check the model's noise against the state dimension.
    fn check_noise(&self, state_dim: usize) -> Result<(), EstimateError>;
}

/// Prediction model with additive noise.
///
/// x(k+1) = f(x(k), aux) + w, with w of covariance Q.
pub struct AdditivePredict<N: RealField, D: Dim, F>
where
    DefaultAllocator: Allocator<D, D>,
{
    pub f: F,
    pub noise: CorrelatedNoise<N, D>,
}

/// Prediction model with non-additive noise.
///
/// x(k+1) = f(x(k), aux, w), with w of covariance Q.
pub struct NonAdditivePredict<N: RealField, QD: Dim, F>
where
    DefaultAllocator: Allocator<QD, QD>,
{
    pub f: F,
    pub noise: CorrelatedNoise<N, QD>,
}

/// Observation model with additive noise.
///
/// z = h(x, aux) + v, with v of covariance Q.
pub struct AdditiveObserve<N: RealField, ZD: Dim, H>
where
    DefaultAllocator: Allocator<ZD, ZD>,
{
    pub h: H,
    pub noise: CorrelatedNoise<N, ZD>,
}

/// Observation model with non-additive noise.
///
/// z = h(x, aux, v), with v of covariance Q.
/// The dimension of the observation is that of h's result and need not be that of v.
pub struct NonAdditiveObserve<N: RealField, VD: Dim, H>
where
    DefaultAllocator: Allocator<VD, VD>,
{
    pub h: H,
    pub noise: CorrelatedNoise<N, VD>,
}

impl<N: RealField, D: Dim, F> AdditivePredict<N, D, F>
where
    DefaultAllocator: Allocator<D, D>,
{
    pub fn new(f: F, noise: CorrelatedNoise<N, D>) -> Self {
        AdditivePredict { f, noise }
    }
}

impl<N: RealField, QD: Dim, F> NonAdditivePredict<N, QD, F>
where
    DefaultAllocator: Allocator<QD, QD>,
{
    pub fn new(f: F, noise: CorrelatedNoise<N, QD>) -> Self {
        NonAdditivePredict { f, noise }
    }
}

impl<N: RealField, ZD: Dim, H> AdditiveObserve<N, ZD, H>
where
    DefaultAllocator: Allocator<ZD, ZD>,
{
    pub fn new(h: H, noise: CorrelatedNoise<N, ZD>) -> Self {
        AdditiveObserve { h, noise }
    }
}

impl<N: RealField, VD: Dim, H> NonAdditiveObserve<N, VD, H>
where
    DefaultAllocator: Allocator<VD, VD>,
{
    pub fn new(h: H, noise: CorrelatedNoise<N, VD>) -> Self {
        NonAdditiveObserve { h, noise }
    }
}

/// Additive noise must be PSD, and for prediction of the state's size.
fn check_additive<N: RealField + Copy, D: Dim>(
    noise: &CorrelatedNoise<N, D>,
    state_dim: Option<usize>,
) -> Result<(), EstimateError>
where
    DefaultAllocator: Allocator<D, D> + Allocator<D>,
{
    if let Some(n) = state_dim {
        if noise.Q.nrows() != n || noise.Q.ncols() != n {
            return Err(EstimateError::configuration(format!(
                "additive process noise {}x{} for state of size {}",
                noise.Q.nrows(),
                noise.Q.ncols(),
                n
            )));
        }
    }
    if noise.rcond() < N::zero() {
        return Err(EstimateError::configuration("additive noise covariance not PSD"));
    }
    Ok(())
}

/// Non-additive noise augments the state, it must be present and PD.
fn check_non_additive<N: RealField + Copy, D: Dim>(noise: &CorrelatedNoise<N, D>) -> Result<(), EstimateError>
where
    DefaultAllocator: Allocator<D, D> + Allocator<D>,
{
    if noise.dim() == 0 {
        return Err(EstimateError::configuration(
            "non-additive noise model without noise dimensions",
        ));
    }
    if noise.rcond() <= N::zero() {
        return Err(EstimateError::configuration("non-additive noise covariance not PD"));
    }
    Ok(())
}

impl<N: RealField + Copy, D: Dim, F> NoiseModel for AdditivePredict<N, D, F>
where
    DefaultAllocator: Allocator<D, D> + Allocator<D>,
{
    fn check_noise(&self, state_dim: usize) -> Result<(), EstimateError> {
        check_additive(&self.noise, Some(state_dim))
    }
}

impl<N: RealField + Copy, QD: Dim, F> NoiseModel for NonAdditivePredict<N, QD, F>
where
    DefaultAllocator: Allocator<QD, QD> + Allocator<QD>,
{
    fn check_noise(&self, _state_dim: usize) -> Result<(), EstimateError> {
        check_non_additive(&self.noise)
    }
}

impl<N: RealField + Copy, ZD: Dim, H> NoiseModel for AdditiveObserve<N, ZD, H>
where
    DefaultAllocator: Allocator<ZD, ZD> + Allocator<ZD>,
{
    fn check_noise(&self, _state_dim: usize) -> Result<(), EstimateError> {
        check_additive(&self.noise, None)
    }
}

impl<N: RealField + Copy, VD: Dim, H> NoiseModel for NonAdditiveObserve<N, VD, H>
where
    DefaultAllocator: Allocator<VD, VD> + Allocator<VD>,
{
    fn check_noise(&self, _state_dim: usize) -> Result<(), EstimateError> {
        check_non_additive(&self.noise)
    }
}
