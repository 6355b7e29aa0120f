//! Systems used to test the estimators.
//!
//! A constant velocity system, observed in position, for which the linear Kalman filter is exact.
//! A van der Pol oscillator observed with multiplicative noise.

#![allow(dead_code, non_snake_case)]

use na::{allocator::Allocator, DefaultAllocator, Dim, OMatrix, OVector, Vector1, Vector2, U1};
use nalgebra as na;

pub const DT: f64 = 0.1;
// Velocity noise
pub const V_NOISE: f64 = 0.2;
// Noise on observing the position
pub const OBS_NOISE: f64 = 0.1;

/// Constant velocity prediction matrix, the first two states are position and velocity.
pub fn fx<D: Dim>(d: D) -> OMatrix<f64, D, D>
where
    DefaultAllocator: Allocator<D, D>,
{
    let mut F = OMatrix::identity_generic(d, d);
    F[(0, 1)] = DT;
    F
}

/// Observe the position.
pub fn hx<D: Dim>(x: &OVector<f64, D>) -> Vector1<f64>
where
    DefaultAllocator: Allocator<D>,
{
    Vector1::new(x[0])
}

/// Gaussian likelihood of a position observation.
pub fn position_likelihood<D: Dim>(x: &OVector<f64, D>, z: &OVector<f64, U1>, variance: f64) -> f64
where
    DefaultAllocator: Allocator<D>,
{
    let s = z[0] - x[0];
    (-0.5 * s * s / variance).exp()
}

/// Linear Kalman filter prediction.
pub fn kalman_predict(x: &mut Vector2<f64>, X: &mut na::Matrix2<f64>, Q: &na::Matrix2<f64>) {
    let F = fx(na::U2);
    *x = F * *x;
    *X = F * *X * F.transpose() + Q;
}

/// Linear Kalman filter position observation.
pub fn kalman_observe(x: &mut Vector2<f64>, X: &mut na::Matrix2<f64>, z: f64, r: f64) {
    let H = na::Matrix1x2::new(1.0, 0.0);
    let S = H * *X * H.transpose() + na::Matrix1::new(r);
    let W = *X * H.transpose() / S[0];
    *x += W * (z - x[0]);
    *X -= W * S * W.transpose();
}

pub const VDP_DT: f64 = 0.05;
pub const VDP_MU: f64 = 1.0;

/// Euler step of the van der Pol oscillator.
pub fn vdp_step(x: &Vector2<f64>, dt: f64) -> Vector2<f64> {
    let dx = Vector2::new(x[1], VDP_MU * (1.0 - x[0] * x[0]) * x[1] - x[0]);
    x + dx * dt
}

/// The oscillator integrated over `dt` in finer steps.
pub fn vdp_truth(x: &Vector2<f64>, dt: f64) -> Vector2<f64> {
    let substeps = 20;
    let mut xt = *x;
    for _ in 0..substeps {
        xt = vdp_step(&xt, dt / substeps as f64);
    }
    xt
}
