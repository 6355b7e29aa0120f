#![allow(non_snake_case)]

//! Julier-Uhlmann 'Unscented' state estimation.
//!
//! A discrete Bayesian estimator that uses the [`KalmanState`] linear representation of the system.
//! The 'Unscented' transform is used for non-linear state predictions and observation.
//!
//! The scaled transform of Julier and van der Merwe is implemented. Its spread is controlled by `alpha`,
//! `beta` incorporates prior knowledge of the distribution (2 is optimal for a Gaussian) and `kappa` is the
//! secondary scaling of the classic Duplex transform.
//!
//! Non-additive noise is handled by augmenting the state with the noise vector before the
//! sigma points are generated.

use log::{trace, warn};
use nalgebra as na;
use na::{allocator::Allocator, DMatrix, DVector, DefaultAllocator, Dim, OVector, RealField};

use crate::error::EstimateError;
use crate::linalg::{cholesky, symmetrize};
use crate::matrix;
use crate::models::{
    AdditiveObserve, AdditivePredict, Estimator, KalmanEstimator, KalmanState, NoiseModel, NonAdditiveObserve,
    NonAdditivePredict,
};

/// Scaling parameters of the unscented transform.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UnscentedParams<N> {
    /// Spread of the sigma points about the mean, must be positive.
    pub alpha: N,
    /// Prior knowledge of the distribution, 2 for a Gaussian.
    pub beta: N,
    /// Secondary scaling.
    pub kappa: N,
}

impl<N: RealField + Copy> Default for UnscentedParams<N> {
    fn default() -> Self {
        UnscentedParams {
            alpha: na::convert(1e-3),
            beta: na::convert(2.0),
            kappa: N::zero(),
        }
    }
}

impl<N: RealField + Copy> UnscentedParams<N> {
    /// Composite scaling `lambda = alpha^2 (n + kappa) - n` for a distribution of dimension `n`.
    pub fn lambda(&self, n: usize) -> N {
        let n: N = na::convert(n as f64);
        self.alpha * self.alpha * (n + self.kappa) - n
    }
}

/// Sigma point weights for a distribution of dimension `n`.
///
/// A central mean and covariance weight and one weight `wi` shared by the `2n` symmetric points.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UnscentedWeights<N> {
    pub n: usize,
    /// `n + lambda`, the squared spread of the points in units of the covariance square root.
    pub scale: N,
    pub mean0: N,
    pub cov0: N,
    pub wi: N,
}

impl<N: RealField + Copy> UnscentedWeights<N> {
    pub fn new(n: usize, params: &UnscentedParams<N>) -> Result<Self, EstimateError> {
        if n == 0 {
            return Err(EstimateError::configuration("unscented transform of an empty distribution"));
        }
        if !(params.alpha > N::zero()) {
            return Err(EstimateError::configuration("unscented alpha must be positive"));
        }
        let lambda = params.lambda(n);
        let scale = na::convert::<f64, N>(n as f64) + lambda;
        if !(scale > N::zero()) {
            return Err(EstimateError::configuration(format!(
                "unscented scaling n + lambda not positive for n = {}",
                n
            )));
        }
        let two: N = na::convert(2.0);
        let mean0 = lambda / scale;
        Ok(UnscentedWeights {
            n,
            scale,
            mean0,
            cov0: mean0 + N::one() - params.alpha * params.alpha + params.beta,
            wi: N::one() / (two * scale),
        })
    }

    /// Sum of the mean weights over all `2n+1` points.
    pub fn mean_weight_sum(&self) -> N {
        let two_n: N = na::convert(2.0 * self.n as f64);
        self.mean0 + two_n * self.wi
    }

    fn cov_weight(&self, i: usize) -> N {
        if i == 0 {
            self.cov0
        } else {
            self.wi
        }
    }
}

/// The `2n+1` sigma points of a distribution.
///
/// The first point is the mean, followed by the pairs `mean +- sqrt(n + lambda) * L.column(c)` where
/// `L` is the Cholesky factor of `cov`.
pub fn sigma_points<N: RealField + Copy>(
    mean: &DVector<N>,
    cov: &DMatrix<N>,
    weights: &UnscentedWeights<N>,
) -> Result<Vec<DVector<N>>, EstimateError> {
    let n = mean.nrows();
    EstimateError::check_dim("sigma point covariance", n, cov.nrows())?;
    let chol = match cholesky::cholesky_pd(cov) {
        Some(chol) => chol,
        None => {
            warn!("sigma point covariance of dimension {} not PD", n);
            return Err(EstimateError::numerical("sigma point covariance not PD"));
        }
    };
    let sigma = chol.l() * weights.scale.sqrt();

    let mut UU = Vec::with_capacity(2 * n + 1);
    UU.push(mean.clone());
    for c in 0..n {
        let sigmaCol = sigma.column(c);
        UU.push(mean + &sigmaCol);
        UU.push(mean - &sigmaCol);
    }
    Ok(UU)
}

/// Weighted mean and covariance of transformed sigma points.
fn recombine<N: RealField + Copy>(YY: &[DVector<N>], weights: &UnscentedWeights<N>) -> (DVector<N>, DMatrix<N>) {
    let m = YY[0].nrows();
    let mut y = YY[0].scale(weights.mean0);
    for Yi in &YY[1..] {
        y.axpy(weights.wi, Yi, N::one());
    }

    let mut Y = DMatrix::zeros(m, m);
    for (i, Yi) in YY.iter().enumerate() {
        let d = Yi - &y;
        Y.ger(weights.cov_weight(i), &d, &d, N::one());
    }
    (y, Y)
}

/// Cross covariance of the state part of sigma points `XX` with their transformed points `ZZ`.
fn cross_covariance<N: RealField + Copy>(
    XX: &[DVector<N>],
    x: &DVector<N>,
    ZZ: &[DVector<N>],
    z: &DVector<N>,
    weights: &UnscentedWeights<N>,
) -> DMatrix<N> {
    let n = x.nrows();
    let mut XZ = DMatrix::zeros(n, z.nrows());
    for (i, (Xi, Zi)) in XX.iter().zip(ZZ).enumerate() {
        let dx = Xi.rows(0, n) - x;
        let dz = Zi - z;
        XZ.ger(weights.cov_weight(i), &dx, &dz, N::one());
    }
    XZ
}

/// The predicted measurement distribution and its correlation with the state.
#[derive(Debug, Clone)]
pub struct UnscentedObservation<N: RealField> {
    /// Predicted measurement mean
    pub z: DVector<N>,
    /// Innovation covariance, including the observation noise
    pub S: DMatrix<N>,
    /// State-measurement cross covariance
    pub XZ: DMatrix<N>,
}

/// Unscented prediction of a [`KalmanState`] through a prediction model.
pub trait UnscentedPredictor<N: RealField, D: Dim, A: ?Sized>
where
    DefaultAllocator: Allocator<D, D> + Allocator<D>,
{
    fn predict_unscented(
        &self,
        state: &KalmanState<N, D>,
        params: &UnscentedParams<N>,
        aux: &A,
    ) -> Result<KalmanState<N, D>, EstimateError>;
}

/// Unscented observation of a [`KalmanState`] through an observation model.
pub trait UnscentedObserver<N: RealField, D: Dim, ZD: Dim, A: ?Sized>
where
    DefaultAllocator: Allocator<D, D> + Allocator<D>,
{
    fn observe_unscented(
        &self,
        state: &KalmanState<N, D>,
        params: &UnscentedParams<N>,
        aux: &A,
    ) -> Result<UnscentedObservation<N>, EstimateError>;
}

impl<N, D, A, F> UnscentedPredictor<N, D, A> for AdditivePredict<N, D, F>
where
    N: RealField + Copy,
    D: Dim,
    A: ?Sized,
    F: Fn(&OVector<N, D>, &A) -> OVector<N, D>,
    DefaultAllocator: Allocator<D, D> + Allocator<D>,
{
    fn predict_unscented(
        &self,
        state: &KalmanState<N, D>,
        params: &UnscentedParams<N>,
        aux: &A,
    ) -> Result<KalmanState<N, D>, EstimateError> {
        let d = state.x.shape_generic().0;
        let n = state.x.nrows();
        let weights = UnscentedWeights::new(n, params)?;
        let UU = sigma_points(&matrix::to_dynamic_vector(&state.x), &matrix::to_dynamic(&state.X), &weights)?;

        let mut XX = Vec::with_capacity(UU.len());
        for Ui in &UU {
            let xi = (self.f)(&matrix::from_dynamic_vector(d, Ui), aux);
            EstimateError::check_dim("predicted state", n, xi.nrows())?;
            XX.push(matrix::to_dynamic_vector(&xi));
        }

        let (x, mut X) = recombine(&XX, &weights);
        X += matrix::to_dynamic(&self.noise.Q);
        Ok(KalmanState {
            x: matrix::from_dynamic_vector(d, &x),
            X: matrix::from_dynamic(d, d, &X),
        })
    }
}

impl<N, D, QD, A, F> UnscentedPredictor<N, D, A> for NonAdditivePredict<N, QD, F>
where
    N: RealField + Copy,
    D: Dim,
    QD: Dim,
    A: ?Sized,
    F: Fn(&OVector<N, D>, &A, &OVector<N, QD>) -> OVector<N, D>,
    DefaultAllocator: Allocator<D, D> + Allocator<D> + Allocator<QD, QD> + Allocator<QD>,
{
    fn predict_unscented(
        &self,
        state: &KalmanState<N, D>,
        params: &UnscentedParams<N>,
        aux: &A,
    ) -> Result<KalmanState<N, D>, EstimateError> {
        let d = state.x.shape_generic().0;
        let qd = self.noise.Q.shape_generic().0;
        let n = state.x.nrows();

        // Augmented state [x; w] with block diagonal covariance
        let q = self.noise.Q.nrows();
        let xa = matrix::to_dynamic_vector(&state.x).resize_vertically(n + q, N::zero());
        let Xa = matrix::block_diagonal(&matrix::to_dynamic(&state.X), &matrix::to_dynamic(&self.noise.Q));
        let weights = UnscentedWeights::new(n + q, params)?;
        let UU = sigma_points(&xa, &Xa, &weights)?;

        let mut XX = Vec::with_capacity(UU.len());
        for Ui in &UU {
            let xi = (self.f)(
                &matrix::from_dynamic_rows(d, Ui, 0),
                aux,
                &matrix::from_dynamic_rows(qd, Ui, n),
            );
            EstimateError::check_dim("predicted state", n, xi.nrows())?;
            XX.push(matrix::to_dynamic_vector(&xi));
        }

        let (x, X) = recombine(&XX, &weights);
        Ok(KalmanState {
            x: matrix::from_dynamic_vector(d, &x),
            X: matrix::from_dynamic(d, d, &X),
        })
    }
}

impl<N, D, ZD, A, H> UnscentedObserver<N, D, ZD, A> for AdditiveObserve<N, ZD, H>
where
    N: RealField + Copy,
    D: Dim,
    ZD: Dim,
    A: ?Sized,
    H: Fn(&OVector<N, D>, &A) -> OVector<N, ZD>,
    DefaultAllocator: Allocator<D, D> + Allocator<D> + Allocator<ZD, ZD> + Allocator<ZD>,
{
    fn observe_unscented(
        &self,
        state: &KalmanState<N, D>,
        params: &UnscentedParams<N>,
        aux: &A,
    ) -> Result<UnscentedObservation<N>, EstimateError> {
        let d = state.x.shape_generic().0;
        let x = matrix::to_dynamic_vector(&state.x);
        let weights = UnscentedWeights::new(x.nrows(), params)?;
        let UU = sigma_points(&x, &matrix::to_dynamic(&state.X), &weights)?;

        let zn = self.noise.Q.nrows();
        let mut ZZ = Vec::with_capacity(UU.len());
        for Ui in &UU {
            let zi = (self.h)(&matrix::from_dynamic_vector(d, Ui), aux);
            EstimateError::check_dim("observation function", zn, zi.nrows())?;
            ZZ.push(matrix::to_dynamic_vector(&zi));
        }

        let (z, mut S) = recombine(&ZZ, &weights);
        S += matrix::to_dynamic(&self.noise.Q);
        let XZ = cross_covariance(&UU, &x, &ZZ, &z, &weights);
        Ok(UnscentedObservation { z, S, XZ })
    }
}

impl<N, D, VD, ZD, A, H> UnscentedObserver<N, D, ZD, A> for NonAdditiveObserve<N, VD, H>
where
    N: RealField + Copy,
    D: Dim,
    VD: Dim,
    ZD: Dim,
    A: ?Sized,
    H: Fn(&OVector<N, D>, &A, &OVector<N, VD>) -> OVector<N, ZD>,
    DefaultAllocator: Allocator<D, D> + Allocator<D> + Allocator<VD, VD> + Allocator<VD> + Allocator<ZD>,
{
    fn observe_unscented(
        &self,
        state: &KalmanState<N, D>,
        params: &UnscentedParams<N>,
        aux: &A,
    ) -> Result<UnscentedObservation<N>, EstimateError> {
        let d = state.x.shape_generic().0;
        let vd = self.noise.Q.shape_generic().0;
        let n = state.x.nrows();

        // Augmented state [x; v] with block diagonal covariance
        let v = self.noise.Q.nrows();
        let x = matrix::to_dynamic_vector(&state.x);
        let xa = x.clone().resize_vertically(n + v, N::zero());
        let Xa = matrix::block_diagonal(&matrix::to_dynamic(&state.X), &matrix::to_dynamic(&self.noise.Q));
        let weights = UnscentedWeights::new(n + v, params)?;
        let UU = sigma_points(&xa, &Xa, &weights)?;

        let mut ZZ: Vec<DVector<N>> = Vec::with_capacity(UU.len());
        for Ui in &UU {
            let zi = (self.h)(
                &matrix::from_dynamic_rows(d, Ui, 0),
                aux,
                &matrix::from_dynamic_rows(vd, Ui, n),
            );
            if let Some(z0) = ZZ.first() {
                EstimateError::check_dim("observation function", z0.nrows(), zi.nrows())?;
            }
            ZZ.push(matrix::to_dynamic_vector(&zi));
        }

        let (z, S) = recombine(&ZZ, &weights);
        let XZ = cross_covariance(&UU, &x, &ZZ, &z, &weights);
        Ok(UnscentedObservation { z, S, XZ })
    }
}

/// The result of an unscented correction.
#[derive(Debug, Clone)]
pub struct Correction<N: RealField, D: Dim, ZD: Dim>
where
    DefaultAllocator: Allocator<D, D> + Allocator<D> + Allocator<ZD, ZD> + Allocator<ZD>,
{
    /// Corrected belief
    pub state: KalmanState<N, D>,
    /// Measurement less the predicted measurement
    pub innovation: OVector<N, ZD>,
    pub innovation_covariance: na::OMatrix<N, ZD, ZD>,
}

/// Unscented Kalman filter.
///
/// Holds the belief as a [`KalmanState`] together with the prediction and observation models it was
/// constructed with. `predict` and `correct` update the belief and return it.
pub struct UnscentedKalmanFilter<N: RealField, D: Dim, P, H>
where
    DefaultAllocator: Allocator<D, D> + Allocator<D>,
{
    xX: KalmanState<N, D>,
    params: UnscentedParams<N>,
    pub predictor: P,
    pub observer: H,
    step: u64,
}

impl<N: RealField + Copy, D: Dim, P, H> UnscentedKalmanFilter<N, D, P, H>
where
    P: NoiseModel,
    H: NoiseModel,
    DefaultAllocator: Allocator<D, D> + Allocator<D>,
{
    /// Construct a filter from its models and initial belief.
    ///
    /// `ConfigurationError` if the belief's dimensions are inconsistent or its covariance is not PSD,
    /// if the parameters give an invalid transform, or if a model's noise is unusable.
    pub fn new(
        predictor: P,
        observer: H,
        initial_state: KalmanState<N, D>,
        params: UnscentedParams<N>,
    ) -> Result<Self, EstimateError> {
        let n = initial_state.check_dims()?;
        UnscentedWeights::new(n, &params)?;
        initial_state.check_psd()?;
        predictor.check_noise(n)?;
        observer.check_noise(n)?;
        Ok(UnscentedKalmanFilter {
            xX: initial_state,
            params,
            predictor,
            observer,
            step: 0,
        })
    }
}

impl<N: RealField + Copy, D: Dim, P, H> UnscentedKalmanFilter<N, D, P, H>
where
    DefaultAllocator: Allocator<D, D> + Allocator<D>,
{
    /// Predict the belief one step forward.
    ///
    /// On any error the belief and step count are unchanged.
    pub fn predict<A: ?Sized>(&mut self, aux: &A) -> Result<KalmanState<N, D>, EstimateError>
    where
        P: UnscentedPredictor<N, D, A>,
    {
        let mut predicted = self.predictor.predict_unscented(&self.xX, &self.params, aux)?;
        predicted.symmetrize();
        if cholesky::cholesky_pd(&matrix::to_dynamic(&predicted.X)).is_none() {
            warn!("predicted state covariance not PD at step {}", self.step);
            return Err(EstimateError::numerical("predicted state covariance not PD"));
        }
        self.xX = predicted;
        self.step += 1;
        trace!("unscented predict, step {}", self.step);
        Ok(self.xX.clone())
    }

    /// Correct the belief with the measurement `z`.
    ///
    /// On any error the belief is unchanged.
    pub fn correct<ZD: Dim, A: ?Sized>(
        &mut self,
        z: &OVector<N, ZD>,
        aux: &A,
    ) -> Result<Correction<N, D, ZD>, EstimateError>
    where
        H: UnscentedObserver<N, D, ZD, A>,
        DefaultAllocator: Allocator<ZD, ZD> + Allocator<ZD>,
    {
        let d = self.xX.x.shape_generic().0;
        let zd = z.shape_generic().0;

        let obs = self.observer.observe_unscented(&self.xX, &self.params, aux)?;
        EstimateError::check_dim("measurement", obs.z.nrows(), z.nrows())?;
        let s = matrix::to_dynamic_vector(z) - &obs.z;

        // Inverse innovation covariance
        let SI = match cholesky::cholesky_pd(&obs.S) {
            Some(chol) => chol.inverse(),
            None => {
                warn!("innovation covariance not PD at step {}", self.step);
                return Err(EstimateError::numerical("innovation covariance not PD"));
            }
        };

        // Kalman gain, XZ*SI
        let W = &obs.XZ * SI;

        let x = matrix::to_dynamic_vector(&self.xX.x) + &W * &s;
        // X -= W.S.W'
        let mut X = matrix::to_dynamic(&self.xX.X) - &W * &obs.S * W.transpose();
        symmetrize(&mut X);
        if cholesky::cholesky_pd(&X).is_none() {
            warn!("corrected state covariance not PD at step {}", self.step);
            return Err(EstimateError::numerical("corrected state covariance not PD"));
        }

        self.xX = KalmanState {
            x: matrix::from_dynamic_vector(d, &x),
            X: matrix::from_dynamic(d, d, &X),
        };
        trace!("unscented correct, step {}, innovation {:?}", self.step, s.as_slice());
        Ok(Correction {
            state: self.xX.clone(),
            innovation: matrix::from_dynamic_vector(zd, &s),
            innovation_covariance: matrix::from_dynamic(zd, zd, &obs.S),
        })
    }

    /// Number of predictions made.
    pub fn step(&self) -> u64 {
        self.step
    }

    pub fn params(&self) -> &UnscentedParams<N> {
        &self.params
    }

    /// The sigma points of the current belief.
    pub fn sigma_points(&self) -> Result<Vec<OVector<N, D>>, EstimateError> {
        let d = self.xX.x.shape_generic().0;
        let weights = UnscentedWeights::new(self.xX.x.nrows(), &self.params)?;
        let UU = sigma_points(
            &matrix::to_dynamic_vector(&self.xX.x),
            &matrix::to_dynamic(&self.xX.X),
            &weights,
        )?;
        Ok(UU.iter().map(|Ui| matrix::from_dynamic_vector(d, Ui)).collect())
    }
}

impl<N: RealField + Copy, D: Dim, P, H> Estimator<N, D> for UnscentedKalmanFilter<N, D, P, H>
where
    DefaultAllocator: Allocator<D, D> + Allocator<D>,
{
    fn state(&self) -> Result<OVector<N, D>, EstimateError> {
        Ok(self.xX.x.clone())
    }
}

impl<N: RealField + Copy, D: Dim, P, H> KalmanEstimator<N, D> for UnscentedKalmanFilter<N, D, P, H>
where
    DefaultAllocator: Allocator<D, D> + Allocator<D>,
{
    fn init(&mut self, state: &KalmanState<N, D>) -> Result<N, EstimateError> {
        let n = state.check_dims()?;
        EstimateError::check_dim("state", self.xX.x.nrows(), n)?;
        let rcond = state.check_psd()?;
        self.xX = state.clone();
        Ok(rcond)
    }

    fn kalman_state(&self) -> Result<KalmanState<N, D>, EstimateError> {
        Ok(self.xX.clone())
    }
}
