#![allow(non_snake_case)]

//! Sampling Importance Resampling (SIR) state estimation.
//!
//! A discrete Bayesian estimator that represents the belief as a weighted set of samples. The samples are
//! predicted individually with a stochastic prediction function and weighted by an observation likelihood.
//! When the weights degenerate the samples are resampled in proportion to their weights.
//!
//! [`SampleState`] provides the sample operations. [`ParticleFilter`] combines them into a predict/correct filter
//! with a resampling policy.
//!
//! Resamplers make `n` draws from `n` weighted samples and report for each sample how many times it
//! was chosen. The provided resamplers are:
//! - [`standard_resampler`]: multinomial, from sorted uniform draws.
//! - [`systematic_resampler`]: one uniform draw offsets `n` equally spaced positions. Lowest variance, the default.
//! - [`residual_resampler`]: the integer part of `n * w` is copied, the remainder is drawn systematically.

use log::{debug, trace};
use nalgebra as na;
use na::{allocator::Allocator, DefaultAllocator, Dim, OMatrix, OVector, RealField, U1};
use rand_core::RngCore;
use rand_distr::{Distribution, Standard};

use crate::error::EstimateError;
use crate::linalg::cholesky;
use crate::models::{Estimator, KalmanEstimator, KalmanState};
use crate::noise::normal_vector;

/// Sample state, a collection of state vectors.
pub type Samples<N, D> = Vec<OVector<N, D>>;

/// Likelihood weights of the samples.
pub type Likelihoods<N> = Vec<N>;

/// Number of times each sample is resampled.
pub type Resamples = Vec<u32>;

/// A resampler function.
///
/// `w` is replaced by its cumulative sum. Returns the resample counts and the number of unique samples.
pub type Resampler<N> = dyn FnMut(&mut Likelihoods<N>, &mut dyn RngCore) -> Result<(Resamples, u32), EstimateError>;

/// A roughening function, applied to the samples after resampling.
pub type Roughener<N, D> = dyn FnMut(&mut Samples<N, D>, &mut dyn RngCore);

/// Sample state.
///
/// Weighted samples with the random number generator used to predict and resample them.
/// Weights are normalised, they sum to one.
pub struct SampleState<N: RealField, D: Dim>
where
    DefaultAllocator: Allocator<D>,
{
    /// Samples
    pub s: Samples<N, D>,
    /// Normalised weights of the samples
    pub w: Likelihoods<N>,
    /// A random number generator
    pub rng: Box<dyn RngCore>,
}

impl<N: RealField + Copy, D: Dim> SampleState<N, D>
where
    DefaultAllocator: Allocator<D>,
{
    /// Samples of equal weight.
    pub fn new_equal_likelihood(s: Samples<N, D>, rng: Box<dyn RngCore>) -> SampleState<N, D> {
        let w = equal_weights(s.len());
        SampleState { s, w, rng }
    }

    /// `count` samples drawn from the normal distribution of a [`KalmanState`].
    ///
    /// `ConfigurationError` if `count < 1` or the state covariance is not PSD.
    pub fn new_from_kalman(
        count: usize,
        state: &KalmanState<N, D>,
        rng: Box<dyn RngCore>,
    ) -> Result<SampleState<N, D>, EstimateError>
    where
        DefaultAllocator: Allocator<D, D>,
    {
        let mut sample = SampleState {
            s: Vec::new(),
            w: Vec::new(),
            rng,
        };
        sample.draw(count, state)?;
        Ok(sample)
    }

    fn draw(&mut self, count: usize, state: &KalmanState<N, D>) -> Result<N, EstimateError>
    where
        DefaultAllocator: Allocator<D, D>,
    {
        if count < 1 {
            return Err(EstimateError::configuration("sample count must be at least 1"));
        }
        state.check_dims()?;
        let rcond = state.check_psd()?;
        let G = cholesky::psd_sqrt(&state.X)
            .ok_or_else(|| EstimateError::configuration("state covariance not PSD"))?;
        let d = state.x.shape_generic().0;

        let rng = self.rng.as_mut();
        let s: Samples<N, D> = (0..count)
            .map(|_| &state.x + &G * normal_vector(d, &mut *rng))
            .collect();
        self.s = s;
        self.w = equal_weights(count);
        Ok(rcond)
    }

    /// Predict each sample in place with a sampled prediction function.
    ///
    /// `f` makes its own noise draws from the random number generator. Weights are unchanged.
    /// A prediction of the wrong size is never stored: it stops the prediction with `DimensionMismatch`,
    /// leaving the samples before it predicted.
    pub fn predict_sampled<F>(&mut self, f: F) -> Result<(), EstimateError>
    where
        F: Fn(&OVector<N, D>, &mut dyn RngCore) -> OVector<N, D>,
    {
        let rng = self.rng.as_mut();
        for si in self.s.iter_mut() {
            let pi = f(si, &mut *rng);
            EstimateError::check_dim("predicted sample", si.nrows(), pi.nrows())?;
            si.copy_from(&pi);
        }
        Ok(())
    }

    /// Weight the samples by the likelihood of an observation.
    pub fn observe<L>(&mut self, l: L) -> Result<(), EstimateError>
    where
        L: Fn(&OVector<N, D>) -> N,
    {
        let likelihoods = self.s.iter().map(l).collect();
        self.observe_likelihoods(likelihoods)
    }

    /// Weight the samples by precomputed likelihoods, one for each sample.
    ///
    /// Likelihoods must be non negative. If they are all zero this is a `DegenerateWeights` error.
    /// On any error the weights are unchanged.
    pub fn observe_likelihoods(&mut self, l: Likelihoods<N>) -> Result<(), EstimateError> {
        EstimateError::check_dim("likelihoods", self.w.len(), l.len())?;
        let mut sum = N::zero();
        for (wi, li) in self.w.iter().zip(&l) {
            if !(*li >= N::zero()) {
                return Err(EstimateError::numerical("likelihood negative or NaN"));
            }
            sum += *wi * *li;
        }
        if sum == N::zero() {
            return Err(EstimateError::DegenerateWeights { particles: self.w.len() });
        }
        if !sum.is_finite() {
            return Err(EstimateError::numerical("likelihood sum not finite"));
        }
        // Normalise in place
        for (wi, li) in self.w.iter_mut().zip(&l) {
            *wi = *wi * *li / sum;
        }
        Ok(())
    }

    /// Effective sample size `1 / sum(w^2)`.
    pub fn effective_sample_size(&self) -> N {
        let sum_sq = self.w.iter().fold(N::zero(), |acc, wi| acc + *wi * *wi);
        if sum_sq > N::zero() {
            N::one() / sum_sq
        } else {
            N::zero()
        }
    }

    /// The sample with the largest weight.
    pub fn max_weight_state(&self) -> Result<OVector<N, D>, EstimateError> {
        let mut best: Option<(usize, N)> = None;
        for (i, wi) in self.w.iter().enumerate() {
            match best {
                Some((_, wb)) if !(*wi > wb) => {}
                _ => best = Some((i, *wi)),
            }
        }
        best.map(|(i, _)| self.s[i].clone())
            .ok_or_else(|| EstimateError::configuration("empty sample set"))
    }

    /// Resample and roughen the samples, their weights become equal.
    ///
    /// Returns the number of unique samples kept.
    pub fn update_resample(
        &mut self,
        resampler: &mut Resampler<N>,
        roughener: &mut Roughener<N, D>,
    ) -> Result<u32, EstimateError> {
        let mut w = self.w.clone();
        let (resamples, unique) = resampler(&mut w, self.rng.as_mut())?;
        live_resample(&mut self.s, &resamples);
        roughener(&mut self.s, self.rng.as_mut());
        self.w = equal_weights(self.s.len());
        Ok(unique)
    }
}

impl<N: RealField + Copy, D: Dim> Estimator<N, D> for SampleState<N, D>
where
    DefaultAllocator: Allocator<D>,
{
    /// The weighted mean of the samples.
    fn state(&self) -> Result<OVector<N, D>, EstimateError> {
        let first = self
            .s
            .first()
            .ok_or_else(|| EstimateError::configuration("empty sample set"))?;
        let mut x = OVector::zeros_generic(first.shape_generic().0, U1);
        for (si, wi) in self.s.iter().zip(&self.w) {
            x.axpy(*wi, si, N::one());
        }
        Ok(x)
    }
}

impl<N: RealField + Copy, D: Dim> KalmanEstimator<N, D> for SampleState<N, D>
where
    DefaultAllocator: Allocator<D, D> + Allocator<D>,
{
    /// Draw a new sample set of the same size from the normal distribution of `state`.
    ///
    /// `DimensionMismatch` if `state` is not the size of the existing samples.
    fn init(&mut self, state: &KalmanState<N, D>) -> Result<N, EstimateError> {
        if let Some(s0) = self.s.first() {
            EstimateError::check_dim("state", s0.nrows(), state.x.nrows())?;
        }
        self.draw(self.s.len(), state)
    }

    /// Weighted mean and covariance of the samples.
    fn kalman_state(&self) -> Result<KalmanState<N, D>, EstimateError> {
        let x = self.state()?;
        let d = x.shape_generic().0;
        let mut X = OMatrix::zeros_generic(d, d);
        for (si, wi) in self.s.iter().zip(&self.w) {
            let sx = si - &x;
            X.ger(*wi, &sx, &sx, N::one());
        }
        Ok(KalmanState { x, X })
    }
}

fn equal_weights<N: RealField + Copy>(count: usize) -> Likelihoods<N> {
    let w = N::one() / na::convert::<f64, N>(count as f64);
    vec![w; count]
}

/// Replace the samples by the resampled set, each sample copied the number of times it was resampled.
fn live_resample<N: RealField + Copy, D: Dim>(s: &mut Samples<N, D>, resamples: &Resamples)
where
    DefaultAllocator: Allocator<D>,
{
    let mut resampled = Vec::with_capacity(s.len());
    for (si, &count) in s.iter().zip(resamples) {
        for _ in 0..count {
            resampled.push(si.clone());
        }
    }
    *s = resampled;
}

/// Replace the weights by their cumulative sum (Kahan algorithm), returning the total.
///
/// Negative or NaN weights are `NumericalInstability`, a zero total `DegenerateWeights`.
fn cumulative_weights<N: RealField + Copy>(w: &mut Likelihoods<N>) -> Result<N, EstimateError> {
    let mut wcum = N::zero();
    let mut c = N::zero();
    for wi in w.iter_mut() {
        if !(*wi >= N::zero()) {
            return Err(EstimateError::numerical("weight negative or NaN"));
        }
        let y = *wi - c;
        let t = wcum + y;
        c = t - wcum - y;
        wcum = t;
        *wi = t;
    }
    if wcum == N::zero() {
        return Err(EstimateError::DegenerateWeights { particles: w.len() });
    }
    if !wcum.is_finite() {
        return Err(EstimateError::numerical("cumulative weight not finite"));
    }
    Ok(wcum)
}

fn uniform01<N: RealField + Copy>(rng: &mut dyn RngCore) -> N {
    let u: f64 = Standard.sample(&mut *rng);
    na::convert(u)
}

/// Count, for each cumulative weight, the sorted positions that fall below it.
///
/// Positions beyond the final cumulative weight (only possible by round-off) are given to the last sample
/// with a non zero weight, so zero weight samples are never chosen.
fn select<N: RealField + Copy>(wcum: &[N], positions: impl Iterator<Item = N>, presamples: &mut Resamples) {
    let n = wcum.len();
    let last = (0..n)
        .rev()
        .find(|&i| wcum[i] > if i == 0 { N::zero() } else { wcum[i - 1] })
        .unwrap_or(0);
    let mut i = 0;
    for u in positions {
        while i < n && !(u < wcum[i]) {
            i += 1;
        }
        presamples[if i < n { i } else { last }] += 1;
    }
}

fn unique_count(presamples: &Resamples) -> u32 {
    presamples.iter().filter(|&&p| p > 0).count() as u32
}

/// Standard resampler.
///
/// A sample is chosen once for each time its cumulative weight exceeds a uniform random draw.
/// Complexity O(n log(n)) as the uniform draws are sorted so they can be compared with the ordered
/// cumulative weights. A draw is made from `rng` for each sample.
pub fn standard_resampler<N: RealField + Copy>(
    w: &mut Likelihoods<N>,
    rng: &mut dyn RngCore,
) -> Result<(Resamples, u32), EstimateError> {
    let wcum = cumulative_weights(w)?;
    let n = w.len();

    let mut ur: Vec<N> = (0..n).map(|_| uniform01::<N>(&mut *rng) * wcum).collect();
    ur.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    let mut presamples = vec![0; n];
    select(w, ur.into_iter(), &mut presamples);
    let unique = unique_count(&presamples);
    Ok((presamples, unique))
}

/// Systematic resampler.
///
/// A single uniform draw offsets `n` positions equally spaced by `1/n` of the total weight.
/// Complexity O(n).
pub fn systematic_resampler<N: RealField + Copy>(
    w: &mut Likelihoods<N>,
    rng: &mut dyn RngCore,
) -> Result<(Resamples, u32), EstimateError> {
    let wcum = cumulative_weights(w)?;
    let n = w.len();

    let step = wcum / na::convert::<f64, N>(n as f64);
    let u0 = uniform01::<N>(rng) * step;
    let positions = (0..n).map(|k| u0 + step * na::convert::<f64, N>(k as f64));

    let mut presamples = vec![0; n];
    select(w, positions, &mut presamples);
    let unique = unique_count(&presamples);
    Ok((presamples, unique))
}

/// Residual resampler.
///
/// Each sample is copied `floor(n * w)` times for its normalised weight `w`. The remaining draws are made
/// systematically from the residual weights.
pub fn residual_resampler<N: RealField + Copy>(
    w: &mut Likelihoods<N>,
    rng: &mut dyn RngCore,
) -> Result<(Resamples, u32), EstimateError> {
    let weights = w.clone();
    let wcum = cumulative_weights(w)?;
    let n = w.len();
    let scale = na::convert::<f64, N>(n as f64) / wcum;

    let mut presamples = vec![0u32; n];
    let mut residual = Vec::with_capacity(n);
    let mut copied = 0usize;
    for (i, wi) in weights.iter().enumerate() {
        let mut e = *wi * scale;
        while e >= N::one() && copied < n {
            e -= N::one();
            presamples[i] += 1;
            copied += 1;
        }
        residual.push(e.max(N::zero()));
    }

    let remaining = n - copied;
    if remaining > 0 {
        let mut rcum = N::zero();
        for ri in residual.iter_mut() {
            rcum += *ri;
            *ri = rcum;
        }
        let step = rcum / na::convert::<f64, N>(remaining as f64);
        let u0 = uniform01::<N>(rng) * step;
        let positions = (0..remaining).map(|k| u0 + step * na::convert::<f64, N>(k as f64));
        select(&residual, positions, &mut presamples);
    }
    let unique = unique_count(&presamples);
    Ok((presamples, unique))
}

/// Roughen the samples by adding normal noise scaled to their spread.
///
/// The noise standard deviation of each state component is `k * (max - min) * n^(-1/d)` for `n` samples of
/// dimension `d`.
pub fn roughen_minmax<N: RealField + Copy, D: Dim>(s: &mut Samples<N, D>, k: N, rng: &mut dyn RngCore)
where
    DefaultAllocator: Allocator<D>,
{
    let first = match s.first() {
        Some(first) => first,
        None => return,
    };
    let d = first.shape_generic().0;
    let x_size = first.nrows();
    if x_size == 0 {
        return;
    }

    let mut xmin = first.clone();
    let mut xmax = first.clone();
    for si in s.iter() {
        for i in 0..x_size {
            xmin[i] = xmin[i].min(si[i]);
            xmax[i] = xmax[i].max(si[i]);
        }
    }
    let n: N = na::convert(s.len() as f64);
    let exponent: N = na::convert(-1.0 / x_size as f64);
    let sigma = (xmax - xmin) * (k * n.powf(exponent));

    for si in s.iter_mut() {
        *si += sigma.component_mul(&normal_vector(d, &mut *rng));
    }
}

/// Point estimate reported by a [`ParticleFilter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParticleEstimate {
    /// Weighted mean of the samples
    WeightedMean,
    /// The sample with the largest weight
    MaxWeight,
}

/// Resampling algorithm used by a [`ParticleFilter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resampling {
    Systematic,
    Multinomial,
    Residual,
}

/// Options of a [`ParticleFilter`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SirOptions<N> {
    pub estimation: ParticleEstimate,
    /// Resample when the effective sample size falls below this fraction of the sample count.
    pub resample_threshold: N,
    pub resampling: Resampling,
    /// Roughening factor `k` of [`roughen_minmax`], applied after resampling.
    pub roughening: Option<N>,
}

impl<N: RealField + Copy> Default for SirOptions<N> {
    fn default() -> Self {
        SirOptions {
            estimation: ParticleEstimate::WeightedMean,
            resample_threshold: na::convert(0.5),
            resampling: Resampling::Systematic,
            roughening: None,
        }
    }
}

impl<N: RealField + Copy> SirOptions<N> {
    fn check(&self) -> Result<(), EstimateError> {
        if !(self.resample_threshold >= N::zero() && self.resample_threshold <= N::one()) {
            return Err(EstimateError::configuration("resample threshold must be within [0, 1]"));
        }
        if let Some(k) = self.roughening {
            if !(k >= N::zero()) {
                return Err(EstimateError::configuration("roughening factor must be non negative"));
            }
        }
        Ok(())
    }
}

/// The result of a particle filter correction.
#[derive(Debug, Clone)]
pub struct SampleCorrection<N: RealField, D: Dim>
where
    DefaultAllocator: Allocator<D>,
{
    /// State estimate, computed before any resampling
    pub state: OVector<N, D>,
    pub effective_sample_size: N,
    /// Whether the samples were resampled
    pub resampled: bool,
}

/// Sampling Importance Resampling particle filter.
///
/// `transition` predicts a sample, drawing its own process noise: `x(k+1) = f(x(k), aux, rng)`.
/// `likelihood` is the likelihood `l(x, z, aux)` of measurement `z` given state `x`.
pub struct ParticleFilter<N: RealField, D: Dim, ZD: Dim, F, L>
where
    DefaultAllocator: Allocator<D>,
{
    sample: SampleState<N, D>,
    transition: F,
    likelihood: L,
    z_dim: ZD,
    options: SirOptions<N>,
    step: u64,
}

impl<N: RealField + Copy, D: Dim, ZD: Dim, F, L> ParticleFilter<N, D, ZD, F, L>
where
    DefaultAllocator: Allocator<D> + Allocator<ZD>,
{
    /// A filter with `particle_count` samples drawn from the normal distribution of `initial_state`.
    ///
    /// `ConfigurationError` if `particle_count < 1`, the initial state is not valid or the options are out of range.
    pub fn new(
        transition: F,
        likelihood: L,
        particle_count: usize,
        initial_state: &KalmanState<N, D>,
        z_dim: ZD,
        options: SirOptions<N>,
        rng: Box<dyn RngCore>,
    ) -> Result<Self, EstimateError>
    where
        DefaultAllocator: Allocator<D, D>,
    {
        let sample = SampleState::new_from_kalman(particle_count, initial_state, rng)?;
        Self::with_samples(transition, likelihood, sample, z_dim, options)
    }

    /// A filter starting from an existing sample set.
    pub fn with_samples(
        transition: F,
        likelihood: L,
        sample: SampleState<N, D>,
        z_dim: ZD,
        options: SirOptions<N>,
    ) -> Result<Self, EstimateError> {
        if sample.s.is_empty() {
            return Err(EstimateError::configuration("sample count must be at least 1"));
        }
        EstimateError::check_dim("sample weights", sample.s.len(), sample.w.len())?;
        options.check()?;
        Ok(ParticleFilter {
            sample,
            transition,
            likelihood,
            z_dim,
            options,
            step: 0,
        })
    }

    /// Predict every sample one step forward, the weights are unchanged.
    ///
    /// Returns the state estimate after prediction.
    pub fn predict<A: ?Sized>(&mut self, aux: &A) -> Result<OVector<N, D>, EstimateError>
    where
        F: Fn(&OVector<N, D>, &A, &mut dyn RngCore) -> OVector<N, D>,
    {
        let transition = &self.transition;
        self.sample
            .predict_sampled(|x: &OVector<N, D>, rng: &mut dyn RngCore| transition(x, aux, rng))?;
        self.step += 1;
        trace!("sir predict, step {}", self.step);
        self.estimate()
    }

    /// Correct the samples' weights with the measurement `z`, resampling if they have degenerated.
    pub fn correct<A: ?Sized>(
        &mut self,
        z: &OVector<N, ZD>,
        aux: &A,
    ) -> Result<SampleCorrection<N, D>, EstimateError>
    where
        L: Fn(&OVector<N, D>, &OVector<N, ZD>, &A) -> N,
    {
        EstimateError::check_dim("measurement", self.z_dim.value(), z.nrows())?;
        let likelihood = &self.likelihood;
        self.sample.observe(|x: &OVector<N, D>| likelihood(x, z, aux))?;

        let state = self.estimate()?;
        let effective_sample_size = self.sample.effective_sample_size();
        let count: N = na::convert(self.sample.s.len() as f64);
        let resampled = effective_sample_size < self.options.resample_threshold * count;
        if resampled {
            let unique = self.resample()?;
            debug!(
                "resampled at step {}, effective sample size {}, {} unique",
                self.step, effective_sample_size, unique
            );
        }
        trace!("sir correct, step {}", self.step);
        Ok(SampleCorrection {
            state,
            effective_sample_size,
            resampled,
        })
    }

    /// Resample with the configured resampler and roughening.
    ///
    /// Returns the number of unique samples kept.
    pub fn resample(&mut self) -> Result<u32, EstimateError> {
        let mut resampler: fn(&mut Likelihoods<N>, &mut dyn RngCore) -> Result<(Resamples, u32), EstimateError> =
            match self.options.resampling {
                Resampling::Systematic => systematic_resampler,
                Resampling::Multinomial => standard_resampler,
                Resampling::Residual => residual_resampler,
            };
        let roughening = self.options.roughening;
        let mut roughener = move |s: &mut Samples<N, D>, rng: &mut dyn RngCore| {
            if let Some(k) = roughening {
                roughen_minmax(s, k, rng);
            }
        };
        self.sample.update_resample(&mut resampler, &mut roughener)
    }

    /// Point estimate according to the configured [`ParticleEstimate`].
    pub fn estimate(&self) -> Result<OVector<N, D>, EstimateError> {
        match self.options.estimation {
            ParticleEstimate::WeightedMean => self.sample.state(),
            ParticleEstimate::MaxWeight => self.sample.max_weight_state(),
        }
    }

    pub fn sample(&self) -> &SampleState<N, D> {
        &self.sample
    }

    pub fn options(&self) -> &SirOptions<N> {
        &self.options
    }

    /// Number of predictions made.
    pub fn step(&self) -> u64 {
        self.step
    }
}

impl<N: RealField + Copy, D: Dim, ZD: Dim, F, L> Estimator<N, D> for ParticleFilter<N, D, ZD, F, L>
where
    DefaultAllocator: Allocator<D> + Allocator<ZD>,
{
    fn state(&self) -> Result<OVector<N, D>, EstimateError> {
        self.estimate()
    }
}

impl<N: RealField + Copy, D: Dim, ZD: Dim, F, L> KalmanEstimator<N, D> for ParticleFilter<N, D, ZD, F, L>
where
    DefaultAllocator: Allocator<D, D> + Allocator<D> + Allocator<ZD>,
{
    fn init(&mut self, state: &KalmanState<N, D>) -> Result<N, EstimateError> {
        self.sample.init(state)
    }

    fn kalman_state(&self) -> Result<KalmanState<N, D>, EstimateError> {
        self.sample.kalman_state()
    }
}
