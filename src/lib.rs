//! Recursive Bayesian state estimation.
//! Copyright (c) 2020 Michael Stevens
//!
//! Bayesian Filtering is a probabilistic technique for data fusion. The technique combines a concise mathematical formulation of a system with observations of that system.
//! Probabilities are used to represent the state of a system, likelihood functions to represent their relationships.
//!
//! For discrete systems the Bayesian formulation results in a naturally iterative data fusion solution. At each time step the estimator's belief
//! is advanced through a dynamics model (predict) and then a new noisy measurement is folded in with Bayes' rule (correct).
//!
//! Two estimators are provided:
//! - [`estimators::unscented`]: the Julier-Uhlmann 'Unscented' Kalman filter. The belief is a Gaussian [`models::KalmanState`]
//!   which is propagated through non-linear models by deterministic sigma points.
//! - [`estimators::sir`]: a Sampling Importance Resampling particle filter. The belief is a weighted set of samples and can represent
//!   arbitrary, multimodal distributions.
//!
//! Prediction and observation models are supplied by the caller as closures. Additive and non-additive noise are distinct model types chosen
//! when an estimator is constructed. Every operation returns the updated belief so the caller always holds it explicitly.
//!
//! All estimators are generic over the numeric type and the state dimension so both fixed size (`U2`, `U4`) and `Dyn` matrices can be used.
//!
//! # Licensing
//!
//! Permission is hereby granted, free of charge, to any person obtaining a copy of this software and associated documentation files (the "Software"), to deal in the Software without restriction,
//! including without limitation the rights to use, copy, modify, merge, publish, distribute, sublicense, and/or sell copies of the Software,
//! and to permit persons to whom the Software is furnished to do so, subject to the following conditions:
//!
//! The above copyright notice and this permission notice shall be included in all copies or substantial portions of the Software.
//!
//! THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
//! FITNESS FOR A PARTICULAR PURPOSE AND NON INFRINGEMENT. IN NO EVENT SHALL THE AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER LIABILITY,
//! WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM, OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE SOFTWARE.

pub mod error;
pub mod estimators;
pub mod linalg;
pub mod matrix;
pub mod models;
pub mod noise;

pub use error::EstimateError;
