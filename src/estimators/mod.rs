//! A collection of Bayesian state estimators.

pub mod sir;
pub mod unscented;
