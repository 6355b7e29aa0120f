//! Operation of the unscented Kalman filter on a van der Pol oscillator.
//!
//! The oscillator is observed in its first state with multiplicative noise, modeled as non-additive noise.

use na::{Matrix1, Matrix2, Vector1, Vector2};
use nalgebra as na;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};

use recursive_bayes::estimators::unscented::{UnscentedKalmanFilter, UnscentedParams};
use recursive_bayes::models::{AdditivePredict, KalmanState, NonAdditiveObserve};
use recursive_bayes::noise::{CorrelatedNoise, UncorrelatedNoise};
use recursive_bayes::EstimateError;

const DT: f64 = 0.05;
const MU: f64 = 1.0;

/// Euler step of the oscillator.
fn vdp(x: &Vector2<f64>, dt: f64) -> Vector2<f64> {
    x + Vector2::new(x[1], MU * (1.0 - x[0] * x[0]) * x[1] - x[0]) * dt
}

fn main() -> Result<(), EstimateError> {
    env_logger::init();

    let predict = AdditivePredict::new(
        |x: &Vector2<f64>, _: &()| vdp(x, DT),
        CorrelatedNoise::from_uncorrelated(&UncorrelatedNoise {
            q: Vector2::new(0.02, 0.1),
        }),
    );
    // Measurement z = x1 * (1 + v)
    let observe = NonAdditiveObserve::new(
        |x: &Vector2<f64>, _: &(), v: &Vector1<f64>| Vector1::new(x[0] * (1.0 + v[0])),
        CorrelatedNoise {
            Q: Matrix1::new(0.2),
        },
    );
    let initial = KalmanState::new(Vector2::new(2.0, 0.0), Matrix2::identity() * 0.01)?;
    let mut ukf = UnscentedKalmanFilter::new(predict, observe, initial, UnscentedParams::default())?;

    let mut rng = rand::rngs::StdRng::seed_from_u64(1);
    let v_noise = Normal::new(0.0, 0.2f64.sqrt()).map_err(|e| EstimateError::Configuration {
        description: e.to_string(),
    })?;

    let mut truth = Vector2::new(2.0, 0.0);
    let mut estimate_mse = 0.0;
    let mut measurement_mse = 0.0;
    let steps = 100;
    for k in 0..steps {
        let z = Vector1::new(truth[0] * (1.0 + v_noise.sample(&mut rng)));
        let corrected = ukf.correct(&z, &())?;
        println!(
            "{:3} truth {:8.4} measured {:8.4} estimate {:8.4} innovation {:8.4}",
            k, truth[0], z[0], corrected.state.x[0], corrected.innovation[0]
        );
        estimate_mse += (corrected.state.x[0] - truth[0]).powi(2) / steps as f64;
        measurement_mse += (z[0] - truth[0]).powi(2) / steps as f64;

        ukf.predict(&())?;
        // Finer integration for the truth
        for _ in 0..10 {
            truth = vdp(&truth, DT / 10.0);
        }
    }
    println!("estimate mse {:.5}, measurement mse {:.5}", estimate_mse, measurement_mse);
    Ok(())
}
