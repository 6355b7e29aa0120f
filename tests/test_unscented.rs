//! Test the unscented Kalman filter.
//!
//! Linear systems are compared with the exact linear Kalman filter, the van der Pol oscillator with its
//! noisy measurements. Tests are performed with Dynamic matrices and matrices with fixed dimensions.

#![allow(non_snake_case)]

use approx::{assert_abs_diff_eq, assert_relative_eq};
use na::{Dyn, U2};
use na::{DMatrix, DVector, Matrix1, Matrix2, Vector1, Vector2};
use nalgebra as na;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};

use recursive_bayes::estimators::unscented::{UnscentedKalmanFilter, UnscentedParams, UnscentedWeights};
use recursive_bayes::models::{
    AdditiveObserve, AdditivePredict, Estimator, KalmanEstimator, KalmanState, NonAdditiveObserve,
    NonAdditivePredict,
};
use recursive_bayes::noise::{CorrelatedNoise, UncorrelatedNoise};
use recursive_bayes::EstimateError;
use systems::*;

mod systems;

fn classic_params() -> UnscentedParams<f64> {
    UnscentedParams {
        alpha: 1.,
        beta: 0.,
        kappa: 1.,
    }
}

#[test]
fn test_weights_sum_to_one() {
    for params in [UnscentedParams::default(), classic_params()] {
        for n in 1..=10 {
            let w = UnscentedWeights::new(n, &params).unwrap();
            assert_relative_eq!(w.mean_weight_sum(), 1., epsilon = 1e-9);
        }
    }
}

/// A noiseless constant velocity system, the estimate follows the truth exactly.
fn noiseless_linear_fixed() {
    let F = fx(U2);
    let predict = AdditivePredict::new(
        move |x: &Vector2<f64>, _: &()| F * x,
        CorrelatedNoise { Q: Matrix2::zeros() },
    );
    let observe = AdditiveObserve::new(
        |x: &Vector2<f64>, _: &()| hx(x),
        CorrelatedNoise {
            Q: Matrix1::new(1e-4),
        },
    );

    let x0 = Vector2::new(1., 0.5);
    let mut ukf = UnscentedKalmanFilter::new(
        predict,
        observe,
        KalmanState::new(x0, Matrix2::identity() * 0.01).unwrap(),
        UnscentedParams::default(),
    )
    .unwrap();

    let mut truth = x0;
    for _ in 0..10 {
        truth = F * truth;
        ukf.predict(&()).unwrap();
        let corrected = ukf.correct(&hx(&truth), &()).unwrap();
        assert_abs_diff_eq!(corrected.innovation[0], 0., epsilon = 1e-6);
        assert_abs_diff_eq!(corrected.state.x, truth, epsilon = 1e-6);
    }
    assert_eq!(ukf.step(), 10);
}

fn noiseless_linear_dynamic() {
    let F = fx(Dyn(2));
    let FP = F.clone();
    let predict = AdditivePredict::new(
        move |x: &DVector<f64>, _: &()| &FP * x,
        CorrelatedNoise {
            Q: DMatrix::<f64>::zeros(2, 2),
        },
    );
    let observe = AdditiveObserve::new(
        |x: &DVector<f64>, _: &()| hx(x),
        CorrelatedNoise {
            Q: Matrix1::new(1e-4),
        },
    );

    let x0 = DVector::from_vec(vec![1., 0.5]);
    let mut ukf = UnscentedKalmanFilter::new(
        predict,
        observe,
        KalmanState::new(x0.clone(), DMatrix::identity(2, 2) * 0.01).unwrap(),
        UnscentedParams::default(),
    )
    .unwrap();

    let mut truth = x0;
    for _ in 0..10 {
        truth = &F * &truth;
        ukf.predict(&()).unwrap();
        let corrected = ukf.correct(&hx(&truth), &()).unwrap();
        assert_abs_diff_eq!(corrected.innovation[0], 0., epsilon = 1e-6);
        assert_abs_diff_eq!(corrected.state.x, truth, epsilon = 1e-6);
    }
    assert_eq!(ukf.step(), 10);
}

#[test]
fn test_noiseless_linear() {
    noiseless_linear_fixed();
    noiseless_linear_dynamic();
}

fn compare_with_linear_kalman(params: UnscentedParams<f64>, epsilon: f64) {
    let Q = Matrix2::new(1e-4, 0., 0., V_NOISE * V_NOISE * DT);
    let F = fx(U2);
    let predict = AdditivePredict::new(move |x: &Vector2<f64>, _: &()| F * x, CorrelatedNoise { Q });
    let observe = AdditiveObserve::new(
        |x: &Vector2<f64>, _: &()| hx(x),
        CorrelatedNoise {
            Q: Matrix1::new(OBS_NOISE),
        },
    );

    let mut x = Vector2::new(0., 1.);
    let mut X = Matrix2::new(1., 0., 0., 0.5);
    let mut ukf = UnscentedKalmanFilter::new(predict, observe, KalmanState::new(x, X).unwrap(), params).unwrap();

    for z in [0.12, 0.19, 0.33, 0.41, 0.48, 0.66] {
        kalman_predict(&mut x, &mut X, &Q);
        let predicted = ukf.predict(&()).unwrap();
        assert_relative_eq!(predicted.x, x, epsilon = epsilon);
        assert_relative_eq!(predicted.X, X, epsilon = epsilon);

        let S = X[(0, 0)] + OBS_NOISE;
        let innovation = z - x[0];
        kalman_observe(&mut x, &mut X, z, OBS_NOISE);
        let corrected = ukf.correct(&Vector1::new(z), &()).unwrap();
        assert_relative_eq!(corrected.innovation[0], innovation, epsilon = epsilon);
        assert_relative_eq!(corrected.innovation_covariance[(0, 0)], S, epsilon = epsilon);
        assert_relative_eq!(corrected.state.x, x, epsilon = epsilon);
        assert_relative_eq!(corrected.state.X, X, epsilon = epsilon);
    }
    assert_relative_eq!(ukf.state().unwrap(), x, epsilon = epsilon);
}

#[test]
fn test_linear_kalman_equivalence() {
    compare_with_linear_kalman(classic_params(), 1e-9);
    compare_with_linear_kalman(UnscentedParams::default(), 1e-8);
}

#[test]
fn test_predict_twice_advances_twice() {
    let F = fx(U2);
    let predict = AdditivePredict::new(
        move |x: &Vector2<f64>, _: &()| F * x,
        CorrelatedNoise {
            Q: Matrix2::identity() * 0.01,
        },
    );
    let observe = AdditiveObserve::new(
        |x: &Vector2<f64>, _: &()| hx(x),
        CorrelatedNoise {
            Q: Matrix1::new(OBS_NOISE),
        },
    );
    let initial = KalmanState::new(Vector2::new(0., 1.), Matrix2::identity()).unwrap();
    let mut ukf = UnscentedKalmanFilter::new(predict, observe, initial, UnscentedParams::default()).unwrap();

    let once = ukf.predict(&()).unwrap();
    let twice = ukf.predict(&()).unwrap();
    assert_eq!(ukf.step(), 2);
    assert_relative_eq!(once.x, Vector2::new(DT, 1.), epsilon = 1e-9);
    assert_relative_eq!(twice.x, Vector2::new(2. * DT, 1.), epsilon = 1e-9);
    assert!(twice.X[(0, 0)] > once.X[(0, 0)]);
}

#[test]
fn test_non_additive_predict_matches_additive() {
    let Q = Matrix2::new(1e-4, 0., 0., V_NOISE * V_NOISE * DT);
    let F = fx(U2);
    let initial = KalmanState::new(Vector2::new(0.3, -1.), Matrix2::new(1., 0.2, 0.2, 0.5)).unwrap();

    for params in [classic_params(), UnscentedParams::default()] {
        let mut additive = UnscentedKalmanFilter::new(
            AdditivePredict::new(move |x: &Vector2<f64>, _: &()| F * x, CorrelatedNoise { Q }),
            AdditiveObserve::new(|x: &Vector2<f64>, _: &()| hx(x), CorrelatedNoise { Q: Matrix1::new(OBS_NOISE) }),
            initial.clone(),
            params,
        )
        .unwrap();
        let mut non_additive = UnscentedKalmanFilter::new(
            NonAdditivePredict::new(
                move |x: &Vector2<f64>, _: &(), w: &Vector2<f64>| F * x + w,
                CorrelatedNoise { Q },
            ),
            NonAdditiveObserve::new(
                |x: &Vector2<f64>, _: &(), v: &Vector1<f64>| Vector1::new(x[0] + v[0]),
                CorrelatedNoise { Q: Matrix1::new(OBS_NOISE) },
            ),
            initial.clone(),
            params,
        )
        .unwrap();

        let a = additive.predict(&()).unwrap();
        let n = non_additive.predict(&()).unwrap();
        assert_relative_eq!(a.x, n.x, epsilon = 1e-8);
        assert_relative_eq!(a.X, n.X, epsilon = 1e-8);

        let z = Vector1::new(0.5);
        let a = additive.correct(&z, &()).unwrap();
        let n = non_additive.correct(&z, &()).unwrap();
        assert_relative_eq!(a.state.x, n.state.x, epsilon = 1e-8);
        assert_relative_eq!(a.state.X, n.state.X, epsilon = 1e-8);
    }
}

#[test]
fn test_control_input() {
    // Position driven by a velocity input
    let predict = AdditivePredict::new(
        |x: &Vector1<f64>, u: &f64| x + Vector1::new(u * DT),
        CorrelatedNoise {
            Q: Matrix1::new(0.01),
        },
    );
    let observe = AdditiveObserve::new(
        |x: &Vector1<f64>, _: &f64| *x,
        CorrelatedNoise {
            Q: Matrix1::new(OBS_NOISE),
        },
    );
    let initial = KalmanState::new(Vector1::new(0.), Matrix1::new(1.)).unwrap();
    let mut ukf = UnscentedKalmanFilter::new(predict, observe, initial, UnscentedParams::default()).unwrap();

    let predicted = ukf.predict(&2.).unwrap();
    assert_relative_eq!(predicted.x[0], 2. * DT, epsilon = 1e-9);
    assert_relative_eq!(predicted.X[(0, 0)], 1.01, epsilon = 1e-9);
}

fn identity_models(
    n: usize,
) -> (
    AdditivePredict<f64, Dyn, impl Fn(&DVector<f64>, &()) -> DVector<f64>>,
    AdditiveObserve<f64, Dyn, impl Fn(&DVector<f64>, &()) -> DVector<f64>>,
) {
    (
        AdditivePredict::new(
            |x: &DVector<f64>, _: &()| x.clone(),
            CorrelatedNoise {
                Q: DMatrix::identity(n, n) * 0.01,
            },
        ),
        AdditiveObserve::new(
            |x: &DVector<f64>, _: &()| x.clone(),
            CorrelatedNoise {
                Q: DMatrix::identity(n, n) * OBS_NOISE,
            },
        ),
    )
}

#[test]
fn test_measurement_dimension_mismatch() {
    let (predict, observe) = identity_models(4);
    let initial = KalmanState::new(DVector::zeros(4), DMatrix::identity(4, 4)).unwrap();
    let mut ukf = UnscentedKalmanFilter::new(predict, observe, initial.clone(), UnscentedParams::default()).unwrap();

    let err = ukf.correct(&DVector::from_element(3, 1.), &()).unwrap_err();
    assert_eq!(
        err,
        EstimateError::DimensionMismatch {
            context: "measurement",
            expected: 4,
            actual: 3
        }
    );
    assert_eq!(ukf.kalman_state().unwrap(), initial);

    // A measurement of the right size is accepted
    assert!(ukf.correct(&DVector::from_element(4, 1.), &()).is_ok());
}

#[test]
fn test_configuration_errors() {
    assert!(matches!(
        KalmanState::new(DVector::<f64>::zeros(2), DMatrix::identity(3, 3)),
        Err(EstimateError::Configuration { .. })
    ));

    // Inconsistent initial state
    let (predict, observe) = identity_models(2);
    let inconsistent = KalmanState::<f64, Dyn> {
        x: DVector::zeros(2),
        X: DMatrix::identity(3, 3),
    };
    assert!(matches!(
        UnscentedKalmanFilter::new(predict, observe, inconsistent, UnscentedParams::default()),
        Err(EstimateError::Configuration { .. })
    ));

    // Covariance not PSD
    let (predict, observe) = identity_models(2);
    let indefinite = KalmanState::<f64, Dyn> {
        x: DVector::zeros(2),
        X: DMatrix::from_row_slice(2, 2, &[1., 2., 2., 1.]),
    };
    assert!(matches!(
        UnscentedKalmanFilter::new(predict, observe, indefinite, UnscentedParams::default()),
        Err(EstimateError::Configuration { .. })
    ));

    // Bad scaling
    let (predict, observe) = identity_models(2);
    let initial = KalmanState::new(DVector::zeros(2), DMatrix::identity(2, 2)).unwrap();
    let params = UnscentedParams {
        alpha: 0.,
        ..UnscentedParams::default()
    };
    assert!(matches!(
        UnscentedKalmanFilter::new(predict, observe, initial.clone(), params),
        Err(EstimateError::Configuration { .. })
    ));

    // Non-additive noise without any noise dimensions
    let (_, observe) = identity_models(2);
    let predict = NonAdditivePredict::new(
        |x: &DVector<f64>, _: &(), _w: &DVector<f64>| x.clone(),
        CorrelatedNoise::<f64, Dyn> {
            Q: DMatrix::zeros(0, 0),
        },
    );
    assert!(matches!(
        UnscentedKalmanFilter::new(predict, observe, initial.clone(), UnscentedParams::default()),
        Err(EstimateError::Configuration { .. })
    ));

    // Additive noise of the wrong size
    let (_, observe) = identity_models(2);
    let predict = AdditivePredict::new(
        |x: &DVector<f64>, _: &()| x.clone(),
        CorrelatedNoise::<f64, Dyn> {
            Q: DMatrix::identity(3, 3),
        },
    );
    assert!(matches!(
        UnscentedKalmanFilter::new(predict, observe, initial, UnscentedParams::default()),
        Err(EstimateError::Configuration { .. })
    ));
}

#[test]
fn test_singular_covariance_is_numerical_instability() {
    let (predict, observe) = identity_models(2);
    let initial = KalmanState::new(DVector::from_element(2, 1.), DMatrix::zeros(2, 2)).unwrap();
    let mut ukf = UnscentedKalmanFilter::new(predict, observe, initial.clone(), UnscentedParams::default()).unwrap();

    assert!(matches!(
        ukf.predict(&()),
        Err(EstimateError::NumericalInstability { .. })
    ));
    assert_eq!(ukf.step(), 0);
    assert_eq!(ukf.kalman_state().unwrap(), initial);
}

#[test]
fn test_collapsed_prediction_is_numerical_instability() {
    // Every state predicts to the origin, without process noise
    let predict = AdditivePredict::new(
        |_x: &Vector2<f64>, _: &()| Vector2::zeros(),
        CorrelatedNoise { Q: Matrix2::zeros() },
    );
    let observe = AdditiveObserve::new(
        |x: &Vector2<f64>, _: &()| hx(x),
        CorrelatedNoise {
            Q: Matrix1::new(OBS_NOISE),
        },
    );
    let initial = KalmanState::new(Vector2::new(1., 2.), Matrix2::identity()).unwrap();
    let mut ukf = UnscentedKalmanFilter::new(predict, observe, initial.clone(), UnscentedParams::default()).unwrap();

    assert!(matches!(
        ukf.predict(&()),
        Err(EstimateError::NumericalInstability { .. })
    ));
    assert_eq!(ukf.step(), 0);
    assert_eq!(ukf.kalman_state().unwrap(), initial);
}

#[test]
fn test_exact_full_observation_is_numerical_instability() {
    // Observing the whole state without noise leaves no uncertainty
    let predict = AdditivePredict::new(
        |x: &Vector2<f64>, _: &()| *x,
        CorrelatedNoise {
            Q: Matrix2::identity() * 0.01,
        },
    );
    let observe = AdditiveObserve::new(
        |x: &Vector2<f64>, _: &()| *x,
        CorrelatedNoise {
            Q: Matrix2::<f64>::zeros(),
        },
    );
    let initial = KalmanState::new(Vector2::new(1., 2.), Matrix2::identity()).unwrap();
    let mut ukf = UnscentedKalmanFilter::new(predict, observe, initial.clone(), UnscentedParams::default()).unwrap();

    let err = ukf.correct(&Vector2::new(1.5, 2.5), &()).unwrap_err();
    assert_eq!(
        err,
        EstimateError::NumericalInstability {
            description: "corrected state covariance not PD".to_string()
        }
    );
    assert_eq!(ukf.kalman_state().unwrap(), initial);
}

#[test]
fn test_init_and_sigma_points() {
    let (predict, observe) = identity_models(2);
    let initial = KalmanState::new(DVector::zeros(2), DMatrix::identity(2, 2)).unwrap();
    let mut ukf = UnscentedKalmanFilter::new(predict, observe, initial, UnscentedParams::default()).unwrap();

    let state = KalmanState::new(DVector::from_vec(vec![1., 2.]), DMatrix::from_diagonal_element(2, 2, 4.)).unwrap();
    assert_relative_eq!(ukf.init(&state).unwrap(), 1.);
    assert_eq!(ukf.state().unwrap(), state.x);

    let UU = ukf.sigma_points().unwrap();
    assert_eq!(UU.len(), 5);
    assert_eq!(UU[0], state.x);
    assert_relative_eq!(&UU[1] + &UU[2], &state.x * 2., epsilon = 1e-12);

    let wrong_size = KalmanState::new(DVector::zeros(3), DMatrix::identity(3, 3)).unwrap();
    assert!(matches!(
        ukf.init(&wrong_size),
        Err(EstimateError::DimensionMismatch { .. })
    ));
}

#[test]
fn test_van_der_pol_round_trip() {
    let predict = AdditivePredict::new(
        |x: &Vector2<f64>, _: &()| vdp_step(x, VDP_DT),
        CorrelatedNoise::from_uncorrelated(&UncorrelatedNoise {
            q: Vector2::new(0.02, 0.1),
        }),
    );
    // Multiplicative measurement noise
    let observe = NonAdditiveObserve::new(
        |x: &Vector2<f64>, _: &(), v: &Vector1<f64>| Vector1::new(x[0] * (1. + v[0])),
        CorrelatedNoise {
            Q: Matrix1::new(0.2),
        },
    );
    let initial = KalmanState::new(Vector2::new(2., 0.), Matrix2::identity() * 0.01).unwrap();
    let mut ukf = UnscentedKalmanFilter::new(predict, observe, initial, UnscentedParams::default()).unwrap();

    let mut rng = StdRng::seed_from_u64(1);
    let v_noise = Normal::new(0., 0.2f64.sqrt()).unwrap();
    let mut truth = Vector2::new(2., 0.);
    let mut estimate_error = 0.;
    let mut measurement_error = 0.;
    let steps = 100;
    for _ in 0..steps {
        let z = Vector1::new(truth[0] * (1. + v_noise.sample(&mut rng)));
        let corrected = ukf.correct(&z, &()).unwrap();
        estimate_error += (corrected.state.x[0] - truth[0]).powi(2);
        measurement_error += (z[0] - truth[0]).powi(2);

        ukf.predict(&()).unwrap();
        truth = vdp_truth(&truth, VDP_DT);
    }
    assert!(
        estimate_error < measurement_error,
        "estimate mse {} not below measurement mse {}",
        estimate_error / steps as f64,
        measurement_error / steps as f64
    );
    assert_eq!(ukf.step(), steps);
}
