//! Linear algebra support for the estimators.

pub mod cholesky;
pub mod rcond;

use nalgebra::storage::StorageMut;
use nalgebra::{Dim, Matrix, RealField};

/// Symmetrize a square matrix in place: M = (M + M') / 2
///
/// Removes the round-off asymmetry that accumulates in covariance updates.
pub fn symmetrize<N, D, S>(m: &mut Matrix<N, D, D, S>)
where
    N: RealField + Copy,
    D: Dim,
    S: StorageMut<N, D, D>,
{
    let half: N = nalgebra::convert(0.5);
    let n = m.nrows();
    for j in 0..n {
        for i in 0..j {
            let mean = (m[(i, j)] + m[(j, i)]) * half;
            m[(i, j)] = mean;
            m[(j, i)] = mean;
        }
    }
}
