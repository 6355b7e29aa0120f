//! Numerical comparison of reciprocal condition numbers.
//!
//! Required for all linear algebra in models and filters.

use nalgebra::storage::RawStorage;
use nalgebra::{Dim, Matrix, RealField};

/// Estimate the reciprocal condition number of a diagonal matrix for inversion.
///
/// `d` holds the diagonal. The condition number is defined from a matrix norm:
/// the max element of `d` is the norm of the original matrix, the min element the norm of the inverse.
/// Therefore rcond = min/max.
///
/// Defined to be 0 for semi-definite and for an empty diagonal, 0 for max and min infinite,
/// and < 0 for a negative element or any NaN.
/// By definition rcond <= 1 as min <= max.
pub fn rcond_vec<N, R, C, S>(d: &Matrix<N, R, C, S>) -> N
where
    N: RealField + Copy,
    R: Dim,
    C: Dim,
    S: RawStorage<N, R, C>,
{
    let n = d.len();
    if n == 0 {
        return N::zero();
    }
    let mut mind = d[0];
    let mut maxd = mind;
    for i in 0..n {
        let di = d[i];
        if di != di {
            // NaN
            return -N::one();
        }
        if di < mind {
            mind = di;
        }
        if di > maxd {
            maxd = di;
        }
    }
    rcond_min_max(mind, maxd)
}

/// Estimate the reciprocal condition number from the diagonal of a symmetric (or factorised) matrix.
pub fn rcond_symmetric<N, R, C, S>(sm: &Matrix<N, R, C, S>) -> N
where
    N: RealField + Copy,
    R: Dim,
    C: Dim,
    S: RawStorage<N, R, C>,
{
    let n = sm.nrows().min(sm.ncols());
    if n == 0 {
        return N::zero();
    }
    let mut mind = sm[(0, 0)];
    let mut maxd = mind;
    for i in 0..n {
        let d = sm[(i, i)];
        if d != d {
            return -N::one();
        }
        if d < mind {
            mind = d;
        }
        if d > maxd {
            maxd = d;
        }
    }
    rcond_min_max(mind, maxd)
}

fn rcond_min_max<N: RealField + Copy>(mind: N, maxd: N) -> N {
    if mind < N::zero() {
        // matrix is negative, mind does not represent a rcond
        mind
    } else {
        let rcond = mind / maxd;
        if rcond != rcond {
            // NaN, singular due to (mind == maxd) == (zero or infinity)
            N::zero()
        } else {
            rcond
        }
    }
}
