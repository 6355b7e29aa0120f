#![allow(non_snake_case)]

//! Cholesky and Modified Cholesky factorisations.
//!
//! UdU' factorisation of positive semi-definite matrices. Where:
//! U is unit upper triangular
//! d is diagonal
//!
//! Storage:
//! UD format of UdU' factor
//! strict_upper_triangle(UD) = strict_upper_triangle(U), diagonal(UD) = d, strict_lower_triangle(UD) ignored or zeroed

use nalgebra as na;
use na::storage::StorageMut;
use na::{allocator::Allocator, Cholesky, DMatrix, DefaultAllocator, Dim, Matrix, OMatrix, RealField};

use super::rcond;

/// In place modified upper triangular Cholesky factor of a positive definite or semi-definite matrix M.
///
/// Reference: A+G p.219 right side of table, with the diagonal updated before it is tested
///
/// Input: M, n=last column to be included in factorisation, strict lower triangle of M is ignored in computation
///
/// Output: M as UdU' factor
///
/// strict_upper_triangle(M) = strict_upper_triangle(U), diagonal(M) = d,
/// strict_lower_triangle(M) is unmodified
///
/// Return: reciprocal condition number, -1 if negative, 0 if semi-definite (including zero)
pub fn UdUfactor<N, D, S>(M: &mut Matrix<N, D, D, S>, n: usize) -> N
where
    N: RealField + Copy,
    D: Dim,
    S: StorageMut<N, D, D>,
{
    let zero = N::zero();
    for j in (0..n).rev() {
        // Diagonal element, updated by the columns already factorised
        let mut d = M[(j, j)];
        for k in j + 1..n {
            d -= M[(j, k)] * M[(j, k)] * M[(k, k)];
        }

        if d > zero {
            // Positive definite
            M[(j, j)] = d;
            for i in (0..j).rev() {
                let mut e = M[(i, j)];
                for k in j + 1..n {
                    e -= M[(i, k)] * M[(k, k)] * M[(j, k)];
                }
                M[(i, j)] = e / d;
            }
        } else if d == zero {
            // Possibly semi-definite, the whole column must be identically zero
            M[(j, j)] = zero;
            for i in 0..j {
                let mut e = M[(i, j)];
                for k in j + 1..n {
                    e -= M[(i, k)] * M[(k, k)] * M[(j, k)];
                }
                if e != zero {
                    return -N::one();
                }
                M[(i, j)] = zero;
            }
        } else {
            // Negative, or NaN
            return -N::one();
        }
    }

    rcond::rcond_symmetric(&*M)
}

/// Reciprocal condition number of a symmetric matrix, computed from its UdU' factor.
///
/// Negative if the matrix is not positive semi-definite. The matrix itself is not modified.
pub fn UdUrcond<N: RealField + Copy, D: Dim>(M: &OMatrix<N, D, D>) -> N
where
    DefaultAllocator: Allocator<D, D>,
{
    let mut UD = M.clone();
    let n = UD.nrows();
    UdUfactor(&mut UD, n)
}

/// A square root `G` of a positive semi-definite matrix such that `G * G' = M`.
///
/// `G` is upper triangular, built from the UdU' factor as `U * sqrt(d)`.
/// Returns `None` if `M` is not positive semi-definite.
pub fn psd_sqrt<N: RealField + Copy, D: Dim>(M: &OMatrix<N, D, D>) -> Option<OMatrix<N, D, D>>
where
    DefaultAllocator: Allocator<D, D>,
{
    let mut G = M.clone();
    let n = G.nrows();
    if UdUfactor(&mut G, n) < N::zero() {
        return None;
    }
    for j in 0..n {
        let sd = G[(j, j)].sqrt();
        G[(j, j)] = sd;
        for i in 0..j {
            G[(i, j)] *= sd;
        }
        for i in j + 1..n {
            G[(i, j)] = N::zero();
        }
    }
    Some(G)
}

/// Cholesky factor of a strictly positive definite matrix.
///
/// Unlike [`Matrix::cholesky`] a zero pivot is rejected.
pub fn cholesky_pd<N: RealField + Copy>(M: &DMatrix<N>) -> Option<Cholesky<N, na::Dyn>> {
    let chol = M.clone().cholesky()?;
    if chol.l_dirty().diagonal().iter().all(|d| *d > N::zero()) {
        Some(chol)
    } else {
        None
    }
}
