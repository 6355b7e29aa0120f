//! Matrix helpers.
//!
//! Conversion between the caller's (possibly fixed size) dimensions and the dynamic matrices used for
//! sigma point arithmetic, where augmented dimensions are only known at run time.

use nalgebra as na;
use na::storage::RawStorage;
use na::{allocator::Allocator, DMatrix, DVector, DefaultAllocator, Dim, Matrix, OMatrix, OVector, RealField, U1};

/// Copy any matrix into a dynamic matrix.
pub fn to_dynamic<N, R, C, S>(m: &Matrix<N, R, C, S>) -> DMatrix<N>
where
    N: RealField + Copy,
    R: Dim,
    C: Dim,
    S: RawStorage<N, R, C>,
{
    DMatrix::from_iterator(m.nrows(), m.ncols(), m.iter().copied())
}

/// Copy any vector into a dynamic vector.
pub fn to_dynamic_vector<N, R, S>(v: &Matrix<N, R, U1, S>) -> DVector<N>
where
    N: RealField + Copy,
    R: Dim,
    S: RawStorage<N, R, U1>,
{
    DVector::from_iterator(v.nrows(), v.iter().copied())
}

/// Copy a dynamic matrix into a matrix of dimensions `r`, `c`.
///
/// The sizes must agree.
pub fn from_dynamic<N: RealField + Copy, R: Dim, C: Dim>(r: R, c: C, m: &DMatrix<N>) -> OMatrix<N, R, C>
where
    DefaultAllocator: Allocator<R, C>,
{
    debug_assert_eq!((r.value(), c.value()), m.shape());
    OMatrix::from_iterator_generic(r, c, m.iter().copied())
}

/// Copy rows `start..start + r` of a dynamic vector into a vector of dimension `r`.
pub fn from_dynamic_rows<N: RealField + Copy, R: Dim>(r: R, v: &DVector<N>, start: usize) -> OVector<N, R>
where
    DefaultAllocator: Allocator<R>,
{
    debug_assert!(start + r.value() <= v.nrows());
    OVector::from_iterator_generic(r, U1, v.iter().skip(start).take(r.value()).copied())
}

/// Copy a dynamic vector into a vector of dimension `r`.
pub fn from_dynamic_vector<N: RealField + Copy, R: Dim>(r: R, v: &DVector<N>) -> OVector<N, R>
where
    DefaultAllocator: Allocator<R>,
{
    debug_assert_eq!(r.value(), v.nrows());
    from_dynamic_rows(r, v, 0)
}

/// Block diagonal combination `[A 0; 0 B]` of two square matrices.
pub fn block_diagonal<N: RealField + Copy>(a: &DMatrix<N>, b: &DMatrix<N>) -> DMatrix<N> {
    let n = a.nrows();
    let q = b.nrows();
    let mut m = DMatrix::zeros(n + q, n + q);
    for j in 0..n {
        for i in 0..n {
            m[(i, j)] = a[(i, j)];
        }
    }
    for j in 0..q {
        for i in 0..q {
            m[(n + i, n + j)] = b[(i, j)];
        }
    }
    m
}
