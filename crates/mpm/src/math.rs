//! 3x3 matrix helpers shared by the constitutive kernels.
//!
//! Everything operates on full 3x3 double matrices regardless of the
//! problem dimension; unused rows and columns stay zero.

use nalgebra::{Matrix3, Vector3};

/// Traceless part of a tensor: `M - tr(M)/3 * I`.
#[inline]
pub fn deviator(m: &Matrix3<f64>) -> Matrix3<f64> {
    m - Matrix3::identity() * (m.trace() / 3.0)
}

/// Polar decomposition `F = R * U` with `R` proper-orthogonal and `U`
/// symmetric positive-definite, computed through the SVD:
/// `F = W * S * V^T  =>  R = W * V^T,  U = V * S * V^T`.
///
/// Returns `None` when the SVD fails to converge. Callers treat that as
/// fatal; it is not observed on well-conditioned deformation gradients.
pub fn polar_decompose(f: &Matrix3<f64>) -> Option<(Matrix3<f64>, Matrix3<f64>)> {
    let svd = nalgebra::linalg::SVD::try_new(*f, true, true, 1.0e-13, 200)?;
    let w = svd.u?;
    let v_t = svd.v_t?;
    let s = Matrix3::from_diagonal(&Vector3::new(
        svd.singular_values[0],
        svd.singular_values[1],
        svd.singular_values[2],
    ));
    let r = w * v_t;
    let u = v_t.transpose() * s * v_t;
    Some((r, u))
}

/// Frobenius norm.
#[inline]
pub fn norm(m: &Matrix3<f64>) -> f64 {
    m.norm()
}
