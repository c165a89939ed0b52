//! Dense decompositions backing the factorizers, computed with `nalgebra` in `f64`.

use nalgebra::{DMatrix, SVD};
use ndarray::{Array1, Array2, ArrayView2, Axis};

use crate::error::{OptimErr, Result};

/// Caps the SVD iterations, a zero cap would let it run forever.
const SVD_SWEEPS_PER_DIM: usize = 100;

fn to_dmatrix(a: ArrayView2<f64>) -> DMatrix<f64> {
    let (rows, cols) = a.dim();
    DMatrix::from_fn(rows, cols, |i, j| a[[i, j]])
}

fn from_dmatrix(m: &DMatrix<f64>) -> Array2<f64> {
    Array2::from_shape_fn((m.nrows(), m.ncols()), |(i, j)| m[(i, j)])
}

/// Checks that every entry of `a` is finite.
///
/// # Returns
/// An error naming `what` if an entry is NaN or infinite.
pub fn check_finite(a: ArrayView2<f64>, what: &str) -> Result<()> {
    if !a.iter().all(|x| x.is_finite()) {
        return Err(OptimErr::Factorization(format!("{what} has non-finite entries")));
    }

    Ok(())
}

/// Thin SVD `a = u @ diag(s) @ vt` with the singular values in descending order.
///
/// # Returns
/// `u` (`rows x k`), `s` (`k`) and `vt` (`k x cols`) where `k = min(rows, cols)`, or an
/// error if `a` isn't finite or the decomposition doesn't converge.
pub fn exact_svd(a: ArrayView2<f64>) -> Result<(Array2<f64>, Array1<f64>, Array2<f64>)> {
    check_finite(a, "the SVD input")?;

    let max_niter = SVD_SWEEPS_PER_DIM * a.nrows().min(a.ncols()).max(1);
    let svd = SVD::try_new_unordered(to_dmatrix(a), true, true, f64::EPSILON, max_niter)
        .ok_or_else(|| OptimErr::Factorization("the SVD did not converge".into()))?;

    let (Some(u), Some(vt)) = (&svd.u, &svd.v_t) else {
        return Err(OptimErr::Factorization(
            "the SVD did not compute its singular vectors".into(),
        ));
    };

    let s: Vec<f64> = svd.singular_values.iter().copied().collect();
    let mut order: Vec<usize> = (0..s.len()).collect();
    order.sort_by(|&i, &j| s[j].total_cmp(&s[i]));

    let u = from_dmatrix(u).select(Axis(1), &order);
    let vt = from_dmatrix(vt).select(Axis(0), &order);
    let s = order.iter().map(|&i| s[i]).collect();

    Ok((u, s, vt))
}

/// Returns an orthonormal basis `q` (`rows x cols`) for the columns of a tall `a`.
pub fn orthonormalize(a: ArrayView2<f64>) -> Array2<f64> {
    from_dmatrix(&to_dmatrix(a).qr().q())
}

/// Solves `lhs @ x = rhs` for a square `lhs`.
///
/// # Returns
/// The solution or an error if `lhs` is singular.
pub fn solve(lhs: ArrayView2<f64>, rhs: ArrayView2<f64>) -> Result<Array2<f64>> {
    let x = to_dmatrix(lhs)
        .lu()
        .solve(&to_dmatrix(rhs))
        .ok_or_else(|| OptimErr::Factorization("singular linear system".into()))?;

    Ok(from_dmatrix(&x))
}
