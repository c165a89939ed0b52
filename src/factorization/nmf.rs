use ndarray::{Array1, Array2, ArrayView2, Axis};

use super::{Factorizer, LowRank, linalg, lowrank::check_rank};
use crate::error::{OptimErr, Result};

/// Approximates `a` as `w @ h` with non-negative factors using alternating least squares.
///
/// The factors are seeded from `prior` by splitting its weights evenly between both sides,
/// `w = u @ diag(sqrt(s))` and `h = diag(sqrt(s)) @ v`. Every iteration solves for `h` with
/// `w` fixed and then for `w` with `h` fixed, each through a `rank x rank` system regularized
/// by `epsilon * I`, clamping negative entries to zero.
///
/// # Arguments
/// * `a` - The `rows x cols` matrix to factorize.
/// * `prior` - A previous factorization with the same shape and rank.
/// * `rank` - The target rank.
/// * `iterations` - The amount of alternating rounds.
/// * `epsilon` - The ridge added to the normal equations.
///
/// # Returns
/// The factorization `(w, ones(rank), h)` or an error if the rank or the prior are invalid,
/// `a` isn't finite or a system is singular.
pub fn nmf(
    a: ArrayView2<f64>,
    prior: &LowRank<f64>,
    rank: usize,
    iterations: usize,
    epsilon: f64,
) -> Result<LowRank<f64>> {
    let (rows, cols) = a.dim();
    check_rank(rank, rows, cols)?;
    linalg::check_finite(a, "the nmf input")?;

    if prior.shape() != (rows, cols) || prior.rank() != rank {
        return Err(OptimErr::ShapeMismatch {
            what: "nmf prior",
            got: vec![prior.shape().0, prior.rank(), prior.shape().1],
            expected: vec![rows, rank, cols],
        });
    }

    let root = prior.s.mapv(|s| s.max(0.).sqrt());
    let mut w = &prior.u * &root;
    let mut h = &prior.v * &root.view().insert_axis(Axis(1));

    if w.iter().all(|&x| x == 0.) {
        w = seed_from_columns(a, rank);
    }

    let ridge = Array2::<f64>::eye(rank) * epsilon;

    for _ in 0..iterations {
        let wtw = w.t().dot(&w) + &ridge;
        let wta = w.t().dot(&a);
        h = linalg::solve(wtw.view(), wta.view())?.mapv_into(|x| x.max(0.));

        let hht = h.dot(&h.t()) + &ridge;
        let aht = a.dot(&h.t());
        w = linalg::solve(hht.t(), aht.t())?
            .reversed_axes()
            .mapv_into(|x| x.max(0.));
    }

    Ok(LowRank {
        u: w,
        s: Array1::ones(rank),
        v: h,
    })
}

/// Builds a non-negative left factor out of the magnitudes of `a`'s leading columns, used
/// when the prior carries no information.
fn seed_from_columns(a: ArrayView2<f64>, rank: usize) -> Array2<f64> {
    let cols = a.ncols();
    Array2::from_shape_fn((a.nrows(), rank), |(i, k)| a[[i, k % cols]].abs())
}

/// Alternating non-negative least squares, swappable with the randomized SVD.
#[derive(Debug, Clone, Copy)]
pub struct AlternatingNmf {
    iterations: usize,
    epsilon: f64,
}

impl AlternatingNmf {
    /// Creates a new `AlternatingNmf`.
    ///
    /// # Arguments
    /// * `iterations` - The amount of alternating rounds per call.
    /// * `epsilon` - The ridge added to the normal equations.
    pub fn new(iterations: usize, epsilon: f64) -> Self {
        Self {
            iterations,
            epsilon,
        }
    }
}

impl Default for AlternatingNmf {
    fn default() -> Self {
        Self::new(2, 1e-12)
    }
}

impl Factorizer for AlternatingNmf {
    fn factorize(
        &mut self,
        a: ArrayView2<f64>,
        prior: &LowRank<f64>,
        rank: usize,
    ) -> Result<LowRank<f64>> {
        nmf(a, prior, rank, self.iterations, self.epsilon)
    }
}
