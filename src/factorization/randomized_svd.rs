use ndarray::{Array2, ArrayView2, s};
use ndarray_rand::RandomExt;
use rand::{Rng, SeedableRng, rngs::StdRng};
use rand_distr::StandardNormal;

use super::{Factorizer, LowRank, linalg, lowrank::check_rank};
use crate::error::Result;

/// Approximates `a` with a rank-`rank` factorization using a Gaussian sketch.
///
/// The sketch `a @ omega` is orthonormalized into `q`, then the small `q^T @ a` is decomposed
/// exactly and its left singular vectors are lifted back with `q`. The sketch is `rank +
/// oversample` columns wide (capped at `min(rows, cols)`) and truncated back to `rank`.
///
/// # Arguments
/// * `a` - The `rows x cols` matrix to factorize.
/// * `rank` - The target rank.
/// * `oversample` - Extra sketch columns.
/// * `rng` - The source of the Gaussian test matrix.
///
/// # Returns
/// The factorization or an error if the rank is invalid, `a` isn't finite or the small SVD
/// fails.
pub fn randomized_svd<R: Rng + ?Sized>(
    a: ArrayView2<f64>,
    rank: usize,
    oversample: usize,
    rng: &mut R,
) -> Result<LowRank<f64>> {
    let (rows, cols) = a.dim();
    check_rank(rank, rows, cols)?;
    linalg::check_finite(a, "the randomized SVD input")?;

    let width = (rank + oversample).min(rows).min(cols);
    let omega = Array2::<f64>::random_using((cols, width), StandardNormal, rng);

    let y = a.dot(&omega);
    let q = linalg::orthonormalize(y.view());
    let b = q.t().dot(&a);
    let (u_hat, sv, vt) = linalg::exact_svd(b.view())?;

    Ok(LowRank {
        u: q.dot(&u_hat.slice(s![.., ..rank])),
        s: sv.slice(s![..rank]).to_owned(),
        v: vt.slice(s![..rank, ..]).to_owned(),
    })
}

/// The default factorizer, a randomized SVD with an owned random number generator.
#[derive(Debug, Clone)]
pub struct RandomizedSvd<R = StdRng> {
    rng: R,
    oversample: usize,
}

impl<R: Rng> RandomizedSvd<R> {
    /// Creates a new `RandomizedSvd` without oversampling.
    ///
    /// # Arguments
    /// * `rng` - The generator used to draw every sketch.
    pub fn new(rng: R) -> Self {
        Self { rng, oversample: 0 }
    }

    /// Sets the amount of extra sketch columns drawn before truncating to the target rank.
    pub fn with_oversample(mut self, oversample: usize) -> Self {
        self.oversample = oversample;
        self
    }

    pub fn oversample(&self) -> usize {
        self.oversample
    }
}

impl RandomizedSvd<StdRng> {
    /// Creates a new deterministic `RandomizedSvd`.
    pub fn seeded(seed: u64) -> Self {
        Self::new(StdRng::seed_from_u64(seed))
    }

    /// Creates a new `RandomizedSvd` seeded from the operating system.
    pub fn from_os_rng() -> Self {
        Self::new(StdRng::from_os_rng())
    }
}

impl<R: Rng> Factorizer for RandomizedSvd<R> {
    fn factorize(
        &mut self,
        a: ArrayView2<f64>,
        _prior: &LowRank<f64>,
        rank: usize,
    ) -> Result<LowRank<f64>> {
        randomized_svd(a, rank, self.oversample, &mut self.rng)
    }
}
