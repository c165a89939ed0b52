use ndarray::ArrayView2;

use super::LowRank;
use crate::error::Result;

/// Produces the rank-`r` factorizations the low-rank optimizers store their moments in.
///
/// Implementations must return a `rows x rank` left factor, `rank` weights and a
/// `rank x cols` right factor, so they can be swapped for one another.
pub trait Factorizer {
    /// Factorizes a dense matrix.
    ///
    /// # Arguments
    /// * `a` - The `rows x cols` matrix to factorize.
    /// * `prior` - The factorization stored on the previous step, with the same shape and rank.
    /// * `rank` - The target rank.
    ///
    /// # Returns
    /// The new factorization or an error if the decomposition fails.
    fn factorize(
        &mut self,
        a: ArrayView2<f64>,
        prior: &LowRank<f64>,
        rank: usize,
    ) -> Result<LowRank<f64>>;
}
