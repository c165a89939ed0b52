use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

use crate::{
    element::Element,
    error::{OptimErr, Result},
};

/// A rank-`r` factorization `u @ diag(s) @ v` of a `rows x cols` matrix.
///
/// `u` is `rows x r`, `s` holds `r` non-negative weights and `v` is `r x cols`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LowRank<T> {
    pub u: Array2<T>,
    pub s: Array1<T>,
    pub v: Array2<T>,
}

impl<T: Element> LowRank<T> {
    /// Creates an all-zero factorization, which reconstructs to the zero matrix.
    ///
    /// # Arguments
    /// * `shape` - The `(rows, cols)` of the reconstructed matrix.
    /// * `rank` - The inner dimension.
    pub fn zeros((rows, cols): (usize, usize), rank: usize) -> Self {
        Self {
            u: Array2::from_elem((rows, rank), T::ZERO),
            s: Array1::from_elem(rank, T::ZERO),
            v: Array2::from_elem((rank, cols), T::ZERO),
        }
    }

    /// Returns the `(rows, cols)` of the reconstructed matrix.
    pub fn shape(&self) -> (usize, usize) {
        (self.u.nrows(), self.v.ncols())
    }

    pub fn rank(&self) -> usize {
        self.s.len()
    }

    /// Widens every factor to `f64`.
    pub fn to_f64(&self) -> LowRank<f64> {
        LowRank {
            u: self.u.mapv(T::to_f64),
            s: self.s.mapv(T::to_f64),
            v: self.v.mapv(T::to_f64),
        }
    }

    /// Rebuilds the dense `rows x cols` matrix in `f64`.
    pub fn reconstruct(&self) -> Array2<f64> {
        let LowRank { u, s, v } = self.to_f64();
        (u * &s).dot(&v)
    }
}

impl LowRank<f64> {
    /// Narrows every factor to the storage type `E`.
    pub fn cast<E: Element>(&self) -> LowRank<E> {
        LowRank {
            u: self.u.mapv(E::from_f64),
            s: self.s.mapv(E::from_f64),
            v: self.v.mapv(E::from_f64),
        }
    }
}

/// Checks that `rank` is usable for a `rows x cols` matrix.
pub(crate) fn check_rank(rank: usize, rows: usize, cols: usize) -> Result<()> {
    if rank == 0 || rank > rows.min(cols) {
        return Err(OptimErr::InvalidRank { rank, rows, cols });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use half::bf16;
    use ndarray::array;

    use super::*;

    #[test]
    fn zeros_reconstruct_to_zero() {
        let lr = LowRank::<bf16>::zeros((3, 5), 2);

        assert_eq!(lr.shape(), (3, 5));
        assert_eq!(lr.rank(), 2);
        assert!(lr.reconstruct().iter().all(|&x| x == 0.));
    }

    #[test]
    fn reconstruct_scales_columns_of_u() {
        let lr = LowRank {
            u: array![[1., 0.], [0., 1.]],
            s: array![2., 3.],
            v: array![[1., 1.], [0., 1.]],
        };

        assert_eq!(lr.reconstruct(), array![[2., 2.], [0., 3.]]);
    }

    #[test]
    fn rank_bounds() {
        assert!(check_rank(0, 4, 4).is_err());
        assert!(check_rank(5, 4, 8).is_err());
        assert!(check_rank(4, 4, 8).is_ok());
    }
}
