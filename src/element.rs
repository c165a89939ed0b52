use std::fmt::Debug;

use half::{bf16, f16};
use serde::{Serialize, de::DeserializeOwned};

/// The storage type of parameters, gradients and optimizer state.
///
/// Every computation runs in `f64`, elements are only widened when read and narrowed
/// back when written.
pub trait Element:
    Copy + Debug + PartialEq + Send + Sync + Serialize + DeserializeOwned + 'static
{
    const ZERO: Self;

    /// Narrows an `f64` into this storage type.
    fn from_f64(value: f64) -> Self;

    /// Widens this value into an `f64`.
    fn to_f64(self) -> f64;
}

impl Element for f32 {
    const ZERO: Self = 0.;

    fn from_f64(value: f64) -> Self {
        value as f32
    }

    fn to_f64(self) -> f64 {
        f64::from(self)
    }
}

impl Element for f64 {
    const ZERO: Self = 0.;

    fn from_f64(value: f64) -> Self {
        value
    }

    fn to_f64(self) -> f64 {
        self
    }
}

impl Element for bf16 {
    const ZERO: Self = bf16::ZERO;

    fn from_f64(value: f64) -> Self {
        bf16::from_f64(value)
    }

    fn to_f64(self) -> f64 {
        bf16::to_f64(self)
    }
}

impl Element for f16 {
    const ZERO: Self = f16::ZERO;

    fn from_f64(value: f64) -> Self {
        f16::from_f64(value)
    }

    fn to_f64(self) -> f64 {
        f16::to_f64(self)
    }
}
