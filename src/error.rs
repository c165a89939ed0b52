use std::{
    error::Error,
    fmt::{self, Display},
};

use crate::param::ParamId;

/// The result type used in the entire crate.
pub type Result<T> = std::result::Result<T, OptimErr>;

/// The optimizer crate's error type.
#[derive(Debug)]
pub enum OptimErr {
    InvalidHyperparameter {
        name: &'static str,
        value: f64,
        expected: &'static str,
    },
    UnsupportedGradientKind {
        id: ParamId,
    },
    ShapeMismatch {
        what: &'static str,
        got: Vec<usize>,
        expected: Vec<usize>,
    },
    InvalidRank {
        rank: usize,
        rows: usize,
        cols: usize,
    },
    Factorization(String),
    State(serde_json::Error),
}

impl Display for OptimErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptimErr::InvalidHyperparameter {
                name,
                value,
                expected,
            } => write!(f, "invalid {name}: {value}, should be {expected}"),
            OptimErr::UnsupportedGradientKind { id } => write!(
                f,
                "parameter {id} has a sparse gradient, only dense 2-D gradients are supported"
            ),
            OptimErr::ShapeMismatch {
                what,
                got,
                expected,
            } => write!(
                f,
                "there's a shape mismatch for {what}, got {got:?} and expected {expected:?}"
            ),
            OptimErr::InvalidRank { rank, rows, cols } => write!(
                f,
                "invalid rank {rank} for a {rows}x{cols} matrix, should be in [1, {}]",
                (*rows).min(*cols)
            ),
            OptimErr::Factorization(reason) => write!(f, "factorization failed: {reason}"),
            OptimErr::State(e) => write!(f, "optimizer state (de)serialization failed: {e}"),
        }
    }
}

impl Error for OptimErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            OptimErr::State(e) => Some(e),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for OptimErr {
    fn from(value: serde_json::Error) -> Self {
        Self::State(value)
    }
}
