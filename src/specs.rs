use serde::{Deserialize, Serialize};

use crate::optimization::{AdamWConfig, LionConfig, SubspaceConfig};

/// The specification for the `Optimizer` trait.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptimizerSpec {
    LowRankAdamw(AdamWConfig),
    LowRankLion(LionConfig),
    Subspace(SubspaceConfig),
}

/// The specification for the `Factorizer` trait.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FactorizerSpec {
    RandomizedSvd {
        #[serde(default)]
        oversample: usize,
    },
    Nmf {
        iterations: usize,
        epsilon: f64,
    },
}

impl Default for FactorizerSpec {
    fn default() -> Self {
        Self::RandomizedSvd { oversample: 0 }
    }
}

/// The specification of a whole optimizer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OptimizerConfig {
    pub optimizer: OptimizerSpec,
    #[serde(default)]
    pub factorizer: FactorizerSpec,
    #[serde(default)]
    pub seed: Option<u64>,
}
