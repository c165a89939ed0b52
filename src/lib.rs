pub mod builder;
pub mod element;
pub mod error;
pub mod factorization;
pub mod optimization;
pub mod param;
pub mod specs;

pub use builder::OptimizerBuilder;
pub use element::Element;
pub use error::{OptimErr, Result};
pub use optimization::{LowRankAdamW, LowRankLion, Optimizer, SubspaceAdamW};
pub use param::{Gradient, Param, ParamId, SparseGradient};
pub use specs::{FactorizerSpec, OptimizerConfig, OptimizerSpec};
