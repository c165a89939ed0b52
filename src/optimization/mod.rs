mod config;
mod lowrank_adamw;
mod lowrank_lion;
mod optimizer;
mod state;
mod subspace;

pub use config::{AdamWConfig, LionConfig, SubspaceConfig};
pub use lowrank_adamw::{LowRankAdamState, LowRankAdamW};
pub use lowrank_lion::{LowRankLion, LowRankLionState};
pub use optimizer::Optimizer;
pub use state::StateMap;
pub use subspace::{SubspaceAdamW, SubspaceState};
