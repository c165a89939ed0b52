mod factorizer;
pub mod linalg;
mod lowrank;
mod nmf;
mod randomized_svd;

pub use factorizer::Factorizer;
pub use lowrank::LowRank;
pub(crate) use lowrank::check_rank;
pub use nmf::{AlternatingNmf, nmf};
pub use randomized_svd::{RandomizedSvd, randomized_svd};
