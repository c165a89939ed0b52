use log::{debug, trace};
use ndarray::{ArrayView2, ArrayViewMut2, Zip};
use serde::{Deserialize, Serialize};

use super::{
    AdamWConfig, Optimizer, StateMap,
    optimizer::{adam_step_size, check_state_shape, decay_weights},
};
use crate::{
    element::Element,
    error::Result,
    factorization::{Factorizer, LowRank, RandomizedSvd, check_rank, linalg},
    param::ParamId,
};

/// The state `LowRankAdamW` keeps for every parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LowRankAdamState<E> {
    pub step: usize,
    /// First moment, the EMA of the gradient.
    pub m: LowRank<E>,
    /// Second moment, the EMA of the squared gradient.
    pub sq: LowRank<E>,
}

impl<E: Element> LowRankAdamState<E> {
    fn zeros(shape: (usize, usize), rank: usize) -> Result<Self> {
        check_rank(rank, shape.0, shape.1)?;

        Ok(Self {
            step: 0,
            m: LowRank::zeros(shape, rank),
            sq: LowRank::zeros(shape, rank),
        })
    }
}

/// AdamW whose first and second moments are stored as rank-`r` factorizations.
///
/// Each step the stored moments are reconstructed, blended with the new gradient and
/// factorized again. The dense blends drive the current update, only what is kept for the
/// next step is compressed.
#[derive(Debug)]
pub struct LowRankAdamW<E, F = RandomizedSvd> {
    config: AdamWConfig,
    factorizer: F,
    states: StateMap<LowRankAdamState<E>>,
}

impl<E: Element> LowRankAdamW<E> {
    /// Creates a new `LowRankAdamW` factorizing with a randomized SVD seeded by the OS.
    ///
    /// # Returns
    /// An error if a hyperparameter is out of range.
    pub fn new(config: AdamWConfig) -> Result<Self> {
        Self::with_factorizer(config, RandomizedSvd::from_os_rng())
    }
}

impl<E: Element, F: Factorizer> LowRankAdamW<E, F> {
    /// Creates a new `LowRankAdamW`.
    ///
    /// # Arguments
    /// * `config` - The hyperparameters.
    /// * `factorizer` - Compresses the moments after every step.
    ///
    /// # Returns
    /// An error if a hyperparameter is out of range.
    pub fn with_factorizer(config: AdamWConfig, factorizer: F) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            config,
            factorizer,
            states: StateMap::new(),
        })
    }

    pub fn config(&self) -> &AdamWConfig {
        &self.config
    }

    pub fn state(&self, id: ParamId) -> Option<&LowRankAdamState<E>> {
        self.states.get(id)
    }

    pub fn states(&self) -> &StateMap<LowRankAdamState<E>> {
        &self.states
    }
}

impl<E: Element, F: Factorizer> Optimizer<E> for LowRankAdamW<E, F> {
    fn name(&self) -> &'static str {
        "low-rank adamw"
    }

    fn update(
        &mut self,
        id: ParamId,
        mut value: ArrayViewMut2<E>,
        grad: ArrayView2<E>,
    ) -> Result<()> {
        let AdamWConfig {
            learning_rate: lr,
            betas: (b1, b2),
            epsilon: eps,
            weight_decay,
            correct_bias,
            rank,
        } = self.config;

        let g = grad.mapv(E::to_f64);
        linalg::check_finite(g.view(), "the gradient")?;

        let shape = g.dim();
        let state = self.states.get_or_try_insert_with(id, || {
            debug!(
                param = id.get(), rows = shape.0, cols = shape.1, rank = rank;
                "allocating low-rank adamw state"
            );
            LowRankAdamState::zeros(shape, rank)
        })?;
        check_state_shape(state.m.shape(), shape)?;

        let prior_m = state.m.to_f64();
        let prior_sq = state.sq.to_f64();

        let m = prior_m.reconstruct() * b1 + &g * (1. - b1);
        let sq = prior_sq.reconstruct() * b2 + g.mapv(|x| x * x) * (1. - b2);

        let next_m = self.factorizer.factorize(m.view(), &prior_m, rank)?;
        let next_sq = self.factorizer.factorize(sq.view(), &prior_sq, rank)?;

        state.step += 1;
        let step_size = adam_step_size(lr, (b1, b2), state.step, correct_bias);

        // The low-rank reconstruction of a non-negative matrix may dip below zero.
        Zip::from(&mut value)
            .and(&m)
            .and(&sq)
            .for_each(|p, &m, &sq| {
                let denom = sq.abs().sqrt() + eps;
                *p = E::from_f64(p.to_f64() - step_size * m / denom);
            });

        decay_weights(&mut value, lr, weight_decay);

        state.m = next_m.cast();
        state.sq = next_sq.cast();

        trace!(
            param = id.get(), step = state.step, step_size = step_size;
            "low-rank adamw update"
        );
        Ok(())
    }

    fn export_state(&self) -> Result<String> {
        self.states.to_json()
    }

    fn import_state(&mut self, json: &str) -> Result<()> {
        self.states = StateMap::from_json(json)?;
        Ok(())
    }
}
