use log::{debug, trace};
use ndarray::{ArrayView2, ArrayViewMut2, Zip};
use serde::{Deserialize, Serialize};

use super::{
    LionConfig, Optimizer, StateMap,
    optimizer::{check_state_shape, decay_weights},
};
use crate::{
    element::Element,
    error::Result,
    factorization::{Factorizer, LowRank, RandomizedSvd, check_rank, linalg},
    param::ParamId,
};

/// The state `LowRankLion` keeps for every parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LowRankLionState<E> {
    pub step: usize,
    pub m: LowRank<E>,
}

impl<E: Element> LowRankLionState<E> {
    fn zeros(shape: (usize, usize), rank: usize) -> Result<Self> {
        check_rank(rank, shape.0, shape.1)?;

        Ok(Self {
            step: 0,
            m: LowRank::zeros(shape, rank),
        })
    }
}

/// Lion (sign momentum) whose momentum is stored as a rank-`r` factorization.
///
/// `beta1` blends the momentum used for the current sign update while `beta2` blends the
/// momentum persisted for the next step.
#[derive(Debug)]
pub struct LowRankLion<E, F = RandomizedSvd> {
    config: LionConfig,
    factorizer: F,
    states: StateMap<LowRankLionState<E>>,
}

impl<E: Element> LowRankLion<E> {
    /// Creates a new `LowRankLion` factorizing with a randomized SVD seeded by the OS.
    ///
    /// # Returns
    /// An error if a hyperparameter is out of range.
    pub fn new(config: LionConfig) -> Result<Self> {
        Self::with_factorizer(config, RandomizedSvd::from_os_rng())
    }
}

impl<E: Element, F: Factorizer> LowRankLion<E, F> {
    /// Creates a new `LowRankLion`.
    ///
    /// # Arguments
    /// * `config` - The hyperparameters.
    /// * `factorizer` - Compresses the momentum after every step.
    ///
    /// # Returns
    /// An error if a hyperparameter is out of range.
    pub fn with_factorizer(config: LionConfig, factorizer: F) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            config,
            factorizer,
            states: StateMap::new(),
        })
    }

    pub fn config(&self) -> &LionConfig {
        &self.config
    }

    pub fn state(&self, id: ParamId) -> Option<&LowRankLionState<E>> {
        self.states.get(id)
    }

    pub fn states(&self) -> &StateMap<LowRankLionState<E>> {
        &self.states
    }
}

/// The sign of `x`, zero for zero.
fn sign(x: f64) -> f64 {
    if x > 0. {
        1.
    } else if x < 0. {
        -1.
    } else {
        0.
    }
}

impl<E: Element, F: Factorizer> Optimizer<E> for LowRankLion<E, F> {
    fn name(&self) -> &'static str {
        "low-rank lion"
    }

    fn update(
        &mut self,
        id: ParamId,
        mut value: ArrayViewMut2<E>,
        grad: ArrayView2<E>,
    ) -> Result<()> {
        let LionConfig {
            learning_rate: lr,
            betas: (b1, b2),
            weight_decay,
            rank,
        } = self.config;

        let g = grad.mapv(E::to_f64);
        linalg::check_finite(g.view(), "the gradient")?;

        let shape = g.dim();
        let state = self.states.get_or_try_insert_with(id, || {
            debug!(
                param = id.get(), rows = shape.0, cols = shape.1, rank = rank;
                "allocating low-rank lion state"
            );
            LowRankLionState::zeros(shape, rank)
        })?;
        check_state_shape(state.m.shape(), shape)?;

        let prior = state.m.to_f64();
        let m = prior.reconstruct();

        let persisted = &m * b2 + &g * (1. - b2);
        let next = self.factorizer.factorize(persisted.view(), &prior, rank)?;

        Zip::from(&mut value)
            .and(&m)
            .and(&g)
            .for_each(|p, &m, &g| {
                let update = sign(b1 * m + (1. - b1) * g);
                *p = E::from_f64(p.to_f64() - lr * update);
            });

        decay_weights(&mut value, lr, weight_decay);

        state.step += 1;
        state.m = next.cast();

        trace!(param = id.get(), step = state.step; "low-rank lion update");
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
