use log::debug;
use rand::{SeedableRng, rngs::StdRng};

use crate::{
    element::Element,
    error::{OptimErr, Result},
    factorization::{AlternatingNmf, Factorizer, RandomizedSvd},
    optimization::{LowRankAdamW, LowRankLion, Optimizer, SubspaceAdamW},
    specs::{FactorizerSpec, OptimizerConfig, OptimizerSpec},
};

/// Builds new `Optimizer`s given a specification.
#[derive(Debug, Default)]
pub struct OptimizerBuilder;

impl OptimizerBuilder {
    /// Creates a new `OptimizerBuilder`.
    pub fn new() -> Self {
        Self
    }

    /// Builds an optimizer following a spec.
    ///
    /// # Arguments
    /// * `config` - The specification of the optimizer.
    ///
    /// # Returns
    /// A new optimizer or an error if a hyperparameter is out of range.
    pub fn build<E: Element>(&self, config: OptimizerConfig) -> Result<Box<dyn Optimizer<E>>> {
        debug!("building {:?} with seed {:?}", config.optimizer, config.seed);
        self.resolve_factorizer(config)
    }

    /// Generates a random number generator given (or not) a seed.
    ///
    /// # Arguments
    /// * `seed` - An optional seed for the rng.
    fn generate_rng(&self, seed: Option<u64>) -> StdRng {
        match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        }
    }

    /// Resolves the `Factorizer` for this optimizer.
    ///
    /// # Arguments
    /// * `config` - The specification of the optimizer.
    ///
    /// # Returns
    /// A new optimizer or an error if encountered.
    fn resolve_factorizer<E: Element>(
        &self,
        config: OptimizerConfig,
    ) -> Result<Box<dyn Optimizer<E>>> {
        match config.factorizer {
            FactorizerSpec::RandomizedSvd { oversample } => {
                let rng = self.generate_rng(config.seed);
                let factorizer = RandomizedSvd::new(rng).with_oversample(oversample);
                self.resolve_optimizer(config.optimizer, factorizer)
            }
            FactorizerSpec::Nmf {
                iterations,
                epsilon,
            } => {
                if !(epsilon >= 0.) {
                    return Err(OptimErr::InvalidHyperparameter {
                        name: "nmf epsilon",
                        value: epsilon,
                        expected: ">= 0.0",
                    });
                }

                let factorizer = AlternatingNmf::new(iterations, epsilon);
                self.resolve_optimizer(config.optimizer, factorizer)
            }
        }
    }

    /// Resolves the `Optimizer` itself.
    ///
    /// # Arguments
    /// * `spec` - The specification of the optimizer's hyperparameters.
    /// * `factorizer` - A resolved factorizer, unused by the subspace optimizer.
    ///
    /// # Returns
    /// A new optimizer or an error if a hyperparameter is out of range.
    fn resolve_optimizer<E, F>(
        &self,
        spec: OptimizerSpec,
        factorizer: F,
    ) -> Result<Box<dyn Optimizer<E>>>
    where
        E: Element,
        F: Factorizer + 'static,
    {
        let optimizer: Box<dyn Optimizer<E>> = match spec {
            OptimizerSpec::LowRankAdamw(config) => {
                Box::new(LowRankAdamW::with_factorizer(config, factorizer)?)
            }
            OptimizerSpec::LowRankLion(config) => {
                Box::new(LowRankLion::with_factorizer(config, factorizer)?)
            }
            OptimizerSpec::Subspace(config) => Box::new(SubspaceAdamW::new(config)?),
        };

        Ok(optimizer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optimization::{AdamWConfig, LionConfig, SubspaceConfig};

    fn config(optimizer: OptimizerSpec) -> OptimizerConfig {
        OptimizerConfig {
            optimizer,
            factorizer: FactorizerSpec::default(),
            seed: Some(42),
        }
    }

    #[test]
    fn builds_every_variant() {
        let builder = OptimizerBuilder::new();

        let adamw = builder
            .build::<f32>(config(OptimizerSpec::LowRankAdamw(AdamWConfig::default())))
            .unwrap();
        let lion = builder
            .build::<f32>(config(OptimizerSpec::LowRankLion(LionConfig::default())))
            .unwrap();
        let subspace = builder
            .build::<f32>(config(OptimizerSpec::Subspace(SubspaceConfig::default())))
            .unwrap();

        assert_eq!(adamw.name(), "low-rank adamw");
        assert_eq!(lion.name(), "low-rank lion");
        assert_eq!(subspace.name(), "subspace adamw");
    }

    #[test]
    fn invalid_hyperparameters_fail_the_build() {
        let spec = OptimizerSpec::LowRankAdamw(AdamWConfig {
            weight_decay: -1.,
            ..Default::default()
        });

        assert!(matches!(
            OptimizerBuilder::new().build::<f64>(config(spec)),
            Err(OptimErr::InvalidHyperparameter { name: "weight decay", .. })
        ));
    }

    #[test]
    fn negative_nmf_epsilon_fails_the_build() {
        let config = OptimizerConfig {
            optimizer: OptimizerSpec::LowRankLion(LionConfig::default()),
            factorizer: FactorizerSpec::Nmf {
                iterations: 2,
                epsilon: -1.,
            },
            seed: None,
        };

        assert!(matches!(
            OptimizerBuilder::new().build::<f64>(config),
            Err(OptimErr::InvalidHyperparameter { name: "nmf epsilon", .. })
        ));
    }
}
