use serde::{Deserialize, Serialize};

use crate::error::{OptimErr, Result};

/// Hyperparameters of `LowRankAdamW`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdamWConfig {
    pub learning_rate: f64,
    pub betas: (f64, f64),
    pub epsilon: f64,
    pub weight_decay: f64,
    pub correct_bias: bool,
    pub rank: usize,
}

impl Default for AdamWConfig {
    fn default() -> Self {
        Self {
            learning_rate: 1e-3,
            betas: (0.9, 0.999),
            epsilon: 1e-8,
            weight_decay: 0.01,
            correct_bias: true,
            rank: 4,
        }
    }
}

impl AdamWConfig {
    /// Checks every hyperparameter is within its valid range.
    pub fn validate(&self) -> Result<()> {
        check_non_negative("learning rate", self.learning_rate)?;
        check_beta("beta1", self.betas.0)?;
        check_beta("beta2", self.betas.1)?;
        check_non_negative("epsilon", self.epsilon)?;
        check_non_negative("weight decay", self.weight_decay)?;
        check_positive("rank", self.rank)
    }
}

/// Hyperparameters of `LowRankLion`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LionConfig {
    pub learning_rate: f64,
    pub betas: (f64, f64),
    pub weight_decay: f64,
    pub rank: usize,
}

impl Default for LionConfig {
    fn default() -> Self {
        Self {
            learning_rate: 1e-3,
            betas: (0.95, 0.98),
            weight_decay: 0.05,
            rank: 4,
        }
    }
}

impl LionConfig {
    /// Checks every hyperparameter is within its valid range.
    pub fn validate(&self) -> Result<()> {
        check_non_negative("learning rate", self.learning_rate)?;
        check_beta("beta1", self.betas.0)?;
        check_beta("beta2", self.betas.1)?;
        check_non_negative("weight decay", self.weight_decay)?;
        check_positive("rank", self.rank)
    }
}

/// Hyperparameters of `SubspaceAdamW`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubspaceConfig {
    pub learning_rate: f64,
    pub betas: (f64, f64),
    pub epsilon: f64,
    pub weight_decay: f64,
    pub correct_bias: bool,
    pub rank: usize,
    /// The amount of steps between projector refreshes.
    pub refresh_period: usize,
}

impl Default for SubspaceConfig {
    fn default() -> Self {
        Self {
            learning_rate: 1e-3,
            betas: (0.9, 0.999),
            epsilon: 1e-8,
            weight_decay: 0.01,
            correct_bias: true,
            rank: 4,
            refresh_period: 100,
        }
    }
}

impl SubspaceConfig {
    /// Checks every hyperparameter is within its valid range.
    pub fn validate(&self) -> Result<()> {
        check_non_negative("learning rate", self.learning_rate)?;
        check_beta("beta1", self.betas.0)?;
        check_beta("beta2", self.betas.1)?;
        check_non_negative("epsilon", self.epsilon)?;
        check_non_negative("weight decay", self.weight_decay)?;
        check_positive("rank", self.rank)?;
        check_positive("refresh period", self.refresh_period)
    }
}

fn check_non_negative(name: &'static str, value: f64) -> Result<()> {
    // Written negated so NaN is rejected too.
    if !(value >= 0.) {
        return Err(OptimErr::InvalidHyperparameter {
            name,
            value,
            expected: ">= 0.0",
        });
    }

    Ok(())
}

fn check_beta(name: &'static str, value: f64) -> Result<()> {
    if !(0. ..1.).contains(&value) {
        return Err(OptimErr::InvalidHyperparameter {
            name,
            value,
            expected: "in [0.0, 1.0[",
        });
    }

    Ok(())
}

fn check_positive(name: &'static str, value: usize) -> Result<()> {
    if value == 0 {
        return Err(OptimErr::InvalidHyperparameter {
            name,
            value: 0.,
            expected: ">= 1",
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rejected_name(res: Result<()>) -> &'static str {
        match res {
            Err(OptimErr::InvalidHyperparameter { name, .. }) => name,
            other => panic!("expected an invalid hyperparameter, got {other:?}"),
        }
    }

    #[test]
    fn defaults_are_valid() {
        assert!(AdamWConfig::default().validate().is_ok());
        assert!(LionConfig::default().validate().is_ok());
        assert!(SubspaceConfig::default().validate().is_ok());
    }

    #[test]
    fn negative_learning_rate() {
        let config = AdamWConfig {
            learning_rate: -1e-3,
            ..Default::default()
        };
        assert_eq!(rejected_name(config.validate()), "learning rate");
    }

    #[test]
    fn betas_must_be_below_one() {
        let config = AdamWConfig {
            betas: (0.9, 1.),
            ..Default::default()
        };
        assert_eq!(rejected_name(config.validate()), "beta2");

        let config = LionConfig {
            betas: (-0.1, 0.9),
            ..Default::default()
        };
        assert_eq!(rejected_name(config.validate()), "beta1");
    }

    #[test]
    fn nan_epsilon() {
        let config = AdamWConfig {
            epsilon: f64::NAN,
            ..Default::default()
        };
        assert_eq!(rejected_name(config.validate()), "epsilon");
    }

    #[test]
    fn zero_refresh_period() {
        let config = SubspaceConfig {
            refresh_period: 0,
            ..Default::default()
        };
        assert_eq!(rejected_name(config.validate()), "refresh period");
    }

    #[test]
    fn zero_rank() {
        let config = LionConfig {
            rank: 0,
            ..Default::default()
        };
        assert_eq!(rejected_name(config.validate()), "rank");
    }

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let config: SubspaceConfig = serde_json::from_str(r#"{"rank": 8}"#).unwrap();

        assert_eq!(config.rank, 8);
        assert_eq!(config.refresh_period, 100);
    }
}
