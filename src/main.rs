use std::{env, fs, slice};

use anyhow::Context;
use log::info;
use ndarray::{Array2, ArrayD};
use ndarray_rand::RandomExt;
use rand::{SeedableRng, rngs::StdRng};
use rand_distr::StandardNormal;
use serde::Deserialize;

use mlorc::{
    Gradient, OptimizerBuilder, OptimizerConfig, OptimizerSpec, Param, ParamId,
    optimization::AdamWConfig, specs::FactorizerSpec,
};

/// Fits a single parameter to a rank-2 target with the configured optimizer.
#[derive(Debug, Deserialize)]
struct DemoSpec {
    #[serde(flatten)]
    config: OptimizerConfig,
    #[serde(default = "default_steps")]
    steps: usize,
    #[serde(default = "default_shape")]
    shape: (usize, usize),
}

fn default_steps() -> usize {
    200
}

fn default_shape() -> (usize, usize) {
    (8, 6)
}

impl Default for DemoSpec {
    fn default() -> Self {
        Self {
            config: OptimizerConfig {
                optimizer: OptimizerSpec::LowRankAdamw(AdamWConfig {
                    learning_rate: 0.05,
                    weight_decay: 0.,
                    rank: 2,
                    ..Default::default()
                }),
                factorizer: FactorizerSpec::default(),
                seed: Some(42),
            },
            steps: default_steps(),
            shape: default_shape(),
        }
    }
}

fn read_spec() -> anyhow::Result<DemoSpec> {
    let Some(path) = env::args().nth(1) else {
        info!("no spec given, running the default one");
        return Ok(DemoSpec::default());
    };

    let json = fs::read_to_string(&path).with_context(|| format!("reading {path}"))?;
    serde_json::from_str(&json).with_context(|| format!("parsing {path}"))
}

/// A random matrix of rank 2 (at most).
fn rank_two_target(shape: (usize, usize), rng: &mut StdRng) -> ArrayD<f32> {
    let left = Array2::<f32>::random_using((shape.0, 2), StandardNormal, rng);
    let right = Array2::<f32>::random_using((2, shape.1), StandardNormal, rng);
    left.dot(&right).into_dyn()
}

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let spec = read_spec()?;
    let mut rng = StdRng::seed_from_u64(spec.config.seed.unwrap_or_default());
    let target = rank_two_target(spec.shape, &mut rng);

    let mut optimizer = OptimizerBuilder::new().build::<f32>(spec.config)?;
    let mut param = Param::new(ParamId::new(0), ArrayD::<f32>::zeros(target.shape()));
    info!(
        rows = spec.shape.0, cols = spec.shape.1, steps = spec.steps;
        "fitting with {}", optimizer.name()
    );

    let mut loss = 0.;
    for step in 0..spec.steps {
        let diff = param.value() - &target;
        let mut closure = || 0.5 * diff.iter().map(|&x| f64::from(x).powi(2)).sum::<f64>();

        param.set_grad(Gradient::Dense(diff.clone()));
        loss = optimizer.step_with_closure(slice::from_mut(&mut param), &mut closure)?;

        if step % 20 == 0 {
            info!(step = step, loss = loss; "fitting");
        }
    }

    println!("final loss after {} steps: {loss:.6}", spec.steps);
    Ok(())
}
