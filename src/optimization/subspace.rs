use log::{debug, trace, warn};
use ndarray::{Array2, ArrayView2, ArrayViewMut2, Zip, s};
use serde::{Deserialize, Serialize};

use super::{
    Optimizer, StateMap, SubspaceConfig,
    optimizer::{adam_step_size, check_state_shape, decay_weights},
};
use crate::{
    element::Element,
    error::Result,
    factorization::{check_rank, linalg},
    param::ParamId,
};

/// The state `SubspaceAdamW` keeps for every parameter.
///
/// The moments live in the `rank x cols` subspace spanned by `projector`, they are kept dense.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubspaceState<E> {
    pub step: usize,
    /// The step at which `projector` was last recomputed, `0` while it has never been.
    pub last_refresh: usize,
    pub projector: Array2<E>,
    pub exp_avg: Array2<E>,
    pub exp_avg_sq: Array2<E>,
}

impl<E: Element> SubspaceState<E> {
    fn zeros((rows, cols): (usize, usize), rank: usize) -> Result<Self> {
        check_rank(rank, rows, cols)?;

        Ok(Self {
            step: 0,
            last_refresh: 0,
            projector: Array2::from_elem((rows, rank), E::ZERO),
            exp_avg: Array2::from_elem((rank, cols), E::ZERO),
            exp_avg_sq: Array2::from_elem((rank, cols), E::ZERO),
        })
    }

    /// The shape of the parameter this state was created for.
    pub fn shape(&self) -> (usize, usize) {
        (self.projector.nrows(), self.exp_avg.ncols())
    }
}

/// AdamW running inside the top-`r` left singular subspace of the gradient.
///
/// The subspace is recomputed from an exact SVD of the gradient on steps `1, T + 1, 2T + 1, ...`
/// and held fixed in between.
#[derive(Debug)]
pub struct SubspaceAdamW<E> {
    config: SubspaceConfig,
    states: StateMap<SubspaceState<E>>,
}

impl<E: Element> SubspaceAdamW<E> {
    /// Creates a new `SubspaceAdamW`.
    ///
    /// # Returns
    /// An error if a hyperparameter is out of range.
    pub fn new(config: SubspaceConfig) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            config,
            states: StateMap::new(),
        })
    }

    pub fn config(&self) -> &SubspaceConfig {
        &self.config
    }

    pub fn state(&self, id: ParamId) -> Option<&SubspaceState<E>> {
        self.states.get(id)
    }

    pub fn states(&self) -> &StateMap<SubspaceState<E>> {
        &self.states
    }
}

/// Whether the projector is due for a refresh on `step`, counted from 1.
fn is_refresh_step(step: usize, period: usize) -> bool {
    (step - 1) % period == 0
}

/// The top-`rank` left singular vectors of `g`.
fn top_left_singular_vectors(g: ArrayView2<f64>, rank: usize) -> Result<Array2<f64>> {
    let (u, _, _) = linalg::exact_svd(g)?;
    Ok(u.slice(s![.., ..rank]).to_owned())
}

impl<E: Element> Optimizer<E> for SubspaceAdamW<E> {
    fn name(&self) -> &'static str {
        "subspace adamw"
    }

    fn update(
        &mut self,
        id: ParamId,
        mut value: ArrayViewMut2<E>,
        grad: ArrayView2<E>,
    ) -> Result<()> {
        let SubspaceConfig {
            learning_rate: lr,
            betas: (b1, b2),
            epsilon: eps,
            weight_decay,
            correct_bias,
            rank,
            refresh_period,
        } = self.config;

        // Checked on every step, not only when the projector is refreshed.
        let g = grad.mapv(E::to_f64);
        linalg::check_finite(g.view(), "the gradient")?;

        let shape = g.dim();
        let state = self.states.get_or_try_insert_with(id, || {
            debug!(
                param = id.get(), rows = shape.0, cols = shape.1, rank = rank;
                "allocating subspace state"
            );
            SubspaceState::zeros(shape, rank)
        })?;
        check_state_shape(state.shape(), shape)?;

        let step = state.step + 1;

        let refreshed = if !is_refresh_step(step, refresh_period) {
            None
        } else if g.iter().all(|&x| x == 0.) {
            warn!(param = id.get(), step = step; "zero gradient, keeping the previous projector");
            None
        } else {
            Some(top_left_singular_vectors(g.view(), rank)?)
        };

        let projector = match &refreshed {
            Some(projector) => projector.clone(),
            None => state.projector.mapv(E::to_f64),
        };

        let r = projector.t().dot(&g);
        let exp_avg = state.exp_avg.mapv(E::to_f64) * b1 + &r * (1. - b1);
        let exp_avg_sq = state.exp_avg_sq.mapv(E::to_f64) * b2 + (&r * &r) * (1. - b2);

        let step_size = adam_step_size(lr, (b1, b2), step, correct_bias);

        let mut delta = exp_avg.clone();
        Zip::from(&mut delta)
            .and(&exp_avg_sq)
            .for_each(|d, &v| *d /= v.sqrt() + eps);
        let full = projector.dot(&delta);

        Zip::from(&mut value).and(&full).for_each(|p, &u| {
            *p = E::from_f64(p.to_f64() - step_size * u);
        });

        decay_weights(&mut value, lr, weight_decay);

        state.step = step;
        if let Some(projector) = refreshed {
            state.projector = projector.mapv(E::from_f64);
            state.last_refresh = step;
            debug!(param = id.get(), step = step; "refreshed projector");
        }
        state.exp_avg = exp_avg.mapv(E::from_f64);
        state.exp_avg_sq = exp_avg_sq.mapv(E::from_f64);

        trace!(
            param = id.get(), step = step, step_size = step_size;
            "subspace adamw update"
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

#[cfg(test)]
mod tests {
    use ndarray::array;
    use ndarray_rand::RandomExt;
    use rand::{SeedableRng, rngs::StdRng};
    use rand_distr::Normal;

    use super::*;
    use crate::{
        error::OptimErr,
        param::{Gradient, Param},
    };

    fn param_with_grad(value: Array2<f64>, grad: Array2<f64>) -> Param<f64> {
        let mut param = Param::new(ParamId::new(0), value.into_dyn());
        param.set_grad(Gradient::Dense(grad.into_dyn()));
        param
    }

    fn value(param: &Param<f64>) -> Array2<f64> {
        param.value().clone().into_dimensionality().unwrap()
    }

    #[test]
    fn refresh_schedule() {
        assert!(is_refresh_step(1, 3));
        assert!(!is_refresh_step(2, 3));
        assert!(!is_refresh_step(3, 3));
        assert!(is_refresh_step(4, 3));
        assert!((1..10).all(|step| is_refresh_step(step, 1)));
    }

    #[test]
    fn refreshes_on_steps_one_four_and_seven() {
        let mut opt = SubspaceAdamW::<f64>::new(SubspaceConfig {
            rank: 2,
            refresh_period: 3,
            ..Default::default()
        })
        .unwrap();
        let mut rng = StdRng::seed_from_u64(42);
        let dist = Normal::new(0., 1.).unwrap();

        let mut params = [param_with_grad(Array2::zeros((5, 3)), Array2::zeros((5, 3)))];
        let mut refreshes = Vec::new();
        let mut projector = Array2::zeros((5, 2));

        for _ in 0..7 {
            let grad = Array2::random_using((5, 3), dist, &mut rng);
            params[0].set_grad(Gradient::Dense(grad.into_dyn()));
            opt.step(&mut params).unwrap();

            let state = opt.state(ParamId::new(0)).unwrap();
            if state.last_refresh == state.step {
                refreshes.push(state.step);
                assert_ne!(state.projector, projector);
            } else {
                assert_eq!(state.projector, projector);
            }
            projector = state.projector.clone();
        }

        assert_eq!(refreshes, vec![1, 4, 7]);
    }

    #[test]
    fn projector_is_orthonormal() {
        let mut opt = SubspaceAdamW::<f64>::new(SubspaceConfig {
            rank: 2,
            ..Default::default()
        })
        .unwrap();

        let grad = array![[1., 2., 0.], [0., 1., 3.], [4., 0., 1.], [1., 1., 1.]];
        let mut params = [param_with_grad(Array2::zeros((4, 3)), grad)];
        opt.step(&mut params).unwrap();

        let p = &opt.state(ParamId::new(0)).unwrap().projector;
        let gram = p.t().dot(p);
        gram.iter()
            .zip(&Array2::<f64>::eye(2))
            .for_each(|(x, y)| assert!((x - y).abs() < 1e-10));
    }

    #[test]
    fn zero_gradient_is_a_no_op() {
        let mut opt = SubspaceAdamW::<f64>::new(SubspaceConfig {
            weight_decay: 0.,
            rank: 2,
            ..Default::default()
        })
        .unwrap();

        let initial = array![[1., -2., 3.], [0.5, 0., -1.], [2., 2., 2.]];
        let mut params = [param_with_grad(initial.clone(), Array2::zeros((3, 3)))];
        opt.step(&mut params).unwrap();

        let state = opt.state(ParamId::new(0)).unwrap();
        assert_eq!(value(&params[0]), initial);
        assert_eq!(state.step, 1);
        assert_eq!(state.last_refresh, 0);
        assert!(state.exp_avg.iter().all(|&x| x == 0.));
        assert!(state.exp_avg_sq.iter().all(|&x| x == 0.));
    }

    #[test]
    fn zero_gradient_on_a_later_refresh_step_keeps_the_projector() {
        let mut opt = SubspaceAdamW::<f64>::new(SubspaceConfig {
            rank: 2,
            refresh_period: 2,
            ..Default::default()
        })
        .unwrap();
        let mut rng = StdRng::seed_from_u64(17);
        let dist = Normal::new(0., 1.).unwrap();

        let mut params = [param_with_grad(Array2::zeros((4, 3)), Array2::zeros((4, 3)))];
        for _ in 0..2 {
            let grad = Array2::random_using((4, 3), dist, &mut rng);
            params[0].set_grad(Gradient::Dense(grad.into_dyn()));
            opt.step(&mut params).unwrap();
        }
        let projector = opt.state(ParamId::new(0)).unwrap().projector.clone();
        assert_eq!(opt.state(ParamId::new(0)).unwrap().last_refresh, 1);

        params[0].set_grad(Gradient::Dense(Array2::zeros((4, 3)).into_dyn()));
        opt.step(&mut params).unwrap();

        let state = opt.state(ParamId::new(0)).unwrap();
        assert_eq!(state.step, 3);
        assert_eq!(state.last_refresh, 1);
        assert_eq!(state.projector, projector);
    }

    #[test]
    fn non_finite_gradient_off_the_refresh_step_is_rejected() {
        let mut opt = SubspaceAdamW::<f64>::new(SubspaceConfig {
            rank: 1,
            refresh_period: 10,
            ..Default::default()
        })
        .unwrap();

        let grad = array![[1., 2.], [3., 4.], [5., 6.]];
        let mut params = [param_with_grad(Array2::zeros((3, 2)), grad)];
        opt.step(&mut params).unwrap();
        let before = value(&params[0]);
        let state = opt.state(ParamId::new(0)).unwrap().clone();

        for bad in [f64::NAN, f64::INFINITY] {
            let grad = array![[1., 2.], [bad, 4.], [5., 6.]];
            params[0].set_grad(Gradient::Dense(grad.into_dyn()));

            let res = opt.step(&mut params);

            assert!(matches!(res, Err(OptimErr::Factorization(_))));
            assert_eq!(value(&params[0]), before);
            assert_eq!(opt.state(ParamId::new(0)), Some(&state));
            assert!(params[0].grad().is_some());
        }
    }

    #[test]
    fn non_finite_first_gradient_allocates_no_state() {
        let mut opt = SubspaceAdamW::<f64>::new(SubspaceConfig {
            rank: 1,
            ..Default::default()
        })
        .unwrap();

        let grad = array![[f64::NAN, 0.], [0., 1.]];
        let mut params = [param_with_grad(Array2::zeros((2, 2)), grad)];
        let res = opt.step(&mut params);

        assert!(matches!(res, Err(OptimErr::Factorization(_))));
        assert_eq!(value(&params[0]), Array2::<f64>::zeros((2, 2)));
        assert!(opt.states().is_empty());
    }

    #[test]
    fn update_stays_in_the_gradient_column_space() {
        let mut opt = SubspaceAdamW::<f64>::new(SubspaceConfig {
            weight_decay: 0.,
            rank: 1,
            ..Default::default()
        })
        .unwrap();

        // Rank one, with every column along (1, 2, 0).
        let grad = array![[1., 3.], [2., 6.], [0., 0.]];
        let mut params = [param_with_grad(Array2::zeros((3, 2)), grad)];
        opt.step(&mut params).unwrap();

        let delta = value(&params[0]);
        assert!(delta.row(2).iter().all(|&x| x.abs() < 1e-15));
        for j in 0..2 {
            assert!((delta[[1, j]] - 2. * delta[[0, j]]).abs() < 1e-12);
            assert!(delta[[0, j]] < 0.);
        }
    }

    #[test]
    fn first_step_magnitude_is_bounded_by_lr() {
        let lr = 1e-3;
        let mut opt = SubspaceAdamW::<f64>::new(SubspaceConfig {
            learning_rate: lr,
            weight_decay: 0.,
            rank: 4,
            ..Default::default()
        })
        .unwrap();

        let grad = Array2::from_diag(&array![4., 3., 2., 1.]);
        let mut params = [param_with_grad(Array2::zeros((4, 4)), grad)];
        opt.step(&mut params).unwrap();

        let delta = value(&params[0]);
        for ((i, j), &x) in delta.indexed_iter() {
            if i == j {
                assert!(x < 0. && x.abs() <= lr * (1. + 1e-6));
            } else {
                assert!(x.abs() < 1e-12);
            }
        }
    }

    #[test]
    fn rank_above_min_dimension_leaves_param_untouched() {
        let mut opt = SubspaceAdamW::<f64>::new(SubspaceConfig {
            rank: 3,
            ..Default::default()
        })
        .unwrap();

        let mut params = [param_with_grad(Array2::ones((2, 5)), Array2::ones((2, 5)))];
        let res = opt.step(&mut params);

        assert!(matches!(res, Err(OptimErr::InvalidRank { rank: 3, rows: 2, cols: 5 })));
        assert_eq!(value(&params[0]), Array2::<f64>::ones((2, 5)));
        assert!(params[0].grad().is_some());
        assert!(opt.states().is_empty());
    }
}
