use log::trace;
use ndarray::{ArrayView2, ArrayViewMut2};

use crate::{
    element::Element,
    error::{OptimErr, Result},
    param::{Param, ParamId},
};

/// Defines the strategy for updating matrix parameters based on their gradients.
///
/// Implementations own one state per parameter, created the first time the parameter is
/// updated and kept for the optimizer's whole lifetime.
pub trait Optimizer<E: Element> {
    /// A short name used in logs.
    fn name(&self) -> &'static str;

    /// Updates a single parameter in place.
    ///
    /// # Arguments
    /// * `id` - The parameter's stable handle, which selects its state.
    /// * `value` - The parameter's current value.
    /// * `grad` - The parameter's gradient, with the same shape as `value`.
    ///
    /// # Returns
    /// An error if the gradient isn't finite, the state can't be created or a factorization
    /// fails, in which case neither the parameter nor its state are modified.
    fn update(&mut self, id: ParamId, value: ArrayViewMut2<E>, grad: ArrayView2<E>) -> Result<()>;

    /// Serializes every parameter's state, step counters included.
    fn export_state(&self) -> Result<String>;

    /// Replaces every parameter's state with one written by `export_state`.
    fn import_state(&mut self, json: &str) -> Result<()>;

    /// Performs a single optimization step over all the parameters.
    ///
    /// Parameters without a gradient or whose gradient isn't 2-D are left untouched, the
    /// gradients of updated parameters are cleared.
    ///
    /// # Arguments
    /// * `params` - The parameters to update.
    ///
    /// # Returns
    /// An error if a gradient is sparse, mismatches its parameter or an update fails. The
    /// parameters updated before the failure stay updated.
    fn step(&mut self, params: &mut [Param<E>]) -> Result<()> {
        for param in params.iter_mut() {
            let id = param.id();
            let Some((value, grad)) = param.as_update()? else {
                trace!(param = id.get(); "{}: skipping parameter", self.name());
                continue;
            };

            self.update(id, value, grad)?;
            param.clear_grad();
        }

        Ok(())
    }

    /// Evaluates `closure` and then performs a single optimization step.
    ///
    /// # Arguments
    /// * `params` - The parameters to update.
    /// * `closure` - Reevaluates the model and returns the loss.
    ///
    /// # Returns
    /// The loss returned by the closure.
    fn step_with_closure(
        &mut self,
        params: &mut [Param<E>],
        closure: &mut dyn FnMut() -> f64,
    ) -> Result<f64> {
        let loss = closure();
        self.step(params)?;
        Ok(loss)
    }
}

/// Computes the Adam step size, optionally compensating the zero-initialized moments.
pub(crate) fn adam_step_size(
    lr: f64,
    (b1, b2): (f64, f64),
    step: usize,
    correct_bias: bool,
) -> f64 {
    if !correct_bias {
        return lr;
    }

    let t = step as f64;
    let bias_correction1 = 1. - b1.powf(t);
    let bias_correction2 = 1. - b2.powf(t);
    lr * bias_correction2.sqrt() / bias_correction1
}

/// Shrinks the parameter towards zero independently of its moments.
pub(crate) fn decay_weights<E: Element>(value: &mut ArrayViewMut2<E>, lr: f64, weight_decay: f64) {
    if weight_decay <= 0. {
        return;
    }

    let factor = 1. - lr * weight_decay;
    value.mapv_inplace(|p| E::from_f64(p.to_f64() * factor));
}

/// Checks that a parameter still has the shape its state was created with.
pub(crate) fn check_state_shape(state: (usize, usize), grad: (usize, usize)) -> Result<()> {
    if state != grad {
        return Err(OptimErr::ShapeMismatch {
            what: "optimizer state",
            got: vec![grad.0, grad.1],
            expected: vec![state.0, state.1],
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use ndarray::array;

    use super::*;

    #[test]
    fn step_size_without_correction_is_lr() {
        assert_eq!(adam_step_size(0.1, (0.9, 0.999), 1, false), 0.1);
    }

    #[test]
    fn step_size_first_step() {
        let expected = 0.1 * (0.001f64).sqrt() / 0.1;
        assert!((adam_step_size(0.1, (0.9, 0.999), 1, true) - expected).abs() < 1e-15);
    }

    #[test]
    fn step_size_converges_to_lr() {
        assert!((adam_step_size(0.1, (0.9, 0.999), 100_000, true) - 0.1).abs() < 1e-12);
    }

    #[test]
    fn decay_is_skipped_when_zero() {
        let mut value = array![[1f32, -2.]];
        decay_weights(&mut value.view_mut(), 0.5, 0.);
        assert_eq!(value, array![[1., -2.]]);
    }

    #[test]
    fn decay_shrinks_towards_zero() {
        let mut value = array![[1f64, -2.]];
        decay_weights(&mut value.view_mut(), 0.5, 0.1);
        assert!((value[[0, 0]] - 0.95).abs() < 1e-12);
        assert!((value[[0, 1]] + 1.9).abs() < 1e-12);
    }
}
