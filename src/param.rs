use std::fmt::{self, Display};

use ndarray::{ArrayD, ArrayView2, ArrayViewMut2, Ix2};
use serde::{Deserialize, Serialize};

use crate::{
    element::Element,
    error::{OptimErr, Result},
};

/// A stable handle for a trainable parameter, optimizer state is keyed by it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ParamId(usize);

impl ParamId {
    pub fn new(id: usize) -> Self {
        Self(id)
    }

    pub fn get(self) -> usize {
        self.0
    }
}

impl Display for ParamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A gradient stored in coordinate format.
#[derive(Debug, Clone, PartialEq)]
pub struct SparseGradient<E> {
    pub shape: Vec<usize>,
    pub indices: Vec<Vec<usize>>,
    pub values: Vec<E>,
}

/// The gradient accumulated for a parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum Gradient<E> {
    Dense(ArrayD<E>),
    Sparse(SparseGradient<E>),
}

impl<E> Gradient<E> {
    /// Returns the amount of dimensions of this gradient.
    pub fn ndim(&self) -> usize {
        match self {
            Gradient::Dense(grad) => grad.ndim(),
            Gradient::Sparse(grad) => grad.shape.len(),
        }
    }

    /// Returns the shape of this gradient.
    pub fn shape(&self) -> &[usize] {
        match self {
            Gradient::Dense(grad) => grad.shape(),
            Gradient::Sparse(grad) => &grad.shape,
        }
    }
}

/// A trainable parameter owned by the training harness.
///
/// The harness accumulates gradients into it, the optimizer consumes them and clears
/// the slot once the parameter was updated.
#[derive(Debug, Clone)]
pub struct Param<E> {
    id: ParamId,
    value: ArrayD<E>,
    grad: Option<Gradient<E>>,
}

impl<E: Element> Param<E> {
    /// Creates a new `Param` without a gradient.
    ///
    /// # Arguments
    /// * `id` - The stable handle of this parameter.
    /// * `value` - The initial value.
    pub fn new(id: ParamId, value: ArrayD<E>) -> Self {
        Self {
            id,
            value,
            grad: None,
        }
    }

    pub fn id(&self) -> ParamId {
        self.id
    }

    pub fn value(&self) -> &ArrayD<E> {
        &self.value
    }

    pub fn value_mut(&mut self) -> &mut ArrayD<E> {
        &mut self.value
    }

    pub fn shape(&self) -> &[usize] {
        self.value.shape()
    }

    pub fn grad(&self) -> Option<&Gradient<E>> {
        self.grad.as_ref()
    }

    /// Replaces the gradient slot.
    pub fn set_grad(&mut self, grad: Gradient<E>) {
        self.grad = Some(grad);
    }

    /// Adds a dense gradient to the one already accumulated, or sets it if the slot is empty.
    ///
    /// # Arguments
    /// * `grad` - The dense gradient to accumulate.
    ///
    /// # Returns
    /// An error if the shapes don't match or if the slot holds a sparse gradient.
    pub fn accumulate_grad(&mut self, grad: ArrayD<E>) -> Result<()> {
        if grad.shape() != self.value.shape() {
            return Err(OptimErr::ShapeMismatch {
                what: "accumulated gradient",
                got: grad.shape().to_vec(),
                expected: self.value.shape().to_vec(),
            });
        }

        match &mut self.grad {
            None => self.grad = Some(Gradient::Dense(grad)),
            Some(Gradient::Dense(acc)) => {
                acc.zip_mut_with(&grad, |a, &g| *a = E::from_f64(a.to_f64() + g.to_f64()));
            }
            Some(Gradient::Sparse(_)) => {
                return Err(OptimErr::UnsupportedGradientKind { id: self.id });
            }
        }

        Ok(())
    }

    /// Takes the gradient out of the slot, leaving it empty.
    pub fn take_grad(&mut self) -> Option<Gradient<E>> {
        self.grad.take()
    }

    pub fn clear_grad(&mut self) {
        self.grad = None;
    }

    /// Views this parameter as a matrix update target if it's eligible for a low-rank update.
    ///
    /// # Returns
    /// `None` if there's no gradient or if it isn't 2-D, an error if the gradient is sparse
    /// or its shape doesn't match the value's.
    pub(crate) fn as_update(
        &mut self,
    ) -> Result<Option<(ArrayViewMut2<'_, E>, ArrayView2<'_, E>)>> {
        let grad = match &self.grad {
            None => return Ok(None),
            Some(grad) if grad.ndim() != 2 => return Ok(None),
            Some(Gradient::Dense(grad)) => grad,
            Some(Gradient::Sparse(_)) => {
                return Err(OptimErr::UnsupportedGradientKind { id: self.id });
            }
        };

        if grad.shape() != self.value.shape() {
            return Err(OptimErr::ShapeMismatch {
                what: "gradient",
                got: grad.shape().to_vec(),
                expected: self.value.shape().to_vec(),
            });
        }

        // Both are 2-D with the same shape past this point.
        let (Ok(grad), Ok(value)) = (
            grad.view().into_dimensionality::<Ix2>(),
            self.value.view_mut().into_dimensionality::<Ix2>(),
        ) else {
            return Ok(None);
        };

        Ok(Some((value, grad)))
    }
}
