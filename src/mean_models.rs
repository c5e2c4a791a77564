//! A module for mean models defining the trend of the GP prior.
//!
//! Unlike kernel hyperparameters, mean coefficients are plain trainable
//! parameters handed to the optimizer alongside the kernel ones.

use linfa::Float;
use ndarray::{Array1, ArrayBase, Data, Ix1, Ix2};
use std::fmt;

/// A trait for using a mean model in GP inference
pub trait MeanModel<F: Float>: Clone + Copy + Default + fmt::Display + Sync {
    /// Number of trainable coefficients for inputs with `dim` components
    fn n_coeffs(&self, dim: usize) -> usize;

    /// Evaluate the prior mean at the given (n, dim) inputs
    fn value(
        &self,
        x: &ArrayBase<impl Data<Elem = F>, Ix2>,
        coeffs: &ArrayBase<impl Data<Elem = F>, Ix1>,
    ) -> Array1<F>;
}

/// Zero mean model
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct ZeroMean();

impl fmt::Display for ZeroMean {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "ZeroMean")
    }
}

impl<F: Float> MeanModel<F> for ZeroMean {
    fn n_coeffs(&self, _dim: usize) -> usize {
        0
    }

    fn value(
        &self,
        x: &ArrayBase<impl Data<Elem = F>, Ix2>,
        _coeffs: &ArrayBase<impl Data<Elem = F>, Ix1>,
    ) -> Array1<F> {
        Array1::zeros(x.nrows())
    }
}

/// Constant mean model: the same learned scalar for every input
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct ConstantMean();

impl fmt::Display for ConstantMean {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "ConstantMean")
    }
}

impl<F: Float> MeanModel<F> for ConstantMean {
    fn n_coeffs(&self, _dim: usize) -> usize {
        1
    }

    fn value(
        &self,
        x: &ArrayBase<impl Data<Elem = F>, Ix2>,
        coeffs: &ArrayBase<impl Data<Elem = F>, Ix1>,
    ) -> Array1<F> {
        Array1::from_elem(x.nrows(), coeffs[0])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn test_constant() {
        let x = array![[1., 2.], [3., 4.], [5., 6.]];
        let actual = ConstantMean::default().value(&x, &array![2.5]);
        assert_abs_diff_eq!(array![2.5, 2.5, 2.5], actual);
    }

    #[test]
    fn test_zero() {
        let x = array![[1.], [7.], [25.]];
        let actual = ZeroMean::default().value(&x, &Array1::<f64>::zeros(0));
        assert_abs_diff_eq!(array![0., 0., 0.], actual);
    }
}
