//! A module for covariance models (kernels) defining the GP prior over functions.
//!
//! The following kernels are implemented:
//! * squared exponential (RBF) with output scale,
//! * spectral mixture (weighted cosine terms under squared-exponential envelopes).

use linfa::Float;
use ndarray::{Array1, Array2, ArrayBase, Axis, Data, Ix1, Ix2};
use ndarray_stats::QuantileExt;
use std::fmt;

/// A trait for using a covariance model in GP inference.
///
/// A covariance model computes k(x, x') from the pairwise differences
/// between two input sets, given a flat vector `theta` of positive
/// hyperparameters. The layout of `theta` is kernel specific.
pub trait CovarianceModel<F: Float>: Clone + Copy + Default + fmt::Display + Sync {
    /// Number of hyperparameters for inputs with `dim` components
    fn n_params(&self, dim: usize) -> usize;

    /// Data-derived initial hyperparameter values given training inputs
    /// `xt` (n, dim) and outputs `yt` (n,)
    fn theta_init(
        &self,
        xt: &ArrayBase<impl Data<Elem = F>, Ix2>,
        yt: &ArrayBase<impl Data<Elem = F>, Ix1>,
    ) -> Array1<F>;

    /// Compute covariance values given differences `d` between x and x'
    /// as a ((m*n), dim) matrix, returned as a ((m*n), 1) column.
    fn value(
        &self,
        d: &ArrayBase<impl Data<Elem = F>, Ix2>,
        theta: &ArrayBase<impl Data<Elem = F>, Ix1>,
    ) -> Array2<F>;
}

/// Squared exponential (RBF) kernel with an output scale
///
/// `theta = [l_1, ..., l_dim, sigma2]` where `l_j` are lengthscales and
/// `sigma2` the output scale:
///
/// `k(d) = sigma2 * exp(-0.5 * sum_j (d_j / l_j)^2)`
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct SquaredExponentialKernel();

impl fmt::Display for SquaredExponentialKernel {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "SquaredExponential")
    }
}

impl<F: Float> CovarianceModel<F> for SquaredExponentialKernel {
    fn n_params(&self, dim: usize) -> usize {
        dim + 1
    }

    /// Lengthscales start at a tenth of each input range, unit output scale
    fn theta_init(
        &self,
        xt: &ArrayBase<impl Data<Elem = F>, Ix2>,
        _yt: &ArrayBase<impl Data<Elem = F>, Ix1>,
    ) -> Array1<F> {
        let dim = xt.ncols();
        let mut theta = Array1::<F>::ones(dim + 1);
        for j in 0..dim {
            let col = xt.column(j);
            let range = *col.max().unwrap() - *col.min().unwrap();
            let range = if range == F::zero() { F::one() } else { range };
            theta[j] = F::cast(0.1) * range;
        }
        theta
    }

    fn value(
        &self,
        d: &ArrayBase<impl Data<Elem = F>, Ix2>,
        theta: &ArrayBase<impl Data<Elem = F>, Ix1>,
    ) -> Array2<F> {
        let dim = d.ncols();
        let lengthscales = theta.slice(ndarray::s![..dim]);
        let sigma2 = theta[dim];
        let scaled = (d / &lengthscales).mapv(|v| v * v).sum_axis(Axis(1));
        scaled
            .mapv(|v| sigma2 * F::exp(F::cast(-0.5) * v))
            .into_shape((d.nrows(), 1))
            .unwrap()
    }
}

/// Spectral mixture kernel: a weighted sum of `Q` frequency components,
/// each a cosine term under a squared-exponential envelope.
///
/// `theta = [w_1..w_Q, mu_11..mu_Qdim, v_11..v_Qdim]` where `w_q` are
/// component weights, `mu_qj` mean frequencies and `v_qj` frequency
/// variances:
///
/// `k(d) = sum_q w_q * prod_j exp(-2 pi^2 d_j^2 v_qj) * cos(2 pi d_j mu_qj)`
///
/// Able to extrapolate periodic structure beyond the training inputs,
/// which neither the RBF nor the Matern family can do.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SpectralMixtureKernel {
    /// Number of mixture components
    pub n_mixtures: usize,
}

impl Default for SpectralMixtureKernel {
    fn default() -> Self {
        SpectralMixtureKernel { n_mixtures: 4 }
    }
}

impl SpectralMixtureKernel {
    /// Constructor given a number of mixture components (at least 1)
    pub fn new(n_mixtures: usize) -> Self {
        SpectralMixtureKernel {
            n_mixtures: n_mixtures.max(1),
        }
    }
}

impl fmt::Display for SpectralMixtureKernel {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "SpectralMixture(q={})", self.n_mixtures)
    }
}

impl<F: Float> CovarianceModel<F> for SpectralMixtureKernel {
    fn n_params(&self, dim: usize) -> usize {
        self.n_mixtures * (1 + 2 * dim)
    }

    /// Weights share the output variance evenly, mean frequencies are
    /// spread over the lower half of the Nyquist band of the training
    /// inputs, envelopes decay over the input range.
    fn theta_init(
        &self,
        xt: &ArrayBase<impl Data<Elem = F>, Ix2>,
        yt: &ArrayBase<impl Data<Elem = F>, Ix1>,
    ) -> Array1<F> {
        let q = self.n_mixtures;
        let dim = xt.ncols();
        let y_std = yt.std(F::one());
        let w0 = (y_std * y_std + F::cast(1e-3)) / F::cast(q as f64);

        let mut theta = Array1::<F>::zeros(q * (1 + 2 * dim));
        for i in 0..q {
            theta[i] = w0;
        }
        for j in 0..dim {
            let col = xt.column(j);
            let range = *col.max().unwrap() - *col.min().unwrap();
            let range = if range == F::zero() { F::one() } else { range };
            // Smallest spacing bounds the highest identifiable frequency
            let mut min_spacing = range;
            let mut sorted = col.to_vec();
            sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
            for w in sorted.windows(2) {
                let s = w[1] - w[0];
                if s > F::zero() && s < min_spacing {
                    min_spacing = s;
                }
            }
            let nyquist = F::cast(0.5) / min_spacing;
            for i in 0..q {
                let frac = F::cast((i + 1) as f64 / q as f64);
                theta[q + i * dim + j] = F::cast(0.5) * nyquist * frac;
                theta[q * (1 + dim) + i * dim + j] = F::cast(0.1) / (range * range);
            }
        }
        theta
    }

    fn value(
        &self,
        d: &ArrayBase<impl Data<Elem = F>, Ix2>,
        theta: &ArrayBase<impl Data<Elem = F>, Ix1>,
    ) -> Array2<F> {
        let q = self.n_mixtures;
        let dim = d.ncols();
        let two_pi2 = F::cast(2.) * F::cast(std::f64::consts::PI).powi(2);
        let two_pi = F::cast(2.) * F::cast(std::f64::consts::PI);

        let mut r = Array2::<F>::zeros((d.nrows(), 1));
        for (row, mut out) in d.rows().into_iter().zip(r.rows_mut()) {
            let mut acc = F::zero();
            for i in 0..q {
                let w = theta[i];
                let mut term = w;
                for j in 0..dim {
                    let tau = row[j];
                    let mu = theta[q + i * dim + j];
                    let v = theta[q * (1 + dim) + i * dim + j];
                    term = term
                        * F::exp(-two_pi2 * tau * tau * v)
                        * F::cos(two_pi * tau * mu);
                }
                acc = acc + term;
            }
            out[0] = acc;
        }
        r
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::pairwise_differences;
    use approx::assert_abs_diff_eq;
    use linfa_linalg::eigh::*;
    use ndarray::{arr1, array, Array, Axis};

    fn cov_full<C: CovarianceModel<f64>>(
        corr: &C,
        theta: &ndarray::Array1<f64>,
        x: &Array2<f64>,
    ) -> Array2<f64> {
        let d = pairwise_differences(x, x);
        corr.value(&d, theta)
            .into_shape((x.nrows(), x.nrows()))
            .unwrap()
    }

    #[test]
    fn test_squared_exponential() {
        let d = array![[0.], [0.5], [1.0], [2.0]];
        let res = SquaredExponentialKernel::default().value(&d, &arr1(&[1., 2.]));
        let expected = array![
            [2.],
            [2. * f64::exp(-0.125)],
            [2. * f64::exp(-0.5)],
            [2. * f64::exp(-2.)]
        ];
        assert_abs_diff_eq!(res, expected, epsilon = 1e-12);
    }

    #[test]
    fn test_spectral_mixture_at_zero_lag() {
        // k(0) equals the sum of the component weights
        let kernel = SpectralMixtureKernel::new(3);
        let theta = arr1(&[0.5, 0.25, 0.25, 1., 2., 3., 0.1, 0.1, 0.1]);
        let d = array![[0.]];
        let res = kernel.value(&d, &theta);
        assert_abs_diff_eq!(res[[0, 0]], 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_spectral_mixture_single_component() {
        let kernel = SpectralMixtureKernel::new(1);
        let (w, mu, v) = (0.7, 1.5, 0.04);
        let theta = arr1(&[w, mu, v]);
        let tau = 0.3;
        let d = array![[tau]];
        let expected = w
            * (-2. * std::f64::consts::PI.powi(2) * tau * tau * v).exp()
            * (2. * std::f64::consts::PI * tau * mu).cos();
        let res = kernel.value(&d, &theta);
        assert_abs_diff_eq!(res[[0, 0]], expected, epsilon = 1e-12);
    }

    #[test]
    fn test_kernel_matrices_symmetric_psd() {
        let x = Array::linspace(0., 1., 12).insert_axis(Axis(1));
        let y = x.mapv(|v: f64| (2. * std::f64::consts::PI * v).sin());
        let y = y.remove_axis(Axis(1));

        let se = SquaredExponentialKernel::default();
        let theta_se = CovarianceModel::<f64>::theta_init(&se, &x, &y);
        let sm = SpectralMixtureKernel::default();
        let theta_sm = sm.theta_init(&x, &y);

        let k_se = cov_full(&se, &theta_se, &x);
        let k_sm = cov_full(&sm, &theta_sm, &x);

        for k in [k_se, k_sm] {
            assert_abs_diff_eq!(k, k.t().to_owned(), epsilon = 1e-12);
            let (eigvals, _) = k.eigh_into().unwrap();
            for v in eigvals.iter() {
                assert!(*v > -1e-8, "negative eigenvalue {v}");
            }
        }
    }

    #[test]
    fn test_empty_input_yields_empty_matrix() {
        let x = Array2::<f64>::zeros((0, 1));
        let d = pairwise_differences(&x, &x);
        let r = SquaredExponentialKernel::default().value(&d, &arr1(&[0.5, 1.]));
        assert_eq!(r.nrows(), 0);
    }
}
