//! A module for observation likelihoods mapping latent GP values to labels.
//!
//! Two likelihoods are implemented:
//! * gaussian noise model for regression,
//! * bernoulli model with a probit link for binary classification
//!   (labels in {-1, +1}).

use crate::errors::Result;
use crate::utils::{into_f64, GaussHermite};
use linfa::Float;
use std::fmt;

/// Standard normal cumulative distribution function
pub fn norm_cdf<F: Float>(z: F) -> F {
    let z = into_f64(&z);
    F::cast(0.5 * libm::erfc(-z / std::f64::consts::SQRT_2))
}

/// Log of the standard normal cumulative distribution function,
/// floored to stay finite in the far negative tail
pub fn ln_norm_cdf<F: Float>(z: F) -> F {
    let z = into_f64(&z);
    let p = 0.5 * libm::erfc(-z / std::f64::consts::SQRT_2);
    F::cast(p.max(1e-300).ln())
}

/// A trait for using an observation likelihood in GP inference.
///
/// A likelihood maps a latent gaussian marginal `N(mu, var)` to the
/// expected log-probability of an observed label, and to a predictive
/// observation distribution.
pub trait Likelihood<F: Float>: Clone + fmt::Display {
    /// Expected log-probability of label `y` under the latent marginal
    fn expected_log_prob(&self, y: F, mu: F, var: F) -> F;

    /// Map a latent marginal to a predictive observation (mean, variance)
    fn predictive(&self, mu: F, var: F) -> (F, F);
}

/// Gaussian noise likelihood: `y = f + eps`, `eps ~ N(0, noise)`
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GaussianLikelihood<F: Float> {
    /// Observation noise variance
    pub noise: F,
}

impl<F: Float> GaussianLikelihood<F> {
    /// Constructor given a noise variance
    pub fn new(noise: F) -> Self {
        GaussianLikelihood { noise }
    }
}

impl<F: Float> fmt::Display for GaussianLikelihood<F> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Gaussian(noise={})", self.noise)
    }
}

impl<F: Float> Likelihood<F> for GaussianLikelihood<F> {
    /// Closed form:
    /// `-0.5 * (ln(2 pi noise) + ((y - mu)^2 + var) / noise)`
    fn expected_log_prob(&self, y: F, mu: F, var: F) -> F {
        let two_pi = F::cast(2. * std::f64::consts::PI);
        let resid = y - mu;
        -F::cast(0.5) * ((two_pi * self.noise).ln() + (resid * resid + var) / self.noise)
    }

    fn predictive(&self, mu: F, var: F) -> (F, F) {
        (mu, var + self.noise)
    }
}

/// Bernoulli likelihood with a probit link: `p(y = +1 | f) = Phi(f)`.
///
/// The expected log-probability has no closed form and is computed with
/// Gauss-Hermite quadrature; the predictive success probability does:
/// `p = Phi(mu / sqrt(1 + var))`.
#[derive(Clone, Debug)]
pub struct BernoulliLikelihood<F: Float> {
    quad: GaussHermite<F>,
}

impl<F: Float> BernoulliLikelihood<F> {
    /// Constructor given the number of quadrature points
    pub fn new(n_quad: usize) -> Result<Self> {
        Ok(BernoulliLikelihood {
            quad: GaussHermite::new(n_quad)?,
        })
    }

    /// Number of quadrature points used for expectations
    pub fn n_quad(&self) -> usize {
        self.quad.len()
    }
}

impl<F: Float> fmt::Display for BernoulliLikelihood<F> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Bernoulli(n_quad={})", self.quad.len())
    }
}

impl<F: Float> Likelihood<F> for BernoulliLikelihood<F> {
    /// `E[ln Phi(y f)] ~ 1/sqrt(pi) sum_k w_k ln Phi(y (mu + sqrt(2) sigma t_k))`
    fn expected_log_prob(&self, y: F, mu: F, var: F) -> F {
        let sigma = var.max(F::zero()).sqrt();
        let sqrt_2 = F::cast(std::f64::consts::SQRT_2);
        let inv_sqrt_pi = F::cast(1. / std::f64::consts::PI.sqrt());
        let mut acc = F::zero();
        for (&t, &w) in self.quad.nodes.iter().zip(self.quad.weights.iter()) {
            let f = mu + sqrt_2 * sigma * t;
            acc = acc + w * ln_norm_cdf(y * f);
        }
        inv_sqrt_pi * acc
    }

    /// Predictive mean is the success probability, variance the bernoulli one
    fn predictive(&self, mu: F, var: F) -> (F, F) {
        let p = norm_cdf(mu / (F::one() + var.max(F::zero())).sqrt());
        (p, p * (F::one() - p))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_norm_cdf() {
        assert_abs_diff_eq!(norm_cdf(0.0), 0.5, epsilon = 1e-12);
        assert_abs_diff_eq!(norm_cdf(1.96), 0.9750021048517795, epsilon = 1e-10);
        assert_abs_diff_eq!(norm_cdf(-1.96), 0.0249978951482205, epsilon = 1e-10);
    }

    #[test]
    fn test_norm_cdf_single_precision() {
        assert_abs_diff_eq!(norm_cdf(0.0f32), 0.5, epsilon = 1e-6);
        assert_abs_diff_eq!(norm_cdf(1.96f32), 0.9750021, epsilon = 1e-6);
        assert_abs_diff_eq!(ln_norm_cdf(-1.96f32), (0.0249979f32).ln(), epsilon = 1e-5);
    }

    #[test]
    fn test_gaussian_expected_log_prob() {
        let lik = GaussianLikelihood::new(0.25);
        // At var = 0 this is the plain gaussian log density
        let expected = -0.5 * ((2. * std::f64::consts::PI * 0.25).ln() + 0.09 / 0.25);
        assert_abs_diff_eq!(lik.expected_log_prob(1.3, 1.0, 0.0), expected, epsilon = 1e-12);
        // The latent variance only adds a -var/(2 noise) penalty
        assert_abs_diff_eq!(
            lik.expected_log_prob(1.3, 1.0, 0.1),
            expected - 0.5 * 0.1 / 0.25,
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_gaussian_predictive_adds_noise() {
        let lik = GaussianLikelihood::new(0.04);
        let (mu, var) = lik.predictive(0.7, 0.2);
        assert_abs_diff_eq!(mu, 0.7);
        assert_abs_diff_eq!(var, 0.24, epsilon = 1e-12);
    }

    #[test]
    fn test_bernoulli_expected_log_prob_degenerate_variance() {
        let lik: BernoulliLikelihood<f64> = BernoulliLikelihood::new(20).unwrap();
        for &(y, mu) in &[(1., 0.3), (-1., 0.3), (1., -1.2), (-1., 2.5)] {
            let expected = ln_norm_cdf(y * mu);
            assert_abs_diff_eq!(lik.expected_log_prob(y, mu, 0.0), expected, epsilon = 1e-8);
        }
    }

    #[test]
    fn test_bernoulli_predictive() {
        let lik: BernoulliLikelihood<f64> = BernoulliLikelihood::new(20).unwrap();
        let (p0, _) = lik.predictive(0.0, 1.0);
        assert_abs_diff_eq!(p0, 0.5, epsilon = 1e-12);
        // Thresholding the predictive mean at 0.5 flips exactly at latent mean 0
        let (p_pos, v_pos) = lik.predictive(0.8, 0.5);
        let (p_neg, _) = lik.predictive(-0.8, 0.5);
        assert!(p_pos > 0.5 && p_neg < 0.5);
        assert_abs_diff_eq!(p_pos + p_neg, 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(v_pos, p_pos * (1. - p_pos), epsilon = 1e-12);
        // More latent variance shrinks the probability toward 1/2
        let (p_flat, _) = lik.predictive(0.8, 4.0);
        assert!(p_flat < p_pos && p_flat > 0.5);
    }
}
