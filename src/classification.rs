//! A module for variational gaussian process binary classification.
//!
//! The Bernoulli likelihood makes the posterior intractable, so it is
//! approximated by a full-rank gaussian `q(f) = N(m, Lq Lq^T)` over the
//! latent values at the training inputs. The variational parameters are
//! trained jointly with the kernel and mean hyperparameters by maximizing
//! the evidence lower bound with the same fixed-iteration Adam loop used
//! for regression.

use crate::errors::{GpError, Result};
use crate::kernels::{CovarianceModel, SquaredExponentialKernel};
use crate::likelihoods::{BernoulliLikelihood, Likelihood};
use crate::mean_models::{ConstantMean, MeanModel};
use crate::optimization::{fit_params, log_bounds, pack_log, AdamSettings};
use crate::parameters::ThetaTuning;
use crate::regression::{sample, GpSamplingMethod};
use crate::utils::{into_f64, pairwise_differences};
use crate::variational_parameters::{VgpParams, VgpValidParams};

use linfa::prelude::{DatasetBase, Fit, Float, PredictInplace};
use linfa_linalg::{cholesky::*, triangular::*};
use log::debug;
use ndarray::{s, Array1, Array2, ArrayBase, Axis, Data, Ix1, Ix2};
use std::fmt;

/// Default number of Adam iterations for variational training
pub const VGP_DEFAULT_N_ITER: usize = 50;

/// Probit GP classifier: constant mean and squared exponential covariance
pub type ProbitGp<F> = VgpParams<F, ConstantMean, SquaredExponentialKernel>;

impl<F: Float> ProbitGp<F> {
    /// Probit GP classifier parameters constructor
    pub fn params() -> VgpParams<F, ConstantMean, SquaredExponentialKernel> {
        VgpParams::new(ConstantMean(), SquaredExponentialKernel())
    }
}

/// A GP binary classifier trained by variational inference.
///
/// Labels live in {-1, +1}. The latent posterior approximation is evaluated
/// at test inputs, then mapped through the probit link into a predictive
/// success probability; `predict` thresholds that probability at one half.
#[derive(Debug)]
pub struct VariationalGaussianProcess<F: Float, Mean: MeanModel<F>, Corr: CovarianceModel<F>> {
    /// Kernel hyperparameters (result of the internal optimization)
    theta: Array1<F>,
    /// Trained mean model coefficients
    coeffs: Array1<F>,
    /// Variational posterior mean over the latent training values
    vmean: Array1<F>,
    /// Lower-triangular variational posterior scale
    vscale: Array2<F>,
    /// Observation model (probit link, quadrature rule)
    likelihood: BernoulliLikelihood<F>,
    /// Final value of the training objective (negative ELBO per data point)
    objective: F,
    /// Objective value at each training iteration
    losses: Vec<f64>,
    /// Lower Cholesky factor of the regularized prior covariance
    r_chol: Array2<F>,
    /// Prior-covariance-solved variational offset `K^-1 (m - c)` as a
    /// (n, 1) column
    alpha: Array2<F>,
    /// Training dataset (input, labels)
    pub(crate) training_data: (Array2<F>, Array1<F>),
    /// Parameters used to fit this model
    pub(crate) params: VgpValidParams<F, Mean, Corr>,
}

impl<F: Float, Mean: MeanModel<F>, Corr: CovarianceModel<F>> Clone
    for VariationalGaussianProcess<F, Mean, Corr>
{
    fn clone(&self) -> Self {
        Self {
            theta: self.theta.to_owned(),
            coeffs: self.coeffs.to_owned(),
            vmean: self.vmean.to_owned(),
            vscale: self.vscale.to_owned(),
            likelihood: self.likelihood.clone(),
            objective: self.objective,
            losses: self.losses.clone(),
            r_chol: self.r_chol.to_owned(),
            alpha: self.alpha.to_owned(),
            training_data: self.training_data.clone(),
            params: self.params.clone(),
        }
    }
}

impl<F: Float, Mean: MeanModel<F>, Corr: CovarianceModel<F>> fmt::Display
    for VariationalGaussianProcess<F, Mean, Corr>
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "VGP(mean={}, corr={}, theta={}, objective={})",
            self.params.mean(),
            self.params.corr(),
            self.theta,
            self.objective,
        )
    }
}

impl<F: Float, Mean: MeanModel<F>, Corr: CovarianceModel<F>>
    VariationalGaussianProcess<F, Mean, Corr>
{
    /// Vgp parameters constructor
    pub fn params<NewMean: MeanModel<F>, NewCorr: CovarianceModel<F>>(
        mean: NewMean,
        corr: NewCorr,
    ) -> VgpParams<F, NewMean, NewCorr> {
        VgpParams::new(mean, corr)
    }

    /// Latent approximate posterior at n given `x` points of nx components
    /// specified as a (n, nx) matrix. Returns mean and variance vectors (n,).
    pub fn predict_valvar(
        &self,
        x: &ArrayBase<impl Data<Elem = F>, Ix2>,
    ) -> Result<(Array1<F>, Array1<F>)> {
        let corr = self.compute_cross_corr(x);
        let mu =
            self.params.mean().value(x, &self.coeffs) + corr.dot(&self.alpha).remove_axis(Axis(1));

        // k** - |L^-1 k*|^2 + |Lq^T K^-1 k*|^2 columnwise
        let v = self.r_chol.solve_triangular(&corr.t().to_owned(), UPLO::Lower)?;
        let u = self.r_chol.t().solve_triangular(&v, UPLO::Upper)?;
        let w = self.vscale.t().dot(&u);
        let prior_diag = self
            .params
            .corr()
            .value(&Array2::zeros((x.nrows(), x.ncols())), &self.theta)
            .remove_axis(Axis(1));
        let mut var = prior_diag - (&v * &v).sum_axis(Axis(0)) + (&w * &w).sum_axis(Axis(0));
        var.mapv_inplace(|v| v.max(F::zero()));
        Ok((mu, var))
    }

    /// Predictive probability of the positive class at n given `x` points,
    /// obtained by pushing the latent posterior through the probit link
    pub fn predict_proba(&self, x: &ArrayBase<impl Data<Elem = F>, Ix2>) -> Result<Array1<F>> {
        let (mu, var) = self.predict_valvar(x)?;
        let mut proba = mu;
        for (p, v) in proba.iter_mut().zip(var.iter()) {
            let (pm, _) = self.likelihood.predictive(*p, *v);
            *p = pm;
        }
        Ok(proba)
    }

    /// Predict class labels in {-1, +1} at n given `x` points by
    /// thresholding the predictive probability at one half
    pub fn predict(&self, x: &ArrayBase<impl Data<Elem = F>, Ix2>) -> Result<Array1<F>> {
        let proba = self.predict_proba(x)?;
        Ok(proba.mapv(|p| {
            if p >= F::cast(0.5) {
                F::one()
            } else {
                -F::one()
            }
        }))
    }

    /// Sample the latent approximate posterior for `n_traj` trajectories
    pub fn sample(&self, x: &ArrayBase<impl Data<Elem = F>, Ix2>, n_traj: usize) -> Array2<F> {
        let (mean, _) = self.predict_valvar(x).expect("posterior mean");
        let cov = self.posterior_cov(x).expect("posterior covariance");
        sample(
            mean.insert_axis(Axis(1)),
            cov,
            n_traj,
            GpSamplingMethod::EigenValues,
            self.params.seed(),
        )
    }

    /// Full latent posterior covariance matrix at the given x points
    fn posterior_cov(&self, x: &ArrayBase<impl Data<Elem = F>, Ix2>) -> Result<Array2<F>> {
        let corr = self.compute_cross_corr(x);
        let v = self.r_chol.solve_triangular(&corr.t().to_owned(), UPLO::Lower)?;
        let u = self.r_chol.t().solve_triangular(&v, UPLO::Upper)?;
        let w = self.vscale.t().dot(&u);
        let d = pairwise_differences(x, x);
        let prior = self
            .params
            .corr()
            .value(&d, &self.theta)
            .into_shape((x.nrows(), x.nrows()))
            .unwrap();
        Ok(prior - v.t().dot(&v) + w.t().dot(&w))
    }

    /// Covariance terms between the given x points and the training inputs
    fn compute_cross_corr(&self, x: &ArrayBase<impl Data<Elem = F>, Ix2>) -> Array2<F> {
        let xt = &self.training_data.0;
        let d = pairwise_differences(x, xt);
        self.params
            .corr()
            .value(&d, &self.theta)
            .into_shape((x.nrows(), xt.nrows()))
            .unwrap()
    }

    /// Optimized kernel hyperparameters
    pub fn theta(&self) -> &Array1<F> {
        &self.theta
    }

    /// Trained mean model coefficients
    pub fn coeffs(&self) -> &Array1<F> {
        &self.coeffs
    }

    /// Variational posterior mean over the latent training values
    pub fn variational_mean(&self) -> &Array1<F> {
        &self.vmean
    }

    /// Lower-triangular variational posterior scale
    pub fn variational_scale(&self) -> &Array2<F> {
        &self.vscale
    }

    /// Observation model
    pub fn likelihood(&self) -> &BernoulliLikelihood<F> {
        &self.likelihood
    }

    /// Final value of the training objective
    pub fn objective(&self) -> F {
        self.objective
    }

    /// Objective value at each training iteration
    pub fn loss_history(&self) -> &[f64] {
        &self.losses
    }

    /// Retrieve number of training points and of inputs components
    pub fn dims(&self) -> (usize, usize) {
        (self.training_data.0.nrows(), self.training_data.0.ncols())
    }
}

impl<F, D, Mean, Corr> PredictInplace<ArrayBase<D, Ix2>, Array1<F>>
    for VariationalGaussianProcess<F, Mean, Corr>
where
    F: Float,
    D: Data<Elem = F>,
    Mean: MeanModel<F>,
    Corr: CovarianceModel<F>,
{
    fn predict_inplace(&self, x: &ArrayBase<D, Ix2>, y: &mut Array1<F>) {
        assert_eq!(
            x.nrows(),
            y.len(),
            "The number of data points must match the number of output targets."
        );

        let values = self.predict(x).expect("VGP Prediction");
        *y = values;
    }

    fn default_target(&self, x: &ArrayBase<D, Ix2>) -> Array1<F> {
        Array1::zeros(x.nrows())
    }
}

/// Variational GP adaptor to implement `linfa::Predict` trait for
/// probability prediction.
pub struct VgpProbaPredictor<'a, F, Mean, Corr>(pub &'a VariationalGaussianProcess<F, Mean, Corr>)
where
    F: Float,
    Mean: MeanModel<F>,
    Corr: CovarianceModel<F>;

impl<F, D, Mean, Corr> PredictInplace<ArrayBase<D, Ix2>, Array1<F>>
    for VgpProbaPredictor<'_, F, Mean, Corr>
where
    F: Float,
    D: Data<Elem = F>,
    Mean: MeanModel<F>,
    Corr: CovarianceModel<F>,
{
    fn predict_inplace(&self, x: &ArrayBase<D, Ix2>, y: &mut Array1<F>) {
        assert_eq!(
            x.nrows(),
            y.len(),
            "The number of data points must match the number of output targets."
        );

        let values = self.0.predict_proba(x).expect("VGP Prediction");
        *y = values;
    }

    fn default_target(&self, x: &ArrayBase<D, Ix2>) -> Array1<F> {
        Array1::zeros(x.nrows())
    }
}

impl<F: Float, Mean: MeanModel<F>, Corr: CovarianceModel<F>, D: Data<Elem = F>>
    Fit<ArrayBase<D, Ix2>, ArrayBase<D, Ix1>, GpError> for VgpValidParams<F, Mean, Corr>
{
    type Object = VariationalGaussianProcess<F, Mean, Corr>;

    /// Fit variational GP parameters by ELBO maximization
    fn fit(
        &self,
        dataset: &DatasetBase<ArrayBase<D, Ix2>, ArrayBase<D, Ix1>>,
    ) -> Result<Self::Object> {
        let x = dataset.records();
        let y = dataset.targets();
        let n = x.nrows();
        let dim = x.ncols();
        if y.iter().any(|v| *v != F::one() && *v != -F::one()) {
            return Err(GpError::InvalidValueError(
                "class labels must be -1 or +1".to_string(),
            ));
        }

        let likelihood = BernoulliLikelihood::new(self.n_quad())?;

        let (theta0, theta_bounds) = match self.theta_tuning() {
            ThetaTuning::Auto => (
                self.corr().theta_init(x, y),
                Some((
                    F::cast(ThetaTuning::<F>::DEFAULT_BOUNDS.0),
                    F::cast(ThetaTuning::<F>::DEFAULT_BOUNDS.1),
                )),
            ),
            ThetaTuning::Fixed(init) => (init.to_owned(), None),
            ThetaTuning::Full { init, bounds } => (init.to_owned(), Some(*bounds)),
        };
        if theta0.len() != self.corr().n_params(dim) {
            return Err(GpError::InvalidValueError(format!(
                "Initial guess for theta should have {} components, got {}",
                self.corr().n_params(dim),
                theta0.len()
            )));
        }

        // Packed parameter vector: mean coefficients, then theta in log
        // space when optimized, then the variational mean m and the lower
        // triangle of Lq row by row with a log-parameterized diagonal.
        // Init is the prior itself: m = 0, Lq = I.
        let n_coeffs = self.mean().n_coeffs(dim);
        let theta_opt = theta_bounds.is_some();
        let n_theta = if theta_opt { theta0.len() } else { 0 };
        let n_tril = n * (n + 1) / 2;
        let mut p0 = vec![0.; n_coeffs + n_theta + n + n_tril];
        let mut bounds: Vec<Option<(f64, f64)>> = vec![None; p0.len()];
        if let Some(tb) = theta_bounds {
            for (k, t) in theta0.iter().enumerate() {
                p0[n_coeffs + k] = pack_log(*t);
                bounds[n_coeffs + k] = log_bounds(tb);
            }
        }

        let unpack = |p: &Array1<f64>| -> (Array1<F>, Array1<F>, Array1<F>, Array2<F>) {
            let coeffs = p.slice(s![..n_coeffs]).mapv(F::cast);
            let theta = if theta_opt {
                p.slice(s![n_coeffs..n_coeffs + n_theta])
                    .mapv(|v| F::cast(v.exp()))
            } else {
                theta0.to_owned()
            };
            let voff = n_coeffs + n_theta;
            let vmean = p.slice(s![voff..voff + n]).mapv(F::cast);
            let mut vscale = Array2::<F>::zeros((n, n));
            let mut k = voff + n;
            for i in 0..n {
                for j in 0..=i {
                    vscale[[i, j]] = if i == j {
                        F::cast(p[k].exp())
                    } else {
                        F::cast(p[k])
                    };
                    k += 1;
                }
            }
            (coeffs, theta, vmean, vscale)
        };

        let objfn = |p: &Array1<f64>| -> f64 {
            let (coeffs, theta, vmean, vscale) = unpack(p);
            match negative_elbo(
                self.mean(),
                self.corr(),
                &likelihood,
                x,
                y,
                &coeffs,
                &theta,
                &vmean,
                &vscale,
                self.nugget(),
            ) {
                Ok(obj) => into_f64(&obj),
                // A failed factorization surfaces as a non finite loss
                // and aborts the descent
                Err(_) => f64::INFINITY,
            }
        };

        let settings = AdamSettings {
            learning_rate: into_f64(&self.learning_rate()),
            ..Default::default()
        };
        let (opt, losses) = fit_params(
            &objfn,
            &Array1::from(p0),
            &bounds,
            settings,
            self.n_iter(),
            |_, _, p| {
                if theta_opt {
                    debug!("lengthscale {}", p[n_coeffs].exp());
                }
            },
        )?;

        let (coeffs, theta, vmean, vscale) = unpack(&opt);
        let objective = negative_elbo(
            self.mean(),
            self.corr(),
            &likelihood,
            x,
            y,
            &coeffs,
            &theta,
            &vmean,
            &vscale,
            self.nugget(),
        )?;

        // Factorize the fitted prior once for prediction
        let d = pairwise_differences(x, x);
        let mut r_mx = self.corr().value(&d, &theta).into_shape((n, n)).unwrap();
        r_mx.diag_mut().mapv_inplace(|v| v + self.nugget());
        let r_chol = r_mx.cholesky()?;
        let diff = (vmean.to_owned() - self.mean().value(x, &coeffs)).insert_axis(Axis(1));
        let z = r_chol.solve_triangular(&diff, UPLO::Lower)?;
        let alpha = r_chol.t().solve_triangular(&z, UPLO::Upper)?;

        Ok(VariationalGaussianProcess {
            theta,
            coeffs,
            vmean,
            vscale,
            likelihood,
            objective,
            losses,
            r_chol,
            alpha,
            training_data: (x.to_owned(), y.to_owned()),
            params: self.clone(),
        })
    }
}

/// Negative evidence lower bound, per data point.
///
/// `[KL(q || prior) - sum_i E_q[ln p(y_i | f_i)]] / n` where the expected
/// log-likelihood only needs the marginals `N(m_i, s_i)` of `q` and the KL
/// between the gaussians is computed through the prior Cholesky factor:
///
/// `KL = 0.5 * (|L^-1 Lq|_F^2 + |L^-1 (m - c)|^2 - n + ln|K| - ln|S|)`
#[allow(clippy::too_many_arguments)]
fn negative_elbo<F: Float, Mean: MeanModel<F>, Corr: CovarianceModel<F>>(
    mean: &Mean,
    corr: &Corr,
    likelihood: &BernoulliLikelihood<F>,
    xt: &ArrayBase<impl Data<Elem = F>, Ix2>,
    yt: &ArrayBase<impl Data<Elem = F>, Ix1>,
    coeffs: &Array1<F>,
    theta: &Array1<F>,
    vmean: &Array1<F>,
    vscale: &Array2<F>,
    nugget: F,
) -> Result<F> {
    let n = xt.nrows();
    let d = pairwise_differences(xt, xt);
    let mut r_mx = corr.value(&d, theta).into_shape((n, n)).unwrap();
    r_mx.diag_mut().mapv_inplace(|v| v + nugget);
    let r_chol = r_mx.cholesky()?;

    let diff = (vmean.to_owned() - mean.value(xt, coeffs)).insert_axis(Axis(1));
    let a_mx = r_chol.solve_triangular(vscale, UPLO::Lower)?;
    let a_vec = r_chol.solve_triangular(&diff, UPLO::Lower)?;
    let logdet_k = r_chol.diag().mapv(|v| v.ln()).sum() * F::cast(2.);
    let logdet_s = vscale.diag().mapv(|v| v.ln()).sum() * F::cast(2.);
    let n_f = F::cast(n as f64);
    let kl = F::cast(0.5)
        * ((&a_mx * &a_mx).sum() + (&a_vec * &a_vec).sum() - n_f + logdet_k - logdet_s);

    // Marginal variances of q are the squared row norms of Lq
    let mut ell = F::zero();
    for i in 0..n {
        let s_i = vscale.row(i).mapv(|v| v * v).sum();
        ell = ell + likelihood.expected_log_prob(yt[i], vmean[i], s_i);
    }
    Ok((kl - ell) / n_f)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datasets::sign_wave;
    use linfa::prelude::Dataset;
    use ndarray::array;

    #[test]
    fn test_classifier_fits_sign_wave() {
        let ds = sign_wave(10);
        let vgp = ProbitGp::<f64>::params().fit(&ds).expect("VGP fit");

        let losses = vgp.loss_history();
        assert_eq!(losses.len(), VGP_DEFAULT_N_ITER);
        let half = losses.len() / 2;
        let early: f64 = losses[..half].iter().sum::<f64>() / half as f64;
        let late: f64 = losses[half..].iter().sum::<f64>() / (losses.len() - half) as f64;
        assert!(late < early, "loss did not decrease: {early} -> {late}");

        let preds = vgp.predict(ds.records()).expect("prediction");
        for (p, y) in preds.iter().zip(ds.targets().iter()) {
            assert_eq!(*p, *y);
        }
    }

    #[test]
    fn test_probabilities_follow_labels() {
        let ds = sign_wave(10);
        let vgp = ProbitGp::<f64>::params().fit(&ds).expect("VGP fit");
        let proba = vgp.predict_proba(ds.records()).expect("prediction");
        for (p, y) in proba.iter().zip(ds.targets().iter()) {
            assert!(*p > 0. && *p < 1.);
            if *y > 0. {
                assert!(*p > 0.5, "p={p} for a positive label");
            } else {
                assert!(*p < 0.5, "p={p} for a negative label");
            }
        }
    }

    #[test]
    fn test_threshold_rule_matches_latent_sign() {
        // With a symmetric link, thresholding the predictive probability at
        // one half is the same decision as thresholding the latent mean at
        // zero
        let ds = sign_wave(10);
        let vgp = ProbitGp::<f64>::params().fit(&ds).expect("VGP fit");
        let xs = array![[0.05], [0.3], [0.6], [0.9], [1.3]];
        let labels = vgp.predict(&xs).expect("prediction");
        let (mu, _) = vgp.predict_valvar(&xs).expect("prediction");
        for (l, m) in labels.iter().zip(mu.iter()) {
            assert_eq!(*l, if *m >= 0. { 1. } else { -1. });
        }
    }

    #[test]
    fn test_training_is_deterministic() {
        let ds = sign_wave(10);
        let params = ProbitGp::<f64>::params().n_iter(15);
        let vgp1 = params.clone().fit(&ds).expect("VGP fit");
        let vgp2 = params.fit(&ds).expect("VGP fit");
        assert_eq!(vgp1.loss_history(), vgp2.loss_history());
        assert_eq!(vgp1.theta(), vgp2.theta());
    }

    #[test]
    fn test_bad_labels_are_rejected() {
        let ds = Dataset::new(array![[0.], [1.]], array![0., 1.]);
        let res = ProbitGp::<f64>::params().fit(&ds);
        assert!(matches!(res, Err(GpError::InvalidValueError(_))));
    }
}
