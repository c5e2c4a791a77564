//! A module for exact gaussian process regression.
//!
//! Hyperparameters, the constant mean coefficient and the observation noise
//! variance are trained jointly by maximizing the exact marginal likelihood
//! of the data with a fixed-iteration Adam loop. Prediction is the
//! closed-form posterior conditioned on the training set.

use crate::errors::{GpError, Result};
use crate::kernels::{CovarianceModel, SpectralMixtureKernel};
use crate::likelihoods::{GaussianLikelihood, Likelihood};
use crate::mean_models::{ConstantMean, MeanModel};
use crate::optimization::{fit_params, log_bounds, pack_log, AdamSettings};
use crate::parameters::{GpParams, GpValidParams, ParamTuning, ThetaTuning};
use crate::utils::{into_f64, pairwise_differences};

use linfa::prelude::{DatasetBase, Fit, Float, PredictInplace};
use linfa_linalg::{cholesky::*, eigh::*, triangular::*};
use ndarray::{s, Array1, Array2, ArrayBase, Axis, Data, Ix1, Ix2, Zip};
use ndarray_rand::rand::SeedableRng;
use ndarray_rand::rand_distr::Normal;
use ndarray_rand::RandomExt;
use rand_xoshiro::Xoshiro256Plus;
use std::fmt;

/// Default number of Adam iterations for regression training
pub const GP_DEFAULT_N_ITER: usize = 100;

/// Factorized quantities reused by every prediction
#[derive(Debug)]
pub(crate) struct GpInnerParams<F: Float> {
    /// Lower Cholesky factor of the regularized training covariance
    r_chol: Array2<F>,
    /// Covariance-solved residuals `K^-1 (y - m)` as a (n, 1) column
    alpha: Array2<F>,
}

impl<F: Float> Clone for GpInnerParams<F> {
    fn clone(&self) -> Self {
        Self {
            r_chol: self.r_chol.to_owned(),
            alpha: self.alpha.to_owned(),
        }
    }
}

/// A GP regression model trained by exact marginal likelihood maximization.
///
/// Training conditions the gaussian prior defined by the mean and covariance
/// models on the observed data, under gaussian observation noise. The
/// posterior mean interpolates the data when the noise is zero and reverts
/// to the prior mean away from it, with variance growing back to the prior
/// variance.
#[derive(Debug)]
pub struct GaussianProcess<F: Float, Mean: MeanModel<F>, Corr: CovarianceModel<F>> {
    /// Kernel hyperparameters (result of the internal optimization)
    theta: Array1<F>,
    /// Trained mean model coefficients
    coeffs: Array1<F>,
    /// Observation model with the trained noise variance
    likelihood: GaussianLikelihood<F>,
    /// Final value of the training objective (negative marginal
    /// log-likelihood per data point)
    objective: F,
    /// Objective value at each training iteration
    losses: Vec<f64>,
    /// Factorized quantities reused by predictions
    inner_params: GpInnerParams<F>,
    /// Training dataset (input, output)
    pub(crate) training_data: (Array2<F>, Array1<F>),
    /// Parameters used to fit this model
    pub(crate) params: GpValidParams<F, Mean, Corr>,
}

pub(crate) enum GpSamplingMethod {
    Cholesky,
    EigenValues,
}

/// Spectral mixture GP: constant mean and spectral mixture covariance
pub type SpectralMixtureGp<F> = GpParams<F, ConstantMean, SpectralMixtureKernel>;

impl<F: Float> SpectralMixtureGp<F> {
    /// Spectral mixture GP parameters constructor
    pub fn params() -> GpParams<F, ConstantMean, SpectralMixtureKernel> {
        GpParams::new(ConstantMean(), SpectralMixtureKernel::default())
    }
}

impl<F: Float, Mean: MeanModel<F>, Corr: CovarianceModel<F>> Clone
    for GaussianProcess<F, Mean, Corr>
{
    fn clone(&self) -> Self {
        Self {
            theta: self.theta.to_owned(),
            coeffs: self.coeffs.to_owned(),
            likelihood: self.likelihood.clone(),
            objective: self.objective,
            losses: self.losses.clone(),
            inner_params: self.inner_params.clone(),
            training_data: self.training_data.clone(),
            params: self.params.clone(),
        }
    }
}

impl<F: Float, Mean: MeanModel<F>, Corr: CovarianceModel<F>> fmt::Display
    for GaussianProcess<F, Mean, Corr>
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "GP(mean={}, corr={}, theta={}, noise={}, objective={})",
            self.params.mean(),
            self.params.corr(),
            self.theta,
            self.likelihood.noise,
            self.objective,
        )
    }
}

impl<F: Float, Mean: MeanModel<F>, Corr: CovarianceModel<F>> GaussianProcess<F, Mean, Corr> {
    /// Gp parameters constructor
    pub fn params<NewMean: MeanModel<F>, NewCorr: CovarianceModel<F>>(
        mean: NewMean,
        corr: NewCorr,
    ) -> GpParams<F, NewMean, NewCorr> {
        GpParams::new(mean, corr)
    }

    /// Predict output values at n given `x` points of nx components specified
    /// as a (n, nx) matrix. Returns n scalar output values as a vector (n,).
    pub fn predict(&self, x: &ArrayBase<impl Data<Elem = F>, Ix2>) -> Result<Array1<F>> {
        let corr = self.compute_cross_corr(x);
        let mu = self.params.mean().value(x, &self.coeffs)
            + corr.dot(&self.inner_params.alpha).remove_axis(Axis(1));
        Ok(mu)
    }

    /// Predict latent variance values at n given `x` points of nx components
    /// specified as a (n, nx) matrix. Returns n variance values as a vector
    /// (n,), clamped at zero.
    pub fn predict_var(&self, x: &ArrayBase<impl Data<Elem = F>, Ix2>) -> Result<Array1<F>> {
        let corr = self.compute_cross_corr(x);
        let rt = self
            .inner_params
            .r_chol
            .solve_triangular(&corr.t().to_owned(), UPLO::Lower)?;
        let prior_diag = self
            .params
            .corr()
            .value(&Array2::zeros((x.nrows(), x.ncols())), &self.theta)
            .remove_axis(Axis(1));
        let mut var = prior_diag - (&rt * &rt).sum_axis(Axis(0));
        var.mapv_inplace(|v| v.max(F::zero()));
        Ok(var)
    }

    /// Predict both output and latent variance values at n given `x` points
    pub fn predict_valvar(
        &self,
        x: &ArrayBase<impl Data<Elem = F>, Ix2>,
    ) -> Result<(Array1<F>, Array1<F>)> {
        Ok((self.predict(x)?, self.predict_var(x)?))
    }

    /// Predict the observation distribution at n given `x` points: the
    /// latent posterior mapped through the gaussian likelihood, hence with
    /// the learned noise variance added to the latent variance.
    pub fn predict_observation(
        &self,
        x: &ArrayBase<impl Data<Elem = F>, Ix2>,
    ) -> Result<(Array1<F>, Array1<F>)> {
        let (mut mu, mut var) = self.predict_valvar(x)?;
        Zip::from(&mut mu).and(&mut var).for_each(|m, v| {
            let (om, ov) = self.likelihood.predictive(*m, *v);
            *m = om;
            *v = ov;
        });
        Ok((mu, var))
    }

    /// Sample the posterior for `n_traj` trajectories using cholesky
    /// decomposition of the conditioned covariance matrix
    pub fn sample_chol(&self, x: &ArrayBase<impl Data<Elem = F>, Ix2>, n_traj: usize) -> Array2<F> {
        self._sample(x, n_traj, GpSamplingMethod::Cholesky)
    }

    /// Sample the posterior for `n_traj` trajectories using eigenvalues decomposition
    pub fn sample_eig(&self, x: &ArrayBase<impl Data<Elem = F>, Ix2>, n_traj: usize) -> Array2<F> {
        self._sample(x, n_traj, GpSamplingMethod::EigenValues)
    }

    /// Sample the posterior for `n_traj` trajectories (alias of `sample_eig`)
    pub fn sample(&self, x: &ArrayBase<impl Data<Elem = F>, Ix2>, n_traj: usize) -> Array2<F> {
        self.sample_eig(x, n_traj)
    }

    fn _sample(
        &self,
        x: &ArrayBase<impl Data<Elem = F>, Ix2>,
        n_traj: usize,
        method: GpSamplingMethod,
    ) -> Array2<F> {
        let mean = self.predict(x).expect("posterior mean");
        let cov = self.posterior_cov(x).expect("posterior covariance");
        sample(
            mean.insert_axis(Axis(1)),
            cov,
            n_traj,
            method,
            self.params.seed(),
        )
    }

    /// Full posterior covariance matrix at the given x points
    fn posterior_cov(&self, x: &ArrayBase<impl Data<Elem = F>, Ix2>) -> Result<Array2<F>> {
        let corr = self.compute_cross_corr(x);
        let rt = self
            .inner_params
            .r_chol
            .solve_triangular(&corr.t().to_owned(), UPLO::Lower)?;
        let d = pairwise_differences(x, x);
        let prior = self
            .params
            .corr()
            .value(&d, &self.theta)
            .into_shape((x.nrows(), x.nrows()))
            .unwrap();
        Ok(prior - rt.t().dot(&rt))
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

    /// Trained observation noise variance
    pub fn noise_variance(&self) -> F {
        self.likelihood.noise
    }

    /// Observation model with the trained noise variance
    pub fn likelihood(&self) -> &GaussianLikelihood<F> {
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

    /// Retrieve number of values to predict and of inputs components
    pub fn dims(&self) -> (usize, usize) {
        (self.training_data.0.nrows(), self.training_data.0.ncols())
    }
}

impl<F, D, Mean, Corr> PredictInplace<ArrayBase<D, Ix2>, Array1<F>>
    for GaussianProcess<F, Mean, Corr>
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

        let values = self.predict(x).expect("GP Prediction");
        *y = values;
    }

    fn default_target(&self, x: &ArrayBase<D, Ix2>) -> Array1<F> {
        Array1::zeros(x.nrows())
    }
}

/// Gaussian process adaptor to implement `linfa::Predict` trait for
/// variance prediction.
pub struct GpVariancePredictor<'a, F, Mean, Corr>(pub &'a GaussianProcess<F, Mean, Corr>)
where
    F: Float,
    Mean: MeanModel<F>,
    Corr: CovarianceModel<F>;

impl<F, D, Mean, Corr> PredictInplace<ArrayBase<D, Ix2>, Array1<F>>
    for GpVariancePredictor<'_, F, Mean, Corr>
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

        let values = self.0.predict_var(x).expect("GP Prediction");
        *y = values;
    }

    fn default_target(&self, x: &ArrayBase<D, Ix2>) -> Array1<F> {
        Array1::zeros(x.nrows())
    }
}

impl<F: Float, Mean: MeanModel<F>, Corr: CovarianceModel<F>, D: Data<Elem = F>>
    Fit<ArrayBase<D, Ix2>, ArrayBase<D, Ix1>, GpError> for GpValidParams<F, Mean, Corr>
{
    type Object = GaussianProcess<F, Mean, Corr>;

    /// Fit GP parameters using exact marginal likelihood maximization
    fn fit(
        &self,
        dataset: &DatasetBase<ArrayBase<D, Ix2>, ArrayBase<D, Ix1>>,
    ) -> Result<Self::Object> {
        let x = dataset.records();
        let y = dataset.targets();
        let dim = x.ncols();

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

        let (noise0, noise_bounds) = match self.noise_variance() {
            ParamTuning::Fixed(v) => (*v, None),
            ParamTuning::Optimized { init, bounds } => (*init, Some(*bounds)),
        };

        // Packed parameter vector: mean coefficients in natural space,
        // then noise variance and theta in log space when optimized
        let n_coeffs = self.mean().n_coeffs(dim);
        let mut p0 = vec![0.; n_coeffs];
        let mut bounds: Vec<Option<(f64, f64)>> = vec![None; n_coeffs];
        if let Some(nb) = noise_bounds {
            p0.push(pack_log(noise0));
            bounds.push(log_bounds(nb));
        }
        if let Some(tb) = theta_bounds {
            p0.extend(theta0.iter().map(|t| pack_log(*t)));
            bounds.extend(std::iter::repeat(log_bounds(tb)).take(theta0.len()));
        }

        let noise_opt = noise_bounds.is_some();
        let theta_opt = theta_bounds.is_some();
        let unpack = |p: &Array1<f64>| -> (Array1<F>, F, Array1<F>) {
            let coeffs = p.slice(s![..n_coeffs]).mapv(F::cast);
            let mut off = n_coeffs;
            let noise = if noise_opt {
                off += 1;
                F::cast(p[off - 1].exp())
            } else {
                noise0
            };
            let theta = if theta_opt {
                p.slice(s![off..]).mapv(|v| F::cast(v.exp()))
            } else {
                theta0.to_owned()
            };
            (coeffs, noise, theta)
        };

        let objfn = |p: &Array1<f64>| -> f64 {
            let (coeffs, noise, theta) = unpack(p);
            match negative_marginal_likelihood(
                self.mean(),
                self.corr(),
                x,
                y,
                &coeffs,
                noise,
                &theta,
                self.nugget(),
            ) {
                Ok((obj, _)) => into_f64(&obj),
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
            |_, _, _| {},
        )?;

        let (coeffs, noise, theta) = unpack(&opt);
        let (objective, inner_params) = negative_marginal_likelihood(
            self.mean(),
            self.corr(),
            x,
            y,
            &coeffs,
            noise,
            &theta,
            self.nugget(),
        )?;
        Ok(GaussianProcess {
            theta,
            coeffs,
            likelihood: GaussianLikelihood::new(noise),
            objective,
            losses,
            inner_params,
            training_data: (x.to_owned(), y.to_owned()),
            params: self.clone(),
        })
    }
}

/// Negative marginal log-likelihood of the data, per data point, together
/// with the factorized quantities prediction needs.
///
/// `0.5 * [(y-m)^T K^-1 (y-m) + ln|K| + n ln 2 pi] / n` with
/// `K = corr(xt, xt) + (noise + nugget) I`, computed through the lower
/// Cholesky factor of `K`.
#[allow(clippy::too_many_arguments)]
fn negative_marginal_likelihood<F: Float, Mean: MeanModel<F>, Corr: CovarianceModel<F>>(
    mean: &Mean,
    corr: &Corr,
    xt: &ArrayBase<impl Data<Elem = F>, Ix2>,
    yt: &ArrayBase<impl Data<Elem = F>, Ix1>,
    coeffs: &Array1<F>,
    noise: F,
    theta: &Array1<F>,
    nugget: F,
) -> Result<(F, GpInnerParams<F>)> {
    let n = xt.nrows();
    let d = pairwise_differences(xt, xt);
    let mut r_mx = corr.value(&d, theta).into_shape((n, n)).unwrap();
    let diag_add = noise + nugget;
    r_mx.diag_mut().mapv_inplace(|v| v + diag_add);

    // K cholesky decomposition
    let r_chol = r_mx.cholesky()?;
    let resid = (yt.to_owned() - mean.value(xt, coeffs)).insert_axis(Axis(1));
    let z = r_chol.solve_triangular(&resid, UPLO::Lower)?;
    let alpha = r_chol.t().solve_triangular(&z, UPLO::Upper)?;

    let quad = (&z * &z).sum();
    let logdet = r_chol.diag().mapv(|v| v.ln()).sum() * F::cast(2.);
    let n_f = F::cast(n as f64);
    let ln_2pi = F::cast((2. * std::f64::consts::PI).ln());
    let obj = F::cast(0.5) * (quad + logdet + n_f * ln_2pi) / n_f;
    Ok((obj, GpInnerParams { r_chol, alpha }))
}

/// Draw `n_traj` trajectories from a gaussian with mean `mean_x` (n, 1) and
/// covariance `cov_x` (n, n), using either cholesky or eigenvalues
/// decomposition of the covariance. The latter is recommended as cholesky
/// decomposition suffers from ill-conditioned posterior covariances when
/// the number of x locations increases.
pub(crate) fn sample<F: Float>(
    mean_x: Array2<F>,
    cov_x: Array2<F>,
    n_traj: usize,
    method: GpSamplingMethod,
    seed: Option<u64>,
) -> Array2<F> {
    let n_eval = cov_x.nrows();
    let c = match method {
        GpSamplingMethod::Cholesky => cov_x.cholesky().unwrap(),
        GpSamplingMethod::EigenValues => {
            let (v, w) = cov_x.eigh_into().unwrap();
            let v = v.mapv(|x| {
                // Negative eigenvalues from roundoff are floored out
                if x < F::cast(1e-9) {
                    return F::zero();
                }
                x.sqrt()
            });
            w.dot(&Array2::from_diag(&v))
        }
    };
    let normal = Normal::new(0., 1.).unwrap();
    let mut rng = match seed {
        Some(seed) => Xoshiro256Plus::seed_from_u64(seed),
        None => Xoshiro256Plus::from_entropy(),
    };
    let ary = Array2::random_using((n_eval, n_traj), normal, &mut rng).mapv(|v| F::cast(v));
    mean_x + c.dot(&ary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datasets::sine_wave;
    use crate::kernels::SquaredExponentialKernel;
    use approx::assert_abs_diff_eq;
    use linfa::prelude::Dataset;
    use ndarray::{array, Array};

    fn interpolating_gp() -> GaussianProcess<f64, ConstantMean, SquaredExponentialKernel> {
        let xt = Array::linspace(0., 1., 8).insert_axis(Axis(1));
        let yt = xt.column(0).mapv(|x| (2. * std::f64::consts::PI * x).sin());
        let ds = Dataset::new(xt, yt);
        GaussianProcess::<f64, ConstantMean, SquaredExponentialKernel>::params(
            ConstantMean(),
            SquaredExponentialKernel(),
        )
        .theta_tuning(ThetaTuning::Fixed(array![0.3, 1.0]))
        .noise_variance(ParamTuning::Fixed(0.))
        .n_iter(30)
        .fit(&ds)
        .expect("GP fit")
    }

    #[test]
    fn test_zero_noise_interpolates_training_points() {
        let gp = interpolating_gp();
        let (xt, yt) = gp.training_data.clone();
        let preds = gp.predict(&xt).expect("prediction");
        let vars = gp.predict_var(&xt).expect("variance");
        for (p, y) in preds.iter().zip(yt.iter()) {
            assert_abs_diff_eq!(*p, *y, epsilon = 1e-4);
        }
        // With zero observation noise the posterior variance collapses at
        // the training inputs, up to the nugget
        for v in vars.iter() {
            assert!(*v >= 0.);
            assert!(*v < 1e-6, "variance {v} at a training input");
        }
    }

    #[test]
    fn test_variance_grows_away_from_data() {
        let gp = interpolating_gp();
        let xs = array![[0.5], [1.2], [1.5], [3.0]];
        let vars = gp.predict_var(&xs).expect("variance");
        assert!(vars[0] < vars[1]);
        assert!(vars[1] < vars[2]);
        assert!(vars[2] < vars[3]);
        // Far outside the data the posterior reverts to the prior:
        // unit variance and the constant mean
        assert_abs_diff_eq!(vars[3], 1.0, epsilon = 1e-3);
        let far = gp.predict(&array![[3.0]]).expect("prediction");
        assert_abs_diff_eq!(far[0], gp.coeffs()[0], epsilon = 1e-3);
    }

    #[test]
    fn test_spectral_mixture_fit_sine() {
        let ds = sine_wave(15, 0., None);
        let gp = SpectralMixtureGp::<f64>::params()
            .fit(&ds)
            .expect("GP fit");

        let losses = gp.loss_history();
        assert_eq!(losses.len(), GP_DEFAULT_N_ITER);
        let first = losses[0];
        let last = *losses.last().unwrap();
        assert!(last < first, "loss did not decrease: {first} -> {last}");
        assert!(last < 0., "final loss {last} should drop below zero");

        // sin(2 pi x) peaks at one quarter of the period
        let x = array![[0.25]];
        let (mu, var) = gp.predict_observation(&x).expect("prediction");
        assert_abs_diff_eq!(mu[0], 1.0, epsilon = 0.2);
        let band = 2. * var[0].sqrt();
        assert!(
            mu[0] - band <= 1.0 && 1.0 <= mu[0] + band,
            "true value outside the confidence band: mu={} band={band}",
            mu[0]
        );
    }

    #[test]
    fn test_training_is_deterministic() {
        let ds = sine_wave(15, 0., None);
        let params = SpectralMixtureGp::<f64>::params().n_iter(20);
        let gp1 = params.clone().fit(&ds).expect("GP fit");
        let gp2 = params.fit(&ds).expect("GP fit");
        assert_eq!(gp1.loss_history(), gp2.loss_history());
        assert_eq!(gp1.theta(), gp2.theta());
        assert_eq!(gp1.noise_variance(), gp2.noise_variance());
    }

    #[test]
    fn test_seeded_sampling_is_reproducible() {
        let ds = sine_wave(10, 0., None);
        let gp = SpectralMixtureGp::<f64>::params()
            .n_iter(10)
            .seed(Some(42))
            .fit(&ds)
            .expect("GP fit");
        let x = Array::linspace(0., 1., 25).insert_axis(Axis(1));
        let t1 = gp.sample(&x, 5);
        let t2 = gp.sample(&x, 5);
        assert_eq!(t1.dim(), (25, 5));
        assert_abs_diff_eq!(t1, t2, epsilon = 1e-12);
    }

    #[test]
    fn test_wrong_theta_dimension_is_rejected() {
        let ds = sine_wave(10, 0., None);
        let res = GaussianProcess::<f64, ConstantMean, SquaredExponentialKernel>::params(
            ConstantMean(),
            SquaredExponentialKernel(),
        )
        .theta_tuning(ThetaTuning::Fixed(array![0.3]))
        .fit(&ds);
        assert!(matches!(res, Err(GpError::InvalidValueError(_))));
    }
}
