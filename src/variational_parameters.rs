use crate::classification::VGP_DEFAULT_N_ITER;
use crate::errors::{GpError, Result};
use crate::kernels::CovarianceModel;
use crate::mean_models::MeanModel;
use crate::parameters::{check_theta_tuning, ThetaTuning};
use linfa::{Float, ParamGuard};

use ndarray::Array1;

/// A set of validated variational GP classification parameters.
#[derive(Clone, Debug, PartialEq)]
pub struct VgpValidParams<F: Float, Mean: MeanModel<F>, Corr: CovarianceModel<F>> {
    /// Tuning of the kernel hyperparameters
    pub(crate) theta_tuning: ThetaTuning<F>,
    /// Mean model of the GP prior
    pub(crate) mean: Mean,
    /// Covariance model of the GP prior
    pub(crate) corr: Corr,
    /// Number of Adam iterations
    pub(crate) n_iter: usize,
    /// Adam step size
    pub(crate) learning_rate: F,
    /// Number of Gauss-Hermite quadrature points used by the expected
    /// log-likelihood term
    pub(crate) n_quad: usize,
    /// Diagonal jitter added to the training covariance
    pub(crate) nugget: F,
    /// Seed used by latent trajectory sampling
    pub(crate) seed: Option<u64>,
}

impl<F: Float, Mean: MeanModel<F>, Corr: CovarianceModel<F>> Default
    for VgpValidParams<F, Mean, Corr>
{
    fn default() -> VgpValidParams<F, Mean, Corr> {
        VgpValidParams {
            theta_tuning: ThetaTuning::default(),
            mean: Mean::default(),
            corr: Corr::default(),
            n_iter: VGP_DEFAULT_N_ITER,
            learning_rate: F::cast(0.1),
            n_quad: 20,
            nugget: F::cast(1e-6),
            seed: None,
        }
    }
}

impl<F: Float, Mean: MeanModel<F>, Corr: CovarianceModel<F>> VgpValidParams<F, Mean, Corr> {
    /// Get mean model
    pub fn mean(&self) -> &Mean {
        &self.mean
    }

    /// Get covariance model k(x, x')
    pub fn corr(&self) -> &Corr {
        &self.corr
    }

    /// Get the tuning of kernel hyperparameters
    pub fn theta_tuning(&self) -> &ThetaTuning<F> {
        &self.theta_tuning
    }

    /// Get the number of training iterations
    pub fn n_iter(&self) -> usize {
        self.n_iter
    }

    /// Get the Adam step size
    pub fn learning_rate(&self) -> F {
        self.learning_rate
    }

    /// Get the number of quadrature points
    pub fn n_quad(&self) -> usize {
        self.n_quad
    }

    /// Get the nugget value
    pub fn nugget(&self) -> F {
        self.nugget
    }

    /// Get the sampling seed
    pub fn seed(&self) -> Option<u64> {
        self.seed
    }
}

#[derive(Clone, Debug)]
/// The set of hyperparameters that can be specified for the execution of
/// the [variational GP algorithm](struct.VariationalGaussianProcess.html).
pub struct VgpParams<F: Float, Mean: MeanModel<F>, Corr: CovarianceModel<F>>(
    VgpValidParams<F, Mean, Corr>,
);

impl<F: Float, Mean: MeanModel<F>, Corr: CovarianceModel<F>> VgpParams<F, Mean, Corr> {
    /// A constructor for variational GP parameters given mean and
    /// covariance models
    pub fn new(mean: Mean, corr: Corr) -> VgpParams<F, Mean, Corr> {
        Self(VgpValidParams {
            mean,
            corr,
            ..Default::default()
        })
    }

    /// Set mean model.
    pub fn mean(mut self, mean: Mean) -> Self {
        self.0.mean = mean;
        self
    }

    /// Set covariance model.
    pub fn corr(mut self, corr: Corr) -> Self {
        self.0.corr = corr;
        self
    }

    /// Set kernel hyperparameter tuning
    pub fn theta_tuning(mut self, theta_tuning: ThetaTuning<F>) -> Self {
        self.0.theta_tuning = theta_tuning;
        self
    }

    /// Set initial kernel hyperparameter values, optimized within default bounds
    pub fn theta_init(mut self, theta_init: Array1<F>) -> Self {
        self.0.theta_tuning = ThetaTuning::Full {
            init: theta_init,
            bounds: (
                F::cast(ThetaTuning::<F>::DEFAULT_BOUNDS.0),
                F::cast(ThetaTuning::<F>::DEFAULT_BOUNDS.1),
            ),
        };
        self
    }

    /// Set the number of Adam iterations
    pub fn n_iter(mut self, n_iter: usize) -> Self {
        self.0.n_iter = n_iter;
        self
    }

    /// Set the Adam step size
    pub fn learning_rate(mut self, learning_rate: F) -> Self {
        self.0.learning_rate = learning_rate;
        self
    }

    /// Set the number of Gauss-Hermite quadrature points
    pub fn n_quad(mut self, n_quad: usize) -> Self {
        self.0.n_quad = n_quad;
        self
    }

    /// Set nugget.
    ///
    /// Nugget is used to improve numerical stability
    pub fn nugget(mut self, nugget: F) -> Self {
        self.0.nugget = nugget;
        self
    }

    /// Set the seed used by latent trajectory sampling
    pub fn seed(mut self, seed: Option<u64>) -> Self {
        self.0.seed = seed;
        self
    }
}

impl<F: Float, Mean: MeanModel<F>, Corr: CovarianceModel<F>> From<VgpValidParams<F, Mean, Corr>>
    for VgpParams<F, Mean, Corr>
{
    fn from(valid: VgpValidParams<F, Mean, Corr>) -> Self {
        VgpParams(valid)
    }
}

impl<F: Float, Mean: MeanModel<F>, Corr: CovarianceModel<F>> ParamGuard
    for VgpParams<F, Mean, Corr>
{
    type Checked = VgpValidParams<F, Mean, Corr>;
    type Error = GpError;

    fn check_ref(&self) -> Result<&Self::Checked> {
        check_theta_tuning(&self.0.theta_tuning)?;
        if self.0.learning_rate <= F::zero() {
            return Err(GpError::InvalidValueError(
                "learning rate must be positive".to_string(),
            ));
        }
        if self.0.n_quad == 0 {
            return Err(GpError::InvalidValueError(
                "at least one quadrature point is required".to_string(),
            ));
        }
        if self.0.nugget < F::zero() {
            return Err(GpError::InvalidValueError(
                "nugget cannot be negative".to_string(),
            ));
        }
        Ok(&self.0)
    }

    fn check(self) -> Result<Self::Checked> {
        self.check_ref()?;
        Ok(self.0)
    }
}
