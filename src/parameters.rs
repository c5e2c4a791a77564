use crate::errors::{GpError, Result};
use crate::kernels::CovarianceModel;
use crate::mean_models::MeanModel;
use crate::regression::GP_DEFAULT_N_ITER;
use linfa::{Float, ParamGuard};

use ndarray::Array1;

/// An enum to represent the tuning of kernel hyperparameters
#[derive(Clone, Debug, PartialEq)]
pub enum ThetaTuning<F: Float> {
    /// Initial values are derived from the training data and optimized
    /// within default bounds
    Auto,
    /// Constant parameters (ie given, not estimated)
    Fixed(Array1<F>),
    /// Parameters are optimized starting from the given initial guess,
    /// clamped to the given (lower, upper) bounds
    Full {
        /// Initial guess for the parameters
        init: Array1<F>,
        /// Bounds applied to every parameter (lower, upper)
        bounds: (F, F),
    },
}

impl<F: Float> Default for ThetaTuning<F> {
    fn default() -> Self {
        ThetaTuning::Auto
    }
}

impl<F: Float> ThetaTuning<F> {
    /// Default bounds for kernel hyperparameter values
    pub const DEFAULT_BOUNDS: (f64, f64) = (1e-6, 1e6);
}

/// Tuning of a scalar positive parameter (the observation noise variance)
#[derive(Clone, Debug, PartialEq)]
pub enum ParamTuning<F: Float> {
    /// Constant parameter (ie given, not estimated)
    Fixed(F),
    /// Parameter is optimized between given bounds (lower, upper) starting
    /// from the initial guess
    Optimized {
        /// Initial guess parameter value
        init: F,
        /// Bounds of the optimized parameter (lower, upper)
        bounds: (F, F),
    },
}

impl<F: Float> Default for ParamTuning<F> {
    fn default() -> Self {
        Self::Optimized {
            init: F::cast(1e-2),
            bounds: (F::cast(1e-6), F::cast(1e2)),
        }
    }
}

/// A set of validated GP regression parameters.
#[derive(Clone, Debug, PartialEq)]
pub struct GpValidParams<F: Float, Mean: MeanModel<F>, Corr: CovarianceModel<F>> {
    /// Tuning of the kernel hyperparameters
    pub(crate) theta_tuning: ThetaTuning<F>,
    /// Mean model of the GP prior
    pub(crate) mean: Mean,
    /// Covariance model of the GP prior
    pub(crate) corr: Corr,
    /// Tuning of the gaussian observation noise variance
    pub(crate) noise: ParamTuning<F>,
    /// Number of Adam iterations
    pub(crate) n_iter: usize,
    /// Adam step size
    pub(crate) learning_rate: F,
    /// Parameter to improve numerical stability
    pub(crate) nugget: F,
    /// Seed used by posterior trajectory sampling
    pub(crate) seed: Option<u64>,
}

impl<F: Float, Mean: MeanModel<F>, Corr: CovarianceModel<F>> Default
    for GpValidParams<F, Mean, Corr>
{
    fn default() -> GpValidParams<F, Mean, Corr> {
        GpValidParams {
            theta_tuning: ThetaTuning::default(),
            mean: Mean::default(),
            corr: Corr::default(),
            noise: ParamTuning::default(),
            n_iter: GP_DEFAULT_N_ITER,
            learning_rate: F::cast(0.1),
            nugget: F::cast(100.0) * F::epsilon(),
            seed: None,
        }
    }
}

impl<F: Float, Mean: MeanModel<F>, Corr: CovarianceModel<F>> GpValidParams<F, Mean, Corr> {
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

    /// Get the tuning of the noise variance
    pub fn noise_variance(&self) -> &ParamTuning<F> {
        &self.noise
    }

    /// Get the number of training iterations
    pub fn n_iter(&self) -> usize {
        self.n_iter
    }

    /// Get the Adam step size
    pub fn learning_rate(&self) -> F {
        self.learning_rate
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
/// the [GP algorithm](struct.GaussianProcess.html).
pub struct GpParams<F: Float, Mean: MeanModel<F>, Corr: CovarianceModel<F>>(
    GpValidParams<F, Mean, Corr>,
);

impl<F: Float, Mean: MeanModel<F>, Corr: CovarianceModel<F>> GpParams<F, Mean, Corr> {
    /// A constructor for GP parameters given mean and covariance models
    pub fn new(mean: Mean, corr: Corr) -> GpParams<F, Mean, Corr> {
        Self(GpValidParams {
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

    /// Set noise variance tuning (fixed value or estimated between bounds)
    pub fn noise_variance(mut self, noise: ParamTuning<F>) -> Self {
        self.0.noise = noise;
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

    /// Set nugget.
    ///
    /// Nugget is used to improve numerical stability
    pub fn nugget(mut self, nugget: F) -> Self {
        self.0.nugget = nugget;
        self
    }

    /// Set the seed used by posterior trajectory sampling
    pub fn seed(mut self, seed: Option<u64>) -> Self {
        self.0.seed = seed;
        self
    }
}

impl<F: Float, Mean: MeanModel<F>, Corr: CovarianceModel<F>> From<GpValidParams<F, Mean, Corr>>
    for GpParams<F, Mean, Corr>
{
    fn from(valid: GpValidParams<F, Mean, Corr>) -> Self {
        GpParams(valid)
    }
}

pub(crate) fn check_theta_tuning<F: Float>(theta_tuning: &ThetaTuning<F>) -> Result<()> {
    match theta_tuning {
        ThetaTuning::Auto => Ok(()),
        ThetaTuning::Fixed(init) => {
            if init.iter().any(|v| *v <= F::zero()) {
                Err(GpError::InvalidValueError(
                    "kernel hyperparameters must be positive".to_string(),
                ))
            } else {
                Ok(())
            }
        }
        ThetaTuning::Full { init, bounds } => {
            if init.iter().any(|v| *v <= F::zero()) {
                return Err(GpError::InvalidValueError(
                    "kernel hyperparameters must be positive".to_string(),
                ));
            }
            if bounds.0 <= F::zero() || bounds.1 < bounds.0 {
                return Err(GpError::InvalidValueError(format!(
                    "bad theta bounds ({}, {})",
                    bounds.0, bounds.1
                )));
            }
            Ok(())
        }
    }
}

impl<F: Float, Mean: MeanModel<F>, Corr: CovarianceModel<F>> ParamGuard
    for GpParams<F, Mean, Corr>
{
    type Checked = GpValidParams<F, Mean, Corr>;
    type Error = GpError;

    fn check_ref(&self) -> Result<&Self::Checked> {
        check_theta_tuning(&self.0.theta_tuning)?;
        match &self.0.noise {
            ParamTuning::Fixed(v) => {
                if *v < F::zero() {
                    return Err(GpError::InvalidValueError(
                        "noise variance cannot be negative".to_string(),
                    ));
                }
            }
            ParamTuning::Optimized { init, bounds } => {
                if *init <= F::zero() || bounds.0 <= F::zero() || bounds.1 < bounds.0 {
                    return Err(GpError::InvalidValueError(
                        "estimated noise variance needs positive init and bounds".to_string(),
                    ));
                }
            }
        }
        if self.0.learning_rate <= F::zero() {
            return Err(GpError::InvalidValueError(
                "learning rate must be positive".to_string(),
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
