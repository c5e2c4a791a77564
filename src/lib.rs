//! This library implements [Gaussian Process](https://en.wikipedia.org/wiki/Gaussian_process)
//! inference for regression and binary classification.
//!
//! Regression uses exact inference: a [SpectralMixtureKernel] prior with a
//! constant mean and gaussian observation noise is conditioned on the data
//! in closed form, while the hyperparameters, the mean and the noise
//! variance are trained by maximizing the exact marginal likelihood.
//!
//! Classification uses variational inference: the Bernoulli likelihood with
//! a probit link has no tractable posterior, so a full-rank gaussian
//! approximation over the latent training values is trained by maximizing
//! the evidence lower bound, jointly with a [SquaredExponentialKernel]
//! prior's hyperparameters.
//!
//! Both paths share the same fixed-iteration Adam training loop with
//! central finite-difference gradients, and both can fail fatally on a
//! degenerate covariance; such errors are never silently recovered.
//!
//! Regression is implemented by [GaussianProcess] parameterized by
//! [GpParams], classification by [VariationalGaussianProcess] parameterized
//! by [VgpParams].
//!
//! ```
//! use linfa::prelude::*;
//! use ndarray::array;
//! use vargp::{datasets::sine_wave, SpectralMixtureGp};
//!
//! let dataset = sine_wave(15, 0., None);
//! let gp = SpectralMixtureGp::<f64>::params()
//!     .n_iter(20)
//!     .fit(&dataset)
//!     .expect("GP fit");
//! let mean = gp.predict(&array![[0.25]]).expect("GP prediction");
//! let var = gp.predict_var(&array![[0.25]]).expect("GP prediction");
//! assert!(var[0] >= 0.);
//! ```
#![warn(missing_docs)]
#![warn(rustdoc::broken_intra_doc_links)]
mod classification;
pub mod datasets;
mod errors;
pub mod kernels;
pub mod likelihoods;
pub mod mean_models;
mod regression;

mod parameters;
mod utils;
mod variational_parameters;

mod optimization;

pub use classification::*;
pub use errors::*;
pub use kernels::{CovarianceModel, SpectralMixtureKernel, SquaredExponentialKernel};
pub use optimization::AdamSettings;
pub use parameters::*;
pub use regression::*;
pub use utils::{pairwise_differences, GaussHermite};
pub use variational_parameters::*;
