use thiserror::Error;

/// A result type for GP training and prediction
pub type Result<T> = std::result::Result<T, GpError>;

/// An error when using a [`GaussianProcess`](crate::GaussianProcess)
/// or a [`VariationalGaussianProcess`](crate::VariationalGaussianProcess) algorithm
#[derive(Error, Debug)]
pub enum GpError {
    /// When the training objective computation fails
    #[error("Objective computation error: {0}")]
    LikelihoodComputationError(String),
    /// When linear algebra computation fails
    #[error(transparent)]
    LinalgError(#[from] linfa_linalg::LinalgError),
    /// When error due to a bad value
    #[error("InvalidValue error: {0}")]
    InvalidValueError(String),
    /// When a linfa error occurs
    #[error(transparent)]
    LinfaError(#[from] linfa::error::Error),
}
