use crate::errors::{GpError, Result};
use crate::utils::into_f64;
use finitediff::FiniteDiff;
use linfa::Float;
use log::debug;
use ndarray::{Array1, Zip};

/// Settings of the gradient descent training loop
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AdamSettings {
    /// Step size
    pub learning_rate: f64,
    /// Exponential decay rate for first moment estimates
    pub beta1: f64,
    /// Exponential decay rate for second moment estimates
    pub beta2: f64,
    /// Small constant for numerical stability
    pub epsilon: f64,
}

impl Default for AdamSettings {
    fn default() -> Self {
        AdamSettings {
            learning_rate: 0.1,
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-8,
        }
    }
}

/// Adam optimizer state: per-parameter running estimates of the first and
/// second gradient moments, bias-corrected at each step
pub(crate) struct Adam {
    settings: AdamSettings,
    m: Array1<f64>,
    v: Array1<f64>,
    t: usize,
}

impl Adam {
    pub fn new(settings: AdamSettings, n: usize) -> Self {
        Adam {
            settings,
            m: Array1::zeros(n),
            v: Array1::zeros(n),
            t: 0,
        }
    }

    /// Apply one update in place
    pub fn step(&mut self, params: &mut Array1<f64>, grad: &Array1<f64>) {
        self.t += 1;
        let AdamSettings {
            learning_rate,
            beta1,
            beta2,
            epsilon,
        } = self.settings;
        let bc1 = 1. - beta1.powi(self.t as i32);
        let bc2 = 1. - beta2.powi(self.t as i32);
        Zip::from(params)
            .and(&mut self.m)
            .and(&mut self.v)
            .and(grad)
            .for_each(|p, m, v, &g| {
                *m = beta1 * *m + (1. - beta1) * g;
                *v = beta2 * *v + (1. - beta2) * g * g;
                let m_hat = *m / bc1;
                let v_hat = *v / bc2;
                *p -= learning_rate * m_hat / (v_hat.sqrt() + epsilon);
            });
    }
}

/// Minimize `objfn` with Adam for exactly `n_iter` iterations starting from
/// `params0`, gradients taken by central finite differences.
///
/// `bounds` gives optional box constraints per parameter, applied by
/// clamping after each step. `on_iteration` observes (iteration, loss,
/// current params) before the update, after the loss is logged.
///
/// There is no convergence check: the loop always runs the configured
/// iteration count. A non-finite loss (typically a failed factorization on
/// degenerate hyperparameters) aborts the fit with an error.
pub(crate) fn fit_params<ObjF, Callback>(
    objfn: ObjF,
    params0: &Array1<f64>,
    bounds: &[Option<(f64, f64)>],
    settings: AdamSettings,
    n_iter: usize,
    mut on_iteration: Callback,
) -> Result<(Array1<f64>, Vec<f64>)>
where
    ObjF: Fn(&Array1<f64>) -> f64,
    Callback: FnMut(usize, f64, &Array1<f64>),
{
    let mut params = params0.to_owned();
    let mut adam = Adam::new(settings, params.len());
    let mut losses = Vec::with_capacity(n_iter);

    for iter in 0..n_iter {
        let loss = objfn(&params);
        if !loss.is_finite() {
            return Err(GpError::LikelihoodComputationError(format!(
                "non finite loss {loss} at iteration {iter}"
            )));
        }
        debug!("iteration {iter} loss {loss}");
        on_iteration(iter, loss, &params);
        losses.push(loss);

        let grad = params.central_diff(&|x: &Array1<f64>| objfn(x));
        adam.step(&mut params, &grad);
        for (p, b) in params.iter_mut().zip(bounds.iter()) {
            if let Some((lo, up)) = b {
                *p = p.clamp(*lo, *up);
            }
        }
    }
    Ok((params, losses))
}

/// Pack a positive value for optimization in natural log space
#[inline]
pub(crate) fn pack_log<F: Float>(v: F) -> f64 {
    into_f64(&v).max(f64::MIN_POSITIVE).ln()
}

/// Log space bounds of a positive parameter
#[inline]
pub(crate) fn log_bounds<F: Float>(bounds: (F, F)) -> Option<(f64, f64)> {
    Some((
        into_f64(&bounds.0).max(f64::MIN_POSITIVE).ln(),
        into_f64(&bounds.1).max(f64::MIN_POSITIVE).ln(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn test_adam_minimizes_quadratic() {
        let objfn = |x: &Array1<f64>| (x[0] - 3.).powi(2) + 2. * (x[1] + 1.).powi(2);
        let (params, losses) = fit_params(
            objfn,
            &array![0., 0.],
            &[None, None],
            AdamSettings::default(),
            200,
            |_, _, _| {},
        )
        .unwrap();
        assert_abs_diff_eq!(params[0], 3., epsilon = 1e-2);
        assert_abs_diff_eq!(params[1], -1., epsilon = 1e-2);
        assert!(losses[losses.len() - 1] < losses[0]);
        assert_eq!(losses.len(), 200);
    }

    #[test]
    fn test_bounds_are_clamped() {
        let objfn = |x: &Array1<f64>| (x[0] - 3.).powi(2);
        let (params, _) = fit_params(
            objfn,
            &array![0.],
            &[Some((-1., 1.))],
            AdamSettings::default(),
            100,
            |_, _, _| {},
        )
        .unwrap();
        assert_abs_diff_eq!(params[0], 1.);
    }

    #[test]
    fn test_deterministic_trajectory() {
        let objfn = |x: &Array1<f64>| x[0].powi(4) - x[0] + x[1] * x[1];
        let run = || {
            fit_params(
                objfn,
                &array![0.5, -0.5],
                &[None, None],
                AdamSettings::default(),
                50,
                |_, _, _| {},
            )
            .unwrap()
        };
        let (p1, l1) = run();
        let (p2, l2) = run();
        assert_eq!(l1, l2);
        assert_eq!(p1, p2);
    }

    #[test]
    fn test_non_finite_loss_is_fatal() {
        let objfn = |x: &Array1<f64>| {
            if x[0] < 0. {
                f64::INFINITY
            } else {
                -x[0]
            }
        };
        // unbounded descent on -x drives x up, so start in the bad region
        let res = fit_params(
            objfn,
            &array![-1.],
            &[None],
            AdamSettings::default(),
            10,
            |_, _, _| {},
        );
        assert!(res.is_err());
    }
}
