use crate::errors::Result;
use linfa::Float;
use linfa_linalg::eigh::*;
use ndarray::{Array1, Array2, ArrayBase, Data, Ix2};

/// Computes differences between each row of x and each row of y
/// resulting in a 2d array of shape (nrows(x) * nrows(y), ncols(x));
/// *Panics* if x and y have not the same column numbers
pub fn pairwise_differences<F: Float>(
    x: &ArrayBase<impl Data<Elem = F>, Ix2>,
    y: &ArrayBase<impl Data<Elem = F>, Ix2>,
) -> Array2<F> {
    assert!(x.ncols() == y.ncols());

    let nx = x.nrows();
    let ny = y.nrows();
    let ncols = x.ncols();
    let mut result = Array2::zeros((nx * ny, ncols));

    for (i, x_row) in x.rows().into_iter().enumerate() {
        for (j, y_row) in y.rows().into_iter().enumerate() {
            let idx = i * ny + j;
            for k in 0..ncols {
                result[[idx, k]] = x_row[k] - y_row[k];
            }
        }
    }

    result
}

#[inline(always)]
pub(crate) fn into_f64<F: Float>(v: &F) -> f64 {
    // Lossless for every scalar implementing Float
    v.to_f64().unwrap()
}

/// Gauss-Hermite quadrature rule: nodes `t_k` and weights `w_k` such that
/// `integral f(t) exp(-t^2) dt ~ sum_k w_k f(t_k)`.
///
/// Used to compute expectations of a function under a gaussian marginal:
/// `E[g(f)] ~ 1/sqrt(pi) sum_k w_k g(mu + sqrt(2) sigma t_k)` for `f ~ N(mu, sigma^2)`.
#[derive(Debug, Clone)]
pub struct GaussHermite<F: Float> {
    /// Quadrature nodes (n,)
    pub nodes: Array1<F>,
    /// Quadrature weights (n,)
    pub weights: Array1<F>,
}

impl<F: Float> GaussHermite<F> {
    /// Compute an `n` points rule with the Golub-Welsch algorithm:
    /// nodes are the eigenvalues of the symmetric tridiagonal Jacobi matrix
    /// of the Hermite recurrence, weights come from the first component of
    /// the associated eigenvectors.
    pub fn new(n: usize) -> Result<GaussHermite<F>> {
        let mut jacobi = Array2::<f64>::zeros((n, n));
        for i in 1..n {
            let b = (i as f64 / 2.).sqrt();
            jacobi[[i - 1, i]] = b;
            jacobi[[i, i - 1]] = b;
        }
        let (values, vecs) = jacobi.eigh_into()?;
        let mu0 = std::f64::consts::PI.sqrt();
        let mut rule: Vec<(f64, f64)> = values
            .iter()
            .zip(vecs.row(0))
            .map(|(&t, &v)| (t, v * v * mu0))
            .collect();
        // Eigenvalue order is unspecified, nodes are reported ascending
        rule.sort_by(|a, b| a.0.total_cmp(&b.0));
        Ok(GaussHermite {
            nodes: rule.iter().map(|r| F::cast(r.0)).collect(),
            weights: rule.iter().map(|r| F::cast(r.1)).collect(),
        })
    }

    /// Number of quadrature points
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the rule is empty
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn test_pairwise_differences() {
        let x = array![[-0.9486833], [-0.82219219]];
        let y = array![
            [-1.26491106],
            [-0.63245553],
            [0.],
            [0.63245553],
            [1.26491106]
        ];
        assert_abs_diff_eq!(
            &array![
                [0.31622777],
                [-0.31622777],
                [-0.9486833],
                [-1.58113883],
                [-2.21359436],
                [0.44271887],
                [-0.18973666],
                [-0.82219219],
                [-1.45464772],
                [-2.08710326]
            ],
            &pairwise_differences(&x, &y),
            epsilon = 1e-6
        )
    }

    #[test]
    fn test_gauss_hermite_3pts() {
        let quad: GaussHermite<f64> = GaussHermite::new(3).unwrap();
        let expected_nodes = array![-1.2247448713915890, 0., 1.2247448713915890];
        let expected_weights = array![0.2954089751509193, 1.1816359006036774, 0.2954089751509193];
        assert_abs_diff_eq!(quad.nodes, expected_nodes, epsilon = 1e-10);
        assert_abs_diff_eq!(quad.weights, expected_weights, epsilon = 1e-10);
    }

    #[test]
    fn test_gauss_hermite_gaussian_moments() {
        // E[f] and E[f^2] for f ~ N(mu, sigma^2) recovered by quadrature
        let quad: GaussHermite<f64> = GaussHermite::new(20).unwrap();
        let (mu, sigma) = (0.7, 1.3);
        let norm = std::f64::consts::PI.sqrt();
        let mut m1 = 0.;
        let mut m2 = 0.;
        for (&t, &w) in quad.nodes.iter().zip(quad.weights.iter()) {
            let f = mu + std::f64::consts::SQRT_2 * sigma * t;
            m1 += w * f / norm;
            m2 += w * f * f / norm;
        }
        assert_abs_diff_eq!(m1, mu, epsilon = 1e-8);
        assert_abs_diff_eq!(m2, mu * mu + sigma * sigma, epsilon = 1e-8);
    }
}
