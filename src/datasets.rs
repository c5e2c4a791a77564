//! Toy one-dimensional datasets used throughout the documentation and tests.

use linfa::Dataset;
use ndarray::{Array, Array1, Axis, Ix1};
use ndarray_rand::rand::SeedableRng;
use ndarray_rand::rand_distr::Normal;
use ndarray_rand::RandomExt;
use rand_xoshiro::Xoshiro256Plus;

/// `n` evenly spaced inputs in [0, 1] with class labels
/// `sign(cos(4 pi x))` in {-1, +1}
pub fn sign_wave(n: usize) -> Dataset<f64, f64, Ix1> {
    let x = Array::linspace(0., 1., n);
    let y = x.mapv(|v| {
        if (4. * std::f64::consts::PI * v).cos() >= 0. {
            1.
        } else {
            -1.
        }
    });
    Dataset::new(x.insert_axis(Axis(1)), y)
}

/// `n` evenly spaced inputs in [0, 1] with targets `sin(2 pi x)`, plus
/// centered gaussian observation noise of standard deviation `noise_std`
/// when it is positive, drawn from a seeded generator
pub fn sine_wave(n: usize, noise_std: f64, seed: Option<u64>) -> Dataset<f64, f64, Ix1> {
    let x = Array::linspace(0., 1., n);
    let mut y = x.mapv(|v| (2. * std::f64::consts::PI * v).sin());
    if noise_std > 0. {
        let mut rng = match seed {
            Some(seed) => Xoshiro256Plus::seed_from_u64(seed),
            None => Xoshiro256Plus::from_entropy(),
        };
        let noise = Array1::random_using(n, Normal::new(0., noise_std).unwrap(), &mut rng);
        y = y + noise;
    }
    Dataset::new(x.insert_axis(Axis(1)), y)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn test_sign_wave_labels() {
        let ds = sign_wave(10);
        assert_eq!(ds.records().dim(), (10, 1));
        // Targets are a flat vector, as the fit entry points expect
        assert_eq!(ds.targets().dim(), 10);
        let expected = array![1., 1., -1., -1., 1., 1., -1., -1., 1., 1.];
        assert_eq!(ds.targets(), &expected);
    }

    #[test]
    fn test_sine_wave_clean_targets() {
        let ds = sine_wave(5, 0., None);
        let expected = array![
            0.,
            (0.5 * std::f64::consts::PI).sin(),
            std::f64::consts::PI.sin(),
            (1.5 * std::f64::consts::PI).sin(),
            (2. * std::f64::consts::PI).sin(),
        ];
        assert_abs_diff_eq!(ds.targets().view(), expected.view(), epsilon = 1e-12);
    }

    #[test]
    fn test_sine_wave_noise_is_seeded() {
        let ds1 = sine_wave(15, 0.1, Some(7));
        let ds2 = sine_wave(15, 0.1, Some(7));
        assert_eq!(ds1.targets(), ds2.targets());
        let clean = sine_wave(15, 0., None);
        assert!(ds1.targets() != clean.targets());
    }
}
