//! Secret, error and uniform samplers.

use rand::Rng;
use rand_distr::{Distribution, Normal};

use crate::polynomial::RnsPoly;

/// Standard deviation of the error distribution.
pub const NOISE_STANDARD_DEVIATION: f64 = 3.2;
/// Errors are rejected beyond this many standard deviations.
pub const NOISE_MAX_DEVIATIONS: f64 = 6.0;

/// Coefficients drawn uniformly from `{-1, 0, 1}`.
pub fn sample_ternary<R: Rng>(n: usize, rng: &mut R) -> Vec<i64> {
    (0..n).map(|_| rng.gen_range(-1i64..=1)).collect()
}

/// Rounded Gaussian coefficients with tails cut at `6σ`.
pub fn sample_gaussian<R: Rng>(n: usize, rng: &mut R) -> Vec<i64> {
    let bound = NOISE_STANDARD_DEVIATION * NOISE_MAX_DEVIATIONS;
    let normal = match Normal::new(0.0, NOISE_STANDARD_DEVIATION) {
        Ok(d) => d,
        Err(_) => return vec![0; n],
    };
    (0..n)
        .map(|_| loop {
            let x: f64 = normal.sample(rng);
            if x.abs() <= bound {
                break x.round() as i64;
            }
        })
        .collect()
}

/// Uniform polynomial over `moduli`.
pub fn sample_uniform<R: Rng>(n: usize, moduli: &[u64], rng: &mut R) -> RnsPoly {
    let limbs = moduli
        .iter()
        .map(|&q| (0..n).map(|_| rng.gen_range(0..q)).collect())
        .collect();
    RnsPoly::from_limbs(limbs, moduli).unwrap_or_else(|_| RnsPoly::zero(n, moduli))
}

/// Ternary polynomial with coefficients in `{-1, 0, 1}`.
pub fn ternary_poly<R: Rng>(n: usize, moduli: &[u64], rng: &mut R) -> RnsPoly {
    RnsPoly::from_signed(&sample_ternary(n, rng), moduli)
}

/// Discrete Gaussian error polynomial.
pub fn gaussian_poly<R: Rng>(n: usize, moduli: &[u64], rng: &mut R) -> RnsPoly {
    RnsPoly::from_signed(&sample_gaussian(n, rng), moduli)
}
