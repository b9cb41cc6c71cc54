//! Negacyclic number-theoretic transform over `Z_q[X]/(X^N + 1)`.

use crate::arith::{bit_reverse, find_primitive_2n_root, mod_add, mod_inv, mod_mul, mod_pow, mod_sub};
use crate::error::{Error, Result};

/// Precomputed twiddles for one prime.
///
/// The forward transform leaves its output in bit-reversed order: slot `i`
/// holds the evaluation of the input at `ψ^(2·brv(i) + 1)`.
#[derive(Clone, Debug)]
pub struct NttTables {
    modulus: u64,
    degree: usize,
    log_degree: u32,
    psi: u64,
    psi_rev: Vec<u64>,
    psi_inv_rev: Vec<u64>,
    n_inv: u64,
}

impl NttTables {
    /// Builds tables for `modulus ≡ 1 (mod 2·degree)`.
    pub fn new(modulus: u64, degree: usize) -> Result<Self> {
        if !degree.is_power_of_two() || degree < 2 {
            return Err(Error::InvalidArgument(format!(
                "NTT degree {degree} is not a power of two"
            )));
        }
        let psi = find_primitive_2n_root(modulus, degree).ok_or_else(|| {
            Error::InvalidArgument(format!(
                "{modulus} has no primitive {}-th root of unity",
                2 * degree
            ))
        })?;
        let psi_inv = mod_inv(psi, modulus)
            .ok_or_else(|| Error::InvalidArgument(format!("{psi} is not invertible mod {modulus}")))?;
        let n_inv = mod_inv(degree as u64 % modulus, modulus)
            .ok_or_else(|| Error::InvalidArgument(format!("{degree} is not invertible mod {modulus}")))?;
        let log_degree = degree.trailing_zeros();

        let mut psi_rev = vec![0u64; degree];
        let mut psi_inv_rev = vec![0u64; degree];
        let (mut pow, mut pow_inv) = (1u64, 1u64);
        for k in 0..degree {
            let r = bit_reverse(k, log_degree);
            psi_rev[r] = pow;
            psi_inv_rev[r] = pow_inv;
            pow = mod_mul(pow, psi, modulus);
            pow_inv = mod_mul(pow_inv, psi_inv, modulus);
        }

        Ok(Self {
            modulus,
            degree,
            log_degree,
            psi,
            psi_rev,
            psi_inv_rev,
            n_inv,
        })
    }

    /// Prime the tables work modulo.
    pub fn modulus(&self) -> u64 {
        self.modulus
    }

    /// Transform length `N`.
    pub fn degree(&self) -> usize {
        self.degree
    }

    /// `log2(N)`.
    pub fn log_degree(&self) -> u32 {
        self.log_degree
    }

    /// The primitive `2N`-th root the tables were built from.
    pub fn psi(&self) -> u64 {
        self.psi
    }

    /// In-place forward transform (Cooley–Tukey, natural in, bit-reversed out).
    pub fn forward(&self, a: &mut [u64]) {
        debug_assert_eq!(a.len(), self.degree);
        let q = self.modulus;
        let mut t = self.degree;
        let mut m = 1;
        while m < self.degree {
            t >>= 1;
            for i in 0..m {
                let j1 = 2 * i * t;
                let s = self.psi_rev[m + i];
                for j in j1..j1 + t {
                    let u = a[j];
                    let v = mod_mul(a[j + t], s, q);
                    a[j] = mod_add(u, v, q);
                    a[j + t] = mod_sub(u, v, q);
                }
            }
            m <<= 1;
        }
    }

    /// In-place inverse transform (Gentleman–Sande, bit-reversed in, natural out).
    pub fn inverse(&self, a: &mut [u64]) {
        debug_assert_eq!(a.len(), self.degree);
        let q = self.modulus;
        let mut t = 1;
        let mut m = self.degree;
        while m > 1 {
            let h = m >> 1;
            let mut j1 = 0;
            for i in 0..h {
                let s = self.psi_inv_rev[h + i];
                for j in j1..j1 + t {
                    let u = a[j];
                    let v = a[j + t];
                    a[j] = mod_add(u, v, q);
                    a[j + t] = mod_mul(mod_sub(u, v, q), s, q);
                }
                j1 += 2 * t;
            }
            t <<= 1;
            m = h;
        }
        for x in a.iter_mut() {
            *x = mod_mul(*x, self.n_inv, q);
        }
    }

    /// Negacyclic product of two coefficient vectors.
    pub fn multiply(&self, a: &[u64], b: &[u64]) -> Vec<u64> {
        let mut fa = a.to_vec();
        let mut fb = b.to_vec();
        self.forward(&mut fa);
        self.forward(&mut fb);
        for (x, y) in fa.iter_mut().zip(&fb) {
            *x = mod_mul(*x, *y, self.modulus);
        }
        self.inverse(&mut fa);
        fa
    }

    /// Index of the forward-transform slot holding the evaluation at `ψ^exponent`
    /// (`exponent` odd, taken modulo `2N`).
    pub fn slot_of_exponent(&self, exponent: u64) -> usize {
        let e = (exponent % (2 * self.degree as u64)) as usize;
        bit_reverse((e - 1) / 2, self.log_degree)
    }

    /// Evaluates coefficient vector `a` at `ψ^exponent` directly; used to cross-check slots.
    pub fn evaluate_at(&self, a: &[u64], exponent: u64) -> u64 {
        let x = mod_pow(self.psi, exponent, self.modulus);
        a.iter()
            .rev()
            .fold(0, |acc, &c| mod_add(mod_mul(acc, x, self.modulus), c, self.modulus))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha20Rng;

    fn schoolbook(a: &[u64], b: &[u64], q: u64) -> Vec<u64> {
        let n = a.len();
        let mut out = vec![0u64; n];
        for i in 0..n {
            for j in 0..n {
                let p = mod_mul(a[i], b[j], q);
                if i + j < n {
                    out[i + j] = mod_add(out[i + j], p, q);
                } else {
                    out[i + j - n] = mod_sub(out[i + j - n], p, q);
                }
            }
        }
        out
    }

    #[test]
    fn forward_then_inverse_is_identity() {
        let tables = NttTables::new(12289, 64).unwrap();
        let mut rng = ChaCha20Rng::seed_from_u64(7);
        let a: Vec<u64> = (0..64).map(|_| rng.gen_range(0..12289)).collect();
        let mut b = a.clone();
        tables.forward(&mut b);
        assert_ne!(a, b);
        tables.inverse(&mut b);
        assert_eq!(a, b);
    }

    #[test]
    fn product_matches_schoolbook() {
        let q = 786_433;
        let tables = NttTables::new(q, 32).unwrap();
        let mut rng = ChaCha20Rng::seed_from_u64(11);
        let a: Vec<u64> = (0..32).map(|_| rng.gen_range(0..q)).collect();
        let b: Vec<u64> = (0..32).map(|_| rng.gen_range(0..q)).collect();
        assert_eq!(tables.multiply(&a, &b), schoolbook(&a, &b, q));
    }

    #[test]
    fn slots_are_evaluations_at_odd_powers() {
        let tables = NttTables::new(12289, 16).unwrap();
        let a: Vec<u64> = (1..=16).collect();
        let mut f = a.clone();
        tables.forward(&mut f);
        for e in (1..32u64).step_by(2) {
            assert_eq!(f[tables.slot_of_exponent(e)], tables.evaluate_at(&a, e), "exponent {e}");
        }
    }

    #[test]
    fn rejects_unfriendly_modulus() {
        assert!(NttTables::new(13, 16).is_err());
        assert!(NttTables::new(12289, 24).is_err());
    }
}
