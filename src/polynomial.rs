//! Polynomials over `Z_Q[X]/(X^N + 1)` stored limb-by-limb in RNS form.

use std::ops::{Add, AddAssign, Neg, Sub, SubAssign};

use itertools::{izip, Itertools};
use zeroize::Zeroize;

use crate::arith::{centered, mod_add, mod_inv, mod_mul, mod_neg, mod_sub, reduce_i64};
use crate::error::{Error, Result};
use crate::ntt::NttTables;

/// f(X) = Σ coeffs·X^i, one coefficient vector per prime (always coefficient form).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RnsPoly {
    limbs: Vec<Vec<u64>>,
    moduli: Vec<u64>,
}

impl RnsPoly {
    /// Zero polynomial of degree `n` over `moduli`.
    pub fn zero(n: usize, moduli: &[u64]) -> Self {
        Self {
            limbs: vec![vec![0; n]; moduli.len()],
            moduli: moduli.to_vec(),
        }
    }

    /// Builds a polynomial from raw limbs; fails when shapes or ranges disagree.
    pub fn from_limbs(limbs: Vec<Vec<u64>>, moduli: &[u64]) -> Result<Self> {
        if limbs.len() != moduli.len() || limbs.is_empty() {
            return Err(Error::InvalidArgument("limb count does not match moduli".into()));
        }
        let n = limbs[0].len();
        for (limb, &q) in limbs.iter().zip(moduli) {
            if limb.len() != n {
                return Err(Error::InvalidArgument("limbs have different lengths".into()));
            }
            if limb.iter().any(|&c| c >= q) {
                return Err(Error::InvalidArgument(format!("coefficient out of range for {q}")));
            }
        }
        Ok(Self {
            limbs,
            moduli: moduli.to_vec(),
        })
    }

    /// Reduces small signed coefficients into every limb.
    pub fn from_signed(coeffs: &[i64], moduli: &[u64]) -> Self {
        let limbs = moduli
            .iter()
            .map(|&q| coeffs.iter().map(|&c| reduce_i64(c, q)).collect())
            .collect();
        Self {
            limbs,
            moduli: moduli.to_vec(),
        }
    }

    /// Ring degree `N`.
    pub fn degree(&self) -> usize {
        self.limbs.first().map_or(0, Vec::len)
    }

    /// Primes of the limbs.
    pub fn moduli(&self) -> &[u64] {
        &self.moduli
    }

    /// Number of limbs.
    pub fn num_limbs(&self) -> usize {
        self.limbs.len()
    }

    /// Coefficients of limb `i`.
    pub fn limb(&self, i: usize) -> &[u64] {
        &self.limbs[i]
    }

    /// All limbs in modulus order.
    pub fn limbs(&self) -> &[Vec<u64>] {
        &self.limbs
    }

    pub(crate) fn limb_mut(&mut self, i: usize) -> &mut [u64] {
        &mut self.limbs[i]
    }

    /// `true` when every coefficient is reduced below its modulus.
    pub fn is_reduced(&self) -> bool {
        self.limbs
            .iter()
            .zip(&self.moduli)
            .all(|(limb, &q)| limb.iter().all(|&c| c < q))
    }

    /// `true` when every coefficient is zero.
    pub fn is_zero(&self) -> bool {
        self.limbs.iter().flatten().all(|&c| c == 0)
    }

    /// Multiplies limb `i` by `scalars[i]`.
    pub fn mul_scalars_assign(&mut self, scalars: &[u64]) {
        for (limb, &q, &s) in izip!(&mut self.limbs, &self.moduli, scalars) {
            for c in limb.iter_mut() {
                *c = mod_mul(*c, s, q);
            }
        }
    }

    /// Multiplies by a small signed constant.
    pub fn mul_small_assign(&mut self, k: i64) {
        let scalars = self.moduli.iter().map(|&q| reduce_i64(k, q)).collect_vec();
        self.mul_scalars_assign(&scalars);
    }

    /// Negacyclic product; `tables[i]` must belong to limb `i`'s modulus.
    pub fn multiply(&self, other: &Self, tables: &[&NttTables]) -> Self {
        debug_assert_eq!(self.moduli, other.moduli, "moduli mismatch in multiply");
        let limbs = izip!(&self.limbs, &other.limbs, tables)
            .map(|(a, b, t)| t.multiply(a, b))
            .collect();
        Self {
            limbs,
            moduli: self.moduli.clone(),
        }
    }

    /// Keeps only the first `count` limbs.
    pub fn truncate_limbs(&mut self, count: usize) {
        self.limbs.truncate(count);
        self.moduli.truncate(count);
    }

    /// Copy restricted to the limbs at `indices`, in that order.
    pub fn select_limbs(&self, indices: &[usize]) -> Self {
        Self {
            limbs: indices.iter().map(|&i| self.limbs[i].clone()).collect(),
            moduli: indices.iter().map(|&i| self.moduli[i]).collect(),
        }
    }

    /// Replaces the polynomial by `round(self / q_last)` over the remaining limbs.
    pub fn divide_round_by_last(&mut self) -> Result<()> {
        if self.limbs.len() < 2 {
            return Err(Error::ChainExhausted);
        }
        let last = self.limbs.pop().unwrap_or_default();
        let q_last = self.moduli.pop().unwrap_or_default();
        let rounded = last.iter().map(|&c| centered(c, q_last)).collect_vec();
        for (limb, &q) in self.limbs.iter_mut().zip(&self.moduli) {
            let inv = mod_inv(q_last % q, q).ok_or_else(|| {
                Error::InvalidArgument(format!("{q_last} is not invertible mod {q}"))
            })?;
            for (c, &r) in limb.iter_mut().zip(&rounded) {
                *c = mod_mul(mod_sub(*c, reduce_i64(r, q), q), inv, q);
            }
        }
        Ok(())
    }

    /// Applies the Galois automorphism `X → X^g` (`g` odd).
    pub fn automorphism(&self, g: u64) -> Self {
        let n = self.degree();
        let two_n = 2 * n as u64;
        let limbs = self
            .limbs
            .iter()
            .zip(&self.moduli)
            .map(|(limb, &q)| {
                let mut out = vec![0u64; n];
                for (j, &c) in limb.iter().enumerate() {
                    let idx = (j as u64 * g) % two_n;
                    if idx < n as u64 {
                        out[idx as usize] = c;
                    } else {
                        out[(idx - n as u64) as usize] = mod_neg(c, q);
                    }
                }
                out
            })
            .collect();
        Self {
            limbs,
            moduli: self.moduli.clone(),
        }
    }

    /// Lifts limb `j` centered and reduces it into each of `moduli`.
    pub fn extend_limb(&self, j: usize, moduli: &[u64]) -> Self {
        let qj = self.moduli[j];
        let lifted = self.limbs[j].iter().map(|&c| centered(c, qj)).collect_vec();
        Self::from_signed(&lifted, moduli)
    }
}

impl Zeroize for RnsPoly {
    fn zeroize(&mut self) {
        self.limbs.zeroize();
    }
}

// ---------- Operator traits ----------

impl<'a> AddAssign<&'a RnsPoly> for RnsPoly {
    fn add_assign(&mut self, rhs: &'a RnsPoly) {
        debug_assert_eq!(self.moduli, rhs.moduli, "moduli mismatch in add");
        for (a, b, &q) in izip!(&mut self.limbs, &rhs.limbs, &self.moduli) {
            for (x, &y) in a.iter_mut().zip(b) {
                *x = mod_add(*x, y, q);
            }
        }
    }
}

impl<'a> SubAssign<&'a RnsPoly> for RnsPoly {
    fn sub_assign(&mut self, rhs: &'a RnsPoly) {
        debug_assert_eq!(self.moduli, rhs.moduli, "moduli mismatch in sub");
        for (a, b, &q) in izip!(&mut self.limbs, &rhs.limbs, &self.moduli) {
            for (x, &y) in a.iter_mut().zip(b) {
                *x = mod_sub(*x, y, q);
            }
        }
    }
}

impl<'a> Add<&'a RnsPoly> for &'a RnsPoly {
    type Output = RnsPoly;
    fn add(self, rhs: &'a RnsPoly) -> RnsPoly {
        let mut out = self.clone();
        out += rhs;
        out
    }
}

impl<'a> Sub<&'a RnsPoly> for &'a RnsPoly {
    type Output = RnsPoly;
    fn sub(self, rhs: &'a RnsPoly) -> RnsPoly {
        let mut out = self.clone();
        out -= rhs;
        out
    }
}

impl Neg for &RnsPoly {
    type Output = RnsPoly;
    fn neg(self) -> RnsPoly {
        let limbs = self
            .limbs
            .iter()
            .zip(&self.moduli)
            .map(|(limb, &q)| limb.iter().map(|&c| mod_neg(c, q)).collect())
            .collect();
        RnsPoly {
            limbs,
            moduli: self.moduli.clone(),
        }
    }
}

impl Neg for RnsPoly {
    type Output = RnsPoly;
    fn neg(self) -> RnsPoly {
        -&self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const Q: [u64; 2] = [12289, 40961];

    #[test]
    fn add_sub_neg_roundtrip() {
        let a = RnsPoly::from_signed(&[1, -2, 3, 0], &Q);
        let b = RnsPoly::from_signed(&[5, 5, -5, 7], &Q);
        let sum = &a + &b;
        assert_eq!(sum, RnsPoly::from_signed(&[6, 3, -2, 7], &Q));
        assert_eq!(&sum - &b, a);
        assert!((&a + &(-&a)).is_zero());
    }

    #[test]
    fn multiply_wraps_negacyclically() {
        let n = 8;
        let tables: Vec<NttTables> = Q.iter().map(|&q| NttTables::new(q, n).unwrap()).collect();
        let refs = tables.iter().collect_vec();
        // X^7 · X = X^8 = -1
        let mut x7 = vec![0i64; n];
        x7[7] = 1;
        let mut x1 = vec![0i64; n];
        x1[1] = 1;
        let prod = RnsPoly::from_signed(&x7, &Q).multiply(&RnsPoly::from_signed(&x1, &Q), &refs);
        let mut expected = vec![0i64; n];
        expected[0] = -1;
        assert_eq!(prod, RnsPoly::from_signed(&expected, &Q));
    }

    #[test]
    fn divide_round_by_last_rounds_to_nearest() {
        // 3·40961 + 20000 rounds to 3, 3·40961 + 21000 rounds to 4
        let v = [3 * 40961 + 20000, 3 * 40961 + 21000, -(2 * 40961) - 100];
        let mut p = RnsPoly::from_signed(&v, &Q);
        p.divide_round_by_last().unwrap();
        assert_eq!(p, RnsPoly::from_signed(&[3, 4, -2], &Q[..1]));
        assert_eq!(p.divide_round_by_last(), Err(Error::ChainExhausted));
    }

    #[test]
    fn automorphism_sends_x_to_x_pow_g() {
        let n = 8;
        let mut c = vec![0i64; n];
        c[3] = 2; // 2·X^3 → 2·X^15 = -2·X^7
        let p = RnsPoly::from_signed(&c, &Q).automorphism(5);
        let mut expected = vec![0i64; n];
        expected[7] = -2;
        assert_eq!(p, RnsPoly::from_signed(&expected, &Q));
        // 2N - 1 twice is the identity
        let back = p.automorphism(15).automorphism(15);
        assert_eq!(back, p);
    }

    #[test]
    fn from_limbs_checks_ranges() {
        assert!(RnsPoly::from_limbs(vec![vec![12289]], &Q[..1]).is_err());
        assert!(RnsPoly::from_limbs(vec![vec![1], vec![1, 2]], &Q).is_err());
        assert!(RnsPoly::from_limbs(vec![vec![1, 2], vec![3, 4]], &Q).is_ok());
    }
}
