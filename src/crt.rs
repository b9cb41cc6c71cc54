//! Chinese-remainder composition of RNS residues into big integers.

use num_bigint::{BigInt, BigUint};
use num_integer::Integer;
use num_traits::{One, ToPrimitive, Zero};

use crate::arith::mod_inv;
use crate::error::{Error, Result};

/// Precomputed `Q = Π q_i` and the basis `Q_i·[Q_i^{-1}]_{q_i}`.
#[derive(Clone, Debug)]
pub struct CrtComposer {
    moduli: Vec<u64>,
    product: BigUint,
    half: BigUint,
    basis: Vec<BigUint>,
}

impl CrtComposer {
    /// Precomputes `(Q/q_i)·[(Q/q_i)^-1]_{q_i}` for each prime.
    pub fn new(moduli: &[u64]) -> Result<Self> {
        if moduli.is_empty() {
            return Err(Error::InvalidArgument("empty CRT basis".into()));
        }
        let product = moduli.iter().fold(BigUint::one(), |acc, &q| acc * q);
        let mut basis = Vec::with_capacity(moduli.len());
        for &q in moduli {
            let q_hat = &product / q;
            let q_hat_mod = (&q_hat % q).to_u64().unwrap_or_default();
            let inv = mod_inv(q_hat_mod, q)
                .ok_or_else(|| Error::InvalidArgument(format!("moduli are not coprime at {q}")))?;
            basis.push(q_hat * inv);
        }
        let half = &product >> 1u32;
        Ok(Self {
            moduli: moduli.to_vec(),
            product,
            half,
            basis,
        })
    }

    /// The primes of the basis.
    pub fn moduli(&self) -> &[u64] {
        &self.moduli
    }

    /// `Q`, the product of all primes.
    pub fn product(&self) -> &BigUint {
        &self.product
    }

    /// Bit length of `Q`.
    pub fn bits(&self) -> u32 {
        self.product.bits() as u32
    }

    /// Value in `[0, Q)` with the given residues.
    pub fn compose<I>(&self, residues: I) -> BigUint
    where
        I: IntoIterator<Item = u64>,
    {
        let acc = residues
            .into_iter()
            .zip(&self.basis)
            .fold(BigUint::zero(), |acc, (r, b)| acc + b * r);
        acc % &self.product
    }

    /// Representative in `(-Q/2, Q/2]`.
    pub fn compose_centered<I>(&self, residues: I) -> BigInt
    where
        I: IntoIterator<Item = u64>,
    {
        self.center(self.compose(residues))
    }

    /// Maps `[0, Q)` to `(-Q/2, Q/2]`.
    pub fn center(&self, x: BigUint) -> BigInt {
        if x > self.half {
            BigInt::from(x) - BigInt::from(self.product.clone())
        } else {
            BigInt::from(x)
        }
    }

    /// Residues of an arbitrary signed integer.
    pub fn reduce(&self, x: &BigInt) -> Vec<u64> {
        reduce_bigint(x, &self.moduli)
    }
}

/// `x mod q` for each `q`, always in `[0, q)`.
pub fn reduce_bigint(x: &BigInt, moduli: &[u64]) -> Vec<u64> {
    moduli
        .iter()
        .map(|&q| {
            let r = x.mod_floor(&BigInt::from(q));
            r.to_u64().unwrap_or_default()
        })
        .collect()
}
