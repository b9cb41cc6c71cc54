//! SIMD batching for the integer scheme.
//!
//! With a prime `t ≡ 1 (mod 2N)` the plaintext ring splits into `N` slots,
//! arranged as two rows of `N/2`. Slot `(row, c)` is the evaluation at
//! `ψ^(±3^c)` where `ψ` is a primitive `2N`-th root modulo `t`, so the
//! automorphism `X → X^(3^k)` rotates both rows left by `k` and
//! `X → X^(2N-1)` swaps them.

use std::sync::Arc;

use crate::arith::{centered, is_prime, mod_pow, reduce_i64};
use crate::context::Context;
use crate::error::{Error, Result};
use crate::ntt::NttTables;
use crate::params::{Fingerprint, SchemeType};
use crate::plaintext::{PlainData, Plaintext};

/// Packs `N` integers modulo `t` into two rows of `N/2` slots.
pub struct BatchEncoder {
    ctx: Arc<Context>,
    plain_modulus: u64,
    tables: NttTables,
    /// Slot `s` lives at transform index `index_map[s]`.
    index_map: Vec<usize>,
}

impl BatchEncoder {
    /// Fails unless the plaintext modulus is a batching prime.
    pub fn new(ctx: Arc<Context>) -> Result<Self> {
        let t = ctx
            .plain_modulus()
            .ok_or(Error::SchemeMismatch(SchemeType::Approximate.name()))?;
        let n = ctx.poly_degree();
        let two_n = 2 * n as u64;
        if !is_prime(t) || t % two_n != 1 {
            return Err(Error::param("plain_modulus does not support batching"));
        }
        let tables = NttTables::new(t, n)?;
        let row = n / 2;
        let index_map = (0..n)
            .map(|s| {
                let e = mod_pow(3, (s % row) as u64, two_n);
                let e = if s < row { e } else { two_n - e };
                tables.slot_of_exponent(e)
            })
            .collect();
        Ok(Self {
            ctx,
            plain_modulus: t,
            tables,
            index_map,
        })
    }

    /// Total number of slots (`N`).
    pub fn slot_count(&self) -> usize {
        self.index_map.len()
    }

    /// Slots per row, `N/2`.
    pub fn row_size(&self) -> usize {
        self.slot_count() / 2
    }

    /// Packs up to `N` values (reduced mod `t`, zero-padded).
    pub fn encode(&self, values: &[u64], fingerprint: Fingerprint) -> Result<Plaintext> {
        let t = self.plain_modulus;
        self.encode_reduced(values.iter().map(|&v| v % t), values.len(), fingerprint)
    }

    /// Signed variant: negative values wrap to `t - |v|`.
    pub fn encode_signed(&self, values: &[i64], fingerprint: Fingerprint) -> Result<Plaintext> {
        let t = self.plain_modulus;
        self.encode_reduced(values.iter().map(|&v| reduce_i64(v, t)), values.len(), fingerprint)
    }

    fn encode_reduced<I>(&self, values: I, len: usize, fingerprint: Fingerprint) -> Result<Plaintext>
    where
        I: Iterator<Item = u64>,
    {
        let n = self.slot_count();
        if len > n {
            return Err(Error::InvalidArgument(format!("{len} values exceed the {n} slots")));
        }
        self.ctx.level(&fingerprint)?;
        let mut y = vec![0u64; n];
        for (s, v) in values.enumerate() {
            y[self.index_map[s]] = v;
        }
        self.tables.inverse(&mut y);
        Ok(Plaintext {
            fingerprint,
            data: PlainData::Integer { coeffs: y },
        })
    }

    /// All `N` slot values; meaningless (not an error) for non-batched plaintexts.
    pub fn decode(&self, plain: &Plaintext) -> Result<Vec<u64>> {
        let coeffs = plain
            .coeffs()
            .ok_or(Error::SchemeMismatch(SchemeType::Approximate.name()))?;
        let mut y = coeffs.to_vec();
        y.resize(self.slot_count(), 0);
        self.tables.forward(&mut y);
        Ok(self.index_map.iter().map(|&i| y[i]).collect())
    }

    /// Slot values as centered representatives in `(-t/2, t/2]`.
    pub fn decode_signed(&self, plain: &Plaintext) -> Result<Vec<i64>> {
        let t = self.plain_modulus;
        Ok(self
            .decode(plain)?
            .into_iter()
            .map(|v| centered(v, t))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::{CoeffModulus, ParameterSet, PlainModulus};
    use crate::security::SecurityLevel;
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha20Rng;

    fn encoder(n: usize) -> BatchEncoder {
        let t = PlainModulus::batching(n, 20).unwrap();
        let q = CoeffModulus::create(n, &[40, 40]).unwrap();
        let ctx = Context::new(ParameterSet::integer(n, q, t), SecurityLevel::None).unwrap();
        BatchEncoder::new(ctx).unwrap()
    }

    #[test]
    fn encode_decode_is_exact() {
        let enc = encoder(64);
        let fp = enc.ctx.first_data_level().fingerprint();
        let t = enc.plain_modulus;
        let mut rng = ChaCha20Rng::seed_from_u64(21);
        let values: Vec<u64> = (0..64).map(|_| rng.gen_range(0..t)).collect();
        let pt = enc.encode(&values, fp).unwrap();
        assert_eq!(enc.decode(&pt).unwrap(), values);

        let short = enc.encode(&[1, 2, 3], fp).unwrap();
        let decoded = enc.decode(&short).unwrap();
        assert_eq!(&decoded[..3], &[1, 2, 3]);
        assert!(decoded[3..].iter().all(|&v| v == 0));
    }

    #[test]
    fn constants_encode_to_constant_polynomials() {
        let enc = encoder(32);
        let fp = enc.ctx.first_data_level().fingerprint();
        let pt = enc.encode(&[7; 32], fp).unwrap();
        let coeffs = pt.coeffs().unwrap();
        assert_eq!(coeffs[0], 7);
        assert!(coeffs[1..].iter().all(|&c| c == 0));
    }

    #[test]
    fn signed_values_and_wraparound() {
        let enc = encoder(16);
        let fp = enc.ctx.first_data_level().fingerprint();
        let t = enc.plain_modulus;
        let pt = enc.encode_signed(&[-1, 5, -7], fp).unwrap();
        assert_eq!(&enc.decode_signed(&pt).unwrap()[..3], &[-1, 5, -7]);
        let wrapped = enc.encode(&[t + 3], fp).unwrap();
        assert_eq!(enc.decode(&wrapped).unwrap()[0], 3);
    }

    #[test]
    fn rejects_oversized_input_and_bad_modulus() {
        let enc = encoder(16);
        let fp = enc.ctx.first_data_level().fingerprint();
        assert!(matches!(enc.encode(&[0; 17], fp), Err(Error::InvalidArgument(_))));

        let q = CoeffModulus::create(16, &[40, 40]).unwrap();
        let ctx = Context::new(ParameterSet::integer(16, q, 1024), SecurityLevel::None).unwrap();
        assert_eq!(
            BatchEncoder::new(ctx).err(),
            Some(Error::param("plain_modulus does not support batching"))
        );
    }
}
