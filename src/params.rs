//! Parameter sets, fingerprints and prime helpers.

use std::fmt;

use num_bigint::BigUint;
use num_integer::Integer;
use num_traits::One;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::arith::{bit_count, is_prime, ntt_primes_below, smallest_ntt_prime, MAX_PRIME_BITS};
use crate::error::{Error, Result};
use crate::security::{max_modulus_bit_count, SecurityLevel};

/// Largest supported ring degree.
pub const MAX_POLY_DEGREE: usize = 32768;
/// Largest number of primes in a modulus chain.
pub const MAX_COEFF_PRIMES: usize = 64;

/// Message reported for parameters that pass every check.
pub const VALID: &str = "valid";
/// Message reported when the modulus exceeds the security table.
pub const NOT_SECURITY_COMPLIANT: &str = "parameters are not compliant with the security standard";

/// Which encoding the chain serves.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchemeType {
    /// Exact arithmetic modulo a plaintext modulus (BFV).
    Integer,
    /// Fixed-point arithmetic with a tracked scale (CKKS).
    Approximate,
}

impl SchemeType {
    /// Lower-case name used in error messages.
    pub fn name(self) -> &'static str {
        match self {
            SchemeType::Integer => "integer",
            SchemeType::Approximate => "approximate",
        }
    }

    fn tag(self) -> u8 {
        match self {
            SchemeType::Integer => 1,
            SchemeType::Approximate => 2,
        }
    }
}

impl fmt::Display for SchemeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Identity of a parameter set: SHA-256 of its normalized fields as four words.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Fingerprint(pub [u64; 4]);

impl Fingerprint {
    /// Little-endian bytes of the four words.
    pub fn to_bytes(self) -> [u8; 32] {
        let mut out = [0u8; 32];
        for (chunk, w) in out.chunks_exact_mut(8).zip(self.0) {
            chunk.copy_from_slice(&w.to_le_bytes());
        }
        out
    }

    /// Inverse of [`Self::to_bytes`].
    pub fn from_bytes(bytes: &[u8; 32]) -> Self {
        let mut words = [0u64; 4];
        for (w, chunk) in words.iter_mut().zip(bytes.chunks_exact(8)) {
            let mut buf = [0u8; 8];
            buf.copy_from_slice(chunk);
            *w = u64::from_le_bytes(buf);
        }
        Fingerprint(words)
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for w in self.0 {
            write!(f, "{w:016x}")?;
        }
        Ok(())
    }
}

/// Ring degree, modulus primes and (integer scheme) plaintext modulus.
///
/// Values are plain data; nothing is checked until [`ParameterSet::validate`]
/// or context construction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterSet {
    scheme: SchemeType,
    poly_degree: usize,
    coeff_modulus: Vec<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    plain_modulus: Option<u64>,
}

impl ParameterSet {
    /// Empty parameter set for `scheme`.
    pub fn new(scheme: SchemeType) -> Self {
        Self {
            scheme,
            poly_degree: 0,
            coeff_modulus: Vec::new(),
            plain_modulus: None,
        }
    }

    /// Integer-scheme parameters in one call.
    pub fn integer(poly_degree: usize, coeff_modulus: Vec<u64>, plain_modulus: u64) -> Self {
        Self::new(SchemeType::Integer)
            .with_poly_degree(poly_degree)
            .with_coeff_modulus(coeff_modulus)
            .with_plain_modulus(plain_modulus)
    }

    /// Approximate-scheme parameters in one call.
    pub fn approximate(poly_degree: usize, coeff_modulus: Vec<u64>) -> Self {
        Self::new(SchemeType::Approximate)
            .with_poly_degree(poly_degree)
            .with_coeff_modulus(coeff_modulus)
    }

    /// Sets the ring degree `N`.
    #[must_use]
    pub fn with_poly_degree(mut self, n: usize) -> Self {
        self.poly_degree = n;
        self
    }

    /// Sets the coefficient modulus primes, key prime last.
    #[must_use]
    pub fn with_coeff_modulus(mut self, primes: Vec<u64>) -> Self {
        self.coeff_modulus = primes;
        self
    }

    /// Sets the plaintext modulus `t`.
    #[must_use]
    pub fn with_plain_modulus(mut self, t: u64) -> Self {
        self.plain_modulus = Some(t);
        self
    }

    /// Scheme the parameters belong to.
    pub fn scheme(&self) -> SchemeType {
        self.scheme
    }

    /// Ring degree `N`.
    pub fn poly_degree(&self) -> usize {
        self.poly_degree
    }

    /// Coefficient modulus primes.
    pub fn coeff_modulus(&self) -> &[u64] {
        &self.coeff_modulus
    }

    /// Plaintext modulus, when set.
    pub fn plain_modulus(&self) -> Option<u64> {
        self.plain_modulus
    }

    /// Sum of the bit lengths of all primes.
    pub fn total_coeff_modulus_bits(&self) -> u32 {
        self.coeff_modulus.iter().map(|&q| bit_count(q)).sum()
    }

    /// Product of all primes.
    pub fn coeff_modulus_product(&self) -> BigUint {
        self.coeff_modulus.iter().fold(BigUint::one(), |acc, &q| acc * q)
    }

    /// Copy without the last prime, or `None` when only one prime is left.
    pub fn drop_last_prime(&self) -> Option<Self> {
        if self.coeff_modulus.len() < 2 {
            return None;
        }
        let mut next = self.clone();
        next.coeff_modulus.pop();
        Some(next)
    }

    /// SHA-256 identity of the normalized parameters.
    pub fn fingerprint(&self) -> Fingerprint {
        let mut hasher = Sha256::new();
        hasher.update([self.scheme.tag()]);
        hasher.update((self.poly_degree as u64).to_le_bytes());
        hasher.update((self.coeff_modulus.len() as u64).to_le_bytes());
        for q in &self.coeff_modulus {
            hasher.update(q.to_le_bytes());
        }
        hasher.update(self.plain_modulus.unwrap_or(0).to_le_bytes());
        let digest = hasher.finalize();
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&digest);
        Fingerprint::from_bytes(&bytes)
    }

    /// `"valid"` or the first reason the parameters are rejected.
    pub fn validate(&self, security: SecurityLevel) -> &'static str {
        match self.check(security) {
            Ok(()) => VALID,
            Err(reason) => reason,
        }
    }

    pub(crate) fn check(&self, security: SecurityLevel) -> std::result::Result<(), &'static str> {
        self.check_structure()?;
        if security.is_enforced()
            && self.total_coeff_modulus_bits() > max_modulus_bit_count(self.poly_degree, security)
        {
            return Err(NOT_SECURITY_COMPLIANT);
        }
        Ok(())
    }

    fn check_structure(&self) -> std::result::Result<(), &'static str> {
        let n = self.poly_degree;
        if !n.is_power_of_two() || !(2..=MAX_POLY_DEGREE).contains(&n) {
            return Err("poly_degree must be a power of two between 2 and 32768");
        }
        let primes = &self.coeff_modulus;
        if primes.is_empty() || primes.len() > MAX_COEFF_PRIMES {
            return Err("coeff_modulus must contain between 1 and 64 primes");
        }
        for (i, &q) in primes.iter().enumerate() {
            if bit_count(q) > MAX_PRIME_BITS || !is_prime(q) || primes[..i].contains(&q) {
                return Err("coeff_modulus entries must be distinct primes of at most 61 bits");
            }
            if q % (2 * n as u64) != 1 {
                return Err("coeff_modulus primes must be congruent to 1 modulo 2N");
            }
        }
        match (self.scheme, self.plain_modulus) {
            (SchemeType::Integer, None) => return Err("plain_modulus is required by the integer scheme"),
            (SchemeType::Approximate, Some(_)) => {
                return Err("plain_modulus is not supported by the approximate scheme")
            }
            (SchemeType::Integer, Some(t)) => {
                if t < 2 || bit_count(t) > MAX_PRIME_BITS || primes.iter().any(|&q| q.gcd(&t) != 1) {
                    return Err("plain_modulus must be between 2 and 2^61 and coprime to coeff_modulus");
                }
                if BigUint::from(t) >= self.coeff_modulus_product() {
                    return Err("plain_modulus is not smaller than the coefficient modulus");
                }
            }
            (SchemeType::Approximate, None) => {}
        }
        Ok(())
    }
}

/// Helpers for picking chain primes.
pub struct CoeffModulus;

impl CoeffModulus {
    /// One prime per entry of `bit_sizes`, each `≡ 1 (mod 2N)` with exactly
    /// that many bits, all distinct. Equal sizes draw successive primes
    /// searching downward from `2^bits`.
    pub fn create(poly_degree: usize, bit_sizes: &[u32]) -> Result<Vec<u64>> {
        if !poly_degree.is_power_of_two() || !(2..=MAX_POLY_DEGREE).contains(&poly_degree) {
            return Err(Error::InvalidArgument(format!(
                "poly_degree {poly_degree} is not a supported power of two"
            )));
        }
        let mut out: Vec<u64> = Vec::with_capacity(bit_sizes.len());
        for &bits in bit_sizes {
            let found = ntt_primes_below(bits, poly_degree, 1, &out);
            let p = found.first().copied().ok_or_else(|| {
                Error::InvalidArgument(format!(
                    "not enough {bits}-bit primes congruent to 1 mod {}",
                    2 * poly_degree
                ))
            })?;
            out.push(p);
        }
        Ok(out)
    }
}

/// Helpers for picking a batching-friendly plaintext modulus.
pub struct PlainModulus;

impl PlainModulus {
    /// Smallest prime with exactly `bits` bits and `p ≡ 1 (mod 2N)`.
    pub fn batching(poly_degree: usize, bits: u32) -> Result<u64> {
        smallest_ntt_prime(bits, poly_degree, &[]).ok_or_else(|| {
            Error::InvalidArgument(format!(
                "no {bits}-bit prime congruent to 1 mod {}",
                2 * poly_degree
            ))
        })
    }

    /// Distinct batching primes, one per entry of `bit_sizes`, each the
    /// smallest not already taken.
    pub fn batching_many(poly_degree: usize, bit_sizes: &[u32]) -> Result<Vec<u64>> {
        let mut out = Vec::with_capacity(bit_sizes.len());
        for &bits in bit_sizes {
            let p = smallest_ntt_prime(bits, poly_degree, &out).ok_or_else(|| {
                Error::InvalidArgument(format!(
                    "not enough {bits}-bit primes congruent to 1 mod {}",
                    2 * poly_degree
                ))
            })?;
            out.push(p);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bfv_params() -> ParameterSet {
        let q = CoeffModulus::create(4096, &[36, 36, 37]).unwrap();
        ParameterSet::integer(4096, q, 1024)
    }

    #[test]
    fn fingerprint_tracks_every_field() {
        let p = bfv_params();
        assert_eq!(p.fingerprint(), p.clone().fingerprint());
        assert_ne!(p.fingerprint(), p.clone().with_plain_modulus(1025).fingerprint());
        assert_ne!(p.fingerprint(), p.drop_last_prime().unwrap().fingerprint());
        let approx = ParameterSet::approximate(4096, p.coeff_modulus().to_vec());
        assert_ne!(approx.fingerprint(), p.clone().fingerprint());
    }

    #[test]
    fn validation_messages() {
        let p = bfv_params();
        assert_eq!(p.validate(SecurityLevel::Tc128), VALID);
        assert_eq!(
            ParameterSet::integer(4096, p.coeff_modulus().to_vec(), 1 << 20)
                .with_poly_degree(1000)
                .validate(SecurityLevel::None),
            "poly_degree must be a power of two between 2 and 32768"
        );
        let big = CoeffModulus::create(4096, &[60, 60]).unwrap();
        assert_eq!(
            ParameterSet::integer(4096, big, 1024).validate(SecurityLevel::Tc128),
            NOT_SECURITY_COMPLIANT
        );
        assert_eq!(
            ParameterSet::approximate(4096, p.coeff_modulus().to_vec())
                .with_plain_modulus(3)
                .validate(SecurityLevel::None),
            "plain_modulus is not supported by the approximate scheme"
        );
        assert_eq!(
            ParameterSet::integer(4096, vec![p.coeff_modulus()[0]], p.coeff_modulus()[0] + 2)
                .validate(SecurityLevel::None),
            "plain_modulus is not smaller than the coefficient modulus"
        );
        assert_eq!(
            ParameterSet::approximate(4096, vec![12289]).validate(SecurityLevel::None),
            "coeff_modulus primes must be congruent to 1 modulo 2N"
        );
    }

    #[test]
    fn coeff_modulus_create_is_deterministic_and_distinct() {
        let a = CoeffModulus::create(8192, &[60, 40, 40, 60]).unwrap();
        assert_eq!(a, CoeffModulus::create(8192, &[60, 40, 40, 60]).unwrap());
        assert_ne!(a[0], a[3]);
        assert_ne!(a[1], a[2]);
        for (&q, bits) in a.iter().zip([60, 40, 40, 60]) {
            assert_eq!(bit_count(q), bits);
            assert_eq!(q % 16384, 1);
        }
    }

    #[test]
    fn plain_modulus_batching() {
        let t = PlainModulus::batching(4096, 20).unwrap();
        assert_eq!(t % 8192, 1);
        assert_eq!(bit_count(t), 20);
        let many = PlainModulus::batching_many(4096, &[20, 20]).unwrap();
        assert_eq!(many[0], t);
        assert!(many[1] > t);
    }

    #[test]
    fn parameters_load_from_json() {
        let p = bfv_params();
        let json = serde_json::to_string(&p).unwrap();
        assert!(json.contains("\"integer\""));
        let back: ParameterSet = serde_json::from_str(&json).unwrap();
        assert_eq!(back, p);
        let fp_json = serde_json::to_string(&p.fingerprint()).unwrap();
        assert_eq!(serde_json::from_str::<Fingerprint>(&fp_json).unwrap(), p.fingerprint());
    }
}
