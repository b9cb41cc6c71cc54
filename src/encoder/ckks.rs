//! Canonical-embedding encoder for the approximate scheme.
//!
//! Slot `s` holds the evaluation at `ζ^(5^s)` with `ζ = e^(iπ/N)`. Writing
//! `5^s mod 2N = 2k + 1`, that evaluation equals the `k`-th output of an
//! unnormalized inverse DFT applied to `m_j·ζ^j`, so both directions are a
//! single length-`N` FFT plus a twist.

use std::f64::consts::PI;
use std::sync::Arc;

use num_bigint::BigInt;
use num_traits::{FromPrimitive, ToPrimitive};
use rustfft::num_complex::Complex64;
use rustfft::{Fft, FftPlanner};

use crate::arith::{mod_pow, reduce_i64};
use crate::context::Context;
use crate::crt::reduce_bigint;
use crate::error::{Error, Result};
use crate::params::{Fingerprint, SchemeType};
use crate::plaintext::{PlainData, Plaintext};
use crate::polynomial::RnsPoly;

/// Bits kept free above the largest coefficient by [`CkksEncoder::encode_checked`].
pub const GUARD_BITS: u32 = 1;

/// Coefficients up to this magnitude go through `i64`.
const I64_SAFE: f64 = 4.611_686_018_427_388e18; // 2^62

/// Packs up to `N/2` complex values into a scaled plaintext.
pub struct CkksEncoder {
    ctx: Arc<Context>,
    forward: Arc<dyn Fft<f64>>,
    inverse: Arc<dyn Fft<f64>>,
    /// FFT index of slot `s`.
    slot_index: Vec<usize>,
    /// FFT index of the conjugate of slot `s`.
    conj_index: Vec<usize>,
    /// `ζ^j`.
    twist: Vec<Complex64>,
}

impl CkksEncoder {
    /// Fails for integer contexts.
    pub fn new(ctx: Arc<Context>) -> Result<Self> {
        if ctx.scheme() != SchemeType::Approximate {
            return Err(Error::SchemeMismatch(SchemeType::Integer.name()));
        }
        let n = ctx.poly_degree();
        let two_n = 2 * n as u64;
        let slots = n / 2;
        let mut slot_index = Vec::with_capacity(slots);
        let mut conj_index = Vec::with_capacity(slots);
        for s in 0..slots {
            let e = mod_pow(5, s as u64, two_n);
            slot_index.push(((e - 1) / 2) as usize);
            conj_index.push(((two_n - e - 1) / 2) as usize);
        }
        let twist = (0..n)
            .map(|j| Complex64::from_polar(1.0, PI * j as f64 / n as f64))
            .collect();
        let mut planner = FftPlanner::new();
        Ok(Self {
            forward: planner.plan_fft_forward(n),
            inverse: planner.plan_fft_inverse(n),
            ctx,
            slot_index,
            conj_index,
            twist,
        })
    }

    /// Number of complex slots (`N/2`).
    pub fn slot_count(&self) -> usize {
        self.slot_index.len()
    }

    /// Encodes reals at `scale`. Values whose scaled coefficients exceed the
    /// level modulus wrap silently; see [`CkksEncoder::encode_checked`].
    pub fn encode(&self, values: &[f64], scale: f64, fingerprint: Fingerprint) -> Result<Plaintext> {
        let complex: Vec<Complex64> = values.iter().map(|&v| Complex64::new(v, 0.0)).collect();
        self.encode_complex(&complex, scale, fingerprint)
    }

    /// Encodes complex slots at `scale`.
    pub fn encode_complex(&self, values: &[Complex64], scale: f64, fingerprint: Fingerprint) -> Result<Plaintext> {
        let coeffs = self.embed(values, scale)?;
        self.finish(&coeffs, scale, fingerprint)
    }

    /// Same value in every slot.
    pub fn encode_scalar(&self, value: f64, scale: f64, fingerprint: Fingerprint) -> Result<Plaintext> {
        check_scale(scale)?;
        if !value.is_finite() {
            return Err(Error::InvalidArgument("non-finite value".into()));
        }
        let mut coeffs = vec![0.0; self.ctx.poly_degree()];
        coeffs[0] = (value * scale).round();
        self.finish(&coeffs, scale, fingerprint)
    }

    /// Like [`CkksEncoder::encode`] but fails with `EncodingOverflow` instead
    /// of wrapping when a coefficient would not fit the level modulus.
    pub fn encode_checked(&self, values: &[f64], scale: f64, fingerprint: Fingerprint) -> Result<Plaintext> {
        let available = self.ctx.level(&fingerprint)?.modulus_bits();
        let complex: Vec<Complex64> = values.iter().map(|&v| Complex64::new(v, 0.0)).collect();
        let coeffs = self.embed(&complex, scale)?;
        let max = coeffs.iter().fold(0.0f64, |m, c| m.max(c.abs()));
        let needed = if max < 1.0 { 0 } else { max.log2().floor() as u32 + 1 } + GUARD_BITS;
        if needed >= available {
            return Err(Error::EncodingOverflow { needed, available });
        }
        self.finish(&coeffs, scale, fingerprint)
    }

    /// Real parts of the slots.
    pub fn decode(&self, plain: &Plaintext) -> Result<Vec<f64>> {
        Ok(self.decode_complex(plain)?.into_iter().map(|z| z.re).collect())
    }

    /// Complex slots, scale removed.
    pub fn decode_complex(&self, plain: &Plaintext) -> Result<Vec<Complex64>> {
        let (poly, scale) = match &plain.data {
            PlainData::Approximate { poly, scale } => (poly, *scale),
            PlainData::Integer { .. } => return Err(Error::SchemeMismatch(SchemeType::Integer.name())),
        };
        let level = self.ctx.level(&plain.fingerprint)?;
        let crt = level.crt();
        let mut a: Vec<Complex64> = (0..poly.degree())
            .map(|j| {
                let m = crt.compose_centered(poly.limbs().iter().map(|limb| limb[j]));
                let m = m.to_f64().unwrap_or(f64::NAN) / scale;
                self.twist[j] * m
            })
            .collect();
        self.inverse.process(&mut a);
        Ok(self.slot_index.iter().map(|&k| a[k]).collect())
    }

    /// Scaled, rounded coefficients of the polynomial whose slots are `values`.
    fn embed(&self, values: &[Complex64], scale: f64) -> Result<Vec<f64>> {
        check_scale(scale)?;
        let slots = self.slot_count();
        if values.len() > slots {
            return Err(Error::InvalidArgument(format!(
                "{} values exceed the {slots} slots",
                values.len()
            )));
        }
        if values.iter().any(|z| !z.re.is_finite() || !z.im.is_finite()) {
            return Err(Error::InvalidArgument("non-finite value".into()));
        }
        let n = self.ctx.poly_degree();
        let mut y = vec![Complex64::new(0.0, 0.0); n];
        for (s, z) in values.iter().enumerate() {
            y[self.slot_index[s]] = z * scale;
            y[self.conj_index[s]] = z.conj() * scale;
        }
        self.forward.process(&mut y);
        Ok(y
            .iter()
            .zip(&self.twist)
            .map(|(a, w)| ((a * w.conj()).re / n as f64).round())
            .collect())
    }

    fn finish(&self, coeffs: &[f64], scale: f64, fingerprint: Fingerprint) -> Result<Plaintext> {
        let level = self.ctx.level(&fingerprint)?;
        let poly = coeffs_to_poly(coeffs, level.moduli());
        Ok(Plaintext {
            fingerprint,
            data: PlainData::Approximate { poly, scale },
        })
    }
}

fn check_scale(scale: f64) -> Result<()> {
    if scale.is_finite() && scale >= 1.0 {
        Ok(())
    } else {
        Err(Error::InvalidArgument(format!("scale {scale} must be at least 1")))
    }
}

/// Reduces rounded real coefficients into each prime, via `BigInt` when large.
fn coeffs_to_poly(coeffs: &[f64], moduli: &[u64]) -> RnsPoly {
    if coeffs.iter().all(|c| c.abs() < I64_SAFE) {
        let small: Vec<i64> = coeffs.iter().map(|&c| c as i64).collect();
        return RnsPoly::from_signed(&small, moduli);
    }
    let mut limbs = vec![vec![0u64; coeffs.len()]; moduli.len()];
    for (j, &c) in coeffs.iter().enumerate() {
        let residues = if c.abs() < I64_SAFE {
            moduli.iter().map(|&q| reduce_i64(c as i64, q)).collect()
        } else {
            let big = BigInt::from_f64(c).unwrap_or_default();
            reduce_bigint(&big, moduli)
        };
        for (limb, r) in limbs.iter_mut().zip(residues) {
            limb[j] = r;
        }
    }
    RnsPoly::from_limbs(limbs, moduli).unwrap_or_else(|_| RnsPoly::zero(coeffs.len(), moduli))
}
