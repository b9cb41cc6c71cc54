//! Plaintext polynomials bound to a level.

use std::fmt::Write as _;

use crate::context::Context;
use crate::error::{Error, Result};
use crate::params::{Fingerprint, SchemeType};
use crate::polynomial::RnsPoly;

/// Scheme-specific plaintext payload.
#[derive(Clone, Debug, PartialEq)]
pub enum PlainData {
    /// `N` coefficients modulo the plaintext modulus `t`.
    Integer {
        /// Coefficient `i` of `X^i`.
        coeffs: Vec<u64>,
    },
    /// Scaled coefficients modulo the level modulus.
    Approximate {
        /// Encoded polynomial over the level's primes.
        poly: RnsPoly,
        /// Factor the slot values were multiplied by.
        scale: f64,
    },
}

/// Plaintext polynomial bound to a level.
#[derive(Clone, Debug, PartialEq)]
pub struct Plaintext {
    pub(crate) fingerprint: Fingerprint,
    pub(crate) data: PlainData,
}

impl Plaintext {
    /// Integer plaintext from raw coefficients; zero-padded to `N` and reduced mod `t`.
    pub fn from_coeffs(ctx: &Context, coeffs: &[u64], fingerprint: Fingerprint) -> Result<Self> {
        ctx.level(&fingerprint)?;
        let t = ctx
            .plain_modulus()
            .ok_or(Error::SchemeMismatch(SchemeType::Approximate.name()))?;
        let n = ctx.poly_degree();
        if coeffs.len() > n {
            return Err(Error::InvalidArgument(format!(
                "{} coefficients exceed the ring degree {n}",
                coeffs.len()
            )));
        }
        let mut padded = vec![0u64; n];
        for (dst, &c) in padded.iter_mut().zip(coeffs) {
            *dst = c % t;
        }
        Ok(Self {
            fingerprint,
            data: PlainData::Integer { coeffs: padded },
        })
    }

    /// Parses `"1x^2 + 2x^1 + 3"`: hexadecimal coefficients, any term order.
    pub fn from_hex_poly(ctx: &Context, text: &str, fingerprint: Fingerprint) -> Result<Self> {
        let t = ctx
            .plain_modulus()
            .ok_or(Error::SchemeMismatch(SchemeType::Approximate.name()))?;
        let n = ctx.poly_degree();
        let mut coeffs = vec![0u64; n];
        let mut seen = vec![false; n];
        let bad = |term: &str| Error::InvalidArgument(format!("malformed polynomial term {term:?}"));
        for term in text.split('+').map(str::trim) {
            let (coeff, power) = match term.split_once(['x', 'X']) {
                Some((c, rest)) => {
                    let exp = rest.trim().strip_prefix('^').ok_or_else(|| bad(term))?;
                    let exp = exp.trim().parse::<usize>().map_err(|_| bad(term))?;
                    (c.trim(), exp)
                }
                None => (term, 0),
            };
            let value = u64::from_str_radix(coeff, 16).map_err(|_| bad(term))?;
            if value >= t {
                return Err(Error::InvalidArgument(format!(
                    "coefficient {value:#x} is not below the plaintext modulus"
                )));
            }
            if power >= n {
                return Err(Error::InvalidArgument(format!("degree {power} exceeds the ring")));
            }
            if std::mem::replace(&mut seen[power], true) {
                return Err(Error::InvalidArgument(format!("power {power} appears twice")));
            }
            coeffs[power] = value;
        }
        Self::from_coeffs(ctx, &coeffs, fingerprint)
    }

    /// Hex rendering with the highest power first; `"0"` for the zero polynomial.
    pub fn to_hex_poly(&self) -> Result<String> {
        let coeffs = self.coeffs().ok_or(Error::SchemeMismatch(SchemeType::Approximate.name()))?;
        let mut out = String::new();
        for (power, &c) in coeffs.iter().enumerate().rev().filter(|&(_, &c)| c != 0) {
            if !out.is_empty() {
                out.push_str(" + ");
            }
            // writing to a String cannot fail
            let _ = match power {
                0 => write!(out, "{c:X}"),
                _ => write!(out, "{c:X}x^{power}"),
            };
        }
        if out.is_empty() {
            out.push('0');
        }
        Ok(out)
    }

    /// Level the plaintext is bound to.
    pub fn fingerprint(&self) -> Fingerprint {
        self.fingerprint
    }

    /// Scheme-specific payload.
    pub fn data(&self) -> &PlainData {
        &self.data
    }

    /// Scheme implied by the payload.
    pub fn scheme(&self) -> SchemeType {
        match self.data {
            PlainData::Integer { .. } => SchemeType::Integer,
            PlainData::Approximate { .. } => SchemeType::Approximate,
        }
    }

    /// Scale of an approximate plaintext.
    pub fn scale(&self) -> Option<f64> {
        match self.data {
            PlainData::Approximate { scale, .. } => Some(scale),
            PlainData::Integer { .. } => None,
        }
    }

    /// Coefficients of an integer plaintext.
    pub fn coeffs(&self) -> Option<&[u64]> {
        match &self.data {
            PlainData::Integer { coeffs } => Some(coeffs),
            PlainData::Approximate { .. } => None,
        }
    }

    pub(crate) fn poly(&self) -> Option<&RnsPoly> {
        match &self.data {
            PlainData::Approximate { poly, .. } => Some(poly),
            PlainData::Integer { .. } => None,
        }
    }
}
