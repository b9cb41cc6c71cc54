//! Ciphertext container.

use crate::error::{Error, Result};
use crate::params::Fingerprint;
use crate::polynomial::RnsPoly;

/// (c₀, c₁, …) at one level; decrypts as `Σ c_i·s^i`.
#[derive(Clone, Debug, PartialEq)]
pub struct Ciphertext {
    pub(crate) parts: Vec<RnsPoly>,
    pub(crate) fingerprint: Fingerprint,
    /// `Some` exactly for the approximate scheme.
    pub(crate) scale: Option<f64>,
}

impl Ciphertext {
    /// Number of polynomials: 2 when fresh, grows with multiplication.
    pub fn size(&self) -> usize {
        self.parts.len()
    }

    /// Level the ciphertext is bound to.
    pub fn fingerprint(&self) -> Fingerprint {
        self.fingerprint
    }

    /// Scale of an approximate ciphertext; `None` for the integer scheme.
    pub fn scale(&self) -> Option<f64> {
        self.scale
    }

    /// The polynomials `c_0, c_1, ...`.
    pub fn parts(&self) -> &[RnsPoly] {
        &self.parts
    }

    /// Overwrites the recorded scale without touching the data.
    ///
    /// Only sound when the new value is (close to) the true scale, e.g. after
    /// rescaling by a prime near a power of two. Decoding divides by whatever
    /// is recorded here, so any mismatch shows up directly as relative error.
    pub fn set_scale(&mut self, scale: f64) -> Result<()> {
        if self.scale.is_none() {
            return Err(Error::SchemeMismatch("integer"));
        }
        if !scale.is_finite() || scale <= 0.0 {
            return Err(Error::InvalidArgument(format!("scale {scale} must be positive")));
        }
        self.scale = Some(scale);
        Ok(())
    }
}
