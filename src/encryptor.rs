//! Encryption, decryption and secret-key diagnostics.

use std::sync::Arc;

use log::{trace, warn};
use num_bigint::BigUint;
use num_traits::{ToPrimitive, Zero};
use rand::Rng;
use zeroize::Zeroizing;

use crate::arith::{centered, mod_add, mod_mul};
use crate::ciphertext::Ciphertext;
use crate::context::{Context, LevelData};
use crate::error::{Error, Result};
use crate::keys::{PublicKey, SecretKey};
use crate::params::{Fingerprint, SchemeType};
use crate::plaintext::{PlainData, Plaintext};
use crate::polynomial::RnsPoly;
use crate::sampling::{gaussian_poly, sample_uniform, ternary_poly};

/// Encrypts with a public key, or with a borrowed secret key for the
/// symmetric variant.
pub struct Encryptor<'a> {
    ctx: Arc<Context>,
    public_key: Option<PublicKey>,
    secret_key: Option<&'a SecretKey>,
}

impl<'a> Encryptor<'a> {
    /// Public-key encryptor.
    pub fn new(ctx: Arc<Context>, public_key: PublicKey) -> Result<Self> {
        if public_key.fingerprint() != ctx.key_level().fingerprint() {
            return Err(Error::LevelMismatch);
        }
        Ok(Self {
            ctx,
            public_key: Some(public_key),
            secret_key: None,
        })
    }

    /// Symmetric encryptor: lower fresh noise, but the encrypting party
    /// must hold the secret key.
    pub fn with_secret_key(ctx: Arc<Context>, secret_key: &'a SecretKey) -> Result<Self> {
        if secret_key.fingerprint() != ctx.key_level().fingerprint() {
            return Err(Error::LevelMismatch);
        }
        Ok(Self {
            ctx,
            public_key: None,
            secret_key: Some(secret_key),
        })
    }

    /// Public-key encryption at the plaintext's level; the scale is copied.
    pub fn encrypt<R: Rng>(&self, plain: &Plaintext, rng: &mut R) -> Result<Ciphertext> {
        let level = self.plain_level(plain)?;
        let mut ct = self.zero_public(level, rng)?;
        add_plain_to_c0(level, &mut ct.parts[0], plain)?;
        ct.scale = plain.scale();
        trace!("encrypted at level {}", level.index());
        Ok(ct)
    }

    /// Secret-key encryption; fails for a public-key encryptor.
    pub fn encrypt_symmetric<R: Rng>(&self, plain: &Plaintext, rng: &mut R) -> Result<Ciphertext> {
        let level = self.plain_level(plain)?;
        let sk = self
            .secret_key
            .ok_or_else(|| Error::InvalidArgument("encryptor has no secret key".into()))?;
        let moduli = level.moduli();
        let tables = self.ctx.ntt_tables(moduli)?;
        let n = self.ctx.poly_degree();
        let s = Zeroizing::new(sk.at_level(level));
        let a = sample_uniform(n, moduli, rng);
        let e = gaussian_poly(n, moduli, rng);
        let mut c0 = &e - &a.multiply(&s, &tables);
        add_plain_to_c0(level, &mut c0, plain)?;
        Ok(Ciphertext {
            parts: vec![c0, a],
            fingerprint: level.fingerprint(),
            scale: plain.scale(),
        })
    }

    /// Fresh encryption of zero (scale 1 for the approximate scheme).
    pub fn encrypt_zero<R: Rng>(&self, fingerprint: Fingerprint, rng: &mut R) -> Result<Ciphertext> {
        let level = self.ctx.level(&fingerprint)?;
        let mut ct = self.zero_public(level, rng)?;
        if self.ctx.scheme() == SchemeType::Approximate {
            ct.scale = Some(1.0);
        }
        Ok(ct)
    }

    fn plain_level(&self, plain: &Plaintext) -> Result<&LevelData> {
        if plain.scheme() != self.ctx.scheme() {
            return Err(Error::SchemeMismatch(self.ctx.scheme().name()));
        }
        self.ctx.level(&plain.fingerprint())
    }

    /// `(b·u + e1, a·u + e2)`, computed one level up and divided by the
    /// extra prime so the `u·e` term shrinks.
    fn zero_public<R: Rng>(&self, level: &LevelData, rng: &mut R) -> Result<Ciphertext> {
        let pk = self
            .public_key
            .as_ref()
            .ok_or_else(|| Error::InvalidArgument("encryptor has no public key".into()))?;
        let work = if level.is_key_level() {
            level
        } else {
            self.ctx.parent(level).ok_or(Error::UnknownLevel)?
        };
        let moduli = work.moduli();
        let tables = self.ctx.ntt_tables(moduli)?;
        let n = self.ctx.poly_degree();

        let mut b = pk.b.clone();
        let mut a = pk.a.clone();
        b.truncate_limbs(moduli.len());
        a.truncate_limbs(moduli.len());

        let u = ternary_poly(n, moduli, rng);
        let mut c0 = b.multiply(&u, &tables);
        let mut c1 = a.multiply(&u, &tables);
        c0 += &gaussian_poly(n, moduli, rng);
        c1 += &gaussian_poly(n, moduli, rng);
        if !level.is_key_level() {
            c0.divide_round_by_last()?;
            c1.divide_round_by_last()?;
        }
        Ok(Ciphertext {
            parts: vec![c0, c1],
            fingerprint: level.fingerprint(),
            scale: None,
        })
    }
}

/// `round(Q_l·m / t)` over the level primes, computed as
/// `floor(Q_l/t)·m + round((Q_l mod t)·m / t)`.
pub(crate) fn scaled_message(level: &LevelData, coeffs: &[u64], t: u64) -> RnsPoly {
    let r = u128::from(level.q_mod_t());
    let half_t = u128::from(t / 2);
    let fix: Vec<u64> = coeffs
        .iter()
        .map(|&m| ((r * u128::from(m) + half_t) / u128::from(t)) as u64)
        .collect();
    let mut out = RnsPoly::zero(coeffs.len(), level.moduli());
    for (i, (&q, &delta)) in level.moduli().iter().zip(level.delta()).enumerate() {
        for ((c, &m), &f) in out.limb_mut(i).iter_mut().zip(coeffs).zip(&fix) {
            *c = mod_add(mod_mul(m % q, delta, q), f % q, q);
        }
    }
    out
}

/// Integer plaintext lifted into the level primes, centered modulo `t`.
pub(crate) fn lift_plain(level: &LevelData, coeffs: &[u64], t: u64) -> RnsPoly {
    let signed: Vec<i64> = coeffs.iter().map(|&c| centered(c, t)).collect();
    RnsPoly::from_signed(&signed, level.moduli())
}

fn add_plain_to_c0(level: &LevelData, c0: &mut RnsPoly, plain: &Plaintext) -> Result<()> {
    match &plain.data {
        PlainData::Integer { coeffs } => {
            let t = level.params().plain_modulus().ok_or(Error::SchemeMismatch("approximate"))?;
            *c0 += &scaled_message(level, coeffs, t);
        }
        PlainData::Approximate { poly, .. } => {
            if poly.moduli() != level.moduli() {
                return Err(Error::LevelMismatch);
            }
            *c0 += poly;
        }
    }
    Ok(())
}

/// Recovers plaintexts and reports secret-key-gated diagnostics.
pub struct Decryptor<'a> {
    ctx: Arc<Context>,
    secret_key: &'a SecretKey,
}

impl<'a> Decryptor<'a> {
    /// Decryptor holding a borrowed secret key.
    pub fn new(ctx: Arc<Context>, secret_key: &'a SecretKey) -> Result<Self> {
        if secret_key.fingerprint() != ctx.key_level().fingerprint() {
            return Err(Error::LevelMismatch);
        }
        Ok(Self { ctx, secret_key })
    }

    /// Decrypts at the ciphertext's level. Past zero noise budget the
    /// result is garbage, not an error.
    pub fn decrypt(&self, ct: &Ciphertext) -> Result<Plaintext> {
        let level = self.ctx.level(&ct.fingerprint)?;
        check_shape(level, ct).map_err(|e| Error::InvalidArgument(e.into()))?;
        let x = self.dot_with_secret(level, ct)?;
        let data = match self.ctx.plain_modulus() {
            Some(t) => {
                let crt = level.crt();
                let q = crt.product();
                let two_q: BigUint = q << 1u32;
                let coeffs = (0..x.degree())
                    .map(|j| {
                        let v = crt.compose(x.limbs().iter().map(|limb| limb[j]));
                        let m = (v * (2 * u128::from(t)) + q) / &two_q % t;
                        m.to_u64().unwrap_or_default()
                    })
                    .collect();
                PlainData::Integer { coeffs }
            }
            None => PlainData::Approximate {
                poly: x,
                scale: ct.scale.unwrap_or(1.0),
            },
        };
        Ok(Plaintext {
            fingerprint: ct.fingerprint,
            data,
        })
    }

    /// Remaining noise budget in bits: `bits(Q) - bits(‖[t·x]_Q‖∞) - 1`,
    /// floored at zero.
    pub fn invariant_noise_budget(&self, ct: &Ciphertext) -> Result<u32> {
        let t = self
            .ctx
            .plain_modulus()
            .ok_or(Error::NoiseBudget("approximate ciphertexts have no noise budget"))?;
        let level = self
            .ctx
            .level(&ct.fingerprint)
            .map_err(|_| Error::NoiseBudget("unknown level"))?;
        check_shape(level, ct).map_err(Error::NoiseBudget)?;
        let x = self.dot_with_secret(level, ct)?;
        let crt = level.crt();
        let max = (0..x.degree())
            .map(|j| {
                let v = crt.compose(x.limbs().iter().map(|limb| limb[j])) * t % crt.product();
                crt.center(v).magnitude().clone()
            })
            .max()
            .unwrap_or_else(BigUint::zero);
        let budget = crt.bits().saturating_sub(max.bits() as u32 + 1);
        if budget == 0 {
            warn!("noise budget exhausted at level {}", level.index());
        }
        Ok(budget)
    }

    /// Bits between the largest decrypted coefficient and `Q/2`; once this
    /// reaches zero an approximate ciphertext has wrapped around.
    pub fn coefficient_headroom_bits(&self, ct: &Ciphertext) -> Result<u32> {
        if self.ctx.scheme() != SchemeType::Approximate {
            return Err(Error::SchemeMismatch(SchemeType::Integer.name()));
        }
        let level = self.ctx.level(&ct.fingerprint)?;
        check_shape(level, ct).map_err(|e| Error::InvalidArgument(e.into()))?;
        let x = self.dot_with_secret(level, ct)?;
        let crt = level.crt();
        let max_bits = (0..x.degree())
            .map(|j| crt.compose_centered(x.limbs().iter().map(|limb| limb[j])).bits())
            .max()
            .unwrap_or(0);
        Ok((crt.bits() - 1).saturating_sub(max_bits as u32))
    }

    /// `Σ c_i·s^i` by Horner's rule.
    fn dot_with_secret(&self, level: &LevelData, ct: &Ciphertext) -> Result<RnsPoly> {
        let tables = self.ctx.ntt_tables(level.moduli())?;
        let s = Zeroizing::new(self.secret_key.at_level(level));
        let mut parts = ct.parts.iter().rev();
        let mut acc = parts.next().cloned().ok_or(Error::NoiseBudget("empty ciphertext"))?;
        for c in parts {
            acc = acc.multiply(&s, &tables);
            acc += c;
        }
        Ok(acc)
    }
}

pub(crate) fn check_shape(level: &LevelData, ct: &Ciphertext) -> std::result::Result<(), &'static str> {
    if ct.parts.len() < 2 {
        return Err("ciphertext has fewer than two parts");
    }
    let n = level.params().poly_degree();
    for p in &ct.parts {
        if p.moduli() != level.moduli() || p.degree() != n {
            return Err("ciphertext shape does not match its level");
        }
        if !p.is_reduced() {
            return Err("ciphertext coefficient out of range");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::{BatchEncoder, CkksEncoder};
    use crate::keys::KeyGenerator;
    use crate::params::{CoeffModulus, ParameterSet, PlainModulus};
    use crate::security::SecurityLevel;
    use approx::assert_abs_diff_eq;
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    fn bfv() -> Arc<Context> {
        let t = PlainModulus::batching(1024, 20).unwrap();
        let q = CoeffModulus::create(1024, &[40, 40, 41]).unwrap();
        Context::new(ParameterSet::integer(1024, q, t), SecurityLevel::None).unwrap()
    }

    #[test]
    fn public_and_symmetric_roundtrip_at_every_level() {
        let ctx = bfv();
        let mut rng = ChaCha20Rng::seed_from_u64(31);
        let keygen = KeyGenerator::new(ctx.clone(), &mut rng);
        let pk = keygen.create_public_key(&mut rng).unwrap();
        let encoder = BatchEncoder::new(ctx.clone()).unwrap();
        let enc = Encryptor::new(ctx.clone(), pk).unwrap();
        let sym = Encryptor::with_secret_key(ctx.clone(), keygen.secret_key()).unwrap();
        let dec = Decryptor::new(ctx.clone(), keygen.secret_key()).unwrap();
        let values: Vec<u64> = (0..1024).map(|i| i * 7 + 1).collect();

        for level in ctx.levels() {
            let pt = encoder.encode(&values, level.fingerprint()).unwrap();
            for ct in [enc.encrypt(&pt, &mut rng).unwrap(), sym.encrypt_symmetric(&pt, &mut rng).unwrap()] {
                assert_eq!(ct.size(), 2);
                assert_eq!(ct.fingerprint(), level.fingerprint());
                assert_eq!(encoder.decode(&dec.decrypt(&ct).unwrap()).unwrap(), values);
                assert!(dec.invariant_noise_budget(&ct).unwrap() > 0);
            }
        }
    }

    #[test]
    fn symmetric_noise_is_lower() {
        let ctx = bfv();
        let mut rng = ChaCha20Rng::seed_from_u64(32);
        let keygen = KeyGenerator::new(ctx.clone(), &mut rng);
        let pk = keygen.create_public_key(&mut rng).unwrap();
        let fp = ctx.first_data_level().fingerprint();
        let pt = Plaintext::from_coeffs(&ctx, &[1, 2, 3], fp).unwrap();
        let dec = Decryptor::new(ctx.clone(), keygen.secret_key()).unwrap();
        let public = Encryptor::new(ctx.clone(), pk).unwrap().encrypt(&pt, &mut rng).unwrap();
        let symmetric = Encryptor::with_secret_key(ctx.clone(), keygen.secret_key())
            .unwrap()
            .encrypt_symmetric(&pt, &mut rng)
            .unwrap();
        assert!(dec.invariant_noise_budget(&symmetric).unwrap() >= dec.invariant_noise_budget(&public).unwrap());
    }

    #[test]
    fn noise_budget_rejects_malformed_ciphertexts() {
        let ctx = bfv();
        let mut rng = ChaCha20Rng::seed_from_u64(33);
        let keygen = KeyGenerator::new(ctx.clone(), &mut rng);
        let enc = Encryptor::with_secret_key(ctx.clone(), keygen.secret_key()).unwrap();
        let dec = Decryptor::new(ctx.clone(), keygen.secret_key()).unwrap();
        let fp = ctx.first_data_level().fingerprint();
        let ct = enc
            .encrypt_symmetric(&Plaintext::from_coeffs(&ctx, &[5], fp).unwrap(), &mut rng)
            .unwrap();

        let mut short = ct.clone();
        short.parts.truncate(1);
        assert!(matches!(dec.invariant_noise_budget(&short), Err(Error::NoiseBudget(_))));

        let mut foreign = ct.clone();
        foreign.fingerprint = Fingerprint::default();
        assert!(matches!(dec.invariant_noise_budget(&foreign), Err(Error::NoiseBudget(_))));

        let mut wrong_level = ct.clone();
        wrong_level.fingerprint = ctx.last_level().fingerprint();
        assert!(matches!(dec.invariant_noise_budget(&wrong_level), Err(Error::NoiseBudget(_))));

        let mut out_of_range = ct;
        let q0 = ctx.first_data_level().moduli()[0];
        out_of_range.parts[0].limb_mut(0)[0] = q0;
        assert!(matches!(dec.invariant_noise_budget(&out_of_range), Err(Error::NoiseBudget(_))));
    }

    #[test]
    fn approximate_roundtrip_and_headroom() {
        let q = CoeffModulus::create(1024, &[50, 40, 50]).unwrap();
        let ctx = Context::new(ParameterSet::approximate(1024, q), SecurityLevel::None).unwrap();
        let mut rng = ChaCha20Rng::seed_from_u64(34);
        let keygen = KeyGenerator::new(ctx.clone(), &mut rng);
        let pk = keygen.create_public_key(&mut rng).unwrap();
        let encoder = CkksEncoder::new(ctx.clone()).unwrap();
        let enc = Encryptor::new(ctx.clone(), pk).unwrap();
        let dec = Decryptor::new(ctx.clone(), keygen.secret_key()).unwrap();
        let fp = ctx.first_data_level().fingerprint();
        let scale = 2f64.powi(30);

        let values = [0.5, -1.25, 3.0];
        let ct = enc.encrypt(&encoder.encode(&values, scale, fp).unwrap(), &mut rng).unwrap();
        assert_eq!(ct.scale(), Some(scale));
        let out = encoder.decode(&dec.decrypt(&ct).unwrap()).unwrap();
        for (a, b) in values.iter().zip(&out) {
            assert_abs_diff_eq!(a, b, epsilon = 1e-5);
        }
        let headroom = dec.coefficient_headroom_bits(&ct).unwrap();
        assert!(headroom > 50 && headroom < 89, "headroom {headroom}");
        assert!(matches!(dec.invariant_noise_budget(&ct), Err(Error::NoiseBudget(_))));

        let zero = enc.encrypt_zero(fp, &mut rng).unwrap();
        assert_eq!(zero.scale(), Some(1.0));
    }

    #[test]
    fn keys_from_other_contexts_are_rejected() {
        let ctx = bfv();
        let other = bfv();
        let mut rng = ChaCha20Rng::seed_from_u64(35);
        let keygen = KeyGenerator::new(ctx, &mut rng);
        // same parameters, same fingerprint: accepted
        assert!(Decryptor::new(other, keygen.secret_key()).is_ok());
        let q = CoeffModulus::create(1024, &[40, 41]).unwrap();
        let third = Context::new(ParameterSet::integer(1024, q, 12289), SecurityLevel::None).unwrap();
        assert!(matches!(Decryptor::new(third, keygen.secret_key()), Err(Error::LevelMismatch)));
    }
}
