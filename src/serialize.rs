//! Compact binary encoding of ciphertexts and public key material.
//!
//! Every object starts with a four-byte tag, a format version and the
//! fingerprint of its level; all integers are little-endian. Decoding is
//! always against a context, which supplies the moduli and degree that a
//! stream must match. Secret keys have no encoding.

use std::collections::HashMap;

use crate::ciphertext::Ciphertext;
use crate::context::{Context, LevelData};
use crate::error::{Error, Result};
use crate::keys::{KeySwitchKey, PublicKey, RelinKey, RotationKeys};
use crate::params::Fingerprint;
use crate::polynomial::RnsPoly;

const VERSION: u8 = 1;
const CIPHERTEXT_TAG: &[u8; 4] = b"LHCT";
const PUBLIC_KEY_TAG: &[u8; 4] = b"LHPK";
const RELIN_KEY_TAG: &[u8; 4] = b"LHRK";
const ROTATION_KEYS_TAG: &[u8; 4] = b"LHGK";

/// Upper bound on ciphertext parts accepted from a stream.
const MAX_PARTS: u32 = 16;

/// Binary encoding tagged with the owning level.
pub trait ToBytes {
    /// Encodes `self`, version and fingerprint included.
    fn to_bytes(&self) -> Vec<u8>;
}

/// Decoding counterpart of [`ToBytes`].
pub trait FromBytes: Sized {
    /// Decodes and validates against `ctx`.
    fn from_bytes(bytes: &[u8], ctx: &Context) -> Result<Self>;
}

fn malformed(what: impl Into<String>) -> Error {
    Error::Serialization(what.into())
}

struct Writer {
    buf: Vec<u8>,
}

impl Writer {
    fn new(tag: &[u8; 4], fingerprint: Fingerprint) -> Self {
        let mut buf = Vec::new();
        buf.extend_from_slice(tag);
        buf.push(VERSION);
        buf.extend_from_slice(&fingerprint.to_bytes());
        Self { buf }
    }

    fn u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    fn u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn u64(&mut self, v: u64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn poly(&mut self, p: &RnsPoly) {
        self.u32(p.num_limbs() as u32);
        self.u32(p.degree() as u32);
        for limb in p.limbs() {
            for &c in limb {
                self.u64(c);
            }
        }
    }

    fn switch_key(&mut self, key: &KeySwitchKey) {
        self.u32(key.components.len() as u32);
        for (b, a) in &key.components {
            self.poly(b);
            self.poly(a);
        }
    }

    fn finish(self) -> Vec<u8> {
        self.buf
    }
}

struct Reader<'a> {
    bytes: &'a [u8],
}

impl<'a> Reader<'a> {
    /// Checks the header and returns the reader with the fingerprint.
    fn open(bytes: &'a [u8], tag: &[u8; 4]) -> Result<(Self, Fingerprint)> {
        let mut r = Self { bytes };
        if r.take(4)? != tag {
            return Err(malformed("unexpected object tag"));
        }
        let version = r.u8()?;
        if version != VERSION {
            return Err(malformed(format!("unsupported version {version}")));
        }
        let raw: [u8; 32] = r
            .take(32)?
            .try_into()
            .map_err(|_| malformed("truncated fingerprint"))?;
        Ok((r, Fingerprint::from_bytes(&raw)))
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.bytes.len() < n {
            return Err(malformed("unexpected end of input"));
        }
        let (head, rest) = self.bytes.split_at(n);
        self.bytes = rest;
        Ok(head)
    }

    fn u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    fn u32(&mut self) -> Result<u32> {
        let raw = self.take(4)?;
        Ok(u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]))
    }

    fn u64(&mut self) -> Result<u64> {
        let mut raw = [0u8; 8];
        raw.copy_from_slice(self.take(8)?);
        Ok(u64::from_le_bytes(raw))
    }

    /// A polynomial that must live exactly over `moduli` with degree `n`.
    fn poly(&mut self, moduli: &[u64], n: usize) -> Result<RnsPoly> {
        let limbs = self.u32()? as usize;
        let degree = self.u32()? as usize;
        if limbs != moduli.len() || degree != n {
            return Err(malformed("polynomial shape does not match its level"));
        }
        let mut out = Vec::with_capacity(limbs);
        for _ in 0..limbs {
            let raw = self.take(8 * n)?;
            out.push(
                raw.chunks_exact(8)
                    .map(|c| u64::from_le_bytes([c[0], c[1], c[2], c[3], c[4], c[5], c[6], c[7]]))
                    .collect(),
            );
        }
        RnsPoly::from_limbs(out, moduli).map_err(|_| malformed("coefficient out of range"))
    }

    fn switch_key(&mut self, ctx: &Context) -> Result<KeySwitchKey> {
        let expected = ctx.key_level().moduli().len().saturating_sub(1);
        let count = self.u32()? as usize;
        if count != expected {
            return Err(malformed(format!("expected {expected} key components, found {count}")));
        }
        let moduli = ctx.key_level().moduli();
        let n = ctx.poly_degree();
        let components = (0..count)
            .map(|_| Ok((self.poly(moduli, n)?, self.poly(moduli, n)?)))
            .collect::<Result<Vec<_>>>()?;
        Ok(KeySwitchKey { components })
    }

    fn done(&self) -> Result<()> {
        if self.bytes.is_empty() {
            Ok(())
        } else {
            Err(malformed(format!("{} trailing bytes", self.bytes.len())))
        }
    }
}

fn check_key_level(ctx: &Context, fingerprint: &Fingerprint) -> Result<()> {
    if *fingerprint != ctx.key_level().fingerprint() {
        return Err(malformed("key does not belong to this context"));
    }
    Ok(())
}

fn lookup_level<'c>(ctx: &'c Context, fingerprint: &Fingerprint) -> Result<&'c LevelData> {
    ctx.level(fingerprint)
        .map_err(|_| malformed("fingerprint does not belong to this context"))
}

impl ToBytes for Ciphertext {
    fn to_bytes(&self) -> Vec<u8> {
        let mut w = Writer::new(CIPHERTEXT_TAG, self.fingerprint);
        match self.scale {
            Some(s) => {
                w.u8(1);
                w.u64(s.to_bits());
            }
            None => w.u8(0),
        }
        w.u32(self.parts.len() as u32);
        for p in &self.parts {
            w.poly(p);
        }
        w.finish()
    }
}

impl FromBytes for Ciphertext {
    fn from_bytes(bytes: &[u8], ctx: &Context) -> Result<Self> {
        let (mut r, fingerprint) = Reader::open(bytes, CIPHERTEXT_TAG)?;
        let level = lookup_level(ctx, &fingerprint)?;
        let scale = match r.u8()? {
            0 => None,
            1 => Some(f64::from_bits(r.u64()?)),
            flag => return Err(malformed(format!("bad scale flag {flag}"))),
        };
        if scale.is_some() != ctx.plain_modulus().is_none() {
            return Err(malformed("scale presence does not match the scheme"));
        }
        if scale.is_some_and(|s| !s.is_finite() || s <= 0.0) {
            return Err(malformed("scale must be positive"));
        }
        let size = r.u32()?;
        if !(2..=MAX_PARTS).contains(&size) {
            return Err(malformed(format!("ciphertext size {size} out of range")));
        }
        let n = ctx.poly_degree();
        let parts = (0..size)
            .map(|_| r.poly(level.moduli(), n))
            .collect::<Result<Vec<_>>>()?;
        r.done()?;
        Ok(Ciphertext {
            parts,
            fingerprint,
            scale,
        })
    }
}

impl ToBytes for PublicKey {
    fn to_bytes(&self) -> Vec<u8> {
        let mut w = Writer::new(PUBLIC_KEY_TAG, self.fingerprint);
        w.poly(&self.b);
        w.poly(&self.a);
        w.finish()
    }
}

impl FromBytes for PublicKey {
    fn from_bytes(bytes: &[u8], ctx: &Context) -> Result<Self> {
        let (mut r, fingerprint) = Reader::open(bytes, PUBLIC_KEY_TAG)?;
        check_key_level(ctx, &fingerprint)?;
        let moduli = ctx.key_level().moduli();
        let n = ctx.poly_degree();
        let b = r.poly(moduli, n)?;
        let a = r.poly(moduli, n)?;
        r.done()?;
        Ok(PublicKey { fingerprint, b, a })
    }
}

impl ToBytes for RelinKey {
    fn to_bytes(&self) -> Vec<u8> {
        let mut w = Writer::new(RELIN_KEY_TAG, self.fingerprint);
        w.switch_key(&self.key);
        w.finish()
    }
}

impl FromBytes for RelinKey {
    fn from_bytes(bytes: &[u8], ctx: &Context) -> Result<Self> {
        let (mut r, fingerprint) = Reader::open(bytes, RELIN_KEY_TAG)?;
        check_key_level(ctx, &fingerprint)?;
        let key = r.switch_key(ctx)?;
        r.done()?;
        Ok(RelinKey { fingerprint, key })
    }
}

impl ToBytes for RotationKeys {
    fn to_bytes(&self) -> Vec<u8> {
        let mut w = Writer::new(ROTATION_KEYS_TAG, self.fingerprint);
        let elements = self.galois_elements();
        w.u32(elements.len() as u32);
        for g in elements {
            w.u64(g);
            if let Some(key) = self.keys.get(&g) {
                w.switch_key(key);
            }
        }
        w.finish()
    }
}

impl FromBytes for RotationKeys {
    fn from_bytes(bytes: &[u8], ctx: &Context) -> Result<Self> {
        let (mut r, fingerprint) = Reader::open(bytes, ROTATION_KEYS_TAG)?;
        check_key_level(ctx, &fingerprint)?;
        let two_n = 2 * ctx.poly_degree() as u64;
        let count = r.u32()?;
        let mut keys = HashMap::new();
        for _ in 0..count {
            let g = r.u64()?;
            if g % 2 == 0 || g >= two_n || g == 1 {
                return Err(malformed(format!("invalid galois element {g}")));
            }
            if keys.insert(g, r.switch_key(ctx)?).is_some() {
                return Err(malformed(format!("duplicate galois element {g}")));
            }
        }
        r.done()?;
        Ok(RotationKeys { fingerprint, keys })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encryptor::{Decryptor, Encryptor};
    use crate::evaluator::Evaluator;
    use crate::keys::KeyGenerator;
    use crate::params::{CoeffModulus, ParameterSet};
    use crate::plaintext::Plaintext;
    use crate::security::SecurityLevel;
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;
    use std::sync::Arc;

    fn context() -> Arc<Context> {
        let q = CoeffModulus::create(64, &[30, 30, 31]).unwrap();
        Context::new(ParameterSet::integer(64, q, 257), SecurityLevel::None).unwrap()
    }

    #[test]
    fn ciphertext_and_keys_survive_a_roundtrip() {
        let ctx = context();
        let mut rng = ChaCha20Rng::seed_from_u64(61);
        let keygen = KeyGenerator::new(ctx.clone(), &mut rng);
        let pk = keygen.create_public_key(&mut rng).unwrap();
        let relin = keygen.create_relin_key(&mut rng).unwrap();
        let rot = keygen.create_rotation_keys(&[1, 2], &mut rng).unwrap();

        let pk2 = PublicKey::from_bytes(&pk.to_bytes(), &ctx).unwrap();
        assert_eq!(pk2, pk);
        assert_eq!(RelinKey::from_bytes(&relin.to_bytes(), &ctx).unwrap(), relin);
        assert_eq!(RotationKeys::from_bytes(&rot.to_bytes(), &ctx).unwrap(), rot);

        let fp = ctx.first_data_level().fingerprint();
        let pt = Plaintext::from_hex_poly(&ctx, "3x^2 + 5", fp).unwrap();
        let ct = Encryptor::new(ctx.clone(), pk2).unwrap().encrypt(&pt, &mut rng).unwrap();
        let sq = Evaluator::new(ctx.clone()).square(&ct).unwrap();
        let back = Ciphertext::from_bytes(&sq.to_bytes(), &ctx).unwrap();
        assert_eq!(back, sq);
        let dec = Decryptor::new(ctx.clone(), keygen.secret_key()).unwrap();
        assert_eq!(dec.decrypt(&back).unwrap().to_hex_poly().unwrap(), "9x^4 + 1Ex^2 + 19");
    }

    #[test]
    fn malformed_streams_are_rejected() {
        let ctx = context();
        let mut rng = ChaCha20Rng::seed_from_u64(62);
        let keygen = KeyGenerator::new(ctx.clone(), &mut rng);
        let enc = Encryptor::with_secret_key(ctx.clone(), keygen.secret_key()).unwrap();
        let fp = ctx.first_data_level().fingerprint();
        let ct = enc
            .encrypt_symmetric(&Plaintext::from_coeffs(&ctx, &[1], fp).unwrap(), &mut rng)
            .unwrap();
        let bytes = ct.to_bytes();
        let is_serialization = |r: Result<Ciphertext>| matches!(r, Err(Error::Serialization(_)));

        assert!(is_serialization(Ciphertext::from_bytes(&bytes[..bytes.len() - 1], &ctx)));
        let mut tagged = bytes.clone();
        tagged[0] = b'X';
        assert!(is_serialization(Ciphertext::from_bytes(&tagged, &ctx)));
        let mut trailing = bytes.clone();
        trailing.push(0);
        assert!(is_serialization(Ciphertext::from_bytes(&trailing, &ctx)));

        let mut out_of_range = bytes.clone();
        let first_coeff = 4 + 1 + 32 + 1 + 4 + 4 + 4;
        out_of_range[first_coeff..first_coeff + 8].copy_from_slice(&u64::MAX.to_le_bytes());
        assert!(is_serialization(Ciphertext::from_bytes(&out_of_range, &ctx)));

        let q = CoeffModulus::create(64, &[30, 31]).unwrap();
        let other = Context::new(ParameterSet::integer(64, q, 257), SecurityLevel::None).unwrap();
        assert!(is_serialization(Ciphertext::from_bytes(&bytes, &other)));
        assert!(PublicKey::from_bytes(&bytes, &ctx).is_err());
    }
}
