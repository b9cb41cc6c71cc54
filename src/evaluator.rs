//! Homomorphic evaluation.
//!
//! Every operation comes in two shapes: `op_inplace(&mut ct, ..)`, which
//! validates everything before touching its operand, and `op(&ct, ..)`,
//! which works on a copy. Operands are left unchanged on error.

use std::sync::Arc;

use log::{debug, trace};
use num_bigint::BigInt;
use num_integer::Integer;

use crate::ciphertext::Ciphertext;
use crate::context::{Context, LevelData};
use crate::crt::{reduce_bigint, CrtComposer};
use crate::encryptor::{check_shape, lift_plain, scaled_message};
use crate::error::{Error, Result};
use crate::keys::{conjugation_element, galois_element_for_step, RelinKey, RotationKeys};
use crate::ntt::NttTables;
use crate::params::{Fingerprint, SchemeType};
use crate::plaintext::{PlainData, Plaintext};
use crate::polynomial::RnsPoly;

/// Relative tolerance for treating two scales as equal.
pub const SCALE_TOLERANCE: f64 = 1e-10;

pub(crate) fn scales_match(a: f64, b: f64) -> bool {
    (a - b).abs() <= SCALE_TOLERANCE * a.abs().max(b.abs())
}

/// Stateless evaluator bound to one context.
pub struct Evaluator {
    ctx: Arc<Context>,
}

impl Evaluator {
    /// Evaluator for ciphertexts of `ctx`.
    pub fn new(ctx: Arc<Context>) -> Self {
        Self { ctx }
    }

    /// The chain this evaluator works on.
    pub fn context(&self) -> &Arc<Context> {
        &self.ctx
    }

    /// Level of a well-formed ciphertext of this context.
    fn level_of(&self, ct: &Ciphertext) -> Result<&LevelData> {
        let level = self.ctx.level(&ct.fingerprint)?;
        check_shape(level, ct).map_err(|e| Error::InvalidArgument(e.into()))?;
        if ct.scale.is_some() != (self.ctx.scheme() == SchemeType::Approximate) {
            return Err(Error::SchemeMismatch(self.ctx.scheme().name()));
        }
        Ok(level)
    }

    fn require(&self, scheme: SchemeType) -> Result<()> {
        if self.ctx.scheme() != scheme {
            return Err(Error::SchemeMismatch(self.ctx.scheme().name()));
        }
        Ok(())
    }

    /// Same level, and same scale for approximate operands.
    fn check_pair(&self, a: &Ciphertext, b: &Ciphertext) -> Result<&LevelData> {
        let level = self.level_of(a)?;
        self.level_of(b)?;
        if a.fingerprint != b.fingerprint {
            return Err(Error::LevelMismatch);
        }
        check_scales(a.scale, b.scale)?;
        Ok(level)
    }

    fn check_plain(&self, ct: &Ciphertext, plain: &Plaintext) -> Result<&LevelData> {
        let level = self.level_of(ct)?;
        if plain.scheme() != self.ctx.scheme() {
            return Err(Error::SchemeMismatch(plain.scheme().name()));
        }
        if plain.fingerprint != ct.fingerprint {
            return Err(Error::LevelMismatch);
        }
        if let PlainData::Approximate { poly, .. } = &plain.data {
            if poly.moduli() != level.moduli() {
                return Err(Error::LevelMismatch);
            }
        }
        Ok(level)
    }

    fn plain_modulus(&self) -> Result<u64> {
        self.ctx
            .plain_modulus()
            .ok_or(Error::SchemeMismatch(SchemeType::Approximate.name()))
    }

    /// Negates every part.
    pub fn negate_inplace(&self, ct: &mut Ciphertext) -> Result<()> {
        self.level_of(ct)?;
        for p in &mut ct.parts {
            let negated = -&*p;
            *p = negated;
        }
        Ok(())
    }

    /// Copying form of [`Self::negate_inplace`].
    pub fn negate(&self, ct: &Ciphertext) -> Result<Ciphertext> {
        let mut out = ct.clone();
        self.negate_inplace(&mut out)?;
        Ok(out)
    }

    /// Part-wise sum; the shorter operand is padded with zero parts.
    pub fn add_inplace(&self, a: &mut Ciphertext, b: &Ciphertext) -> Result<()> {
        self.check_pair(a, b)?;
        pad_parts(a, b.size());
        for (x, y) in a.parts.iter_mut().zip(&b.parts) {
            *x += y;
        }
        Ok(())
    }

    /// Copying form of [`Self::add_inplace`].
    pub fn add(&self, a: &Ciphertext, b: &Ciphertext) -> Result<Ciphertext> {
        let mut out = a.clone();
        self.add_inplace(&mut out, b)?;
        Ok(out)
    }

    /// Part-wise difference; the shorter operand is padded with zero parts.
    pub fn sub_inplace(&self, a: &mut Ciphertext, b: &Ciphertext) -> Result<()> {
        self.check_pair(a, b)?;
        pad_parts(a, b.size());
        for (x, y) in a.parts.iter_mut().zip(&b.parts) {
            *x -= y;
        }
        Ok(())
    }

    /// Copying form of [`Self::sub_inplace`].
    pub fn sub(&self, a: &Ciphertext, b: &Ciphertext) -> Result<Ciphertext> {
        let mut out = a.clone();
        self.sub_inplace(&mut out, b)?;
        Ok(out)
    }

    /// Sum of a non-empty slice of ciphertexts at one level.
    pub fn add_many(&self, cts: &[Ciphertext]) -> Result<Ciphertext> {
        let (first, rest) = cts
            .split_first()
            .ok_or_else(|| Error::InvalidArgument("nothing to add".into()))?;
        for ct in rest {
            self.check_pair(first, ct)?;
        }
        let mut acc = first.clone();
        for ct in rest {
            self.add_inplace(&mut acc, ct)?;
        }
        Ok(acc)
    }

    /// Adds a plaintext at the same level (and scale).
    pub fn add_plain_inplace(&self, ct: &mut Ciphertext, plain: &Plaintext) -> Result<()> {
        let delta = self.plain_term(ct, plain)?;
        ct.parts[0] += &delta;
        Ok(())
    }

    /// Copying form of [`Self::add_plain_inplace`].
    pub fn add_plain(&self, ct: &Ciphertext, plain: &Plaintext) -> Result<Ciphertext> {
        let mut out = ct.clone();
        self.add_plain_inplace(&mut out, plain)?;
        Ok(out)
    }

    /// Subtracts a plaintext at the same level (and scale).
    pub fn sub_plain_inplace(&self, ct: &mut Ciphertext, plain: &Plaintext) -> Result<()> {
        let delta = self.plain_term(ct, plain)?;
        ct.parts[0] -= &delta;
        Ok(())
    }

    /// Copying form of [`Self::sub_plain_inplace`].
    pub fn sub_plain(&self, ct: &Ciphertext, plain: &Plaintext) -> Result<Ciphertext> {
        let mut out = ct.clone();
        self.sub_plain_inplace(&mut out, plain)?;
        Ok(out)
    }

    /// The polynomial that adding `plain` contributes to `c0`.
    fn plain_term(&self, ct: &Ciphertext, plain: &Plaintext) -> Result<RnsPoly> {
        let level = self.check_plain(ct, plain)?;
        match &plain.data {
            PlainData::Integer { coeffs } => Ok(scaled_message(level, coeffs, self.plain_modulus()?)),
            PlainData::Approximate { poly, scale } => {
                check_scales(ct.scale, Some(*scale))?;
                Ok(poly.clone())
            }
        }
    }

    /// Tensor product. The result has `size(a) + size(b) - 1` parts; the
    /// approximate scale becomes the product of the operand scales.
    pub fn multiply_inplace(&self, a: &mut Ciphertext, b: &Ciphertext) -> Result<()> {
        let level = self.level_of(a)?;
        self.level_of(b)?;
        if a.fingerprint != b.fingerprint {
            return Err(Error::LevelMismatch);
        }
        let parts = match (a.scale, b.scale) {
            (Some(sa), Some(sb)) => {
                let tables = self.ctx.ntt_tables(level.moduli())?;
                let parts = tensor(&a.parts, &b.parts, &tables);
                a.scale = Some(sa * sb);
                parts
            }
            _ => self.integer_tensor(level, &a.parts, &b.parts)?,
        };
        trace!("multiply at level {}: size {}", level.index(), parts.len());
        a.parts = parts;
        Ok(())
    }

    /// Copying form of [`Self::multiply_inplace`].
    pub fn multiply(&self, a: &Ciphertext, b: &Ciphertext) -> Result<Ciphertext> {
        let mut out = a.clone();
        self.multiply_inplace(&mut out, b)?;
        Ok(out)
    }

    /// Multiplies a ciphertext by itself.
    pub fn square_inplace(&self, ct: &mut Ciphertext) -> Result<()> {
        let copy = ct.clone();
        self.multiply_inplace(ct, &copy)
    }

    /// Copying form of [`Self::square_inplace`].
    pub fn square(&self, ct: &Ciphertext) -> Result<Ciphertext> {
        self.multiply(ct, ct)
    }

    /// Integer tensor: lift to `Q ∪ B` with centered residues, convolve,
    /// then `round(t·x / Q)` per coefficient back into `Q`.
    fn integer_tensor(&self, level: &LevelData, a: &[RnsPoly], b: &[RnsPoly]) -> Result<Vec<RnsPoly>> {
        let t = self.plain_modulus()?;
        let n = self.ctx.poly_degree();
        let terms = a.len().min(b.len()) as u32;
        let size_bits = u32::BITS - (terms.max(1) - 1).leading_zeros();
        let aux = self
            .ctx
            .aux_base(level.modulus_bits() + n.trailing_zeros() + size_bits + 2)?;

        let full: Vec<u64> = level.moduli().iter().chain(aux).copied().collect();
        let tables = self.ctx.ntt_tables(&full)?;
        let lift = |parts: &[RnsPoly]| {
            parts
                .iter()
                .map(|p| extend_centered(level.crt(), p, aux))
                .collect::<Result<Vec<_>>>()
        };
        let wide = tensor(&lift(a)?, &lift(b)?, &tables);

        let full_crt = CrtComposer::new(&full)?;
        let q = BigInt::from(level.crt().product().clone());
        let two_q = &q << 1u32;
        let two_t = BigInt::from(2 * t);
        wide.iter()
            .map(|p| {
                let mut limbs = vec![Vec::with_capacity(n); level.moduli().len()];
                for j in 0..n {
                    let x = full_crt.compose_centered(p.limbs().iter().map(|limb| limb[j]));
                    let y = (x * &two_t + &q).div_floor(&two_q);
                    for (limb, r) in limbs.iter_mut().zip(reduce_bigint(&y, level.moduli())) {
                        limb.push(r);
                    }
                }
                RnsPoly::from_limbs(limbs, level.moduli())
            })
            .collect()
    }

    /// Plaintext product: scales multiply for the approximate scheme, and
    /// integer plaintexts are used with centered coefficients.
    pub fn multiply_plain_inplace(&self, ct: &mut Ciphertext, plain: &Plaintext) -> Result<()> {
        let level = self.check_plain(ct, plain)?;
        let tables = self.ctx.ntt_tables(level.moduli())?;
        let (factor, scale) = match &plain.data {
            PlainData::Integer { coeffs } => (lift_plain(level, coeffs, self.plain_modulus()?), None),
            PlainData::Approximate { poly, scale } => (poly.clone(), Some(*scale)),
        };
        for p in &mut ct.parts {
            *p = p.multiply(&factor, &tables);
        }
        if let (Some(s), Some(f)) = (ct.scale, scale) {
            ct.scale = Some(s * f);
        }
        Ok(())
    }

    /// Copying form of [`Self::multiply_plain_inplace`].
    pub fn multiply_plain(&self, ct: &Ciphertext, plain: &Plaintext) -> Result<Ciphertext> {
        let mut out = ct.clone();
        self.multiply_plain_inplace(&mut out, plain)?;
        Ok(out)
    }

    /// Multiplies by an integer constant without consuming a level; the
    /// approximate scale is unchanged.
    pub fn multiply_const_inplace(&self, ct: &mut Ciphertext, k: i64) -> Result<()> {
        self.level_of(ct)?;
        for p in &mut ct.parts {
            p.mul_small_assign(k);
        }
        Ok(())
    }

    /// Copying form of [`Self::multiply_const_inplace`].
    pub fn multiply_const(&self, ct: &Ciphertext, k: i64) -> Result<Ciphertext> {
        let mut out = ct.clone();
        self.multiply_const_inplace(&mut out, k)?;
        Ok(out)
    }

    /// One link of a product chain: the higher operand is mod-switched down
    /// to the other's level, then the product is relinearized and, for the
    /// approximate scheme, rescaled.
    fn chained_product(&self, acc: &mut Ciphertext, other: &Ciphertext, relin: &RelinKey) -> Result<()> {
        let mine = self.level_of(acc)?.index();
        let theirs = self.level_of(other)?.index();
        let mut rhs = other.clone();
        if mine > theirs {
            self.mod_switch_to_inplace(acc, other.fingerprint)?;
        } else if theirs > mine {
            self.mod_switch_to_inplace(&mut rhs, acc.fingerprint)?;
        }
        self.multiply_inplace(acc, &rhs)?;
        self.relinearize_inplace(acc, relin)?;
        if self.ctx.scheme() == SchemeType::Approximate {
            self.rescale_to_next_inplace(acc)?;
        }
        Ok(())
    }

    /// Product of all operands as a balanced tree. Every product is
    /// relinearized; approximate products are also rescaled, so the chain
    /// must have `ceil(log2(len))` levels below the operands.
    pub fn multiply_many(&self, cts: &[Ciphertext], relin: &RelinKey) -> Result<Ciphertext> {
        let (first, rest) = cts
            .split_first()
            .ok_or_else(|| Error::InvalidArgument("nothing to multiply".into()))?;
        self.level_of(first)?;
        for ct in rest {
            self.level_of(ct)?;
            if ct.fingerprint != first.fingerprint {
                return Err(Error::LevelMismatch);
            }
        }
        let mut layer = cts.to_vec();
        while layer.len() > 1 {
            let mut next = Vec::with_capacity(layer.len().div_ceil(2));
            let mut it = layer.into_iter();
            while let Some(mut a) = it.next() {
                if let Some(b) = it.next() {
                    self.chained_product(&mut a, &b, relin)?;
                }
                next.push(a);
            }
            layer = next;
        }
        layer
            .pop()
            .ok_or_else(|| Error::InvalidArgument("nothing to multiply".into()))
    }

    /// `ct^exponent` by square-and-multiply over the exponent's bits, low bit
    /// first. Each squaring and each accumulation is a chained product, so
    /// approximate ciphertexts spend one level per step and fail with
    /// [`Error::ChainExhausted`] when the chain is too short.
    pub fn exponentiate_inplace(&self, ct: &mut Ciphertext, exponent: u64, relin: &RelinKey) -> Result<()> {
        self.level_of(ct)?;
        if exponent == 0 {
            return Err(Error::InvalidArgument("exponent must be positive".into()));
        }
        let mut base = ct.clone();
        let mut acc: Option<Ciphertext> = None;
        let mut e = exponent;
        loop {
            if e & 1 == 1 {
                acc = Some(match acc {
                    None => base.clone(),
                    Some(mut a) => {
                        self.chained_product(&mut a, &base, relin)?;
                        a
                    }
                });
            }
            e >>= 1;
            if e == 0 {
                break;
            }
            let copy = base.clone();
            self.chained_product(&mut base, &copy, relin)?;
        }
        if let Some(result) = acc {
            *ct = result;
        }
        Ok(())
    }

    /// Copying form of [`Self::exponentiate_inplace`].
    pub fn exponentiate(&self, ct: &Ciphertext, exponent: u64, relin: &RelinKey) -> Result<Ciphertext> {
        let mut out = ct.clone();
        self.exponentiate_inplace(&mut out, exponent, relin)?;
        Ok(out)
    }

    /// Brings a ciphertext of any size back to two parts, one key switch per
    /// extra part.
    pub fn relinearize_inplace(&self, ct: &mut Ciphertext, relin: &RelinKey) -> Result<()> {
        if relin.fingerprint != self.ctx.key_level().fingerprint() {
            return Err(Error::Relinearization("key was not generated for this chain"));
        }
        let level = self.level_of(ct)?;
        if ct.size() < 3 {
            return Err(Error::Relinearization("ciphertext size must be at least 3"));
        }
        if level.is_key_level() {
            return Err(Error::Relinearization("cannot relinearize at the key level"));
        }
        let mut parts = ct.parts.clone();
        while parts.len() > 2 {
            let last = parts
                .pop()
                .ok_or(Error::Relinearization("ciphertext size must be at least 3"))?;
            let (k0, k1) = relin.key.switch(&self.ctx, level, &last)?;
            let m = parts.len();
            parts[m - 2] += &k0;
            parts[m - 1] += &k1;
        }
        trace!("relinearized {} parts at level {}", ct.size(), level.index());
        ct.parts = parts;
        Ok(())
    }

    /// Copying form of [`Self::relinearize_inplace`].
    pub fn relinearize(&self, ct: &Ciphertext, relin: &RelinKey) -> Result<Ciphertext> {
        let mut out = ct.clone();
        self.relinearize_inplace(&mut out, relin)?;
        Ok(out)
    }

    /// Drops one prime. Integer ciphertexts are scaled down by it (noise
    /// shrinks with `Q`); approximate ones keep value and scale.
    pub fn mod_switch_to_next_inplace(&self, ct: &mut Ciphertext) -> Result<()> {
        let level = self.level_of(ct)?;
        let next = self.ctx.next_lower(&ct.fingerprint)?;
        let parts = match self.ctx.scheme() {
            SchemeType::Integer => divide_parts(&ct.parts)?,
            SchemeType::Approximate => ct
                .parts
                .iter()
                .map(|p| {
                    let mut p = p.clone();
                    p.truncate_limbs(next.moduli().len());
                    p
                })
                .collect(),
        };
        debug!("mod switch {} -> {}", level.index(), next.index());
        ct.parts = parts;
        ct.fingerprint = next.fingerprint();
        Ok(())
    }

    /// Copying form of [`Self::mod_switch_to_next_inplace`].
    pub fn mod_switch_to_next(&self, ct: &Ciphertext) -> Result<Ciphertext> {
        let mut out = ct.clone();
        self.mod_switch_to_next_inplace(&mut out)?;
        Ok(out)
    }

    /// Repeated single steps down to `target`; equal levels are a no-op.
    pub fn mod_switch_to_inplace(&self, ct: &mut Ciphertext, target: Fingerprint) -> Result<()> {
        self.level_of(ct)?;
        let steps = self.steps_to(ct.fingerprint, target)?;
        let mut work = ct.clone();
        for _ in 0..steps {
            self.mod_switch_to_next_inplace(&mut work)?;
        }
        *ct = work;
        Ok(())
    }

    /// Copying form of [`Self::mod_switch_to_inplace`].
    pub fn mod_switch_to(&self, ct: &Ciphertext, target: Fingerprint) -> Result<Ciphertext> {
        let mut out = ct.clone();
        self.mod_switch_to_inplace(&mut out, target)?;
        Ok(out)
    }

    /// Divides by the dropped prime `q` and the scale by exactly `q`.
    pub fn rescale_to_next_inplace(&self, ct: &mut Ciphertext) -> Result<()> {
        self.require(SchemeType::Approximate)?;
        let level = self.level_of(ct)?;
        let next = self.ctx.next_lower(&ct.fingerprint)?;
        let dropped = level.moduli()[level.moduli().len() - 1];
        let parts = divide_parts(&ct.parts)?;
        debug!("rescale {} -> {} by {dropped}", level.index(), next.index());
        ct.parts = parts;
        ct.fingerprint = next.fingerprint();
        ct.scale = ct.scale.map(|s| s / dropped as f64);
        Ok(())
    }

    /// Copying form of [`Self::rescale_to_next_inplace`].
    pub fn rescale_to_next(&self, ct: &Ciphertext) -> Result<Ciphertext> {
        let mut out = ct.clone();
        self.rescale_to_next_inplace(&mut out)?;
        Ok(out)
    }

    /// Rescales repeatedly down to `target`.
    pub fn rescale_to_inplace(&self, ct: &mut Ciphertext, target: Fingerprint) -> Result<()> {
        self.require(SchemeType::Approximate)?;
        self.level_of(ct)?;
        let steps = self.steps_to(ct.fingerprint, target)?;
        let mut work = ct.clone();
        for _ in 0..steps {
            self.rescale_to_next_inplace(&mut work)?;
        }
        *ct = work;
        Ok(())
    }

    /// Copying form of [`Self::rescale_to_inplace`].
    pub fn rescale_to(&self, ct: &Ciphertext, target: Fingerprint) -> Result<Ciphertext> {
        let mut out = ct.clone();
        self.rescale_to_inplace(&mut out, target)?;
        Ok(out)
    }

    /// Retargets a plaintext one level down; approximate plaintexts lose
    /// their last limb, integer ones only change level.
    pub fn mod_switch_plain_to_next_inplace(&self, plain: &mut Plaintext) -> Result<()> {
        let next = self.ctx.next_lower(&plain.fingerprint)?;
        if let PlainData::Approximate { poly, .. } = &mut plain.data {
            poly.truncate_limbs(next.moduli().len());
        }
        plain.fingerprint = next.fingerprint();
        Ok(())
    }

    /// Copying form of [`Self::mod_switch_plain_to_next_inplace`].
    pub fn mod_switch_plain_to_next(&self, plain: &Plaintext) -> Result<Plaintext> {
        let mut out = plain.clone();
        self.mod_switch_plain_to_next_inplace(&mut out)?;
        Ok(out)
    }

    /// Lowers a plaintext to `target`.
    pub fn mod_switch_plain_to_inplace(&self, plain: &mut Plaintext, target: Fingerprint) -> Result<()> {
        let steps = self.steps_to(plain.fingerprint, target)?;
        for _ in 0..steps {
            self.mod_switch_plain_to_next_inplace(plain)?;
        }
        Ok(())
    }

    /// Copying form of [`Self::mod_switch_plain_to_inplace`].
    pub fn mod_switch_plain_to(&self, plain: &Plaintext, target: Fingerprint) -> Result<Plaintext> {
        let mut out = plain.clone();
        self.mod_switch_plain_to_inplace(&mut out, target)?;
        Ok(out)
    }

    /// Levels between `from` and a `target` at or below it.
    fn steps_to(&self, from: Fingerprint, target: Fingerprint) -> Result<usize> {
        let current = self.ctx.level(&from)?.index();
        let target = self.ctx.level(&target).map_err(|_| Error::InvalidTarget)?.index();
        current.checked_sub(target).ok_or(Error::InvalidTarget)
    }

    /// Rotates both batching rows left by `steps` (negative rotates right).
    pub fn rotate_rows_inplace(&self, ct: &mut Ciphertext, steps: i64, keys: &RotationKeys) -> Result<()> {
        self.require(SchemeType::Integer)?;
        let g = galois_element_for_step(SchemeType::Integer, self.ctx.poly_degree(), steps);
        self.apply_galois_inplace(ct, g, keys)
    }

    /// Copying form of [`Self::rotate_rows_inplace`].
    pub fn rotate_rows(&self, ct: &Ciphertext, steps: i64, keys: &RotationKeys) -> Result<Ciphertext> {
        let mut out = ct.clone();
        self.rotate_rows_inplace(&mut out, steps, keys)?;
        Ok(out)
    }

    /// Swaps the two batching rows.
    pub fn rotate_columns_inplace(&self, ct: &mut Ciphertext, keys: &RotationKeys) -> Result<()> {
        self.require(SchemeType::Integer)?;
        self.apply_galois_inplace(ct, conjugation_element(self.ctx.poly_degree()), keys)
    }

    /// Copying form of [`Self::rotate_columns_inplace`].
    pub fn rotate_columns(&self, ct: &Ciphertext, keys: &RotationKeys) -> Result<Ciphertext> {
        let mut out = ct.clone();
        self.rotate_columns_inplace(&mut out, keys)?;
        Ok(out)
    }

    /// Rotates the approximate slot vector left by `steps`.
    pub fn rotate_vector_inplace(&self, ct: &mut Ciphertext, steps: i64, keys: &RotationKeys) -> Result<()> {
        self.require(SchemeType::Approximate)?;
        let g = galois_element_for_step(SchemeType::Approximate, self.ctx.poly_degree(), steps);
        self.apply_galois_inplace(ct, g, keys)
    }

    /// Copying form of [`Self::rotate_vector_inplace`].
    pub fn rotate_vector(&self, ct: &Ciphertext, steps: i64, keys: &RotationKeys) -> Result<Ciphertext> {
        let mut out = ct.clone();
        self.rotate_vector_inplace(&mut out, steps, keys)?;
        Ok(out)
    }

    /// Conjugates every approximate slot.
    pub fn complex_conjugate_inplace(&self, ct: &mut Ciphertext, keys: &RotationKeys) -> Result<()> {
        self.require(SchemeType::Approximate)?;
        self.apply_galois_inplace(ct, conjugation_element(self.ctx.poly_degree()), keys)
    }

    /// Copying form of [`Self::complex_conjugate_inplace`].
    pub fn complex_conjugate(&self, ct: &Ciphertext, keys: &RotationKeys) -> Result<Ciphertext> {
        let mut out = ct.clone();
        self.complex_conjugate_inplace(&mut out, keys)?;
        Ok(out)
    }

    /// Applies `X → X^g` and switches the result back to the secret key.
    /// `g = 1` is the identity and needs no key.
    pub fn apply_galois_inplace(&self, ct: &mut Ciphertext, galois_element: u64, keys: &RotationKeys) -> Result<()> {
        let level = self.level_of(ct)?;
        if galois_element == 1 {
            return Ok(());
        }
        if keys.fingerprint != self.ctx.key_level().fingerprint() {
            return Err(Error::LevelMismatch);
        }
        if ct.size() != 2 {
            return Err(Error::InvalidArgument("rotation needs a relinearized ciphertext".into()));
        }
        if level.is_key_level() {
            return Err(Error::KeySwitchingUnavailable);
        }
        let key = keys.get(galois_element)?;
        let c1 = ct.parts[1].automorphism(galois_element);
        let (k0, k1) = key.switch(&self.ctx, level, &c1)?;
        let mut c0 = ct.parts[0].automorphism(galois_element);
        c0 += &k0;
        trace!("galois {galois_element} at level {}", level.index());
        ct.parts = vec![c0, k1];
        Ok(())
    }

    /// Copying form of [`Self::apply_galois_inplace`].
    pub fn apply_galois(&self, ct: &Ciphertext, galois_element: u64, keys: &RotationKeys) -> Result<Ciphertext> {
        let mut out = ct.clone();
        self.apply_galois_inplace(&mut out, galois_element, keys)?;
        Ok(out)
    }
}

fn check_scales(a: Option<f64>, b: Option<f64>) -> Result<()> {
    match (a, b) {
        (Some(left), Some(right)) if !scales_match(left, right) => Err(Error::ScaleMismatch { left, right }),
        _ => Ok(()),
    }
}

fn pad_parts(ct: &mut Ciphertext, size: usize) {
    if ct.parts.len() < size {
        let zero = RnsPoly::zero(ct.parts[0].degree(), ct.parts[0].moduli());
        ct.parts.resize(size, zero);
    }
}

fn divide_parts(parts: &[RnsPoly]) -> Result<Vec<RnsPoly>> {
    parts
        .iter()
        .map(|p| {
            let mut p = p.clone();
            p.divide_round_by_last()?;
            Ok(p)
        })
        .collect()
}

/// `out[k] = Σ_{i+j=k} a_i·b_j`.
fn tensor(a: &[RnsPoly], b: &[RnsPoly], tables: &[&NttTables]) -> Vec<RnsPoly> {
    let n = a[0].degree();
    let mut out = vec![RnsPoly::zero(n, a[0].moduli()); a.len() + b.len() - 1];
    for (i, x) in a.iter().enumerate() {
        for (j, y) in b.iter().enumerate() {
            out[i + j] += &x.multiply(y, tables);
        }
    }
    out
}

/// Appends residues modulo `aux` of each coefficient's centered value.
fn extend_centered(crt: &CrtComposer, p: &RnsPoly, aux: &[u64]) -> Result<RnsPoly> {
    let n = p.degree();
    let mut extra = vec![Vec::with_capacity(n); aux.len()];
    for j in 0..n {
        let v = crt.compose_centered(p.limbs().iter().map(|limb| limb[j]));
        for (limb, r) in extra.iter_mut().zip(reduce_bigint(&v, aux)) {
            limb.push(r);
        }
    }
    let mut limbs = p.limbs().to_vec();
    limbs.extend(extra);
    let moduli: Vec<u64> = p.moduli().iter().chain(aux).copied().collect();
    RnsPoly::from_limbs(limbs, &moduli)
}
