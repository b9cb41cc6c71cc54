//! Key material: secret, public, relinearization and rotation keys.
//!
//! Key switching uses one gadget component per data prime and the special
//! prime `P` (the last root prime). Component `j` over the key-level base is
//!
//! ```text
//! b_j = -a_j·s + e_j + [P]_{q_j}·w   (the last term on limb j only)
//! ```
//!
//! so that `Σ_j [d]_{q_j}·(b_j + a_j·s) ≈ P·d·w`, and dividing by `P`
//! leaves `d·w` plus a small error.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use log::debug;
use rand::Rng;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::arith::{mod_add, mod_mul, mod_pow};
use crate::context::{Context, LevelData};
use crate::error::{Error, Result};
use crate::params::{Fingerprint, SchemeType};
use crate::polynomial::RnsPoly;
use crate::sampling::{gaussian_poly, sample_uniform, ternary_poly};

/// Ternary secret over the key-level base.
///
/// Not cloneable and never serialized; coefficients are wiped on drop.
pub struct SecretKey {
    fingerprint: Fingerprint,
    poly: RnsPoly,
}

impl SecretKey {
    /// Level the secret was sampled at.
    pub fn fingerprint(&self) -> Fingerprint {
        self.fingerprint
    }

    /// The secret reduced to the primes of `level`.
    pub(crate) fn at_level(&self, level: &LevelData) -> RnsPoly {
        let mut s = self.poly.clone();
        s.truncate_limbs(level.moduli().len());
        s
    }
}

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretKey")
            .field("fingerprint", &self.fingerprint)
            .finish_non_exhaustive()
    }
}

impl Zeroize for SecretKey {
    fn zeroize(&mut self) {
        self.poly.zeroize();
    }
}

impl Drop for SecretKey {
    fn drop(&mut self) {
        self.zeroize();
    }
}

impl ZeroizeOnDrop for SecretKey {}

/// `(b, a) = (-a·s + e, a)` at the key level.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PublicKey {
    pub(crate) fingerprint: Fingerprint,
    pub(crate) b: RnsPoly,
    pub(crate) a: RnsPoly,
}

impl PublicKey {
    /// Key level of the chain.
    pub fn fingerprint(&self) -> Fingerprint {
        self.fingerprint
    }
}

/// Gadget components `(b_j, a_j)`, one per data prime.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeySwitchKey {
    pub(crate) components: Vec<(RnsPoly, RnsPoly)>,
}

impl KeySwitchKey {
    /// Switches `d` (at `level`) from the key's target to the secret:
    /// returns `(k0, k1)` with `k0 + k1·s ≈ d·w` over the primes of `level`.
    pub(crate) fn switch(&self, ctx: &Context, level: &LevelData, d: &RnsPoly) -> Result<(RnsPoly, RnsPoly)> {
        if !ctx.key_switching_available() {
            return Err(Error::KeySwitchingUnavailable);
        }
        let digits = level.moduli().len();
        if level.is_key_level() || digits > self.components.len() {
            return Err(Error::InvalidArgument("key switching is undefined at the key level".into()));
        }
        let indices = ctx.key_base_indices(level);
        let base = indices
            .iter()
            .map(|&i| ctx.key_level().moduli()[i])
            .collect::<Vec<_>>();
        let tables = ctx.ntt_tables(&base)?;
        let n = d.degree();

        let mut acc0 = RnsPoly::zero(n, &base);
        let mut acc1 = RnsPoly::zero(n, &base);
        for (j, (b, a)) in self.components.iter().enumerate().take(digits) {
            let digit = d.extend_limb(j, &base);
            acc0 += &digit.multiply(&b.select_limbs(&indices), &tables);
            acc1 += &digit.multiply(&a.select_limbs(&indices), &tables);
        }
        acc0.divide_round_by_last()?;
        acc1.divide_round_by_last()?;
        Ok((acc0, acc1))
    }
}

/// Key-switching key from `s²` to `s`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RelinKey {
    pub(crate) fingerprint: Fingerprint,
    pub(crate) key: KeySwitchKey,
}

impl RelinKey {
    /// Key level of the chain.
    pub fn fingerprint(&self) -> Fingerprint {
        self.fingerprint
    }
}

/// Key-switching keys from `σ_g(s)` to `s`, indexed by Galois element `g`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RotationKeys {
    pub(crate) fingerprint: Fingerprint,
    pub(crate) keys: HashMap<u64, KeySwitchKey>,
}

impl RotationKeys {
    /// Key level of the chain.
    pub fn fingerprint(&self) -> Fingerprint {
        self.fingerprint
    }

    /// `true` when a key for `galois_element` is present.
    pub fn contains(&self, galois_element: u64) -> bool {
        self.keys.contains_key(&galois_element)
    }

    /// Galois elements covered, ascending.
    pub fn galois_elements(&self) -> Vec<u64> {
        let mut g: Vec<u64> = self.keys.keys().copied().collect();
        g.sort_unstable();
        g
    }

    pub(crate) fn get(&self, galois_element: u64) -> Result<&KeySwitchKey> {
        self.keys
            .get(&galois_element)
            .ok_or(Error::MissingRotationKey(galois_element))
    }

    /// Merges another key set generated for the same secret.
    pub fn extend(&mut self, other: RotationKeys) -> Result<()> {
        if other.fingerprint != self.fingerprint {
            return Err(Error::LevelMismatch);
        }
        self.keys.extend(other.keys);
        Ok(())
    }
}

/// Galois element rotating slots left by `step`: `3^step` for batched
/// integer rows, `5^step` for approximate slots, taken modulo `2N`.
pub fn galois_element_for_step(scheme: SchemeType, poly_degree: usize, step: i64) -> u64 {
    let two_n = 2 * poly_degree as u64;
    let row = (poly_degree / 2).max(1) as i64;
    let generator = match scheme {
        SchemeType::Integer => 3,
        SchemeType::Approximate => 5,
    };
    mod_pow(generator, step.rem_euclid(row) as u64, two_n)
}

/// Galois element `2N - 1`: swaps batching rows, conjugates approximate slots.
pub fn conjugation_element(poly_degree: usize) -> u64 {
    2 * poly_degree as u64 - 1
}

/// Samples a secret key and derives further keys from it on request.
pub struct KeyGenerator {
    ctx: Arc<Context>,
    secret: SecretKey,
}

impl KeyGenerator {
    /// Samples a fresh ternary secret at the key level.
    pub fn new<R: Rng>(ctx: Arc<Context>, rng: &mut R) -> Self {
        let key = ctx.key_level();
        let poly = ternary_poly(ctx.poly_degree(), key.moduli(), rng);
        let secret = SecretKey {
            fingerprint: key.fingerprint(),
            poly,
        };
        debug!("sampled secret key at {}", secret.fingerprint);
        Self { ctx, secret }
    }

    /// The sampled secret.
    pub fn secret_key(&self) -> &SecretKey {
        &self.secret
    }

    /// Encryption key `(-a·s + e, a)`.
    pub fn create_public_key<R: Rng>(&self, rng: &mut R) -> Result<PublicKey> {
        let key = self.ctx.key_level();
        let tables = self.ctx.ntt_tables(key.moduli())?;
        let n = self.ctx.poly_degree();
        let a = sample_uniform(n, key.moduli(), rng);
        let e = gaussian_poly(n, key.moduli(), rng);
        let b = &e - &a.multiply(&self.secret.poly, &tables);
        Ok(PublicKey {
            fingerprint: key.fingerprint(),
            b,
            a,
        })
    }

    /// Key switching `s²` back to `s`.
    pub fn create_relin_key<R: Rng>(&self, rng: &mut R) -> Result<RelinKey> {
        let tables = self.ctx.ntt_tables(self.ctx.key_level().moduli())?;
        let s2 = Zeroizing::new(self.secret.poly.multiply(&self.secret.poly, &tables));
        let key = self.key_switch_key(&s2, rng)?;
        debug!("created relinearization key with {} components", key.components.len());
        Ok(RelinKey {
            fingerprint: self.secret.fingerprint,
            key,
        })
    }

    /// Keys for rotating by each of `steps` (zero steps are skipped).
    pub fn create_rotation_keys<R: Rng>(&self, steps: &[i64], rng: &mut R) -> Result<RotationKeys> {
        let n = self.ctx.poly_degree();
        let elements: Vec<u64> = steps
            .iter()
            .map(|&k| galois_element_for_step(self.ctx.scheme(), n, k))
            .filter(|&g| g != 1)
            .collect();
        self.create_galois_keys(&elements, rng)
    }

    /// Key for the row swap / complex conjugation element `2N - 1`.
    pub fn create_conjugation_keys<R: Rng>(&self, rng: &mut R) -> Result<RotationKeys> {
        self.create_galois_keys(&[conjugation_element(self.ctx.poly_degree())], rng)
    }

    /// One key per odd Galois element below `2N`; duplicates are generated once.
    pub fn create_galois_keys<R: Rng>(&self, elements: &[u64], rng: &mut R) -> Result<RotationKeys> {
        let two_n = 2 * self.ctx.poly_degree() as u64;
        let mut keys = HashMap::new();
        for &g in elements {
            if g % 2 == 0 || g >= two_n {
                return Err(Error::InvalidArgument(format!("{g} is not a Galois element")));
            }
            if keys.contains_key(&g) {
                continue;
            }
            let target = Zeroizing::new(self.secret.poly.automorphism(g));
            keys.insert(g, self.key_switch_key(&target, rng)?);
        }
        debug!("created {} rotation keys", keys.len());
        Ok(RotationKeys {
            fingerprint: self.secret.fingerprint,
            keys,
        })
    }

    fn key_switch_key<R: Rng>(&self, target: &RnsPoly, rng: &mut R) -> Result<KeySwitchKey> {
        let special = self.ctx.special_prime().ok_or(Error::KeySwitchingUnavailable)?;
        let key = self.ctx.key_level();
        let moduli = key.moduli();
        let tables = self.ctx.ntt_tables(moduli)?;
        let n = self.ctx.poly_degree();

        let components = (0..moduli.len() - 1)
            .map(|j| {
                let a = sample_uniform(n, moduli, rng);
                let e = gaussian_poly(n, moduli, rng);
                let mut b = &e - &a.multiply(&self.secret.poly, &tables);
                let qj = moduli[j];
                let p_mod = special % qj;
                for (c, &w) in b.limb_mut(j).iter_mut().zip(target.limb(j)) {
                    *c = mod_add(*c, mod_mul(p_mod, w, qj), qj);
                }
                (b, a)
            })
            .collect();
        Ok(KeySwitchKey { components })
    }
}
