//! The modulus chain: one validated parameter set per level plus the
//! precomputation every component shares.

use std::collections::HashMap;
use std::sync::Arc;

use log::{debug, warn};
use num_traits::ToPrimitive;

use crate::arith::{bit_count, ntt_primes_below, MAX_PRIME_BITS};
use crate::crt::CrtComposer;
use crate::error::{Error, Result};
use crate::ntt::NttTables;
use crate::params::{Fingerprint, ParameterSet, SchemeType, VALID};
use crate::security::SecurityLevel;

/// Ciphertext sizes up to `2^AUX_SIZE_BITS` can be tensored with the
/// precomputed auxiliary base.
const AUX_SIZE_BITS: u32 = 4;

/// One node of the chain.
#[derive(Debug)]
pub struct LevelData {
    params: ParameterSet,
    fingerprint: Fingerprint,
    index: usize,
    is_key_level: bool,
    crt: CrtComposer,
    /// `floor(Q_l / t) mod q_i`; empty for the approximate scheme.
    delta: Vec<u64>,
    /// `Q_l mod t`; zero for the approximate scheme.
    q_mod_t: u64,
}

impl LevelData {
    fn new(params: ParameterSet, index: usize, is_key_level: bool) -> Result<Self> {
        let crt = CrtComposer::new(params.coeff_modulus())?;
        let (delta, q_mod_t) = match params.plain_modulus() {
            Some(t) => {
                let d = crt.product() / t;
                let delta = params
                    .coeff_modulus()
                    .iter()
                    .map(|&q| (&d % q).to_u64().unwrap_or_default())
                    .collect();
                (delta, (crt.product() % t).to_u64().unwrap_or_default())
            }
            None => (Vec::new(), 0),
        };
        Ok(Self {
            fingerprint: params.fingerprint(),
            params,
            index,
            is_key_level,
            crt,
            delta,
            q_mod_t,
        })
    }

    /// Parameters restricted to this level.
    pub fn params(&self) -> &ParameterSet {
        &self.params
    }

    /// Identity of this level.
    pub fn fingerprint(&self) -> Fingerprint {
        self.fingerprint
    }

    /// Position in the chain; `0` is the terminal level.
    pub fn index(&self) -> usize {
        self.index
    }

    /// `true` only for the root, which holds the special prime.
    pub fn is_key_level(&self) -> bool {
        self.is_key_level
    }

    /// Primes of this level, in chain order.
    pub fn moduli(&self) -> &[u64] {
        self.params.coeff_modulus()
    }

    /// CRT composer over the primes of this level.
    pub fn crt(&self) -> &CrtComposer {
        &self.crt
    }

    /// Bit length of the level modulus product.
    pub fn modulus_bits(&self) -> u32 {
        self.crt.bits()
    }

    pub(crate) fn delta(&self) -> &[u64] {
        &self.delta
    }

    pub(crate) fn q_mod_t(&self) -> u64 {
        self.q_mod_t
    }
}

/// Shared, immutable evaluation context.
///
/// Level `len - 1` is the key level and holds every prime; each lower
/// level drops the last remaining prime.
#[derive(Debug)]
pub struct Context {
    levels: Vec<LevelData>,
    by_fingerprint: HashMap<Fingerprint, usize>,
    ntt: HashMap<u64, NttTables>,
    aux_primes: Vec<u64>,
    security: SecurityLevel,
}

impl Context {
    /// Validates `root` and derives the chain below it.
    pub fn new(root: ParameterSet, security: SecurityLevel) -> Result<Arc<Self>> {
        root.check(security).map_err(Error::param)?;

        let mut chain = vec![root];
        while let Some(next) = chain.last().and_then(ParameterSet::drop_last_prime) {
            if next.check(security).is_err() {
                break;
            }
            chain.push(next);
        }
        chain.reverse();

        let top = chain.len() - 1;
        let levels = chain
            .into_iter()
            .enumerate()
            .map(|(i, p)| LevelData::new(p, i, i == top))
            .collect::<Result<Vec<_>>>()?;
        let by_fingerprint = levels.iter().map(|l| (l.fingerprint, l.index)).collect();

        let key = &levels[top];
        let n = key.params.poly_degree();
        let primes = key.moduli();
        if let Some((&special, rest)) = primes.split_last() {
            if rest.iter().any(|&q| q > special) {
                warn!("special prime {special} is smaller than a data prime; key switching noise grows");
            }
        }

        let aux_primes = if key.params.scheme() == SchemeType::Integer {
            let needed = key.modulus_bits() + n.trailing_zeros() + AUX_SIZE_BITS + 2;
            let count = needed.div_ceil(MAX_PRIME_BITS - 1) as usize;
            let found = ntt_primes_below(MAX_PRIME_BITS, n, count, primes);
            if found.len() < count {
                return Err(Error::param("not enough auxiliary primes for this degree"));
            }
            found
        } else {
            Vec::new()
        };

        let mut ntt = HashMap::new();
        for &q in primes.iter().chain(&aux_primes) {
            ntt.insert(q, NttTables::new(q, n)?);
        }

        debug!(
            "modulus chain built: scheme={} degree={} levels={} key={}",
            key.params.scheme(),
            n,
            levels.len(),
            key.fingerprint
        );

        Ok(Arc::new(Self {
            levels,
            by_fingerprint,
            ntt,
            aux_primes,
            security,
        }))
    }

    /// Always `"valid"`: an invalid root never produces a context.
    pub fn parameter_error_message(&self) -> &'static str {
        VALID
    }

    /// Scheme of the whole chain.
    pub fn scheme(&self) -> SchemeType {
        self.key_level().params.scheme()
    }

    /// Ring degree `N`.
    pub fn poly_degree(&self) -> usize {
        self.key_level().params.poly_degree()
    }

    /// Plaintext modulus `t`, integer scheme only.
    pub fn plain_modulus(&self) -> Option<u64> {
        self.key_level().params.plain_modulus()
    }

    /// Security level the chain was validated against.
    pub fn security(&self) -> SecurityLevel {
        self.security
    }

    /// Node with fingerprint `fp`.
    pub fn level(&self, fp: &Fingerprint) -> Result<&LevelData> {
        self.by_fingerprint
            .get(fp)
            .map(|&i| &self.levels[i])
            .ok_or(Error::UnknownLevel)
    }

    /// Node at chain position `index`.
    pub fn level_at(&self, index: usize) -> Option<&LevelData> {
        self.levels.get(index)
    }

    /// All nodes from the terminal level up to the key level.
    pub fn levels(&self) -> impl DoubleEndedIterator<Item = &LevelData> {
        self.levels.iter()
    }

    /// The root, holding every prime.
    pub fn key_level(&self) -> &LevelData {
        &self.levels[self.levels.len() - 1]
    }

    /// Highest level usable for data (the root itself when it has one prime).
    pub fn first_data_level(&self) -> &LevelData {
        &self.levels[self.levels.len().saturating_sub(2)]
    }

    /// Terminal level (index 0).
    pub fn last_level(&self) -> &LevelData {
        &self.levels[0]
    }

    /// Number of levels available to ciphertexts.
    pub fn data_level_count(&self) -> usize {
        self.levels.len().saturating_sub(1).max(1)
    }

    /// `true` when level `a` sits strictly above level `b`.
    pub fn is_higher(&self, a: &Fingerprint, b: &Fingerprint) -> Result<bool> {
        Ok(self.level(a)?.index > self.level(b)?.index)
    }

    /// The node one level below `fp`.
    pub fn next_lower(&self, fp: &Fingerprint) -> Result<&LevelData> {
        let index = self.level(fp)?.index;
        if index == 0 {
            return Err(Error::ChainExhausted);
        }
        Ok(&self.levels[index - 1])
    }

    pub(crate) fn parent(&self, level: &LevelData) -> Option<&LevelData> {
        self.levels.get(level.index + 1)
    }

    /// `true` when the root has a special prime to switch keys with.
    pub fn key_switching_available(&self) -> bool {
        self.levels.len() > 1
    }

    /// The prime present only at the key level.
    pub fn special_prime(&self) -> Option<u64> {
        if self.key_switching_available() {
            self.key_level().moduli().last().copied()
        } else {
            None
        }
    }

    /// Limb indices of the key-level polynomial forming the key-switching
    /// base of `level`: its own primes followed by the special prime.
    pub(crate) fn key_base_indices(&self, level: &LevelData) -> Vec<usize> {
        let top = self.key_level().moduli().len() - 1;
        (0..level.moduli().len()).chain(std::iter::once(top)).collect()
    }

    /// Auxiliary primes disjoint from the chain (integer scheme only).
    pub fn aux_primes(&self) -> &[u64] {
        &self.aux_primes
    }

    /// Shortest prefix of the auxiliary pool with at least `bits` bits.
    pub(crate) fn aux_base(&self, bits: u32) -> Result<&[u64]> {
        let mut total = 0;
        for (i, &p) in self.aux_primes.iter().enumerate() {
            total += bit_count(p) - 1;
            if total >= bits {
                return Ok(&self.aux_primes[..=i]);
            }
        }
        Err(Error::InvalidArgument(
            "ciphertexts are too large for the auxiliary base".into(),
        ))
    }

    /// NTT tables matching `moduli` limb by limb.
    pub(crate) fn ntt_tables(&self, moduli: &[u64]) -> Result<Vec<&NttTables>> {
        moduli
            .iter()
            .map(|q| {
                self.ntt
                    .get(q)
                    .ok_or_else(|| Error::InvalidArgument(format!("no NTT tables for {q}")))
            })
            .collect()
    }
}
