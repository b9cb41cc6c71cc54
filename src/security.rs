//! HomomorphicEncryption.org security tables for ternary secrets.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::params::CoeffModulus;

/// Classical security level a modulus chain must meet.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SecurityLevel {
    /// No bound is enforced.
    None,
    /// 128-bit classical security.
    #[default]
    Tc128,
    /// 192-bit classical security.
    Tc192,
    /// 256-bit classical security.
    Tc256,
}

impl SecurityLevel {
    /// `false` only for [`SecurityLevel::None`].
    pub fn is_enforced(self) -> bool {
        self != SecurityLevel::None
    }

    /// Nominal bit security, `0` when not enforced.
    pub fn bits(self) -> u32 {
        match self {
            SecurityLevel::None => 0,
            SecurityLevel::Tc128 => 128,
            SecurityLevel::Tc192 => 192,
            SecurityLevel::Tc256 => 256,
        }
    }

    /// Smallest enforced level offering at least `bits` of security.
    pub fn from_min_bits(bits: u32) -> Option<Self> {
        match bits {
            0 => Some(SecurityLevel::None),
            1..=128 => Some(SecurityLevel::Tc128),
            129..=192 => Some(SecurityLevel::Tc192),
            193..=256 => Some(SecurityLevel::Tc256),
            _ => None,
        }
    }
}

const DEGREES: [usize; 6] = [1024, 2048, 4096, 8192, 16384, 32768];

/// Largest total modulus bit count allowed for `poly_degree` at `level`.
///
/// Returns `u32::MAX` for [`SecurityLevel::None`] and `0` for a degree
/// outside the table.
pub fn max_modulus_bit_count(poly_degree: usize, level: SecurityLevel) -> u32 {
    let row: [u32; 6] = match level {
        SecurityLevel::None => return u32::MAX,
        SecurityLevel::Tc128 => [27, 54, 109, 218, 438, 881],
        SecurityLevel::Tc192 => [19, 37, 75, 152, 305, 611],
        SecurityLevel::Tc256 => [14, 29, 58, 118, 237, 476],
    };
    DEGREES
        .iter()
        .position(|&d| d == poly_degree)
        .map_or(0, |i| row[i])
}

fn default_bit_sizes(poly_degree: usize, level: SecurityLevel) -> Option<Vec<u32>> {
    let sizes: Vec<u32> = match (level, poly_degree) {
        (SecurityLevel::None | SecurityLevel::Tc128, 1024) => vec![27],
        (SecurityLevel::None | SecurityLevel::Tc128, 2048) => vec![54],
        (SecurityLevel::None | SecurityLevel::Tc128, 4096) => vec![36, 36, 37],
        (SecurityLevel::None | SecurityLevel::Tc128, 8192) => vec![43, 43, 44, 44, 44],
        (SecurityLevel::None | SecurityLevel::Tc128, 16384) => {
            [vec![48; 3], vec![49; 6]].concat()
        }
        (SecurityLevel::None | SecurityLevel::Tc128, 32768) => [vec![55; 15], vec![56]].concat(),
        (SecurityLevel::Tc192, 1024) => vec![19],
        (SecurityLevel::Tc192, 2048) => vec![37],
        (SecurityLevel::Tc192, 4096) => vec![25, 25, 25],
        (SecurityLevel::Tc192, 8192) => vec![38; 4],
        (SecurityLevel::Tc192, 16384) => [vec![50; 5], vec![55]].concat(),
        (SecurityLevel::Tc192, 32768) => [vec![55; 5], vec![56; 6]].concat(),
        (SecurityLevel::Tc256, 1024) => vec![14],
        (SecurityLevel::Tc256, 2048) => vec![29],
        (SecurityLevel::Tc256, 4096) => vec![58],
        (SecurityLevel::Tc256, 8192) => vec![39, 39, 40],
        (SecurityLevel::Tc256, 16384) => vec![47, 47, 47, 48, 48],
        (SecurityLevel::Tc256, 32768) => [vec![52], vec![53; 8]].concat(),
        _ => return None,
    };
    Some(sizes)
}

/// Default primes for `poly_degree` at `level`, the last one serving as the
/// special prime. [`SecurityLevel::None`] uses the 128-bit chain.
pub fn suggested_default_modulus_chain(poly_degree: usize, level: SecurityLevel) -> Result<Vec<u64>> {
    let sizes = default_bit_sizes(poly_degree, level).ok_or_else(|| {
        Error::InvalidArgument(format!("no default modulus chain for degree {poly_degree}"))
    })?;
    CoeffModulus::create(poly_degree, &sizes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arith::bit_count;

    #[test]
    fn table_lookups() {
        assert_eq!(max_modulus_bit_count(4096, SecurityLevel::Tc128), 109);
        assert_eq!(max_modulus_bit_count(8192, SecurityLevel::Tc192), 152);
        assert_eq!(max_modulus_bit_count(32768, SecurityLevel::Tc256), 476);
        assert_eq!(max_modulus_bit_count(512, SecurityLevel::Tc128), 0);
        assert_eq!(max_modulus_bit_count(512, SecurityLevel::None), u32::MAX);
    }

    #[test]
    fn default_chains_fit_their_bound() {
        for level in [SecurityLevel::Tc128, SecurityLevel::Tc192, SecurityLevel::Tc256] {
            for n in [1024, 2048, 4096, 8192] {
                let chain = suggested_default_modulus_chain(n, level).unwrap();
                let bits: u32 = chain.iter().map(|&q| bit_count(q)).sum();
                assert!(bits <= max_modulus_bit_count(n, level), "{n} at {level:?}");
                assert!(chain.iter().all(|&q| q % (2 * n as u64) == 1));
            }
        }
        assert_eq!(suggested_default_modulus_chain(4096, SecurityLevel::Tc128).unwrap().len(), 3);
        assert!(suggested_default_modulus_chain(100, SecurityLevel::Tc128).is_err());
    }

    #[test]
    fn min_bits_maps_to_level() {
        assert_eq!(SecurityLevel::from_min_bits(0), Some(SecurityLevel::None));
        assert_eq!(SecurityLevel::from_min_bits(100), Some(SecurityLevel::Tc128));
        assert_eq!(SecurityLevel::from_min_bits(192), Some(SecurityLevel::Tc192));
        assert_eq!(SecurityLevel::from_min_bits(300), None);
    }
}
