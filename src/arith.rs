//! Word-size modular arithmetic, primality and prime search.
//!
//! All moduli are odd primes of at most [`MAX_PRIME_BITS`] bits, so sums of
//! two residues never overflow a `u64` and products fit in a `u128`.

/// Largest supported bit width of a modulus prime.
pub const MAX_PRIME_BITS: u32 = 61;

/// `a + b mod q`.
#[inline]
pub fn mod_add(a: u64, b: u64, q: u64) -> u64 {
    let s = a + b;
    if s >= q {
        s - q
    } else {
        s
    }
}

/// `a - b mod q`.
#[inline]
pub fn mod_sub(a: u64, b: u64, q: u64) -> u64 {
    if a >= b {
        a - b
    } else {
        a + q - b
    }
}

/// `-a mod q`.
#[inline]
pub fn mod_neg(a: u64, q: u64) -> u64 {
    if a == 0 {
        0
    } else {
        q - a
    }
}

/// `a·b mod q` through a 128-bit product.
#[inline]
pub fn mod_mul(a: u64, b: u64, q: u64) -> u64 {
    ((u128::from(a) * u128::from(b)) % u128::from(q)) as u64
}

/// Square-and-multiply exponentiation modulo `q`.
pub fn mod_pow(mut base: u64, mut exp: u64, q: u64) -> u64 {
    let mut res = 1 % q;
    base %= q;
    while exp > 0 {
        if exp & 1 == 1 {
            res = mod_mul(res, base, q);
        }
        base = mod_mul(base, base, q);
        exp >>= 1;
    }
    res
}

/// Extended Euclid over signed 128-bit integers: returns `(g, x, y)` with
/// `a·x + b·y = g`.
pub fn extended_gcd(a: i128, b: i128) -> (i128, i128, i128) {
    if b == 0 {
        (a, 1, 0)
    } else {
        let (g, x, y) = extended_gcd(b, a % b);
        (g, y, x - (a / b) * y)
    }
}

/// Inverse of `a` modulo `q`, or `None` when `gcd(a, q) != 1`.
pub fn mod_inv(a: u64, q: u64) -> Option<u64> {
    let (g, x, _) = extended_gcd(i128::from(a % q), i128::from(q));
    if g != 1 {
        return None;
    }
    Some(x.rem_euclid(i128::from(q)) as u64)
}

/// Maps a signed value into `[0, q)`.
#[inline]
pub fn reduce_i64(v: i64, q: u64) -> u64 {
    i128::from(v).rem_euclid(i128::from(q)) as u64
}

/// Centered representative of `x mod q` in `(-q/2, q/2]`.
#[inline]
pub fn centered(x: u64, q: u64) -> i64 {
    if x > q / 2 {
        -((q - x) as i64)
    } else {
        x as i64
    }
}

/// Number of significant bits of `x` (`0` for zero).
#[inline]
pub fn bit_count(x: u64) -> u32 {
    64 - x.leading_zeros()
}

/// Reverses the lowest `bits` bits of `x`.
#[inline]
pub fn bit_reverse(x: usize, bits: u32) -> usize {
    if bits == 0 {
        return 0;
    }
    x.reverse_bits() >> (usize::BITS - bits)
}

/// Deterministic Miller–Rabin for the full `u64` range.
pub fn is_prime(n: u64) -> bool {
    const BASES: [u64; 12] = [2, 3, 5, 7, 11, 13, 17, 19, 23, 29, 31, 37];
    if n < 2 {
        return false;
    }
    for &p in &BASES {
        if n % p == 0 {
            return n == p;
        }
    }
    let mut d = n - 1;
    let mut r = 0;
    while d % 2 == 0 {
        d /= 2;
        r += 1;
    }
    'witness: for &a in &BASES {
        let mut x = mod_pow(a, d, n);
        if x == 1 || x == n - 1 {
            continue;
        }
        for _ in 1..r {
            x = mod_mul(x, x, n);
            if x == n - 1 {
                continue 'witness;
            }
        }
        return false;
    }
    true
}

/// Smallest primitive `2n`-th root of unity found by scanning `x^((q-1)/2n)`
/// for `x = 2, 3, …`. Requires `q ≡ 1 (mod 2n)` and `n` a power of two.
pub fn find_primitive_2n_root(q: u64, n: usize) -> Option<u64> {
    let two_n = 2 * n as u64;
    if q < 3 || (q - 1) % two_n != 0 {
        return None;
    }
    let cofactor = (q - 1) / two_n;
    (2..q.min(1 << 20)).find_map(|x| {
        let psi = mod_pow(x, cofactor, q);
        // psi^n == -1 makes psi a primitive 2n-th root since 2n is a power of two
        (mod_pow(psi, n as u64, q) == q - 1).then_some(psi)
    })
}

/// Walks `k·2n + 1` downward from `2^bits` and returns the first `count`
/// primes that have exactly `bits` bits and are not in `exclude`.
pub fn ntt_primes_below(bits: u32, n: usize, count: usize, exclude: &[u64]) -> Vec<u64> {
    let mut out = Vec::with_capacity(count);
    if bits < 2 || bits > MAX_PRIME_BITS || count == 0 {
        return out;
    }
    let two_n = 2 * n as u64;
    let lower = 1u64 << (bits - 1);
    let mut candidate = ((1u64 << bits) - 1) / two_n * two_n + 1;
    while candidate > lower && out.len() < count {
        if candidate < (1u64 << bits) && is_prime(candidate) && !exclude.contains(&candidate) {
            out.push(candidate);
        }
        if candidate <= two_n {
            break;
        }
        candidate -= two_n;
    }
    out
}

/// Smallest prime with exactly `bits` bits congruent to `1 (mod 2n)`,
/// skipping anything in `exclude`.
pub fn smallest_ntt_prime(bits: u32, n: usize, exclude: &[u64]) -> Option<u64> {
    if bits < 2 || bits > MAX_PRIME_BITS {
        return None;
    }
    let two_n = 2 * n as u64;
    let lower = 1u64 << (bits - 1);
    let upper = 1u64 << bits;
    let mut candidate = lower.div_ceil(two_n) * two_n + 1;
    while candidate < upper {
        if is_prime(candidate) && !exclude.contains(&candidate) {
            return Some(candidate);
        }
        candidate += two_n;
    }
    None
}
