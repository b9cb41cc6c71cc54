//! Leveled homomorphic evaluation over an RNS modulus chain.
//!
//! Two schemes share one engine: the *integer* scheme (exact arithmetic
//! modulo a plaintext modulus `t`, with optional SIMD batching) and the
//! *approximate* scheme (fixed-point complex slots with rescaling).
//!
//! A [`Context`] validates a root [`ParameterSet`] and derives the chain of
//! levels below it; every ciphertext, plaintext and key is tagged with the
//! [`Fingerprint`] of its level.

#![forbid(unsafe_code)]
#![warn(clippy::pedantic, missing_docs)]

pub mod arith;
pub mod ciphertext;
pub mod context;
pub mod crt;
pub mod encoder;
pub mod encryptor;
pub mod error;
pub mod evaluator;
pub mod keys;
pub mod ntt;
pub mod params;
pub mod plaintext;
pub mod polynomial;
pub mod sampling;
pub mod security;
pub mod serialize;

pub use ciphertext::Ciphertext;
pub use context::{Context, LevelData};
pub use encoder::{BatchEncoder, CkksEncoder};
pub use encryptor::{Decryptor, Encryptor};
pub use error::{Error, Result};
pub use evaluator::Evaluator;
pub use keys::{KeyGenerator, PublicKey, RelinKey, RotationKeys, SecretKey};
pub use params::{CoeffModulus, Fingerprint, ParameterSet, PlainModulus, SchemeType};
pub use plaintext::Plaintext;
pub use polynomial::RnsPoly;
pub use security::SecurityLevel;
pub use serialize::{FromBytes, ToBytes};
