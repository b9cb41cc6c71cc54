//! Crate-wide error type.

use thiserror::Error;

/// Every fallible operation in the crate returns this error.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum Error {
    /// Root parameters (or a plaintext modulus) were rejected.
    #[error("invalid parameters: {reason}")]
    ParameterValidation {
        /// Human-readable validation message.
        reason: String,
    },

    /// Operands live at different levels of the chain.
    #[error("operands are at different levels")]
    LevelMismatch,

    /// Approximate-scheme operands carry different scales.
    #[error("operand scales differ: {left} vs {right}")]
    ScaleMismatch {
        /// Scale of the left operand.
        left: f64,
        /// Scale of the right operand.
        right: f64,
    },

    /// Level lowering was requested at the terminal level.
    #[error("modulus chain is exhausted")]
    ChainExhausted,

    /// Relinearization preconditions failed.
    #[error("relinearization failed: {0}")]
    Relinearization(&'static str),

    /// The noise budget cannot be computed for this ciphertext.
    #[error("noise budget unavailable: {0}")]
    NoiseBudget(&'static str),

    /// A level target is unknown or above the operand's level.
    #[error("invalid target level")]
    InvalidTarget,

    /// The operation is not defined for this scheme.
    #[error("operation not supported by the {0} scheme")]
    SchemeMismatch(&'static str),

    /// A caller-supplied argument is malformed.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The fingerprint does not name a level of this chain.
    #[error("fingerprint does not belong to this context")]
    UnknownLevel,

    /// No key is available for the requested Galois element.
    #[error("no rotation key for galois element {0}")]
    MissingRotationKey(u64),

    /// The chain has no special prime for key switching.
    #[error("key switching requires at least two primes in the root modulus")]
    KeySwitchingUnavailable,

    /// Encoded coefficients would not fit the level modulus.
    #[error("encoded value needs {needed} bits but only {available} are available")]
    EncodingOverflow {
        /// Bits required, guard bits included.
        needed: u32,
        /// Bit count of the level modulus.
        available: u32,
    },

    /// A byte stream could not be decoded.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl Error {
    pub(crate) fn param(reason: impl Into<String>) -> Self {
        Error::ParameterValidation {
            reason: reason.into(),
        }
    }
}

/// Shorthand used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;
