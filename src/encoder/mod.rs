//! Encoders between application data and plaintext polynomials.

pub mod batch;
pub mod ckks;

pub use batch::BatchEncoder;
pub use ckks::CkksEncoder;
