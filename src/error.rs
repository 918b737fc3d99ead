//! Error types shared by the compiler, the schemes and the envelope.

use thiserror::Error;

use crate::policy::Comparison;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// An input was outside its documented domain.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The comparison holds for every (or no) representable value and has no
    /// boolean formula over bit markers.
    #[error("degenerate comparison: `{name} {comparison} {constant}` is constant over {bit_width}-bit values")]
    DegenerateComparison {
        name: String,
        comparison: Comparison,
        constant: u64,
        bit_width: u32,
    },

    /// The decapsulation key does not satisfy the ciphertext predicate.
    #[error("decryption denied: key does not satisfy the ciphertext predicate")]
    DecryptionDenied,

    /// The envelope or the encapsulated key could not be decoded.
    #[error("malformed ciphertext: {0}")]
    MalformedCiphertext(String),

    /// A policy string could not be parsed.
    #[error("malformed policy: {0}")]
    MalformedPolicy(String),

    #[error("hash to curve failed: {0}")]
    HashToCurve(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] ark_serialize::SerializationError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
