//! Predicate-based hybrid encryption on BLS12-381.
//!
//! Data is encrypted under a boolean access predicate instead of a recipient
//! key. An attribute-based key-encapsulation mechanism protects a fresh
//! session secret; AES-256-CFB, keyed by the hash of that secret, protects the
//! payload. Two schemes plug into the same envelope:
//! - [`CpAbe`]: ciphertext-policy (policy in the ciphertext, attributes in the key)
//! - [`KpAbe`]: key-policy (attributes in the ciphertext, policy in the key)
//!
//! The [`policy`] module compiles integer comparisons (`age > 17`) into
//! formulas over per-bit attributes so they can be used in either scheme.
//!
//! Design choices:
//! - Pairing group: BLS12-381 via arkworks, attributes hashed to G2
//! - Randomness is always passed in, so seeded generators give reproducible runs
//! - Payloads are streamed in cipher-block sized chunks
//! - No authentication of the payload; CFB ciphertexts are malleable
//!
//! Minimal API:
//! - setup / keygen: on the scheme, see [`EncapsulationScheme`]
//! - encrypt / decrypt: [`Envelope`]
//! - compile_comparison / compile_assignment: [`policy`]

pub mod access;
pub mod cpabe;
pub mod dem;
pub mod envelope;
pub mod error;
pub mod kpabe;
pub mod policy;
pub mod scheme;
pub mod types;
pub mod util;

pub use access::AccessTree;
pub use cpabe::CpAbe;
pub use dem::{Aes256Cfb, SymmetricCipher};
pub use envelope::{Envelope, Header};
pub use error::{Error, Result};
pub use kpabe::KpAbe;
pub use policy::{compile, compile_assignment, compile_comparison, Comparison, Direction};
pub use scheme::EncapsulationScheme;
pub use types::SessionSecret;
