use std::fmt;

use ark_bls12_381::{Bls12_381, Fr, G1Affine, G1Projective, G2Affine, G2Projective};
use ark_ec::pairing::{Pairing, PairingOutput};
use ark_ec::AffineRepr;
use ark_ff::UniformRand;
use ark_serialize::CanonicalSerialize;
use rand::{CryptoRng, Rng};
use sha2::{Digest, Sha256};
use zeroize::{Zeroize, Zeroizing};

use crate::error::Result;

pub type Curve = Bls12_381;
pub type Scalar = Fr;
pub type G1 = G1Projective;
pub type G2 = G2Projective;
pub type Gt = PairingOutput<Curve>;

/// Length of the key handed to the symmetric cipher.
pub const SYMMETRIC_KEY_SIZE: usize = 32;

/// Ephemeral target-group element protected by the encapsulation scheme.
///
/// A fresh secret is sampled for every encryption. The symmetric key is the
/// SHA-256 digest of its compressed encoding. The element is wiped on drop.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionSecret(Gt);

impl SessionSecret {
    /// Sample `e(g1, g2)^z` for a uniformly random exponent `z`.
    pub fn random<R: Rng + CryptoRng>(rng: &mut R) -> Self {
        let exponent = Scalar::rand(rng);
        let base = Curve::pairing(G1Affine::generator(), G2Affine::generator());
        Self(base * exponent)
    }

    pub(crate) fn from_element(element: Gt) -> Self {
        Self(element)
    }

    pub(crate) fn element(&self) -> &Gt {
        &self.0
    }

    /// Derive the 32-byte data-encapsulation key.
    pub fn symmetric_key(&self) -> Result<Zeroizing<[u8; SYMMETRIC_KEY_SIZE]>> {
        let mut encoded = Zeroizing::new(Vec::with_capacity(self.0.compressed_size()));
        self.0.serialize_compressed(&mut *encoded)?;

        let digest = Sha256::digest(encoded.as_slice());
        let mut key = Zeroizing::new([0u8; SYMMETRIC_KEY_SIZE]);
        key.copy_from_slice(&digest[..SYMMETRIC_KEY_SIZE]);
        Ok(key)
    }
}

impl Drop for SessionSecret {
    fn drop(&mut self) {
        self.0 .0.zeroize();
    }
}

impl fmt::Debug for SessionSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SessionSecret(..)")
    }
}
