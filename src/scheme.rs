//! Key-encapsulation interface shared by the attribute-based schemes.

use ark_serialize::{CanonicalDeserialize, CanonicalSerialize};
use rand::{CryptoRng, Rng};

use crate::error::Result;
use crate::types::SessionSecret;

/// A predicate-based key-encapsulation mechanism.
///
/// Ciphertext-policy schemes encapsulate under a policy string and embed an
/// attribute set in the decapsulation key; key-policy schemes do the
/// opposite. The envelope only sees this trait, so both variants plug into it
/// unchanged.
pub trait EncapsulationScheme {
    type PublicKey: CanonicalSerialize + CanonicalDeserialize;
    type MasterSecretKey: CanonicalSerialize + CanonicalDeserialize;
    type DecapsulationKey: CanonicalSerialize + CanonicalDeserialize;

    /// What encryption is bound to: a policy string or an attribute list.
    type EncryptionInput: ?Sized;
    /// What a decapsulation key is bound to: the other of the two.
    type KeyInput: ?Sized;

    /// Short scheme name, also used as the encrypted file suffix.
    const NAME: &'static str;

    /// Generate a master key pair.
    fn setup<R: Rng + CryptoRng>(&self, rng: &mut R) -> (Self::PublicKey, Self::MasterSecretKey);

    /// Derive a decapsulation key for `input`.
    fn keygen<R: Rng + CryptoRng>(
        &self,
        msk: &Self::MasterSecretKey,
        mpk: &Self::PublicKey,
        input: &Self::KeyInput,
        rng: &mut R,
    ) -> Result<Self::DecapsulationKey>;

    /// Protect `secret` under `input`, returning the serialized encapsulation.
    fn encapsulate<R: Rng + CryptoRng>(
        &self,
        mpk: &Self::PublicKey,
        secret: &SessionSecret,
        input: &Self::EncryptionInput,
        rng: &mut R,
    ) -> Result<Vec<u8>>;

    /// Recover the session secret.
    ///
    /// # Returns
    /// * `Ok(Some(secret))` - the key satisfies the encapsulation's predicate
    /// * `Ok(None)` - it does not
    /// * `Err(_)` - the encapsulation could not be decoded
    fn decapsulate(
        &self,
        mpk: &Self::PublicKey,
        dk: &Self::DecapsulationKey,
        encapsulated: &[u8],
    ) -> Result<Option<SessionSecret>>;
}
