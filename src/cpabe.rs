//! Ciphertext-policy attribute-based encapsulation.
//!
//! Bethencourt-Sahai-Waters (2007) construction, moved to the asymmetric
//! BLS12-381 setting. Encapsulations carry a policy; decapsulation keys carry
//! an attribute set.
//!
//! Notation (multiplicative, as in the paper):
//! - mpk = (g1, g2, h = g1^β, e(g1, g2)^α), msk = (β, g2^α)
//! - key for S: D = g2^((α + r)/β), and for each j ∈ S:
//!   D_j = g2^r · H(j)^(r_j), D'_j = g1^(r_j)
//! - encapsulation of M under T: C~ = M · e(g1, g2)^(αs), C = h^s, and for
//!   each leaf y with share q_y: C_y = g1^(q_y), C'_y = H(att(y))^(q_y)

use std::collections::HashMap;

use ark_bls12_381::{G1Affine, G2Affine};
use ark_ec::pairing::Pairing;
use ark_ec::{AffineRepr, CurveGroup};
use ark_ff::{Field, UniformRand, Zero};
use ark_serialize::{CanonicalDeserialize, CanonicalSerialize};
use rand::{CryptoRng, Rng};
use rayon::prelude::*;
use zeroize::Zeroize;

use crate::access::AccessTree;
use crate::error::{self, Error};
use crate::scheme::EncapsulationScheme;
use crate::types::{Curve, Gt, Scalar, SessionSecret};
use crate::util::{
    decode, decode_string, decode_vec, ensure_consumed, ensure_same_length, hash_attribute,
    unique_attributes,
};

/// The ciphertext-policy scheme.
#[derive(Clone, Copy, Debug, Default)]
pub struct CpAbe;

#[derive(Clone, Debug, PartialEq, Eq, CanonicalSerialize, CanonicalDeserialize)]
pub struct PublicKey {
    pub g1: G1Affine,
    pub g2: G2Affine,
    /// g1^β
    pub h: G1Affine,
    /// e(g1, g2)^α
    pub egg_alpha: Gt,
}

#[derive(Clone, CanonicalSerialize, CanonicalDeserialize)]
pub struct MasterSecretKey {
    beta: Scalar,
    g2_alpha: G2Affine,
}

impl Drop for MasterSecretKey {
    fn drop(&mut self) {
        self.beta.zeroize();
    }
}

/// Per-attribute part of a decapsulation key.
#[derive(Clone, Debug, CanonicalSerialize, CanonicalDeserialize)]
pub struct KeyComponent {
    pub attribute: String,
    pub d_j: G2Affine,
    pub d_j_prime: G1Affine,
}

#[derive(Clone, Debug, CanonicalSerialize, CanonicalDeserialize)]
pub struct DecapsulationKey {
    pub d: G2Affine,
    pub components: Vec<KeyComponent>,
}

impl DecapsulationKey {
    pub fn attributes(&self) -> impl Iterator<Item = &str> {
        self.components.iter().map(|c| c.attribute.as_str())
    }
}

#[derive(Clone, Debug, CanonicalSerialize, CanonicalDeserialize)]
struct LeafComponent {
    c_y: G1Affine,
    c_y_prime: G2Affine,
}

#[derive(Clone, Debug, CanonicalSerialize)]
struct Encapsulation {
    policy: String,
    c_tilde: Gt,
    c: G1Affine,
    /// One entry per policy leaf, depth-first.
    leaves: Vec<LeafComponent>,
}

impl Encapsulation {
    /// Decode attacker-controlled bytes. Length prefixes are checked against
    /// the remaining input before anything is allocated.
    fn decode(bytes: &[u8]) -> error::Result<Self> {
        let leaf_size = LeafComponent {
            c_y: G1Affine::zero(),
            c_y_prime: G2Affine::zero(),
        }
        .compressed_size();

        let mut input = bytes;
        let policy = decode_string(&mut input, "cpabe policy")?;
        let c_tilde = decode(&mut input, "cpabe C~")?;
        let c = decode(&mut input, "cpabe C")?;
        let leaves = decode_vec(&mut input, leaf_size, "cpabe leaf components")?;
        ensure_consumed(input, "cpabe encapsulation")?;

        Ok(Encapsulation {
            policy,
            c_tilde,
            c,
            leaves,
        })
    }
}

impl EncapsulationScheme for CpAbe {
    type PublicKey = PublicKey;
    type MasterSecretKey = MasterSecretKey;
    type DecapsulationKey = DecapsulationKey;
    type EncryptionInput = str;
    type KeyInput = [String];

    const NAME: &'static str = "cpabe";

    fn setup<R: Rng + CryptoRng>(&self, rng: &mut R) -> (PublicKey, MasterSecretKey) {
        let g1 = G1Affine::generator();
        let g2 = G2Affine::generator();

        let alpha = Scalar::rand(rng);
        let mut beta = Scalar::rand(rng);
        // β is inverted during keygen
        while beta.is_zero() {
            beta = Scalar::rand(rng);
        }

        let mpk = PublicKey {
            g1,
            g2,
            h: (g1 * beta).into_affine(),
            egg_alpha: Curve::pairing(g1, g2) * alpha,
        };
        let msk = MasterSecretKey {
            beta,
            g2_alpha: (g2 * alpha).into_affine(),
        };
        (mpk, msk)
    }

    fn keygen<R: Rng + CryptoRng>(
        &self,
        msk: &MasterSecretKey,
        mpk: &PublicKey,
        attributes: &[String],
        rng: &mut R,
    ) -> error::Result<DecapsulationKey> {
        let attributes = unique_attributes(attributes)?;
        let beta_inv = msk.beta.inverse().ok_or_else(|| {
            Error::InvalidArgument("master secret key has a zero exponent".to_string())
        })?;

        let r = Scalar::rand(rng);
        let g2_r = mpk.g2 * r;
        let d = ((g2_r + msk.g2_alpha) * beta_inv).into_affine();

        // Sample sequentially so a seeded rng gives reproducible keys.
        let blinds: Vec<Scalar> = attributes.iter().map(|_| Scalar::rand(rng)).collect();

        let components = attributes
            .par_iter()
            .zip(blinds.par_iter())
            .map(|(attribute, r_j)| {
                let h_j = hash_attribute(attribute)?;
                Ok(KeyComponent {
                    attribute: attribute.to_string(),
                    d_j: (g2_r + h_j * r_j).into_affine(),
                    d_j_prime: (mpk.g1 * r_j).into_affine(),
                })
            })
            .collect::<error::Result<Vec<_>>>()?;

        tracing::debug!(attributes = components.len(), "cpabe keygen");
        Ok(DecapsulationKey { d, components })
    }

    fn encapsulate<R: Rng + CryptoRng>(
        &self,
        mpk: &PublicKey,
        secret: &SessionSecret,
        policy: &str,
        rng: &mut R,
    ) -> error::Result<Vec<u8>> {
        let tree = AccessTree::parse(policy)?;
        let s = Scalar::rand(rng);
        let shares = tree.share(s, rng);
        let leaves = tree.leaves();

        let components = leaves
            .par_iter()
            .zip(shares.par_iter())
            .map(|(attribute, q_y)| {
                let h_y = hash_attribute(attribute)?;
                Ok(LeafComponent {
                    c_y: (mpk.g1 * q_y).into_affine(),
                    c_y_prime: (h_y * q_y).into_affine(),
                })
            })
            .collect::<error::Result<Vec<_>>>()?;

        let encapsulation = Encapsulation {
            policy: policy.to_string(),
            c_tilde: *secret.element() + mpk.egg_alpha * s,
            c: (mpk.h * s).into_affine(),
            leaves: components,
        };

        let mut bytes = Vec::with_capacity(encapsulation.compressed_size());
        encapsulation.serialize_compressed(&mut bytes)?;
        tracing::debug!(leaves = leaves.len(), bytes = bytes.len(), "cpabe encapsulate");
        Ok(bytes)
    }

    fn decapsulate(
        &self,
        _mpk: &PublicKey,
        dk: &DecapsulationKey,
        encapsulated: &[u8],
    ) -> error::Result<Option<SessionSecret>> {
        let ct = Encapsulation::decode(encapsulated)?;
        let tree = AccessTree::parse(&ct.policy)
            .map_err(|e| Error::MalformedCiphertext(e.to_string()))?;
        let leaves = tree.leaves();
        ensure_same_length(leaves.len(), ct.leaves.len(), "cpabe policy leaves")?;

        let held: HashMap<&str, &KeyComponent> = dk
            .components
            .iter()
            .map(|c| (c.attribute.as_str(), c))
            .collect();

        let Some(plan) = tree.reconstruction(|attribute| held.contains_key(attribute)) else {
            return Ok(None);
        };

        // A = Π (e(C_y, D_j) / e(D'_j, C'_y))^Δ = e(g1, g2)^(rs)
        let mut lhs: Vec<G1Affine> = Vec::with_capacity(2 * plan.len());
        let mut rhs: Vec<G2Affine> = Vec::with_capacity(2 * plan.len());
        for (index, coefficient) in plan {
            let component = held.get(leaves[index]).ok_or_else(|| {
                Error::MalformedCiphertext(format!("no key component for leaf {index}"))
            })?;
            let leaf = &ct.leaves[index];
            lhs.push((leaf.c_y * coefficient).into_affine());
            rhs.push(component.d_j);
            lhs.push((-(component.d_j_prime * coefficient)).into_affine());
            rhs.push(leaf.c_y_prime);
        }
        let a = Curve::multi_pairing(lhs, rhs);

        // e(C, D) / A = e(g1, g2)^(αs)
        let blinding = Curve::pairing(ct.c, dk.d) - a;
        Ok(Some(SessionSecret::from_element(ct.c_tilde - blinding)))
    }
}
