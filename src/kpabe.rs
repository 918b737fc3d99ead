//! Key-policy attribute-based encapsulation.
//!
//! Large-universe variant of Goyal-Pandey-Sahai-Waters (2006) with attributes
//! hashed onto G2. Decapsulation keys carry a policy; encapsulations carry an
//! attribute set.
//!
//! - mpk = (g1, g2, Y = e(g1, g2)^α), msk = α
//! - key for policy T with shares λ_x of α: D_x = g2^(λ_x) · H(att(x))^(r_x),
//!   R_x = g1^(r_x)
//! - encapsulation of M under S: E' = M · Y^s, E'' = g1^s, E_i = H(i)^s

use std::collections::HashMap;

use ark_bls12_381::{G1Affine, G2Affine};
use ark_ec::pairing::Pairing;
use ark_ec::{AffineRepr, CurveGroup};
use ark_ff::UniformRand;
use ark_serialize::{CanonicalDeserialize, CanonicalSerialize};
use rand::{CryptoRng, Rng};
use rayon::prelude::*;
use zeroize::Zeroize;

use crate::access::AccessTree;
use crate::error::{self, Error};
use crate::scheme::EncapsulationScheme;
use crate::types::{Curve, Gt, Scalar, SessionSecret};
use crate::util::{
    decode, decode_length, decode_string, decode_vec, ensure_consumed, ensure_same_length,
    hash_attribute, unique_attributes,
};

/// The key-policy scheme.
#[derive(Clone, Copy, Debug, Default)]
pub struct KpAbe;

#[derive(Clone, Debug, PartialEq, Eq, CanonicalSerialize, CanonicalDeserialize)]
pub struct PublicKey {
    pub g1: G1Affine,
    pub g2: G2Affine,
    /// e(g1, g2)^α
    pub y: Gt,
}

#[derive(Clone, CanonicalSerialize, CanonicalDeserialize)]
pub struct MasterSecretKey {
    alpha: Scalar,
}

impl Drop for MasterSecretKey {
    fn drop(&mut self) {
        self.alpha.zeroize();
    }
}

#[derive(Clone, Debug, CanonicalSerialize, CanonicalDeserialize)]
pub struct KeyLeaf {
    pub d: G2Affine,
    pub r: G1Affine,
}

#[derive(Clone, Debug, CanonicalSerialize, CanonicalDeserialize)]
pub struct DecapsulationKey {
    pub policy: String,
    /// One entry per policy leaf, depth-first.
    pub leaves: Vec<KeyLeaf>,
}

#[derive(Clone, Debug, CanonicalSerialize)]
struct Encapsulation {
    attributes: Vec<String>,
    e_prime: Gt,
    e_dprime: G1Affine,
    /// H(i)^s, aligned with `attributes`
    components: Vec<G2Affine>,
}

impl Encapsulation {
    /// Decode attacker-controlled bytes with every length prefix bounded by
    /// the input that is left.
    fn decode(bytes: &[u8]) -> error::Result<Self> {
        let mut input = bytes;

        // Each attribute costs at least its own u64 length prefix.
        let count = decode_length(&mut input, 8, "kpabe attributes")?;
        let attributes = (0..count)
            .map(|_| decode_string(&mut input, "kpabe attribute"))
            .collect::<error::Result<Vec<_>>>()?;
        let e_prime = decode(&mut input, "kpabe E'")?;
        let e_dprime = decode(&mut input, "kpabe E''")?;
        let point_size = G2Affine::zero().compressed_size();
        let components = decode_vec(&mut input, point_size, "kpabe components")?;
        ensure_consumed(input, "kpabe encapsulation")?;

        Ok(Encapsulation {
            attributes,
            e_prime,
            e_dprime,
            components,
        })
    }
}

impl EncapsulationScheme for KpAbe {
    type PublicKey = PublicKey;
    type MasterSecretKey = MasterSecretKey;
    type DecapsulationKey = DecapsulationKey;
    type EncryptionInput = [String];
    type KeyInput = str;

    const NAME: &'static str = "kpabe";

    fn setup<R: Rng + CryptoRng>(&self, rng: &mut R) -> (PublicKey, MasterSecretKey) {
        let g1 = G1Affine::generator();
        let g2 = G2Affine::generator();
        let alpha = Scalar::rand(rng);

        let mpk = PublicKey {
            g1,
            g2,
            y: Curve::pairing(g1, g2) * alpha,
        };
        (mpk, MasterSecretKey { alpha })
    }

    fn keygen<R: Rng + CryptoRng>(
        &self,
        msk: &MasterSecretKey,
        mpk: &PublicKey,
        policy: &str,
        rng: &mut R,
    ) -> error::Result<DecapsulationKey> {
        let tree = AccessTree::parse(policy)?;
        let shares = tree.share(msk.alpha, rng);
        let blinds: Vec<Scalar> = shares.iter().map(|_| Scalar::rand(rng)).collect();
        let leaves = tree.leaves();

        let key_leaves = leaves
            .par_iter()
            .zip(shares.par_iter().zip(blinds.par_iter()))
            .map(|(attribute, (lambda, r_x))| {
                let h_x = hash_attribute(attribute)?;
                Ok(KeyLeaf {
                    d: (mpk.g2 * lambda + h_x * r_x).into_affine(),
                    r: (mpk.g1 * r_x).into_affine(),
                })
            })
            .collect::<error::Result<Vec<_>>>()?;

        tracing::debug!(leaves = key_leaves.len(), "kpabe keygen");
        Ok(DecapsulationKey {
            policy: policy.to_string(),
            leaves: key_leaves,
        })
    }

    fn encapsulate<R: Rng + CryptoRng>(
        &self,
        mpk: &PublicKey,
        secret: &SessionSecret,
        attributes: &[String],
        rng: &mut R,
    ) -> error::Result<Vec<u8>> {
        let attributes = unique_attributes(attributes)?;
        let s = Scalar::rand(rng);

        let components = attributes
            .par_iter()
            .map(|attribute| Ok((hash_attribute(attribute)? * s).into_affine()))
            .collect::<error::Result<Vec<_>>>()?;

        let encapsulation = Encapsulation {
            attributes: attributes.iter().map(|a| a.to_string()).collect(),
            e_prime: *secret.element() + mpk.y * s,
            e_dprime: (mpk.g1 * s).into_affine(),
            components,
        };

        let mut bytes = Vec::with_capacity(encapsulation.compressed_size());
        encapsulation.serialize_compressed(&mut bytes)?;
        tracing::debug!(
            attributes = encapsulation.attributes.len(),
            bytes = bytes.len(),
            "kpabe encapsulate"
        );
        Ok(bytes)
    }

    fn decapsulate(
        &self,
        _mpk: &PublicKey,
        dk: &DecapsulationKey,
        encapsulated: &[u8],
    ) -> error::Result<Option<SessionSecret>> {
        let ct = Encapsulation::decode(encapsulated)?;
        ensure_same_length(ct.attributes.len(), ct.components.len(), "kpabe attributes")?;

        let tree = AccessTree::parse(&dk.policy)?;
        let leaves = tree.leaves();
        if leaves.len() != dk.leaves.len() {
            return Err(Error::InvalidArgument(format!(
                "decapsulation key has {} leaf components for a {}-leaf policy",
                dk.leaves.len(),
                leaves.len()
            )));
        }

        let carried: HashMap<&str, &G2Affine> = ct
            .attributes
            .iter()
            .map(String::as_str)
            .zip(ct.components.iter())
            .collect();

        let Some(plan) = tree.reconstruction(|attribute| carried.contains_key(attribute)) else {
            return Ok(None);
        };

        // Y^s = Π (e(E'', D_x) / e(R_x, E_i))^Δ
        let mut lhs: Vec<G1Affine> = Vec::with_capacity(2 * plan.len());
        let mut rhs: Vec<G2Affine> = Vec::with_capacity(2 * plan.len());
        for (index, coefficient) in plan {
            let e_i = carried.get(leaves[index]).ok_or_else(|| {
                Error::MalformedCiphertext(format!("no component for attribute {}", leaves[index]))
            })?;
            let key_leaf = &dk.leaves[index];
            lhs.push((ct.e_dprime * coefficient).into_affine());
            rhs.push(key_leaf.d);
            lhs.push((-(key_leaf.r * coefficient)).into_affine());
            rhs.push(**e_i);
        }
        let blinding = Curve::multi_pairing(lhs, rhs);

        Ok(Some(SessionSecret::from_element(ct.e_prime - blinding)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use ark_std::rand::SeedableRng;

    fn attributes(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn satisfying_attributes_recover_secret() {
        let mut rng = StdRng::seed_from_u64(42);
        let scheme = KpAbe;
        let (mpk, msk) = scheme.setup(&mut rng);
        let dk = scheme
            .keygen(&msk, &mpk, "(one and two) or three", &mut rng)
            .unwrap();

        let secret = SessionSecret::random(&mut rng);
        let encapsulated = scheme
            .encapsulate(&mpk, &secret, &attributes(&["one", "two", "four"]), &mut rng)
            .unwrap();
        assert_eq!(
            scheme.decapsulate(&mpk, &dk, &encapsulated).unwrap(),
            Some(secret)
        );
    }

    #[test]
    fn unsatisfying_attributes_are_denied() {
        let mut rng = StdRng::seed_from_u64(43);
        let scheme = KpAbe;
        let (mpk, msk) = scheme.setup(&mut rng);
        let dk = scheme.keygen(&msk, &mpk, "one and two", &mut rng).unwrap();

        let secret = SessionSecret::random(&mut rng);
        let encapsulated = scheme
            .encapsulate(&mpk, &secret, &attributes(&["one", "three"]), &mut rng)
            .unwrap();
        assert_eq!(scheme.decapsulate(&mpk, &dk, &encapsulated).unwrap(), None);
    }

    #[test]
    fn key_with_wrong_leaf_count_is_rejected() {
        let mut rng = StdRng::seed_from_u64(44);
        let scheme = KpAbe;
        let (mpk, msk) = scheme.setup(&mut rng);
        let mut dk = scheme.keygen(&msk, &mpk, "one or two", &mut rng).unwrap();
        dk.leaves.pop();

        let secret = SessionSecret::random(&mut rng);
        let encapsulated = scheme
            .encapsulate(&mpk, &secret, &attributes(&["one"]), &mut rng)
            .unwrap();
        assert!(matches!(
            scheme.decapsulate(&mpk, &dk, &encapsulated),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn hostile_encapsulations_are_malformed() {
        let mut rng = StdRng::seed_from_u64(45);
        let scheme = KpAbe;
        let (mpk, msk) = scheme.setup(&mut rng);
        let dk = scheme.keygen(&msk, &mpk, "one or two", &mut rng).unwrap();
        let secret = SessionSecret::random(&mut rng);
        let genuine = scheme
            .encapsulate(&mpk, &secret, &attributes(&["one", "two"]), &mut rng)
            .unwrap();
        let ct = Encapsulation::decode(&genuine).unwrap();

        let mut huge_count = (u64::MAX / 4).to_le_bytes().to_vec();
        huge_count.extend_from_slice(&genuine[8..]);

        let mut huge_attribute = 1u64.to_le_bytes().to_vec();
        huge_attribute.extend_from_slice(&(u64::MAX / 4).to_le_bytes());
        huge_attribute.extend_from_slice(b"one");

        let mut unaligned = ct.clone();
        unaligned.components.pop();
        let mut unaligned_bytes = Vec::new();
        unaligned.serialize_compressed(&mut unaligned_bytes).unwrap();

        for (case, bytes) in [
            ("attribute count", huge_count),
            ("attribute length", huge_attribute),
            ("component count", unaligned_bytes),
        ] {
            assert!(
                matches!(
                    scheme.decapsulate(&mpk, &dk, &bytes),
                    Err(Error::MalformedCiphertext(_))
                ),
                "{case}"
            );
        }
    }

}
