use std::collections::HashSet;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use ark_bls12_381::{g2, G2Affine};
use ark_ec::hashing::curve_maps::wb::WBMap;
use ark_ec::hashing::map_to_curve_hasher::MapToCurveBasedHasher;
use ark_ec::hashing::HashToCurve;
use ark_ff::field_hashers::DefaultFieldHasher;
use ark_serialize::{CanonicalDeserialize, CanonicalSerialize};
use sha2::Sha256;

use crate::access::validate_attribute;
use crate::error::{Error, Result};
use crate::types::G2;

/// Domain separation tag for hashing attributes onto G2.
const ATTRIBUTE_DST: &[u8] = b"ABE-ENVELOPE-V01-CS01-with-BLS12381G2_XMD:SHA-256_SSWU_RO_";

type AttributeHasher = MapToCurveBasedHasher<G2, DefaultFieldHasher<Sha256, 128>, WBMap<g2::Config>>;

/// Hash an attribute string to a point of G2.
pub fn hash_attribute(attribute: &str) -> Result<G2Affine> {
    let hasher =
        AttributeHasher::new(ATTRIBUTE_DST).map_err(|e| Error::HashToCurve(e.to_string()))?;
    hasher
        .hash(attribute.as_bytes())
        .map_err(|e| Error::HashToCurve(e.to_string()))
}

/// Validate attributes and drop repeats, keeping first-seen order.
pub fn unique_attributes(attributes: &[String]) -> Result<Vec<&str>> {
    let mut seen = HashSet::with_capacity(attributes.len());
    let mut unique = Vec::with_capacity(attributes.len());
    for attribute in attributes {
        validate_attribute(attribute)?;
        if seen.insert(attribute.as_str()) {
            unique.push(attribute.as_str());
        }
    }
    Ok(unique)
}

/// Check that two parallel component lists line up.
pub fn ensure_same_length(expected: usize, actual: usize, what: &str) -> Result<()> {
    if expected != actual {
        return Err(Error::MalformedCiphertext(format!(
            "{what}: expected {expected} components, found {actual}"
        )));
    }
    Ok(())
}

/// Decode one compressed value from the front of `input`, advancing it.
pub fn decode<T: CanonicalDeserialize>(input: &mut &[u8], what: &str) -> Result<T> {
    T::deserialize_compressed(&mut *input)
        .map_err(|e| Error::MalformedCiphertext(format!("{what}: {e}")))
}

/// Read a `u64` length prefix and check that `len` items of at least
/// `min_item_size` bytes each can still follow in `input`.
///
/// Lengths come from untrusted bytes and are checked before anything is
/// allocated.
pub fn decode_length(input: &mut &[u8], min_item_size: usize, what: &str) -> Result<usize> {
    let declared: u64 = decode(input, what)?;
    let fits = usize::try_from(declared)
        .ok()
        .and_then(|n| n.checked_mul(min_item_size.max(1)))
        .is_some_and(|bytes| bytes <= input.len());
    if !fits {
        return Err(Error::MalformedCiphertext(format!(
            "{what}: declared length {declared} exceeds the {} bytes left",
            input.len()
        )));
    }
    Ok(declared as usize)
}

/// Length-prefixed UTF-8 string, laid out as ark-serialize writes `String`.
pub fn decode_string(input: &mut &[u8], what: &str) -> Result<String> {
    let len = decode_length(input, 1, what)?;
    let (bytes, rest) = input.split_at(len);
    *input = rest;
    String::from_utf8(bytes.to_vec())
        .map_err(|_| Error::MalformedCiphertext(format!("{what}: not valid UTF-8")))
}

/// Length-prefixed sequence, laid out as ark-serialize writes `Vec<T>`.
pub fn decode_vec<T: CanonicalDeserialize>(
    input: &mut &[u8],
    min_item_size: usize,
    what: &str,
) -> Result<Vec<T>> {
    let len = decode_length(input, min_item_size, what)?;
    (0..len).map(|_| decode(input, what)).collect()
}

/// Reject bytes left over after the last field.
pub fn ensure_consumed(input: &[u8], what: &str) -> Result<()> {
    if !input.is_empty() {
        return Err(Error::MalformedCiphertext(format!(
            "{what}: {} trailing bytes",
            input.len()
        )));
    }
    Ok(())
}

/// Persist a key in compressed form.
pub fn write_key<T: CanonicalSerialize, P: AsRef<Path>>(path: P, key: &T) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    key.serialize_compressed(&mut writer)?;
    writer.flush()?;
    Ok(())
}

/// Load a key written by [`write_key`].
pub fn read_key<T: CanonicalDeserialize, P: AsRef<Path>>(path: P) -> Result<T> {
    let reader = BufReader::new(File::open(path)?);
    Ok(T::deserialize_compressed(reader)?)
}
