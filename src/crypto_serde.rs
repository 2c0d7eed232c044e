//! Serde adapters for arkworks values crossing the request/response boundary.

use ark_serialize::{CanonicalDeserialize, CanonicalSerialize};
use serde::de::Error as DeError;
use serde::ser::Error as SerError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

#[derive(Debug, thiserror::Error)]
pub enum HexCodecError {
    #[error("hex string is empty")]
    Empty,
    #[error("failed to decode hex: {0}")]
    Hex(#[from] hex::FromHexError),
    #[error("canonical (de)serialization failed: {0}")]
    Canonical(#[from] ark_serialize::SerializationError),
}

/// Canonically serializes any arkworks type into a lowercase, `0x`-prefixed hex string.
pub fn canonical_serialize_hex<T: CanonicalSerialize>(value: &T) -> Result<String, HexCodecError> {
    let mut buf = Vec::new();
    value.serialize_compressed(&mut buf)?;
    Ok(format!("0x{}", hex::encode(buf)))
}

pub fn canonical_deserialize_hex<T: CanonicalDeserialize>(value: &str) -> Result<T, HexCodecError> {
    let bytes = decode_hex_bytes(value)?;
    Ok(T::deserialize_compressed(&mut &bytes[..])?)
}

pub fn decode_hex_bytes(value: &str) -> Result<Vec<u8>, HexCodecError> {
    let trimmed = value.trim();
    let without_prefix = trimmed.strip_prefix("0x").unwrap_or(trimmed);
    if without_prefix.is_empty() {
        return Err(HexCodecError::Empty);
    }
    if without_prefix.len() % 2 == 1 {
        return Ok(hex::decode(format!("0{without_prefix}"))?);
    }
    Ok(hex::decode(without_prefix)?)
}

/// Serde helpers for scalar field elements as 0x-prefixed hex strings.
pub mod field {
    use super::*;

    pub fn serialize<F, S>(value: &F, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        F: CanonicalSerialize,
        S: Serializer,
    {
        let hex = canonical_serialize_hex(value).map_err(SerError::custom)?;
        serializer.serialize_str(&hex)
    }

    pub fn deserialize<'de, F, D>(deserializer: D) -> std::result::Result<F, D::Error>
    where
        F: CanonicalDeserialize,
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        canonical_deserialize_hex(&s).map_err(DeError::custom)
    }
}

/// Serde helpers for opaque byte blobs (proof bytes, randomness) as hex strings.
pub mod hex_bytes {
    use super::*;

    pub fn serialize<S>(value: &[u8], serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format!("0x{}", hex::encode(value)))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> std::result::Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        decode_hex_bytes(&s).map_err(DeError::custom)
    }
}
