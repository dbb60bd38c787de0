//! BN254 scalar-field elements in their canonical 32-byte big-endian form.
//!
//! Every value that is stored, hashed or compared passes through
//! [`FieldElement`], and the only ways to build one either reduce modulo the
//! field prime ([`FieldElement::reduce_be_bytes`]) or reject non-canonical
//! input ([`FieldElement::from_canonical_bytes`]). An unreduced value therefore
//! never leaves this module.

use std::fmt;

use ark_bn254::Fr;
use ark_ff::{BigInteger, PrimeField};
use num_bigint::BigUint;
use once_cell::sync::Lazy;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{GateError, GateResult};

/// Width of a serialized field element.
pub const FIELD_ELEMENT_BYTES: usize = 32;

/// Order of the BN254 scalar field, the prime the circuit works over.
pub const FIELD_MODULUS_DECIMAL: &str =
    "21888242871839275222246405745257275088548364400416034343698204186575808495617";

static FIELD_MODULUS: Lazy<BigUint> = Lazy::new(|| {
    BigUint::parse_bytes(FIELD_MODULUS_DECIMAL.as_bytes(), 10)
        .expect("field modulus constant is valid decimal")
});

pub fn field_modulus() -> &'static BigUint {
    &FIELD_MODULUS
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct FieldElement([u8; FIELD_ELEMENT_BYTES]);

impl FieldElement {
    /// The all-zero element, also used as the padding leaf.
    pub const ZERO: FieldElement = FieldElement([0u8; FIELD_ELEMENT_BYTES]);

    /// Interprets `bytes` as a big-endian integer of any length and reduces
    /// it modulo the field prime.
    pub fn reduce_be_bytes(bytes: &[u8]) -> Self {
        Self::from_fr(&Fr::from_be_bytes_mod_order(bytes))
    }

    pub fn from_canonical_bytes(bytes: [u8; FIELD_ELEMENT_BYTES]) -> GateResult<Self> {
        if BigUint::from_bytes_be(&bytes) >= *FIELD_MODULUS {
            return Err(GateError::invalid(
                "value is not a canonical field element (>= field modulus)",
            ));
        }
        Ok(Self(bytes))
    }

    pub fn from_biguint(value: &BigUint) -> GateResult<Self> {
        let bytes = value.to_bytes_be();
        if bytes.len() > FIELD_ELEMENT_BYTES {
            return Err(GateError::invalid(format!(
                "integer exceeds {} bytes (got {} bytes)",
                FIELD_ELEMENT_BYTES,
                bytes.len()
            )));
        }
        Self::from_canonical_bytes(left_pad(&bytes))
    }

    /// Parses a base-10 string such as the ones emitted by circom tooling.
    pub fn from_decimal(value: &str) -> GateResult<Self> {
        Self::from_biguint(&parse_decimal(value)?)
    }

    pub fn from_fr(fr: &Fr) -> Self {
        Self(left_pad(&fr.into_bigint().to_bytes_be()))
    }

    pub fn to_fr(&self) -> Fr {
        Fr::from_be_bytes_mod_order(&self.0)
    }

    pub fn as_bytes(&self) -> &[u8; FIELD_ELEMENT_BYTES] {
        &self.0
    }

    pub fn to_biguint(&self) -> BigUint {
        BigUint::from_bytes_be(&self.0)
    }

    pub fn to_decimal(&self) -> String {
        self.to_biguint().to_str_radix(10)
    }

    pub fn to_hex(&self) -> String {
        format!("0x{}", hex_encode(&self.0))
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; FIELD_ELEMENT_BYTES]
    }
}

/// Strict base-10 parser: ASCII digits only, no sign, no separators.
pub(crate) fn parse_decimal(value: &str) -> GateResult<BigUint> {
    if value.is_empty() {
        return Err(GateError::invalid("empty decimal integer"));
    }
    if !value.bytes().all(|b| b.is_ascii_digit()) {
        return Err(GateError::invalid(format!(
            "'{value}' is not an unsigned decimal integer"
        )));
    }
    BigUint::parse_bytes(value.as_bytes(), 10)
        .ok_or_else(|| GateError::invalid(format!("failed to parse decimal integer '{value}'")))
}

/// Left-pads a big-endian buffer of at most 32 bytes.
pub(crate) fn left_pad(bytes: &[u8]) -> [u8; FIELD_ELEMENT_BYTES] {
    let mut out = [0u8; FIELD_ELEMENT_BYTES];
    let start = FIELD_ELEMENT_BYTES.saturating_sub(bytes.len());
    let skip = bytes.len().saturating_sub(FIELD_ELEMENT_BYTES);
    out[start..].copy_from_slice(&bytes[skip..]);
    out
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

impl fmt::Display for FieldElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_decimal())
    }
}

impl fmt::Debug for FieldElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FieldElement({})", self.to_hex())
    }
}

impl Serialize for FieldElement {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_decimal())
    }
}

impl<'de> Deserialize<'de> for FieldElement {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        FieldElement::from_decimal(&raw).map_err(de::Error::custom)
    }
}
