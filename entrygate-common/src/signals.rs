//! Public signals of the entry proof and their binding to an event.
//!
//! Wire format: a JSON array of exactly three decimal strings,
//! `[merkleRoot, eventID, nullifierHash]`.

use num_bigint::BigUint;
use serde_json::Value as JsonValue;

use crate::{
    error::{GateError, GateResult},
    field::{left_pad, parse_decimal, FieldElement, FIELD_ELEMENT_BYTES},
};

pub const PUBLIC_SIGNAL_COUNT: usize = 3;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PublicSignals {
    pub merkle_root: FieldElement,
    pub event_id: FieldElement,
    pub nullifier_hash: FieldElement,
}

impl PublicSignals {
    pub fn parse_json(raw: &str) -> GateResult<Self> {
        let value: JsonValue = serde_json::from_str(raw)
            .map_err(|err| GateError::invalid(format!("public signals are not valid JSON: {err}")))?;
        Self::from_json(&value)
    }

    pub fn from_json(value: &JsonValue) -> GateResult<Self> {
        let items = value
            .as_array()
            .ok_or_else(|| GateError::invalid("public signals must be a JSON array"))?;
        if items.len() != PUBLIC_SIGNAL_COUNT {
            return Err(GateError::invalid(format!(
                "expected {} public signals, got {}",
                PUBLIC_SIGNAL_COUNT,
                items.len()
            )));
        }
        let mut parsed = [FieldElement::ZERO; PUBLIC_SIGNAL_COUNT];
        for (slot, (item, name)) in parsed
            .iter_mut()
            .zip(items.iter().zip(["merkleRoot", "eventID", "nullifierHash"]))
        {
            let raw = item.as_str().ok_or_else(|| {
                GateError::invalid(format!("public signal {name} must be a decimal string"))
            })?;
            let bytes = parse_signal(raw)
                .map_err(|err| GateError::invalid(format!("public signal {name}: {err}")))?;
            *slot = FieldElement::from_canonical_bytes(bytes)
                .map_err(|err| GateError::invalid(format!("public signal {name}: {err}")))?;
        }
        Ok(Self {
            merkle_root: parsed[0],
            event_id: parsed[1],
            nullifier_hash: parsed[2],
        })
    }

    pub fn to_json(&self) -> String {
        JsonValue::Array(vec![
            JsonValue::String(self.merkle_root.to_decimal()),
            JsonValue::String(self.event_id.to_decimal()),
            JsonValue::String(self.nullifier_hash.to_decimal()),
        ])
        .to_string()
    }
}

/// Parses one decimal signal into a 32-byte big-endian buffer. Values wider
/// than 32 bytes are an error, never truncated.
pub fn parse_signal(raw: &str) -> GateResult<[u8; FIELD_ELEMENT_BYTES]> {
    let value = parse_decimal(raw)?;
    let bytes = value.to_bytes_be();
    if bytes.len() > FIELD_ELEMENT_BYTES {
        return Err(GateError::invalid(format!(
            "value exceeds {} bytes ({} bytes)",
            FIELD_ELEMENT_BYTES,
            bytes.len()
        )));
    }
    Ok(left_pad(&bytes))
}

/// Field encoding of an event identifier: the identifier's hex digits with
/// `-` separators removed, read as a base-16 integer.
pub fn event_id_to_field(event_id: &str) -> GateResult<FieldElement> {
    let digits: String = event_id.chars().filter(|c| *c != '-').collect();
    if digits.is_empty() {
        return Err(GateError::invalid("event id must not be empty"));
    }
    if !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(GateError::invalid(format!(
            "event id '{event_id}' is not a hex identifier"
        )));
    }
    let value = BigUint::parse_bytes(digits.as_bytes(), 16)
        .ok_or_else(|| GateError::invalid(format!("event id '{event_id}' is not hex")))?;
    FieldElement::from_biguint(&value)
}

/// Fails with `InvalidArgument` unless the proof was generated for
/// `expected_event_id`.
pub fn ensure_event_binding(signals: &PublicSignals, expected_event_id: &str) -> GateResult<()> {
    let expected = event_id_to_field(expected_event_id)?;
    if signals.event_id != expected {
        return Err(GateError::invalid(format!(
            "proof is bound to event {} but {} was requested",
            signals.event_id, expected_event_id
        )));
    }
    Ok(())
}
