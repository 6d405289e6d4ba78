// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Content checksums of Grafana objects.
//!
//! Grafana does not promise a stable field order when it serializes the same
//! object twice. Thus, a raw byte hash of a fetched payload would flag
//! objects as changed even though their content is identical. To get around
//! this, every payload is first decoded into a generic JSON value tree, and
//! then re-encoded in __canonical form__: compact, with object keys sorted
//! lexicographically at every depth. Array order is part of the content, so
//! arrays are left alone.
//!
//! The canonical bytes are hashed with a reflected 32-bit CRC using the
//! reversed polynomial `0xD5828281`. This is not the standard CRC-32
//! polynomial, but it is pinned so that checksums stay reproducible across
//! releases.

use crc::{Algorithm, Crc};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Reflected CRC-32 over the reversed polynomial `0xD5828281`.
pub const KEEPER_CRC_32: Algorithm<u32> = Algorithm {
    width: 32,
    poly: 0x814141ab,
    init: 0xffffffff,
    refin: true,
    refout: true,
    xorout: 0xffffffff,
    check: 0xa9cc8179,
    residue: 0x4ac2a509,
};

const CRC: Crc<u32> = Crc::<u32>::new(&KEEPER_CRC_32);

/// Re-encode JSON payload in canonical form.
///
/// # Errors
///
/// - Return [`PayloadError::Malformed`] if payload is not valid JSON.
pub fn canonicalize(payload: impl AsRef<[u8]>) -> Result<Vec<u8>> {
    let value: Value = serde_json::from_slice(payload.as_ref())?;
    Ok(serde_json::to_vec(&sort_keys(value))?)
}

/// Compute content checksum of JSON payload.
///
/// Two payloads that only differ in object key order or whitespace yield
/// the same checksum.
///
/// # Errors
///
/// - Return [`PayloadError::Malformed`] if payload is not valid JSON.
pub fn checksum32(payload: impl AsRef<[u8]>) -> Result<u32> {
    let canonical = canonicalize(payload)?;
    Ok(CRC.checksum(&canonical))
}

// INVARIANT: Object keys are inserted in sorted order, so the encoder emits
// them sorted no matter which map backs `serde_json::Map`.
fn sort_keys(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let sorted: BTreeMap<String, Value> = map
                .into_iter()
                .map(|(key, value)| (key, sort_keys(value)))
                .collect();
            Value::Object(sorted.into_iter().collect::<Map<String, Value>>())
        }
        Value::Array(items) => Value::Array(items.into_iter().map(sort_keys).collect()),
        other => other,
    }
}

/// Payload handling error types.
#[derive(Debug, thiserror::Error)]
pub enum PayloadError {
    /// Payload could not be decoded or encoded as JSON.
    #[error("malformed payload: {0}")]
    Malformed(#[from] serde_json::Error),

    /// Payload lacks an object the caller expected to find.
    #[error("malformed payload: expected object at {0:?}")]
    MissingField(&'static str),
}

/// Friendly result alias :3
type Result<T, E = PayloadError> = std::result::Result<T, E>;
