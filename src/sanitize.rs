// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Payload sanitization.
//!
//! Objects fetched from Grafana carry server-assigned identity fields. Grafana
//! refuses to create an object from a payload that still refers to a stale
//! identity, so these fields must be neutralized before a payload is written
//! to the work directory or replayed as a creation request.

use crate::checksum::PayloadError;

use serde_json::{Map, Value};

/// Strip identity of fetched datasource payload.
///
/// Removes the top-level `id` field entirely. Every other field is kept
/// as is.
///
/// # Errors
///
/// - Return [`PayloadError::Malformed`] if payload is not valid JSON.
/// - Return [`PayloadError::MissingField`] if payload is not a JSON object.
pub fn sanitize_datasource(payload: impl AsRef<[u8]>) -> Result<Vec<u8>> {
    let mut object = parse_object(payload.as_ref())?;
    object.remove("id");

    Ok(serde_json::to_vec(&object)?)
}

/// Strip identity of fetched dashboard payload.
///
/// Forces the `id` and `uid` fields of the nested `dashboard` object to an
/// explicit null. Grafana requires null rather than absence to allocate a
/// fresh identity on import.
///
/// # Errors
///
/// - Return [`PayloadError::Malformed`] if payload is not valid JSON.
/// - Return [`PayloadError::MissingField`] if payload or its nested
///   `dashboard` field is not a JSON object.
pub fn sanitize_dashboard(payload: impl AsRef<[u8]>) -> Result<Vec<u8>> {
    let mut object = parse_object(payload.as_ref())?;
    let dashboard = object
        .get_mut("dashboard")
        .and_then(Value::as_object_mut)
        .ok_or(PayloadError::MissingField("dashboard"))?;
    dashboard.insert("id".into(), Value::Null);
    dashboard.insert("uid".into(), Value::Null);

    Ok(serde_json::to_vec(&object)?)
}

fn parse_object(payload: &[u8]) -> Result<Map<String, Value>> {
    let value: Value = serde_json::from_slice(payload)?;
    match value {
        Value::Object(object) => Ok(object),
        _ => Err(PayloadError::MissingField("$")),
    }
}

/// Friendly result alias :3
type Result<T, E = PayloadError> = std::result::Result<T, E>;
