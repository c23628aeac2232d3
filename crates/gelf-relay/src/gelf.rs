// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! GELF record type and the payload-to-record builder.
//!
//! [`build`] is a pure function from raw message bytes and a content type to
//! a [`GelfMessage`]. JSON payloads are decoded field-for-field; anything
//! else is wrapped verbatim in the record's `short_message`.

use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::{Map, Value};

use crate::errors::ParseError;

/// GELF protocol version stamped on every record without one.
pub const GELF_VERSION: &str = "1.1";

/// Host reported for records whose payload does not carry one.
pub const DEFAULT_HOST: &str = "unknown_amqp";

/// Syslog severity used when the payload does not carry a level.
pub const LEVEL_INFORMATIONAL: i32 = 6;

/// Field names the collector treats specially. They must never appear
/// verbatim in a record's extra mapping.
pub const RESERVED_FIELDS: [&str; 7] =
    ["_id", "_ttl", "_source", "_all", "_index", "_type", "_score"];

/// Content types that opt a payload into JSON-structured parsing.
const JSON_CONTENT_TYPES: [&str; 2] = ["application/json", "text/json"];

/// A structured log record in GELF shape.
///
/// The typed fields mirror the reserved top-level GELF fields; everything
/// else from the source payload lives in `extra`. Extraction does not remove
/// keys from `extra`, so a JSON payload round-trips unchanged apart from
/// reserved-name renames.
#[derive(Debug, Clone, PartialEq)]
pub struct GelfMessage {
    pub version: String,
    pub host: String,
    pub short_message: String,
    /// Event time in floating-point seconds since the epoch; 0.0 if unknown.
    pub timestamp: f64,
    /// Syslog severity, 0 (emergency) through 7 (debug).
    pub level: i32,
    /// Open field mapping, free of reserved names.
    pub extra: Map<String, Value>,
}

impl GelfMessage {
    /// Flattens the record into the wire shape: the five typed fields plus
    /// every extra key alongside them. On a name collision the extra value
    /// wins, matching the merge order of the original GELF library.
    pub fn to_wire(&self) -> Map<String, Value> {
        let mut wire = Map::new();
        wire.insert("version".to_string(), Value::String(self.version.clone()));
        wire.insert("host".to_string(), Value::String(self.host.clone()));
        wire.insert(
            "short_message".to_string(),
            Value::String(self.short_message.clone()),
        );
        wire.insert("timestamp".to_string(), self.timestamp.into());
        wire.insert("level".to_string(), self.level.into());
        for (key, value) in &self.extra {
            wire.insert(key.clone(), value.clone());
        }
        wire
    }
}

impl Serialize for GelfMessage {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let wire = self.to_wire();
        let mut map = serializer.serialize_map(Some(wire.len()))?;
        for (key, value) in &wire {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

/// Builds a GELF record from raw message bytes.
///
/// Payloads with a JSON content type that start with `{` and end with `}`
/// are decoded as JSON objects; a decode failure is a [`ParseError`], never
/// a silent downgrade to plain text. Every other payload is packaged as
/// text, which cannot fail.
pub fn build(payload: &[u8], content_type: &str) -> Result<GelfMessage, ParseError> {
    let braced = payload.first() == Some(&b'{') && payload.last() == Some(&b'}');
    if braced && JSON_CONTENT_TYPES.contains(&content_type) {
        build_json(payload)
    } else {
        Ok(build_text(payload))
    }
}

fn build_json(payload: &[u8]) -> Result<GelfMessage, ParseError> {
    let mut fields: Map<String, Value> = serde_json::from_slice(payload)?;

    rename_reserved(&mut fields);

    let host = extract_string(&fields, "host")?.unwrap_or_else(|| DEFAULT_HOST.to_string());
    let short_message = extract_string(&fields, "short_message")?.unwrap_or_default();
    let version = extract_string(&fields, "version")?.unwrap_or_else(|| GELF_VERSION.to_string());
    let timestamp = extract_timestamp(&fields)?;
    let level = extract_level(&fields)?;

    Ok(GelfMessage {
        version,
        host,
        short_message,
        timestamp,
        level,
        extra: fields,
    })
}

fn build_text(payload: &[u8]) -> GelfMessage {
    GelfMessage {
        version: GELF_VERSION.to_string(),
        host: DEFAULT_HOST.to_string(),
        short_message: String::from_utf8_lossy(payload).into_owned(),
        timestamp: 0.0,
        level: LEVEL_INFORMATIONAL,
        extra: Map::new(),
    }
}

/// Renames reserved field names, with and without a leading underscore.
/// Each key is checked against the original reserved set; a pre-existing
/// `renamed*` key is silently overwritten.
fn rename_reserved(fields: &mut Map<String, Value>) {
    let renames: Vec<(String, String)> = fields
        .keys()
        .filter_map(|key| {
            if RESERVED_FIELDS.contains(&key.as_str()) {
                Some((key.clone(), format!("renamed{key}")))
            } else {
                let prefixed = format!("_{key}");
                if RESERVED_FIELDS.contains(&prefixed.as_str()) {
                    Some((key.clone(), format!("renamed_{key}")))
                } else {
                    None
                }
            }
        })
        .collect();

    for (old, new) in renames {
        if let Some(value) = fields.remove(&old) {
            fields.insert(new, value);
        }
    }
}

fn extract_string(
    fields: &Map<String, Value>,
    field: &'static str,
) -> Result<Option<String>, ParseError> {
    match fields.get(field) {
        None => Ok(None),
        Some(Value::String(value)) => Ok(Some(value.clone())),
        Some(_) => Err(ParseError::UnexpectedType {
            field,
            expected: "string",
        }),
    }
}

fn extract_timestamp(fields: &Map<String, Value>) -> Result<f64, ParseError> {
    match fields.get("timestamp") {
        None => Ok(0.0),
        Some(Value::Number(number)) => Ok(number.as_f64().unwrap_or(0.0)),
        // Stringly-typed timestamps are tolerated; unparseable ones fall
        // back to zero rather than rejecting the message.
        Some(Value::String(value)) => Ok(value.parse::<f64>().unwrap_or(0.0)),
        Some(_) => Err(ParseError::UnexpectedType {
            field: "timestamp",
            expected: "number or string",
        }),
    }
}

fn extract_level(fields: &Map<String, Value>) -> Result<i32, ParseError> {
    match fields.get("level") {
        None => Ok(LEVEL_INFORMATIONAL),
        Some(Value::Number(number)) => number
            .as_i64()
            .and_then(|level| i32::try_from(level).ok())
            .ok_or(ParseError::UnexpectedType {
                field: "level",
                expected: "integer",
            }),
        Some(_) => Err(ParseError::UnexpectedType {
            field: "level",
            expected: "integer",
        }),
    }
}
