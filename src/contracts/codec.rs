//! Schema-checked JSON codec for [`Message`] payloads.
//!
//! Decoding rejects anything that is not a JSON object carrying every field the
//! schema lists. Encoding applies the same check to the serialized value, so a
//! message type whose serde shape drifts from its schema never reaches the wire.

use serde_json::Value;

use super::schema::{Message, Schema};

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("Invalid JSON payload: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Payload for schema {schema} is not a record")]
    NotARecord { schema: &'static str },

    #[error("Payload for schema {schema} is missing required field: {field}")]
    MissingField {
        schema: &'static str,
        field: &'static str,
    },
}

pub fn encode<M: Message>(schema: &Schema, value: &M) -> Result<Vec<u8>, CodecError> {
    let value = serde_json::to_value(value)?;
    validate(schema, &value)?;
    Ok(serde_json::to_vec(&value)?)
}

pub fn decode<M: Message>(schema: &Schema, bytes: &[u8]) -> Result<M, CodecError> {
    let value: Value = serde_json::from_slice(bytes)?;
    validate(schema, &value)?;
    Ok(serde_json::from_value(value)?)
}

fn validate(schema: &Schema, value: &Value) -> Result<(), CodecError> {
    let record = value.as_object().ok_or(CodecError::NotARecord {
        schema: schema.name(),
    })?;

    match schema.fields().iter().find(|field| !record.contains_key(**field)) {
        Some(field) => Err(CodecError::MissingField {
            schema: schema.name(),
            field: *field,
        }),
        None => Ok(()),
    }
}
