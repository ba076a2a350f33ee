//! JSON text codec for chat envelopes.
//!
//! Inbound frames are decoded in two steps: first as a generic JSON object
//! to read `kind`, then into the payload type for that kind. Malformed JSON,
//! a non-object frame or a missing `kind` is a codec error; an unrecognised
//! `kind` is not.

use crate::error::{ChamaError, ChamaResult};
use crate::messages::{Inbound, Outbound};
use serde_json::{Map, Value};

/// Decode a client → server text frame.
pub fn decode_inbound(text: &str) -> ChamaResult<Inbound> {
    let value: Value = serde_json::from_str(text)?;
    let Value::Object(mut fields) = value else {
        return Err(ChamaError::Codec("envelope must be a JSON object".into()));
    };

    let kind = match fields.remove("kind") {
        Some(Value::String(kind)) => kind,
        Some(_) => return Err(ChamaError::Codec("`kind` must be a string".into())),
        None => return Err(ChamaError::Codec("missing `kind`".into())),
    };

    let body = Value::Object(fields);
    match kind.as_str() {
        "auth" => Ok(Inbound::Auth(serde_json::from_value(body)?)),
        "chat" => Ok(Inbound::Chat(serde_json::from_value(body)?)),
        _ => Ok(Inbound::Unknown(kind)),
    }
}

/// Encode a client → server envelope.
pub fn encode_inbound(msg: &Inbound) -> ChamaResult<String> {
    let (kind, body) = match msg {
        Inbound::Auth(auth) => ("auth", serde_json::to_value(auth)?),
        Inbound::Chat(chat) => ("chat", serde_json::to_value(chat)?),
        Inbound::Unknown(kind) => (kind.as_str(), Value::Object(Map::new())),
    };

    let mut fields = match body {
        Value::Object(fields) => fields,
        _ => Map::new(),
    };
    fields.insert("kind".into(), Value::String(kind.to_string()));
    Ok(serde_json::to_string(&Value::Object(fields))?)
}

/// Encode a server → client envelope.
pub fn encode_outbound(msg: &Outbound) -> ChamaResult<String> {
    Ok(serde_json::to_string(msg)?)
}

/// Decode a server → client text frame.
pub fn decode_outbound(text: &str) -> ChamaResult<Outbound> {
    Ok(serde_json::from_str(text)?)
}
