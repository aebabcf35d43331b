//! # Message Codec
//!
//! Purpose: Translate request intents and replies to and from the JSON text
//! carried in the body frame of each ZMTP message.
//!
//! ## Design Principles
//!
//! 1. **Omission Is Meaningful**: `fields` and `match` are serialized only when
//!    present, so "not sent" never reads as "sent empty".
//! 2. **Stringly Values**: Field and match values are `String` on both ends; a
//!    request carrying any other JSON type fails to decode.
//! 3. **Untyped Payloads**: Reply `data` stays a `serde_json::Value`; its shape
//!    is a contract between each action and its caller.
//! 4. **Buffer Reuse**: Encoders append into a caller-provided buffer.
//!
//! ## Wire Shape
//!
//! ```text
//! request:  {"command":"subscribers","action":"delete","match":{"imsi":"IMSI000123"}}
//! response: {"code":200,"data":"deleted"}
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ProtocolError, ProtocolResult};
use crate::types::Fields;

/// Immutable intent sent to a backend service.
///
/// Constructors guarantee that at least one of `fields` or `match` is present.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    command: String,
    action: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    fields: Option<Fields>,
    #[serde(rename = "match", default, skip_serializing_if = "Option::is_none")]
    matching: Option<Fields>,
}

impl Request {
    /// Builds a create/update-style request carrying `fields`.
    pub fn with_fields(command: impl Into<String>, action: impl Into<String>, fields: Fields) -> Self {
        Request {
            command: command.into(),
            action: action.into(),
            fields: Some(fields),
            matching: None,
        }
    }

    /// Builds a delete/lookup-style request selecting a target with `match`.
    pub fn with_match(command: impl Into<String>, action: impl Into<String>, matching: Fields) -> Self {
        Request {
            command: command.into(),
            action: action.into(),
            fields: None,
            matching: Some(matching),
        }
    }

    /// Builds an update request that selects a target and carries new values.
    pub fn with_match_and_fields(
        command: impl Into<String>,
        action: impl Into<String>,
        matching: Fields,
        fields: Fields,
    ) -> Self {
        Request {
            command: command.into(),
            action: action.into(),
            fields: Some(fields),
            matching: Some(matching),
        }
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn action(&self) -> &str {
        &self.action
    }

    pub fn fields(&self) -> Option<&Fields> {
        self.fields.as_ref()
    }

    /// The `match` selector, if any.
    pub fn matching(&self) -> Option<&Fields> {
        self.matching.as_ref()
    }
}

/// Decoded reply from a backend service.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Response {
    /// Status code, partitioned by [`crate::StatusClass::of`].
    pub code: i64,
    /// Action-dependent payload; `Null` when the reply carried none.
    pub data: Value,
}

impl Response {
    pub fn new(code: i64, data: impl Into<Value>) -> Self {
        Response {
            code,
            data: data.into(),
        }
    }

    /// Renders `data` as diagnostic text for error reporting.
    ///
    /// Strings are returned verbatim; other payloads use their JSON form.
    pub fn diagnostic(&self) -> String {
        match &self.data {
            Value::String(text) => text.clone(),
            Value::Null => String::new(),
            other => other.to_string(),
        }
    }
}

/// Appends the JSON encoding of `request` to `out`.
pub fn encode_request(request: &Request, out: &mut Vec<u8>) -> ProtocolResult<()> {
    serde_json::to_writer(&mut *out, request)?;
    Ok(())
}

/// Parses a request body, rejecting requests with neither `fields` nor `match`.
pub fn decode_request(bytes: &[u8]) -> ProtocolResult<Request> {
    let request: Request = serde_json::from_slice(bytes)?;
    if request.fields.is_none() && request.matching.is_none() {
        return Err(ProtocolError::EmptyRequest);
    }
    Ok(request)
}

/// Appends the JSON encoding of `response` to `out`.
pub fn encode_response(response: &Response, out: &mut Vec<u8>) -> ProtocolResult<()> {
    serde_json::to_writer(&mut *out, response)?;
    Ok(())
}

/// Parses a reply body into a status code and payload.
pub fn decode_response(bytes: &[u8]) -> ProtocolResult<Response> {
    let value: Value = serde_json::from_slice(bytes)?;
    let Value::Object(mut object) = value else {
        return Err(ProtocolError::Malformed("reply is not a JSON object".into()));
    };

    let code = match object.remove("code") {
        None | Some(Value::Null) => return Err(ProtocolError::MissingCode),
        Some(code) => code
            .as_i64()
            .ok_or_else(|| ProtocolError::Malformed(format!("status code {} is not an integer", code)))?,
    };
    let data = object.remove("data").unwrap_or(Value::Null);

    Ok(Response { code, data })
}
