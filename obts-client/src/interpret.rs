//! Classification of decoded replies into results or typed failures.

use serde::de::DeserializeOwned;
use serde_json::Value;

use obts_common::{ProtocolError, Response, StatusClass};

use crate::client::{ClientError, ClientResult};

/// Maps a reply onto its payload or the error its status code calls for.
///
/// Never retries: not every action is safe to repeat.
pub fn interpret(response: Response) -> ClientResult<Value> {
    match StatusClass::of(response.code) {
        StatusClass::Success => Ok(response.data),
        StatusClass::InvalidRequest => Err(ClientError::InvalidRequest {
            code: response.code,
            message: response.diagnostic(),
        }),
        StatusClass::ServiceFailure => Err(ClientError::Service {
            code: response.code,
            message: response.diagnostic(),
        }),
        StatusClass::Unrecognized => Err(ProtocolError::UnrecognizedCode(response.code).into()),
    }
}

/// Deserializes a success payload into the shape an operation expects.
pub(crate) fn shape<T: DeserializeOwned>(data: Value) -> ClientResult<T> {
    serde_json::from_value(data).map_err(|err| ClientError::UnexpectedResponse(err.to_string()))
}
