//! # Component Contract
//!
//! Purpose: Operations every OpenBTS service answers (configuration and
//! version queries), written once over the shared transport.
//!
//! ## Design Principles
//! 1. **Template Method**: Implementors only expose their `Connection`; the
//!    request building, status interpretation and payload shaping are shared.
//! 2. **Stringify at the Edge**: Values are converted with `ToString` before a
//!    request is built, so callers can pass numbers directly.

use serde_json::Value;

use obts_common::{fields, ConfigEntry, Fields, Request};

use crate::client::{ClientError, ClientResult};
use crate::interpret::{interpret, shape};
use crate::transport::Connection;

/// A client bound to one OpenBTS service.
pub trait Component {
    /// The connection this component talks over.
    fn connection(&self) -> &Connection;

    /// Sends a request and classifies the reply.
    fn send_and_receive(&self, request: &Request) -> ClientResult<Value> {
        let response = self.connection().send_and_receive(request)?;
        interpret(response)
    }

    /// Reads one configuration value.
    fn read_config(&self, key: &str) -> ClientResult<ConfigEntry> {
        let request = Request::with_match("config", "read", fields([("key", key)]));
        shape(self.send_and_receive(&request)?)
    }

    /// Sets a configuration value.
    ///
    /// Setting a key to its current value succeeds (the service answers 304).
    fn update_config(&self, key: &str, value: impl ToString) -> ClientResult<()>
    where
        Self: Sized,
    {
        let request = Request::with_match_and_fields(
            "config",
            "update",
            fields([("key", key)]),
            fields([("value", value)]),
        );
        self.send_and_receive(&request).map(|_| ())
    }

    /// Returns the service's version string.
    fn get_version(&self) -> ClientResult<String> {
        let request = Request::with_fields("version", "read", Fields::new());
        match self.send_and_receive(&request)? {
            Value::String(version) => Ok(version),
            other => Err(ClientError::UnexpectedResponse(format!(
                "version is not a string: {other}"
            ))),
        }
    }
}
