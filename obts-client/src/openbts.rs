//! Client for the OpenBTS base-station controller.

use serde_json::{Map, Value};

use obts_common::{Fields, Request, Service};

use crate::client::{ClientConfig, ClientError, ClientResult};
use crate::component::Component;
use crate::transport::Connection;

/// Talks to an OpenBTS instance (default `tcp://127.0.0.1:45060`).
pub struct OpenBts {
    connection: Connection,
}

impl OpenBts {
    /// Binds to the default local endpoint.
    pub fn new() -> ClientResult<Self> {
        Self::with_config(ClientConfig::for_service(Service::OpenBts))
    }

    /// Binds to `address` with default timeouts.
    pub fn connect(address: impl Into<String>) -> ClientResult<Self> {
        Self::with_config(ClientConfig::for_service(Service::OpenBts).with_endpoint(address))
    }

    pub fn with_config(config: ClientConfig) -> ClientResult<Self> {
        Ok(OpenBts {
            connection: Connection::open(config)?,
        })
    }

    /// Reads radio and load statistics (e.g. `noiseRSSI`).
    pub fn monitor(&self) -> ClientResult<Map<String, Value>> {
        let request = Request::with_fields("monitor", "read", Fields::new());
        match self.send_and_receive(&request)? {
            Value::Object(stats) => Ok(stats),
            other => Err(ClientError::UnexpectedResponse(format!(
                "monitor data is not a mapping: {other}"
            ))),
        }
    }
}

impl Component for OpenBts {
    fn connection(&self) -> &Connection {
        &self.connection
    }
}
