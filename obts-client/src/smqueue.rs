//! Client for the SMQueue message-queue service.

use obts_common::Service;

use crate::client::{ClientConfig, ClientResult};
use crate::component::Component;
use crate::transport::Connection;

/// Talks to SMQueue (default `tcp://127.0.0.1:45063`).
///
/// Only the shared [`Component`] operations apply.
pub struct SmQueue {
    connection: Connection,
}

impl SmQueue {
    pub fn new() -> ClientResult<Self> {
        Self::with_config(ClientConfig::for_service(Service::SmQueue))
    }

    pub fn connect(address: impl Into<String>) -> ClientResult<Self> {
        Self::with_config(ClientConfig::for_service(Service::SmQueue).with_endpoint(address))
    }

    pub fn with_config(config: ClientConfig) -> ClientResult<Self> {
        Ok(SmQueue {
            connection: Connection::open(config)?,
        })
    }
}

impl Component for SmQueue {
    fn connection(&self) -> &Connection {
        &self.connection
    }
}
