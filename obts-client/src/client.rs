//! # Client Configuration and Errors
//!
//! Purpose: Define the error taxonomy every component operation reports and
//! the configuration a component client is built from.
//!
//! ## Design Principles
//! 1. **Unambiguous Kinds**: Local argument checks, remote rejections and
//!    transport failures never share a variant.
//! 2. **Diagnostics Survive**: Remote failures keep the service's text verbatim,
//!    including when a domain method narrows them.
//! 3. **No Hidden Retries**: Nothing here retries; `Timeout` is reported and the
//!    caller decides.

use std::time::Duration;

use thiserror::Error;

use obts_common::zmtp::DEFAULT_MAX_FRAME_SIZE;
use obts_common::{ProtocolError, Service};

/// Result type for component clients.
pub type ClientResult<T> = Result<T, ClientError>;

/// Errors surfaced by component clients.
#[derive(Error, Debug)]
pub enum ClientError {
    /// Endpoint is malformed, unreachable, or the stream broke mid-exchange.
    #[error("connection to {endpoint} failed: {reason}")]
    Connection { endpoint: String, reason: String },

    /// No reply arrived before the deadline; the socket has been reset.
    #[error("no reply from {endpoint} within {timeout:?}")]
    Timeout { endpoint: String, timeout: Duration },

    /// Reply or framing did not have the expected structure.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// The service rejected the request (4xx).
    #[error("invalid request (code {code}): {message}")]
    InvalidRequest { code: i64, message: String },

    /// The service failed while handling the request (5xx).
    #[error("service error (code {code}): {message}")]
    Service { code: i64, message: String },

    /// Arguments were rejected before anything was sent.
    #[error("invalid arguments: {0}")]
    Validation(String),

    /// A subscriber with this IMSI is already provisioned.
    #[error("subscriber {imsi} already exists: {message}")]
    AlreadyExists { imsi: String, message: String },

    /// The MSISDN is already associated with another subscriber.
    #[error("number {msisdn} is in use: {message}")]
    NumberInUse { msisdn: String, message: String },

    /// No subscriber record matched the IMSI.
    #[error("no subscriber with IMSI {0}")]
    UnknownSubscriber(String),

    /// A successful reply carried data in a shape the operation does not accept.
    #[error("unexpected response payload: {0}")]
    UnexpectedResponse(String),
}

impl ClientError {
    /// Status code reported by the service, for remote failures.
    pub fn code(&self) -> Option<i64> {
        match self {
            ClientError::InvalidRequest { code, .. } | ClientError::Service { code, .. } => Some(*code),
            _ => None,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, ClientError::Timeout { .. })
    }
}

/// Default deadline for a complete reply.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default TCP connect timeout.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(3);

/// Configuration for one component client.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Service endpoint, e.g. "tcp://127.0.0.1:45064".
    pub endpoint: String,
    /// Deadline for a whole reply after the request is sent.
    pub timeout: Duration,
    /// TCP connect timeout, applied per resolved address.
    pub connect_timeout: Duration,
    /// Largest frame body accepted from the service.
    pub max_frame_size: usize,
}

impl ClientConfig {
    /// Configuration pointing at a service's default local endpoint.
    pub fn for_service(service: Service) -> Self {
        ClientConfig {
            endpoint: service.default_endpoint(),
            timeout: DEFAULT_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }

    /// Same settings, different endpoint.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig::for_service(Service::OpenBts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_for_service() {
        let config = ClientConfig::for_service(Service::SipAuthServe);
        assert_eq!(config.endpoint, "tcp://127.0.0.1:45064");
        assert_eq!(config.timeout, DEFAULT_TIMEOUT);

        let config = config
            .with_endpoint("tcp://10.0.0.1:5000")
            .with_timeout(Duration::from_millis(250));
        assert_eq!(config.endpoint, "tcp://10.0.0.1:5000");
        assert_eq!(config.timeout, Duration::from_millis(250));
    }

    #[test]
    fn test_error_code() {
        let err = ClientError::InvalidRequest {
            code: 404,
            message: "not found".into(),
        };
        assert_eq!(err.code(), Some(404));
        assert_eq!(err.to_string(), "invalid request (code 404): not found");
        assert_eq!(ClientError::Validation("x".into()).code(), None);
    }
}
