//! # SIPAuthServe Client
//!
//! Purpose: Provision subscribers and their numbers on the subscriber
//! authentication service.
//!
//! ## Design Principles
//! 1. **Validate Before Sending**: Argument combinations the service would
//!    reject anyway (no selector, two selectors, removing the last number) fail
//!    locally with `ClientError::Validation` and never touch the network.
//! 2. **Idempotent Number Adds**: Adding a number the subscriber already has
//!    succeeds without a write.
//! 3. **Shape Replies**: Per-subscriber getters return the field itself, and a
//!    single-element lookup list collapses to its value.

use serde_json::Value;
use tracing::debug;

use obts_common::{fields, Fields, NumberRecord, Request, Service, SubscriberRecord, STATUS_CONFLICT, STATUS_NOT_FOUND};

use crate::client::{ClientConfig, ClientError, ClientResult};
use crate::component::Component;
use crate::interpret::shape;
use crate::transport::Connection;

/// Talks to SIPAuthServe (default `tcp://127.0.0.1:45064`).
pub struct SipAuthServe {
    connection: Connection,
}

impl SipAuthServe {
    pub fn new() -> ClientResult<Self> {
        Self::with_config(ClientConfig::for_service(Service::SipAuthServe))
    }

    pub fn connect(address: impl Into<String>) -> ClientResult<Self> {
        Self::with_config(ClientConfig::for_service(Service::SipAuthServe).with_endpoint(address))
    }

    pub fn with_config(config: ClientConfig) -> ClientResult<Self> {
        Ok(SipAuthServe {
            connection: Connection::open(config)?,
        })
    }

    /// Provisions a subscriber with one number.
    ///
    /// With `ki` the service uses full authentication; without it, cache auth.
    /// An IMSI that already exists fails with `ClientError::AlreadyExists`; an
    /// MSISDN owned by another subscriber fails with `ClientError::NumberInUse`.
    /// Either way the stored records are left untouched.
    pub fn create_subscriber(
        &self,
        imsi: impl ToString,
        msisdn: impl ToString,
        ipaddr: impl ToString,
        port: impl ToString,
        ki: Option<&str>,
    ) -> ClientResult<()> {
        let imsi = imsi.to_string();
        let msisdn = msisdn.to_string();
        require("imsi", &imsi)?;
        require("msisdn", &msisdn)?;

        let request = Request::with_fields(
            "subscribers",
            "create",
            fields([
                ("name", imsi.clone()),
                ("msisdn", msisdn.clone()),
                ("ipaddr", ipaddr.to_string()),
                ("port", port.to_string()),
                ("ki", ki.unwrap_or_default().to_string()),
            ]),
        );
        match self.send_and_receive(&request) {
            Ok(_) => Ok(()),
            Err(ClientError::InvalidRequest {
                code: STATUS_CONFLICT,
                message,
            }) => Err(self.conflict(imsi, msisdn, message)),
            Err(err) => Err(err),
        }
    }

    /// Deletes a subscriber selected by exactly one of IMSI or MSISDN.
    ///
    /// Passing both or neither is rejected before anything is sent. Empty
    /// strings count as absent.
    pub fn delete_subscriber(&self, imsi: Option<&str>, msisdn: Option<&str>) -> ClientResult<()> {
        let imsi = imsi.filter(|value| !value.is_empty());
        let msisdn = msisdn.filter(|value| !value.is_empty());
        let selector = match (imsi, msisdn) {
            (Some(imsi), None) => fields([("imsi", imsi)]),
            (None, Some(msisdn)) => fields([("msisdn", msisdn)]),
            (Some(_), Some(_)) => {
                return Err(ClientError::Validation(
                    "pass either an IMSI or an MSISDN, not both".into(),
                ))
            }
            (None, None) => {
                return Err(ClientError::Validation(
                    "an IMSI or an MSISDN is required".into(),
                ))
            }
        };

        let request = Request::with_match("subscribers", "delete", selector);
        self.send_and_receive(&request).map(|_| ())
    }

    /// Lists subscribers, optionally only the one with `imsi`.
    ///
    /// An unknown IMSI yields an empty list.
    pub fn get_subscribers(&self, imsi: Option<&str>) -> ClientResult<Vec<SubscriberRecord>> {
        let request = match imsi {
            Some(imsi) => Request::with_match("subscribers", "read", fields([("name", imsi)])),
            None => Request::with_fields("subscribers", "read", Fields::new()),
        };
        shape(self.send_and_receive(&request)?)
    }

    pub fn count_subscribers(&self) -> ClientResult<usize> {
        Ok(self.get_subscribers(None)?.len())
    }

    pub fn get_ipaddr(&self, imsi: &str) -> ClientResult<String> {
        Ok(self.subscriber(imsi)?.ipaddr)
    }

    pub fn get_port(&self, imsi: &str) -> ClientResult<String> {
        Ok(self.subscriber(imsi)?.port)
    }

    pub fn get_numbers(&self, imsi: &str) -> ClientResult<Vec<String>> {
        Ok(self.subscriber(imsi)?.numbers)
    }

    pub fn update_ipaddr(&self, imsi: &str, ipaddr: impl ToString) -> ClientResult<()> {
        self.update_subscriber(imsi, "ipaddr", ipaddr.to_string())
    }

    pub fn update_port(&self, imsi: &str, port: impl ToString) -> ClientResult<()> {
        self.update_subscriber(imsi, "port", port.to_string())
    }

    /// Associates another number with a subscriber.
    ///
    /// A number the subscriber already has is left as is.
    pub fn add_number(&self, imsi: &str, msisdn: impl ToString) -> ClientResult<()> {
        let msisdn = msisdn.to_string();
        require("msisdn", &msisdn)?;
        if self.get_numbers(imsi)?.contains(&msisdn) {
            debug!(imsi, msisdn = %msisdn, "number already associated");
            return Ok(());
        }

        let request = Request::with_fields("numbers", "create", fields([("name", imsi), ("msisdn", msisdn.as_str())]));
        self.send_and_receive(&request).map(|_| ())
    }

    /// Removes a number from a subscriber.
    ///
    /// A subscriber keeps at least one number: any removal from a subscriber
    /// with a single number is rejected locally. Other refusals come back from
    /// the service verbatim.
    pub fn delete_number(&self, imsi: &str, msisdn: impl ToString) -> ClientResult<()> {
        let msisdn = msisdn.to_string();
        let numbers = self.get_numbers(imsi)?;
        if numbers.len() <= 1 {
            return Err(ClientError::Validation(format!(
                "{imsi} has a single number and none can be removed (asked for {msisdn})"
            )));
        }

        let request = Request::with_match("numbers", "delete", fields([("name", imsi), ("msisdn", msisdn.as_str())]));
        self.send_and_receive(&request).map(|_| ())
    }

    /// Finds the IMSI that owns `msisdn`.
    ///
    /// An unassigned number fails with `ClientError::InvalidRequest`.
    pub fn get_imsi_from_number(&self, msisdn: impl ToString) -> ClientResult<String> {
        let msisdn = msisdn.to_string();
        let request = Request::with_match("numbers", "read", fields([("msisdn", msisdn.as_str())]));
        let data = self.send_and_receive(&request)?;

        let record = match data {
            Value::Array(mut items) if items.len() == 1 => items.remove(0),
            Value::Array(items) if items.is_empty() => {
                return Err(ClientError::InvalidRequest {
                    code: STATUS_NOT_FOUND,
                    message: format!("no subscriber owns {msisdn}"),
                })
            }
            Value::Array(items) => {
                return Err(ClientError::UnexpectedResponse(format!(
                    "{} subscribers own {msisdn}",
                    items.len()
                )))
            }
            other => other,
        };

        match record {
            Value::String(imsi) => Ok(imsi),
            other => Ok(shape::<NumberRecord>(other)?.name),
        }
    }

    /// A 409 on create does not say which identifier clashed; the IMSI table
    /// does.
    fn conflict(&self, imsi: String, msisdn: String, message: String) -> ClientError {
        match self.get_subscribers(Some(&imsi)) {
            Ok(records) if records.iter().any(|record| record.name == imsi) => {
                ClientError::AlreadyExists { imsi, message }
            }
            Ok(_) => ClientError::NumberInUse { msisdn, message },
            Err(err) => {
                debug!(imsi = %imsi, error = %err, "conflict lookup failed");
                ClientError::InvalidRequest {
                    code: STATUS_CONFLICT,
                    message,
                }
            }
        }
    }

    fn subscriber(&self, imsi: &str) -> ClientResult<SubscriberRecord> {
        self.get_subscribers(Some(imsi))?
            .into_iter()
            .find(|record| record.name == imsi)
            .ok_or_else(|| ClientError::UnknownSubscriber(imsi.to_string()))
    }

    fn update_subscriber(&self, imsi: &str, field: &str, value: String) -> ClientResult<()> {
        require(field, &value)?;
        let request = Request::with_match_and_fields(
            "subscribers",
            "update",
            fields([("name", imsi)]),
            fields([(field, value)]),
        );
        self.send_and_receive(&request).map(|_| ())
    }
}

impl Component for SipAuthServe {
    fn connection(&self) -> &Connection {
        &self.connection
    }
}

fn require(name: &str, value: &str) -> ClientResult<()> {
    if value.trim().is_empty() {
        return Err(ClientError::Validation(format!("{name} must not be empty")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    // Nothing listens here; validation must fail before any connect attempt.
    fn offline() -> SipAuthServe {
        SipAuthServe::connect("tcp://127.0.0.1:9").unwrap()
    }

    #[test]
    fn test_delete_subscriber_requires_one_selector() {
        let client = offline();
        assert!(matches!(
            client.delete_subscriber(None, None),
            Err(ClientError::Validation(_))
        ));
        assert!(matches!(
            client.delete_subscriber(Some("IMSI000123"), Some("5551234")),
            Err(ClientError::Validation(_))
        ));
        assert!(matches!(
            client.delete_subscriber(Some(""), None),
            Err(ClientError::Validation(_))
        ));
    }

    #[test]
    fn test_create_subscriber_requires_identifiers() {
        let client = offline();
        let err = client
            .create_subscriber("", "5551234", "127.0.0.1", 8888, None)
            .unwrap_err();
        assert!(matches!(err, ClientError::Validation(_)));
        let err = client
            .create_subscriber("IMSI000123", " ", "127.0.0.1", 8888, None)
            .unwrap_err();
        assert!(matches!(err, ClientError::Validation(_)));
    }

    #[test]
    fn test_validation_does_not_open_socket() {
        let client = offline();
        let _ = client.delete_subscriber(None, None);
        assert!(!client.connection().transport_is_open());
    }
}
