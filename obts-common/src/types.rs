//! # Domain Type Definitions
//!
//! Records exchanged in the `data` payload of replies, plus the identity of
//! each backend service.
//!
//! ## Design Principles
//!
//! 1. **String-Typed Wire Values**: Every field value travels as a string, so
//!    records keep `String` fields even for ports and numbers.
//! 2. **Ordered Maps**: `Fields` is a `BTreeMap` so encoded messages are
//!    byte-stable, which keeps wire assertions in tests deterministic.
//! 3. **Shared by Both Ends**: The mock backend serializes the same records the
//!    client deserializes.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// String-to-string map used for both `fields` and `match`.
pub type Fields = BTreeMap<String, String>;

/// Builds a `Fields` map, stringifying every value.
///
/// ```rust
/// use obts_common::fields;
///
/// let map = fields([("port", 8888)]);
/// assert_eq!(map["port"], "8888");
/// ```
pub fn fields<K, V, I>(pairs: I) -> Fields
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: ToString,
{
    pairs
        .into_iter()
        .map(|(key, value)| (key.into(), value.to_string()))
        .collect()
}

/// One subscriber as reported by SIPAuthServe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriberRecord {
    /// IMSI-equivalent identifier.
    pub name: String,
    pub ipaddr: String,
    pub port: String,
    /// Associated numbers (MSISDNs); never empty for a stored subscriber.
    pub numbers: Vec<String>,
}

/// One number-to-subscriber association.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NumberRecord {
    pub name: String,
    pub msisdn: String,
}

/// A configuration key and its current value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigEntry {
    pub key: String,
    pub value: String,
}

/// The three backend services addressed by the component clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Service {
    /// Base-station controller.
    OpenBts,
    /// Subscriber-authentication service.
    SipAuthServe,
    /// Message-queue service.
    SmQueue,
}

impl Service {
    /// All services, in port order.
    pub const ALL: [Service; 3] = [Service::OpenBts, Service::SmQueue, Service::SipAuthServe];

    /// TCP port the service listens on by default.
    pub const fn default_port(self) -> u16 {
        match self {
            Service::OpenBts => 45060,
            Service::SmQueue => 45063,
            Service::SipAuthServe => 45064,
        }
    }

    /// Default endpoint on the local host.
    pub fn default_endpoint(self) -> String {
        format!("tcp://127.0.0.1:{}", self.default_port())
    }

    pub const fn name(self) -> &'static str {
        match self {
            Service::OpenBts => "OpenBTS",
            Service::SipAuthServe => "SIPAuthServe",
            Service::SmQueue => "SMQueue",
        }
    }
}

impl fmt::Display for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
