//! # In-Memory Service State
//!
//! Purpose: Answer decoded requests the way the OpenBTS services do, from
//! state held in memory.
//!
//! ## Design Principles
//!
//! 1. **Single Lock**: One `RwLock` guards all state; every request is small
//!    and the mock is not a throughput target.
//! 2. **Status Contract First**: Handlers are written against the status codes
//!    clients rely on (409 duplicates, 404 missing targets, 406 rule
//!    violations, 304 no-ops, 501 unknown commands).
//! 3. **Ordered Tables**: `BTreeMap` keeps listings in IMSI order.
//!
//! ## Structure Overview
//!
//! ```text
//! Registry
//!   ├── service: Service            (decides which commands exist)
//!   ├── state: RwLock<State>
//!   │     ├── config:      key -> value
//!   │     ├── version:     String
//!   │     ├── monitor:     JSON map
//!   │     └── subscribers: imsi -> Subscriber { ipaddr, port, ki, numbers }
//!   ├── stall: AtomicUsize          (requests still to swallow)
//!   └── metrics: Metrics
//! ```

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::RwLock;
use serde_json::{json, Value};

use obts_common::{
    NumberRecord, Request, Response, Service, StatusClass, SubscriberRecord, STATUS_BAD_REQUEST,
    STATUS_CONFLICT, STATUS_NOT_ACCEPTABLE, STATUS_NOT_FOUND, STATUS_NOT_IMPLEMENTED, STATUS_NOT_MODIFIED,
    STATUS_OK,
};

use crate::metrics::{Metrics, MetricsSnapshot};

/// Subscriber fields `subscribers update` may change.
const UPDATABLE: [&str; 3] = ["ipaddr", "port", "ki"];

/// Version string reported by every mock service.
pub const MOCK_VERSION: &str = concat!("obts-mock ", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Clone)]
struct Subscriber {
    ipaddr: String,
    port: String,
    ki: String,
    numbers: Vec<String>,
}

#[derive(Debug)]
struct State {
    config: BTreeMap<String, String>,
    version: String,
    monitor: Value,
    subscribers: BTreeMap<String, Subscriber>,
}

impl State {
    fn seeded(service: Service) -> Self {
        let config: &[(&str, &str)] = match service {
            Service::OpenBts => &[("Control.NumSQLTries", "3"), ("GSM.Radio.C0", "51")],
            Service::SipAuthServe => &[("Log.Alarms.Max", "20"), ("SubscriberRegistry.A3A8", "comp128")],
            Service::SmQueue => &[("Bounce.Code", "101"), ("SIP.Timeout.ACKedMessageResend", "60")],
        };
        State {
            config: config
                .iter()
                .map(|(key, value)| (key.to_string(), value.to_string()))
                .collect(),
            version: MOCK_VERSION.to_string(),
            monitor: json!({
                "noiseRSSI": -73,
                "msTargetRSSI": -50,
                "gsmSDCCHActive": 0,
                "gsmTCHActive": 0,
                "gprsUplinkBusy": 0,
            }),
            subscribers: BTreeMap::new(),
        }
    }

    fn owner_of(&self, msisdn: &str) -> Option<&str> {
        self.subscribers
            .iter()
            .find(|(_, subscriber)| subscriber.numbers.iter().any(|number| number == msisdn))
            .map(|(imsi, _)| imsi.as_str())
    }

    fn record(imsi: &str, subscriber: &Subscriber) -> SubscriberRecord {
        SubscriberRecord {
            name: imsi.to_string(),
            ipaddr: subscriber.ipaddr.clone(),
            port: subscriber.port.clone(),
            numbers: subscriber.numbers.clone(),
        }
    }
}

/// State and request handling for one mock service.
#[derive(Debug)]
pub struct Registry {
    service: Service,
    state: RwLock<State>,
    stall: AtomicUsize,
    metrics: Metrics,
}

impl Registry {
    /// Creates a registry seeded with the service's default configuration.
    pub fn new(service: Service) -> Self {
        Registry {
            service,
            state: RwLock::new(State::seeded(service)),
            stall: AtomicUsize::new(0),
            metrics: Metrics::new(),
        }
    }

    pub fn service(&self) -> Service {
        self.service
    }

    /// Swallows the next `count` requests without replying.
    pub fn stall_next(&self, count: usize) {
        self.stall.store(count, Ordering::SeqCst);
    }

    /// Consumes one pending stall, if any.
    pub(crate) fn take_stall(&self) -> bool {
        let taken = self
            .stall
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if taken {
            self.metrics.record_stall();
        }
        taken
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Whether a subscriber was provisioned with a Ki (full auth) rather than
    /// cache auth. `None` if the subscriber does not exist.
    pub fn uses_full_auth(&self, imsi: &str) -> Option<bool> {
        self.state
            .read()
            .subscribers
            .get(imsi)
            .map(|subscriber| !subscriber.ki.is_empty())
    }

    /// Answers one decoded request.
    pub fn handle(&self, request: &Request) -> Response {
        self.metrics.record_request();
        let response = self.dispatch(request);
        if StatusClass::of(response.code) != StatusClass::Success {
            self.metrics.record_error();
        }
        response
    }

    /// Reply to a body that could not be decoded.
    pub(crate) fn reject(&self, reason: String) -> Response {
        self.metrics.record_request();
        self.metrics.record_error();
        Response::new(STATUS_BAD_REQUEST, reason)
    }

    fn dispatch(&self, request: &Request) -> Response {
        let subscribers = self.service == Service::SipAuthServe;
        match (request.command(), request.action()) {
            ("config", "read") => self.read_config(request),
            ("config", "update") => self.update_config(request),
            ("version", "read") => Response::new(STATUS_OK, self.state.read().version.clone()),
            ("monitor", "read") if self.service == Service::OpenBts => {
                Response::new(STATUS_OK, self.state.read().monitor.clone())
            }
            ("subscribers", "create") if subscribers => self.create_subscriber(request),
            ("subscribers", "read") if subscribers => self.read_subscribers(request),
            ("subscribers", "update") if subscribers => self.update_subscriber(request),
            ("subscribers", "delete") if subscribers => self.delete_subscriber(request),
            ("numbers", "create") if subscribers => self.add_number(request),
            ("numbers", "read") if subscribers => self.read_numbers(request),
            ("numbers", "delete") if subscribers => self.delete_number(request),
            (command, action) => Response::new(
                STATUS_NOT_IMPLEMENTED,
                format!("{} does not implement {} {}", self.service, command, action),
            ),
        }
    }

    fn read_config(&self, request: &Request) -> Response {
        let Some(key) = selector(request, "key") else {
            return missing("key");
        };
        match self.state.read().config.get(key) {
            Some(value) => Response::new(STATUS_OK, json!({"key": key, "value": value})),
            None => Response::new(STATUS_NOT_FOUND, format!("unknown config key {key}")),
        }
    }

    fn update_config(&self, request: &Request) -> Response {
        let (Some(key), Some(value)) = (selector(request, "key"), field(request, "value")) else {
            return missing("key and value");
        };
        let mut state = self.state.write();
        let Some(current) = state.config.get_mut(key) else {
            return Response::new(STATUS_NOT_FOUND, format!("unknown config key {key}"));
        };
        if current.as_str() == value {
            return Response::new(STATUS_NOT_MODIFIED, json!({"key": key, "value": value}));
        }
        *current = value.to_string();
        Response::new(STATUS_OK, json!({"key": key, "value": value}))
    }

    fn create_subscriber(&self, request: &Request) -> Response {
        let (Some(imsi), Some(msisdn)) = (field(request, "name"), field(request, "msisdn")) else {
            return missing("name and msisdn");
        };
        if imsi.is_empty() || msisdn.is_empty() {
            return missing("name and msisdn");
        }

        let mut state = self.state.write();
        if state.subscribers.contains_key(imsi) {
            return Response::new(STATUS_CONFLICT, format!("subscriber {imsi} already exists"));
        }
        if let Some(owner) = state.owner_of(msisdn) {
            return Response::new(STATUS_CONFLICT, format!("number {msisdn} belongs to {owner}"));
        }

        let subscriber = Subscriber {
            ipaddr: field(request, "ipaddr").unwrap_or_default().to_string(),
            port: field(request, "port").unwrap_or_default().to_string(),
            ki: field(request, "ki").unwrap_or_default().to_string(),
            numbers: vec![msisdn.to_string()],
        };
        state.subscribers.insert(imsi.to_string(), subscriber);
        Response::new(STATUS_OK, format!("created {imsi}"))
    }

    fn read_subscribers(&self, request: &Request) -> Response {
        let state = self.state.read();
        let records: Vec<SubscriberRecord> = match selector(request, "name") {
            Some(imsi) => state
                .subscribers
                .get_key_value(imsi)
                .map(|(imsi, subscriber)| State::record(imsi, subscriber))
                .into_iter()
                .collect(),
            None => state
                .subscribers
                .iter()
                .map(|(imsi, subscriber)| State::record(imsi, subscriber))
                .collect(),
        };
        Response::new(STATUS_OK, json!(records))
    }

    fn update_subscriber(&self, request: &Request) -> Response {
        let Some(imsi) = selector(request, "name") else {
            return missing("name");
        };
        let Some(changes) = request.fields().filter(|fields| !fields.is_empty()) else {
            return missing("fields");
        };

        // All-or-nothing: a rejected field leaves the record as it was.
        if let Some(other) = changes.keys().find(|name| !UPDATABLE.contains(&name.as_str())) {
            return Response::new(STATUS_BAD_REQUEST, format!("field {other} cannot be updated"));
        }

        let mut state = self.state.write();
        let Some(subscriber) = state.subscribers.get_mut(imsi) else {
            return Response::new(STATUS_NOT_FOUND, format!("no subscriber {imsi}"));
        };
        for (name, value) in changes {
            match name.as_str() {
                "ipaddr" => subscriber.ipaddr = value.clone(),
                "port" => subscriber.port = value.clone(),
                _ => subscriber.ki = value.clone(),
            }
        }
        Response::new(STATUS_OK, format!("updated {imsi}"))
    }

    fn delete_subscriber(&self, request: &Request) -> Response {
        let mut state = self.state.write();
        let imsi = match (selector(request, "imsi"), selector(request, "msisdn")) {
            (Some(imsi), None) => imsi.to_string(),
            (None, Some(msisdn)) => match state.owner_of(msisdn) {
                Some(owner) => owner.to_string(),
                None => return Response::new(STATUS_NOT_FOUND, format!("no subscriber owns {msisdn}")),
            },
            _ => return missing("exactly one of imsi or msisdn"),
        };
        match state.subscribers.remove(&imsi) {
            Some(_) => Response::new(STATUS_OK, format!("deleted {imsi}")),
            None => Response::new(STATUS_NOT_FOUND, format!("no subscriber {imsi}")),
        }
    }

    fn add_number(&self, request: &Request) -> Response {
        let (Some(imsi), Some(msisdn)) = (field(request, "name"), field(request, "msisdn")) else {
            return missing("name and msisdn");
        };

        let mut state = self.state.write();
        match state.owner_of(msisdn) {
            Some(owner) if owner == imsi => {
                return Response::new(STATUS_NOT_MODIFIED, format!("{msisdn} already belongs to {imsi}"))
            }
            Some(owner) => return Response::new(STATUS_CONFLICT, format!("number {msisdn} belongs to {owner}")),
            None => {}
        }
        let Some(subscriber) = state.subscribers.get_mut(imsi) else {
            return Response::new(STATUS_NOT_FOUND, format!("no subscriber {imsi}"));
        };
        subscriber.numbers.push(msisdn.to_string());
        Response::new(STATUS_OK, format!("added {msisdn} to {imsi}"))
    }

    fn read_numbers(&self, request: &Request) -> Response {
        let state = self.state.read();
        if let Some(msisdn) = selector(request, "msisdn") {
            return match state.owner_of(msisdn) {
                Some(owner) => {
                    let records = vec![NumberRecord {
                        name: owner.to_string(),
                        msisdn: msisdn.to_string(),
                    }];
                    Response::new(STATUS_OK, json!(records))
                }
                None => Response::new(STATUS_NOT_FOUND, format!("no subscriber owns {msisdn}")),
            };
        }
        let Some(imsi) = selector(request, "name") else {
            return missing("msisdn or name");
        };
        match state.subscribers.get(imsi) {
            Some(subscriber) => {
                let records: Vec<NumberRecord> = subscriber
                    .numbers
                    .iter()
                    .map(|msisdn| NumberRecord {
                        name: imsi.to_string(),
                        msisdn: msisdn.clone(),
                    })
                    .collect();
                Response::new(STATUS_OK, json!(records))
            }
            None => Response::new(STATUS_NOT_FOUND, format!("no subscriber {imsi}")),
        }
    }

    fn delete_number(&self, request: &Request) -> Response {
        let (Some(imsi), Some(msisdn)) = (selector(request, "name"), selector(request, "msisdn")) else {
            return missing("name and msisdn");
        };

        let mut state = self.state.write();
        let Some(subscriber) = state.subscribers.get_mut(imsi) else {
            return Response::new(STATUS_NOT_FOUND, format!("no subscriber {imsi}"));
        };
        let Some(index) = subscriber.numbers.iter().position(|number| number == msisdn) else {
            return Response::new(STATUS_NOT_FOUND, format!("{msisdn} does not belong to {imsi}"));
        };
        if subscriber.numbers.len() == 1 {
            return Response::new(
                STATUS_NOT_ACCEPTABLE,
                format!("{msisdn} is the last number of {imsi}"),
            );
        }
        subscriber.numbers.remove(index);
        Response::new(STATUS_OK, format!("removed {msisdn} from {imsi}"))
    }
}

/// Looks a key up in `match`, falling back to `fields`.
fn selector<'a>(request: &'a Request, key: &str) -> Option<&'a str> {
    request
        .matching()
        .and_then(|matching| matching.get(key))
        .or_else(|| request.fields().and_then(|fields| fields.get(key)))
        .map(String::as_str)
}

fn field<'a>(request: &'a Request, key: &str) -> Option<&'a str> {
    request.fields().and_then(|fields| fields.get(key)).map(String::as_str)
}

fn missing(what: &str) -> Response {
    Response::new(STATUS_BAD_REQUEST, format!("missing {what}"))
}
