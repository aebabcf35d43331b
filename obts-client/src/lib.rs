//! # OpenBTS Component Clients
//!
//! Purpose: Provide blocking clients for the OpenBTS, SIPAuthServe and SMQueue
//! services over their ZeroMQ REQ/REP control sockets.
//!
//! ## Design Principles
//! 1. **Facade Pattern**: Each service client hides framing, JSON encoding and
//!    status interpretation behind domain methods.
//! 2. **Strict Alternation**: One request, one reply; a timeout resets the
//!    socket before it is used again.
//! 3. **Typed Failures**: Every failure is a `ClientError` kind; nothing is
//!    retried behind the caller's back.
//!
//! ```rust,no_run
//! use obts_client::{Component, SipAuthServe};
//!
//! let sip = SipAuthServe::new()?;
//! sip.create_subscriber("IMSI000123", "5551234", "127.0.0.1", 8888, None)?;
//! assert_eq!(sip.count_subscribers()?, 1);
//! println!("{}", sip.get_version()?);
//! # Ok::<(), obts_client::ClientError>(())
//! ```

mod client;
mod component;
mod interpret;
mod openbts;
mod sipauthserve;
mod smqueue;
mod transport;

pub use client::{ClientConfig, ClientError, ClientResult, DEFAULT_CONNECT_TIMEOUT, DEFAULT_TIMEOUT};
pub use component::Component;
pub use interpret::interpret;
pub use openbts::OpenBts;
pub use sipauthserve::SipAuthServe;
pub use smqueue::SmQueue;
pub use transport::{Connection, Endpoint, Transport};

pub use obts_common::{ConfigEntry, NumberRecord, Service, SubscriberRecord};
