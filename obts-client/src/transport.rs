//! # REQ Transport
//!
//! Purpose: Own the single REQ socket of a component client and enforce the
//! strict send-one/receive-one discipline of the pattern.
//!
//! ## Design Principles
//! 1. **One Exchange at a Time**: `Connection` serializes callers with a mutex;
//!    the transport inside is only ever driven by one thread.
//! 2. **Reset on Doubt**: A timeout, broken stream or framing error drops the
//!    socket. The next exchange opens a fresh one, so bytes from an abandoned
//!    request can never be read as the next reply.
//! 3. **Lazy Open**: Binding only validates the endpoint; the TCP connect and
//!    ZMTP handshake happen on the first exchange, like a ZeroMQ connect.
//! 4. **Buffer Reuse**: Each socket keeps its read/write buffers between calls.
//!
//! ## Exchange Lifecycle
//!
//! ```text
//! send_and_receive
//!   ├── in_flight already set?  -> reset (previous exchange abandoned)
//!   ├── take socket (or open: connect, greeting, READY)
//!   ├── send  [delimiter][json]
//!   ├── recv  frames until the envelope completes, within one deadline
//!   │     ├── ok     -> socket returned to the transport
//!   │     └── error  -> socket dropped
//!   └── decode JSON (failure keeps the socket: alternation is intact)
//! ```

use std::fmt;
use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::{Duration, Instant};

use bytes::{Bytes, BytesMut};
use parking_lot::Mutex;
use tracing::{debug, warn};

use obts_common::zmtp::{
    check_greeting, check_ready, encode_envelope, encode_frame, greeting, ready_command, EnvelopeReader,
    Frame, FrameDecoder, SocketType, GREETING_LEN,
};
use obts_common::{decode_response, encode_request, ProtocolError, Request, Response};

use crate::client::{ClientConfig, ClientError, ClientResult};

/// A parsed `tcp://host:port` endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    host: String,
    port: u16,
}

impl Endpoint {
    /// Parses `tcp://host:port` or bare `host:port`.
    pub fn parse(address: &str) -> ClientResult<Self> {
        let malformed = |reason: &str| ClientError::Connection {
            endpoint: address.to_string(),
            reason: reason.to_string(),
        };

        let rest = match address.split_once("://") {
            Some(("tcp", rest)) => rest,
            Some(_) => return Err(malformed("only tcp:// endpoints are supported")),
            None => address,
        };
        let (host, port) = rest.rsplit_once(':').ok_or_else(|| malformed("missing port"))?;
        let host = host.trim_start_matches('[').trim_end_matches(']');
        if host.is_empty() || host == "*" {
            return Err(malformed("missing host"));
        }
        let port: u16 = port.parse().map_err(|_| malformed("invalid port"))?;
        if port == 0 {
            return Err(malformed("invalid port"));
        }

        Ok(Endpoint {
            host: host.to_string(),
            port,
        })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    fn resolve(&self) -> io::Result<Vec<SocketAddr>> {
        Ok((self.host.as_str(), self.port).to_socket_addrs()?.collect())
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "tcp://[{}]:{}", self.host, self.port)
        } else {
            write!(f, "tcp://{}:{}", self.host, self.port)
        }
    }
}

/// Shared handle used by a component client.
///
/// Wraps the transport in a mutex so concurrent callers take turns; the lock is
/// held for the whole exchange.
pub struct Connection {
    transport: Mutex<Transport>,
}

impl Connection {
    /// Binds a connection to the configured endpoint.
    pub fn open(config: ClientConfig) -> ClientResult<Self> {
        Ok(Connection {
            transport: Mutex::new(Transport::new(config)?),
        })
    }

    /// Sends one request and blocks for its reply.
    pub fn send_and_receive(&self, request: &Request) -> ClientResult<Response> {
        self.transport.lock().send_and_receive(request)
    }

    /// Rebinds to `address`; a no-op if already bound there.
    pub fn connect(&self, address: &str) -> ClientResult<()> {
        self.transport.lock().connect(address)
    }

    pub fn endpoint(&self) -> String {
        self.transport.lock().endpoint().to_string()
    }

    /// Whether the underlying socket is currently open.
    pub fn transport_is_open(&self) -> bool {
        self.transport.lock().is_open()
    }
}

/// Why an exchange failed before a reply body was in hand.
enum ExchangeError {
    Timeout,
    Connect(io::Error),
    Io(io::Error),
    Protocol(ProtocolError),
}

impl From<io::Error> for ExchangeError {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut => ExchangeError::Timeout,
            _ => ExchangeError::Io(err),
        }
    }
}

impl From<ProtocolError> for ExchangeError {
    fn from(err: ProtocolError) -> Self {
        ExchangeError::Protocol(err)
    }
}

/// Owner of the REQ socket for one endpoint.
pub struct Transport {
    endpoint: Endpoint,
    timeout: Duration,
    connect_timeout: Duration,
    decoder: FrameDecoder,
    socket: Option<ReqSocket>,
    // Set while a request is on the wire without its reply.
    in_flight: bool,
    json_buf: Vec<u8>,
}

impl Transport {
    /// Validates the endpoint; no I/O happens until the first exchange.
    pub fn new(config: ClientConfig) -> ClientResult<Self> {
        let endpoint = Endpoint::parse(&config.endpoint)?;
        Ok(Transport {
            endpoint,
            timeout: config.timeout,
            connect_timeout: config.connect_timeout,
            decoder: FrameDecoder::new(config.max_frame_size),
            socket: None,
            in_flight: false,
            json_buf: Vec::with_capacity(256),
        })
    }

    /// Binds to `address`. Idempotent for the current endpoint; any other
    /// endpoint drops the open socket.
    pub fn connect(&mut self, address: &str) -> ClientResult<()> {
        let endpoint = Endpoint::parse(address)?;
        if endpoint == self.endpoint {
            return Ok(());
        }
        debug!(from = %self.endpoint, to = %endpoint, "rebinding transport");
        self.reset();
        self.endpoint = endpoint;
        Ok(())
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Whether a socket is currently open.
    pub fn is_open(&self) -> bool {
        self.socket.is_some()
    }

    /// Drops the socket; the next exchange reconnects.
    pub fn reset(&mut self) {
        if self.socket.take().is_some() {
            debug!(endpoint = %self.endpoint, "socket closed");
        }
        self.in_flight = false;
    }

    /// Sends `request` and blocks until its reply arrives or the deadline passes.
    pub fn send_and_receive(&mut self, request: &Request) -> ClientResult<Response> {
        if self.in_flight {
            warn!(endpoint = %self.endpoint, "previous exchange was abandoned, resetting socket");
            self.reset();
        }

        self.json_buf.clear();
        encode_request(request, &mut self.json_buf)?;
        debug!(
            endpoint = %self.endpoint,
            command = request.command(),
            action = request.action(),
            "sending request"
        );

        let deadline = Instant::now() + self.timeout;
        self.in_flight = true;
        let result = self.exchange(deadline);
        self.in_flight = false;

        let body = match result {
            Ok(body) => body,
            Err(err) => return Err(self.fail(err)),
        };

        let response = decode_response(&body)?;
        debug!(endpoint = %self.endpoint, code = response.code, "received reply");
        Ok(response)
    }

    fn exchange(&mut self, deadline: Instant) -> Result<Bytes, ExchangeError> {
        // The socket is only handed back once a full reply has been read.
        let mut socket = match self.socket.take() {
            Some(socket) => socket,
            None => ReqSocket::open(&self.endpoint, self.connect_timeout, deadline, &self.decoder)?,
        };
        socket.send(&self.json_buf, deadline)?;
        let body = socket.recv(deadline, &self.decoder)?;
        self.socket = Some(socket);
        Ok(body)
    }

    fn fail(&mut self, err: ExchangeError) -> ClientError {
        self.reset();
        let endpoint = self.endpoint.to_string();
        match err {
            ExchangeError::Timeout => {
                warn!(%endpoint, timeout = ?self.timeout, "reply timed out, socket reset");
                ClientError::Timeout {
                    endpoint,
                    timeout: self.timeout,
                }
            }
            ExchangeError::Connect(err) => ClientError::Connection {
                endpoint,
                reason: err.to_string(),
            },
            ExchangeError::Io(err) => {
                warn!(%endpoint, error = %err, "stream failed mid-exchange, socket reset");
                ClientError::Connection {
                    endpoint,
                    reason: err.to_string(),
                }
            }
            ExchangeError::Protocol(err) => {
                warn!(%endpoint, error = %err, "framing violation, socket reset");
                ClientError::Protocol(err)
            }
        }
    }
}

/// One handshaken TCP stream speaking the REQ side of ZMTP.
struct ReqSocket {
    stream: TcpStream,
    read_buf: BytesMut,
    write_buf: BytesMut,
}

impl ReqSocket {
    fn open(
        endpoint: &Endpoint,
        connect_timeout: Duration,
        deadline: Instant,
        decoder: &FrameDecoder,
    ) -> Result<Self, ExchangeError> {
        // The connect attempt spends from the reply deadline too.
        let connect_timeout = connect_timeout.min(remaining(deadline)?);
        let stream = connect_stream(endpoint, connect_timeout).map_err(ExchangeError::Connect)?;
        // Disable Nagle to keep request latency low for small payloads.
        stream.set_nodelay(true).map_err(ExchangeError::Connect)?;

        let mut socket = ReqSocket {
            stream,
            read_buf: BytesMut::with_capacity(4096),
            write_buf: BytesMut::with_capacity(256),
        };
        socket.handshake(deadline, decoder)?;
        debug!(%endpoint, "socket open");
        Ok(socket)
    }

    fn handshake(&mut self, deadline: Instant, decoder: &FrameDecoder) -> Result<(), ExchangeError> {
        self.write_all(&greeting(false), deadline)?;
        while self.read_buf.len() < GREETING_LEN {
            self.fill(deadline)?;
        }
        let peer = self.read_buf.split_to(GREETING_LEN);
        check_greeting(&peer)?;

        self.write_buf.clear();
        encode_frame(&ready_command(SocketType::Req), &mut self.write_buf);
        self.flush_write_buf(deadline)?;

        let ready = self.read_frame(deadline, decoder)?;
        check_ready(&ready, SocketType::Req)?;
        Ok(())
    }

    fn send(&mut self, body: &[u8], deadline: Instant) -> Result<(), ExchangeError> {
        self.write_buf.clear();
        encode_envelope(body, &mut self.write_buf);
        self.flush_write_buf(deadline)
    }

    fn recv(&mut self, deadline: Instant, decoder: &FrameDecoder) -> Result<Bytes, ExchangeError> {
        let mut envelope = EnvelopeReader::new();
        loop {
            let frame = self.read_frame(deadline, decoder)?;
            if frame.is_command() {
                // Commands after the handshake (e.g. heartbeats) carry no reply data.
                continue;
            }
            if let Some(body) = envelope.push(frame)? {
                return Ok(body);
            }
        }
    }

    fn read_frame(&mut self, deadline: Instant, decoder: &FrameDecoder) -> Result<Frame, ExchangeError> {
        loop {
            if let Some(frame) = decoder.decode(&mut self.read_buf)? {
                return Ok(frame);
            }
            self.fill(deadline)?;
        }
    }

    fn fill(&mut self, deadline: Instant) -> Result<(), ExchangeError> {
        self.stream.set_read_timeout(Some(remaining(deadline)?))?;
        let mut chunk = [0u8; 4096];
        match self.stream.read(&mut chunk) {
            Ok(0) => Err(ExchangeError::Io(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "peer closed the connection",
            ))),
            Ok(n) => {
                self.read_buf.extend_from_slice(&chunk[..n]);
                Ok(())
            }
            Err(err) if err.kind() == io::ErrorKind::Interrupted => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    fn flush_write_buf(&mut self, deadline: Instant) -> Result<(), ExchangeError> {
        self.stream.set_write_timeout(Some(remaining(deadline)?))?;
        self.stream.write_all(&self.write_buf)?;
        self.stream.flush()?;
        Ok(())
    }

    fn write_all(&mut self, data: &[u8], deadline: Instant) -> Result<(), ExchangeError> {
        self.stream.set_write_timeout(Some(remaining(deadline)?))?;
        self.stream.write_all(data)?;
        Ok(())
    }
}

fn remaining(deadline: Instant) -> Result<Duration, ExchangeError> {
    match deadline.checked_duration_since(Instant::now()) {
        Some(left) if !left.is_zero() => Ok(left),
        _ => Err(ExchangeError::Timeout),
    }
}

fn connect_stream(endpoint: &Endpoint, timeout: Duration) -> io::Result<TcpStream> {
    let mut last_err = None;
    for addr in endpoint.resolve()? {
        match TcpStream::connect_timeout(&addr, timeout) {
            Ok(stream) => return Ok(stream),
            Err(err) => last_err = Some(err),
        }
    }
    Err(last_err.unwrap_or_else(|| {
        io::Error::new(io::ErrorKind::NotFound, "endpoint resolved to no addresses")
    }))
}
