//! # Mock Service Server
//!
//! Accept ZMTP connections, perform the REP side of the handshake, and answer
//! each request from the registry, one at a time per connection.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

use obts_common::zmtp::{
    check_greeting, check_ready, encode_envelope, encode_frame, greeting, ready_command, EnvelopeReader,
    Frame, FrameDecoder, SocketType, GREETING_LEN,
};
use obts_common::{decode_request, encode_response, ProtocolError, Service};

use crate::registry::Registry;

/// A listening mock of one OpenBTS service.
pub struct MockServer {
    listener: TcpListener,
    registry: Arc<Registry>,
}

impl MockServer {
    /// Binds a listener for `service` on `addr` (e.g. "127.0.0.1:0").
    pub async fn bind(addr: &str, service: Service) -> io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(MockServer {
            listener,
            registry: Arc::new(Registry::new(service)),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Shared handle to the state this server answers from.
    pub fn registry(&self) -> Arc<Registry> {
        Arc::clone(&self.registry)
    }

    /// Accepts connections forever, one task per connection.
    pub async fn serve(self) -> io::Result<()> {
        let service = self.registry.service();
        info!(%service, addr = %self.listener.local_addr()?, "mock service listening");
        loop {
            let (stream, peer) = self.listener.accept().await?;
            let registry = Arc::clone(&self.registry);
            tokio::spawn(async move {
                debug!(%service, %peer, "connection accepted");
                if let Err(err) = handle_connection(stream, registry).await {
                    warn!(%service, %peer, error = %err, "connection closed with error");
                }
            });
        }
    }
}

/// Handles a single REQ peer until it disconnects.
pub async fn handle_connection(stream: TcpStream, registry: Arc<Registry>) -> io::Result<()> {
    let mut stream = stream;
    stream.set_nodelay(true)?;
    let mut buffer = BytesMut::with_capacity(8 * 1024);
    let decoder = FrameDecoder::default();

    stream.write_all(&greeting(true)).await?;
    while buffer.len() < GREETING_LEN {
        if stream.read_buf(&mut buffer).await? == 0 {
            return Ok(());
        }
    }
    check_greeting(&buffer.split_to(GREETING_LEN)).map_err(invalid_data)?;

    let mut out = BytesMut::new();
    encode_frame(&ready_command(SocketType::Rep), &mut out);
    stream.write_all(&out).await?;

    let Some(ready) = read_frame(&mut stream, &mut buffer, &decoder).await? else {
        return Ok(());
    };
    check_ready(&ready, SocketType::Rep).map_err(invalid_data)?;

    let mut body_buf = Vec::with_capacity(512);
    loop {
        let Some(body) = read_message(&mut stream, &mut buffer, &decoder).await? else {
            return Ok(());
        };

        let response = match decode_request(&body) {
            Ok(request) => {
                if registry.take_stall() {
                    debug!(command = request.command(), action = request.action(), "stalling request");
                    continue;
                }
                let response = registry.handle(&request);
                debug!(
                    command = request.command(),
                    action = request.action(),
                    code = response.code,
                    "handled request"
                );
                response
            }
            Err(err) => registry.reject(err.to_string()),
        };

        body_buf.clear();
        encode_response(&response, &mut body_buf).map_err(invalid_data)?;
        out.clear();
        encode_envelope(&body_buf, &mut out);
        stream.write_all(&out).await?;
    }
}

async fn read_message(
    stream: &mut TcpStream,
    buffer: &mut BytesMut,
    decoder: &FrameDecoder,
) -> io::Result<Option<Bytes>> {
    let mut envelope = EnvelopeReader::new();
    loop {
        let Some(frame) = read_frame(stream, buffer, decoder).await? else {
            return Ok(None);
        };
        if frame.is_command() {
            continue;
        }
        if let Some(body) = envelope.push(frame).map_err(invalid_data)? {
            return Ok(Some(body));
        }
    }
}

async fn read_frame(
    stream: &mut TcpStream,
    buffer: &mut BytesMut,
    decoder: &FrameDecoder,
) -> io::Result<Option<Frame>> {
    loop {
        if let Some(frame) = decoder.decode(buffer).map_err(invalid_data)? {
            return Ok(Some(frame));
        }
        if stream.read_buf(buffer).await? == 0 {
            return Ok(None);
        }
    }
}

fn invalid_data(err: ProtocolError) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, err)
}
