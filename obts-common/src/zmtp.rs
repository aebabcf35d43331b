//! # ZMTP 3.0 Framing
//!
//! Purpose: Sans-IO greeting, handshake and frame codec for the REQ/REP
//! messaging socket. The blocking client and the async mock backend both drive
//! these functions over their own streams.
//!
//! ## Design Principles
//! 1. **Sans-IO**: Nothing here reads or writes a socket; callers feed bytes in
//!    and drain encoded bytes out.
//! 2. **Incremental Decoding**: `FrameDecoder::decode` returns `Ok(None)` until
//!    a whole frame is buffered, so partial reads need no extra state.
//! 3. **Fail Fast**: Reserved flag bits, oversized frames and malformed
//!    handshakes are errors immediately; a stream that produced one is unusable.
//! 4. **NULL Mechanism Only**: No security handshake, matching the backends.
//!
//! ## Wire Layout
//!
//! ```text
//! Greeting (64 bytes):
//! +------+-----------+------+-------+-------+---------------+--------+----------+
//! | 0xFF | padding:8 | 0x7F | major | minor | mechanism:20B | server | filler:31|
//! +------+-----------+------+-------+-------+---------------+--------+----------+
//!
//! Short frame:              Long frame:
//! +-------+--------+------+  +-------+-----------+------+
//! | flags | size:1 | body |  | flags | size:8 BE | body |
//! +-------+--------+------+  +-------+-----------+------+
//!
//! REQ/REP envelope: [empty frame, MORE] [body frame]
//! ```

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{ProtocolError, ProtocolResult};

/// Length of the fixed greeting exchanged before the handshake.
pub const GREETING_LEN: usize = 64;

/// Default maximum frame body (1 MiB).
pub const DEFAULT_MAX_FRAME_SIZE: usize = 1_048_576;

/// More frames follow in the same message.
pub const FLAG_MORE: u8 = 0x01;
/// Size is an 8-byte big-endian integer.
pub const FLAG_LONG: u8 = 0x02;
/// Frame carries a command rather than message data.
pub const FLAG_COMMAND: u8 = 0x04;

const MECHANISM_NULL: &[u8] = b"NULL";
const READY: &[u8] = b"READY";
const SOCKET_TYPE: &[u8] = b"Socket-Type";

/// Socket patterns this crate speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketType {
    Req,
    Rep,
}

impl SocketType {
    pub const fn as_bytes(self) -> &'static [u8] {
        match self {
            SocketType::Req => b"REQ",
            SocketType::Rep => b"REP",
        }
    }

    /// The only socket type this one may talk to.
    pub const fn peer(self) -> SocketType {
        match self {
            SocketType::Req => SocketType::Rep,
            SocketType::Rep => SocketType::Req,
        }
    }

    fn parse(value: &[u8]) -> Option<SocketType> {
        match value {
            b"REQ" => Some(SocketType::Req),
            b"REP" => Some(SocketType::Rep),
            _ => None,
        }
    }
}

/// Builds the 64-byte greeting for the NULL mechanism.
pub fn greeting(as_server: bool) -> [u8; GREETING_LEN] {
    let mut buf = [0u8; GREETING_LEN];
    buf[0] = 0xFF;
    // Padding byte 8 set to 1 keeps ZMTP 1.0 peers from misreading the length.
    buf[8] = 0x01;
    buf[9] = 0x7F;
    buf[10] = 3;
    buf[11] = 0;
    buf[12..12 + MECHANISM_NULL.len()].copy_from_slice(MECHANISM_NULL);
    buf[32] = as_server as u8;
    buf
}

/// Validates a peer greeting: signature, major version >= 3, NULL mechanism.
pub fn check_greeting(buf: &[u8]) -> ProtocolResult<()> {
    if buf.len() != GREETING_LEN {
        return Err(ProtocolError::InvalidGreeting("wrong length"));
    }
    if buf[0] != 0xFF || buf[9] != 0x7F {
        return Err(ProtocolError::InvalidGreeting("bad signature"));
    }
    if buf[10] < 3 {
        return Err(ProtocolError::InvalidGreeting("unsupported version"));
    }
    let mechanism = &buf[12..32];
    let name_len = mechanism.iter().position(|&b| b == 0).unwrap_or(mechanism.len());
    if &mechanism[..name_len] != MECHANISM_NULL {
        return Err(ProtocolError::InvalidGreeting("unsupported mechanism"));
    }
    Ok(())
}

/// One ZMTP frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    flags: u8,
    pub body: Bytes,
}

impl Frame {
    /// Builds a message frame; `more` marks that another frame follows.
    pub fn message(body: impl Into<Bytes>, more: bool) -> Self {
        Frame {
            flags: if more { FLAG_MORE } else { 0 },
            body: body.into(),
        }
    }

    /// Builds a command frame from a name and command data.
    pub fn command(name: &[u8], data: &[u8]) -> Self {
        let mut body = BytesMut::with_capacity(1 + name.len() + data.len());
        body.put_u8(name.len() as u8);
        body.put_slice(name);
        body.put_slice(data);
        Frame {
            flags: FLAG_COMMAND,
            body: body.freeze(),
        }
    }

    pub fn is_more(&self) -> bool {
        self.flags & FLAG_MORE != 0
    }

    pub fn is_command(&self) -> bool {
        self.flags & FLAG_COMMAND != 0
    }

    /// Splits a command frame into its name and data.
    pub fn command_parts(&self) -> ProtocolResult<(&[u8], &[u8])> {
        let body = &self.body[..];
        let name_len = *body
            .first()
            .ok_or_else(|| ProtocolError::Handshake("empty command frame".into()))? as usize;
        if body.len() < 1 + name_len {
            return Err(ProtocolError::Handshake("truncated command name".into()));
        }
        Ok((&body[1..1 + name_len], &body[1 + name_len..]))
    }
}

/// Appends the wire encoding of `frame` to `out`.
pub fn encode_frame(frame: &Frame, out: &mut BytesMut) {
    let len = frame.body.len();
    if len > u8::MAX as usize {
        out.reserve(9 + len);
        out.put_u8(frame.flags | FLAG_LONG);
        out.put_u64(len as u64);
    } else {
        out.reserve(2 + len);
        out.put_u8(frame.flags);
        out.put_u8(len as u8);
    }
    out.put_slice(&frame.body);
}

/// Incremental frame decoder with a body size limit.
#[derive(Debug, Clone)]
pub struct FrameDecoder {
    max_frame_size: usize,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        FrameDecoder::new(DEFAULT_MAX_FRAME_SIZE)
    }
}

impl FrameDecoder {
    pub fn new(max_frame_size: usize) -> Self {
        FrameDecoder { max_frame_size }
    }

    /// Takes one frame off the front of `buf`, or `Ok(None)` if incomplete.
    pub fn decode(&self, buf: &mut BytesMut) -> ProtocolResult<Option<Frame>> {
        if buf.len() < 2 {
            return Ok(None);
        }
        let flags = buf[0];
        if flags & !(FLAG_MORE | FLAG_LONG | FLAG_COMMAND) != 0 {
            return Err(ProtocolError::InvalidFlags(flags));
        }

        let (header_len, size) = if flags & FLAG_LONG != 0 {
            if buf.len() < 9 {
                return Ok(None);
            }
            let mut size = [0u8; 8];
            size.copy_from_slice(&buf[1..9]);
            (9, u64::from_be_bytes(size))
        } else {
            (2, buf[1] as u64)
        };

        if size > self.max_frame_size as u64 {
            return Err(ProtocolError::FrameTooLarge {
                size,
                max: self.max_frame_size,
            });
        }

        let size = size as usize;
        if buf.len() < header_len + size {
            buf.reserve(header_len + size - buf.len());
            return Ok(None);
        }

        buf.advance(header_len);
        let body = buf.split_to(size).freeze();
        Ok(Some(Frame {
            flags: flags & !FLAG_LONG,
            body,
        }))
    }
}

/// Builds the READY command announcing our socket type.
pub fn ready_command(socket_type: SocketType) -> Frame {
    let value = socket_type.as_bytes();
    let mut data = Vec::with_capacity(1 + SOCKET_TYPE.len() + 4 + value.len());
    data.push(SOCKET_TYPE.len() as u8);
    data.extend_from_slice(SOCKET_TYPE);
    data.extend_from_slice(&(value.len() as u32).to_be_bytes());
    data.extend_from_slice(value);
    Frame::command(READY, &data)
}

/// Parses the peer's READY command and checks it is compatible with `ours`.
pub fn check_ready(frame: &Frame, ours: SocketType) -> ProtocolResult<()> {
    if !frame.is_command() {
        return Err(ProtocolError::Handshake("expected READY command".into()));
    }
    let (name, mut props) = frame.command_parts()?;
    if name != READY {
        return Err(ProtocolError::Handshake(format!(
            "expected READY, got {}",
            String::from_utf8_lossy(name)
        )));
    }

    let mut peer = None;
    while !props.is_empty() {
        let name_len = props[0] as usize;
        if props.len() < 1 + name_len + 4 {
            return Err(ProtocolError::Handshake("truncated property".into()));
        }
        let name = &props[1..1 + name_len];
        let mut len = [0u8; 4];
        len.copy_from_slice(&props[1 + name_len..1 + name_len + 4]);
        let value_len = u32::from_be_bytes(len) as usize;
        let start = 1 + name_len + 4;
        if props.len() < start + value_len {
            return Err(ProtocolError::Handshake("truncated property value".into()));
        }
        let value = &props[start..start + value_len];
        // Property names are case-insensitive.
        if name.eq_ignore_ascii_case(SOCKET_TYPE) {
            peer = SocketType::parse(value);
            if peer.is_none() {
                return Err(ProtocolError::Handshake(format!(
                    "unsupported socket type {}",
                    String::from_utf8_lossy(value)
                )));
            }
        }
        props = &props[start + value_len..];
    }

    match peer {
        Some(peer) if peer == ours.peer() => Ok(()),
        Some(peer) => Err(ProtocolError::Handshake(format!(
            "{:?} socket cannot talk to {:?}",
            ours, peer
        ))),
        None => Err(ProtocolError::Handshake("READY without Socket-Type".into())),
    }
}

/// Appends a REQ/REP envelope (empty delimiter, then `body`) to `out`.
pub fn encode_envelope(body: &[u8], out: &mut BytesMut) {
    encode_frame(&Frame::message(Bytes::new(), true), out);
    encode_frame(&Frame::message(Bytes::copy_from_slice(body), false), out);
}

/// Collects the frames of one message into its REQ/REP body.
///
/// Feed message frames in order; `push` returns the body once the final frame
/// (without MORE) has arrived.
#[derive(Debug, Default)]
pub struct EnvelopeReader {
    seen_delimiter: bool,
    body: Option<Bytes>,
}

impl EnvelopeReader {
    pub fn new() -> Self {
        EnvelopeReader::default()
    }

    pub fn push(&mut self, frame: Frame) -> ProtocolResult<Option<Bytes>> {
        if frame.is_command() {
            return Err(ProtocolError::Envelope("command frame inside a message"));
        }
        if !self.seen_delimiter {
            if !frame.body.is_empty() || !frame.is_more() {
                return Err(ProtocolError::Envelope("missing empty delimiter"));
            }
            self.seen_delimiter = true;
            return Ok(None);
        }
        if self.body.is_some() {
            return Err(ProtocolError::Envelope("more than one body frame"));
        }
        if frame.is_more() {
            self.body = Some(frame.body);
            return Ok(None);
        }
        self.seen_delimiter = false;
        Ok(Some(frame.body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_all(bytes: &[u8]) -> Vec<Frame> {
        let decoder = FrameDecoder::default();
        let mut buf = BytesMut::from(bytes);
        let mut frames = Vec::new();
        while let Some(frame) = decoder.decode(&mut buf).unwrap() {
            frames.push(frame);
        }
        assert!(buf.is_empty());
        frames
    }

    #[test]
    fn test_greeting_layout() {
        let client = greeting(false);
        assert_eq!(client[0], 0xFF);
        assert_eq!(client[9], 0x7F);
        assert_eq!(client[10], 3);
        assert_eq!(&client[12..16], b"NULL");
        assert_eq!(client[32], 0);
        assert_eq!(greeting(true)[32], 1);
        check_greeting(&client).unwrap();
    }

    #[test]
    fn test_greeting_rejects_bad_peers() {
        let mut bad = greeting(true);
        bad[0] = 0x00;
        assert!(check_greeting(&bad).is_err());

        let mut old = greeting(true);
        old[10] = 2;
        assert_eq!(
            check_greeting(&old),
            Err(ProtocolError::InvalidGreeting("unsupported version"))
        );

        let mut plain = greeting(true);
        plain[12..17].copy_from_slice(b"PLAIN");
        assert_eq!(
            check_greeting(&plain),
            Err(ProtocolError::InvalidGreeting("unsupported mechanism"))
        );

        assert!(check_greeting(&[0xFF; 10]).is_err());
    }

    #[test]
    fn test_short_and_long_frames() {
        let mut out = BytesMut::new();
        encode_frame(&Frame::message(&b"hi"[..], true), &mut out);
        assert_eq!(&out[..], &[FLAG_MORE, 2, b'h', b'i']);

        let long = vec![7u8; 300];
        out.clear();
        encode_frame(&Frame::message(long.clone(), false), &mut out);
        assert_eq!(out[0], FLAG_LONG);
        assert_eq!(&out[1..9], &300u64.to_be_bytes());

        let frames = decode_all(&out);
        assert_eq!(frames.len(), 1);
        assert_eq!(&frames[0].body[..], &long[..]);
        assert!(!frames[0].is_more());
    }

    #[test]
    fn test_decode_waits_for_full_frame() {
        let decoder = FrameDecoder::default();
        let mut buf = BytesMut::from(&[0x00, 5, b'a', b'b'][..]);
        assert_eq!(decoder.decode(&mut buf).unwrap(), None);
        buf.extend_from_slice(b"cde");
        let frame = decoder.decode(&mut buf).unwrap().unwrap();
        assert_eq!(&frame.body[..], b"abcde");
        assert!(buf.is_empty());
    }

    #[test]
    fn test_decode_rejects_reserved_flags() {
        let decoder = FrameDecoder::default();
        let mut buf = BytesMut::from(&[0x80, 0][..]);
        assert_eq!(decoder.decode(&mut buf), Err(ProtocolError::InvalidFlags(0x80)));
    }

    #[test]
    fn test_decode_rejects_oversized_frame() {
        let decoder = FrameDecoder::new(16);
        let mut buf = BytesMut::from(&[0x00, 17][..]);
        assert_eq!(
            decoder.decode(&mut buf),
            Err(ProtocolError::FrameTooLarge { size: 17, max: 16 })
        );
    }

    #[test]
    fn test_ready_handshake() {
        let mut out = BytesMut::new();
        encode_frame(&ready_command(SocketType::Rep), &mut out);
        let frames = decode_all(&out);
        check_ready(&frames[0], SocketType::Req).unwrap();

        let err = check_ready(&ready_command(SocketType::Req), SocketType::Req).unwrap_err();
        assert!(matches!(err, ProtocolError::Handshake(_)));
    }

    #[test]
    fn test_ready_requires_command_frame() {
        let frame = Frame::message(&b"READY"[..], false);
        assert!(check_ready(&frame, SocketType::Req).is_err());
    }

    #[test]
    fn test_envelope_round_trip() {
        let mut out = BytesMut::new();
        encode_envelope(br#"{"code":200}"#, &mut out);
        let mut reader = EnvelopeReader::new();
        let mut body = None;
        for frame in decode_all(&out) {
            body = reader.push(frame).unwrap();
        }
        assert_eq!(&body.unwrap()[..], br#"{"code":200}"#);
    }

    #[test]
    fn test_envelope_requires_delimiter() {
        let mut reader = EnvelopeReader::new();
        let err = reader.push(Frame::message(&b"{}"[..], false)).unwrap_err();
        assert_eq!(err, ProtocolError::Envelope("missing empty delimiter"));
    }

    #[test]
    fn test_envelope_rejects_multipart_body() {
        let mut reader = EnvelopeReader::new();
        reader.push(Frame::message(Bytes::new(), true)).unwrap();
        assert_eq!(reader.push(Frame::message(&b"a"[..], true)).unwrap(), None);
        assert!(reader.push(Frame::message(&b"b"[..], false)).is_err());
    }
}
