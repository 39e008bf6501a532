// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! The secured conversation on one TCP connection: handshake, chunked send
//! and chunk reassembly.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::net::TcpStream;
use tracing::{debug, trace};

use uascope_codec::encoding::{BinaryDecode, Decoder, Encoder};
use uascope_codec::BinaryEncode;

use crate::error::{TransportError, TransportResult};
use crate::frame::{
    Acknowledge, ChunkKind, ErrorMessage, FrameHeader, MessageKind, FRAME_HEADER_SIZE,
    PROTOCOL_VERSION,
};
use crate::limits::{TransportLimits, MIN_BUFFER_SIZE};

/// Security policy URI for unsecured channels.
pub const SECURITY_POLICY_NONE_URI: &str = "http://opcfoundation.org/UA/SecurityPolicy#None";

// =============================================================================
// Endpoint URL
// =============================================================================

/// Host, port and path parsed out of an `opc.tcp://` URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointTarget {
    /// Host name or address.
    pub host: String,
    /// TCP port (4840 when the URL omits it).
    pub port: u16,
    /// Path component, including the leading slash; empty if absent.
    pub path: String,
}

impl EndpointTarget {
    /// Parses an `opc.tcp://host[:port][/path]` URL.
    pub fn parse(url: &str) -> TransportResult<Self> {
        let invalid = |reason| TransportError::InvalidEndpointUrl {
            url: url.to_string(),
            reason,
        };

        let rest = url
            .strip_prefix("opc.tcp://")
            .ok_or_else(|| invalid("scheme must be opc.tcp"))?;
        let (authority, path) = match rest.find('/') {
            Some(idx) => (&rest[..idx], &rest[idx..]),
            None => (rest, ""),
        };
        if authority.is_empty() {
            return Err(invalid("missing host"));
        }

        // Bracketed IPv6 hosts keep their colons inside the brackets.
        let (host, port_str) = if let Some(stripped) = authority.strip_prefix('[') {
            let (host, after) = stripped
                .split_once(']')
                .ok_or_else(|| invalid("unterminated ipv6 bracket"))?;
            match after.strip_prefix(':') {
                Some(port) => (host, Some(port)),
                None if after.is_empty() => (host, None),
                None => return Err(invalid("junk after ipv6 bracket")),
            }
        } else {
            match authority.rsplit_once(':') {
                Some((host, port)) => (host, Some(port)),
                None => (authority, None),
            }
        };
        if host.is_empty() {
            return Err(invalid("missing host"));
        }

        let port = match port_str {
            Some(text) => text.parse().map_err(|_| invalid("invalid port"))?,
            None => 4840,
        };

        Ok(Self {
            host: host.to_string(),
            port,
            path: path.to_string(),
        })
    }

    /// The `host:port` address to connect to.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

// =============================================================================
// Inbound messages
// =============================================================================

/// One fully reassembled inbound message.
#[derive(Debug)]
pub enum Inbound {
    /// An OPN response.
    OpenChannel {
        /// Secure channel id from the security header.
        channel_id: u32,
        /// Request id from the sequence header.
        request_id: u32,
        /// The message body.
        body: Vec<u8>,
    },
    /// A MSG response.
    Service {
        /// Secure channel id.
        channel_id: u32,
        /// Token id the peer secured the message with.
        token_id: u32,
        /// Request id from the sequence header.
        request_id: u32,
        /// The reassembled message body.
        body: Vec<u8>,
    },
}

impl Inbound {
    /// The request id this message answers.
    pub fn request_id(&self) -> u32 {
        match self {
            Self::OpenChannel { request_id, .. } | Self::Service { request_id, .. } => *request_id,
        }
    }
}

// =============================================================================
// UaStream
// =============================================================================

/// An OPC UA TCP conversation over any byte stream. Generic so tests can run
/// the full protocol over an in-memory duplex pipe.
#[derive(Debug)]
pub struct UaStream<S> {
    stream: S,
    limits: TransportLimits,
}

/// A conversation over a real TCP socket.
pub type TcpConversation = UaStream<TcpStream>;

impl UaStream<TcpStream> {
    /// Connects to `endpoint_url` and completes the hello/acknowledge
    /// handshake.
    pub async fn connect(
        endpoint_url: &str,
        limits: TransportLimits,
    ) -> TransportResult<Self> {
        let target = EndpointTarget::parse(endpoint_url)?;
        debug!(host = %target.host, port = target.port, "connecting");
        let stream = TcpStream::connect(target.address()).await?;
        stream.set_nodelay(true)?;
        let mut conversation = Self::new(stream, limits);
        conversation.handshake(endpoint_url).await?;
        Ok(conversation)
    }
}

impl<S> UaStream<S> {
    /// Wraps an already-connected stream. [`UaStream::handshake`] must run
    /// before any secured traffic.
    pub fn new(stream: S, limits: TransportLimits) -> Self {
        Self { stream, limits }
    }

    /// The limits in force (negotiated once the handshake has run).
    pub fn limits(&self) -> TransportLimits {
        self.limits
    }
}

impl<S: AsyncRead + AsyncWrite + Unpin> UaStream<S> {
    /// Splits into independently owned read and write halves so receiving
    /// can run on its own task. Both halves keep the negotiated limits.
    pub fn into_split(self) -> (UaStream<ReadHalf<S>>, UaStream<WriteHalf<S>>) {
        let (reader, writer) = tokio::io::split(self.stream);
        (
            UaStream::new(reader, self.limits),
            UaStream::new(writer, self.limits),
        )
    }

    /// Sends the hello and folds the server's acknowledge into our limits.
    pub async fn handshake(&mut self, endpoint_url: &str) -> TransportResult<Acknowledge> {
        let hello = self.limits.to_hello(endpoint_url);
        let body = hello.encode_to_vec()?;
        self.write_frame(MessageKind::Hello, ChunkKind::Final, &body)
            .await?;

        let header = self.read_header().await?;
        let body = self.read_body(&header).await?;
        match header.kind {
            MessageKind::Acknowledge => {
                let ack = Acknowledge::decode_from_slice(&body)?;
                if ack.protocol_version < PROTOCOL_VERSION {
                    return Err(TransportError::UnsupportedProtocolVersion(
                        ack.protocol_version,
                    ));
                }
                let smallest = ack.receive_buffer_size.min(ack.send_buffer_size);
                if smallest < MIN_BUFFER_SIZE {
                    return Err(TransportError::BufferTooSmall {
                        size: smallest,
                        min: MIN_BUFFER_SIZE,
                    });
                }
                self.limits = self.limits.negotiate(&ack);
                debug!(
                    send_buffer = self.limits.send_buffer_size,
                    receive_buffer = self.limits.receive_buffer_size,
                    max_message = self.limits.max_message_size,
                    max_chunks = self.limits.max_chunk_count,
                    "transport limits negotiated"
                );
                Ok(ack)
            }
            MessageKind::Error => {
                let err = ErrorMessage::decode_from_slice(&body)?;
                Err(TransportError::Rejected {
                    code: err.error,
                    reason: err.reason,
                })
            }
            other => Err(TransportError::UnexpectedMessage {
                expected: "ACK",
                actual: other.name(),
            }),
        }
    }
}

impl<S: AsyncWrite + Unpin> UaStream<S> {
    /// Sends an OPN message. The asymmetric security header for policy None
    /// carries the policy URI and null certificates; the body always fits in
    /// one chunk.
    pub async fn send_open(
        &mut self,
        channel_id: u32,
        sequence_number: u32,
        request_id: u32,
        body: &[u8],
    ) -> TransportResult<()> {
        let mut encoder = Encoder::with_capacity(body.len() + 128);
        encoder.write_u32(channel_id);
        encoder.write_string(SECURITY_POLICY_NONE_URI)?;
        encoder.write_opt_byte_string(None)?; // sender certificate
        encoder.write_opt_byte_string(None)?; // receiver certificate thumbprint
        encoder.write_u32(sequence_number);
        encoder.write_u32(request_id);
        let mut frame = encoder.finish();
        frame.extend_from_slice(body);
        trace!(request_id, len = frame.len(), "sending OPN");
        self.write_frame(MessageKind::OpenChannel, ChunkKind::Final, &frame)
            .await
    }

    /// Sends a MSG, splitting the body across chunks when it exceeds the
    /// negotiated chunk body size. `next_sequence` is called once per chunk.
    pub async fn send_service(
        &mut self,
        channel_id: u32,
        token_id: u32,
        request_id: u32,
        body: &[u8],
        mut next_sequence: impl FnMut() -> u32,
    ) -> TransportResult<()> {
        let max_body = self.limits.max_chunk_body();
        let chunks: Vec<&[u8]> = if body.is_empty() {
            vec![&[]]
        } else {
            body.chunks(max_body).collect()
        };
        if self.limits.max_chunk_count != 0 && chunks.len() > self.limits.max_chunk_count as usize {
            return Err(TransportError::TooManyChunks {
                max: self.limits.max_chunk_count,
            });
        }
        trace!(request_id, len = body.len(), chunks = chunks.len(), "sending MSG");

        let last = chunks.len() - 1;
        for (index, chunk) in chunks.into_iter().enumerate() {
            let kind = if index == last {
                ChunkKind::Final
            } else {
                ChunkKind::Intermediate
            };
            let mut encoder = Encoder::with_capacity(chunk.len() + 16);
            encoder.write_u32(channel_id);
            encoder.write_u32(token_id);
            encoder.write_u32(next_sequence());
            encoder.write_u32(request_id);
            let mut frame = encoder.finish();
            frame.extend_from_slice(chunk);
            self.write_frame(MessageKind::Message, kind, &frame).await?;
        }
        Ok(())
    }

    /// Sends the CLO message. No response follows; the caller drops the
    /// connection afterwards.
    pub async fn send_close(
        &mut self,
        channel_id: u32,
        token_id: u32,
        sequence_number: u32,
        request_id: u32,
        body: &[u8],
    ) -> TransportResult<()> {
        let mut encoder = Encoder::with_capacity(body.len() + 16);
        encoder.write_u32(channel_id);
        encoder.write_u32(token_id);
        encoder.write_u32(sequence_number);
        encoder.write_u32(request_id);
        let mut frame = encoder.finish();
        frame.extend_from_slice(body);
        trace!(request_id, "sending CLO");
        self.write_frame(MessageKind::CloseChannel, ChunkKind::Final, &frame)
            .await
    }

    async fn write_frame(
        &mut self,
        kind: MessageKind,
        chunk: ChunkKind,
        body: &[u8],
    ) -> TransportResult<()> {
        let header = FrameHeader::for_body(kind, chunk, body.len());
        self.stream.write_all(&header.to_bytes()).await?;
        self.stream.write_all(body).await?;
        self.stream.flush().await?;
        Ok(())
    }
}

impl<S: AsyncRead + Unpin> UaStream<S> {
    /// Receives the next complete message, reassembling chunks. Chunks of
    /// one message must share channel and request ids and carry increasing
    /// sequence numbers; violations and peer ERR messages fail the call.
    pub async fn recv(&mut self) -> TransportResult<Inbound> {
        let mut assembly: Option<MessageAssembly> = None;

        loop {
            let header = self.read_header().await?;
            let body = self.read_body(&header).await?;

            match header.kind {
                MessageKind::Error => {
                    let err = ErrorMessage::decode_from_slice(&body)?;
                    return Err(TransportError::PeerError {
                        code: err.error,
                        reason: err.reason,
                    });
                }
                MessageKind::OpenChannel => {
                    if assembly.is_some() {
                        return Err(TransportError::UnexpectedMessage {
                            expected: "MSG continuation",
                            actual: "OPN",
                        });
                    }
                    if header.chunk != ChunkKind::Final {
                        return Err(TransportError::UnexpectedMessage {
                            expected: "single-chunk OPN",
                            actual: "chunked OPN",
                        });
                    }
                    return decode_open_chunk(&body);
                }
                MessageKind::Message => {
                    let chunk = decode_service_chunk(&body)?;
                    let state = match assembly.as_mut() {
                        Some(state) => {
                            state.accept(&chunk, &self.limits)?;
                            state
                        }
                        None => assembly.insert(MessageAssembly::start(&chunk)),
                    };

                    match header.chunk {
                        ChunkKind::Abort => {
                            let abort = ErrorMessage::decode_from_slice(chunk.payload)?;
                            return Err(TransportError::Aborted {
                                code: abort.error,
                                reason: abort.reason,
                            });
                        }
                        ChunkKind::Intermediate => {
                            state.push(chunk.payload, &self.limits)?;
                        }
                        ChunkKind::Final => {
                            state.push(chunk.payload, &self.limits)?;
                            let body = std::mem::take(&mut state.body);
                            trace!(request_id = state.request_id, len = body.len(), "received MSG");
                            return Ok(Inbound::Service {
                                channel_id: state.channel_id,
                                token_id: state.token_id,
                                request_id: state.request_id,
                                body,
                            });
                        }
                    }
                }
                other => {
                    return Err(TransportError::UnexpectedMessage {
                        expected: "MSG or OPN",
                        actual: other.name(),
                    })
                }
            }
        }
    }

    async fn read_header(&mut self) -> TransportResult<FrameHeader> {
        let mut bytes = [0u8; FRAME_HEADER_SIZE];
        match self.stream.read_exact(&mut bytes).await {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                return Err(TransportError::ConnectionClosed)
            }
            Err(e) => return Err(e.into()),
        }
        let header = FrameHeader::from_bytes(bytes)?;
        if self.limits.receive_buffer_size != 0 && header.size > self.limits.receive_buffer_size {
            return Err(TransportError::FrameTooLarge {
                size: header.size,
                max: self.limits.receive_buffer_size,
            });
        }
        Ok(header)
    }

    async fn read_body(&mut self, header: &FrameHeader) -> TransportResult<Vec<u8>> {
        let mut body = vec![0u8; header.body_len()];
        match self.stream.read_exact(&mut body).await {
            Ok(_) => Ok(body),
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                Err(TransportError::ConnectionClosed)
            }
            Err(e) => Err(e.into()),
        }
    }
}

// =============================================================================
// Chunk parsing and reassembly
// =============================================================================

struct ServiceChunk<'a> {
    channel_id: u32,
    token_id: u32,
    sequence_number: u32,
    request_id: u32,
    payload: &'a [u8],
}

fn decode_service_chunk(body: &[u8]) -> TransportResult<ServiceChunk<'_>> {
    let mut decoder = Decoder::new(body);
    let channel_id = decoder.read_u32()?;
    let token_id = decoder.read_u32()?;
    let sequence_number = decoder.read_u32()?;
    let request_id = decoder.read_u32()?;
    Ok(ServiceChunk {
        channel_id,
        token_id,
        sequence_number,
        request_id,
        payload: &body[16..],
    })
}

fn decode_open_chunk(body: &[u8]) -> TransportResult<Inbound> {
    let mut decoder = Decoder::new(body);
    let channel_id = decoder.read_u32()?;
    let _policy_uri = decoder.read_opt_string()?;
    let _sender_certificate = decoder.read_opt_byte_string()?;
    let _thumbprint = decoder.read_opt_byte_string()?;
    let _sequence_number = decoder.read_u32()?;
    let request_id = decoder.read_u32()?;
    let remaining = decoder.remaining();
    let payload = decoder.read_bytes(remaining)?.to_vec();
    Ok(Inbound::OpenChannel {
        channel_id,
        request_id,
        body: payload,
    })
}

struct MessageAssembly {
    channel_id: u32,
    token_id: u32,
    request_id: u32,
    last_sequence: u32,
    chunk_count: u32,
    body: Vec<u8>,
}

impl MessageAssembly {
    fn start(chunk: &ServiceChunk<'_>) -> Self {
        Self {
            channel_id: chunk.channel_id,
            token_id: chunk.token_id,
            request_id: chunk.request_id,
            last_sequence: chunk.sequence_number,
            chunk_count: 1,
            body: Vec::new(),
        }
    }

    fn accept(&mut self, chunk: &ServiceChunk<'_>, limits: &TransportLimits) -> TransportResult<()> {
        if chunk.channel_id != self.channel_id {
            return Err(TransportError::ChannelIdMismatch {
                started: self.channel_id,
                got: chunk.channel_id,
            });
        }
        if chunk.request_id != self.request_id {
            return Err(TransportError::RequestIdMismatch {
                started: self.request_id,
                got: chunk.request_id,
            });
        }
        if chunk.sequence_number <= self.last_sequence {
            return Err(TransportError::SequenceRegression {
                previous: self.last_sequence,
                got: chunk.sequence_number,
            });
        }
        self.last_sequence = chunk.sequence_number;
        self.chunk_count += 1;
        if limits.max_chunk_count != 0 && self.chunk_count > limits.max_chunk_count {
            return Err(TransportError::TooManyChunks {
                max: limits.max_chunk_count,
            });
        }
        Ok(())
    }

    fn push(&mut self, payload: &[u8], limits: &TransportLimits) -> TransportResult<()> {
        self.body.extend_from_slice(payload);
        if limits.max_message_size != 0 && self.body.len() > limits.max_message_size as usize {
            return Err(TransportError::MessageTooLarge {
                size: self.body.len(),
                max: limits.max_message_size,
            });
        }
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(kind: MessageKind, chunk: ChunkKind, body: &[u8]) -> Vec<u8> {
        let mut bytes = FrameHeader::for_body(kind, chunk, body.len()).to_bytes().to_vec();
        bytes.extend_from_slice(body);
        bytes
    }

    fn ack_frame() -> Vec<u8> {
        let mut encoder = Encoder::new();
        encoder.write_u32(PROTOCOL_VERSION);
        encoder.write_u32(65536); // receive buffer
        encoder.write_u32(65536); // send buffer
        encoder.write_u32(0); // max message
        encoder.write_u32(0); // max chunks
        frame(MessageKind::Acknowledge, ChunkKind::Final, &encoder.finish())
    }

    fn service_chunk(
        chunk: ChunkKind,
        channel_id: u32,
        token_id: u32,
        sequence: u32,
        request_id: u32,
        payload: &[u8],
    ) -> Vec<u8> {
        let mut encoder = Encoder::new();
        encoder.write_u32(channel_id);
        encoder.write_u32(token_id);
        encoder.write_u32(sequence);
        encoder.write_u32(request_id);
        let mut body = encoder.finish();
        body.extend_from_slice(payload);
        frame(MessageKind::Message, chunk, &body)
    }

    #[tokio::test]
    async fn test_handshake_negotiates_limits() {
        let (client_io, mut server_io) = tokio::io::duplex(65536);
        let mut client = UaStream::new(client_io, TransportLimits::default());

        let server = tokio::spawn(async move {
            let mut header = [0u8; FRAME_HEADER_SIZE];
            server_io.read_exact(&mut header).await.unwrap();
            assert_eq!(&header[..4], b"HELF");
            let size = u32::from_le_bytes(header[4..].try_into().unwrap()) as usize;
            let mut body = vec![0u8; size - FRAME_HEADER_SIZE];
            server_io.read_exact(&mut body).await.unwrap();
            server_io.write_all(&ack_frame()).await.unwrap();
        });

        let ack = client.handshake("opc.tcp://localhost:4840").await.unwrap();
        assert_eq!(ack.receive_buffer_size, 65536);
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_handshake_rejects_tiny_ack_buffers() {
        let (client_io, mut server_io) = tokio::io::duplex(65536);
        let mut client = UaStream::new(client_io, TransportLimits::default());

        let server = tokio::spawn(async move {
            let mut header = [0u8; FRAME_HEADER_SIZE];
            server_io.read_exact(&mut header).await.unwrap();
            let size = u32::from_le_bytes(header[4..].try_into().unwrap()) as usize;
            let mut body = vec![0u8; size - FRAME_HEADER_SIZE];
            server_io.read_exact(&mut body).await.unwrap();

            // A buffer this small cannot even hold the chunk headers.
            let mut encoder = Encoder::new();
            encoder.write_u32(PROTOCOL_VERSION);
            encoder.write_u32(16); // receive buffer
            encoder.write_u32(65536); // send buffer
            encoder.write_u32(0);
            encoder.write_u32(0);
            let ack = frame(MessageKind::Acknowledge, ChunkKind::Final, &encoder.finish());
            server_io.write_all(&ack).await.unwrap();
        });

        let err = client
            .handshake("opc.tcp://localhost:4840")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            TransportError::BufferTooSmall { size: 16, min: MIN_BUFFER_SIZE }
        ));
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_handshake_rejection_surfaces_reason() {
        let (client_io, mut server_io) = tokio::io::duplex(65536);
        let mut client = UaStream::new(client_io, TransportLimits::default());

        let server = tokio::spawn(async move {
            let mut header = [0u8; FRAME_HEADER_SIZE];
            server_io.read_exact(&mut header).await.unwrap();
            let size = u32::from_le_bytes(header[4..].try_into().unwrap()) as usize;
            let mut body = vec![0u8; size - FRAME_HEADER_SIZE];
            server_io.read_exact(&mut body).await.unwrap();

            let mut encoder = Encoder::new();
            encoder.write_u32(0x8082_0000);
            encoder.write_opt_string(Some("server full")).unwrap();
            let err = frame(MessageKind::Error, ChunkKind::Final, &encoder.finish());
            server_io.write_all(&err).await.unwrap();
        });

        let err = client
            .handshake("opc.tcp://localhost:4840")
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Rejected { code: 0x8082_0000, .. }));
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_recv_reassembles_chunks() {
        let (client_io, mut server_io) = tokio::io::duplex(65536);
        let mut client = UaStream::new(client_io, TransportLimits::default());

        server_io
            .write_all(&service_chunk(ChunkKind::Intermediate, 7, 3, 10, 42, b"hello "))
            .await
            .unwrap();
        server_io
            .write_all(&service_chunk(ChunkKind::Final, 7, 3, 11, 42, b"world"))
            .await
            .unwrap();

        match client.recv().await.unwrap() {
            Inbound::Service {
                channel_id,
                token_id,
                request_id,
                body,
            } => {
                assert_eq!(channel_id, 7);
                assert_eq!(token_id, 3);
                assert_eq!(request_id, 42);
                assert_eq!(body, b"hello world");
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_recv_rejects_request_id_change() {
        let (client_io, mut server_io) = tokio::io::duplex(65536);
        let mut client = UaStream::new(client_io, TransportLimits::default());

        server_io
            .write_all(&service_chunk(ChunkKind::Intermediate, 7, 3, 10, 42, b"a"))
            .await
            .unwrap();
        server_io
            .write_all(&service_chunk(ChunkKind::Final, 7, 3, 11, 43, b"b"))
            .await
            .unwrap();

        let err = client.recv().await.unwrap_err();
        assert!(matches!(
            err,
            TransportError::RequestIdMismatch { started: 42, got: 43 }
        ));
    }

    #[tokio::test]
    async fn test_recv_rejects_sequence_regression() {
        let (client_io, mut server_io) = tokio::io::duplex(65536);
        let mut client = UaStream::new(client_io, TransportLimits::default());

        server_io
            .write_all(&service_chunk(ChunkKind::Intermediate, 7, 3, 10, 42, b"a"))
            .await
            .unwrap();
        server_io
            .write_all(&service_chunk(ChunkKind::Final, 7, 3, 10, 42, b"b"))
            .await
            .unwrap();

        let err = client.recv().await.unwrap_err();
        assert!(matches!(
            err,
            TransportError::SequenceRegression { previous: 10, got: 10 }
        ));
    }

    #[tokio::test]
    async fn test_recv_abort_chunk_is_nonfatal() {
        let (client_io, mut server_io) = tokio::io::duplex(65536);
        let mut client = UaStream::new(client_io, TransportLimits::default());

        let mut abort_body = Encoder::new();
        abort_body.write_u32(0x80B1_0000);
        abort_body.write_opt_string(Some("response too large")).unwrap();
        server_io
            .write_all(&service_chunk(
                ChunkKind::Abort,
                7,
                3,
                10,
                42,
                &abort_body.finish(),
            ))
            .await
            .unwrap();

        let err = client.recv().await.unwrap_err();
        assert!(matches!(err, TransportError::Aborted { code: 0x80B1_0000, .. }));
        assert!(!err.is_fatal());
    }

    #[tokio::test]
    async fn test_send_service_chunks_large_bodies() {
        let limits = TransportLimits {
            send_buffer_size: 8192,
            ..Default::default()
        };
        let (client_io, mut server_io) = tokio::io::duplex(1 << 20);
        let mut client = UaStream::new(client_io, limits);

        let body = vec![0xABu8; 20_000];
        let mut seq = 0u32;
        client
            .send_service(9, 4, 77, &body, || {
                seq += 1;
                seq
            })
            .await
            .unwrap();
        // 20000 bytes over 8168-byte chunk bodies means three chunks.
        assert_eq!(seq, 3);

        let mut reassembled = Vec::new();
        for expected_seq in 1..=3u32 {
            let mut header = [0u8; FRAME_HEADER_SIZE];
            server_io.read_exact(&mut header).await.unwrap();
            let parsed = FrameHeader::from_bytes(header).unwrap();
            assert_eq!(parsed.kind, MessageKind::Message);
            let mut body = vec![0u8; parsed.body_len()];
            server_io.read_exact(&mut body).await.unwrap();
            let chunk = decode_service_chunk(&body).unwrap();
            assert_eq!(chunk.channel_id, 9);
            assert_eq!(chunk.token_id, 4);
            assert_eq!(chunk.request_id, 77);
            assert_eq!(chunk.sequence_number, expected_seq);
            reassembled.extend_from_slice(chunk.payload);
        }
        assert_eq!(reassembled.len(), 20_000);
    }

    #[test]
    fn test_endpoint_target_parsing() {
        let target = EndpointTarget::parse("opc.tcp://localhost:4840").unwrap();
        assert_eq!(target.host, "localhost");
        assert_eq!(target.port, 4840);
        assert_eq!(target.path, "");

        let target = EndpointTarget::parse("opc.tcp://plc.example.com/path/to/server").unwrap();
        assert_eq!(target.port, 4840);
        assert_eq!(target.path, "/path/to/server");

        let target = EndpointTarget::parse("opc.tcp://[::1]:4841").unwrap();
        assert_eq!(target.host, "::1");
        assert_eq!(target.port, 4841);

        assert!(EndpointTarget::parse("http://localhost").is_err());
        assert!(EndpointTarget::parse("opc.tcp://").is_err());
        assert!(EndpointTarget::parse("opc.tcp://host:notaport").is_err());
    }
}
