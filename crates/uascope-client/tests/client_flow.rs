// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! End-to-end client tests against a scripted in-memory server.
//!
//! The server side of a duplex pipe answers the handshake, channel open and
//! session sequence, then serves reads, subscriptions and publishes the way
//! a minimal live server would.

use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::time::timeout;

use uascope_client::{Client, ClientConfig, ClientError, SessionState, SubscriptionOptions};
use uascope_codec::services::{peek_type_id, ResponseHeader};
use uascope_codec::{
    BinaryEncode, DataValue, Decoder, Encoder, ExtensionObject, NodeId, StatusCode, UaDateTime,
    Variant,
};

const CHANNEL_ID: u32 = 7;
const TOKEN_ID: u32 = 3;
const SUBSCRIPTION_ID: u32 = 33;

// =============================================================================
// Scripted server
// =============================================================================

#[derive(Clone, Copy)]
struct ServerScript {
    /// Whether Read requests get a response; leaving them unanswered lets
    /// tests exercise the caller-side timeout.
    answer_reads: bool,
}

impl Default for ServerScript {
    fn default() -> Self {
        Self { answer_reads: true }
    }
}

async fn read_frame(io: &mut DuplexStream) -> Option<([u8; 3], Vec<u8>)> {
    let mut header = [0u8; 8];
    io.read_exact(&mut header).await.ok()?;
    let size = u32::from_le_bytes(header[4..8].try_into().unwrap()) as usize;
    let mut body = vec![0u8; size - 8];
    io.read_exact(&mut body).await.ok()?;
    Some(([header[0], header[1], header[2]], body))
}

async fn write_frame(io: &mut DuplexStream, kind: &[u8; 3], body: &[u8]) {
    let mut frame = Vec::with_capacity(8 + body.len());
    frame.extend_from_slice(kind);
    frame.push(b'F');
    frame.extend_from_slice(&((body.len() + 8) as u32).to_le_bytes());
    frame.extend_from_slice(body);
    // The client may already have hung up during shutdown.
    let _ = io.write_all(&frame).await;
}

fn ack_body() -> Vec<u8> {
    let mut encoder = Encoder::new();
    encoder.write_u32(0); // protocol version
    encoder.write_u32(65536);
    encoder.write_u32(65536);
    encoder.write_u32(0);
    encoder.write_u32(0);
    encoder.finish()
}

fn opn_request_id(body: &[u8]) -> u32 {
    let mut decoder = Decoder::new(body);
    decoder.read_u32().unwrap(); // channel id
    decoder.read_opt_string().unwrap(); // policy uri
    decoder.read_opt_byte_string().unwrap(); // sender certificate
    decoder.read_opt_byte_string().unwrap(); // thumbprint
    decoder.read_u32().unwrap(); // sequence number
    decoder.read_u32().unwrap()
}

fn opn_response(request_id: u32) -> Vec<u8> {
    let mut encoder = Encoder::new();
    encoder.write_u32(CHANNEL_ID);
    encoder
        .write_string("http://opcfoundation.org/UA/SecurityPolicy#None")
        .unwrap();
    encoder.write_opt_byte_string(None).unwrap();
    encoder.write_opt_byte_string(None).unwrap();
    encoder.write_u32(1); // sequence number
    encoder.write_u32(request_id);

    NodeId::numeric(0, 449).encode(&mut encoder).unwrap();
    ResponseHeader::default().encode(&mut encoder).unwrap();
    encoder.write_u32(0); // server protocol version
    encoder.write_u32(CHANNEL_ID);
    encoder.write_u32(TOKEN_ID);
    UaDateTime::now().encode(&mut encoder).unwrap();
    encoder.write_u32(600_000); // revised lifetime
    encoder.write_opt_byte_string(None).unwrap();
    encoder.finish()
}

fn response_body(type_id: u32, fields: impl FnOnce(&mut Encoder)) -> Vec<u8> {
    let mut encoder = Encoder::new();
    NodeId::numeric(0, type_id).encode(&mut encoder).unwrap();
    ResponseHeader::default().encode(&mut encoder).unwrap();
    fields(&mut encoder);
    encoder.finish()
}

fn get_endpoints_response() -> Vec<u8> {
    response_body(431, |encoder| {
        encoder.write_array_len(None).unwrap();
    })
}

fn create_session_response() -> Vec<u8> {
    response_body(464, |encoder| {
        NodeId::numeric(1, 1000).encode(encoder).unwrap(); // session id
        NodeId::opaque(0, vec![0xAA; 16]).encode(encoder).unwrap(); // auth token
        encoder.write_f64(30_000.0); // revised timeout
        encoder.write_opt_byte_string(Some(&[9u8; 32])).unwrap();
        encoder.write_opt_byte_string(None).unwrap();
    })
}

fn activate_session_response() -> Vec<u8> {
    response_body(470, |encoder| {
        encoder.write_opt_byte_string(None).unwrap();
    })
}

fn read_response(value: f64) -> Vec<u8> {
    response_body(634, |encoder| {
        encoder.write_array_len(Some(1)).unwrap();
        DataValue::value_only(Variant::Double(value))
            .encode(encoder)
            .unwrap();
        encoder.write_array_len(None).unwrap();
    })
}

fn create_subscription_response() -> Vec<u8> {
    response_body(790, |encoder| {
        encoder.write_u32(SUBSCRIPTION_ID);
        encoder.write_f64(100.0);
        encoder.write_u32(600);
        encoder.write_u32(20);
    })
}

fn create_monitored_items_response() -> Vec<u8> {
    response_body(754, |encoder| {
        encoder.write_array_len(Some(1)).unwrap();
        StatusCode::GOOD.encode(encoder).unwrap();
        encoder.write_u32(9); // monitored item id
        encoder.write_f64(100.0);
        encoder.write_u32(1);
        ExtensionObject::null().encode(encoder).unwrap();
        encoder.write_array_len(None).unwrap();
    })
}

fn publish_response(client_handle: u32, value: f64) -> Vec<u8> {
    let mut inner = Encoder::new();
    inner.write_array_len(Some(1)).unwrap();
    inner.write_u32(client_handle);
    DataValue::value_only(Variant::Double(value))
        .encode(&mut inner)
        .unwrap();
    inner.write_array_len(None).unwrap();
    let notification = ExtensionObject::binary(NodeId::numeric(0, 811), inner.finish());

    response_body(829, |encoder| {
        encoder.write_u32(SUBSCRIPTION_ID);
        encoder.write_array_len(None).unwrap(); // available sequence numbers
        encoder.write_bool(false); // more notifications
        encoder.write_u32(1); // sequence number
        UaDateTime::now().encode(encoder).unwrap();
        encoder.write_array_len(Some(1)).unwrap();
        notification.encode(encoder).unwrap();
        encoder.write_array_len(None).unwrap(); // results
        encoder.write_array_len(None).unwrap(); // diagnostics
    })
}

fn delete_subscriptions_response() -> Vec<u8> {
    response_body(850, |encoder| {
        encoder.write_array_len(Some(1)).unwrap();
        StatusCode::GOOD.encode(encoder).unwrap();
        encoder.write_array_len(None).unwrap();
    })
}

fn close_session_response() -> Vec<u8> {
    response_body(476, |_| {})
}

fn service_frame(sequence: u32, request_id: u32, body: &[u8]) -> Vec<u8> {
    let mut encoder = Encoder::new();
    encoder.write_u32(CHANNEL_ID);
    encoder.write_u32(TOKEN_ID);
    encoder.write_u32(sequence);
    encoder.write_u32(request_id);
    let mut out = encoder.finish();
    out.extend_from_slice(body);
    out
}

/// Drives the server side of the pipe: handshake, channel, session, then
/// request-by-request responses. The first publish is answered with one data
/// change; later publishes are held open as a live server would.
async fn run_server(mut io: DuplexStream, script: ServerScript) {
    let Some((kind, _)) = read_frame(&mut io).await else {
        return;
    };
    assert_eq!(&kind, b"HEL");
    write_frame(&mut io, b"ACK", &ack_body()).await;

    let mut sequence = 0u32;
    let mut published = false;
    while let Some((kind, body)) = read_frame(&mut io).await {
        match &kind {
            b"OPN" => {
                let request_id = opn_request_id(&body);
                write_frame(&mut io, b"OPN", &opn_response(request_id)).await;
            }
            b"MSG" => {
                let request_id = u32::from_le_bytes(body[12..16].try_into().unwrap());
                let type_id = peek_type_id(&body[16..]).unwrap().as_numeric().unwrap();
                let response = match type_id {
                    428 => Some(get_endpoints_response()),
                    461 => Some(create_session_response()),
                    467 => Some(activate_session_response()),
                    631 if script.answer_reads => Some(read_response(42.0)),
                    631 => None,
                    787 => Some(create_subscription_response()),
                    751 => Some(create_monitored_items_response()),
                    826 if !published => {
                        published = true;
                        Some(publish_response(1, 2.5))
                    }
                    826 => None,
                    847 => Some(delete_subscriptions_response()),
                    473 => Some(close_session_response()),
                    other => panic!("unexpected service request {other}"),
                };
                if let Some(response) = response {
                    sequence += 1;
                    write_frame(&mut io, b"MSG", &service_frame(sequence, request_id, &response))
                        .await;
                }
            }
            b"CLO" => break,
            other => panic!("unexpected message kind {other:?}"),
        }
    }
}

async fn connect(script: ServerScript, config: ClientConfig) -> Client {
    let (client_io, server_io) = tokio::io::duplex(1 << 16);
    tokio::spawn(run_server(server_io, script));
    Client::connect_over(client_io, config)
        .await
        .expect("connect failed")
}

fn test_config() -> ClientConfig {
    ClientConfig::builder("opc.tcp://testserver:4840")
        .request_timeout(Duration::from_secs(2))
        .build()
        .unwrap()
}

// =============================================================================
// Tests
// =============================================================================

#[tokio::test]
async fn test_connect_read_disconnect() {
    let client = connect(ServerScript::default(), test_config()).await;
    assert_eq!(client.state(), SessionState::Active);

    let value = client
        .read(&NodeId::string(2, "Process.Temperature"))
        .await
        .unwrap();
    assert_eq!(value.value, Some(Variant::Double(42.0)));

    let stats = client.stats();
    assert!(stats.requests_sent > 0);
    assert!(stats.responses_received > 0);
    assert_eq!(stats.reconnects, 0);

    client.disconnect().await.unwrap();
}

#[tokio::test]
async fn test_subscription_delivers_data_changes() {
    let client = connect(ServerScript::default(), test_config()).await;

    let node = NodeId::string(2, "Process.Temperature");
    let (handle, mut changes) = client
        .subscribe(vec![node.clone()], SubscriptionOptions::default())
        .await
        .unwrap();
    assert_eq!(handle.id, SUBSCRIPTION_ID);

    let change = timeout(Duration::from_secs(2), changes.recv())
        .await
        .expect("no data change within deadline")
        .expect("change stream closed");
    assert_eq!(change.subscription_id, SUBSCRIPTION_ID);
    assert_eq!(change.node_id, node);
    assert_eq!(change.value.value, Some(Variant::Double(2.5)));

    client.unsubscribe(handle).await.unwrap();
    // A second cancel has nothing left to delete.
    let err = client.unsubscribe(handle).await.unwrap_err();
    assert!(matches!(err, ClientError::SubscriptionGone(id) if id == SUBSCRIPTION_ID));

    client.disconnect().await.unwrap();
}

#[tokio::test]
async fn test_unanswered_read_times_out() {
    let config = ClientConfig::builder("opc.tcp://testserver:4840")
        .request_timeout(Duration::from_millis(200))
        .build()
        .unwrap();
    let client = connect(ServerScript { answer_reads: false }, config).await;

    let err = client
        .read(&NodeId::string(2, "Process.Temperature"))
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::Timeout { .. }));
    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_silent_server_fails_connect_within_timeout() {
    // Keep the server half open but never answer the hello.
    let (client_io, _server_io) = tokio::io::duplex(1 << 16);
    let config = ClientConfig::builder("opc.tcp://testserver:4840")
        .request_timeout(Duration::from_millis(100))
        .build()
        .unwrap();

    let err = Client::connect_over(client_io, config).await.unwrap_err();
    assert!(matches!(err, ClientError::Timeout { .. }));
}

#[tokio::test]
async fn test_empty_read_is_rejected() {
    let client = connect(ServerScript::default(), test_config()).await;
    let err = client.read_many(Vec::new()).await.unwrap_err();
    assert!(!err.is_retryable());
    client.disconnect().await.unwrap();
}
