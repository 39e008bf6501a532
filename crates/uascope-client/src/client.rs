// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! The client facade and the connection task behind it.
//!
//! A connected client is a handle onto a background connection task. The
//! task owns the write half of the stream, the secure channel counters and
//! the session; a separate reader task forwards reassembled messages into
//! it. Responses are matched to requests by request id through a pending
//! map, so keep-alive reads, token renewals and the publish pump share the
//! connection with caller requests. On connection loss the task re-dials
//! with backoff, re-establishes channel and session, and recreates every
//! live subscription.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rand::Rng;
use tokio::io::{AsyncRead, AsyncWrite, ReadHalf, WriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{interval, timeout, MissedTickBehavior};
use tracing::{debug, info, warn};

use uascope_codec::services::attribute::{
    AttributeId, ReadRequest, ReadResponse, ReadValueId, TimestampsToReturn, WriteRequest,
    WriteResponse, WriteValue,
};
use uascope_codec::services::channel::CLOSE_SECURE_CHANNEL_TYPE_ID;
use uascope_codec::services::discovery::{
    ApplicationDescription, EndpointDescription, GetEndpointsRequest, GetEndpointsResponse,
    UserTokenKind,
};
use uascope_codec::services::session::{
    ActivateSessionRequest, AnonymousIdentityToken, CloseSessionRequest, CreateSessionRequest,
    CreateSessionResponse, SignatureData, UserNameIdentityToken,
};
use uascope_codec::services::subscription::{
    CreateMonitoredItemsRequest, CreateMonitoredItemsResponse, CreateSubscriptionRequest,
    CreateSubscriptionResponse, DeleteSubscriptionsRequest, MonitoredItemCreateRequest,
    MonitoringMode, MonitoringParameters, PublishRequest, PublishResponse,
};
use uascope_codec::services::view::{
    BrowseDescription, BrowseRequest, BrowseResult, ReferenceDescription, ViewDescription,
};
use uascope_codec::services::{
    self, DecodedResponse, RequestHeader, ServiceRequest, ServiceResponse,
};
use uascope_codec::{BinaryEncode, DataValue, Encoder, NodeId, StatusCode, Variant};
use uascope_transport::{Inbound, TransportResult, UaStream};

use crate::channel::SecureChannel;
use crate::config::{ClientConfig, IdentityToken};
use crate::error::{ClientError, ClientResult};
use crate::session::{Session, SessionState};
use crate::subscription::{
    DataChange, ItemRecord, SubscriptionHandle, SubscriptionOptions, SubscriptionRecord,
    SubscriptionRegistry,
};

/// Byte streams the client can run over.
pub trait ByteStream: AsyncRead + AsyncWrite + Send + Unpin {}
impl<T: AsyncRead + AsyncWrite + Send + Unpin> ByteStream for T {}

type BoxedStream = Box<dyn ByteStream>;
type ReplyTx = oneshot::Sender<ClientResult<Vec<u8>>>;
type EncodeFn = Box<dyn FnOnce(RequestHeader) -> ClientResult<Vec<u8>> + Send>;

/// Queue depth for data change delivery to a subscriber.
const DATA_CHANGE_QUEUE: usize = 256;

// =============================================================================
// Statistics
// =============================================================================

/// Counters and state exposed by [`Client::stats`].
#[derive(Debug, Clone)]
pub struct ClientStats {
    /// Current session state.
    pub state: SessionState,
    /// Service requests sent, internal traffic included.
    pub requests_sent: u64,
    /// Responses matched to a pending request.
    pub responses_received: u64,
    /// Successful reconnections.
    pub reconnects: u32,
    /// Consecutive keep-alive failures right now.
    pub keep_alive_strikes: u32,
}

impl ClientStats {
    fn new() -> Self {
        Self {
            state: SessionState::NotCreated,
            requests_sent: 0,
            responses_received: 0,
            reconnects: 0,
            keep_alive_strikes: 0,
        }
    }
}

// =============================================================================
// Commands
// =============================================================================

enum Command {
    Request {
        operation: &'static str,
        encode: EncodeFn,
        reply: ReplyTx,
    },
    ReserveHandles {
        count: usize,
        reply: oneshot::Sender<Vec<u32>>,
    },
    RegisterSubscription {
        record: SubscriptionRecord,
    },
    DropSubscription {
        id: u32,
        reply: oneshot::Sender<bool>,
    },
    Disconnect {
        reply: oneshot::Sender<()>,
    },
}

// =============================================================================
// Client facade
// =============================================================================

/// Handle onto a connected OPC UA client. Cheap to clone; all clones share
/// one connection.
#[derive(Debug, Clone)]
pub struct Client {
    commands: mpsc::Sender<Command>,
    stats: Arc<Mutex<ClientStats>>,
    request_timeout: Duration,
}

impl Client {
    /// Connects over TCP: dial, hello/acknowledge, secure channel, endpoint
    /// discovery, session creation and activation.
    pub async fn connect(config: ClientConfig) -> ClientResult<Self> {
        config.validate()?;
        let stream = dial(&config).await?;
        Self::start(stream, config, true).await
    }

    /// Connects over an already-established byte stream. Used by tests to
    /// run against an in-memory server; reconnection is unavailable because
    /// the stream cannot be re-dialed.
    pub async fn connect_over(
        stream: impl ByteStream + 'static,
        config: ClientConfig,
    ) -> ClientResult<Self> {
        config.validate()?;
        Self::start(Box::new(stream), config, false).await
    }

    async fn start(stream: BoxedStream, config: ClientConfig, can_redial: bool) -> ClientResult<Self> {
        let stats = Arc::new(Mutex::new(ClientStats::new()));
        let request_timeout = config.request_timeout;

        let transport = open_transport(stream, &config).await?;
        let link = establish(transport, &config, &stats).await?;

        let (command_tx, command_rx) = mpsc::channel(64);
        let connection = Connection {
            link,
            pending: HashMap::new(),
            registry: SubscriptionRegistry::default(),
            config,
            stats: Arc::clone(&stats),
            can_redial,
            keep_alive_pending: None,
            keep_alive_strikes: 0,
            renew_pending: None,
            publish_pending: None,
        };
        tokio::spawn(connection.run(command_rx));

        Ok(Self {
            commands: command_tx,
            stats,
            request_timeout,
        })
    }

    /// Current session state.
    pub fn state(&self) -> SessionState {
        self.stats.lock().state
    }

    /// Snapshot of connection statistics.
    pub fn stats(&self) -> ClientStats {
        self.stats.lock().clone()
    }

    /// Reads the Value attribute of a single node.
    pub async fn read(&self, node_id: &NodeId) -> ClientResult<DataValue> {
        let mut values = self
            .read_many(vec![ReadValueId::value_of(node_id.clone())])
            .await?;
        Ok(values.remove(0))
    }

    /// Reads several node/attribute pairs in one request. Results are
    /// positional; per-item failures come back as bad-status data values.
    pub async fn read_many(&self, nodes: Vec<ReadValueId>) -> ClientResult<Vec<DataValue>> {
        let expected = nodes.len();
        let response: ReadResponse = self
            .service("read", move |request_header| {
                let request = ReadRequest {
                    request_header,
                    max_age: 0.0,
                    timestamps_to_return: TimestampsToReturn::Both,
                    nodes_to_read: nodes,
                };
                request.validate()?;
                Ok(request)
            })
            .await?;
        expect_results("read", expected, response.results)
    }

    /// Writes the Value attribute of a single node.
    pub async fn write(&self, node_id: &NodeId, value: Variant) -> ClientResult<StatusCode> {
        let mut results = self
            .write_many(vec![WriteValue::value_of(
                node_id.clone(),
                DataValue::value_only(value),
            )])
            .await?;
        Ok(results.remove(0))
    }

    /// Writes several values in one request. Results are positional status
    /// codes; a bad status for one item does not fail the call.
    pub async fn write_many(&self, nodes: Vec<WriteValue>) -> ClientResult<Vec<StatusCode>> {
        let expected = nodes.len();
        let response: WriteResponse = self
            .service("write", move |request_header| {
                Ok(WriteRequest {
                    request_header,
                    nodes_to_write: nodes,
                })
            })
            .await?;
        expect_results("write", expected, response.results)
    }

    /// Lists the forward hierarchical references of a node.
    pub async fn browse(&self, node_id: &NodeId) -> ClientResult<Vec<ReferenceDescription>> {
        let mut results = self
            .browse_many(vec![BrowseDescription::hierarchical(node_id.clone())])
            .await?;
        let result = results.remove(0);
        if result.status_code.is_bad() {
            return Err(ClientError::fault("browse", result.status_code));
        }
        if result.is_truncated() {
            warn!(node = %node_id, "browse result truncated by server");
        }
        Ok(result.references.unwrap_or_default())
    }

    /// Browses several starting nodes in one request.
    pub async fn browse_many(
        &self,
        nodes: Vec<BrowseDescription>,
    ) -> ClientResult<Vec<BrowseResult>> {
        let expected = nodes.len();
        let response = self
            .service("browse", move |request_header| {
                Ok(BrowseRequest {
                    request_header,
                    view: ViewDescription::default(),
                    requested_max_references_per_node: 0,
                    nodes_to_browse: nodes,
                })
            })
            .await?;
        expect_results("browse", expected, response.results)
    }

    /// Asks the server for its advertised endpoints.
    pub async fn get_endpoints(&self) -> ClientResult<Vec<EndpointDescription>> {
        let response: GetEndpointsResponse = self
            .service("get endpoints", move |request_header| {
                Ok(GetEndpointsRequest {
                    request_header,
                    endpoint_url: None,
                    locale_ids: None,
                    profile_uris: None,
                })
            })
            .await?;
        Ok(response.endpoints.unwrap_or_default())
    }

    /// Creates a subscription monitoring the Value attribute of each node
    /// and returns the handle plus the data change stream.
    pub async fn subscribe(
        &self,
        nodes: Vec<NodeId>,
        options: SubscriptionOptions,
    ) -> ClientResult<(SubscriptionHandle, mpsc::Receiver<DataChange>)> {
        if nodes.is_empty() {
            return Err(ClientError::config("subscribe requires at least one node"));
        }

        let created: CreateSubscriptionResponse = {
            let options = options.clone();
            self.service("create subscription", move |request_header| {
                Ok(CreateSubscriptionRequest {
                    request_header,
                    requested_publishing_interval_ms: options.publishing_interval.as_secs_f64()
                        * 1000.0,
                    requested_lifetime_count: options.lifetime_count,
                    requested_max_keep_alive_count: options.max_keep_alive_count,
                    max_notifications_per_publish: options.max_notifications_per_publish,
                    publishing_enabled: true,
                    priority: options.priority,
                })
            })
            .await?
        };
        let subscription_id = created.subscription_id;
        debug!(
            subscription_id,
            revised_interval_ms = created.revised_publishing_interval_ms,
            "subscription created"
        );

        let handles = self.reserve_handles(nodes.len()).await?;
        let created_items: CreateMonitoredItemsResponse = {
            let items = nodes
                .iter()
                .zip(&handles)
                .map(|(node, &handle)| MonitoredItemCreateRequest {
                    item_to_monitor: ReadValueId::attribute_of(node.clone(), AttributeId::Value),
                    monitoring_mode: MonitoringMode::Reporting,
                    requested_parameters: MonitoringParameters {
                        sampling_interval_ms: options.sampling_interval_ms(),
                        queue_size: options.queue_size,
                        ..MonitoringParameters::with_handle(handle)
                    },
                })
                .collect::<Vec<_>>();
            self.service("create monitored items", move |request_header| {
                Ok(CreateMonitoredItemsRequest {
                    request_header,
                    subscription_id,
                    timestamps_to_return: TimestampsToReturn::Both,
                    items_to_create: items,
                })
            })
            .await?
        };

        let results = created_items.results.unwrap_or_default();
        let mut items = Vec::with_capacity(nodes.len());
        let mut first_bad = None;
        for ((node, handle), result) in nodes.into_iter().zip(handles).zip(&results) {
            if result.status_code.is_bad() {
                warn!(node = %node, status = %result.status_code, "monitored item rejected");
                first_bad.get_or_insert(result.status_code);
                continue;
            }
            items.push(ItemRecord {
                client_handle: handle,
                node_id: node,
                monitored_item_id: result.monitored_item_id,
            });
        }
        if items.is_empty() {
            let status = first_bad.unwrap_or(StatusCode::BAD);
            return Err(ClientError::fault("create monitored items", status));
        }

        let (sender, receiver) = mpsc::channel(DATA_CHANGE_QUEUE);
        let record = SubscriptionRecord {
            id: subscription_id,
            options,
            items,
            sender,
            pending_acks: Vec::new(),
        };
        self.commands
            .send(Command::RegisterSubscription { record })
            .await
            .map_err(|_| ClientError::Disconnected)?;

        Ok((SubscriptionHandle { id: subscription_id }, receiver))
    }

    /// Deletes a subscription. Fails with [`ClientError::SubscriptionGone`]
    /// if the subscription is not (or no longer) registered.
    pub async fn unsubscribe(&self, handle: SubscriptionHandle) -> ClientResult<()> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(Command::DropSubscription { id: handle.id, reply })
            .await
            .map_err(|_| ClientError::Disconnected)?;
        let was_registered = rx.await.map_err(|_| ClientError::Disconnected)?;
        if !was_registered {
            return Err(ClientError::SubscriptionGone(handle.id));
        }
        let _: uascope_codec::services::subscription::DeleteSubscriptionsResponse = self
            .service("delete subscriptions", move |request_header| {
                Ok(DeleteSubscriptionsRequest {
                    request_header,
                    subscription_ids: vec![handle.id],
                })
            })
            .await?;
        Ok(())
    }

    /// Scheduled reads of one node at a fixed interval. Each tick delivers
    /// either the value or the per-tick error; failures do not stop the
    /// loop. Dropping the receiver stops it.
    pub fn poll(
        &self,
        node_id: NodeId,
        period: Duration,
    ) -> mpsc::Receiver<ClientResult<DataValue>> {
        let (tx, rx) = mpsc::channel(16);
        let client = self.clone();
        tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let result = client.read(&node_id).await;
                if tx.send(result).await.is_err() {
                    break;
                }
            }
        });
        rx
    }

    /// Closes the session and tears the connection down. Best effort: the
    /// close messages are sent but their responses are not awaited.
    pub async fn disconnect(self) -> ClientResult<()> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(Command::Disconnect { reply })
            .await
            .map_err(|_| ClientError::Disconnected)?;
        let _ = rx.await;
        Ok(())
    }

    async fn reserve_handles(&self, count: usize) -> ClientResult<Vec<u32>> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(Command::ReserveHandles { count, reply })
            .await
            .map_err(|_| ClientError::Disconnected)?;
        rx.await.map_err(|_| ClientError::Disconnected)
    }

    /// Sends one service request and decodes the typed response, enforcing
    /// the per-call timeout and surfacing service faults as typed errors.
    async fn service<R>(
        &self,
        operation: &'static str,
        build: impl FnOnce(RequestHeader) -> ClientResult<R> + Send + 'static,
    ) -> ClientResult<R::Response>
    where
        R: ServiceRequest + Send,
    {
        let (reply, rx) = oneshot::channel();
        let encode: EncodeFn = Box::new(move |header| {
            let request = build(header)?;
            Ok(services::encode_message(&request)?)
        });
        self.commands
            .send(Command::Request {
                operation,
                encode,
                reply,
            })
            .await
            .map_err(|_| ClientError::Disconnected)?;

        let body = match timeout(self.request_timeout, rx).await {
            Ok(Ok(result)) => result?,
            Ok(Err(_)) => return Err(ClientError::ConnectionLost),
            Err(_) => {
                return Err(ClientError::Timeout {
                    operation,
                    timeout_ms: self.request_timeout.as_millis() as u64,
                })
            }
        };

        decode_service_response(operation, &body)
    }
}

fn decode_service_response<R: ServiceResponse>(
    operation: &'static str,
    body: &[u8],
) -> ClientResult<R> {
    match services::decode_message::<R>(body)? {
        DecodedResponse::Fault(fault) => Err(ClientError::fault(
            operation,
            fault.response_header.service_result,
        )),
        DecodedResponse::Response(response) => {
            let status = response.response_header().service_result;
            if status.is_bad() {
                return Err(ClientError::fault(operation, status));
            }
            Ok(response)
        }
    }
}

fn expect_results<T>(
    operation: &'static str,
    expected: usize,
    results: Option<Vec<T>>,
) -> ClientResult<Vec<T>> {
    let results = results.unwrap_or_default();
    if results.len() != expected {
        return Err(ClientError::ResultCountMismatch {
            operation,
            expected,
            got: results.len(),
        });
    }
    Ok(results)
}

// =============================================================================
// Connection establishment
// =============================================================================

async fn dial(config: &ClientConfig) -> ClientResult<BoxedStream> {
    let target = uascope_transport::EndpointTarget::parse(&config.endpoint_url)?;
    let stream = timeout(config.request_timeout, TcpStream::connect(target.address()))
        .await
        .map_err(|_| timeout_error("connect", config))?
        .map_err(uascope_transport::TransportError::from)?;
    stream
        .set_nodelay(true)
        .map_err(uascope_transport::TransportError::from)?;
    Ok(Box::new(stream))
}

/// Runs the hello/acknowledge handshake under the configured timeout.
async fn open_transport(
    stream: BoxedStream,
    config: &ClientConfig,
) -> ClientResult<UaStream<BoxedStream>> {
    let mut transport = UaStream::new(stream, config.transport_limits());
    timeout(
        config.request_timeout,
        transport.handshake(&config.endpoint_url),
    )
    .await
    .map_err(|_| timeout_error("handshake", config))??;
    Ok(transport)
}

fn timeout_error(operation: &'static str, config: &ClientConfig) -> ClientError {
    ClientError::Timeout {
        operation,
        timeout_ms: config.request_timeout.as_millis() as u64,
    }
}

/// Everything the connection task owns about the live link.
struct Link {
    writer: UaStream<WriteHalf<BoxedStream>>,
    inbound: mpsc::Receiver<TransportResult<Inbound>>,
    reader_task: JoinHandle<()>,
    channel: SecureChannel,
    session: Session,
}

impl Link {
    fn set_state(&mut self, stats: &Mutex<ClientStats>, state: SessionState) {
        self.session.transition(state);
        stats.lock().state = self.session.state();
    }
}

fn spawn_reader(
    mut reader: UaStream<ReadHalf<BoxedStream>>,
) -> (mpsc::Receiver<TransportResult<Inbound>>, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(32);
    let task = tokio::spawn(async move {
        loop {
            let result = reader.recv().await;
            let fatal = result.as_ref().err().map_or(false, |e| e.is_fatal());
            if tx.send(result).await.is_err() || fatal {
                break;
            }
        }
    });
    (rx, task)
}

/// Runs the secured setup sequence on a fresh, handshaken stream: open the
/// channel, discover the identity token policy, create and activate the
/// session. Returns the split link ready for the connection task.
async fn establish(
    mut stream: UaStream<BoxedStream>,
    config: &ClientConfig,
    stats: &Mutex<ClientStats>,
) -> ClientResult<Link> {
    let mut channel = SecureChannel::new(config.channel_lifetime);

    // OpenSecureChannel(Issue).
    let request_id = channel.next_request_id();
    let body = channel.open_request(request_id, false)?;
    let sequence = channel.next_sequence();
    stream.send_open(0, sequence, request_id, &body).await?;
    let open_body = match stream.recv().await? {
        Inbound::OpenChannel { body, .. } => body,
        Inbound::Service { .. } => {
            return Err(ClientError::UnexpectedResponse {
                operation: "open secure channel",
            })
        }
    };
    channel.adopt_open_response(&open_body)?;

    // Endpoint discovery for the identity token policy id.
    let policy_id = {
        let request_id = channel.next_request_id();
        let request = GetEndpointsRequest {
            request_header: RequestHeader::new(NodeId::null(), request_id, 15_000),
            endpoint_url: Some(config.endpoint_url.clone()),
            locale_ids: None,
            profile_uris: None,
        };
        let body = exchange(&mut stream, &mut channel, request_id, &request).await?;
        let response: GetEndpointsResponse = decode_service_response("get endpoints", &body)?;
        select_policy_id(response.endpoints.as_deref().unwrap_or(&[]), &config.identity)?
    };

    stats.lock().state = SessionState::Creating;

    // CreateSession.
    let client_nonce: [u8; 32] = rand::thread_rng().gen();
    let created: CreateSessionResponse = {
        let request_id = channel.next_request_id();
        let request = CreateSessionRequest {
            request_header: RequestHeader::new(NodeId::null(), request_id, 15_000),
            client_description: ApplicationDescription::client(
                config.application_uri.clone(),
                config.application_name.clone(),
            ),
            server_uri: None,
            endpoint_url: Some(config.endpoint_url.clone()),
            session_name: Some(config.session_name.clone()),
            client_nonce: Some(client_nonce.to_vec()),
            client_certificate: None,
            requested_session_timeout_ms: config.session_timeout.as_secs_f64() * 1000.0,
            max_response_message_size: 0,
        };
        let body = exchange(&mut stream, &mut channel, request_id, &request).await?;
        decode_service_response("create session", &body)?
    };
    let mut session = Session::created(
        created.session_id,
        created.authentication_token.clone(),
        created.revised_session_timeout_ms,
        created.server_nonce,
    );
    stats.lock().state = session.state();

    // ActivateSession with the configured identity.
    session.transition(SessionState::Activating);
    let user_identity_token = match &config.identity {
        IdentityToken::Anonymous => AnonymousIdentityToken {
            policy_id: policy_id.clone(),
        }
        .to_extension_object()?,
        IdentityToken::UserName { user, password } => UserNameIdentityToken {
            policy_id: policy_id.clone(),
            user_name: Some(user.clone()),
            password: Some(password.clone().into_bytes()),
            encryption_algorithm: None,
        }
        .to_extension_object()?,
    };
    {
        let request_id = channel.next_request_id();
        let request = ActivateSessionRequest {
            request_header: RequestHeader::new(
                created.authentication_token.clone(),
                request_id,
                15_000,
            ),
            client_signature: SignatureData::default(),
            client_software_certificates: None,
            locale_ids: None,
            user_identity_token,
            user_token_signature: SignatureData::default(),
        };
        let body = exchange(&mut stream, &mut channel, request_id, &request).await?;
        let _: uascope_codec::services::session::ActivateSessionResponse =
            decode_service_response("activate session", &body)?;
    }
    session.transition(SessionState::Active);
    stats.lock().state = session.state();
    info!(
        endpoint = %config.endpoint_url,
        session_id = %session.session_id,
        "session active"
    );

    let (reader, writer) = stream.into_split();
    let (inbound, reader_task) = spawn_reader(reader);
    Ok(Link {
        writer,
        inbound,
        reader_task,
        channel,
        session,
    })
}

/// One sequential request/response exchange during establishment, before
/// the reader task exists. Non-matching messages are logged and dropped.
async fn exchange<R: ServiceRequest>(
    stream: &mut UaStream<BoxedStream>,
    channel: &mut SecureChannel,
    request_id: u32,
    request: &R,
) -> ClientResult<Vec<u8>> {
    let body = services::encode_message(request)?;
    let channel_id = channel.channel_id();
    let token_id = channel.token_id();
    stream
        .send_service(channel_id, token_id, request_id, &body, || {
            channel.next_sequence()
        })
        .await?;
    loop {
        match stream.recv().await? {
            Inbound::Service {
                request_id: got,
                body,
                ..
            } if got == request_id => return Ok(body),
            other => {
                warn!(request_id = other.request_id(), "unmatched response dropped");
            }
        }
    }
}

fn select_policy_id(
    endpoints: &[EndpointDescription],
    identity: &IdentityToken,
) -> ClientResult<Option<String>> {
    let wanted = match identity {
        IdentityToken::Anonymous => UserTokenKind::Anonymous,
        IdentityToken::UserName { .. } => UserTokenKind::UserName,
    };
    let mut saw_unsecured = false;
    for endpoint in endpoints.iter().filter(|e| e.is_unsecured()) {
        saw_unsecured = true;
        if let Some(policy) = endpoint.token_policy(wanted) {
            return Ok(policy.policy_id.clone());
        }
    }
    if endpoints.is_empty() {
        // Some servers only expose endpoints on the discovery URL; fall
        // back to the conventional policy ids.
        let conventional = match identity {
            IdentityToken::Anonymous => "anonymous",
            IdentityToken::UserName { .. } => "username",
        };
        return Ok(Some(conventional.to_string()));
    }
    Err(ClientError::NoSuitableEndpoint {
        reason: if saw_unsecured {
            "no unsecured endpoint accepts the configured identity token"
        } else {
            "server advertises no endpoint with security mode None"
        },
    })
}

// =============================================================================
// Connection task
// =============================================================================

enum Pending {
    External {
        operation: &'static str,
        reply: ReplyTx,
    },
    Internal(&'static str),
}

struct Connection {
    link: Link,
    pending: HashMap<u32, Pending>,
    registry: SubscriptionRegistry,
    config: ClientConfig,
    stats: Arc<Mutex<ClientStats>>,
    can_redial: bool,
    keep_alive_pending: Option<u32>,
    keep_alive_strikes: u32,
    renew_pending: Option<u32>,
    publish_pending: Option<u32>,
}

impl Connection {
    async fn run(mut self, mut commands: mpsc::Receiver<Command>) {
        let mut ticker = interval(self.config.keep_alive_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::Disconnect { reply }) => {
                        self.shutdown().await;
                        let _ = reply.send(());
                        break;
                    }
                    Some(command) => {
                        if let Err(e) = self.handle_command(command).await {
                            if !self.recover(e).await {
                                break;
                            }
                        }
                    }
                    None => {
                        self.shutdown().await;
                        break;
                    }
                },
                inbound = self.link.inbound.recv() => match inbound {
                    Some(Ok(message)) => {
                        if let Err(e) = self.handle_inbound(message).await {
                            if !self.recover(e).await {
                                break;
                            }
                        }
                    }
                    Some(Err(e)) if !e.is_fatal() => {
                        // An aborted message loses one response; the request
                        // concerned will time out at the caller.
                        warn!(error = %e, "message aborted by peer");
                    }
                    Some(Err(e)) => {
                        if !self.recover(e.into()).await {
                            break;
                        }
                    }
                    None => {
                        if !self.recover(ClientError::ConnectionLost).await {
                            break;
                        }
                    }
                },
                _ = ticker.tick() => {
                    if let Err(e) = self.handle_tick().await {
                        if !self.recover(e).await {
                            break;
                        }
                    }
                }
            }
        }
        debug!("connection task stopped");
    }

    async fn handle_command(&mut self, command: Command) -> ClientResult<()> {
        match command {
            Command::Request {
                operation,
                encode,
                reply,
            } => {
                let request_id = self.link.channel.next_request_id();
                let header = RequestHeader::new(
                    self.link.session.authentication_token.clone(),
                    request_id,
                    self.config.request_timeout.as_millis() as u32,
                );
                let body = match encode(header) {
                    Ok(body) => body,
                    Err(e) => {
                        let _ = reply.send(Err(e));
                        return Ok(());
                    }
                };
                self.pending
                    .insert(request_id, Pending::External { operation, reply });
                self.send_body(request_id, &body).await
            }
            Command::ReserveHandles { count, reply } => {
                let handles = (0..count)
                    .map(|_| self.registry.next_client_handle())
                    .collect();
                let _ = reply.send(handles);
                Ok(())
            }
            Command::RegisterSubscription { record } => {
                self.registry.insert(record);
                self.pump_publish().await
            }
            Command::DropSubscription { id, reply } => {
                let _ = reply.send(self.registry.remove(id).is_some());
                Ok(())
            }
            Command::Disconnect { .. } => unreachable!("handled in run loop"),
        }
    }

    async fn handle_inbound(&mut self, message: Inbound) -> ClientResult<()> {
        match message {
            Inbound::OpenChannel { request_id, body, .. } => {
                if self.renew_pending == Some(request_id) {
                    self.renew_pending = None;
                    self.stats.lock().responses_received += 1;
                    self.link.channel.adopt_open_response(&body)?;
                } else {
                    warn!(request_id, "unmatched OPN response dropped");
                }
                Ok(())
            }
            Inbound::Service { request_id, body, .. } => {
                if self.keep_alive_pending == Some(request_id) {
                    self.keep_alive_pending = None;
                    self.stats.lock().responses_received += 1;
                    return self.handle_keep_alive_response(&body);
                }
                if self.publish_pending == Some(request_id) {
                    self.publish_pending = None;
                    self.stats.lock().responses_received += 1;
                    self.handle_publish_response(&body)?;
                    return self.pump_publish().await;
                }
                match self.pending.remove(&request_id) {
                    Some(Pending::External { reply, .. }) => {
                        self.stats.lock().responses_received += 1;
                        let _ = reply.send(Ok(body));
                    }
                    Some(Pending::Internal(operation)) => {
                        self.stats.lock().responses_received += 1;
                        debug!(operation, request_id, "internal response");
                    }
                    None => {
                        warn!(request_id, "unmatched response dropped");
                    }
                }
                Ok(())
            }
        }
    }

    async fn handle_tick(&mut self) -> ClientResult<()> {
        if !self.link.session.state().is_usable() {
            return Ok(());
        }

        // Token renewal well before expiry.
        if self.link.channel.should_renew() && self.renew_pending.is_none() {
            let request_id = self.link.channel.next_request_id();
            let body = self.link.channel.open_request(request_id, true)?;
            let sequence = self.link.channel.next_sequence();
            let channel_id = self.link.channel.channel_id();
            self.link
                .writer
                .send_open(channel_id, sequence, request_id, &body)
                .await?;
            self.renew_pending = Some(request_id);
            self.stats.lock().requests_sent += 1;
            debug!(request_id, "secure channel renewal requested");
        }

        // Keep-alive: a read of ServerStatus.State. A tick firing while the
        // previous keep-alive is still unanswered counts as a failure.
        if let Some(request_id) = self.keep_alive_pending.take() {
            self.keep_alive_strikes += 1;
            self.stats.lock().keep_alive_strikes = self.keep_alive_strikes;
            warn!(
                request_id,
                strikes = self.keep_alive_strikes,
                "keep-alive response overdue"
            );
            if self.keep_alive_strikes >= self.config.keep_alive_failures {
                return Err(ClientError::ConnectionLost);
            }
        }
        let request_id = self.link.channel.next_request_id();
        let request = ReadRequest {
            request_header: RequestHeader::new(
                self.link.session.authentication_token.clone(),
                request_id,
                self.config.keep_alive_interval.as_millis() as u32,
            ),
            max_age: 0.0,
            timestamps_to_return: TimestampsToReturn::Neither,
            nodes_to_read: vec![ReadValueId::value_of(NodeId::SERVER_STATUS_STATE)],
        };
        let body = services::encode_message(&request)?;
        self.send_body(request_id, &body).await?;
        self.keep_alive_pending = Some(request_id);

        // The pump restarts here if a publish fault stopped it.
        self.pump_publish().await
    }

    fn handle_keep_alive_response(&mut self, body: &[u8]) -> ClientResult<()> {
        match decode_service_response::<ReadResponse>("keep-alive", body) {
            Ok(_) => {
                self.keep_alive_strikes = 0;
                self.stats.lock().keep_alive_strikes = 0;
                Ok(())
            }
            Err(e) if e.is_retryable() => {
                self.keep_alive_strikes += 1;
                self.stats.lock().keep_alive_strikes = self.keep_alive_strikes;
                warn!(error = %e, strikes = self.keep_alive_strikes, "keep-alive failed");
                if self.keep_alive_strikes >= self.config.keep_alive_failures {
                    Err(ClientError::ConnectionLost)
                } else {
                    Ok(())
                }
            }
            Err(e) => Err(e),
        }
    }

    /// Keeps exactly one publish request outstanding while subscriptions
    /// exist, acknowledging received sequence numbers on each request.
    async fn pump_publish(&mut self) -> ClientResult<()> {
        if self.registry.is_empty()
            || self.publish_pending.is_some()
            || !self.link.session.state().is_usable()
        {
            return Ok(());
        }
        let request_id = self.link.channel.next_request_id();
        let request = PublishRequest {
            request_header: RequestHeader::new(
                self.link.session.authentication_token.clone(),
                request_id,
                0,
            ),
            subscription_acknowledgements: self.registry.take_acks(),
        };
        let body = services::encode_message(&request)?;
        self.send_body(request_id, &body).await?;
        self.publish_pending = Some(request_id);
        Ok(())
    }

    fn handle_publish_response(&mut self, body: &[u8]) -> ClientResult<()> {
        let response = match decode_service_response::<PublishResponse>("publish", body) {
            Ok(response) => response,
            Err(e) if e.is_retryable() => {
                // Pump restarts on the next tick.
                warn!(error = %e, "publish failed");
                return Ok(());
            }
            Err(e) => match e {
                // The subscription vanished server-side; drop our record.
                ClientError::ServiceFault { status, .. }
                    if status == StatusCode::BAD_NO_SUBSCRIPTION =>
                {
                    warn!("server reports no subscription; clearing registry");
                    for id in self.registry.ids() {
                        self.registry.remove(id);
                    }
                    return Ok(());
                }
                e => return Err(e),
            },
        };

        let message = &response.notification_message;
        let changes = message.data_changes()?;
        self.registry.dispatch(
            response.subscription_id,
            message.sequence_number,
            &changes,
            message.is_keep_alive(),
        );
        Ok(())
    }

    async fn send_body(&mut self, request_id: u32, body: &[u8]) -> ClientResult<()> {
        let channel_id = self.link.channel.channel_id();
        let token_id = self.link.channel.token_id();
        let channel = &mut self.link.channel;
        self.link
            .writer
            .send_service(channel_id, token_id, request_id, body, || {
                channel.next_sequence()
            })
            .await?;
        self.stats.lock().requests_sent += 1;
        Ok(())
    }

    /// Handles a connection-level failure: fail the pending map, then
    /// reconnect with backoff if this link can be re-dialed. Returns `false`
    /// when the task should stop.
    async fn recover(&mut self, error: ClientError) -> bool {
        warn!(error = %error, "connection failure");
        self.fail_all_pending();
        self.link.reader_task.abort();
        self.link.set_state(&self.stats, SessionState::Reconnecting);

        if !self.can_redial {
            self.link.set_state(&self.stats, SessionState::Failed);
            return false;
        }

        let mut backoff = self.config.retry.backoff();
        loop {
            let Some(delay) = backoff.next_delay() else {
                warn!("reconnect attempts exhausted");
                self.link.set_state(&self.stats, SessionState::Failed);
                return false;
            };
            info!(attempt = backoff.attempt(), delay_ms = delay.as_millis() as u64, "reconnecting");
            tokio::time::sleep(delay).await;

            match self.reestablish().await {
                Ok(()) => {
                    self.stats.lock().reconnects += 1;
                    self.keep_alive_strikes = 0;
                    self.stats.lock().keep_alive_strikes = 0;
                    info!("reconnected");
                    return true;
                }
                Err(e) => {
                    warn!(error = %e, "reconnect attempt failed");
                }
            }
        }
    }

    async fn reestablish(&mut self) -> ClientResult<()> {
        let stream = dial(&self.config).await?;
        let transport = open_transport(stream, &self.config).await?;
        let link = establish(transport, &self.config, &self.stats).await?;
        let old = std::mem::replace(&mut self.link, link);
        old.reader_task.abort();
        self.keep_alive_pending = None;
        self.renew_pending = None;
        self.publish_pending = None;
        self.recreate_subscriptions().await
    }

    /// Rebuilds every registered subscription on the fresh session, keeping
    /// options, nodes, client handles and the caller's receiver.
    async fn recreate_subscriptions(&mut self) -> ClientResult<()> {
        let records = self.registry.drain();
        for mut record in records {
            let created: CreateSubscriptionResponse = {
                let request_id = self.link.channel.next_request_id();
                let request = CreateSubscriptionRequest {
                    request_header: self.internal_header(request_id),
                    requested_publishing_interval_ms: record
                        .options
                        .publishing_interval
                        .as_secs_f64()
                        * 1000.0,
                    requested_lifetime_count: record.options.lifetime_count,
                    requested_max_keep_alive_count: record.options.max_keep_alive_count,
                    max_notifications_per_publish: record.options.max_notifications_per_publish,
                    publishing_enabled: true,
                    priority: record.options.priority,
                };
                let body = self.call(request_id, &request).await?;
                decode_service_response("recreate subscription", &body)?
            };

            let created_items: CreateMonitoredItemsResponse = {
                let request_id = self.link.channel.next_request_id();
                let items = record
                    .items
                    .iter()
                    .map(|item| MonitoredItemCreateRequest {
                        item_to_monitor: ReadValueId::attribute_of(
                            item.node_id.clone(),
                            AttributeId::Value,
                        ),
                        monitoring_mode: MonitoringMode::Reporting,
                        requested_parameters: MonitoringParameters {
                            sampling_interval_ms: record.options.sampling_interval_ms(),
                            queue_size: record.options.queue_size,
                            ..MonitoringParameters::with_handle(item.client_handle)
                        },
                    })
                    .collect();
                let request = CreateMonitoredItemsRequest {
                    request_header: self.internal_header(request_id),
                    subscription_id: created.subscription_id,
                    timestamps_to_return: TimestampsToReturn::Both,
                    items_to_create: items,
                };
                let body = self.call(request_id, &request).await?;
                decode_service_response("recreate monitored items", &body)?
            };

            let results = created_items.results.unwrap_or_default();
            let mut items = Vec::with_capacity(record.items.len());
            for (item, result) in record.items.into_iter().zip(&results) {
                if result.status_code.is_bad() {
                    warn!(
                        node = %item.node_id,
                        status = %result.status_code,
                        "monitored item lost on reconnect"
                    );
                    continue;
                }
                items.push(ItemRecord {
                    monitored_item_id: result.monitored_item_id,
                    ..item
                });
            }
            record.id = created.subscription_id;
            record.items = items;
            record.pending_acks.clear();
            self.registry.insert(record);
        }
        self.pump_publish().await
    }

    /// Sequential request/response on the live link, used for reconnect
    /// bookkeeping while no other traffic is in flight.
    async fn call<R: ServiceRequest>(
        &mut self,
        request_id: u32,
        request: &R,
    ) -> ClientResult<Vec<u8>> {
        let body = services::encode_message(request)?;
        self.send_body(request_id, &body).await?;
        loop {
            match self.link.inbound.recv().await {
                Some(Ok(Inbound::Service {
                    request_id: got,
                    body,
                    ..
                })) if got == request_id => {
                    self.stats.lock().responses_received += 1;
                    return Ok(body);
                }
                Some(Ok(other)) => {
                    warn!(request_id = other.request_id(), "unmatched response dropped");
                }
                Some(Err(e)) => return Err(e.into()),
                None => return Err(ClientError::ConnectionLost),
            }
        }
    }

    fn internal_header(&self, request_id: u32) -> RequestHeader {
        RequestHeader::new(
            self.link.session.authentication_token.clone(),
            request_id,
            self.config.request_timeout.as_millis() as u32,
        )
    }

    fn fail_all_pending(&mut self) {
        for (_, pending) in self.pending.drain() {
            if let Pending::External { reply, .. } = pending {
                let _ = reply.send(Err(ClientError::ConnectionLost));
            }
        }
        self.keep_alive_pending = None;
        self.renew_pending = None;
        self.publish_pending = None;
    }

    /// Best-effort orderly shutdown: CloseSession, then CLO. Responses are
    /// not awaited; the server also cleans up when the socket drops.
    async fn shutdown(&mut self) {
        self.link.set_state(&self.stats, SessionState::Closing);

        let request_id = self.link.channel.next_request_id();
        let close_session = CloseSessionRequest {
            request_header: self.internal_header(request_id),
            delete_subscriptions: true,
        };
        if let Ok(body) = services::encode_message(&close_session) {
            self.pending
                .insert(request_id, Pending::Internal("close session"));
            if let Err(e) = self.send_body(request_id, &body).await {
                debug!(error = %e, "close session send failed");
            }
        }

        let request_id = self.link.channel.next_request_id();
        let close_channel = uascope_codec::services::channel::CloseSecureChannelRequest {
            request_header: self.internal_header(request_id),
        };
        let mut encoder = Encoder::with_capacity(64);
        let encoded = NodeId::numeric(0, CLOSE_SECURE_CHANNEL_TYPE_ID)
            .encode(&mut encoder)
            .and_then(|()| close_channel.encode(&mut encoder));
        if encoded.is_ok() {
            let sequence = self.link.channel.next_sequence();
            let channel_id = self.link.channel.channel_id();
            let token_id = self.link.channel.token_id();
            if let Err(e) = self
                .link
                .writer
                .send_close(channel_id, token_id, sequence, request_id, &encoder.finish())
                .await
            {
                debug!(error = %e, "close channel send failed");
            }
        }

        self.link.reader_task.abort();
        self.fail_all_pending();
        self.link.set_state(&self.stats, SessionState::Closed);
        info!("disconnected");
    }
}
