//! Gateway connection state machine.
//!
//! One [`GatewayConnection`] drives one shard:
//!
//! ```text
//! Disconnected → Connecting → AwaitingHello → Identifying | Resuming → Ready
//!       ▲                                                               │
//!       └──────────────── fixed delay ◀──── connection lost ◀───────────┘
//! ```
//!
//! `Stopped` is reachable from every state once the [`StopHandle`] is set.
//! Fatal conditions (no intents, a second consecutive invalid session, an
//! unresolvable bot identity) end [`GatewayConnection::run`] with a
//! [`GatewayError`] whose [`is_fatal`](GatewayError::is_fatal) is `true`.

mod connection;
mod heartbeat;

pub use heartbeat::{HeartbeatScheduler, SharedSequence};

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use qgate_core::protocol::{self, Envelope, HelloPayload, ReadyPayload, opcode};
use qgate_core::{
    BotIdentity, EventDispatcher, GatewayError, GatewayResult, GatewaySession, IdentitySource,
    Intents, MAX_RESUME_ATTEMPTS, StopHandle, TransportError,
};

use connection::{Inbound, OUTBOUND_CAPACITY, WsSource};

/// Delay between a disconnect and the next connect attempt.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(5);

// =============================================================================
// Configuration
// =============================================================================

/// Settings for one gateway connection.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// WebSocket URL.
    pub url: String,
    /// Handshake token, `Bot {app_id}.{token}`.
    pub token: String,
    /// Subscribed event categories.
    pub intents: Intents,
    /// This connection's shard.
    pub shard_index: u32,
    /// Total number of shards.
    pub shard_total: u32,
    /// Wait between connect attempts.
    pub reconnect_delay: Duration,
    /// Consecutive failed reconnects after which resume is abandoned.
    pub max_resume_attempts: u32,
}

impl GatewayConfig {
    /// Creates a single-shard config.
    pub fn new(url: impl Into<String>, token: impl Into<String>, intents: Intents) -> Self {
        Self {
            url: url.into(),
            token: token.into(),
            intents,
            shard_index: 0,
            shard_total: 1,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            max_resume_attempts: MAX_RESUME_ATTEMPTS,
        }
    }

    /// Assigns the shard.
    pub fn with_shard(mut self, index: u32, total: u32) -> Self {
        self.shard_index = index;
        self.shard_total = total;
        self
    }

    /// Sets the reconnect delay.
    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    /// Sets the resume attempt ceiling.
    pub fn with_max_resume_attempts(mut self, max: u32) -> Self {
        self.max_resume_attempts = max;
        self
    }
}

// =============================================================================
// State
// =============================================================================

/// Where the connection is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Not connected; waiting to reconnect.
    Disconnected,
    /// Opening the WebSocket.
    Connecting,
    /// Connected, waiting for hello.
    AwaitingHello,
    /// Identify sent.
    Identifying,
    /// Resume sent.
    Resuming,
    /// READY or RESUMED received.
    Ready,
    /// Terminal.
    Stopped,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::AwaitingHello => "awaiting_hello",
            Self::Identifying => "identifying",
            Self::Resuming => "resuming",
            Self::Ready => "ready",
            Self::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// How one connect attempt ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Exit {
    Stopped,
    Disconnected,
}

// =============================================================================
// Connection
// =============================================================================

/// A gateway connection for one shard.
///
/// Created with [`create_gateway`].
pub struct GatewayConnection {
    config: GatewayConfig,
    session: GatewaySession,
    sequence: SharedSequence,
    heartbeat: HeartbeatScheduler,
    dispatcher: Arc<EventDispatcher>,
    identity_source: Arc<dyn IdentitySource>,
    stop: StopHandle,
    state: ConnectionState,
    invalid_sessions: u32,
    bot: Option<BotIdentity>,
}

/// Creates a gateway connection.
///
/// Fails with [`GatewayError::NoIntents`] when no event category is
/// subscribed.
pub fn create_gateway(
    config: GatewayConfig,
    dispatcher: Arc<EventDispatcher>,
    identity_source: Arc<dyn IdentitySource>,
    stop: StopHandle,
) -> GatewayResult<GatewayConnection> {
    if config.intents.is_empty() {
        error!(
            shard = config.shard_index,
            "No event intents subscribed, refusing to connect"
        );
        return Err(GatewayError::NoIntents);
    }
    Ok(GatewayConnection::new(
        config,
        dispatcher,
        identity_source,
        stop,
    ))
}

impl GatewayConnection {
    fn new(
        config: GatewayConfig,
        dispatcher: Arc<EventDispatcher>,
        identity_source: Arc<dyn IdentitySource>,
        stop: StopHandle,
    ) -> Self {
        let sequence = SharedSequence::default();
        let session = GatewaySession::new(config.shard_index, config.shard_total)
            .with_max_resume_attempts(config.max_resume_attempts);
        let heartbeat = HeartbeatScheduler::new(dispatcher.scheduler().clone(), Arc::clone(&sequence));
        Self {
            config,
            session,
            sequence,
            heartbeat,
            dispatcher,
            identity_source,
            stop,
            state: ConnectionState::Disconnected,
            invalid_sessions: 0,
            bot: None,
        }
    }

    /// Connection settings.
    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Session bookkeeping.
    pub fn session(&self) -> &GatewaySession {
        &self.session
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// The bot identity, once resolved.
    pub fn bot(&self) -> Option<&BotIdentity> {
        self.bot.as_ref()
    }

    /// Heartbeat period from the last hello frame.
    pub fn heartbeat_interval(&self) -> Option<Duration> {
        self.heartbeat.interval()
    }

    /// Connects and keeps reconnecting until stopped or a fatal error occurs.
    pub async fn run(&mut self) -> GatewayResult<()> {
        let shard = self.config.shard_index;
        loop {
            if self.stop.is_stopped() {
                self.state = ConnectionState::Stopped;
                return Ok(());
            }

            self.session.begin_attempt();
            *self.sequence.lock() = self.session.last_sequence();
            self.invalid_sessions = 0;

            match self.connect_and_run().await {
                Ok(Exit::Stopped) => {
                    self.state = ConnectionState::Stopped;
                    info!(shard, "Gateway stopped");
                    return Ok(());
                }
                Ok(Exit::Disconnected) => {}
                Err(e) if e.is_fatal() => {
                    self.heartbeat.cancel();
                    self.state = ConnectionState::Stopped;
                    return Err(e);
                }
                Err(e) => {
                    warn!(shard, error = %e, "Gateway connect attempt failed");
                    self.heartbeat.cancel();
                    self.session.record_disconnect();
                    self.state = ConnectionState::Disconnected;
                }
            }

            tokio::select! {
                biased;
                _ = self.stop.stopped() => {
                    self.state = ConnectionState::Stopped;
                    info!(shard, "Gateway stopped");
                    return Ok(());
                }
                () = tokio::time::sleep(self.config.reconnect_delay) => {}
            }

            self.session.prepare_reconnect();
            info!(
                shard,
                resume = self.session.may_resume(),
                attempts = self.session.reconnect_attempts(),
                "Reconnecting to gateway"
            );
        }
    }

    /// One connect attempt: open the socket, run the receive loop, tear
    /// down the heartbeat and the writer.
    async fn connect_and_run(&mut self) -> GatewayResult<Exit> {
        let shard = self.config.shard_index;
        self.state = ConnectionState::Connecting;
        debug!(shard, url = %self.config.url, "Connecting to gateway");

        let (sink, mut source) = connection::connect(&self.config.url).await?;
        info!(shard, url = %self.config.url, "Gateway connected");
        self.state = ConnectionState::AwaitingHello;

        let (outbound, outbound_rx) = mpsc::channel(OUTBOUND_CAPACITY);
        let writer = connection::spawn_writer(self.dispatcher.scheduler(), sink, outbound_rx);

        let exit = self.receive_loop(&mut source, &outbound).await;

        self.heartbeat.cancel();
        drop(outbound);
        connection::finish_writer(writer).await;
        exit
    }

    async fn receive_loop(
        &mut self,
        source: &mut WsSource,
        outbound: &mpsc::Sender<Envelope>,
    ) -> GatewayResult<Exit> {
        let shard = self.config.shard_index;
        loop {
            let inbound = tokio::select! {
                biased;
                _ = self.stop.stopped() => {
                    info!(shard, "Stop requested, closing gateway");
                    return Ok(Exit::Stopped);
                }
                inbound = connection::next_text(source) => inbound,
            };

            match inbound {
                Inbound::Text(text) => match Envelope::parse(&text) {
                    Ok(envelope) => match self.handle_frame(envelope, outbound).await {
                        Ok(()) => {}
                        Err(e) if e.is_fatal() => return Err(e),
                        Err(GatewayError::Transport(e)) => {
                            if self.stop.is_stopped() {
                                return Ok(Exit::Stopped);
                            }
                            self.on_disconnect(&e);
                            return Ok(Exit::Disconnected);
                        }
                        Err(e) => warn!(shard, error = %e, "Failed to handle frame"),
                    },
                    Err(e) => warn!(shard, error = %e, "Dropping undecodable frame"),
                },
                Inbound::Closed(reason) => {
                    if self.stop.is_stopped() {
                        return Ok(Exit::Stopped);
                    }
                    self.on_disconnect(&reason);
                    return Ok(Exit::Disconnected);
                }
            }

            if self.stop.is_stopped() {
                info!(shard, "Stop requested, closing gateway");
                return Ok(Exit::Stopped);
            }
        }
    }

    fn on_disconnect(&mut self, reason: &TransportError) {
        self.heartbeat.cancel();
        self.session.record_disconnect();
        self.state = ConnectionState::Disconnected;
        warn!(
            shard = self.config.shard_index,
            reason = %reason,
            attempts = self.session.reconnect_attempts(),
            "Gateway disconnected"
        );
    }

    // -------------------------------------------------------------------------
    // Frame handling
    // -------------------------------------------------------------------------

    /// Applies one inbound frame to the state machine.
    pub(crate) async fn handle_frame(
        &mut self,
        envelope: Envelope,
        outbound: &mpsc::Sender<Envelope>,
    ) -> GatewayResult<()> {
        if let Some(seq) = envelope.sequence {
            if self.session.observe_sequence(seq) {
                *self.sequence.lock() = Some(seq);
            }
        }

        match envelope.op_code {
            opcode::HELLO => {
                let hello: HelloPayload = serde_json::from_value(envelope.payload)?;
                self.heartbeat.set_interval_ms(hello.heartbeat_interval);
                debug!(
                    shard = self.config.shard_index,
                    interval_ms = hello.heartbeat_interval,
                    "Received hello"
                );
                self.send_handshake(outbound).await
            }
            opcode::DISPATCH => self.handle_dispatch(envelope, outbound).await,
            opcode::HEARTBEAT_ACK => {
                debug!(shard = self.config.shard_index, "Heartbeat acknowledged");
                Ok(())
            }
            opcode::INVALID_SESSION => {
                self.invalid_sessions += 1;
                if self.invalid_sessions >= 2 {
                    error!(
                        shard = self.config.shard_index,
                        intents = ?self.config.intents,
                        "Session rejected twice in a row, the bot is probably not allowed to subscribe to these intents"
                    );
                    self.heartbeat.cancel();
                    return Err(GatewayError::InvalidSession);
                }
                warn!(
                    shard = self.config.shard_index,
                    resume = self.session.may_resume(),
                    "Session rejected, retrying handshake"
                );
                self.send_handshake(outbound).await
            }
            other => {
                debug!(op = other, "Ignoring unexpected op-code");
                Ok(())
            }
        }
    }

    async fn handle_dispatch(
        &mut self,
        envelope: Envelope,
        outbound: &mpsc::Sender<Envelope>,
    ) -> GatewayResult<()> {
        let shard = self.config.shard_index;
        match envelope.event_type.as_deref() {
            Some(protocol::READY) => {
                let ready: ReadyPayload = serde_json::from_value(envelope.payload)?;
                self.session.mark_ready(ready.session_id.clone());
                self.invalid_sessions = 0;
                self.state = ConnectionState::Ready;
                info!(shard, session_id = %ready.session_id, "Gateway session ready");
                self.heartbeat.start(outbound.clone());

                if self.bot.is_none() {
                    let bot = self.resolve_identity().await?;
                    self.dispatcher.notify_ready(bot.clone());
                    self.bot = Some(bot);
                }
                Ok(())
            }
            Some(protocol::RESUMED) => {
                self.session.mark_resumed();
                self.invalid_sessions = 0;
                self.state = ConnectionState::Ready;
                info!(shard, "Gateway session resumed");
                self.heartbeat.start(outbound.clone());
                Ok(())
            }
            _ => {
                self.dispatcher.dispatch(envelope);
                Ok(())
            }
        }
    }

    async fn send_handshake(&mut self, outbound: &mpsc::Sender<Envelope>) -> GatewayResult<()> {
        let frame = self
            .session
            .handshake_frame(&self.config.token, self.config.intents.bits());
        let resuming = frame.op_code == opcode::RESUME;
        self.state = if resuming {
            ConnectionState::Resuming
        } else {
            ConnectionState::Identifying
        };
        info!(
            shard = self.config.shard_index,
            resume = resuming,
            "Sending gateway handshake"
        );
        send(outbound, frame).await
    }

    /// Fetches the bot identity, retrying once.
    async fn resolve_identity(&self) -> GatewayResult<BotIdentity> {
        let mut reason = String::new();
        for attempt in 1..=2u32 {
            match self.identity_source.fetch_identity().await {
                Ok(bot) if !bot.id.is_empty() => {
                    info!(bot_id = %bot.id, username = %bot.username, "Bot identity resolved");
                    return Ok(bot);
                }
                Ok(_) => reason = "identity response carried no id".to_string(),
                Err(e) => reason = e.to_string(),
            }
            warn!(attempt, error = %reason, "Failed to resolve bot identity");
        }
        error!(error = %reason, "Bot identity unavailable, stopping");
        Err(GatewayError::IdentityUnavailable(reason))
    }
}

impl fmt::Debug for GatewayConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GatewayConnection")
            .field("url", &self.config.url)
            .field("shard", &self.session.shard())
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

async fn send(outbound: &mpsc::Sender<Envelope>, frame: Envelope) -> GatewayResult<()> {
    outbound
        .send(frame)
        .await
        .map_err(|_| TransportError::SendFailed("writer task stopped".into()).into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use qgate_core::{ApiError, ApiResult, Callback, Event, EventKind, Scheduler};
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Serves queued identity results and counts calls.
    struct MockIdentity {
        results: Mutex<VecDeque<ApiResult<BotIdentity>>>,
        calls: AtomicUsize,
    }

    impl MockIdentity {
        fn ok() -> Arc<Self> {
            Self::with(vec![Ok(bot())])
        }

        fn with(results: Vec<ApiResult<BotIdentity>>) -> Arc<Self> {
            Arc::new(Self {
                results: Mutex::new(results.into()),
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl IdentitySource for MockIdentity {
        async fn fetch_identity(&self) -> ApiResult<BotIdentity> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.results
                .lock()
                .pop_front()
                .unwrap_or_else(|| Ok(bot()))
        }
    }

    fn bot() -> BotIdentity {
        BotIdentity {
            id: "42".into(),
            username: "bot".into(),
            ..Default::default()
        }
    }

    struct Harness {
        gateway: GatewayConnection,
        identity: Arc<MockIdentity>,
        started: Arc<AtomicUsize>,
        events: Arc<Mutex<Vec<Event>>>,
        tx: mpsc::Sender<Envelope>,
        rx: mpsc::Receiver<Envelope>,
    }

    fn harness(identity: Arc<MockIdentity>) -> Harness {
        let started = Arc::new(AtomicUsize::new(0));
        let events = Arc::new(Mutex::new(Vec::new()));
        let started_in = Arc::clone(&started);
        let events_in = Arc::clone(&events);

        let dispatcher = EventDispatcher::builder(Scheduler::current(2))
            .on_start(Callback::sync(move |_: BotIdentity| {
                started_in.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }))
            .on(
                EventKind::Message,
                Callback::sync(move |event: Event| {
                    events_in.lock().push(event);
                    Ok(())
                }),
            )
            .build();

        let config = GatewayConfig::new(
            "ws://127.0.0.1:1",
            "Bot 1.secret",
            Intents::PUBLIC_GUILD_MESSAGES,
        )
        .with_shard(0, 2);
        let gateway = create_gateway(
            config,
            Arc::new(dispatcher),
            identity.clone(),
            StopHandle::new(),
        )
        .unwrap();
        let (tx, rx) = mpsc::channel(16);
        Harness {
            gateway,
            identity,
            started,
            events,
            tx,
            rx,
        }
    }

    fn hello(interval_ms: u64) -> Envelope {
        Envelope::control(opcode::HELLO, json!({"heartbeat_interval": interval_ms}))
    }

    fn ready(session_id: &str, seq: u64) -> Envelope {
        Envelope::dispatch(protocol::READY, seq, json!({"session_id": session_id}))
    }

    fn invalid_session() -> Envelope {
        Envelope::control(opcode::INVALID_SESSION, json!(false))
    }

    #[tokio::test]
    async fn zero_intents_is_fatal() {
        let dispatcher = EventDispatcher::builder(Scheduler::current(1)).build();
        let config = GatewayConfig::new("ws://x", "Bot 1.t", Intents::empty());
        let err = create_gateway(
            config,
            Arc::new(dispatcher),
            MockIdentity::ok(),
            StopHandle::new(),
        )
        .unwrap_err();
        assert!(matches!(err, GatewayError::NoIntents));
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn hello_sets_interval_and_identifies() {
        let mut h = harness(MockIdentity::ok());
        h.gateway.handle_frame(hello(30_000), &h.tx).await.unwrap();

        assert_eq!(h.gateway.heartbeat_interval(), Some(Duration::from_secs(30)));
        assert_eq!(h.gateway.state(), ConnectionState::Identifying);

        let frame = h.rx.recv().await.unwrap();
        assert_eq!(frame.op_code, opcode::IDENTIFY);
        assert_eq!(
            frame.payload,
            json!({"token": "Bot 1.secret", "intents": 1 << 30, "shard": [0, 2]})
        );
    }

    #[tokio::test]
    async fn ready_records_session_and_resolves_identity_once() {
        let mut h = harness(MockIdentity::ok());
        h.gateway.handle_frame(hello(30_000), &h.tx).await.unwrap();
        h.gateway.session.record_disconnect();
        h.gateway.handle_frame(ready("abc123", 1), &h.tx).await.unwrap();

        assert_eq!(h.gateway.state(), ConnectionState::Ready);
        assert_eq!(h.gateway.session().session_id(), Some("abc123"));
        assert_eq!(h.gateway.session().reconnect_attempts(), 0);
        assert_eq!(h.gateway.bot().map(|b| b.id.as_str()), Some("42"));
        assert!(h.gateway.heartbeat.is_active());

        // A later READY, e.g. after a fresh identify, does not refetch.
        h.gateway.handle_frame(ready("def456", 1), &h.tx).await.unwrap();
        assert_eq!(h.identity.calls(), 1);

        tokio::task::yield_now().await;
        let deadline = tokio::time::Instant::now() + Duration::from_secs(1);
        while h.started.load(Ordering::SeqCst) == 0 && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(h.started.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn resumed_resets_counter() {
        let mut h = harness(MockIdentity::ok());
        h.gateway.handle_frame(hello(1_000), &h.tx).await.unwrap();
        h.gateway.handle_frame(ready("abc123", 1), &h.tx).await.unwrap();

        h.gateway.session.record_disconnect();
        h.gateway.session.prepare_reconnect();
        h.gateway.heartbeat.cancel();
        let _ = h.rx.try_recv();

        h.gateway.handle_frame(hello(1_000), &h.tx).await.unwrap();
        let frame = h.rx.recv().await.unwrap();
        assert_eq!(frame.op_code, opcode::RESUME);
        assert_eq!(h.gateway.state(), ConnectionState::Resuming);

        let resumed = Envelope::dispatch(protocol::RESUMED, 2, json!(""));
        h.gateway.handle_frame(resumed, &h.tx).await.unwrap();
        assert_eq!(h.gateway.session().reconnect_attempts(), 0);
        assert_eq!(h.gateway.state(), ConnectionState::Ready);
        assert!(h.gateway.heartbeat.is_active());
    }

    #[tokio::test]
    async fn second_invalid_session_is_fatal() {
        let mut h = harness(MockIdentity::ok());
        h.gateway.handle_frame(hello(30_000), &h.tx).await.unwrap();
        assert_eq!(h.rx.recv().await.unwrap().op_code, opcode::IDENTIFY);

        h.gateway.handle_frame(invalid_session(), &h.tx).await.unwrap();
        assert_eq!(h.rx.recv().await.unwrap().op_code, opcode::IDENTIFY);

        let err = h
            .gateway
            .handle_frame(invalid_session(), &h.tx)
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::InvalidSession));
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn identity_retried_once_then_fatal() {
        let flaky = MockIdentity::with(vec![Err(ApiError::Timeout), Ok(bot())]);
        let mut h = harness(flaky);
        h.gateway.handle_frame(ready("s", 1), &h.tx).await.unwrap();
        assert_eq!(h.identity.calls(), 2);
        assert!(h.gateway.bot().is_some());

        let broken = MockIdentity::with(vec![
            Err(ApiError::Timeout),
            Ok(BotIdentity::default()),
        ]);
        let mut h = harness(broken);
        let err = h
            .gateway
            .handle_frame(ready("s", 1), &h.tx)
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::IdentityUnavailable(_)));
        assert!(err.is_fatal());
        assert_eq!(h.identity.calls(), 2);
    }

    #[tokio::test]
    async fn dispatch_is_forwarded_and_sequence_tracked() {
        let mut h = harness(MockIdentity::ok());
        let message = Envelope::dispatch("AT_MESSAGE_CREATE", 7, json!({"content": "hi"}))
            .with_event_id("AT_MESSAGE_CREATE:7");
        h.gateway.handle_frame(message, &h.tx).await.unwrap();
        assert_eq!(*h.gateway.sequence.lock(), Some(7));

        // Stale sequence numbers are ignored.
        let ack = Envelope {
            sequence: Some(3),
            ..Envelope::control(opcode::HEARTBEAT_ACK, serde_json::Value::Null)
        };
        h.gateway.handle_frame(ack, &h.tx).await.unwrap();
        assert_eq!(h.gateway.session().last_sequence(), Some(7));

        let deadline = tokio::time::Instant::now() + Duration::from_secs(1);
        while h.events.lock().is_empty() && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        let events = h.events.lock();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data["event_id"], "AT_MESSAGE_CREATE:7");
    }

    #[tokio::test]
    async fn unreachable_gateway_keeps_retrying_until_stopped() {
        let dispatcher = EventDispatcher::builder(Scheduler::current(1)).build();
        let stop = StopHandle::new();
        let config = GatewayConfig::new("ws://127.0.0.1:1", "Bot 1.t", Intents::GUILDS)
            .with_reconnect_delay(Duration::from_millis(10));
        let mut gateway =
            create_gateway(config, Arc::new(dispatcher), MockIdentity::ok(), stop.clone()).unwrap();

        let stopper = stop.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            stopper.stop();
        });

        gateway.run().await.unwrap();
        assert_eq!(gateway.state(), ConnectionState::Stopped);
        assert!(gateway.session().reconnect_attempts() >= 1);
        assert!(!gateway.session().may_resume());
    }
}
