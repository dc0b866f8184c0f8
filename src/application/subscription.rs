//! Subscription Manager
//!
//! Turns one PumpPortal socket into per-token and per-account event dispatch.
//!
//! A [`MonitorSession`] owns its connection and every subscription made on
//! it; nothing is shared between sessions. Events are decoded once, routed by
//! key and handed to the caller's handler inline, so per-key order equals
//! socket order.
//!
//! ```text
//! Idle → Connecting → Active → Draining → Closed
//! ```

use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::time::{interval_at, sleep_until, Instant};
use tracing::{debug, info, warn};

use crate::adapters::pump_fun::stream::{DEFAULT_WS_URL, MAX_MESSAGE_SIZE};
use crate::adapters::pump_fun::types::{
    decode_message, InboundMessage, MigrationEvent, NewTokenEvent, StreamEvent, SubscribeMessage,
    TradeEvent,
};
use crate::domain::alert::{AlertLatch, AlertThresholds, PriceAlert, TradeAggregate};
use crate::domain::cancel::CancelToken;
use crate::ports::stream::{StreamConnection, StreamConnector, StreamError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum SubscriptionKind {
    /// Trades on one mint
    TokenTrade,
    /// Trades made by one wallet
    AccountTrade,
    /// Every token launch
    NewToken,
}

/// One subscription within a session
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Subscription {
    pub kind: SubscriptionKind,
    /// Mint or account address; empty for `NewToken`
    pub key: String,
    pub alert_thresholds: Option<AlertThresholds>,
}

impl Subscription {
    pub fn token_trade(mint: impl Into<String>) -> Self {
        Self {
            kind: SubscriptionKind::TokenTrade,
            key: mint.into().trim().to_string(),
            alert_thresholds: None,
        }
    }

    pub fn account_trade(account: impl Into<String>) -> Self {
        Self {
            kind: SubscriptionKind::AccountTrade,
            key: account.into().trim().to_string(),
            alert_thresholds: None,
        }
    }

    pub fn new_token() -> Self {
        Self {
            kind: SubscriptionKind::NewToken,
            key: String::new(),
            alert_thresholds: None,
        }
    }

    /// Alert on price crossings; only meaningful for token subscriptions
    pub fn with_alerts(mut self, thresholds: AlertThresholds) -> Self {
        self.alert_thresholds = (!thresholds.is_empty()).then_some(thresholds);
        self
    }

    fn subscribe_message(&self) -> SubscribeMessage {
        match self.kind {
            SubscriptionKind::TokenTrade => SubscribeMessage::token_trades(vec![self.key.clone()]),
            SubscriptionKind::AccountTrade => SubscribeMessage::account_trades(vec![self.key.clone()]),
            SubscriptionKind::NewToken => SubscribeMessage::new_token(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SessionState {
    Idle,
    Connecting,
    Active,
    Draining,
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// What a session hands to its handler
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Trade(TradeEvent),
    NewToken(NewTokenEvent),
    Migration(MigrationEvent),
    Alert(PriceAlert),
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum SessionError {
    #[error("Failed to open stream: {0}")]
    Connect(StreamError),
    #[error("Session already closed")]
    Closed,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    pub url: String,
    /// How long to wait for subscription acknowledgements before going active anyway
    pub ack_timeout: Duration,
    /// End the session after this long; runs until cancelled when `None`
    pub duration: Option<Duration>,
    /// Ping interval; no keepalive when `None`
    pub keepalive: Option<Duration>,
    /// Larger inbound messages are dropped and counted as decode failures
    pub max_message_size: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_WS_URL.to_string(),
            ack_timeout: Duration::from_secs(5),
            duration: None,
            keepalive: Some(Duration::from_secs(30)),
            max_message_size: MAX_MESSAGE_SIZE,
        }
    }
}

/// Summary returned when a session ends
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionReport {
    /// Per-mint statistics for every token subscription that saw trades
    pub aggregates: HashMap<String, TradeAggregate>,
    pub events_dispatched: u64,
    pub alerts_fired: u64,
    pub decode_failures: u64,
    /// Whether every initial subscription was acknowledged in time
    pub acknowledged: bool,
    pub final_state: SessionState,
}

#[derive(Debug)]
enum SessionCommand {
    Subscribe(Subscription),
    Unsubscribe { kind: SubscriptionKind, key: String },
}

/// Caller-side control of a running session
#[derive(Debug, Clone)]
pub struct SessionHandle {
    cancel: CancelToken,
    commands: mpsc::UnboundedSender<SessionCommand>,
    state: watch::Receiver<SessionState>,
}

impl SessionHandle {
    /// Request a graceful stop; the session drains and closes
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Receiver observing every state transition
    pub fn state_changes(&self) -> watch::Receiver<SessionState> {
        self.state.clone()
    }

    /// Wait until the session reaches `target` or closes, returning the state reached
    pub async fn wait_for(&self, target: SessionState) -> SessionState {
        let mut rx = self.state.clone();
        let reached = match rx
            .wait_for(|s| *s == target || *s == SessionState::Closed)
            .await
        {
            Ok(state) => *state,
            Err(_) => SessionState::Closed,
        };
        reached
    }

    pub fn subscribe(&self, subscription: Subscription) -> Result<(), SessionError> {
        self.commands
            .send(SessionCommand::Subscribe(subscription))
            .map_err(|_| SessionError::Closed)
    }

    pub fn unsubscribe(&self, kind: SubscriptionKind, key: impl Into<String>) -> Result<(), SessionError> {
        self.commands
            .send(SessionCommand::Unsubscribe {
                kind,
                key: key.into().trim().to_string(),
            })
            .map_err(|_| SessionError::Closed)
    }
}

/// Routing table of one session
#[derive(Debug, Default)]
struct Registry {
    tokens: HashMap<String, Option<AlertLatch>>,
    accounts: HashSet<String>,
    new_tokens: bool,
}

impl Registry {
    fn add(&mut self, subscription: &Subscription) {
        match subscription.kind {
            SubscriptionKind::TokenTrade => {
                let latch = subscription.alert_thresholds.map(AlertLatch::new);
                self.tokens.insert(subscription.key.clone(), latch);
            }
            SubscriptionKind::AccountTrade => {
                self.accounts.insert(subscription.key.clone());
            }
            SubscriptionKind::NewToken => self.new_tokens = true,
        }
    }

    /// Returns the unsubscribe message when something was removed
    fn remove(&mut self, kind: SubscriptionKind, key: &str) -> Option<SubscribeMessage> {
        match kind {
            SubscriptionKind::TokenTrade => self
                .tokens
                .remove(key)
                .map(|_| SubscribeMessage::unsubscribe_token_trades(vec![key.to_string()])),
            SubscriptionKind::AccountTrade => self
                .accounts
                .remove(key)
                .then(|| SubscribeMessage::unsubscribe_account_trades(vec![key.to_string()])),
            SubscriptionKind::NewToken => std::mem::take(&mut self.new_tokens)
                .then(SubscribeMessage::unsubscribe_new_token),
        }
    }
}

/// Initial subscribe messages, one per kind
fn initial_messages(subscriptions: &[Subscription]) -> Vec<SubscribeMessage> {
    let keys = |kind: SubscriptionKind| -> Vec<String> {
        subscriptions
            .iter()
            .filter(|s| s.kind == kind)
            .map(|s| s.key.clone())
            .collect()
    };

    let mut messages = Vec::new();
    if subscriptions.iter().any(|s| s.kind == SubscriptionKind::NewToken) {
        messages.push(SubscribeMessage::new_token());
    }
    let mints = keys(SubscriptionKind::TokenTrade);
    if !mints.is_empty() {
        messages.push(SubscribeMessage::token_trades(mints));
    }
    let accounts = keys(SubscriptionKind::AccountTrade);
    if !accounts.is_empty() {
        messages.push(SubscribeMessage::account_trades(accounts));
    }
    messages
}

/// Why the read loop stopped
enum Stop {
    Cancelled,
    Deadline,
    PeerClosed,
    Error(StreamError),
}

/// A single monitoring session over one socket connection
pub struct MonitorSession {
    connector: Arc<dyn StreamConnector>,
    config: SessionConfig,
    subscriptions: Vec<Subscription>,
    cancel: CancelToken,
    commands: mpsc::UnboundedReceiver<SessionCommand>,
    state: watch::Sender<SessionState>,
}

impl MonitorSession {
    pub fn new(
        connector: Arc<dyn StreamConnector>,
        config: SessionConfig,
        subscriptions: Vec<Subscription>,
    ) -> (Self, SessionHandle) {
        let cancel = CancelToken::new();
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(SessionState::Idle);

        let session = Self {
            connector,
            config,
            subscriptions,
            cancel: cancel.clone(),
            commands: command_rx,
            state: state_tx,
        };
        let handle = SessionHandle {
            cancel,
            commands: command_tx,
            state: state_rx,
        };
        (session, handle)
    }

    fn set_state(&self, state: SessionState) {
        debug!(%state, "Session state");
        self.state.send_replace(state);
    }

    /// Run the session to completion, calling `handler` for every routed event
    pub async fn run<F>(mut self, handler: F) -> Result<SessionReport, SessionError>
    where
        F: FnMut(SessionEvent) + Send,
    {
        self.set_state(SessionState::Connecting);
        info!(url = %self.config.url, subscriptions = self.subscriptions.len(), "Opening stream session");

        let mut conn = match self.connector.connect(&self.config.url).await {
            Ok(conn) => conn,
            Err(e) => {
                warn!(error = %e, "Stream connection failed");
                self.set_state(SessionState::Closed);
                return Err(SessionError::Connect(e));
            }
        };

        let mut dispatcher = Dispatcher::new(handler, self.config.max_message_size);
        for subscription in &self.subscriptions {
            dispatcher.registry.add(subscription);
        }

        let started = Instant::now();
        let deadline = self.config.duration.map(|d| started + d);

        let stop = match self.subscribe_all(&mut *conn, &mut dispatcher, deadline).await {
            Ok(None) => {
                self.set_state(SessionState::Active);
                info!(acknowledged = dispatcher.acknowledged, "Stream session active");
                self.read_loop(&mut *conn, &mut dispatcher, deadline).await
            }
            Ok(Some(stop)) => stop,
            Err(e) => Stop::Error(e),
        };

        match &stop {
            Stop::Cancelled => info!("Stream session cancelled"),
            Stop::Deadline => info!("Stream session duration elapsed"),
            Stop::PeerClosed => info!("Stream closed by peer"),
            Stop::Error(e) => warn!(error = %e, "Stream session ended on error"),
        }

        self.set_state(SessionState::Draining);
        if let Err(e) = conn.close().await {
            debug!(error = %e, "Error closing stream");
        }
        self.set_state(SessionState::Closed);

        let report = dispatcher.into_report(SessionState::Closed);
        info!(
            events = report.events_dispatched,
            alerts = report.alerts_fired,
            decode_failures = report.decode_failures,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Stream session closed"
        );
        Ok(report)
    }

    /// Send the initial subscriptions and wait for their acknowledgements.
    /// Events arriving meanwhile are dispatched normally.
    async fn subscribe_all<F: FnMut(SessionEvent)>(
        &self,
        conn: &mut dyn StreamConnection,
        dispatcher: &mut Dispatcher<F>,
        deadline: Option<Instant>,
    ) -> Result<Option<Stop>, StreamError> {
        let messages = initial_messages(&self.subscriptions);
        for message in &messages {
            debug!(method = %message.method, "Subscribing");
            conn.send(message.to_json()).await?;
        }

        let expected = messages.len() as u64;
        let ack_deadline = Instant::now() + self.config.ack_timeout;

        while dispatcher.acks < expected {
            tokio::select! {
                _ = self.cancel.cancelled() => return Ok(Some(Stop::Cancelled)),
                _ = sleep_until_opt(deadline) => return Ok(Some(Stop::Deadline)),
                _ = sleep_until(ack_deadline) => {
                    warn!(
                        acknowledged = dispatcher.acks,
                        expected,
                        "Subscriptions not acknowledged in time, continuing"
                    );
                    return Ok(None);
                }
                message = conn.next_message() => match message {
                    Some(inbound) => {
                        if let Err(e) = dispatcher.handle_inbound(inbound) {
                            return Ok(Some(Stop::Error(e)));
                        }
                    }
                    None => return Ok(Some(Stop::PeerClosed)),
                },
            }
        }

        dispatcher.acknowledged = true;
        Ok(None)
    }

    async fn read_loop<F: FnMut(SessionEvent)>(
        &mut self,
        conn: &mut dyn StreamConnection,
        dispatcher: &mut Dispatcher<F>,
        deadline: Option<Instant>,
    ) -> Stop {
        let period = self.config.keepalive.unwrap_or(Duration::from_secs(3600));
        let mut keepalive = interval_at(Instant::now() + period, period);

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => return Stop::Cancelled,
                _ = sleep_until_opt(deadline) => return Stop::Deadline,
                Some(command) = self.commands.recv() => {
                    if let Err(e) = self.apply(command, conn, dispatcher).await {
                        return Stop::Error(e);
                    }
                }
                _ = keepalive.tick(), if self.config.keepalive.is_some() => {
                    if let Err(e) = conn.ping().await {
                        return Stop::Error(e);
                    }
                }
                message = conn.next_message() => match message {
                    Some(inbound) => {
                        if let Err(e) = dispatcher.handle_inbound(inbound) {
                            return Stop::Error(e);
                        }
                    }
                    None => return Stop::PeerClosed,
                },
            }
        }
    }

    async fn apply<F: FnMut(SessionEvent)>(
        &mut self,
        command: SessionCommand,
        conn: &mut dyn StreamConnection,
        dispatcher: &mut Dispatcher<F>,
    ) -> Result<(), StreamError> {
        match command {
            SessionCommand::Subscribe(subscription) => {
                info!(kind = ?subscription.kind, key = %subscription.key, "Adding subscription");
                dispatcher.registry.add(&subscription);
                conn.send(subscription.subscribe_message().to_json()).await?;
                self.subscriptions.push(subscription);
            }
            SessionCommand::Unsubscribe { kind, key } => {
                self.subscriptions.retain(|s| !(s.kind == kind && s.key == key));
                match dispatcher.registry.remove(kind, &key) {
                    Some(message) => {
                        info!(?kind, %key, "Removing subscription");
                        conn.send(message.to_json()).await?;
                    }
                    None => debug!(?kind, %key, "Unsubscribe for unknown subscription"),
                }
            }
        }
        Ok(())
    }
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(at) => sleep_until(at).await,
        None => std::future::pending().await,
    }
}

/// Decoding, routing and per-session counters
struct Dispatcher<F> {
    handler: F,
    registry: Registry,
    aggregates: HashMap<String, TradeAggregate>,
    max_message_size: usize,
    acks: u64,
    acknowledged: bool,
    events_dispatched: u64,
    alerts_fired: u64,
    decode_failures: u64,
}

impl<F: FnMut(SessionEvent)> Dispatcher<F> {
    fn new(handler: F, max_message_size: usize) -> Self {
        Self {
            handler,
            registry: Registry::default(),
            aggregates: HashMap::new(),
            max_message_size,
            acks: 0,
            acknowledged: false,
            events_dispatched: 0,
            alerts_fired: 0,
            decode_failures: 0,
        }
    }

    fn emit(&mut self, event: SessionEvent) {
        if matches!(event, SessionEvent::Alert(_)) {
            self.alerts_fired += 1;
        }
        self.events_dispatched += 1;
        (self.handler)(event);
    }

    /// Oversized frames rejected by the transport count as decode failures;
    /// any other stream error ends the session
    fn handle_inbound(&mut self, inbound: Result<String, StreamError>) -> Result<(), StreamError> {
        match inbound {
            Ok(text) => self.handle_text(&text),
            Err(StreamError::MessageTooLarge { size, max }) => {
                self.decode_failures += 1;
                warn!(size, max, "Dropping oversized message");
            }
            Err(e) => return Err(e),
        }
        Ok(())
    }

    fn handle_text(&mut self, text: &str) {
        if text.len() > self.max_message_size {
            self.decode_failures += 1;
            warn!(size = text.len(), max = self.max_message_size, "Dropping oversized message");
            return;
        }

        match decode_message(text) {
            Ok(InboundMessage::Ack(message)) => {
                self.acks += 1;
                debug!(%message, "Subscription acknowledged");
            }
            Ok(InboundMessage::ServerError(message)) => warn!(%message, "Stream server error"),
            Ok(InboundMessage::Event(event)) => self.route(event),
            Err(e) => {
                self.decode_failures += 1;
                warn!(error = %e, "Skipping malformed message");
            }
        }
    }

    fn route(&mut self, event: StreamEvent) {
        match event {
            StreamEvent::Trade(trade) => self.route_trade(trade),
            StreamEvent::NewToken(token) => {
                if self.registry.new_tokens {
                    self.emit(SessionEvent::NewToken(token));
                }
            }
            StreamEvent::Migration(migration) => {
                if self.registry.tokens.contains_key(&migration.mint) {
                    self.emit(SessionEvent::Migration(migration));
                }
            }
            StreamEvent::Unknown => {}
        }
    }

    fn route_trade(&mut self, trade: TradeEvent) {
        let by_account = self.registry.accounts.contains(&trade.trader);
        let mut alerts = Vec::new();

        let by_token = match self.registry.tokens.get_mut(&trade.mint) {
            Some(latch) => {
                let price = trade.price_sol().unwrap_or(0.0);
                let aggregate = self.aggregates.entry(trade.mint.clone()).or_default();
                aggregate.record(trade.is_buy, trade.sol_amount, price);

                if let Some(latch) = latch {
                    for (kind, threshold) in latch.evaluate(price) {
                        alerts.push(PriceAlert {
                            mint: trade.mint.clone(),
                            kind,
                            threshold,
                            price_sol: price,
                            trade_count: aggregate.trade_count,
                        });
                    }
                }
                true
            }
            None => false,
        };

        if !(by_token || by_account) {
            return;
        }

        self.emit(SessionEvent::Trade(trade));
        for alert in alerts {
            info!(mint = %alert.mint, kind = ?alert.kind, threshold = alert.threshold, price = alert.price_sol, "Price alert");
            self.emit(SessionEvent::Alert(alert));
        }
    }

    fn into_report(self, final_state: SessionState) -> SessionReport {
        SessionReport {
            aggregates: self.aggregates,
            events_dispatched: self.events_dispatched,
            alerts_fired: self.alerts_fired,
            decode_failures: self.decode_failures,
            acknowledged: self.acknowledged,
            final_state,
        }
    }
}
