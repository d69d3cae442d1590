//! Duplex channel lifecycle, outbound emission and push listener registry.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use murmur_api::{SyncError, SyncResult};
use murmur_config::ServerConfig;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, info, warn};
use url::Url;

use crate::protocol::{ClientEvent, EventKind, Packet, ServerEvent};

/// Raw text frames flowing over an open channel
#[derive(Debug)]
pub struct Duplex {
    pub outgoing: mpsc::UnboundedSender<String>,
    pub incoming: mpsc::UnboundedReceiver<String>,
}

/// Opens the underlying transport
#[async_trait]
pub trait Connector: Send + Sync {
    async fn open(&self) -> SyncResult<Duplex>;
}

/// [`Connector`] over a WebSocket
#[derive(Debug, Clone)]
pub struct WebSocketConnector {
    url: Url,
}

impl WebSocketConnector {
    pub fn new(config: &ServerConfig) -> SyncResult<Self> {
        Ok(Self {
            url: socket_endpoint(&config.socket_url)?,
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

/// Engine endpoint for a service base URL; http(s) maps to ws(s)
pub fn socket_endpoint(base: &str) -> SyncResult<Url> {
    let mut url = Url::parse(base)
        .map_err(|err| SyncError::validation(format!("invalid socket url {base}: {err}")))?;

    let scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => {
            return Err(SyncError::validation(format!(
                "unsupported socket url scheme {other}"
            )))
        }
    };
    url.set_scheme(scheme)
        .map_err(|_| SyncError::validation(format!("cannot use {scheme} for {base}")))?;
    url.set_path("/socket.io/");
    url.set_query(Some("EIO=4&transport=websocket"));
    Ok(url)
}

#[async_trait]
impl Connector for WebSocketConnector {
    async fn open(&self) -> SyncResult<Duplex> {
        debug!(url = %self.url, "opening websocket");
        let (stream, _) = connect_async(self.url.as_str())
            .await
            .map_err(|err| SyncError::transport(format!("websocket connect failed: {err}")))?;

        let (mut sink, mut source) = stream.split();
        let (outgoing_tx, mut outgoing_rx) = mpsc::unbounded_channel::<String>();
        let (incoming_tx, incoming_rx) = mpsc::unbounded_channel::<String>();

        tokio::spawn(async move {
            while let Some(frame) = outgoing_rx.recv().await {
                if let Err(err) = sink.send(WsMessage::Text(frame)).await {
                    warn!(error = %err, "websocket write failed");
                    return;
                }
            }
            let _ = sink.close().await;
        });

        tokio::spawn(async move {
            while let Some(message) = source.next().await {
                match message {
                    Ok(WsMessage::Text(text)) => {
                        if incoming_tx.send(text).is_err() {
                            break;
                        }
                    }
                    Ok(WsMessage::Close(_)) => break,
                    Ok(_) => {}
                    Err(err) => {
                        warn!(error = %err, "websocket read failed");
                        break;
                    }
                }
            }
        });

        Ok(Duplex {
            outgoing: outgoing_tx,
            incoming: incoming_rx,
        })
    }
}

pub type Listener = Arc<dyn Fn(&ServerEvent) + Send + Sync>;

/// Push-event listeners keyed by event kind
#[derive(Default)]
pub struct ListenerRegistry {
    next_id: AtomicU64,
    listeners: Mutex<HashMap<EventKind, Vec<(u64, Listener)>>>,
}

impl fmt::Debug for ListenerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let listeners = self.lock();
        let counts: HashMap<_, _> = listeners
            .iter()
            .map(|(kind, entries)| (*kind, entries.len()))
            .collect();
        f.debug_struct("ListenerRegistry")
            .field("listeners", &counts)
            .finish()
    }
}

impl ListenerRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<EventKind, Vec<(u64, Listener)>>> {
        self.listeners
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Register `listener` for `kind`; it stays registered while the
    /// returned subscription is alive
    pub fn on<F>(self: &Arc<Self>, kind: EventKind, listener: F) -> Subscription
    where
        F: Fn(&ServerEvent) + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.lock()
            .entry(kind)
            .or_default()
            .push((id, Arc::new(listener)));
        Subscription {
            registry: Arc::downgrade(self),
            kind,
            id,
        }
    }

    fn remove(&self, kind: EventKind, id: u64) {
        let mut listeners = self.lock();
        if let Some(entries) = listeners.get_mut(&kind) {
            entries.retain(|(entry_id, _)| *entry_id != id);
            if entries.is_empty() {
                listeners.remove(&kind);
            }
        }
    }

    /// Invoke every listener for the event's kind; returns how many ran
    pub fn dispatch(&self, event: &ServerEvent) -> usize {
        let targets: Vec<Listener> = self
            .lock()
            .get(&event.kind())
            .map(|entries| entries.iter().map(|(_, listener)| listener.clone()).collect())
            .unwrap_or_default();

        for listener in &targets {
            listener(event);
        }
        targets.len()
    }

    pub fn listener_count(&self, kind: EventKind) -> usize {
        self.lock().get(&kind).map_or(0, Vec::len)
    }
}

/// Keeps a listener registered; dropping it unregisters the listener
#[must_use = "dropping a subscription unregisters its listener"]
#[derive(Debug)]
pub struct Subscription {
    registry: Weak<ListenerRegistry>,
    kind: EventKind,
    id: u64,
}

impl Subscription {
    pub fn kind(&self) -> EventKind {
        self.kind
    }

    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.remove(self.kind, self.id);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Connected,
}

#[derive(Debug)]
enum LinkCommand {
    Frame(String),
    Close,
}

#[derive(Debug)]
struct Link {
    commands: mpsc::UnboundedSender<LinkCommand>,
    task: JoinHandle<()>,
}

/// Owns the duplex channel for one user session.
///
/// Outbound events are queued until the service acknowledges the namespace
/// connect. Inbound events are decoded and handed to registered listeners.
pub struct ConnectionManager {
    connector: Arc<dyn Connector>,
    listeners: Arc<ListenerRegistry>,
    status: Arc<watch::Sender<ConnectionStatus>>,
    link: Option<Link>,
}

impl fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("status", &self.status())
            .field("listeners", &self.listeners)
            .finish()
    }
}

impl ConnectionManager {
    pub fn new(connector: Arc<dyn Connector>) -> Self {
        let (status, _) = watch::channel(ConnectionStatus::Disconnected);
        Self {
            connector,
            listeners: ListenerRegistry::new(),
            status: Arc::new(status),
            link: None,
        }
    }

    pub fn status(&self) -> ConnectionStatus {
        *self.status.borrow()
    }

    pub fn watch_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.status.subscribe()
    }

    pub fn is_open(&self) -> bool {
        self.link
            .as_ref()
            .is_some_and(|link| !link.commands.is_closed())
    }

    pub fn connector(&self) -> Arc<dyn Connector> {
        self.connector.clone()
    }

    pub fn mark_connecting(&self) {
        self.status.send_replace(ConnectionStatus::Connecting);
    }

    /// Open the channel and announce `user_id`.
    ///
    /// An already open channel is closed first.
    pub async fn connect(&mut self, user_id: &str) -> SyncResult<()> {
        if self.link.is_some() {
            self.disconnect().await;
        }

        self.mark_connecting();
        let opened = self.connector.open().await;
        self.attach(opened, user_id).await
    }

    /// Take over a channel opened through [`ConnectionManager::connector`] and
    /// announce `user_id`.
    ///
    /// Replaces any open channel. A failed open leaves the manager disconnected.
    pub async fn attach(&mut self, opened: SyncResult<Duplex>, user_id: &str) -> SyncResult<()> {
        if self.link.is_some() {
            self.disconnect().await;
        }

        let duplex = match opened {
            Ok(duplex) => duplex,
            Err(err) => {
                warn!(error = %err, "failed to open channel");
                self.status.send_replace(ConnectionStatus::Disconnected);
                return Err(err);
            }
        };

        self.mark_connecting();

        let (commands, command_rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(run_link(
            duplex,
            command_rx,
            self.listeners.clone(),
            self.status.clone(),
        ));
        self.link = Some(Link { commands, task });

        info!(user_id, "channel opened");
        self.emit(&ClientEvent::JoinUser(user_id.to_string()))
    }

    /// Close the channel; a no-op when nothing is open
    pub async fn disconnect(&mut self) {
        let Some(link) = self.link.take() else {
            return;
        };
        let _ = link.commands.send(LinkCommand::Close);
        if let Err(err) = link.task.await {
            if !err.is_cancelled() {
                warn!(error = %err, "channel task ended abnormally");
            }
        }
        self.status.send_replace(ConnectionStatus::Disconnected);
        info!("channel closed");
    }

    /// Queue an outbound event
    pub fn emit(&self, event: &ClientEvent) -> SyncResult<()> {
        let link = self
            .link
            .as_ref()
            .ok_or_else(|| SyncError::transport("channel is not connected"))?;
        let frame = event.to_frame()?;
        debug!(event = event.name(), "emitting event");
        link.commands
            .send(LinkCommand::Frame(frame))
            .map_err(|_| SyncError::transport("channel is closed"))
    }

    /// Subscribe to push events of a room
    pub fn join_conversation(&self, conversation_id: &str) -> SyncResult<()> {
        self.emit(&ClientEvent::JoinChat(conversation_id.to_string()))
    }

    pub fn on<F>(&self, kind: EventKind, listener: F) -> Subscription
    where
        F: Fn(&ServerEvent) + Send + Sync + 'static,
    {
        self.listeners.on(kind, listener)
    }

    pub fn off(&self, subscription: Subscription) {
        subscription.unsubscribe();
    }

    pub fn listeners(&self) -> &Arc<ListenerRegistry> {
        &self.listeners
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        if let Some(link) = self.link.take() {
            let _ = link.commands.send(LinkCommand::Close);
        }
    }
}

async fn run_link(
    mut duplex: Duplex,
    mut commands: mpsc::UnboundedReceiver<LinkCommand>,
    listeners: Arc<ListenerRegistry>,
    status: Arc<watch::Sender<ConnectionStatus>>,
) {
    let mut ready = false;
    let mut backlog: Vec<String> = Vec::new();

    loop {
        tokio::select! {
            frame = duplex.incoming.recv() => {
                let Some(frame) = frame else {
                    info!("channel closed by peer");
                    break;
                };

                let packet = match Packet::decode(&frame) {
                    Ok(packet) => packet,
                    Err(err) => {
                        warn!(error = %err, "dropping undecodable frame");
                        continue;
                    }
                };

                match packet {
                    Packet::Open(handshake) => {
                        debug!(sid = %handshake.sid, "engine handshake received");
                        if duplex.outgoing.send(Packet::connect().encode()).is_err() {
                            break;
                        }
                    }
                    Packet::Ping(data) => {
                        if duplex.outgoing.send(Packet::Pong(data).encode()).is_err() {
                            break;
                        }
                    }
                    Packet::Connect { namespace, .. } => {
                        debug!(%namespace, queued = backlog.len(), "namespace connected");
                        ready = true;
                        status.send_replace(ConnectionStatus::Connected);
                        if backlog.drain(..).any(|frame| duplex.outgoing.send(frame).is_err()) {
                            break;
                        }
                    }
                    Packet::Event { name, payload, .. } => match ServerEvent::decode(&name, payload) {
                        Ok(Some(event)) => {
                            listeners.dispatch(&event);
                        }
                        Ok(None) => debug!(event = %name, "ignoring unhandled event"),
                        Err(err) => warn!(event = %name, error = %err, "dropping malformed event"),
                    },
                    Packet::ConnectError { message, .. } => {
                        warn!(%message, "service refused namespace connect");
                        break;
                    }
                    Packet::Close | Packet::Disconnect { .. } => {
                        info!("service closed the channel");
                        break;
                    }
                    Packet::Pong(_) | Packet::Noop | Packet::Ignored => {}
                }
            }
            command = commands.recv() => match command {
                Some(LinkCommand::Frame(frame)) => {
                    if !ready {
                        backlog.push(frame);
                    } else if duplex.outgoing.send(frame).is_err() {
                        break;
                    }
                }
                Some(LinkCommand::Close) | None => {
                    if ready {
                        let _ = duplex.outgoing.send(
                            Packet::Disconnect { namespace: crate::protocol::DEFAULT_NAMESPACE.to_string() }.encode(),
                        );
                    }
                    let _ = duplex.outgoing.send(Packet::Close.encode());
                    break;
                }
            }
        }
    }

    status.send_replace(ConnectionStatus::Disconnected);
}
