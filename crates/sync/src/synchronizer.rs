//! Session orchestrator.
//!
//! A single task owns every piece of mutable session state. Handles, push
//! listeners, timers and in-flight collaborator calls talk to it through one
//! queue, so handlers never run concurrently. Results of awaited calls are
//! posted back to the queue and re-checked against the current selection
//! before they are applied.

use std::future::Future;
use std::ops::ControlFlow;
use std::sync::Arc;

use murmur_api::{ChatApi, Conversation, Message, Participant, Session, SyncError, SyncResult, User};
use murmur_config::ClientConfig;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::connection::{ConnectionManager, Connector, Duplex, Subscription};
use crate::directory::ConversationDirectory;
use crate::presence::PresenceTracker;
use crate::protocol::{ClientEvent, EventKind, ServerEvent, StopTypingSignal};
use crate::snapshot::{ConversationSummary, MessageView, SessionSnapshot, ViewSignal};
use crate::stream::{AppendOrigin, LoadOutcome, MessageStream, ScrollHint, Viewport};
use crate::timer::DelayedTask;
use crate::typing::TypingCoordinator;

const SIGNAL_CAPACITY: usize = 64;

type Reply<T> = oneshot::Sender<SyncResult<T>>;

#[derive(Debug)]
enum Input {
    Select {
        conversation_id: String,
        reply: Reply<LoadOutcome>,
    },
    Send {
        text: String,
        reply: Reply<Message>,
    },
    InputChanged,
    StartConversation {
        user_id: String,
        reply: Reply<Conversation>,
    },
    RefreshConversations {
        reply: Reply<usize>,
    },
    UpdateViewport(Viewport),
    Reconnect {
        reply: Reply<()>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
    Push(ServerEvent),
    TypingIdle(u64),
    ConversationsLoaded {
        result: SyncResult<Vec<Conversation>>,
        reply: Option<Reply<usize>>,
    },
    HistoryLoaded {
        conversation_id: String,
        generation: u64,
        result: SyncResult<Vec<Message>>,
        reply: Option<Reply<LoadOutcome>>,
    },
    MessageSent {
        conversation_id: String,
        result: SyncResult<Message>,
        reply: Reply<Message>,
    },
    ConversationAccessed {
        result: SyncResult<Conversation>,
        reply: Reply<Conversation>,
    },
    Reopened {
        result: SyncResult<Duplex>,
        reply: Reply<()>,
    },
}

/// Owns and reconciles the state of one user session
pub struct Synchronizer {
    user: User,
    config: ClientConfig,
    api: Arc<dyn ChatApi>,
    connection: ConnectionManager,
    directory: ConversationDirectory,
    stream: MessageStream,
    typing: TypingCoordinator,
    presence: PresenceTracker,
    typing_timer: DelayedTask,
    session_listeners: Vec<Subscription>,
    conversation_listeners: Vec<Subscription>,
    inbox: mpsc::WeakUnboundedSender<Input>,
    snapshot: watch::Sender<SessionSnapshot>,
    signals: broadcast::Sender<ViewSignal>,
}

impl Synchronizer {
    /// Connect the channel for the session user and start the event loop.
    ///
    /// The conversation list is fetched in the background; the returned
    /// handle is usable immediately.
    pub async fn start(
        session: Arc<Session>,
        config: ClientConfig,
        api: Arc<dyn ChatApi>,
        connector: Arc<dyn Connector>,
    ) -> SyncResult<(SessionHandle, JoinHandle<()>)> {
        let user = session.require_user()?;

        let mut connection = ConnectionManager::new(connector);
        connection.connect(&user.id).await?;

        let (inbox_tx, inbox_rx) = mpsc::unbounded_channel();
        let (snapshot_tx, snapshot_rx) = watch::channel(SessionSnapshot::default());
        let (signals, _) = broadcast::channel(SIGNAL_CAPACITY);

        let mut synchronizer = Self {
            stream: MessageStream::new(&config.stream),
            user,
            config,
            api: api.clone(),
            connection,
            directory: ConversationDirectory::new(),
            typing: TypingCoordinator::new(),
            presence: PresenceTracker::new(),
            typing_timer: DelayedTask::new(),
            session_listeners: Vec::new(),
            conversation_listeners: Vec::new(),
            inbox: inbox_tx.downgrade(),
            snapshot: snapshot_tx,
            signals: signals.clone(),
        };

        synchronizer.session_listeners = vec![synchronizer.forward(EventKind::OnlineUsers, None)];
        synchronizer.load_conversations(None);

        info!(user_id = %synchronizer.user.id, "session synchronizer started");
        let task = tokio::spawn(synchronizer.run(inbox_rx));

        let handle = SessionHandle {
            inbox: inbox_tx,
            snapshot: snapshot_rx,
            signals,
            api,
        };
        Ok((handle, task))
    }

    async fn run(mut self, mut inbox: mpsc::UnboundedReceiver<Input>) {
        let mut status = self.connection.watch_status();
        let mut expiry = self.config.typing.expiry_sweep().map(|period| {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            interval
        });
        self.publish();

        loop {
            tokio::select! {
                input = inbox.recv() => {
                    let Some(input) = input else {
                        debug!("all session handles dropped");
                        break;
                    };
                    if self.handle(input).await.is_break() {
                        return;
                    }
                }
                Ok(()) = status.changed() => {
                    let current = *status.borrow_and_update();
                    debug!(status = ?current, "connection status changed");
                    self.publish();
                }
                now = next_tick(&mut expiry) => {
                    if let Some(max_age) = self.config.typing.remote_expiry() {
                        if self.typing.expire(now, max_age) {
                            self.publish();
                        }
                    }
                }
            }
        }

        self.teardown().await;
    }

    async fn handle(&mut self, input: Input) -> ControlFlow<()> {
        match input {
            Input::Select {
                conversation_id,
                reply,
            } => self.select(&conversation_id, Some(reply)),
            Input::Send { text, reply } => self.send(text, reply),
            Input::InputChanged => self.input_changed(),
            Input::StartConversation { user_id, reply } => {
                let api = self.api.clone();
                self.spawn(async move {
                    let result = api.access_conversation(&user_id).await;
                    Input::ConversationAccessed { result, reply }
                });
            }
            Input::RefreshConversations { reply } => self.load_conversations(Some(reply)),
            Input::UpdateViewport(viewport) => self.stream.update_viewport(viewport),
            Input::Reconnect { reply } => self.reconnect(reply).await,
            Input::Reopened { result, reply } => {
                let result = self.reopened(result).await;
                let _ = reply.send(result);
            }
            Input::Shutdown { reply } => {
                self.teardown().await;
                let _ = reply.send(());
                return ControlFlow::Break(());
            }
            Input::Push(event) => self.apply_push(event),
            Input::TypingIdle(generation) => {
                if let Some(stop) = self.typing.local_idle(generation) {
                    self.emit(ClientEvent::StopTyping(stop));
                }
            }
            Input::ConversationsLoaded { result, reply } => {
                let result = result.map(|conversations| {
                    self.directory.replace_all(conversations);
                    self.directory.list().len()
                });
                match &result {
                    Ok(count) => debug!(count, "conversation list loaded"),
                    Err(err) => warn!(error = %err, "conversation list fetch failed"),
                }
                self.publish();
                if let Some(reply) = reply {
                    let _ = reply.send(result);
                }
            }
            Input::HistoryLoaded {
                conversation_id,
                generation,
                result,
                reply,
            } => {
                let outcome = self.stream.finish_load(generation, result);
                if let Ok(LoadOutcome::Applied(_)) = outcome {
                    self.scroll_to_bottom(
                        &conversation_id,
                        ScrollHint {
                            delay: self.config.stream.autoscroll_delay(),
                        },
                    );
                }
                self.publish();
                if let Some(reply) = reply {
                    let _ = reply.send(outcome);
                }
            }
            Input::MessageSent {
                conversation_id,
                result,
                reply,
            } => self.message_sent(conversation_id, result, reply),
            Input::ConversationAccessed { result, reply } => match result {
                Ok(conversation) => {
                    let conversation_id = conversation.id.clone();
                    self.directory.upsert(conversation.clone());
                    self.select(&conversation_id, None);
                    let _ = reply.send(Ok(conversation));
                }
                Err(err) => {
                    warn!(error = %err, "failed to start conversation");
                    let _ = reply.send(Err(err));
                }
            },
        }
        ControlFlow::Continue(())
    }

    fn select(&mut self, conversation_id: &str, reply: Option<Reply<LoadOutcome>>) {
        if let Err(err) = self.directory.select(conversation_id) {
            if let Some(reply) = reply {
                let _ = reply.send(Err(err));
            }
            return;
        }

        self.typing_timer.cancel();
        if let Some(owed) = self.typing.reset(Some(conversation_id)) {
            self.emit(ClientEvent::StopTyping(owed));
        }

        self.conversation_listeners.clear();
        let generation = self.stream.begin_load(conversation_id);

        if let Err(err) = self.connection.join_conversation(conversation_id) {
            warn!(conversation_id, error = %err, "could not join conversation room");
        }
        self.conversation_listeners = [EventKind::ReceiveMessage, EventKind::Typing, EventKind::StopTyping]
            .into_iter()
            .map(|kind| self.forward(kind, Some(conversation_id.to_string())))
            .collect();

        info!(conversation_id, "conversation selected");
        self.publish();

        let api = self.api.clone();
        let conversation_id = conversation_id.to_string();
        self.spawn(async move {
            let result = api.fetch_messages(&conversation_id).await;
            Input::HistoryLoaded {
                conversation_id,
                generation,
                result,
                reply,
            }
        });
    }

    fn send(&mut self, text: String, reply: Reply<Message>) {
        if text.trim().is_empty() {
            let _ = reply.send(Err(SyncError::validation("message text is empty")));
            return;
        }
        let Some(conversation_id) = self.directory.active_id().map(str::to_string) else {
            let _ = reply.send(Err(SyncError::validation("no conversation is selected")));
            return;
        };

        let api = self.api.clone();
        self.spawn(async move {
            let result = api.send_message(&conversation_id, &text).await;
            Input::MessageSent {
                conversation_id,
                result,
                reply,
            }
        });
    }

    fn message_sent(&mut self, conversation_id: String, result: SyncResult<Message>, reply: Reply<Message>) {
        let message = match result {
            Ok(message) => message,
            Err(err) => {
                warn!(%conversation_id, error = %err, "message was not sent");
                let _ = reply.send(Err(err));
                return;
            }
        };

        let still_active = self.stream.conversation_id() == Some(conversation_id.as_str());
        let scroll = if still_active {
            self.stream.append(message.clone(), AppendOrigin::Local).scroll
        } else {
            debug!(%conversation_id, "sent message belongs to an inactive conversation");
            None
        };

        self.emit(ClientEvent::SendMessage(message.clone()));

        let stop = if still_active {
            self.typing_timer.cancel();
            self.typing.local_stop()
        } else {
            None
        };
        self.emit(ClientEvent::StopTyping(stop.unwrap_or(StopTypingSignal {
            conversation_id: conversation_id.clone(),
            user_id: self.user.id.clone(),
        })));

        if let Some(hint) = scroll {
            self.scroll_to_bottom(&conversation_id, hint);
        }
        self.publish();
        let _ = reply.send(Ok(message));
    }

    fn input_changed(&mut self) {
        let Some(outcome) = self.typing.local_input(&self.user.as_participant()) else {
            return;
        };
        if let Some(start) = outcome.start {
            self.emit(ClientEvent::Typing(start));
        }

        let inbox = self.inbox.clone();
        let generation = outcome.generation;
        self.typing_timer
            .schedule(self.config.typing.debounce(), async move {
                if let Some(inbox) = inbox.upgrade() {
                    let _ = inbox.send(Input::TypingIdle(generation));
                }
            });
    }

    fn apply_push(&mut self, event: ServerEvent) {
        let changed = match event {
            ServerEvent::ReceiveMessage(message) => {
                if self.stream.conversation_id() != Some(message.conversation_id.as_str()) {
                    debug!(conversation_id = %message.conversation_id, "dropping message for inactive conversation");
                    return;
                }
                let conversation_id = message.conversation_id.clone();
                let outcome = self.stream.append(message, AppendOrigin::Remote);
                if let Some(hint) = outcome.scroll {
                    self.scroll_to_bottom(&conversation_id, hint);
                }
                outcome.appended
            }
            ServerEvent::Typing(signal) => {
                signal.user_id != self.user.id && self.typing.remote_started(&signal, Instant::now())
            }
            ServerEvent::StopTyping(signal) => self.typing.remote_stopped(&signal),
            ServerEvent::OnlineUsers(user_ids) => {
                self.presence.replace(user_ids);
                true
            }
        };

        if changed {
            self.publish();
        }
    }

    /// Close the current channel and open a new one off the queue
    async fn reconnect(&mut self, reply: Reply<()>) {
        self.connection.disconnect().await;
        self.connection.mark_connecting();
        self.publish();

        let connector = self.connection.connector();
        self.spawn(async move {
            let result = connector.open().await;
            Input::Reopened { result, reply }
        });
    }

    /// Install a reopened channel and rejoin the active conversation room
    async fn reopened(&mut self, result: SyncResult<Duplex>) -> SyncResult<()> {
        self.connection.attach(result, &self.user.id).await?;
        if let Some(conversation_id) = self.directory.active_id() {
            self.connection.join_conversation(conversation_id)?;
        }
        self.publish();
        Ok(())
    }

    fn load_conversations(&self, reply: Option<Reply<usize>>) {
        let api = self.api.clone();
        self.spawn(async move {
            let result = api.fetch_conversations().await;
            Input::ConversationsLoaded { result, reply }
        });
    }

    /// Route pushes of `kind` into the queue, optionally scoped to one conversation
    fn forward(&self, kind: EventKind, scope: Option<String>) -> Subscription {
        let inbox = self.inbox.clone();
        self.connection.on(kind, move |event| {
            if let Some(scope) = scope.as_deref() {
                if event.conversation_id() != Some(scope) {
                    return;
                }
            }
            if let Some(inbox) = inbox.upgrade() {
                let _ = inbox.send(Input::Push(event.clone()));
            }
        })
    }

    fn spawn<F>(&self, work: F)
    where
        F: Future<Output = Input> + Send + 'static,
    {
        let Some(inbox) = self.inbox.upgrade() else {
            return;
        };
        tokio::spawn(async move {
            let input = work.await;
            let _ = inbox.send(input);
        });
    }

    fn emit(&self, event: ClientEvent) {
        if let Err(err) = self.connection.emit(&event) {
            warn!(event = event.name(), error = %err, "failed to emit event");
        }
    }

    fn scroll_to_bottom(&self, conversation_id: &str, hint: ScrollHint) {
        let _ = self.signals.send(ViewSignal::ScrollToBottom {
            conversation_id: conversation_id.to_string(),
            delay: hint.delay,
        });
    }

    async fn teardown(&mut self) {
        self.typing_timer.cancel();
        if let Some(owed) = self.typing.reset(None) {
            self.emit(ClientEvent::StopTyping(owed));
        }
        self.conversation_listeners.clear();
        self.session_listeners.clear();
        self.connection.disconnect().await;
        self.publish();
        info!(user_id = %self.user.id, "session synchronizer stopped");
    }

    fn publish(&self) {
        let active = self.directory.active_id();
        let conversations = self
            .directory
            .list()
            .iter()
            .map(|conversation| {
                let counterpart = conversation.counterpart(&self.user.id);
                ConversationSummary {
                    id: conversation.id.clone(),
                    title: conversation.title_for(&self.user.id).to_string(),
                    counterpart_id: counterpart.map(|participant| participant.id.clone()),
                    online: counterpart.is_some_and(|participant| self.presence.is_online(&participant.id)),
                    active: active == Some(conversation.id.as_str()),
                }
            })
            .collect();

        let messages = self
            .stream
            .messages()
            .iter()
            .map(|message| MessageView {
                own: message.is_from(&self.user.id),
                message: message.clone(),
            })
            .collect();

        self.snapshot.send_replace(SessionSnapshot {
            user_id: Some(self.user.id.clone()),
            connection: self.connection.status(),
            conversations,
            active_conversation: active.map(str::to_string),
            messages,
            typing: self.typing.typing_names(),
            online_users: self.presence.online_users(),
            loading: self.stream.is_loading(),
        });
    }
}

async fn next_tick(interval: &mut Option<Interval>) -> Instant {
    match interval {
        Some(interval) => interval.tick().await,
        None => std::future::pending().await,
    }
}

/// Cloneable entry point to a running [`Synchronizer`]
#[derive(Clone)]
pub struct SessionHandle {
    inbox: mpsc::UnboundedSender<Input>,
    snapshot: watch::Receiver<SessionSnapshot>,
    signals: broadcast::Sender<ViewSignal>,
    api: Arc<dyn ChatApi>,
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle")
            .field("closed", &self.inbox.is_closed())
            .finish()
    }
}

impl SessionHandle {
    async fn request<T>(&self, build: impl FnOnce(Reply<T>) -> Input) -> SyncResult<T> {
        let (reply, response) = oneshot::channel();
        self.inbox
            .send(build(reply))
            .map_err(|_| SyncError::Closed)?;
        response.await.map_err(|_| SyncError::Closed)?
    }

    fn post(&self, input: Input) -> SyncResult<()> {
        self.inbox.send(input).map_err(|_| SyncError::Closed)
    }

    /// Make `conversation_id` active and load its history
    pub async fn select_conversation(&self, conversation_id: &str) -> SyncResult<LoadOutcome> {
        let conversation_id = conversation_id.to_string();
        self.request(|reply| Input::Select {
            conversation_id,
            reply,
        })
        .await
    }

    /// Send `text` to the active conversation
    pub async fn send_message(&self, text: &str) -> SyncResult<Message> {
        let text = text.to_string();
        self.request(|reply| Input::Send { text, reply }).await
    }

    /// Report a change of the composer contents
    pub fn input_changed(&self) -> SyncResult<()> {
        self.post(Input::InputChanged)
    }

    /// Open, creating if needed, the conversation with `user_id` and select it
    pub async fn start_conversation(&self, user_id: &str) -> SyncResult<Conversation> {
        let user_id = user_id.to_string();
        self.request(|reply| Input::StartConversation { user_id, reply })
            .await
    }

    pub async fn refresh_conversations(&self) -> SyncResult<usize> {
        self.request(|reply| Input::RefreshConversations { reply })
            .await
    }

    pub async fn search_users(&self, query: &str) -> SyncResult<Vec<Participant>> {
        let query = query.trim();
        if query.is_empty() {
            return Err(SyncError::validation("search query is empty"));
        }
        self.api.search_users(query).await
    }

    /// Reopen the channel after it dropped; connection loss is never retried automatically
    pub async fn reconnect(&self) -> SyncResult<()> {
        self.request(|reply| Input::Reconnect { reply }).await
    }

    pub fn update_viewport(&self, viewport: Viewport) -> SyncResult<()> {
        self.post(Input::UpdateViewport(viewport))
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshot.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshot.clone()
    }

    pub fn signals(&self) -> broadcast::Receiver<ViewSignal> {
        self.signals.subscribe()
    }

    /// Stop the synchronizer and close the channel
    pub async fn shutdown(&self) -> SyncResult<()> {
        let (reply, done) = oneshot::channel();
        self.post(Input::Shutdown { reply })?;
        done.await.map_err(|_| SyncError::Closed)
    }
}
