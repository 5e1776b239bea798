//! Top-level session controller.
//!
//! Owns the socket connection, the event bus and both state machines, and
//! wires server-pushed events to state transitions. UI layers hold a
//! controller by reference and render from [`SessionSnapshot`]; there is no
//! process-global state.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, warn};

use anochat_shared::{
    ClientCommand, ContactDecision, SearchParams, SearchStats, ServerEvent,
};

use crate::chat::{ChatSession, ChatState};
use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::lock;
use crate::search::{normalize_criteria, SearchPhase, SearchState};
use crate::typing::TypingTimer;
use crate::ws::{
    ConnectionState, EventBus, EventKind, ReconnectConfig, SocketConnection, SocketEvent,
    SocketHandle, Subscription,
};

/// Quiet period after the last keystroke before we announce we stopped
/// typing.
pub const LOCAL_TYPING_WINDOW: Duration = Duration::from_millis(1000);

/// Watchdog for the partner indicator: a lost `chat:stop_typing` event must
/// not wedge it on forever.
pub const REMOTE_TYPING_EXPIRY: Duration = Duration::from_millis(5000);

/// Identity of the authenticated local user, used to tag own messages in
/// the log.
#[derive(Debug, Clone)]
pub struct LocalUser {
    pub telegram_id: i64,
}

/// Session-level alerts surfaced to the UI.
#[derive(Debug, Clone, Default)]
struct Alerts {
    last_error: Option<String>,
    auth_required: bool,
    contact_status: Option<(String, ContactDecision)>,
}

/// Cloneable view model the UI renders from.
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub connection: ConnectionState,
    pub search: SearchPhase,
    pub stats: Option<SearchStats>,
    pub chat: Option<ChatSession>,
    pub locally_typing: bool,
    pub last_error: Option<String>,
    /// Set when the server rejected the token; the owner of the token
    /// should re-authenticate and reconnect.
    pub auth_required: bool,
    pub contact_status: Option<(String, ContactDecision)>,
}

pub struct SessionController {
    connection: SocketConnection,
    handle: SocketHandle,
    bus: Arc<EventBus>,
    me: LocalUser,
    search: Arc<Mutex<SearchState>>,
    chat: Arc<Mutex<ChatState>>,
    local_typing: Arc<TypingTimer>,
    remote_typing: Arc<TypingTimer>,
    alerts: Arc<Mutex<Alerts>>,
    // Keeps the bus registrations alive for the controller's lifetime.
    _subscriptions: Vec<Subscription>,
}

impl SessionController {
    pub fn new(config: ClientConfig, me: LocalUser) -> Self {
        let bus = EventBus::new();
        let connection = SocketConnection::new(config, ReconnectConfig::default(), Arc::clone(&bus));
        let handle = connection.handle();
        let search = Arc::new(Mutex::new(SearchState::default()));
        let chat = Arc::new(Mutex::new(ChatState::default()));
        let alerts = Arc::new(Mutex::new(Alerts::default()));

        // Debounced "we are typing" suppression: the stop side announces
        // itself on the wire.
        let local_typing = Arc::new(TypingTimer::new(LOCAL_TYPING_WINDOW, {
            let handle = handle.clone();
            let chat = Arc::clone(&chat);
            move || {
                let chat_id = lock(&chat).chat_id().map(str::to_owned);
                if let Some(chat_id) = chat_id {
                    if let Err(err) = handle.send(ClientCommand::ChatStopTyping { chat_id }) {
                        debug!("stop-typing not sent: {err}");
                    }
                }
            }
        }));

        // Partner indicator watchdog: expiry just clears the flag.
        let remote_typing = Arc::new(TypingTimer::new(REMOTE_TYPING_EXPIRY, {
            let chat = Arc::clone(&chat);
            move || lock(&chat).set_partner_typing(false)
        }));

        let mut controller = Self {
            connection,
            handle,
            bus,
            me,
            search,
            chat,
            local_typing,
            remote_typing,
            alerts,
            _subscriptions: Vec::new(),
        };
        controller._subscriptions = controller.wire_events();
        controller
    }

    /// The event bus, for ancillary subscribers (haptics, sounds, logging).
    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    // --- Connection lifecycle ---

    /// Open the realtime socket with a bearer token from the auth API.
    pub async fn connect(&self, token: &str) -> Result<(), ClientError> {
        self.connection.connect(token).await
    }

    /// Tear the session down: best-effort stats unsubscribe, then close the
    /// socket. All timers are cancelled so nothing fires into the torn-down
    /// session.
    pub fn disconnect(&self) {
        if let Err(err) = self.handle.send(ClientCommand::UnsubscribeStats) {
            debug!("stats unsubscribe not sent: {err}");
        }
        self.local_typing.cancel();
        self.remote_typing.cancel();
        self.connection.disconnect();
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.connection.state()
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_connected()
    }

    // --- Search ---

    /// Start a matchmaking search. Validation failures never reach the
    /// wire; a search already in flight makes this a logged no-op.
    pub fn start_search(&self, params: &SearchParams) -> Result<(), ClientError> {
        let criteria = normalize_criteria(params)?;
        if !self.handle.is_connected() {
            return Err(ClientError::NotConnected);
        }
        if !lock(&self.search).begin() {
            debug!("search already in flight, ignoring duplicate start");
            return Ok(());
        }

        // A new search invalidates whatever chat was still on screen.
        self.clear_chat_locally();

        if let Err(err) = self.handle.send(ClientCommand::SearchStart { criteria }) {
            lock(&self.search).cancel();
            return Err(err);
        }
        let _ = self.handle.send(ClientCommand::SubscribeStats);
        Ok(())
    }

    /// Cancel the search in flight. From idle this is a no-op and emits
    /// nothing.
    pub fn cancel_search(&self) -> Result<(), ClientError> {
        if !lock(&self.search).cancel() {
            return Ok(());
        }
        self.handle.send(ClientCommand::SearchCancel)
    }

    // --- Chat ---

    /// Send a message in the active chat. Fire-and-forget: the input can be
    /// cleared immediately, only the server echo (carrying the canonical
    /// id) enters the log. A pending reply reference is consumed by the
    /// send.
    pub fn send_message(&self, content: &str) -> Result<(), ClientError> {
        let content = content.trim();
        if content.is_empty() {
            return Err(ClientError::EmptyMessage);
        }
        if !self.handle.is_connected() {
            return Err(ClientError::NotConnected);
        }
        let (chat_id, reply_to) = {
            let mut chat = lock(&self.chat);
            let chat_id = chat
                .chat_id()
                .map(str::to_owned)
                .ok_or(ClientError::NoActiveChat)?;
            (chat_id, chat.take_reply())
        };
        self.handle.send(ClientCommand::ChatMessage {
            chat_id,
            content: content.to_owned(),
            reply_to,
        })?;
        // Sending ends the typing burst immediately.
        self.local_typing.stop();
        Ok(())
    }

    /// Drive the local typing indicator from input changes. Emits
    /// `chat:start_typing` once per burst; the debounce window (or an
    /// emptied input) emits the matching stop.
    pub fn input_changed(&self, input: &str) -> Result<(), ClientError> {
        if !lock(&self.chat).is_active() {
            return Ok(());
        }
        if input.trim().is_empty() {
            self.local_typing.stop();
            return Ok(());
        }
        if !self.handle.is_connected() {
            return Err(ClientError::NotConnected);
        }
        if self.local_typing.start() {
            let chat_id = lock(&self.chat).chat_id().map(str::to_owned);
            if let Some(chat_id) = chat_id {
                if let Err(err) = self.handle.send(ClientCommand::ChatStartTyping { chat_id }) {
                    self.local_typing.cancel();
                    return Err(err);
                }
            }
        }
        Ok(())
    }

    /// Mark a logged message as the reply target for the next send; `None`
    /// clears it. Returns `false` for an id not present in the log.
    pub fn set_reply_target(&self, message_id: Option<String>) -> bool {
        lock(&self.chat).set_replying_to(message_id)
    }

    /// Acknowledge the partner's messages up to now.
    pub fn mark_read(&self) -> Result<(), ClientError> {
        let chat_id = lock(&self.chat)
            .chat_id()
            .map(str::to_owned)
            .ok_or(ClientError::NoActiveChat)?;
        self.handle.send(ClientCommand::ChatRead {
            chat_id,
            timestamp: Utc::now(),
        })
    }

    /// End the active chat.
    ///
    /// Local state clears synchronously and unconditionally; the `chat:end`
    /// command on top is best-effort and its failure is surfaced, not
    /// retried.
    pub fn end_chat(&self, reason: Option<&str>) -> Result<(), ClientError> {
        self.local_typing.cancel();
        self.remote_typing.cancel();
        let ended = lock(&self.chat).end();
        lock(&self.search).reset();
        let Some(chat_id) = ended else {
            return Ok(());
        };
        self.handle.send(ClientCommand::ChatEnd {
            chat_id,
            reason: Some(reason.unwrap_or("user_ended").to_owned()),
        })
    }

    /// Rate the partner of a (typically just ended) chat.
    pub fn rate_chat(
        &self,
        chat_id: &str,
        score: u8,
        comment: Option<&str>,
    ) -> Result<(), ClientError> {
        if !(1..=5).contains(&score) {
            return Err(ClientError::RatingOutOfRange(score));
        }
        self.handle.send(ClientCommand::ChatRate {
            chat_id: chat_id.to_owned(),
            score,
            comment: comment.map(str::to_owned),
        })
    }

    // --- Contacts ---

    /// Ask the current partner to exchange contacts.
    pub fn request_contact(&self) -> Result<(), ClientError> {
        let (to, chat_id) = {
            let chat = lock(&self.chat);
            let session = chat.session().ok_or(ClientError::NoActiveChat)?;
            (session.partner.telegram_id.clone(), session.chat_id.clone())
        };
        self.handle.send(ClientCommand::ContactRequest { to, chat_id })
    }

    /// Answer an incoming contact request.
    pub fn respond_contact(
        &self,
        user_id: &str,
        status: ContactDecision,
    ) -> Result<(), ClientError> {
        self.handle.send(ClientCommand::ContactRespond {
            user_id: user_id.to_owned(),
            status,
        })
    }

    // --- View model ---

    pub fn snapshot(&self) -> SessionSnapshot {
        let (search, stats) = {
            let search = lock(&self.search);
            (search.phase().clone(), search.stats().copied())
        };
        let alerts = lock(&self.alerts).clone();
        SessionSnapshot {
            connection: self.connection.state(),
            search,
            stats,
            chat: lock(&self.chat).session().cloned(),
            locally_typing: self.local_typing.is_active(),
            last_error: alerts.last_error,
            auth_required: alerts.auth_required,
            contact_status: alerts.contact_status,
        }
    }

    /// Clear the surfaced error once the UI has shown it.
    pub fn clear_error(&self) {
        lock(&self.alerts).last_error = None;
    }

    // --- Internals ---

    fn clear_chat_locally(&self) {
        self.local_typing.cancel();
        self.remote_typing.cancel();
        lock(&self.chat).end();
    }

    fn wire_events(&self) -> Vec<Subscription> {
        let bus = &self.bus;
        let mut subs = Vec::new();

        // Stats are a best-effort side channel; (re)subscribe whenever the
        // socket comes up.
        for kind in [EventKind::Connected, EventKind::ConnectionRecovered] {
            let handle = self.handle.clone();
            subs.push(bus.on(kind, move |_| {
                if let Err(err) = handle.send(ClientCommand::SubscribeStats) {
                    debug!("stats subscribe not sent: {err}");
                }
            }));
        }

        subs.push(bus.on(EventKind::SearchMatched, {
            let search = Arc::clone(&self.search);
            let chat = Arc::clone(&self.chat);
            let handle = self.handle.clone();
            move |event| {
                let SocketEvent::Event(ServerEvent::SearchMatched { matched_user }) = event else {
                    return;
                };
                // Tie-break rule: a match only counts against a search that
                // is still in flight.
                let Some(user) = lock(&search).matched(matched_user.clone()) else {
                    debug!("ignoring matched event with no search in flight");
                    return;
                };
                if let Err(err) = handle.send(ClientCommand::ChatJoin(user.chat_id.clone())) {
                    warn!("chat join not sent: {err}");
                }
                lock(&chat).begin(user);
            }
        }));

        subs.push(bus.on(EventKind::SearchStats, {
            let search = Arc::clone(&self.search);
            move |event| {
                if let SocketEvent::Event(ServerEvent::SearchStats(stats)) = event {
                    lock(&search).update_stats(*stats);
                }
            }
        }));

        subs.push(bus.on(EventKind::SearchExpired, {
            let search = Arc::clone(&self.search);
            let alerts = Arc::clone(&self.alerts);
            move |_| {
                if lock(&search).expired() {
                    lock(&alerts).last_error = Some("search expired".to_string());
                }
            }
        }));

        subs.push(bus.on(EventKind::ChatMessage, {
            let chat = Arc::clone(&self.chat);
            let my_telegram_id = self.me.telegram_id;
            move |event| {
                let SocketEvent::Event(ServerEvent::ChatMessage { message, .. }) = event else {
                    return;
                };
                if !lock(&chat).add_incoming(message.clone(), my_telegram_id) {
                    debug!("dropping duplicate or foreign chat message {}", message.id);
                }
            }
        }));

        subs.push(bus.on(EventKind::ChatStartTyping, {
            let chat = Arc::clone(&self.chat);
            let remote_typing = Arc::clone(&self.remote_typing);
            let my_id = self.me.telegram_id.to_string();
            move |event| {
                let SocketEvent::Event(ServerEvent::ChatStartTyping { chat_id, user_id }) = event
                else {
                    return;
                };
                // Our own start-typing echoes back through the room.
                if *user_id == my_id {
                    return;
                }
                {
                    let mut chat = lock(&chat);
                    if chat.chat_id() != Some(chat_id.as_str()) {
                        return;
                    }
                    chat.set_partner_typing(true);
                }
                remote_typing.start();
            }
        }));

        subs.push(bus.on(EventKind::ChatStopTyping, {
            let chat = Arc::clone(&self.chat);
            let remote_typing = Arc::clone(&self.remote_typing);
            let my_id = self.me.telegram_id.to_string();
            move |event| {
                let SocketEvent::Event(ServerEvent::ChatStopTyping { chat_id, user_id }) = event
                else {
                    return;
                };
                if *user_id == my_id {
                    return;
                }
                let relevant = lock(&chat).chat_id() == Some(chat_id.as_str());
                if relevant {
                    // Fires the flag-clearing callback and disarms the
                    // watchdog.
                    remote_typing.stop();
                }
            }
        }));

        subs.push(bus.on(EventKind::ChatEnded, {
            let chat = Arc::clone(&self.chat);
            let search = Arc::clone(&self.search);
            let local_typing = Arc::clone(&self.local_typing);
            let remote_typing = Arc::clone(&self.remote_typing);
            move |event| {
                let SocketEvent::Event(ServerEvent::ChatEnded { chat_id, .. }) = event else {
                    return;
                };
                {
                    let mut chat = lock(&chat);
                    if chat.chat_id() != Some(chat_id.as_str()) {
                        return;
                    }
                    // Remote teardown mirrors the local one but emits no
                    // further end command back.
                    chat.end();
                }
                local_typing.cancel();
                remote_typing.cancel();
                lock(&search).reset();
            }
        }));

        subs.push(bus.on(EventKind::ChatRated, {
            let chat = Arc::clone(&self.chat);
            move |event| {
                if let SocketEvent::Event(ServerEvent::ChatRated { score, .. }) = event {
                    lock(&chat).set_partner_rating(*score);
                }
            }
        }));

        subs.push(bus.on(EventKind::ContactRequest, {
            let chat = Arc::clone(&self.chat);
            move |event| {
                if let SocketEvent::Event(ServerEvent::ContactRequest { from, .. }) = event {
                    lock(&chat).set_contact_request(from.clone());
                }
            }
        }));

        subs.push(bus.on(EventKind::ContactStatus, {
            let alerts = Arc::clone(&self.alerts);
            move |event| {
                if let SocketEvent::Event(ServerEvent::ContactStatus { user_id, status }) = event {
                    lock(&alerts).contact_status = Some((user_id.clone(), *status));
                }
            }
        }));

        subs.push(bus.on(EventKind::Error, {
            let alerts = Arc::clone(&self.alerts);
            move |event| {
                let SocketEvent::Event(ServerEvent::Error { message }) = event else {
                    return;
                };
                let mut alerts = lock(&alerts);
                if message.contains("unauthorized") {
                    alerts.auth_required = true;
                }
                alerts.last_error = Some(message.clone());
            }
        }));

        subs.push(bus.on(EventKind::Disconnected, {
            let chat = Arc::clone(&self.chat);
            let local_typing = Arc::clone(&self.local_typing);
            let remote_typing = Arc::clone(&self.remote_typing);
            move |_| {
                // A dropped socket carries no typing state in either
                // direction.
                local_typing.cancel();
                remote_typing.cancel();
                lock(&chat).set_partner_typing(false);
            }
        }));

        subs
    }
}
