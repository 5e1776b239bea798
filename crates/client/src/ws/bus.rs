//! Typed publish/subscribe fan-out for socket events.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};

use anochat_shared::ServerEvent;

use crate::lock;

/// Event delivered to bus subscribers.
#[derive(Debug, Clone)]
pub enum SocketEvent {
    /// The socket handshake completed (initial connect or reconnect).
    Connected,
    /// The socket dropped; the connection manager may still be retrying.
    Disconnected,
    /// A decoded server event.
    Event(ServerEvent),
}

/// Subscription key: one per server event name plus the two transport
/// lifecycle notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Connected,
    Disconnected,
    SearchMatched,
    SearchStatus,
    SearchExpired,
    SearchStats,
    ChatMessage,
    ChatStartTyping,
    ChatStopTyping,
    ChatRead,
    ChatEnded,
    ChatRated,
    ContactRequest,
    ContactStatus,
    ConnectionRecovered,
    Error,
}

impl SocketEvent {
    /// The subscription key this event is delivered under.
    pub fn kind(&self) -> EventKind {
        match self {
            SocketEvent::Connected => EventKind::Connected,
            SocketEvent::Disconnected => EventKind::Disconnected,
            SocketEvent::Event(event) => match event {
                ServerEvent::SearchMatched { .. } => EventKind::SearchMatched,
                ServerEvent::SearchStatus { .. } => EventKind::SearchStatus,
                ServerEvent::SearchExpired => EventKind::SearchExpired,
                ServerEvent::SearchStats(_) => EventKind::SearchStats,
                ServerEvent::ChatMessage { .. } => EventKind::ChatMessage,
                ServerEvent::ChatStartTyping { .. } => EventKind::ChatStartTyping,
                ServerEvent::ChatStopTyping { .. } => EventKind::ChatStopTyping,
                ServerEvent::ChatRead { .. } => EventKind::ChatRead,
                ServerEvent::ChatEnded { .. } => EventKind::ChatEnded,
                ServerEvent::ChatRated { .. } => EventKind::ChatRated,
                ServerEvent::ContactRequest { .. } => EventKind::ContactRequest,
                ServerEvent::ContactStatus { .. } => EventKind::ContactStatus,
                ServerEvent::ConnectionRecovered => EventKind::ConnectionRecovered,
                ServerEvent::Error { .. } => EventKind::Error,
            },
        }
    }
}

type Handler = Arc<dyn Fn(&SocketEvent) + Send + Sync>;

/// Fan-out of socket events to named subscribers.
///
/// Handlers registered for one kind fire in subscription order. Events are
/// not buffered: a subscriber registered after an event was emitted never
/// sees it, and nothing here deduplicates replayed deliveries; that is the
/// consuming state machine's job.
#[derive(Default)]
pub struct EventBus {
    inner: Mutex<BusInner>,
}

#[derive(Default)]
struct BusInner {
    next_id: u64,
    handlers: HashMap<EventKind, Vec<(u64, Handler)>>,
}

impl EventBus {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register `handler` for `kind`. The returned handle revokes the
    /// registration; dropping it keeps the subscription alive.
    pub fn on(
        self: &Arc<Self>,
        kind: EventKind,
        handler: impl Fn(&SocketEvent) + Send + Sync + 'static,
    ) -> Subscription {
        let mut inner = lock(&self.inner);
        inner.next_id += 1;
        let id = inner.next_id;
        inner
            .handlers
            .entry(kind)
            .or_default()
            .push((id, Arc::new(handler)));
        Subscription {
            bus: Arc::downgrade(self),
            kind,
            id,
        }
    }

    /// Deliver an event to every subscriber of its kind, in subscription
    /// order. Handlers run outside the registry lock, so they may subscribe
    /// or unsubscribe reentrantly.
    pub fn emit(&self, event: &SocketEvent) {
        let handlers: Vec<Handler> = {
            let inner = lock(&self.inner);
            inner
                .handlers
                .get(&event.kind())
                .map(|entries| entries.iter().map(|(_, h)| Arc::clone(h)).collect())
                .unwrap_or_default()
        };
        for handler in handlers {
            handler(event);
        }
    }
}

/// Handle returned by [`EventBus::on`].
pub struct Subscription {
    bus: Weak<EventBus>,
    kind: EventKind,
    id: u64,
}

impl Subscription {
    /// Remove the handler. Events emitted after this call never reach it.
    pub fn unsubscribe(self) {
        if let Some(bus) = self.bus.upgrade() {
            let mut inner = lock(&bus.inner);
            if let Some(entries) = inner.handlers.get_mut(&self.kind) {
                entries.retain(|(id, _)| *id != self.id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anochat_shared::ServerEvent;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn error_event(message: &str) -> SocketEvent {
        SocketEvent::Event(ServerEvent::Error {
            message: message.to_string(),
        })
    }

    #[test]
    fn handlers_fire_in_subscription_order() {
        let bus = EventBus::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        for tag in ["first", "second", "third"] {
            let order = Arc::clone(&order);
            let _sub = bus.on(EventKind::Error, move |_| {
                order.lock().expect("test lock").push(tag);
            });
        }

        bus.emit(&error_event("boom"));
        assert_eq!(
            *order.lock().expect("test lock"),
            vec!["first", "second", "third"]
        );
    }

    #[test]
    fn unsubscribe_stops_delivery() {
        let bus = EventBus::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let sub = bus.on(EventKind::Error, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        bus.emit(&error_event("one"));
        sub.unsubscribe();
        bus.emit(&error_event("two"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn events_are_not_buffered_for_late_subscribers() {
        let bus = EventBus::new();
        bus.emit(&error_event("missed"));

        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let _sub = bus.on(EventKind::Error, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        bus.emit(&error_event("seen"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn delivery_is_scoped_to_the_event_kind() {
        let bus = EventBus::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let _sub = bus.on(EventKind::SearchExpired, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        bus.emit(&error_event("not for us"));
        bus.emit(&SocketEvent::Connected);
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        bus.emit(&SocketEvent::Event(ServerEvent::SearchExpired));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
