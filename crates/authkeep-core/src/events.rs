//! Session lifecycle events.
//!
//! Four named events leave the session: `login(username)`, `logout`,
//! `authentication-failed(username)` and `authentication-failure`. Hosts
//! either register a handler for one kind with [`EventBus::on`] or take a
//! broadcast receiver of everything with [`EventBus::subscribe`].

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::RwLock;
use tokio::sync::broadcast;

/// Capacity of the broadcast channel. Slow receivers lag rather than block.
const EVENT_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Login,
    Logout,
    AuthenticationFailed,
    AuthenticationFailure,
}

impl EventKind {
    pub const ALL: [EventKind; 4] = [
        EventKind::Login,
        EventKind::Logout,
        EventKind::AuthenticationFailed,
        EventKind::AuthenticationFailure,
    ];

    /// Wire name of the event
    pub fn name(self) -> &'static str {
        match self {
            EventKind::Login => "login",
            EventKind::Logout => "logout",
            EventKind::AuthenticationFailed => "authentication-failed",
            EventKind::AuthenticationFailure => "authentication-failure",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.name() == name)
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// The authentication probe accepted the credentials
    Login(String),
    Logout,
    /// The authentication probe rejected the credentials
    AuthenticationFailed(String),
    /// An authenticated request came back 401 mid-session
    AuthenticationFailure,
}

impl SessionEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            SessionEvent::Login(_) => EventKind::Login,
            SessionEvent::Logout => EventKind::Logout,
            SessionEvent::AuthenticationFailed(_) => EventKind::AuthenticationFailed,
            SessionEvent::AuthenticationFailure => EventKind::AuthenticationFailure,
        }
    }

    pub fn name(&self) -> &'static str {
        self.kind().name()
    }

    /// The username carried by the event, if any
    pub fn payload(&self) -> Option<&str> {
        match self {
            SessionEvent::Login(u) | SessionEvent::AuthenticationFailed(u) => Some(u),
            SessionEvent::Logout | SessionEvent::AuthenticationFailure => None,
        }
    }
}

type Handler = Arc<dyn Fn(&SessionEvent) + Send + Sync>;

struct Registration {
    id: u64,
    kind: EventKind,
    handler: Handler,
}

type Registry = RwLock<Vec<Registration>>;

pub struct EventBus {
    sender: broadcast::Sender<SessionEvent>,
    handlers: Arc<Registry>,
    next_id: AtomicU64,
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            sender,
            handlers: Arc::new(RwLock::new(Vec::new())),
            next_id: AtomicU64::new(0),
        }
    }

    /// Deliver an event to every matching handler, then to broadcast
    /// receivers. Handlers run on the emitting thread, in registration order.
    pub fn emit(&self, event: SessionEvent) {
        let kind = event.kind();
        let matching: Vec<Handler> = self
            .handlers
            .read()
            .iter()
            .filter(|r| r.kind == kind)
            .map(|r| Arc::clone(&r.handler))
            .collect();

        for handler in matching {
            handler(&event);
        }

        // No receivers is not an error
        let _ = self.sender.send(event);
    }

    /// Register `handler` for one kind of event
    pub fn on<F>(&self, kind: EventKind, handler: F) -> Subscription
    where
        F: Fn(&SessionEvent) + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.handlers.write().push(Registration {
            id,
            kind,
            handler: Arc::new(handler),
        });
        Subscription {
            id,
            handlers: Arc::downgrade(&self.handlers),
        }
    }

    /// Receive every event emitted from now on
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.sender.subscribe()
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.read().len()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle to a registered handler. Dropping it detaches the handler.
#[must_use = "dropping a Subscription detaches its handler"]
pub struct Subscription {
    id: u64,
    handlers: Weak<Registry>,
}

impl Subscription {
    /// Detach the handler now
    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let Some(handlers) = self.handlers.upgrade() else {
            return;
        };
        // Drop the handler after releasing the lock; it may own other subscriptions
        let removed = {
            let mut handlers = handlers.write();
            handlers
                .iter()
                .position(|r| r.id == self.id)
                .map(|index| handlers.remove(index))
        };
        drop(removed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[test]
    fn test_event_names() {
        assert_eq!(SessionEvent::Login("ian@me".into()).name(), "login");
        assert_eq!(SessionEvent::Logout.name(), "logout");
        assert_eq!(
            SessionEvent::AuthenticationFailed("ian@me".into()).name(),
            "authentication-failed"
        );
        assert_eq!(
            SessionEvent::AuthenticationFailure.name(),
            "authentication-failure"
        );
        for kind in EventKind::ALL {
            assert_eq!(EventKind::from_name(kind.name()), Some(kind));
        }
        assert_eq!(EventKind::from_name("signin"), None);
    }

    #[test]
    fn test_payloads() {
        assert_eq!(SessionEvent::Login("ian@me".into()).payload(), Some("ian@me"));
        assert_eq!(SessionEvent::Logout.payload(), None);
    }

    #[test]
    fn test_on_only_receives_its_kind() {
        let bus = EventBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let sink = Arc::clone(&seen);
        let _sub = bus.on(EventKind::Login, move |e| sink.lock().push(e.clone()));

        bus.emit(SessionEvent::Logout);
        bus.emit(SessionEvent::Login("ian@me".into()));

        assert_eq!(*seen.lock(), vec![SessionEvent::Login("ian@me".into())]);
    }

    #[test]
    fn test_unsubscribe_detaches_handler() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicU64::new(0));

        let counter = Arc::clone(&count);
        let sub = bus.on(EventKind::Logout, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        bus.emit(SessionEvent::Logout);
        assert_eq!(bus.handler_count(), 1);

        sub.unsubscribe();
        bus.emit(SessionEvent::Logout);
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(bus.handler_count(), 0);
    }

    #[test]
    fn test_dropping_subscription_detaches_handler() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicU64::new(0));

        let counter = Arc::clone(&count);
        let sub = bus.on(EventKind::Logout, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        drop(sub);

        bus.emit(SessionEvent::Logout);
        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert_eq!(bus.handler_count(), 0);
    }

    #[test]
    fn test_subscription_outliving_bus_drops_cleanly() {
        let bus = EventBus::new();
        let sub = bus.on(EventKind::Login, |_| {});
        drop(bus);
        drop(sub);
    }

    #[test]
    fn test_handler_may_register_another_handler() {
        let bus = Arc::new(EventBus::new());
        let inner_bus = Arc::clone(&bus);
        let kept = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&kept);
        let _sub = bus.on(EventKind::Logout, move |_| {
            sink.lock().push(inner_bus.on(EventKind::Login, |_| {}));
        });

        bus.emit(SessionEvent::Logout);
        assert_eq!(bus.handler_count(), 2);
    }

    #[test]
    fn test_broadcast_subscribers_see_all_events() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();

        bus.emit(SessionEvent::Logout);
        bus.emit(SessionEvent::AuthenticationFailure);

        assert_eq!(rx.try_recv().unwrap(), SessionEvent::Logout);
        assert_eq!(rx.try_recv().unwrap(), SessionEvent::AuthenticationFailure);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_emit_without_listeners_is_fine() {
        EventBus::new().emit(SessionEvent::Logout);
    }
}
