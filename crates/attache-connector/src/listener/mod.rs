//! Notification listeners and the registry that fans lines out to them.
//!
//! The registry keeps two independent, ordered listener groups. Synchronous
//! listeners run inline on the thread that delivers the line — for inbound
//! traffic that is the transport's reader thread, so every synchronous
//! listener observes line N before line N+1 is processed. Asynchronous
//! listeners run on the connector's delivery thread and can be slow without
//! stalling the protocol reader.
//!
//! Dispatch always iterates a snapshot taken under a narrow lock, so a
//! listener may add or remove listeners (including itself) mid-dispatch. A
//! panicking listener never prevents the remaining listeners from running;
//! the panic is routed to a single replaceable hook and otherwise swallowed
//! at the dispatch boundary.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Mutex};

use crate::pending::lock_unpoisoned;
use crate::status::Status;

/// Tracing target for listener dispatch.
const LISTENER_TARGET: &str = "attache_connector::listener";

/// A sent or received raw notification line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageEvent {
    message: String,
}

impl MessageEvent {
    pub(crate) fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// The raw line, without its terminator.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// A change of the connector's [`Status`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusEvent {
    status: Status,
}

impl StatusEvent {
    pub(crate) const fn new(status: Status) -> Self {
        Self { status }
    }

    /// The status the connector transitioned to.
    #[must_use]
    pub const fn status(self) -> Status {
        self.status
    }
}

/// Subscriber to connector notifications.
///
/// All methods default to no-ops; implement only the ones of interest.
/// Listeners are shared across threads and must not assume which thread
/// invokes them — that is decided by the delivery mode they were registered
/// with.
pub trait ConnectorListener: Send + Sync {
    /// Invoked for every raw line received from the client.
    fn message_received(&self, event: &MessageEvent) {
        let _ = event;
    }

    /// Invoked for every raw line sent to the client.
    fn message_sent(&self, event: &MessageEvent) {
        let _ = event;
    }

    /// Invoked after every status transition.
    fn status_changed(&self, event: &StatusEvent) {
        let _ = event;
    }
}

/// Hook invoked with a panic description when a listener panics.
pub type ListenerPanicHook = Box<dyn Fn(&str) + Send + Sync>;

/// Which listener group an event is dispatched to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DeliveryMode {
    /// Inline, on the delivering thread, before the next line is processed.
    Synchronous,
    /// On the connector's delivery thread.
    Asynchronous,
}

/// A notification travelling through the fan-out.
#[derive(Debug, Clone)]
pub(crate) enum ConnectorEvent {
    /// A raw line received from the client.
    Received(String),
    /// A raw line sent to the client.
    Sent(String),
    /// A status transition.
    Status(Status),
}

impl ConnectorEvent {
    fn deliver(&self, listener: &dyn ConnectorListener) {
        match self {
            Self::Received(line) => listener.message_received(&MessageEvent::new(line.clone())),
            Self::Sent(line) => listener.message_sent(&MessageEvent::new(line.clone())),
            Self::Status(status) => listener.status_changed(&StatusEvent::new(*status)),
        }
    }
}

/// Ordered collections of subscribers, split by delivery mode.
pub(crate) struct ListenerRegistry {
    synchronous: Mutex<Vec<Arc<dyn ConnectorListener>>>,
    asynchronous: Mutex<Vec<Arc<dyn ConnectorListener>>>,
    panic_hook: Mutex<ListenerPanicHook>,
}

impl ListenerRegistry {
    pub(crate) fn new() -> Self {
        Self {
            synchronous: Mutex::new(Vec::new()),
            asynchronous: Mutex::new(Vec::new()),
            panic_hook: Mutex::new(Box::new(|description| {
                tracing::error!(target: LISTENER_TARGET, "listener panicked: {description}");
            })),
        }
    }

    pub(crate) fn add(&self, listener: Arc<dyn ConnectorListener>, mode: DeliveryMode) {
        lock_unpoisoned(self.group(mode)).push(listener);
    }

    /// Removes the listener from both groups, by reference equality.
    pub(crate) fn remove(&self, listener: &Arc<dyn ConnectorListener>) {
        for mode in [DeliveryMode::Synchronous, DeliveryMode::Asynchronous] {
            lock_unpoisoned(self.group(mode)).retain(|held| !Arc::ptr_eq(held, listener));
        }
    }

    pub(crate) fn clear(&self) {
        lock_unpoisoned(&self.synchronous).clear();
        lock_unpoisoned(&self.asynchronous).clear();
    }

    pub(crate) fn set_panic_hook(&self, hook: ListenerPanicHook) {
        *lock_unpoisoned(&self.panic_hook) = hook;
    }

    /// Snapshot of one group in registration order.
    pub(crate) fn snapshot(&self, mode: DeliveryMode) -> Vec<Arc<dyn ConnectorListener>> {
        lock_unpoisoned(self.group(mode)).clone()
    }

    /// Dispatches the event to a snapshot of the given group, containing
    /// panics per listener.
    pub(crate) fn dispatch(&self, mode: DeliveryMode, event: &ConnectorEvent) {
        for listener in self.snapshot(mode) {
            let outcome = catch_unwind(AssertUnwindSafe(|| event.deliver(listener.as_ref())));
            if let Err(payload) = outcome {
                let description = panic_description(payload.as_ref());
                (lock_unpoisoned(&self.panic_hook))(&description);
            }
        }
    }

    const fn group(&self, mode: DeliveryMode) -> &Mutex<Vec<Arc<dyn ConnectorListener>>> {
        match mode {
            DeliveryMode::Synchronous => &self.synchronous,
            DeliveryMode::Asynchronous => &self.asynchronous,
        }
    }
}

fn panic_description(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(text) = payload.downcast_ref::<&str>() {
        (*text).to_owned()
    } else if let Some(text) = payload.downcast_ref::<String>() {
        text.clone()
    } else {
        String::from("listener panicked with a non-string payload")
    }
}
