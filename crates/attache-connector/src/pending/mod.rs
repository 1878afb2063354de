//! Per-command correlation state: ids, the wire tag, completion cells and
//! the cancellable response future.
//!
//! Every correlated call owns exactly one [`ResponseSlot`], written at most
//! once. The temporary listener that matches the response
//! ([`ResponseCollector`]) unregisters itself *before* filling the slot, so
//! no line can ever be delivered to a completed or cancelled command. The
//! numeric [`CommandId`] is the correlation identity everywhere inside the
//! crate; the textual `"#<n> "` form exists only at the wire boundary, as
//! [`CorrelationTag`].

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError, Weak};
use std::time::{Duration, Instant};

use crate::error::ConnectorError;
use crate::listener::{ConnectorListener, DeliveryMode, ListenerRegistry, MessageEvent};

/// Locks a mutex, recovering the guard if a panicking listener poisoned it.
pub(crate) fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Unique identity of one outstanding correlated command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct CommandId(u32);

impl CommandId {
    /// The numeric value embedded in the wire tag.
    pub(crate) const fn value(self) -> u32 {
        self.0
    }
}

/// Process-wide monotonically increasing command counter.
///
/// No two concurrently outstanding commands ever share an id, which is what
/// makes overlapping identical command texts safe.
pub(crate) struct CommandSequence {
    next: AtomicU32,
}

impl CommandSequence {
    pub(crate) const fn new() -> Self {
        Self {
            next: AtomicU32::new(0),
        }
    }

    pub(crate) fn next_id(&self) -> CommandId {
        CommandId(self.next.fetch_add(1, Ordering::Relaxed))
    }
}

/// The `"#<n> "` prefix prepended to correlated commands and echoed by the
/// client on the matching response line(s).
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct CorrelationTag {
    text: String,
}

impl CorrelationTag {
    pub(crate) fn new(id: CommandId) -> Self {
        Self {
            text: format!("#{} ", id.value()),
        }
    }

    pub(crate) fn as_str(&self) -> &str {
        &self.text
    }

    /// Prepends the tag to outgoing text.
    pub(crate) fn apply(&self, text: &str) -> String {
        format!("{}{}", self.text, text)
    }

    /// Removes the tag from a response line, if present.
    pub(crate) fn strip<'a>(&self, line: &'a str) -> &'a str {
        line.strip_prefix(self.text.as_str()).unwrap_or(line)
    }
}

/// Outcome of waiting on a [`ResponseSlot`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum SlotWait {
    /// A matching line arrived; carries the raw (still tagged) line.
    Done(String),
    /// The slot was cancelled before a matching line arrived.
    Cancelled,
    /// The deadline elapsed with the slot still pending.
    TimedOut,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum SlotState {
    Pending,
    Done(String),
    Cancelled,
}

/// Single-assignment completion cell, one per outstanding command.
///
/// At most one thread waits on a slot; the first `complete` or `cancel`
/// wins and every later resolution attempt is a no-op.
pub(crate) struct ResponseSlot {
    state: Mutex<SlotState>,
    signal: Condvar,
}

impl ResponseSlot {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(SlotState::Pending),
            signal: Condvar::new(),
        }
    }

    /// Fills the slot with a matching line. Returns `false` when the slot
    /// had already been resolved.
    pub(crate) fn complete(&self, line: &str) -> bool {
        let mut state = lock_unpoisoned(&self.state);
        if *state == SlotState::Pending {
            *state = SlotState::Done(line.to_owned());
            self.signal.notify_all();
            true
        } else {
            false
        }
    }

    /// Cancels the slot. Idempotent; returns `true` only on the transition
    /// out of the pending state.
    pub(crate) fn cancel(&self) -> bool {
        let mut state = lock_unpoisoned(&self.state);
        if *state == SlotState::Pending {
            *state = SlotState::Cancelled;
            self.signal.notify_all();
            true
        } else {
            false
        }
    }

    pub(crate) fn is_resolved(&self) -> bool {
        *lock_unpoisoned(&self.state) != SlotState::Pending
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        *lock_unpoisoned(&self.state) == SlotState::Cancelled
    }

    /// Blocks until the slot resolves, with no deadline.
    pub(crate) fn wait(&self) -> SlotWait {
        let mut state = lock_unpoisoned(&self.state);
        loop {
            match &*state {
                SlotState::Done(line) => return SlotWait::Done(line.clone()),
                SlotState::Cancelled => return SlotWait::Cancelled,
                SlotState::Pending => {
                    state = self
                        .signal
                        .wait(state)
                        .unwrap_or_else(PoisonError::into_inner);
                }
            }
        }
    }

    /// Blocks until the slot resolves or the timeout elapses.
    pub(crate) fn wait_timeout(&self, timeout: Duration) -> SlotWait {
        let deadline = Instant::now() + timeout;
        let mut state = lock_unpoisoned(&self.state);
        loop {
            match &*state {
                SlotState::Done(line) => return SlotWait::Done(line.clone()),
                SlotState::Cancelled => return SlotWait::Cancelled,
                SlotState::Pending => {
                    let Some(remaining) = deadline.checked_duration_since(Instant::now()) else {
                        return SlotWait::TimedOut;
                    };
                    if remaining.is_zero() {
                        return SlotWait::TimedOut;
                    }
                    state = self
                        .signal
                        .wait_timeout(state, remaining)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0;
                }
            }
        }
    }
}

/// Temporary synchronous listener matching the response of one command.
///
/// Registered for the lifetime of a single correlated call. On the first
/// matching line it removes itself from the registry and only then fills
/// the slot, upholding the no-delivery-after-completion invariant.
pub(crate) struct ResponseCollector {
    matcher: Box<dyn Fn(&str) -> bool + Send + Sync>,
    slot: Arc<ResponseSlot>,
    registry: Weak<ListenerRegistry>,
    this: Weak<Self>,
}

impl ResponseCollector {
    /// Creates a collector and registers it in the synchronous group.
    pub(crate) fn register(
        registry: &Arc<ListenerRegistry>,
        matcher: Box<dyn Fn(&str) -> bool + Send + Sync>,
        slot: Arc<ResponseSlot>,
    ) -> CollectorGuard {
        let collector = Arc::new_cyclic(|weak| Self {
            matcher,
            slot,
            registry: Arc::downgrade(registry),
            this: weak.clone(),
        });
        let erased: Arc<dyn ConnectorListener> = collector;
        registry.add(Arc::clone(&erased), DeliveryMode::Synchronous);
        CollectorGuard {
            registry: Arc::downgrade(registry),
            listener: erased,
            released: AtomicBool::new(false),
        }
    }

    fn unregister(&self) {
        if let (Some(registry), Some(this)) = (self.registry.upgrade(), self.this.upgrade()) {
            let erased: Arc<dyn ConnectorListener> = this;
            registry.remove(&erased);
        }
    }
}

impl ConnectorListener for ResponseCollector {
    fn message_received(&self, event: &MessageEvent) {
        let line = event.message();
        if (self.matcher)(line) {
            self.unregister();
            self.slot.complete(line);
        }
    }
}

/// Removal handle for a registered [`ResponseCollector`].
///
/// `release` is idempotent and safe from any thread; the guard also
/// releases on drop so no call path can leak its temporary listener.
pub(crate) struct CollectorGuard {
    registry: Weak<ListenerRegistry>,
    listener: Arc<dyn ConnectorListener>,
    released: AtomicBool,
}

impl CollectorGuard {
    pub(crate) fn release(&self) {
        if !self.released.swap(true, Ordering::SeqCst)
            && let Some(registry) = self.registry.upgrade()
        {
            registry.remove(&self.listener);
        }
    }
}

impl Drop for CollectorGuard {
    fn drop(&mut self) {
        self.release();
    }
}

/// Handle to a command whose true completion is an arbitrary later
/// notification, returned by [`crate::Connector::wait_for_end_with_id`].
///
/// `get` blocks without an internal deadline; bounding the wait is the
/// caller's choice via [`ResponseFuture::get_timeout`]. Dropping an
/// unresolved future cancels it.
pub struct ResponseFuture {
    command: String,
    tag: Option<CorrelationTag>,
    slot: Arc<ResponseSlot>,
    guard: CollectorGuard,
}

impl ResponseFuture {
    pub(crate) fn new(
        command: impl Into<String>,
        tag: Option<CorrelationTag>,
        slot: Arc<ResponseSlot>,
        guard: CollectorGuard,
    ) -> Self {
        Self {
            command: command.into(),
            tag,
            slot,
            guard,
        }
    }

    /// Blocks until the completion notification arrives.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectorError::Cancelled`] when the future was (or is,
    /// from another thread) cancelled before completion.
    pub fn get(&self) -> Result<String, ConnectorError> {
        match self.slot.wait() {
            SlotWait::Done(line) => Ok(self.stripped(&line)),
            SlotWait::Cancelled | SlotWait::TimedOut => Err(ConnectorError::Cancelled {
                command: self.command.clone(),
            }),
        }
    }

    /// Blocks until the completion notification arrives or the caller's
    /// deadline elapses. A timeout leaves the future pending.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectorError::Timeout`] when the deadline elapses and
    /// [`ConnectorError::Cancelled`] when the future was cancelled.
    pub fn get_timeout(&self, timeout: Duration) -> Result<String, ConnectorError> {
        match self.slot.wait_timeout(timeout) {
            SlotWait::Done(line) => Ok(self.stripped(&line)),
            SlotWait::Cancelled => Err(ConnectorError::Cancelled {
                command: self.command.clone(),
            }),
            SlotWait::TimedOut => Err(ConnectorError::Timeout {
                command: self.command.clone(),
                waited: timeout,
            }),
        }
    }

    /// Cancels the wait: the matching listener is unregistered and the
    /// future will never resolve. Idempotent and safe from any thread; a
    /// late-arriving matching line is simply ignored.
    ///
    /// Returns `true` only for the call that performed the transition.
    pub fn cancel(&self) -> bool {
        self.guard.release();
        self.slot.cancel()
    }

    /// Returns `true` once the completion notification has arrived.
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.slot.is_resolved() && !self.slot.is_cancelled()
    }

    /// Returns `true` once the future has been cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.slot.is_cancelled()
    }

    fn stripped(&self, line: &str) -> String {
        match &self.tag {
            Some(tag) => tag.strip(line).to_owned(),
            None => line.to_owned(),
        }
    }
}

impl Drop for ResponseFuture {
    fn drop(&mut self) {
        if !self.slot.is_resolved() {
            self.cancel();
        }
    }
}

impl std::fmt::Debug for ResponseFuture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseFuture")
            .field("command", &self.command)
            .field("done", &self.is_done())
            .field("cancelled", &self.is_cancelled())
            .finish_non_exhaustive()
    }
}
