//! Asynchronous delivery thread for the non-blocking listener group.
//!
//! The transport's reader thread must never block on application-level
//! listeners. Events destined for the asynchronous group are enqueued here
//! and dispatched in arrival order on one dedicated thread; a snapshot of
//! the group is taken per event, so listeners may be added or removed while
//! delivery is in flight.

use std::sync::Arc;
use std::sync::mpsc::{Receiver, Sender, channel};
use std::thread::{Builder, JoinHandle};

use crate::listener::{ConnectorEvent, DeliveryMode, ListenerRegistry};

/// Tracing target for delivery thread lifecycle.
const DISPATCH_TARGET: &str = "attache_connector::dispatch";

enum DeliveryJob {
    Event(ConnectorEvent),
    Shutdown,
}

/// Owner of the asynchronous delivery thread.
///
/// Created together with the connector and shut down by `dispose`. Dropping
/// the handle also shuts the thread down, so a connector that is simply
/// dropped does not leak it.
pub(crate) struct DeliveryThread {
    sender: Sender<DeliveryJob>,
    handle: Option<JoinHandle<()>>,
}

impl DeliveryThread {
    /// Spawns the delivery thread over the given registry.
    pub(crate) fn spawn(registry: Arc<ListenerRegistry>) -> std::io::Result<Self> {
        let (sender, receiver) = channel();
        let handle = Builder::new()
            .name(String::from("attache-delivery"))
            .spawn(move || deliver_loop(&registry, &receiver))?;
        Ok(Self {
            sender,
            handle: Some(handle),
        })
    }

    /// Enqueues one event for the asynchronous group. Never blocks; events
    /// enqueued after shutdown are dropped.
    pub(crate) fn enqueue(&self, event: ConnectorEvent) {
        if self.sender.send(DeliveryJob::Event(event)).is_err() {
            tracing::trace!(target: DISPATCH_TARGET, "event dropped, delivery thread is gone");
        }
    }

    /// Delivers any queued events, then stops and joins the thread.
    pub(crate) fn shutdown(&mut self) {
        if self.sender.send(DeliveryJob::Shutdown).is_err() {
            // Thread already gone; nothing to drain.
        }
        if let Some(handle) = self.handle.take()
            && handle.join().is_err()
        {
            tracing::error!(target: DISPATCH_TARGET, "delivery thread panicked");
        }
    }
}

impl Drop for DeliveryThread {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn deliver_loop(registry: &ListenerRegistry, receiver: &Receiver<DeliveryJob>) {
    while let Ok(job) = receiver.recv() {
        match job {
            DeliveryJob::Event(event) => registry.dispatch(DeliveryMode::Asynchronous, &event),
            DeliveryJob::Shutdown => break,
        }
    }
    tracing::debug!(target: DISPATCH_TARGET, "delivery thread stopped");
}

#[cfg(test)]
mod tests;
