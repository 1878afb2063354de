//! In-process scripted transport for exercising a connector without a
//! client process.
//!
//! [`ScriptedTransport`] is handed to [`crate::Connector::new`]; the paired
//! [`ScriptedHandle`] stays with the test and plays the client: it scripts
//! responses to sent commands, injects unsolicited notifications and status
//! changes, swallows sends to provoke the retry path, and records every
//! line the connector wrote.
//!
//! `PROTOCOL` negotiation lines are acknowledged automatically by echoing
//! them back, so tests only script the commands they are about.

use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex};

use crate::pending::lock_unpoisoned;
use crate::status::Status;
use crate::transport::{NotificationSink, Transport, TransportError};

/// Maps one sent line to the response lines the scripted client emits.
pub type Responder = Box<dyn FnMut(&str) -> Vec<String> + Send>;

struct ScriptState {
    sink: Option<NotificationSink>,
    sent: Vec<String>,
    responder: Option<Responder>,
    drop_next: usize,
    fail_next: usize,
    connect_status: Status,
    disposed: bool,
}

/// The [`Transport`] half of a scripted pair.
pub struct ScriptedTransport {
    state: Arc<Mutex<ScriptState>>,
}

impl ScriptedTransport {
    /// Creates a transport whose connection attempts succeed, paired with
    /// the handle that scripts it.
    #[must_use]
    pub fn attached() -> (Box<Self>, ScriptedHandle) {
        Self::with_connect_status(Status::Attached)
    }

    /// Creates a transport whose connection attempts end in `status`.
    #[must_use]
    pub fn with_connect_status(status: Status) -> (Box<Self>, ScriptedHandle) {
        let state = Arc::new(Mutex::new(ScriptState {
            sink: None,
            sent: Vec::new(),
            responder: None,
            drop_next: 0,
            fail_next: 0,
            connect_status: status,
            disposed: false,
        }));
        let handle = ScriptedHandle {
            state: Arc::clone(&state),
        };
        (Box::new(Self { state }), handle)
    }
}

impl Transport for ScriptedTransport {
    fn bind(&mut self, sink: NotificationSink) {
        lock_unpoisoned(&self.state).sink = Some(sink);
    }

    fn connect(&mut self, _timeout: std::time::Duration) -> Result<Status, TransportError> {
        Ok(lock_unpoisoned(&self.state).connect_status)
    }

    fn send_line(&mut self, line: &str) -> Result<(), TransportError> {
        // Replies are computed under the lock but delivered outside it, so
        // a listener may call back into the handle.
        let (sink, replies) = {
            let mut state = lock_unpoisoned(&self.state);
            if state.disposed {
                return Err(TransportError::NotConnected);
            }
            state.sent.push(line.to_owned());
            if state.fail_next > 0 {
                state.fail_next -= 1;
                return Err(TransportError::io(io::Error::new(
                    io::ErrorKind::BrokenPipe,
                    "scripted send failure",
                )));
            }
            if state.drop_next > 0 {
                state.drop_next -= 1;
                (None, Vec::new())
            } else {
                let replies = if line.starts_with("PROTOCOL ") {
                    vec![line.to_owned()]
                } else if let Some(responder) = state.responder.as_mut() {
                    responder(line)
                } else {
                    Vec::new()
                };
                (state.sink.clone(), replies)
            }
        };
        if let Some(sink) = sink {
            for reply in replies {
                sink.notify_received(&reply);
            }
        }
        Ok(())
    }

    fn dispose(&mut self) -> Result<(), TransportError> {
        lock_unpoisoned(&self.state).disposed = true;
        Ok(())
    }
}

/// The test's half of a scripted pair. Clones share the same script.
#[derive(Clone)]
pub struct ScriptedHandle {
    state: Arc<Mutex<ScriptState>>,
}

impl ScriptedHandle {
    /// Installs the responder consulted for every delivered send.
    pub fn set_responder(&self, responder: impl FnMut(&str) -> Vec<String> + Send + 'static) {
        lock_unpoisoned(&self.state).responder = Some(Box::new(responder));
    }

    /// Scripts a fixed queue of responses, one sent line each.
    pub fn respond_with(&self, replies: impl IntoIterator<Item = &'static str>) {
        let mut queue: VecDeque<&'static str> = replies.into_iter().collect();
        self.set_responder(move |_| queue.pop_front().map(str::to_owned).into_iter().collect());
    }

    /// Swallows the next `count` sends: they are recorded but get neither
    /// a scripted response nor the automatic `PROTOCOL` acknowledgement.
    pub fn drop_next_sends(&self, count: usize) {
        lock_unpoisoned(&self.state).drop_next = count;
    }

    /// Makes the next `count` sends fail with an I/O error after being
    /// recorded.
    pub fn fail_next_sends(&self, count: usize) {
        lock_unpoisoned(&self.state).fail_next = count;
    }

    /// Delivers an unsolicited notification line to the connector.
    pub fn push_notification(&self, line: &str) {
        if let Some(sink) = lock_unpoisoned(&self.state).sink.clone() {
            sink.notify_received(line);
        }
    }

    /// Reports a transport-observed status change to the connector.
    pub fn push_status(&self, status: Status) {
        if let Some(sink) = lock_unpoisoned(&self.state).sink.clone() {
            sink.notify_status(status);
        }
    }

    /// Every line the connector has sent, in order.
    #[must_use]
    pub fn sent_lines(&self) -> Vec<String> {
        lock_unpoisoned(&self.state).sent.clone()
    }

    /// How many lines the connector has sent.
    #[must_use]
    pub fn sent_count(&self) -> usize {
        lock_unpoisoned(&self.state).sent.len()
    }

    /// `true` once the connector disposed the transport.
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        lock_unpoisoned(&self.state).disposed
    }
}
