//! The connector core: command execution with response correlation.
//!
//! A [`Connector`] owns a [`Transport`], a listener registry fanned out over
//! two delivery modes, and the per-command correlation state. Commands block
//! the calling thread until the client's matching response line arrives;
//! concurrent callers are disambiguated by the numeric tag each correlated
//! command carries on the wire.
//!
//! No lock is ever held across a blocking wait: the transport lock covers
//! only connect, send and teardown, and listener dispatch runs on a snapshot
//! outside every lock. Synchronous listeners therefore run on the
//! transport's reader thread and must not issue blocking commands of their
//! own, or the reply they would wait for can never be read.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use crate::config::ConnectorConfig;
use crate::dispatch::DeliveryThread;
use crate::error::ConnectorError;
use crate::listener::{
    ConnectorEvent, ConnectorListener, DeliveryMode, ListenerPanicHook, ListenerRegistry,
    MessageEvent,
};
use crate::pending::{
    CommandSequence, CorrelationTag, ResponseCollector, ResponseFuture, ResponseSlot, SlotWait,
    lock_unpoisoned,
};
use crate::status::Status;
use crate::transport::{InboundHandler, NotificationSink, Transport};

/// Tracing target for connector lifecycle and correlation.
const CONNECTOR_TARGET: &str = "attache_connector::connector";

/// Tracing target for the raw line traffic surfaced by debug mode.
const TRAFFIC_TARGET: &str = "attache_connector::traffic";

/// Prefix the client puts on failure response lines.
const ERROR_MARKER: &str = "ERROR ";

/// How long a correlated call waits for its response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WaitMode {
    /// Wait up to the configured command timeout, with one silent resend.
    Bounded,
    /// Wait until the response arrives, however long that takes.
    Unbounded,
}

/// Blocking command/notification bridge to the client process.
///
/// Cloning is cheap and every clone drives the same connection; the handle
/// is safe to share across threads.
#[derive(Clone)]
pub struct Connector {
    inner: Arc<ConnectorInner>,
}

struct ConnectorInner {
    transport: Mutex<Box<dyn Transport>>,
    registry: Arc<ListenerRegistry>,
    delivery: Mutex<DeliveryThread>,
    status: Mutex<Status>,
    sequence: CommandSequence,
    connect_timeout_ms: AtomicU64,
    command_timeout_ms: AtomicU64,
    application_name: String,
    protocol_version: u32,
    properties: Mutex<HashMap<String, String>>,
    debug_listener: Mutex<Option<Arc<dyn ConnectorListener>>>,
    pending: Mutex<Vec<Weak<ResponseSlot>>>,
    disposed: AtomicBool,
}

impl ConnectorInner {
    /// Records the new status, then broadcasts it to both listener groups.
    /// The field is written before any listener runs, so a listener that
    /// reads the connector's status during the broadcast already sees the
    /// value it is being told about.
    fn set_status(&self, status: Status) {
        {
            let mut current = lock_unpoisoned(&self.status);
            *current = status;
        }
        tracing::debug!(target: CONNECTOR_TARGET, "status changed to {status}");
        self.fire_event(&ConnectorEvent::Status(status));
    }

    /// Dispatches synchronously inline, then queues the asynchronous pass.
    fn fire_event(&self, event: &ConnectorEvent) {
        self.registry.dispatch(DeliveryMode::Synchronous, event);
        lock_unpoisoned(&self.delivery).enqueue(event.clone());
    }

    /// Remembers an outstanding slot so disposal can wake its waiter.
    fn track_slot(&self, slot: &Arc<ResponseSlot>) {
        let mut pending = lock_unpoisoned(&self.pending);
        pending.retain(|held| held.strong_count() > 0);
        pending.push(Arc::downgrade(slot));
    }

    /// Cancels every still-outstanding slot. Each blocked caller wakes
    /// with a cancellation instead of waiting for a line that can no
    /// longer arrive.
    fn cancel_outstanding(&self) {
        for slot in lock_unpoisoned(&self.pending).drain(..) {
            if let Some(slot) = slot.upgrade() {
                slot.cancel();
            }
        }
    }
}

impl InboundHandler for ConnectorInner {
    fn handle_line(&self, line: &str) {
        self.fire_event(&ConnectorEvent::Received(line.to_owned()));
    }

    fn handle_status(&self, status: Status) {
        self.set_status(status);
    }
}

impl Connector {
    /// Creates a connector over `transport`.
    ///
    /// The transport's notification sink is bound here; the connection
    /// itself is established lazily by [`Connector::connect`] or by the
    /// first command that needs it.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectorError::InvalidTimeout`] or
    /// [`ConnectorError::EmptyArgument`] when the configuration is invalid,
    /// and [`ConnectorError::Startup`] when the delivery thread cannot be
    /// spawned.
    pub fn new(
        mut transport: Box<dyn Transport>,
        config: ConnectorConfig,
    ) -> Result<Self, ConnectorError> {
        config.validate()?;
        let registry = Arc::new(ListenerRegistry::new());
        let delivery = DeliveryThread::spawn(Arc::clone(&registry)).map_err(|source| {
            ConnectorError::Startup {
                source: Arc::new(source),
            }
        })?;
        let inner = Arc::new_cyclic(|weak: &Weak<ConnectorInner>| {
            let handler: Weak<dyn InboundHandler> = weak.clone();
            transport.bind(NotificationSink::new(handler));
            ConnectorInner {
                transport: Mutex::new(transport),
                registry,
                delivery: Mutex::new(delivery),
                status: Mutex::new(Status::default()),
                sequence: CommandSequence::new(),
                connect_timeout_ms: AtomicU64::new(config.connect_timeout_ms),
                command_timeout_ms: AtomicU64::new(config.command_timeout_ms),
                application_name: config.application_name,
                protocol_version: config.protocol_version,
                properties: Mutex::new(HashMap::new()),
                debug_listener: Mutex::new(None),
                pending: Mutex::new(Vec::new()),
                disposed: AtomicBool::new(false),
            }
        });
        Ok(Self { inner })
    }

    /// The connector's current attachment status.
    #[must_use]
    pub fn status(&self) -> Status {
        *lock_unpoisoned(&self.inner.status)
    }

    /// `true` while the connector is attached to a running client.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.status().is_attached()
    }

    /// The application name announced to the client on attach.
    #[must_use]
    pub fn application_name(&self) -> &str {
        &self.inner.application_name
    }

    /// The configured connect timeout.
    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.inner.connect_timeout_ms.load(Ordering::Relaxed))
    }

    /// Replaces the connect timeout.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectorError::InvalidTimeout`] for a zero timeout.
    pub fn set_connect_timeout(&self, timeout: Duration) -> Result<(), ConnectorError> {
        let millis = nonzero_millis(timeout, "connect timeout")?;
        self.inner.connect_timeout_ms.store(millis, Ordering::Relaxed);
        Ok(())
    }

    /// The configured per-command response timeout.
    #[must_use]
    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.inner.command_timeout_ms.load(Ordering::Relaxed))
    }

    /// Replaces the per-command response timeout.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectorError::InvalidTimeout`] for a zero timeout.
    pub fn set_command_timeout(&self, timeout: Duration) -> Result<(), ConnectorError> {
        let millis = nonzero_millis(timeout, "command timeout")?;
        self.inner.command_timeout_ms.store(millis, Ordering::Relaxed);
        Ok(())
    }

    /// Attempts to attach to the client and returns the resulting status.
    ///
    /// On a successful attach the application name is registered and the
    /// protocol version negotiated before this returns. An attempt that
    /// ends unattached is not an error; the returned status says why.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectorError::Disposed`] after [`Connector::dispose`],
    /// [`ConnectorError::ConnectFailed`] when the transport could not carry
    /// out the attempt, and any error of the protocol negotiation commands.
    pub fn connect(&self) -> Result<Status, ConnectorError> {
        self.ensure_live()?;
        let attempt = {
            let mut transport = lock_unpoisoned(&self.inner.transport);
            transport.connect(self.connect_timeout())
        };
        let status = attempt.map_err(|source| ConnectorError::ConnectFailed { source })?;
        self.inner.set_status(status);
        if status.is_attached() {
            {
                let mut transport = lock_unpoisoned(&self.inner.transport);
                transport
                    .register_application_name(&self.inner.application_name)
                    .map_err(|source| ConnectorError::ConnectFailed { source })?;
            }
            self.negotiate_protocol()?;
        }
        Ok(self.status())
    }

    /// Ensures the connector is attached, connecting once if it is not.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectorError::NotAttached`] when the single connection
    /// attempt ends in any unattached status, plus every error
    /// [`Connector::connect`] can return.
    pub fn assure_attached(&self) -> Result<(), ConnectorError> {
        if self.status().is_attached() {
            return Ok(());
        }
        let status = self.connect()?;
        if status.is_attached() {
            Ok(())
        } else {
            Err(ConnectorError::NotAttached { status })
        }
    }

    /// Executes `command`, matching the response by the command's own text.
    ///
    /// # Errors
    ///
    /// See [`Connector::execute_with_headers`].
    pub fn execute(&self, command: &str) -> Result<String, ConnectorError> {
        self.execute_with_header(command, command)
    }

    /// Executes `command`, matching the response by `response_header`.
    ///
    /// # Errors
    ///
    /// See [`Connector::execute_with_headers`].
    pub fn execute_with_header(
        &self,
        command: &str,
        response_header: &str,
    ) -> Result<String, ConnectorError> {
        self.execute_with_headers(command, &[response_header])
    }

    /// Executes `command`, matching the response by any of the given
    /// headers. Lines starting with `ERROR ` always match; error responses
    /// are returned like any other, for the caller to interpret.
    ///
    /// The call blocks until the response arrives. After a full command
    /// timeout of silence the identical command is sent once more; a second
    /// silent timeout marks the client [`Status::NotRunning`].
    ///
    /// # Errors
    ///
    /// Returns [`ConnectorError::EmptyArgument`] for an empty command or
    /// header list, [`ConnectorError::NotAttached`] when attachment fails
    /// or both timeouts pass in silence, [`ConnectorError::Transport`] when
    /// a send fails, and [`ConnectorError::Cancelled`] when the pending
    /// wait is cancelled.
    pub fn execute_with_headers(
        &self,
        command: &str,
        response_headers: &[&str],
    ) -> Result<String, ConnectorError> {
        require_non_empty(command, "command")?;
        if response_headers.is_empty() {
            return Err(ConnectorError::EmptyArgument {
                what: "response headers",
            });
        }
        let mut prefixes: Vec<String> = Vec::with_capacity(response_headers.len() + 1);
        for header in response_headers {
            require_non_empty(header, "response header")?;
            prefixes.push((*header).to_owned());
        }
        prefixes.push(ERROR_MARKER.to_owned());
        self.run_with_prefixes(command, prefixes, true, WaitMode::Bounded)
    }

    /// Executes `command` with a unique correlation tag prepended, so
    /// overlapping commands with identical text cannot collide. The tag is
    /// stripped from the returned response.
    ///
    /// # Errors
    ///
    /// See [`Connector::execute_with_headers`].
    pub fn execute_with_id(
        &self,
        command: &str,
        response_header: &str,
    ) -> Result<String, ConnectorError> {
        require_non_empty(command, "command")?;
        require_non_empty(response_header, "response header")?;
        let tag = CorrelationTag::new(self.inner.sequence.next_id());
        let prefixes = vec![
            format!("{}{}", tag.as_str(), response_header),
            format!("{}{}", tag.as_str(), ERROR_MARKER),
        ];
        let line = self.run_with_prefixes(&tag.apply(command), prefixes, true, WaitMode::Bounded)?;
        Ok(tag.strip(&line).to_owned())
    }

    /// Executes `command` and waits for the response with no deadline and
    /// no resend. Useful for commands whose reply legitimately takes longer
    /// than any sensible timeout.
    ///
    /// # Errors
    ///
    /// See [`Connector::execute_with_headers`]; the timeout-driven errors
    /// cannot occur.
    pub fn execute_without_timeout(
        &self,
        command: &str,
        response_header: &str,
    ) -> Result<String, ConnectorError> {
        require_non_empty(command, "command")?;
        require_non_empty(response_header, "response header")?;
        let prefixes = vec![response_header.to_owned(), ERROR_MARKER.to_owned()];
        self.run_with_prefixes(command, prefixes, true, WaitMode::Unbounded)
    }

    /// Sends a tagged `command` whose true completion is a later
    /// notification recognised by `is_complete`, and returns a future for
    /// it.
    ///
    /// `response_header` names the tagged acknowledgement line the client
    /// sends first; it is logged when observed but does not complete the
    /// future. A tagged `ERROR ` line does, as does any line `is_complete`
    /// accepts. Dropping the future unresolved cancels it.
    ///
    /// # Errors
    ///
    /// Returns the same errors as [`Connector::execute_with_headers`] for
    /// the send itself; waiting errors surface on the future.
    pub fn wait_for_end_with_id(
        &self,
        command: &str,
        response_header: &str,
        is_complete: impl Fn(&str) -> bool + Send + Sync + 'static,
    ) -> Result<ResponseFuture, ConnectorError> {
        require_non_empty(command, "command")?;
        require_non_empty(response_header, "response header")?;
        self.ensure_live()?;
        self.assure_attached()?;
        let tag = CorrelationTag::new(self.inner.sequence.next_id());
        let tagged_command = tag.apply(command);
        let acknowledgement = format!("{}{}", tag.as_str(), response_header);
        let failure = format!("{}{}", tag.as_str(), ERROR_MARKER);
        let matcher = Box::new(move |line: &str| {
            if is_complete(line) || line.starts_with(&failure) {
                return true;
            }
            if line.starts_with(&acknowledgement) {
                tracing::trace!(target: CONNECTOR_TARGET, "acknowledged: {line}");
            }
            false
        });
        let slot = Arc::new(ResponseSlot::new());
        self.inner.track_slot(&slot);
        let guard = ResponseCollector::register(&self.inner.registry, matcher, Arc::clone(&slot));
        self.send_command(&tagged_command)?;
        Ok(ResponseFuture::new(command, Some(tag), slot, guard))
    }

    /// Registers `listener` in the synchronous or asynchronous group.
    ///
    /// Synchronous listeners run inline on the delivering thread and must
    /// not issue blocking commands. With `check_attached` the connector
    /// also ensures it is attached, connecting once if needed.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectorError::Disposed`] after disposal and, when
    /// `check_attached` is set, every error of
    /// [`Connector::assure_attached`]. The listener stays registered even
    /// when the attach check fails.
    pub fn add_listener(
        &self,
        listener: Arc<dyn ConnectorListener>,
        check_attached: bool,
        synchronous: bool,
    ) -> Result<(), ConnectorError> {
        self.ensure_live()?;
        let mode = if synchronous {
            DeliveryMode::Synchronous
        } else {
            DeliveryMode::Asynchronous
        };
        self.inner.registry.add(listener, mode);
        if check_attached {
            self.assure_attached()?;
        }
        Ok(())
    }

    /// Removes `listener` from whatever group holds it, by reference
    /// equality. Unknown listeners are ignored.
    pub fn remove_listener(&self, listener: &Arc<dyn ConnectorListener>) {
        self.inner.registry.remove(listener);
    }

    /// Replaces the hook invoked when a listener panics during dispatch.
    pub fn set_listener_panic_hook(&self, hook: ListenerPanicHook) {
        self.inner.registry.set_panic_hook(hook);
    }

    /// Enables or disables traffic tracing: a synchronous listener that
    /// logs every sent line as `-> <line>` and every received line as
    /// `<- <line>`. Idempotent in both directions.
    pub fn set_debug(&self, enabled: bool) {
        let mut debug = lock_unpoisoned(&self.inner.debug_listener);
        if enabled {
            if debug.is_none() {
                let listener: Arc<dyn ConnectorListener> = Arc::new(TrafficTraceListener);
                self.inner
                    .registry
                    .add(Arc::clone(&listener), DeliveryMode::Synchronous);
                *debug = Some(listener);
            }
        } else if let Some(listener) = debug.take() {
            self.inner.registry.remove(&listener);
        }
    }

    /// Stores (`Some`) or removes (`None`) a free-form string property.
    pub fn set_string_property(&self, name: &str, value: Option<&str>) {
        let mut properties = lock_unpoisoned(&self.inner.properties);
        match value {
            Some(value) => {
                properties.insert(name.to_owned(), value.to_owned());
            }
            None => {
                properties.remove(name);
            }
        }
    }

    /// Looks up a string property set earlier.
    #[must_use]
    pub fn string_property(&self, name: &str) -> Option<String> {
        lock_unpoisoned(&self.inner.properties).get(name).cloned()
    }

    /// Tears the connector down: the transport is disposed, the status
    /// broadcast as [`Status::NotRunning`], queued asynchronous events
    /// drained, and every listener dropped. Threads blocked on a response
    /// wake with [`ConnectorError::Cancelled`]. Subsequent calls are
    /// no-ops; commands issued after disposal fail with
    /// [`ConnectorError::Disposed`].
    pub fn dispose(&self) {
        if self.inner.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        let teardown = {
            let mut transport = lock_unpoisoned(&self.inner.transport);
            transport.dispose()
        };
        if let Err(error) = teardown {
            tracing::warn!(target: CONNECTOR_TARGET, "transport teardown failed: {error}");
        }
        self.inner.set_status(Status::NotRunning);
        self.inner.cancel_outstanding();
        lock_unpoisoned(&self.inner.delivery).shutdown();
        self.inner.registry.clear();
        drop(lock_unpoisoned(&self.inner.debug_listener).take());
    }

    fn ensure_live(&self) -> Result<(), ConnectorError> {
        if self.inner.disposed.load(Ordering::SeqCst) {
            Err(ConnectorError::Disposed)
        } else {
            Ok(())
        }
    }

    fn negotiate_protocol(&self) -> Result<(), ConnectorError> {
        let command = format!("PROTOCOL {}", self.inner.protocol_version);
        let prefixes = vec![String::from("PROTOCOL "), ERROR_MARKER.to_owned()];
        let response = self.run_with_prefixes(&command, prefixes, false, WaitMode::Bounded)?;
        tracing::debug!(target: CONNECTOR_TARGET, "protocol negotiated: {response}");
        Ok(())
    }

    fn run_with_prefixes(
        &self,
        command: &str,
        prefixes: Vec<String>,
        check_attached: bool,
        mode: WaitMode,
    ) -> Result<String, ConnectorError> {
        let matcher =
            Box::new(move |line: &str| prefixes.iter().any(|prefix| line.starts_with(prefix)));
        self.run_correlated(command, matcher, check_attached, mode)
    }

    /// The correlation heart: register a one-shot matching listener, send,
    /// block until the slot fills. In bounded mode a first silent timeout
    /// triggers exactly one byte-identical resend; a second marks the
    /// client gone.
    fn run_correlated(
        &self,
        command: &str,
        matcher: Box<dyn Fn(&str) -> bool + Send + Sync>,
        check_attached: bool,
        mode: WaitMode,
    ) -> Result<String, ConnectorError> {
        self.ensure_live()?;
        if check_attached {
            self.assure_attached()?;
        }
        let slot = Arc::new(ResponseSlot::new());
        self.inner.track_slot(&slot);
        let guard = ResponseCollector::register(&self.inner.registry, matcher, Arc::clone(&slot));
        self.send_command(command)?;
        match mode {
            WaitMode::Unbounded => match slot.wait() {
                SlotWait::Done(line) => Ok(line),
                SlotWait::Cancelled | SlotWait::TimedOut => Err(ConnectorError::Cancelled {
                    command: command.to_owned(),
                }),
            },
            WaitMode::Bounded => {
                let timeout = self.command_timeout();
                match slot.wait_timeout(timeout) {
                    SlotWait::Done(line) => Ok(line),
                    SlotWait::Cancelled => Err(ConnectorError::Cancelled {
                        command: command.to_owned(),
                    }),
                    SlotWait::TimedOut => {
                        tracing::debug!(
                            target: CONNECTOR_TARGET,
                            "no response to '{command}' within {timeout:?}, resending"
                        );
                        self.send_command(command)?;
                        match slot.wait_timeout(timeout) {
                            SlotWait::Done(line) => Ok(line),
                            SlotWait::Cancelled => Err(ConnectorError::Cancelled {
                                command: command.to_owned(),
                            }),
                            SlotWait::TimedOut => {
                                guard.release();
                                tracing::debug!(
                                    target: CONNECTOR_TARGET,
                                    "'{command}' went unanswered twice, marking the client gone"
                                );
                                self.inner.set_status(Status::NotRunning);
                                Err(ConnectorError::NotAttached {
                                    status: Status::NotRunning,
                                })
                            }
                        }
                    }
                }
            }
        }
    }

    /// Announces the line to listeners, then writes it to the transport.
    fn send_command(&self, line: &str) -> Result<(), ConnectorError> {
        self.inner.fire_event(&ConnectorEvent::Sent(line.to_owned()));
        let sent = {
            let mut transport = lock_unpoisoned(&self.inner.transport);
            transport.send_line(line)
        };
        sent.map_err(|source| ConnectorError::Transport {
            command: line.to_owned(),
            source,
        })
    }
}

impl std::fmt::Debug for Connector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connector")
            .field("status", &self.status())
            .field("disposed", &self.inner.disposed.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

/// Synchronous listener behind [`Connector::set_debug`].
struct TrafficTraceListener;

impl ConnectorListener for TrafficTraceListener {
    fn message_received(&self, event: &MessageEvent) {
        tracing::debug!(target: TRAFFIC_TARGET, "{}", format_received(event.message()));
    }

    fn message_sent(&self, event: &MessageEvent) {
        tracing::debug!(target: TRAFFIC_TARGET, "{}", format_sent(event.message()));
    }
}

pub(crate) fn format_sent(message: &str) -> String {
    format!("-> {message}")
}

pub(crate) fn format_received(message: &str) -> String {
    format!("<- {message}")
}

fn require_non_empty(value: &str, what: &'static str) -> Result<(), ConnectorError> {
    if value.is_empty() {
        Err(ConnectorError::EmptyArgument { what })
    } else {
        Ok(())
    }
}

fn nonzero_millis(timeout: Duration, what: &'static str) -> Result<u64, ConnectorError> {
    let millis = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
    if millis == 0 {
        Err(ConnectorError::InvalidTimeout { what })
    } else {
        Ok(millis)
    }
}
