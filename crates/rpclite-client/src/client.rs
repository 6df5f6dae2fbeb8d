//! Blocking RPC client over a byte connection.
//!
//! Calls may be issued from several threads at once. Whichever caller holds
//! the reader performs reads and routes every decoded envelope: responses go
//! to the pending table, notifications to the handler. The other callers
//! sleep on a condition variable until their response lands or the reader
//! is released.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex, RwLock};
use rpclite_codec::{encode, Envelope, StreamDecoder, Value};
use tracing::{debug, error, trace, warn};

use crate::connection::{Connection, SerialConnection};
use crate::metrics::{metric_defs, Metric};
use crate::pending::{Delivery, MessageCounter, PendingCalls};
use crate::{ClientConfig, ConnectionError, RemoteError, RpcError, RpcResult};

/// Callback invoked with the method name and arguments of each notification
/// received from the device.
pub type NotificationHandler = Arc<dyn Fn(&str, &[Value]) + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Status {
    Open,
    Closed,
    Faulted(String),
}

/// Everything guarded by the state lock.
struct State {
    counter: MessageCounter,
    pending: PendingCalls,
    status: Status,
}

impl State {
    fn check_open(&self) -> Result<(), ConnectionError> {
        match &self.status {
            Status::Open => Ok(()),
            Status::Closed => Err(ConnectionError::Closed),
            Status::Faulted(reason) => Err(ConnectionError::Faulted(reason.clone())),
        }
    }
}

/// Read half of the connection plus the bytes not yet decoded.
struct Reader {
    conn: Option<Box<dyn Connection>>,
    decoder: StreamDecoder,
    buf: Vec<u8>,
}

/// RPC client for one device link.
///
/// ```rust,no_run
/// use rpclite_client::{ClientConfig, RpcClient, Value};
///
/// let client = RpcClient::open(ClientConfig::new("/dev/ttyACM0"))?;
/// let sum = client.call("add", vec![Value::from(15), Value::from(7)])?;
/// assert_eq!(sum.as_i64(), Some(22));
/// client.notify("led", vec![Value::from(true)])?;
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub struct RpcClient {
    config: ClientConfig,
    name: String,
    state: Mutex<State>,
    state_changed: Condvar,
    writer: Mutex<Option<Box<dyn Connection>>>,
    reader: Mutex<Reader>,
    handler: RwLock<Option<NotificationHandler>>,
}

impl RpcClient {
    /// Open the serial port named in `config`.
    pub fn open(config: ClientConfig) -> Result<Self, ConnectionError> {
        let conn = SerialConnection::open(&config)?;
        Self::with_connection(Box::new(conn), config)
    }

    /// Build a client over an already open connection.
    ///
    /// `config.port` is ignored; the connection's own name is used in logs
    /// and metric labels.
    pub fn with_connection(
        conn: Box<dyn Connection>,
        config: ClientConfig,
    ) -> Result<Self, ConnectionError> {
        let reader_conn = conn.try_clone()?;
        let name = conn.name().to_string();
        let read_chunk = config.read_chunk.max(1);
        debug!(port = %name, "client ready");

        Ok(RpcClient {
            name,
            state: Mutex::new(State {
                counter: MessageCounter::new(),
                pending: PendingCalls::new(),
                status: Status::Open,
            }),
            state_changed: Condvar::new(),
            writer: Mutex::new(Some(conn)),
            reader: Mutex::new(Reader {
                conn: Some(reader_conn),
                decoder: StreamDecoder::with_max_frame_len(config.max_frame_len),
                buf: vec![0; read_chunk],
            }),
            handler: RwLock::new(None),
            config,
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Connection name used in logs.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the client can still send.
    pub fn is_open(&self) -> bool {
        self.state.lock().status == Status::Open
    }

    /// Number of calls currently waiting for a response.
    pub fn pending_calls(&self) -> usize {
        self.state.lock().pending.len()
    }

    /// Route notifications from the device to `handler`.
    ///
    /// The handler runs on whichever thread is reading at the time, while
    /// that thread holds the reader. It must not call back into this client.
    pub fn set_notification_handler<F>(&self, handler: F)
    where
        F: Fn(&str, &[Value]) + Send + Sync + 'static,
    {
        *self.handler.write() = Some(Arc::new(handler));
    }

    /// Drop notifications again (after logging them).
    pub fn clear_notification_handler(&self) {
        *self.handler.write() = None;
    }

    // ========================================================================
    // Calls
    // ========================================================================

    /// Call `method` and wait for its response, up to the configured deadline.
    pub fn call(&self, method: &str, args: Vec<Value>) -> RpcResult<Value> {
        self.call_with_deadline(method, args, self.config.call_deadline)
    }

    /// Call `method` with an explicit deadline.
    pub fn call_with_deadline(
        &self,
        method: &str,
        args: Vec<Value>,
        deadline: Duration,
    ) -> RpcResult<Value> {
        let id = {
            let mut state = self.state.lock();
            state.check_open()?;
            let State {
                counter, pending, ..
            } = &mut *state;
            let id = counter.next_free(pending).ok_or(RpcError::IdsExhausted)?;
            pending.register(id);
            id
        };
        // A deadline too far out to represent never expires.
        let expires = Instant::now().checked_add(deadline);

        let sent = encode(&Envelope::request(id, method, args))
            .map_err(ConnectionError::from)
            .and_then(|frame| self.write(&frame).map(|()| frame));
        let frame = match sent {
            Ok(frame) => frame,
            Err(e) => {
                self.state.lock().pending.remove(id);
                return Err(e.into());
            }
        };
        self.count(&metric_defs::CALLS);
        debug!(port = %self.name, id, method, bytes = frame.len(), "sent request");

        self.wait_for(id, method, expires, deadline)
    }

    fn wait_for(
        &self,
        id: u32,
        method: &str,
        expires: Option<Instant>,
        deadline: Duration,
    ) -> RpcResult<Value> {
        loop {
            {
                let mut state = self.state.lock();
                if let Some(result) = state.pending.take_resolved(id) {
                    drop(state);
                    return result.map_err(|payload| {
                        self.count(&metric_defs::REMOTE_ERRORS);
                        let err = RemoteError::from_payload(payload);
                        debug!(port = %self.name, id, method, error = %err, "call failed remotely");
                        RpcError::Remote(err)
                    });
                }
                if let Err(e) = state.check_open() {
                    state.pending.remove(id);
                    return Err(e.into());
                }
                if expires.is_some_and(|expires| Instant::now() >= expires) {
                    state.pending.remove(id);
                    drop(state);
                    self.count(&metric_defs::TIMEOUTS);
                    warn!(port = %self.name, id, method, ?deadline, "call timed out");
                    return Err(RpcError::Timeout { id, deadline });
                }
            }

            let wait = self.next_wait(expires);
            match self.reader.try_lock() {
                Some(mut reader) => {
                    let pumped = self.pump(&mut reader, wait);
                    drop(reader);
                    // Someone else may now take over reading.
                    self.state_changed.notify_all();
                    if let Err(e) = pumped {
                        self.state.lock().pending.remove(id);
                        return Err(e.into());
                    }
                }
                None => {
                    let mut state = self.state.lock();
                    if !state.pending.is_resolved(id) && state.status == Status::Open {
                        self.state_changed.wait_for(&mut state, wait);
                    }
                }
            }
        }
    }

    /// Send a notification. Never waits for or reads anything.
    pub fn notify(&self, method: &str, args: Vec<Value>) -> Result<(), ConnectionError> {
        self.state.lock().check_open()?;
        let frame = encode(&Envelope::notify(method, args))?;
        self.write(&frame)?;
        self.count(&metric_defs::NOTIFIES_SENT);
        debug!(port = %self.name, method, bytes = frame.len(), "sent notification");
        Ok(())
    }

    /// Read and dispatch incoming traffic for up to `timeout` without making
    /// a call, so notifications reach the handler.
    ///
    /// Returns the number of envelopes dispatched.
    pub fn poll(&self, timeout: Duration) -> Result<usize, ConnectionError> {
        let expires = Instant::now().checked_add(timeout);
        let mut dispatched = 0;
        loop {
            self.state.lock().check_open()?;
            let wait = self.next_wait(expires);
            if wait.is_zero() {
                return Ok(dispatched);
            }
            match self.reader.try_lock() {
                Some(mut reader) => {
                    let pumped = self.pump(&mut reader, wait);
                    drop(reader);
                    self.state_changed.notify_all();
                    dispatched += pumped?;
                }
                None => {
                    let mut state = self.state.lock();
                    if state.status == Status::Open {
                        self.state_changed.wait_for(&mut state, wait);
                    }
                }
            }
        }
    }

    /// Close both halves of the connection.
    ///
    /// Waiting calls fail with [`ConnectionError::Closed`]. Calling this more
    /// than once is harmless.
    pub fn close(&self) {
        {
            let mut state = self.state.lock();
            if state.status == Status::Closed {
                return;
            }
            state.status = Status::Closed;
        }
        self.state_changed.notify_all();
        self.writer.lock().take();
        // Waits for an in-progress read to finish.
        self.reader.lock().conn.take();
        self.state_changed.notify_all();
        debug!(port = %self.name, "client closed");
    }

    // ========================================================================
    // Internals
    // ========================================================================

    /// Length of the next read or sleep: one read timeout, cut short by the
    /// expiry if there is one.
    fn next_wait(&self, expires: Option<Instant>) -> Duration {
        match expires {
            Some(expires) => expires
                .saturating_duration_since(Instant::now())
                .min(self.config.read_timeout),
            None => self.config.read_timeout,
        }
    }

    fn write(&self, frame: &[u8]) -> Result<(), ConnectionError> {
        let mut writer = self.writer.lock();
        let conn = writer.as_mut().ok_or(ConnectionError::Closed)?;
        conn.write_frame(frame).map_err(|e| {
            self.fault(format!("write failed: {e}"));
            ConnectionError::Io(e)
        })
    }

    /// One bounded read, then dispatch whatever decoded.
    fn pump(&self, reader: &mut Reader, wait: Duration) -> Result<usize, ConnectionError> {
        let Reader { conn, decoder, buf } = reader;
        let conn = conn.as_mut().ok_or(ConnectionError::Closed)?;

        let n = conn.read(buf, wait).map_err(|e| {
            self.fault(format!("read failed: {e}"));
            ConnectionError::Io(e)
        })?;
        if n == 0 {
            return Ok(0);
        }
        trace!(port = %self.name, bytes = n, buffered = decoder.buffered_len(), "read");
        decoder.push(&buf[..n]);

        let (envelopes, errors) = decoder.drain();
        for err in &errors {
            self.count(&metric_defs::FRAMING_ERRORS);
            warn!(port = %self.name, error = %err, "discarded undecodable input");
        }
        let dispatched = envelopes.len();
        for envelope in envelopes {
            self.dispatch(envelope);
        }
        Ok(dispatched)
    }

    fn dispatch(&self, envelope: Envelope) {
        match envelope {
            Envelope::Response { id, result } => {
                let delivery = self.state.lock().pending.resolve(id, result);
                match delivery {
                    Delivery::Delivered => {
                        trace!(port = %self.name, id, "response matched");
                        self.state_changed.notify_all();
                    }
                    Delivery::Orphaned => {
                        self.count(&metric_defs::ORPHAN_RESPONSES);
                        warn!(port = %self.name, id, "dropped response with no waiting call");
                    }
                }
            }
            Envelope::Notify { method, args } => {
                self.count(&metric_defs::NOTIFIES_RECEIVED);
                let handler = self.handler.read().clone();
                match handler {
                    Some(handler) => {
                        debug!(port = %self.name, %method, "notification");
                        handler(&method, &args);
                    }
                    None => {
                        debug!(port = %self.name, %method, "no notification handler, dropped");
                    }
                }
            }
            Envelope::Request { id, method, .. } => {
                warn!(port = %self.name, id, %method, "dropped request from device");
            }
        }
    }

    fn fault(&self, reason: String) {
        let mut state = self.state.lock();
        if state.status == Status::Open {
            error!(port = %self.name, %reason, "connection faulted");
            state.status = Status::Faulted(reason);
        }
        drop(state);
        self.state_changed.notify_all();
    }

    fn count(&self, metric: &Metric) {
        let labels = [("port", self.name.clone())];
        ::metrics::counter!(metric.name, &labels).increment(1);
    }
}

impl Drop for RpcClient {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for RpcClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcClient")
            .field("name", &self.name)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
