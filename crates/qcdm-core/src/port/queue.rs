//! Serial command queue
//!
//! A [`SerialPort`] owns one spawned IO task that holds the transport, the
//! FIFO of pending commands, the response buffer, the reply cache and the
//! unsolicited-message handlers. Callers talk to it over an mpsc channel and
//! get exactly one outcome per command back over a oneshot.
//!
//! At most one command is in flight. The next command is only written once
//! the previous one has been answered, has timed out or has failed to send.

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::io;
use std::marker::PhantomData;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::task::{Context, Poll};
use std::time::Duration;

use regex::bytes::{Captures, Regex};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{sleep, sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, debug_span, trace, warn, Instrument};

use crate::config::PortConfig;
use crate::protocol::{PortError, Transport, SERIAL_BUF_SIZE};

/// What a [`ResponseParser`] made of the response buffer
#[derive(Debug)]
pub enum ParseOutcome {
    /// Not enough data yet; the buffer must be left as it was
    None,
    /// A complete response, already removed from the buffer
    Response(Vec<u8>),
    /// The data at the head of the buffer is garbage; it has been removed
    Error(PortError),
}

/// Protocol-specific view of the response buffer.
///
/// Both methods run on the IO task, after every read.
pub trait ResponseParser: Send + 'static {
    /// Remove and dispatch any unsolicited protocol messages at the head of
    /// the buffer. Called before [`parse`](Self::parse).
    fn take_unsolicited(&mut self, _buffer: &mut Vec<u8>) {}

    /// Try to cut one response off the head of the buffer
    fn parse(&mut self, buffer: &mut Vec<u8>) -> ParseOutcome;
}

/// Callback for a regex-matched unsolicited message
pub type UnsolicitedCallback = Box<dyn FnMut(&Captures<'_>) + Send>;

/// Notifications broadcast by the IO task
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PortEvent {
    /// A command timed out or could not be written; `consecutive` counts
    /// failures since the last good response
    TimedOut { consecutive: u32 },
    /// The response buffer passed its ceiling and was trimmed
    BufferFull { len: usize },
    /// The device hung up; every outstanding command failed with
    /// [`PortError::PortClosed`]
    ForcedClose,
}

type Reply = oneshot::Sender<Result<Vec<u8>, PortError>>;

/// Requests from [`SerialPort`] handles to the IO task
enum Request {
    Command {
        id: u64,
        bytes: Vec<u8>,
        timeout: Duration,
        cacheable: bool,
        reply: Reply,
    },
    Cancel {
        id: u64,
    },
    RegisterUnsolicited {
        pattern: Regex,
        callback: Option<UnsolicitedCallback>,
    },
    SetConnected(bool),
    Close {
        reply: oneshot::Sender<()>,
    },
}

/// A queued command; resolves to the response or the reason there is none
#[derive(Debug)]
pub struct PendingCommand {
    id: u64,
    rx: oneshot::Receiver<Result<Vec<u8>, PortError>>,
}

impl PendingCommand {
    /// Identifier to pass to [`SerialPort::cancel`]
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl Future for PendingCommand {
    type Output = Result<Vec<u8>, PortError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        // A dropped sender means the IO task is gone
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|r| r.unwrap_or(Err(PortError::PortClosed)))
    }
}

/// Handle to a port's IO task
pub struct SerialPort<P> {
    name: String,
    tx: mpsc::UnboundedSender<Request>,
    events: broadcast::Sender<PortEvent>,
    next_id: AtomicU64,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
    _parser: PhantomData<fn() -> P>,
}

impl<P: ResponseParser> SerialPort<P> {
    /// Spawn the IO task for `transport`. Must be called within a tokio
    /// runtime.
    pub fn new<T>(transport: T, parser: P, config: &PortConfig) -> Self
    where
        T: Transport + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(32);
        let cancel = CancellationToken::new();

        let name = if config.device.is_empty() {
            "unnamed".to_string()
        } else {
            config.device.clone()
        };

        let io = IoTask {
            transport: Box::new(transport),
            parser,
            queue: VecDeque::new(),
            in_flight: None,
            buffer: Vec::with_capacity(SERIAL_BUF_SIZE),
            cache: HashMap::new(),
            handlers: Vec::new(),
            connected: false,
            consecutive_timeouts: 0,
            send_delay: config.send_delay(),
            spew_control: config.spew_control,
            buffer_ceiling: config.buffer_ceiling,
            events: events.clone(),
        };
        let span = debug_span!("port", name = %name);
        let task = tokio::spawn(io.run(rx, cancel.clone()).instrument(span));

        Self {
            name,
            tx,
            events,
            next_id: AtomicU64::new(1),
            cancel,
            task: Mutex::new(Some(task)),
            _parser: PhantomData,
        }
    }
}

impl<P> SerialPort<P> {
    /// Device name used in logs
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Queue `bytes` for sending without waiting for the outcome
    pub fn enqueue(&self, bytes: Vec<u8>, timeout: Duration, cacheable: bool) -> PendingCommand {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (reply, rx) = oneshot::channel();
        // On failure the request, and with it the reply sender, is dropped
        // and the pending command resolves to PortClosed.
        let _ = self.tx.send(Request::Command {
            id,
            bytes,
            timeout,
            cacheable,
            reply,
        });
        PendingCommand { id, rx }
    }

    /// Queue `bytes` and wait for the response
    pub async fn command(
        &self,
        bytes: Vec<u8>,
        timeout: Duration,
        cacheable: bool,
    ) -> Result<Vec<u8>, PortError> {
        self.enqueue(bytes, timeout, cacheable).await
    }

    /// Drop a command that has not been sent yet; it resolves with
    /// [`PortError::Cancelled`]. A command already on the wire runs to its
    /// response or timeout.
    pub fn cancel(&self, id: u64) {
        let _ = self.tx.send(Request::Cancel { id });
    }

    /// Call `callback` for every match of `pattern` in received data.
    /// Matched bytes never reach the response parser. Registering the same
    /// pattern again replaces the earlier callback.
    pub fn add_unsolicited_handler<F>(&self, pattern: Regex, callback: F)
    where
        F: FnMut(&Captures<'_>) + Send + 'static,
    {
        let _ = self.tx.send(Request::RegisterUnsolicited {
            pattern,
            callback: Some(Box::new(callback)),
        });
    }

    /// Remove the handler registered for `pattern`
    pub fn remove_unsolicited_handler(&self, pattern: Regex) {
        let _ = self.tx.send(Request::RegisterUnsolicited {
            pattern,
            callback: None,
        });
    }

    /// While connected (data mode) every send fails without touching the line
    pub fn set_connected(&self, connected: bool) {
        let _ = self.tx.send(Request::SetConnected(connected));
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PortEvent> {
        self.events.subscribe()
    }

    pub fn is_open(&self) -> bool {
        !self.tx.is_closed()
    }

    /// Fail every outstanding command with [`PortError::PortClosed`], release
    /// the transport and wait for the IO task to exit
    pub async fn close(&self) {
        let (reply, rx) = oneshot::channel();
        if self.tx.send(Request::Close { reply }).is_ok() {
            let _ = rx.await;
        }

        let task = match self.task.lock() {
            Ok(mut guard) => guard.take(),
            Err(_) => None,
        };
        if let Some(task) = task {
            let _ = task.await;
        }
    }
}

impl<P> Drop for SerialPort<P> {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Space-separated hex for trace logs
fn hex_dump(data: &[u8]) -> String {
    data.iter()
        .map(|b| format!("{:02x}", b))
        .collect::<Vec<_>>()
        .join(" ")
}

struct Entry {
    id: u64,
    bytes: Vec<u8>,
    timeout: Duration,
    cacheable: bool,
    reply: Reply,
}

struct InFlight {
    entry: Entry,
    deadline: Instant,
}

/// State owned by the IO task
struct IoTask<P> {
    transport: Box<dyn Transport>,
    parser: P,
    queue: VecDeque<Entry>,
    in_flight: Option<InFlight>,
    buffer: Vec<u8>,
    cache: HashMap<Vec<u8>, Vec<u8>>,
    handlers: Vec<(Regex, UnsolicitedCallback)>,
    connected: bool,
    consecutive_timeouts: u32,
    send_delay: Duration,
    spew_control: bool,
    buffer_ceiling: usize,
    events: broadcast::Sender<PortEvent>,
}

impl<P: ResponseParser> IoTask<P> {
    /// Main loop.
    ///
    /// `select!` is biased towards shutdown, then caller requests, then the
    /// response timer, then the device.
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<Request>, cancel: CancellationToken) {
        debug!("IO task started");
        let mut read_buf = [0u8; SERIAL_BUF_SIZE];

        loop {
            if self.in_flight.is_none() {
                self.start_next().await;
            }
            let deadline = self.in_flight.as_ref().map(|f| f.deadline);

            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    debug!("IO task cancelled");
                    self.shutdown().await;
                    break;
                }

                req = rx.recv() => {
                    match req {
                        Some(Request::Close { reply }) => {
                            debug!("port close requested");
                            self.shutdown().await;
                            let _ = reply.send(());
                            break;
                        }
                        Some(req) => self.handle_request(req),
                        None => {
                            debug!("all port handles dropped");
                            self.shutdown().await;
                            break;
                        }
                    }
                }

                _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    self.on_timeout();
                }

                res = self.transport.receive(&mut read_buf) => {
                    match res {
                        Ok(0) => {
                            debug!("unexpected port hangup");
                            self.force_close().await;
                            break;
                        }
                        Ok(n) => self.on_data(&read_buf[..n]),
                        Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                        Err(e) => {
                            warn!(error = %e, "read error");
                            self.force_close().await;
                            break;
                        }
                    }
                }
            }
        }
        debug!("IO task exiting");
    }

    fn handle_request(&mut self, req: Request) {
        match req {
            Request::Command {
                id,
                bytes,
                timeout,
                cacheable,
                reply,
            } => {
                if !cacheable {
                    self.cache.remove(&bytes);
                }
                trace!(id, len = bytes.len(), "command queued");
                self.queue.push_back(Entry {
                    id,
                    bytes,
                    timeout,
                    cacheable,
                    reply,
                });
            }
            Request::Cancel { id } => {
                if let Some(pos) = self.queue.iter().position(|e| e.id == id) {
                    if let Some(entry) = self.queue.remove(pos) {
                        debug!(id, "queued command cancelled");
                        let _ = entry.reply.send(Err(PortError::Cancelled));
                    }
                } else if self.in_flight.as_ref().is_some_and(|f| f.entry.id == id) {
                    debug!(id, "command already sent, waiting for its response");
                }
            }
            Request::RegisterUnsolicited { pattern, callback } => {
                let pos = self
                    .handlers
                    .iter()
                    .position(|(re, _)| re.as_str() == pattern.as_str());
                match (pos, callback) {
                    (Some(i), Some(cb)) => self.handlers[i] = (pattern, cb),
                    (None, Some(cb)) => self.handlers.push((pattern, cb)),
                    (Some(i), None) => {
                        self.handlers.remove(i);
                    }
                    (None, None) => {}
                }
            }
            Request::SetConnected(connected) => {
                debug!(connected, "data mode changed");
                self.connected = connected;
            }
            // Handled by the IO loop
            Request::Close { .. } => {}
        }
    }

    /// Take commands off the queue until one is on the wire or the queue is
    /// empty. Cached replies and send failures resolve immediately.
    async fn start_next(&mut self) {
        while self.in_flight.is_none() {
            let Some(entry) = self.queue.pop_front() else {
                return;
            };

            if entry.cacheable {
                if let Some(cached) = self.cache.get(&entry.bytes) {
                    debug!(id = entry.id, "using cached reply");
                    let _ = entry.reply.send(Ok(cached.clone()));
                    continue;
                }
            }

            trace!("--> {}", hex_dump(&entry.bytes));
            match self.send(&entry.bytes).await {
                Ok(()) => {
                    let deadline = Instant::now() + entry.timeout;
                    self.in_flight = Some(InFlight { entry, deadline });
                }
                Err(e) => {
                    debug!(id = entry.id, error = %e, "send failed");
                    let _ = entry.reply.send(Err(e));
                }
            }
        }
    }

    /// Write a whole command, one byte at a time with a pause in between when
    /// a send delay is configured. Would-block writes are retried on a budget.
    async fn send(&mut self, bytes: &[u8]) -> Result<(), PortError> {
        if self.connected {
            return Err(PortError::SendFailed("device is connected".into()));
        }

        let delay_us = self.send_delay.as_micros() as u64;
        let (mut retries_left, retry_pause) = if delay_us == 0 {
            (1000u64, Duration::from_millis(1))
        } else {
            ((3_000_000 / delay_us).max(1), self.send_delay)
        };

        let mut written = 0;
        while written < bytes.len() {
            let chunk = if delay_us == 0 {
                &bytes[written..]
            } else {
                &bytes[written..written + 1]
            };

            let blocked = match self.transport.send(chunk).await {
                Ok(0) => io::Error::from(io::ErrorKind::WouldBlock),
                Ok(n) => {
                    written += n;
                    if delay_us != 0 && written < bytes.len() {
                        sleep(self.send_delay).await;
                    }
                    continue;
                }
                Err(e)
                    if matches!(
                        e.kind(),
                        io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
                    ) =>
                {
                    e
                }
                Err(e) => return Err(PortError::SendFailed(e.to_string())),
            };

            retries_left -= 1;
            if retries_left == 0 {
                self.consecutive_timeouts += 1;
                warn!(
                    consecutive = self.consecutive_timeouts,
                    "device not accepting data"
                );
                let _ = self.events.send(PortEvent::TimedOut {
                    consecutive: self.consecutive_timeouts,
                });
                return Err(PortError::SendFailed(blocked.to_string()));
            }
            sleep(retry_pause).await;
        }
        Ok(())
    }

    fn on_timeout(&mut self) {
        let Some(flight) = self.in_flight.take() else {
            return;
        };
        self.consecutive_timeouts += 1;
        debug!(
            id = flight.entry.id,
            consecutive = self.consecutive_timeouts,
            "command timed out"
        );
        let _ = flight.entry.reply.send(Err(PortError::ResponseTimeout));
        // A partial reply would corrupt the next command's response
        if !self.buffer.is_empty() {
            debug!(len = self.buffer.len(), "discarding stale response bytes");
            self.buffer.clear();
        }
        let _ = self.events.send(PortEvent::TimedOut {
            consecutive: self.consecutive_timeouts,
        });
    }

    fn on_data(&mut self, data: &[u8]) {
        trace!("<-- {}", hex_dump(data));
        self.buffer.extend_from_slice(data);

        if self.spew_control && self.buffer.len() > self.buffer_ceiling {
            let len = self.buffer.len();
            warn!(len, "response buffer full, dropping old data");
            let _ = self.events.send(PortEvent::BufferFull { len });
            let half = (self.buffer_ceiling / 2).max(1);
            while self.buffer.len() > self.buffer_ceiling {
                let n = half.min(self.buffer.len());
                self.buffer.drain(..n);
            }
        }

        self.run_unsolicited_handlers();

        loop {
            let before = self.buffer.len();
            self.parser.take_unsolicited(&mut self.buffer);
            match self.parser.parse(&mut self.buffer) {
                ParseOutcome::None => break,
                ParseOutcome::Response(response) => self.complete(Ok(response)),
                ParseOutcome::Error(e) => self.complete(Err(e)),
            }
            if self.buffer.is_empty() || self.buffer.len() == before {
                break;
            }
        }
    }

    /// Run each regex handler, in registration order, over the whole buffer
    /// and cut out everything they matched
    fn run_unsolicited_handlers(&mut self) {
        for (pattern, callback) in self.handlers.iter_mut() {
            let mut spans = Vec::new();
            for caps in pattern.captures_iter(&self.buffer) {
                if let Some(m) = caps.get(0) {
                    spans.push(m.range());
                }
                callback(&caps);
            }
            if spans.is_empty() {
                continue;
            }

            let mut kept = Vec::with_capacity(self.buffer.len());
            let mut pos = 0;
            for span in spans {
                kept.extend_from_slice(&self.buffer[pos..span.start]);
                pos = span.end;
            }
            kept.extend_from_slice(&self.buffer[pos..]);
            self.buffer = kept;
        }
    }

    fn complete(&mut self, result: Result<Vec<u8>, PortError>) {
        let Some(flight) = self.in_flight.take() else {
            debug!(ok = result.is_ok(), "dropping response with no command in flight");
            return;
        };

        if let Ok(response) = &result {
            self.consecutive_timeouts = 0;
            if flight.entry.cacheable {
                self.cache.insert(flight.entry.bytes.clone(), response.clone());
            }
        }
        trace!(id = flight.entry.id, ok = result.is_ok(), "command complete");
        let _ = flight.entry.reply.send(result);
    }

    async fn force_close(&mut self) {
        let _ = self.events.send(PortEvent::ForcedClose);
        self.shutdown().await;
    }

    /// Resolve everything outstanding with PortClosed and release the device
    async fn shutdown(&mut self) {
        if let Some(flight) = self.in_flight.take() {
            let _ = flight.entry.reply.send(Err(PortError::PortClosed));
        }
        for entry in self.queue.drain(..) {
            let _ = entry.reply.send(Err(PortError::PortClosed));
        }
        self.buffer.clear();
        if let Err(e) = self.transport.close().await {
            debug!(error = %e, "error closing transport");
        }
    }
}
