//! DM port
//!
//! [`QcdmPort`] is a [`SerialPort`] speaking DM frames: responses are cut out
//! of the byte stream at frame terminators, decapsulated and checked, and
//! unsolicited log packets are routed to per-log-code handlers instead of
//! being mistaken for command responses.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use regex::bytes::{Captures, Regex};
use tokio::sync::broadcast;
use tracing::{debug, trace};

use super::queue::{ParseOutcome, PendingCommand, PortEvent, ResponseParser, SerialPort};
use crate::config::PortConfig;
use crate::protocol::commands::codes::DIAG_CMD_LOG;
use crate::protocol::frame::{decapsulate, DIAG_CONTROL_CHAR};
use crate::protocol::commands::LogPacket;
use crate::protocol::{
    open_port, Command, DmResult, FrameError, PortError, ProtocolError, StreamTransport,
    Transport,
};

/// Callback for unsolicited log packets
pub type LogCallback = Box<dyn FnMut(&LogPacket<'_>) + Send>;

struct LogHandler {
    log_code: u16,
    enabled: bool,
    callback: LogCallback,
}

/// Log handlers shared between the port handle and the IO task's parser
#[derive(Clone, Default)]
struct LogHandlers(Arc<Mutex<Vec<LogHandler>>>);

impl LogHandlers {
    fn with<R>(&self, f: impl FnOnce(&mut Vec<LogHandler>) -> R) -> Option<R> {
        match self.0.lock() {
            Ok(mut handlers) => Some(f(&mut handlers)),
            Err(_) => None,
        }
    }

    fn dispatch(&self, packet: &LogPacket<'_>) {
        self.with(|handlers| {
            for h in handlers
                .iter_mut()
                .filter(|h| h.enabled && h.log_code == packet.log_code)
            {
                (h.callback)(packet);
            }
        });
    }
}

/// Offset where a frame starts, once the buffer holds a terminator with at
/// least three bytes before it (counted from the origin or from the previous
/// terminator)
fn find_frame_start(buffer: &[u8]) -> Option<usize> {
    let mut last: Option<usize> = None;
    for (i, &b) in buffer.iter().enumerate() {
        if b != DIAG_CONTROL_CHAR {
            continue;
        }
        match last {
            None if i >= 3 => return Some(0),
            Some(l) if i > l + 3 => return Some(l + 1),
            _ => last = Some(i),
        }
    }
    None
}

/// [`ResponseParser`] for DM frames
#[derive(Clone, Default)]
pub struct QcdmParser {
    log_handlers: LogHandlers,
}

impl QcdmParser {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ResponseParser for QcdmParser {
    fn take_unsolicited(&mut self, buffer: &mut Vec<u8>) {
        loop {
            let Some(start) = find_frame_start(buffer) else {
                return;
            };
            buffer.drain(..start);

            let frame = decapsulate(buffer);
            let payload = match frame.result {
                Ok(p) if p.first() == Some(&DIAG_CMD_LOG) => p,
                // Responses and bad frames are left for parse()
                _ => return,
            };
            buffer.drain(..frame.consumed);

            match LogPacket::parse(&payload) {
                Ok(packet) => {
                    trace!("log packet {:#06x}", packet.log_code);
                    self.log_handlers.dispatch(&packet);
                }
                Err(e) => debug!(error = %e, "dropping short log packet"),
            }
        }
    }

    fn parse(&mut self, buffer: &mut Vec<u8>) -> ParseOutcome {
        loop {
            let Some(start) = find_frame_start(buffer) else {
                return ParseOutcome::None;
            };
            buffer.drain(..start);
            if buffer.is_empty() {
                return ParseOutcome::None;
            }

            let frame = decapsulate(buffer);
            if frame.needs_more() {
                return ParseOutcome::None;
            }
            buffer.drain(..frame.consumed);

            return match frame.result {
                Ok(payload) => ParseOutcome::Response(payload),
                // No payload to blame; look for the next frame
                Err(e @ FrameError::MalformedBoundary { .. }) => {
                    debug!(error = %e, "skipping malformed frame");
                    continue;
                }
                Err(e) => {
                    debug!(error = %e, "bad frame");
                    ParseOutcome::Error(PortError::ParseFailed(
                        "Failed to unescape QCDM packet".into(),
                    ))
                }
            };
        }
    }
}

/// A diagnostic port
pub struct QcdmPort {
    port: SerialPort<QcdmParser>,
    log_handlers: LogHandlers,
    timeout: Duration,
}

impl QcdmPort {
    /// Open the serial device named in `config`
    pub fn open(config: &PortConfig) -> Result<Self, PortError> {
        config
            .validate()
            .map_err(|e| PortError::Configure(e.to_string()))?;
        let stream = open_port(config)?;
        Ok(Self::with_transport(StreamTransport::new(stream), config))
    }

    /// Run a DM port over an already open transport
    pub fn with_transport<T>(transport: T, config: &PortConfig) -> Self
    where
        T: Transport + 'static,
    {
        let parser = QcdmParser::new();
        let log_handlers = parser.log_handlers.clone();
        Self {
            port: SerialPort::new(transport, parser, config),
            log_handlers,
            timeout: config.timeout(),
        }
    }

    /// Send an encapsulated frame and wait for the decapsulated response.
    /// DM replies are never cached.
    pub async fn command(&self, frame: Vec<u8>, timeout: Duration) -> Result<Vec<u8>, PortError> {
        self.port.command(frame, timeout, false).await
    }

    /// Queue an encapsulated frame without waiting
    pub fn enqueue(&self, frame: Vec<u8>, timeout: Duration) -> PendingCommand {
        self.port.enqueue(frame, timeout, false)
    }

    /// Encode `cmd`, send it and decode the response
    pub async fn request(&self, cmd: &Command, timeout: Duration) -> Result<DmResult, ProtocolError> {
        let frame = cmd.to_frame()?;
        let response = self.command(frame, timeout).await?;
        Ok(cmd.parse(&response)?)
    }

    /// [`request`](Self::request) with the configured timeout
    pub async fn query(&self, cmd: &Command) -> Result<DmResult, ProtocolError> {
        self.request(cmd, self.timeout).await
    }

    /// Call `callback` for each log packet with `log_code`. Replaces an
    /// existing handler for the same code. Handlers run on the IO task and
    /// must not call back into the log handler methods.
    pub fn add_log_handler<F>(&self, log_code: u16, callback: F)
    where
        F: FnMut(&LogPacket<'_>) + Send + 'static,
    {
        let callback: LogCallback = Box::new(callback);
        self.log_handlers.with(move |handlers| {
            match handlers.iter_mut().find(|h| h.log_code == log_code) {
                Some(h) => {
                    h.callback = callback;
                    h.enabled = true;
                }
                None => handlers.push(LogHandler {
                    log_code,
                    enabled: true,
                    callback,
                }),
            }
        });
    }

    /// Turn a registered log handler on or off; returns false if there is
    /// no handler for `log_code`
    pub fn set_log_handler_enabled(&self, log_code: u16, enabled: bool) -> bool {
        self.log_handlers
            .with(|handlers| {
                handlers
                    .iter_mut()
                    .find(|h| h.log_code == log_code)
                    .map(|h| h.enabled = enabled)
                    .is_some()
            })
            .unwrap_or(false)
    }

    pub fn enable_log_handler(&self, log_code: u16) -> bool {
        self.set_log_handler_enabled(log_code, true)
    }

    pub fn disable_log_handler(&self, log_code: u16) -> bool {
        self.set_log_handler_enabled(log_code, false)
    }

    pub fn remove_log_handler(&self, log_code: u16) -> bool {
        self.log_handlers
            .with(|handlers| {
                let before = handlers.len();
                handlers.retain(|h| h.log_code != log_code);
                handlers.len() != before
            })
            .unwrap_or(false)
    }

    /// See [`SerialPort::add_unsolicited_handler`]
    pub fn add_unsolicited_handler<F>(&self, pattern: Regex, callback: F)
    where
        F: FnMut(&Captures<'_>) + Send + 'static,
    {
        self.port.add_unsolicited_handler(pattern, callback);
    }

    pub fn cancel(&self, id: u64) {
        self.port.cancel(id);
    }

    pub fn set_connected(&self, connected: bool) {
        self.port.set_connected(connected);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PortEvent> {
        self.port.subscribe()
    }

    pub fn name(&self) -> &str {
        self.port.name()
    }

    pub fn is_open(&self) -> bool {
        self.port.is_open()
    }

    pub async fn close(&self) {
        self.port.close().await;
    }
}
