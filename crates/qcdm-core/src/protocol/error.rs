//! Protocol errors

use std::fmt;

use thiserror::Error;

/// Frame codec failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    /// Not an error as such: the buffer holds an incomplete frame
    #[error("Need more data to complete the frame")]
    NeedMoreData,

    #[error("Malformed frame: terminator at offset {offset}")]
    MalformedBoundary { offset: usize },

    #[error("CRC mismatch: expected {expected:#06x}, got {actual:#06x}")]
    CrcMismatch { expected: u16, actual: u16 },

    #[error("Escape buffer overflow")]
    EscapeOverflow,

    /// Stream failure seen by [`DmCodec`](super::DmCodec)
    #[error("I/O error: {0}")]
    Io(String),
}

impl From<std::io::Error> for FrameError {
    fn from(e: std::io::Error) -> Self {
        FrameError::Io(e.to_string())
    }
}

/// Generic negative acknowledgements a device may answer with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NakKind {
    /// Command unknown or unimplemented by the device
    BadCommand,
    /// Command contained an invalid parameter
    BadParameter,
    /// Command was the wrong size
    BadLength,
    /// Command not accepted by the device
    NotAccepted,
    /// Command not allowed in the current mode
    BadMode,
    /// Service programming code lock in effect
    SpcLocked,
}

impl fmt::Display for NakKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NakKind::BadCommand => "unknown or unimplemented by the device",
            NakKind::BadParameter => "contained an invalid parameter",
            NakKind::BadLength => "was the wrong size",
            NakKind::NotAccepted => "was not accepted by the device",
            NakKind::BadMode => "is not allowed in the current device mode",
            NakKind::SpcLocked => "was refused because the SPC lock is active",
        };
        f.write_str(s)
    }
}

/// NV item operation status codes
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum NvError {
    #[error("NV subsystem busy")]
    Busy,
    #[error("NV command rejected")]
    BadCommand,
    #[error("NV memory full")]
    MemoryFull,
    #[error("NV operation failed")]
    Failed,
    #[error("NV item inactive")]
    Inactive,
    #[error("NV parameter invalid")]
    BadParameter,
    #[error("NV item is read-only")]
    ReadOnly,
    #[error("NV operation failed with status {0:#x}")]
    Unknown(u16),
}

impl NvError {
    /// Map a non-zero status to its error, `None` for success
    pub fn from_status(status: u16) -> Option<Self> {
        match status {
            0 => None,
            1 => Some(NvError::Busy),
            2 => Some(NvError::BadCommand),
            3 => Some(NvError::MemoryFull),
            4 => Some(NvError::Failed),
            5 => Some(NvError::Inactive),
            6 => Some(NvError::BadParameter),
            7 => Some(NvError::ReadOnly),
            other => Some(NvError::Unknown(other)),
        }
    }
}

/// Command build and response validation errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CommandError {
    #[error("DM command response malformed (must be at least 1 byte in length)")]
    Malformed,

    #[error("DM command {command} {kind}")]
    Nak { kind: NakKind, command: u8 },

    #[error("Unexpected DM command response (expected {expected}, got {actual})")]
    Unexpected { expected: u8, actual: u8 },

    #[error("Unexpected DM subsystem response (expected {expected_id}/{expected_cmd}, got {actual_id}/{actual_cmd})")]
    UnexpectedSubsystem {
        expected_id: u8,
        expected_cmd: u16,
        actual_id: u8,
        actual_cmd: u16,
    },

    #[error("DM command {command} response not long enough (got {got}, expected at least {needed})")]
    TooShort { command: u8, needed: usize, got: usize },

    #[error("Unexpected DM NV command response (expected item {expected}, got item {actual})")]
    NvItemMismatch { expected: u16, actual: u16 },

    #[error("The NV operation failed: {0}")]
    Nv(#[from] NvError),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Destination buffer too small: need {needed} bytes, have {available}")]
    BufferTooSmall { needed: usize, available: usize },

    #[error("Frame error: {0}")]
    Frame(#[from] FrameError),
}

impl CommandError {
    /// The device answered with a generic negative acknowledgement
    pub fn is_nak(&self) -> bool {
        matches!(self, CommandError::Nak { .. })
    }
}

/// Serial transport errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PortError {
    #[error("Failed to open {port}: {reason}")]
    Open { port: String, reason: String },

    #[error("Failed to configure port: {0}")]
    Configure(String),

    #[error("Sending command failed: {0}")]
    SendFailed(String),

    #[error("Serial command timed out")]
    ResponseTimeout,

    #[error("Port closed")]
    PortClosed,

    #[error("Command cancelled before it was sent")]
    Cancelled,

    #[error("Failed to parse response: {0}")]
    ParseFailed(String),
}

/// Typed result lookup errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResultError {
    #[error("Result has no key '{0}'")]
    Missing(String),

    #[error("Result key '{key}' holds {actual}, not {wanted}")]
    WrongType {
        key: String,
        wanted: &'static str,
        actual: &'static str,
    },
}

/// Errors that can occur anywhere in the stack
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error(transparent)]
    Frame(#[from] FrameError),

    #[error(transparent)]
    Command(#[from] CommandError),

    #[error(transparent)]
    Port(#[from] PortError),

    #[error(transparent)]
    Result(#[from] ResultError),
}
