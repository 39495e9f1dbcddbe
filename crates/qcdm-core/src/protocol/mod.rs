//! Qualcomm DM protocol
//!
//! Frame codec, typed commands and results, and the byte transports a port
//! runs on.

pub mod commands;
mod error;
pub mod frame;
mod result;
pub mod serial;
pub mod transport;
mod wire;

pub use commands::{Command, LogPacket, ResponseKind};
pub use error::{
    CommandError, FrameError, NakKind, NvError, PortError, ProtocolError, ResultError,
};
pub use frame::{decapsulate, encapsulate, DmCodec};
pub use result::{DmResult, DmValue};
pub use serial::{list_ports, open_port, PortInfo};
pub use transport::{StreamTransport, Transport};
pub use wire::{FieldReader, PayloadWriter};

/// Default baud rate for diagnostic ports
pub const DEFAULT_BAUD_RATE: u32 = 115200;

/// Default timeout for responses in milliseconds
pub const DEFAULT_TIMEOUT_MS: u64 = 3000;

/// Response buffer ceiling before spew control trims it
pub const SERIAL_BUF_SIZE: usize = 2048;
