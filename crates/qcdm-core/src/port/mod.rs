//! Ports: the serial command queue and the DM adapter on top of it

mod qcdm;
mod queue;

pub use qcdm::{LogCallback, QcdmParser, QcdmPort};
pub use queue::{
    ParseOutcome, PendingCommand, PortEvent, ResponseParser, SerialPort, UnsolicitedCallback,
};
