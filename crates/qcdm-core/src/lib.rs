//! # qcdm-core
//!
//! Talk to the Qualcomm DM diagnostic port found on CDMA, EVDO, WCDMA and
//! GSM modems.

#![cfg_attr(docsrs, feature(doc_cfg))]

//!
//! This library provides:
//! - The DM frame codec (HDLC-style escaping, CRC-16 trailer)
//! - Typed DM commands and their decoded results
//! - A serial command queue with timeouts, caching and unsolicited handlers
//! - A DM port that runs commands and routes log packets
//!
//! ## Example
//!
//! ```rust,ignore
//! use qcdm_core::prelude::*;
//!
//! let port = QcdmPort::open(&PortConfig::for_device("/dev/ttyUSB0"))?;
//! let info = port.query(&Command::VersionInfo).await?;
//! println!("model: {}", info.get_string("model")?);
//! ```

pub mod config;
pub mod port;
pub mod protocol;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::{ConfigError, PortConfig};
    pub use crate::port::{PortEvent, QcdmPort, SerialPort};
    pub use crate::protocol::{
        Command, CommandError, DmResult, DmValue, NakKind, PortError, ProtocolError,
    };
}

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
