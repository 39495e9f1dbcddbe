//! Query basic identity and status from a DM port.
//!
//! ```text
//! cargo run --example query_modem -- /dev/ttyUSB0
//! cargo run --example query_modem -- port.json
//! ```
//!
//! Set `RUST_LOG=qcdm_core=trace` to see the raw traffic.

use std::env;

use anyhow::{bail, Context, Result};
use qcdm_core::port::PortEvent;
use qcdm_core::prelude::*;
use qcdm_core::protocol::{list_ports, CommandError};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let Some(arg) = env::args().nth(1) else {
        println!("usage: query_modem <device | config.json>");
        println!("available ports:");
        for p in list_ports() {
            println!("  {} {}", p.name, p.product.unwrap_or_default());
        }
        return Ok(());
    };

    let config = if arg.ends_with(".json") {
        PortConfig::load(&arg).with_context(|| format!("loading {}", arg))?
    } else {
        PortConfig::for_device(arg)
    };

    let port = QcdmPort::open(&config).context("opening DM port")?;
    let mut events = port.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            if let PortEvent::TimedOut { consecutive } = event {
                warn!(consecutive, "modem not responding");
            }
        }
    });

    let commands = [
        Command::VersionInfo,
        Command::Esn,
        Command::SwVersion,
        Command::StatusSnapshot,
        Command::CdmaStatus,
        Command::CmStateInfo,
        Command::HdrStateInfo,
    ];

    let mut answered = 0;
    for cmd in &commands {
        match port.query(cmd).await {
            Ok(result) => {
                answered += 1;
                println!("{:?}:\n{}", cmd, serde_json::to_string_pretty(&result)?);
            }
            Err(ProtocolError::Command(e @ CommandError::Nak { .. })) => {
                info!(command = ?cmd, "not supported: {}", e);
            }
            Err(e) => warn!(command = ?cmd, error = %e, "command failed"),
        }
    }

    port.close().await;
    if answered == 0 {
        bail!("no response from {}", config.device);
    }
    Ok(())
}
