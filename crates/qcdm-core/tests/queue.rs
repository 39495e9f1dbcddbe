use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use pretty_assertions::assert_eq;
use qcdm_core::config::PortConfig;
use qcdm_core::port::{ParseOutcome, PortEvent, ResponseParser, SerialPort};
use qcdm_core::protocol::{PortError, StreamTransport, Transport};
use regex::bytes::Regex;
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::sync::mpsc;
use tokio::time::timeout;

const LONG: Duration = Duration::from_secs(5);

/// Responses are `\n`-terminated lines
struct LineParser;

impl ResponseParser for LineParser {
    fn parse(&mut self, buffer: &mut Vec<u8>) -> ParseOutcome {
        match buffer.iter().position(|&b| b == b'\n') {
            Some(i) => {
                let mut line: Vec<u8> = buffer.drain(..=i).collect();
                line.pop();
                if line == b"ERROR" {
                    ParseOutcome::Error(PortError::ParseFailed("device error".into()))
                } else {
                    ParseOutcome::Response(line)
                }
            }
            None => ParseOutcome::None,
        }
    }
}

fn open(config: PortConfig) -> (SerialPort<LineParser>, DuplexStream) {
    let (host, device) = tokio::io::duplex(4096);
    let port = SerialPort::new(StreamTransport::new(host), LineParser, &config);
    (port, device)
}

fn open_default() -> (SerialPort<LineParser>, DuplexStream) {
    open(PortConfig::for_device("fake0"))
}

async fn expect_write(device: &mut DuplexStream, expected: &[u8]) {
    let mut buf = vec![0u8; expected.len()];
    timeout(LONG, device.read_exact(&mut buf))
        .await
        .expect("command was not written")
        .unwrap();
    assert_eq!(buf, expected);
}

async fn expect_silence(device: &mut DuplexStream) {
    let mut buf = [0u8; 16];
    assert!(
        timeout(Duration::from_millis(50), device.read(&mut buf))
            .await
            .is_err(),
        "unexpected write"
    );
}

#[tokio::test]
async fn test_fifo_single_in_flight() {
    let (port, mut dev) = open_default();
    let a = port.enqueue(b"A".to_vec(), LONG, false);
    let b = port.enqueue(b"B".to_vec(), LONG, false);
    let c = port.enqueue(b"C".to_vec(), LONG, false);

    expect_write(&mut dev, b"A").await;
    // B stays queued until A is answered
    expect_silence(&mut dev).await;
    dev.write_all(b"ra\n").await.unwrap();

    expect_write(&mut dev, b"B").await;
    dev.write_all(b"rb\n").await.unwrap();
    expect_write(&mut dev, b"C").await;
    dev.write_all(b"rc\n").await.unwrap();

    assert_eq!(a.await.unwrap(), b"ra".to_vec());
    assert_eq!(b.await.unwrap(), b"rb".to_vec());
    assert_eq!(c.await.unwrap(), b"rc".to_vec());
}

#[tokio::test]
async fn test_parse_error_resolves_head_only() {
    let (port, mut dev) = open_default();
    let a = port.enqueue(b"A".to_vec(), LONG, false);
    let b = port.enqueue(b"B".to_vec(), LONG, false);

    expect_write(&mut dev, b"A").await;
    dev.write_all(b"ERROR\n").await.unwrap();
    expect_write(&mut dev, b"B").await;
    dev.write_all(b"ok\n").await.unwrap();

    assert!(matches!(a.await, Err(PortError::ParseFailed(_))));
    assert_eq!(b.await.unwrap(), b"ok".to_vec());
}

#[tokio::test]
async fn test_cached_reply() {
    let (port, mut dev) = open_default();

    let first = port.enqueue(b"INFO".to_vec(), LONG, true);
    expect_write(&mut dev, b"INFO").await;
    dev.write_all(b"v1\n").await.unwrap();
    assert_eq!(first.await.unwrap(), b"v1".to_vec());

    // Served from the cache without touching the device
    let cached = port.command(b"INFO".to_vec(), LONG, true).await.unwrap();
    assert_eq!(cached, b"v1".to_vec());
    expect_silence(&mut dev).await;

    // A non-cacheable send of the same bytes invalidates the entry
    let fresh = port.enqueue(b"INFO".to_vec(), LONG, false);
    expect_write(&mut dev, b"INFO").await;
    dev.write_all(b"v2\n").await.unwrap();
    assert_eq!(fresh.await.unwrap(), b"v2".to_vec());

    let again = port.enqueue(b"INFO".to_vec(), LONG, true);
    expect_write(&mut dev, b"INFO").await;
    dev.write_all(b"v3\n").await.unwrap();
    assert_eq!(again.await.unwrap(), b"v3".to_vec());
}

#[tokio::test]
async fn test_cancel_queued_command() {
    let (port, mut dev) = open_default();
    let a = port.enqueue(b"A".to_vec(), LONG, false);
    let b = port.enqueue(b"B".to_vec(), LONG, false);
    let c = port.enqueue(b"C".to_vec(), LONG, false);

    expect_write(&mut dev, b"A").await;
    port.cancel(b.id());
    // Cancelling the command on the wire has no effect
    port.cancel(a.id());
    assert!(matches!(b.await, Err(PortError::Cancelled)));

    dev.write_all(b"ra\n").await.unwrap();
    assert_eq!(a.await.unwrap(), b"ra".to_vec());

    expect_write(&mut dev, b"C").await;
    dev.write_all(b"rc\n").await.unwrap();
    assert_eq!(c.await.unwrap(), b"rc".to_vec());
}

#[tokio::test]
async fn test_close_resolves_everything() {
    let (port, mut dev) = open_default();
    let a = port.enqueue(b"A".to_vec(), LONG, false);
    let b = port.enqueue(b"B".to_vec(), LONG, false);
    expect_write(&mut dev, b"A").await;

    port.close().await;
    assert!(matches!(a.await, Err(PortError::PortClosed)));
    assert!(matches!(b.await, Err(PortError::PortClosed)));
    assert!(!port.is_open());

    // The transport was shut down
    let mut buf = [0u8; 4];
    assert_eq!(dev.read(&mut buf).await.unwrap(), 0);
}

#[tokio::test]
async fn test_hangup_forces_close() {
    let (port, mut dev) = open_default();
    let mut events = port.subscribe();
    let a = port.enqueue(b"A".to_vec(), LONG, false);
    expect_write(&mut dev, b"A").await;

    drop(dev);
    assert!(matches!(a.await, Err(PortError::PortClosed)));
    assert_eq!(events.recv().await.unwrap(), PortEvent::ForcedClose);
}

#[tokio::test]
async fn test_unsolicited_isolated_from_responses() {
    let (port, mut dev) = open_default();
    let (tx, mut rx) = mpsc::unbounded_channel();
    port.add_unsolicited_handler(
        Regex::new(r"\^RSSI:(\d+)\r").unwrap(),
        move |caps| {
            let v: u32 = std::str::from_utf8(&caps[1]).unwrap().parse().unwrap();
            let _ = tx.send(v);
        },
    );

    // With nothing in flight
    dev.write_all(b"^RSSI:12\r").await.unwrap();
    assert_eq!(timeout(LONG, rx.recv()).await.unwrap(), Some(12));

    // Interleaved with a response
    let a = port.enqueue(b"A".to_vec(), LONG, false);
    expect_write(&mut dev, b"A").await;
    dev.write_all(b"re^RSSI:7\rsp\n").await.unwrap();
    assert_eq!(a.await.unwrap(), b"resp".to_vec());
    assert_eq!(timeout(LONG, rx.recv()).await.unwrap(), Some(7));
}

#[tokio::test]
async fn test_unsolicited_handler_replaced_and_removed() {
    let (port, mut dev) = open_default();
    let hits = Arc::new(Mutex::new(Vec::new()));

    let h = hits.clone();
    port.add_unsolicited_handler(Regex::new("RING\r").unwrap(), move |_| {
        h.lock().unwrap().push("first")
    });
    let h = hits.clone();
    port.add_unsolicited_handler(Regex::new("RING\r").unwrap(), move |_| {
        h.lock().unwrap().push("second")
    });

    let a = port.enqueue(b"A".to_vec(), LONG, false);
    expect_write(&mut dev, b"A").await;
    dev.write_all(b"RING\rok\n").await.unwrap();
    assert_eq!(a.await.unwrap(), b"ok".to_vec());
    assert_eq!(*hits.lock().unwrap(), vec!["second"]);

    port.remove_unsolicited_handler(Regex::new("RING\r").unwrap());
    let b = port.enqueue(b"B".to_vec(), LONG, false);
    expect_write(&mut dev, b"B").await;
    dev.write_all(b"RING\rok\n").await.unwrap();
    assert_eq!(b.await.unwrap(), b"RING\rok".to_vec());
    assert_eq!(hits.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_buffer_ceiling() {
    let config = PortConfig {
        buffer_ceiling: 64,
        ..PortConfig::for_device("fake0")
    };
    let (port, mut dev) = open(config);
    let mut events = port.subscribe();

    let a = port.enqueue(b"A".to_vec(), LONG, false);
    expect_write(&mut dev, b"A").await;
    dev.write_all(&[b'x'; 200]).await.unwrap();
    assert!(matches!(
        timeout(LONG, events.recv()).await.unwrap(),
        Ok(PortEvent::BufferFull { .. })
    ));

    dev.write_all(b"\n").await.unwrap();
    let line = a.await.unwrap();
    assert!(line.len() <= 64, "buffer kept {} bytes", line.len());
    assert!(line.iter().all(|&b| b == b'x'));
}

#[tokio::test]
async fn test_data_mode_blocks_sends() {
    let (port, mut dev) = open_default();
    port.set_connected(true);
    match port.command(b"A".to_vec(), LONG, false).await {
        Err(PortError::SendFailed(msg)) => assert_eq!(msg, "device is connected"),
        other => panic!("unexpected {:?}", other),
    }
    expect_silence(&mut dev).await;

    port.set_connected(false);
    let b = port.enqueue(b"B".to_vec(), LONG, false);
    expect_write(&mut dev, b"B").await;
    dev.write_all(b"ok\n").await.unwrap();
    assert_eq!(b.await.unwrap(), b"ok".to_vec());
}

#[tokio::test(start_paused = true)]
async fn test_timeout_then_next_proceeds() {
    let (port, mut dev) = open_default();
    let mut events = port.subscribe();

    let a = port.enqueue(b"A".to_vec(), Duration::from_secs(3), false);
    let b = port.enqueue(b"B".to_vec(), Duration::from_secs(3), false);

    expect_write(&mut dev, b"A").await;
    assert!(matches!(a.await, Err(PortError::ResponseTimeout)));
    assert_eq!(events.recv().await.unwrap(), PortEvent::TimedOut { consecutive: 1 });

    expect_write(&mut dev, b"B").await;
    dev.write_all(b"rb\n").await.unwrap();
    assert_eq!(b.await.unwrap(), b"rb".to_vec());
}

#[tokio::test(start_paused = true)]
async fn test_timeout_drops_partial_reply() {
    let (port, mut dev) = open_default();

    let a = port.enqueue(b"A".to_vec(), Duration::from_secs(3), false);
    let b = port.enqueue(b"B".to_vec(), Duration::from_secs(3), false);

    expect_write(&mut dev, b"A").await;
    dev.write_all(b"half-of-a").await.unwrap();
    assert!(matches!(a.await, Err(PortError::ResponseTimeout)));

    expect_write(&mut dev, b"B").await;
    dev.write_all(b"rb\n").await.unwrap();
    assert_eq!(b.await.unwrap(), b"rb".to_vec());
}

/// Transport whose writes can be refused on demand
struct StubbornTransport {
    refuse: Arc<AtomicUsize>,
    written: Arc<Mutex<Vec<u8>>>,
    incoming: mpsc::UnboundedReceiver<Vec<u8>>,
}

#[async_trait]
impl Transport for StubbornTransport {
    async fn send(&mut self, data: &[u8]) -> io::Result<usize> {
        let left = self.refuse.load(Ordering::SeqCst);
        if left > 0 {
            self.refuse.store(left - 1, Ordering::SeqCst);
            return Err(io::ErrorKind::WouldBlock.into());
        }
        self.written.lock().unwrap().extend_from_slice(data);
        Ok(data.len())
    }

    async fn receive(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.incoming.recv().await {
            Some(data) => {
                let n = data.len().min(buf.len());
                buf[..n].copy_from_slice(&data[..n]);
                Ok(n)
            }
            None => Ok(0),
        }
    }

    async fn close(&mut self) -> io::Result<()> {
        Ok(())
    }
}

struct Stubborn {
    refuse: Arc<AtomicUsize>,
    written: Arc<Mutex<Vec<u8>>>,
    incoming: mpsc::UnboundedSender<Vec<u8>>,
}

fn stubborn_port(config: &PortConfig, refuse: usize) -> (SerialPort<LineParser>, Stubborn) {
    let refuse = Arc::new(AtomicUsize::new(refuse));
    let written = Arc::new(Mutex::new(Vec::new()));
    let (tx, rx) = mpsc::unbounded_channel();
    let transport = StubbornTransport {
        refuse: refuse.clone(),
        written: written.clone(),
        incoming: rx,
    };
    let port = SerialPort::new(transport, LineParser, config);
    (
        port,
        Stubborn {
            refuse,
            written,
            incoming: tx,
        },
    )
}

#[tokio::test(start_paused = true)]
async fn test_would_block_budget_exhausted() {
    let (port, dev) = stubborn_port(&PortConfig::for_device("stubborn"), usize::MAX);
    let mut events = port.subscribe();

    let r = port.command(b"A".to_vec(), LONG, false).await;
    assert!(matches!(r, Err(PortError::SendFailed(_))));
    assert_eq!(events.recv().await.unwrap(), PortEvent::TimedOut { consecutive: 1 });
    // 1000 attempts at most
    assert_eq!(dev.refuse.load(Ordering::SeqCst), usize::MAX - 1000);
    assert!(dev.written.lock().unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_would_block_recovers() {
    let (port, dev) = stubborn_port(&PortConfig::for_device("stubborn"), 5);
    let pending = port.enqueue(b"HELLO".to_vec(), LONG, false);

    // Wait until the command made it out
    while dev.written.lock().unwrap().len() < 5 {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    dev.incoming.send(b"hi\n".to_vec()).unwrap();
    assert_eq!(pending.await.unwrap(), b"hi".to_vec());
    assert_eq!(*dev.written.lock().unwrap(), b"HELLO".to_vec());
}

#[tokio::test(start_paused = true)]
async fn test_byte_by_byte_with_send_delay() {
    let config = PortConfig {
        send_delay_us: 1000,
        ..PortConfig::for_device("slow")
    };
    let (port, dev) = stubborn_port(&config, 0);
    let started = tokio::time::Instant::now();
    let pending = port.enqueue(b"ABCD".to_vec(), LONG, false);

    while dev.written.lock().unwrap().len() < 4 {
        tokio::time::sleep(Duration::from_micros(100)).await;
    }
    // Three pauses between four bytes
    assert!(started.elapsed() >= Duration::from_millis(3));

    dev.incoming.send(b"ok\n".to_vec()).unwrap();
    assert_eq!(pending.await.unwrap(), b"ok".to_vec());
}
