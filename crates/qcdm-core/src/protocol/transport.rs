//! Byte transport underneath a port
//!
//! The port IO task talks to the device only through [`Transport`], so a
//! real serial line and an in-memory pipe behave identically to the queue.

use std::io;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Asynchronous byte-level link to a device
#[async_trait]
pub trait Transport: Send {
    /// Write some of `data`, returning how many bytes were accepted.
    ///
    /// A full device buffer is reported as `Ok(0)` or an error of kind
    /// [`io::ErrorKind::WouldBlock`]; the caller retries.
    async fn send(&mut self, data: &[u8]) -> io::Result<usize>;

    /// Read whatever is available into `buf`.
    ///
    /// `Ok(0)` means the device hung up. Must be cancel-safe: the port
    /// drops a pending receive whenever it has something else to do.
    async fn receive(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Release the device
    async fn close(&mut self) -> io::Result<()>;
}

/// [`Transport`] over any async byte stream.
///
/// Covers `tokio_serial::SerialStream` as well as `tokio::io::DuplexStream`,
/// which the tests use as a fake modem.
#[derive(Debug)]
pub struct StreamTransport<S> {
    stream: S,
}

impl<S> StreamTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    pub fn new(stream: S) -> Self {
        Self { stream }
    }

    /// Give back the wrapped stream
    pub fn into_inner(self) -> S {
        self.stream
    }
}

#[async_trait]
impl<S> Transport for StreamTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn send(&mut self, data: &[u8]) -> io::Result<usize> {
        let n = self.stream.write(data).await?;
        self.stream.flush().await?;
        Ok(n)
    }

    async fn receive(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.stream.read(buf).await
    }

    async fn close(&mut self) -> io::Result<()> {
        self.stream.shutdown().await
    }
}
