// src/connection/counting.rs

//! The client-connection surface: one stream type over plain TCP and TLS,
//! wrapped so every byte read or written lands in the process-wide traffic
//! counters. The counters are sampled and reset once a minute by the
//! traffic sampler task; the data path itself never blocks for bookkeeping.

use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tokio_rustls::server::TlsStream;

/// Bytes read from clients since the last sampler reset.
pub static IN_TRAFFIC_BYTES: AtomicU64 = AtomicU64::new(0);

/// Bytes written to clients since the last sampler reset.
pub static OUT_TRAFFIC_BYTES: AtomicU64 = AtomicU64::new(0);

/// Object-safe bundle of the stream traits both variants satisfy, so the
/// poll impls below delegate through one point instead of matching per
/// method.
trait Io: AsyncRead + AsyncWrite + Unpin {}
impl<T: AsyncRead + AsyncWrite + Unpin> Io for T {}

/// A client connection, plain TCP or TLS.
pub enum AnyStream {
    Tcp(TcpStream),
    Tls(Box<TlsStream<TcpStream>>),
}

impl AnyStream {
    fn io_mut(&mut self) -> &mut dyn Io {
        match self {
            AnyStream::Tcp(s) => s,
            AnyStream::Tls(s) => s.as_mut(),
        }
    }

    fn tcp(&self) -> &TcpStream {
        match self {
            AnyStream::Tcp(s) => s,
            AnyStream::Tls(s) => s.get_ref().0,
        }
    }

    /// The peer address of the underlying TCP connection.
    pub fn peer_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.tcp().peer_addr()
    }

    /// The local address of the underlying TCP connection.
    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.tcp().local_addr()
    }
}

impl AsyncRead for AnyStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        Pin::new(self.get_mut().io_mut()).poll_read(cx, buf)
    }
}

impl AsyncWrite for AnyStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<Result<usize, std::io::Error>> {
        Pin::new(self.get_mut().io_mut()).poll_write(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), std::io::Error>> {
        Pin::new(self.get_mut().io_mut()).poll_flush(cx)
    }

    fn poll_shutdown(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Result<(), std::io::Error>> {
        Pin::new(self.get_mut().io_mut()).poll_shutdown(cx)
    }
}

/// A pass-through stream that counts traffic in both directions.
pub struct CountingStream<S = AnyStream> {
    inner: S,
    is_closed: AtomicBool,
}

impl CountingStream<AnyStream> {
    /// Wraps a client connection. With `quick_close`, the connection gets a
    /// 3-second linger so closing does not strand the accept loop behind
    /// slow peers.
    pub fn new(inner: AnyStream, quick_close: bool) -> Self {
        if quick_close {
            let _ = inner.tcp().set_linger(Some(Duration::from_secs(3)));
        }
        Self {
            inner,
            is_closed: AtomicBool::new(false),
        }
    }

    pub fn peer_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.inner.peer_addr()
    }

    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.inner.local_addr()
    }
}

impl<S> CountingStream<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Wraps an arbitrary byte stream without connection-level options.
    pub fn wrap(inner: S) -> Self {
        Self {
            inner,
            is_closed: AtomicBool::new(false),
        }
    }

    /// Whether shutdown has completed at least once.
    pub fn is_closed(&self) -> bool {
        self.is_closed.load(Ordering::Relaxed)
    }

    pub fn get_ref(&self) -> &S {
        &self.inner
    }
}

impl<S> AsyncRead for CountingStream<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        let this = self.get_mut();
        let before = buf.filled().len();
        let result = Pin::new(&mut this.inner).poll_read(cx, buf);
        if let Poll::Ready(Ok(())) = &result {
            let n = buf.filled().len() - before;
            if n > 0 {
                IN_TRAFFIC_BYTES.fetch_add(n as u64, Ordering::Relaxed);
            }
        }
        result
    }
}

impl<S> AsyncWrite for CountingStream<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<Result<usize, std::io::Error>> {
        let this = self.get_mut();
        let result = Pin::new(&mut this.inner).poll_write(cx, buf);
        if let Poll::Ready(Ok(n)) = &result
            && *n > 0
        {
            OUT_TRAFFIC_BYTES.fetch_add(*n as u64, Ordering::Relaxed);
        }
        result
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), std::io::Error>> {
        Pin::new(&mut self.get_mut().inner).poll_flush(cx)
    }

    fn poll_shutdown(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Result<(), std::io::Error>> {
        let this = self.get_mut();
        let result = Pin::new(&mut this.inner).poll_shutdown(cx);
        if let Poll::Ready(Ok(())) = &result {
            this.is_closed.store(true, Ordering::Relaxed);
        }
        result
    }
}
