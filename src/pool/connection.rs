use crate::origin::Origin;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Instant;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;
use uuid::Uuid;

/// The lifecycle state of a pooled connection.
///
/// `TcpStream`/`TlsStream` expose no such state themselves, so the pool
/// tracks it explicitly, advancing it at the call sites that observe the
/// underlying socket transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnState {
    Connecting,
    Established,
    Closing,
    Closed,
}

/// Either side of the TLS fork, unified behind one `AsyncRead + AsyncWrite`
/// type so request serialisation/parsing code (`protocol::*`) never needs to
/// know which transport it's driving.
pub enum Transport {
    Plain(TcpStream),
    Tls(Box<TlsStream<TcpStream>>),
}

impl AsyncRead for Transport {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            Transport::Plain(s) => Pin::new(s).poll_read(cx, buf),
            Transport::Tls(s) => Pin::new(s.as_mut()).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for Transport {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        match self.get_mut() {
            Transport::Plain(s) => Pin::new(s).poll_write(cx, buf),
            Transport::Tls(s) => Pin::new(s.as_mut()).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            Transport::Plain(s) => Pin::new(s).poll_flush(cx),
            Transport::Tls(s) => Pin::new(s.as_mut()).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            Transport::Plain(s) => Pin::new(s).poll_shutdown(cx),
            Transport::Tls(s) => Pin::new(s.as_mut()).poll_shutdown(cx),
        }
    }
}

/// A pooled connection. Ownership transfers between the pool's idle set
/// and whichever request currently has it checked out; it is never shared.
pub struct PooledConnection {
    pub id: Uuid,
    pub origin: Origin,
    pub transport: Transport,
    pub state: ConnState,
    pub connect_time: Instant,
    pub idle_time: Option<Instant>,
    pub request_time: Option<Instant>,
}

impl PooledConnection {
    pub fn new(origin: Origin, transport: Transport) -> Self {
        let now = Instant::now();
        Self {
            id: Uuid::new_v4(),
            origin,
            transport,
            state: ConnState::Established,
            connect_time: now,
            idle_time: None,
            request_time: None,
        }
    }

    pub fn mark_handed_out(&mut self) {
        self.request_time = Some(Instant::now());
        self.idle_time = None;
    }

    pub fn mark_idle(&mut self) {
        self.idle_time = Some(Instant::now());
        self.request_time = None;
    }

    pub fn is_idle_expired(&self, keepalive_timeout: std::time::Duration) -> bool {
        match self.idle_time {
            Some(t) => t.elapsed() >= keepalive_timeout,
            None => false,
        }
    }
}
