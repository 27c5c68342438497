//! Byte streams handed to handlers.
//!
//! While an exchange is in flight it owns both halves of the connection: the
//! [`RequestStream`] holds the read half together with any bytes already
//! buffered, the [`ResponseStream`] holds the write half. Both are handed back
//! to the connection when the exchange completes.

use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, ready};

use bytes::{Buf, BufMut, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufWriter, ReadBuf, Take};

use crate::http::connection::{ConnectionInfo, ConnectionState};
use crate::pool::PooledBuffer;

pub type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;
pub type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

pub(crate) type Outbound = BufWriter<BoxedWriter>;

fn closed_error() -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, "connection closed")
}

fn released_error() -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, "stream released")
}

/// Read half of a connection plus its pooled read buffer. Buffered bytes are
/// served before the channel is read again.
pub(crate) struct Inbound {
    reader: BoxedReader,
    buffer: PooledBuffer,
}

impl Inbound {
    pub(crate) fn new(reader: BoxedReader, buffer: PooledBuffer) -> Self {
        Self { reader, buffer }
    }

    pub(crate) fn buffer_mut(&mut self) -> &mut BytesMut {
        &mut self.buffer
    }

    pub(crate) fn has_buffered(&self) -> bool {
        !self.buffer.is_empty()
    }

    /// Reads once from the channel into the free part of the buffer.
    /// Returns 0 at end of stream.
    pub(crate) async fn fill(&mut self) -> io::Result<usize> {
        let limit = self.buffer.size_limit();
        let start = self.buffer.len();
        if start >= limit {
            return Err(io::Error::new(io::ErrorKind::InvalidData, "read buffer full"));
        }
        let free = limit - start;
        self.buffer.reserve(free);
        let mut spare = (&mut *self.buffer).limit(free);
        self.reader.read_buf(&mut spare).await
    }
}

impl AsyncRead for Inbound {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = &mut *self;
        if !this.buffer.is_empty() {
            let n = this.buffer.len().min(buf.remaining());
            buf.put_slice(&this.buffer[..n]);
            this.buffer.advance(n);
            return Poll::Ready(Ok(()));
        }
        Pin::new(&mut this.reader).poll_read(cx, buf)
    }
}

/// How the request body is delimited on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyFraming {
    /// No body.
    Empty,
    /// `Content-Length` bytes.
    Length(u64),
    /// Runs until the peer closes; the connection cannot be reused.
    Unframed,
}

enum Source {
    Raw { inner: Take<Inbound>, framed: bool },
    Wrapped(BoxedReader),
    Released,
}

/// The request body as an [`AsyncRead`].
///
/// Reads past the body's framing return end of stream. Once the connection is
/// closed every read fails with `NotConnected`.
pub struct RequestStream {
    source: Source,
    info: Arc<ConnectionInfo>,
    touched: bool,
}

impl RequestStream {
    pub(crate) fn new(inbound: Inbound, framing: BodyFraming, info: Arc<ConnectionInfo>) -> Self {
        let (limit, framed) = match framing {
            BodyFraming::Empty => (0, true),
            BodyFraming::Length(n) => (n, true),
            BodyFraming::Unframed => (u64::MAX, false),
        };
        Self {
            source: Source::Raw {
                inner: inbound.take(limit),
                framed,
            },
            info,
            touched: false,
        }
    }

    /// Body bytes still unread, when the body is length-delimited.
    pub fn remaining(&self) -> Option<u64> {
        match &self.source {
            Source::Raw { inner, framed: true } => Some(inner.limit()),
            _ => None,
        }
    }

    /// True when nothing has been read from the stream yet.
    pub fn is_untouched(&self) -> bool {
        !self.touched
    }

    /// True while the stream still reads the connection directly.
    pub fn is_raw(&self) -> bool {
        matches!(self.source, Source::Raw { .. })
    }

    /// Replaces the readable stream with `decode(current)`. The connection
    /// cannot be reused afterwards.
    pub fn wrap<F>(&mut self, decode: F)
    where
        F: FnOnce(BoxedReader) -> BoxedReader,
    {
        let current: BoxedReader = match std::mem::replace(&mut self.source, Source::Released) {
            Source::Raw { inner, .. } => Box::new(inner),
            Source::Wrapped(reader) => reader,
            Source::Released => return,
        };
        self.source = Source::Wrapped(decode(current));
    }

    /// Drops the body framing; reads continue until the peer closes.
    pub fn set_unframed(&mut self) {
        if let Source::Raw { inner, framed } = &mut self.source {
            inner.set_limit(u64::MAX);
            *framed = false;
        }
    }

    /// Gives the read half back. The flag tells whether the body was fully
    /// consumed so the next request can be parsed from the same buffer.
    pub(crate) fn release(&mut self) -> (Option<Inbound>, bool) {
        match std::mem::replace(&mut self.source, Source::Released) {
            Source::Raw { inner, framed } => {
                let drained = framed && inner.limit() == 0;
                (Some(inner.into_inner()), drained)
            }
            Source::Wrapped(_) | Source::Released => (None, false),
        }
    }
}

impl AsyncRead for RequestStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = &mut *self;
        if this.info.is_closed() {
            return Poll::Ready(Err(closed_error()));
        }
        this.touched = true;
        match &mut this.source {
            Source::Raw { inner, .. } => Pin::new(inner).poll_read(cx, buf),
            Source::Wrapped(reader) => Pin::new(reader).poll_read(cx, buf),
            Source::Released => Poll::Ready(Err(released_error())),
        }
    }
}

/// The response body as an [`AsyncWrite`].
///
/// Available once the response head has been sent. Writes beyond a declared
/// `Content-Length` are rejected; for `HEAD` requests and bodiless statuses
/// body bytes are accepted and dropped.
pub struct ResponseStream {
    sink: Option<Outbound>,
    info: Arc<ConnectionInfo>,
    declared: Option<u64>,
    written: u64,
    discard_body: bool,
}

impl ResponseStream {
    pub(crate) fn new(sink: Outbound, info: Arc<ConnectionInfo>) -> Self {
        Self {
            sink: Some(sink),
            info,
            declared: None,
            written: 0,
            discard_body: false,
        }
    }

    pub(crate) fn set_body_rules(&mut self, declared: Option<u64>, discard_body: bool) {
        self.declared = declared;
        self.discard_body = discard_body;
    }

    /// Writes the status line and headers, bypassing body accounting.
    pub(crate) async fn write_head(&mut self, head: &[u8]) -> io::Result<()> {
        if self.info.is_closed() {
            return Err(closed_error());
        }
        let sink = self.sink.as_mut().ok_or_else(released_error)?;
        sink.write_all(head).await
    }

    /// Body bytes written so far.
    pub fn bytes_written(&self) -> u64 {
        self.written
    }

    /// True when the peer can tell where this response ends.
    pub(crate) fn is_delimited(&self) -> bool {
        self.discard_body || self.declared == Some(self.written)
    }

    pub(crate) fn release(&mut self) -> Option<Outbound> {
        self.sink.take()
    }
}

impl AsyncWrite for ResponseStream {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = &mut *self;
        if this.info.is_closed() {
            return Poll::Ready(Err(closed_error()));
        }
        if this.discard_body {
            return Poll::Ready(Ok(buf.len()));
        }
        if let Some(limit) = this.declared {
            if this.written + buf.len() as u64 > limit {
                return Poll::Ready(Err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    "response body exceeds Content-Length",
                )));
            }
        }
        let Some(sink) = this.sink.as_mut() else {
            return Poll::Ready(Err(released_error()));
        };
        let n = ready!(Pin::new(sink).poll_write(cx, buf))?;
        this.written += n as u64;
        Poll::Ready(Ok(n))
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = &mut *self;
        if this.info.is_closed() {
            return Poll::Ready(Err(closed_error()));
        }
        match this.sink.as_mut() {
            Some(sink) => Pin::new(sink).poll_flush(cx),
            None => Poll::Ready(Err(released_error())),
        }
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.sink.as_mut() {
            Some(sink) => Pin::new(sink).poll_shutdown(cx),
            None => Poll::Ready(Err(released_error())),
        }
    }
}

/// Full-duplex stream left after a `101 Switching Protocols` response.
///
/// Joins the request side (starting with any bytes the client sent after
/// the upgrade request) and the response side of the connection. Dropping it
/// closes the connection.
pub struct UpgradedChannel {
    inbound: Inbound,
    outbound: Outbound,
    info: Arc<ConnectionInfo>,
}

impl UpgradedChannel {
    pub(crate) fn new(inbound: Inbound, outbound: Outbound, info: Arc<ConnectionInfo>) -> Self {
        Self {
            inbound,
            outbound,
            info,
        }
    }

    pub fn connection(&self) -> &Arc<ConnectionInfo> {
        &self.info
    }
}

impl Drop for UpgradedChannel {
    fn drop(&mut self) {
        self.info.set_state(ConnectionState::Closed);
    }
}

impl AsyncRead for UpgradedChannel {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inbound).poll_read(cx, buf)
    }
}

impl AsyncWrite for UpgradedChannel {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.outbound).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.outbound).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.outbound).poll_shutdown(cx)
    }
}
