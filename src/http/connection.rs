use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, BufWriter};
use tracing::{debug, trace};

use crate::handler::HandlerError;
use crate::http::attachments::Attachments;
use crate::http::exchange::{Completion, Exchange, Outcome};
use crate::http::parser::{ParseError, ParseStatus, ParsedRequest, RequestParser};
use crate::http::stream::{BodyFraming, BoxedReader, BoxedWriter, Inbound, Outbound};
use crate::http::writer;
use crate::pool::{PoolError, PooledBuffer};
use crate::server::Server;

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Where a connection is in its request/response cycle.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Accepted,
    ParsingRequestLine,
    ParsingHeaders,
    RequestReady,
    Dispatched,
    ResponseStarted,
    ResponseComplete,
    /// Handed over to an upgraded channel; no longer driven by the server.
    Upgraded,
    Closed,
}

impl ConnectionState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => ConnectionState::Accepted,
            1 => ConnectionState::ParsingRequestLine,
            2 => ConnectionState::ParsingHeaders,
            3 => ConnectionState::RequestReady,
            4 => ConnectionState::Dispatched,
            5 => ConnectionState::ResponseStarted,
            6 => ConnectionState::ResponseComplete,
            7 => ConnectionState::Upgraded,
            _ => ConnectionState::Closed,
        }
    }
}

/// The parts of a connection shared with its exchanges and streams.
#[derive(Debug)]
pub struct ConnectionInfo {
    id: u64,
    peer_addr: Option<SocketAddr>,
    local_addr: Option<SocketAddr>,
    state: AtomicU8,
    attachments: Attachments,
}

impl ConnectionInfo {
    pub fn new(peer_addr: Option<SocketAddr>, local_addr: Option<SocketAddr>) -> Self {
        Self {
            id: NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed),
            peer_addr,
            local_addr,
            state: AtomicU8::new(ConnectionState::Accepted as u8),
            attachments: Attachments::new(),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer_addr
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    pub fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn is_closed(&self) -> bool {
        self.state() == ConnectionState::Closed
    }

    /// Values that live as long as the connection.
    pub fn attachments(&self) -> &Attachments {
        &self.attachments
    }

    pub(crate) fn set_state(&self, state: ConnectionState) {
        // Closed is terminal
        let _ = self
            .state
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                (current != ConnectionState::Closed as u8).then_some(state as u8)
            });
    }
}

#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("protocol error: {0}")]
    Protocol(#[from] ParseError),
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
    #[error("no read buffer: {0}")]
    Pool(#[from] PoolError),
    #[error("handler failed: {0}")]
    Handler(#[from] HandlerError),
    #[error("exchange abandoned by its handler")]
    Abandoned,
}

impl ConnectionError {
    /// Short label for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            ConnectionError::Protocol(_) => "protocol",
            ConnectionError::Io(_) | ConnectionError::Pool(_) => "resource",
            ConnectionError::Handler(_) | ConnectionError::Abandoned => "handler",
        }
    }
}

/// Drives one client connection: parse a request, dispatch it, wait for the
/// exchange to finish, then either parse the next request or close.
pub struct Connection {
    info: Arc<ConnectionInfo>,
    server: Arc<Server>,
    parser: RequestParser,
    inbound: Option<Inbound>,
    outbound: Option<Outbound>,
    flush_pending: bool,
}

impl Connection {
    pub fn new<S>(
        stream: S,
        info: Arc<ConnectionInfo>,
        buffer: PooledBuffer,
        server: Arc<Server>,
    ) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (reader, writer) = tokio::io::split(stream);
        let reader: BoxedReader = Box::new(reader);
        let writer: BoxedWriter = Box::new(writer);
        Self {
            parser: RequestParser::new(server.limits()),
            inbound: Some(Inbound::new(reader, buffer)),
            outbound: Some(BufWriter::new(writer)),
            info,
            server,
            flush_pending: false,
        }
    }

    pub fn info(&self) -> &Arc<ConnectionInfo> {
        &self.info
    }

    pub async fn run(mut self) -> Result<(), ConnectionError> {
        debug!(conn = self.info.id, peer = ?self.info.peer_addr, "connection accepted");
        let result = self.serve().await;
        self.close().await;
        result
    }

    async fn serve(&mut self) -> Result<(), ConnectionError> {
        loop {
            let status = match self.inbound.as_mut() {
                Some(inbound) => self.parser.feed(inbound.buffer_mut())?,
                None => return Ok(()),
            };

            match status {
                ParseStatus::NeedMoreData => {
                    if self.parser.in_headers() {
                        self.info.set_state(ConnectionState::ParsingHeaders);
                    } else if !self.parser.is_idle() {
                        self.info.set_state(ConnectionState::ParsingRequestLine);
                    }

                    if self.flush_pending {
                        self.flush().await?;
                    }

                    let read = match self.inbound.as_mut() {
                        Some(inbound) => inbound.fill().await?,
                        None => return Ok(()),
                    };
                    if read == 0 {
                        if !self.parser.is_idle() {
                            debug!(conn = self.info.id, "peer closed mid-request");
                        }
                        return Ok(());
                    }
                    if self.info.state() == ConnectionState::Accepted {
                        self.info.set_state(ConnectionState::ParsingRequestLine);
                    }
                }
                ParseStatus::RequestReady(request) => {
                    self.info.set_state(ConnectionState::RequestReady);
                    if !self.dispatch(request).await? {
                        return Ok(());
                    }
                }
            }
        }
    }

    /// Runs one exchange. Returns whether the connection stays open.
    async fn dispatch(&mut self, request: ParsedRequest) -> Result<bool, ConnectionError> {
        let framing = BodyFraming::from_request(&request)?;
        // Earlier responses must be on the wire before a handler can stall.
        if self.flush_pending {
            self.flush().await?;
        }
        let (Some(inbound), Some(outbound)) = (self.inbound.take(), self.outbound.take()) else {
            return Ok(false);
        };

        trace!(
            conn = self.info.id,
            method = %request.method,
            uri = %request.uri,
            "dispatching request"
        );
        let (exchange, mut done) = Exchange::new(
            request,
            framing,
            self.info.clone(),
            self.server.options(),
            inbound,
            outbound,
        );
        self.info.set_state(ConnectionState::Dispatched);
        if let Err(e) = self.server.root().dispatch(exchange).await {
            // an exchange the handler dropped hands the channel back for shutdown
            if let Ok(completion) = done.try_recv() {
                self.inbound = completion.inbound;
                self.outbound = completion.outbound;
            }
            return Err(e.into());
        }

        let completion = done.await.map_err(|_| ConnectionError::Abandoned)?;
        self.complete(completion).await
    }

    async fn complete(&mut self, completion: Completion) -> Result<bool, ConnectionError> {
        let Completion {
            inbound,
            outbound,
            outcome,
        } = completion;
        self.inbound = inbound;
        self.outbound = outbound;

        let persistent = match outcome {
            Outcome::Upgraded => {
                debug!(conn = self.info.id, "connection upgraded");
                return Ok(false);
            }
            Outcome::Incomplete => {
                debug!(conn = self.info.id, "response left unfinished");
                false
            }
            Outcome::Complete { persistent } => persistent,
            Outcome::Unanswered { persistent } => {
                let Some(outbound) = self.outbound.as_mut() else {
                    return Ok(false);
                };
                self.info.set_state(ConnectionState::ResponseStarted);
                outbound
                    .write_all(&writer::default_error(500, persistent))
                    .await?;
                persistent
            }
        };
        self.info.set_state(ConnectionState::ResponseComplete);

        if !persistent || self.inbound.is_none() || self.outbound.is_none() {
            return Ok(false);
        }

        // With pipelining, the next buffered request is parsed before this
        // response is flushed.
        let more_buffered = self.inbound.as_ref().is_some_and(Inbound::has_buffered);
        if self.server.options().pipelining && more_buffered {
            self.flush_pending = true;
        } else {
            self.flush().await?;
        }
        self.info.set_state(ConnectionState::ParsingRequestLine);
        Ok(true)
    }

    async fn flush(&mut self) -> io::Result<()> {
        self.flush_pending = false;
        match self.outbound.as_mut() {
            Some(outbound) => outbound.flush().await,
            None => Ok(()),
        }
    }

    async fn close(&mut self) {
        if self.info.state() == ConnectionState::Upgraded {
            return;
        }
        if let Some(mut outbound) = self.outbound.take() {
            let _ = outbound.flush().await;
            let _ = outbound.shutdown().await;
        }
        self.inbound = None;
        self.info.set_state(ConnectionState::Closed);
        debug!(conn = self.info.id, "connection closed");
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        if self.info.state() != ConnectionState::Upgraded {
            self.info.set_state(ConnectionState::Closed);
        }
    }
}
