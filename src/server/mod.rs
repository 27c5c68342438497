use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite};

use crate::config::{Config, HttpOptions};
use crate::handler::HttpContext;
use crate::http::connection::{Connection, ConnectionError, ConnectionInfo};
use crate::http::parser::ParserLimits;
use crate::pool::BufferPool;

pub mod listener;

/// Everything connections share: options, parser limits, the read buffer
/// pool and the root of the handler graph.
#[derive(Debug)]
pub struct Server {
    options: HttpOptions,
    limits: ParserLimits,
    pool: BufferPool,
    root: HttpContext,
}

impl Server {
    pub fn new(config: &Config) -> Self {
        Self {
            pool: BufferPool::from_config(config.http.receive_buffer_size, &config.buffer_pool),
            options: config.http.clone(),
            limits: config.limits,
            root: HttpContext::empty(),
        }
    }

    pub fn options(&self) -> &HttpOptions {
        &self.options
    }

    pub fn limits(&self) -> ParserLimits {
        self.limits
    }

    pub fn pool(&self) -> &BufferPool {
        &self.pool
    }

    /// Every request is dispatched through this context.
    pub fn root(&self) -> &HttpContext {
        &self.root
    }

    /// Serves `stream` until it closes or is upgraded. Works over any
    /// duplex byte stream, not only TCP.
    pub async fn serve_connection<S>(
        self: Arc<Self>,
        stream: S,
        peer: Option<SocketAddr>,
        local: Option<SocketAddr>,
    ) -> Result<(), ConnectionError>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let buffer = self.pool.acquire().await?;
        let info = Arc::new(ConnectionInfo::new(peer, local));
        Connection::new(stream, info, buffer, self).run().await
    }
}
