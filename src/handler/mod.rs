//! Request handlers and the routing graph built from them.
//!
//! A handler receives an [`Exchange`] by value and returns a boxed future.
//! Routing nodes ([`NameVirtualHostHandler`], [`PathHandler`],
//! [`TransferEncodingHandler`]) are handlers themselves and forward through
//! [`HttpContext`] cells, so any part of the graph can be swapped at runtime.

use std::future::Future;
use std::io;
use std::pin::Pin;
use std::sync::Arc;

use thiserror::Error;

use crate::http::exchange::{Exchange, ExchangeError};
use crate::http::header_map::HeaderError;

pub mod context;
pub mod path;
pub mod transfer_encoding;
pub mod vhost;

pub use context::HttpContext;
pub use path::{PathContext, PathHandler};
pub use transfer_encoding::{StreamDecoder, TransferEncodingHandler};
pub use vhost::{NameVirtualHostContext, NameVirtualHostHandler};

pub type HandlerFuture = Pin<Box<dyn Future<Output = Result<(), HandlerError>> + Send + 'static>>;

pub trait HttpHandler: Send + Sync + 'static {
    fn handle_request(&self, exchange: Exchange) -> HandlerFuture;
}

pub type SharedHandler = Arc<dyn HttpHandler>;

/// Failure reported by a handler. The connection is closed without a response.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error(transparent)]
    Exchange(#[from] ExchangeError),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<HeaderError> for HandlerError {
    fn from(e: HeaderError) -> Self {
        HandlerError::Exchange(e.into())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistrationError {
    #[error("invalid host name: {0:?}")]
    InvalidHostName(String),
    #[error("host already registered: {0}")]
    DuplicateHost(String),
    #[error("invalid path prefix: {0:?}")]
    InvalidPath(String),
    #[error("path already registered: {0}")]
    DuplicatePath(String),
}

/// Adapts an async function into an [`HttpHandler`].
pub struct FnHandler<F>(F);

impl<F, Fut> HttpHandler for FnHandler<F>
where
    F: Fn(Exchange) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
{
    fn handle_request(&self, exchange: Exchange) -> HandlerFuture {
        Box::pin((self.0)(exchange))
    }
}

/// Wraps `f` as a shared handler.
pub fn handler_fn<F, Fut>(f: F) -> SharedHandler
where
    F: Fn(Exchange) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
{
    Arc::new(FnHandler(f))
}

async fn internal_error(exchange: Exchange) -> Result<(), HandlerError> {
    exchange.send_error_response(500).await?;
    Ok(())
}

/// Answers with an empty `500`. Used wherever routing finds no handler.
pub(crate) fn default_error(exchange: Exchange) -> HandlerFuture {
    Box::pin(internal_error(exchange))
}
