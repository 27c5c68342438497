//! HTTP/1.x protocol implementation.
//!
//! # Architecture
//!
//! - **`parser`**: Incremental request-line and header parser fed from a byte buffer
//! - **`header_map`**: Case-insensitive, order-preserving multi-valued headers
//! - **`method`**: Request methods
//! - **`exchange`**: One request and its response, handed to handlers by value
//! - **`stream`**: Request body, response body and upgraded channel streams
//! - **`connection`**: Per-connection loop and lifecycle state
//! - **`writer`**: Status line and header serialization
//! - **`attachments`**: Typed values hung off connections and exchanges
//!
//! # Connection State Machine
//!
//! ```text
//!        ┌──────────────────────┐
//!        │  ParsingRequestLine  │ ← Accepted, or previous response complete
//!        └──────────┬───────────┘
//!                   │ CRLF after protocol
//!                   ▼
//!        ┌──────────────────────┐
//!        │    ParsingHeaders    │
//!        └──────────┬───────────┘
//!                   │ empty line
//!                   ▼
//!        ┌──────────────────────┐
//!        │ RequestReady         │
//!        │  → Dispatched        │ ← handler owns the exchange
//!        └──────────┬───────────┘
//!                   │ start_response
//!                   ▼
//!        ┌──────────────────────┐
//!        │   ResponseStarted    │
//!        └──────────┬───────────┘
//!                   │ exchange dropped
//!                   ▼
//!        ┌──────────────────────┐
//!        │   ResponseComplete   │
//!        └──────────┬───────────┘
//!                   ├─ Persistent → ParsingRequestLine (same buffer)
//!                   ├─ 101 → Upgraded (channel handed to the handler)
//!                   └─ Close → Closed
//! ```
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use inlet::config::Config;
//! use inlet::handler::{HandlerError, handler_fn};
//! use inlet::http::exchange::Exchange;
//! use inlet::server::Server;
//! use tokio::net::TcpListener;
//!
//! async fn hello(exchange: Exchange) -> Result<(), HandlerError> {
//!     exchange.send_response(200, "hello\n").await?;
//!     Ok(())
//! }
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let server = Arc::new(Server::new(&Config::default()));
//!     server.root().set_handler(Some(handler_fn(hello)));
//!
//!     let listener = TcpListener::bind("127.0.0.1:8080").await?;
//!     loop {
//!         let (socket, peer) = listener.accept().await?;
//!         let local = socket.local_addr().ok();
//!         let server = server.clone();
//!         tokio::spawn(async move {
//!             if let Err(e) = server.serve_connection(socket, Some(peer), local).await {
//!                 eprintln!("connection error: {e}");
//!             }
//!         });
//!     }
//! }
//! ```

pub mod attachments;
pub mod connection;
pub mod exchange;
pub mod header_map;
pub mod method;
pub mod parser;
pub mod stream;
pub mod writer;
