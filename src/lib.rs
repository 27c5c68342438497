//! Inlet - HTTP/1.x server core
//!
//! Incremental request parsing, exchanges passed to async handlers, and a
//! routing graph of virtual-host, path and transfer-coding handlers.

pub mod config;
pub mod handler;
pub mod http;
pub mod pool;
pub mod server;
