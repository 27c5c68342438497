use std::sync::Arc;

use dashmap::DashMap;

use crate::handler::{HandlerFuture, HttpContext, HttpHandler, SharedHandler};
use crate::http::exchange::Exchange;
use crate::http::stream::BoxedReader;

/// Turns an encoded request body stream into a decoded one.
pub type StreamDecoder = Arc<dyn Fn(BoxedReader) -> BoxedReader + Send + Sync>;

/// Installs a decoder for the request's outermost transfer-coding, then
/// forwards to the next handler.
///
/// HTTP/1.0 requests pass through untouched. A coding with no registered
/// decoder leaves the body readable as raw bytes until the peer closes.
pub struct TransferEncodingHandler {
    next: HttpContext,
    decoders: DashMap<String, StreamDecoder>,
}

impl TransferEncodingHandler {
    pub fn new(next: Option<SharedHandler>) -> Self {
        Self {
            next: HttpContext::new(next),
            decoders: DashMap::new(),
        }
    }

    pub fn next(&self) -> &HttpContext {
        &self.next
    }

    /// Registers `decoder` for `coding` (case-insensitive), returning the one it replaced.
    pub fn register_decoder(&self, coding: &str, decoder: StreamDecoder) -> Option<StreamDecoder> {
        self.decoders.insert(coding.to_ascii_lowercase(), decoder)
    }

    pub fn remove_decoder(&self, coding: &str) -> Option<StreamDecoder> {
        self.decoders
            .remove(&coding.to_ascii_lowercase())
            .map(|(_, decoder)| decoder)
    }
}

/// The last coding listed in the last `Transfer-Encoding` value.
fn outermost_coding(exchange: &Exchange) -> Option<String> {
    let value = exchange.request_headers().get_last("Transfer-Encoding")?;
    let coding = value.rsplit(',').next()?.trim();
    (!coding.is_empty()).then(|| coding.to_ascii_lowercase())
}

impl HttpHandler for TransferEncodingHandler {
    fn handle_request(&self, mut exchange: Exchange) -> HandlerFuture {
        if exchange.is_http10() {
            return self.next.dispatch(exchange);
        }
        if let Some(coding) = outermost_coding(&exchange) {
            let decoder = self.decoders.get(&coding).map(|d| d.value().clone());
            match decoder {
                Some(decoder) => exchange.request_stream().wrap(|reader| decoder(reader)),
                None if coding == "identity" => {}
                None => {
                    tracing::debug!(coding = %coding, "no decoder for transfer-coding, body left raw");
                    exchange.request_stream().set_unframed();
                }
            }
        }
        self.next.dispatch(exchange)
    }
}
