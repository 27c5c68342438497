//! One request/response interaction.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::sync::oneshot;
use url::Url;

use crate::config::HttpOptions;
use crate::http::attachments::Attachments;
use crate::http::connection::{ConnectionInfo, ConnectionState};
use crate::http::header_map::{HeaderError, HeaderMap};
use crate::http::method::Method;
use crate::http::parser::{ParseError, ParsedRequest};
use crate::http::stream::{
    BodyFraming, Inbound, Outbound, RequestStream, ResponseStream, UpgradedChannel,
};
use crate::http::writer::{is_bodiless, serialize_head};

#[derive(Debug, Error)]
pub enum ExchangeError {
    #[error("response already started")]
    ResponseStarted,
    #[error("response not started")]
    ResponseNotStarted,
    #[error("request body already read")]
    RequestBodyRead,
    #[error("request stream replaced by a decoder")]
    RequestStreamWrapped,
    #[error("websocket upgrades are disabled")]
    WebSocketDisabled,
    #[error(transparent)]
    Header(#[from] HeaderError),
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// What the connection gets back when an exchange is dropped.
pub(crate) struct Completion {
    pub(crate) inbound: Option<Inbound>,
    pub(crate) outbound: Option<Outbound>,
    pub(crate) outcome: Outcome,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Outcome {
    /// The response was ended.
    Complete { persistent: bool },
    /// No response was started; the connection answers with the default error.
    Unanswered { persistent: bool },
    /// A response was started but never ended.
    Incomplete,
    /// The connection now belongs to an [`UpgradedChannel`].
    Upgraded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Dispatched,
    ResponseStarted,
    ResponseComplete,
    Upgraded,
}

impl BodyFraming {
    /// Works out how the body of `request` is delimited.
    ///
    /// `Transfer-Encoding` wins over `Content-Length` on HTTP/1.1; the body is
    /// then read until the peer closes unless a decoder takes over.
    pub fn from_request(request: &ParsedRequest) -> Result<Self, ParseError> {
        if request.protocol != "HTTP/1.0" && request.headers.contains("Transfer-Encoding") {
            return Ok(BodyFraming::Unframed);
        }
        let mut length = None;
        for value in request.headers.get_all("Content-Length") {
            let value = value.trim();
            if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
                return Err(ParseError::InvalidContentLength);
            }
            let parsed = value
                .parse::<u64>()
                .map_err(|_| ParseError::InvalidContentLength)?;
            match length {
                Some(previous) if previous != parsed => {
                    return Err(ParseError::InvalidContentLength);
                }
                _ => length = Some(parsed),
            }
        }
        Ok(match length {
            None | Some(0) => BodyFraming::Empty,
            Some(n) => BodyFraming::Length(n),
        })
    }
}

/// Splits a request target into scheme, host, path and query.
struct Target {
    scheme: Option<String>,
    host: Option<String>,
    path: String,
    query: Option<String>,
}

impl Target {
    fn parse(uri: &str) -> Self {
        if uri.starts_with('/') || uri == "*" {
            let (path, query) = split_query(uri);
            return Self {
                scheme: None,
                host: None,
                path,
                query,
            };
        }
        if let Ok(url) = Url::parse(uri) {
            if url.has_host() {
                // The path is kept as sent so both target forms route alike.
                let (mut path, query) = split_query(raw_path(uri));
                if path.is_empty() {
                    path.push('/');
                }
                return Self {
                    scheme: Some(url.scheme().to_string()),
                    host: url.host_str().map(str::to_string),
                    path,
                    query,
                };
            }
        }
        // authority-form, as sent with CONNECT
        Self {
            scheme: None,
            host: Some(strip_port(uri).to_string()),
            path: uri.to_string(),
            query: None,
        }
    }
}

fn split_query(target: &str) -> (String, Option<String>) {
    match target.split_once('?') {
        Some((path, query)) => (path.to_string(), Some(query.to_string())),
        None => (target.to_string(), None),
    }
}

/// Path and query of an absolute-form target, without scheme and authority.
fn raw_path(uri: &str) -> &str {
    let after_scheme = uri.split_once("://").map_or(uri, |(_, rest)| rest);
    after_scheme
        .find(['/', '?'])
        .map_or("", |at| &after_scheme[at..])
}

/// Drops a trailing `:port`, keeping IPv6 literals in brackets intact.
pub(crate) fn strip_port(authority: &str) -> &str {
    if authority.starts_with('[') {
        return authority
            .find(']')
            .map_or(authority, |end| &authority[..=end]);
    }
    match authority.rsplit_once(':') {
        Some((host, port)) if port.bytes().all(|b| b.is_ascii_digit()) => host,
        _ => authority,
    }
}

fn request_allows_persistence(protocol: &str, headers: &HeaderMap, keepalive: bool) -> bool {
    if !keepalive || headers.contains_token("Connection", "close") {
        return false;
    }
    match protocol {
        "HTTP/1.1" => true,
        "HTTP/1.0" => headers.contains_token("Connection", "keep-alive"),
        _ => false,
    }
}

/// A single request and its response, handed to handlers by value.
///
/// Handlers finish an exchange through one of its consuming methods
/// ([`end_response`](Self::end_response), [`send_response`](Self::send_response),
/// [`send_error_response`](Self::send_error_response) or
/// [`upgrade_channel`](Self::upgrade_channel)). An exchange dropped before any
/// response was started gets the default `500` response from its connection;
/// one dropped halfway through a response closes the connection.
pub struct Exchange {
    method: Method,
    uri: String,
    protocol: String,
    scheme: String,
    path: String,
    query: Option<String>,
    host: Option<String>,
    relative_path: String,
    request_headers: HeaderMap,
    response_headers: HeaderMap,
    status: u16,
    request: RequestStream,
    response: ResponseStream,
    connection: Arc<ConnectionInfo>,
    attachments: Attachments,
    phase: Phase,
    persistent: bool,
    websocket_enabled: bool,
    completion: Option<oneshot::Sender<Completion>>,
}

impl Exchange {
    pub(crate) fn new(
        request: ParsedRequest,
        framing: BodyFraming,
        connection: Arc<ConnectionInfo>,
        options: &HttpOptions,
        inbound: Inbound,
        outbound: Outbound,
    ) -> (Self, oneshot::Receiver<Completion>) {
        let ParsedRequest {
            method,
            uri,
            protocol,
            headers,
        } = request;

        let target = Target::parse(&uri);
        let scheme = options
            .uri_scheme
            .clone()
            .or(target.scheme)
            .unwrap_or_else(|| "http".to_string());
        let host = target
            .host
            .or_else(|| headers.get_first("Host").map(|h| strip_port(h.trim()).to_string()))
            .filter(|h| !h.is_empty());
        let persistent = request_allows_persistence(&protocol, &headers, options.keepalive);

        let (tx, rx) = oneshot::channel();
        let exchange = Self {
            method,
            scheme,
            relative_path: target.path.clone(),
            path: target.path,
            query: target.query,
            host,
            protocol,
            uri,
            request_headers: headers,
            response_headers: HeaderMap::new(),
            status: 200,
            request: RequestStream::new(inbound, framing, connection.clone()),
            response: ResponseStream::new(outbound, connection.clone()),
            connection,
            attachments: Attachments::new(),
            phase: Phase::Dispatched,
            persistent,
            websocket_enabled: options.websocket_enabled,
            completion: Some(tx),
        };
        (exchange, rx)
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    /// The request target exactly as received.
    pub fn request_uri(&self) -> &str {
        &self.uri
    }

    pub fn protocol(&self) -> &str {
        &self.protocol
    }

    pub fn is_http09(&self) -> bool {
        self.protocol == "HTTP/0.9"
    }

    pub fn is_http10(&self) -> bool {
        self.protocol == "HTTP/1.0"
    }

    pub fn is_http11(&self) -> bool {
        self.protocol == "HTTP/1.1"
    }

    pub fn request_scheme(&self) -> &str {
        &self.scheme
    }

    /// Path part of the request target, without the query string.
    pub fn request_path(&self) -> &str {
        &self.path
    }

    pub fn query_string(&self) -> Option<&str> {
        self.query.as_deref()
    }

    /// Host the request was addressed to, without port.
    pub fn host(&self) -> Option<&str> {
        self.host.as_deref()
    }

    /// The path still to be routed. Path handlers strip the prefix they
    /// matched before dispatching further.
    pub fn relative_path(&self) -> &str {
        &self.relative_path
    }

    pub fn set_relative_path(&mut self, path: impl Into<String>) {
        self.relative_path = path.into();
    }

    pub fn request_headers(&self) -> &HeaderMap {
        &self.request_headers
    }

    pub fn request_headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.request_headers
    }

    pub fn response_headers(&self) -> &HeaderMap {
        &self.response_headers
    }

    /// Response headers are locked once the response starts; edits after
    /// that point fail with [`HeaderError::Locked`].
    pub fn response_headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.response_headers
    }

    pub fn response_code(&self) -> u16 {
        self.status
    }

    pub fn set_response_code(&mut self, status: u16) -> Result<(), ExchangeError> {
        if self.phase != Phase::Dispatched {
            return Err(ExchangeError::ResponseStarted);
        }
        self.status = status;
        Ok(())
    }

    pub fn is_response_started(&self) -> bool {
        self.phase != Phase::Dispatched
    }

    pub fn connection(&self) -> &Arc<ConnectionInfo> {
        &self.connection
    }

    pub fn source_address(&self) -> Option<SocketAddr> {
        self.connection.peer_addr()
    }

    pub fn destination_address(&self) -> Option<SocketAddr> {
        self.connection.local_addr()
    }

    /// Values scoped to this exchange.
    pub fn attachments(&self) -> &Attachments {
        &self.attachments
    }

    pub fn request_stream(&mut self) -> &mut RequestStream {
        &mut self.request
    }

    pub fn response_stream(&mut self) -> Result<&mut ResponseStream, ExchangeError> {
        if self.phase == Phase::Dispatched {
            return Err(ExchangeError::ResponseNotStarted);
        }
        Ok(&mut self.response)
    }

    /// Sends the status line and headers. Headers are locked from here on.
    pub async fn start_response(&mut self) -> Result<(), ExchangeError> {
        if self.phase != Phase::Dispatched {
            return Err(ExchangeError::ResponseStarted);
        }

        let declared = self
            .response_headers
            .get_first("Content-Length")
            .and_then(|v| v.trim().parse::<u64>().ok());
        let discard_body = self.method == Method::Head || is_bodiless(self.status);

        if self.status != 101 {
            self.persistent = self.persistent
                && (declared.is_some() || discard_body)
                && !self.response_headers.contains_token("Connection", "close");
            if !self.persistent {
                self.response_headers.put("Connection", "close")?;
            } else if self.is_http10() {
                self.response_headers.put("Connection", "keep-alive")?;
            }
        }
        self.response_headers.lock();
        self.response.set_body_rules(declared, discard_body);

        self.phase = Phase::ResponseStarted;
        self.connection.set_state(ConnectionState::ResponseStarted);
        let head = serialize_head(self.status, &self.response_headers);
        self.response.write_head(&head).await?;
        Ok(())
    }

    /// Finishes the response, sending an empty one if none was started.
    pub async fn end_response(mut self) -> Result<(), ExchangeError> {
        self.finish().await
    }

    async fn finish(&mut self) -> Result<(), ExchangeError> {
        if self.phase == Phase::Dispatched {
            if !self.response_headers.contains("Content-Length") {
                self.response_headers.put("Content-Length", "0")?;
            }
            self.start_response().await?;
        }
        self.phase = Phase::ResponseComplete;
        Ok(())
    }

    /// Sends a complete response with `body` and ends the exchange.
    pub async fn send_response(
        mut self,
        status: u16,
        body: impl AsRef<[u8]>,
    ) -> Result<(), ExchangeError> {
        if self.phase != Phase::Dispatched {
            return Err(ExchangeError::ResponseStarted);
        }
        let body = body.as_ref();
        self.status = status;
        self.response_headers
            .put("Content-Length", body.len().to_string())?;
        self.start_response().await?;
        self.response.write_all(body).await?;
        self.finish().await
    }

    /// Sends an empty response with `status`.
    pub async fn send_error_response(self, status: u16) -> Result<(), ExchangeError> {
        self.send_response(status, b"").await
    }

    /// Answers `101 Switching Protocols` and hands over the raw connection.
    ///
    /// Fails if the response already started, the request body was read, or
    /// the request asks for a websocket while websockets are disabled.
    pub async fn upgrade_channel(mut self) -> Result<UpgradedChannel, ExchangeError> {
        if self.phase != Phase::Dispatched {
            return Err(ExchangeError::ResponseStarted);
        }
        if !self.request.is_untouched() {
            return Err(ExchangeError::RequestBodyRead);
        }
        if !self.request.is_raw() {
            return Err(ExchangeError::RequestStreamWrapped);
        }
        if !self.websocket_enabled && self.request_headers.contains_token("Upgrade", "websocket") {
            return Err(ExchangeError::WebSocketDisabled);
        }

        self.status = 101;
        self.start_response().await?;
        self.response.flush().await?;

        let (Some(inbound), _) = self.request.release() else {
            return Err(ExchangeError::RequestStreamWrapped);
        };
        let outbound = self.response.release().ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotConnected, "response stream released")
        })?;
        self.phase = Phase::Upgraded;
        self.connection.set_state(ConnectionState::Upgraded);
        Ok(UpgradedChannel::new(inbound, outbound, self.connection.clone()))
    }
}

impl Drop for Exchange {
    fn drop(&mut self) {
        let Some(tx) = self.completion.take() else {
            return;
        };
        let (inbound, drained) = self.request.release();
        let outbound = self.response.release();
        let outcome = match self.phase {
            Phase::Upgraded => Outcome::Upgraded,
            Phase::Dispatched => Outcome::Unanswered {
                persistent: self.persistent && drained,
            },
            Phase::ResponseStarted => Outcome::Incomplete,
            Phase::ResponseComplete => Outcome::Complete {
                persistent: self.persistent && drained && self.response.is_delimited(),
            },
        };
        // the connection may already be gone
        let _ = tx.send(Completion {
            inbound,
            outbound,
            outcome,
        });
    }
}

impl std::fmt::Debug for Exchange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Exchange")
            .field("method", &self.method)
            .field("uri", &self.uri)
            .field("protocol", &self.protocol)
            .field("status", &self.status)
            .field("phase", &self.phase)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strip_port_handles_ipv6() {
        assert_eq!(strip_port("example.com:8080"), "example.com");
        assert_eq!(strip_port("example.com"), "example.com");
        assert_eq!(strip_port("[::1]:443"), "[::1]");
        assert_eq!(strip_port("[::1]"), "[::1]");
    }

    #[test]
    fn absolute_form_target() {
        let target = Target::parse("https://Example.com:8443/a/b?x=1");
        assert_eq!(target.scheme.as_deref(), Some("https"));
        assert_eq!(target.host.as_deref(), Some("example.com"));
        assert_eq!(target.path, "/a/b");
        assert_eq!(target.query.as_deref(), Some("x=1"));
    }

    #[test]
    fn absolute_form_path_kept_as_sent() {
        let absolute = Target::parse("http://h/a/../b%7e");
        let origin = Target::parse("/a/../b%7e");
        assert_eq!(absolute.path, "/a/../b%7e");
        assert_eq!(absolute.path, origin.path);

        let bare = Target::parse("http://h?x=1");
        assert_eq!(bare.path, "/");
        assert_eq!(bare.query.as_deref(), Some("x=1"));
    }

    #[test]
    fn origin_form_target() {
        let target = Target::parse("/index.html?q");
        assert!(target.scheme.is_none());
        assert!(target.host.is_none());
        assert_eq!(target.path, "/index.html");
        assert_eq!(target.query.as_deref(), Some("q"));
    }

    #[test]
    fn persistence_by_protocol() {
        let mut headers = HeaderMap::new();
        assert!(request_allows_persistence("HTTP/1.1", &headers, true));
        assert!(!request_allows_persistence("HTTP/1.0", &headers, true));
        assert!(!request_allows_persistence("HTTP/1.1", &headers, false));

        headers.add("Connection", "Keep-Alive").unwrap();
        assert!(request_allows_persistence("HTTP/1.0", &headers, true));

        headers.add("Connection", "close").unwrap();
        assert!(!request_allows_persistence("HTTP/1.1", &headers, true));
    }
}
