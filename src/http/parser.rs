use bytes::Buf;
use serde::Deserialize;
use thiserror::Error;

use crate::http::header_map::{HeaderError, HeaderMap};
use crate::http::method::{Method, STANDARD_METHODS};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("illegal byte 0x{byte:02x} in {part}")]
    IllegalByte { byte: u8, part: &'static str },
    #[error("empty {0}")]
    EmptyToken(&'static str),
    #[error("line ended inside {0}")]
    UnexpectedLineEnd(&'static str),
    #[error("CR not followed by LF")]
    MissingLineFeed,
    #[error("header line without colon")]
    MissingColon,
    #[error("{part} exceeds {limit} bytes")]
    TokenTooLong { part: &'static str, limit: usize },
    #[error("more than {0} header lines")]
    TooManyHeaders(usize),
    #[error("header value is not valid UTF-8")]
    InvalidUtf8,
    #[error("invalid Content-Length")]
    InvalidContentLength,
    #[error(transparent)]
    Header(#[from] HeaderError),
}

/// Bounds applied while parsing; a hostile peer that never sends a
/// terminator fails the parse instead of growing the accumulator forever.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ParserLimits {
    /// Longest method, request-URI, protocol, header name or header value.
    pub max_token_length: usize,
    pub max_headers: usize,
}

impl Default for ParserLimits {
    fn default() -> Self {
        Self {
            max_token_length: 8192,
            max_headers: 100,
        }
    }
}

/// A request line plus header block.
#[derive(Debug, Clone)]
pub struct ParsedRequest {
    pub method: Method,
    pub uri: String,
    pub protocol: String,
    pub headers: HeaderMap,
}

#[derive(Debug)]
pub enum ParseStatus {
    /// Every byte offered was consumed and the request is not finished yet.
    NeedMoreData,
    /// The blank line ending the header block was consumed. Bytes after it
    /// were left in the buffer.
    RequestReady(ParsedRequest),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    MethodStart,
    /// `STANDARD_METHODS[candidate]` matched for its first `matched` bytes.
    MethodPrefix { candidate: u8, matched: u8 },
    Method,
    UriStart,
    Uri,
    Protocol,
    RequestLineEnd,
    HeaderStart,
    HeaderName,
    HeaderValueStart,
    HeaderValue,
    HeaderLineEnd,
    HeadersEnd,
}

/// Incremental HTTP/1.x request-head parser.
///
/// One instance lives for the whole connection. [`RequestParser::feed`] may be
/// called with any fragment of the stream; all progress is kept in `state`,
/// the token accumulator and the partially built fields, so splitting the
/// input anywhere yields the same result as feeding it at once.
#[derive(Debug)]
pub struct RequestParser {
    state: State,
    token: Vec<u8>,
    method: Option<Method>,
    uri: Option<String>,
    protocol: Option<String>,
    header_name: Option<String>,
    headers: HeaderMap,
    header_lines: usize,
    limits: ParserLimits,
}

fn is_visible(byte: u8) -> bool {
    (0x21..0x7f).contains(&byte)
}

fn is_control(byte: u8) -> bool {
    byte < 0x20 || byte == 0x7f
}

fn token_string(bytes: Vec<u8>) -> Result<String, ParseError> {
    String::from_utf8(bytes).map_err(|_| ParseError::InvalidUtf8)
}

impl RequestParser {
    pub fn new(limits: ParserLimits) -> Self {
        Self {
            state: State::MethodStart,
            token: Vec::new(),
            method: None,
            uri: None,
            protocol: None,
            header_name: None,
            headers: HeaderMap::new(),
            header_lines: 0,
            limits,
        }
    }

    /// True when no byte of the next request has been consumed yet.
    pub fn is_idle(&self) -> bool {
        self.state == State::MethodStart
    }

    /// True once the request line is complete and header lines are being read.
    pub fn in_headers(&self) -> bool {
        matches!(
            self.state,
            State::HeaderStart
                | State::HeaderName
                | State::HeaderValueStart
                | State::HeaderValue
                | State::HeaderLineEnd
                | State::HeadersEnd
        )
    }

    /// Consumes bytes from `buf` until it is empty or a request head is
    /// complete. After an error the parser must be discarded along with the
    /// connection.
    pub fn feed<B: Buf>(&mut self, buf: &mut B) -> Result<ParseStatus, ParseError> {
        while buf.has_remaining() {
            let chunk = buf.chunk();
            let mut consumed = 0;
            let mut ready = false;
            for &byte in chunk {
                consumed += 1;
                if self.step(byte)? {
                    ready = true;
                    break;
                }
            }
            buf.advance(consumed);
            if ready {
                return Ok(ParseStatus::RequestReady(self.finish()));
            }
        }
        Ok(ParseStatus::NeedMoreData)
    }

    fn push(&mut self, byte: u8, part: &'static str) -> Result<(), ParseError> {
        if self.token.len() >= self.limits.max_token_length {
            return Err(ParseError::TokenTooLong {
                part,
                limit: self.limits.max_token_length,
            });
        }
        self.token.push(byte);
        Ok(())
    }

    fn take_token(&mut self) -> Result<String, ParseError> {
        token_string(std::mem::take(&mut self.token))
    }

    fn add_header(&mut self, value: String) -> Result<(), ParseError> {
        if self.header_lines >= self.limits.max_headers {
            return Err(ParseError::TooManyHeaders(self.limits.max_headers));
        }
        self.header_lines += 1;
        let Some(name) = self.header_name.take() else {
            return Err(ParseError::EmptyToken("header name"));
        };
        self.headers.add(&name, value)?;
        Ok(())
    }

    /// Advances the automaton by one byte; returns true when the head is complete.
    fn step(&mut self, byte: u8) -> Result<bool, ParseError> {
        match self.state {
            State::MethodStart => match byte {
                b' ' => return Err(ParseError::EmptyToken("method")),
                b'\r' => return Err(ParseError::UnexpectedLineEnd("method")),
                b if !is_visible(b) => {
                    return Err(ParseError::IllegalByte { byte, part: "method" });
                }
                b => {
                    self.state = match STANDARD_METHODS
                        .iter()
                        .position(|m| m.as_str().as_bytes()[0] == b)
                    {
                        Some(i) => State::MethodPrefix {
                            candidate: i as u8,
                            matched: 1,
                        },
                        None => {
                            self.push(b, "method")?;
                            State::Method
                        }
                    };
                }
            },
            State::MethodPrefix { candidate, matched } => {
                let name = STANDARD_METHODS[candidate as usize].as_str().as_bytes();
                let matched = matched as usize;
                match byte {
                    b' ' => {
                        self.method = Some(if matched == name.len() {
                            STANDARD_METHODS[candidate as usize].clone()
                        } else {
                            Method::Extension(token_string(name[..matched].to_vec())?)
                        });
                        self.state = State::UriStart;
                    }
                    b'\r' => return Err(ParseError::UnexpectedLineEnd("method")),
                    b if !is_visible(b) => {
                        return Err(ParseError::IllegalByte { byte, part: "method" });
                    }
                    b => {
                        // Another standard method may share the prefix (POST / PUT).
                        let next = STANDARD_METHODS.iter().position(|m| {
                            let other = m.as_str().as_bytes();
                            other.len() > matched
                                && other[..matched] == name[..matched]
                                && other[matched] == b
                        });
                        self.state = match next {
                            Some(i) => State::MethodPrefix {
                                candidate: i as u8,
                                matched: (matched + 1) as u8,
                            },
                            None => {
                                self.token.extend_from_slice(&name[..matched]);
                                self.push(b, "method")?;
                                State::Method
                            }
                        };
                    }
                }
            }
            State::Method => match byte {
                b' ' => {
                    let token = self.take_token()?;
                    self.method = Some(Method::from_token(&token));
                    self.state = State::UriStart;
                }
                b'\r' => return Err(ParseError::UnexpectedLineEnd("method")),
                b if !is_visible(b) => {
                    return Err(ParseError::IllegalByte { byte, part: "method" });
                }
                b => self.push(b, "method")?,
            },
            State::UriStart => match byte {
                b' ' => {}
                b'\r' => return Err(ParseError::EmptyToken("request-URI")),
                b if !is_visible(b) => {
                    return Err(ParseError::IllegalByte { byte, part: "request-URI" });
                }
                b => {
                    self.push(b, "request-URI")?;
                    self.state = State::Uri;
                }
            },
            State::Uri => match byte {
                b' ' => {
                    self.uri = Some(self.take_token()?);
                    self.state = State::Protocol;
                }
                b'\r' => return Err(ParseError::UnexpectedLineEnd("request-URI")),
                b if !is_visible(b) => {
                    return Err(ParseError::IllegalByte { byte, part: "request-URI" });
                }
                b => self.push(b, "request-URI")?,
            },
            State::Protocol => match byte {
                b'\r' => {
                    if self.token.is_empty() {
                        return Err(ParseError::EmptyToken("protocol"));
                    }
                    self.protocol = Some(self.take_token()?);
                    self.state = State::RequestLineEnd;
                }
                b if is_control(b) || b >= 0x80 => {
                    return Err(ParseError::IllegalByte { byte, part: "protocol" });
                }
                b => self.push(b, "protocol")?,
            },
            State::RequestLineEnd | State::HeaderLineEnd => match byte {
                b'\n' => self.state = State::HeaderStart,
                _ => return Err(ParseError::MissingLineFeed),
            },
            State::HeaderStart => match byte {
                b'\r' => self.state = State::HeadersEnd,
                b':' => return Err(ParseError::EmptyToken("header name")),
                b if !is_visible(b) => {
                    return Err(ParseError::IllegalByte { byte, part: "header name" });
                }
                b => {
                    self.push(b, "header name")?;
                    self.state = State::HeaderName;
                }
            },
            State::HeaderName => match byte {
                b':' => {
                    self.header_name = Some(self.take_token()?);
                    self.state = State::HeaderValueStart;
                }
                b'\r' => return Err(ParseError::MissingColon),
                b if !is_visible(b) => {
                    return Err(ParseError::IllegalByte { byte, part: "header name" });
                }
                b => self.push(b, "header name")?,
            },
            State::HeaderValueStart => match byte {
                b' ' => {}
                b'\r' => {
                    self.add_header(String::new())?;
                    self.state = State::HeaderLineEnd;
                }
                b if is_control(b) => {
                    return Err(ParseError::IllegalByte { byte, part: "header value" });
                }
                b => {
                    self.push(b, "header value")?;
                    self.state = State::HeaderValue;
                }
            },
            State::HeaderValue => match byte {
                b'\r' => {
                    let value = self.take_token()?;
                    self.add_header(value)?;
                    self.state = State::HeaderLineEnd;
                }
                b if is_control(b) => {
                    return Err(ParseError::IllegalByte { byte, part: "header value" });
                }
                b => self.push(b, "header value")?,
            },
            State::HeadersEnd => match byte {
                b'\n' => return Ok(true),
                _ => return Err(ParseError::MissingLineFeed),
            },
        }
        Ok(false)
    }

    /// Hands out the completed request and resets for the next one.
    fn finish(&mut self) -> ParsedRequest {
        self.state = State::MethodStart;
        self.token.clear();
        self.header_lines = 0;
        self.header_name = None;
        ParsedRequest {
            method: self.method.take().unwrap_or(Method::Get),
            uri: self.uri.take().unwrap_or_default(),
            protocol: self.protocol.take().unwrap_or_default(),
            headers: std::mem::take(&mut self.headers),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_all(input: &[u8]) -> Result<ParseStatus, ParseError> {
        let mut parser = RequestParser::new(ParserLimits::default());
        let mut buf = input;
        parser.feed(&mut buf)
    }

    #[test]
    fn parse_simple_get() {
        let req = b"GET / HTTP/1.1\r\nHost: example.com\r\n\r\n";

        let ParseStatus::RequestReady(parsed) = parse_all(req).unwrap() else {
            panic!("request not ready");
        };

        assert_eq!(parsed.method, Method::Get);
        assert_eq!(parsed.uri, "/");
        assert_eq!(parsed.headers.get_first("host"), Some("example.com"));
    }

    #[test]
    fn shared_prefix_switches_candidate() {
        for (line, expected) in [
            ("PUT", Method::Put),
            ("POST", Method::Post),
            ("PU", Method::Extension("PU".to_string())),
            ("POSTX", Method::Extension("POSTX".to_string())),
        ] {
            let req = format!("{line} / HTTP/1.1\r\n\r\n");
            let ParseStatus::RequestReady(parsed) = parse_all(req.as_bytes()).unwrap() else {
                panic!("request not ready");
            };
            assert_eq!(parsed.method, expected);
        }
    }

    #[test]
    fn leaves_pipelined_bytes_in_buffer() {
        let mut parser = RequestParser::new(ParserLimits::default());
        let mut buf: &[u8] = b"GET /a HTTP/1.1\r\n\r\nGET /b";

        assert!(matches!(
            parser.feed(&mut buf),
            Ok(ParseStatus::RequestReady(_))
        ));
        assert_eq!(buf, b"GET /b");
        assert!(parser.is_idle());
    }
}
