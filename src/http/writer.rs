use crate::http::header_map::HeaderMap;

const HTTP_VERSION: &str = "HTTP/1.1";

/// Standard reason phrase for a status code, empty for unknown codes.
///
/// # Example
///
/// ```
/// # use inlet::http::writer::reason_phrase;
/// assert_eq!(reason_phrase(200), "OK");
/// assert_eq!(reason_phrase(101), "Switching Protocols");
/// ```
pub fn reason_phrase(status: u16) -> &'static str {
    match status {
        100 => "Continue",
        101 => "Switching Protocols",
        200 => "OK",
        201 => "Created",
        202 => "Accepted",
        204 => "No Content",
        206 => "Partial Content",
        301 => "Moved Permanently",
        302 => "Found",
        304 => "Not Modified",
        400 => "Bad Request",
        403 => "Forbidden",
        404 => "Not Found",
        405 => "Method Not Allowed",
        413 => "Content Too Large",
        426 => "Upgrade Required",
        500 => "Internal Server Error",
        501 => "Not Implemented",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        _ => "",
    }
}

/// Statuses whose responses never carry a body.
pub(crate) fn is_bodiless(status: u16) -> bool {
    (100..200).contains(&status) || status == 204 || status == 304
}

/// Encodes a status line and header block, ending with the blank line.
pub fn serialize_head(status: u16, headers: &HeaderMap) -> Vec<u8> {
    let mut buf = Vec::with_capacity(256);

    // Status line
    let status_line = format!("{} {} {}\r\n", HTTP_VERSION, status, reason_phrase(status));
    buf.extend_from_slice(status_line.as_bytes());

    // Headers, one line per value
    for (name, values) in headers.iter() {
        for value in values {
            buf.extend_from_slice(name.as_bytes());
            buf.extend_from_slice(b": ");
            buf.extend_from_slice(value.as_bytes());
            buf.extend_from_slice(b"\r\n");
        }
    }

    // Header/body separator
    buf.extend_from_slice(b"\r\n");

    buf
}

/// The response sent for an exchange nobody answered.
pub(crate) fn default_error(status: u16, persistent: bool) -> Vec<u8> {
    let connection = if persistent { "" } else { "Connection: close\r\n" };
    format!(
        "{} {} {}\r\nContent-Length: 0\r\n{}\r\n",
        HTTP_VERSION,
        status,
        reason_phrase(status),
        connection
    )
    .into_bytes()
}
