use inlet::http::method::Method;
use inlet::http::parser::{ParseError, ParseStatus, ParsedRequest, ParserLimits, RequestParser};

fn parse(input: &[u8]) -> Result<ParseStatus, ParseError> {
    let mut parser = RequestParser::new(ParserLimits::default());
    let mut buf = input;
    parser.feed(&mut buf)
}

fn parse_ready(input: &[u8]) -> ParsedRequest {
    match parse(input) {
        Ok(ParseStatus::RequestReady(request)) => request,
        other => panic!("expected a complete request, got {other:?}"),
    }
}

const SAMPLE: &[u8] = b"POST /upload?x=1 HTTP/1.1\r\nHost: example.com\r\nX-Multi: a\r\nContent-Length: 5\r\nx-multi: b\r\n\r\n";

#[test]
fn test_parse_simple_get_request() {
    let parsed = parse_ready(b"GET / HTTP/1.1\r\nHost: example.com\r\n\r\n");

    assert_eq!(parsed.method, Method::Get);
    assert_eq!(parsed.uri, "/");
    assert_eq!(parsed.protocol, "HTTP/1.1");
    assert_eq!(parsed.headers.get_first("Host"), Some("example.com"));
}

#[test]
fn test_parse_keeps_query_in_uri() {
    let parsed = parse_ready(b"GET /search?q=rust HTTP/1.1\r\n\r\n");
    assert_eq!(parsed.uri, "/search?q=rust");
}

#[test]
fn test_parse_all_standard_methods() {
    for (token, method) in [
        ("CONNECT", Method::Connect),
        ("DELETE", Method::Delete),
        ("GET", Method::Get),
        ("HEAD", Method::Head),
        ("OPTIONS", Method::Options),
        ("POST", Method::Post),
        ("PUT", Method::Put),
        ("TRACE", Method::Trace),
    ] {
        let req = format!("{token} / HTTP/1.1\r\n\r\n");
        assert_eq!(parse_ready(req.as_bytes()).method, method, "{token}");
    }
}

#[test]
fn test_parse_unknown_method_is_extension() {
    let parsed = parse_ready(b"PROPFIND /dav HTTP/1.1\r\n\r\n");
    assert_eq!(parsed.method, Method::Extension("PROPFIND".to_string()));

    let parsed = parse_ready(b"GETX / HTTP/1.1\r\n\r\n");
    assert_eq!(parsed.method, Method::Extension("GETX".to_string()));

    let parsed = parse_ready(b"get / HTTP/1.1\r\n\r\n");
    assert_eq!(parsed.method, Method::Extension("get".to_string()));
}

#[test]
fn test_parse_multi_valued_headers_case_insensitive() {
    let parsed = parse_ready(SAMPLE);

    assert_eq!(parsed.headers.get_all("x-multi"), ["a", "b"]);
    assert_eq!(parsed.headers.get_first("X-MULTI"), Some("a"));
    assert_eq!(parsed.headers.get_last("X-Multi"), Some("b"));
    let names: Vec<&str> = parsed.headers.names().collect();
    assert_eq!(names, ["Host", "X-Multi", "Content-Length"]);
}

#[test]
fn test_parse_empty_header_value() {
    let parsed = parse_ready(b"GET / HTTP/1.1\r\nX-Empty:\r\nX-Blank:   \r\n\r\n");
    assert_eq!(parsed.headers.get_first("X-Empty"), Some(""));
    assert_eq!(parsed.headers.get_first("X-Blank"), Some(""));
}

#[test]
fn test_parse_every_split_point_gives_same_result() {
    let whole = parse_ready(SAMPLE);

    for split in 0..SAMPLE.len() {
        let mut parser = RequestParser::new(ParserLimits::default());
        let mut first = &SAMPLE[..split];
        let mut second = &SAMPLE[split..];

        assert!(matches!(parser.feed(&mut first), Ok(ParseStatus::NeedMoreData)));
        let Ok(ParseStatus::RequestReady(parsed)) = parser.feed(&mut second) else {
            panic!("split at {split} did not complete");
        };
        assert_eq!(parsed.method, whole.method);
        assert_eq!(parsed.uri, whole.uri);
        assert_eq!(parsed.protocol, whole.protocol);
        assert_eq!(parsed.headers.get_all("x-multi"), ["a", "b"]);
        assert_eq!(parsed.headers.get_first("content-length"), Some("5"));
    }
}

#[test]
fn test_parse_one_byte_at_a_time() {
    let mut parser = RequestParser::new(ParserLimits::default());
    let mut result = None;
    for (i, byte) in SAMPLE.iter().enumerate() {
        let mut chunk: &[u8] = std::slice::from_ref(byte);
        match parser.feed(&mut chunk).unwrap() {
            ParseStatus::NeedMoreData => assert!(i < SAMPLE.len() - 1),
            ParseStatus::RequestReady(request) => result = Some(request),
        }
    }
    assert_eq!(result.unwrap().uri, "/upload?x=1");
}

#[test]
fn test_parse_leaves_body_and_pipelined_bytes() {
    let input = b"GET /a HTTP/1.1\r\n\r\nGET /b HTTP/1.1\r\n\r\n";
    let mut parser = RequestParser::new(ParserLimits::default());
    let mut buf: &[u8] = input;

    let Ok(ParseStatus::RequestReady(first)) = parser.feed(&mut buf) else {
        panic!("first request not ready");
    };
    assert_eq!(first.uri, "/a");
    assert_eq!(buf, b"GET /b HTTP/1.1\r\n\r\n");

    let Ok(ParseStatus::RequestReady(second)) = parser.feed(&mut buf) else {
        panic!("second request not ready");
    };
    assert_eq!(second.uri, "/b");
    assert!(buf.is_empty());
    assert!(parser.is_idle());
}

#[test]
fn test_parse_control_byte_rejected_everywhere() {
    for position in 0..SAMPLE.len() {
        let mut input = SAMPLE.to_vec();
        input[position] = 0x01;
        assert!(parse(&input).is_err(), "control byte at {position} was accepted");
    }
}

#[test]
fn test_parse_rejects_tab_in_header_value() {
    let result = parse(b"GET / HTTP/1.1\r\nX-Tab: a\tb\r\n\r\n");
    assert_eq!(
        result.unwrap_err(),
        ParseError::IllegalByte {
            byte: b'\t',
            part: "header value"
        }
    );
}

#[test]
fn test_parse_missing_colon() {
    let result = parse(b"GET / HTTP/1.1\r\nNoColon\r\n\r\n");
    assert_eq!(result.unwrap_err(), ParseError::MissingColon);
}

#[test]
fn test_parse_space_in_header_name() {
    let result = parse(b"GET / HTTP/1.1\r\nBad Name: x\r\n\r\n");
    assert!(matches!(result, Err(ParseError::IllegalByte { byte: b' ', .. })));
}

#[test]
fn test_parse_cr_without_lf() {
    let result = parse(b"GET / HTTP/1.1\rX");
    assert_eq!(result.unwrap_err(), ParseError::MissingLineFeed);
}

#[test]
fn test_parse_missing_protocol() {
    assert!(parse(b"GET /\r\n\r\n").is_err());
    assert_eq!(
        parse(b"GET / \r\n\r\n").unwrap_err(),
        ParseError::EmptyToken("protocol")
    );
}

#[test]
fn test_parse_token_too_long() {
    let limits = ParserLimits {
        max_token_length: 16,
        max_headers: 100,
    };
    let mut parser = RequestParser::new(limits);
    let mut buf: &[u8] = b"GET /this/path/is/too/long HTTP/1.1\r\n\r\n";

    assert_eq!(
        parser.feed(&mut buf).unwrap_err(),
        ParseError::TokenTooLong {
            part: "request-URI",
            limit: 16
        }
    );
}

#[test]
fn test_parse_unterminated_token_fails_instead_of_growing() {
    let limits = ParserLimits {
        max_token_length: 64,
        max_headers: 100,
    };
    let mut parser = RequestParser::new(limits);
    let chunk = [b'A'; 32];
    let mut failed = false;
    for _ in 0..10 {
        let mut buf: &[u8] = &chunk;
        if parser.feed(&mut buf).is_err() {
            failed = true;
            break;
        }
    }
    assert!(failed);
}

#[test]
fn test_parse_too_many_headers() {
    let limits = ParserLimits {
        max_token_length: 8192,
        max_headers: 2,
    };
    let mut parser = RequestParser::new(limits);
    let mut buf: &[u8] = b"GET / HTTP/1.1\r\nA: 1\r\nB: 2\r\nC: 3\r\n\r\n";

    assert_eq!(parser.feed(&mut buf).unwrap_err(), ParseError::TooManyHeaders(2));
}

#[test]
fn test_parse_utf8_header_value() {
    let parsed = parse_ready("GET / HTTP/1.1\r\nX-Name: Zoë\r\n\r\n".as_bytes());
    assert_eq!(parsed.headers.get_first("x-name"), Some("Zoë"));

    let result = parse(b"GET / HTTP/1.1\r\nX-Name: \xff\xfe\r\n\r\n");
    assert_eq!(result.unwrap_err(), ParseError::InvalidUtf8);
}

#[test]
fn test_parse_non_ascii_uri_rejected() {
    let result = parse("GET /caf\u{e9} HTTP/1.1\r\n\r\n".as_bytes());
    assert!(matches!(
        result,
        Err(ParseError::IllegalByte {
            part: "request-URI",
            ..
        })
    ));
}
