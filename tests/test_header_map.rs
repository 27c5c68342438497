use inlet::http::header_map::{HeaderError, HeaderMap};

#[test]
fn test_add_appends_and_preserves_order() {
    let mut headers = HeaderMap::new();
    headers.add("Accept", "text/html").unwrap();
    headers.add("Host", "example.com").unwrap();
    headers.add("accept", "application/json").unwrap();

    assert_eq!(headers.len(), 2);
    assert_eq!(headers.get_all("ACCEPT"), ["text/html", "application/json"]);
    let names: Vec<&str> = headers.names().collect();
    assert_eq!(names, ["Accept", "Host"]);
}

#[test]
fn test_put_replaces_in_place() {
    let mut headers = HeaderMap::new();
    headers.add("A", "1").unwrap();
    headers.add_values("B", ["2", "3"]).unwrap();
    headers.add("C", "4").unwrap();

    headers.put("b", "9").unwrap();

    assert_eq!(headers.get_all("B"), ["9"]);
    let names: Vec<&str> = headers.names().collect();
    assert_eq!(names, ["A", "b", "C"]);
}

#[test]
fn test_remove_keeps_other_lookups_working() {
    let mut headers = HeaderMap::new();
    headers.add("A", "1").unwrap();
    headers.add("B", "2").unwrap();
    headers.add("C", "3").unwrap();

    assert_eq!(headers.remove("a").unwrap(), Some(vec!["1".to_string()]));
    assert_eq!(headers.remove("missing").unwrap(), None);
    assert!(!headers.contains("A"));
    assert_eq!(headers.get_first("B"), Some("2"));
    assert_eq!(headers.get_first("C"), Some("3"));
}

#[test]
fn test_add_all_merges() {
    let mut a = HeaderMap::new();
    a.add("Via", "one").unwrap();
    let mut b = HeaderMap::new();
    b.add("via", "two").unwrap();
    b.add("X-New", "yes").unwrap();

    a.add_all(&b).unwrap();

    assert_eq!(a.get_all("Via"), ["one", "two"]);
    assert_eq!(a.get_first("x-new"), Some("yes"));
}

#[test]
fn test_put_all_and_get_last() {
    let mut headers = HeaderMap::new();
    headers.put_all("Transfer-Encoding", ["gzip", "chunked"]).unwrap();

    assert_eq!(headers.get_first("transfer-encoding"), Some("gzip"));
    assert_eq!(headers.get_last("transfer-encoding"), Some("chunked"));
    assert!(headers.get_all("absent").is_empty());
}

#[test]
fn test_locked_map_rejects_mutation() {
    let mut headers = HeaderMap::new();
    headers.add("Content-Length", "0").unwrap();
    headers.lock();
    headers.lock();

    assert!(headers.is_locked());
    assert_eq!(headers.add("X", "1"), Err(HeaderError::Locked));
    assert_eq!(headers.put("X", "1"), Err(HeaderError::Locked));
    assert_eq!(headers.remove("Content-Length"), Err(HeaderError::Locked));
    assert_eq!(headers.get_first("content-length"), Some("0"));
}

#[test]
fn test_contains_token() {
    let mut headers = HeaderMap::new();
    headers.add("Connection", "Upgrade, Keep-Alive").unwrap();

    assert!(headers.contains_token("connection", "keep-alive"));
    assert!(headers.contains_token("Connection", "upgrade"));
    assert!(!headers.contains_token("Connection", "close"));
}
