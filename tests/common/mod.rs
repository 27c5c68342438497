#![allow(dead_code)]

use std::sync::Arc;

use inlet::config::Config;
use inlet::handler::SharedHandler;
use inlet::http::connection::ConnectionError;
use inlet::server::Server;
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::task::JoinHandle;

pub fn server(handler: Option<SharedHandler>) -> Arc<Server> {
    server_with(Config::default(), handler)
}

pub fn server_with(config: Config, handler: Option<SharedHandler>) -> Arc<Server> {
    let server = Arc::new(Server::new(&config));
    server.root().set_handler(handler);
    server
}

/// Opens an in-memory connection to `server`.
pub fn connect(server: &Arc<Server>) -> (DuplexStream, JoinHandle<Result<(), ConnectionError>>) {
    let (client, remote) = tokio::io::duplex(64 * 1024);
    let task = tokio::spawn(server.clone().serve_connection(remote, None, None));
    (client, task)
}

pub async fn send(client: &mut DuplexStream, bytes: &[u8]) {
    client.write_all(bytes).await.unwrap();
}

#[derive(Debug)]
pub struct Response {
    pub head: String,
    pub status: u16,
    pub body: Vec<u8>,
}

impl Response {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.head.lines().skip(1).find_map(|line| {
            let (n, v) = line.split_once(':')?;
            n.eq_ignore_ascii_case(name).then(|| v.trim())
        })
    }

    pub fn body_str(&self) -> &str {
        std::str::from_utf8(&self.body).unwrap()
    }
}

/// Reads a status line and headers, leaving any body unread.
pub async fn read_head(client: &mut DuplexStream) -> Response {
    let mut head = Vec::new();
    while !head.ends_with(b"\r\n\r\n") {
        let byte = client
            .read_u8()
            .await
            .expect("connection closed before the response head ended");
        head.push(byte);
    }
    let head = String::from_utf8(head).unwrap();
    let status = head[9..12].parse().unwrap();
    Response {
        head,
        status,
        body: Vec::new(),
    }
}

/// Reads a response whose body is delimited by `Content-Length`.
pub async fn read_response(client: &mut DuplexStream) -> Response {
    let mut response = read_head(client).await;
    let length: usize = response
        .header("Content-Length")
        .map(|v| v.parse().unwrap())
        .unwrap_or(0);
    response.body = vec![0; length];
    client.read_exact(&mut response.body).await.unwrap();
    response
}

/// Reads everything until the server closes the connection.
pub async fn read_to_close(client: &mut DuplexStream) -> Vec<u8> {
    let mut rest = Vec::new();
    client.read_to_end(&mut rest).await.unwrap();
    rest
}
