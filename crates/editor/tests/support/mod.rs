// Test peers for the editor's HTTP clients.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use atelier_common::protocol::execute::{encode_lines, StreamEvent};
use axum::Router;
use serde_json::Value;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

/// Serve `router` on an ephemeral local port and return its base URL.
pub async fn serve(router: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("test listener should bind");
    let addr = listener.local_addr().expect("listener should have an address");
    tokio::spawn(async move {
        axum::serve(listener, router).await.expect("test server should run");
    });
    format!("http://{addr}")
}

/// A scripted chunked response. Each write goes out as its own chunk,
/// flushed and followed by `gap`, so lines can be split across reads.
#[derive(Debug, Clone)]
pub struct StreamScript {
    pub writes: Vec<String>,
    pub gap: Duration,
    /// Keep the connection open after the last write instead of finishing.
    pub hold_open: bool,
}

impl StreamScript {
    pub fn new(writes: Vec<String>) -> Self {
        Self { writes, gap: Duration::from_millis(10), hold_open: false }
    }

    /// One write per event, newline-terminated.
    pub fn events(events: &[StreamEvent]) -> Self {
        Self::new(encode_lines(events).lines().map(|line| format!("{line}\n")).collect())
    }

    pub fn held_open(mut self) -> Self {
        self.hold_open = true;
        self
    }
}

pub type SeenBody = Arc<Mutex<Option<Value>>>;

/// Accept one connection, record its JSON body, and play `script` back.
pub async fn serve_stream(script: StreamScript) -> (String, SeenBody) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("stream listener should bind");
    let addr = listener.local_addr().expect("listener should have an address");
    let seen: SeenBody = Arc::default();
    let sink = Arc::clone(&seen);

    tokio::spawn(async move {
        let Ok((mut socket, _)) = listener.accept().await else {
            return;
        };
        let body = read_request_body(&mut socket).await;
        *sink.lock().unwrap() = serde_json::from_slice(&body).ok();

        let head = "HTTP/1.1 200 OK\r\n\
                    content-type: application/x-ndjson\r\n\
                    transfer-encoding: chunked\r\n\r\n";
        if socket.write_all(head.as_bytes()).await.is_err() {
            return;
        }
        for write in &script.writes {
            let chunk = format!("{:x}\r\n{write}\r\n", write.len());
            if socket.write_all(chunk.as_bytes()).await.is_err() {
                return;
            }
            let _ = socket.flush().await;
            tokio::time::sleep(script.gap).await;
        }
        if script.hold_open {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        } else {
            let _ = socket.write_all(b"0\r\n\r\n").await;
            let _ = socket.shutdown().await;
        }
    });

    (format!("http://{addr}/execute"), seen)
}

/// Accept one connection and answer with a fixed status and body.
pub async fn serve_status(status_line: &'static str, body: &'static str) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("status listener should bind");
    let addr = listener.local_addr().expect("listener should have an address");
    tokio::spawn(async move {
        let Ok((mut socket, _)) = listener.accept().await else {
            return;
        };
        read_request_body(&mut socket).await;
        let response = format!(
            "HTTP/1.1 {status_line}\r\ncontent-type: text/plain\r\n\
             content-length: {}\r\n\r\n{body}",
            body.len()
        );
        let _ = socket.write_all(response.as_bytes()).await;
        let _ = socket.shutdown().await;
    });
    format!("http://{addr}/execute")
}

async fn read_request_body(socket: &mut TcpStream) -> Vec<u8> {
    let mut buf = Vec::new();
    let mut scratch = [0u8; 4096];
    let header_end = loop {
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
        match socket.read(&mut scratch).await {
            Ok(0) | Err(_) => return Vec::new(),
            Ok(n) => buf.extend_from_slice(&scratch[..n]),
        }
    };

    let head = String::from_utf8_lossy(&buf[..header_end]).to_ascii_lowercase();
    let content_length = head
        .lines()
        .find_map(|line| line.strip_prefix("content-length:"))
        .and_then(|value| value.trim().parse::<usize>().ok())
        .unwrap_or(0);

    while buf.len() < header_end + content_length {
        match socket.read(&mut scratch).await {
            Ok(0) | Err(_) => break,
            Ok(n) => buf.extend_from_slice(&scratch[..n]),
        }
    }
    buf[header_end..].to_vec()
}
