//! A scripted HTTP/1.1 server on a local `TcpListener`.
//!
//! Each accepted connection reads one request, answers with the next
//! [`Reply`] and is closed. The captured requests are returned when the
//! server task finishes.

use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

/// A request as it arrived on the wire.
#[derive(Debug, Clone)]
pub struct CapturedRequest {
    pub method: String,
    /// Path and query exactly as sent, still percent-encoded.
    pub target: String,
    /// Header names are lowercased.
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl CapturedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn body_json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.body).expect("request body should be JSON")
    }
}

/// What the server writes back on one connection.
pub struct Reply {
    writes: Vec<Vec<u8>>,
    delay: Duration,
}

impl Reply {
    pub fn json(status: u16, body: &str) -> Self {
        Self::with_body(status, "application/json", body)
    }

    pub fn text(status: u16, body: &str) -> Self {
        Self::with_body(status, "text/html", body)
    }

    /// A chunked `text/event-stream` body, one write per entry of
    /// `chunks`. Unless `finished`, the stream is cut off in the middle
    /// of a chunk instead of being terminated.
    pub fn event_stream(chunks: &[&str], finished: bool) -> Self {
        let mut writes = vec![b"HTTP/1.1 200 OK\r\n\
            Content-Type: text/event-stream\r\n\
            Transfer-Encoding: chunked\r\n\
            Connection: close\r\n\r\n"
            .to_vec()];
        for chunk in chunks {
            writes.push(format!("{:x}\r\n{chunk}\r\n", chunk.len()).into_bytes());
        }
        if finished {
            writes.push(b"0\r\n\r\n".to_vec());
        } else {
            writes.push(b"40\r\ndata: {\"type\":".to_vec());
        }
        Self {
            writes,
            delay: Duration::ZERO,
        }
    }

    /// Hold the reply back for `delay` after the request arrives.
    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    fn with_body(status: u16, content_type: &str, body: &str) -> Self {
        let reason = if status < 400 { "OK" } else { "Error" };
        let response = format!(
            "HTTP/1.1 {status} {reason}\r\n\
             Content-Type: {content_type}\r\n\
             Content-Length: {}\r\n\
             Connection: close\r\n\r\n\
             {body}",
            body.len()
        );
        Self {
            writes: vec![response.into_bytes()],
            delay: Duration::ZERO,
        }
    }
}

/// Start a server answering one connection per entry of `replies`.
///
/// Returns the base URL and a handle resolving to the captured requests.
pub async fn serve(replies: Vec<Reply>) -> (String, JoinHandle<Vec<CapturedRequest>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base_url = format!("http://{}", listener.local_addr().unwrap());

    let handle = tokio::spawn(async move {
        let mut captured = Vec::new();
        for reply in replies {
            let (mut socket, _) = listener.accept().await.unwrap();
            captured.push(read_request(&mut socket).await);

            tokio::time::sleep(reply.delay).await;
            for bytes in reply.writes {
                // The client may already have given up.
                if socket.write_all(&bytes).await.is_err() {
                    break;
                }
                let _ = socket.flush().await;
            }
        }
        captured
    });

    (base_url, handle)
}

/// A base URL nothing is listening on.
pub async fn dead_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}", listener.local_addr().unwrap());
    drop(listener);
    url
}

async fn read_request(socket: &mut TcpStream) -> CapturedRequest {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];

    let head_end = loop {
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
        let n = socket.read(&mut chunk).await.unwrap();
        assert!(n > 0, "connection closed before the request head");
        buf.extend_from_slice(&chunk[..n]);
    };

    let head = String::from_utf8_lossy(&buf[..head_end]).into_owned();
    let mut lines = head.split("\r\n");
    let mut request_line = lines.next().unwrap_or_default().split(' ');
    let method = request_line.next().unwrap_or_default().to_string();
    let target = request_line.next().unwrap_or_default().to_string();
    let headers: Vec<(String, String)> = lines
        .filter_map(|line| line.split_once(':'))
        .map(|(key, value)| (key.trim().to_ascii_lowercase(), value.trim().to_string()))
        .collect();

    let length = headers
        .iter()
        .find(|(key, _)| key == "content-length")
        .and_then(|(_, value)| value.parse::<usize>().ok())
        .unwrap_or(0);

    let mut body = buf[head_end..].to_vec();
    while body.len() < length {
        let n = socket.read(&mut chunk).await.unwrap();
        if n == 0 {
            break;
        }
        body.extend_from_slice(&chunk[..n]);
    }
    body.truncate(length);

    CapturedRequest {
        method,
        target,
        headers,
        body,
    }
}
