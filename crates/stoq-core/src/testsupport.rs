//! Test API server
//!
//! A scripted HTTP server on a random port for exercising the probe,
//! replay and orchestration paths. Tests register canned responses per
//! path (status, body, optional latency) and inspect the recorded
//! requests afterwards.

#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;

/// A request the server saw, in arrival order
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub body: String,
    pub bearer: Option<String>,
}

impl RecordedRequest {
    pub fn json(&self) -> serde_json::Value {
        serde_json::from_str(&self.body).unwrap_or(serde_json::Value::Null)
    }
}

#[derive(Debug, Clone)]
struct CannedResponse {
    status: u16,
    body: String,
    delay: Duration,
}

impl Default for CannedResponse {
    fn default() -> Self {
        Self {
            status: 200,
            body: r#"{"success":true}"#.to_string(),
            delay: Duration::ZERO,
        }
    }
}

#[derive(Default)]
struct Script {
    routes: HashMap<String, CannedResponse>,
    requests: Vec<RecordedRequest>,
}

/// Scripted API server bound to a random local port
pub struct TestApi {
    addr: SocketAddr,
    script: Arc<Mutex<Script>>,
    shutdown_tx: oneshot::Sender<()>,
}

impl TestApi {
    /// Start a server; unscripted paths answer 200 `{"success":true}`
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let script = Arc::new(Mutex::new(Script::default()));

        let script_clone = Arc::clone(&script);
        tokio::spawn(async move {
            tokio::select! {
                _ = accept_loop(listener, script_clone) => {}
                _ = shutdown_rx => {}
            }
        });

        // Give the server a moment to start
        tokio::time::sleep(Duration::from_millis(10)).await;

        TestApi {
            addr,
            script,
            shutdown_tx,
        }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Script the response for a path
    pub fn respond(&self, path: &str, status: u16, body: &str) {
        self.respond_with_delay(path, status, body, Duration::ZERO);
    }

    /// Script the response for a path, served after `delay`
    pub fn respond_with_delay(&self, path: &str, status: u16, body: &str, delay: Duration) {
        self.lock_script().routes.insert(
            path.to_string(),
            CannedResponse {
                status,
                body: body.to_string(),
                delay,
            },
        );
    }

    /// Flip the liveness endpoint between healthy and unavailable
    pub fn set_healthy(&self, healthy: bool) {
        if healthy {
            self.respond("/api/health", 200, r#"{"status":"ok"}"#);
        } else {
            self.respond("/api/health", 503, r#"{"error":"unavailable"}"#);
        }
    }

    /// All recorded requests, in arrival order
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.lock_script().requests.clone()
    }

    /// Recorded requests for one path
    pub fn requests_for(&self, path: &str) -> Vec<RecordedRequest> {
        self.lock_script()
            .requests
            .iter()
            .filter(|r| r.path == path)
            .cloned()
            .collect()
    }

    /// Forget recorded requests
    pub fn reset_requests(&self) {
        self.lock_script().requests.clear();
    }

    pub fn shutdown(self) {
        let _ = self.shutdown_tx.send(());
    }

    fn lock_script(&self) -> std::sync::MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(|p| p.into_inner())
    }
}

async fn accept_loop(listener: TcpListener, script: Arc<Mutex<Script>>) {
    loop {
        let Ok((stream, _)) = listener.accept().await else {
            return;
        };
        let script = Arc::clone(&script);
        tokio::spawn(async move {
            let _ = handle_connection(stream, script).await;
        });
    }
}

async fn handle_connection(
    mut stream: TcpStream,
    script: Arc<Mutex<Script>>,
) -> std::io::Result<()> {
    let Some(request) = read_request(&mut stream).await? else {
        return Ok(());
    };

    // Look up the canned response and record the request under one lock
    let response = {
        let mut guard = script.lock().unwrap_or_else(|p| p.into_inner());
        let response = guard.routes.get(&request.path).cloned().unwrap_or_default();
        guard.requests.push(request);
        response
    };

    if !response.delay.is_zero() {
        tokio::time::sleep(response.delay).await;
    }

    let payload = format!(
        "HTTP/1.1 {} {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        response.status,
        reason_phrase(response.status),
        response.body.len(),
        response.body
    );
    stream.write_all(payload.as_bytes()).await?;
    stream.shutdown().await
}

/// Parse one HTTP request: request line, headers, content-length body
async fn read_request(stream: &mut TcpStream) -> std::io::Result<Option<RecordedRequest>> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];

    let header_end = loop {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            return Ok(None);
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = find_header_end(&buf) {
            break pos;
        }
        if buf.len() > 64 * 1024 {
            return Ok(None);
        }
    };

    let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
    let mut lines = head.lines();
    let request_line = lines.next().unwrap_or_default();
    let mut parts = request_line.split_whitespace();
    let method = parts.next().unwrap_or_default().to_string();
    let path = parts.next().unwrap_or_default().to_string();

    let mut content_length = 0usize;
    let mut bearer = None;
    for line in lines {
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim();
        match name.to_ascii_lowercase().as_str() {
            "content-length" => content_length = value.parse().unwrap_or(0),
            "authorization" => {
                bearer = value
                    .strip_prefix("Bearer ")
                    .map(|token| token.to_string());
            }
            _ => {}
        }
    }

    let mut body = buf[header_end + 4..].to_vec();
    while body.len() < content_length {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        body.extend_from_slice(&chunk[..n]);
    }
    body.truncate(content_length);

    Ok(Some(RecordedRequest {
        method,
        path,
        body: String::from_utf8_lossy(&body).to_string(),
        bearer,
    }))
}

fn find_header_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n")
}

fn reason_phrase(status: u16) -> &'static str {
    match status {
        200 => "OK",
        201 => "Created",
        400 => "Bad Request",
        401 => "Unauthorized",
        404 => "Not Found",
        500 => "Internal Server Error",
        503 => "Service Unavailable",
        _ => "Response",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_default_response() {
        let api = TestApi::start().await;

        let client = reqwest::Client::new();
        let response = client
            .post(format!("{}/api/products/sell", api.base_url()))
            .json(&serde_json::json!({"productId": "p1"}))
            .send()
            .await
            .unwrap();

        assert_eq!(response.status().as_u16(), 200);
        let body: serde_json::Value = response.json().await.unwrap();
        assert_eq!(body["success"], true);

        let seen = api.requests();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].method, "POST");
        assert_eq!(seen[0].path, "/api/products/sell");
        assert_eq!(seen[0].json()["productId"], "p1");

        api.shutdown();
    }

    #[tokio::test]
    async fn test_scripted_response_and_bearer() {
        let api = TestApi::start().await;
        api.respond("/api/services", 500, r#"{"error":"boom"}"#);

        let client = reqwest::Client::new();
        let response = client
            .post(format!("{}/api/services", api.base_url()))
            .bearer_auth("tok-123")
            .json(&serde_json::json!({}))
            .send()
            .await
            .unwrap();

        assert_eq!(response.status().as_u16(), 500);

        let seen = api.requests_for("/api/services");
        assert_eq!(seen[0].bearer.as_deref(), Some("tok-123"));

        api.shutdown();
    }

    #[tokio::test]
    async fn test_health_toggle() {
        let api = TestApi::start().await;
        let client = reqwest::Client::new();
        let url = format!("{}/api/health", api.base_url());

        api.set_healthy(true);
        let response = client.get(&url).send().await.unwrap();
        assert!(response.status().is_success());

        api.set_healthy(false);
        let response = client.get(&url).send().await.unwrap();
        assert_eq!(response.status().as_u16(), 503);

        api.shutdown();
    }
}
