//! Webhook delivery against a one-shot local HTTP server.

use std::time::Duration;

use hamalert_bridge::{Notifier, NotifierConfig};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::oneshot;

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

fn content_length(headers: &str) -> usize {
    headers
        .lines()
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
        .and_then(|(_, value)| value.trim().parse().ok())
        .unwrap_or(0)
}

/// Answer a single request with `status_line`; the request body is sent back
/// through the returned channel.
async fn serve_once(status_line: &str, body: &str) -> (String, oneshot::Receiver<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (body_tx, body_rx) = oneshot::channel();

    let status_line = status_line.to_owned();
    let body = body.to_owned();
    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();

        let mut request = Vec::new();
        let mut chunk = [0u8; 1024];
        let request_body = loop {
            let n = socket.read(&mut chunk).await.unwrap();
            if n == 0 {
                break String::new();
            }
            request.extend_from_slice(&chunk[..n]);
            if let Some(end) = find(&request, b"\r\n\r\n") {
                let headers = String::from_utf8_lossy(&request[..end]).to_string();
                let start = end + 4;
                if request.len() >= start + content_length(&headers) {
                    break String::from_utf8_lossy(&request[start..]).to_string();
                }
            }
        };
        let _ = body_tx.send(request_body);

        let response = format!(
            "HTTP/1.1 {status_line}\r\nContent-Type: text/plain\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        );
        let _ = socket.write_all(response.as_bytes()).await;
    });

    (format!("http://{addr}/webhook"), body_rx)
}

fn notifier(url: String) -> Notifier {
    Notifier::new(NotifierConfig {
        webhook_url: url,
        dry_run: false,
        timeout: Duration::from_secs(5),
    })
    .unwrap()
}

#[tokio::test]
async fn test_no_content_is_success() {
    let (url, body_rx) = serve_once("204 No Content", "").await;

    assert!(notifier(url).deliver("SPOT: W1AW seen by K1TTT").await);

    let body: serde_json::Value = serde_json::from_str(&body_rx.await.unwrap()).unwrap();
    assert_eq!(body, serde_json::json!({"content": "SPOT: W1AW seen by K1TTT"}));
}

#[tokio::test]
async fn test_ok_and_accepted_are_success() {
    let (url, _) = serve_once("200 OK", "ok").await;
    assert!(notifier(url).deliver("one").await);

    let (url, _) = serve_once("202 Accepted", "").await;
    assert!(notifier(url).deliver("two").await);
}

#[tokio::test]
async fn test_error_status_is_failure() {
    let (url, _) = serve_once("500 Internal Server Error", "boom").await;
    assert!(!notifier(url).deliver("SPOT: W1AW").await);

    let (url, _) = serve_once("429 Too Many Requests", "{\"retry_after\": 1.5}").await;
    assert!(!notifier(url).deliver("SPOT: W1AW").await);
}

#[tokio::test]
async fn test_unreachable_endpoint_is_failure() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    assert!(!notifier(format!("http://{addr}/webhook")).deliver("SPOT: W1AW").await);
}
