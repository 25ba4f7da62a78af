//! Mock backend gateway for testing
//!
//! A line-delimited JSON gateway that issues identities and pushes
//! synthetic sensor snapshots, so the dashboard can run without a hosted
//! backend.
//!
//! Usage:
//!   mock_gateway [--port PORT]
//!
//! The port can also be set via the MOCK_GATEWAY_PORT environment variable.
//! Command line argument takes precedence. Default port is 4800.

use std::collections::HashMap;
use std::io::{BufRead, BufReader, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

static ANON_COUNTER: AtomicU64 = AtomicU64::new(1);

fn main() {
    let port = std::env::args()
        .nth(2)
        .and_then(|s| s.parse().ok())
        .or_else(|| {
            std::env::var("MOCK_GATEWAY_PORT")
                .ok()
                .and_then(|s| s.parse().ok())
        })
        .unwrap_or(4800u16);

    let listener = match TcpListener::bind(format!("127.0.0.1:{}", port)) {
        Ok(l) => l,
        Err(e) => {
            eprintln!("Failed to bind to port {}: {}", port, e);
            std::process::exit(1);
        }
    };

    eprintln!("Mock gateway listening on port {}", port);

    for stream in listener.incoming() {
        match stream {
            Ok(stream) => {
                std::thread::spawn(move || handle_client(stream));
            }
            Err(e) => {
                eprintln!("Accept error: {}", e);
            }
        }
    }
}

fn handle_client(stream: TcpStream) {
    let peer = stream
        .peer_addr()
        .map(|a| a.to_string())
        .unwrap_or_else(|_| "unknown".to_string());
    eprintln!("Connection from {}", peer);

    let writer = match stream.try_clone() {
        Ok(clone) => Arc::new(Mutex::new(clone)),
        Err(e) => {
            eprintln!("Failed to clone stream: {}", e);
            return;
        }
    };

    let identity: Arc<Mutex<Option<String>>> = Arc::new(Mutex::new(None));
    // subscription id -> limit
    let subscriptions: Arc<Mutex<HashMap<u64, usize>>> = Arc::new(Mutex::new(HashMap::new()));

    // The dashboard expects the current identity state right after connect.
    if !send_line(&writer, r#"{"event":"identity","identity":null}"#) {
        return;
    }

    // Pusher thread: periodic snapshots for every active subscription.
    {
        let writer = Arc::clone(&writer);
        let subscriptions = Arc::clone(&subscriptions);
        std::thread::spawn(move || {
            let mut tick = 0u64;
            loop {
                std::thread::sleep(Duration::from_secs(2));
                tick += 1;
                let active: Vec<(u64, usize)> = {
                    let subs = subscriptions.lock().unwrap();
                    subs.iter().map(|(id, limit)| (*id, *limit)).collect()
                };
                for (id, limit) in active {
                    let line = snapshot_line(id, limit, tick);
                    if !send_line(&writer, &line) {
                        return;
                    }
                }
            }
        });
    }

    let reader = BufReader::new(stream);
    for line in reader.lines() {
        let request = match line {
            Ok(line) if line.is_empty() => continue,
            Ok(line) => line,
            Err(_) => break,
        };

        eprintln!("Received: {}", request);
        let response = handle_request(&request, &writer, &identity, &subscriptions);
        eprintln!("Sending: {}", response);
        if !send_line(&writer, &response) {
            break;
        }
    }

    eprintln!("Client {} disconnected", peer);
}

fn handle_request(
    request: &str,
    writer: &Arc<Mutex<TcpStream>>,
    identity: &Arc<Mutex<Option<String>>>,
    subscriptions: &Arc<Mutex<HashMap<u64, usize>>>,
) -> String {
    let req: serde_json::Value = match serde_json::from_str(request) {
        Ok(v) => v,
        Err(_) => return r#"{"id":0,"error":"malformed request"}"#.to_string(),
    };

    let id = req.get("id").and_then(|v| v.as_u64()).unwrap_or(0);
    let op = req.get("op").and_then(|v| v.as_str()).unwrap_or("");

    match op {
        "signInAnonymously" => {
            let uid = format!("anon-{}", ANON_COUNTER.fetch_add(1, Ordering::SeqCst));
            *identity.lock().unwrap() = Some(uid.clone());
            let event = serde_json::json!({"event": "identity", "identity": uid});
            send_line(writer, &event.to_string());
            serde_json::json!({"id": id, "identity": uid}).to_string()
        }
        "signInWithToken" => {
            let token = req.get("token").and_then(|v| v.as_str()).unwrap_or("");
            if token.is_empty() || token == "expired" {
                return serde_json::json!({"id": id, "error": "token rejected"}).to_string();
            }
            let uid = token_uid(token);
            *identity.lock().unwrap() = Some(uid.clone());
            let event = serde_json::json!({"event": "identity", "identity": uid});
            send_line(writer, &event.to_string());
            serde_json::json!({"id": id, "identity": uid}).to_string()
        }
        "subscribe" => {
            if identity.lock().unwrap().is_none() {
                return serde_json::json!({"id": id, "error": "not authenticated"}).to_string();
            }
            let limit = req.get("limit").and_then(|v| v.as_u64()).unwrap_or(10) as usize;
            subscriptions.lock().unwrap().insert(id, limit);
            // Initial snapshot right after the acknowledgement.
            let snapshot = snapshot_line(id, limit, 0);
            let ack = serde_json::json!({"id": id}).to_string();
            let writer = Arc::clone(writer);
            std::thread::spawn(move || {
                std::thread::sleep(Duration::from_millis(50));
                send_line(&writer, &snapshot);
            });
            ack
        }
        "unsubscribe" => {
            if let Some(subscription) = req.get("subscription").and_then(|v| v.as_u64()) {
                subscriptions.lock().unwrap().remove(&subscription);
            }
            serde_json::json!({"id": id}).to_string()
        }
        _ => serde_json::json!({"id": id, "error": "unknown op"}).to_string(),
    }
}

/// Derive a stable uid from a token prefix, safe for multi-byte tokens
fn token_uid(token: &str) -> String {
    format!("user-{}", token.chars().take(8).collect::<String>())
}

fn snapshot_line(subscription: u64, limit: usize, tick: u64) -> String {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0) as i64;

    let docs: Vec<serde_json::Value> = (0..limit)
        .map(|i| {
            let age = i as i64 * 2;
            serde_json::json!({
                "id": format!("r{}", tick as i64 * limit as i64 + (limit - i) as i64),
                "temperature": 20.0 + ((tick as usize + i) % 7) as f64 * 0.4,
                "humidity": 42.0 + ((tick as usize + i) % 11) as f64,
                "timestamp": {"seconds": now - age, "nanos": 0}
            })
        })
        .collect();

    serde_json::json!({
        "event": "snapshot",
        "subscription": subscription,
        "docs": docs
    })
    .to_string()
}

fn send_line(writer: &Arc<Mutex<TcpStream>>, line: &str) -> bool {
    let mut stream = match writer.lock() {
        Ok(stream) => stream,
        Err(_) => return false,
    };
    writeln!(stream, "{}", line).is_ok() && stream.flush().is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_uid_truncates_long_tokens() {
        assert_eq!(token_uid("abcdefghijkl"), "user-abcdefgh");
        assert_eq!(token_uid("tok"), "user-tok");
    }

    #[test]
    fn test_token_uid_handles_multibyte_tokens() {
        // Must not split inside a multi-byte character.
        assert_eq!(token_uid("äöüßéèêë-rest"), "user-äöüßéèêë");
    }
}
