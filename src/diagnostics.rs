//! Diagnostics HTTP endpoint.
//!
//! A small blocking server on its own thread, so it keeps answering even if
//! the runtime is saturated by runners. Routes:
//!
//! - `GET /runners`: phase of every runner as JSON
//! - `GET /healthz`: `ok`

use anyhow::{Context, Result};
use loadtest_runner::PhaseBoard;
use std::io::{BufRead, BufReader, Write};
use std::net::{TcpListener, TcpStream};
use std::time::Duration;
use tracing::{error, info, warn};

/// A routed response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: &'static str,
    pub content_type: &'static str,
    pub body: String,
}

impl Response {
    fn json(status: &'static str, body: String) -> Self {
        Self {
            status,
            content_type: "application/json",
            body,
        }
    }
}

/// Serve diagnostics on `listen` from a background thread. Failing to bind
/// is logged and otherwise ignored.
pub fn spawn(listen: impl Into<String>, phases: PhaseBoard) {
    let listen = listen.into();
    let spawned = std::thread::Builder::new()
        .name("diagnostics".into())
        .spawn(move || {
            if let Err(e) = serve(&listen, phases) {
                error!("Diagnostics endpoint stopped: {e:#}");
            }
        });
    if let Err(e) = spawned {
        error!("Failed to start diagnostics thread: {e}");
    }
}

/// Bind `listen` and serve until the listener fails.
pub fn serve(listen: &str, phases: PhaseBoard) -> Result<()> {
    let listener =
        TcpListener::bind(listen).with_context(|| format!("Failed to bind to {listen}"))?;
    info!("Diagnostics endpoint listening on {}", listen);
    serve_listener(listener, phases)
}

fn serve_listener(listener: TcpListener, phases: PhaseBoard) -> Result<()> {
    for stream in listener.incoming() {
        match stream {
            Ok(stream) => {
                if let Err(e) = handle_connection(stream, &phases) {
                    warn!("Error handling diagnostics request: {e:#}");
                }
            }
            Err(e) => error!("Error accepting connection: {}", e),
        }
    }
    Ok(())
}

fn handle_connection(mut stream: TcpStream, phases: &PhaseBoard) -> Result<()> {
    stream.set_read_timeout(Some(Duration::from_secs(30)))?;
    stream.set_write_timeout(Some(Duration::from_secs(30)))?;

    let mut lines = BufReader::new(&stream).lines();
    let request_line = lines
        .next()
        .ok_or_else(|| anyhow::anyhow!("Empty request"))??;
    // Headers are not used; drain them so the client sees a clean close.
    for line in lines.by_ref() {
        if line?.is_empty() {
            break;
        }
    }

    let response = route(&request_line, phases);
    let raw = format!(
        "HTTP/1.1 {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        response.status,
        response.content_type,
        response.body.len(),
        response.body
    );
    stream.write_all(raw.as_bytes())?;
    stream.flush()?;
    Ok(())
}

/// Map a request line such as `GET /runners HTTP/1.1` to a response.
pub fn route(request_line: &str, phases: &PhaseBoard) -> Response {
    let mut parts = request_line.split_whitespace();
    let method = parts.next().unwrap_or_default();
    let path = parts.next().unwrap_or_default();

    match (method, path) {
        ("GET", "/runners") => match serde_json::to_string(&phases.entries()) {
            Ok(body) => Response::json("200 OK", body),
            Err(e) => Response::json(
                "500 Internal Server Error",
                format!(r#"{{"error":"{e}"}}"#),
            ),
        },
        ("GET", "/healthz") => Response {
            status: "200 OK",
            content_type: "text/plain",
            body: "ok".to_string(),
        },
        _ => Response::json("404 Not Found", r#"{"error":"not found"}"#.to_string()),
    }
}
