//! Loopback control endpoint for samplerd.
//!
//! Two routes, JSON in and out:
//!
//! - `GET /health` reports liveness and the current interval.
//! - `PUT /interval` with `{"seconds": N}` changes the sampling interval.
//!
//! The listener refuses to bind anything but a loopback address. Interval
//! changes are an operator action on the box running the sampler, not a
//! network API.

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use super::CaptureInterval;

const ACCEPT_IDLE: Duration = Duration::from_millis(50);
const IO_TIMEOUT: Duration = Duration::from_secs(2);
const MAX_REQUEST_BYTES: usize = 8192;

/// Running control endpoint. `stop` joins the listener thread.
pub struct ControlHandle {
    addr: SocketAddr,
    shutdown: Arc<AtomicBool>,
    join: Option<JoinHandle<()>>,
}

impl ControlHandle {
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn stop(mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(handle) = self.join.take() {
            let _ = handle.join();
        }
    }
}

/// Bind `addr` and serve control requests on a background thread.
pub fn spawn(addr: &str, interval: Arc<CaptureInterval>) -> Result<ControlHandle> {
    let requested = parse_loopback_addr(addr)?;
    let listener = TcpListener::bind(requested)
        .with_context(|| format!("failed to bind control endpoint {requested}"))?;
    let local = listener.local_addr()?;
    listener.set_nonblocking(true)?;

    let shutdown = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&shutdown);
    let join = std::thread::spawn(move || serve(listener, interval, flag));
    log::info!("control endpoint listening on {local}");
    Ok(ControlHandle {
        addr: local,
        shutdown,
        join: Some(join),
    })
}

fn parse_loopback_addr(addr: &str) -> Result<SocketAddr> {
    let parsed: SocketAddr = addr
        .parse()
        .with_context(|| format!("invalid control address '{addr}'"))?;
    if !parsed.ip().is_loopback() {
        return Err(anyhow!(
            "control address '{addr}' must be loopback (127.0.0.1 or ::1)"
        ));
    }
    Ok(parsed)
}

fn serve(listener: TcpListener, interval: Arc<CaptureInterval>, shutdown: Arc<AtomicBool>) {
    while !shutdown.load(Ordering::SeqCst) {
        match listener.accept() {
            Ok((stream, _peer)) => {
                if let Err(err) = handle_connection(stream, &interval) {
                    log::warn!("control request failed: {err:#}");
                }
            }
            Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                std::thread::sleep(ACCEPT_IDLE);
            }
            Err(err) => {
                log::warn!("control accept failed: {err}");
                std::thread::sleep(ACCEPT_IDLE);
            }
        }
    }
}

struct ControlRequest {
    method: String,
    path: String,
    body: Vec<u8>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct IntervalBody {
    seconds: u64,
}

fn handle_connection(mut stream: TcpStream, interval: &CaptureInterval) -> Result<()> {
    stream.set_nonblocking(false)?;
    stream.set_read_timeout(Some(IO_TIMEOUT))?;
    stream.set_write_timeout(Some(IO_TIMEOUT))?;

    let request = match read_request(&mut stream) {
        Ok(request) => request,
        Err(err) => {
            let body = serde_json::json!({ "error": "malformed request" }).to_string();
            let _ = write_response(&mut stream, 400, &body);
            return Err(err);
        }
    };

    match (request.method.as_str(), request.path.as_str()) {
        ("GET", "/health") => {
            let body = serde_json::json!({
                "status": "ok",
                "interval_secs": interval.get(),
            })
            .to_string();
            write_response(&mut stream, 200, &body)
        }
        ("PUT", "/interval") => {
            let parsed: IntervalBody = match serde_json::from_slice(&request.body) {
                Ok(parsed) => parsed,
                Err(err) => {
                    let body = serde_json::json!({
                        "error": format!("expected {{\"seconds\": <count>}}: {err}"),
                    })
                    .to_string();
                    return write_response(&mut stream, 400, &body);
                }
            };
            match interval.set(parsed.seconds) {
                Ok(()) => {
                    let body = serde_json::json!({ "interval_secs": parsed.seconds }).to_string();
                    write_response(&mut stream, 200, &body)
                }
                Err(invalid) => {
                    let body = serde_json::json!({ "error": invalid.to_string() }).to_string();
                    write_response(&mut stream, 400, &body)
                }
            }
        }
        ("GET", _) | ("PUT", _) => {
            let body = serde_json::json!({ "error": "no such route" }).to_string();
            write_response(&mut stream, 404, &body)
        }
        _ => {
            let body = serde_json::json!({ "error": "method not allowed" }).to_string();
            write_response(&mut stream, 405, &body)
        }
    }
}

fn read_request(stream: &mut TcpStream) -> Result<ControlRequest> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    let header_end = loop {
        if let Some(pos) = find_header_end(&buf) {
            break pos;
        }
        if buf.len() > MAX_REQUEST_BYTES {
            return Err(anyhow!("request headers too large"));
        }
        let n = stream.read(&mut chunk).context("request read failed")?;
        if n == 0 {
            return Err(anyhow!("connection closed mid-request"));
        }
        buf.extend_from_slice(&chunk[..n]);
    };

    let head =
        std::str::from_utf8(&buf[..header_end]).context("request headers are not UTF-8")?;
    let mut lines = head.split("\r\n");
    let request_line = lines.next().unwrap_or_default();
    let mut parts = request_line.split_whitespace();
    let method = parts.next().unwrap_or_default().to_string();
    let path = parts.next().unwrap_or_default().to_string();

    let mut content_length = 0usize;
    for line in lines {
        if let Some((name, value)) = line.split_once(':') {
            if name.trim().eq_ignore_ascii_case("content-length") {
                content_length = value.trim().parse().context("invalid Content-Length")?;
            }
        }
    }
    if content_length > MAX_REQUEST_BYTES {
        return Err(anyhow!("request body too large"));
    }

    let mut body = buf[header_end + 4..].to_vec();
    while body.len() < content_length {
        let n = stream.read(&mut chunk).context("body read failed")?;
        if n == 0 {
            return Err(anyhow!("connection closed mid-body"));
        }
        body.extend_from_slice(&chunk[..n]);
    }
    body.truncate(content_length);

    Ok(ControlRequest { method, path, body })
}

fn find_header_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n")
}

fn write_response(stream: &mut TcpStream, status: u16, body: &str) -> Result<()> {
    let reason = match status {
        200 => "OK",
        400 => "Bad Request",
        404 => "Not Found",
        405 => "Method Not Allowed",
        _ => "Error",
    };
    let response = format!(
        "HTTP/1.1 {status} {reason}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    );
    stream.write_all(response.as_bytes())?;
    Ok(())
}
