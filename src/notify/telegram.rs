//! Telegram Bot API transport.
//!
//! Two calls, `sendMessage` and `sendPhoto`. The photo upload is a
//! hand-built multipart/form-data body; it is small enough that pulling
//! in a multipart crate buys nothing. Bot tokens appear in request URLs,
//! so transport errors are reduced to status codes and error kinds before
//! they can reach a log line.

use anyhow::{anyhow, Result};
use rand::{distributions::Alphanumeric, Rng};
use std::time::Duration;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const READ_TIMEOUT: Duration = Duration::from_secs(30);

/// Outbound message channel. One method per message kind so the
/// dispatcher can tell exactly which half of a delivery failed.
pub trait MessageTransport {
    fn send_text(&mut self, bot_token: &str, chat_id: &str, text: &str) -> Result<()>;
    fn send_photo(
        &mut self,
        bot_token: &str,
        chat_id: &str,
        photo_name: &str,
        bytes: &[u8],
    ) -> Result<()>;
}

pub struct TelegramClient {
    api_base: String,
    agent: ureq::Agent,
}

impl Default for TelegramClient {
    fn default() -> Self {
        Self::new()
    }
}

impl TelegramClient {
    pub fn new() -> Self {
        Self::with_api_base("https://api.telegram.org")
    }

    /// Point at a different API host. Used for tests and proxies.
    pub fn with_api_base(api_base: &str) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(CONNECT_TIMEOUT)
            .timeout_read(READ_TIMEOUT)
            .build();
        Self {
            api_base: api_base.trim_end_matches('/').to_string(),
            agent,
        }
    }

    fn method_url(&self, bot_token: &str, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_base, bot_token, method)
    }
}

impl MessageTransport for TelegramClient {
    fn send_text(&mut self, bot_token: &str, chat_id: &str, text: &str) -> Result<()> {
        let url = self.method_url(bot_token, "sendMessage");
        self.agent
            .post(&url)
            .send_form(&[("chat_id", chat_id), ("text", text)])
            .map_err(|err| redact(err, "sendMessage"))?;
        Ok(())
    }

    fn send_photo(
        &mut self,
        bot_token: &str,
        chat_id: &str,
        photo_name: &str,
        bytes: &[u8],
    ) -> Result<()> {
        let boundary = multipart_boundary();
        let body = photo_form_body(&boundary, chat_id, photo_name, bytes);
        let url = self.method_url(bot_token, "sendPhoto");
        self.agent
            .post(&url)
            .set(
                "Content-Type",
                &format!("multipart/form-data; boundary={boundary}"),
            )
            .send_bytes(&body)
            .map_err(|err| redact(err, "sendPhoto"))?;
        Ok(())
    }
}

/// Strip anything that could carry the request URL out of the error.
fn redact(err: ureq::Error, method: &str) -> anyhow::Error {
    match err {
        ureq::Error::Status(code, _) => anyhow!("telegram {method} returned HTTP {code}"),
        ureq::Error::Transport(transport) => {
            anyhow!("telegram {method} transport failed: {:?}", transport.kind())
        }
    }
}

fn multipart_boundary() -> String {
    let tail: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(24)
        .map(char::from)
        .collect();
    format!("emberwatch{tail}")
}

fn photo_form_body(boundary: &str, chat_id: &str, photo_name: &str, bytes: &[u8]) -> Vec<u8> {
    let mut body = Vec::with_capacity(bytes.len() + 512);
    body.extend_from_slice(
        format!(
            "--{boundary}\r\nContent-Disposition: form-data; name=\"chat_id\"\r\n\r\n{chat_id}\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(
        format!(
            "--{boundary}\r\nContent-Disposition: form-data; name=\"photo\"; filename=\"{photo_name}\"\r\nContent-Type: image/jpeg\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());
    body
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::sync::mpsc;

    #[test]
    fn photo_body_carries_both_parts() {
        let body = photo_form_body("BOUND", "42", "fire_7.jpg", b"JPEGDATA");
        let text = String::from_utf8_lossy(&body);
        assert!(text.contains("--BOUND\r\nContent-Disposition: form-data; name=\"chat_id\"\r\n\r\n42\r\n"));
        assert!(text.contains("filename=\"fire_7.jpg\""));
        assert!(text.contains("Content-Type: image/jpeg"));
        assert!(text.contains("JPEGDATA"));
        assert!(text.ends_with("\r\n--BOUND--\r\n"));
    }

    #[test]
    fn boundaries_are_fresh_per_upload() {
        let a = multipart_boundary();
        let b = multipart_boundary();
        assert!(a.starts_with("emberwatch"));
        assert_eq!(a.len(), "emberwatch".len() + 24);
        assert_ne!(a, b);
    }

    /// One-shot HTTP server: reads a full request, passes it to the test,
    /// answers with `status`.
    fn serve_once(status: u16) -> (String, mpsc::Receiver<Vec<u8>>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = mpsc::channel();
        std::thread::spawn(move || {
            if let Ok((mut socket, _)) = listener.accept() {
                let mut seen = Vec::new();
                let mut chunk = [0u8; 4096];
                let header_end = loop {
                    match socket.read(&mut chunk) {
                        Ok(0) | Err(_) => return,
                        Ok(n) => {
                            seen.extend_from_slice(&chunk[..n]);
                            if let Some(pos) = seen.windows(4).position(|w| w == b"\r\n\r\n") {
                                break pos + 4;
                            }
                        }
                    }
                };
                let head = String::from_utf8_lossy(&seen[..header_end]).to_lowercase();
                let content_length = head
                    .lines()
                    .find_map(|line| line.strip_prefix("content-length:"))
                    .and_then(|v| v.trim().parse::<usize>().ok())
                    .unwrap_or(0);
                while seen.len() < header_end + content_length {
                    match socket.read(&mut chunk) {
                        Ok(0) | Err(_) => break,
                        Ok(n) => seen.extend_from_slice(&chunk[..n]),
                    }
                }
                let reason = if status == 200 { "OK" } else { "Error" };
                let body = r#"{"ok":true}"#;
                let response = format!(
                    "HTTP/1.1 {status} {reason}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                    body.len()
                );
                let _ = socket.write_all(response.as_bytes());
                let _ = tx.send(seen);
            }
        });
        (format!("http://{addr}"), rx)
    }

    #[test]
    fn send_text_posts_a_form() {
        let (base, rx) = serve_once(200);
        let mut client = TelegramClient::with_api_base(&base);
        client.send_text("TOKEN", "42", "Fire detected!").unwrap();
        let request = String::from_utf8_lossy(&rx.recv().unwrap()).to_string();
        assert!(request.starts_with("POST /botTOKEN/sendMessage"));
        assert!(request.contains("chat_id=42"));
    }

    #[test]
    fn send_photo_uploads_the_bytes() {
        let (base, rx) = serve_once(200);
        let mut client = TelegramClient::with_api_base(&base);
        client
            .send_photo("TOKEN", "42", "fire_1.jpg", b"JPEGDATA")
            .unwrap();
        let request = rx.recv().unwrap();
        let text = String::from_utf8_lossy(&request);
        assert!(text.starts_with("POST /botTOKEN/sendPhoto"));
        assert!(text.contains("filename=\"fire_1.jpg\""));
        assert!(text.contains("JPEGDATA"));
    }

    #[test]
    fn server_error_is_reported_without_the_token() {
        let (base, _rx) = serve_once(500);
        let mut client = TelegramClient::with_api_base(&base);
        let err = client
            .send_text("SECRETTOKEN", "42", "Fire detected!")
            .unwrap_err();
        let message = format!("{err:#}");
        assert!(message.contains("500"));
        assert!(!message.contains("SECRETTOKEN"));
    }
}
