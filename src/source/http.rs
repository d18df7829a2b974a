//! HTTP camera backend: MJPEG streams and snapshot endpoints.

use anyhow::{Context, Result};
use std::io::Read;
use std::time::Duration;

use super::SourceUnavailable;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const READ_TIMEOUT: Duration = Duration::from_secs(30);

/// Per-frame cap. A camera frame larger than this is treated as a broken
/// stream rather than buffered without bound.
const MAX_FRAME_BYTES: usize = 4 * 1024 * 1024;
const STREAM_BUFFER_LIMIT: usize = 2 * MAX_FRAME_BYTES;

const SOI: [u8; 2] = [0xFF, 0xD8];
const EOI: [u8; 2] = [0xFF, 0xD9];

enum HttpMode {
    /// Not connected. The next capture opens the URL and probes the
    /// content type to pick a mode.
    Idle,
    /// `multipart/x-mixed-replace`: one long response, frames scanned out
    /// of the byte stream.
    Stream(MjpegStream),
    /// Plain image response: one GET per frame.
    Snapshot,
}

pub(crate) struct HttpSource {
    url: String,
    agent: ureq::Agent,
    mode: HttpMode,
}

impl HttpSource {
    pub(crate) fn new(url: &str) -> Result<Self> {
        url::Url::parse(url).with_context(|| format!("invalid camera URL '{url}'"))?;
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(CONNECT_TIMEOUT)
            .timeout_read(READ_TIMEOUT)
            .build();
        Ok(Self {
            url: url.to_string(),
            agent,
            mode: HttpMode::Idle,
        })
    }

    pub(crate) fn next_frame(&mut self) -> Result<Vec<u8>> {
        loop {
            match &mut self.mode {
                HttpMode::Idle => {
                    if let Some(first) = self.open()? {
                        return Ok(first);
                    }
                    // Stream mode is set; loop to pull the first frame.
                }
                HttpMode::Stream(stream) => match stream.next_jpeg() {
                    Ok(frame) => return Ok(frame),
                    Err(err) => {
                        // Drop the dead stream; the next capture reconnects.
                        self.mode = HttpMode::Idle;
                        return Err(err);
                    }
                },
                HttpMode::Snapshot => return self.fetch_snapshot(),
            }
        }
    }

    /// Open the URL and decide the mode from the response content type.
    /// Returns the first frame when the response itself is a snapshot.
    fn open(&mut self) -> Result<Option<Vec<u8>>> {
        let response = self.get()?;
        let content_type = response.content_type().to_ascii_lowercase();
        if content_type.starts_with("multipart/x-mixed-replace") {
            let reader: Box<dyn Read + Send> = response.into_reader();
            self.mode = HttpMode::Stream(MjpegStream::new(reader));
            Ok(None)
        } else if content_type.starts_with("image/") || content_type.is_empty() {
            self.mode = HttpMode::Snapshot;
            read_body(response).map(Some)
        } else {
            Err(SourceUnavailable::new(format!(
                "unsupported content type '{content_type}' from {}",
                self.url
            ))
            .into())
        }
    }

    fn fetch_snapshot(&mut self) -> Result<Vec<u8>> {
        let response = self.get()?;
        read_body(response)
    }

    fn get(&self) -> Result<ureq::Response> {
        match self.agent.get(&self.url).call() {
            Ok(response) => Ok(response),
            Err(ureq::Error::Status(code, _)) => Err(SourceUnavailable::new(format!(
                "camera returned HTTP {code} for {}",
                self.url
            ))
            .into()),
            Err(err) => Err(SourceUnavailable::new(format!(
                "request to {} failed: {err}",
                self.url
            ))
            .into()),
        }
    }
}

fn read_body(response: ureq::Response) -> Result<Vec<u8>> {
    let mut body = Vec::new();
    response
        .into_reader()
        .take(MAX_FRAME_BYTES as u64 + 1)
        .read_to_end(&mut body)
        .map_err(|err| SourceUnavailable::new(format!("failed reading camera response: {err}")))?;
    if body.len() > MAX_FRAME_BYTES {
        return Err(SourceUnavailable::new("camera frame exceeds size limit".to_string()).into());
    }
    Ok(body)
}

struct MjpegStream {
    reader: Box<dyn Read + Send>,
    buf: Vec<u8>,
}

impl MjpegStream {
    fn new(reader: Box<dyn Read + Send>) -> Self {
        Self {
            reader,
            buf: Vec::new(),
        }
    }

    fn next_jpeg(&mut self) -> Result<Vec<u8>> {
        let mut chunk = [0u8; 8192];
        loop {
            if let Some(frame) = scan_jpeg(&mut self.buf) {
                return Ok(frame);
            }
            if self.buf.len() > STREAM_BUFFER_LIMIT {
                return Err(
                    SourceUnavailable::new("no frame boundary within buffer limit".to_string())
                        .into(),
                );
            }
            let n = self
                .reader
                .read(&mut chunk)
                .map_err(|err| SourceUnavailable::new(format!("stream read failed: {err}")))?;
            if n == 0 {
                return Err(SourceUnavailable::new("stream ended".to_string()).into());
            }
            self.buf.extend_from_slice(&chunk[..n]);
        }
    }
}

/// Pull the first complete SOI..EOI span out of `buf`, draining consumed
/// bytes. Part headers and boundary lines between frames are discarded.
fn scan_jpeg(buf: &mut Vec<u8>) -> Option<Vec<u8>> {
    let start = match find(buf, &SOI, 0) {
        Some(pos) => pos,
        None => {
            // Keep one trailing byte in case it is half a marker.
            if buf.len() > 1 {
                buf.drain(..buf.len() - 1);
            }
            return None;
        }
    };
    let end = find(buf, &EOI, start + 2)?;
    let frame = buf[start..end + 2].to_vec();
    buf.drain(..end + 2);
    Some(frame)
}

fn find(haystack: &[u8], needle: &[u8; 2], from: usize) -> Option<usize> {
    if haystack.len() < from + 2 {
        return None;
    }
    haystack[from..]
        .windows(2)
        .position(|w| w == needle)
        .map(|pos| from + pos)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::net::TcpListener;

    #[test]
    fn scan_extracts_frame_and_discards_part_headers() {
        let mut buf = Vec::new();
        buf.extend_from_slice(b"--frame\r\nContent-Type: image/jpeg\r\n\r\n");
        buf.extend_from_slice(&[0xFF, 0xD8, 0x01, 0x02, 0xFF, 0xD9]);
        buf.extend_from_slice(b"\r\n--frame\r\n");
        let frame = scan_jpeg(&mut buf).expect("complete frame in buffer");
        assert_eq!(frame, vec![0xFF, 0xD8, 0x01, 0x02, 0xFF, 0xD9]);
        assert!(scan_jpeg(&mut buf).is_none());
    }

    #[test]
    fn scan_waits_for_end_marker() {
        let mut buf = vec![0xFF, 0xD8, 0x01, 0x02];
        assert!(scan_jpeg(&mut buf).is_none());
        buf.extend_from_slice(&[0xFF, 0xD9]);
        assert!(scan_jpeg(&mut buf).is_some());
    }

    #[test]
    fn scan_trims_garbage_but_keeps_a_possible_half_marker() {
        let mut buf = vec![0x00, 0x01, 0x02, 0xFF];
        assert!(scan_jpeg(&mut buf).is_none());
        assert_eq!(buf, vec![0xFF]);
        buf.extend_from_slice(&[0xD8, 0x09, 0xFF, 0xD9]);
        let frame = scan_jpeg(&mut buf).expect("marker split across reads");
        assert_eq!(frame, vec![0xFF, 0xD8, 0x09, 0xFF, 0xD9]);
    }

    #[test]
    fn scan_handles_two_frames_in_one_buffer() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&[0xFF, 0xD8, 0x01, 0xFF, 0xD9]);
        buf.extend_from_slice(&[0xFF, 0xD8, 0x02, 0xFF, 0xD9]);
        assert_eq!(scan_jpeg(&mut buf).unwrap()[2], 0x01);
        assert_eq!(scan_jpeg(&mut buf).unwrap()[2], 0x02);
    }

    fn serve_once(response: Vec<u8>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        std::thread::spawn(move || {
            if let Ok((mut socket, _)) = listener.accept() {
                let mut seen = Vec::new();
                let mut chunk = [0u8; 1024];
                loop {
                    match socket.read(&mut chunk) {
                        Ok(0) | Err(_) => break,
                        Ok(n) => {
                            seen.extend_from_slice(&chunk[..n]);
                            if seen.windows(4).any(|w| w == b"\r\n\r\n") {
                                break;
                            }
                        }
                    }
                }
                let _ = socket.write_all(&response);
            }
        });
        format!("http://{}/frame", addr)
    }

    #[test]
    fn snapshot_endpoint_yields_the_body() {
        let body = vec![0xFF, 0xD8, 0xAA, 0xFF, 0xD9];
        let mut response = Vec::new();
        response.extend_from_slice(
            format!(
                "HTTP/1.1 200 OK\r\nContent-Type: image/jpeg\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                body.len()
            )
            .as_bytes(),
        );
        response.extend_from_slice(&body);
        let url = serve_once(response);

        let mut source = HttpSource::new(&url).unwrap();
        assert_eq!(source.next_frame().unwrap(), body);
    }

    #[test]
    fn multipart_stream_yields_frames_then_fails_at_eof() {
        let mut response = Vec::new();
        response.extend_from_slice(
            b"HTTP/1.1 200 OK\r\nContent-Type: multipart/x-mixed-replace; boundary=frame\r\nConnection: close\r\n\r\n",
        );
        for tag in [0x01u8, 0x02] {
            response.extend_from_slice(b"--frame\r\nContent-Type: image/jpeg\r\n\r\n");
            response.extend_from_slice(&[0xFF, 0xD8, tag, 0xFF, 0xD9]);
            response.extend_from_slice(b"\r\n");
        }
        response.extend_from_slice(b"--frame--\r\n");
        let url = serve_once(response);

        let mut source = HttpSource::new(&url).unwrap();
        assert_eq!(source.next_frame().unwrap()[2], 0x01);
        assert_eq!(source.next_frame().unwrap()[2], 0x02);
        let err = source.next_frame().unwrap_err();
        assert!(err.is::<SourceUnavailable>());
    }

    #[test]
    fn html_response_is_rejected() {
        let response = b"HTTP/1.1 200 OK\r\nContent-Type: text/html\r\nContent-Length: 5\r\nConnection: close\r\n\r\nhello".to_vec();
        let url = serve_once(response);
        let mut source = HttpSource::new(&url).unwrap();
        assert!(source.next_frame().is_err());
    }
}
