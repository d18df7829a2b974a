//! Message formats carried over the queue.
//!
//! Frame payloads are the capture timestamp as a fixed 20-byte UTC stamp
//! followed by the encoded image bytes. MQTT 3.1.1 carries no per-message
//! metadata, so the stamp travels in-band; its fixed width keeps the image
//! bytes trivially recoverable. Alert payloads are a small strict-JSON
//! document.

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

use crate::frame::CapturedFrame;

/// Width of `frame::format_utc` output, `YYYY-MM-DDTHH:MM:SSZ`.
pub(crate) const STAMP_LEN: usize = 20;

pub(crate) fn frame_to_payload(frame: &CapturedFrame) -> Result<Vec<u8>> {
    if !is_utc_stamp(&frame.captured_at) {
        return Err(anyhow!(
            "frame carries malformed capture timestamp '{}'",
            frame.captured_at
        ));
    }
    let mut payload = Vec::with_capacity(STAMP_LEN + frame.payload.len());
    payload.extend_from_slice(frame.captured_at.as_bytes());
    payload.extend_from_slice(&frame.payload);
    Ok(payload)
}

/// Rebuild a `CapturedFrame` from an inbound frame payload. Fails when the
/// stamp prefix is missing or malformed; such messages cannot be processed
/// and are dropped by the caller.
pub fn frame_from_payload(payload: &[u8]) -> Result<CapturedFrame> {
    if payload.len() < STAMP_LEN {
        return Err(anyhow!(
            "frame message too short for a timestamp prefix ({} bytes)",
            payload.len()
        ));
    }
    let (stamp, image) = payload.split_at(STAMP_LEN);
    let captured_at = std::str::from_utf8(stamp)
        .map_err(|_| anyhow!("frame timestamp prefix is not UTF-8"))?;
    if !is_utc_stamp(captured_at) {
        return Err(anyhow!(
            "frame message carries malformed timestamp '{captured_at}'"
        ));
    }
    Ok(CapturedFrame {
        captured_at: captured_at.to_string(),
        payload: image.to_vec(),
    })
}

fn is_utc_stamp(value: &str) -> bool {
    let bytes = value.as_bytes();
    if bytes.len() != STAMP_LEN {
        return false;
    }
    for (i, b) in bytes.iter().enumerate() {
        let ok = match i {
            4 | 7 => *b == b'-',
            10 => *b == b'T',
            13 | 16 => *b == b':',
            19 => *b == b'Z',
            _ => b.is_ascii_digit(),
        };
        if !ok {
            return false;
        }
    }
    true
}

// ---------------------------------------------------------------------------
// Alert messages
// ---------------------------------------------------------------------------

/// One notification order. Parsing is strict: unknown or missing fields
/// reject the message instead of guessing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AlertMessage {
    pub chat_id: String,
    pub bot_token: String,
    pub text: String,
    pub photo_name: String,
}

impl AlertMessage {
    pub fn to_json(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_json(payload: &[u8]) -> Result<Self> {
        serde_json::from_slice(payload).map_err(|err| anyhow!("malformed alert message: {err}"))
    }
}
