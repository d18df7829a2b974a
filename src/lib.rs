//! emberwatch - fire detection pipeline.
//!
//! Three long-running daemons cooperate through two message queues:
//!
//! - `samplerd` samples frames from a video source on a runtime-adjustable
//!   interval, drops degenerate frames, and publishes the rest to the frame
//!   topic. A loopback control endpoint changes the interval while it runs.
//! - `detectord` consumes frames, re-screens quality, runs the fire
//!   classifier, suppresses repeat detections of the same scene inside a
//!   quiet-period window, stores evidence photos, and publishes one alert
//!   per new event.
//! - `notifierd` consumes alerts and delivers them over the Telegram Bot
//!   API, acknowledging only after both the text and the photo went out.
//!
//! The queues are MQTT topics at QoS 1 with durable sessions. Consumers
//! acknowledge manually: a handler fault leaves the message unacknowledged
//! and the broker redelivers it on the next session. Delivery is therefore
//! at-least-once everywhere; the dedup window and idempotent photo storage
//! absorb the duplicates.
//!
//! # Module Structure
//!
//! - `source`: frame acquisition (synthetic scenes, HTTP cameras, still dirs)
//! - `quality`: luminance-histogram degeneracy screen
//! - `capture`: sampling scheduler + runtime interval control
//! - `queue`: MQTT publish/consume wrappers and wire formats
//! - `infer`: classifier backends, dedup window, per-frame detection handler
//! - `store`: SQLite photo store, alert sequence, dead letters
//! - `notify`: Telegram transport and the alert dispatcher

use anyhow::{anyhow, Result};

pub mod capture;
pub mod config;
pub mod frame;
pub mod infer;
pub mod notify;
pub mod quality;
pub mod queue;
pub mod source;
pub mod store;

pub use capture::{CaptureInterval, CaptureScheduler, InvalidInterval};
pub use config::PipelineConfig;
pub use frame::CapturedFrame;
pub use infer::{Classifier, DedupWindow, Detection, DetectionHandler, Label};
pub use notify::{AlertDispatcher, MessageTransport, TelegramClient};
pub use quality::FrameQuality;
pub use queue::{AlertMessage, Disposition};
pub use source::{FrameSource, SourceUnavailable};
pub use store::PhotoStore;

/// Seconds since the Unix epoch.
pub fn now_s() -> Result<u64> {
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map_err(|_| anyhow!("system clock is before the Unix epoch"))?;
    Ok(now.as_secs())
}
