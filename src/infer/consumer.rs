//! Frame-to-alert detection path, shared by detectord and the tests.
//!
//! `handle` walks one frame through the full pipeline: quality screen,
//! classification, threshold, dedup, evidence storage, alert publication.
//! Returning an error means the frame was NOT disposed of and should be
//! redelivered; quality drops and suppressed repeats are normal outcomes,
//! not errors.

use anyhow::{Context, Result};

use super::dedup::{content_hash, DedupWindow};
use super::{Classifier, FIRE_PROBABILITY_THRESHOLD};
use crate::frame::CapturedFrame;
use crate::now_s;
use crate::quality::{self, FrameQuality};
use crate::queue::AlertMessage;
use crate::store::PhotoStore;

/// Where alerts go. The MQTT sink publishes to the alert topic; tests
/// collect in memory.
pub trait AlertSink {
    fn publish_alert(&mut self, alert: &AlertMessage) -> Result<()>;
}

#[derive(Default)]
pub struct InMemoryAlertSink {
    pub alerts: Vec<AlertMessage>,
}

impl AlertSink for InMemoryAlertSink {
    fn publish_alert(&mut self, alert: &AlertMessage) -> Result<()> {
        self.alerts.push(alert.clone());
        Ok(())
    }
}

/// Classification verdict for one frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Label {
    Fire,
    NoFire,
    /// Not classified: the frame failed the quality screen.
    Gray,
}

/// Outcome of one handled frame.
#[derive(Clone, Debug)]
pub struct Detection {
    pub label: Label,
    pub probability: f32,
    pub content_hash: Option<[u8; 32]>,
    /// True only for the first sighting of a fire scene.
    pub is_new_event: bool,
    pub photo_name: Option<String>,
}

impl Detection {
    fn gray() -> Self {
        Self {
            label: Label::Gray,
            probability: 0.0,
            content_hash: None,
            is_new_event: false,
            photo_name: None,
        }
    }
}

/// Credentials stamped into each alert so the notifier needs no Telegram
/// configuration of its own.
#[derive(Clone, Debug)]
pub struct AlertDestination {
    pub chat_id: String,
    pub bot_token: String,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct DetectionStats {
    pub frames: u64,
    pub degenerate: u64,
    pub fires: u64,
    pub alerts: u64,
}

pub struct DetectionHandler {
    classifier: Box<dyn Classifier>,
    window: DedupWindow,
    store: PhotoStore,
    destination: AlertDestination,
    stats: DetectionStats,
}

impl DetectionHandler {
    pub fn new(
        classifier: Box<dyn Classifier>,
        store: PhotoStore,
        destination: AlertDestination,
    ) -> Self {
        Self {
            classifier,
            window: DedupWindow::new(),
            store,
            destination,
            stats: DetectionStats::default(),
        }
    }

    pub fn handle(
        &mut self,
        frame: &CapturedFrame,
        alerts: &mut dyn AlertSink,
    ) -> Result<Detection> {
        let now = now_s()?;
        self.handle_at(frame, now, alerts)
    }

    /// `handle` with an injected clock.
    pub fn handle_at(
        &mut self,
        frame: &CapturedFrame,
        now_s: u64,
        alerts: &mut dyn AlertSink,
    ) -> Result<Detection> {
        self.stats.frames += 1;
        self.window.expire_if_quiet(now_s);

        let image = match image::load_from_memory(&frame.payload) {
            Ok(image) => image,
            Err(err) => {
                self.stats.degenerate += 1;
                log::debug!("frame captured {} is undecodable: {err}", frame.captured_at);
                return Ok(Detection::gray());
            }
        };
        if let FrameQuality::Degenerate(kind) = quality::assess_gray(&image.to_luma8()) {
            self.stats.degenerate += 1;
            log::debug!(
                "dropping degenerate frame captured {}: {kind}",
                frame.captured_at
            );
            return Ok(Detection::gray());
        }

        let probability = self
            .classifier
            .predict(&image.to_rgb8())
            .context("classifier failed")?;
        if probability < FIRE_PROBABILITY_THRESHOLD {
            return Ok(Detection {
                label: Label::NoFire,
                probability,
                content_hash: None,
                is_new_event: false,
                photo_name: None,
            });
        }

        self.stats.fires += 1;
        let hash = content_hash(&frame.payload);
        if !self.window.register(hash, now_s) {
            log::debug!(
                "suppressing repeat fire detection {} (p={probability:.2})",
                &hex::encode(hash)[..12]
            );
            return Ok(Detection {
                label: Label::Fire,
                probability,
                content_hash: Some(hash),
                is_new_event: false,
                photo_name: None,
            });
        }

        let seq = self
            .store
            .next_photo_seq()
            .context("failed to allocate photo sequence")?;
        let photo_name = format!("fire_{seq}.jpg");
        self.store
            .store_photo(&photo_name, now_s, &frame.payload)
            .with_context(|| format!("failed to store evidence photo {photo_name}"))?;

        let alert = AlertMessage {
            chat_id: self.destination.chat_id.clone(),
            bot_token: self.destination.bot_token.clone(),
            text: format!("Fire detected! probability={probability:.2}"),
            photo_name: photo_name.clone(),
        };
        alerts.publish_alert(&alert).context("failed to publish alert")?;
        self.stats.alerts += 1;
        log::info!(
            "fire event {}: p={probability:.2}, photo {photo_name}, captured {}",
            &hex::encode(hash)[..12],
            frame.captured_at
        );

        Ok(Detection {
            label: Label::Fire,
            probability,
            content_hash: Some(hash),
            is_new_event: true,
            photo_name: Some(photo_name),
        })
    }

    pub fn stats(&self) -> DetectionStats {
        self.stats
    }

    pub fn store(&self) -> &PhotoStore {
        &self.store
    }
}
